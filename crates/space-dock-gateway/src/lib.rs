//! HTTP surface of space-dock.

pub mod config;
pub mod types;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use space_dock_executor::common::{ContainerRecord, SpaceDockError};
use space_dock_executor::{folder_uri, SpaceDock};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

use types::{
    ContainerListResponse, ContainerResponse, CreateContainerRequest, CreateImageRequest,
    CreateImageResponse, HealthResponse, ImageListResponse, LogResponse,
};

#[derive(Clone)]
pub struct AppState {
    pub dock: Arc<SpaceDock>,
}

impl AppState {
    pub fn new(dock: SpaceDock) -> Self {
        Self {
            dock: Arc::new(dock),
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_log: Option<Vec<String>>,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, error: impl ToString) -> Self {
        Self {
            status,
            error: error.to_string(),
            code: code.to_string(),
            partial_log: None,
        }
    }
}

impl From<SpaceDockError> for ApiError {
    fn from(err: SpaceDockError) -> Self {
        let message = err.to_string();
        match err {
            SpaceDockError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
            SpaceDockError::CloneFailed { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "CLONE_FAILED", message)
            }
            SpaceDockError::InvalidDescriptor(_) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_DESCRIPTOR", message)
            }
            SpaceDockError::BuildFailed { partial_log, .. } => Self {
                partial_log: Some(partial_log),
                ..Self::new(StatusCode::UNPROCESSABLE_ENTITY, "BUILD_FAILED", message)
            },
            SpaceDockError::LaunchFailed { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, "LAUNCH_FAILED", message)
            }
            SpaceDockError::Engine(_) => Self::new(StatusCode::BAD_GATEWAY, "ENGINE_ERROR", message),
            SpaceDockError::ContextUnavailable { .. } | SpaceDockError::Io(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, code = %self.code, "{}", self.error);
        } else {
            warn!(status = %self.status, code = %self.code, "{}", self.error);
        }
        (self.status, Json(self)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Images
        .route(
            "/api/v1/images",
            post(create_image_handler).get(list_images_handler),
        )
        .route("/api/v1/images/:id/build-log", get(build_log_handler))
        // Containers
        .route(
            "/api/v1/containers",
            post(create_container_handler).get(list_containers_handler),
        )
        .route("/api/v1/containers/:id", get(get_container_handler))
        .route("/api/v1/containers/:id/logs", get(container_logs_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn container_response(container: ContainerRecord) -> ContainerResponse {
    ContainerResponse {
        folder_uri: folder_uri(&container.short_id),
        container,
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[instrument(skip(state, payload))]
async fn create_image_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateImageRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateImageResponse>)> {
    let Json(request) = payload?;
    info!(repository_url = %request.repository_url, "Image requested");
    let created = state
        .dock
        .create_image(&request.repository_url, &request.environment)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_images_handler(State(state): State<AppState>) -> ApiResult<Json<ImageListResponse>> {
    let images = state.dock.list_images().await?;
    Ok(Json(ImageListResponse { images }))
}

async fn build_log_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LogResponse>> {
    let lines = state.dock.build_log(&id).await?;
    Ok(Json(LogResponse { id, lines }))
}

#[instrument(skip(state, payload))]
async fn create_container_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateContainerRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ContainerResponse>)> {
    let Json(request) = payload?;
    let container = state.dock.create_container(&request.image).await?;
    Ok((StatusCode::CREATED, Json(container_response(container))))
}

async fn list_containers_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<ContainerListResponse>> {
    let containers = state.dock.list_containers().await?;
    Ok(Json(ContainerListResponse {
        containers: containers.into_iter().map(container_response).collect(),
    }))
}

async fn get_container_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ContainerResponse>> {
    let container = state.dock.container(&id).await?;
    Ok(Json(container_response(container)))
}

async fn container_logs_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LogResponse>> {
    let lines = state.dock.container_logs(&id).await?;
    Ok(Json(LogResponse { id, lines }))
}
