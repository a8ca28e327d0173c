//! The container engine primitives the orchestration layer is built on.
//!
//! Everything above this seam speaks in terms of [`BuildChunk`],
//! [`ImageInfo`] and [`ContainerInfo`]; [`crate::docker::DockerEngine`]
//! maps them onto the Docker API and `test_utils::MockEngine` keeps them in
//! memory.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::bollard::errors::Error as BollardError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Docker API error: {0}")]
    DockerApi(#[from] BollardError),
    #[error("Build context error: {0}")]
    Context(#[from] std::io::Error),
    #[error("Engine rejected request: {0}")]
    Rejected(String),
    #[error("Internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the engine answered "no such object".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::DockerApi(BollardError::DockerResponseServerError {
                status_code: 404,
                ..
            })
        )
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// One decoded message of an image build's progress stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildChunk {
    /// Textual build output, usually newline-terminated.
    pub stream: Option<String>,
    /// Pull/progress status without build output.
    pub status: Option<String>,
    pub error: Option<String>,
    /// Image id announced by the engine once the build produced one.
    pub image_id: Option<String>,
}

impl BuildChunk {
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            stream: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn status(text: impl Into<String>) -> Self {
        Self {
            status: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageBuildSpec {
    pub context: PathBuf,
    pub dockerfile: String,
    pub tag: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RunSpec {
    pub image: String,
    pub labels: HashMap<String, String>,
    /// Container port published 1:1 on the host.
    pub published_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub id: String,
    pub tags: Vec<String>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub labels: HashMap<String, String>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Starts building `spec.context`; the returned stream must be drained to
    /// complete the build.
    async fn build_image(
        &self,
        spec: ImageBuildSpec,
    ) -> EngineResult<BoxStream<'_, EngineResult<BuildChunk>>>;

    /// Resolves an id, id prefix or tag. `Ok(None)` when the engine has no match.
    async fn inspect_image(&self, reference: &str) -> EngineResult<Option<ImageInfo>>;

    /// Images carrying the `key=value` label.
    async fn list_images(&self, label_filter: &str) -> EngineResult<Vec<ImageInfo>>;

    /// Creates and starts a detached container, returning its id.
    async fn run_container(&self, spec: &RunSpec) -> EngineResult<String>;

    async fn inspect_container(&self, id: &str) -> EngineResult<Option<ContainerInfo>>;

    /// Containers in any state carrying the `key=value` label.
    async fn list_containers(&self, label_filter: &str) -> EngineResult<Vec<ContainerInfo>>;

    /// Raw stdout and stderr output of a container so far.
    async fn container_logs(&self, id: &str) -> EngineResult<Vec<u8>>;
}
