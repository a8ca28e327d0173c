use serde::{Deserialize, Serialize};
use space_dock_executor::common::{ContainerRecord, EnvironmentDescriptor, ImageRecord};
use space_dock_executor::CreatedImage;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateImageRequest {
    pub repository_url: String,
    pub environment: EnvironmentDescriptor,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContainerRequest {
    /// Image short id, or any reference the engine resolves.
    pub image: String,
}

pub type CreateImageResponse = CreatedImage;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResponse {
    #[serde(flatten)]
    pub container: ContainerRecord,
    pub folder_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageListResponse {
    pub images: Vec<ImageRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContainerListResponse {
    pub containers: Vec<ContainerResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogResponse {
    pub id: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}
