//! [`ContainerEngine`] backed by the local Docker daemon.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::bollard::container::{
    Config as ContainerConfig, InspectContainerOptions, ListContainersOptions, LogsOptions,
};
use crate::bollard::image::{BuildImageOptions, ListImagesOptions};
use crate::bollard::models::{BuildInfo, ContainerSummary, HostConfig, PortBinding};
use crate::bollard::Docker;
use crate::engine::{
    BuildChunk, ContainerEngine, ContainerInfo, EngineError, EngineResult, ImageBuildSpec,
    ImageInfo, RunSpec,
};

#[derive(Clone)]
pub struct DockerEngine {
    docker: Arc<Docker>,
}

impl DockerEngine {
    pub fn new(docker: Arc<Docker>) -> Self {
        Self { docker }
    }

    pub fn connect_with_local_defaults() -> EngineResult<Self> {
        Ok(Self::new(Arc::new(Docker::connect_with_local_defaults()?)))
    }
}

/// Packs a build context directory into the tar archive the build API expects.
async fn archive_context(spec: &ImageBuildSpec) -> EngineResult<Bytes> {
    let context = spec.context.clone();
    let archive = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
        if !context.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", context.display()),
            ));
        }
        let mut builder = tar::Builder::new(Vec::new());
        builder.follow_symlinks(false);
        builder.append_dir_all(".", &context)?;
        builder.into_inner()
    })
    .await
    .map_err(|e| EngineError::Internal(format!("context archiving task failed: {e}")))??;
    Ok(Bytes::from(archive))
}

fn into_chunk(info: BuildInfo) -> BuildChunk {
    let error = info
        .error
        .or_else(|| info.error_detail.and_then(|detail| detail.message));
    BuildChunk {
        stream: info.stream,
        status: info.status,
        error,
        image_id: info.aux.and_then(|aux| aux.id),
    }
}

fn label_filters(label_filter: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([("label".to_string(), vec![label_filter.to_string()])])
}

fn summary_into_info(summary: ContainerSummary) -> ContainerInfo {
    let name = summary
        .names
        .and_then(|names| names.into_iter().next())
        .unwrap_or_default();
    ContainerInfo {
        id: summary.id.unwrap_or_default(),
        name: name.trim_start_matches('/').to_string(),
        image: summary.image.unwrap_or_default(),
        status: summary.state.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    #[instrument(skip(self, spec), fields(tag = %spec.tag, context = %spec.context.display()))]
    async fn build_image(
        &self,
        spec: ImageBuildSpec,
    ) -> EngineResult<BoxStream<'_, EngineResult<BuildChunk>>> {
        let archive = archive_context(&spec).await?;
        debug!(bytes = archive.len(), "Build context archived");

        let options = BuildImageOptions {
            dockerfile: spec.dockerfile,
            t: spec.tag,
            labels: spec.labels,
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let stream = self
            .docker
            .build_image(options, None, Some(archive))
            .map_ok(into_chunk)
            .map_err(EngineError::from);
        Ok(stream.boxed())
    }

    async fn inspect_image(&self, reference: &str) -> EngineResult<Option<ImageInfo>> {
        match self.docker.inspect_image(reference).await {
            Ok(image) => Ok(Some(ImageInfo {
                id: image.id.unwrap_or_default(),
                tags: image.repo_tags.unwrap_or_default(),
                labels: image
                    .config
                    .and_then(|config| config.labels)
                    .unwrap_or_default(),
            })),
            Err(e) => {
                let err = EngineError::from(e);
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn list_images(&self, label_filter: &str) -> EngineResult<Vec<ImageInfo>> {
        let options = ListImagesOptions::<String> {
            all: false,
            filters: label_filters(label_filter),
            ..Default::default()
        };
        let images = self.docker.list_images(Some(options)).await?;
        Ok(images
            .into_iter()
            .map(|image| ImageInfo {
                id: image.id,
                tags: image.repo_tags,
                labels: image.labels,
            })
            .collect())
    }

    #[instrument(skip(self, spec), fields(image = %spec.image, port = spec.published_port))]
    async fn run_container(&self, spec: &RunSpec) -> EngineResult<String> {
        let port = format!("{}/tcp", spec.published_port);
        let host_config = HostConfig {
            port_bindings: Some(HashMap::from([(
                port.clone(),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(spec.published_port.to_string()),
                }]),
            )])),
            ..Default::default()
        };
        let config = ContainerConfig {
            image: Some(spec.image.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(HashMap::from([(port, HashMap::new())])),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container::<String, String>(None, config)
            .await?;
        debug!(container_id = %created.id, "Container created");

        self.docker
            .start_container::<String>(&created.id, None)
            .await?;
        Ok(created.id)
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<Option<ContainerInfo>> {
        let inspected = match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspected) => inspected,
            Err(e) => {
                let err = EngineError::from(e);
                return if err.is_not_found() { Ok(None) } else { Err(err) };
            }
        };

        let (image, labels) = inspected
            .config
            .map(|config| {
                (
                    config.image.unwrap_or_default(),
                    config.labels.unwrap_or_default(),
                )
            })
            .unwrap_or_default();
        let status = inspected
            .state
            .and_then(|state| state.status)
            .map(|status| status.to_string())
            .unwrap_or_default();

        Ok(Some(ContainerInfo {
            id: inspected.id.unwrap_or_default(),
            name: inspected
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image,
            status,
            labels,
        }))
    }

    async fn list_containers(&self, label_filter: &str) -> EngineResult<Vec<ContainerInfo>> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: label_filters(label_filter),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers.into_iter().map(summary_into_info).collect())
    }

    async fn container_logs(&self, id: &str) -> EngineResult<Vec<u8>> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };
        let mut stream = self.docker.logs(id, Some(options));
        let mut output = Vec::new();
        while let Some(entry) = stream.next().await {
            output.extend_from_slice(&entry?.into_bytes());
        }
        Ok(output)
    }
}
