use chrono::Utc;
use serde::{Deserialize, Serialize};
use space_dock_common::{
    BuildProvenance, ContainerRecord, EnvironmentDescriptor, ImageRecord, Result, SpaceDockError,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::builder::ImageBuildManager;
use crate::config::OrchestratorConfig;
use crate::docker::DockerEngine;
use crate::dockerfile::{resolve_packages, synthesize};
use crate::engine::ContainerEngine;
use crate::index::ImageIndex;
use crate::launcher::ContainerLauncher;
use crate::registry::FleetRegistry;
use crate::repository::{GitFetcher, RepositoryFetcher};

/// Outcome of provisioning an image from a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedImage {
    pub image: ImageRecord,
    /// Build context directory name, also the image's tag.
    pub repository_id: String,
    pub installed_packages: Vec<String>,
    /// Requested package keys the package table does not know.
    pub ignored_packages: Vec<String>,
}

/// Entry point for every lifecycle operation: one per process, shared by
/// handle across requests.
pub struct SpaceDock {
    config: OrchestratorConfig,
    fetcher: Arc<dyn RepositoryFetcher>,
    builder: ImageBuildManager,
    launcher: ContainerLauncher,
    registry: FleetRegistry,
}

impl SpaceDock {
    pub fn new(
        config: OrchestratorConfig,
        engine: Arc<dyn ContainerEngine>,
        fetcher: Arc<dyn RepositoryFetcher>,
    ) -> Self {
        let index = Arc::new(ImageIndex::new());
        Self {
            builder: ImageBuildManager::new(engine.clone(), index.clone(), config.owner.clone()),
            launcher: ContainerLauncher::new(
                engine.clone(),
                config.owner.clone(),
                config.published_port,
            ),
            registry: FleetRegistry::new(engine, index, config.owner.clone()),
            fetcher,
            config,
        }
    }

    /// Wires the local Docker daemon and the `git` client.
    pub fn with_docker(config: OrchestratorConfig) -> Result<Self> {
        let engine = DockerEngine::connect_with_local_defaults()
            .map_err(|e| SpaceDockError::Engine(e.to_string()))?;
        let fetcher = GitFetcher::new(config.git_binary.clone());
        Ok(Self::new(config, Arc::new(engine), Arc::new(fetcher)))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Clones `repository_url`, writes the Dockerfile for `descriptor` and
    /// builds it. The context directory is kept on failure.
    #[instrument(skip(self, descriptor), fields(base_image = %descriptor.base_image()))]
    pub async fn create_image(
        &self,
        repository_url: &str,
        descriptor: &EnvironmentDescriptor,
    ) -> Result<CreatedImage> {
        let repository_id = Uuid::new_v4().to_string();
        let repos_dir = &self.config.repos_dir;
        tokio::fs::create_dir_all(repos_dir)
            .await
            .map_err(|e| SpaceDockError::ContextUnavailable {
                path: repos_dir.clone(),
                reason: e.to_string(),
            })?;

        let context = self
            .fetcher
            .fetch(repository_url, &repos_dir.join(&repository_id))
            .await?;
        info!(%repository_id, context = %context.display(), "Repository fetched");

        synthesize(descriptor, &context)?;
        let packages = resolve_packages(descriptor.packages());

        let provenance = BuildProvenance {
            repository_id: repository_id.clone(),
            repository_url: repository_url.to_string(),
            base_image: descriptor.base_image().to_string(),
            packages: packages.installed.clone(),
            built_at: Utc::now(),
        };
        let image = self
            .builder
            .build(&context, &repository_id, Some(provenance))
            .await?;

        if self.config.cleanup_contexts {
            remove_context(&context).await;
        }

        Ok(CreatedImage {
            image,
            repository_id,
            installed_packages: packages.installed,
            ignored_packages: packages.ignored,
        })
    }

    /// Launches an environment from an image short id or any other reference.
    pub async fn create_container(&self, image: &str) -> Result<ContainerRecord> {
        self.launcher.launch(image).await
    }

    pub async fn container_logs(&self, container_id: &str) -> Result<Vec<String>> {
        self.registry.container_logs(container_id).await
    }

    pub async fn build_log(&self, image_short_id: &str) -> Result<Vec<String>> {
        self.registry.get_build_log(image_short_id).await
    }

    pub async fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
        self.registry.list_owned_containers().await
    }

    pub async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        self.registry.list_owned_images().await
    }

    pub async fn container(&self, container_id: &str) -> Result<ContainerRecord> {
        self.registry.get_container(container_id).await
    }
}

async fn remove_context(context: &Path) {
    match tokio::fs::remove_dir_all(context).await {
        Ok(()) => info!(context = %context.display(), "Build context removed"),
        Err(e) => warn!(context = %context.display(), error = %e, "Failed to remove build context"),
    }
}
