use space_dock_common::{ContainerRecord, ImageRecord, OwnerLabel, Result, SpaceDockError};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::engine::{ContainerEngine, ContainerInfo, EngineError};
use crate::index::ImageIndex;
use crate::launcher::container_record;

fn engine_error(e: EngineError) -> SpaceDockError {
    SpaceDockError::Engine(e.to_string())
}

/// Read side of the fleet: what this system owns, as reported by the engine,
/// joined with what this process remembers about its own builds.
///
/// Ownership is decided by the owner label alone, for containers and images
/// alike.
pub struct FleetRegistry {
    engine: Arc<dyn ContainerEngine>,
    index: Arc<ImageIndex>,
    owner: OwnerLabel,
}

impl FleetRegistry {
    pub fn new(engine: Arc<dyn ContainerEngine>, index: Arc<ImageIndex>, owner: OwnerLabel) -> Self {
        Self {
            engine,
            index,
            owner,
        }
    }

    /// Every owned container in any state, in engine order.
    #[instrument(skip(self))]
    pub async fn list_owned_containers(&self) -> Result<Vec<ContainerRecord>> {
        let containers = self
            .engine
            .list_containers(&self.owner.filter())
            .await
            .map_err(engine_error)?;
        debug!(count = containers.len(), "Listed owned containers");
        Ok(containers.into_iter().map(container_record).collect())
    }

    async fn owned_container(&self, id: &str) -> Result<ContainerInfo> {
        match self.engine.inspect_container(id).await.map_err(engine_error)? {
            Some(info) if self.owner.is_carried_by(&info.labels) => Ok(info),
            Some(_) => {
                debug!(%id, "Container exists but is not owned");
                Err(SpaceDockError::NotFound(format!("container {id}")))
            }
            None => Err(SpaceDockError::NotFound(format!("container {id}"))),
        }
    }

    /// Resolves an owned container by id, short id or name.
    #[instrument(skip(self))]
    pub async fn get_container(&self, id: &str) -> Result<ContainerRecord> {
        self.owned_container(id).await.map(container_record)
    }

    /// Stdout and stderr of an owned container, one entry per line.
    #[instrument(skip(self))]
    pub async fn container_logs(&self, id: &str) -> Result<Vec<String>> {
        let info = self.owned_container(id).await?;
        let raw = self
            .engine
            .container_logs(&info.id)
            .await
            .map_err(engine_error)?;
        Ok(String::from_utf8_lossy(&raw)
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect())
    }

    /// Owned images: this process's builds first, in build order and with
    /// their logs, then labelled engine images this process did not build.
    /// Builds whose image has since disappeared from the engine are left out.
    #[instrument(skip(self))]
    pub async fn list_owned_images(&self) -> Result<Vec<ImageRecord>> {
        let engine_images = self
            .engine
            .list_images(&self.owner.filter())
            .await
            .map_err(engine_error)?;
        let on_engine: HashSet<&str> = engine_images.iter().map(|i| i.id.as_str()).collect();

        let mut records: Vec<ImageRecord> = self
            .index
            .records()
            .await
            .into_iter()
            .filter(|record| on_engine.contains(record.id.as_str()))
            .collect();
        let known: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();

        records.extend(
            engine_images
                .iter()
                .filter(|image| !known.contains(&image.id))
                .map(|image| ImageRecord::new(image.id.clone(), image.tags.clone(), Vec::new(), None)),
        );
        Ok(records)
    }

    /// Log lines of an image built by this process instance.
    pub async fn get_build_log(&self, image_short_id: &str) -> Result<Vec<String>> {
        self.index
            .build_log(image_short_id)
            .await
            .ok_or_else(|| SpaceDockError::NotFound(format!("build log for image {image_short_id}")))
    }
}
