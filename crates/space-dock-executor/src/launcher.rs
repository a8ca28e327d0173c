use space_dock_common::{short_id, ContainerRecord, OwnerLabel, Result, SpaceDockError};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::connection::connection_uri;
use crate::engine::{ContainerEngine, ContainerInfo, RunSpec};
use crate::keyed_lock::KeyedLocks;

/// Normalizes an engine container report, computing its connection URI.
pub fn container_record(info: ContainerInfo) -> ContainerRecord {
    let short_id = short_id(&info.id);
    ContainerRecord {
        connection_uri: connection_uri(&short_id),
        id: info.id,
        short_id,
        name: info.name,
        image: info.image,
        status: info.status,
    }
}

/// Starts labelled, port-published containers from built images.
pub struct ContainerLauncher {
    engine: Arc<dyn ContainerEngine>,
    owner: OwnerLabel,
    published_port: u16,
    locks: KeyedLocks,
}

impl ContainerLauncher {
    pub fn new(engine: Arc<dyn ContainerEngine>, owner: OwnerLabel, published_port: u16) -> Self {
        Self {
            engine,
            owner,
            published_port,
            locks: KeyedLocks::new(),
        }
    }

    /// Starts a detached container from `image` and returns as soon as the
    /// engine reports it started. No readiness check is made.
    #[instrument(skip(self))]
    pub async fn launch(&self, image: &str) -> Result<ContainerRecord> {
        let _guard = self.locks.lock(image).await;
        info!("Launching container with image '{}'...", image);

        let launch_failed = |reason: String| SpaceDockError::LaunchFailed {
            image: image.to_string(),
            reason,
        };

        let spec = RunSpec {
            image: image.to_string(),
            labels: self.owner.as_map(),
            published_port: self.published_port,
        };
        let container_id = self.engine.run_container(&spec).await.map_err(|e| {
            error!(error = %e, "Engine rejected run request");
            launch_failed(e.to_string())
        })?;

        let info = self
            .engine
            .inspect_container(&container_id)
            .await
            .map_err(|e| launch_failed(e.to_string()))?
            .ok_or_else(|| launch_failed(format!("container {container_id} vanished after start")))?;

        let record = container_record(info);
        info!(container_id = %record.id, name = %record.name, "Container started");
        Ok(record)
    }
}
