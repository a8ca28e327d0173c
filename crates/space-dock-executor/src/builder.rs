use futures::StreamExt;
use space_dock_common::{BuildProvenance, ImageRecord, OwnerLabel, Result, SpaceDockError};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::dockerfile::DOCKERFILE_NAME;
use crate::engine::{ContainerEngine, EngineError, ImageBuildSpec};
use crate::index::ImageIndex;
use crate::keyed_lock::KeyedLocks;

/// Builds images from prepared contexts and records them in the [`ImageIndex`].
pub struct ImageBuildManager {
    engine: Arc<dyn ContainerEngine>,
    index: Arc<ImageIndex>,
    owner: OwnerLabel,
    locks: KeyedLocks,
}

fn build_failed(reason: impl ToString, partial_log: Vec<String>) -> SpaceDockError {
    SpaceDockError::BuildFailed {
        reason: reason.to_string(),
        partial_log,
    }
}

impl ImageBuildManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, index: Arc<ImageIndex>, owner: OwnerLabel) -> Self {
        Self {
            engine,
            index,
            owner,
            locks: KeyedLocks::new(),
        }
    }

    /// Builds `context` as `tag`, draining the engine's output stream.
    ///
    /// Only successful builds reach the index. On failure the log collected so
    /// far travels with the error.
    #[instrument(skip(self, context, provenance), fields(context = %context.display()))]
    pub async fn build(
        &self,
        context: &Path,
        tag: &str,
        provenance: Option<BuildProvenance>,
    ) -> Result<ImageRecord> {
        let _guard = self.locks.lock(tag).await;
        info!("Building image...");

        let spec = ImageBuildSpec {
            context: context.to_path_buf(),
            dockerfile: DOCKERFILE_NAME.to_string(),
            tag: tag.to_string(),
            labels: self.owner.as_map(),
        };

        let mut stream = self.engine.build_image(spec).await.map_err(|e| match e {
            EngineError::Context(io) => SpaceDockError::ContextUnavailable {
                path: context.to_path_buf(),
                reason: io.to_string(),
            },
            other => build_failed(other, Vec::new()),
        })?;

        let mut log = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    error!(error = %e, "Build stream failed");
                    return Err(build_failed(e, log));
                }
            };
            if let Some(text) = chunk.stream {
                let line = text.trim_end_matches(['\n', '\r']);
                if !line.is_empty() {
                    debug!(target: "space_dock_executor::build_output", "{line}");
                    log.push(line.to_string());
                }
            }
            if let Some(message) = chunk.error {
                error!(%message, "Image build reported an error");
                return Err(build_failed(message, log));
            }
        }

        let image = self
            .engine
            .inspect_image(tag)
            .await
            .map_err(|e| build_failed(e, log.clone()))?
            .ok_or_else(|| build_failed(format!("no image tagged {tag} after build"), log.clone()))?;

        let record = ImageRecord::new(image.id, image.tags, log, provenance);
        self.index.insert(record.clone()).await;
        info!(image_id = %record.id, short_id = %record.short_id, "Image built");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BuildChunk;
    use crate::test_utils::MockEngine;
    use std::time::Duration;
    use tokio::time::Instant;

    fn write_dockerfile(dir: &Path, base: &str) {
        std::fs::write(
            dir.join(DOCKERFILE_NAME),
            format!("FROM {base}\nWORKDIR /app\nCOPY . .\nRUN apk update\n\nRUN true\nCMD echo hi\n"),
        )
        .unwrap();
    }

    fn manager(engine: Arc<MockEngine>) -> (ImageBuildManager, Arc<ImageIndex>) {
        let index = Arc::new(ImageIndex::new());
        (
            ImageBuildManager::new(engine, index.clone(), OwnerLabel::default()),
            index,
        )
    }

    #[tokio::test]
    async fn test_build_records_log_and_image() {
        let engine = Arc::new(MockEngine::new());
        let (manager, index) = manager(engine.clone());
        let ctx = tempfile::tempdir().unwrap();
        write_dockerfile(ctx.path(), "alpine:3.18");

        let record = manager.build(ctx.path(), "repo-1", None).await.unwrap();

        assert_eq!(record.tags, ["repo-1:latest"]);
        assert_eq!(record.short_id.len(), 12);
        assert!(record.build_log.iter().any(|l| l.contains("FROM alpine:3.18")));
        // status-only chunks are not part of the log
        assert!(!record.build_log.iter().any(|l| l.contains("Pulling")));
        assert!(record.build_log.iter().all(|l| !l.ends_with('\n')));
        assert_eq!(index.build_log(&record.short_id).await.unwrap(), record.build_log);

        let image = engine.image(&record.id).unwrap();
        assert!(OwnerLabel::default().is_carried_by(&image.labels));
    }

    #[tokio::test]
    async fn test_missing_base_image_fails_with_partial_log() {
        let engine = Arc::new(MockEngine::new());
        engine.mark_missing("does-not-exist:0.0");
        let (manager, index) = manager(engine);
        let ctx = tempfile::tempdir().unwrap();
        write_dockerfile(ctx.path(), "does-not-exist:0.0");

        let err = manager.build(ctx.path(), "repo-2", None).await.unwrap_err();
        match err {
            SpaceDockError::BuildFailed { reason, partial_log } => {
                assert!(reason.contains("does-not-exist"));
                assert!(partial_log[0].contains("FROM does-not-exist:0.0"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_context_is_unavailable() {
        let engine = Arc::new(MockEngine::new());
        let (manager, _) = manager(engine);
        let root = tempfile::tempdir().unwrap();
        let err = manager
            .build(&root.path().join("absent"), "repo-3", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SpaceDockError::ContextUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_scripted_stream_error_keeps_partial_log() {
        let engine = Arc::new(MockEngine::new());
        engine.script_build(vec![
            BuildChunk::output("Step 1/3 : FROM alpine\n"),
            BuildChunk::status("Downloading"),
            BuildChunk::output("\n"),
            BuildChunk::output("Step 2/3 : RUN false\n"),
            BuildChunk::failure("The command '/bin/sh -c false' returned a non-zero code: 1"),
        ]);
        let (manager, index) = manager(engine);
        let ctx = tempfile::tempdir().unwrap();

        let err = manager.build(ctx.path(), "repo-4", None).await.unwrap_err();
        let SpaceDockError::BuildFailed { partial_log, .. } = err else {
            panic!("expected BuildFailed");
        };
        assert_eq!(partial_log, ["Step 1/3 : FROM alpine", "Step 2/3 : RUN false"]);
        assert!(index.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_builds_of_one_tag_run_one_after_the_other() {
        let engine = Arc::new(MockEngine::new());
        engine.set_latency(Duration::from_millis(100));
        let (manager, index) = manager(engine);
        let ctx = tempfile::tempdir().unwrap();
        write_dockerfile(ctx.path(), "alpine:3.18");

        let start = Instant::now();
        let (first, second) = tokio::join!(
            manager.build(ctx.path(), "shared", None),
            manager.build(ctx.path(), "shared", None)
        );
        first.unwrap();
        second.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));

        let start = Instant::now();
        let (left, right) = tokio::join!(
            manager.build(ctx.path(), "left", None),
            manager.build(ctx.path(), "right", None)
        );
        left.unwrap();
        right.unwrap();
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(index.len().await, 4);
    }
}
