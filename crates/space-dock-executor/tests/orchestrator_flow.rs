//! End-to-end provisioning flows against the in-memory engine.

use space_dock_executor::common::{EnvironmentDescriptor, OwnerLabel, SpaceDockError};
use space_dock_executor::connection::decode_connection_uri;
use space_dock_executor::dockerfile::DOCKERFILE_NAME;
use space_dock_executor::test_utils::{MockEngine, StaticFetcher};
use space_dock_executor::{OrchestratorConfig, SpaceDock};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const REPO_URL: &str = "https://github.com/example/app.git";

fn descriptor(base_image: &str, packages: &[&str]) -> EnvironmentDescriptor {
    EnvironmentDescriptor::new(
        base_image,
        "apk update",
        packages.iter().map(|p| p.to_string()).collect(),
        "npm ci",
        "npm run dev",
    )
    .unwrap()
}

struct Harness {
    engine: Arc<MockEngine>,
    fetcher: Arc<StaticFetcher>,
    dock: SpaceDock,
    repos: TempDir,
}

fn harness_with(fetcher: StaticFetcher, configure: impl FnOnce(&mut OrchestratorConfig)) -> Harness {
    let repos = tempfile::tempdir().unwrap();
    let mut config = OrchestratorConfig {
        repos_dir: repos.path().join("repos"),
        ..OrchestratorConfig::default()
    };
    configure(&mut config);

    let engine = Arc::new(MockEngine::new());
    let fetcher = Arc::new(fetcher);
    let dock = SpaceDock::new(config, engine.clone(), fetcher.clone());
    Harness {
        engine,
        fetcher,
        dock,
        repos,
    }
}

fn harness() -> Harness {
    harness_with(StaticFetcher::default(), |_| {})
}

fn context_dir(h: &Harness, repository_id: &str) -> std::path::PathBuf {
    h.repos.path().join("repos").join(repository_id)
}

fn dockerfile_of(context: &Path) -> String {
    std::fs::read_to_string(context.join(DOCKERFILE_NAME)).unwrap()
}

#[tokio::test]
async fn test_provision_then_launch() {
    let h = harness();
    let created = h
        .dock
        .create_image(REPO_URL, &descriptor("node:current-alpine", &["git", "gnupg"]))
        .await
        .unwrap();

    assert_eq!(h.fetcher.fetched(), [REPO_URL]);
    assert_eq!(created.installed_packages, ["git", "gnupg"]);
    assert!(created.ignored_packages.is_empty());
    assert_eq!(created.image.short_id.len(), 12);
    assert!(created
        .image
        .tags
        .contains(&format!("{}:latest", created.repository_id)));
    let provenance = created.image.provenance.as_ref().unwrap();
    assert_eq!(provenance.repository_url, REPO_URL);
    assert_eq!(provenance.base_image, "node:current-alpine");

    // context is kept by default, with the cloned files next to the Dockerfile
    let context = context_dir(&h, &created.repository_id);
    assert!(context.join("package.json").is_file());
    assert!(dockerfile_of(&context).starts_with("FROM node:current-alpine\n"));

    let container = h.dock.create_container(&created.image.short_id).await.unwrap();
    assert_eq!(
        decode_connection_uri(&container.connection_uri).as_deref(),
        Some(container.short_id.as_str())
    );

    let listed = h.dock.list_containers().await.unwrap();
    assert_eq!(listed, [container.clone()]);
    let logs = h.dock.container_logs(&container.short_id).await.unwrap();
    assert_eq!(logs.last().map(String::as_str), Some("ready"));

    let images = h.dock.list_images().await.unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0], created.image);
    assert_eq!(
        h.dock.build_log(&created.image.short_id).await.unwrap(),
        created.image.build_log
    );
}

#[tokio::test]
async fn test_unknown_packages_are_reported() {
    let h = harness();
    let created = h
        .dock
        .create_image(REPO_URL, &descriptor("alpine:3.18", &["git", "bogus-key"]))
        .await
        .unwrap();

    assert_eq!(created.installed_packages, ["git"]);
    assert_eq!(created.ignored_packages, ["bogus-key"]);
    let dockerfile = dockerfile_of(&context_dir(&h, &created.repository_id));
    assert!(!dockerfile.contains("bogus-key"));
}

#[tokio::test]
async fn test_missing_base_image_fails_build() {
    let h = harness();
    h.engine.mark_missing("nonexistent/base:1");

    let err = h
        .dock
        .create_image(REPO_URL, &descriptor("nonexistent/base:1", &[]))
        .await
        .unwrap_err();
    match err {
        SpaceDockError::BuildFailed {
            reason,
            partial_log,
        } => {
            assert!(reason.contains("pull access denied"));
            assert!(partial_log[0].starts_with("Step 1/"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.dock.list_images().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clone_failure_stops_before_build() {
    let h = harness_with(
        StaticFetcher::failing("repository not found"),
        |_| {},
    );
    let err = h
        .dock
        .create_image(REPO_URL, &descriptor("alpine:3.18", &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, SpaceDockError::CloneFailed { .. }));
    assert!(h.dock.list_images().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cleanup_removes_context_after_success() {
    let h = harness_with(StaticFetcher::default(), |config| {
        config.cleanup_contexts = true;
    });
    let created = h
        .dock
        .create_image(REPO_URL, &descriptor("alpine:3.18", &[]))
        .await
        .unwrap();
    assert!(!context_dir(&h, &created.repository_id).exists());
    assert!(!created.image.build_log.is_empty());
}

#[tokio::test]
async fn test_custom_owner_label_scopes_everything() {
    let h = harness_with(StaticFetcher::default(), |config| {
        config.owner = OwnerLabel {
            key: "team".to_string(),
            value: "platform".to_string(),
        };
    });
    h.engine.add_image(&["unrelated:latest"], OwnerLabel::default().as_map());

    let created = h
        .dock
        .create_image(REPO_URL, &descriptor("alpine:3.18", &[]))
        .await
        .unwrap();
    let container = h.dock.create_container(&created.image.short_id).await.unwrap();

    let images = h.dock.list_images().await.unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].id, created.image.id);

    let labels = h.engine.container(&container.id).unwrap().labels;
    assert_eq!(labels.get("team").map(String::as_str), Some("platform"));
}

#[tokio::test]
async fn test_each_provision_gets_its_own_context() {
    let h = harness();
    let d = descriptor("alpine:3.18", &[]);
    let (first, second) = tokio::join!(
        h.dock.create_image(REPO_URL, &d),
        h.dock.create_image(REPO_URL, &d)
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_ne!(first.repository_id, second.repository_id);
    assert_ne!(first.image.id, second.image.id);
    assert_eq!(h.dock.list_images().await.unwrap().len(), 2);
}
