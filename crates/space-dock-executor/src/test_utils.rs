//! Test doubles for the engine and repository seams, plus helpers for
//! conditional execution of tests that need a real Docker daemon.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use space_dock_common::{Result, SpaceDockError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::dockerfile::DOCKERFILE_NAME;
use crate::engine::{
    BuildChunk, ContainerEngine, ContainerInfo, EngineError, EngineResult, ImageBuildSpec,
    ImageInfo, RunSpec,
};
use crate::repository::RepositoryFetcher;

pub fn has_docker() -> bool {
    // Check if docker command exists
    Command::new("docker")
        .arg("info")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

pub fn has_git() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Macro to skip tests when requirements aren't met
#[macro_export]
macro_rules! require_docker {
    () => {
        if !$crate::test_utils::has_docker() {
            eprintln!("Test ignored: Docker not available");
            return;
        }
    };
}

fn random_digest() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn parse_label_filter(filter: &str) -> (String, String) {
    match filter.split_once('=') {
        Some((key, value)) => (key.to_string(), value.to_string()),
        None => (filter.to_string(), String::new()),
    }
}

fn carries(labels: &HashMap<String, String>, filter: &str) -> bool {
    let (key, value) = parse_label_filter(filter);
    labels.get(&key).is_some_and(|v| *v == value)
}

#[derive(Default)]
struct MockState {
    images: Vec<ImageInfo>,
    containers: Vec<ContainerInfo>,
    missing: HashSet<String>,
    scripted_build: Option<Vec<BuildChunk>>,
    run_rejection: Option<String>,
    runs: Vec<RunSpec>,
    logs: HashMap<String, Vec<u8>>,
    next_container: usize,
    latency: Option<Duration>,
}

impl MockState {
    fn resolve_image(&self, reference: &str) -> Option<&ImageInfo> {
        let bare = reference.strip_prefix("sha256:").unwrap_or(reference);
        let latest = format!("{reference}:latest");
        self.images.iter().find(|image| {
            image.id == reference
                || image.tags.iter().any(|t| *t == reference || *t == latest)
                || (bare.len() >= 4 && image.id.trim_start_matches("sha256:").starts_with(bare))
        })
    }

    fn resolve_container(&self, reference: &str) -> Option<&ContainerInfo> {
        self.containers.iter().find(|c| {
            c.id == reference
                || c.name == reference
                || (reference.len() >= 4 && c.id.starts_with(reference))
        })
    }
}

/// In-memory [`ContainerEngine`] that behaves like a small Docker daemon.
///
/// Builds read the context's Dockerfile and emit one step per instruction;
/// base images registered with [`MockEngine::mark_missing`] fail the build at
/// the `FROM` step the way a failed pull does.
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes builds `FROM image` fail as if the image could not be pulled.
    pub fn mark_missing(&self, image: &str) {
        self.state().missing.insert(image.to_string());
    }

    /// Replaces the next build's output with `chunks`. An image is only
    /// registered when the script contains no error chunk.
    pub fn script_build(&self, chunks: Vec<BuildChunk>) {
        self.state().scripted_build = Some(chunks);
    }

    /// Makes every build and run request take `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    async fn simulate_latency(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Makes every subsequent run request fail with `reason`.
    pub fn reject_runs(&self, reason: &str) {
        self.state().run_rejection = Some(reason.to_string());
    }

    pub fn set_logs(&self, container_id: &str, output: &[u8]) {
        self.state()
            .logs
            .insert(container_id.to_string(), output.to_vec());
    }

    /// Registers an image that this system did not build.
    pub fn add_image(&self, tags: &[&str], labels: HashMap<String, String>) -> ImageInfo {
        let image = ImageInfo {
            id: format!("sha256:{}", random_digest()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            labels,
        };
        self.state().images.push(image.clone());
        image
    }

    pub fn remove_image(&self, id: &str) {
        self.state().images.retain(|image| image.id != id);
    }

    /// Registers a running container that this system did not launch.
    pub fn add_container(&self, image: &str, labels: HashMap<String, String>) -> ContainerInfo {
        let mut state = self.state();
        state.next_container += 1;
        let container = ContainerInfo {
            id: random_digest(),
            name: format!("foreign_{}", state.next_container),
            image: image.to_string(),
            status: "running".to_string(),
            labels,
        };
        state.containers.push(container.clone());
        container
    }

    pub fn image(&self, reference: &str) -> Option<ImageInfo> {
        self.state().resolve_image(reference).cloned()
    }

    pub fn container(&self, reference: &str) -> Option<ContainerInfo> {
        self.state().resolve_container(reference).cloned()
    }

    pub fn runs(&self) -> Vec<RunSpec> {
        self.state().runs.clone()
    }

    fn register_image(&self, spec: &ImageBuildSpec) -> ImageInfo {
        let mut state = self.state();
        let tag = format!("{}:latest", spec.tag);
        // A rebuilt tag moves to the new image, like the real daemon does.
        for image in &mut state.images {
            image.tags.retain(|t| *t != tag);
        }
        let image = ImageInfo {
            id: format!("sha256:{}", random_digest()),
            tags: vec![tag],
            labels: spec.labels.clone(),
        };
        state.images.push(image.clone());
        image
    }

    fn dockerfile_build(&self, spec: &ImageBuildSpec) -> EngineResult<Vec<BuildChunk>> {
        let dockerfile = std::fs::read_to_string(spec.context.join(&spec.dockerfile))?;
        let instructions: Vec<&str> = dockerfile
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        let total = instructions.len();

        let mut chunks = Vec::new();
        for (step, instruction) in instructions.iter().enumerate() {
            chunks.push(BuildChunk::output(format!(
                "Step {}/{total} : {instruction}\n",
                step + 1
            )));
            if let Some(base) = instruction.strip_prefix("FROM ") {
                let base = base.trim();
                if self.state().missing.contains(base) {
                    let repository = base.split(':').next().unwrap_or(base);
                    chunks.push(BuildChunk::failure(format!(
                        "pull access denied for {repository}, repository does not exist or may require 'docker login'"
                    )));
                    return Ok(chunks);
                }
                chunks.push(BuildChunk::status(format!("Pulling from library/{base}")));
            }
            chunks.push(BuildChunk::output(format!(" ---> {}\n", &random_digest()[..12])));
        }

        let image = self.register_image(spec);
        chunks.push(BuildChunk {
            image_id: Some(image.id.clone()),
            ..Default::default()
        });
        chunks.push(BuildChunk::output(format!(
            "Successfully built {}\n",
            &image.id["sha256:".len().."sha256:".len() + 12]
        )));
        chunks.push(BuildChunk::output(format!("Successfully tagged {}\n", image.tags[0])));
        Ok(chunks)
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn build_image(
        &self,
        spec: ImageBuildSpec,
    ) -> EngineResult<BoxStream<'_, EngineResult<BuildChunk>>> {
        self.simulate_latency().await;
        if !spec.context.is_dir() {
            return Err(EngineError::Context(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", spec.context.display()),
            )));
        }

        let scripted = self.state().scripted_build.take();
        let chunks = match scripted {
            Some(chunks) => {
                if chunks.iter().all(|c| c.error.is_none()) {
                    self.register_image(&spec);
                }
                chunks
            }
            None => self.dockerfile_build(&spec)?,
        };
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn inspect_image(&self, reference: &str) -> EngineResult<Option<ImageInfo>> {
        Ok(self.image(reference))
    }

    async fn list_images(&self, label_filter: &str) -> EngineResult<Vec<ImageInfo>> {
        Ok(self
            .state()
            .images
            .iter()
            .filter(|image| carries(&image.labels, label_filter))
            .cloned()
            .collect())
    }

    async fn run_container(&self, spec: &RunSpec) -> EngineResult<String> {
        self.simulate_latency().await;
        let mut state = self.state();
        if let Some(reason) = &state.run_rejection {
            return Err(EngineError::Rejected(reason.clone()));
        }
        if state.resolve_image(&spec.image).is_none() {
            return Err(EngineError::Rejected(format!(
                "No such image: {}",
                spec.image
            )));
        }

        state.next_container += 1;
        let container = ContainerInfo {
            id: random_digest(),
            name: format!("space_dock_mock_{}", state.next_container),
            image: spec.image.clone(),
            status: "running".to_string(),
            labels: spec.labels.clone(),
        };
        state.logs.insert(
            container.id.clone(),
            format!("starting {}\nready\n", spec.image).into_bytes(),
        );
        state.runs.push(spec.clone());
        state.containers.push(container.clone());
        Ok(container.id)
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<Option<ContainerInfo>> {
        Ok(self.container(id))
    }

    async fn list_containers(&self, label_filter: &str) -> EngineResult<Vec<ContainerInfo>> {
        Ok(self
            .state()
            .containers
            .iter()
            .filter(|c| carries(&c.labels, label_filter))
            .cloned()
            .collect())
    }

    async fn container_logs(&self, id: &str) -> EngineResult<Vec<u8>> {
        let state = self.state();
        let container = state
            .resolve_container(id)
            .ok_or_else(|| EngineError::Rejected(format!("No such container: {id}")))?;
        Ok(state.logs.get(&container.id).cloned().unwrap_or_default())
    }
}

/// [`RepositoryFetcher`] that materialises a fixed file tree instead of cloning.
pub struct StaticFetcher {
    files: Vec<(String, String)>,
    failure: Option<String>,
    fetched: Mutex<Vec<String>>,
}

impl Default for StaticFetcher {
    fn default() -> Self {
        Self::new(&[
            ("package.json", r#"{"name":"demo","scripts":{"dev":"node index.js"}}"#),
            ("index.js", "console.log('hi')\n"),
        ])
    }
}

impl StaticFetcher {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(name, contents)| (name.to_string(), contents.to_string()))
                .collect(),
            failure: None,
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// A fetcher whose every clone fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl RepositoryFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        if let Some(reason) = &self.failure {
            return Err(SpaceDockError::CloneFailed {
                url: url.to_string(),
                reason: reason.clone(),
            });
        }
        tokio::fs::create_dir_all(destination).await?;
        for (name, contents) in &self.files {
            tokio::fs::write(destination.join(name), contents).await?;
        }
        Ok(destination.to_path_buf())
    }
}

/// Writes a minimal Dockerfile into `dir`, for tests that bypass synthesis.
pub fn write_test_dockerfile(dir: &Path, base_image: &str) {
    let contents = format!("FROM {base_image}\nRUN true\nCMD echo hi\n");
    std::fs::write(dir.join(DOCKERFILE_NAME), contents).expect("write test Dockerfile");
}
