//! Fetching repository contents into a build context.

use async_trait::async_trait;
use space_dock_common::{Result, SpaceDockError};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info, instrument};
use url::Url;

#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Populates `destination` with the repository at `url` and returns the
    /// local path. `destination` must not exist yet.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf>;
}

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "git", "ssh", "file"];

fn clone_failed(url: &str, reason: impl ToString) -> SpaceDockError {
    SpaceDockError::CloneFailed {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Accepts URLs with a known transport scheme and scp-like `user@host:path`.
pub fn validate_repository_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(clone_failed(url, "repository URL is empty"));
    }
    // Leading dashes would be parsed by git as options.
    if url.starts_with('-') {
        return Err(clone_failed(url, "repository URL must not start with '-'"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(clone_failed(url, "repository URL must not contain whitespace"));
    }

    match Url::parse(url) {
        Ok(parsed) if ALLOWED_SCHEMES.contains(&parsed.scheme()) => Ok(()),
        Ok(parsed) => Err(clone_failed(
            url,
            format!("unsupported scheme '{}'", parsed.scheme()),
        )),
        Err(_) if is_scp_like(url) => Ok(()),
        Err(e) => Err(clone_failed(url, e)),
    }
}

fn is_scp_like(url: &str) -> bool {
    let Some((authority, path)) = url.split_once(':') else {
        return false;
    };
    let host = authority.rsplit('@').next().unwrap_or(authority);
    !host.is_empty() && !path.is_empty() && !authority.contains('/')
}

/// Clones with the `git` command line client.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    git_binary: String,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitFetcher {
    pub fn new(git_binary: impl Into<String>) -> Self {
        Self {
            git_binary: git_binary.into(),
        }
    }
}

#[async_trait]
impl RepositoryFetcher for GitFetcher {
    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    async fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf> {
        validate_repository_url(url)?;
        info!("Cloning repository...");

        let output = Command::new(&self.git_binary)
            .arg("clone")
            .arg("--")
            .arg(url)
            .arg(destination)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| clone_failed(url, format!("failed to run {}: {e}", self.git_binary)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            error!(status = %output.status, stderr = %stderr.trim(), "git clone failed");
            return Err(clone_failed(url, stderr.trim()));
        }
        debug!(stderr = %stderr.trim(), "git clone finished");
        Ok(destination.to_path_buf())
    }
}
