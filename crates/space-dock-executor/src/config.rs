use space_dock_common::OwnerLabel;
use std::path::PathBuf;

/// Settings for the orchestration layer.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Parent directory of the per-build context directories.
    pub repos_dir: PathBuf,
    pub owner: OwnerLabel,
    /// Container port published 1:1 on the host for every environment.
    pub published_port: u16,
    /// Remove a build context once its image built successfully.
    pub cleanup_contexts: bool,
    pub git_binary: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            repos_dir: PathBuf::from("repos"),
            owner: OwnerLabel::default(),
            published_port: 8080,
            cleanup_contexts: false,
            git_binary: "git".to_string(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl OrchestratorConfig {
    /// Reads `SPACE_DOCK_*` variables, falling back to the defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            repos_dir: lookup("SPACE_DOCK_REPOS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.repos_dir),
            owner: OwnerLabel {
                key: lookup("SPACE_DOCK_OWNER_LABEL_KEY").unwrap_or(defaults.owner.key),
                value: lookup("SPACE_DOCK_OWNER_LABEL_VALUE").unwrap_or(defaults.owner.value),
            },
            published_port: lookup("SPACE_DOCK_PUBLISHED_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.published_port),
            cleanup_contexts: lookup("SPACE_DOCK_CLEANUP_CONTEXTS")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.cleanup_contexts),
            git_binary: lookup("SPACE_DOCK_GIT_BINARY").unwrap_or(defaults.git_binary),
        }
    }
}
