// Re-export dependencies used in public interfaces of common types

use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
use thiserror::Error;
pub use uuid;

/// Length of the abbreviated engine identifiers used for display and lookup.
pub const SHORT_ID_LEN: usize = 12;

/// In-container path the repository is copied to and editors attach to.
pub const APP_DIR: &str = "/app";

#[derive(Error, Debug)]
pub enum SpaceDockError {
    #[error("Clone of {url} failed: {reason}")]
    CloneFailed { url: String, reason: String },

    #[error("Build context {} unavailable: {reason}", .path.display())]
    ContextUnavailable { path: PathBuf, reason: String },

    #[error("Image build failed: {reason}")]
    BuildFailed {
        reason: String,
        partial_log: Vec<String>,
    },

    #[error("Launch of {image} failed: {reason}")]
    LaunchFailed { image: String, reason: String },

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Environment Descriptor Invalid: {0}")]
    InvalidDescriptor(String),

    #[error("Engine Error: {0}")]
    Engine(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

// Define the primary Result type for space-dock operations
pub type Result<T> = std::result::Result<T, SpaceDockError>;

/// Abbreviates an engine identifier, dropping any `sha256:` digest prefix.
pub fn short_id(id: &str) -> String {
    let digest = id.strip_prefix("sha256:").unwrap_or(id);
    digest.chars().take(SHORT_ID_LEN).collect()
}

/// Key/value label marking containers and images as managed by this system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerLabel {
    pub key: String,
    pub value: String,
}

impl Default for OwnerLabel {
    fn default() -> Self {
        Self {
            key: "manager".to_string(),
            value: "space-dock".to_string(),
        }
    }
}

impl OwnerLabel {
    /// Engine label filter expression, `key=value`.
    pub fn filter(&self) -> String {
        format!("{}={}", self.key, self.value)
    }

    pub fn as_map(&self) -> HashMap<String, String> {
        HashMap::from([(self.key.clone(), self.value.clone())])
    }

    pub fn is_carried_by(&self, labels: &HashMap<String, String>) -> bool {
        labels.get(&self.key).is_some_and(|v| *v == self.value)
    }
}

impl Display for OwnerLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.filter())
    }
}

/// Declarative description of a development environment image.
///
/// Fields are private so a descriptor cannot change after validation. Every
/// command ends up verbatim on a single Dockerfile line, so line breaks are
/// rejected anywhere in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "DescriptorFields")]
pub struct EnvironmentDescriptor {
    base_image: String,
    update_command: String,
    packages: Vec<String>,
    build_command: String,
    start_command: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorFields {
    base_image: String,
    update_command: String,
    #[serde(default)]
    packages: Vec<String>,
    build_command: String,
    start_command: String,
}

impl TryFrom<DescriptorFields> for EnvironmentDescriptor {
    type Error = SpaceDockError;

    fn try_from(fields: DescriptorFields) -> Result<Self> {
        Self::new(
            fields.base_image,
            fields.update_command,
            fields.packages,
            fields.build_command,
            fields.start_command,
        )
    }
}

impl EnvironmentDescriptor {
    pub fn new(
        base_image: impl Into<String>,
        update_command: impl Into<String>,
        packages: Vec<String>,
        build_command: impl Into<String>,
        start_command: impl Into<String>,
    ) -> Result<Self> {
        let descriptor = Self {
            base_image: base_image.into(),
            update_command: update_command.into(),
            packages,
            build_command: build_command.into(),
            start_command: start_command.into(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("baseImage", &self.base_image),
            ("updateCommand", &self.update_command),
            ("buildCommand", &self.build_command),
            ("startCommand", &self.start_command),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(SpaceDockError::InvalidDescriptor(format!(
                    "{field} must not be empty"
                )));
            }
            reject_line_breaks(field, value)?;
        }
        for package in &self.packages {
            reject_line_breaks("packages", package)?;
        }
        Ok(())
    }

    pub fn base_image(&self) -> &str {
        &self.base_image
    }

    pub fn update_command(&self) -> &str {
        &self.update_command
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn build_command(&self) -> &str {
        &self.build_command
    }

    pub fn start_command(&self) -> &str {
        &self.start_command
    }
}

fn reject_line_breaks(field: &str, value: &str) -> Result<()> {
    if value.contains(['\n', '\r']) {
        return Err(SpaceDockError::InvalidDescriptor(format!(
            "{field} must be a single line"
        )));
    }
    Ok(())
}

/// Where an image built by this process came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildProvenance {
    pub repository_id: String,
    pub repository_url: String,
    pub base_image: String,
    /// Package keys that contributed install directives.
    pub packages: Vec<String>,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    pub short_id: String,
    pub tags: Vec<String>,
    pub build_log: Vec<String>,
    pub provenance: Option<BuildProvenance>,
}

impl ImageRecord {
    pub fn new(
        id: String,
        tags: Vec<String>,
        build_log: Vec<String>,
        provenance: Option<BuildProvenance>,
    ) -> Self {
        Self {
            short_id: short_id(&id),
            id,
            tags,
            build_log,
            provenance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub id: String,
    pub short_id: String,
    pub name: String,
    /// Image reference the container was started from.
    pub image: String,
    pub status: String,
    pub connection_uri: String,
}

impl Display for ContainerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ContainerRecord(short_id: {}, name: {}, image: {}, status: {})",
            self.short_id, self.name, self.image, self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_deserialization() {
        let json = r#"{
            "baseImage": "alpine:3.18",
            "updateCommand": "apk update",
            "packages": ["git", "gnupg"],
            "buildCommand": "true",
            "startCommand": "echo hi"
        }"#;
        let descriptor: EnvironmentDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.base_image(), "alpine:3.18");
        assert_eq!(descriptor.packages(), ["git", "gnupg"]);
        assert_eq!(descriptor.start_command(), "echo hi");

        let round: serde_json::Value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(round["updateCommand"], "apk update");
    }

    #[test]
    fn test_descriptor_packages_default_to_empty() {
        let json = r#"{"baseImage":"alpine","updateCommand":"apk update","buildCommand":"true","startCommand":"sh"}"#;
        let descriptor: EnvironmentDescriptor = serde_json::from_str(json).unwrap();
        assert!(descriptor.packages().is_empty());
    }

    #[test]
    fn test_descriptor_rejects_empty_base_image() {
        let err = EnvironmentDescriptor::new(" ", "apk update", vec![], "true", "sh").unwrap_err();
        assert!(matches!(err, SpaceDockError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_descriptor_rejects_line_breaks() {
        let err = EnvironmentDescriptor::new(
            "alpine",
            "apk update",
            vec![],
            "true\nUSER root",
            "sh",
        )
        .unwrap_err();
        assert!(err.to_string().contains("buildCommand"));

        let json = r#"{"baseImage":"alpine","updateCommand":"apk update","packages":["git\r"],"buildCommand":"true","startCommand":"sh"}"#;
        assert!(serde_json::from_str::<EnvironmentDescriptor>(json).is_err());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(
            short_id("sha256:0123456789abcdef0123456789abcdef"),
            "0123456789ab"
        );
        assert_eq!(short_id("fedcba9876543210fedcba"), "fedcba987654");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_owner_label() {
        let label = OwnerLabel::default();
        assert_eq!(label.filter(), "manager=space-dock");

        let mut labels = HashMap::new();
        assert!(!label.is_carried_by(&labels));
        labels.insert("manager".to_string(), "other".to_string());
        assert!(!label.is_carried_by(&labels));
        labels.insert("manager".to_string(), "space-dock".to_string());
        assert!(label.is_carried_by(&labels));
    }

    #[test]
    fn test_image_record_short_id() {
        let record = ImageRecord::new(
            "sha256:aaaaaaaaaaaabbbbbbbb".to_string(),
            vec!["repo:latest".to_string()],
            vec![],
            None,
        );
        assert_eq!(record.short_id, "aaaaaaaaaaaa");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("shortId"));
    }

    #[test]
    fn test_build_time_travels_with_provenance() {
        let built_at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = ImageRecord::new(
            "sha256:aaaaaaaaaaaabbbbbbbb".to_string(),
            vec![],
            vec![],
            Some(BuildProvenance {
                repository_id: "repo".to_string(),
                repository_url: "https://example.com/repo.git".to_string(),
                base_image: "alpine:3.18".to_string(),
                packages: vec!["git".to_string()],
                built_at,
            }),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("builtAt").is_none());
        assert_eq!(json["provenance"]["builtAt"], "2024-05-01T12:00:00Z");
    }
}
