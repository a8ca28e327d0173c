//! Dockerfile generation from an [`EnvironmentDescriptor`].

use space_dock_common::{EnvironmentDescriptor, Result, SpaceDockError, APP_DIR};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

pub const DOCKERFILE_NAME: &str = "Dockerfile";

// Install commands are based on the Alpine Linux package manager (apk)
const PACKAGE_INSTALL_COMMANDS: &[(&str, &str)] = &[
    ("gnupg", "apk add gnupg"),
    ("git", "apk add git"),
    ("npm:install", "npm install"),
    ("npm:build", "npm run build"),
    ("npm:ci", "npm ci"),
];

pub fn install_command(package: &str) -> Option<&'static str> {
    PACKAGE_INSTALL_COMMANDS
        .iter()
        .find(|(key, _)| *key == package)
        .map(|(_, command)| *command)
}

/// Split of requested package keys into those with an install directive and
/// those the package table does not know.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageResolution {
    pub installed: Vec<String>,
    pub ignored: Vec<String>,
}

pub fn resolve_packages(packages: &[String]) -> PackageResolution {
    let mut resolution = PackageResolution::default();
    for package in packages {
        if install_command(package).is_some() {
            resolution.installed.push(package.clone());
        } else {
            resolution.ignored.push(package.clone());
        }
    }
    resolution
}

/// Renders the Dockerfile text. Deterministic for a given descriptor.
pub fn render(descriptor: &EnvironmentDescriptor) -> String {
    let mut lines = vec![
        format!("FROM {}", descriptor.base_image()),
        format!("WORKDIR {APP_DIR}"),
        "COPY . .".to_string(),
        format!("RUN {}", descriptor.update_command()),
        String::new(),
    ];

    for package in descriptor.packages() {
        match install_command(package) {
            Some(command) => {
                lines.push(format!("# {package}"));
                lines.push(format!("RUN {command}"));
            }
            None => warn!(%package, "Unknown package key, no install directive emitted"),
        }
    }

    lines.push(String::new());
    lines.push(format!("RUN {}", descriptor.build_command()));
    lines.push(format!("CMD {}", descriptor.start_command()));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn context_unavailable(path: &Path, reason: impl ToString) -> SpaceDockError {
    SpaceDockError::ContextUnavailable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Writes the Dockerfile for `descriptor` into `context_dir` and returns its path.
///
/// The file is written to a temporary sibling and renamed into place, so the
/// context never holds a truncated Dockerfile.
#[instrument(skip(descriptor), fields(base_image = %descriptor.base_image(), context = %context_dir.display()))]
pub fn synthesize(descriptor: &EnvironmentDescriptor, context_dir: &Path) -> Result<PathBuf> {
    let metadata =
        std::fs::metadata(context_dir).map_err(|e| context_unavailable(context_dir, e))?;
    if !metadata.is_dir() {
        return Err(context_unavailable(context_dir, "not a directory"));
    }

    let contents = render(descriptor);
    let target = context_dir.join(DOCKERFILE_NAME);

    let mut staged = tempfile::Builder::new()
        .prefix(".Dockerfile")
        .tempfile_in(context_dir)
        .map_err(|e| context_unavailable(context_dir, e))?;
    staged
        .write_all(contents.as_bytes())
        .and_then(|()| staged.flush())
        .map_err(|e| context_unavailable(context_dir, e))?;
    staged
        .persist(&target)
        .map_err(|e| context_unavailable(context_dir, e.error))?;

    debug!(path = %target.display(), packages = ?descriptor.packages(), "Dockerfile written");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(packages: &[&str]) -> EnvironmentDescriptor {
        EnvironmentDescriptor::new(
            "alpine:3.18",
            "apk update",
            packages.iter().map(|p| p.to_string()).collect(),
            "true",
            "echo hi",
        )
        .unwrap()
    }

    fn run_lines(dockerfile: &str) -> Vec<&str> {
        dockerfile.lines().filter(|l| l.starts_with("RUN ")).collect()
    }

    #[test]
    fn test_scenario_skips_unknown_key() {
        let ctx = tempfile::tempdir().unwrap();
        let path = synthesize(&descriptor(&["git", "gnupg", "bogus-key"]), ctx.path()).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();

        assert_eq!(
            run_lines(&contents),
            ["RUN apk update", "RUN apk add git", "RUN apk add gnupg", "RUN true"]
        );
        assert!(!contents.contains("bogus-key"));
        assert_eq!(contents.lines().last(), Some("CMD echo hi"));
    }

    #[test]
    fn test_directive_order() {
        let contents = render(&descriptor(&["npm:ci"]));
        let expected = "FROM alpine:3.18\n\
                        WORKDIR /app\n\
                        COPY . .\n\
                        RUN apk update\n\
                        \n\
                        # npm:ci\n\
                        RUN npm ci\n\
                        \n\
                        RUN true\n\
                        CMD echo hi\n";
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_install_directive_count_matches_known_packages() {
        let known = ["gnupg", "git", "npm:install", "npm:build", "npm:ci"];
        for n in 0..=known.len() {
            let contents = render(&descriptor(&known[..n]));
            // update + build + one per package
            assert_eq!(run_lines(&contents).len(), n + 2);
        }
    }

    #[test]
    fn test_unknown_key_does_not_disturb_neighbours() {
        let with = render(&descriptor(&["git", "nope", "npm:ci"]));
        let without = render(&descriptor(&["git", "npm:ci"]));
        assert_eq!(with, without);
    }

    #[test]
    fn test_synthesize_is_deterministic() {
        let d = descriptor(&["git", "gnupg", "npm:install"]);
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let first = std::fs::read(synthesize(&d, a.path()).unwrap()).unwrap();
        let second = std::fs::read(synthesize(&d, b.path()).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_context_is_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("never-created");
        let err = synthesize(&descriptor(&[]), &missing).unwrap_err();
        assert!(matches!(err, SpaceDockError::ContextUnavailable { .. }));
        assert!(!missing.exists());
    }

    #[test]
    fn test_file_context_is_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("plain-file");
        std::fs::write(&file, b"x").unwrap();
        let err = synthesize(&descriptor(&[]), &file).unwrap_err();
        assert!(matches!(err, SpaceDockError::ContextUnavailable { .. }));
    }

    #[test]
    fn test_synthesize_leaves_no_staging_files() {
        let ctx = tempfile::tempdir().unwrap();
        synthesize(&descriptor(&["git"]), ctx.path()).unwrap();
        let names: Vec<_> = std::fs::read_dir(ctx.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, [DOCKERFILE_NAME]);
    }

    #[test]
    fn test_resolve_packages() {
        let packages: Vec<String> = ["git", "bogus", "npm:build"]
            .iter()
            .map(|p| p.to_string())
            .collect();
        let resolution = resolve_packages(&packages);
        assert_eq!(resolution.installed, ["git", "npm:build"]);
        assert_eq!(resolution.ignored, ["bogus"]);
    }
}
