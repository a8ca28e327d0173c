//! Container lifecycle orchestration for disposable development environments.
//!
//! A repository is cloned into a build context, a Dockerfile is synthesized
//! from an [`EnvironmentDescriptor`](common::EnvironmentDescriptor), the image
//! is built and containers are launched from it. Everything this crate creates
//! carries an owner label, which is how the [`registry::FleetRegistry`] tells
//! our environments apart from anything else running on the host.

// Re-export dependencies potentially needed by consumers (like the gateway)
pub use bollard;
pub use space_dock_common as common;

pub mod builder;
pub mod config;
pub mod connection;
pub mod docker;
pub mod dockerfile;
pub mod engine;
pub mod index;
pub mod keyed_lock;
pub mod launcher;
pub mod orchestrator;
pub mod registry;
pub mod repository;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use builder::ImageBuildManager;
pub use config::OrchestratorConfig;
pub use connection::{connection_uri, decode_connection_uri, folder_uri};
pub use docker::DockerEngine;
pub use engine::{ContainerEngine, EngineError};
pub use launcher::ContainerLauncher;
pub use orchestrator::{CreatedImage, SpaceDock};
pub use registry::FleetRegistry;
pub use repository::{GitFetcher, RepositoryFetcher};
