//! LXC container lifecycle management for sandflow
//!
//! Provides base image staging, snapshot cloning with full-copy fallback,
//! host directory mounts and ordered teardown, all scoped to one container
//! directory.

pub mod bucket;
pub mod container;
pub mod error;
pub mod fetcher;
pub mod hostfs;
pub mod lxc;
pub mod registry;
pub mod runner;

#[cfg(test)]
pub(crate) mod test_support;

pub use bucket::{BASE, CONTAINER_HARNESS_DIR, ContainerBucket, result_dir};
pub use container::Container;
pub use error::{ContainerError, Result};
pub use fetcher::{ArtifactSource, HttpArtifactFetcher, fetch_with_retry};
pub use lxc::Lxc;
pub use registry::{ContainerRecord, ContainerRegistry, ContainerState, ListFilter};
pub use runner::{CmdOutput, CommandRunner, HostRunner};
