//! Sandflow container error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("failed to fetch artifact: {0}")]
    FetchFailed(String),

    #[error("no container named '{name}' in {}", path.display())]
    NotFound { name: String, path: PathBuf },

    #[error("failed to locate rootfs for container '{name}'. lxc.rootfs in the container config is: {output}")]
    InvalidRootfsConfig { name: String, output: String },

    #[error("container '{name}' failed to start. lxc command output:\n{output}")]
    StartFailed { name: String, output: String },

    #[error("container '{name}' failed to stop. lxc command output:\n{output}")]
    StopFailed { name: String, output: String },

    #[error("container '{0}' already exists")]
    AlreadyExists(String),

    #[error("container list filter '{0}' is not supported on this host")]
    UnsupportedFilter(String),

    #[error("unknown container state: {0}")]
    UnknownState(String),

    #[error("command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("network is not up in container '{name}' after {secs} seconds")]
    NetworkTimeout { name: String, secs: u64 },

    #[error("{dir} in container is not properly set up")]
    SetupVerificationFailed { dir: String },

    #[error("result directory does not exist: {}", .0.display())]
    MissingResultDir(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContainerError>;
