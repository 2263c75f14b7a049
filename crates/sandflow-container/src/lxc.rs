//! lxc CLI wrapper
//!
//! Wraps the lxc-* commands (lxc-ls, lxc-clone, lxc-start, lxc-stop,
//! lxc-destroy, lxc-info, lxc-attach) scoped to one container directory.

use crate::error::{ContainerError, Result};
use crate::runner::{CmdOutput, CommandRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Attribute columns requested from lxc-ls, in positional order.
pub const ATTRIBUTES: [&str; 2] = ["name", "state"];

/// lxc CLI wrapper for one container directory.
#[derive(Clone)]
pub struct Lxc {
    container_path: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl Lxc {
    pub fn new(container_path: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            container_path: container_path.into(),
            runner,
        }
    }

    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    pub(crate) fn runner(&self) -> Arc<dyn CommandRunner> {
        self.runner.clone()
    }

    /// Container directory with symlinks resolved, as lxc-ls expects.
    fn resolved_path(&self) -> PathBuf {
        self.container_path
            .canonicalize()
            .unwrap_or_else(|_| self.container_path.clone())
    }

    /// Run a command and fail on non-zero exit.
    async fn run_checked(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let output = self.runner.run(program, args).await?;
        if !output.success {
            return Err(ContainerError::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Tabular listing of containers in this directory (`lxc-ls -f`).
    pub async fn ls_formatted(&self) -> Result<String> {
        let path = self.resolved_path();
        let path = path.to_string_lossy();
        let fields = ATTRIBUTES.join(",");
        let output = self
            .run_checked("lxc-ls", &["-P", &path, "-f", "-F", &fields])
            .await?;
        Ok(output.stdout)
    }

    /// Names of all active containers, regardless of container directory.
    pub async fn ls_active(&self) -> Result<Vec<String>> {
        let output = self.run_checked("lxc-ls", &["--active"]).await?;
        Ok(output
            .stdout
            .split_whitespace()
            .map(|s| s.to_string())
            .collect())
    }

    /// Clone `base` to `name` inside this container directory.
    ///
    /// `snapshot` requests a copy-on-write clone; `aufs_backing` selects the
    /// aufs backing store (overlayfs is not available on virtualized hosts).
    pub async fn clone_container(
        &self,
        base: &str,
        name: &str,
        snapshot: bool,
        aufs_backing: bool,
    ) -> Result<()> {
        let path = self.container_path.to_string_lossy().to_string();
        let mut args = vec!["-p", &path, "-P", &path, base, name];
        if snapshot {
            args.push("-s");
        }
        if aufs_backing {
            args.push("-B");
            args.push("aufs");
        }
        self.run_checked("lxc-clone", &args).await?;
        Ok(())
    }

    /// Start a container as a daemon; returns the command output for diagnosis.
    pub async fn start(&self, name: &str) -> Result<String> {
        let path = self.container_path.to_string_lossy();
        let output = self
            .run_checked("lxc-start", &["-P", &path, "-n", name, "-d"])
            .await?;
        Ok(output.stdout)
    }

    pub async fn stop(&self, name: &str) -> Result<String> {
        let path = self.container_path.to_string_lossy();
        let output = self
            .run_checked("lxc-stop", &["-P", &path, "-n", name])
            .await?;
        Ok(output.stdout)
    }

    /// Destroy a container. `force` destroys it even while running, which is
    /// faster than stopping first.
    pub async fn destroy(&self, name: &str, force: bool) -> Result<()> {
        let path = self.container_path.to_string_lossy();
        let mut args = vec!["-P", &path, "-n", name];
        if force {
            args.push("-f");
        }
        self.run_checked("lxc-destroy", &args).await?;
        Ok(())
    }

    /// Read one config value via `lxc-info -c`, e.g. `lxc.rootfs`.
    pub async fn config_value(&self, name: &str, key: &str) -> Result<String> {
        let path = self.container_path.to_string_lossy();
        let output = self
            .run_checked("lxc-info", &["-P", &path, "-n", name, "-c", key])
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Run a command inside a running container via `lxc-attach`.
    ///
    /// With `bash` the command is run through `bash -c` so pipes and
    /// redirects work; a command already wrapped as `bash -c ...` keeps
    /// its script as the single `-c` argument, since re-tokenizing would
    /// destroy its quoting. Without `bash` the command is tokenized on
    /// whitespace.
    pub async fn attach(&self, name: &str, command: &str, bash: bool) -> Result<CmdOutput> {
        let path = self.container_path.to_string_lossy().to_string();
        let mut args: Vec<&str> = vec!["-P", &path, "-n", name, "--"];
        let tokens: Vec<&str>;
        if bash {
            let script = match command.strip_prefix("bash -c ") {
                Some(rest) => strip_outer_quotes(rest.trim()),
                None => command,
            };
            args.push("bash");
            args.push("-c");
            args.push(script);
        } else {
            tokens = command.split_whitespace().collect();
            args.extend(&tokens);
        }
        self.run_checked("lxc-attach", &args).await
    }
}

fn strip_outer_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if s.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[s.len() - 1] == bytes[0] {
        &s[1..s.len() - 1]
    } else {
        s
    }
}
