//! One LXC container: start, stop, destroy, mounts, attached commands.

use crate::error::{ContainerError, Result};
use crate::hostfs;
use crate::lxc::Lxc;
use crate::registry::{ContainerRecord, ContainerRegistry, ContainerState, ListFilter};
use crate::runner::CmdOutput;
use sandflow_config::SandflowConfig;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Bash command returning the file count in a directory. The existence test
/// comes first so a missing directory yields a non-zero exit.
const COUNT_FILE_CMD: &str = "[ -d %s ] && ls %s | wc -l";

/// A named, possibly-running sandboxed environment in one container
/// directory.
///
/// The underlying container is a singleton identified by
/// `(container_path, name)`; two values referencing the same container both
/// observe the same ground truth through [`Container::refresh_status`].
#[derive(Clone)]
pub struct Container {
    name: String,
    state: Option<ContainerState>,
    rootfs: Option<PathBuf>,
    clone_from_snapshot: bool,
    lxc: Lxc,
    registry: ContainerRegistry,
    config: Arc<SandflowConfig>,
}

// The runner handles are not Debug; show the container's identity.
impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("rootfs", &self.rootfs)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Build from a listing record.
    pub fn from_record(record: ContainerRecord, lxc: Lxc, config: Arc<SandflowConfig>) -> Self {
        let registry = ContainerRegistry::new(lxc.clone(), config.clone());
        Self {
            name: record.name,
            state: Some(record.state),
            rootfs: None,
            clone_from_snapshot: false,
            lxc,
            registry,
            config,
        }
    }

    /// Build from a bare name, before any state is known. Used when cleaning
    /// up a container that may be half-created.
    pub fn with_name(name: impl Into<String>, lxc: Lxc, config: Arc<SandflowConfig>) -> Self {
        let registry = ContainerRegistry::new(lxc.clone(), config.clone());
        Self {
            name: name.into(),
            state: None,
            rootfs: None,
            clone_from_snapshot: false,
            lxc,
            registry,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last observed state, if any. Call [`Container::refresh_status`] for
    /// ground truth.
    pub fn state(&self) -> Option<ContainerState> {
        self.state
    }

    /// True if the container's storage backend is an overlay/aufs snapshot
    /// rather than a full copy. Set as a side effect of resolving
    /// [`Container::rootfs`].
    pub fn clone_from_snapshot(&self) -> bool {
        self.clone_from_snapshot
    }

    /// Re-query the listing for this container and overwrite cached state.
    pub async fn refresh_status(&mut self) -> Result<()> {
        let filter = ListFilter::new().name(&self.name);
        let records = self.registry.list(&filter).await?;
        let record = records.into_iter().next().ok_or_else(|| {
            ContainerError::NotFound {
                name: self.name.clone(),
                path: self.lxc.container_path().to_path_buf(),
            }
        })?;
        self.state = Some(record.state);
        Ok(())
    }

    /// Path to the container's writable file tree, resolved lazily from the
    /// `lxc.rootfs` config value.
    ///
    /// A snapshot clone reports a `:`-delimited chain, e.g.
    /// `overlayfs:/path/base/rootfs:/path/t1/delta0`; the last segment is
    /// the writable layer.
    pub async fn rootfs(&mut self) -> Result<PathBuf> {
        if let Some(ref rootfs) = self.rootfs {
            return Ok(rootfs.clone());
        }

        let output = self.lxc.config_value(&self.name, "lxc.rootfs").await?;
        let value = output.strip_prefix("lxc.rootfs = ").ok_or_else(|| {
            ContainerError::InvalidRootfsConfig {
                name: self.name.clone(),
                output: output.clone(),
            }
        })?;

        self.clone_from_snapshot = value.contains(':');
        let rootfs = if self.clone_from_snapshot {
            // The chain is ordered by how the snapshot was created; the
            // last entry is the top (writable) layer.
            value.rsplit(':').next().unwrap_or(value)
        } else {
            value
        };
        let rootfs = PathBuf::from(rootfs);
        self.rootfs = Some(rootfs.clone());
        Ok(rootfs)
    }

    /// Start the container and wait for it to report RUNNING.
    ///
    /// With `wait_for_network`, additionally polls an HTTP reachability
    /// probe inside the container until the configured timeout.
    pub async fn start(&mut self, wait_for_network: bool) -> Result<()> {
        let output = self.lxc.start(&self.name).await?;
        self.refresh_status().await?;
        if self.state != Some(ContainerState::Running) {
            return Err(ContainerError::StartFailed {
                name: self.name.clone(),
                output,
            });
        }

        if wait_for_network {
            tracing::debug!(container = %self.name, "Waiting for network to be up");
            let started = Instant::now();
            let deadline = started + self.config.network_timeout();
            loop {
                if self.is_network_up().await {
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(ContainerError::NetworkTimeout {
                        name: self.name.clone(),
                        secs: self.config.network_timeout_secs,
                    });
                }
                tokio::time::sleep(self.config.network_check_interval()).await;
            }
            tracing::debug!(
                container = %self.name,
                "Network is up after {:.2} seconds",
                started.elapsed().as_secs_f64()
            );
        }
        Ok(())
    }

    /// Stop the container and verify it reports STOPPED.
    pub async fn stop(&mut self) -> Result<()> {
        let output = self.lxc.stop(&self.name).await?;
        self.refresh_status().await?;
        if self.state != Some(ContainerState::Stopped) {
            return Err(ContainerError::StopFailed {
                name: self.name.clone(),
                output,
            });
        }
        Ok(())
    }

    /// Destroy the container. `force` destroys it even while running, which
    /// is faster than stop-then-destroy. The object must not be used after
    /// this returns Ok.
    pub async fn destroy(&self, force: bool) -> Result<()> {
        self.lxc.destroy(&self.name, force).await
    }

    /// Run a command inside the running container.
    pub async fn attach_run(&self, command: &str, bash: bool) -> Result<CmdOutput> {
        self.lxc.attach(&self.name, command, bash).await
    }

    /// Probe network reachability from inside the container.
    ///
    /// The only place a command failure is deliberately downgraded to a
    /// boolean.
    pub async fn is_network_up(&self) -> bool {
        let probe = format!("curl --head {}", self.config.base_image_url);
        match self.attach_run(&probe, true).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(container = %self.name, "network probe failed: {e}");
                false
            }
        }
    }

    /// Bind-mount a host directory into the container by appending a
    /// `lxc.mount.entry` line to the container config.
    ///
    /// An entry identical to one already present is skipped, so retried
    /// setups do not accumulate duplicate mount lines. The container tree
    /// is root-owned, so both mutations go through the runner.
    pub async fn mount_dir(
        &mut self,
        source: &Path,
        destination: &str,
        readonly: bool,
    ) -> Result<()> {
        // Destination inside the container must be relative.
        let destination = destination.trim_start_matches('/');
        let rootfs = self.rootfs().await?;
        let runner = self.lxc.runner();
        hostfs::mkdir_p(runner.as_ref(), &rootfs.join(destination)).await?;

        let entry = format!(
            "lxc.mount.entry = {} {} none bind{} 0 0",
            source.display(),
            destination,
            if readonly { ",ro" } else { "" }
        );
        let config_file = self
            .lxc
            .container_path()
            .join(&self.name)
            .join("config");

        let existing = match std::fs::read_to_string(&config_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if existing.lines().any(|line| line == entry) {
            tracing::debug!(container = %self.name, "mount entry already present: {entry}");
            return Ok(());
        }

        hostfs::append_line(runner.as_ref(), &config_file, &entry).await
    }

    /// Smoke-check that the given directories inside the container each
    /// contain at least the expected number of entries.
    pub async fn verify_setup(&self, checks: &[(String, usize)]) -> Result<()> {
        for (dir, min_count) in checks {
            let command = COUNT_FILE_CMD.replace("%s", dir);
            let output = self
                .attach_run(&command, true)
                .await
                .map_err(|_| ContainerError::SetupVerificationFailed { dir: dir.clone() })?;
            let count: usize = output.stdout.trim().parse().map_err(|_| {
                ContainerError::SetupVerificationFailed { dir: dir.clone() }
            })?;
            tracing::debug!(container = %self.name, "{count} entries in {dir}");
            if count < *min_count {
                return Err(ContainerError::SetupVerificationFailed { dir: dir.clone() });
            }
        }
        Ok(())
    }
}
