//! Container creation and teardown for one container directory
//!
//! [`ContainerBucket`] is the only entry point that creates or destroys
//! containers: base image staging, clone-with-fallback, ordered bulk
//! teardown, and full test-sandbox setup.

use crate::container::Container;
use crate::error::{ContainerError, Result};
use crate::fetcher::{ArtifactSource, HttpArtifactFetcher, fetch_with_retry};
use crate::hostfs;
use crate::lxc::Lxc;
use crate::registry::{ContainerRegistry, ListFilter};
use crate::runner::{CommandRunner, HostRunner};
use sandflow_config::SandflowConfig;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Name of the base container every sandbox is cloned from.
pub const BASE: &str = "base";

/// Harness install prefix inside a container.
pub const CONTAINER_HARNESS_DIR: &str = "/usr/local/harness";

/// In-container directory a job's result directory is mounted at.
pub fn result_dir(job_id: &str) -> String {
    format!("{CONTAINER_HARNESS_DIR}/results/{job_id}")
}

/// A scoped view over all containers rooted at one container directory.
///
/// Holds no container state of its own; every query re-derives the
/// container set from the external tool.
pub struct ContainerBucket {
    config: Arc<SandflowConfig>,
    lxc: Lxc,
    registry: ContainerRegistry,
    runner: Arc<dyn CommandRunner>,
    artifacts: Arc<dyn ArtifactSource>,
}

impl ContainerBucket {
    pub fn new(config: Arc<SandflowConfig>) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(HostRunner::new(config.use_sudo));
        let artifacts: Arc<dyn ArtifactSource> = Arc::new(HttpArtifactFetcher::new(runner.clone()));
        Self::with_parts(config, runner, artifacts)
    }

    /// Construct with explicit runner and artifact source. Tests inject
    /// scripted fakes here.
    pub fn with_parts(
        config: Arc<SandflowConfig>,
        runner: Arc<dyn CommandRunner>,
        artifacts: Arc<dyn ArtifactSource>,
    ) -> Self {
        let lxc = Lxc::new(&config.container_path, runner.clone());
        let registry = ContainerRegistry::new(lxc.clone(), config.clone());
        Self {
            config,
            lxc,
            registry,
            runner,
            artifacts,
        }
    }

    pub fn container_path(&self) -> &Path {
        &self.config.container_path
    }

    /// All containers in the directory, indexed by name. Always re-derived.
    pub async fn get_all(&self) -> Result<HashMap<String, Container>> {
        let records = self.registry.list(&ListFilter::new()).await?;
        Ok(records
            .into_iter()
            .map(|record| {
                let container =
                    Container::from_record(record, self.lxc.clone(), self.config.clone());
                (container.name().to_string(), container)
            })
            .collect())
    }

    pub async fn get(&self, name: &str) -> Result<Option<Container>> {
        Ok(self.get_all().await?.remove(name))
    }

    pub async fn exist(&self, name: &str) -> Result<bool> {
        Ok(self.get(name).await?.is_some())
    }

    /// Destroy every container. Snapshot clones reference the base backing
    /// store, so the base is destroyed strictly last.
    pub async fn destroy_all(&self) -> Result<()> {
        let mut containers: Vec<Container> = self.get_all().await?.into_values().collect();
        containers.sort_by_key(|c| if c.name() == BASE { 1 } else { 0 });
        for container in &containers {
            tracing::info!("Destroying container {}", container.name());
            container.destroy(true).await?;
        }
        Ok(())
    }

    /// Clone the base container to `name`.
    ///
    /// Prefers a copy-on-write snapshot clone when the host supports it,
    /// falling back exactly once to a full copy if the snapshot clone
    /// fails. The fallback iteration runs with the snapshot flag disabled,
    /// so it cannot loop.
    pub async fn create_from_base(
        &self,
        name: &str,
        disable_snapshot_clone: bool,
        force_cleanup: bool,
    ) -> Result<Container> {
        if self.exist(name).await? && !force_cleanup {
            return Err(ContainerError::AlreadyExists(name.to_string()));
        }

        let mut disable_snapshot = disable_snapshot_clone;
        let mut force = force_cleanup;
        loop {
            let container_dir = self.config.container_path.join(name);
            if force && container_dir.exists() {
                let leftover = Container::with_name(name, self.lxc.clone(), self.config.clone());
                if let Err(e) = leftover.destroy(true).await {
                    // A half-created container can defeat lxc-destroy; fall
                    // back to removing the directory tree directly.
                    tracing::warn!("Failed to destroy container {name}: {e}");
                    hostfs::remove_recursive(self.runner.as_ref(), &container_dir).await?;
                }
            }

            let use_snapshot = self.config.support_snapshot_clone && !disable_snapshot;
            // overlayfs is the default snapshot backing store, but it is
            // not available on virtualized hosts; use aufs there.
            let aufs = self.config.vm_host && use_snapshot;
            match self.lxc.clone_container(BASE, name, use_snapshot, aufs).await {
                Ok(()) => {
                    if disable_snapshot && !disable_snapshot_clone {
                        tracing::info!(
                            container = name,
                            "Snapshot clone failed but full-copy fallback succeeded"
                        );
                    }
                    return self.get(name).await?.ok_or_else(|| ContainerError::NotFound {
                        name: name.to_string(),
                        path: self.config.container_path.clone(),
                    });
                }
                Err(e) if use_snapshot => {
                    tracing::warn!(
                        "Snapshot clone of {name} failed, retrying with full copy: {e}"
                    );
                    disable_snapshot = true;
                    force = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Install or refresh the base container. Idempotent: if the base
    /// already exists and `force_delete` is not set, only ownership
    /// normalization runs.
    pub async fn setup_base(&self, name: &str, force_delete: bool) -> Result<()> {
        self.run_with_cleanup(name, false, self.setup_base_inner(name, force_delete))
            .await
    }

    async fn setup_base_inner(&self, name: &str, force_delete: bool) -> Result<()> {
        hostfs::mkdir_p(self.runner.as_ref(), &self.config.container_path).await?;
        let base_path = self.config.container_path.join(name);

        if self.exist(name).await? {
            if !force_delete {
                tracing::info!(
                    "Base container already exists. Set force_delete to re-stage it; \
                     note that this destroys all test containers"
                );
                self.normalize_ownership(&base_path).await?;
                return Ok(());
            }
            // Everything goes before the base can be replaced, since
            // snapshot clones depend on its backing store.
            self.destroy_all().await?;
        }

        let tar_path = self.config.container_path.join(format!("{name}.tar.xz"));
        hostfs::remove_recursive(self.runner.as_ref(), &tar_path).await?;
        hostfs::remove_recursive(self.runner.as_ref(), &base_path).await?;

        fetch_with_retry(
            self.artifacts.as_ref(),
            &self.config.base_image_url,
            &tar_path,
            &self.config.container_path,
            self.config.fetch_retry_budget(),
            self.config.fetch_retry_interval(),
        )
        .await?;
        hostfs::remove_file(self.runner.as_ref(), &tar_path).await?;

        self.normalize_ownership(&base_path).await?;

        // The shipped base config refers to its container directory by a
        // placeholder token; point it at the real one.
        let config_file = base_path.join("config");
        hostfs::replace_in_file(
            self.runner.as_ref(),
            &config_file,
            "container_dir",
            &self.config.container_path.to_string_lossy(),
        )
        .await?;
        Ok(())
    }

    /// Build a ready-to-use test sandbox: clone from base, install the
    /// harness package, mount host directories, start, run post-start
    /// hooks and smoke-check the result.
    ///
    /// On any failure the partially-built container is destroyed before
    /// the error propagates, unless `skip_cleanup` is set for post-mortem
    /// debugging.
    pub async fn setup_test(
        &self,
        name: &str,
        job_id: &str,
        harness_package_url: &str,
        result_path: &Path,
        control: Option<&Path>,
        skip_cleanup: bool,
    ) -> Result<Container> {
        self.run_with_cleanup(
            name,
            skip_cleanup,
            self.setup_test_inner(name, job_id, harness_package_url, result_path, control),
        )
        .await
    }

    async fn setup_test_inner(
        &self,
        name: &str,
        job_id: &str,
        harness_package_url: &str,
        result_path: &Path,
        control: Option<&Path>,
    ) -> Result<Container> {
        let started = Instant::now();

        if !result_path.exists() {
            return Err(ContainerError::MissingResultDir(result_path.to_path_buf()));
        }
        let result_path = result_path.canonicalize()?;

        let mut container = self.create_from_base(name, false, false).await?;

        // Install the harness package into the clone's rootfs.
        let rootfs = container.rootfs().await?;
        let usr_local = rootfs.join("usr/local");
        hostfs::mkdir_p(self.runner.as_ref(), &usr_local).await?;
        let package_path = usr_local.join("harness_package.tar.bz2");
        fetch_with_retry(
            self.artifacts.as_ref(),
            harness_package_url,
            &package_path,
            &usr_local,
            self.config.fetch_retry_budget(),
            self.config.fetch_retry_interval(),
        )
        .await?;
        let harness_path = usr_local.join("harness");

        // Copy in the control file for the job, if any.
        if let Some(control) = control {
            let job_tmp = harness_path.join("job_tmp");
            hostfs::mkdir_p(self.runner.as_ref(), &job_tmp).await?;
            let file_name = control.file_name().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("control file has no file name: {}", control.display()),
                )
            })?;
            hostfs::copy(self.runner.as_ref(), control, &job_tmp.join(file_name)).await?;
        }

        let site_packages = self.config.harness_host_dir.join("site-packages");
        let tools = self.config.harness_host_dir.join("tools");
        let mounts = [
            (
                site_packages,
                format!("{CONTAINER_HARNESS_DIR}/site-packages"),
                true,
            ),
            (tools, format!("{CONTAINER_HARNESS_DIR}/tools"), true),
            (result_path.clone(), result_dir(job_id), false),
        ];
        for (source, destination, readonly) in &mounts {
            container.mount_dir(source, destination, *readonly).await?;
        }

        self.normalize_ownership(&harness_path).await?;

        container.start(true).await?;

        for hook in &self.config.post_start_commands {
            container.attach_run(hook, true).await?;
        }

        container
            .verify_setup(&[
                (CONTAINER_HARNESS_DIR.to_string(), 3),
                (result_dir(job_id), 0),
                (format!("{CONTAINER_HARNESS_DIR}/site-packages"), 3),
            ])
            .await?;

        tracing::debug!(
            "Test container {name} is set up in {:.2} seconds",
            started.elapsed().as_secs_f64()
        );
        Ok(container)
    }

    /// Run `op`; on failure, destroy the container it was building (looked
    /// up by name) before returning the original error. Cleanup failures
    /// are logged and swallowed so they never mask the root cause.
    async fn run_with_cleanup<T>(
        &self,
        name: &str,
        skip_cleanup: bool,
        op: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match op.await {
            Ok(value) => Ok(value),
            Err(err) => {
                if skip_cleanup {
                    tracing::warn!("Skipping cleanup of container {name} for debugging");
                } else {
                    match self.get(name).await {
                        Ok(Some(container)) => {
                            if let Err(cleanup_err) = container.destroy(true).await {
                                tracing::error!(
                                    "Cleanup of container {name} failed: {cleanup_err}"
                                );
                            }
                        }
                        Ok(None) => {}
                        Err(lookup_err) => {
                            tracing::error!(
                                "Cleanup lookup for container {name} failed: {lookup_err}"
                            );
                        }
                    }
                }
                tracing::error!(container = name, "Container setup failed: {err}");
                Err(err)
            }
        }
    }

    /// chown/chgrp a directory tree back to root. The base image may carry
    /// a different owner depending on where it was built.
    async fn normalize_ownership(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        for program in ["chown", "chgrp"] {
            let output = self.runner.run(program, &["-R", "root", &path_str]).await?;
            if !output.success {
                return Err(ContainerError::CommandFailed {
                    command: format!("{program} -R root {path_str}"),
                    stderr: output.stderr,
                });
            }
        }
        Ok(())
    }
}
