//! External command execution seam
//!
//! All interaction with the host (lxc-* tools, tar, chown) goes through the
//! [`CommandRunner`] trait so tests can substitute a scripted runner and the
//! rest of the crate never touches `tokio::process` directly.

use crate::error::Result;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CmdOutput {
    /// A successful output with the given stdout, for tests and defaults.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// A failed output with the given stderr.
    pub fn err(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(1),
            success: false,
        }
    }
}

/// Runs an external command and captures its output.
///
/// Implementations report non-zero exits through [`CmdOutput::success`],
/// not as errors. Only a failure to spawn is an `Err`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput>;
}

/// Production runner: spawns the command on the host, optionally via sudo.
pub struct HostRunner {
    use_sudo: bool,
}

impl HostRunner {
    pub fn new(use_sudo: bool) -> Self {
        Self { use_sudo }
    }
}

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let mut cmd = if self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(program);
            cmd
        } else {
            Command::new(program)
        };
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", program, args.join(" "));

        let output = cmd.output().await?;

        Ok(CmdOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
        })
    }
}
