//! Host filesystem mutations routed through the command runner
//!
//! Container trees are root-owned once staged, so plain `std::fs` writes
//! from an unprivileged process fail with EACCES. Every mutation goes
//! through [`CommandRunner`], which prepends sudo when configured. Reads
//! stay on `std::fs`; the trees are world-readable.

use crate::error::{ContainerError, Result};
use crate::runner::CommandRunner;
use std::path::Path;

async fn run(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> Result<()> {
    let output = runner.run(program, args).await?;
    if !output.success {
        return Err(ContainerError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            stderr: output.stderr,
        });
    }
    Ok(())
}

pub async fn mkdir_p(runner: &dyn CommandRunner, path: &Path) -> Result<()> {
    let path = path.to_string_lossy();
    run(runner, "mkdir", &["-p", &path]).await
}

/// Remove a file or directory tree. Succeeds if the path does not exist.
pub async fn remove_recursive(runner: &dyn CommandRunner, path: &Path) -> Result<()> {
    let path = path.to_string_lossy();
    run(runner, "rm", &["-rf", &path]).await
}

pub async fn remove_file(runner: &dyn CommandRunner, path: &Path) -> Result<()> {
    let path = path.to_string_lossy();
    run(runner, "rm", &["-f", &path]).await
}

pub async fn rename(runner: &dyn CommandRunner, source: &Path, destination: &Path) -> Result<()> {
    let source = source.to_string_lossy();
    let destination = destination.to_string_lossy();
    run(runner, "mv", &["-f", &source, &destination]).await
}

pub async fn copy(runner: &dyn CommandRunner, source: &Path, destination: &Path) -> Result<()> {
    let source = source.to_string_lossy();
    let destination = destination.to_string_lossy();
    run(runner, "cp", &[&source, &destination]).await
}

/// Replace every occurrence of `from` with `to` inside a file, in place.
pub async fn replace_in_file(
    runner: &dyn CommandRunner,
    path: &Path,
    from: &str,
    to: &str,
) -> Result<()> {
    let path = path.to_string_lossy();
    let expr = format!("s|{from}|{to}|g");
    run(runner, "sed", &["-i", &expr, &path]).await
}

/// Append one line to a file, creating it if absent. The shell redirect
/// runs under the runner so it writes with the runner's privileges.
pub async fn append_line(runner: &dyn CommandRunner, path: &Path, line: &str) -> Result<()> {
    let script = format!("echo '{}' >> {}", line, path.display());
    run(runner, "bash", &["-c", &script]).await
}
