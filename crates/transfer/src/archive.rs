//! Tar child-process management for streaming packaging and unpacking.
//!
//! The archive never exists on disk: `tar` streams it through a pipe in
//! both directions. Children are spawned with `kill_on_drop` so cancelling
//! the surrounding task cannot leak a dangling process.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::TransferError;

/// Spawns `tar` producing an archive of `path` on stdout.
///
/// A directory is archived as its contents rooted at the archive root; a
/// single file is archived at its base name.
pub(crate) fn spawn_pack(path: &Path, is_dir: bool) -> Result<Child, TransferError> {
    let mut cmd = Command::new("tar");
    cmd.arg("-cf").arg("-");

    if is_dir {
        cmd.arg("-C").arg(path).arg(".");
    } else {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let name = path
            .file_name()
            .ok_or_else(|| TransferError::InvalidSource(path.to_path_buf()))?;
        cmd.arg("-C").arg(parent).arg(name);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(path = %path.display(), is_dir, "spawning tar for packaging");
    Ok(cmd.spawn()?)
}

/// Spawns `tar` extracting an archive read from stdin into `target_dir`.
pub(crate) fn spawn_unpack(target_dir: &Path) -> Result<Child, TransferError> {
    let mut cmd = Command::new("tar");
    cmd.arg("-xf")
        .arg("-")
        .arg("-C")
        .arg(target_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(target = %target_dir.display(), "spawning tar for extraction");
    Ok(cmd.spawn()?)
}

/// Awaits child exit, turning a non-zero status into a packaging error
/// carrying whatever the child wrote to stderr.
pub(crate) async fn wait_for_exit(child: Child, op: &'static str) -> Result<(), TransferError> {
    let output = child.wait_with_output().await?;
    if output.status.success() {
        return Ok(());
    }
    Err(TransferError::Packaging {
        op,
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
