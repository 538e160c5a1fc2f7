//! Filesystem helpers for data-directory provisioning and durable writes.
//!
//! Blocking filesystem calls run inside `tokio::task::spawn_blocking`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use shardherd_proto::{HerdError, HerdResult};
use tracing::{debug, info, warn};

/// Make `path` an existing, empty directory.
///
/// Anything previously at `path` is removed first. Calling this twice in a
/// row leaves the same empty directory.
pub async fn create_fresh_path(path: &Path) -> HerdResult<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || create_fresh_path_blocking(&path))
        .await
        .map_err(|e| HerdError::Io(format!("provisioning task failed: {}", e)))?
}

fn create_fresh_path_blocking(path: &Path) -> HerdResult<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            info!("removing previous contents of {}", path.display());
            fs::remove_dir_all(path).map_err(|e| io_err("remove", path, e))?;
        }
        Ok(_) => {
            warn!("{} is not a directory, replacing it", path.display());
            fs::remove_file(path).map_err(|e| io_err("remove", path, e))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err("stat", path, e)),
    }
    fs::create_dir_all(path).map_err(|e| io_err("create", path, e))?;
    debug!("provisioned fresh directory {}", path.display());
    Ok(())
}

/// Whether `path` is a directory with no entries.
pub async fn is_empty_dir(path: &Path) -> HerdResult<bool> {
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(io_err("read", path, e)),
    };
    Ok(entries
        .next_entry()
        .await
        .map_err(|e| io_err("read", path, e))?
        .is_none())
}

/// Atomic write: write data to a temporary file, then rename into place.
///
/// The temp file lives next to `target` so the rename stays on one
/// filesystem.
pub async fn atomic_write(target: &Path, data: Vec<u8>) -> HerdResult<()> {
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || atomic_write_blocking(&target, &data))
        .await
        .map_err(|e| HerdError::Io(format!("write task failed: {}", e)))?
}

fn atomic_write_blocking(target: &Path, data: &[u8]) -> HerdResult<()> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir).map_err(|e| io_err("create", &dir, e))?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{}.tmp_{}", file_name, std::process::id()));

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_err("write", &tmp_path, e));
    }

    fs::rename(&tmp_path, target).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_err("rename", target, e)
    })
}

fn io_err(op: &str, path: &Path, e: std::io::Error) -> HerdError {
    warn!("failed to {} {}: {}", op, path.display(), e);
    HerdError::Io(format!("{} {}: {}", op, path.display(), e))
}
