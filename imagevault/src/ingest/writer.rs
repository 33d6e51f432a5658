//! Atomic storage writes and best-effort cleanup.
//!
//! Files are committed with a scoped temp-file-then-rename sequence: the
//! bytes land in a temporary file in the destination directory and the
//! rename is the commit point, so no reader ever observes a partially
//! written file. The writer only touches the filesystem - it never talks
//! to the metadata store.

use crate::ingest::error::IngestError;
use crate::ingest::paths::ArtifactPaths;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

/// Create the directories for all three artifact locations.
///
/// Idempotent: existing directories are fine.
pub fn create_dirs(paths: &ArtifactPaths) -> Result<(), IngestError> {
    for path in [&paths.original, &paths.thumbnail, &paths.webp] {
        let dir = path.parent().ok_or_else(|| IngestError::CreateDir {
            path: path.clone(),
            source: std::io::Error::other("path has no parent directory"),
        })?;
        fs::create_dir_all(dir).map_err(|e| IngestError::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Write bytes to `path` atomically.
///
/// The temp file is created in the destination directory so the final
/// rename stays on one volume and is atomic.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), IngestError> {
    let write_err = |e: std::io::Error| IngestError::Write {
        path: path.to_path_buf(),
        source: e,
    };

    let dir = path.parent().ok_or_else(|| {
        write_err(std::io::Error::other("path has no parent directory"))
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(data).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Remove the given paths, tolerating "already absent" as success.
///
/// Returns the paths that could not be removed so a retry-capable worker
/// can pick them up; each failure is also logged for operator diagnosis.
pub fn cleanup(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut failed = Vec::new();
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "file cleanup failed");
                failed.push(path.clone());
            }
        }
    }
    failed
}
