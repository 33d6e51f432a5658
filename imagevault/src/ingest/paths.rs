//! Deterministic storage path layout.
//!
//! Artifacts live under a year/month bucket so directory fan-out stays
//! bounded:
//!
//! ```text
//! <base_dir>/<year>/<month>/<hash>.<ext>
//! <base_dir>/<year>/<month>/thumbnails/<hash>.<ext>
//! <base_dir>/<year>/<month>/webp/<hash>.webp
//! ```
//!
//! This layout is part of the durable contract - external tooling
//! (backups, CDNs) may depend on it. Paths are a pure function of hash,
//! extension, and time bucket; nothing is randomly generated, so the same
//! bytes always resolve to the same locations.

use chrono::{DateTime, Datelike, Utc};
use std::path::{Path, PathBuf};

/// The full set of on-disk locations for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Location of the original bytes.
    pub original: PathBuf,
    /// Location of the thumbnail (same extension as the original).
    pub thumbnail: PathBuf,
    /// Location of the WebP alternate encoding.
    pub webp: PathBuf,
}

impl ArtifactPaths {
    /// All three paths, for cleanup.
    pub fn all(&self) -> Vec<PathBuf> {
        vec![
            self.original.clone(),
            self.thumbnail.clone(),
            self.webp.clone(),
        ]
    }
}

/// The stored filename for a content hash and extension: `<hash>.<ext>`.
pub fn stored_filename(hash: &str, extension: &str) -> String {
    format!("{hash}.{extension}")
}

/// Compute artifact paths for a hash and extension at a point in time.
pub fn artifact_paths(
    base_dir: &Path,
    hash: &str,
    extension: &str,
    when: DateTime<Utc>,
) -> ArtifactPaths {
    let bucket = base_dir
        .join(when.year().to_string())
        .join(format!("{:02}", when.month()));

    let filename = stored_filename(hash, extension);
    ArtifactPaths {
        original: bucket.join(&filename),
        thumbnail: bucket.join("thumbnails").join(&filename),
        webp: bucket.join("webp").join(format!("{hash}.webp")),
    }
}
