//! Domain records persisted by the backing metadata store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One uploaded image artifact.
///
/// Identity is three-fold: a surrogate `id` assigned by the backing store,
/// the SHA-256 `hash` of the raw bytes (unique), and the stored `file_name`
/// derived from hash + extension (unique). The hash is immutable once
/// assigned, and the stored filename is a pure function of hash and
/// extension, so the same bytes always resolve to the same artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Surrogate id assigned by the backing store.
    pub id: u64,
    /// SHA-256 content fingerprint, lowercase hex.
    pub hash: String,
    /// Stored filename: `<hash>.<ext>`.
    pub file_name: String,
    /// Filename as declared by the uploader.
    pub original_name: String,
    /// Content type detected from the payload bytes.
    pub content_type: String,
    /// Payload size in bytes.
    pub size_bytes: u64,
    /// Pixel width of the original.
    pub width: u32,
    /// Pixel height of the original.
    pub height: u32,
    /// Whether the image is publicly visible.
    pub is_public: bool,
    /// Free-form description.
    pub description: String,
    /// Owning user reference.
    pub owner_id: u64,
    /// Number of recorded views.
    pub view_count: u64,
    /// Number of recorded downloads.
    pub download_count: u64,
    /// Soft-delete marker used by stores that mark rows before purging.
    pub deleted: bool,
    /// Path of the original file on disk.
    pub path: PathBuf,
    /// Path of the thumbnail, if one was generated.
    pub thumbnail_path: Option<PathBuf>,
    /// Path of the WebP alternate encoding.
    pub webp_path: Option<PathBuf>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    /// All on-disk paths belonging to this artifact, for cleanup.
    pub fn storage_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.path.clone()];
        if let Some(thumb) = &self.thumbnail_path {
            paths.push(thumb.clone());
        }
        if let Some(webp) = &self.webp_path {
            paths.push(webp.clone());
        }
        paths
    }
}

/// Fields for creating a new image row.
///
/// The backing store assigns `id` and timestamps.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub hash: String,
    pub file_name: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub is_public: bool,
    pub description: String,
    pub owner_id: u64,
    pub path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub webp_path: Option<PathBuf>,
}

/// Metadata-only update for an image.
///
/// Only description and visibility can change after ingestion; content
/// identity (hash, filename, paths) is immutable.
#[derive(Debug, Clone, Default)]
pub struct ImageUpdate {
    /// New description, if changing.
    pub description: Option<String>,
    /// New visibility, if changing.
    pub is_public: Option<bool>,
}

/// A tag applied to images.
///
/// `usage_count` is maintained transactionally alongside association
/// inserts and deletes; it never goes negative and equals the number of
/// live associations at rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Surrogate id assigned by the backing store.
    pub id: u64,
    /// Unique tag name.
    pub name: String,
    /// Number of images currently carrying this tag.
    pub usage_count: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One page of an image listing, with the total row count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePage {
    pub images: Vec<ImageRecord>,
    pub total: u64,
}

/// One page of a tag listing, with the total row count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPage {
    pub tags: Vec<Tag>,
    pub total: u64,
}
