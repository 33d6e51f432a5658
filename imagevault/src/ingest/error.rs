//! Error types for the ingestion pipeline.
//!
//! Errors are categorized by pipeline stage. Validation failures happen
//! before any I/O; storage and commit failures carry the path or stage so
//! an operator can tell where an upload died. Duplicate content is not an
//! error - it is a distinct success outcome on [`IngestOutcome`].
//!
//! [`IngestOutcome`]: crate::ingest::IngestOutcome

use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during an upload ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Upload payload was empty or missing.
    #[error("empty upload payload")]
    EmptyPayload,

    /// The declared filename has no extension, or the extension is not in
    /// the allow-list.
    #[error("unsupported file extension: {0:?}")]
    UnsupportedExtension(String),

    /// Declared content type and file extension disagree.
    #[error("content type {content_type:?} does not match extension {extension:?}")]
    ContentTypeMismatch {
        content_type: String,
        extension: String,
    },

    /// The payload bytes are not the format the extension claims.
    #[error("payload is not valid {extension:?} data: {reason}")]
    PayloadMismatch { extension: String, reason: String },

    /// Image decode failed.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// A required derivative could not be generated.
    #[error("{kind} generation failed: {reason}")]
    Derivative { kind: &'static str, reason: String },

    /// Directory creation failed.
    #[error("directory creation failed for {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file write (temp write or rename commit) failed.
    #[error("storage write failed for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The duplicate-content lookup failed before any file was written.
    #[error("duplicate check failed: {0}")]
    DedupCheck(StoreError),

    /// Metadata persistence failed after files were written; the files
    /// have been cleaned up.
    #[error("metadata commit failed: {0}")]
    Commit(#[from] StoreError),

    /// A derivative task panicked or was torn down unexpectedly.
    #[error("internal task failure: {0}")]
    Internal(String),
}
