//! Upload ingestion: validation, content addressing, derivative
//! generation, and atomic storage commits.
//!
//! The durable invariant across the module: files hit disk before the
//! metadata row that references them exists, and any failure after files
//! land removes them again. Metadata never dangles; at worst an orphan
//! file survives a crash, which is reclaimable offline.

mod derivative;
mod error;
mod hash;
mod limiter;
mod paths;
mod pipeline;
mod validate;
pub(crate) mod writer;

pub use error::IngestError;
pub use hash::fingerprint;
pub use limiter::ConcurrencyLimiter;
pub use paths::{artifact_paths, stored_filename, ArtifactPaths};
pub use pipeline::{IngestOutcome, Ingestor, UploadRequest};
pub use validate::{extension_of, validate, ValidUpload};
