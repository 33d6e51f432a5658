//! The upload ingestion pipeline.
//!
//! One upload moves through fixed stages: validate, fingerprint, check
//! for existing content, decode, write the original and both derivatives
//! concurrently, then commit the metadata row. Files always hit disk
//! before the row exists, so a reader who can see the row can read every
//! file it references; any failure after files land removes them again.

use crate::config::IngestSettings;
use crate::ingest::derivative;
use crate::ingest::error::IngestError;
use crate::ingest::hash;
use crate::ingest::limiter::ConcurrencyLimiter;
use crate::ingest::paths::{artifact_paths, stored_filename, ArtifactPaths};
use crate::ingest::validate::validate;
use crate::ingest::writer;
use crate::jobs::CleanupHandle;
use crate::model::{ImageRecord, NewImage};
use crate::op::Images;
use crate::store::StoreError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// One upload as received from the transport layer.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Raw payload bytes.
    pub bytes: Vec<u8>,
    /// Filename as declared by the uploader.
    pub file_name: String,
    /// Content type as declared by the uploader.
    pub content_type: String,
    /// Free-form description.
    pub description: String,
    /// Whether the image is publicly visible.
    pub is_public: bool,
    /// Owning user reference.
    pub owner_id: u64,
    /// Tag names to apply, found-or-created at commit.
    pub tags: Vec<String>,
}

/// Result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// The committed (or pre-existing) image record.
    pub image: ImageRecord,
    /// True when the payload matched an existing artifact and no new row
    /// was created.
    pub was_duplicate: bool,
}

/// Orchestrates upload ingestion.
pub struct Ingestor {
    settings: IngestSettings,
    images: Arc<Images>,
    limiter: ConcurrencyLimiter,
    cleanup: Option<CleanupHandle>,
}

impl Ingestor {
    pub fn new(settings: IngestSettings, images: Arc<Images>) -> Self {
        let limiter = ConcurrencyLimiter::new(settings.max_concurrent_derivatives);
        Self {
            settings,
            images,
            limiter,
            cleanup: None,
        }
    }

    /// Route failed-upload file removal through a background worker.
    pub fn with_cleanup(mut self, handle: CleanupHandle) -> Self {
        self.cleanup = Some(handle);
        self
    }

    /// Ingest one upload.
    ///
    /// Re-uploading existing content is not an error: the outcome carries
    /// the existing record with `was_duplicate` set, whether the
    /// duplicate was caught up front or by the store's unique constraint
    /// during a concurrent race.
    pub async fn ingest(&self, upload: UploadRequest) -> Result<IngestOutcome, IngestError> {
        let started = Instant::now();
        let UploadRequest {
            bytes,
            file_name,
            content_type,
            description,
            is_public,
            owner_id,
            tags,
        } = upload;

        let valid = validate(
            &bytes,
            &file_name,
            &content_type,
            &self.settings.allowed_extensions,
        )?;
        let bytes = Arc::new(bytes);
        let hash = hash::fingerprint(&bytes);

        // Fast-path dedup before any file I/O. The store's unique
        // constraint still backstops concurrent identical uploads.
        match self.images.get_by_hash(&hash).await {
            Ok(existing) => {
                info!(id = existing.id, hash = %hash, "duplicate upload, reusing artifact");
                return Ok(IngestOutcome {
                    image: existing,
                    was_duplicate: true,
                });
            }
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(IngestError::DedupCheck(e)),
        }

        let decoded = {
            let _permit = self.limiter.acquire().await;
            let bytes = Arc::clone(&bytes);
            tokio::task::spawn_blocking(move || derivative::decode(&bytes))
                .await
                .map_err(|e| IngestError::Internal(e.to_string()))??
        };
        let (width, height) = (decoded.width(), decoded.height());
        let decoded = Arc::new(decoded);

        let paths = artifact_paths(&self.settings.base_dir, &hash, &valid.extension, Utc::now());
        {
            let paths = paths.clone();
            tokio::task::spawn_blocking(move || writer::create_dirs(&paths))
                .await
                .map_err(|e| IngestError::Internal(e.to_string()))??;
        }

        // The original write and both derivative renders run concurrently;
        // renders additionally hold a limiter permit since they are
        // CPU-bound.
        let original = async {
            let bytes = Arc::clone(&bytes);
            let path = paths.original.clone();
            tokio::task::spawn_blocking(move || writer::atomic_write(&path, &bytes))
                .await
                .map_err(|e| IngestError::Internal(e.to_string()))?
        };

        let webp = async {
            let _permit = self.limiter.acquire().await;
            let img = Arc::clone(&decoded);
            let path = paths.webp.clone();
            tokio::task::spawn_blocking(move || {
                let encoded = derivative::render_webp(&img)?;
                writer::atomic_write(&path, &encoded)
            })
            .await
            .map_err(|e| IngestError::Internal(e.to_string()))?
        };

        let thumbnail = async {
            let _permit = self.limiter.acquire().await;
            let img = Arc::clone(&decoded);
            let path = paths.thumbnail.clone();
            let format = valid.format;
            let max_width = self.settings.thumbnail_width;
            let quality = self.settings.jpeg_quality;
            tokio::task::spawn_blocking(move || {
                let encoded = derivative::render_thumbnail(&img, format, max_width, quality)?;
                writer::atomic_write(&path, &encoded)
            })
            .await
            .map_err(|e| IngestError::Internal(e.to_string()))?
        };

        let (original_res, webp_res, thumbnail_res) = tokio::join!(original, webp, thumbnail);

        // Original and WebP are required; either failure aborts the upload
        // and removes whatever landed.
        if let Err(e) = original_res {
            self.abort(&paths).await;
            return Err(e);
        }
        if let Err(e) = webp_res {
            self.abort(&paths).await;
            return Err(e);
        }

        // The thumbnail is best-effort: full-size artifacts stand on
        // their own, so a render failure just leaves the slot empty.
        let thumbnail_path = match thumbnail_res {
            Ok(()) => Some(paths.thumbnail.clone()),
            Err(e) => {
                warn!(hash = %hash, error = %e, "thumbnail generation failed, continuing without");
                None
            }
        };

        let new = NewImage {
            hash: hash.clone(),
            file_name: stored_filename(&hash, &valid.extension),
            original_name: file_name,
            content_type: valid.detected_content_type,
            size_bytes: bytes.len() as u64,
            width,
            height,
            is_public,
            description,
            owner_id,
            path: paths.original.clone(),
            thumbnail_path,
            webp_path: Some(paths.webp.clone()),
        };

        match self.images.create(new, tags).await {
            Ok(image) => {
                info!(
                    id = image.id,
                    hash = %hash,
                    size_bytes = image.size_bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "upload ingested"
                );
                Ok(IngestOutcome {
                    image,
                    was_duplicate: false,
                })
            }
            Err(StoreError::DuplicateHash { .. }) | Err(StoreError::DuplicateFilename { .. }) => {
                // Lost a commit race against an identical upload. The
                // winner's row references the same content-addressed paths
                // this upload just wrote, so the files must stay.
                let image = self
                    .images
                    .get_by_hash(&hash)
                    .await
                    .map_err(IngestError::Commit)?;
                info!(id = image.id, hash = %hash, "lost duplicate race, reusing artifact");
                Ok(IngestOutcome {
                    image,
                    was_duplicate: true,
                })
            }
            Err(e) => {
                self.abort(&paths).await;
                Err(IngestError::Commit(e))
            }
        }
    }

    /// Peak concurrent derivative transforms observed, for tuning.
    pub fn peak_transforms(&self) -> usize {
        self.limiter.peak_in_flight()
    }

    /// Remove any artifact files written by an aborted upload.
    async fn abort(&self, paths: &ArtifactPaths) {
        let all = paths.all();
        match tokio::task::spawn_blocking(move || writer::cleanup(&all)).await {
            Ok(failed) if failed.is_empty() => {}
            Ok(failed) => match &self.cleanup {
                Some(handle) => handle.schedule(failed),
                None => {
                    for path in &failed {
                        warn!(path = %path.display(), "aborted upload left a file behind");
                    }
                }
            },
            Err(e) => warn!(error = %e, "abort cleanup task failed"),
        }
    }
}
