//! The assembled service facade.
//!
//! [`ImageVault`] wires the ingestion pipeline, the cached entity
//! operations, the cleanup worker, and the cache sweeper over one backing
//! store, and owns their shutdown order. Embedders that need finer
//! control can assemble the pieces themselves; everything the facade uses
//! is public.

use crate::cache::{CacheSweeper, PurgeExpired};
use crate::config::Settings;
use crate::ingest::{IngestError, IngestOutcome, Ingestor, UploadRequest};
use crate::jobs::CleanupWorker;
use crate::op::{Images, Tags};
use crate::store::MetadataStore;
use std::sync::Arc;
use tracing::info;

/// Content-addressed image ingestion and cached metadata access.
pub struct ImageVault {
    images: Arc<Images>,
    tags: Arc<Tags>,
    ingestor: Ingestor,
    cleanup: CleanupWorker,
    sweeper: CacheSweeper,
}

impl ImageVault {
    /// Assemble the service over a backing store.
    ///
    /// Spawns the cleanup worker and the cache sweeper; must be called
    /// from within a tokio runtime.
    pub fn new(store: Arc<dyn MetadataStore>, settings: Settings) -> Self {
        let cleanup = CleanupWorker::start();

        let images = Arc::new(
            Images::new(Arc::clone(&store), &settings.cache).with_cleanup(cleanup.handle()),
        );
        let tags = Arc::new(Tags::new(store, Arc::clone(&images), &settings.cache));

        let sweeper = CacheSweeper::start(
            vec![
                Arc::clone(&images) as Arc<dyn PurgeExpired>,
                Arc::clone(&tags) as Arc<dyn PurgeExpired>,
            ],
            settings.cache.sweep_interval_secs,
        );

        let ingestor =
            Ingestor::new(settings.ingest, Arc::clone(&images)).with_cleanup(cleanup.handle());

        info!(version = crate::VERSION, "image vault assembled");
        Self {
            images,
            tags,
            ingestor,
            cleanup,
            sweeper,
        }
    }

    /// Ingest one upload.
    pub async fn ingest(&self, upload: UploadRequest) -> Result<IngestOutcome, IngestError> {
        let tagged = !upload.tags.is_empty();
        let outcome = self.ingestor.ingest(upload).await?;

        // A new tagged row changes tag usage counts and listings, which
        // live behind the tag operations layer.
        if !outcome.was_duplicate && tagged {
            self.tags.invalidate_listings();
        }
        Ok(outcome)
    }

    /// Cached image operations.
    pub fn images(&self) -> &Images {
        &self.images
    }

    /// Cached tag operations.
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Stop background work: the sweeper exits and the cleanup worker
    /// drains its queue.
    pub async fn shutdown(self) {
        let ImageVault {
            cleanup, sweeper, ..
        } = self;
        sweeper.shutdown();
        cleanup.shutdown().await;
        info!("image vault shut down");
    }
}
