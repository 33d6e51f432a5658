//! Image operations: cached reads, write-through invalidation, and
//! deferred file cleanup on delete.

use crate::cache::{CacheStats, PurgeExpired, ReadThrough};
use crate::config::CacheSettings;
use crate::jobs::CleanupHandle;
use crate::model::{ImagePage, ImageRecord, ImageUpdate, NewImage};
use crate::op::with_store;
use crate::store::{MetadataStore, StoreError};
use std::sync::Arc;
use tracing::debug;

const COUNT_KEY: &str = "count";

/// Cached operations over image records.
///
/// Three caches with independent lifetimes: single entities keyed by id,
/// hash, and stored filename; paginated listings (global and per-tag);
/// and the aggregate count. An entity is filled under all three of its
/// keys at once, so a lookup by hash warms the id lookup too. Listings
/// and the count are dropped wholesale on any membership change - pages
/// overlap, so surgical invalidation is not worth the bookkeeping.
pub struct Images {
    store: Arc<dyn MetadataStore>,
    entity: ReadThrough<ImageRecord, StoreError>,
    listings: ReadThrough<ImagePage, StoreError>,
    counts: ReadThrough<u64, StoreError>,
    settings: CacheSettings,
    cleanup: Option<CleanupHandle>,
}

impl Images {
    pub fn new(store: Arc<dyn MetadataStore>, settings: &CacheSettings) -> Self {
        Self {
            store,
            entity: ReadThrough::new(settings.shard_count),
            listings: ReadThrough::new(settings.shard_count),
            counts: ReadThrough::new(settings.shard_count),
            settings: settings.clone(),
            cleanup: None,
        }
    }

    /// Route delete-time file removal through a background worker instead
    /// of removing inline.
    pub fn with_cleanup(mut self, handle: CleanupHandle) -> Self {
        self.cleanup = Some(handle);
        self
    }

    fn id_key(id: u64) -> String {
        format!("id:{id}")
    }

    fn hash_key(hash: &str) -> String {
        format!("hash:{hash}")
    }

    fn file_key(name: &str) -> String {
        format!("file:{name}")
    }

    /// Fill all three entity keys for a record.
    fn cache_record(&self, record: &ImageRecord) {
        let ttl = self.settings.entity_ttl;
        self.entity.fill(Self::id_key(record.id), record.clone(), ttl);
        self.entity
            .fill(Self::hash_key(&record.hash), record.clone(), ttl);
        self.entity
            .fill(Self::file_key(&record.file_name), record.clone(), ttl);
    }

    fn drop_record(&self, record: &ImageRecord) {
        self.entity.del(&Self::id_key(record.id));
        self.entity.del(&Self::hash_key(&record.hash));
        self.entity.del(&Self::file_key(&record.file_name));
    }

    /// Drop every listing page and the aggregate count.
    pub fn invalidate_listings(&self) {
        self.listings.clear();
        self.counts.del(COUNT_KEY);
    }

    /// Insert an image row with its tags, then warm the entity caches.
    pub async fn create(
        &self,
        new: NewImage,
        tags: Vec<String>,
    ) -> Result<ImageRecord, StoreError> {
        let record = with_store(&self.store, move |s| s.create_image(new, &tags)).await?;
        self.cache_record(&record);
        self.invalidate_listings();
        debug!(id = record.id, hash = %record.hash, "image row created");
        Ok(record)
    }

    // The sibling-key fills below happen inside the loader, i.e. only on
    // an actual store round-trip. A cache hit must not re-fill: that
    // would slide the TTL forward on every read and a hot key would
    // never see a row changed in the backing store by another writer.

    pub async fn get(&self, id: u64) -> Result<ImageRecord, StoreError> {
        self.entity
            .load(&Self::id_key(id), self.settings.entity_ttl, || async move {
                let record = with_store(&self.store, move |s| s.image_by_id(id)).await?;
                self.cache_record(&record);
                Ok(record)
            })
            .await
    }

    pub async fn get_by_hash(&self, hash: &str) -> Result<ImageRecord, StoreError> {
        let owned = hash.to_string();
        self.entity
            .load(&Self::hash_key(hash), self.settings.entity_ttl, || async move {
                let record = with_store(&self.store, move |s| s.image_by_hash(&owned)).await?;
                self.cache_record(&record);
                Ok(record)
            })
            .await
    }

    pub async fn get_by_filename(&self, file_name: &str) -> Result<ImageRecord, StoreError> {
        let owned = file_name.to_string();
        self.entity
            .load(&Self::file_key(file_name), self.settings.entity_ttl, || async move {
                let record =
                    with_store(&self.store, move |s| s.image_by_filename(&owned)).await?;
                self.cache_record(&record);
                Ok(record)
            })
            .await
    }

    /// One page of the global listing, newest first.
    pub async fn get_page(&self, page: usize, per_page: usize) -> Result<ImagePage, StoreError> {
        self.listings
            .load(
                &format!("page:{page}:{per_page}"),
                self.settings.listing_ttl,
                || with_store(&self.store, move |s| s.images_page(page, per_page)),
            )
            .await
    }

    /// One page of images carrying a tag, newest first.
    pub async fn get_page_by_tag(
        &self,
        tag_name: &str,
        page: usize,
        per_page: usize,
    ) -> Result<ImagePage, StoreError> {
        let owned = tag_name.to_string();
        self.listings
            .load(
                &format!("tag:{tag_name}:{page}:{per_page}"),
                self.settings.listing_ttl,
                || with_store(&self.store, move |s| s.images_by_tag(&owned, page, per_page)),
            )
            .await
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.counts
            .load(COUNT_KEY, self.settings.count_ttl, || {
                with_store(&self.store, move |s| s.image_count())
            })
            .await
    }

    /// An arbitrary image. The pick itself is never cached, but the
    /// chosen record warms the entity keys like any other read.
    pub async fn random(&self) -> Result<ImageRecord, StoreError> {
        let record = with_store(&self.store, move |s| s.random_image()).await?;
        self.cache_record(&record);
        Ok(record)
    }

    /// Apply a metadata-only update.
    pub async fn update(
        &self,
        id: u64,
        update: ImageUpdate,
    ) -> Result<ImageRecord, StoreError> {
        let record = with_store(&self.store, move |s| s.update_image(id, &update)).await?;
        self.cache_record(&record);
        // Listing pages embed the record, so they are stale now too.
        self.listings.clear();
        Ok(record)
    }

    /// Remove the metadata row, then hand the files to the cleanup worker
    /// (or remove them inline when no worker is attached). The row is gone
    /// before any file is touched, so a half-failed delete leaves orphan
    /// files, never dangling metadata.
    pub async fn delete(&self, id: u64) -> Result<ImageRecord, StoreError> {
        let record = with_store(&self.store, move |s| s.delete_image(id)).await?;
        self.drop_record(&record);
        self.invalidate_listings();

        let paths = record.storage_paths();
        match &self.cleanup {
            Some(handle) => handle.schedule(paths),
            None => {
                let failed =
                    tokio::task::spawn_blocking(move || crate::ingest::writer::cleanup(&paths))
                        .await
                        .map_err(|e| StoreError::Backend(format!("cleanup task failed: {e}")))?;
                if !failed.is_empty() {
                    debug!(count = failed.len(), "inline delete left files behind");
                }
            }
        }
        Ok(record)
    }

    /// Increment the view counter and refresh the cached entity. Listing
    /// pages keep their slightly stale counters until TTL; views are far
    /// too hot to invalidate listings on.
    pub async fn record_view(&self, id: u64) -> Result<ImageRecord, StoreError> {
        let record = with_store(&self.store, move |s| s.bump_view_count(id)).await?;
        self.cache_record(&record);
        Ok(record)
    }

    /// Increment the download counter; same caching rules as views.
    pub async fn record_download(&self, id: u64) -> Result<ImageRecord, StoreError> {
        let record = with_store(&self.store, move |s| s.bump_download_count(id)).await?;
        self.cache_record(&record);
        Ok(record)
    }

    pub fn entity_cache_stats(&self) -> CacheStats {
        self.entity.cache_stats()
    }

    pub fn listing_cache_stats(&self) -> CacheStats {
        self.listings.cache_stats()
    }
}

impl PurgeExpired for Images {
    fn purge_expired(&self) -> usize {
        self.entity.purge_expired() + self.listings.purge_expired() + self.counts.purge_expired()
    }
}
