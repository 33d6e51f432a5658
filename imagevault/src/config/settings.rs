//! Settings structs for the ingestion pipeline and entity caches.

use crate::config::defaults::{
    DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_CACHE_SHARDS, DEFAULT_COUNT_TTL, DEFAULT_ENTITY_TTL,
    DEFAULT_JPEG_QUALITY, DEFAULT_LISTING_TTL, DEFAULT_SEARCH_TTL, DEFAULT_SWEEP_INTERVAL_SECS,
    DEFAULT_THUMBNAIL_WIDTH,
};
use std::path::PathBuf;
use std::time::Duration;

/// Ingestion pipeline settings.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Root directory for stored image files.
    pub base_dir: PathBuf,
    /// Target thumbnail width in pixels (aspect ratio preserved).
    pub thumbnail_width: u32,
    /// JPEG encode quality for thumbnails (0-100).
    pub jpeg_quality: u8,
    /// Lowercase file extensions (without dot) accepted by validation.
    pub allowed_extensions: Vec<String>,
    /// Maximum concurrent derivative transforms across all uploads.
    ///
    /// Bounds CPU and memory under concurrent uploads; defaults to the
    /// number of available CPU cores.
    pub max_concurrent_derivatives: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imagevault")
            .join("images");

        let cores = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);

        Self {
            base_dir,
            thumbnail_width: DEFAULT_THUMBNAIL_WIDTH,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_concurrent_derivatives: cores,
        }
    }
}

impl IngestSettings {
    /// Set the root storage directory.
    pub fn with_base_dir(mut self, dir: PathBuf) -> Self {
        self.base_dir = dir;
        self
    }

    /// Set the thumbnail width in pixels.
    pub fn with_thumbnail_width(mut self, width: u32) -> Self {
        self.thumbnail_width = width;
        self
    }

    /// Set the JPEG encode quality (0-100).
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Set the maximum number of concurrent derivative transforms.
    pub fn with_max_concurrent_derivatives(mut self, max: usize) -> Self {
        self.max_concurrent_derivatives = max;
        self
    }
}

/// Entity cache settings.
///
/// TTLs are tuned per entity kind: long for near-immutable mappings
/// (an image resolved by content hash), short for listings and counts
/// whose membership changes on any write.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Number of shards per cache instance.
    pub shard_count: usize,
    /// TTL for single-entity entries.
    pub entity_ttl: Duration,
    /// TTL for paginated listings.
    pub listing_ttl: Duration,
    /// TTL for aggregate counts.
    pub count_ttl: Duration,
    /// TTL for prefix-search results.
    pub search_ttl: Duration,
    /// Interval for the background expired-entry sweep, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_CACHE_SHARDS,
            entity_ttl: DEFAULT_ENTITY_TTL,
            listing_ttl: DEFAULT_LISTING_TTL,
            count_ttl: DEFAULT_COUNT_TTL,
            search_ttl: DEFAULT_SEARCH_TTL,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl CacheSettings {
    /// Set the shard count per cache instance.
    pub fn with_shard_count(mut self, shards: usize) -> Self {
        self.shard_count = shards;
        self
    }

    /// Set the TTL for single-entity entries.
    pub fn with_entity_ttl(mut self, ttl: Duration) -> Self {
        self.entity_ttl = ttl;
        self
    }

    /// Set the TTL for paginated listings.
    pub fn with_listing_ttl(mut self, ttl: Duration) -> Self {
        self.listing_ttl = ttl;
        self
    }
}

/// Complete service settings.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Ingestion pipeline settings.
    pub ingest: IngestSettings,
    /// Entity cache settings.
    pub cache: CacheSettings,
}

impl Settings {
    /// Create settings with the given storage directory and defaults
    /// everywhere else.
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            ingest: IngestSettings::default().with_base_dir(base_dir),
            cache: CacheSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_settings_defaults() {
        let settings = IngestSettings::default();
        assert_eq!(settings.thumbnail_width, 300);
        assert_eq!(settings.jpeg_quality, 90);
        assert!(settings.allowed_extensions.contains(&"jpg".to_string()));
        assert!(settings.allowed_extensions.contains(&"webp".to_string()));
        assert!(settings.max_concurrent_derivatives >= 1);
    }

    #[test]
    fn test_ingest_settings_builder() {
        let settings = IngestSettings::default()
            .with_base_dir(PathBuf::from("/data/images"))
            .with_thumbnail_width(200)
            .with_jpeg_quality(75)
            .with_max_concurrent_derivatives(2);

        assert_eq!(settings.base_dir, PathBuf::from("/data/images"));
        assert_eq!(settings.thumbnail_width, 200);
        assert_eq!(settings.jpeg_quality, 75);
        assert_eq!(settings.max_concurrent_derivatives, 2);
    }

    #[test]
    fn test_cache_settings_defaults() {
        let settings = CacheSettings::default();
        assert_eq!(settings.shard_count, 4);
        assert_eq!(settings.entity_ttl, Duration::from_secs(600));
        assert_eq!(settings.listing_ttl, Duration::from_secs(120));
        assert_eq!(settings.count_ttl, Duration::from_secs(300));
        assert_eq!(settings.search_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_cache_settings_builder() {
        let settings = CacheSettings::default()
            .with_shard_count(8)
            .with_entity_ttl(Duration::from_secs(30))
            .with_listing_ttl(Duration::from_secs(5));

        assert_eq!(settings.shard_count, 8);
        assert_eq!(settings.entity_ttl, Duration::from_secs(30));
        assert_eq!(settings.listing_ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_settings_new_sets_base_dir() {
        let settings = Settings::new(PathBuf::from("/srv/vault"));
        assert_eq!(settings.ingest.base_dir, PathBuf::from("/srv/vault"));
    }
}
