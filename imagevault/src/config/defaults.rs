//! Default values for ingestion and cache settings.

use std::time::Duration;

/// Default thumbnail width in pixels. Height follows the aspect ratio.
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 300;

/// Default JPEG encode quality for thumbnails (0-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// File extensions accepted by upload validation.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Default shard count for entity caches.
pub const DEFAULT_CACHE_SHARDS: usize = 4;

/// TTL for single-entity cache entries (image by id/hash/filename, tag by id/name).
pub const DEFAULT_ENTITY_TTL: Duration = Duration::from_secs(10 * 60);

/// TTL for paginated listing entries. Short because listings go stale on
/// any membership change.
pub const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(2 * 60);

/// TTL for aggregate counts.
pub const DEFAULT_COUNT_TTL: Duration = Duration::from_secs(5 * 60);

/// TTL for tag prefix-search results.
pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(60);

/// Default interval for the background expired-entry sweep.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
