//! Configuration for the ingestion pipeline and entity caches.
//!
//! Settings are plain structs with builder-style `with_*` methods; callers
//! construct them explicitly and hand them to the service facade. Nothing
//! in this crate reads ambient global state.

mod defaults;
mod settings;

pub use defaults::{
    DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_CACHE_SHARDS, DEFAULT_COUNT_TTL, DEFAULT_ENTITY_TTL,
    DEFAULT_JPEG_QUALITY, DEFAULT_LISTING_TTL, DEFAULT_SEARCH_TTL, DEFAULT_SWEEP_INTERVAL_SECS,
    DEFAULT_THUMBNAIL_WIDTH,
};
pub use settings::{CacheSettings, IngestSettings, Settings};
