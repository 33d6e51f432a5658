//! Generic keyed caching with TTLs and request coalescing.
//!
//! One [`ReadThrough`] instance is created per entity kind (image-by-key,
//! tag-by-key, listings, counts), each internally homogeneous - no dynamic
//! union types, and invalidation stays scoped to one kind. The cache and
//! coalescing-group tables are the only concurrently mutated in-process
//! state in this crate; both use per-shard/per-key locking.

mod layer;
mod singleflight;
mod stats;
mod sweeper;
mod ttl;

pub use layer::ReadThrough;
pub use singleflight::{FlightStats, Group};
pub use stats::CacheStats;
pub use sweeper::{CacheSweeper, PurgeExpired};
pub use ttl::TtlCache;
