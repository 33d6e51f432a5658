//! Entity operation layers.
//!
//! Each entity kind gets one operation struct that fronts the backing
//! store with read-through caches and owns the invalidation rules for its
//! own keys. Writes go straight to the store and then fix the caches:
//! single-entity keys are filled with the known result, listing and count
//! keys are dropped wholesale. Store calls run on the blocking pool so
//! the async executor never stalls on store I/O.

mod images;
mod tags;

pub use images::Images;
pub use tags::Tags;

use crate::store::{MetadataStore, StoreError};
use std::sync::Arc;

/// Run a synchronous store call on the blocking pool.
pub(crate) async fn with_store<T, F>(
    store: &Arc<dyn MetadataStore>,
    f: F,
) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn MetadataStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
}
