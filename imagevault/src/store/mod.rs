//! Backing metadata store contract.
//!
//! The store is an external collaborator reached through the
//! [`MetadataStore`] trait: an ordinary relational database in production,
//! [`MemoryStore`] for tests and embedding. The contract requires
//! unique-constraint enforcement on content hash and stored filename,
//! transactional multi-row writes (image row + tag associations + tag
//! counters) with full rollback on error, and find-or-create semantics for
//! tags usable inside a transaction.

mod memory;

pub use memory::MemoryStore;

use crate::model::{ImagePage, ImageRecord, ImageUpdate, NewImage, Tag, TagPage};
use thiserror::Error;

/// Errors surfaced by the backing store.
///
/// `Clone` so request coalescing can hand the same error to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No row matched the lookup.
    #[error("record not found")]
    NotFound,

    /// The unique constraint on content hash fired.
    ///
    /// Mandatory for correctness: the in-memory dedup check alone is not
    /// sufficient under concurrent uploads of identical content.
    #[error("duplicate content hash: {hash}")]
    DuplicateHash { hash: String },

    /// The unique constraint on stored filename fired.
    #[error("duplicate stored filename: {name}")]
    DuplicateFilename { name: String },

    /// The unique constraint on tag name fired.
    #[error("duplicate tag name: {name}")]
    DuplicateTag { name: String },

    /// Any other backend failure (connection, query, transaction).
    #[error("backing store error: {0}")]
    Backend(String),
}

/// Contract for the backing metadata store.
///
/// All methods are synchronous; callers that need to avoid blocking an
/// async executor wrap calls in their own blocking-pool dispatch. Every
/// multi-row write (create with tags, association add/remove with counter
/// updates, deletes) is transactional: it either fully applies or leaves
/// the store unchanged.
pub trait MetadataStore: Send + Sync {
    // Images

    /// Insert an image row together with its tag associations in one
    /// transaction. Tags are found-or-created by name; each association
    /// bumps the tag's usage counter.
    ///
    /// Fails with [`StoreError::DuplicateHash`] or
    /// [`StoreError::DuplicateFilename`] when the uniqueness constraints
    /// fire, leaving no partial rows behind.
    fn create_image(&self, new: NewImage, tags: &[String]) -> Result<ImageRecord, StoreError>;

    fn image_by_id(&self, id: u64) -> Result<ImageRecord, StoreError>;
    fn image_by_hash(&self, hash: &str) -> Result<ImageRecord, StoreError>;
    fn image_by_filename(&self, file_name: &str) -> Result<ImageRecord, StoreError>;

    /// Page through images, newest first. `page` starts at 1.
    fn images_page(&self, page: usize, per_page: usize) -> Result<ImagePage, StoreError>;

    /// Page through images carrying the given tag, newest first.
    fn images_by_tag(
        &self,
        tag_name: &str,
        page: usize,
        per_page: usize,
    ) -> Result<ImagePage, StoreError>;

    fn image_count(&self) -> Result<u64, StoreError>;

    /// An arbitrary image, for the random-image endpoint.
    fn random_image(&self) -> Result<ImageRecord, StoreError>;

    /// Apply a metadata-only update and return the new row.
    fn update_image(&self, id: u64, update: &ImageUpdate) -> Result<ImageRecord, StoreError>;

    /// Remove the image row and its tag associations (decrementing tag
    /// counters) in one transaction. Returns the removed row so callers
    /// can schedule file cleanup.
    fn delete_image(&self, id: u64) -> Result<ImageRecord, StoreError>;

    fn bump_view_count(&self, id: u64) -> Result<ImageRecord, StoreError>;
    fn bump_download_count(&self, id: u64) -> Result<ImageRecord, StoreError>;

    // Tags

    fn tag_by_id(&self, id: u64) -> Result<Tag, StoreError>;
    fn tag_by_name(&self, name: &str) -> Result<Tag, StoreError>;

    /// Find a tag by name or create it. Returns the tag and whether it was
    /// created by this call.
    fn get_or_create_tag(&self, name: &str) -> Result<(Tag, bool), StoreError>;

    /// Page through tags by name. `page` starts at 1.
    fn tags_page(&self, page: usize, per_page: usize) -> Result<TagPage, StoreError>;

    /// Tags ordered by descending usage count.
    fn popular_tags(&self, limit: usize) -> Result<Vec<Tag>, StoreError>;

    /// Tags associated with one image, in association-creation order.
    fn tags_for_image(&self, image_id: u64) -> Result<Vec<Tag>, StoreError>;

    /// Tags whose name starts with `prefix`, by name.
    fn search_tags(&self, prefix: &str, limit: usize) -> Result<Vec<Tag>, StoreError>;

    /// Remove a tag and all of its associations in one transaction.
    fn delete_tag(&self, id: u64) -> Result<Tag, StoreError>;

    /// Associate tags (found-or-created by name) with an image, bumping
    /// usage counters. Already-present associations are skipped. Returns
    /// the tags in the order given.
    fn add_tags_to_image(&self, image_id: u64, names: &[String]) -> Result<Vec<Tag>, StoreError>;

    /// Remove one association and decrement the tag's usage counter.
    /// Returns the updated tag.
    fn remove_tag_from_image(&self, image_id: u64, tag_id: u64) -> Result<Tag, StoreError>;
}
