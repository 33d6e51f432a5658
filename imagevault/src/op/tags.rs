//! Tag operations: cached reads and coalesced find-or-create.

use crate::cache::{CacheStats, FlightStats, Group, PurgeExpired, ReadThrough};
use crate::config::CacheSettings;
use crate::model::{Tag, TagPage};
use crate::op::{with_store, Images};
use crate::store::{MetadataStore, StoreError};
use std::sync::Arc;
use tracing::debug;

/// Cached operations over tags.
///
/// `get_or_create` is the hot path: every tagged upload resolves each of
/// its tag names through it, so concurrent uploads sharing a tag name
/// coalesce onto one store round-trip. Whoever leads the flight creates
/// the row; every coalesced waiter receives the same tag and the same
/// created flag.
///
/// Tag mutations invalidate image listings too, because per-tag image
/// pages live in the image cache.
pub struct Tags {
    store: Arc<dyn MetadataStore>,
    entity: ReadThrough<Tag, StoreError>,
    pages: ReadThrough<TagPage, StoreError>,
    lists: ReadThrough<Vec<Tag>, StoreError>,
    create_flights: Group<(Tag, bool), StoreError>,
    images: Arc<Images>,
    settings: CacheSettings,
}

impl Tags {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        images: Arc<Images>,
        settings: &CacheSettings,
    ) -> Self {
        Self {
            store,
            entity: ReadThrough::new(settings.shard_count),
            pages: ReadThrough::new(settings.shard_count),
            lists: ReadThrough::new(settings.shard_count),
            create_flights: Group::new(),
            images,
            settings: settings.clone(),
        }
    }

    fn id_key(id: u64) -> String {
        format!("id:{id}")
    }

    fn name_key(name: &str) -> String {
        format!("name:{name}")
    }

    fn cache_tag(&self, tag: &Tag) {
        let ttl = self.settings.entity_ttl;
        self.entity.fill(Self::id_key(tag.id), tag.clone(), ttl);
        self.entity.fill(Self::name_key(&tag.name), tag.clone(), ttl);
    }

    fn drop_tag(&self, tag: &Tag) {
        self.entity.del(&Self::id_key(tag.id));
        self.entity.del(&Self::name_key(&tag.name));
    }

    /// Drop tag pages, popular/search lists, and the per-tag image
    /// listings they summarize. Also the hook for writes that touch tags
    /// outside this layer, like a tagged upload.
    pub fn invalidate_listings(&self) {
        self.pages.clear();
        self.lists.clear();
        self.images.invalidate_listings();
    }

    // Sibling-key fills run inside the loader only: a cache hit must not
    // slide the TTL forward, or a hot tag would never expire.

    pub async fn get(&self, id: u64) -> Result<Tag, StoreError> {
        self.entity
            .load(&Self::id_key(id), self.settings.entity_ttl, || async move {
                let tag = with_store(&self.store, move |s| s.tag_by_id(id)).await?;
                self.cache_tag(&tag);
                Ok(tag)
            })
            .await
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Tag, StoreError> {
        let owned = name.to_string();
        self.entity
            .load(&Self::name_key(name), self.settings.entity_ttl, || async move {
                let tag = with_store(&self.store, move |s| s.tag_by_name(&owned)).await?;
                self.cache_tag(&tag);
                Ok(tag)
            })
            .await
    }

    /// Find a tag by name or create it, coalescing concurrent calls for
    /// the same name onto one store round-trip. Returns the tag and
    /// whether this flight created it.
    pub async fn get_or_create(&self, name: &str) -> Result<(Tag, bool), StoreError> {
        if let Some(tag) = self.entity.get(&Self::name_key(name)) {
            return Ok((tag, false));
        }

        let owned = name.to_string();
        let (tag, created) = self
            .create_flights
            .work(name, || async move {
                with_store(&self.store, move |s| s.get_or_create_tag(&owned)).await
            })
            .await?;

        self.cache_tag(&tag);
        if created {
            debug!(name = %tag.name, id = tag.id, "tag created");
            self.pages.clear();
            self.lists.clear();
        }
        Ok((tag, created))
    }

    /// One page of tags by name.
    pub async fn get_page(&self, page: usize, per_page: usize) -> Result<TagPage, StoreError> {
        self.pages
            .load(
                &format!("page:{page}:{per_page}"),
                self.settings.listing_ttl,
                || with_store(&self.store, move |s| s.tags_page(page, per_page)),
            )
            .await
    }

    /// Tags by descending usage count.
    pub async fn popular(&self, limit: usize) -> Result<Vec<Tag>, StoreError> {
        self.lists
            .load(&format!("popular:{limit}"), self.settings.listing_ttl, || {
                with_store(&self.store, move |s| s.popular_tags(limit))
            })
            .await
    }

    /// Tags on one image, in the order they were applied.
    pub async fn for_image(&self, image_id: u64) -> Result<Vec<Tag>, StoreError> {
        self.lists
            .load(
                &format!("image:{image_id}"),
                self.settings.listing_ttl,
                || with_store(&self.store, move |s| s.tags_for_image(image_id)),
            )
            .await
    }

    /// Prefix search over tag names. Short TTL: autocomplete tolerates a
    /// little staleness but not much.
    pub async fn search(&self, prefix: &str, limit: usize) -> Result<Vec<Tag>, StoreError> {
        let owned = prefix.to_string();
        self.lists
            .load(
                &format!("search:{prefix}:{limit}"),
                self.settings.search_ttl,
                || with_store(&self.store, move |s| s.search_tags(&owned, limit)),
            )
            .await
    }

    /// Associate tags (found-or-created by name) with an image.
    pub async fn add_to_image(
        &self,
        image_id: u64,
        names: Vec<String>,
    ) -> Result<Vec<Tag>, StoreError> {
        let tags = with_store(&self.store, move |s| s.add_tags_to_image(image_id, &names)).await?;
        for tag in &tags {
            self.cache_tag(tag);
        }
        self.invalidate_listings();
        Ok(tags)
    }

    /// Remove one tag from an image.
    pub async fn remove_from_image(&self, image_id: u64, tag_id: u64) -> Result<Tag, StoreError> {
        let tag =
            with_store(&self.store, move |s| s.remove_tag_from_image(image_id, tag_id)).await?;
        self.cache_tag(&tag);
        self.invalidate_listings();
        Ok(tag)
    }

    /// Remove a tag and every association it has.
    pub async fn delete(&self, id: u64) -> Result<Tag, StoreError> {
        let tag = with_store(&self.store, move |s| s.delete_tag(id)).await?;
        self.drop_tag(&tag);
        self.invalidate_listings();
        Ok(tag)
    }

    pub fn entity_cache_stats(&self) -> CacheStats {
        self.entity.cache_stats()
    }

    pub fn create_flight_stats(&self) -> FlightStats {
        self.create_flights.stats()
    }
}

impl PurgeExpired for Tags {
    fn purge_expired(&self) -> usize {
        self.entity.purge_expired() + self.pages.purge_expired() + self.lists.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tags() -> Tags {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
        let settings = CacheSettings::default();
        let images = Arc::new(Images::new(Arc::clone(&store), &settings));
        Tags::new(store, images, &settings)
    }

    #[tokio::test]
    async fn test_get_or_create_creates_once() {
        let tags = tags();

        let (first, created) = tags.get_or_create("cats").await.unwrap();
        assert!(created);

        let (second, created) = tags.get_or_create("cats").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_coalesces() {
        let tags = Arc::new(tags());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let tags = Arc::clone(&tags);
            handles.push(tokio::spawn(
                async move { tags.get_or_create("dogs").await },
            ));
        }

        let mut ids = Vec::new();
        for handle in handles {
            let (tag, _) = handle.await.unwrap().unwrap();
            ids.push(tag.id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        // Exactly one row exists regardless of interleaving.
        let page = tags.get_page(1, 50).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_hot_reads_do_not_extend_tag_ttl() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
        let settings =
            CacheSettings::default().with_entity_ttl(std::time::Duration::from_millis(100));
        let images = Arc::new(Images::new(Arc::clone(&store), &settings));
        let tags = Tags::new(Arc::clone(&store), images, &settings);

        let (tag, _) = tags.get_or_create("fleeting").await.unwrap();
        store.delete_tag(tag.id).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_millis(500);
        loop {
            match tags.get_by_name("fleeting").await {
                Err(StoreError::NotFound) => break,
                Ok(_) => {
                    assert!(
                        std::time::Instant::now() < deadline,
                        "stale tag served long past its ttl"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
                Err(e) => panic!("unexpected store error: {e}"),
            }
        }
    }

    #[tokio::test]
    async fn test_get_by_name_caches() {
        let tags = tags();
        tags.get_or_create("sunset").await.unwrap();

        let tag = tags.get_by_name("sunset").await.unwrap();
        assert_eq!(tags.get(tag.id).await.unwrap(), tag);
    }

    #[tokio::test]
    async fn test_missing_tag_is_not_found() {
        let tags = tags();
        assert_eq!(
            tags.get_by_name("absent").await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn test_new_tag_invalidates_pages() {
        let tags = tags();
        tags.get_or_create("a").await.unwrap();
        assert_eq!(tags.get_page(1, 10).await.unwrap().total, 1);

        tags.get_or_create("b").await.unwrap();
        assert_eq!(tags.get_page(1, 10).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_delete_drops_entity_keys() {
        let tags = tags();
        let (tag, _) = tags.get_or_create("old").await.unwrap();

        tags.delete(tag.id).await.unwrap();
        assert_eq!(tags.get(tag.id).await.unwrap_err(), StoreError::NotFound);
        assert_eq!(
            tags.get_by_name("old").await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn test_search_by_prefix() {
        let tags = tags();
        for name in ["cat", "category", "dog"] {
            tags.get_or_create(name).await.unwrap();
        }

        let found = tags.search("cat", 10).await.unwrap();
        let names: Vec<_> = found.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["cat", "category"]);
    }
}
