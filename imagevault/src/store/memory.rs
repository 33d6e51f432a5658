//! In-memory metadata store.
//!
//! Reference implementation of [`MetadataStore`] with full constraint and
//! transaction semantics: a single interior lock makes every multi-row
//! write atomic. Used by the test suite and suitable for embedding; a
//! SQL-backed implementation lives behind the same trait elsewhere.

use crate::model::{ImagePage, ImageRecord, ImageUpdate, NewImage, Tag, TagPage};
use crate::store::{MetadataStore, StoreError};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Image-tag association with per-pair creation time.
#[derive(Debug, Clone)]
struct Association {
    image_id: u64,
    tag_id: u64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    images: BTreeMap<u64, ImageRecord>,
    image_by_hash: HashMap<String, u64>,
    image_by_name: HashMap<String, u64>,
    tags: BTreeMap<u64, Tag>,
    tag_by_name: HashMap<String, u64>,
    associations: Vec<Association>,
    next_image_id: u64,
    next_tag_id: u64,
}

impl Inner {
    /// Find-or-create a tag by name. Caller already holds the lock, so
    /// this composes into larger transactions.
    fn get_or_create_tag(&mut self, name: &str) -> (Tag, bool) {
        if let Some(&id) = self.tag_by_name.get(name) {
            return (self.tags[&id].clone(), false);
        }

        self.next_tag_id += 1;
        let now = Utc::now();
        let tag = Tag {
            id: self.next_tag_id,
            name: name.to_string(),
            usage_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.tags.insert(tag.id, tag.clone());
        self.tag_by_name.insert(name.to_string(), tag.id);
        (tag, true)
    }

    /// Associate a tag with an image if not already associated, bumping
    /// the usage counter. Returns the updated tag.
    fn associate(&mut self, image_id: u64, tag_id: u64) -> Tag {
        let exists = self
            .associations
            .iter()
            .any(|a| a.image_id == image_id && a.tag_id == tag_id);

        if !exists {
            self.associations.push(Association {
                image_id,
                tag_id,
                created_at: Utc::now(),
            });
            let tag = self.tags.get_mut(&tag_id).expect("association to live tag");
            tag.usage_count += 1;
            tag.updated_at = Utc::now();
        }

        self.tags[&tag_id].clone()
    }

    fn page_of(&self, ids: Vec<u64>, page: usize, per_page: usize) -> ImagePage {
        let total = ids.len() as u64;
        let page = page.max(1);
        let start = (page - 1) * per_page;
        let images = ids
            .into_iter()
            .skip(start)
            .take(per_page)
            .map(|id| self.images[&id].clone())
            .collect();
        ImagePage { images, total }
    }
}

/// In-memory [`MetadataStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live image-tag associations, for invariant checks.
    pub fn association_count(&self) -> usize {
        self.inner.lock().unwrap().associations.len()
    }
}

impl MetadataStore for MemoryStore {
    fn create_image(&self, new: NewImage, tags: &[String]) -> Result<ImageRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        // Uniqueness checks before any mutation keep the write atomic.
        if inner.image_by_hash.contains_key(&new.hash) {
            return Err(StoreError::DuplicateHash { hash: new.hash });
        }
        if inner.image_by_name.contains_key(&new.file_name) {
            return Err(StoreError::DuplicateFilename {
                name: new.file_name,
            });
        }

        inner.next_image_id += 1;
        let now = Utc::now();
        let record = ImageRecord {
            id: inner.next_image_id,
            hash: new.hash,
            file_name: new.file_name,
            original_name: new.original_name,
            content_type: new.content_type,
            size_bytes: new.size_bytes,
            width: new.width,
            height: new.height,
            is_public: new.is_public,
            description: new.description,
            owner_id: new.owner_id,
            view_count: 0,
            download_count: 0,
            deleted: false,
            path: new.path,
            thumbnail_path: new.thumbnail_path,
            webp_path: new.webp_path,
            created_at: now,
            updated_at: now,
        };

        inner
            .image_by_hash
            .insert(record.hash.clone(), record.id);
        inner
            .image_by_name
            .insert(record.file_name.clone(), record.id);
        inner.images.insert(record.id, record.clone());

        for name in tags {
            let (tag, _) = inner.get_or_create_tag(name);
            inner.associate(record.id, tag.id);
        }

        Ok(record)
    }

    fn image_by_id(&self, id: u64) -> Result<ImageRecord, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner.images.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn image_by_hash(&self, hash: &str) -> Result<ImageRecord, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .image_by_hash
            .get(hash)
            .and_then(|id| inner.images.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn image_by_filename(&self, file_name: &str) -> Result<ImageRecord, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .image_by_name
            .get(file_name)
            .and_then(|id| inner.images.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn images_page(&self, page: usize, per_page: usize) -> Result<ImagePage, StoreError> {
        let inner = self.inner.lock().unwrap();
        let ids: Vec<u64> = inner.images.keys().rev().copied().collect();
        Ok(inner.page_of(ids, page, per_page))
    }

    fn images_by_tag(
        &self,
        tag_name: &str,
        page: usize,
        per_page: usize,
    ) -> Result<ImagePage, StoreError> {
        let inner = self.inner.lock().unwrap();
        let tag_id = match inner.tag_by_name.get(tag_name) {
            Some(&id) => id,
            None => {
                return Ok(ImagePage {
                    images: Vec::new(),
                    total: 0,
                })
            }
        };

        let mut ids: Vec<u64> = inner
            .associations
            .iter()
            .filter(|a| a.tag_id == tag_id)
            .map(|a| a.image_id)
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(inner.page_of(ids, page, per_page))
    }

    fn image_count(&self) -> Result<u64, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.images.len() as u64)
    }

    fn random_image(&self) -> Result<ImageRecord, StoreError> {
        let inner = self.inner.lock().unwrap();
        if inner.images.is_empty() {
            return Err(StoreError::NotFound);
        }
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .subsec_nanos() as usize;
        let pick = nanos % inner.images.len();
        Ok(inner.images.values().nth(pick).cloned().unwrap())
    }

    fn update_image(&self, id: u64, update: &ImageUpdate) -> Result<ImageRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.images.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(description) = &update.description {
            record.description = description.clone();
        }
        if let Some(is_public) = update.is_public {
            record.is_public = is_public;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    fn delete_image(&self, id: u64) -> Result<ImageRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.images.remove(&id).ok_or(StoreError::NotFound)?;
        inner.image_by_hash.remove(&record.hash);
        inner.image_by_name.remove(&record.file_name);

        // Drop associations and decrement counters transactionally.
        let removed: Vec<u64> = inner
            .associations
            .iter()
            .filter(|a| a.image_id == id)
            .map(|a| a.tag_id)
            .collect();
        inner.associations.retain(|a| a.image_id != id);
        for tag_id in removed {
            if let Some(tag) = inner.tags.get_mut(&tag_id) {
                tag.usage_count = tag.usage_count.saturating_sub(1);
                tag.updated_at = Utc::now();
            }
        }

        Ok(record)
    }

    fn bump_view_count(&self, id: u64) -> Result<ImageRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.images.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.view_count += 1;
        Ok(record.clone())
    }

    fn bump_download_count(&self, id: u64) -> Result<ImageRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.images.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.download_count += 1;
        Ok(record.clone())
    }

    fn tag_by_id(&self, id: u64) -> Result<Tag, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner.tags.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn tag_by_name(&self, name: &str) -> Result<Tag, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .tag_by_name
            .get(name)
            .and_then(|id| inner.tags.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn get_or_create_tag(&self, name: &str) -> Result<(Tag, bool), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.get_or_create_tag(name))
    }

    fn tags_page(&self, page: usize, per_page: usize) -> Result<TagPage, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut names: Vec<&String> = inner.tag_by_name.keys().collect();
        names.sort();

        let total = names.len() as u64;
        let page = page.max(1);
        let tags = names
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .map(|name| inner.tags[&inner.tag_by_name[name]].clone())
            .collect();
        Ok(TagPage { tags, total })
    }

    fn popular_tags(&self, limit: usize) -> Result<Vec<Tag>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut tags: Vec<Tag> = inner.tags.values().cloned().collect();
        tags.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then(a.name.cmp(&b.name)));
        tags.truncate(limit);
        Ok(tags)
    }

    fn tags_for_image(&self, image_id: u64) -> Result<Vec<Tag>, StoreError> {
        let inner = self.inner.lock().unwrap();
        if !inner.images.contains_key(&image_id) {
            return Err(StoreError::NotFound);
        }
        // Ordered by when each association was made, not by tag name.
        let mut assocs: Vec<&Association> = inner
            .associations
            .iter()
            .filter(|a| a.image_id == image_id)
            .collect();
        assocs.sort_by_key(|a| a.created_at);
        Ok(assocs
            .into_iter()
            .map(|a| inner.tags[&a.tag_id].clone())
            .collect())
    }

    fn search_tags(&self, prefix: &str, limit: usize) -> Result<Vec<Tag>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut names: Vec<&String> = inner
            .tag_by_name
            .keys()
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        Ok(names
            .into_iter()
            .take(limit)
            .map(|name| inner.tags[&inner.tag_by_name[name]].clone())
            .collect())
    }

    fn delete_tag(&self, id: u64) -> Result<Tag, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let tag = inner.tags.remove(&id).ok_or(StoreError::NotFound)?;
        inner.tag_by_name.remove(&tag.name);
        inner.associations.retain(|a| a.tag_id != id);
        Ok(tag)
    }

    fn add_tags_to_image(&self, image_id: u64, names: &[String]) -> Result<Vec<Tag>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.images.contains_key(&image_id) {
            return Err(StoreError::NotFound);
        }

        let mut tags = Vec::with_capacity(names.len());
        for name in names {
            let (tag, _) = inner.get_or_create_tag(name);
            tags.push(inner.associate(image_id, tag.id));
        }
        Ok(tags)
    }

    fn remove_tag_from_image(&self, image_id: u64, tag_id: u64) -> Result<Tag, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.tags.contains_key(&tag_id) {
            return Err(StoreError::NotFound);
        }

        let before = inner.associations.len();
        inner
            .associations
            .retain(|a| !(a.image_id == image_id && a.tag_id == tag_id));
        if inner.associations.len() == before {
            return Err(StoreError::NotFound);
        }

        let tag = inner.tags.get_mut(&tag_id).expect("checked above");
        tag.usage_count = tag.usage_count.saturating_sub(1);
        tag.updated_at = Utc::now();
        Ok(tag.clone())
    }
}
