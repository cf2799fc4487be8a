//! Time-limited in-process store for parsed uploads awaiting campaign
//! creation. Ephemeral: entries are lost on restart and the operator
//! re-uploads.

use crate::mapping::ColumnMapping;
use crate::sheet::ParsedSheet;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Parsed upload held between analysis and campaign creation.
#[derive(Debug, Clone)]
pub struct CachedUpload {
    pub file_name: String,
    pub sheet: ParsedSheet,
    /// Mapping last detected or edited for this upload.
    pub mapping: ColumnMapping,
}

struct CacheEntry {
    upload: Arc<CachedUpload>,
    inserted_at: Instant,
}

pub struct UploadCache {
    store: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl UploadCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            store: DashMap::new(),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Store an upload under a fresh id and return the id.
    pub fn insert(&self, upload: CachedUpload) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.store.insert(
            id.clone(),
            CacheEntry {
                upload: Arc::new(upload),
                inserted_at: Instant::now(),
            },
        );
        id
    }

    /// Returns None if the entry is missing or past its TTL.
    pub fn get(&self, id: &str) -> Option<Arc<CachedUpload>> {
        let entry = self.store.get(id)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.store.remove(id);
            return None;
        }
        Some(entry.upload.clone())
    }

    /// Replace the stored mapping. The TTL clock is not reset.
    pub fn set_mapping(&self, id: &str, mapping: ColumnMapping) -> bool {
        let Some(current) = self.get(id) else {
            return false;
        };
        let mut updated = (*current).clone();
        updated.mapping = mapping;
        if let Some(mut entry) = self.store.get_mut(id) {
            entry.upload = Arc::new(updated);
            true
        } else {
            false
        }
    }

    /// Remove and return an entry. An upload is consumed at most once.
    pub fn take(&self, id: &str) -> Option<Arc<CachedUpload>> {
        let (_, entry) = self.store.remove(id)?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.upload)
    }

    /// Remove expired entries. Call this periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let before = self.store.len();
        self.store
            .retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        before.saturating_sub(self.store.len())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn upload() -> CachedUpload {
        CachedUpload {
            file_name: "liste.xlsx".to_string(),
            sheet: ParsedSheet {
                headers: vec!["Nom".to_string(), "Email".to_string()],
                rows: vec![vec!["DUPONT".to_string(), "a@example.fr".to_string()]],
            },
            mapping: ColumnMapping::default(),
        }
    }

    #[test]
    fn test_insert_generates_distinct_ids() {
        let cache = UploadCache::new(60);
        let a = cache.insert(upload());
        let b = cache.insert(upload());
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_take_consumes_once() {
        let cache = UploadCache::new(60);
        let id = cache.insert(upload());
        assert!(cache.take(&id).is_some());
        assert!(cache.take(&id).is_none());
        assert!(cache.get(&id).is_none());
    }

    #[test]
    fn test_zero_ttl_expires_entries() {
        let cache = UploadCache::new(0);
        let id = cache.insert(upload());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&id).is_none());
        cache.insert(upload());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.evict_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_mapping_replaces_mapping() {
        let cache = UploadCache::new(60);
        let id = cache.insert(upload());
        let mapping = ColumnMapping {
            email: Some(1),
            ..ColumnMapping::default()
        };
        assert!(cache.set_mapping(&id, mapping.clone()));
        assert_eq!(cache.get(&id).unwrap().mapping, mapping);
        assert!(!cache.set_mapping("missing", mapping));
    }
}
