//! In-memory entity cache with failure injection.

use conference_service::errors::ConferenceError;
use conference_service::repositories::{CacheEntity, EntityCache};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

fn injected() -> ConferenceError {
    ConferenceError::Redis("injected cache failure".to_string())
}

#[derive(Debug)]
pub struct MockCache<T> {
    entries: Mutex<HashMap<Uuid, T>>,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    hits: AtomicUsize,
}

impl<T> Default for MockCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fail_get: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            hits: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone> MockCache<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads return an error instead of a value or miss.
    pub fn set_fail_get(&self, failing: bool) {
        self.fail_get.store(failing, Ordering::SeqCst);
    }

    /// Writes return an error and store nothing. Invalidation still works.
    pub fn set_fail_set(&self, failing: bool) {
        self.fail_set.store(failing, Ordering::SeqCst);
    }

    pub fn entry(&self, id: Uuid) -> Option<T> {
        self.entries.lock().unwrap().get(&id).cloned()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.lock().unwrap().contains_key(&id)
    }

    /// Place a value directly, e.g. a stale one.
    pub fn put(&self, id: Uuid, entity: T) {
        self.entries.lock().unwrap().insert(id, entity);
    }

    /// Number of reads answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl<T: CacheEntity + Clone> EntityCache<T> for MockCache<T> {
    async fn get(&self, id: Uuid) -> Result<Option<T>, ConferenceError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let entry = self.entry(id);
        if entry.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(entry)
    }

    async fn set(&self, entity: &T) -> Result<(), ConferenceError> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.put(entity.cache_id(), entity.clone());
        Ok(())
    }

    async fn invalidate(&self, id: Uuid) -> Result<(), ConferenceError> {
        self.entries.lock().unwrap().remove(&id);
        Ok(())
    }
}
