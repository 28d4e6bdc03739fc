//! Entity cache contract.

use crate::errors::ConferenceError;
use crate::models::{Conference, Conferencecall};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// An entity that can live in an [`EntityCache`].
pub trait CacheEntity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Entity segment of the cache key.
    const KIND: &'static str;

    fn cache_id(&self) -> Uuid;
}

impl CacheEntity for Conference {
    const KIND: &'static str = "conference";

    fn cache_id(&self) -> Uuid {
        self.id
    }
}

impl CacheEntity for Conferencecall {
    const KIND: &'static str = "conferencecall";

    fn cache_id(&self) -> Uuid {
        self.id
    }
}

/// Cache key: `conference:<entity>:<id>`.
pub fn cache_key<T: CacheEntity>(id: Uuid) -> String {
    format!("conference:{}:{}", T::KIND, id)
}

/// Look-aside cache for one entity type. Never authoritative.
#[async_trait::async_trait]
pub trait EntityCache<T: CacheEntity>: Send + Sync {
    /// `Ok(None)` on a miss.
    async fn get(&self, id: Uuid) -> Result<Option<T>, ConferenceError>;

    async fn set(&self, entity: &T) -> Result<(), ConferenceError>;

    async fn invalidate(&self, id: Uuid) -> Result<(), ConferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            cache_key::<Conference>(id),
            "conference:conference:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            cache_key::<Conferencecall>(id),
            "conference:conferencecall:00000000-0000-0000-0000-000000000000"
        );
    }
}
