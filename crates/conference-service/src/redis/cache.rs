//! Redis-backed entity cache.
//!
//! # Key Patterns
//!
//! - `conference:conference:{id}` - Conference record (JSON)
//! - `conference:conferencecall:{id}` - Conferencecall record (JSON)
//!
//! Entries expire after a day so that anything the store fails to refresh
//! or invalidate eventually falls back to the database.

use crate::errors::ConferenceError;
use crate::repositories::cache::{cache_key, CacheEntity, EntityCache};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Default cache entry TTL in seconds.
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 86_400;

/// JSON entity cache on a shared multiplexed connection.
///
/// One instance serves every [`CacheEntity`] type.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    ttl_seconds: u64,
}

impl RedisCache {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }
}

#[async_trait::async_trait]
impl<T: CacheEntity> EntityCache<T> for RedisCache {
    #[instrument(skip_all, fields(kind = T::KIND, id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<T>, ConferenceError> {
        let mut conn = self.connection.clone();
        let key = cache_key::<T>(id);

        let raw: Option<String> = conn.get(&key).await.map_err(|e| {
            warn!(target: "cs.cache", error = %e, "Failed to read cache entry");
            ConferenceError::Redis(format!("Failed to read cache entry: {e}"))
        })?;

        let Some(json) = raw else {
            return Ok(None);
        };

        // An undecodable entry is a miss; the caller refills it from the DB.
        match serde_json::from_str(&json) {
            Ok(entity) => Ok(Some(entity)),
            Err(e) => {
                warn!(target: "cs.cache", error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    #[instrument(skip_all, fields(kind = T::KIND, id = %entity.cache_id()))]
    async fn set(&self, entity: &T) -> Result<(), ConferenceError> {
        let mut conn = self.connection.clone();
        let key = cache_key::<T>(entity.cache_id());

        let json = serde_json::to_string(entity).map_err(|e| {
            ConferenceError::Internal(format!("Failed to serialize cache entry: {e}"))
        })?;

        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(json)
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "cs.cache", error = %e, "Failed to write cache entry");
                ConferenceError::Redis(format!("Failed to write cache entry: {e}"))
            })?;

        Ok(())
    }

    #[instrument(skip_all, fields(kind = T::KIND, id = %id))]
    async fn invalidate(&self, id: Uuid) -> Result<(), ConferenceError> {
        let mut conn = self.connection.clone();
        let key = cache_key::<T>(id);

        let _: () = conn.del(&key).await.map_err(|e| {
            warn!(target: "cs.cache", error = %e, "Failed to invalidate cache entry");
            ConferenceError::Redis(format!("Failed to invalidate cache entry: {e}"))
        })?;

        Ok(())
    }
}
