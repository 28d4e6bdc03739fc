//! Redis-backed implementations: entity cache, delay queue, event publisher.
//!
//! Everything shares one `MultiplexedConnection`, which is cheap to clone and
//! safe to use concurrently. The bridge-event subscriber opens its own pub/sub
//! connection from the [`redis::Client`].

pub mod cache;
pub mod delay_queue;
pub mod lua_scripts;
pub mod publisher;

pub use cache::RedisCache;
pub use delay_queue::RedisDelayQueue;
pub use publisher::RedisEventPublisher;

use crate::errors::ConferenceError;
use ::redis::aio::MultiplexedConnection;
use ::redis::Client;
use tracing::error;

/// Open a client and a multiplexed connection.
///
/// The URL is never logged; it may carry credentials.
pub async fn connect(redis_url: &str) -> Result<(Client, MultiplexedConnection), ConferenceError> {
    let client = Client::open(redis_url).map_err(|e| {
        error!(target: "cs.redis", error = %e, "Failed to open Redis client");
        ConferenceError::Redis(format!("Failed to open Redis client: {e}"))
    })?;

    let connection = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| {
            error!(target: "cs.redis", error = %e, "Failed to connect to Redis");
            ConferenceError::Redis(format!("Failed to connect to Redis: {e}"))
        })?;

    Ok((client, connection))
}
