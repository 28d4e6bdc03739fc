//! Redis pub/sub event publisher.

use crate::models::DomainEvent;
use crate::services::publisher::EventPublisher;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, error, instrument, warn};

/// Publishes each event's JSON envelope on a single channel.
#[derive(Clone)]
pub struct RedisEventPublisher {
    connection: MultiplexedConnection,
    channel: String,
}

impl RedisEventPublisher {
    pub fn new(connection: MultiplexedConnection, channel: String) -> Self {
        Self {
            connection,
            channel,
        }
    }
}

#[async_trait::async_trait]
impl EventPublisher for RedisEventPublisher {
    #[instrument(skip_all, fields(event_type = event.event_type(), subject_id = %event.subject_id()))]
    async fn publish(&self, event: DomainEvent) {
        let payload = match serde_json::to_string(&event.envelope()) {
            Ok(payload) => payload,
            Err(e) => {
                error!(target: "cs.events", error = %e, "Failed to serialize event");
                return;
            }
        };

        let mut conn = self.connection.clone();
        let result: Result<i64, redis::RedisError> = conn.publish(&self.channel, payload).await;

        match result {
            Ok(receivers) => {
                debug!(target: "cs.events", receivers, "Event published");
            }
            Err(e) => {
                warn!(target: "cs.events", error = %e, "Failed to publish event");
            }
        }
    }
}
