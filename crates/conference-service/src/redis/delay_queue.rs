//! Durable delay queue in Redis.
//!
//! Tasks survive process restarts: a room's self-expiry submitted before a
//! crash still fires once any instance polls the queue again.

use crate::errors::ConferenceError;
use crate::redis::lua_scripts;
use crate::services::scheduler::{ScheduledTask, Scheduler};
use crate::tasks::delay_queue_worker::DueTasks;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::Script;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default sorted-set key; the payload hash lives at `<key>:payloads`.
pub const DEFAULT_DELAY_QUEUE_KEY: &str = "conference:delay_queue";

#[derive(Clone)]
pub struct RedisDelayQueue {
    connection: MultiplexedConnection,
    queue_key: String,
    payload_key: String,
    schedule_script: Script,
    pop_due_script: Script,
}

impl RedisDelayQueue {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self::with_key(connection, DEFAULT_DELAY_QUEUE_KEY)
    }

    pub fn with_key(connection: MultiplexedConnection, queue_key: &str) -> Self {
        Self {
            connection,
            queue_key: queue_key.to_string(),
            payload_key: format!("{queue_key}:payloads"),
            schedule_script: Script::new(lua_scripts::SCHEDULE),
            pop_due_script: Script::new(lua_scripts::POP_DUE),
        }
    }
}

fn due_at_millis(delay: Duration) -> i64 {
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_add(delay_ms)
}

#[async_trait::async_trait]
impl Scheduler for RedisDelayQueue {
    #[instrument(skip_all, fields(task_key = %task.key(), delay_ms = delay.as_millis() as u64))]
    async fn submit(&self, delay: Duration, task: ScheduledTask) -> Result<(), ConferenceError> {
        let mut conn = self.connection.clone();
        let payload = serde_json::to_string(&task)
            .map_err(|e| ConferenceError::Internal(format!("Failed to serialize task: {e}")))?;

        let added: i64 = self
            .schedule_script
            .key(&self.queue_key)
            .key(&self.payload_key)
            .arg(task.key())
            .arg(due_at_millis(delay))
            .arg(payload)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "cs.tasks", error = %e, "Failed to schedule task");
                ConferenceError::Redis(format!("Failed to schedule task: {e}"))
            })?;

        debug!(target: "cs.tasks", replaced = added == 0, "Task scheduled");
        Ok(())
    }
}

#[async_trait::async_trait]
impl DueTasks for RedisDelayQueue {
    async fn pop_due(&self, limit: usize) -> Result<Vec<ScheduledTask>, ConferenceError> {
        let mut conn = self.connection.clone();

        let payloads: Vec<String> = self
            .pop_due_script
            .key(&self.queue_key)
            .key(&self.payload_key)
            .arg(Utc::now().timestamp_millis())
            .arg(limit)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "cs.tasks", error = %e, "Failed to pop due tasks");
                ConferenceError::Redis(format!("Failed to pop due tasks: {e}"))
            })?;

        // A payload that no longer decodes is dropped rather than retried forever.
        let tasks = payloads
            .iter()
            .filter_map(|payload| match serde_json::from_str(payload) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(target: "cs.tasks", error = %e, "Dropping undecodable task payload");
                    None
                }
            })
            .collect();

        Ok(tasks)
    }
}
