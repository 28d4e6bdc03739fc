//! Deferred work.
//!
//! Handlers never sleep or spawn timers. They submit a [`ScheduledTask`] with
//! a delay and return; the task is later handed to
//! [`TaskDispatcher`](crate::tasks::TaskDispatcher). Each task carries all of
//! its own state, so a chain of health checks is just a sequence of
//! independent submissions.

use crate::errors::ConferenceError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduledTask {
    /// Room self-expiry.
    DeleteConference { conference_id: Uuid },
    /// Leg reconciliation health check.
    ConferencecallHealthCheck {
        conferencecall_id: Uuid,
        retry_count: u32,
    },
    /// Leave request for one leg of a draining room.
    ConferencecallKick { conferencecall_id: Uuid },
}

impl ScheduledTask {
    /// Identity of the pending entry. Submitting a task whose key is already
    /// pending replaces that entry.
    ///
    /// Health checks for one leg share a key regardless of retry count, so a
    /// leg never has more than one health check pending.
    pub fn key(&self) -> String {
        match self {
            ScheduledTask::DeleteConference { conference_id } => {
                format!("delete_conference:{}", conference_id)
            }
            ScheduledTask::ConferencecallHealthCheck {
                conferencecall_id, ..
            } => format!("conferencecall_health_check:{}", conferencecall_id),
            ScheduledTask::ConferencecallKick { conferencecall_id } => {
                format!("conferencecall_kick:{}", conferencecall_id)
            }
        }
    }
}

/// Delayed execution of [`ScheduledTask`]s.
#[async_trait::async_trait]
pub trait Scheduler: Send + Sync {
    async fn submit(&self, delay: Duration, task: ScheduledTask) -> Result<(), ConferenceError>;
}
