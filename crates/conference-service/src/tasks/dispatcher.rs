//! Routes due scheduled tasks to their handlers.

use crate::handlers::{ConferenceHandler, ConferencecallHandler};
use crate::services::ScheduledTask;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Something that can run a due [`ScheduledTask`].
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task. Failures are logged by the implementation.
    async fn dispatch(&self, task: ScheduledTask);
}

pub struct TaskDispatcher {
    conference_handler: Arc<ConferenceHandler>,
    conferencecall_handler: Arc<ConferencecallHandler>,
}

impl TaskDispatcher {
    pub fn new(
        conference_handler: Arc<ConferenceHandler>,
        conferencecall_handler: Arc<ConferencecallHandler>,
    ) -> Self {
        Self {
            conference_handler,
            conferencecall_handler,
        }
    }
}

#[async_trait::async_trait]
impl TaskHandler for TaskDispatcher {
    #[instrument(skip_all, fields(task_key = %task.key()))]
    async fn dispatch(&self, task: ScheduledTask) {
        match task {
            ScheduledTask::DeleteConference { conference_id } => {
                match self.conference_handler.expire(conference_id).await {
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {
                        debug!(target: "cs.tasks", "Expired conference no longer exists");
                    }
                    Err(e) => {
                        warn!(target: "cs.tasks", error = %e, "Conference expiry failed");
                    }
                }
            }
            ScheduledTask::ConferencecallHealthCheck {
                conferencecall_id,
                retry_count,
            } => {
                let outcome = self
                    .conferencecall_handler
                    .health_check(conferencecall_id, retry_count)
                    .await;
                debug!(target: "cs.tasks", outcome = outcome.as_str(), "Health check ran");
            }
            ScheduledTask::ConferencecallKick { conferencecall_id } => {
                if let Err(e) = self
                    .conferencecall_handler
                    .terminate(conferencecall_id)
                    .await
                {
                    warn!(target: "cs.tasks", error = %e, "Drain kick failed");
                }
            }
        }
    }
}
