//! Delay-queue worker.
//!
//! Polls the durable delay queue and hands due tasks to a [`TaskHandler`].
//! Tasks within one batch run concurrently.
//!
//! # Graceful Shutdown
//!
//! The worker exits when its cancellation token is triggered. A batch that
//! is already running completes first.

use super::dispatcher::TaskHandler;
use crate::errors::ConferenceError;
use crate::services::ScheduledTask;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Most tasks taken from the queue per poll.
pub const DELAY_QUEUE_BATCH_SIZE: usize = 100;

/// Source of tasks whose delay has elapsed.
#[async_trait::async_trait]
pub trait DueTasks: Send + Sync {
    /// Atomically remove and return up to `limit` due tasks.
    async fn pop_due(&self, limit: usize) -> Result<Vec<ScheduledTask>, ConferenceError>;
}

#[instrument(skip_all, name = "cs.task.delay_queue")]
pub async fn start_delay_queue_worker(
    source: Arc<dyn DueTasks>,
    handler: Arc<dyn TaskHandler>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "cs.tasks",
        poll_interval_ms = poll_interval.as_millis() as u64,
        "Starting delay queue worker"
    );

    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_due_tasks(source.as_ref(), handler.as_ref(), &cancel_token).await;
            }
            _ = cancel_token.cancelled() => {
                info!(target: "cs.tasks", "Delay queue worker received shutdown signal, exiting");
                break;
            }
        }
    }

    info!(target: "cs.tasks", "Delay queue worker stopped");
}

/// Drain everything currently due. Returns the number of tasks run.
pub(crate) async fn run_due_tasks(
    source: &dyn DueTasks,
    handler: &dyn TaskHandler,
    cancel_token: &CancellationToken,
) -> usize {
    let mut total = 0;

    while !cancel_token.is_cancelled() {
        let tasks = match source.pop_due(DELAY_QUEUE_BATCH_SIZE).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(target: "cs.tasks", error = %e, "Failed to poll delay queue");
                break;
            }
        };

        let batch = tasks.len();
        join_all(tasks.into_iter().map(|task| handler.dispatch(task))).await;
        total += batch;

        if batch < DELAY_QUEUE_BATCH_SIZE {
            break;
        }
    }

    total
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct QueueSource {
        tasks: Mutex<VecDeque<ScheduledTask>>,
        fail: Mutex<bool>,
    }

    impl QueueSource {
        fn push(&self, task: ScheduledTask) {
            self.tasks.lock().unwrap().push_back(task);
        }
    }

    #[async_trait::async_trait]
    impl DueTasks for QueueSource {
        async fn pop_due(&self, limit: usize) -> Result<Vec<ScheduledTask>, ConferenceError> {
            if *self.fail.lock().unwrap() {
                return Err(ConferenceError::Redis("connection refused".to_string()));
            }
            let mut tasks = self.tasks.lock().unwrap();
            let take = limit.min(tasks.len());
            Ok(tasks.drain(..take).collect())
        }
    }

    #[derive(Default)]
    struct CollectingHandler {
        seen: Mutex<Vec<ScheduledTask>>,
    }

    #[async_trait::async_trait]
    impl TaskHandler for CollectingHandler {
        async fn dispatch(&self, task: ScheduledTask) {
            self.seen.lock().unwrap().push(task);
        }
    }

    fn kick() -> ScheduledTask {
        ScheduledTask::ConferencecallKick {
            conferencecall_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_run_due_tasks_drains_more_than_one_batch() {
        let source = QueueSource::default();
        for _ in 0..(DELAY_QUEUE_BATCH_SIZE + 5) {
            source.push(kick());
        }
        let handler = CollectingHandler::default();

        let ran = run_due_tasks(&source, &handler, &CancellationToken::new()).await;

        assert_eq!(ran, DELAY_QUEUE_BATCH_SIZE + 5);
        assert_eq!(handler.seen.lock().unwrap().len(), DELAY_QUEUE_BATCH_SIZE + 5);
    }

    #[tokio::test]
    async fn test_run_due_tasks_survives_poll_failure() {
        let source = QueueSource::default();
        source.push(kick());
        *source.fail.lock().unwrap() = true;
        let handler = CollectingHandler::default();

        let ran = run_due_tasks(&source, &handler, &CancellationToken::new()).await;

        assert_eq!(ran, 0);
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_dispatches_and_stops_on_cancel() {
        let source = Arc::new(QueueSource::default());
        let handler = Arc::new(CollectingHandler::default());
        let task = kick();
        source.push(task);

        let cancel_token = CancellationToken::new();
        let worker = tokio::spawn(start_delay_queue_worker(
            source.clone(),
            handler.clone(),
            Duration::from_millis(500),
            cancel_token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert_eq!(handler.seen.lock().unwrap().as_slice(), &[task]);

        cancel_token.cancel();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker should stop after cancel")
            .unwrap();
    }
}
