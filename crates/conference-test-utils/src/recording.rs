//! Recording doubles for the outbound seams: events, scheduled tasks and
//! metrics.

use conference_service::errors::ConferenceError;
use conference_service::models::{ConferenceType, ConferencecallStatus, DomainEvent};
use conference_service::observability::MetricsSink;
use conference_service::services::{EventPublisher, ScheduledTask, Scheduler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Wire names of the published events, in order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(DomainEvent::event_type)
            .collect()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.event_types()
            .into_iter()
            .filter(|t| *t == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: DomainEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Scheduler that only records. Tests run due work themselves, which makes
/// whole retry chains deterministic.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    submitted: Mutex<Vec<(Duration, ScheduledTask)>>,
    failing: AtomicBool,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything submitted so far, in order.
    pub fn submitted(&self) -> Vec<(Duration, ScheduledTask)> {
        self.submitted.lock().unwrap().clone()
    }

    /// Drain the submissions.
    pub fn take(&self) -> Vec<(Duration, ScheduledTask)> {
        std::mem::take(&mut *self.submitted.lock().unwrap())
    }

    /// Drain and return the single submission. Panics unless exactly one.
    pub fn take_one(&self) -> (Duration, ScheduledTask) {
        let mut taken = self.take();
        assert_eq!(taken.len(), 1, "expected one scheduled task, got {taken:?}");
        taken.remove(0)
    }
}

#[async_trait::async_trait]
impl Scheduler for ManualScheduler {
    async fn submit(&self, delay: Duration, task: ScheduledTask) -> Result<(), ConferenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConferenceError::Redis("injected scheduler failure".to_string()));
        }
        self.submitted.lock().unwrap().push((delay, task));
        Ok(())
    }
}

/// Metrics sink that keeps every observation.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    pub conferences_created: Mutex<Vec<ConferenceType>>,
    pub conferences_destroyed: Mutex<Vec<ConferenceType>>,
    pub conferencecall_statuses: Mutex<Vec<ConferencecallStatus>>,
    pub health_checks: Mutex<Vec<&'static str>>,
    pub call_control_requests: Mutex<Vec<(&'static str, &'static str)>>,
    pub storage_queries: Mutex<Vec<(&'static str, &'static str)>>,
}

impl RecordingMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destroyed_count(&self) -> usize {
        self.conferences_destroyed.lock().unwrap().len()
    }

    pub fn health_check_outcomes(&self) -> Vec<&'static str> {
        self.health_checks.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn conference_created(&self, conference_type: ConferenceType) {
        self.conferences_created.lock().unwrap().push(conference_type);
    }

    fn conference_destroyed(&self, conference_type: ConferenceType) {
        self.conferences_destroyed
            .lock()
            .unwrap()
            .push(conference_type);
    }

    fn conferencecall_status(&self, status: ConferencecallStatus) {
        self.conferencecall_statuses.lock().unwrap().push(status);
    }

    fn health_check(&self, outcome: &'static str) {
        self.health_checks.lock().unwrap().push(outcome);
    }

    fn call_control_request(&self, operation: &'static str, status: &'static str, _duration: Duration) {
        self.call_control_requests
            .lock()
            .unwrap()
            .push((operation, status));
    }

    fn storage_query(&self, operation: &'static str, status: &'static str, _duration: Duration) {
        self.storage_queries.lock().unwrap().push((operation, status));
    }
}
