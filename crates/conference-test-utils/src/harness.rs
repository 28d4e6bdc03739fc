//! Every handler wired over the in-memory doubles.

use crate::clock::FixedClock;
use crate::fixtures::create_conferencecall_request;
use crate::mock_cache::MockCache;
use crate::mock_call_control::MockCallControl;
use crate::mock_repositories::{InMemoryConferenceRepository, InMemoryConferencecallRepository};
use crate::recording::{ManualScheduler, RecordingMetrics, RecordingPublisher};
use conference_service::handlers::{ConferenceHandler, ConferencecallHandler, HealthCheckSettings};
use conference_service::models::{Conference, Conferencecall};
use conference_service::relay::EventRelay;
use conference_service::repositories::Store;
use conference_service::services::{LegStatus, ScheduledTask};
use conference_service::tasks::{TaskDispatcher, TaskHandler};
use std::sync::Arc;

pub struct TestHarness {
    pub conferences: Arc<InMemoryConferenceRepository>,
    pub conferencecalls: Arc<InMemoryConferencecallRepository>,
    pub conference_cache: Arc<MockCache<Conference>>,
    pub conferencecall_cache: Arc<MockCache<Conferencecall>>,
    pub call_control: Arc<MockCallControl>,
    pub publisher: Arc<RecordingPublisher>,
    pub scheduler: Arc<ManualScheduler>,
    pub metrics: Arc<RecordingMetrics>,
    pub clock: Arc<FixedClock>,
    pub store: Arc<Store>,
    pub conference_handler: Arc<ConferenceHandler>,
    pub conferencecall_handler: Arc<ConferencecallHandler>,
    pub dispatcher: Arc<TaskDispatcher>,
    pub relay: Arc<EventRelay>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(HealthCheckSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: HealthCheckSettings) -> Self {
        let conferences = Arc::new(InMemoryConferenceRepository::new());
        let conferencecalls = Arc::new(InMemoryConferencecallRepository::new());
        let conference_cache = Arc::new(MockCache::<Conference>::new());
        let conferencecall_cache = Arc::new(MockCache::<Conferencecall>::new());
        let call_control = Arc::new(MockCallControl::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let metrics = Arc::new(RecordingMetrics::new());
        let clock = Arc::new(FixedClock::default());

        let store = Arc::new(Store::new(
            conferences.clone(),
            conferencecalls.clone(),
            conference_cache.clone(),
            conferencecall_cache.clone(),
            clock.clone(),
        ));

        let conference_handler = Arc::new(ConferenceHandler::new(
            store.clone(),
            call_control.clone(),
            publisher.clone(),
            scheduler.clone(),
            metrics.clone(),
        ));
        let conferencecall_handler = Arc::new(ConferencecallHandler::new(
            store.clone(),
            conference_handler.clone(),
            call_control.clone(),
            publisher.clone(),
            scheduler.clone(),
            metrics.clone(),
            clock.clone(),
            settings,
        ));
        let dispatcher = Arc::new(TaskDispatcher::new(
            conference_handler.clone(),
            conferencecall_handler.clone(),
        ));
        let relay = Arc::new(EventRelay::new(conferencecall_handler.clone()));

        Self {
            conferences,
            conferencecalls,
            conference_cache,
            conferencecall_cache,
            call_control,
            publisher,
            scheduler,
            metrics,
            clock,
            store,
            conference_handler,
            conferencecall_handler,
            dispatcher,
            relay,
        }
    }

    /// Run every task submitted so far, once. Tasks they submit in turn
    /// stay queued. Returns the tasks that ran.
    pub async fn run_scheduled(&self) -> Vec<ScheduledTask> {
        let tasks: Vec<ScheduledTask> = self.scheduler.take().into_iter().map(|(_, t)| t).collect();
        for task in &tasks {
            self.dispatcher.dispatch(*task).await;
        }
        tasks
    }

    /// A leg that has entered `conference`'s bridge and is externally
    /// healthy. Scheduled tasks from the join are left queued.
    pub async fn joined_leg(&self, conference: &Conference) -> Conferencecall {
        let request = create_conferencecall_request(conference);
        self.call_control.set_leg(
            request.reference_id,
            LegStatus::Progressing,
            Some(conference.confbridge_id),
        );

        let conferencecall = self
            .conferencecall_handler
            .create(request)
            .await
            .expect("create conferencecall");
        self.conferencecall_handler
            .joined(&conferencecall)
            .await
            .expect("join conferencecall")
    }
}
