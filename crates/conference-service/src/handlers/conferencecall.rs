//! Conferencecall handler: the leg state machine.
//!
//! Legs only move forward (`joining -> joined -> leaving -> leaved`).
//! Inbound bridge events are neither ordered nor exactly-once, so every
//! transition entry point tolerates being called for a leg that is already
//! at or past the target status.

use super::conference::ConferenceHandler;
use crate::config::Config;
use crate::errors::ConferenceError;
use crate::models::{
    Conferencecall, ConferencecallFilter, ConferencecallStatus, DomainEvent, ReferenceType,
};
use crate::observability::MetricsSink;
use crate::repositories::Store;
use crate::services::{CallControl, Clock, EventPublisher, ScheduledTask, Scheduler};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Health-check tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckSettings {
    /// Delay between checks.
    pub delay: Duration,
    /// Consecutive unhealthy checks tolerated before the leg is ejected.
    pub retry_max: u32,
    /// Legs older than this are unhealthy.
    pub max_duration: Duration,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            retry_max: 2,
            max_duration: Duration::from_secs(86_400),
        }
    }
}

impl From<&Config> for HealthCheckSettings {
    fn from(config: &Config) -> Self {
        Self {
            delay: config.health_check_delay,
            retry_max: config.health_check_retry_max,
            max_duration: config.conferencecall_max_duration,
        }
    }
}

/// Request to place a leg into a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateConferencecall {
    pub customer_id: Uuid,
    pub activeflow_id: Option<Uuid>,
    pub conference_id: Uuid,
    pub reference_type: ReferenceType,
    pub reference_id: Uuid,
}

pub struct ConferencecallHandler {
    pub(super) store: Arc<Store>,
    pub(super) conference_handler: Arc<ConferenceHandler>,
    pub(super) call_control: Arc<dyn CallControl>,
    pub(super) publisher: Arc<dyn EventPublisher>,
    pub(super) scheduler: Arc<dyn Scheduler>,
    pub(super) metrics: Arc<dyn MetricsSink>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) settings: HealthCheckSettings,
}

impl ConferencecallHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        conference_handler: Arc<ConferenceHandler>,
        call_control: Arc<dyn CallControl>,
        publisher: Arc<dyn EventPublisher>,
        scheduler: Arc<dyn Scheduler>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
        settings: HealthCheckSettings,
    ) -> Self {
        Self {
            store,
            conference_handler,
            call_control,
            publisher,
            scheduler,
            metrics,
            clock,
            settings,
        }
    }

    /// Register a leg that is being directed into a room.
    ///
    /// The leg starts `joining` and its health-check chain is started. The
    /// room must exist and still be accepting members.
    #[instrument(skip_all, fields(conference_id = %request.conference_id, reference_id = %request.reference_id))]
    pub async fn create(
        &self,
        request: CreateConferencecall,
    ) -> Result<Conferencecall, ConferenceError> {
        let conference = self.conference_handler.get(request.conference_id).await?;
        if conference.status.is_winding_down() || conference.is_deleted() {
            return Err(ConferenceError::Conflict(format!(
                "conference {} is {}",
                conference.id, conference.status
            )));
        }

        let conferencecall = Conferencecall {
            id: Uuid::new_v4(),
            customer_id: request.customer_id,
            activeflow_id: request.activeflow_id,
            conference_id: request.conference_id,
            reference_type: request.reference_type,
            reference_id: request.reference_id,
            status: ConferencecallStatus::Joining,
            tm_create: DateTime::<Utc>::default(),
            tm_update: None,
            tm_delete: None,
        };
        let id = conferencecall.id;

        self.store.conferencecall_create(conferencecall).await?;
        let conferencecall = self.store.conferencecall_get(id).await?;

        self.metrics.conferencecall_status(conferencecall.status);
        self.publisher
            .publish(DomainEvent::conferencecall(conferencecall.clone()))
            .await;

        self.schedule_health_check(id, 0).await;

        info!(target: "cs.handler.conferencecall", conferencecall_id = %id, "Conferencecall created");
        Ok(conferencecall)
    }

    pub async fn get(&self, id: Uuid) -> Result<Conferencecall, ConferenceError> {
        self.store.conferencecall_get(id).await
    }

    pub async fn get_by_reference_id(
        &self,
        reference_id: Uuid,
    ) -> Result<Conferencecall, ConferenceError> {
        self.store
            .conferencecall_get_by_reference_id(reference_id)
            .await
    }

    pub async fn list(
        &self,
        size: u32,
        token: Option<DateTime<Utc>>,
        filter: &ConferencecallFilter,
    ) -> Result<Vec<Conferencecall>, ConferenceError> {
        self.store.conferencecall_list(size, token, filter).await
    }

    /// The leg entered the bridge.
    ///
    /// Only a `joining` leg moves. Anything later is returned unchanged.
    #[instrument(skip_all, fields(conferencecall_id = %conferencecall.id))]
    pub async fn joined(
        &self,
        conferencecall: &Conferencecall,
    ) -> Result<Conferencecall, ConferenceError> {
        let current = self.store.conferencecall_get(conferencecall.id).await?;
        if !current.status.can_advance_to(ConferencecallStatus::Joined) {
            debug!(target: "cs.handler.conferencecall", status = %current.status, "Ignoring joined notification");
            return Ok(current);
        }

        let Some(joined) = self
            .transition(current.id, ConferencecallStatus::Joined)
            .await?
        else {
            return self.store.conferencecall_get(current.id).await;
        };
        self.conference_handler
            .add_conferencecall_id(joined.conference_id, joined.id)
            .await?;

        Ok(joined)
    }

    /// Request that the leg leave its room. Idempotent.
    ///
    /// Moves the leg to `leaving` and kicks it off the room's bridge. A
    /// failed kick is returned as an error; the leg stays `leaving` and its
    /// health check eventually reaps it.
    #[instrument(skip_all, fields(conferencecall_id = %id))]
    pub async fn terminate(&self, id: Uuid) -> Result<Conferencecall, ConferenceError> {
        let current = self.store.conferencecall_get(id).await?;
        if current.status.is_departing() {
            debug!(target: "cs.handler.conferencecall", status = %current.status, "Conferencecall already leaving");
            return Ok(current);
        }

        let Some(leaving) = self.transition(id, ConferencecallStatus::Leaving).await? else {
            return self.store.conferencecall_get(id).await;
        };

        let conference = self.conference_handler.get(leaving.conference_id).await?;
        self.call_control
            .kick(conference.confbridge_id, leaving.reference_id)
            .await
            .map_err(|e| {
                warn!(target: "cs.handler.conferencecall", error = %e, confbridge_id = %conference.confbridge_id, "Failed to kick leg from bridge");
                ConferenceError::Upstream(format!("kick failed: {}", e))
            })?;

        Ok(leaving)
    }

    /// The leg left the bridge. Terminal.
    #[instrument(skip_all, fields(conferencecall_id = %conferencecall.id))]
    pub async fn terminated(
        &self,
        conferencecall: &Conferencecall,
    ) -> Result<Conferencecall, ConferenceError> {
        let current = self.store.conferencecall_get(conferencecall.id).await?;
        if current.status == ConferencecallStatus::Leaved {
            debug!(target: "cs.handler.conferencecall", "Conferencecall already leaved");
            return Ok(current);
        }

        let Some(leaved) = self
            .transition(current.id, ConferencecallStatus::Leaved)
            .await?
        else {
            return self.store.conferencecall_get(current.id).await;
        };
        self.conference_handler
            .remove_conferencecall_id(leaved.conference_id, leaved.id)
            .await?;

        info!(target: "cs.handler.conferencecall", conference_id = %leaved.conference_id, "Conferencecall leaved");
        Ok(leaved)
    }

    /// Persist a forward status change and announce it.
    ///
    /// `None` when a concurrent writer already moved the leg to `status` or
    /// past it; nothing is announced then.
    async fn transition(
        &self,
        id: Uuid,
        status: ConferencecallStatus,
    ) -> Result<Option<Conferencecall>, ConferenceError> {
        if !self.store.conferencecall_advance_status(id, status).await? {
            debug!(target: "cs.handler.conferencecall", status = %status, "Conferencecall already moved on, skipping transition");
            return Ok(None);
        }
        let conferencecall = self.store.conferencecall_get(id).await?;

        self.metrics.conferencecall_status(status);
        self.publisher
            .publish(DomainEvent::conferencecall(conferencecall.clone()))
            .await;

        debug!(target: "cs.handler.conferencecall", status = %status, "Conferencecall transitioned");
        Ok(Some(conferencecall))
    }

    pub(super) async fn schedule_health_check(&self, conferencecall_id: Uuid, retry_count: u32) {
        let task = ScheduledTask::ConferencecallHealthCheck {
            conferencecall_id,
            retry_count,
        };

        if let Err(e) = self.scheduler.submit(self.settings.delay, task).await {
            warn!(target: "cs.handler.conferencecall", error = %e, conferencecall_id = %conferencecall_id, "Failed to schedule health check");
        }
    }
}
