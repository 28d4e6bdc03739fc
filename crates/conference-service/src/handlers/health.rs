//! Leg health check.
//!
//! A self-rescheduling check that reconciles a leg against the call-control
//! plane. It is the only thing that reaps legs whose "left bridge" event was
//! lost. Every failure along the way counts as "unhealthy"; a check never
//! fails hard.

use super::conferencecall::ConferencecallHandler;
use crate::models::{ConferenceStatus, Conferencecall, ConferencecallStatus};
use crate::services::LegStatus;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// What a single check concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheckOutcome {
    /// Retries exhausted; the leg was kicked and finalized. No further checks.
    Ejected,
    /// Unhealthy; the next check carries `retry_count`.
    Retrying { retry_count: u32 },
    /// The leg already left. No further checks.
    Stopped,
    /// Healthy; the next check starts from 0.
    Healthy,
}

impl HealthCheckOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthCheckOutcome::Ejected => "ejected",
            HealthCheckOutcome::Retrying { .. } => "retrying",
            HealthCheckOutcome::Stopped => "stopped",
            HealthCheckOutcome::Healthy => "healthy",
        }
    }
}

impl ConferencecallHandler {
    #[instrument(skip_all, fields(conferencecall_id = %id, retry_count = retry_count))]
    pub async fn health_check(&self, id: Uuid, retry_count: u32) -> HealthCheckOutcome {
        let outcome = self.evaluate(id, retry_count).await;

        match outcome {
            HealthCheckOutcome::Retrying { retry_count } => {
                self.schedule_health_check(id, retry_count).await;
            }
            HealthCheckOutcome::Healthy => self.schedule_health_check(id, 0).await,
            HealthCheckOutcome::Ejected | HealthCheckOutcome::Stopped => {}
        }

        self.metrics.health_check(outcome.as_str());
        outcome
    }

    async fn evaluate(&self, id: Uuid, retry_count: u32) -> HealthCheckOutcome {
        let unhealthy = HealthCheckOutcome::Retrying {
            retry_count: retry_count.saturating_add(1),
        };

        if retry_count > self.settings.retry_max {
            self.eject(id).await;
            return HealthCheckOutcome::Ejected;
        }

        let conferencecall = match self.store.conferencecall_get(id).await {
            Ok(conferencecall) => conferencecall,
            Err(e) => {
                debug!(target: "cs.handler.conferencecall", error = %e, "Health check could not load conferencecall");
                return unhealthy;
            }
        };

        if self.is_overdue(&conferencecall) {
            debug!(target: "cs.handler.conferencecall", "Conferencecall exceeded its maximum duration");
            return unhealthy;
        }

        if conferencecall.status == ConferencecallStatus::Leaved {
            return HealthCheckOutcome::Stopped;
        }

        let leg = match self.call_control.get_leg(conferencecall.reference_id).await {
            Ok(leg) if leg.status == LegStatus::Progressing => leg,
            Ok(leg) => {
                debug!(target: "cs.handler.conferencecall", leg_status = ?leg.status, "Leg is not progressing");
                return unhealthy;
            }
            Err(e) => {
                debug!(target: "cs.handler.conferencecall", error = %e, "Health check could not load leg");
                return unhealthy;
            }
        };

        let conference = match self
            .conference_handler
            .get(conferencecall.conference_id)
            .await
        {
            Ok(conference) if conference.status == ConferenceStatus::Progressing => conference,
            Ok(conference) => {
                debug!(target: "cs.handler.conferencecall", conference_status = %conference.status, "Conference is not progressing");
                return unhealthy;
            }
            Err(e) => {
                debug!(target: "cs.handler.conferencecall", error = %e, "Health check could not load conference");
                return unhealthy;
            }
        };

        if leg.confbridge_id != Some(conference.confbridge_id) {
            debug!(target: "cs.handler.conferencecall", "Leg is attached to a different bridge");
            return unhealthy;
        }

        HealthCheckOutcome::Healthy
    }

    fn is_overdue(&self, conferencecall: &Conferencecall) -> bool {
        self.clock
            .now()
            .signed_duration_since(conferencecall.tm_create)
            .to_std()
            .map(|age| age > self.settings.max_duration)
            .unwrap_or(false)
    }

    /// Force the leg out and finalize it. No "left bridge" event is coming
    /// for this leg, so it goes to `leaved` even when the kick fails.
    async fn eject(&self, id: Uuid) {
        info!(target: "cs.handler.conferencecall", "Health check retries exhausted, ejecting conferencecall");

        if let Err(e) = self.terminate(id).await {
            warn!(target: "cs.handler.conferencecall", error = %e, "Failed to terminate ejected conferencecall");
        }

        let conferencecall = match self.store.conferencecall_get(id).await {
            Ok(conferencecall) => conferencecall,
            Err(e) => {
                warn!(target: "cs.handler.conferencecall", error = %e, "Ejected conferencecall could not be loaded");
                return;
            }
        };

        if let Err(e) = self.terminated(&conferencecall).await {
            warn!(target: "cs.handler.conferencecall", error = %e, "Failed to finalize ejected conferencecall");
        }
    }
}
