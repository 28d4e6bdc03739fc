//! Conference handler: the room state machine.
//!
//! A room is created `progressing` on a fresh bridge, moves to `terminating`
//! when asked to wind down (every member is asked to leave), and reaches
//! `terminated` through [`ConferenceHandler::destroy`] once the last member
//! is gone. Explicit deletion soft-deletes the record on top of that.
//!
//! Side channels (expiry scheduling, per-member kicks, post-removal policy,
//! event publishing) are best-effort: their failures are logged and never
//! change the result of the primary write.

use super::policy::{post_removal_action, PostRemovalAction};
use crate::errors::ConferenceError;
use crate::models::{
    normalize_timeout, Conference, ConferenceData, ConferenceEventType, ConferenceFilter,
    ConferenceStatus, ConferenceType, ConferenceUpdate, DomainEvent,
};
use crate::observability::MetricsSink;
use crate::repositories::Store;
use crate::services::{CallControl, EventPublisher, RecordingParams, ScheduledTask, Scheduler};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Request to create a room.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateConference {
    /// Caller-chosen id; generated when `None`.
    pub id: Option<Uuid>,
    pub customer_id: Uuid,
    pub conference_type: ConferenceType,
    pub name: String,
    pub detail: String,
    pub data: ConferenceData,
    /// Subject to the timeout floor; 0 disables expiry.
    pub timeout_seconds: i32,
    pub pre_flow_id: Option<Uuid>,
    pub post_flow_id: Option<Uuid>,
}

/// Caller-editable room fields. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateConference {
    pub name: Option<String>,
    pub detail: Option<String>,
    pub data: Option<ConferenceData>,
    pub timeout_seconds: Option<i32>,
    pub pre_flow_id: Option<Option<Uuid>>,
    pub post_flow_id: Option<Option<Uuid>>,
}

pub struct ConferenceHandler {
    store: Arc<Store>,
    call_control: Arc<dyn CallControl>,
    publisher: Arc<dyn EventPublisher>,
    scheduler: Arc<dyn Scheduler>,
    metrics: Arc<dyn MetricsSink>,
}

impl ConferenceHandler {
    pub fn new(
        store: Arc<Store>,
        call_control: Arc<dyn CallControl>,
        publisher: Arc<dyn EventPublisher>,
        scheduler: Arc<dyn Scheduler>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            store,
            call_control,
            publisher,
            scheduler,
            metrics,
        }
    }

    /// Create a room on a new bridge.
    ///
    /// The bridge kind follows the room type. A room with a positive timeout
    /// gets a delayed self-deletion.
    #[instrument(skip_all, fields(customer_id = %request.customer_id, conference_type = %request.conference_type))]
    pub async fn create(&self, request: CreateConference) -> Result<Conference, ConferenceError> {
        let timeout_seconds = normalize_timeout(request.timeout_seconds)?;
        let id = request.id.unwrap_or_else(Uuid::new_v4);

        let confbridge_id = self
            .call_control
            .create_bridge(request.customer_id, request.conference_type.into())
            .await?;

        let conference = Conference {
            id,
            customer_id: request.customer_id,
            confbridge_id,
            conference_type: request.conference_type,
            status: ConferenceStatus::Progressing,
            name: request.name,
            detail: request.detail,
            data: request.data,
            timeout_seconds,
            pre_flow_id: request.pre_flow_id,
            post_flow_id: request.post_flow_id,
            conferencecall_ids: vec![],
            recording_id: None,
            recording_ids: vec![],
            transcribe_id: None,
            transcribe_ids: vec![],
            tm_end: None,
            tm_create: DateTime::<Utc>::default(),
            tm_update: None,
            tm_delete: None,
        };

        if let Err(e) = self.store.conference_create(conference).await {
            // Nothing references the bridge yet.
            if let Err(delete_err) = self.call_control.delete_bridge(confbridge_id).await {
                warn!(target: "cs.handler.conference", error = %delete_err, confbridge_id = %confbridge_id, "Failed to release bridge of unsaved conference");
            }
            return Err(e);
        }

        let conference = self.store.conference_get(id).await?;
        self.metrics.conference_created(conference.conference_type);
        self.publish(ConferenceEventType::Created, &conference).await;

        if conference.timeout_seconds > 0 {
            self.schedule_expiry(&conference).await;
        }

        info!(
            target: "cs.handler.conference",
            conference_id = %conference.id,
            confbridge_id = %conference.confbridge_id,
            timeout_seconds = conference.timeout_seconds,
            "Conference created"
        );

        Ok(conference)
    }

    pub async fn get(&self, id: Uuid) -> Result<Conference, ConferenceError> {
        self.store.conference_get(id).await
    }

    pub async fn get_by_confbridge_id(
        &self,
        confbridge_id: Uuid,
    ) -> Result<Conference, ConferenceError> {
        self.store
            .conference_get_by_confbridge_id(confbridge_id)
            .await
    }

    pub async fn list(
        &self,
        size: u32,
        token: Option<DateTime<Utc>>,
        filter: &ConferenceFilter,
    ) -> Result<Vec<Conference>, ConferenceError> {
        self.store.conference_list(size, token, filter).await
    }

    pub async fn count_by_customer_id(&self, customer_id: Uuid) -> Result<u64, ConferenceError> {
        self.store
            .conference_count_by_customer_id(customer_id)
            .await
    }

    /// Partial update of caller-editable fields.
    ///
    /// A live room with a positive timeout has its expiry re-armed from now.
    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateConference,
    ) -> Result<Conference, ConferenceError> {
        let mut update = ConferenceUpdate::new();
        update.name = request.name;
        update.detail = request.detail;
        update.data = request.data;
        update.pre_flow_id = request.pre_flow_id;
        update.post_flow_id = request.post_flow_id;
        update.timeout_seconds = request.timeout_seconds.map(normalize_timeout).transpose()?;

        self.store.conference_update(id, &update).await?;
        let conference = self.store.conference_get(id).await?;
        self.publish(ConferenceEventType::Updated, &conference).await;

        if conference.timeout_seconds > 0 && !conference.status.is_winding_down() {
            self.schedule_expiry(&conference).await;
        }

        Ok(conference)
    }

    /// Replace the opaque data map.
    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn update_data(
        &self,
        id: Uuid,
        data: ConferenceData,
    ) -> Result<Conference, ConferenceError> {
        self.store
            .conference_update(id, &ConferenceUpdate::new().data(data))
            .await?;
        let conference = self.store.conference_get(id).await?;
        self.publish(ConferenceEventType::Updated, &conference).await;
        Ok(conference)
    }

    #[instrument(skip_all, fields(conference_id = %id, conferencecall_id = %conferencecall_id))]
    pub async fn add_conferencecall_id(
        &self,
        id: Uuid,
        conferencecall_id: Uuid,
    ) -> Result<Conference, ConferenceError> {
        self.store
            .conference_add_conferencecall_id(id, conferencecall_id)
            .await?;
        let conference = self.store.conference_get(id).await?;
        self.publish(ConferenceEventType::Updated, &conference).await;
        Ok(conference)
    }

    /// Remove a member, then apply the room type's post-removal policy.
    ///
    /// The returned record is the one right after removal. Policy failures
    /// are logged only.
    #[instrument(skip_all, fields(conference_id = %id, conferencecall_id = %conferencecall_id))]
    pub async fn remove_conferencecall_id(
        &self,
        id: Uuid,
        conferencecall_id: Uuid,
    ) -> Result<Conference, ConferenceError> {
        self.store
            .conference_remove_conferencecall_id(id, conferencecall_id)
            .await?;
        let conference = self.store.conference_get(id).await?;
        self.publish(ConferenceEventType::Updated, &conference).await;

        if let Some(PostRemovalAction::Destroy) = post_removal_action(&conference) {
            if let Err(e) = self.destroy(&conference).await {
                warn!(target: "cs.handler.conference", error = %e, "Post-removal destroy failed");
            }
        }

        Ok(conference)
    }

    /// Start draining the room. Idempotent.
    ///
    /// Every current member gets a leave request. The room itself stays
    /// until the last member is removed.
    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn terminating(&self, id: Uuid) -> Result<Conference, ConferenceError> {
        let conference = self.store.conference_get(id).await?;
        if conference.status.is_winding_down() {
            debug!(target: "cs.handler.conference", status = %conference.status, "Conference already winding down");
            return Ok(conference);
        }

        if !self
            .store
            .conference_advance_status(id, ConferenceStatus::Terminating)
            .await?
        {
            debug!(target: "cs.handler.conference", "Conference wound down concurrently");
            return self.store.conference_get(id).await;
        }
        let conference = self.store.conference_get(id).await?;
        self.publish(ConferenceEventType::Updated, &conference).await;

        for conferencecall_id in &conference.conferencecall_ids {
            let task = ScheduledTask::ConferencecallKick {
                conferencecall_id: *conferencecall_id,
            };
            if let Err(e) = self.scheduler.submit(Duration::ZERO, task).await {
                warn!(target: "cs.handler.conference", error = %e, conferencecall_id = %conferencecall_id, "Failed to request leg kick");
            }
        }

        info!(
            target: "cs.handler.conference",
            members = conference.conferencecall_ids.len(),
            "Conference draining"
        );

        Ok(conference)
    }

    /// Final teardown. Always reaches `terminated`, even when the bridge
    /// cannot be deleted.
    #[instrument(skip_all, fields(conference_id = %conference.id))]
    pub async fn destroy(&self, conference: &Conference) -> Result<Conference, ConferenceError> {
        self.teardown(conference).await?;

        let conference = self.store.conference_get(conference.id).await?;
        self.publish(ConferenceEventType::Deleted, &conference).await;

        info!(target: "cs.handler.conference", "Conference destroyed");
        Ok(conference)
    }

    /// Explicit removal: drain, then soft-delete.
    ///
    /// A room with no members is torn down on the spot.
    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn delete_room(&self, id: Uuid) -> Result<Conference, ConferenceError> {
        let conference = self.terminating(id).await?;

        if conference.status == ConferenceStatus::Terminating
            && conference.conferencecall_ids.is_empty()
        {
            self.teardown(&conference).await?;
        }

        self.store.conference_delete(id).await?;
        let conference = self.store.conference_get(id).await?;
        self.publish(ConferenceEventType::Deleted, &conference).await;

        info!(target: "cs.handler.conference", "Conference deleted");
        Ok(conference)
    }

    /// Delayed self-deletion. Rooms that are already gone, or whose timeout
    /// was since set to 0, are left alone.
    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn expire(&self, id: Uuid) -> Result<Option<Conference>, ConferenceError> {
        let conference = self.store.conference_get(id).await?;

        if conference.is_deleted()
            || conference.status == ConferenceStatus::Terminated
            || conference.timeout_seconds == 0
        {
            debug!(target: "cs.handler.conference", "Skipping expiry");
            return Ok(None);
        }

        info!(target: "cs.handler.conference", timeout_seconds = conference.timeout_seconds, "Conference expired");
        self.delete_room(id).await.map(Some)
    }

    /// Set the current recording. `Some` is also appended to the history;
    /// `None` clears the current recording and keeps the history.
    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn update_recording_id(
        &self,
        id: Uuid,
        recording_id: Option<Uuid>,
    ) -> Result<Conference, ConferenceError> {
        self.store
            .conference_update(id, &ConferenceUpdate::new().recording_id(recording_id))
            .await?;
        if let Some(recording_id) = recording_id {
            self.store
                .conference_add_recording_id(id, recording_id)
                .await?;
        }

        let conference = self.store.conference_get(id).await?;
        self.publish(ConferenceEventType::Updated, &conference).await;
        Ok(conference)
    }

    /// Same as [`Self::update_recording_id`] for transcriptions.
    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn update_transcribe_id(
        &self,
        id: Uuid,
        transcribe_id: Option<Uuid>,
    ) -> Result<Conference, ConferenceError> {
        self.store
            .conference_update(id, &ConferenceUpdate::new().transcribe_id(transcribe_id))
            .await?;
        if let Some(transcribe_id) = transcribe_id {
            self.store
                .conference_add_transcribe_id(id, transcribe_id)
                .await?;
        }

        let conference = self.store.conference_get(id).await?;
        self.publish(ConferenceEventType::Updated, &conference).await;
        Ok(conference)
    }

    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn recording_start(
        &self,
        id: Uuid,
        params: &RecordingParams,
    ) -> Result<Conference, ConferenceError> {
        let conference = self.progressing(id).await?;
        if conference.recording_id.is_some() {
            return Err(ConferenceError::Conflict(
                "recording already in progress".to_string(),
            ));
        }

        let recording_id = self
            .call_control
            .start_recording(conference.customer_id, conference.confbridge_id, params)
            .await?;

        self.update_recording_id(id, Some(recording_id)).await
    }

    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn recording_stop(&self, id: Uuid) -> Result<Conference, ConferenceError> {
        let conference = self.progressing(id).await?;
        let Some(recording_id) = conference.recording_id else {
            return Err(ConferenceError::Conflict(
                "no recording in progress".to_string(),
            ));
        };

        self.call_control.stop_recording(recording_id).await?;
        self.update_recording_id(id, None).await
    }

    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn transcribe_start(
        &self,
        id: Uuid,
        language: &str,
    ) -> Result<Conference, ConferenceError> {
        let conference = self.progressing(id).await?;
        if conference.transcribe_id.is_some() {
            return Err(ConferenceError::Conflict(
                "transcription already in progress".to_string(),
            ));
        }

        let transcribe_id = self
            .call_control
            .start_transcription(conference.customer_id, conference.confbridge_id, language)
            .await?;

        self.update_transcribe_id(id, Some(transcribe_id)).await
    }

    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn transcribe_stop(&self, id: Uuid) -> Result<Conference, ConferenceError> {
        let conference = self.progressing(id).await?;
        let Some(transcribe_id) = conference.transcribe_id else {
            return Err(ConferenceError::Conflict(
                "no transcription in progress".to_string(),
            ));
        };

        self.call_control.stop_transcription(transcribe_id).await?;
        self.update_transcribe_id(id, None).await
    }

    async fn progressing(&self, id: Uuid) -> Result<Conference, ConferenceError> {
        let conference = self.store.conference_get(id).await?;
        if conference.status != ConferenceStatus::Progressing {
            return Err(ConferenceError::Conflict(format!(
                "conference is {}",
                conference.status
            )));
        }
        Ok(conference)
    }

    /// Release the bridge and end the record, without publishing. A room
    /// that is already terminated is left as it is.
    async fn teardown(&self, conference: &Conference) -> Result<(), ConferenceError> {
        if conference.status == ConferenceStatus::Terminated {
            debug!(target: "cs.handler.conference", "Conference already terminated, skipping teardown");
            return Ok(());
        }

        if let Err(e) = self
            .call_control
            .delete_bridge(conference.confbridge_id)
            .await
        {
            warn!(target: "cs.handler.conference", error = %e, confbridge_id = %conference.confbridge_id, "Failed to delete bridge, ending conference anyway");
        }

        if self.store.conference_end(conference.id).await? {
            self.metrics
                .conference_destroyed(conference.conference_type);
        } else {
            debug!(target: "cs.handler.conference", "Conference was ended concurrently");
        }
        Ok(())
    }

    async fn schedule_expiry(&self, conference: &Conference) {
        let delay = Duration::from_secs(u64::try_from(conference.timeout_seconds).unwrap_or(0));
        let task = ScheduledTask::DeleteConference {
            conference_id: conference.id,
        };

        if let Err(e) = self.scheduler.submit(delay, task).await {
            warn!(target: "cs.handler.conference", error = %e, conference_id = %conference.id, "Failed to schedule conference expiry");
        }
    }

    async fn publish(&self, event_type: ConferenceEventType, conference: &Conference) {
        self.publisher
            .publish(DomainEvent::conference(event_type, conference.clone()))
            .await;
    }
}
