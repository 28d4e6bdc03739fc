//! Conference (room) model.

use crate::errors::ConferenceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timeout applied when a caller asks for a positive timeout below the floor.
pub const DEFAULT_CONFERENCE_TIMEOUT_SECONDS: i32 = 86_400;

/// Smallest positive timeout accepted as-is.
pub const MIN_CONFERENCE_TIMEOUT_SECONDS: i32 = 60;

/// Opaque caller-supplied key/value data attached to a room.
pub type ConferenceData = HashMap<String, serde_json::Value>;

/// Room type. Selects the bridge kind and the post-removal policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConferenceType {
    #[default]
    Conference,
    Connect,
    Queue,
}

impl ConferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConferenceType::Conference => "conference",
            ConferenceType::Connect => "connect",
            ConferenceType::Queue => "queue",
        }
    }
}

impl fmt::Display for ConferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConferenceType {
    type Err = ConferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conference" => Ok(ConferenceType::Conference),
            "connect" => Ok(ConferenceType::Connect),
            "queue" => Ok(ConferenceType::Queue),
            other => Err(ConferenceError::Invalid(format!(
                "unknown conference type '{}'",
                other
            ))),
        }
    }
}

/// Room lifecycle status.
///
/// Declaration order is lifecycle order; a room only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConferenceStatus {
    Starting,
    Progressing,
    Terminating,
    Terminated,
}

impl ConferenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConferenceStatus::Starting => "starting",
            ConferenceStatus::Progressing => "progressing",
            ConferenceStatus::Terminating => "terminating",
            ConferenceStatus::Terminated => "terminated",
        }
    }

    /// Whether `next` is strictly later in the lifecycle.
    pub fn can_advance_to(&self, next: ConferenceStatus) -> bool {
        next > *self
    }

    /// Every status that may move to `self`.
    pub fn predecessors(&self) -> Vec<ConferenceStatus> {
        [
            ConferenceStatus::Starting,
            ConferenceStatus::Progressing,
            ConferenceStatus::Terminating,
            ConferenceStatus::Terminated,
        ]
        .into_iter()
        .filter(|status| status.can_advance_to(*self))
        .collect()
    }

    /// Terminating or terminated.
    pub fn is_winding_down(&self) -> bool {
        matches!(
            self,
            ConferenceStatus::Terminating | ConferenceStatus::Terminated
        )
    }
}

impl fmt::Display for ConferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConferenceStatus {
    type Err = ConferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(ConferenceStatus::Starting),
            "progressing" => Ok(ConferenceStatus::Progressing),
            "terminating" => Ok(ConferenceStatus::Terminating),
            "terminated" => Ok(ConferenceStatus::Terminated),
            other => Err(ConferenceError::Invalid(format!(
                "unknown conference status '{}'",
                other
            ))),
        }
    }
}

/// Apply the timeout floor.
///
/// `0` means no expiry. A positive value below
/// [`MIN_CONFERENCE_TIMEOUT_SECONDS`] is raised to
/// [`DEFAULT_CONFERENCE_TIMEOUT_SECONDS`]. Negative values are rejected.
pub fn normalize_timeout(timeout_seconds: i32) -> Result<i32, ConferenceError> {
    if timeout_seconds < 0 {
        return Err(ConferenceError::Invalid(format!(
            "timeout must not be negative, got {}",
            timeout_seconds
        )));
    }

    if timeout_seconds > 0 && timeout_seconds < MIN_CONFERENCE_TIMEOUT_SECONDS {
        return Ok(DEFAULT_CONFERENCE_TIMEOUT_SECONDS);
    }

    Ok(timeout_seconds)
}

/// A conference room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conference {
    pub id: Uuid,
    pub customer_id: Uuid,
    /// External bridge handle. Set once at creation.
    pub confbridge_id: Uuid,
    #[serde(rename = "type")]
    pub conference_type: ConferenceType,
    pub status: ConferenceStatus,
    pub name: String,
    pub detail: String,
    pub data: ConferenceData,
    /// Seconds until the room deletes itself; 0 disables expiry.
    pub timeout_seconds: i32,
    pub pre_flow_id: Option<Uuid>,
    pub post_flow_id: Option<Uuid>,
    /// Legs currently known to be in the room.
    pub conferencecall_ids: Vec<Uuid>,
    pub recording_id: Option<Uuid>,
    pub recording_ids: Vec<Uuid>,
    pub transcribe_id: Option<Uuid>,
    pub transcribe_ids: Vec<Uuid>,
    pub tm_end: Option<DateTime<Utc>>,
    pub tm_create: DateTime<Utc>,
    pub tm_update: Option<DateTime<Utc>>,
    pub tm_delete: Option<DateTime<Utc>>,
}

impl Conference {
    pub fn is_deleted(&self) -> bool {
        self.tm_delete.is_some()
    }
}

/// Sparse field update for a [`Conference`].
///
/// Only `Some` fields are written. `Option<Option<_>>` fields distinguish
/// "leave alone" from "clear".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConferenceUpdate {
    pub name: Option<String>,
    pub detail: Option<String>,
    pub data: Option<ConferenceData>,
    pub timeout_seconds: Option<i32>,
    pub pre_flow_id: Option<Option<Uuid>>,
    pub post_flow_id: Option<Option<Uuid>>,
    pub status: Option<ConferenceStatus>,
    pub recording_id: Option<Option<Uuid>>,
    pub transcribe_id: Option<Option<Uuid>>,
    pub tm_end: Option<DateTime<Utc>>,
}

impl ConferenceUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn data(mut self, data: ConferenceData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn timeout_seconds(mut self, timeout_seconds: i32) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn pre_flow_id(mut self, pre_flow_id: Option<Uuid>) -> Self {
        self.pre_flow_id = Some(pre_flow_id);
        self
    }

    pub fn post_flow_id(mut self, post_flow_id: Option<Uuid>) -> Self {
        self.post_flow_id = Some(post_flow_id);
        self
    }

    pub fn status(mut self, status: ConferenceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn recording_id(mut self, recording_id: Option<Uuid>) -> Self {
        self.recording_id = Some(recording_id);
        self
    }

    pub fn transcribe_id(mut self, transcribe_id: Option<Uuid>) -> Self {
        self.transcribe_id = Some(transcribe_id);
        self
    }

    pub fn tm_end(mut self, tm_end: DateTime<Utc>) -> Self {
        self.tm_end = Some(tm_end);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the set fields to an in-memory record.
    pub fn apply(&self, conference: &mut Conference) {
        if let Some(name) = &self.name {
            conference.name = name.clone();
        }
        if let Some(detail) = &self.detail {
            conference.detail = detail.clone();
        }
        if let Some(data) = &self.data {
            conference.data = data.clone();
        }
        if let Some(timeout_seconds) = self.timeout_seconds {
            conference.timeout_seconds = timeout_seconds;
        }
        if let Some(pre_flow_id) = self.pre_flow_id {
            conference.pre_flow_id = pre_flow_id;
        }
        if let Some(post_flow_id) = self.post_flow_id {
            conference.post_flow_id = post_flow_id;
        }
        if let Some(status) = self.status {
            conference.status = status;
        }
        if let Some(recording_id) = self.recording_id {
            conference.recording_id = recording_id;
        }
        if let Some(transcribe_id) = self.transcribe_id {
            conference.transcribe_id = transcribe_id;
        }
        if let Some(tm_end) = self.tm_end {
            conference.tm_end = Some(tm_end);
        }
    }
}

/// Filter for listing conferences. Deleted rooms are excluded unless
/// `include_deleted` is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConferenceFilter {
    pub customer_id: Option<Uuid>,
    pub conference_type: Option<ConferenceType>,
    pub status: Option<ConferenceStatus>,
    pub include_deleted: bool,
}

impl ConferenceFilter {
    pub fn matches(&self, conference: &Conference) -> bool {
        self.customer_id.map_or(true, |c| c == conference.customer_id)
            && self
                .conference_type
                .map_or(true, |t| t == conference.conference_type)
            && self.status.map_or(true, |s| s == conference.status)
            && (self.include_deleted || !conference.is_deleted())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample() -> Conference {
        Conference {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            confbridge_id: Uuid::new_v4(),
            conference_type: ConferenceType::Conference,
            status: ConferenceStatus::Progressing,
            name: "standup".to_string(),
            detail: String::new(),
            data: ConferenceData::new(),
            timeout_seconds: 0,
            pre_flow_id: None,
            post_flow_id: None,
            conferencecall_ids: vec![],
            recording_id: None,
            recording_ids: vec![],
            transcribe_id: None,
            transcribe_ids: vec![],
            tm_end: None,
            tm_create: Utc::now(),
            tm_update: None,
            tm_delete: None,
        }
    }

    #[test]
    fn test_normalize_timeout() {
        assert_eq!(normalize_timeout(0).unwrap(), 0);
        assert_eq!(normalize_timeout(1).unwrap(), DEFAULT_CONFERENCE_TIMEOUT_SECONDS);
        assert_eq!(normalize_timeout(30).unwrap(), 86_400);
        assert_eq!(normalize_timeout(59).unwrap(), 86_400);
        assert_eq!(normalize_timeout(60).unwrap(), 60);
        assert_eq!(normalize_timeout(120).unwrap(), 120);
        assert!(matches!(
            normalize_timeout(-5),
            Err(ConferenceError::Invalid(_))
        ));
    }

    #[test]
    fn test_status_only_moves_forward() {
        use ConferenceStatus::*;

        assert!(Starting.can_advance_to(Progressing));
        assert!(Progressing.can_advance_to(Terminating));
        assert!(Progressing.can_advance_to(Terminated));
        assert!(Terminating.can_advance_to(Terminated));

        assert!(!Terminated.can_advance_to(Terminating));
        assert!(!Terminating.can_advance_to(Progressing));
        assert!(!Progressing.can_advance_to(Progressing));
    }

    #[test]
    fn test_predecessors() {
        use ConferenceStatus::*;

        assert!(Starting.predecessors().is_empty());
        assert_eq!(Terminating.predecessors(), vec![Starting, Progressing]);
        assert_eq!(
            Terminated.predecessors(),
            vec![Starting, Progressing, Terminating]
        );
    }

    #[test]
    fn test_type_and_status_parse() {
        assert_eq!(
            "connect".parse::<ConferenceType>().unwrap(),
            ConferenceType::Connect
        );
        assert!("webinar".parse::<ConferenceType>().is_err());
        assert_eq!(
            "terminating".parse::<ConferenceStatus>().unwrap(),
            ConferenceStatus::Terminating
        );
        assert!("paused".parse::<ConferenceStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case_and_type_key() {
        let conference = sample();
        let json = serde_json::to_value(&conference).unwrap();

        assert_eq!(json["type"], "conference");
        assert_eq!(json["status"], "progressing");
        assert!(json["tm_delete"].is_null());

        let back: Conference = serde_json::from_value(json).unwrap();
        assert_eq!(back, conference);
    }

    #[test]
    fn test_update_apply_and_empty() {
        assert!(ConferenceUpdate::new().is_empty());

        let recording = Uuid::new_v4();
        let update = ConferenceUpdate::new()
            .name("retro")
            .status(ConferenceStatus::Terminating)
            .recording_id(Some(recording))
            .pre_flow_id(None);
        assert!(!update.is_empty());

        let mut conference = sample();
        conference.pre_flow_id = Some(Uuid::new_v4());
        update.apply(&mut conference);

        assert_eq!(conference.name, "retro");
        assert_eq!(conference.status, ConferenceStatus::Terminating);
        assert_eq!(conference.recording_id, Some(recording));
        assert_eq!(conference.pre_flow_id, None);
        // untouched
        assert!(conference.recording_ids.is_empty());
        assert_eq!(conference.detail, "");
    }

    #[test]
    fn test_filter_excludes_deleted_by_default() {
        let mut conference = sample();
        let filter = ConferenceFilter {
            customer_id: Some(conference.customer_id),
            ..Default::default()
        };
        assert!(filter.matches(&conference));

        conference.tm_delete = Some(Utc::now());
        assert!(!filter.matches(&conference));

        let filter = ConferenceFilter {
            include_deleted: true,
            ..filter
        };
        assert!(filter.matches(&conference));
    }
}
