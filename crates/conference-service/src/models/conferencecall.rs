//! Conferencecall (participant leg) model.

use crate::errors::ConferenceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What kind of external entity the leg refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Call,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Call => "call",
        }
    }
}

impl FromStr for ReferenceType {
    type Err = ConferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call" => Ok(ReferenceType::Call),
            other => Err(ConferenceError::Invalid(format!(
                "unknown reference type '{}'",
                other
            ))),
        }
    }
}

/// Leg lifecycle status.
///
/// Declaration order is lifecycle order. `Leaved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConferencecallStatus {
    Joining,
    Joined,
    Leaving,
    Leaved,
}

impl ConferencecallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConferencecallStatus::Joining => "joining",
            ConferencecallStatus::Joined => "joined",
            ConferencecallStatus::Leaving => "leaving",
            ConferencecallStatus::Leaved => "leaved",
        }
    }

    /// Whether `next` is strictly later in the lifecycle.
    ///
    /// Skipping is allowed (`joining -> leaving`, `joined -> leaved`),
    /// moving back or standing still is not.
    pub fn can_advance_to(&self, next: ConferencecallStatus) -> bool {
        next > *self
    }

    /// Every status that may move to `self`. Used as the guard on
    /// conditional status writes.
    pub fn predecessors(&self) -> Vec<ConferencecallStatus> {
        [
            ConferencecallStatus::Joining,
            ConferencecallStatus::Joined,
            ConferencecallStatus::Leaving,
            ConferencecallStatus::Leaved,
        ]
        .into_iter()
        .filter(|status| status.can_advance_to(*self))
        .collect()
    }

    /// Leaving or leaved: a leave was already requested or confirmed.
    pub fn is_departing(&self) -> bool {
        matches!(
            self,
            ConferencecallStatus::Leaving | ConferencecallStatus::Leaved
        )
    }
}

impl fmt::Display for ConferencecallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConferencecallStatus {
    type Err = ConferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "joining" => Ok(ConferencecallStatus::Joining),
            "joined" => Ok(ConferencecallStatus::Joined),
            "leaving" => Ok(ConferencecallStatus::Leaving),
            "leaved" => Ok(ConferencecallStatus::Leaved),
            other => Err(ConferenceError::Invalid(format!(
                "unknown conferencecall status '{}'",
                other
            ))),
        }
    }
}

/// One participant leg inside a conference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conferencecall {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub activeflow_id: Option<Uuid>,
    /// Parent room. Fixed for the lifetime of the leg.
    pub conference_id: Uuid,
    pub reference_type: ReferenceType,
    /// External leg identifier known to the call-control plane.
    pub reference_id: Uuid,
    pub status: ConferencecallStatus,
    pub tm_create: DateTime<Utc>,
    pub tm_update: Option<DateTime<Utc>>,
    pub tm_delete: Option<DateTime<Utc>>,
}

impl Conferencecall {
    pub fn is_deleted(&self) -> bool {
        self.tm_delete.is_some()
    }
}

/// Sparse field update for a [`Conferencecall`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConferencecallUpdate {
    pub status: Option<ConferencecallStatus>,
}

impl ConferencecallUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: ConferencecallStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
    }

    pub fn apply(&self, conferencecall: &mut Conferencecall) {
        if let Some(status) = self.status {
            conferencecall.status = status;
        }
    }
}

/// Filter for listing legs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConferencecallFilter {
    pub customer_id: Option<Uuid>,
    pub conference_id: Option<Uuid>,
    pub status: Option<ConferencecallStatus>,
    pub include_deleted: bool,
}

impl ConferencecallFilter {
    pub fn matches(&self, conferencecall: &Conferencecall) -> bool {
        self.customer_id
            .map_or(true, |c| c == conferencecall.customer_id)
            && self
                .conference_id
                .map_or(true, |c| c == conferencecall.conference_id)
            && self.status.map_or(true, |s| s == conferencecall.status)
            && (self.include_deleted || !conferencecall.is_deleted())
    }
}
