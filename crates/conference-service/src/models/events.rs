//! Outbound domain events.

use super::{Conference, Conferencecall, ConferencecallStatus};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConferenceEventType {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConferencecallEventType {
    Joining,
    Joined,
    Leaving,
    Leaved,
}

impl From<ConferencecallStatus> for ConferencecallEventType {
    fn from(status: ConferencecallStatus) -> Self {
        match status {
            ConferencecallStatus::Joining => ConferencecallEventType::Joining,
            ConferencecallStatus::Joined => ConferencecallEventType::Joined,
            ConferencecallStatus::Leaving => ConferencecallEventType::Leaving,
            ConferencecallStatus::Leaved => ConferencecallEventType::Leaved,
        }
    }
}

/// A state change that downstream fan-out cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    Conference {
        event_type: ConferenceEventType,
        conference: Conference,
    },
    Conferencecall {
        event_type: ConferencecallEventType,
        conferencecall: Conferencecall,
    },
}

/// Wire envelope: `{"type": ..., "customer_id": ..., "data": ...}`.
#[derive(Debug, Serialize)]
pub struct EventEnvelope<'a> {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub customer_id: Uuid,
    pub data: EventData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EventData<'a> {
    Conference(&'a Conference),
    Conferencecall(&'a Conferencecall),
}

impl DomainEvent {
    pub fn conference(event_type: ConferenceEventType, conference: Conference) -> Self {
        DomainEvent::Conference {
            event_type,
            conference,
        }
    }

    /// Event for a leg, typed by the leg's current status.
    pub fn conferencecall(conferencecall: Conferencecall) -> Self {
        DomainEvent::Conferencecall {
            event_type: conferencecall.status.into(),
            conferencecall,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::Conference { event_type, .. } => match event_type {
                ConferenceEventType::Created => "conference_created",
                ConferenceEventType::Updated => "conference_updated",
                ConferenceEventType::Deleted => "conference_deleted",
            },
            DomainEvent::Conferencecall { event_type, .. } => match event_type {
                ConferencecallEventType::Joining => "conferencecall_joining",
                ConferencecallEventType::Joined => "conferencecall_joined",
                ConferencecallEventType::Leaving => "conferencecall_leaving",
                ConferencecallEventType::Leaved => "conferencecall_leaved",
            },
        }
    }

    pub fn customer_id(&self) -> Uuid {
        match self {
            DomainEvent::Conference { conference, .. } => conference.customer_id,
            DomainEvent::Conferencecall { conferencecall, .. } => conferencecall.customer_id,
        }
    }

    /// Id of the entity the event is about.
    pub fn subject_id(&self) -> Uuid {
        match self {
            DomainEvent::Conference { conference, .. } => conference.id,
            DomainEvent::Conferencecall { conferencecall, .. } => conferencecall.id,
        }
    }

    pub fn envelope(&self) -> EventEnvelope<'_> {
        let data = match self {
            DomainEvent::Conference { conference, .. } => EventData::Conference(conference),
            DomainEvent::Conferencecall { conferencecall, .. } => {
                EventData::Conferencecall(conferencecall)
            }
        };

        EventEnvelope {
            event_type: self.event_type(),
            customer_id: self.customer_id(),
            data,
        }
    }
}
