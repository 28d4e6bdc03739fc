//! Conference service models.
//!
//! Rooms ([`Conference`]), participant legs ([`Conferencecall`]), their
//! sparse update builders, list filters, and outbound [`DomainEvent`]s.

mod conference;
mod conferencecall;
mod events;

pub use conference::{
    normalize_timeout, Conference, ConferenceData, ConferenceFilter, ConferenceStatus,
    ConferenceType, ConferenceUpdate, DEFAULT_CONFERENCE_TIMEOUT_SECONDS,
    MIN_CONFERENCE_TIMEOUT_SECONDS,
};
pub use conferencecall::{
    Conferencecall, ConferencecallFilter, ConferencecallStatus, ConferencecallUpdate,
    ReferenceType,
};
pub use events::{
    ConferenceEventType, ConferencecallEventType, DomainEvent, EventData, EventEnvelope,
};
