//! Conference service handlers.
//!
//! - `conference` - room state machine, drain and teardown, recordings
//! - `conferencecall` - leg state machine
//! - `health` - leg health-check reconciliation
//! - `policy` - per-type post-removal policy
//!
//! The conferencecall handler calls into the conference handler for
//! membership changes. The reverse direction only goes through scheduled
//! tasks, so the two never hold each other.

pub mod conference;
pub mod conferencecall;
pub mod health;
pub mod policy;

pub use conference::{ConferenceHandler, CreateConference, UpdateConference};
pub use conferencecall::{ConferencecallHandler, CreateConferencecall, HealthCheckSettings};
pub use health::HealthCheckOutcome;
pub use policy::{post_removal_action, PostRemovalAction};
