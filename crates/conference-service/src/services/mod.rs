//! Conference service services.
//!
//! Capabilities the handlers consume:
//!
//! - `call_control` - bridge, leg, recording and transcription commands
//! - `publisher` - domain event fan-out
//! - `scheduler` - delayed task submission
//! - `clock` - wall clock

pub mod call_control;
pub mod clock;
pub mod publisher;
pub mod scheduler;

pub use call_control::{BridgeKind, CallControl, HttpCallControl, LegState, LegStatus, RecordingParams};
pub use clock::{Clock, SystemClock};
pub use publisher::EventPublisher;
pub use scheduler::{ScheduledTask, Scheduler};
