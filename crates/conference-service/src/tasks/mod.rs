//! Background tasks for the conference service.
//!
//! # Tasks
//!
//! - `delay_queue_worker` - runs scheduled tasks once their delay elapses
//! - `bridge_events` - relays inbound bridge notifications
//! - `dispatcher` - routes a due task to the handler that owns it

pub mod bridge_events;
pub mod delay_queue_worker;
pub mod dispatcher;

pub use bridge_events::start_bridge_event_subscriber;
pub use delay_queue_worker::{start_delay_queue_worker, DueTasks};
pub use dispatcher::{TaskDispatcher, TaskHandler};
