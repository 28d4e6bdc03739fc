//! Conference Service Library
//!
//! Coordinates multi-party conference rooms on top of an external
//! call-control plane that owns bridges, legs, recordings and
//! transcriptions.
//!
//! # Architecture
//!
//! ```text
//! relay.rs / tasks/*.rs -> handlers/*.rs -> repositories/store.rs -> repositories/*.rs
//!                                        -> services/*.rs
//! ```
//!
//! Two state machines live here: the room (`Conference`) and the
//! participant leg (`Conferencecall`). Leg health checks reconcile legs
//! against the call-control plane, since its bridge events can arrive out
//! of order or not at all.
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with status code mapping
//! - `handlers` - Room and leg state machines
//! - `models` - Entities, typed updates, domain events
//! - `observability` - Metrics sink
//! - `redis` - Redis cache, delay queue and event publisher
//! - `relay` - Inbound bridge-event relay
//! - `repositories` - Postgres repositories and the cache-aside store
//! - `services` - Call-control client, scheduler, publisher and clock seams
//! - `tasks` - Background workers

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod observability;
pub mod redis;
pub mod relay;
pub mod repositories;
pub mod services;
pub mod tasks;
