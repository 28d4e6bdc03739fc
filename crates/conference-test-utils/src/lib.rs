//! # Conference Test Utilities
//!
//! Shared test utilities for the conference service.
//!
//! This crate provides mock implementations and fixtures for testing the
//! handlers without Postgres, Redis or a call-control plane:
//!
//! - `mock_repositories` - in-memory conference and conferencecall stores
//! - `mock_cache` - in-memory entity cache with failure injection
//! - `mock_call_control` - call-control double that records every command
//! - `recording` - event publisher, scheduler and metrics sink that record
//! - `clock` - settable clock
//! - `harness` - every handler wired over the mocks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use conference_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let h = TestHarness::new();
//!     let conference = h
//!         .conference_handler
//!         .create(create_conference_request(ConferenceType::Conference, 0))
//!         .await
//!         .unwrap();
//!
//!     assert!(h.scheduler.submitted().is_empty());
//! }
//! ```

pub mod clock;
pub mod fixtures;
pub mod harness;
pub mod mock_cache;
pub mod mock_call_control;
pub mod mock_repositories;
pub mod recording;

// Re-export commonly used items
pub use clock::*;
pub use fixtures::*;
pub use harness::*;
pub use mock_cache::*;
pub use mock_call_control::*;
pub use mock_repositories::*;
pub use recording::*;
