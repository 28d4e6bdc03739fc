//! Common utilities and types shared across conference service components.

#![warn(clippy::pedantic)]

/// Module for shared configuration fragments
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;
