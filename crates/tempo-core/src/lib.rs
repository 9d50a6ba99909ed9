//! Tempo Core Library
//!
//! Shared functionality for Tempo components:
//! - Timer, event and notification domain models
//! - Domain error taxonomy with causal-trail wrapping
//! - Compensation log (saga) for multi-store operations
//! - Database helpers shared by the storage adapters

pub mod db;
pub mod error;
pub mod model;
pub mod saga;
pub mod tracing_init;

pub use error::{ErrorKind, Result, ResultExt, TimerError};
pub use model::{TimerId, UserId};
pub use saga::Saga;
