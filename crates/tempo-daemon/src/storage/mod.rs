//! SQLite storage for the timer daemon.
//!
//! Provides persistence for timer records, the durable subscriber relation,
//! and the offline notification inbox, plus the in-memory subscriber cache.

mod cache;
mod db;
mod models;
mod queries;
mod queries_notifications;

pub use cache::MemorySubscriberCache;
pub use db::Database;
pub use models::{NotificationRow, TimerRow};
