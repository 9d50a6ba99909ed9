//! Tempo Daemon Library
//!
//! Core functionality for the Tempo daemon:
//! - Timer coordinator for saga-guarded lifecycle operations
//! - Event bus for per-connection timer event fan-out
//! - Notification dispatcher for expiry/deletion delivery
//! - SQLite storage adapter and in-memory subscriber cache
//! - Tick-service client boundary and cache reconciliation

pub mod bus;
pub mod coordinator;
pub mod dispatch;
pub mod reconcile;
pub mod storage;
pub mod store;
pub mod tick;
