//! Tick-service client boundary.
//!
//! The tick service is a remote scheduler: the daemon registers each running
//! timer's end time and receives server-pushed batches of expired timer ids.
//! Only the client contract lives here; transports implement [`TickService`]
//! over their RPC stack and use [`map_status`] to translate gRPC status
//! codes into domain errors.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tempo_core::error::{Result, TimerError};
use tempo_core::model::TimerId;

/// Remote expiry scheduler contract.
#[async_trait]
pub trait TickService: Send + Sync {
    /// Register a timer's end time (Unix seconds).
    async fn add(&self, timer_id: TimerId, end_time: i64) -> Result<()>;

    /// Register many timers at once (reconciliation path).
    async fn add_many(&self, timers: &HashMap<TimerId, i64>) -> Result<()>;

    /// (Re)start a timer's registration with a new end time.
    async fn start(&self, timer_id: TimerId, end_time: i64) -> Result<()>;

    /// Suspend a timer's registration without removing it.
    async fn stop(&self, timer_id: TimerId) -> Result<()>;

    /// Remove a timer's registration permanently.
    async fn remove(&self, timer_id: TimerId) -> Result<()>;

    /// Open the server-push expiry stream. Each received batch lists timers
    /// whose end time has elapsed since the previous batch.
    async fn timer_tick(&self) -> Result<mpsc::Receiver<Vec<TimerId>>>;
}

/// Translate a tick-service gRPC status into the domain error it stands for.
///
/// `AlreadyExists` surfaces as a timer conflict and `NotFound` as a missing
/// timer so the coordinator's callers can branch on error kind without
/// knowing the transport.
pub fn map_status(timer_id: TimerId, status: &tonic::Status) -> TimerError {
    match status.code() {
        tonic::Code::AlreadyExists => TimerError::TimerExists(timer_id),
        tonic::Code::NotFound => TimerError::TimerNotFound(timer_id),
        tonic::Code::InvalidArgument => TimerError::WrongTime(status.message().to_string()),
        tonic::Code::Internal => TimerError::Internal(status.message().to_string()),
        _ => TimerError::Tick(status.to_string()),
    }
}
