//! Compensation log for multi-store operations.
//!
//! Each coordinated operation creates a [`Saga`], registers one undo action
//! per collaborator write that succeeded, and either commits (discarding the
//! undos) or rolls back. Rollback runs the pending undos in reverse
//! registration order. Undo actions are best-effort: a failing undo is
//! attempted exactly once, never retried and never surfaced. Failed
//! compensations log at warn with a dedicated message, since they are the
//! only trace of data drift.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::TimerError;

type UndoFuture = Pin<Box<dyn Future<Output = Result<(), TimerError>> + Send + 'static>>;

struct Compensation {
    label: &'static str,
    undo: UndoFuture,
}

#[derive(Default)]
struct Inner {
    committed: bool,
    undos: Vec<Compensation>,
}

/// An in-memory stack of undo actions guarding one logical operation.
///
/// Safe to use from parallel sub-operations of the same transaction:
/// registration and commit are serialized by an internal lock.
#[derive(Default)]
pub struct Saga {
    inner: Mutex<Inner>,
}

impl Saga {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an undo action for a write that just succeeded.
    ///
    /// Registration after commit is a no-op: the operation already finished
    /// and its undos were discarded.
    pub fn register<F>(&self, label: &'static str, undo: F)
    where
        F: Future<Output = Result<(), TimerError>> + Send + 'static,
    {
        let mut inner = self.lock();
        if inner.committed {
            return;
        }
        inner.undos.push(Compensation {
            label,
            undo: Box::pin(undo),
        });
    }

    /// Mark the operation successful and discard all undo actions.
    pub fn commit(&self) {
        let mut inner = self.lock();
        inner.committed = true;
        inner.undos.clear();
    }

    /// Execute pending undo actions in reverse registration order.
    ///
    /// No-op after [`Saga::commit`]. Each undo runs once; failures are
    /// logged and do not stop the remaining undos.
    pub async fn rollback(&self) {
        let pending = {
            let mut inner = self.lock();
            if inner.committed {
                return;
            }
            std::mem::take(&mut inner.undos)
        };

        for compensation in pending.into_iter().rev() {
            match compensation.undo.await {
                Ok(()) => debug!(compensation = compensation.label, "compensation applied"),
                Err(e) => warn!(
                    compensation = compensation.label,
                    error = %e,
                    "compensation failed, state may have drifted"
                ),
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
