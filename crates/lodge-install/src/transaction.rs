//! Compensating-action log.
//!
//! Every forward step registers its inverse right after it succeeds. On
//! failure the log is unwound last-to-first; on success it is discarded.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::{BoxError, RollbackCause, RollbackError, RollbackFailure};

type Action = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

struct RollbackEntry {
    label: String,
    action: Action,
}

/// Ordered registry of compensating actions.
///
/// All methods take `&self`, so a transaction can be shared between the
/// thread doing the install and anything reporting on it.
#[derive(Default)]
pub struct Transaction {
    entries: Mutex<Vec<RollbackEntry>>,
    action_timeout: Option<Duration>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each compensating action. An action still running after
    /// `timeout` is recorded as [`RollbackCause::TimedOut`] and left running
    /// on its helper thread.
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    /// Register the inverse of a step that just succeeded. Nothing runs yet.
    pub fn add<F>(&self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        let label = label.into();
        trace!(%label, "registered compensating action");
        self.lock().push(RollbackEntry {
            label,
            action: Box::new(action),
        });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Keep every side effect and forget the registered actions.
    pub fn commit(&self) {
        let entries = std::mem::take(&mut *self.lock());
        debug!(discarded = entries.len(), "transaction committed");
    }

    /// Run every registered action, newest first.
    ///
    /// A failing action does not stop the unwind. The registry is empty
    /// afterwards, so a second call is a no-op.
    pub fn rollback(&self) -> Result<(), RollbackError> {
        // Taken out of the lock so actions may use the transaction themselves.
        let entries = std::mem::take(&mut *self.lock());
        if entries.is_empty() {
            return Ok(());
        }
        debug!(actions = entries.len(), "rolling back");

        let mut failures = Vec::new();
        for RollbackEntry { label, action } in entries.into_iter().rev() {
            match self.run(action) {
                Ok(()) => trace!(%label, "compensated"),
                Err(cause) => {
                    warn!(%label, %cause, "compensating action failed");
                    failures.push(RollbackFailure { label, cause });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RollbackError { failures })
        }
    }

    fn run(&self, action: Action) -> Result<(), RollbackCause> {
        let Some(timeout) = self.action_timeout else {
            return match panic::catch_unwind(AssertUnwindSafe(action)) {
                Ok(result) => result.map_err(RollbackCause::Failed),
                Err(_) => Err(RollbackCause::Panicked),
            };
        };

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("lodge-rollback".into())
            .spawn(move || {
                let _ = tx.send(action());
            })
            .map_err(|e| RollbackCause::Failed(Box::new(e)))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(RollbackCause::Failed),
            Err(RecvTimeoutError::Timeout) => Err(RollbackCause::TimedOut(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(RollbackCause::Panicked),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RollbackEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let pending = self
            .entries
            .get_mut()
            .map_or_else(|poisoned| poisoned.into_inner().len(), |entries| entries.len());
        if pending > 0 {
            warn!(pending, "transaction dropped without commit or rollback");
        }
    }
}
