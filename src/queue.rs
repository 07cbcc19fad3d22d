//! Serialized callback queue.
//!
//! Every facade owns one [`EventQueue`]. Backends never call lifecycle code
//! or application handlers directly: they post a job to the queue, and a
//! single dedicated thread runs jobs one at a time in posting order. The
//! queue is therefore the mutual-exclusion mechanism between callbacks of the
//! same facade, and it fixes the order in which connect, ready, receive and
//! close events reach the application.
//!
//! The thread exits once every handle to the queue has been dropped.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// A unit of work run on the queue thread.
type Job = Box<dyn FnOnce() + Send + 'static>;

// ============================================================================
// EventQueue
// ============================================================================

/// Handle to a serialized callback queue.
///
/// Cloning is cheap; all clones feed the same thread.
#[derive(Clone)]
pub struct EventQueue {
    /// Sender side of the job channel.
    jobs: mpsc::UnboundedSender<Job>,
    /// Identity of the thread draining the queue.
    worker: ThreadId,
    /// Thread name, for diagnostics.
    label: Arc<str>,
}

impl EventQueue {
    /// Spawns the queue thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the thread cannot be spawned.
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label: String = label.into();
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();

        let handle = thread::Builder::new().name(label.clone()).spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Callback panicked on event queue");
                }
            }
            debug!("Event queue drained");
        })?;

        Ok(Self {
            jobs,
            worker: handle.thread().id(),
            label: label.into(),
        })
    }

    /// Posts a job. Returns `false` if the queue thread is gone.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.jobs.send(Box::new(job)).is_ok()
    }

    /// Returns `true` when called from the queue's own thread.
    #[inline]
    #[must_use]
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker
    }

    /// Returns the queue thread's name.
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
