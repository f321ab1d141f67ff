//! Batch Scheduler
//!
//! The scheduler collects dependents that were invalidated by writes and
//! hands them back to the runtime as one batch per flush cycle.
//!
//! # Algorithm
//!
//! 1. A write invalidates a dependent and calls `schedule`
//! 2. The pending queue has set semantics: a dependent queued five times in
//!    one synchronous window still runs once, at its first-scheduled position
//! 3. The first schedule of a window arms the flush flag and pings the
//!    host's waker, so an event loop knows a flush is due
//! 4. `take_batch` swaps the whole queue out and disarms the flag *before*
//!    anything runs - dependents scheduled while a batch is draining land in
//!    the next batch, never the one in flight
//!
//! The queue itself never runs anything; invocation order, liveness checks
//! and error isolation live in the runtime's flush loop.

use std::cell::{Cell, RefCell};

use indexmap::IndexSet;
use tracing::trace;

use super::node::DependentId;

/// Deduplicated, insertion-ordered queue of dependents awaiting a flush.
pub(crate) struct Scheduler {
    /// Pending dependents in first-scheduled order.
    pending: RefCell<IndexSet<DependentId>>,

    /// True from the first schedule of a window until the batch is taken.
    armed: Cell<bool>,

    /// Host callback fired once per window when the flag arms.
    waker: RefCell<Option<Box<dyn Fn()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            pending: RefCell::new(IndexSet::new()),
            armed: Cell::new(false),
            waker: RefCell::new(None),
        }
    }

    /// Queue a dependent for the next flush.
    ///
    /// Re-scheduling an already-pending dependent is a no-op; it keeps its
    /// original position in the batch.
    pub fn schedule(&self, dep: DependentId) {
        let inserted = self.pending.borrow_mut().insert(dep);
        if inserted {
            trace!(dependent = dep.raw(), "scheduled");
        }
        if !self.armed.get() {
            self.armed.set(true);
            if let Some(wake) = self.waker.borrow().as_ref() {
                wake();
            }
        }
    }

    /// Swap out the current batch, in insertion order, and disarm the flush
    /// flag. Called by the runtime before it invokes anything.
    pub fn take_batch(&self) -> IndexSet<DependentId> {
        self.armed.set(false);
        self.pending.replace(IndexSet::new())
    }

    /// Whether a flush is currently armed.
    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }

    /// Number of dependents waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Install the host's cooperative-yield callback.
    pub fn set_waker(&self, wake: Box<dyn Fn()>) {
        *self.waker.borrow_mut() = Some(wake);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
