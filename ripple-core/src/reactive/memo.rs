//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. Creating a memo runs nothing. The first read computes and caches.
//!
//! 2. When read again with no upstream changes, the cached value is
//!    returned as-is.
//!
//! 3. When a dependency changes, the memo is only marked invalid;
//!    recomputation waits for the next read.
//!
//! 4. A maybe-dirty memo (invalidated through another memo) first checks
//!    whether its recorded input versions actually advanced, and skips
//!    the recompute when they did not.
//!
//! 5. A recompute whose output equals the cached value keeps the old
//!    version, so downstream dependents see nothing to do.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually read will recompute
//! - Memos that are never read stay invalid (no wasted work)
//!
//! Each memo owns a companion source in the runtime, so effects and other
//! memos can depend on a memo exactly the way they depend on a signal.

use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;

use crate::graph::{ComputeFn, DependentId, DependentSlot, SourceId};

use super::runtime::Runtime;

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be `PartialEq` - equal
///   recompute results are swallowed instead of rippling downstream.
pub struct Memo<T> {
    /// Id of the computation slot.
    dep: DependentId,

    /// Id of the companion source other dependents subscribe to.
    output: SourceId,

    _marker: PhantomData<fn() -> T>,
}

impl Runtime {
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn memo<T>(&self, mut getter: impl FnMut(&Runtime) -> T + 'static) -> Memo<T>
    where
        T: PartialEq + 'static,
    {
        let dep = self.reserve_dependent_id();
        let output = self.alloc_source(None, Some(dep));
        let compute: ComputeFn = Box::new(move |rt| Box::new(getter(rt)) as Box<dyn Any>);
        self.install_dependent(dep, DependentSlot::memo(compute, same_as::<T>, output));
        Memo {
            dep,
            output,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Memo<T> {
    /// Get the current value, recomputing first if anything it reads has
    /// changed since the cache was filled.
    ///
    /// Tracked: a memo or effect calling this subscribes to the memo's
    /// output, not to the memo's own inputs.
    ///
    /// # Panics
    ///
    /// Panics if the memo has been disposed.
    pub fn get(&self, rt: &Runtime) -> T
    where
        T: Clone,
    {
        self.with(rt, T::clone)
    }

    /// Read the current value by reference, tracked.
    pub fn with<R>(&self, rt: &Runtime, f: impl FnOnce(&T) -> R) -> R {
        rt.refresh_memo(self.dep);
        rt.track_read(self.output);
        rt.with_memo_cache(self.dep, |value| {
            f(value.downcast_ref::<T>().expect("memo type mismatch"))
        })
    }

    /// Get the current value without registering a dependency.
    ///
    /// The cache is still brought up-to-date first; untracked reads are
    /// never stale.
    pub fn get_untracked(&self, rt: &Runtime) -> T
    where
        T: Clone,
    {
        self.with_untracked(rt, T::clone)
    }

    /// Read the current value by reference, untracked.
    pub fn with_untracked<R>(&self, rt: &Runtime, f: impl FnOnce(&T) -> R) -> R {
        rt.refresh_memo(self.dep);
        rt.with_memo_cache(self.dep, |value| {
            f(value.downcast_ref::<T>().expect("memo type mismatch"))
        })
    }

    /// Drop the memo: sever its input edges, free its cache and output
    /// source, and stop all future invalidation. Disposing twice is a
    /// no-op.
    pub fn dispose(&self, rt: &Runtime) {
        rt.dispose_dependent(self.dep);
    }

    /// Whether this memo has been disposed.
    pub fn is_disposed(&self, rt: &Runtime) -> bool {
        !rt.is_live(self.dep)
    }
}

fn same_as<T: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Memo<T> {}

impl<T> Debug for Memo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo").field("id", &self.dep.raw()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
