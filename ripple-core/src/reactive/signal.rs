//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value in the
//! runtime's source arena and tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a memo or effect is running, the runtime
//!    records an edge from the signal's source to that dependent.
//!
//! 2. When a signal's value changes, direct dependents are marked dirty,
//!    memo chains are marked maybe-dirty, and affected effects are queued.
//!
//! 3. Writing a value equal to the current one propagates nothing: no
//!    version bump, no marking, no scheduling.
//!
//! # Handles
//!
//! `Signal<T>` is a Copy handle - an id plus a phantom type. The value
//! itself lives in the `Runtime`, so every operation takes `&Runtime`
//! explicitly and handles can be captured by any number of closures
//! without reference counting.
//!
//! # Example
//!
//! ```rust,ignore
//! let rt = Runtime::new();
//! let count = rt.signal(0);
//!
//! // Read the value (tracked inside effects and memos)
//! let value = count.get(&rt);
//!
//! // Update the value (queues dependent effects)
//! count.set(&rt, 5);
//! ```

use std::fmt::Debug;
use std::marker::PhantomData;

use crate::graph::SourceId;

use super::runtime::Runtime;

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. Must be `PartialEq` so
///   writes can detect equal-value no-ops.
pub struct Signal<T> {
    /// Id of the backing source slot.
    id: SourceId,
    _marker: PhantomData<fn() -> T>,
}

impl Runtime {
    /// Create a new signal with the given initial value.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: PartialEq + 'static,
    {
        let id = self.alloc_source(Some(Box::new(value)), None);
        Signal {
            id,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Signal<T> {
    /// Get the current value.
    ///
    /// If called while a memo or effect is running, this also registers
    /// that computation as a dependent.
    pub fn get(&self, rt: &Runtime) -> T
    where
        T: Clone,
    {
        self.with(rt, T::clone)
    }

    /// Read the current value by reference, tracked.
    ///
    /// Use this for values that are expensive to clone.
    pub fn with<R>(&self, rt: &Runtime, f: impl FnOnce(&T) -> R) -> R {
        rt.read_source(self.id, |value| {
            f(value.downcast_ref::<T>().expect("signal type mismatch"))
        })
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Use this when you need to read the value without establishing
    /// a reactive dependency.
    pub fn get_untracked(&self, rt: &Runtime) -> T
    where
        T: Clone,
    {
        self.with_untracked(rt, T::clone)
    }

    /// Read the current value by reference, untracked.
    pub fn with_untracked<R>(&self, rt: &Runtime, f: impl FnOnce(&T) -> R) -> R {
        rt.peek_source(self.id, |value| {
            f(value.downcast_ref::<T>().expect("signal type mismatch"))
        })
    }

    /// Set a new value.
    ///
    /// If the new value differs from the current one, dependent effects
    /// are queued for the next flush. If it compares equal, nothing
    /// happens at all.
    pub fn set(&self, rt: &Runtime, value: T)
    where
        T: PartialEq,
    {
        rt.write_source(self.id, value);
    }

    /// Update the value using a function of the current value.
    ///
    /// The read is untracked, so calling this inside an effect does not
    /// subscribe the effect to its own output.
    pub fn update(&self, rt: &Runtime, f: impl FnOnce(&T) -> T)
    where
        T: PartialEq,
    {
        let next = self.with_untracked(rt, f);
        self.set(rt, next);
    }

    #[cfg(test)]
    pub(crate) fn id(&self) -> SourceId {
        self.id
    }
}

// Handles are plain ids; copying one never touches the value.
impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("id", &self.id.raw()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
