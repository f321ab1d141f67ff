//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately to establish
//!    initial dependencies. Errors in that first run belong to the caller.
//!
//! 2. When any dependency changes, the effect is queued; it re-runs on the
//!    next `Runtime::flush`, once per batch no matter how many of its
//!    dependencies changed.
//!
//! 3. Before re-running, the runtime sweeps the effect's old edges and
//!    tracks fresh ones during execution, so a read that went quiet stops
//!    triggering the effect.
//!
//! # Use Cases
//!
//! Effects are used to synchronize reactive state with the outside world:
//!
//! - Pushing state changes to a view layer
//! - Logging state changes
//! - Mirroring state into another system
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (queued when
//!   deps change).
//! - Memos cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! An effect body can return a cleanup function. It is called before the
//! effect re-runs and when the effect is disposed, which is the place to
//! release whatever resource the previous run acquired.

use crate::graph::{CleanupFn, DependentId, DependentSlot, EffectFn};

use super::runtime::Runtime;

/// Handle to a running effect. Dropping the handle does nothing; call
/// [`Effect::dispose`] to stop the effect.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// let effect = rt.effect(move |rt| {
///     println!("count is {}", count.get(rt));
/// });
///
/// count.set(&rt, 5);
/// rt.flush(); // prints: "count is 5"
/// effect.dispose(&rt);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Effect {
    /// Id of the backing dependent slot.
    id: DependentId,
}

impl Runtime {
    /// Create an effect and run it once, synchronously, to establish its
    /// initial dependencies.
    ///
    /// A panic out of that first run propagates to the caller; the
    /// half-created effect is disposed first, so nothing keeps running
    /// afterwards.
    pub fn effect(&self, mut body: impl FnMut(&Runtime) + 'static) -> Effect {
        self.effect_with_cleanup(move |rt| {
            body(rt);
            None
        })
    }

    /// Like [`Runtime::effect`], but the body may hand back a cleanup
    /// function to run before the next re-run and at disposal.
    pub fn effect_with_cleanup(
        &self,
        body: impl FnMut(&Runtime) -> Option<CleanupFn> + 'static,
    ) -> Effect {
        let id = self.reserve_dependent_id();
        let run: EffectFn = Box::new(body);
        self.install_dependent(id, DependentSlot::effect(run));
        self.run_dependent_initial(id);
        Effect { id }
    }
}

impl Effect {
    /// Stop the effect: sever its edges, drop its body, and run any
    /// outstanding cleanup.
    ///
    /// Safe to call any number of times - disposal of an already-disposed
    /// effect is a no-op, even if the effect was queued to run.
    pub fn dispose(&self, rt: &Runtime) {
        rt.dispose_dependent(self.id);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self, rt: &Runtime) -> bool {
        !rt.is_live(self.id)
    }

    #[cfg(test)]
    pub(crate) fn id(&self) -> DependentId {
        self.id
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
