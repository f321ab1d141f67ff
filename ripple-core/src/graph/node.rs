//! Graph Slots
//!
//! This module defines the slot types that live in the runtime's dependency
//! arenas: sources (observable state locations) and dependents (effects and
//! memos). Slots are addressed by stable ids handed out by the runtime, so
//! edges can be removed explicitly on disposal instead of relying on any
//! form of garbage collection.

use std::any::Any;

use smallvec::SmallVec;

use crate::reactive::Runtime;

/// Stable identifier for a source slot in the runtime's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Stable identifier for a dependent slot (an effect or a memo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependentId(u64);

impl DependentId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Dirty state of a dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The dependent's last run is still up-to-date.
    Clean,

    /// The dependent might need to re-run. Something upstream of a memo it
    /// reads changed, but we have not yet verified that the memo's output
    /// actually differs.
    MaybeDirty,

    /// The dependent definitely needs to re-run. A direct dependency changed.
    Dirty,
}

/// Teardown closure returned by an effect body; runs before the next re-run
/// and at disposal.
pub type CleanupFn = Box<dyn FnOnce()>;

/// Boxed effect body. Receives the runtime so it can read reactive state.
pub(crate) type EffectFn = Box<dyn FnMut(&Runtime) -> Option<CleanupFn>>;

/// Boxed, type-erased memo getter.
pub(crate) type ComputeFn = Box<dyn FnMut(&Runtime) -> Box<dyn Any>>;

/// Type-erased equality used to compare a memo's old and new output.
pub(crate) type SameFn = fn(&dyn Any, &dyn Any) -> bool;

/// One recorded dependency edge, seen from the dependent's side: which
/// source was read, and the source's version at the time of the read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DepEdge {
    pub source: SourceId,
    /// Version observed when the edge was recorded. A later mismatch means
    /// the source's value actually changed since this dependent last ran.
    pub seen: u64,
}

/// A source slot: one observable state location.
pub(crate) struct SourceSlot {
    /// Current value. `Some` for signals; `None` for version-only sources
    /// (store keys, where the data lives in the store node) and for memo
    /// outputs (the cache lives in the memo's dependent slot).
    pub value: Option<Box<dyn Any>>,

    /// The memo whose output this source represents, if any. Needed when a
    /// maybe-dirty check has to pull the memo up-to-date before comparing
    /// versions.
    pub owner: Option<DependentId>,

    /// Advanced every time the observed value changes. Equal-value writes
    /// do not advance it.
    pub version: u64,

    /// Dependents currently registered on this source (the edge set).
    pub dependents: SmallVec<[DependentId; 4]>,
}

impl SourceSlot {
    pub fn new(value: Option<Box<dyn Any>>, owner: Option<DependentId>) -> Self {
        Self {
            value,
            owner,
            version: 0,
            dependents: SmallVec::new(),
        }
    }
}

/// What a dependent slot runs when it is invoked.
pub(crate) enum DependentKind {
    /// An eager reaction. `run` is `None` only while the body is checked out
    /// for execution.
    Effect {
        run: Option<EffectFn>,
        cleanup: Option<CleanupFn>,
    },

    /// A lazy cached derivation. `cached` is `None` until the first read.
    Memo {
        compute: Option<ComputeFn>,
        cached: Option<Box<dyn Any>>,
        same: SameFn,
        /// Companion source slot readers subscribe to.
        output: SourceId,
    },
}

/// A dependent slot: a runnable unit plus the reverse index of edges it is
/// currently registered in.
pub(crate) struct DependentSlot {
    pub kind: DependentKind,

    /// Reverse index: every source this dependent read during its most
    /// recent run. Swept before each re-run and re-populated by that run's
    /// reads, so conditional read sets never accumulate stale edges.
    pub deps: SmallVec<[DepEdge; 4]>,

    pub dirty: DirtyState,
}

impl DependentSlot {
    /// Create an effect slot. Starts dirty; the creation path runs it once
    /// synchronously, which marks it clean.
    pub fn effect(run: EffectFn) -> Self {
        Self {
            kind: DependentKind::Effect {
                run: Some(run),
                cleanup: None,
            },
            deps: SmallVec::new(),
            dirty: DirtyState::Dirty,
        }
    }

    /// Create a memo slot. Starts dirty so the first read computes.
    pub fn memo(compute: ComputeFn, same: SameFn, output: SourceId) -> Self {
        Self {
            kind: DependentKind::Memo {
                compute: Some(compute),
                cached: None,
                same,
                output,
            },
            deps: SmallVec::new(),
            dirty: DirtyState::Dirty,
        }
    }

    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Upgrade to maybe-dirty. Never downgrades a definitely-dirty slot.
    pub fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    /// Whether this slot already has an edge on `source` from the current run.
    pub fn has_dep(&self, source: SourceId) -> bool {
        self.deps.iter().any(|e| e.source == source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_slot_starts_dirty() {
        let slot = DependentSlot::effect(Box::new(|_| None));
        assert_eq!(slot.dirty, DirtyState::Dirty);
        assert!(slot.deps.is_empty());
    }

    #[test]
    fn memo_slot_starts_dirty_and_uncached() {
        let slot = DependentSlot::memo(
            Box::new(|_| Box::new(0i32)),
            |a, b| a.downcast_ref::<i32>() == b.downcast_ref::<i32>(),
            SourceId::new(7),
        );
        assert_eq!(slot.dirty, DirtyState::Dirty);
        match slot.kind {
            DependentKind::Memo { ref cached, .. } => assert!(cached.is_none()),
            _ => panic!("expected memo kind"),
        }
    }

    #[test]
    fn dirty_state_transitions() {
        let mut slot = DependentSlot::effect(Box::new(|_| None));

        slot.mark_clean();
        assert_eq!(slot.dirty, DirtyState::Clean);

        slot.mark_maybe_dirty();
        assert_eq!(slot.dirty, DirtyState::MaybeDirty);

        slot.mark_dirty();
        assert_eq!(slot.dirty, DirtyState::Dirty);

        // Maybe-dirty never downgrades a dirty slot.
        slot.mark_maybe_dirty();
        assert_eq!(slot.dirty, DirtyState::Dirty);
    }

    #[test]
    fn dep_edges_are_queried_by_source() {
        let mut slot = DependentSlot::effect(Box::new(|_| None));
        let a = SourceId::new(1);
        let b = SourceId::new(2);

        slot.deps.push(DepEdge { source: a, seen: 0 });
        assert!(slot.has_dep(a));
        assert!(!slot.has_dep(b));
    }

    #[test]
    fn source_slot_tracks_version_and_edges() {
        let mut slot = SourceSlot::new(Some(Box::new(5i32)), None);
        assert_eq!(slot.version, 0);

        slot.version += 1;
        slot.dependents.push(DependentId::new(3));
        assert_eq!(slot.version, 1);
        assert_eq!(slot.dependents.len(), 1);
    }
}
