//! Dependency Graph
//!
//! This module defines the storage side of the reactive engine: the slot
//! types held in the runtime's arenas and the batch scheduler that queues
//! invalidated dependents.
//!
//! # Overview
//!
//! The dependency graph is a bipartite structure:
//!
//! - Sources are observable state locations (signal values, store keys,
//!   memo outputs)
//! - Dependents are runnable units (effects, memos) that read sources
//! - An edge `source → dependent` exists when the dependent read the source
//!   during its most recent run
//!
//! Every edge is stored twice: on the source (who to invalidate on write)
//! and on the dependent (the reverse index, so disposal and the per-run
//! sweep are O(edges) instead of a full arena scan).
//!
//! # Design Decisions
//!
//! 1. Slots are addressed by stable u64 ids handed out by the runtime, and
//!    handles are plain Copy ids. Nothing in the graph is reference-counted,
//!    so teardown is always explicit.
//!
//! 2. Edges are re-derived on every run: the runtime sweeps a dependent out
//!    of all its edges before re-running it, and the run's reads re-insert
//!    exactly the edges that are still live. A conditional read that goes
//!    quiet therefore stops triggering its old dependent.
//!
//! 3. The scheduler is a flat deduplicated queue, not a topological order.
//!    Effects re-run from the batch; memos are pulled up-to-date lazily by
//!    whoever reads them, so ordering falls out of the pull.

mod node;
mod scheduler;

pub use node::CleanupFn;

pub(crate) use node::{
    ComputeFn, DepEdge, DependentId, DependentKind, DependentSlot, DirtyState, EffectFn,
    SameFn, SourceId, SourceSlot,
};
pub(crate) use scheduler::Scheduler;
