//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos,
//! effects and the store. It owns the dependency arenas and the batch
//! scheduler, and it drives update propagation when state changes.
//!
//! # How It Works
//!
//! 1. Creating a signal, memo or effect allocates a slot in the runtime's
//!    arenas and hands back a Copy id handle.
//!
//! 2. When a dependent runs, reads go through `track_read`, which records
//!    the edge on both sides: the source's dependent list and the
//!    dependent's reverse index.
//!
//! 3. When a source's value changes, the runtime:
//!    a. Marks direct dependents dirty and cascades maybe-dirty through
//!       memo outputs
//!    b. Queues affected effects on the scheduler
//!    c. Leaves memos alone - they recompute on next read
//!
//! 4. The host calls `flush` at its cooperative-yield point. Each batch is
//!    swapped out before anything runs, every entry is liveness-checked
//!    (disposal wins a same-window race with scheduling), and each effect
//!    runs inside its own error boundary.
//!
//! 5. Before any re-run, the dependent is swept out of all edges in its
//!    reverse index; the run's reads rebuild exactly the edges that are
//!    still live.
//!
//! # Ownership
//!
//! There is no global state. The host constructs a `Runtime`, owns it, and
//! passes `&Runtime` into every operation; two runtimes never interact.
//! Everything is single-threaded and re-entrant through interior
//! mutability - an effect body is free to create effects, write signals or
//! dispose dependents while it runs.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::mem;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

use smallvec::SmallVec;
use tracing::{debug, error, trace};

use crate::graph::{
    DepEdge, DependentId, DependentKind, DependentSlot, DirtyState, Scheduler, SourceId,
    SourceSlot,
};
use crate::store::StoreState;

use super::context::{Frame, TrackingStack};

/// Upper bound on consecutive flush batches before the runtime assumes an
/// effect is scheduling itself forever.
pub(crate) const MAX_FLUSH_CYCLES: usize = 1000;

/// The reactive runtime: dependency arenas, tracking context and scheduler
/// in one host-owned struct.
#[derive(Default)]
pub struct Runtime {
    sources: RefCell<HashMap<SourceId, SourceSlot>>,
    dependents: RefCell<HashMap<DependentId, DependentSlot>>,
    pub(crate) store: StoreState,

    stack: TrackingStack,
    scheduler: Scheduler,

    next_source: Cell<u64>,
    next_dependent: Cell<u64>,

    flushing: Cell<bool>,
    flush_errors: Cell<u64>,
}

impl Runtime {
    /// Create an empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    // ---- tracking ----------------------------------------------------

    /// Record an edge from `source` to the currently active dependent, if
    /// tracking is on. Reads of the same source within one run collapse to
    /// a single edge.
    pub(crate) fn track_read(&self, source: SourceId) {
        let Some(dep) = self.stack.active() else {
            return;
        };
        let mut dependents = self.dependents.borrow_mut();
        // The active dependent can be disposed out from under its own run;
        // reads after that point register nothing.
        let Some(slot) = dependents.get_mut(&dep) else {
            return;
        };
        if slot.has_dep(source) {
            return;
        }
        let mut sources = self.sources.borrow_mut();
        let Some(src) = sources.get_mut(&source) else {
            return;
        };
        slot.deps.push(DepEdge {
            source,
            seen: src.version,
        });
        if !src.dependents.contains(&dep) {
            src.dependents.push(dep);
        }
    }

    /// Run `body` with tracking suppressed: reads inside it register no
    /// edges, no matter how deep the call stack goes.
    pub fn untrack<R>(&self, body: impl FnOnce() -> R) -> R {
        let _frame = self.stack.enter(Frame::Untracked);
        body()
    }

    /// Whether a dependent is currently collecting edges.
    pub fn is_tracking(&self) -> bool {
        self.stack.active().is_some()
    }

    // ---- sources -----------------------------------------------------

    pub(crate) fn alloc_source(
        &self,
        value: Option<Box<dyn Any>>,
        owner: Option<DependentId>,
    ) -> SourceId {
        let id = SourceId::new(self.next_source.get());
        self.next_source.set(id.raw() + 1);
        self.sources
            .borrow_mut()
            .insert(id, SourceSlot::new(value, owner));
        id
    }

    /// Tracked read of a source's stored value.
    pub(crate) fn read_source<R>(&self, id: SourceId, f: impl FnOnce(&dyn Any) -> R) -> R {
        self.track_read(id);
        self.peek_source(id, f)
    }

    /// Untracked read of a source's stored value.
    pub(crate) fn peek_source<R>(&self, id: SourceId, f: impl FnOnce(&dyn Any) -> R) -> R {
        let sources = self.sources.borrow();
        let slot = sources.get(&id).expect("unknown source id");
        let value = slot.value.as_ref().expect("source holds no value");
        f(value.as_ref())
    }

    /// Write a source's stored value. Propagates only when the new value
    /// differs from the old one; equal-value writes are complete no-ops.
    pub(crate) fn write_source<T>(&self, id: SourceId, new: T) -> bool
    where
        T: PartialEq + 'static,
    {
        let changed = {
            let mut sources = self.sources.borrow_mut();
            let slot = sources.get_mut(&id).expect("unknown source id");
            let value = slot.value.as_mut().expect("source holds no value");
            let current = value.downcast_mut::<T>().expect("source type mismatch");
            if *current == new {
                false
            } else {
                *current = new;
                true
            }
        };
        if changed {
            self.notify_source(id);
        }
        changed
    }

    /// Propagate a confirmed change of `root`: advance its version, mark
    /// dependents, cascade maybe-dirty through memo outputs, and queue
    /// every affected effect.
    pub(crate) fn notify_source(&self, root: SourceId) {
        {
            let mut sources = self.sources.borrow_mut();
            let Some(slot) = sources.get_mut(&root) else {
                return;
            };
            slot.version += 1;
        }
        trace!(source = root.raw(), "source changed");

        // (source, how to mark its dependents): direct dependents of the
        // written source are definitely dirty; anything reached through a
        // memo output is only maybe dirty until the memo recomputes.
        let mut work: Vec<(SourceId, DirtyState)> = vec![(root, DirtyState::Dirty)];
        let mut visited: SmallVec<[SourceId; 8]> = SmallVec::new();
        let mut to_schedule: Vec<DependentId> = Vec::new();

        while let Some((src, mark)) = work.pop() {
            let dependent_ids: SmallVec<[DependentId; 4]> = match self.sources.borrow().get(&src)
            {
                Some(slot) => slot.dependents.clone(),
                None => continue,
            };
            let mut dependents = self.dependents.borrow_mut();
            for dep_id in dependent_ids {
                let Some(slot) = dependents.get_mut(&dep_id) else {
                    continue;
                };
                match mark {
                    DirtyState::Dirty => slot.mark_dirty(),
                    _ => slot.mark_maybe_dirty(),
                }
                match &slot.kind {
                    // The scheduler's pending set dedups repeat offers, so
                    // reaching an effect along several paths is harmless.
                    DependentKind::Effect { .. } => to_schedule.push(dep_id),
                    DependentKind::Memo { output, .. } => {
                        // Each output is walked at most once per notify;
                        // conditional reads can wire memo-to-memo edge
                        // cycles, and the visited list keeps those finite.
                        if !visited.contains(output) {
                            visited.push(*output);
                            work.push((*output, DirtyState::MaybeDirty));
                        }
                    }
                }
            }
        }

        for dep in to_schedule {
            self.scheduler.schedule(dep);
        }
    }

    // ---- dependents --------------------------------------------------

    pub(crate) fn reserve_dependent_id(&self) -> DependentId {
        let id = DependentId::new(self.next_dependent.get());
        self.next_dependent.set(id.raw() + 1);
        id
    }

    pub(crate) fn install_dependent(&self, id: DependentId, slot: DependentSlot) {
        self.dependents.borrow_mut().insert(id, slot);
    }

    pub(crate) fn is_live(&self, id: DependentId) -> bool {
        self.dependents.borrow().contains_key(&id)
    }

    /// Sweep a dependent out of every edge in its reverse index.
    pub(crate) fn detach_dependent(&self, id: DependentId) {
        let edges = match self.dependents.borrow_mut().get_mut(&id) {
            Some(slot) => mem::take(&mut slot.deps),
            None => return,
        };
        if edges.is_empty() {
            return;
        }
        let mut sources = self.sources.borrow_mut();
        for edge in edges {
            if let Some(src) = sources.get_mut(&edge.source) {
                src.dependents.retain(|d| *d != id);
            }
        }
    }

    /// Dispose a dependent: sever every edge, drop the slot, run any
    /// outstanding effect cleanup, and free a memo's output source.
    /// Idempotent - disposing twice (or an id that never existed) is a
    /// no-op, never an error.
    pub(crate) fn dispose_dependent(&self, id: DependentId) {
        self.detach_dependent(id);
        let slot = self.dependents.borrow_mut().remove(&id);
        let Some(slot) = slot else {
            return;
        };
        debug!(dependent = id.raw(), "disposed");
        match slot.kind {
            DependentKind::Effect { cleanup, .. } => {
                if let Some(cleanup) = cleanup {
                    cleanup();
                }
            }
            DependentKind::Memo { output, .. } => {
                self.sources.borrow_mut().remove(&output);
            }
        }
    }

    /// Resolve whether a dependent actually has to run.
    ///
    /// `Dirty` means yes. `MaybeDirty` means something upstream of a memo
    /// it reads changed; the check pulls those memos up-to-date and
    /// compares recorded versions - if none advanced, the dependent is
    /// marked clean and skipped.
    pub(crate) fn needs_run(&self, id: DependentId) -> bool {
        let state = match self.dependents.borrow().get(&id) {
            Some(slot) => slot.dirty,
            None => return false,
        };
        match state {
            DirtyState::Dirty => true,
            DirtyState::Clean => false,
            DirtyState::MaybeDirty => {
                let edges: SmallVec<[DepEdge; 4]> = self
                    .dependents
                    .borrow()
                    .get(&id)
                    .map(|slot| slot.deps.clone())
                    .unwrap_or_default();
                let mut changed = false;
                for edge in edges {
                    let owner = self
                        .sources
                        .borrow()
                        .get(&edge.source)
                        .and_then(|s| s.owner);
                    if let Some(memo) = owner {
                        self.refresh_memo(memo);
                    }
                    let current = self.sources.borrow().get(&edge.source).map(|s| s.version);
                    if let Some(version) = current {
                        if version != edge.seen {
                            changed = true;
                            break;
                        }
                    }
                }
                if let Some(slot) = self.dependents.borrow_mut().get_mut(&id) {
                    if changed {
                        slot.mark_dirty();
                    } else {
                        slot.mark_clean();
                    }
                }
                changed
            }
        }
    }

    /// Bring a memo's cache current: resolve its dirtiness and recompute
    /// if anything it reads actually changed.
    pub(crate) fn refresh_memo(&self, id: DependentId) {
        if !self.needs_run(id) {
            return;
        }
        self.recompute_memo(id);
    }

    fn recompute_memo(&self, id: DependentId) {
        self.detach_dependent(id);
        let compute = {
            let mut dependents = self.dependents.borrow_mut();
            let Some(slot) = dependents.get_mut(&id) else {
                return;
            };
            match &mut slot.kind {
                DependentKind::Memo { compute, .. } => compute.take(),
                _ => None,
            }
        };
        let Some(compute) = compute else {
            return;
        };

        let mut guard = BodyGuard {
            rt: self,
            id,
            body: Some(TakenBody::Memo(compute)),
        };
        let new_value = {
            let _frame = self.stack.enter(Frame::Tracked(id));
            match guard.body.as_mut() {
                Some(TakenBody::Memo(f)) => f(self),
                _ => return,
            }
        };
        drop(guard);

        // Equal output keeps the old cache and the old version, so
        // downstream maybe-dirty checks see nothing to do. Dirtiness is
        // cleared here, after the compute: a getter that unwinds leaves
        // the slot dirty and the next read retries it.
        let changed_output = {
            let mut dependents = self.dependents.borrow_mut();
            match dependents.get_mut(&id) {
                Some(slot) => {
                    slot.mark_clean();
                    match &mut slot.kind {
                        DependentKind::Memo {
                            cached,
                            same,
                            output,
                            ..
                        } => {
                            let unchanged = cached
                                .as_ref()
                                .map(|old| same(old.as_ref(), new_value.as_ref()))
                                .unwrap_or(false);
                            if unchanged {
                                None
                            } else {
                                *cached = Some(new_value);
                                Some(*output)
                            }
                        }
                        _ => None,
                    }
                }
                None => None,
            }
        };
        if let Some(output) = changed_output {
            if let Some(src) = self.sources.borrow_mut().get_mut(&output) {
                src.version += 1;
            }
        }
    }

    /// Read a memo's cached value. Callers must `refresh_memo` first.
    pub(crate) fn with_memo_cache<R>(&self, id: DependentId, f: impl FnOnce(&dyn Any) -> R) -> R {
        let dependents = self.dependents.borrow();
        let slot = dependents.get(&id).expect("memo read after disposal");
        match &slot.kind {
            DependentKind::Memo { cached, .. } => {
                let value = cached.as_ref().expect("memo cache empty after refresh");
                f(value.as_ref())
            }
            _ => panic!("dependent is not a memo"),
        }
    }

    // ---- running -----------------------------------------------------

    /// Run an effect once: sweep its old edges, run its due cleanup, then
    /// execute the body under a fresh tracking frame.
    pub(crate) fn run_effect(&self, id: DependentId) {
        self.detach_dependent(id);
        let (body, due_cleanup) = {
            let mut dependents = self.dependents.borrow_mut();
            let Some(slot) = dependents.get_mut(&id) else {
                return;
            };
            // Clean before running, so a self-invalidating body lands in
            // the next batch instead of being lost.
            slot.mark_clean();
            match &mut slot.kind {
                DependentKind::Effect { run, cleanup } => (run.take(), cleanup.take()),
                _ => (None, None),
            }
        };
        let Some(body) = body else {
            return;
        };
        if let Some(cleanup) = due_cleanup {
            cleanup();
        }

        let mut guard = BodyGuard {
            rt: self,
            id,
            body: Some(TakenBody::Effect(body)),
        };
        let new_cleanup = {
            let _frame = self.stack.enter(Frame::Tracked(id));
            match guard.body.as_mut() {
                Some(TakenBody::Effect(f)) => f(self),
                _ => None,
            }
        };
        drop(guard);

        if let Some(cleanup) = new_cleanup {
            let mut pending = Some(cleanup);
            {
                let mut dependents = self.dependents.borrow_mut();
                if let Some(slot) = dependents.get_mut(&id) {
                    if let DependentKind::Effect { cleanup, .. } = &mut slot.kind {
                        *cleanup = pending.take();
                    }
                }
            }
            // Disposed during its own run: release the fresh resource now.
            if let Some(orphaned) = pending {
                orphaned();
            }
        }
    }

    /// First synchronous run of a freshly created effect. A panic here
    /// belongs to the caller, but the half-registered dependent must not
    /// survive the unwind.
    pub(crate) fn run_dependent_initial(&self, id: DependentId) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.run_effect(id)));
        if let Err(payload) = outcome {
            self.dispose_dependent(id);
            resume_unwind(payload);
        }
    }

    // ---- flushing ----------------------------------------------------

    /// Drain scheduled work. Called by the host at its cooperative-yield
    /// point.
    ///
    /// Each batch is snapshotted in first-scheduled order and cleared
    /// before anything runs, so work scheduled by a running effect lands
    /// in the next batch. Dependents disposed after being scheduled are
    /// skipped. A panicking effect is caught, reported, and does not stop
    /// the rest of the batch. Re-entrant calls (an effect calling `flush`)
    /// return immediately.
    pub fn flush(&self) {
        if self.flushing.get() {
            return;
        }
        self.flushing.set(true);
        let _reset = FlushingReset(&self.flushing);

        let mut cycles = 0usize;
        loop {
            let batch = self.scheduler.take_batch();
            if batch.is_empty() {
                break;
            }
            cycles += 1;
            if cycles > MAX_FLUSH_CYCLES {
                panic!(
                    "maximum update depth exceeded: effects kept scheduling new work for {} consecutive batches",
                    MAX_FLUSH_CYCLES
                );
            }
            debug!(batch = batch.len(), cycle = cycles, "flush");

            for id in batch {
                if !self.is_live(id) {
                    trace!(dependent = id.raw(), "skipping disposed dependent");
                    continue;
                }
                // needs_run sits inside the boundary: it may pull upstream
                // memo getters, whose panics belong to this dependent too.
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    if self.needs_run(id) {
                        self.run_effect(id);
                    }
                }));
                if let Err(payload) = outcome {
                    self.flush_errors.set(self.flush_errors.get() + 1);
                    error!(
                        dependent = id.raw(),
                        "effect panicked during flush: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
    }

    /// Whether a flush is due. Hosts poll this (or install a waker) to
    /// decide when to call `flush`.
    pub fn needs_flush(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Number of dependents queued for the next flush.
    pub fn pending_count(&self) -> usize {
        self.scheduler.pending_len()
    }

    /// Install the host's cooperative-yield callback; it fires once per
    /// batch window, on the first schedule after the previous flush.
    pub fn set_waker(&self, wake: impl Fn() + 'static) {
        self.scheduler.set_waker(Box::new(wake));
    }

    /// How many effects have panicked during flushes so far. The panics
    /// themselves are reported through `tracing::error!`.
    pub fn error_count(&self) -> u64 {
        self.flush_errors.get()
    }

    // ---- test introspection ------------------------------------------

    #[cfg(test)]
    pub(crate) fn edge_count_of(&self, source: SourceId) -> usize {
        self.sources
            .borrow()
            .get(&source)
            .map(|s| s.dependents.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn dep_count_of(&self, id: DependentId) -> usize {
        self.dependents
            .borrow()
            .get(&id)
            .map(|s| s.deps.len())
            .unwrap_or(0)
    }
}

/// A dependent's body, checked out of its slot for the duration of a run.
enum TakenBody {
    Effect(crate::graph::EffectFn),
    Memo(crate::graph::ComputeFn),
}

/// Puts a checked-out body back when the run ends, panic or not. If the
/// dependent disposed itself mid-run the slot is gone and the body is
/// dropped with everything it captured.
struct BodyGuard<'a> {
    rt: &'a Runtime,
    id: DependentId,
    body: Option<TakenBody>,
}

impl Drop for BodyGuard<'_> {
    fn drop(&mut self) {
        let Some(body) = self.body.take() else {
            return;
        };
        let mut dependents = self.rt.dependents.borrow_mut();
        let Some(slot) = dependents.get_mut(&self.id) else {
            return;
        };
        match (body, &mut slot.kind) {
            (TakenBody::Effect(f), DependentKind::Effect { run, .. }) => *run = Some(f),
            (TakenBody::Memo(f), DependentKind::Memo { compute, .. }) => *compute = Some(f),
            _ => {}
        }
    }
}

struct FlushingReset<'a>(&'a Cell<bool>);

impl Drop for FlushingReset<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
