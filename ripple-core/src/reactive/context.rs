//! Tracking Context
//!
//! The tracking context records which dependent is currently running. This
//! enables automatic dependency tracking: when a source is read, the engine
//! registers the active dependent on it.
//!
//! # Implementation
//!
//! The context is a plain stack owned by the `Runtime` - there is no
//! thread-local or global state, so two runtimes in one thread never see
//! each other's tracking. Running a dependent pushes a frame; the frame is
//! popped by a drop guard, so the stack stays balanced even if the body
//! panics.
//!
//! Nested frames save and restore rather than clobber: a memo evaluated in
//! the middle of an effect collects its own dependencies, and the effect's
//! frame becomes active again the moment the memo finishes. An `Untracked`
//! frame acts as a barrier, so reads inside `Runtime::untrack` register
//! nothing no matter how deeply the tracked frames below it are stacked.

use std::cell::RefCell;

use crate::graph::DependentId;

/// One entry on the tracking stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame {
    /// Reads register edges onto this dependent.
    Tracked(DependentId),
    /// Reads register nothing until this frame is popped.
    Untracked,
}

/// Stack of tracking frames, owned by the runtime.
#[derive(Default)]
pub(crate) struct TrackingStack {
    frames: RefCell<Vec<Frame>>,
}

impl TrackingStack {
    /// Push a frame and return a guard that pops it on drop.
    pub fn enter(&self, frame: Frame) -> FrameGuard<'_> {
        self.frames.borrow_mut().push(frame);
        FrameGuard {
            stack: self,
            expected: frame,
        }
    }

    /// The dependent reads should currently register on, if any.
    pub fn active(&self) -> Option<DependentId> {
        match self.frames.borrow().last() {
            Some(Frame::Tracked(id)) => Some(*id),
            _ => None,
        }
    }

    /// Number of frames (tracked or untracked) on the stack.
    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Guard that pops its frame when dropped.
pub(crate) struct FrameGuard<'a> {
    stack: &'a TrackingStack,
    expected: Frame,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        let popped = self.stack.frames.borrow_mut().pop();

        // Catches mismatched enter/exit pairs during development.
        debug_assert_eq!(
            popped,
            Some(self.expected),
            "tracking frame mismatch: expected {:?}, got {:?}",
            self.expected,
            popped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_follows_the_top_frame() {
        let stack = TrackingStack::default();
        let a = DependentId::new(1);
        let b = DependentId::new(2);

        assert_eq!(stack.active(), None);

        {
            let _outer = stack.enter(Frame::Tracked(a));
            assert_eq!(stack.active(), Some(a));

            {
                let _inner = stack.enter(Frame::Tracked(b));
                assert_eq!(stack.active(), Some(b));
            }

            // Inner frame popped; the outer dependent is active again.
            assert_eq!(stack.active(), Some(a));
        }

        assert_eq!(stack.active(), None);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn untracked_frame_is_a_barrier() {
        let stack = TrackingStack::default();
        let a = DependentId::new(1);

        let _tracked = stack.enter(Frame::Tracked(a));
        {
            let _barrier = stack.enter(Frame::Untracked);
            assert_eq!(stack.active(), None);
        }
        assert_eq!(stack.active(), Some(a));
    }
}
