//! Reactive Primitives
//!
//! This module implements the core reactive system: the runtime plus the
//! signal, memo, and effect primitives layered on top of it. These form
//! the foundation of Ripple's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is
//! read while a memo or effect is running, the runtime automatically
//! registers that computation as a dependent. When the signal's value
//! changes, dependent effects are queued for the next flush.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes, and only when somebody reads it.
//! Memos are useful for expensive computations that should not be repeated
//! unnecessarily.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change. Effects are used to synchronize reactive state
//! with external systems, such as a view layer or a log.
//!
//! # Implementation Notes
//!
//! There is no global or thread-local state: every operation takes the
//! host-owned [`Runtime`] explicitly, and the tracking context lives
//! inside it. When a signal is read, the runtime checks whether a
//! computation is currently running and, if so, records the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod context;
mod effect;
mod memo;
mod runtime;
mod signal;

pub use effect::Effect;
pub use memo::Memo;
pub use runtime::Runtime;
pub use signal::Signal;
