//! Ripple Core
//!
//! This crate provides the core runtime for the Ripple reactive UI
//! framework. It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Fine-grained dependency tracking with per-run edge rebuilding
//! - Batched, deduplicated effect scheduling with isolated error handling
//! - A reactive store over plain JSON documents
//!
//! Everything hangs off a host-owned [`Runtime`]: there are no globals and
//! no thread-locals, so embedding hosts can run as many independent
//! runtimes as they like. A `Runtime` is single-threaded by construction
//! (it is neither `Send` nor `Sync`).
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: The runtime, tracking context, and the signal, memo and
//!   effect primitives
//! - `graph`: Dependency-graph slots and the batch scheduler
//! - `store`: Reactive access to wrapped JSON containers
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = rt.signal(0);
//!
//! // Create a derived value
//! let doubled = rt.memo(move |rt| count.get(rt) * 2);
//!
//! // Create an effect
//! rt.effect(move |rt| {
//!     println!("Count: {}, Doubled: {}", count.get(rt), doubled.get(rt));
//! });
//!
//! // Update the signal, then flush at the host's yield point
//! count.set(&rt, 5);
//! rt.flush();
//! // Effect runs once, prints: "Count: 5, Doubled: 10"
//! ```

pub mod graph;
pub mod reactive;
pub mod store;

pub use graph::CleanupFn;
pub use reactive::{Effect, Memo, Runtime, Signal};
pub use store::{Entry, Obj, StoreError};
