//! Integration Tests for the Reactive System
//!
//! These tests verify that the runtime, signals, memos, effects and the
//! store work together correctly, end to end, the way an embedding host
//! would drive them.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use serde_json::json;

use ripple_core::{Runtime, StoreError};

/// The complete chain: a signal feeds a memo feeds an effect, and a write
/// propagates through both on the next flush.
#[test]
fn full_reactive_chain() {
    let rt = Runtime::new();
    let base = rt.signal(100);
    let tripled = rt.memo(move |rt| base.get(rt) * 3);

    let seen = Rc::new(Cell::new(0));
    let out = Rc::clone(&seen);
    rt.effect(move |rt| {
        out.set(tripled.get(rt));
    });
    assert_eq!(seen.get(), 300);

    base.set(&rt, 50);
    rt.flush();
    assert_eq!(seen.get(), 150);
}

/// Several writes inside one synchronous window collapse to a single
/// effect run, and the effect observes the final values.
#[test]
fn writes_batch_until_the_flush_point() {
    let rt = Runtime::new();
    let a = rt.signal(1);
    let b = rt.signal(10);
    let runs = Rc::new(Cell::new(0));
    let sum = Rc::new(Cell::new(0));

    let tally = Rc::clone(&runs);
    let out = Rc::clone(&sum);
    rt.effect(move |rt| {
        tally.set(tally.get() + 1);
        out.set(a.get(rt) + b.get(rt));
    });
    assert_eq!((runs.get(), sum.get()), (1, 11));

    a.set(&rt, 2);
    b.set(&rt, 20);
    a.set(&rt, 3);
    assert_eq!(runs.get(), 1, "nothing runs before the flush point");

    rt.flush();
    assert_eq!((runs.get(), sum.get()), (2, 23));
}

/// A memo reached through two paths from the same signal still produces
/// exactly one effect run per flush.
#[test]
fn diamond_dependencies_deduplicate() {
    let rt = Runtime::new();
    let base = rt.signal(1);
    let plus_one = rt.memo(move |rt| base.get(rt) + 1);
    let doubled = rt.memo(move |rt| base.get(rt) * 2);

    let runs = Rc::new(Cell::new(0));
    let seen = Rc::new(Cell::new((0, 0)));
    let tally = Rc::clone(&runs);
    let out = Rc::clone(&seen);
    rt.effect(move |rt| {
        tally.set(tally.get() + 1);
        out.set((plus_one.get(rt), doubled.get(rt)));
    });
    assert_eq!(runs.get(), 1);
    assert_eq!(seen.get(), (2, 2));

    base.set(&rt, 5);
    rt.flush();
    assert_eq!(runs.get(), 2, "two paths, one run");
    assert_eq!(seen.get(), (6, 10));
}

/// Memos recompute on read, not on write: a chain of writes costs nothing
/// until somebody pulls the value.
#[test]
fn memos_are_lazy() {
    let rt = Runtime::new();
    let base = rt.signal(0);
    let computes = Rc::new(Cell::new(0));

    let tally = Rc::clone(&computes);
    let squared = rt.memo(move |rt| {
        tally.set(tally.get() + 1);
        let v = base.get(rt);
        v * v
    });
    assert_eq!(computes.get(), 0, "creation computes nothing");

    for i in 1..=10 {
        base.set(&rt, i);
    }
    assert_eq!(computes.get(), 0, "writes compute nothing");

    assert_eq!(squared.get(&rt), 100);
    assert_eq!(computes.get(), 1, "one pull, one compute");
}

/// Disposing an effect in the same window as the write that scheduled it
/// means the effect never runs again: disposal wins the race.
#[test]
fn disposal_beats_a_pending_schedule() {
    let rt = Runtime::new();
    let count = rt.signal(0);
    let runs = Rc::new(Cell::new(0));

    let tally = Rc::clone(&runs);
    let logger = rt.effect(move |rt| {
        count.get(rt);
        tally.set(tally.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    count.set(&rt, 1);
    logger.dispose(&rt);
    rt.flush();
    assert_eq!(runs.get(), 1);

    // And disposal is permanent.
    count.set(&rt, 2);
    rt.flush();
    assert_eq!(runs.get(), 1);
}

/// One effect panicking mid-flush is isolated: the other effects in the
/// batch still run, the panic is reported exactly once, and the runtime
/// stays usable.
#[test]
fn flush_errors_are_isolated_per_effect() {
    let rt = Runtime::new();
    let trigger = rt.signal(0);
    let survivor_runs = Rc::new(Cell::new(0));

    rt.effect(move |rt| {
        if trigger.get(rt) > 0 {
            panic!("deliberate failure");
        }
    });
    let tally = Rc::clone(&survivor_runs);
    rt.effect(move |rt| {
        trigger.get(rt);
        tally.set(tally.get() + 1);
    });
    assert_eq!(survivor_runs.get(), 1);

    let hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    trigger.set(&rt, 1);
    rt.flush();
    std::panic::set_hook(hook);

    assert_eq!(survivor_runs.get(), 2);
    assert_eq!(rt.error_count(), 1);

    // The failed effect stays subscribed and the runtime keeps working.
    trigger.set(&rt, 0);
    rt.flush();
    assert_eq!(survivor_runs.get(), 3);
}

/// An error thrown by an effect's very first run is different: it belongs
/// to the creating caller and propagates synchronously.
#[test]
fn initial_run_errors_reach_the_caller() {
    let rt = Runtime::new();

    let hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        rt.effect(|_| panic!("bad setup"));
    }));
    std::panic::set_hook(hook);

    assert!(outcome.is_err());
    assert_eq!(rt.error_count(), 0, "creation failures are not flush errors");
}

/// The wrap scenario: an effect logging two entries of a wrapped object
/// re-runs per batch of changes and ignores equal-value writes.
#[test]
fn store_changes_log_per_batch() {
    let rt = Runtime::new();
    let w = rt.wrap(json!({ "a": 1, "b": 2 })).unwrap();
    let log: Rc<RefCell<Vec<(i64, i64)>>> = Rc::new(RefCell::new(Vec::new()));

    let out = Rc::clone(&log);
    rt.effect(move |rt| {
        let a = w.get(rt, "a").unwrap().unwrap();
        let b = w.get(rt, "b").unwrap().unwrap();
        out.borrow_mut().push((
            a.as_value().unwrap().as_i64().unwrap(),
            b.as_value().unwrap().as_i64().unwrap(),
        ));
    });
    assert_eq!(*log.borrow(), vec![(1, 2)]);

    w.set(&rt, "a", json!(5)).unwrap();
    rt.flush();
    assert_eq!(*log.borrow(), vec![(1, 2), (5, 2)]);

    // Equal-value write: no scheduling, no log entry.
    assert!(!w.set(&rt, "b", json!(2)).unwrap());
    rt.flush();
    assert_eq!(*log.borrow(), vec![(1, 2), (5, 2)]);

    // Two changes in one window, one combined log entry.
    w.set(&rt, "a", json!(7)).unwrap();
    w.set(&rt, "b", json!(9)).unwrap();
    rt.flush();
    assert_eq!(*log.borrow(), vec![(1, 2), (5, 2), (7, 9)]);
}

/// Memos can derive from store entries just like from signals.
#[test]
fn memos_derive_from_store_entries() {
    let rt = Runtime::new();
    let cart = rt.wrap(json!({ "price": 10, "qty": 3 })).unwrap();

    let total = rt.memo(move |rt| {
        let price = cart.get(rt, "price").unwrap().unwrap();
        let qty = cart.get(rt, "qty").unwrap().unwrap();
        price.as_value().unwrap().as_i64().unwrap() * qty.as_value().unwrap().as_i64().unwrap()
    });
    assert_eq!(total.get(&rt), 30);

    cart.set(&rt, "qty", json!(5)).unwrap();
    assert_eq!(total.get(&rt), 50);
}

/// Store misuse errors surface synchronously at the call site, never
/// through the flush pipeline.
#[test]
fn store_misuse_is_a_synchronous_error() {
    let rt = Runtime::new();
    assert!(matches!(
        rt.wrap(json!(42)),
        Err(StoreError::NotContainer { kind: "number" })
    ));

    let arr = rt.wrap(json!([1, 2, 3])).unwrap();
    assert!(matches!(
        arr.keys(&rt),
        Err(StoreError::KindMismatch { op: "keys", .. })
    ));
    assert_eq!(rt.error_count(), 0);
}

/// How a host actually drives the runtime: install a waker, write freely,
/// and flush when the waker has fired.
#[test]
fn host_loop_with_waker() {
    let rt = Runtime::new();
    let count = rt.signal(0);
    let seen = Rc::new(Cell::new(0));

    let out = Rc::clone(&seen);
    rt.effect(move |rt| {
        out.set(count.get(rt));
    });

    let pending = Rc::new(Cell::new(false));
    let flag = Rc::clone(&pending);
    rt.set_waker(move || flag.set(true));

    count.set(&rt, 1);
    count.set(&rt, 2);
    assert!(pending.get(), "first write of the window pings the waker");

    while pending.get() {
        pending.set(false);
        rt.flush();
    }
    assert_eq!(seen.get(), 2);
    assert!(!rt.needs_flush());
}
