//! Reactive Store
//!
//! The store wraps a JSON document so that reads and writes of individual
//! entries participate in dependency tracking. It is the bridge between
//! plain data (`serde_json::Value`) and the signal graph.
//!
//! # How The Store Works
//!
//! 1. `Runtime::wrap` consumes an object or array `Value` and returns an
//!    [`Obj`] handle. Wrapping a scalar is a synchronous error.
//!
//! 2. Reads (`get`, `at`, `keys`, `len`) go through per-entry sources that
//!    are created lazily, on the first tracked read. Untracked reads
//!    allocate nothing.
//!
//! 3. Writes compare structurally against the current entry first; writing
//!    an equal value propagates nothing. A changed entry notifies exactly
//!    the dependents of that entry.
//!
//! 4. Adding or removing an entry additionally notifies the container's
//!    structure source, which is what `keys` and `len` track.
//!
//! # Granularity
//!
//! Dependencies are per entry, not per container: an effect reading
//! `user.get(rt, "name")` does not re-run when `user.set(rt, "age", ..)`
//! changes a sibling.
//!
//! # Identity
//!
//! Reading a nested container promotes it into a child [`Obj`] exactly
//! once; every later read of the same entry returns a handle to the same
//! child. Promoted data is moved out of the parent (a `Null` placeholder
//! stays behind) and stitched back in by [`Obj::snapshot`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::mem;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

use crate::graph::SourceId;
use crate::reactive::Runtime;

/// Errors surfaced by store operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// `wrap` was handed a scalar; only objects and arrays have entries
    /// to track.
    #[error("cannot wrap a {kind} value; expected an object or array")]
    NotContainer {
        /// JSON kind of the rejected value.
        kind: &'static str,
    },

    /// A keyed operation was applied to an array, or an indexed operation
    /// to an object.
    #[error("{op} requires an {expected} target, found {found}")]
    KindMismatch {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// An indexed write landed outside the array. Use `push` to grow.
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Position of an entry inside a wrapped container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum EntryKey {
    /// Object member.
    Key(String),
    /// Array element.
    Index(usize),
}

/// Unique identifier of a wrapped container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ObjId(u64);

/// Arena slot backing one wrapped container.
pub(crate) struct ObjSlot {
    /// The container's data. Entries promoted into children are replaced
    /// by `Null` placeholders here.
    data: Value,

    /// Promoted nested containers, by entry.
    children: IndexMap<EntryKey, ObjId>,

    /// Lazily created per-entry sources.
    key_sources: IndexMap<EntryKey, SourceId>,

    /// Lazily created source tracking entry addition and removal.
    structure: Option<SourceId>,
}

impl ObjSlot {
    fn new(data: Value) -> Self {
        Self {
            data,
            children: IndexMap::new(),
            key_sources: IndexMap::new(),
            structure: None,
        }
    }

    fn kind_name(&self) -> &'static str {
        value_kind(&self.data)
    }

    fn entry(&self, key: &EntryKey) -> Option<&Value> {
        match key {
            EntryKey::Key(k) => self.data.as_object().and_then(|map| map.get(k)),
            EntryKey::Index(i) => self.data.as_array().and_then(|arr| arr.get(*i)),
        }
    }

    fn entry_mut(&mut self, key: &EntryKey) -> Option<&mut Value> {
        match key {
            EntryKey::Key(k) => self.data.as_object_mut().and_then(|map| map.get_mut(k)),
            EntryKey::Index(i) => self.data.as_array_mut().and_then(|arr| arr.get_mut(*i)),
        }
    }

    fn write_entry(&mut self, key: &EntryKey, value: Value) {
        match key {
            EntryKey::Key(k) => {
                if let Some(map) = self.data.as_object_mut() {
                    map.insert(k.clone(), value);
                }
            }
            EntryKey::Index(i) => {
                if let Some(slot) = self.data.as_array_mut().and_then(|arr| arr.get_mut(*i)) {
                    *slot = value;
                }
            }
        }
    }
}

/// Store-side state embedded in the runtime.
#[derive(Default)]
pub(crate) struct StoreState {
    objects: RefCell<HashMap<ObjId, ObjSlot>>,
    next_obj: Cell<u64>,
}

/// Handle to a wrapped container. Copy, like [`Signal`](crate::Signal);
/// the data lives in the runtime.
///
/// Two handles compare equal exactly when they address the same wrapped
/// container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Obj {
    id: ObjId,
}

/// One entry read out of a wrapped container.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A leaf value, cloned out of the store.
    Value(Value),
    /// A nested container, addressed through its own handle.
    Obj(Obj),
}

impl Entry {
    /// The leaf value, if this entry is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Entry::Value(v) => Some(v),
            Entry::Obj(_) => None,
        }
    }

    /// The nested container handle, if this entry is one.
    pub fn as_obj(&self) -> Option<Obj> {
        match self {
            Entry::Obj(obj) => Some(*obj),
            Entry::Value(_) => None,
        }
    }
}

impl Runtime {
    /// Wrap a JSON container for reactive access.
    ///
    /// Consumes the value: the store becomes the single owner of the data,
    /// which is what makes handle identity reliable - the same nested
    /// entry always resolves to the same child handle.
    ///
    /// Scalars cannot be wrapped; the error is returned synchronously to
    /// the caller.
    pub fn wrap(&self, value: Value) -> Result<Obj, StoreError> {
        match value {
            Value::Object(_) | Value::Array(_) => {
                let id = self.alloc_obj(value);
                debug!(obj = id.0, "wrapped container");
                Ok(Obj { id })
            }
            other => Err(StoreError::NotContainer {
                kind: value_kind(&other),
            }),
        }
    }

    fn alloc_obj(&self, data: Value) -> ObjId {
        let id = ObjId(self.store.next_obj.get());
        self.store.next_obj.set(id.0 + 1);
        self.store.objects.borrow_mut().insert(id, ObjSlot::new(data));
        id
    }

    /// Track a read of one entry (`Some(key)`) or of the container's
    /// structure (`None`). Sources are created on first tracked use;
    /// untracked reads leave the graph untouched.
    fn store_track(&self, id: ObjId, key: Option<&EntryKey>) {
        if !self.is_tracking() {
            return;
        }
        let existing = {
            let objects = self.store.objects.borrow();
            let slot = objects.get(&id).expect("unknown store object");
            match key {
                Some(k) => slot.key_sources.get(k).copied(),
                None => slot.structure,
            }
        };
        let source = match existing {
            Some(source) => source,
            None => {
                let source = self.alloc_source(None, None);
                let mut objects = self.store.objects.borrow_mut();
                let slot = objects.get_mut(&id).expect("unknown store object");
                match key {
                    Some(k) => {
                        slot.key_sources.insert(k.clone(), source);
                    }
                    None => slot.structure = Some(source),
                }
                source
            }
        };
        self.track_read(source);
    }

    /// Notify dependents of one entry (`Some(key)`) or of the container's
    /// structure (`None`). Entries nobody ever tracked have no source and
    /// nothing to notify.
    fn store_notify(&self, id: ObjId, key: Option<&EntryKey>) {
        let source = {
            let objects = self.store.objects.borrow();
            let slot = objects.get(&id).expect("unknown store object");
            match key {
                Some(k) => slot.key_sources.get(k).copied(),
                None => slot.structure,
            }
        };
        if let Some(source) = source {
            self.notify_source(source);
        }
    }

    fn store_expect(&self, id: ObjId, expected: &'static str, op: &'static str) -> Result<(), StoreError> {
        let objects = self.store.objects.borrow();
        let slot = objects.get(&id).expect("unknown store object");
        let found = slot.kind_name();
        if found == expected {
            Ok(())
        } else {
            Err(StoreError::KindMismatch { op, expected, found })
        }
    }

    fn store_kind_gate(&self, id: ObjId, key: &EntryKey, op: &'static str) -> Result<(), StoreError> {
        match key {
            EntryKey::Key(_) => self.store_expect(id, "object", op),
            EntryKey::Index(_) => self.store_expect(id, "array", op),
        }
    }

    fn store_get(&self, id: ObjId, key: EntryKey, op: &'static str) -> Result<Option<Entry>, StoreError> {
        self.store_kind_gate(id, &key, op)?;
        // Absent entries are tracked too, so a dependent re-runs when the
        // entry appears.
        self.store_track(id, Some(&key));

        let existing_child = self
            .store
            .objects
            .borrow()
            .get(&id)
            .expect("unknown store object")
            .children
            .get(&key)
            .copied();
        if let Some(child) = existing_child {
            return Ok(Some(Entry::Obj(Obj { id: child })));
        }

        let leaf = {
            let objects = self.store.objects.borrow();
            let slot = objects.get(&id).expect("unknown store object");
            match slot.entry(&key) {
                None => return Ok(None),
                Some(v) if v.is_object() || v.is_array() => None,
                Some(v) => Some(v.clone()),
            }
        };
        if let Some(value) = leaf {
            return Ok(Some(Entry::Value(value)));
        }

        // Nested container: move it into a child slot, once.
        let taken = {
            let mut objects = self.store.objects.borrow_mut();
            let slot = objects.get_mut(&id).expect("unknown store object");
            let entry = slot.entry_mut(&key).expect("container vanished between reads");
            mem::replace(entry, Value::Null)
        };
        let child = self.alloc_obj(taken);
        self.store
            .objects
            .borrow_mut()
            .get_mut(&id)
            .expect("unknown store object")
            .children
            .insert(key, child);
        trace!(parent = id.0, child = child.0, "promoted nested container");
        Ok(Some(Entry::Obj(Obj { id: child })))
    }

    fn store_set(&self, id: ObjId, key: EntryKey, value: Value, op: &'static str) -> Result<bool, StoreError> {
        self.store_kind_gate(id, &key, op)?;
        if let EntryKey::Index(index) = key {
            let len = self
                .store
                .objects
                .borrow()
                .get(&id)
                .expect("unknown store object")
                .data
                .as_array()
                .map(|arr| arr.len())
                .unwrap_or(0);
            if index >= len {
                return Err(StoreError::IndexOutOfBounds { index, len });
            }
        }

        let promoted = self
            .store
            .objects
            .borrow()
            .get(&id)
            .expect("unknown store object")
            .children
            .get(&key)
            .copied();

        // Structural comparison against the current entry; a promoted
        // child is reassembled for the purpose.
        let (unchanged, is_new_entry) = match promoted {
            Some(child) => (self.store_snapshot(child) == value, false),
            None => {
                let objects = self.store.objects.borrow();
                let slot = objects.get(&id).expect("unknown store object");
                match slot.entry(&key) {
                    Some(current) => (*current == value, false),
                    None => (false, true),
                }
            }
        };
        if unchanged {
            return Ok(false);
        }

        {
            let mut objects = self.store.objects.borrow_mut();
            let slot = objects.get_mut(&id).expect("unknown store object");
            if promoted.is_some() {
                // The replaced child is orphaned, not destroyed; handles
                // to it keep working, detached from this container.
                slot.children.shift_remove(&key);
            }
            slot.write_entry(&key, value);
        }

        self.store_notify(id, Some(&key));
        if is_new_entry {
            self.store_notify(id, None);
        }
        Ok(true)
    }

    fn store_remove(&self, id: ObjId, key: &str) -> Result<Option<Value>, StoreError> {
        let entry_key = EntryKey::Key(key.to_string());
        self.store_kind_gate(id, &entry_key, "remove")?;

        let promoted = self
            .store
            .objects
            .borrow()
            .get(&id)
            .expect("unknown store object")
            .children
            .get(&entry_key)
            .copied();

        let removed = match promoted {
            Some(child) => {
                // Reassemble first so the caller gets the full value.
                let value = self.store_snapshot(child);
                let mut objects = self.store.objects.borrow_mut();
                let slot = objects.get_mut(&id).expect("unknown store object");
                slot.children.shift_remove(&entry_key);
                if let Some(map) = slot.data.as_object_mut() {
                    map.remove(key);
                }
                Some(value)
            }
            None => {
                let mut objects = self.store.objects.borrow_mut();
                let slot = objects.get_mut(&id).expect("unknown store object");
                slot.data.as_object_mut().and_then(|map| map.remove(key))
            }
        };

        if removed.is_some() {
            self.store_notify(id, Some(&entry_key));
            self.store_notify(id, None);
        }
        Ok(removed)
    }

    fn store_snapshot(&self, id: ObjId) -> Value {
        let (mut data, children): (Value, Vec<(EntryKey, ObjId)>) = {
            let objects = self.store.objects.borrow();
            let slot = objects.get(&id).expect("unknown store object");
            (
                slot.data.clone(),
                slot.children.iter().map(|(k, c)| (k.clone(), *c)).collect(),
            )
        };
        for (key, child) in children {
            let value = self.store_snapshot(child);
            match &key {
                EntryKey::Key(k) => {
                    if let Some(map) = data.as_object_mut() {
                        map.insert(k.clone(), value);
                    }
                }
                EntryKey::Index(i) => {
                    if let Some(slot) = data.as_array_mut().and_then(|arr| arr.get_mut(*i)) {
                        *slot = value;
                    }
                }
            }
        }
        data
    }
}

impl Obj {
    /// Read an object member. Tracked per entry; reading an absent member
    /// returns `Ok(None)` and still subscribes to its appearance.
    pub fn get(&self, rt: &Runtime, key: &str) -> Result<Option<Entry>, StoreError> {
        rt.store_get(self.id, EntryKey::Key(key.to_string()), "get")
    }

    /// Write an object member, returning whether anything changed. Equal
    /// values (structurally) are complete no-ops; new members additionally
    /// notify `keys` observers.
    pub fn set(&self, rt: &Runtime, key: &str, value: Value) -> Result<bool, StoreError> {
        rt.store_set(self.id, EntryKey::Key(key.to_string()), value, "set")
    }

    /// Remove an object member, returning its value. Notifies both the
    /// member's dependents and `keys` observers.
    pub fn remove(&self, rt: &Runtime, key: &str) -> Result<Option<Value>, StoreError> {
        rt.store_remove(self.id, key)
    }

    /// The object's member names, in insertion order. Tracks structure:
    /// re-runs on member addition and removal, not on value changes.
    pub fn keys(&self, rt: &Runtime) -> Result<Vec<String>, StoreError> {
        rt.store_expect(self.id, "object", "keys")?;
        rt.store_track(self.id, None);
        let objects = rt.store.objects.borrow();
        let slot = objects.get(&self.id).expect("unknown store object");
        Ok(slot
            .data
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Read an array element. Tracked per index; out-of-range reads
    /// return `Ok(None)` and re-run when the array grows to cover them.
    pub fn at(&self, rt: &Runtime, index: usize) -> Result<Option<Entry>, StoreError> {
        rt.store_get(self.id, EntryKey::Index(index), "at")
    }

    /// Write an array element in place, returning whether anything changed.
    /// Out-of-range writes are an error; use [`Obj::push`] to grow the array.
    pub fn set_at(&self, rt: &Runtime, index: usize, value: Value) -> Result<bool, StoreError> {
        rt.store_set(self.id, EntryKey::Index(index), value, "set_at")
    }

    /// Append to an array. Notifies `len` observers and any dependent
    /// already watching the new index.
    pub fn push(&self, rt: &Runtime, value: Value) -> Result<(), StoreError> {
        rt.store_expect(self.id, "array", "push")?;
        let new_index = {
            let mut objects = rt.store.objects.borrow_mut();
            let slot = objects.get_mut(&self.id).expect("unknown store object");
            let arr = slot.data.as_array_mut().expect("kind gate admitted a non-array");
            arr.push(value);
            arr.len() - 1
        };
        rt.store_notify(self.id, Some(&EntryKey::Index(new_index)));
        rt.store_notify(self.id, None);
        Ok(())
    }

    /// The array's length. Tracks structure, so `push` re-runs observers.
    pub fn len(&self, rt: &Runtime) -> Result<usize, StoreError> {
        rt.store_expect(self.id, "array", "len")?;
        rt.store_track(self.id, None);
        let objects = rt.store.objects.borrow();
        let slot = objects.get(&self.id).expect("unknown store object");
        Ok(slot.data.as_array().map(|arr| arr.len()).unwrap_or(0))
    }

    /// Whether the array is empty. Tracked like [`Obj::len`].
    pub fn is_empty(&self, rt: &Runtime) -> Result<bool, StoreError> {
        Ok(self.len(rt)? == 0)
    }

    /// Whether this handle wraps an array.
    pub fn is_array(&self, rt: &Runtime) -> bool {
        rt.store
            .objects
            .borrow()
            .get(&self.id)
            .map(|slot| slot.data.is_array())
            .unwrap_or(false)
    }

    /// Whether this handle wraps an object.
    pub fn is_object(&self, rt: &Runtime) -> bool {
        rt.store
            .objects
            .borrow()
            .get(&self.id)
            .map(|slot| slot.data.is_object())
            .unwrap_or(false)
    }

    /// Deep, untracked copy of the container with all promoted children
    /// stitched back in.
    pub fn snapshot(&self, rt: &Runtime) -> Value {
        rt.store_snapshot(self.id)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn wrap_rejects_scalars() {
        let rt = Runtime::new();
        assert_eq!(
            rt.wrap(json!(5)).unwrap_err(),
            StoreError::NotContainer { kind: "number" }
        );
        assert_eq!(
            rt.wrap(json!("text")).unwrap_err(),
            StoreError::NotContainer { kind: "string" }
        );
        assert_eq!(
            rt.wrap(Value::Null).unwrap_err(),
            StoreError::NotContainer { kind: "null" }
        );
        assert!(rt.wrap(json!({})).is_ok());
        assert!(rt.wrap(json!([])).is_ok());
    }

    #[test]
    fn get_and_set_roundtrip() {
        let rt = Runtime::new();
        let obj = rt.wrap(json!({ "a": 1 })).unwrap();

        assert_eq!(
            obj.get(&rt, "a").unwrap(),
            Some(Entry::Value(json!(1)))
        );
        assert_eq!(obj.get(&rt, "missing").unwrap(), None);

        assert!(obj.set(&rt, "a", json!(2)).unwrap());
        assert_eq!(obj.get(&rt, "a").unwrap(), Some(Entry::Value(json!(2))));
    }

    #[test]
    fn nested_containers_keep_their_identity() {
        let rt = Runtime::new();
        let obj = rt
            .wrap(json!({ "user": { "name": "ada" }, "tags": [1, 2] }))
            .unwrap();

        let first = obj.get(&rt, "user").unwrap().unwrap().as_obj().unwrap();
        let second = obj.get(&rt, "user").unwrap().unwrap().as_obj().unwrap();
        assert_eq!(first, second, "same entry, same handle");

        first.set(&rt, "name", json!("grace")).unwrap();
        assert_eq!(
            second.get(&rt, "name").unwrap(),
            Some(Entry::Value(json!("grace")))
        );

        let tags = obj.get(&rt, "tags").unwrap().unwrap().as_obj().unwrap();
        assert!(tags.is_array(&rt));
        assert_eq!(tags.len(&rt).unwrap(), 2);
    }

    #[test]
    fn effects_track_individual_entries() {
        let rt = Runtime::new();
        let obj = rt.wrap(json!({ "a": 1, "b": 2 })).unwrap();
        let runs = Rc::new(Cell::new(0));

        let tally = Rc::clone(&runs);
        rt.effect(move |rt| {
            obj.get(rt, "a").unwrap();
            tally.set(tally.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        // A sibling entry changes: no re-run.
        obj.set(&rt, "b", json!(20)).unwrap();
        rt.flush();
        assert_eq!(runs.get(), 1);

        obj.set(&rt, "a", json!(10)).unwrap();
        rt.flush();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn equal_value_writes_propagate_nothing() {
        let rt = Runtime::new();
        let obj = rt.wrap(json!({ "a": { "deep": [1, 2] } })).unwrap();
        let runs = Rc::new(Cell::new(0));

        let tally = Rc::clone(&runs);
        rt.effect(move |rt| {
            obj.get(rt, "a").unwrap();
            tally.set(tally.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        // Structurally identical replacement, including through promotion.
        assert!(!obj.set(&rt, "a", json!({ "deep": [1, 2] })).unwrap());
        assert!(!rt.needs_flush());
        rt.flush();
        assert_eq!(runs.get(), 1);

        assert!(obj.set(&rt, "a", json!({ "deep": [1, 2, 3] })).unwrap());
        rt.flush();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn absent_entries_are_tracked_until_they_appear() {
        let rt = Runtime::new();
        let obj = rt.wrap(json!({})).unwrap();
        let seen = Rc::new(Cell::new(false));

        let out = Rc::clone(&seen);
        rt.effect(move |rt| {
            out.set(obj.get(rt, "pending").unwrap().is_some());
        });
        assert!(!seen.get());

        obj.set(&rt, "pending", json!(true)).unwrap();
        rt.flush();
        assert!(seen.get(), "the reader saw the entry appear");
    }

    #[test]
    fn keys_observers_follow_structure_not_values() {
        let rt = Runtime::new();
        let obj = rt.wrap(json!({ "a": 1 })).unwrap();
        let runs = Rc::new(Cell::new(0));

        let tally = Rc::clone(&runs);
        rt.effect(move |rt| {
            obj.keys(rt).unwrap();
            tally.set(tally.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        // Value change on an existing member: structure untouched.
        obj.set(&rt, "a", json!(2)).unwrap();
        rt.flush();
        assert_eq!(runs.get(), 1);

        obj.set(&rt, "b", json!(3)).unwrap();
        rt.flush();
        assert_eq!(runs.get(), 2);

        obj.remove(&rt, "a").unwrap();
        rt.flush();
        assert_eq!(runs.get(), 3);
        assert_eq!(obj.keys(&rt).unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn arrays_push_and_observe_length() {
        let rt = Runtime::new();
        let arr = rt.wrap(json!([1, 2])).unwrap();
        let lens = Rc::new(Cell::new(0));

        let out = Rc::clone(&lens);
        rt.effect(move |rt| {
            out.set(arr.len(rt).unwrap());
        });
        assert_eq!(lens.get(), 2);

        arr.push(&rt, json!(3)).unwrap();
        rt.flush();
        assert_eq!(lens.get(), 3);
        assert_eq!(arr.at(&rt, 2).unwrap(), Some(Entry::Value(json!(3))));
    }

    #[test]
    fn out_of_range_reads_rerun_when_the_array_grows() {
        let rt = Runtime::new();
        let arr = rt.wrap(json!([])).unwrap();
        let seen: Rc<RefCell<Option<Entry>>> = Rc::new(RefCell::new(None));

        let out = Rc::clone(&seen);
        rt.effect(move |rt| {
            *out.borrow_mut() = arr.at(rt, 0).unwrap();
        });
        assert_eq!(*seen.borrow(), None);

        arr.push(&rt, json!("first")).unwrap();
        rt.flush();
        assert_eq!(*seen.borrow(), Some(Entry::Value(json!("first"))));
    }

    #[test]
    fn set_at_rejects_out_of_bounds() {
        let rt = Runtime::new();
        let arr = rt.wrap(json!([1, 2])).unwrap();

        arr.set_at(&rt, 1, json!(20)).unwrap();
        assert_eq!(arr.at(&rt, 1).unwrap(), Some(Entry::Value(json!(20))));

        assert_eq!(
            arr.set_at(&rt, 5, json!(0)).unwrap_err(),
            StoreError::IndexOutOfBounds { index: 5, len: 2 }
        );
    }

    #[test]
    fn kind_mismatches_are_synchronous_errors() {
        let rt = Runtime::new();
        let obj = rt.wrap(json!({ "a": 1 })).unwrap();
        let arr = rt.wrap(json!([1])).unwrap();

        assert_eq!(
            arr.get(&rt, "a").unwrap_err(),
            StoreError::KindMismatch {
                op: "get",
                expected: "object",
                found: "array"
            }
        );
        assert_eq!(
            obj.push(&rt, json!(1)).unwrap_err(),
            StoreError::KindMismatch {
                op: "push",
                expected: "array",
                found: "object"
            }
        );
        assert_eq!(
            obj.len(&rt).unwrap_err(),
            StoreError::KindMismatch {
                op: "len",
                expected: "array",
                found: "object"
            }
        );
    }

    #[test]
    fn snapshot_reassembles_promoted_children() {
        let rt = Runtime::new();
        let obj = rt
            .wrap(json!({ "user": { "name": "ada", "langs": ["rust"] }, "n": 1 }))
            .unwrap();

        let user = obj.get(&rt, "user").unwrap().unwrap().as_obj().unwrap();
        let langs = user.get(&rt, "langs").unwrap().unwrap().as_obj().unwrap();
        langs.push(&rt, json!("ml")).unwrap();
        user.set(&rt, "name", json!("grace")).unwrap();

        assert_eq!(
            obj.snapshot(&rt),
            json!({ "user": { "name": "grace", "langs": ["rust", "ml"] }, "n": 1 })
        );
    }

    #[test]
    fn replacing_a_promoted_child_orphans_it() {
        let rt = Runtime::new();
        let obj = rt.wrap(json!({ "inner": { "x": 1 } })).unwrap();
        let inner = obj.get(&rt, "inner").unwrap().unwrap().as_obj().unwrap();

        obj.set(&rt, "inner", json!({ "x": 2 })).unwrap();
        let replacement = obj.get(&rt, "inner").unwrap().unwrap().as_obj().unwrap();
        assert_ne!(inner, replacement);

        // The old handle still works, detached from the parent.
        assert_eq!(
            inner.get(&rt, "x").unwrap(),
            Some(Entry::Value(json!(1)))
        );
        assert_eq!(obj.snapshot(&rt), json!({ "inner": { "x": 2 } }));
    }
}
