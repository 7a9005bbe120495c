#![forbid(unsafe_code)]

//! A map whose keys are an observable set and whose values are computed.
//!
//! [`ComputedObservableMap`] mirrors the membership of a key set and asks a
//! [`ComputedMapHooks`] implementation for the value of each key. Per-key
//! bookkeeping (listening to whatever the value is derived from) is done in
//! [`ComputedMapHooks::hook_key`] / [`ComputedMapHooks::unhook_key`].
//!
//! # Invariants
//!
//! 1. The key set and every key are hooked only while the map has change or
//!    stale listeners.
//! 2. When a key leaves the key set its value is read before it is unhooked,
//!    so the removal diff carries the last computed value.
//! 3. `get`/`put` answer only for keys currently in the key set.
//! 4. Disposing the key set disposes the map.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::diff::{MapDiff, SetDiff};
use crate::error::ObservableError;
use crate::listener::{ChangeSupport, Subscription};
use crate::observable::{Observable, ObservableId, ObservableMap, SetRef, ValueType};
use crate::realm::Realm;
use crate::tracker::ObservableTracker;

/// Per-key behaviour plugged into a [`ComputedObservableMap`].
pub trait ComputedMapHooks<K, V> {
    /// Start observing whatever the value of `key` depends on.
    fn hook_key(&self, map: &ComputedObservableMap<K, V>, key: &K);

    /// Stop observing `key`.
    fn unhook_key(&self, map: &ComputedObservableMap<K, V>, key: &K);

    /// Current value for `key`, which is in the key set.
    fn compute(&self, key: &K) -> V;

    /// Store `value` for `key`, which is in the key set, returning the old
    /// value.
    fn store(&self, key: &K, value: V) -> Result<Option<V>, ObservableError>;

    /// Remove `key`. Unsupported unless the hooks say otherwise.
    fn remove(&self, map: &ComputedObservableMap<K, V>, key: &K) -> Result<Option<V>, ObservableError> {
        let _ = (map, key);
        Err(ObservableError::Unsupported("remove"))
    }

    /// Extra staleness on top of the key set's.
    fn is_stale(&self) -> bool {
        false
    }

    /// Release per-key resources after the map has been disposed.
    fn dispose(&self) {}
}

struct ComputedInner<K, V> {
    id: ObservableId,
    realm: Realm,
    key_set: SetRef<K>,
    key_type: Option<ValueType>,
    value_type: Option<ValueType>,
    hooks: Rc<dyn ComputedMapHooks<K, V>>,
    support: ChangeSupport<MapDiff<K, V>>,
    key_set_subs: RefCell<Vec<Subscription>>,
    key_set_dispose: RefCell<Option<Subscription>>,
    hooked: Cell<bool>,
    disposed: Cell<bool>,
}

/// Observable map over an observable key set with computed values.
///
/// Cloning creates another handle to the same map.
pub struct ComputedObservableMap<K, V> {
    inner: Rc<ComputedInner<K, V>>,
}

impl<K, V> Clone for ComputedObservableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Non-owning handle to a [`ComputedObservableMap`], for use inside
/// listeners the map itself keeps alive.
pub struct WeakComputedMap<K, V> {
    inner: Weak<ComputedInner<K, V>>,
}

impl<K, V> Clone for WeakComputedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<K, V> WeakComputedMap<K, V> {
    #[must_use]
    pub fn upgrade(&self) -> Option<ComputedObservableMap<K, V>> {
        self.inner.upgrade().map(|inner| ComputedObservableMap { inner })
    }
}

impl<K, V> ComputedObservableMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    /// Create a map over `key_set`. The map lives in the key set's realm.
    pub fn new(
        key_set: SetRef<K>,
        key_type: Option<ValueType>,
        value_type: Option<ValueType>,
        hooks: Rc<dyn ComputedMapHooks<K, V>>,
    ) -> Self {
        let inner = Rc::new(ComputedInner {
            id: ObservableId::next(),
            realm: key_set.realm(),
            key_set: Rc::clone(&key_set),
            key_type,
            value_type,
            hooks,
            support: ChangeSupport::new(),
            key_set_subs: RefCell::new(Vec::new()),
            key_set_dispose: RefCell::new(None),
            hooked: Cell::new(false),
            disposed: Cell::new(false),
        });

        let (first, last) = (Rc::downgrade(&inner), Rc::downgrade(&inner));
        inner.support.set_demand_hooks(
            move || {
                if let Some(inner) = first.upgrade() {
                    ComputedObservableMap { inner }.hook_all();
                }
            },
            move || {
                if let Some(inner) = last.upgrade() {
                    ComputedObservableMap { inner }.unhook_all();
                }
            },
        );

        let weak = Rc::downgrade(&inner);
        let dispose_sub = key_set.subscribe_dispose(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                ComputedObservableMap { inner }.dispose();
            }
        }));
        *inner.key_set_dispose.borrow_mut() = Some(dispose_sub);

        Self { inner }
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakComputedMap<K, V> {
        WeakComputedMap {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// The set supplying this map's keys.
    #[must_use]
    pub fn key_set(&self) -> SetRef<K> {
        Rc::clone(&self.inner.key_set)
    }

    /// Whether change or stale listeners are registered.
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        self.inner.support.has_listeners()
    }

    /// Fire a diff for one key whose value went from `old` to `new`.
    pub fn fire_single_change(&self, key: K, old: Option<V>, new: Option<V>) {
        self.fire_change(MapDiff::single_change(key, old, new));
    }

    pub fn fire_change(&self, diff: MapDiff<K, V>) {
        if !self.inner.disposed.get() && !diff.is_empty() {
            self.inner.support.fire_change(&diff);
        }
    }

    pub fn fire_stale(&self) {
        if !self.inner.disposed.get() {
            self.inner.support.fire_stale();
        }
    }

    fn hook_all(&self) {
        if self.inner.disposed.get() || self.inner.hooked.replace(true) {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        let change = self.inner.key_set.subscribe(Box::new(move |diff: &SetDiff<K>| {
            if let Some(inner) = weak.upgrade() {
                ComputedObservableMap { inner }.key_set_changed(diff);
            }
        }));
        let weak = Rc::downgrade(&self.inner);
        let stale = self.inner.key_set.subscribe_stale(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                ComputedObservableMap { inner }.fire_stale();
            }
        }));
        self.inner.key_set_subs.borrow_mut().extend([change, stale]);

        let keys = {
            let _ignore = ObservableTracker::ignore();
            self.inner.key_set.to_set()
        };
        for key in &keys {
            self.inner.hooks.hook_key(self, key);
        }
    }

    fn unhook_all(&self) {
        if !self.inner.hooked.replace(false) {
            return;
        }
        let subs = std::mem::take(&mut *self.inner.key_set_subs.borrow_mut());
        drop(subs);
        let keys = {
            let _ignore = ObservableTracker::ignore();
            self.inner.key_set.to_set()
        };
        for key in &keys {
            self.inner.hooks.unhook_key(self, key);
        }
    }

    fn key_set_changed(&self, diff: &SetDiff<K>) {
        if self.inner.disposed.get() {
            return;
        }
        let hooks = Rc::clone(&self.inner.hooks);
        let mut removed = HashMap::new();
        for key in diff.removals() {
            let old = hooks.compute(key);
            hooks.unhook_key(self, key);
            removed.insert(key.clone(), old);
        }
        let mut added = HashMap::new();
        for key in diff.additions() {
            hooks.hook_key(self, key);
            added.insert(key.clone(), hooks.compute(key));
        }
        self.fire_change(MapDiff::new(added, removed, HashMap::new()));
    }

    fn getter_called(&self) {
        ObservableTracker::getter_called(self.inner.id);
    }
}

impl<K, V> Observable for ComputedObservableMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn id(&self) -> ObservableId {
        self.inner.id
    }

    fn realm(&self) -> Realm {
        self.inner.realm.clone()
    }

    fn is_stale(&self) -> bool {
        self.getter_called();
        self.inner.key_set.is_stale() || self.inner.hooks.is_stale()
    }

    fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    fn dispose(&self) {
        if self.inner.disposed.get() {
            return;
        }
        self.unhook_all();
        self.inner.disposed.set(true);
        let dispose_sub = self.inner.key_set_dispose.borrow_mut().take();
        drop(dispose_sub);
        self.inner.hooks.dispose();
        self.inner.support.fire_dispose();
        self.inner.support.clear();
    }

    fn subscribe_stale(&self, listener: Box<dyn Fn()>) -> Subscription {
        self.inner.support.subscribe_stale(listener)
    }

    fn subscribe_dispose(&self, listener: Box<dyn Fn()>) -> Subscription {
        self.inner.support.subscribe_dispose(listener)
    }
}

impl<K, V> ObservableMap<K, V> for ComputedObservableMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn key_type(&self) -> Option<ValueType> {
        self.inner.key_type.clone()
    }

    fn value_type(&self) -> Option<ValueType> {
        self.inner.value_type.clone()
    }

    fn len(&self) -> usize {
        self.getter_called();
        self.inner.key_set.len()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.getter_called();
        self.inner.key_set.contains(key)
    }

    fn get(&self, key: &K) -> Option<V> {
        self.getter_called();
        if !self.inner.key_set.contains(key) {
            return None;
        }
        Some(self.inner.hooks.compute(key))
    }

    fn keys(&self) -> Vec<K> {
        self.getter_called();
        self.inner.key_set.to_set().into_iter().collect()
    }

    fn to_map(&self) -> HashMap<K, V> {
        self.getter_called();
        let keys: HashSet<K> = self.inner.key_set.to_set();
        keys.into_iter()
            .map(|key| {
                let value = self.inner.hooks.compute(&key);
                (key, value)
            })
            .collect()
    }

    fn put(&self, key: K, value: V) -> Result<Option<V>, ObservableError> {
        if self.inner.disposed.get() || !self.inner.key_set.contains(&key) {
            return Ok(None);
        }
        self.inner.hooks.store(&key, value)
    }

    fn remove(&self, key: &K) -> Result<Option<V>, ObservableError> {
        if self.inner.disposed.get() {
            return Ok(None);
        }
        let hooks = Rc::clone(&self.inner.hooks);
        hooks.remove(self, key)
    }

    fn clear(&self) -> Result<(), ObservableError> {
        Err(ObservableError::Unsupported("clear"))
    }

    fn subscribe(&self, listener: Box<dyn Fn(&MapDiff<K, V>)>) -> Subscription {
        self.inner.support.subscribe(listener)
    }
}

impl<K, V> fmt::Debug for ComputedObservableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedObservableMap")
            .field("id", &self.inner.id)
            .field("hooked", &self.inner.hooked.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::ObservableSet;
    use crate::writable::WritableSet;

    /// Value is the key's length; records hook traffic.
    #[derive(Default)]
    struct LengthHooks {
        hooked: RefCell<Vec<String>>,
        events: RefCell<Vec<String>>,
        disposed: Cell<bool>,
    }

    impl ComputedMapHooks<String, usize> for LengthHooks {
        fn hook_key(&self, _map: &ComputedObservableMap<String, usize>, key: &String) {
            self.hooked.borrow_mut().push(key.clone());
            self.events.borrow_mut().push(format!("hook {key}"));
        }

        fn unhook_key(&self, _map: &ComputedObservableMap<String, usize>, key: &String) {
            self.hooked.borrow_mut().retain(|k| k != key);
            self.events.borrow_mut().push(format!("unhook {key}"));
        }

        fn compute(&self, key: &String) -> usize {
            self.events.borrow_mut().push(format!("compute {key}"));
            key.len()
        }

        fn store(&self, _key: &String, _value: usize) -> Result<Option<usize>, ObservableError> {
            Err(ObservableError::Unsupported("put"))
        }

        fn dispose(&self) {
            self.disposed.set(true);
        }
    }

    fn setup() -> (WritableSet<String>, Rc<LengthHooks>, ComputedObservableMap<String, usize>) {
        let keys = WritableSet::from_elements(["ab".to_owned()]);
        let hooks = Rc::new(LengthHooks::default());
        let map = ComputedObservableMap::new(
            keys.share(),
            None,
            None,
            Rc::clone(&hooks) as Rc<dyn ComputedMapHooks<String, usize>>,
        );
        (keys, hooks, map)
    }

    #[test]
    fn hooks_only_while_observed() {
        let (keys, hooks, map) = setup();
        assert!(hooks.hooked.borrow().is_empty());
        assert!(!keys.has_listeners());

        let sub = map.subscribe(Box::new(|_: &MapDiff<String, usize>| {}));
        assert_eq!(*hooks.hooked.borrow(), vec!["ab".to_owned()]);
        assert!(keys.has_listeners());

        drop(sub);
        assert!(hooks.hooked.borrow().is_empty());
        assert!(!keys.has_listeners());
    }

    #[test]
    fn removal_reads_value_before_unhook() {
        let (keys, hooks, map) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let _sub = map.subscribe(Box::new(move |d: &MapDiff<String, usize>| {
            l.borrow_mut().push(d.clone());
        }));

        hooks.events.borrow_mut().clear();
        keys.remove(&"ab".to_owned()).expect("remove");
        assert_eq!(
            *hooks.events.borrow(),
            vec!["compute ab".to_owned(), "unhook ab".to_owned()]
        );

        keys.add("xyz".to_owned()).expect("add");
        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].old_value(&"ab".to_owned()), Some(&2));
        assert_eq!(log[1].new_value(&"xyz".to_owned()), Some(&3));
    }

    #[test]
    fn reads_answer_only_for_member_keys() {
        let (_keys, _hooks, map) = setup();
        assert_eq!(map.get(&"ab".to_owned()), Some(2));
        assert_eq!(map.get(&"zz".to_owned()), None);
        assert_eq!(map.put("zz".to_owned(), 1), Ok(None));
        assert_eq!(map.put("ab".to_owned(), 1), Err(ObservableError::Unsupported("put")));
        assert_eq!(map.remove(&"ab".to_owned()), Err(ObservableError::Unsupported("remove")));
        assert_eq!(map.len(), 1);
        assert_eq!(map.to_map(), HashMap::from([("ab".to_owned(), 2)]));
    }

    #[test]
    fn key_set_disposal_disposes_map() {
        let (keys, hooks, map) = setup();
        let _sub = map.subscribe(Box::new(|_: &MapDiff<String, usize>| {}));
        keys.dispose();
        assert!(map.is_disposed());
        assert!(hooks.disposed.get());
        assert!(hooks.hooked.borrow().is_empty());
    }

    #[test]
    fn stale_follows_key_set() {
        let (keys, _hooks, map) = setup();
        let stale = Rc::new(Cell::new(0));
        let s = Rc::clone(&stale);
        let _sub = map.subscribe_stale(Box::new(move || s.set(s.get() + 1)));
        keys.set_stale(true);
        assert!(map.is_stale());
        assert_eq!(stale.get(), 1);
    }
}
