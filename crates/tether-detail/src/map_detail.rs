#![forbid(unsafe_code)]

//! A map from each master key to the detail value of the master's value.
//!
//! Keys are exactly the master map's keys. Each key owns its own detail
//! value observable; details are never shared, even between keys whose
//! master values coincide.
//!
//! # Invariants
//!
//! 1. Details are created when their key appears, replaced when the master
//!    value for the key changes, and disposed as soon as the key disappears.
//! 2. Detail listeners are attached at creation, whether or not the map is
//!    observed.
//! 3. Adding or removing keys goes through the master map.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use tether_core::{
    ChangeSupport, IdentitySet, MapDiff, MapRef, Observable, ObservableError, ObservableId,
    ObservableMap, ObservableTracker, Realm, Subscription, ValueDiff, ValueRef, ValueType,
};

use crate::helper;

struct KeyDetail<E> {
    detail: ValueRef<E>,
    subs: Vec<Subscription>,
}

struct Inner<K, M, E> {
    id: ObservableId,
    realm: Realm,
    master: MapRef<K, M>,
    factory: Box<dyn Fn(&M) -> ValueRef<E>>,
    detail_type: Option<ValueType>,
    support: ChangeSupport<MapDiff<K, E>>,
    key_detail_map: RefCell<HashMap<K, KeyDetail<E>>>,
    stale_details: RefCell<IdentitySet<ValueRef<E>>>,
    master_subs: RefCell<Vec<Subscription>>,
    disposed: Cell<bool>,
}

/// Observable map of the detail values of a master map's values.
pub struct MapDetailValueObservableMap<K, M, E> {
    inner: Rc<Inner<K, M, E>>,
}

impl<K, M, E> Clone for MapDetailValueObservableMap<K, M, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// One key of a [`MapDetailValueObservableMap`], reading and writing its
/// value through the key's detail observable.
pub struct DetailMapEntry<K, E> {
    key: K,
    detail: ValueRef<E>,
}

impl<K, E: Clone + PartialEq + 'static> DetailMapEntry<K, E> {
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> E {
        self.detail.get()
    }

    /// Write `value` into the detail, returning the previous value.
    ///
    /// # Errors
    ///
    /// Whatever the detail observable reports, typically
    /// [`ObservableError::Disposed`] once the key has left the master map.
    pub fn set_value(&self, value: E) -> Result<E, ObservableError> {
        let _ignore = ObservableTracker::ignore();
        let old = self.detail.get();
        self.detail.set(value)?;
        Ok(old)
    }
}

impl<K: fmt::Debug, E> fmt::Debug for DetailMapEntry<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetailMapEntry")
            .field("key", &self.key)
            .field("detail", &self.detail.id())
            .finish()
    }
}

impl<K, M, E> MapDetailValueObservableMap<K, M, E>
where
    K: Clone + Eq + Hash + 'static,
    M: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    /// Create the adapter with a detail for every entry currently in
    /// `master`. Nothing is fired.
    ///
    /// # Errors
    ///
    /// [`ObservableError::InvariantViolation`] if `master` is disposed.
    pub fn new<F>(
        master: MapRef<K, M>,
        factory: F,
        detail_type: Option<ValueType>,
    ) -> Result<Self, ObservableError>
    where
        F: Fn(&M) -> ValueRef<E> + 'static,
    {
        helper::check_master_live(master.is_disposed())?;
        let inner = Rc::new(Inner {
            id: ObservableId::next(),
            realm: master.realm(),
            master,
            factory: Box::new(factory),
            detail_type,
            support: ChangeSupport::new(),
            key_detail_map: RefCell::new(HashMap::new()),
            stale_details: RefCell::new(IdentitySet::new()),
            master_subs: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
        });
        let map = Self { inner };
        {
            let _ignore = ObservableTracker::ignore();
            for (key, value) in map.inner.master.to_map() {
                let entry = map.create_detail(&key, &value);
                map.inner.key_detail_map.borrow_mut().insert(key, entry);
            }
        }
        map.attach_master();
        Ok(map)
    }

    #[must_use]
    pub fn master(&self) -> MapRef<K, M> {
        Rc::clone(&self.inner.master)
    }

    /// The entry for `key`, if the master map has it.
    #[must_use]
    pub fn entry(&self, key: &K) -> Option<DetailMapEntry<K, E>> {
        self.getter_called();
        self.detail(key).map(|detail| DetailMapEntry {
            key: key.clone(),
            detail,
        })
    }

    /// Every entry, in no particular order.
    #[must_use]
    pub fn entries(&self) -> Vec<DetailMapEntry<K, E>> {
        self.getter_called();
        self.inner
            .key_detail_map
            .borrow()
            .iter()
            .map(|(key, entry)| DetailMapEntry {
                key: key.clone(),
                detail: Rc::clone(&entry.detail),
            })
            .collect()
    }

    /// The detail observable for `key`.
    #[must_use]
    pub fn detail(&self, key: &K) -> Option<ValueRef<E>> {
        self.inner
            .key_detail_map
            .borrow()
            .get(key)
            .map(|entry| Rc::clone(&entry.detail))
    }

    #[must_use]
    pub fn has_listeners(&self) -> bool {
        self.inner.support.has_listeners()
    }

    #[must_use]
    pub fn share(&self) -> MapRef<K, E> {
        Rc::new(self.clone())
    }

    fn downgrade(&self) -> Weak<Inner<K, M, E>> {
        Rc::downgrade(&self.inner)
    }

    fn from_weak(weak: &Weak<Inner<K, M, E>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn getter_called(&self) {
        ObservableTracker::getter_called(self.inner.id);
    }

    fn attach_master(&self) {
        let weak = self.downgrade();
        let change = self.inner.master.subscribe(Box::new(move |diff: &MapDiff<K, M>| {
            if let Some(map) = Self::from_weak(&weak) {
                let _ignore = ObservableTracker::ignore();
                map.master_changed(diff);
            }
        }));
        let weak = self.downgrade();
        let stale = self.inner.master.subscribe_stale(Box::new(move || {
            if let Some(map) = Self::from_weak(&weak)
                && !map.has_stale_details()
            {
                map.inner.support.fire_stale();
            }
        }));
        let weak = self.downgrade();
        let dispose = self.inner.master.subscribe_dispose(Box::new(move || {
            if let Some(map) = Self::from_weak(&weak) {
                map.dispose();
            }
        }));
        self.inner
            .master_subs
            .borrow_mut()
            .extend([change, stale, dispose]);
    }

    fn create_detail(&self, key: &K, master_value: &M) -> KeyDetail<E> {
        let detail = (self.inner.factory)(master_value);
        #[cfg(feature = "tracing")]
        helper::log_detail("created", self.inner.id, detail.id());
        helper::warn_if_different_realms(&self.inner.realm, &detail.realm());
        if detail.is_stale() {
            self.inner
                .stale_details
                .borrow_mut()
                .insert(Rc::clone(&detail));
        }

        let weak = self.downgrade();
        let listener_key = key.clone();
        let source = Rc::downgrade(&detail);
        let change = detail.subscribe(Box::new(move |diff: &ValueDiff<E>| {
            if let (Some(map), Some(detail)) = (Self::from_weak(&weak), source.upgrade()) {
                map.inner.stale_details.borrow_mut().remove(&detail);
                map.inner.support.fire_change(&MapDiff::single_change(
                    listener_key.clone(),
                    Some(diff.old_value().clone()),
                    Some(diff.new_value().clone()),
                ));
            }
        }));
        let weak = self.downgrade();
        let source = Rc::downgrade(&detail);
        let stale = detail.subscribe_stale(Box::new(move || {
            if let (Some(map), Some(detail)) = (Self::from_weak(&weak), source.upgrade()) {
                map.detail_stale(detail);
            }
        }));
        KeyDetail {
            detail,
            subs: vec![change, stale],
        }
    }

    fn retire(&self, entry: KeyDetail<E>) {
        let KeyDetail { detail, subs } = entry;
        drop(subs);
        self.inner.stale_details.borrow_mut().remove(&detail);
        detail.dispose();
        #[cfg(feature = "tracing")]
        helper::log_detail("disposed", self.inner.id, detail.id());
    }

    fn master_changed(&self, diff: &MapDiff<K, M>) {
        if self.inner.disposed.get() {
            return;
        }
        let mut added = HashMap::new();
        let mut removed = HashMap::new();
        let mut changed = HashMap::new();

        for (key, value) in diff.added() {
            let entry = self.create_detail(key, value);
            added.insert(key.clone(), entry.detail.get());
            let replaced = self.inner.key_detail_map.borrow_mut().insert(key.clone(), entry);
            if let Some(replaced) = replaced {
                self.retire(replaced);
            }
        }
        for key in diff.removed().keys() {
            let entry = self.inner.key_detail_map.borrow_mut().remove(key);
            if let Some(entry) = entry {
                removed.insert(key.clone(), entry.detail.get());
                self.retire(entry);
            }
        }
        for (key, (_, new_value)) in diff.changed() {
            let entry = self.create_detail(key, new_value);
            let new = entry.detail.get();
            let old_entry = self.inner.key_detail_map.borrow_mut().insert(key.clone(), entry);
            if let Some(old_entry) = old_entry {
                changed.insert(key.clone(), (old_entry.detail.get(), new));
                self.retire(old_entry);
            } else {
                added.insert(key.clone(), new);
            }
        }

        let diff = MapDiff::new(added, removed, changed);
        if !diff.is_empty() {
            self.inner.support.fire_change(&diff);
        }
    }

    /// Drop details that went fresh without a value change, then report
    /// whether any stale detail remains.
    fn has_stale_details(&self) -> bool {
        let _ignore = ObservableTracker::ignore();
        let mut stale = self.inner.stale_details.borrow_mut();
        let fresh: Vec<ValueRef<E>> = stale.iter().filter(|d| !d.is_stale()).cloned().collect();
        for detail in &fresh {
            stale.remove(detail);
        }
        !stale.is_empty()
    }

    fn detail_stale(&self, detail: ValueRef<E>) {
        let was_stale = {
            let _ignore = ObservableTracker::ignore();
            self.inner.master.is_stale()
        } || self.has_stale_details();
        self.inner.stale_details.borrow_mut().insert(detail);
        if !was_stale {
            self.inner.support.fire_stale();
        }
    }
}

impl<K, M, E> Observable for MapDetailValueObservableMap<K, M, E>
where
    K: Clone + Eq + Hash + 'static,
    M: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    fn id(&self) -> ObservableId {
        self.inner.id
    }

    fn realm(&self) -> Realm {
        self.inner.realm.clone()
    }

    fn is_stale(&self) -> bool {
        self.getter_called();
        let _ignore = ObservableTracker::ignore();
        self.inner.master.is_stale()
            || self
                .inner
                .key_detail_map
                .borrow()
                .values()
                .any(|entry| entry.detail.is_stale())
    }

    fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let master_subs = std::mem::take(&mut *self.inner.master_subs.borrow_mut());
        drop(master_subs);
        let entries: Vec<KeyDetail<E>> = self
            .inner
            .key_detail_map
            .borrow_mut()
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in entries {
            self.retire(entry);
        }
        self.inner.stale_details.borrow_mut().clear();
        #[cfg(feature = "tracing")]
        helper::log_disposed("MapDetailValueObservableMap", self.inner.id);
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

impl<K, M, E> ObservableMap<K, E> for MapDetailValueObservableMap<K, M, E>
where
    K: Clone + Eq + Hash + 'static,
    M: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    fn key_type(&self) -> Option<ValueType> {
        self.inner.master.key_type()
    }

    fn value_type(&self) -> Option<ValueType> {
        self.inner.detail_type.clone()
    }

    fn len(&self) -> usize {
        self.getter_called();
        let _ignore = ObservableTracker::ignore();
        self.inner.master.len()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.getter_called();
        let _ignore = ObservableTracker::ignore();
        self.inner.master.contains_key(key)
    }

    fn get(&self, key: &K) -> Option<E> {
        self.getter_called();
        let detail = self.detail(key)?;
        let _ignore = ObservableTracker::ignore();
        Some(detail.get())
    }

    fn keys(&self) -> Vec<K> {
        self.getter_called();
        let _ignore = ObservableTracker::ignore();
        self.inner.master.keys()
    }

    fn to_map(&self) -> HashMap<K, E> {
        self.getter_called();
        let details: Vec<(K, ValueRef<E>)> = self
            .inner
            .key_detail_map
            .borrow()
            .iter()
            .map(|(key, entry)| (key.clone(), Rc::clone(&entry.detail)))
            .collect();
        let _ignore = ObservableTracker::ignore();
        details
            .into_iter()
            .map(|(key, detail)| (key, detail.get()))
            .collect()
    }

    /// Write through the detail of an existing key. New keys must be added
    /// to the master map.
    fn put(&self, key: K, value: E) -> Result<Option<E>, ObservableError> {
        let Some(detail) = self.detail(&key) else {
            return Err(ObservableError::Unsupported(
                "put of a key absent from the master map",
            ));
        };
        let _ignore = ObservableTracker::ignore();
        let old = detail.get();
        detail.set(value)?;
        Ok(Some(old))
    }

    /// Remove `key` from the master map, returning its last detail value.
    fn remove(&self, key: &K) -> Result<Option<E>, ObservableError> {
        let old = {
            let _ignore = ObservableTracker::ignore();
            self.detail(key).map(|detail| detail.get())
        };
        self.inner.master.remove(key)?;
        Ok(old)
    }

    fn clear(&self) -> Result<(), ObservableError> {
        self.inner.master.clear()
    }

    fn subscribe(&self, listener: Box<dyn Fn(&MapDiff<K, E>)>) -> Subscription {
        self.inner.support.subscribe(listener)
    }
}

impl<K, M, E> fmt::Debug for MapDetailValueObservableMap<K, M, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapDetailValueObservableMap")
            .field("id", &self.inner.id)
            .field("disposed", &self.inner.disposed.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Person, recorder};
    use std::cell::Cell;
    use tether_core::{ObservableValue, WritableMap};

    type Roster = WritableMap<u32, Rc<Person>>;

    fn names_of(master: &Roster) -> MapDetailValueObservableMap<u32, Rc<Person>, String> {
        MapDetailValueObservableMap::new(
            master.share(),
            |p: &Rc<Person>| p.name.share(),
            Some(ValueType::of::<String>()),
        )
        .expect("live master")
    }

    #[test]
    fn mirrors_master_keys_with_detail_values() {
        let master = WritableMap::from_entries([(1, Person::new("a", &[])), (2, Person::new("b", &[]))]);
        let names = names_of(&master);
        assert_eq!(names.len(), 2);
        assert_eq!(names.get(&1).as_deref(), Some("a"));
        assert_eq!(
            names.to_map(),
            HashMap::from([(1, "a".to_owned()), (2, "b".to_owned())])
        );
    }

    #[test]
    fn master_diff_adds_replaces_and_disposes_details() {
        let (a, b, c) = (Person::new("a", &[]), Person::new("b", &[]), Person::new("c", &[]));
        let master = WritableMap::from_entries([(1, Rc::clone(&a)), (2, Rc::clone(&b))]);
        let names = names_of(&master);
        let (log, listener) = recorder::<MapDiff<u32, String>>();
        let _sub = names.subscribe(listener);

        master.put(3, Rc::clone(&c)).expect("add");
        master.remove(&2).expect("remove");
        master.put(1, Rc::clone(&c)).expect("change");

        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].added().get(&3).map(String::as_str), Some("c"));
        assert_eq!(log[1].removed().get(&2).map(String::as_str), Some("b"));
        assert_eq!(log[2].changed().get(&1), Some(&("a".to_owned(), "c".to_owned())));
        assert!(b.name.is_disposed(), "removed key disposes eagerly");
        assert!(a.name.is_disposed(), "changed key replaces its detail");
    }

    #[test]
    fn detail_change_fires_single_key_diff_without_observers_first() {
        let a = Person::new("a", &[]);
        let master = WritableMap::from_entries([(7, Rc::clone(&a))]);
        let names = names_of(&master);
        assert!(a.name.has_listeners(), "hooked eagerly");

        let (log, listener) = recorder::<MapDiff<u32, String>>();
        let _sub = names.subscribe(listener);
        a.name.set("z".into()).expect("rename");
        assert_eq!(
            *log.borrow(),
            vec![MapDiff::single_change(7, Some("a".to_owned()), Some("z".to_owned()))]
        );
    }

    #[test]
    fn put_routes_through_detail_and_rejects_new_keys() {
        let a = Person::new("a", &[]);
        let master = WritableMap::from_entries([(1, Rc::clone(&a))]);
        let names = names_of(&master);

        assert_eq!(names.put(1, "x".into()), Ok(Some("a".to_owned())));
        assert_eq!(a.name.get(), "x");
        assert!(matches!(names.put(9, "y".into()), Err(ObservableError::Unsupported(_))));
        assert!(!master.contains_key(&9));
    }

    #[test]
    fn entries_read_and_write_through_details() {
        let a = Person::new("a", &[]);
        let master = WritableMap::from_entries([(1, Rc::clone(&a))]);
        let names = names_of(&master);
        let entries = names.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(*entries[0].key(), 1);
        assert_eq!(entries[0].value(), "a");
        assert_eq!(entries[0].set_value("q".into()), Ok("a".to_owned()));
        assert_eq!(names.get(&1).as_deref(), Some("q"));
        assert!(names.entry(&2).is_none());
    }

    #[test]
    fn remove_and_clear_go_to_the_master() {
        let master = WritableMap::from_entries([(1, Person::new("a", &[])), (2, Person::new("b", &[]))]);
        let names = names_of(&master);
        assert_eq!(names.remove(&1), Ok(Some("a".to_owned())));
        assert!(!master.contains_key(&1));
        names.clear().expect("clear");
        assert!(master.is_empty());
        assert!(names.is_empty());
    }

    #[test]
    fn staleness_and_dispose() {
        let a = Person::new("a", &[]);
        let master = WritableMap::from_entries([(1, Rc::clone(&a))]);
        let names = names_of(&master);
        let stale_events = Rc::new(Cell::new(0));
        let s = Rc::clone(&stale_events);
        let _sub = names.subscribe_stale(Box::new(move || s.set(s.get() + 1)));

        a.name.set_stale(true);
        assert!(names.is_stale());
        master.set_stale(true);
        assert_eq!(stale_events.get(), 1);
        a.name.set_stale(false);
        assert!(names.is_stale());
        master.set_stale(false);
        assert!(!names.is_stale());

        names.dispose();
        assert!(a.name.is_disposed());
        assert!(!master.is_disposed());
        assert!(!master.has_listeners());
    }
}
