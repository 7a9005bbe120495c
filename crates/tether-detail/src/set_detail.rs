#![forbid(unsafe_code)]

//! A map from each element of a master set to that element's detail value.
//!
//! Built on [`ComputedObservableMap`]: the master set is the key set, and
//! a private hooks type supplies the per-key behaviour. Details are created
//! lazily, the first time a key is read, written or hooked, and released
//! when the key is unhooked (on leaving the set while observed, or when the
//! last listener goes away) or when the map is disposed.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use tether_core::{
    ComputedMapHooks, ComputedObservableMap, MapDiff, Observable, ObservableError,
    ObservableId, ObservableMap, ObservableTracker, Realm, SetRef, Subscription, ValueDiff,
    ValueRef, ValueType,
};

use crate::helper;

struct KeyDetail<E> {
    detail: ValueRef<E>,
    subs: Vec<Subscription>,
}

/// Per-key detail bookkeeping for a [`SetDetailValueObservableMap`].
struct DetailHooks<M, E> {
    realm: Realm,
    factory: Box<dyn Fn(&M) -> ValueRef<E>>,
    details: RefCell<HashMap<M, KeyDetail<E>>>,
    disposed: Cell<bool>,
}

impl<M, E> DetailHooks<M, E>
where
    M: Clone + Eq + Hash + 'static,
    E: Clone + PartialEq + 'static,
{
    /// The detail for `key`, created on first use.
    fn detail_for(&self, key: &M) -> ValueRef<E> {
        if let Some(entry) = self.details.borrow().get(key) {
            return Rc::clone(&entry.detail);
        }
        let detail = {
            let _ignore = ObservableTracker::ignore();
            (self.factory)(key)
        };
        helper::warn_if_different_realms(&self.realm, &detail.realm());
        self.details.borrow_mut().insert(
            key.clone(),
            KeyDetail {
                detail: Rc::clone(&detail),
                subs: Vec::new(),
            },
        );
        detail
    }
}

impl<M, E> ComputedMapHooks<M, E> for DetailHooks<M, E>
where
    M: Clone + Eq + Hash + 'static,
    E: Clone + PartialEq + 'static,
{
    fn hook_key(&self, map: &ComputedObservableMap<M, E>, key: &M) {
        let detail = self.detail_for(key);

        let weak = map.downgrade();
        let listener_key = key.clone();
        let change = detail.subscribe(Box::new(move |diff: &ValueDiff<E>| {
            if let Some(map) = weak.upgrade() {
                map.fire_single_change(
                    listener_key.clone(),
                    Some(diff.old_value().clone()),
                    Some(diff.new_value().clone()),
                );
            }
        }));
        let weak = map.downgrade();
        let stale = detail.subscribe_stale(Box::new(move || {
            if let Some(map) = weak.upgrade() {
                // Key set staleness already reported.
                let key_set_stale = {
                    let _ignore = ObservableTracker::ignore();
                    map.key_set().is_stale()
                };
                if !key_set_stale {
                    map.fire_stale();
                }
            }
        }));

        if let Some(entry) = self.details.borrow_mut().get_mut(key) {
            entry.subs = vec![change, stale];
        }
    }

    fn unhook_key(&self, _map: &ComputedObservableMap<M, E>, key: &M) {
        if self.disposed.get() {
            return;
        }
        let entry = self.details.borrow_mut().remove(key);
        if let Some(KeyDetail { detail, subs }) = entry {
            drop(subs);
            detail.dispose();
        }
    }

    fn compute(&self, key: &M) -> E {
        let detail = self.detail_for(key);
        let _ignore = ObservableTracker::ignore();
        detail.get()
    }

    fn store(&self, key: &M, value: E) -> Result<Option<E>, ObservableError> {
        let detail = self.detail_for(key);
        let _ignore = ObservableTracker::ignore();
        let old = detail.get();
        detail.set(value)?;
        Ok(Some(old))
    }

    /// Removing a key removes the element from the master set.
    fn remove(&self, map: &ComputedObservableMap<M, E>, key: &M) -> Result<Option<E>, ObservableError> {
        let key_set = map.key_set();
        let old = {
            let _ignore = ObservableTracker::ignore();
            key_set.contains(key).then(|| self.compute(key))
        };
        key_set.remove(key)?;
        Ok(old)
    }

    /// Any hooked detail is stale. Details created by a read while the map
    /// was unobserved are not hooked and do not count.
    fn is_stale(&self) -> bool {
        let details: Vec<ValueRef<E>> = self
            .details
            .borrow()
            .values()
            .filter(|entry| !entry.subs.is_empty())
            .map(|entry| Rc::clone(&entry.detail))
            .collect();
        let _ignore = ObservableTracker::ignore();
        details.iter().any(|detail| detail.is_stale())
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let entries: Vec<KeyDetail<E>> = self
            .details
            .borrow_mut()
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for KeyDetail { detail, subs } in entries {
            drop(subs);
            detail.dispose();
        }
    }
}

/// Observable map from the elements of a master set to their detail values.
pub struct SetDetailValueObservableMap<M, E> {
    map: ComputedObservableMap<M, E>,
    hooks: Rc<DetailHooks<M, E>>,
}

impl<M, E> Clone for SetDetailValueObservableMap<M, E> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            hooks: Rc::clone(&self.hooks),
        }
    }
}

impl<M, E> SetDetailValueObservableMap<M, E>
where
    M: Clone + Eq + Hash + 'static,
    E: Clone + PartialEq + 'static,
{
    /// Create the adapter over `master`. No detail exists until a key is
    /// read or the map gains a listener.
    ///
    /// # Errors
    ///
    /// [`ObservableError::InvariantViolation`] if `master` is disposed.
    pub fn new<F>(
        master: SetRef<M>,
        factory: F,
        detail_type: Option<ValueType>,
    ) -> Result<Self, ObservableError>
    where
        F: Fn(&M) -> ValueRef<E> + 'static,
    {
        helper::check_master_live(master.is_disposed())?;
        let hooks = Rc::new(DetailHooks {
            realm: master.realm(),
            factory: Box::new(factory),
            details: RefCell::new(HashMap::new()),
            disposed: Cell::new(false),
        });
        let key_type = master.element_type();
        let map = ComputedObservableMap::new(
            master,
            key_type,
            detail_type,
            Rc::clone(&hooks) as Rc<dyn ComputedMapHooks<M, E>>,
        );
        Ok(Self { map, hooks })
    }

    #[must_use]
    pub fn master(&self) -> SetRef<M> {
        self.map.key_set()
    }

    /// Number of details currently alive.
    #[must_use]
    pub fn detail_count(&self) -> usize {
        self.hooks.details.borrow().len()
    }

    #[must_use]
    pub fn has_listeners(&self) -> bool {
        self.map.has_listeners()
    }

    #[must_use]
    pub fn share(&self) -> tether_core::MapRef<M, E> {
        Rc::new(self.clone())
    }
}

impl<M, E> Observable for SetDetailValueObservableMap<M, E>
where
    M: Clone + Eq + Hash + 'static,
    E: Clone + PartialEq + 'static,
{
    fn id(&self) -> ObservableId {
        self.map.id()
    }

    fn realm(&self) -> Realm {
        self.map.realm()
    }

    fn is_stale(&self) -> bool {
        self.map.is_stale()
    }

    fn is_disposed(&self) -> bool {
        self.map.is_disposed()
    }

    fn dispose(&self) {
        #[cfg(feature = "tracing")]
        {
            if !self.map.is_disposed() {
                helper::log_disposed("SetDetailValueObservableMap", self.map.id());
            }
        }
        self.map.dispose();
    }

    fn subscribe_stale(&self, listener: Box<dyn Fn()>) -> Subscription {
        self.map.subscribe_stale(listener)
    }

    fn subscribe_dispose(&self, listener: Box<dyn Fn()>) -> Subscription {
        self.map.subscribe_dispose(listener)
    }
}

impl<M, E> ObservableMap<M, E> for SetDetailValueObservableMap<M, E>
where
    M: Clone + Eq + Hash + 'static,
    E: Clone + PartialEq + 'static,
{
    fn key_type(&self) -> Option<ValueType> {
        self.map.key_type()
    }

    fn value_type(&self) -> Option<ValueType> {
        self.map.value_type()
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn contains_key(&self, key: &M) -> bool {
        self.map.contains_key(key)
    }

    fn get(&self, key: &M) -> Option<E> {
        self.map.get(key)
    }

    fn keys(&self) -> Vec<M> {
        self.map.keys()
    }

    fn to_map(&self) -> HashMap<M, E> {
        self.map.to_map()
    }

    fn put(&self, key: M, value: E) -> Result<Option<E>, ObservableError> {
        self.map.put(key, value)
    }

    fn remove(&self, key: &M) -> Result<Option<E>, ObservableError> {
        self.map.remove(key)
    }

    fn clear(&self) -> Result<(), ObservableError> {
        self.map.clear()
    }

    fn subscribe(&self, listener: Box<dyn Fn(&MapDiff<M, E>)>) -> Subscription {
        self.map.subscribe(listener)
    }
}

impl<M, E> fmt::Debug for SetDetailValueObservableMap<M, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetDetailValueObservableMap")
            .field("map", &self.map)
            .field("details", &self.hooks.details.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::recorder;
    use std::cell::Cell;
    use tether_core::{ObservableSet, ObservableValue, WritableSet, WritableValue};

    /// Detail values keyed by name, shared with the test body.
    fn scores() -> Rc<RefCell<HashMap<&'static str, WritableValue<u32>>>> {
        Rc::new(RefCell::new(HashMap::new()))
    }

    fn adapter(
        master: &WritableSet<&'static str>,
        store: &Rc<RefCell<HashMap<&'static str, WritableValue<u32>>>>,
    ) -> SetDetailValueObservableMap<&'static str, u32> {
        let store = Rc::clone(store);
        SetDetailValueObservableMap::new(
            master.share(),
            move |name: &&'static str| {
                let value = WritableValue::new(u32::try_from(name.len()).unwrap_or(u32::MAX));
                store.borrow_mut().insert(*name, value.clone());
                value.share()
            },
            None,
        )
        .expect("live master")
    }

    #[test]
    fn details_are_created_lazily() {
        let master = WritableSet::from_elements(["ann", "bo"]);
        let store = scores();
        let map = adapter(&master, &store);
        assert_eq!(map.detail_count(), 0);
        assert_eq!(map.get(&"ann"), Some(3));
        assert_eq!(map.detail_count(), 1);
        assert_eq!(map.get(&"zed"), None, "not a member");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn key_set_changes_fire_map_diffs_while_observed() {
        let master = WritableSet::from_elements(["ann"]);
        let store = scores();
        let map = adapter(&master, &store);
        let (log, listener) = recorder::<MapDiff<&'static str, u32>>();
        let _sub = map.subscribe(listener);

        master.add("cyril").expect("add");
        master.remove(&"ann").expect("remove");
        let log = log.borrow();
        assert_eq!(log[0], MapDiff::single_change("cyril", None, Some(5)));
        assert_eq!(log[1], MapDiff::single_change("ann", Some(3), None));
        assert!(store.borrow()["ann"].is_disposed(), "unhooked detail disposed");
    }

    #[test]
    fn detail_change_fires_single_key_diff() {
        let master = WritableSet::from_elements(["ann"]);
        let store = scores();
        let map = adapter(&master, &store);
        let (log, listener) = recorder::<MapDiff<&'static str, u32>>();
        let _sub = map.subscribe(listener);

        store.borrow()["ann"].set(10).expect("set");
        assert_eq!(
            *log.borrow(),
            vec![MapDiff::single_change("ann", Some(3), Some(10))]
        );
        assert_eq!(map.put("ann", 11), Ok(Some(10)));
        assert_eq!(map.put("zed", 1), Ok(None), "non-member put is ignored");
    }

    #[test]
    fn remove_goes_to_the_master_set() {
        let master = WritableSet::from_elements(["ann", "bo"]);
        let store = scores();
        let map = adapter(&master, &store);
        assert_eq!(map.remove(&"bo"), Ok(Some(2)));
        assert!(!master.contains(&"bo"));
        assert_eq!(map.remove(&"bo"), Ok(None));
        assert!(matches!(map.clear(), Err(ObservableError::Unsupported(_))));
    }

    #[test]
    fn stale_if_key_set_or_detail_stale() {
        let master = WritableSet::from_elements(["ann"]);
        let store = scores();
        let map = adapter(&master, &store);
        let stale_events = Rc::new(Cell::new(0));
        let s = Rc::clone(&stale_events);
        let _sub = map.subscribe_stale(Box::new(move || s.set(s.get() + 1)));

        store.borrow()["ann"].set_stale(true);
        assert!(map.is_stale());
        assert_eq!(stale_events.get(), 1);
        store.borrow()["ann"].set_stale(false);
        assert!(!map.is_stale());
        master.set_stale(true);
        assert!(map.is_stale());
    }

    #[test]
    fn lingering_detail_of_a_departed_key_is_not_staleness() {
        let master = WritableSet::from_elements(["ann"]);
        let store = scores();
        let map = adapter(&master, &store);
        assert_eq!(map.get(&"ann"), Some(3));
        master.remove(&"ann").expect("remove");
        assert_eq!(map.detail_count(), 1, "unobserved details linger");

        store.borrow()["ann"].set_stale(true);
        assert!(map.keys().is_empty());
        assert!(!map.is_stale());
    }

    #[test]
    fn dispose_releases_every_detail() {
        let master = WritableSet::from_elements(["ann", "bo"]);
        let store = scores();
        let map = adapter(&master, &store);
        let _ = map.get(&"ann");
        let _ = map.get(&"bo");

        map.dispose();
        map.dispose();
        assert!(store.borrow().values().all(Observable::is_disposed));
        assert!(!master.is_disposed());
        assert!(!master.has_listeners());
    }
}
