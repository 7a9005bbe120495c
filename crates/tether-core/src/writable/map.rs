#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use super::WritableCore;
use crate::diff::MapDiff;
use crate::error::ObservableError;
use crate::listener::Subscription;
use crate::observable::{MapRef, Observable, ObservableId, ObservableMap, ValueType};
use crate::realm::Realm;

struct MapInner<K, V> {
    core: WritableCore<MapDiff<K, V>>,
    key_type: Option<ValueType>,
    entries: RefCell<HashMap<K, V>>,
}

/// A mutable observable map.
pub struct WritableMap<K, V> {
    inner: Rc<MapInner<K, V>>,
}

impl<K, V> Clone for WritableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, V> WritableMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::in_realm(&Realm::current(), HashMap::new(), None, None)
    }

    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::in_realm(&Realm::current(), entries.into_iter().collect(), None, None)
    }

    #[must_use]
    pub fn in_realm(
        realm: &Realm,
        entries: HashMap<K, V>,
        key_type: Option<ValueType>,
        value_type: Option<ValueType>,
    ) -> Self {
        Self {
            inner: Rc::new(MapInner {
                core: WritableCore::new(realm.clone(), value_type),
                key_type,
                entries: RefCell::new(entries),
            }),
        }
    }

    pub fn set_stale(&self, stale: bool) {
        self.inner.core.set_stale(stale);
    }

    #[must_use]
    pub fn has_listeners(&self) -> bool {
        self.inner.core.support.has_listeners()
    }

    #[must_use]
    pub fn share(&self) -> MapRef<K, V> {
        Rc::new(self.clone())
    }

    /// Put every entry, firing one combined diff.
    pub fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<(), ObservableError> {
        self.inner.core.check_live()?;
        let mut added = HashMap::new();
        let mut changed = HashMap::new();
        {
            let mut current = self.inner.entries.borrow_mut();
            for (key, value) in entries {
                match current.insert(key.clone(), value.clone()) {
                    None => {
                        added.insert(key, value);
                    }
                    Some(_) if added.contains_key(&key) => {
                        added.insert(key, value);
                    }
                    Some(old) if old != value => {
                        // A key changed twice keeps its first old value.
                        let first_old = match changed.remove(&key) {
                            Some((first_old, _)) => first_old,
                            None => old,
                        };
                        if first_old != value {
                            changed.insert(key, (first_old, value));
                        }
                    }
                    Some(_) => {}
                }
            }
        }
        self.fire(MapDiff::new(added, HashMap::new(), changed));
        Ok(())
    }

    fn fire(&self, diff: MapDiff<K, V>) {
        if !diff.is_empty() {
            self.inner.core.fire_change(&diff);
        }
    }
}

impl<K, V> Default for WritableMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Observable for WritableMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn id(&self) -> ObservableId {
        self.inner.core.id
    }

    fn realm(&self) -> Realm {
        self.inner.core.realm.clone()
    }

    fn is_stale(&self) -> bool {
        self.inner.core.is_stale()
    }

    fn is_disposed(&self) -> bool {
        self.inner.core.is_disposed()
    }

    fn dispose(&self) {
        self.inner.core.dispose();
    }

    fn subscribe_stale(&self, listener: Box<dyn Fn()>) -> Subscription {
        self.inner.core.support.subscribe_stale(listener)
    }

    fn subscribe_dispose(&self, listener: Box<dyn Fn()>) -> Subscription {
        self.inner.core.support.subscribe_dispose(listener)
    }
}

impl<K, V> ObservableMap<K, V> for WritableMap<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn key_type(&self) -> Option<ValueType> {
        self.inner.key_type.clone()
    }

    fn value_type(&self) -> Option<ValueType> {
        self.inner.core.declared.clone()
    }

    fn len(&self) -> usize {
        self.inner.core.getter_called();
        self.inner.entries.borrow().len()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.inner.core.getter_called();
        self.inner.entries.borrow().contains_key(key)
    }

    fn get(&self, key: &K) -> Option<V> {
        self.inner.core.getter_called();
        self.inner.entries.borrow().get(key).cloned()
    }

    fn keys(&self) -> Vec<K> {
        self.inner.core.getter_called();
        self.inner.entries.borrow().keys().cloned().collect()
    }

    fn to_map(&self) -> HashMap<K, V> {
        self.inner.core.getter_called();
        self.inner.entries.borrow().clone()
    }

    fn put(&self, key: K, value: V) -> Result<Option<V>, ObservableError> {
        self.inner.core.check_live()?;
        let old = self
            .inner
            .entries
            .borrow_mut()
            .insert(key.clone(), value.clone());
        if old.as_ref() != Some(&value) {
            self.fire(MapDiff::single_change(key, old.clone(), Some(value)));
        }
        Ok(old)
    }

    fn remove(&self, key: &K) -> Result<Option<V>, ObservableError> {
        self.inner.core.check_live()?;
        let old = self.inner.entries.borrow_mut().remove(key);
        if let Some(old) = &old {
            self.fire(MapDiff::single_change(key.clone(), Some(old.clone()), None));
        }
        Ok(old)
    }

    fn clear(&self) -> Result<(), ObservableError> {
        self.inner.core.check_live()?;
        let old = std::mem::take(&mut *self.inner.entries.borrow_mut());
        self.fire(MapDiff::new(HashMap::new(), old, HashMap::new()));
        Ok(())
    }

    fn subscribe(&self, listener: Box<dyn Fn(&MapDiff<K, V>)>) -> Subscription {
        self.inner.core.support.subscribe(listener)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for WritableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritableMap")
            .field("id", &self.inner.core.id)
            .field("entries", &self.inner.entries.borrow())
            .finish()
    }
}
