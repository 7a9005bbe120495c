#![forbid(unsafe_code)]

//! A map derived from the current value of a master observable.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use tether_core::{
    MapDiff, MapRef, Observable, ObservableError, ObservableId, ObservableMap, Realm,
    Subscription, ValueRef, ValueType,
};

use crate::single::SingleMaster;

/// Observable map tracking the detail map of a master value.
///
/// The value type is fixed at construction and checked on every replacement.
/// The key type is reported as given. Without an inner map the adapter is
/// empty and `put`, `remove` and `clear` change nothing.
pub struct DetailObservableMap<M, K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    core: Rc<SingleMaster<M, MapRef<K, V>>>,
    key_type: Option<ValueType>,
}

impl<M, K, V> Clone for DetailObservableMap<M, K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
            key_type: self.key_type.clone(),
        }
    }
}

impl<M, K, V> DetailObservableMap<M, K, V>
where
    M: Clone + PartialEq + 'static,
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    /// Create the adapter and its initial detail map.
    ///
    /// # Errors
    ///
    /// [`ObservableError::InvariantViolation`] if `master` is disposed or the
    /// initial detail does not declare `value_type`.
    pub fn new<F>(
        master: ValueRef<Option<M>>,
        factory: F,
        key_type: Option<ValueType>,
        value_type: Option<ValueType>,
    ) -> Result<Self, ObservableError>
    where
        F: Fn(&M) -> MapRef<K, V> + 'static,
    {
        let core = SingleMaster::<M, MapRef<K, V>>::create(master, Box::new(factory), value_type)?;
        Ok(Self { core, key_type })
    }

    #[must_use]
    pub fn observed(&self) -> Option<MapRef<K, V>> {
        self.core.detail()
    }

    #[must_use]
    pub fn master(&self) -> ValueRef<Option<M>> {
        Rc::clone(&self.core.master)
    }

    #[must_use]
    pub fn has_listeners(&self) -> bool {
        self.core.support.has_listeners()
    }

    #[must_use]
    pub fn share(&self) -> MapRef<K, V> {
        Rc::new(self.clone())
    }
}

impl<M, K, V> Observable for DetailObservableMap<M, K, V>
where
    M: Clone + PartialEq + 'static,
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn id(&self) -> ObservableId {
        self.core.id
    }

    fn realm(&self) -> Realm {
        self.core.realm.clone()
    }

    fn is_stale(&self) -> bool {
        self.core.is_stale()
    }

    fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    fn dispose(&self) {
        self.core.dispose();
    }

    fn subscribe_stale(&self, listener: Box<dyn Fn()>) -> Subscription {
        self.core.support.subscribe_stale(listener)
    }

    fn subscribe_dispose(&self, listener: Box<dyn Fn()>) -> Subscription {
        self.core.support.subscribe_dispose(listener)
    }
}

impl<M, K, V> ObservableMap<K, V> for DetailObservableMap<M, K, V>
where
    M: Clone + PartialEq + 'static,
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn key_type(&self) -> Option<ValueType> {
        self.key_type.clone()
    }

    fn value_type(&self) -> Option<ValueType> {
        self.core.detail_type.clone()
    }

    fn len(&self) -> usize {
        self.core.read(|| 0, |map| map.len())
    }

    fn contains_key(&self, key: &K) -> bool {
        self.core.read(|| false, |map| map.contains_key(key))
    }

    fn get(&self, key: &K) -> Option<V> {
        self.core.read(|| None, |map| map.get(key))
    }

    fn keys(&self) -> Vec<K> {
        self.core.read(Vec::new, |map| map.keys())
    }

    fn to_map(&self) -> HashMap<K, V> {
        self.core.read(HashMap::new, |map| map.to_map())
    }

    fn put(&self, key: K, value: V) -> Result<Option<V>, ObservableError> {
        self.core.delegate(|| Ok(None), |map| map.put(key, value))
    }

    fn remove(&self, key: &K) -> Result<Option<V>, ObservableError> {
        self.core.delegate(|| Ok(None), |map| map.remove(key))
    }

    fn clear(&self) -> Result<(), ObservableError> {
        self.core.delegate(|| Ok(()), |map| map.clear())
    }

    fn subscribe(&self, listener: Box<dyn Fn(&MapDiff<K, V>)>) -> Subscription {
        self.core.support.subscribe(listener)
    }
}

impl<M, K, V> fmt::Debug for DetailObservableMap<M, K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetailObservableMap")
            .field("id", &self.core.id)
            .field("realm", &self.core.realm)
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::recorder;
    use tether_core::{ObservableValue, WritableMap, WritableValue};

    type Scores = WritableMap<&'static str, u32>;

    fn scores_of(master: &WritableValue<Option<u8>>, boards: &[Scores; 2]) -> DetailObservableMap<u8, &'static str, u32> {
        let boards = boards.clone();
        DetailObservableMap::new(
            master.share(),
            move |which: &u8| boards[usize::from(*which)].share(),
            Some(ValueType::of::<&str>()),
            None,
        )
        .expect("live master")
    }

    #[test]
    fn master_change_fires_synthesized_map_diff() {
        let boards = [
            WritableMap::from_entries([("ann", 1), ("bo", 2)]),
            WritableMap::from_entries([("bo", 5), ("cy", 3)]),
        ];
        let master = WritableValue::new(Some(0));
        let scores = scores_of(&master, &boards);
        let (log, listener) = recorder::<MapDiff<&'static str, u32>>();
        let _sub = scores.subscribe(listener);

        master.set(Some(1)).expect("set");
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].removed_keys(), ["ann"].into_iter().collect());
        assert_eq!(log[0].added_keys(), ["cy"].into_iter().collect());
        assert_eq!(log[0].changed().get("bo"), Some(&(2, 5)));
        assert!(boards[0].is_disposed());
        assert_eq!(scores.key_type(), Some(ValueType::of::<&str>()));
    }

    #[test]
    fn absent_master_reads_empty_and_ignores_writes() {
        let boards = [WritableMap::new(), WritableMap::new()];
        let master = WritableValue::new(None);
        let scores = scores_of(&master, &boards);
        assert!(scores.is_empty());
        assert_eq!(scores.put("ann", 1), Ok(None));
        assert_eq!(scores.remove(&"ann"), Ok(None));
        assert_eq!(scores.clear(), Ok(()));
        assert_eq!(scores.get(&"ann"), None);
    }

    #[test]
    fn put_writes_through_and_passes_inner_diff() {
        let boards = [WritableMap::new(), WritableMap::from_entries([("ann", 1)])];
        let master = WritableValue::new(Some(1));
        let scores = scores_of(&master, &boards);
        let (log, listener) = recorder::<MapDiff<&'static str, u32>>();
        let _sub = scores.subscribe(listener);

        assert_eq!(scores.put("ann", 4), Ok(Some(1)));
        assert_eq!(boards[1].get(&"ann"), Some(4));
        assert_eq!(
            *log.borrow(),
            vec![MapDiff::single_change("ann", Some(1), Some(4))]
        );
    }
}
