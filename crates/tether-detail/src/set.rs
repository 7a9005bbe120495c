#![forbid(unsafe_code)]

//! A set derived from the current value of a master observable.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use tether_core::{
    Observable, ObservableError, ObservableId, ObservableSet, Realm, SetDiff, SetRef,
    Subscription, ValueRef, ValueType,
};

use crate::single::SingleMaster;

/// Observable set tracking the detail set of a master value.
///
/// Reads as the empty set while the master value is absent; mutators then
/// report that nothing changed.
pub struct DetailObservableSet<M, E: Clone + Eq + Hash + 'static> {
    core: Rc<SingleMaster<M, SetRef<E>>>,
}

impl<M, E: Clone + Eq + Hash + 'static> Clone for DetailObservableSet<M, E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<M, E> DetailObservableSet<M, E>
where
    M: Clone + PartialEq + 'static,
    E: Clone + Eq + Hash + 'static,
{
    /// Create the adapter and its initial detail set.
    ///
    /// # Errors
    ///
    /// [`ObservableError::InvariantViolation`] if `master` is disposed or the
    /// initial detail does not declare `element_type`.
    pub fn new<F>(
        master: ValueRef<Option<M>>,
        factory: F,
        element_type: Option<ValueType>,
    ) -> Result<Self, ObservableError>
    where
        F: Fn(&M) -> SetRef<E> + 'static,
    {
        let core = SingleMaster::<M, SetRef<E>>::create(master, Box::new(factory), element_type)?;
        Ok(Self { core })
    }

    #[must_use]
    pub fn observed(&self) -> Option<SetRef<E>> {
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
    pub fn share(&self) -> SetRef<E> {
        Rc::new(self.clone())
    }
}

impl<M, E> Observable for DetailObservableSet<M, E>
where
    M: Clone + PartialEq + 'static,
    E: Clone + Eq + Hash + 'static,
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

impl<M, E> ObservableSet<E> for DetailObservableSet<M, E>
where
    M: Clone + PartialEq + 'static,
    E: Clone + Eq + Hash + 'static,
{
    fn element_type(&self) -> Option<ValueType> {
        self.core.detail_type.clone()
    }

    fn len(&self) -> usize {
        self.core.read(|| 0, |set| set.len())
    }

    fn contains(&self, element: &E) -> bool {
        self.core.read(|| false, |set| set.contains(element))
    }

    fn to_set(&self) -> HashSet<E> {
        self.core.read(HashSet::new, |set| set.to_set())
    }

    fn add(&self, element: E) -> Result<bool, ObservableError> {
        self.core.delegate(|| Ok(false), |set| set.add(element))
    }

    fn remove(&self, element: &E) -> Result<bool, ObservableError> {
        self.core.delegate(|| Ok(false), |set| set.remove(element))
    }

    fn clear(&self) -> Result<(), ObservableError> {
        self.core.delegate(|| Ok(()), |set| set.clear())
    }

    fn subscribe(&self, listener: Box<dyn Fn(&SetDiff<E>)>) -> Subscription {
        self.core.support.subscribe(listener)
    }
}

impl<M, E: Clone + Eq + Hash + 'static> fmt::Debug for DetailObservableSet<M, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetailObservableSet")
            .field("id", &self.core.id)
            .field("realm", &self.core.realm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::recorder;
    use tether_core::{ObservableValue, WritableSet, WritableValue};

    /// Master values select one of two fixed tag sets.
    fn tags_adapter(
        master: &WritableValue<Option<u8>>,
        sets: &[WritableSet<&'static str>; 2],
    ) -> DetailObservableSet<u8, &'static str> {
        let sets = sets.clone();
        DetailObservableSet::new(
            master.share(),
            move |which: &u8| sets[usize::from(*which)].share(),
            None,
        )
        .expect("live master")
    }

    #[test]
    fn master_change_fires_synthesized_set_diff() {
        let sets = [
            WritableSet::from_elements(["a", "b"]),
            WritableSet::from_elements(["b", "c"]),
        ];
        let master = WritableValue::new(Some(0));
        let tags = tags_adapter(&master, &sets);
        assert_eq!(tags.to_set(), HashSet::from(["a", "b"]));

        let (log, listener) = recorder::<SetDiff<&'static str>>();
        let _sub = tags.subscribe(listener);
        master.set(Some(1)).expect("set");

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].additions(), &HashSet::from(["c"]));
        assert_eq!(log[0].removals(), &HashSet::from(["a"]));
        assert!(sets[0].is_disposed());
    }

    #[test]
    fn absent_master_is_empty_and_mutators_do_nothing() {
        let sets = [WritableSet::new(), WritableSet::new()];
        let master = WritableValue::new(None);
        let tags = tags_adapter(&master, &sets);
        assert!(tags.is_empty());
        assert_eq!(tags.add("x"), Ok(false));
        assert_eq!(tags.remove(&"x"), Ok(false));
        assert_eq!(tags.clear(), Ok(()));
    }

    #[test]
    fn writes_go_to_the_inner_set() {
        let sets = [WritableSet::new(), WritableSet::new()];
        let master = WritableValue::new(Some(1));
        let tags = tags_adapter(&master, &sets);
        let (log, listener) = recorder::<SetDiff<&'static str>>();
        let _sub = tags.subscribe(listener);

        assert_eq!(tags.add("x"), Ok(true));
        assert!(sets[1].contains(&"x"));
        assert_eq!(log.borrow().len(), 1, "inner change passed through");
    }
}
