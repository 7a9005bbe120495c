#![forbid(unsafe_code)]

//! A list derived from the current value of a master observable.

use std::fmt;
use std::rc::Rc;

use tether_core::{
    ListDiff, ListRef, Observable, ObservableError, ObservableId, ObservableList, Realm,
    Subscription, ValueRef, ValueType, generic_move,
};

use crate::single::SingleMaster;

/// Observable list tracking the detail list of a master value.
///
/// Reads as the empty list while the master value is absent. Mutators write
/// through to the inner list; without one, `add`, `insert` and `clear` do
/// nothing and index-based operations report an empty list.
pub struct DetailObservableList<M, E: Clone + PartialEq + 'static> {
    core: Rc<SingleMaster<M, ListRef<E>>>,
}

impl<M, E: Clone + PartialEq + 'static> Clone for DetailObservableList<M, E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<M, E> DetailObservableList<M, E>
where
    M: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    /// Create the adapter and its initial detail list.
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
        F: Fn(&M) -> ListRef<E> + 'static,
    {
        let core = SingleMaster::<M, ListRef<E>>::create(master, Box::new(factory), element_type)?;
        Ok(Self { core })
    }

    #[must_use]
    pub fn observed(&self) -> Option<ListRef<E>> {
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
    pub fn share(&self) -> ListRef<E> {
        Rc::new(self.clone())
    }

    fn empty_index(index: usize) -> ObservableError {
        ObservableError::IndexOutOfBounds { index, len: 0 }
    }
}

impl<M, E> Observable for DetailObservableList<M, E>
where
    M: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
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

impl<M, E> ObservableList<E> for DetailObservableList<M, E>
where
    M: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    fn element_type(&self) -> Option<ValueType> {
        self.core.detail_type.clone()
    }

    fn len(&self) -> usize {
        self.core.read(|| 0, |list| list.len())
    }

    fn get(&self, index: usize) -> Option<E> {
        self.core.read(|| None, |list| list.get(index))
    }

    fn to_vec(&self) -> Vec<E> {
        self.core.read(Vec::new, |list| list.to_vec())
    }

    fn contains(&self, element: &E) -> bool {
        self.core.read(|| false, |list| list.contains(element))
    }

    fn index_of(&self, element: &E) -> Option<usize> {
        self.core.read(|| None, |list| list.index_of(element))
    }

    fn add(&self, element: E) -> Result<(), ObservableError> {
        self.core.delegate(|| Ok(()), |list| list.add(element))
    }

    fn insert(&self, index: usize, element: E) -> Result<(), ObservableError> {
        self.core.delegate(
            || {
                if index == 0 {
                    Ok(())
                } else {
                    Err(Self::empty_index(index))
                }
            },
            |list| list.insert(index, element),
        )
    }

    fn set(&self, index: usize, element: E) -> Result<E, ObservableError> {
        self.core
            .delegate(|| Err(Self::empty_index(index)), |list| list.set(index, element))
    }

    fn remove_at(&self, index: usize) -> Result<E, ObservableError> {
        self.core
            .delegate(|| Err(Self::empty_index(index)), |list| list.remove_at(index))
    }

    fn remove(&self, element: &E) -> Result<bool, ObservableError> {
        self.core.delegate(|| Ok(false), |list| list.remove(element))
    }

    fn move_element(&self, old_index: usize, new_index: usize) -> Result<E, ObservableError> {
        self.core.delegate(
            || generic_move(self, old_index, new_index),
            |list| list.move_element(old_index, new_index),
        )
    }

    fn clear(&self) -> Result<(), ObservableError> {
        self.core.delegate(|| Ok(()), |list| list.clear())
    }

    fn remove_all(&self, elements: &[E]) -> Result<bool, ObservableError> {
        self.core.delegate(|| Ok(false), |list| list.remove_all(elements))
    }

    fn retain_all(&self, elements: &[E]) -> Result<bool, ObservableError> {
        self.core.delegate(|| Ok(false), |list| list.retain_all(elements))
    }

    fn subscribe(&self, listener: Box<dyn Fn(&ListDiff<E>)>) -> Subscription {
        self.core.support.subscribe(listener)
    }
}

impl<M, E: Clone + PartialEq + 'static> fmt::Debug for DetailObservableList<M, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetailObservableList")
            .field("id", &self.core.id)
            .field("realm", &self.core.realm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Person, recorder};
    use tether_core::{ListDiffEntry, ObservableValue, WritableList, WritableValue};

    fn pets_of(master: &WritableValue<Option<Rc<Person>>>) -> DetailObservableList<Rc<Person>, String> {
        DetailObservableList::new(
            master.share(),
            |p: &Rc<Person>| p.pets.share(),
            Some(ValueType::named("Pet")),
        )
        .expect("live master")
    }

    #[test]
    fn person_pets_walkthrough() {
        let master = WritableValue::new(None);
        let pets = pets_of(&master);
        assert!(pets.is_empty());

        let (log, listener) = recorder::<ListDiff<String>>();
        let _sub = pets.subscribe(listener);

        let person1 = Person::new("p1", &["dog"]);
        master.set(Some(Rc::clone(&person1))).expect("set");
        let person2 = Person::new("p2", &[]);
        master.set(Some(person2)).expect("set");

        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].entries(), &[ListDiffEntry::added(0, "dog".to_owned())]);
        assert_eq!(log[1].entries(), &[ListDiffEntry::removed(0, "dog".to_owned())]);
        assert!(person1.pets.is_disposed());
    }

    #[test]
    fn construction_fires_nothing_and_mirrors_master() {
        let master = WritableValue::new(Some(Person::new("p", &["cat", "fish"])));
        let pets = pets_of(&master);
        assert_eq!(pets.to_vec(), vec!["cat".to_owned(), "fish".to_owned()]);
        assert_eq!(pets.len(), 2);
        assert_eq!(pets.index_of(&"fish".to_owned()), Some(1));
    }

    #[test]
    fn mutators_write_through_and_inner_changes_pass_through() {
        let person = Person::new("p", &["cat"]);
        let master = WritableValue::new(Some(Rc::clone(&person)));
        let pets = pets_of(&master);
        let (log, listener) = recorder::<ListDiff<String>>();
        let _sub = pets.subscribe(listener);

        pets.add("dog".into()).expect("add");
        pets.move_element(1, 0).expect("move");
        person.pets.remove(&"cat".to_owned()).expect("remove");

        assert_eq!(person.pets.to_vec(), vec!["dog".to_owned()]);
        assert_eq!(log.borrow().len(), 3);
        assert_eq!(
            log.borrow()[2].entries(),
            &[ListDiffEntry::removed(1, "cat".to_owned())]
        );
    }

    #[test]
    fn absent_detail_mutators() {
        let master: WritableValue<Option<Rc<Person>>> = WritableValue::new(None);
        let pets = pets_of(&master);
        assert_eq!(pets.add("dog".into()), Ok(()));
        assert_eq!(pets.clear(), Ok(()));
        assert_eq!(pets.remove(&"dog".into()), Ok(false));
        assert_eq!(
            pets.remove_at(0),
            Err(ObservableError::IndexOutOfBounds { index: 0, len: 0 })
        );
        assert!(pets.move_element(0, 0).is_err());
        assert!(pets.is_empty());
    }

    #[test]
    #[should_panic(expected = "cannot change element type")]
    fn element_type_is_fixed() {
        let master = WritableValue::new(None);
        let _pets = DetailObservableList::new(
            master.share(),
            |_: &Rc<Person>| WritableList::<String>::new().share(),
            Some(ValueType::named("Pet")),
        )
        .expect("no initial detail");
        master.set(Some(Person::new("p", &[]))).expect("set");
    }

    #[test]
    fn dispose_cascades_once() {
        let person = Person::new("p", &["cat"]);
        let master = WritableValue::new(Some(Rc::clone(&person)));
        let pets = pets_of(&master);
        let disposals = Rc::new(std::cell::Cell::new(0));
        let d = Rc::clone(&disposals);
        let _sub = person.pets.subscribe_dispose(Box::new(move || d.set(d.get() + 1)));

        pets.dispose();
        pets.dispose();
        assert_eq!(disposals.get(), 1);
        assert!(!master.is_disposed(), "master is never disposed by the adapter");
        assert!(pets.is_empty());
        assert!(!master.has_listeners());
    }
}
