#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::WritableCore;
use crate::diff::{ListDiff, ListDiffEntry};
use crate::error::ObservableError;
use crate::listener::Subscription;
use crate::observable::{ListRef, Observable, ObservableId, ObservableList, ValueType};
use crate::realm::Realm;

struct ListInner<E> {
    core: WritableCore<ListDiff<E>>,
    elements: RefCell<Vec<E>>,
}

/// A mutable observable list.
///
/// Every mutation fires a diff describing exactly the positions it touched,
/// so elements that compare equal but are distinct objects keep their
/// positions in downstream mirrors.
pub struct WritableList<E> {
    inner: Rc<ListInner<E>>,
}

impl<E> Clone for WritableList<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Clone + PartialEq + 'static> WritableList<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Untyped list in the current realm holding `elements`.
    #[must_use]
    pub fn from_vec(elements: Vec<E>) -> Self {
        Self::in_realm(&Realm::current(), elements, None)
    }

    #[must_use]
    pub fn with_type(elements: Vec<E>, element_type: ValueType) -> Self {
        Self::in_realm(&Realm::current(), elements, Some(element_type))
    }

    #[must_use]
    pub fn in_realm(realm: &Realm, elements: Vec<E>, element_type: Option<ValueType>) -> Self {
        Self {
            inner: Rc::new(ListInner {
                core: WritableCore::new(realm.clone(), element_type),
                elements: RefCell::new(elements),
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
    pub fn share(&self) -> ListRef<E> {
        Rc::new(self.clone())
    }

    /// Replace the whole content, firing the computed minimal diff.
    pub fn replace_all(&self, elements: Vec<E>) -> Result<(), ObservableError> {
        self.inner.core.check_live()?;
        let old = std::mem::replace(&mut *self.inner.elements.borrow_mut(), elements.clone());
        self.fire(ListDiff::compute(&old, &elements));
        Ok(())
    }

    fn fire(&self, diff: ListDiff<E>) {
        if !diff.is_empty() {
            self.inner.core.fire_change(&diff);
        }
    }

    fn out_of_bounds(index: usize, len: usize) -> ObservableError {
        ObservableError::IndexOutOfBounds { index, len }
    }

    /// Remove every element for which `doomed` holds, returning the diff.
    fn remove_where(&self, doomed: impl Fn(&E) -> bool) -> ListDiff<E> {
        let mut entries = Vec::new();
        let mut elements = self.inner.elements.borrow_mut();
        let mut position = 0;
        elements.retain(|element| {
            if doomed(element) {
                entries.push(ListDiffEntry::removed(position, element.clone()));
                false
            } else {
                position += 1;
                true
            }
        });
        ListDiff::from_entries(entries)
    }
}

impl<E: Clone + PartialEq + 'static> Default for WritableList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + PartialEq + 'static> Observable for WritableList<E> {
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

impl<E: Clone + PartialEq + 'static> ObservableList<E> for WritableList<E> {
    fn element_type(&self) -> Option<ValueType> {
        self.inner.core.declared.clone()
    }

    fn len(&self) -> usize {
        self.inner.core.getter_called();
        self.inner.elements.borrow().len()
    }

    fn get(&self, index: usize) -> Option<E> {
        self.inner.core.getter_called();
        self.inner.elements.borrow().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<E> {
        self.inner.core.getter_called();
        self.inner.elements.borrow().clone()
    }

    fn add(&self, element: E) -> Result<(), ObservableError> {
        self.inner.core.check_live()?;
        let position = {
            let mut elements = self.inner.elements.borrow_mut();
            elements.push(element.clone());
            elements.len() - 1
        };
        self.fire(ListDiff::from_entries(vec![ListDiffEntry::added(
            position, element,
        )]));
        Ok(())
    }

    fn insert(&self, index: usize, element: E) -> Result<(), ObservableError> {
        self.inner.core.check_live()?;
        {
            let mut elements = self.inner.elements.borrow_mut();
            if index > elements.len() {
                return Err(Self::out_of_bounds(index, elements.len()));
            }
            elements.insert(index, element.clone());
        }
        self.fire(ListDiff::from_entries(vec![ListDiffEntry::added(
            index, element,
        )]));
        Ok(())
    }

    fn set(&self, index: usize, element: E) -> Result<E, ObservableError> {
        self.inner.core.check_live()?;
        let old = {
            let mut elements = self.inner.elements.borrow_mut();
            let len = elements.len();
            let slot = elements
                .get_mut(index)
                .ok_or_else(|| Self::out_of_bounds(index, len))?;
            std::mem::replace(slot, element.clone())
        };
        self.fire(ListDiff::from_entries(vec![
            ListDiffEntry::removed(index, old.clone()),
            ListDiffEntry::added(index, element),
        ]));
        Ok(old)
    }

    fn remove_at(&self, index: usize) -> Result<E, ObservableError> {
        self.inner.core.check_live()?;
        let old = {
            let mut elements = self.inner.elements.borrow_mut();
            if index >= elements.len() {
                return Err(Self::out_of_bounds(index, elements.len()));
            }
            elements.remove(index)
        };
        self.fire(ListDiff::from_entries(vec![ListDiffEntry::removed(
            index,
            old.clone(),
        )]));
        Ok(old)
    }

    fn remove(&self, element: &E) -> Result<bool, ObservableError> {
        self.inner.core.check_live()?;
        let index = self.inner.elements.borrow().iter().position(|e| e == element);
        match index {
            Some(index) => self.remove_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    fn move_element(&self, old_index: usize, new_index: usize) -> Result<E, ObservableError> {
        self.inner.core.check_live()?;
        let element = {
            let mut elements = self.inner.elements.borrow_mut();
            let len = elements.len();
            if old_index >= len {
                return Err(Self::out_of_bounds(old_index, len));
            }
            if new_index >= len {
                return Err(Self::out_of_bounds(new_index, len));
            }
            let element = elements.remove(old_index);
            elements.insert(new_index, element.clone());
            element
        };
        if old_index != new_index {
            self.fire(ListDiff::from_entries(vec![
                ListDiffEntry::removed(old_index, element.clone()),
                ListDiffEntry::added(new_index, element.clone()),
            ]));
        }
        Ok(element)
    }

    fn clear(&self) -> Result<(), ObservableError> {
        self.inner.core.check_live()?;
        let old = std::mem::take(&mut *self.inner.elements.borrow_mut());
        let entries = old
            .into_iter()
            .map(|element| ListDiffEntry::removed(0, element))
            .collect();
        self.fire(ListDiff::from_entries(entries));
        Ok(())
    }

    fn remove_all(&self, elements: &[E]) -> Result<bool, ObservableError> {
        self.inner.core.check_live()?;
        let diff = self.remove_where(|e| elements.contains(e));
        let changed = !diff.is_empty();
        self.fire(diff);
        Ok(changed)
    }

    fn retain_all(&self, elements: &[E]) -> Result<bool, ObservableError> {
        self.inner.core.check_live()?;
        let diff = self.remove_where(|e| !elements.contains(e));
        let changed = !diff.is_empty();
        self.fire(diff);
        Ok(changed)
    }

    fn subscribe(&self, listener: Box<dyn Fn(&ListDiff<E>)>) -> Subscription {
        self.inner.core.support.subscribe(listener)
    }
}

impl<E: fmt::Debug> fmt::Debug for WritableList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritableList")
            .field("id", &self.inner.core.id)
            .field("elements", &self.inner.elements.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(list: &WritableList<char>) -> (Rc<RefCell<Vec<ListDiff<char>>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let sub = list.subscribe(Box::new(move |d: &ListDiff<char>| l.borrow_mut().push(d.clone())));
        (log, sub)
    }

    fn replay(before: &[char], diffs: &[ListDiff<char>]) -> Vec<char> {
        let mut v = before.to_vec();
        for d in diffs {
            d.apply_to(&mut v);
        }
        v
    }

    #[test]
    fn every_mutation_diff_replays() {
        let list = WritableList::from_vec(vec!['a', 'b', 'c']);
        let (log, _sub) = recorder(&list);

        list.add('d').expect("add");
        list.insert(0, 'z').expect("insert");
        list.set(2, 'B').expect("set");
        list.remove_at(1).expect("remove_at");
        list.move_element(0, 3).expect("move");
        list.remove(&'c').expect("remove");
        list.remove_all(&['d']).expect("remove_all");
        list.retain_all(&['B']).expect("retain_all");
        list.replace_all(vec!['q', 'B', 'r']).expect("replace_all");
        list.clear().expect("clear");

        assert_eq!(replay(&['a', 'b', 'c'], &log.borrow()), list.to_vec());
        assert_eq!(log.borrow().len(), 10);
    }

    #[test]
    fn set_fires_even_for_equal_element() {
        let list = WritableList::from_vec(vec!['a']);
        let (log, _sub) = recorder(&list);
        list.set(0, 'a').expect("set");
        assert_eq!(
            log.borrow()[0].entries(),
            &[ListDiffEntry::removed(0, 'a'), ListDiffEntry::added(0, 'a')]
        );
    }

    #[test]
    fn no_op_mutations_fire_nothing() {
        let list = WritableList::from_vec(vec!['a']);
        let (log, _sub) = recorder(&list);
        assert!(!list.remove(&'x').expect("remove"));
        assert!(!list.remove_all(&['x']).expect("remove_all"));
        list.move_element(0, 0).expect("move");
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn index_errors() {
        let list = WritableList::from_vec(vec!['a']);
        assert_eq!(
            list.insert(3, 'b'),
            Err(ObservableError::IndexOutOfBounds { index: 3, len: 1 })
        );
        assert_eq!(
            list.remove_at(1),
            Err(ObservableError::IndexOutOfBounds { index: 1, len: 1 })
        );
        assert!(list.set(5, 'x').is_err());
    }

    #[test]
    fn generic_move_matches_native_move() {
        use crate::observable::generic_move;
        let native = WritableList::from_vec(vec![1, 2, 3, 4]);
        let generic = WritableList::from_vec(vec![1, 2, 3, 4]);
        native.move_element(3, 1).expect("native move");
        generic_move(&generic, 3, 1).expect("generic move");
        assert_eq!(native.to_vec(), generic.to_vec());
        assert_eq!(native.to_vec(), vec![1, 4, 2, 3]);
    }
}
