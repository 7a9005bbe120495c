#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use super::WritableCore;
use crate::diff::SetDiff;
use crate::error::ObservableError;
use crate::listener::Subscription;
use crate::observable::{Observable, ObservableId, ObservableSet, SetRef, ValueType};
use crate::realm::Realm;

struct SetInner<E> {
    core: WritableCore<SetDiff<E>>,
    elements: RefCell<HashSet<E>>,
}

/// A mutable observable set.
pub struct WritableSet<E> {
    inner: Rc<SetInner<E>>,
}

impl<E> Clone for WritableSet<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Clone + Eq + Hash + 'static> WritableSet<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::in_realm(&Realm::current(), HashSet::new(), None)
    }

    #[must_use]
    pub fn from_elements(elements: impl IntoIterator<Item = E>) -> Self {
        Self::in_realm(&Realm::current(), elements.into_iter().collect(), None)
    }

    #[must_use]
    pub fn in_realm(realm: &Realm, elements: HashSet<E>, element_type: Option<ValueType>) -> Self {
        Self {
            inner: Rc::new(SetInner {
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
    pub fn share(&self) -> SetRef<E> {
        Rc::new(self.clone())
    }

    /// Add every element, firing one diff for the ones that were new.
    pub fn add_all(&self, elements: impl IntoIterator<Item = E>) -> Result<bool, ObservableError> {
        self.inner.core.check_live()?;
        let additions: HashSet<E> = {
            let mut current = self.inner.elements.borrow_mut();
            elements
                .into_iter()
                .filter(|e| current.insert(e.clone()))
                .collect()
        };
        Ok(self.fire(SetDiff::new(additions, HashSet::new())))
    }

    /// Replace the whole content, firing the difference.
    pub fn replace_all(&self, elements: HashSet<E>) -> Result<(), ObservableError> {
        self.inner.core.check_live()?;
        let old = std::mem::replace(&mut *self.inner.elements.borrow_mut(), elements);
        let diff = SetDiff::compute(&old, &self.inner.elements.borrow());
        self.fire(diff);
        Ok(())
    }

    fn fire(&self, diff: SetDiff<E>) -> bool {
        if diff.is_empty() {
            return false;
        }
        self.inner.core.fire_change(&diff);
        true
    }
}

impl<E: Clone + Eq + Hash + 'static> Default for WritableSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Eq + Hash + 'static> Observable for WritableSet<E> {
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

impl<E: Clone + Eq + Hash + 'static> ObservableSet<E> for WritableSet<E> {
    fn element_type(&self) -> Option<ValueType> {
        self.inner.core.declared.clone()
    }

    fn len(&self) -> usize {
        self.inner.core.getter_called();
        self.inner.elements.borrow().len()
    }

    fn contains(&self, element: &E) -> bool {
        self.inner.core.getter_called();
        self.inner.elements.borrow().contains(element)
    }

    fn to_set(&self) -> HashSet<E> {
        self.inner.core.getter_called();
        self.inner.elements.borrow().clone()
    }

    fn add(&self, element: E) -> Result<bool, ObservableError> {
        self.inner.core.check_live()?;
        if !self.inner.elements.borrow_mut().insert(element.clone()) {
            return Ok(false);
        }
        Ok(self.fire(SetDiff::new(HashSet::from([element]), HashSet::new())))
    }

    fn remove(&self, element: &E) -> Result<bool, ObservableError> {
        self.inner.core.check_live()?;
        if !self.inner.elements.borrow_mut().remove(element) {
            return Ok(false);
        }
        Ok(self.fire(SetDiff::new(
            HashSet::new(),
            HashSet::from([element.clone()]),
        )))
    }

    fn clear(&self) -> Result<(), ObservableError> {
        self.inner.core.check_live()?;
        let old = std::mem::take(&mut *self.inner.elements.borrow_mut());
        self.fire(SetDiff::new(HashSet::new(), old));
        Ok(())
    }

    fn subscribe(&self, listener: Box<dyn Fn(&SetDiff<E>)>) -> Subscription {
        self.inner.core.support.subscribe(listener)
    }
}

impl<E: fmt::Debug> fmt::Debug for WritableSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritableSet")
            .field("id", &self.inner.core.id)
            .field("elements", &self.inner.elements.borrow())
            .finish()
    }
}
