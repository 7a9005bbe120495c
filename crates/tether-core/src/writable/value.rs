#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::WritableCore;
use crate::diff::ValueDiff;
use crate::error::ObservableError;
use crate::listener::Subscription;
use crate::observable::{Observable, ObservableId, ObservableValue, ValueRef, ValueType};
use crate::realm::Realm;

struct ValueInner<T> {
    core: WritableCore<ValueDiff<T>>,
    value: RefCell<T>,
}

/// A settable observable value.
///
/// Cloning a `WritableValue` creates a new handle to the **same** value.
pub struct WritableValue<T> {
    inner: Rc<ValueInner<T>>,
}

impl<T> Clone for WritableValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> WritableValue<T> {
    /// Untyped value in the current realm.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::in_realm(&Realm::current(), value, None)
    }

    /// Value declaring `value_type`, in the current realm.
    #[must_use]
    pub fn with_type(value: T, value_type: ValueType) -> Self {
        Self::in_realm(&Realm::current(), value, Some(value_type))
    }

    #[must_use]
    pub fn in_realm(realm: &Realm, value: T, value_type: Option<ValueType>) -> Self {
        Self {
            inner: Rc::new(ValueInner {
                core: WritableCore::new(realm.clone(), value_type),
                value: RefCell::new(value),
            }),
        }
    }

    /// Mark the value stale (or fresh) without changing it.
    pub fn set_stale(&self, stale: bool) {
        self.inner.core.set_stale(stale);
    }

    /// Whether any change or stale listener is registered.
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        self.inner.core.support.has_listeners()
    }

    /// A shared trait-object handle to this value.
    #[must_use]
    pub fn share(&self) -> ValueRef<T> {
        Rc::new(self.clone())
    }
}

impl<T: Clone + PartialEq + 'static> Observable for WritableValue<T> {
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

impl<T: Clone + PartialEq + 'static> ObservableValue<T> for WritableValue<T> {
    fn value_type(&self) -> Option<ValueType> {
        self.inner.core.declared.clone()
    }

    fn get(&self) -> T {
        self.inner.core.getter_called();
        self.inner.value.borrow().clone()
    }

    fn set(&self, value: T) -> Result<(), ObservableError> {
        self.inner.core.check_live()?;
        let old = {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                None
            } else {
                Some(std::mem::replace(&mut *current, value.clone()))
            }
        };
        match old {
            Some(old) => self.inner.core.fire_change(&ValueDiff::new(old, value)),
            None => self.inner.core.set_stale(false),
        }
        Ok(())
    }

    fn subscribe(&self, listener: Box<dyn Fn(&ValueDiff<T>)>) -> Subscription {
        self.inner.core.support.subscribe(listener)
    }
}

impl<T: fmt::Debug> fmt::Debug for WritableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritableValue")
            .field("id", &self.inner.core.id)
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}
