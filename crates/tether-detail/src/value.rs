#![forbid(unsafe_code)]

//! A value derived from the current value of a master observable.

use std::fmt;
use std::rc::Rc;

use tether_core::{
    Observable, ObservableError, ObservableId, ObservableValue, Realm, Subscription, ValueDiff,
    ValueRef, ValueType,
};

use crate::single::SingleMaster;

/// Observable value tracking the detail of a master value.
///
/// While the master holds `Some(m)` the adapter owns the observable
/// `factory(&m)` and reads and writes through it. When the master is `None`
/// there is no inner detail and the adapter reads as `None`.
///
/// Changes made to the inner detail are re-fired unchanged. Replacing the
/// master value fires one `(old, new)` diff and disposes the superseded
/// detail.
pub struct DetailObservableValue<M, T: Clone + PartialEq + 'static> {
    core: Rc<SingleMaster<M, ValueRef<T>>>,
}

impl<M, T: Clone + PartialEq + 'static> Clone for DetailObservableValue<M, T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<M, T> DetailObservableValue<M, T>
where
    M: Clone + PartialEq + 'static,
    T: Clone + PartialEq + 'static,
{
    /// Create the adapter and its initial detail.
    ///
    /// # Errors
    ///
    /// [`ObservableError::InvariantViolation`] if `master` is disposed or the
    /// initial detail does not declare `detail_type`.
    pub fn new<F>(
        master: ValueRef<Option<M>>,
        factory: F,
        detail_type: Option<ValueType>,
    ) -> Result<Self, ObservableError>
    where
        F: Fn(&M) -> ValueRef<T> + 'static,
    {
        let core = SingleMaster::<M, ValueRef<T>>::create(master, Box::new(factory), detail_type)?;
        Ok(Self { core })
    }

    /// The current inner detail, if the master value is present.
    #[must_use]
    pub fn observed(&self) -> Option<ValueRef<T>> {
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
    pub fn share(&self) -> ValueRef<Option<T>> {
        Rc::new(self.clone())
    }
}

impl<M, T> Observable for DetailObservableValue<M, T>
where
    M: Clone + PartialEq + 'static,
    T: Clone + PartialEq + 'static,
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

impl<M, T> ObservableValue<Option<T>> for DetailObservableValue<M, T>
where
    M: Clone + PartialEq + 'static,
    T: Clone + PartialEq + 'static,
{
    fn value_type(&self) -> Option<ValueType> {
        self.core.detail_type.clone()
    }

    fn get(&self) -> Option<T> {
        self.core.read(|| None, |detail| Some(detail.get()))
    }

    /// Write through to the inner detail. A no-op while there is none.
    fn set(&self, value: Option<T>) -> Result<(), ObservableError> {
        self.core.delegate(
            || Ok(()),
            |detail| match value {
                Some(value) => detail.set(value),
                None => Err(ObservableError::Unsupported(
                    "set absent value on a present detail",
                )),
            },
        )
    }

    fn subscribe(&self, listener: Box<dyn Fn(&ValueDiff<Option<T>>)>) -> Subscription {
        self.core.support.subscribe(listener)
    }
}

impl<M, T: Clone + PartialEq + 'static> fmt::Debug for DetailObservableValue<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetailObservableValue")
            .field("id", &self.core.id)
            .field("realm", &self.core.realm)
            .finish_non_exhaustive()
    }
}
