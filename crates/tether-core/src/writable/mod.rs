#![forbid(unsafe_code)]

//! Mutable base observables.
//!
//! [`WritableValue`], [`WritableList`], [`WritableSet`] and [`WritableMap`]
//! own their state directly. They are the usual masters and details for the
//! adapters in `tether-detail`, and stand in for asynchronous producers
//! through [`set_stale()`](WritableValue::set_stale).
//!
//! # Invariants
//!
//! 1. A mutation that changes nothing fires nothing (list `set` excepted: the
//!    replaced element may be a distinct object that merely compares equal).
//! 2. Every getter reports itself to the [`ObservableTracker`].
//! 3. Any definite mutation clears staleness.
//! 4. Mutating a disposed writable fails with [`ObservableError::Disposed`];
//!    reads keep returning the last state.
//!
//! [`ObservableTracker`]: crate::tracker::ObservableTracker

mod list;
mod map;
mod set;
mod value;

pub use list::WritableList;
pub use map::WritableMap;
pub use set::WritableSet;
pub use value::WritableValue;

use std::cell::Cell;

use crate::error::ObservableError;
use crate::listener::ChangeSupport;
use crate::observable::{ObservableId, ValueType};
use crate::realm::Realm;
use crate::tracker::ObservableTracker;

/// State shared by every writable: identity, realm, flags and listeners.
pub(crate) struct WritableCore<D> {
    pub(crate) id: ObservableId,
    pub(crate) realm: Realm,
    pub(crate) declared: Option<ValueType>,
    pub(crate) support: ChangeSupport<D>,
    stale: Cell<bool>,
    disposed: Cell<bool>,
}

impl<D: 'static> WritableCore<D> {
    pub(crate) fn new(realm: Realm, declared: Option<ValueType>) -> Self {
        Self {
            id: ObservableId::next(),
            realm,
            declared,
            support: ChangeSupport::new(),
            stale: Cell::new(false),
            disposed: Cell::new(false),
        }
    }

    pub(crate) fn getter_called(&self) {
        ObservableTracker::getter_called(self.id);
    }

    pub(crate) fn check_live(&self) -> Result<(), ObservableError> {
        if self.disposed.get() {
            Err(ObservableError::Disposed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.getter_called();
        self.stale.get()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Set the stale flag, firing stale listeners on the false → true edge.
    pub(crate) fn set_stale(&self, stale: bool) {
        if self.disposed.get() {
            return;
        }
        let was_stale = self.stale.replace(stale);
        if stale && !was_stale {
            self.support.fire_stale();
        }
    }

    /// Fire a change after a definite mutation, clearing staleness first.
    pub(crate) fn fire_change(&self, diff: &D) {
        self.stale.set(false);
        self.support.fire_change(diff);
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        tracing::trace!(observable = %self.id, realm = %self.realm, "writable disposed");
        self.support.fire_dispose();
        self.support.clear();
    }
}
