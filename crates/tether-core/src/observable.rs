#![forbid(unsafe_code)]

//! Observable capability traits.
//!
//! Every observable implements [`Observable`]: it has an id, a [`Realm`], a
//! stale flag, a dispose lifecycle and stale/dispose listeners. The four
//! shape traits add typed reads, writes and change listeners:
//!
//! | Trait | Change event |
//! |-------|--------------|
//! | [`ObservableValue<T>`] | [`ValueDiff<T>`] |
//! | [`ObservableList<E>`] | [`ListDiff<E>`] |
//! | [`ObservableSet<E>`] | [`SetDiff<E>`] |
//! | [`ObservableMap<K, V>`] | [`MapDiff<K, V>`] |
//!
//! Shared handles are passed around as `Rc<dyn ...>` through the
//! [`ValueRef`], [`ListRef`], [`SetRef`] and [`MapRef`] aliases.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::diff::{ListDiff, MapDiff, SetDiff, ValueDiff};
use crate::error::ObservableError;
use crate::listener::Subscription;
use crate::realm::Realm;

static NEXT_OBSERVABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservableId(u64);

impl ObservableId {
    /// Allocate a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OBSERVABLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw id (tests and diagnostics).
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObservableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obs#{}", self.0)
    }
}

/// Declared type of the values an observable holds.
///
/// Detail containers fix their detail type at construction and reject a
/// replacement detail that declares a different one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueType(Cow<'static, str>);

impl ValueType {
    /// The descriptor of the Rust type `T`.
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    /// A named descriptor, for types more specific than the Rust type.
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capabilities shared by every observable.
pub trait Observable {
    /// Unique id, used for dependency tracking.
    fn id(&self) -> ObservableId;

    /// Realm this observable is bound to.
    fn realm(&self) -> Realm;

    /// Whether the current state is known to be out of date.
    fn is_stale(&self) -> bool;

    fn is_disposed(&self) -> bool;

    /// Release every resource this observable owns. Idempotent.
    fn dispose(&self);

    /// Called on the non-stale → stale transition.
    fn subscribe_stale(&self, listener: Box<dyn Fn()>) -> Subscription;

    /// Called once when the observable is disposed.
    fn subscribe_dispose(&self, listener: Box<dyn Fn()>) -> Subscription;
}

/// An observable single value.
pub trait ObservableValue<T>: Observable {
    /// Declared type of the value, `None` when untyped.
    fn value_type(&self) -> Option<ValueType>;

    fn get(&self) -> T;

    fn set(&self, value: T) -> Result<(), ObservableError>;

    /// Register a change listener.
    fn subscribe(&self, listener: Box<dyn Fn(&ValueDiff<T>)>) -> Subscription;
}

/// An observable ordered list.
pub trait ObservableList<E: Clone + PartialEq + 'static>: Observable {
    fn element_type(&self) -> Option<ValueType>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<E>;

    /// Snapshot of the current elements.
    fn to_vec(&self) -> Vec<E>;

    fn contains(&self, element: &E) -> bool {
        self.to_vec().contains(element)
    }

    fn index_of(&self, element: &E) -> Option<usize> {
        self.to_vec().iter().position(|e| e == element)
    }

    /// Append `element`.
    fn add(&self, element: E) -> Result<(), ObservableError>;

    /// Insert `element` at `index` (`index <= len`).
    fn insert(&self, index: usize, element: E) -> Result<(), ObservableError>;

    /// Replace the element at `index`, returning the previous one.
    fn set(&self, index: usize, element: E) -> Result<E, ObservableError>;

    fn remove_at(&self, index: usize) -> Result<E, ObservableError>;

    /// Remove the first occurrence of `element`.
    fn remove(&self, element: &E) -> Result<bool, ObservableError>;

    /// Move the element at `old_index` to `new_index`, returning it.
    fn move_element(&self, old_index: usize, new_index: usize) -> Result<E, ObservableError> {
        generic_move(self, old_index, new_index)
    }

    fn clear(&self) -> Result<(), ObservableError>;

    /// Remove every element contained in `elements`.
    fn remove_all(&self, elements: &[E]) -> Result<bool, ObservableError>;

    /// Remove every element not contained in `elements`.
    fn retain_all(&self, elements: &[E]) -> Result<bool, ObservableError>;

    /// Register a change listener.
    fn subscribe(&self, listener: Box<dyn Fn(&ListDiff<E>)>) -> Subscription;
}

/// Move implemented as remove-then-insert, for lists without a native move.
pub fn generic_move<E, L>(list: &L, old_index: usize, new_index: usize) -> Result<E, ObservableError>
where
    E: Clone + PartialEq + 'static,
    L: ObservableList<E> + ?Sized,
{
    let len = list.len();
    if old_index >= len {
        return Err(ObservableError::IndexOutOfBounds {
            index: old_index,
            len,
        });
    }
    if new_index >= len {
        return Err(ObservableError::IndexOutOfBounds {
            index: new_index,
            len,
        });
    }
    let element = list.remove_at(old_index)?;
    list.insert(new_index, element.clone())?;
    Ok(element)
}

/// An observable unordered set.
pub trait ObservableSet<E: Clone + Eq + Hash + 'static>: Observable {
    fn element_type(&self) -> Option<ValueType>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, element: &E) -> bool;

    /// Snapshot of the current elements.
    fn to_set(&self) -> HashSet<E>;

    /// Add `element`; returns whether the set changed.
    fn add(&self, element: E) -> Result<bool, ObservableError>;

    /// Remove `element`; returns whether the set changed.
    fn remove(&self, element: &E) -> Result<bool, ObservableError>;

    fn clear(&self) -> Result<(), ObservableError>;

    /// Register a change listener.
    fn subscribe(&self, listener: Box<dyn Fn(&SetDiff<E>)>) -> Subscription;
}

/// An observable key/value map.
pub trait ObservableMap<K, V>: Observable
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    fn key_type(&self) -> Option<ValueType>;

    fn value_type(&self) -> Option<ValueType>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains_key(&self, key: &K) -> bool;

    fn get(&self, key: &K) -> Option<V>;

    /// Snapshot of the current keys.
    fn keys(&self) -> Vec<K>;

    /// Snapshot of the current entries.
    fn to_map(&self) -> HashMap<K, V>;

    /// Associate `value` with `key`, returning the previous value.
    fn put(&self, key: K, value: V) -> Result<Option<V>, ObservableError>;

    fn remove(&self, key: &K) -> Result<Option<V>, ObservableError>;

    fn clear(&self) -> Result<(), ObservableError>;

    /// Register a change listener.
    fn subscribe(&self, listener: Box<dyn Fn(&MapDiff<K, V>)>) -> Subscription;
}

/// Shared handle to an observable value.
pub type ValueRef<T> = Rc<dyn ObservableValue<T>>;

/// Shared handle to an observable list.
pub type ListRef<E> = Rc<dyn ObservableList<E>>;

/// Shared handle to an observable set.
pub type SetRef<E> = Rc<dyn ObservableSet<E>>;

/// Shared handle to an observable map.
pub type MapRef<K, V> = Rc<dyn ObservableMap<K, V>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = ObservableId::next();
        let b = ObservableId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn value_type_equality() {
        assert_eq!(ValueType::of::<String>(), ValueType::of::<String>());
        assert_ne!(ValueType::of::<String>(), ValueType::of::<u32>());
        assert_eq!(ValueType::named("Pet").to_string(), "Pet");
        assert_ne!(ValueType::named("Pet"), ValueType::named("Person"));
    }
}
