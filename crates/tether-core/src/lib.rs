#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(unused_imports, dead_code))]

//! Core observable plumbing for Tether.
//!
//! This crate provides the collaborators the master–detail layer
//! (`tether-detail`) is built on:
//!
//! - [`Realm`]: single-threaded affinity context every observable belongs to.
//! - [`ObservableTracker`]: thread-local dependency collection with scoped
//!   [`IgnoreGuard`] suppression.
//! - [`diff`]: value, list, set and map diffs with the round-trip law
//!   `compute(a, b).apply_to(a) == b`.
//! - [`IdentityMap`] / [`IdentitySet`]: containers keyed by allocation
//!   identity rather than by value equality.
//! - [`ChangeSupport`] / [`Subscription`]: listener lists with RAII
//!   unsubscription and first/last listener demand hooks.
//! - [`observable`]: the [`Observable`], [`ObservableValue`],
//!   [`ObservableList`], [`ObservableSet`] and [`ObservableMap`] traits.
//! - [`writable`]: mutable base observables.
//! - [`ComputedObservableMap`]: a map computed per key over an observable key
//!   set.
//!
//! # Architecture
//!
//! Observables use `Rc` interiors and are therefore `!Send`: realm affinity
//! is enforced by the compiler. Listener callbacks are stored strongly inside
//! the observable; dropping the returned [`Subscription`] removes them.
//! Notification snapshots the listener list first, so callbacks may
//! subscribe, unsubscribe or dispose reentrantly.
//!
//! # Invariants
//!
//! 1. Listeners are notified in registration order.
//! 2. A mutation that changes nothing fires nothing.
//! 3. `dispose()` is idempotent; dispose listeners fire exactly once.
//! 4. Stale listeners fire on the non-stale → stale transition only.

pub mod computed_map;
pub mod diff;
pub mod error;
pub mod identity;
pub mod listener;
pub mod observable;
pub mod realm;
pub mod tracker;
pub mod writable;

pub use computed_map::{ComputedMapHooks, ComputedObservableMap, WeakComputedMap};
pub use diff::{ListDiff, ListDiffEntry, MapDiff, SetDiff, ValueDiff};
pub use error::ObservableError;
pub use identity::{Identity, IdentityKey, IdentityMap, IdentitySet};
pub use listener::{ChangeSupport, Subscription};
pub use observable::{
    ListRef, MapRef, Observable, ObservableId, ObservableList, ObservableMap, ObservableSet,
    ObservableValue, SetRef, ValueRef, ValueType, generic_move,
};
pub use realm::{Realm, RealmOverride};
pub use tracker::{IgnoreGuard, ObservableTracker};
pub use writable::{WritableList, WritableMap, WritableSet, WritableValue};
