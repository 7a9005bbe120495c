#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(unused_imports, dead_code))]

//! Master–detail observables.
//!
//! Each adapter here derives an observable from a *master* observable
//! through a caller-supplied factory and keeps it synchronized as the master
//! changes. Adapters implement the ordinary `tether-core` observable traits,
//! so they can be used anywhere a plain observable is expected.
//!
//! | Adapter | Master | Detail per | Exposes |
//! |---------|--------|------------|---------|
//! | [`DetailObservableValue`] | value `Option<M>` | master value | value `Option<T>` |
//! | [`DetailObservableList`] | value `Option<M>` | master value | list |
//! | [`DetailObservableSet`] | value `Option<M>` | master value | set |
//! | [`DetailObservableMap`] | value `Option<M>` | master value | map |
//! | [`ListDetailValueObservableList`] | list of `M` | distinct element (by identity) | list |
//! | [`MapDetailValueObservableMap`] | map `K -> M` | key | map `K -> E` |
//! | [`SetDetailValueObservableMap`] | set of `M` | element | map `M -> E` |
//!
//! # Architecture
//!
//! Single-master adapters share one state machine: on every master change
//! the current inner detail is disposed, the factory creates the next one,
//! its declared type is checked against the type fixed at construction, and
//! one diff between the old and new snapshots is fired. Changes of the inner
//! detail itself are forwarded unmodified.
//!
//! Aggregate adapters keep one detail value observable per master element
//! (or key). [`ListDetailValueObservableList`] shares one detail between all
//! positions holding the same master element and reference-counts it.
//!
//! # Invariants
//!
//! 1. An adapter exclusively owns its current details and disposes each
//!    exactly once, the moment it is superseded or its master entry
//!    disappears.
//! 2. Masters are never disposed by an adapter; a disposed master disposes
//!    the adapter.
//! 3. Bookkeeping reads and writes run inside an ignore scope of the
//!    [`ObservableTracker`](tether_core::ObservableTracker).
//! 4. An adapter is stale iff its master or any current detail is stale.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Disposed master at construction | `Err(InvariantViolation)` |
//! | Detail type changes on master change | panic with the `InvariantViolation` message |
//! | Structural mutation of a derived view | `Err(Unsupported)` |
//! | Detail in a foreign realm | `tracing::warn!`, execution continues |

pub mod factory;
pub mod helper;
pub mod list;
pub mod list_detail;
pub mod map;
pub mod map_detail;
pub mod set;
pub mod set_detail;
mod single;
pub mod value;

pub use helper::warn_if_different_realms;
pub use list::DetailObservableList;
pub use list_detail::ListDetailValueObservableList;
pub use map::DetailObservableMap;
pub use map_detail::{DetailMapEntry, MapDetailValueObservableMap};
pub use set::DetailObservableSet;
pub use set_detail::SetDetailValueObservableMap;
pub use value::DetailObservableValue;
