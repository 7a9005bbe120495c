#![forbid(unsafe_code)]

//! Immutable descriptions of the edit between two snapshots.
//!
//! Each diff type can be computed from an old and a new snapshot and applied
//! back to the old snapshot:
//!
//! ```ignore
//! let diff = ListDiff::compute(&old, &new);
//! let mut replay = old.clone();
//! diff.apply_to(&mut replay);
//! assert_eq!(replay, new);
//! ```
//!
//! # Invariants
//!
//! 1. **Round trip**: `compute(a, b).apply_to(a)` yields exactly `b`.
//! 2. **Empty means equal**: `compute(a, a).is_empty()` for every snapshot.
//! 3. List entry positions are valid at the moment each entry is applied,
//!    in order.

mod list;
mod map;
mod set;
mod value;

pub use list::{ListDiff, ListDiffEntry};
pub use map::MapDiff;
pub use set::SetDiff;
pub use value::ValueDiff;
