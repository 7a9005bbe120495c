#![forbid(unsafe_code)]

//! Thread-local dependency collection.
//!
//! Getters report themselves through [`ObservableTracker::getter_called()`].
//! When a [`run_and_monitor()`](ObservableTracker::run_and_monitor) frame is
//! active the access is recorded, which lets automatic dependency collectors
//! learn what a computation read.
//!
//! Bookkeeping reads an observable performs on its own behalf (factory
//! invocation, delegated mutation, re-querying after an update) must not be
//! attributed to the caller. Such code runs inside an [`IgnoreGuard`]
//! obtained from [`ObservableTracker::ignore()`].
//!
//! # Invariants
//!
//! 1. Accesses are recorded only into the innermost monitor frame.
//! 2. While any `IgnoreGuard` is alive, nothing is recorded.
//! 3. Guards and frames are released on every exit path, including unwinding.

use std::cell::RefCell;

use crate::observable::ObservableId;

#[derive(Default)]
struct TrackerState {
    frames: Vec<Vec<ObservableId>>,
    ignore_depth: usize,
}

thread_local! {
    static TRACKER: RefCell<TrackerState> = RefCell::new(TrackerState::default());
}

/// Entry points of the thread-local dependency tracker.
#[derive(Debug, Clone, Copy)]
pub struct ObservableTracker;

impl ObservableTracker {
    /// Run `f`, returning its result and the observables it read, in first
    /// access order without duplicates.
    pub fn run_and_monitor<R>(f: impl FnOnce() -> R) -> (R, Vec<ObservableId>) {
        TRACKER.with(|t| t.borrow_mut().frames.push(Vec::new()));
        let frame = MonitorFrame { done: false };
        let result = f();
        let accessed = frame.finish();
        (result, accessed)
    }

    /// Run `f` with dependency recording suppressed.
    pub fn run_untracked<R>(f: impl FnOnce() -> R) -> R {
        let _ignore = Self::ignore();
        f()
    }

    /// Record that the getter of `id` was called.
    pub fn getter_called(id: ObservableId) {
        TRACKER.with(|t| {
            let mut state = t.borrow_mut();
            if state.ignore_depth > 0 {
                return;
            }
            if let Some(frame) = state.frames.last_mut()
                && !frame.contains(&id)
            {
                frame.push(id);
            }
        });
    }

    /// Suppress recording until the returned guard is dropped.
    #[must_use = "recording resumes as soon as the guard is dropped"]
    pub fn ignore() -> IgnoreGuard {
        TRACKER.with(|t| t.borrow_mut().ignore_depth += 1);
        IgnoreGuard { _private: () }
    }

    /// Whether an ignore scope is active on this thread.
    #[must_use]
    pub fn is_ignoring() -> bool {
        TRACKER.with(|t| t.borrow().ignore_depth > 0)
    }
}

/// RAII guard returned by [`ObservableTracker::ignore()`].
#[derive(Debug)]
pub struct IgnoreGuard {
    _private: (),
}

impl Drop for IgnoreGuard {
    fn drop(&mut self) {
        TRACKER.with(|t| {
            let mut state = t.borrow_mut();
            state.ignore_depth = state.ignore_depth.saturating_sub(1);
        });
    }
}

/// Pops the monitor frame even when the monitored closure unwinds.
struct MonitorFrame {
    done: bool,
}

impl MonitorFrame {
    fn finish(mut self) -> Vec<ObservableId> {
        self.done = true;
        TRACKER.with(|t| t.borrow_mut().frames.pop().unwrap_or_default())
    }
}

impl Drop for MonitorFrame {
    fn drop(&mut self) {
        if !self.done {
            TRACKER.with(|t| t.borrow_mut().frames.pop());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    fn id(n: u64) -> ObservableId {
        ObservableId::from_raw(n)
    }

    #[test]
    fn records_accesses_in_order_without_duplicates() {
        let ((), seen) = ObservableTracker::run_and_monitor(|| {
            ObservableTracker::getter_called(id(3));
            ObservableTracker::getter_called(id(1));
            ObservableTracker::getter_called(id(3));
        });
        assert_eq!(seen, vec![id(3), id(1)]);
    }

    #[test]
    fn nothing_recorded_outside_a_frame() {
        ObservableTracker::getter_called(id(9));
        let ((), seen) = ObservableTracker::run_and_monitor(|| {});
        assert!(seen.is_empty());
    }

    #[test]
    fn ignore_suppresses_and_nests() {
        let ((), seen) = ObservableTracker::run_and_monitor(|| {
            let outer = ObservableTracker::ignore();
            {
                let _inner = ObservableTracker::ignore();
                ObservableTracker::getter_called(id(1));
            }
            ObservableTracker::getter_called(id(2));
            drop(outer);
            ObservableTracker::getter_called(id(3));
        });
        assert_eq!(seen, vec![id(3)]);
        assert!(!ObservableTracker::is_ignoring());
    }

    #[test]
    fn nested_frames_record_innermost_only() {
        let (inner_seen, outer_seen) = ObservableTracker::run_and_monitor(|| {
            ObservableTracker::getter_called(id(1));
            let ((), inner) =
                ObservableTracker::run_and_monitor(|| ObservableTracker::getter_called(id(2)));
            ObservableTracker::getter_called(id(3));
            inner
        });
        assert_eq!(inner_seen, vec![id(2)]);
        assert_eq!(outer_seen, vec![id(1), id(3)]);
    }

    #[test]
    fn finished_frame_leaves_enclosing_frames_in_place() {
        let ((), outer) = ObservableTracker::run_and_monitor(|| {
            ObservableTracker::getter_called(id(1));
            let ((), middle) = ObservableTracker::run_and_monitor(|| {
                ObservableTracker::getter_called(id(2));
                let ((), innermost) = ObservableTracker::run_and_monitor(|| {});
                assert!(innermost.is_empty());
                ObservableTracker::getter_called(id(3));
            });
            assert_eq!(middle, vec![id(2), id(3)]);
            ObservableTracker::getter_called(id(4));
        });
        assert_eq!(outer, vec![id(1), id(4)]);
        TRACKER.with(|t| assert!(t.borrow().frames.is_empty()));
    }

    #[test]
    fn guard_released_on_unwind() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            ObservableTracker::run_and_monitor(|| {
                let _ignore = ObservableTracker::ignore();
                panic!("factory failed");
            })
        }));
        assert!(result.is_err());
        assert!(!ObservableTracker::is_ignoring());

        let ((), seen) = ObservableTracker::run_and_monitor(|| ObservableTracker::getter_called(id(4)));
        assert_eq!(seen, vec![id(4)], "stale frame must not swallow records");
    }

    #[test]
    fn run_untracked_hides_reads() {
        let ((), seen) = ObservableTracker::run_and_monitor(|| {
            ObservableTracker::run_untracked(|| ObservableTracker::getter_called(id(5)));
        });
        assert!(seen.is_empty());
    }
}
