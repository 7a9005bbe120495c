//! Property-based invariant tests for the tether-core diff engine.
//!
//! For any pair of snapshots:
//!
//! 1. Applying `compute(a, b)` to `a` yields `b` (lists, sets, maps).
//! 2. Identical snapshots produce an empty diff.
//! 3. A list diff never touches the common prefix or suffix.
//! 4. A list diff is no longer than remove-all plus add-all.
//! 5. Replaying every diff a `WritableList` fires reproduces its contents.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use proptest::prelude::*;
use tether_core::{ListDiff, MapDiff, ObservableList, SetDiff, WritableList};

// ── Helpers ─────────────────────────────────────────────────────────────

/// Small alphabet so that equal elements and repeated runs are common.
fn elements() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(0u8..6, 0..40)
}

fn sets() -> impl Strategy<Value = HashSet<u8>> {
    proptest::collection::hash_set(0u8..32, 0..20)
}

fn maps() -> impl Strategy<Value = HashMap<u8, u8>> {
    proptest::collection::hash_map(0u8..16, 0u8..4, 0..12)
}

#[derive(Debug, Clone)]
enum ListOp {
    Add(u8),
    Insert(usize, u8),
    Set(usize, u8),
    RemoveAt(usize),
    Move(usize, usize),
    RemoveAll(Vec<u8>),
    RetainAll(Vec<u8>),
    Replace(Vec<u8>),
    Clear,
}

fn list_op() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        (0u8..6).prop_map(ListOp::Add),
        (0usize..20, 0u8..6).prop_map(|(i, e)| ListOp::Insert(i, e)),
        (0usize..20, 0u8..6).prop_map(|(i, e)| ListOp::Set(i, e)),
        (0usize..20).prop_map(ListOp::RemoveAt),
        (0usize..20, 0usize..20).prop_map(|(a, b)| ListOp::Move(a, b)),
        proptest::collection::vec(0u8..6, 0..3).prop_map(ListOp::RemoveAll),
        proptest::collection::vec(0u8..6, 0..4).prop_map(ListOp::RetainAll),
        elements().prop_map(ListOp::Replace),
        Just(ListOp::Clear),
    ]
}

// ═════════════════════════════════════════════════════════════════════════
// 1-4. Snapshot diffs
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn list_diff_round_trips(old in elements(), new in elements()) {
        let diff = ListDiff::compute(&old, &new);
        let mut replay = old.clone();
        diff.apply_to(&mut replay);
        prop_assert_eq!(replay, new);
    }

    #[test]
    fn identical_lists_produce_empty_diff(list in elements()) {
        prop_assert!(ListDiff::compute(&list, &list).is_empty());
    }

    #[test]
    fn list_diff_leaves_common_prefix_alone(
        prefix in elements(),
        old in elements(),
        new in elements(),
    ) {
        let old: Vec<u8> = prefix.iter().copied().chain(old).collect();
        let new: Vec<u8> = prefix.iter().copied().chain(new).collect();
        let diff = ListDiff::compute(&old, &new);
        for entry in diff.entries() {
            prop_assert!(entry.position() >= prefix.len(),
                "entry {:?} edits the shared prefix of length {}", entry, prefix.len());
        }
    }

    #[test]
    fn list_diff_is_bounded(old in elements(), new in elements()) {
        let diff = ListDiff::compute(&old, &new);
        prop_assert!(diff.len() <= old.len() + new.len());
    }

    #[test]
    fn set_diff_round_trips(old in sets(), new in sets()) {
        let diff = SetDiff::compute(&old, &new);
        prop_assert!(diff.additions().is_disjoint(diff.removals()));
        let mut replay = old.clone();
        diff.apply_to(&mut replay);
        prop_assert_eq!(replay, new);
    }

    #[test]
    fn map_diff_round_trips(old in maps(), new in maps()) {
        let diff = MapDiff::compute(&old, &new);
        for key in diff.changed_keys() {
            prop_assert_ne!(diff.old_value(&key), diff.new_value(&key));
        }
        let mut replay = old.clone();
        diff.apply_to(&mut replay);
        prop_assert_eq!(replay, new);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Writable list events replay
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn writable_list_events_replay(initial in elements(), ops in proptest::collection::vec(list_op(), 0..30)) {
        let list = WritableList::from_vec(initial.clone());
        let log: Rc<RefCell<Vec<ListDiff<u8>>>> = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let _sub = list.subscribe(Box::new(move |d: &ListDiff<u8>| l.borrow_mut().push(d.clone())));

        for op in ops {
            // Out-of-range indices are rejected and must fire nothing.
            let _ = match op {
                ListOp::Add(e) => list.add(e),
                ListOp::Insert(i, e) => list.insert(i, e),
                ListOp::Set(i, e) => list.set(i, e).map(|_| ()),
                ListOp::RemoveAt(i) => list.remove_at(i).map(|_| ()),
                ListOp::Move(a, b) => list.move_element(a, b).map(|_| ()),
                ListOp::RemoveAll(es) => list.remove_all(&es).map(|_| ()),
                ListOp::RetainAll(es) => list.retain_all(&es).map(|_| ()),
                ListOp::Replace(es) => list.replace_all(es),
                ListOp::Clear => list.clear(),
            };
        }

        let mut replay = initial;
        for diff in log.borrow().iter() {
            prop_assert!(!diff.is_empty(), "empty diffs are never fired");
            diff.apply_to(&mut replay);
        }
        prop_assert_eq!(replay, list.to_vec());
    }
}
