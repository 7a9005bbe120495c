#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::hash::Hash;

/// Elements added to and removed from a set.
#[derive(Debug, Clone)]
pub struct SetDiff<E> {
    additions: HashSet<E>,
    removals: HashSet<E>,
}

impl<E: Eq + Hash> PartialEq for SetDiff<E> {
    fn eq(&self, other: &Self) -> bool {
        self.additions == other.additions && self.removals == other.removals
    }
}

impl<E: Eq + Hash> Eq for SetDiff<E> {}

impl<E: Clone + Eq + Hash> SetDiff<E> {
    #[must_use]
    pub fn new(additions: HashSet<E>, removals: HashSet<E>) -> Self {
        Self {
            additions,
            removals,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(HashSet::new(), HashSet::new())
    }

    /// Diff turning `old` into `new`.
    #[must_use]
    pub fn compute(old: &HashSet<E>, new: &HashSet<E>) -> Self {
        Self {
            additions: new.difference(old).cloned().collect(),
            removals: old.difference(new).cloned().collect(),
        }
    }

    #[must_use]
    pub fn additions(&self) -> &HashSet<E> {
        &self.additions
    }

    #[must_use]
    pub fn removals(&self) -> &HashSet<E> {
        &self.removals
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    /// Replay the edits onto `set`.
    pub fn apply_to(&self, set: &mut HashSet<E>) {
        for removed in &self.removals {
            set.remove(removed);
        }
        set.extend(self.additions.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[u8]) -> HashSet<u8> {
        items.iter().copied().collect()
    }

    #[test]
    fn compute_and_apply() {
        let old = set(&[1, 2, 3]);
        let new = set(&[2, 3, 4, 5]);
        let diff = SetDiff::compute(&old, &new);
        assert_eq!(diff.additions(), &set(&[4, 5]));
        assert_eq!(diff.removals(), &set(&[1]));

        let mut replay = old.clone();
        diff.apply_to(&mut replay);
        assert_eq!(replay, new);
    }

    #[test]
    fn equal_sets_have_empty_diff() {
        let s = set(&[7, 8]);
        assert!(SetDiff::compute(&s, &s).is_empty());
        assert!(SetDiff::<u8>::empty().is_empty());
    }

    /// Containers may hold a diff without restating the element bounds.
    struct Pending<E> {
        diff: Option<SetDiff<E>>,
    }

    #[test]
    fn unbounded_holder_and_equality() {
        let pending = Pending {
            diff: Some(SetDiff::compute(&set(&[1]), &set(&[2]))),
        };
        let expected = SetDiff::new(set(&[2]), set(&[1]));
        assert_eq!(pending.diff, Some(expected));
        assert_ne!(SetDiff::new(set(&[1]), set(&[])), SetDiff::<u8>::empty());
    }
}
