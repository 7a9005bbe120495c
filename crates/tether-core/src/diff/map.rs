#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Keys added, removed and changed between two map snapshots, with the old
/// and new value of each.
#[derive(Debug, Clone)]
pub struct MapDiff<K, V> {
    added: HashMap<K, V>,
    removed: HashMap<K, V>,
    changed: HashMap<K, (V, V)>,
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for MapDiff<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.added == other.added && self.removed == other.removed && self.changed == other.changed
    }
}

impl<K: Eq + Hash, V: Eq> Eq for MapDiff<K, V> {}

impl<K: Clone + Eq + Hash, V: Clone + PartialEq> MapDiff<K, V> {
    /// Assemble a diff. `changed` maps each key to `(old, new)`.
    #[must_use]
    pub fn new(added: HashMap<K, V>, removed: HashMap<K, V>, changed: HashMap<K, (V, V)>) -> Self {
        Self {
            added,
            removed,
            changed,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(HashMap::new(), HashMap::new(), HashMap::new())
    }

    /// Diff turning `old` into `new`.
    #[must_use]
    pub fn compute(old: &HashMap<K, V>, new: &HashMap<K, V>) -> Self {
        let mut diff = Self::empty();
        for (key, old_value) in old {
            match new.get(key) {
                None => {
                    diff.removed.insert(key.clone(), old_value.clone());
                }
                Some(new_value) if new_value != old_value => {
                    diff.changed
                        .insert(key.clone(), (old_value.clone(), new_value.clone()));
                }
                Some(_) => {}
            }
        }
        for (key, new_value) in new {
            if !old.contains_key(key) {
                diff.added.insert(key.clone(), new_value.clone());
            }
        }
        diff
    }

    /// A diff describing one key whose value went from `old` to `new`.
    /// `None` on either side means the key was absent.
    #[must_use]
    pub fn single_change(key: K, old: Option<V>, new: Option<V>) -> Self {
        let mut diff = Self::empty();
        match (old, new) {
            (None, Some(new)) => {
                diff.added.insert(key, new);
            }
            (Some(old), None) => {
                diff.removed.insert(key, old);
            }
            (Some(old), Some(new)) => {
                diff.changed.insert(key, (old, new));
            }
            (None, None) => {}
        }
        diff
    }

    #[must_use]
    pub fn added_keys(&self) -> HashSet<K> {
        self.added.keys().cloned().collect()
    }

    #[must_use]
    pub fn removed_keys(&self) -> HashSet<K> {
        self.removed.keys().cloned().collect()
    }

    #[must_use]
    pub fn changed_keys(&self) -> HashSet<K> {
        self.changed.keys().cloned().collect()
    }

    /// Value before the change, for removed and changed keys.
    #[must_use]
    pub fn old_value(&self, key: &K) -> Option<&V> {
        self.removed
            .get(key)
            .or_else(|| self.changed.get(key).map(|(old, _)| old))
    }

    /// Value after the change, for added and changed keys.
    #[must_use]
    pub fn new_value(&self, key: &K) -> Option<&V> {
        self.added
            .get(key)
            .or_else(|| self.changed.get(key).map(|(_, new)| new))
    }

    #[must_use]
    pub fn added(&self) -> &HashMap<K, V> {
        &self.added
    }

    #[must_use]
    pub fn removed(&self) -> &HashMap<K, V> {
        &self.removed
    }

    #[must_use]
    pub fn changed(&self) -> &HashMap<K, (V, V)> {
        &self.changed
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Replay the edits onto `map`.
    pub fn apply_to(&self, map: &mut HashMap<K, V>) {
        for key in self.removed.keys() {
            map.remove(key);
        }
        for (key, (_, new)) in &self.changed {
            map.insert(key.clone(), new.clone());
        }
        for (key, value) in &self.added {
            map.insert(key.clone(), value.clone());
        }
    }
}
