#![forbid(unsafe_code)]

/// One positional edit of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDiffEntry<E> {
    position: usize,
    addition: bool,
    element: E,
}

impl<E> ListDiffEntry<E> {
    /// `element` inserted at `position`.
    #[must_use]
    pub fn added(position: usize, element: E) -> Self {
        Self {
            position,
            addition: true,
            element,
        }
    }

    /// `element` removed from `position`.
    #[must_use]
    pub fn removed(position: usize, element: E) -> Self {
        Self {
            position,
            addition: false,
            element,
        }
    }

    #[must_use]
    pub fn new(position: usize, addition: bool, element: E) -> Self {
        Self {
            position,
            addition,
            element,
        }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn is_addition(&self) -> bool {
        self.addition
    }

    #[must_use]
    pub fn element(&self) -> &E {
        &self.element
    }
}

/// Ordered sequence of list edits. Entry positions refer to the list as it
/// is after every preceding entry has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDiff<E> {
    entries: Vec<ListDiffEntry<E>>,
}

/// Above this many LCS cells the diff degrades to remove-all/add-all for the
/// differing middle section.
const LCS_CELL_LIMIT: usize = 4 * 1024 * 1024;

impl<E> ListDiff<E> {
    #[must_use]
    pub fn from_entries(entries: Vec<ListDiffEntry<E>>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[ListDiffEntry<E>] {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<ListDiffEntry<E>> {
        self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<E: Clone + PartialEq> ListDiff<E> {
    /// Minimal diff turning `old` into `new`.
    ///
    /// Common prefix and suffix are skipped; the differing middle is aligned
    /// by longest common subsequence, so elements present in both snapshots
    /// in the same relative order are left in place.
    #[must_use]
    pub fn compute(old: &[E], new: &[E]) -> Self {
        let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
        let (old_rest, new_rest) = (&old[prefix..], &new[prefix..]);
        let suffix = old_rest
            .iter()
            .rev()
            .zip(new_rest.iter().rev())
            .take_while(|(a, b)| a == b)
            .count();
        let a = &old_rest[..old_rest.len() - suffix];
        let b = &new_rest[..new_rest.len() - suffix];

        let mut entries = Vec::new();
        if (a.len() + 1).saturating_mul(b.len() + 1) > LCS_CELL_LIMIT {
            for element in a {
                entries.push(ListDiffEntry::removed(prefix, element.clone()));
            }
            for (offset, element) in b.iter().enumerate() {
                entries.push(ListDiffEntry::added(prefix + offset, element.clone()));
            }
            return Self { entries };
        }

        let table = LcsTable::build(a, b);
        let (mut i, mut j, mut position) = (0, 0, prefix);
        while i < a.len() || j < b.len() {
            if i < a.len() && j < b.len() && a[i] == b[j] {
                i += 1;
                j += 1;
                position += 1;
            } else if j == b.len() || (i < a.len() && table.at(i + 1, j) >= table.at(i, j + 1)) {
                entries.push(ListDiffEntry::removed(position, a[i].clone()));
                i += 1;
            } else {
                entries.push(ListDiffEntry::added(position, b[j].clone()));
                position += 1;
                j += 1;
            }
        }
        Self { entries }
    }

    /// Replay the edits onto `list`.
    ///
    /// # Panics
    ///
    /// Panics if an entry position is out of range for `list`, which means
    /// the diff was computed against a different snapshot.
    pub fn apply_to(&self, list: &mut Vec<E>) {
        for entry in &self.entries {
            if entry.addition {
                list.insert(entry.position, entry.element.clone());
            } else {
                let removed = list.remove(entry.position);
                debug_assert!(removed == entry.element, "list diff applied to a foreign snapshot");
            }
        }
    }
}

/// Suffix LCS lengths: `at(i, j)` is the LCS of `a[i..]` and `b[j..]`.
struct LcsTable {
    width: usize,
    cells: Vec<u32>,
}

impl LcsTable {
    fn build<E: PartialEq>(a: &[E], b: &[E]) -> Self {
        let width = b.len() + 1;
        let mut cells = vec![0u32; (a.len() + 1) * width];
        for i in (0..a.len()).rev() {
            for j in (0..b.len()).rev() {
                cells[i * width + j] = if a[i] == b[j] {
                    cells[(i + 1) * width + j + 1] + 1
                } else {
                    cells[(i + 1) * width + j].max(cells[i * width + j + 1])
                };
            }
        }
        Self { width, cells }
    }

    fn at(&self, i: usize, j: usize) -> u32 {
        self.cells[i * self.width + j]
    }
}
