#![forbid(unsafe_code)]

/// Old and new state of a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDiff<T> {
    old: T,
    new: T,
}

impl<T> ValueDiff<T> {
    #[must_use]
    pub fn new(old: T, new: T) -> Self {
        Self { old, new }
    }

    #[must_use]
    pub fn old_value(&self) -> &T {
        &self.old
    }

    #[must_use]
    pub fn new_value(&self) -> &T {
        &self.new
    }

    /// Split into `(old, new)`.
    #[must_use]
    pub fn into_parts(self) -> (T, T) {
        (self.old, self.new)
    }
}

impl<T: PartialEq> ValueDiff<T> {
    /// Whether old and new differ.
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.old != self.new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_and_change_detection() {
        let diff = ValueDiff::new(Some(1), Some(2));
        assert_eq!(diff.old_value(), &Some(1));
        assert_eq!(diff.new_value(), &Some(2));
        assert!(diff.is_change());
        assert!(!ValueDiff::new(3, 3).is_change());
        assert_eq!(ValueDiff::new("a", "b").into_parts(), ("a", "b"));
    }
}
