#![forbid(unsafe_code)]

//! Error type shared by every observable operation.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Invariant violation | Disposed master, detail type changed | Constructor returns `Err`; inside a notification the adapter panics |
//! | Unsupported | Structural mutation on a derived view | `Err`, nothing changes |
//! | Disposed | Mutating a disposed writable | `Err`, nothing changes |
//! | Index out of bounds | List index past the end | `Err`, nothing changes |
//! | No such key | Writing a key a derived map does not own | `Err`, nothing changes |

/// Errors from observable operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservableError {
    /// A programmer-error precondition did not hold.
    InvariantViolation(String),
    /// The operation is not defined for this observable.
    Unsupported(&'static str),
    /// The observable was already disposed.
    Disposed,
    /// A list index was outside `0..len` (or `0..=len` for insertion).
    IndexOutOfBounds { index: usize, len: usize },
    /// The key is not part of the map's key set.
    NoSuchKey,
}

impl ObservableError {
    /// Convenience constructor for [`ObservableError::InvariantViolation`].
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }
}

impl std::fmt::Display for ObservableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
            Self::Unsupported(op) => write!(f, "unsupported operation: {op}"),
            Self::Disposed => write!(f, "observable is disposed"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Self::NoSuchKey => write!(f, "key is not present in the key set"),
        }
    }
}

impl std::error::Error for ObservableError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            ObservableError::invariant("boom").to_string(),
            "invariant violation: boom"
        );
        assert_eq!(
            ObservableError::Unsupported("move").to_string(),
            "unsupported operation: move"
        );
        assert_eq!(
            ObservableError::IndexOutOfBounds { index: 4, len: 2 }.to_string(),
            "index 4 out of bounds for length 2"
        );
    }
}
