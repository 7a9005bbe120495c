#![forbid(unsafe_code)]

//! Checks and guards shared by the detail adapters.

use std::cell::Cell;

use tether_core::{ObservableError, Realm, ValueType};
#[cfg(feature = "tracing")]
use tether_core::ObservableId;

/// Emit a warning when a detail observable lives in a different realm than
/// the adapter that owns it. Execution continues either way.
pub fn warn_if_different_realms(outer: &Realm, detail: &Realm) {
    if outer != detail {
        tracing::warn!(
            outer_realm = %outer,
            detail_realm = %detail,
            "detail observable realm differs from its container realm"
        );
    }
}

/// Fail unless `actual` is the detail type fixed at construction. An adapter
/// constructed without a detail type accepts anything.
pub(crate) fn check_detail_type(
    expected: Option<&ValueType>,
    actual: Option<ValueType>,
    what: &str,
) -> Result<(), ObservableError> {
    match expected {
        Some(expected) if actual.as_ref() != Some(expected) => Err(ObservableError::invariant(
            format!(
                "cannot change {what} type in a nested observable (expected {expected}, got {})",
                actual.map_or_else(|| "untyped".to_owned(), |t| t.to_string())
            ),
        )),
        _ => Ok(()),
    }
}

/// Precondition for every adapter constructor.
pub(crate) fn check_master_live(disposed: bool) -> Result<(), ObservableError> {
    if disposed {
        Err(ObservableError::invariant("master observable is already disposed"))
    } else {
        Ok(())
    }
}

/// Holds an adapter's `updating` flag for the duration of a master-driven
/// replacement, clearing it on every exit path.
pub(crate) struct UpdateGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> UpdateGuard<'a> {
    pub(crate) fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

#[cfg(feature = "tracing")]
pub(crate) fn log_detail(event: &'static str, container: ObservableId, detail: ObservableId) {
    tracing::debug!(message = "detail.lifecycle", event, %container, %detail);
}

#[cfg(feature = "tracing")]
pub(crate) fn log_disposed(adapter: &'static str, container: ObservableId) {
    tracing::debug!(message = "detail.adapter_disposed", adapter, %container);
}
