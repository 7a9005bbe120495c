#![forbid(unsafe_code)]

//! Single-threaded affinity contexts.
//!
//! Every observable is bound to exactly one [`Realm`]. Observables hold `Rc`
//! interiors, so they cannot leave the thread that created them; the realm is
//! the identity that lets containers notice when a detail observable was
//! created against a different context than their own.
//!
//! A thread has a default realm, returned by [`Realm::current()`]. Scoped
//! overrides via [`Realm::push_default()`] replace it until the returned
//! guard is dropped.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

static NEXT_REALM_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static DEFAULT_REALM: Realm = Realm::new("default");
    static OVERRIDES: RefCell<Vec<Realm>> = const { RefCell::new(Vec::new()) };
}

struct RealmInner {
    id: u64,
    name: String,
    thread: ThreadId,
}

/// A single-threaded execution context.
///
/// Cloning a `Realm` creates another handle to the **same** realm; equality
/// is identity.
#[derive(Clone)]
pub struct Realm {
    inner: Rc<RealmInner>,
}

impl Realm {
    /// Create a realm owned by the calling thread.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let id = NEXT_REALM_ID.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        tracing::trace!(realm.id = id, realm.name = %name, "realm created");
        Self {
            inner: Rc::new(RealmInner {
                id,
                name,
                thread: thread::current().id(),
            }),
        }
    }

    /// The calling thread's active default realm, honoring overrides.
    #[must_use]
    pub fn current() -> Self {
        OVERRIDES
            .with(|stack| stack.borrow().last().cloned())
            .unwrap_or_else(|| DEFAULT_REALM.with(Clone::clone))
    }

    /// Make `realm` the default for the calling thread until the guard drops.
    #[must_use = "dropping this guard restores the previous default realm"]
    pub fn push_default(realm: &Self) -> RealmOverride {
        OVERRIDES.with(|stack| stack.borrow_mut().push(realm.clone()));
        RealmOverride {
            realm: realm.clone(),
        }
    }

    /// Unique identifier of this realm.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Human-readable name given at creation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the calling thread is the one this realm is bound to.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.inner.thread == thread::current().id()
    }
}

impl PartialEq for Realm {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Realm {}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

impl fmt::Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.inner.name, self.inner.id)
    }
}

/// RAII guard for a scoped default realm.
#[must_use = "dropping this guard restores the previous default realm"]
pub struct RealmOverride {
    realm: Realm,
}

impl Drop for RealmOverride {
    fn drop(&mut self) {
        let popped = OVERRIDES.with(|stack| stack.borrow_mut().pop());
        if let Some(popped) = popped {
            debug_assert_eq!(popped, self.realm);
        }
    }
}

impl fmt::Debug for RealmOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmOverride")
            .field("realm", &self.realm)
            .finish()
    }
}
