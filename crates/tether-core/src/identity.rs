#![forbid(unsafe_code)]

//! Containers keyed by allocation identity.
//!
//! Two master elements that compare equal by value may still be distinct
//! objects occupying distinct list positions. [`IdentityMap`] and
//! [`IdentitySet`] key on the address of the shared allocation instead of on
//! `Eq`/`Hash`.
//!
//! The containers own a clone of every key they hold, so an address cannot be
//! freed and reused by another allocation while it is present.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use ahash::AHashMap;

/// Address of a shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(usize);

/// Types whose values have a reference identity.
pub trait Identity {
    /// Identity of this handle's allocation. Clones of the same handle share
    /// it.
    fn identity(&self) -> IdentityKey;

    /// Whether `self` and `other` are the same object.
    fn same_identity(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl<T: ?Sized> Identity for Rc<T> {
    fn identity(&self) -> IdentityKey {
        IdentityKey(Rc::as_ptr(self).cast::<()>().addr())
    }
}

impl<T: ?Sized> Identity for Arc<T> {
    fn identity(&self) -> IdentityKey {
        IdentityKey(Arc::as_ptr(self).cast::<()>().addr())
    }
}

/// Map keyed by reference identity.
pub struct IdentityMap<K, V> {
    entries: AHashMap<IdentityKey, (K, V)>,
}

impl<K: Identity, V> IdentityMap<K, V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: AHashMap::new(),
        }
    }

    /// Insert `value` under the identity of `key`, returning the previous
    /// value for that identity.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries
            .insert(key.identity(), (key, value))
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(&key.identity()).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(&key.identity()).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(&key.identity()).map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(&key.identity())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.values().map(|(k, v)| (k, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.values_mut().map(|(_, v)| v)
    }

    /// Remove and return every entry.
    pub fn drain(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
        self.entries.drain().map(|(_, entry)| entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: Identity, V> Default for IdentityMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for IdentityMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityMap")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Set keyed by reference identity.
pub struct IdentitySet<K> {
    inner: IdentityMap<K, ()>,
}

impl<K: Identity> IdentitySet<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: IdentityMap::new(),
        }
    }

    /// Insert `key`; returns `true` if its identity was not yet present.
    pub fn insert(&mut self, key: K) -> bool {
        self.inner.insert(key, ()).is_none()
    }

    /// Remove `key`; returns `true` if its identity was present.
    pub fn remove(&mut self, key: &K) -> bool {
        self.inner.remove(key).is_some()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.inner.iter().map(|(k, ())| k)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl<K: Identity> Default for IdentitySet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for IdentitySet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySet")
            .field("len", &self.inner.entries.len())
            .finish()
    }
}
