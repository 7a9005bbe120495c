#![forbid(unsafe_code)]

//! Listener lists and RAII subscriptions.
//!
//! [`ChangeSupport<D>`] holds the change listeners (receiving `&D`), stale
//! listeners and dispose listeners of one observable. Registering a listener
//! returns a [`Subscription`]; dropping it removes the listener immediately.
//!
//! Observables that only want to do work while somebody is watching install
//! *demand hooks*: the first hook runs when the change + stale listener count
//! goes from zero to one, the last hook when it drops back to zero.
//!
//! # Invariants
//!
//! 1. Listeners are notified in registration order.
//! 2. Notification works on a snapshot: listeners added during a notification
//!    are not called for it, listeners removed during it may still be called
//!    once.
//! 3. Demand hooks fire only on the 0 → 1 and 1 → 0 transitions.
//! 4. After [`ChangeSupport::clear()`] no listener fires and outstanding
//!    subscriptions become inert.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// RAII guard that removes a listener when dropped.
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Create a subscription that runs `cancel` when released.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that releases nothing.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Release the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct Slots<F: ?Sized> {
    entries: Vec<(u64, Rc<F>)>,
}

impl<F: ?Sized> Slots<F> {
    const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn snapshot(&self) -> Vec<Rc<F>> {
        self.entries.iter().map(|(_, f)| Rc::clone(f)).collect()
    }

    fn take(&mut self, id: u64) -> Option<Rc<F>> {
        let index = self.entries.iter().position(|(entry_id, _)| *entry_id == id)?;
        Some(self.entries.remove(index).1)
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Change,
    Stale,
    Dispose,
}

struct DemandHooks {
    first: Rc<dyn Fn()>,
    last: Rc<dyn Fn()>,
}

struct SupportInner<D> {
    next_id: Cell<u64>,
    change: RefCell<Slots<dyn Fn(&D)>>,
    stale: RefCell<Slots<dyn Fn()>>,
    dispose: RefCell<Slots<dyn Fn()>>,
    hooks: RefCell<Option<DemandHooks>>,
}

impl<D> SupportInner<D> {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn demand_count(&self) -> usize {
        self.change.borrow().entries.len() + self.stale.borrow().entries.len()
    }

    fn first_hook(&self) -> Option<Rc<dyn Fn()>> {
        self.hooks.borrow().as_ref().map(|h| Rc::clone(&h.first))
    }

    fn last_hook(&self) -> Option<Rc<dyn Fn()>> {
        self.hooks.borrow().as_ref().map(|h| Rc::clone(&h.last))
    }

    fn remove(&self, kind: Kind, id: u64) {
        // The removed closure is dropped only after the slot borrow ends: it
        // may own subscriptions on this very support.
        let removed = match kind {
            Kind::Change => release(&self.change, id),
            Kind::Stale => release(&self.stale, id),
            Kind::Dispose => release(&self.dispose, id),
        };
        if removed
            && !matches!(kind, Kind::Dispose)
            && self.demand_count() == 0
            && let Some(last) = self.last_hook()
        {
            last();
        }
    }
}

fn release<F: ?Sized>(slots: &RefCell<Slots<F>>, id: u64) -> bool {
    let taken = slots.borrow_mut().take(id);
    taken.is_some()
}

/// Listener bookkeeping for one observable whose change events carry `D`.
///
/// Cloning creates another handle to the same listener lists.
pub struct ChangeSupport<D> {
    inner: Rc<SupportInner<D>>,
}

impl<D> Clone for ChangeSupport<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<D: 'static> ChangeSupport<D> {
    /// Create empty listener lists.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SupportInner {
                next_id: Cell::new(0),
                change: RefCell::new(Slots::new()),
                stale: RefCell::new(Slots::new()),
                dispose: RefCell::new(Slots::new()),
                hooks: RefCell::new(None),
            }),
        }
    }

    /// Install demand hooks. `first` runs when the first change or stale
    /// listener is added, `last` when the last one is removed.
    pub fn set_demand_hooks(&self, first: impl Fn() + 'static, last: impl Fn() + 'static) {
        *self.inner.hooks.borrow_mut() = Some(DemandHooks {
            first: Rc::new(first),
            last: Rc::new(last),
        });
    }

    /// Register a change listener.
    pub fn subscribe(&self, listener: Box<dyn Fn(&D)>) -> Subscription {
        let id = self.inner.next_id();
        let was_idle = self.inner.demand_count() == 0;
        self.inner
            .change
            .borrow_mut()
            .entries
            .push((id, Rc::from(listener)));
        self.after_demand_added(was_idle);
        self.cancel_for(Kind::Change, id)
    }

    /// Register a stale listener.
    pub fn subscribe_stale(&self, listener: Box<dyn Fn()>) -> Subscription {
        let id = self.inner.next_id();
        let was_idle = self.inner.demand_count() == 0;
        self.inner
            .stale
            .borrow_mut()
            .entries
            .push((id, Rc::from(listener)));
        self.after_demand_added(was_idle);
        self.cancel_for(Kind::Stale, id)
    }

    /// Register a dispose listener. Dispose listeners do not count as demand.
    pub fn subscribe_dispose(&self, listener: Box<dyn Fn()>) -> Subscription {
        let id = self.inner.next_id();
        self.inner
            .dispose
            .borrow_mut()
            .entries
            .push((id, Rc::from(listener)));
        self.cancel_for(Kind::Dispose, id)
    }

    /// Notify change listeners.
    pub fn fire_change(&self, diff: &D) {
        let listeners = self.inner.change.borrow().snapshot();
        for listener in listeners {
            listener(diff);
        }
    }

    /// Notify stale listeners.
    pub fn fire_stale(&self) {
        let listeners = self.inner.stale.borrow().snapshot();
        for listener in listeners {
            listener();
        }
    }

    /// Notify dispose listeners.
    pub fn fire_dispose(&self) {
        let listeners = self.inner.dispose.borrow().snapshot();
        for listener in listeners {
            listener();
        }
    }

    /// Whether any change or stale listener is registered.
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        self.inner.demand_count() > 0
    }

    /// Number of registered change listeners.
    #[must_use]
    pub fn change_listener_count(&self) -> usize {
        self.inner.change.borrow().entries.len()
    }

    /// Drop every listener and the demand hooks without running them.
    pub fn clear(&self) {
        let change = std::mem::take(&mut self.inner.change.borrow_mut().entries);
        let stale = std::mem::take(&mut self.inner.stale.borrow_mut().entries);
        let dispose = std::mem::take(&mut self.inner.dispose.borrow_mut().entries);
        let hooks = self.inner.hooks.borrow_mut().take();
        // Listener closures may own subscriptions on this support; release
        // them only after every borrow is gone.
        drop((change, stale, dispose, hooks));
    }

    fn after_demand_added(&self, was_idle: bool) {
        if was_idle && let Some(first) = self.inner.first_hook() {
            first();
        }
    }

    fn cancel_for(&self, kind: Kind, id: u64) -> Subscription {
        let weak: Weak<SupportInner<D>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(kind, id);
            }
        })
    }
}

impl<D: 'static> Default for ChangeSupport<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for ChangeSupport<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSupport")
            .field("change", &self.inner.change.borrow().entries.len())
            .field("stale", &self.inner.stale.borrow().entries.len())
            .field("dispose", &self.inner.dispose.borrow().entries.len())
            .finish()
    }
}
