#![forbid(unsafe_code)]

//! A list of detail values, one per element of a master list.
//!
//! # Architecture
//!
//! The adapter mirrors the master list position by position. Every distinct
//! master element (by identity, see [`Identity`]) owns exactly one detail
//! value observable, shared by all positions holding that element and
//! reference-counted by the number of such positions.
//!
//! Detail listeners exist only while the adapter itself is observed: the
//! first change or stale listener hooks every current detail, the last one
//! unhooks them all and forgets which details were stale.
//!
//! # Invariants
//!
//! 1. `details[i]` is the detail of `master[i]` for every position.
//! 2. An entry's reference count equals the number of positions holding its
//!    master element; the detail is disposed when it reaches zero.
//! 3. A detail change fires one diff with a removal/addition pair at every
//!    position sharing that detail.
//! 4. Structural mutation goes through the master list; here it fails with
//!    [`ObservableError::Unsupported`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tether_core::{
    ChangeSupport, Identity, IdentityMap, IdentitySet, ListDiff, ListDiffEntry, ListRef,
    Observable, ObservableError, ObservableId, ObservableList, ObservableTracker, Realm,
    Subscription, ValueDiff, ValueRef, ValueType,
};

use crate::helper;

/// One detail shared by every position holding the same master element.
struct DetailEntry<E> {
    detail: ValueRef<E>,
    master_reference_count: usize,
    /// Change and stale subscriptions, present while the adapter is observed.
    subs: Vec<Subscription>,
}

struct State<M, E> {
    details: Vec<ValueRef<E>>,
    master_detail_map: IdentityMap<M, DetailEntry<E>>,
    stale_details: IdentitySet<ValueRef<E>>,
}

struct Inner<M, E> {
    id: ObservableId,
    realm: Realm,
    master: ListRef<M>,
    factory: Box<dyn Fn(&M) -> ValueRef<E>>,
    detail_type: Option<ValueType>,
    support: ChangeSupport<ListDiff<E>>,
    state: RefCell<State<M, E>>,
    master_subs: RefCell<Vec<Subscription>>,
    hooked: Cell<bool>,
    disposed: Cell<bool>,
}

/// Observable list of the detail values of a master list's elements.
pub struct ListDetailValueObservableList<M, E> {
    inner: Rc<Inner<M, E>>,
}

impl<M, E> Clone for ListDetailValueObservableList<M, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<M, E> ListDetailValueObservableList<M, E>
where
    M: Identity + Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    /// Create the adapter with one detail per distinct element currently in
    /// `master`. Nothing is fired.
    ///
    /// # Errors
    ///
    /// [`ObservableError::InvariantViolation`] if `master` is disposed.
    pub fn new<F>(
        master: ListRef<M>,
        factory: F,
        detail_type: Option<ValueType>,
    ) -> Result<Self, ObservableError>
    where
        F: Fn(&M) -> ValueRef<E> + 'static,
    {
        helper::check_master_live(master.is_disposed())?;
        let inner = Rc::new(Inner {
            id: ObservableId::next(),
            realm: master.realm(),
            master,
            factory: Box::new(factory),
            detail_type,
            support: ChangeSupport::new(),
            state: RefCell::new(State {
                details: Vec::new(),
                master_detail_map: IdentityMap::new(),
                stale_details: IdentitySet::new(),
            }),
            master_subs: RefCell::new(Vec::new()),
            hooked: Cell::new(false),
            disposed: Cell::new(false),
        });
        let list = Self { inner };
        {
            let _ignore = ObservableTracker::ignore();
            let initial = ListDiff::compute(&[], &list.inner.master.to_vec());
            list.master_changed(&initial);
        }
        list.attach_master();
        list.install_demand_hooks();
        Ok(list)
    }

    #[must_use]
    pub fn master(&self) -> ListRef<M> {
        Rc::clone(&self.inner.master)
    }

    /// Number of distinct details currently alive.
    #[must_use]
    pub fn detail_count(&self) -> usize {
        self.inner.state.borrow().master_detail_map.len()
    }

    /// The detail observable at `index`.
    #[must_use]
    pub fn detail_at(&self, index: usize) -> Option<ValueRef<E>> {
        self.inner.state.borrow().details.get(index).cloned()
    }

    #[must_use]
    pub fn has_listeners(&self) -> bool {
        self.inner.support.has_listeners()
    }

    #[must_use]
    pub fn share(&self) -> ListRef<E> {
        Rc::new(self.clone())
    }

    fn downgrade(&self) -> Weak<Inner<M, E>> {
        Rc::downgrade(&self.inner)
    }

    fn from_weak(weak: &Weak<Inner<M, E>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn attach_master(&self) {
        let weak = self.downgrade();
        let change = self.inner.master.subscribe(Box::new(move |diff: &ListDiff<M>| {
            if let Some(list) = Self::from_weak(&weak) {
                let _ignore = ObservableTracker::ignore();
                list.master_changed(diff);
            }
        }));
        let weak = self.downgrade();
        let stale = self.inner.master.subscribe_stale(Box::new(move || {
            if let Some(list) = Self::from_weak(&weak)
                && !list.has_stale_details()
            {
                list.inner.support.fire_stale();
            }
        }));
        let weak = self.downgrade();
        let dispose = self.inner.master.subscribe_dispose(Box::new(move || {
            if let Some(list) = Self::from_weak(&weak) {
                list.dispose();
            }
        }));
        self.inner
            .master_subs
            .borrow_mut()
            .extend([change, stale, dispose]);
    }

    fn install_demand_hooks(&self) {
        let (first, last) = (self.downgrade(), self.downgrade());
        self.inner.support.set_demand_hooks(
            move || {
                if let Some(list) = Self::from_weak(&first) {
                    list.hook_all();
                }
            },
            move || {
                if let Some(list) = Self::from_weak(&last) {
                    list.unhook_all();
                }
            },
        );
    }

    /// Apply one master list diff, entry by entry, to the detail list.
    fn master_changed(&self, diff: &ListDiff<M>) {
        if self.inner.disposed.get() {
            return;
        }
        let observed = self.inner.support.has_listeners();
        let mut out = Vec::new();
        for entry in diff.entries() {
            let position = entry.position();
            if entry.is_addition() {
                let detail = self.acquire(entry.element());
                self.inner
                    .state
                    .borrow_mut()
                    .details
                    .insert(position, Rc::clone(&detail));
                if observed {
                    out.push(ListDiffEntry::added(position, detail.get()));
                }
            } else {
                let detail = self.inner.state.borrow_mut().details.remove(position);
                if observed {
                    out.push(ListDiffEntry::removed(position, detail.get()));
                }
                self.release(entry.element());
            }
        }
        if !out.is_empty() {
            self.inner.support.fire_change(&ListDiff::from_entries(out));
        }
    }

    /// The shared detail for `element`, creating it on first occurrence.
    fn acquire(&self, element: &M) -> ValueRef<E> {
        {
            let mut state = self.inner.state.borrow_mut();
            if let Some(entry) = state.master_detail_map.get_mut(element) {
                entry.master_reference_count += 1;
                return Rc::clone(&entry.detail);
            }
        }
        let detail = (self.inner.factory)(element);
        #[cfg(feature = "tracing")]
        helper::log_detail("created", self.inner.id, detail.id());
        helper::warn_if_different_realms(&self.inner.realm, &detail.realm());
        let subs = if self.inner.hooked.get() {
            let subs = self.hook_detail(&detail);
            if detail.is_stale() {
                self.inner
                    .state
                    .borrow_mut()
                    .stale_details
                    .insert(Rc::clone(&detail));
            }
            subs
        } else {
            Vec::new()
        };
        self.inner.state.borrow_mut().master_detail_map.insert(
            element.clone(),
            DetailEntry {
                detail: Rc::clone(&detail),
                master_reference_count: 1,
                subs,
            },
        );
        detail
    }

    /// Drop one reference to `element`'s detail, disposing it on the last.
    fn release(&self, element: &M) {
        let retired = {
            let mut state = self.inner.state.borrow_mut();
            let Some(entry) = state.master_detail_map.get_mut(element) else {
                return;
            };
            entry.master_reference_count -= 1;
            if entry.master_reference_count > 0 {
                return;
            }
            let entry = state.master_detail_map.remove(element);
            if let Some(entry) = &entry {
                state.stale_details.remove(&entry.detail);
            }
            entry
        };
        if let Some(DetailEntry { detail, subs, .. }) = retired {
            drop(subs);
            detail.dispose();
            #[cfg(feature = "tracing")]
            helper::log_detail("disposed", self.inner.id, detail.id());
        }
    }

    fn hook_detail(&self, detail: &ValueRef<E>) -> Vec<Subscription> {
        let weak = self.downgrade();
        let source = Rc::downgrade(detail);
        let change = detail.subscribe(Box::new(move |diff: &ValueDiff<E>| {
            if let (Some(list), Some(detail)) = (Self::from_weak(&weak), source.upgrade()) {
                list.detail_changed(&detail, diff);
            }
        }));
        let weak = self.downgrade();
        let source = Rc::downgrade(detail);
        let stale = detail.subscribe_stale(Box::new(move || {
            if let (Some(list), Some(detail)) = (Self::from_weak(&weak), source.upgrade()) {
                list.detail_stale(detail);
            }
        }));
        vec![change, stale]
    }

    fn hook_all(&self) {
        if self.inner.disposed.get() || self.inner.hooked.replace(true) {
            return;
        }
        let _ignore = ObservableTracker::ignore();
        let details: Vec<ValueRef<E>> = self
            .inner
            .state
            .borrow()
            .master_detail_map
            .values()
            .map(|entry| Rc::clone(&entry.detail))
            .collect();
        for detail in details {
            let subs = self.hook_detail(&detail);
            let stale = detail.is_stale();
            let mut state = self.inner.state.borrow_mut();
            if stale {
                state.stale_details.insert(Rc::clone(&detail));
            }
            if let Some(entry) = state
                .master_detail_map
                .values_mut()
                .find(|entry| entry.detail.same_identity(&detail))
            {
                entry.subs = subs;
            }
        }
    }

    fn unhook_all(&self) {
        if !self.inner.hooked.replace(false) {
            return;
        }
        let subs: Vec<Subscription> = {
            let mut state = self.inner.state.borrow_mut();
            state.stale_details.clear();
            state
                .master_detail_map
                .values_mut()
                .flat_map(|entry| std::mem::take(&mut entry.subs))
                .collect()
        };
        drop(subs);
    }

    /// Fire removal/addition pairs at every position holding `detail`.
    fn detail_changed(&self, detail: &ValueRef<E>, diff: &ValueDiff<E>) {
        let positions: Vec<usize> = {
            let mut state = self.inner.state.borrow_mut();
            state.stale_details.remove(detail);
            state
                .details
                .iter()
                .enumerate()
                .filter(|(_, d)| d.same_identity(detail))
                .map(|(i, _)| i)
                .collect()
        };
        if positions.is_empty() {
            return;
        }
        let entries = positions
            .into_iter()
            .flat_map(|i| {
                [
                    ListDiffEntry::removed(i, diff.old_value().clone()),
                    ListDiffEntry::added(i, diff.new_value().clone()),
                ]
            })
            .collect();
        self.inner.support.fire_change(&ListDiff::from_entries(entries));
    }

    /// Drop details that went fresh without a value change, then report
    /// whether any stale detail remains.
    fn has_stale_details(&self) -> bool {
        let _ignore = ObservableTracker::ignore();
        let mut state = self.inner.state.borrow_mut();
        let fresh: Vec<ValueRef<E>> = state
            .stale_details
            .iter()
            .filter(|d| !d.is_stale())
            .cloned()
            .collect();
        for detail in &fresh {
            state.stale_details.remove(detail);
        }
        !state.stale_details.is_empty()
    }

    fn detail_stale(&self, detail: ValueRef<E>) {
        let was_stale = {
            let _ignore = ObservableTracker::ignore();
            self.inner.master.is_stale()
        } || self.has_stale_details();
        self.inner.state.borrow_mut().stale_details.insert(detail);
        if !was_stale {
            self.inner.support.fire_stale();
        }
    }

    fn getter_called(&self) {
        ObservableTracker::getter_called(self.inner.id);
    }

    fn detail_or_err(&self, index: usize) -> Result<ValueRef<E>, ObservableError> {
        let state = self.inner.state.borrow();
        state
            .details
            .get(index)
            .cloned()
            .ok_or(ObservableError::IndexOutOfBounds {
                index,
                len: state.details.len(),
            })
    }
}

impl<M, E> Observable for ListDetailValueObservableList<M, E>
where
    M: Identity + Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    fn id(&self) -> ObservableId {
        self.inner.id
    }

    fn realm(&self) -> Realm {
        self.inner.realm.clone()
    }

    fn is_stale(&self) -> bool {
        self.getter_called();
        let _ignore = ObservableTracker::ignore();
        if self.inner.master.is_stale() {
            return true;
        }
        if self.inner.hooked.get() {
            self.has_stale_details()
        } else {
            self.inner
                .state
                .borrow()
                .master_detail_map
                .values()
                .any(|entry| entry.detail.is_stale())
        }
    }

    fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Dispose every detail still referenced, once each, irrespective of its
    /// reference count.
    fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.hooked.set(false);
        let master_subs = std::mem::take(&mut *self.inner.master_subs.borrow_mut());
        drop(master_subs);
        let entries: Vec<DetailEntry<E>> = {
            let mut state = self.inner.state.borrow_mut();
            state.details.clear();
            state.stale_details.clear();
            state.master_detail_map.drain().map(|(_, entry)| entry).collect()
        };
        for DetailEntry { detail, subs, .. } in entries {
            drop(subs);
            detail.dispose();
            #[cfg(feature = "tracing")]
            helper::log_detail("disposed", self.inner.id, detail.id());
        }
        #[cfg(feature = "tracing")]
        helper::log_disposed("ListDetailValueObservableList", self.inner.id);
        self.inner.support.fire_dispose();
        self.inner.support.clear();
    }

    fn subscribe_stale(&self, listener: Box<dyn Fn()>) -> Subscription {
        self.inner.support.subscribe_stale(listener)
    }

    fn subscribe_dispose(&self, listener: Box<dyn Fn()>) -> Subscription {
        self.inner.support.subscribe_dispose(listener)
    }
}

impl<M, E> ObservableList<E> for ListDetailValueObservableList<M, E>
where
    M: Identity + Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    fn element_type(&self) -> Option<ValueType> {
        self.inner.detail_type.clone()
    }

    fn len(&self) -> usize {
        self.getter_called();
        self.inner.state.borrow().details.len()
    }

    fn get(&self, index: usize) -> Option<E> {
        self.getter_called();
        let detail = self.inner.state.borrow().details.get(index).cloned()?;
        let _ignore = ObservableTracker::ignore();
        Some(detail.get())
    }

    fn to_vec(&self) -> Vec<E> {
        self.getter_called();
        let details = self.inner.state.borrow().details.clone();
        let _ignore = ObservableTracker::ignore();
        details.iter().map(|d| d.get()).collect()
    }

    fn add(&self, _element: E) -> Result<(), ObservableError> {
        Err(ObservableError::Unsupported("add"))
    }

    fn insert(&self, _index: usize, _element: E) -> Result<(), ObservableError> {
        Err(ObservableError::Unsupported("insert"))
    }

    /// Write `element` into the detail at `index`; the list shape is kept.
    fn set(&self, index: usize, element: E) -> Result<E, ObservableError> {
        let detail = self.detail_or_err(index)?;
        let _ignore = ObservableTracker::ignore();
        let old = detail.get();
        detail.set(element)?;
        Ok(old)
    }

    fn remove_at(&self, _index: usize) -> Result<E, ObservableError> {
        Err(ObservableError::Unsupported("remove_at"))
    }

    fn remove(&self, _element: &E) -> Result<bool, ObservableError> {
        Err(ObservableError::Unsupported("remove"))
    }

    fn move_element(&self, _old_index: usize, _new_index: usize) -> Result<E, ObservableError> {
        Err(ObservableError::Unsupported("move"))
    }

    fn clear(&self) -> Result<(), ObservableError> {
        Err(ObservableError::Unsupported("clear"))
    }

    fn remove_all(&self, _elements: &[E]) -> Result<bool, ObservableError> {
        Err(ObservableError::Unsupported("remove_all"))
    }

    fn retain_all(&self, _elements: &[E]) -> Result<bool, ObservableError> {
        Err(ObservableError::Unsupported("retain_all"))
    }

    fn subscribe(&self, listener: Box<dyn Fn(&ListDiff<E>)>) -> Subscription {
        self.inner.support.subscribe(listener)
    }
}

impl<M, E> fmt::Debug for ListDetailValueObservableList<M, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListDetailValueObservableList")
            .field("id", &self.inner.id)
            .field("hooked", &self.inner.hooked.get())
            .field("disposed", &self.inner.disposed.get())
            .finish_non_exhaustive()
    }
}
