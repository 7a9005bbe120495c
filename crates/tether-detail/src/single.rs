#![forbid(unsafe_code)]

//! State machine shared by the single-master adapters.
//!
//! A [`SingleMaster`] follows one master value. Whenever the master changes
//! it disposes the current inner detail, asks the factory for the next one,
//! checks its declared type, subscribes to it, and fires one synthesized diff
//! between the old and new detail snapshots. Changes coming from the inner
//! detail itself are forwarded as they are, except while a replacement is in
//! progress.
//!
//! What differs between the value, list, set and map adapters (snapshot
//! type, diff type, how to subscribe) is captured by [`DetailHandle`].

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::rc::{Rc, Weak};

use tether_core::{
    ChangeSupport, ListDiff, ListRef, MapDiff, MapRef, ObservableError, ObservableId,
    ObservableTracker, Realm, SetDiff, SetRef, Subscription, ValueDiff, ValueRef, ValueType,
};

use crate::helper::{self, UpdateGuard};

/// A shared handle to an inner detail observable.
pub(crate) trait DetailHandle: Clone + 'static {
    /// Change event of the inner detail.
    type Diff: 'static;
    /// Snapshot taken before and after a replacement.
    type Snapshot;
    /// Change event of the adapter.
    type Out: 'static;

    /// Adapter name, for diagnostics.
    #[cfg(feature = "tracing")]
    const ADAPTER: &'static str;
    /// What the fixed detail type describes.
    const KIND: &'static str;

    #[cfg(feature = "tracing")]
    fn detail_id(&self) -> ObservableId;
    fn detail_realm(&self) -> Realm;
    fn detail_type(&self) -> Option<ValueType>;
    fn detail_is_stale(&self) -> bool;
    fn dispose_detail(&self);
    fn on_change(&self, listener: Box<dyn Fn(&Self::Diff)>) -> Subscription;
    fn on_stale(&self, listener: Box<dyn Fn()>) -> Subscription;

    fn snapshot(detail: Option<&Self>) -> Self::Snapshot;
    fn synthesize(old: Self::Snapshot, new: Self::Snapshot) -> Self::Out;
    fn forward(diff: &Self::Diff) -> Self::Out;
}

macro_rules! observable_handle {
    () => {
        #[cfg(feature = "tracing")]
        fn detail_id(&self) -> ObservableId {
            self.id()
        }

        fn detail_realm(&self) -> Realm {
            self.realm()
        }

        fn detail_is_stale(&self) -> bool {
            self.is_stale()
        }

        fn dispose_detail(&self) {
            self.dispose();
        }

        fn on_change(&self, listener: Box<dyn Fn(&Self::Diff)>) -> Subscription {
            self.subscribe(listener)
        }

        fn on_stale(&self, listener: Box<dyn Fn()>) -> Subscription {
            self.subscribe_stale(listener)
        }
    };
}

impl<T: Clone + PartialEq + 'static> DetailHandle for ValueRef<T> {
    type Diff = ValueDiff<T>;
    type Snapshot = Option<T>;
    type Out = ValueDiff<Option<T>>;

    #[cfg(feature = "tracing")]
    const ADAPTER: &'static str = "DetailObservableValue";
    const KIND: &'static str = "value";

    observable_handle!();

    fn detail_type(&self) -> Option<ValueType> {
        self.value_type()
    }

    fn snapshot(detail: Option<&Self>) -> Option<T> {
        detail.map(|d| d.get())
    }

    fn synthesize(old: Option<T>, new: Option<T>) -> ValueDiff<Option<T>> {
        ValueDiff::new(old, new)
    }

    fn forward(diff: &ValueDiff<T>) -> ValueDiff<Option<T>> {
        ValueDiff::new(
            Some(diff.old_value().clone()),
            Some(diff.new_value().clone()),
        )
    }
}

impl<E: Clone + PartialEq + 'static> DetailHandle for ListRef<E> {
    type Diff = ListDiff<E>;
    type Snapshot = Vec<E>;
    type Out = ListDiff<E>;

    #[cfg(feature = "tracing")]
    const ADAPTER: &'static str = "DetailObservableList";
    const KIND: &'static str = "element";

    observable_handle!();

    fn detail_type(&self) -> Option<ValueType> {
        self.element_type()
    }

    fn snapshot(detail: Option<&Self>) -> Vec<E> {
        detail.map(|d| d.to_vec()).unwrap_or_default()
    }

    fn synthesize(old: Vec<E>, new: Vec<E>) -> ListDiff<E> {
        ListDiff::compute(&old, &new)
    }

    fn forward(diff: &ListDiff<E>) -> ListDiff<E> {
        diff.clone()
    }
}

impl<E: Clone + Eq + Hash + 'static> DetailHandle for SetRef<E> {
    type Diff = SetDiff<E>;
    type Snapshot = HashSet<E>;
    type Out = SetDiff<E>;

    #[cfg(feature = "tracing")]
    const ADAPTER: &'static str = "DetailObservableSet";
    const KIND: &'static str = "element";

    observable_handle!();

    fn detail_type(&self) -> Option<ValueType> {
        self.element_type()
    }

    fn snapshot(detail: Option<&Self>) -> HashSet<E> {
        detail.map(|d| d.to_set()).unwrap_or_default()
    }

    fn synthesize(old: HashSet<E>, new: HashSet<E>) -> SetDiff<E> {
        SetDiff::compute(&old, &new)
    }

    fn forward(diff: &SetDiff<E>) -> SetDiff<E> {
        diff.clone()
    }
}

impl<K, V> DetailHandle for MapRef<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    type Diff = MapDiff<K, V>;
    type Snapshot = HashMap<K, V>;
    type Out = MapDiff<K, V>;

    #[cfg(feature = "tracing")]
    const ADAPTER: &'static str = "DetailObservableMap";
    const KIND: &'static str = "value";

    observable_handle!();

    fn detail_type(&self) -> Option<ValueType> {
        self.value_type()
    }

    fn snapshot(detail: Option<&Self>) -> HashMap<K, V> {
        detail.map(|d| d.to_map()).unwrap_or_default()
    }

    fn synthesize(old: HashMap<K, V>, new: HashMap<K, V>) -> MapDiff<K, V> {
        MapDiff::compute(&old, &new)
    }

    fn forward(diff: &MapDiff<K, V>) -> MapDiff<K, V> {
        diff.clone()
    }
}

/// The current inner detail (absent while the master value is absent) plus
/// the subscriptions on it.
enum Lifecycle<D> {
    Active { detail: Option<D>, subs: Vec<Subscription> },
    Disposed,
}

/// Shared interior of a single-master adapter.
pub(crate) struct SingleMaster<M, D: DetailHandle> {
    pub(crate) id: ObservableId,
    pub(crate) realm: Realm,
    pub(crate) master: ValueRef<Option<M>>,
    pub(crate) detail_type: Option<ValueType>,
    pub(crate) support: ChangeSupport<D::Out>,
    factory: Box<dyn Fn(&M) -> D>,
    state: RefCell<Lifecycle<D>>,
    master_subs: RefCell<Vec<Subscription>>,
    updating: Cell<bool>,
}

impl<M, D> SingleMaster<M, D>
where
    M: Clone + PartialEq + 'static,
    D: DetailHandle,
{
    /// Build the interior, create the initial detail and start following the
    /// master.
    pub(crate) fn create(
        master: ValueRef<Option<M>>,
        factory: Box<dyn Fn(&M) -> D>,
        detail_type: Option<ValueType>,
    ) -> Result<Rc<Self>, ObservableError> {
        helper::check_master_live(master.is_disposed())?;
        let core = Rc::new(Self {
            id: ObservableId::next(),
            realm: master.realm(),
            master,
            detail_type,
            support: ChangeSupport::new(),
            factory,
            state: RefCell::new(Lifecycle::Active {
                detail: None,
                subs: Vec::new(),
            }),
            master_subs: RefCell::new(Vec::new()),
            updating: Cell::new(false),
        });
        {
            let _ignore = ObservableTracker::ignore();
            Self::update_inner(&core)?;
        }
        Self::attach_master(&core);
        Ok(core)
    }

    pub(crate) fn detail(&self) -> Option<D> {
        match &*self.state.borrow() {
            Lifecycle::Active { detail, .. } => detail.clone(),
            Lifecycle::Disposed => None,
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        matches!(&*self.state.borrow(), Lifecycle::Disposed)
    }

    pub(crate) fn getter_called(&self) {
        ObservableTracker::getter_called(self.id);
    }

    /// Tracked read: record the adapter access, then consult the detail
    /// without recording it. `absent` answers while there is no detail.
    pub(crate) fn read<R>(&self, absent: impl FnOnce() -> R, f: impl FnOnce(&D) -> R) -> R {
        self.getter_called();
        self.delegate(absent, f)
    }

    /// Untracked delegation, used by mutators.
    pub(crate) fn delegate<R>(&self, absent: impl FnOnce() -> R, f: impl FnOnce(&D) -> R) -> R {
        match self.detail() {
            Some(detail) => {
                let _ignore = ObservableTracker::ignore();
                f(&detail)
            }
            None => absent(),
        }
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.getter_called();
        let _ignore = ObservableTracker::ignore();
        self.master.is_stale() || self.detail().is_some_and(|d| d.detail_is_stale())
    }

    pub(crate) fn dispose(&self) {
        let previous = std::mem::replace(&mut *self.state.borrow_mut(), Lifecycle::Disposed);
        let Lifecycle::Active { detail, subs } = previous else {
            return;
        };
        let master_subs = std::mem::take(&mut *self.master_subs.borrow_mut());
        drop(master_subs);
        drop(subs);
        if let Some(detail) = detail {
            detail.dispose_detail();
            #[cfg(feature = "tracing")]
            helper::log_detail("disposed", self.id, detail.detail_id());
        }
        #[cfg(feature = "tracing")]
        helper::log_disposed(D::ADAPTER, self.id);
        self.support.fire_dispose();
        self.support.clear();
    }

    fn attach_master(this: &Rc<Self>) {
        let weak = Rc::downgrade(this);
        let change = this.master.subscribe(Box::new(move |_: &ValueDiff<Option<M>>| {
            if let Some(core) = weak.upgrade() {
                Self::master_changed(&core);
            }
        }));
        let weak = Rc::downgrade(this);
        let stale = this.master.subscribe_stale(Box::new(move || {
            if let Some(core) = weak.upgrade() {
                let detail_stale = {
                    let _ignore = ObservableTracker::ignore();
                    core.detail().is_some_and(|d| d.detail_is_stale())
                };
                if !detail_stale {
                    core.support.fire_stale();
                }
            }
        }));
        let weak: Weak<Self> = Rc::downgrade(this);
        let dispose = this.master.subscribe_dispose(Box::new(move || {
            if let Some(core) = weak.upgrade() {
                core.dispose();
            }
        }));
        this.master_subs
            .borrow_mut()
            .extend([change, stale, dispose]);
    }

    fn master_changed(this: &Rc<Self>) {
        if this.is_disposed() {
            return;
        }
        let _ignore = ObservableTracker::ignore();
        let old = D::snapshot(this.detail().as_ref());
        let replaced = {
            let _updating = UpdateGuard::enter(&this.updating);
            Self::update_inner(this)
        };
        if let Err(err) = replaced {
            panic!("{err}");
        }
        let new = D::snapshot(this.detail().as_ref());
        this.support.fire_change(&D::synthesize(old, new));
    }

    /// Dispose the current detail and create the one for the master's
    /// current value. Runs inside an ignore scope.
    fn update_inner(this: &Rc<Self>) -> Result<(), ObservableError> {
        let master_value = this.master.get();
        let (old, old_subs) = match &mut *this.state.borrow_mut() {
            Lifecycle::Active { detail, subs } => (detail.take(), std::mem::take(subs)),
            Lifecycle::Disposed => return Ok(()),
        };
        drop(old_subs);
        if let Some(old) = old {
            old.dispose_detail();
            #[cfg(feature = "tracing")]
            helper::log_detail("disposed", this.id, old.detail_id());
        }

        let Some(master_value) = master_value else {
            return Ok(());
        };
        let detail = (this.factory)(&master_value);
        #[cfg(feature = "tracing")]
        helper::log_detail("created", this.id, detail.detail_id());
        helper::warn_if_different_realms(&this.realm, &detail.detail_realm());
        if let Err(err) =
            helper::check_detail_type(this.detail_type.as_ref(), detail.detail_type(), D::KIND)
        {
            detail.dispose_detail();
            return Err(err);
        }

        let subs = Self::subscribe_detail(this, &detail);
        let rejected = match &mut *this.state.borrow_mut() {
            Lifecycle::Active {
                detail: slot,
                subs: slot_subs,
            } => {
                *slot = Some(detail);
                *slot_subs = subs;
                None
            }
            // Disposed by the factory itself.
            Lifecycle::Disposed => Some((detail, subs)),
        };
        if let Some((detail, subs)) = rejected {
            drop(subs);
            detail.dispose_detail();
        }
        Ok(())
    }

    fn subscribe_detail(this: &Rc<Self>, detail: &D) -> Vec<Subscription> {
        let weak = Rc::downgrade(this);
        let change = detail.on_change(Box::new(move |diff: &D::Diff| {
            if let Some(core) = weak.upgrade()
                && !core.updating.get()
            {
                core.support.fire_change(&D::forward(diff));
            }
        }));
        let weak = Rc::downgrade(this);
        let stale = detail.on_stale(Box::new(move || {
            if let Some(core) = weak.upgrade() {
                let master_stale = {
                    let _ignore = ObservableTracker::ignore();
                    core.master.is_stale()
                };
                if !master_stale {
                    core.support.fire_stale();
                }
            }
        }));
        vec![change, stale]
    }
}
