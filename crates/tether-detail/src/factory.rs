#![forbid(unsafe_code)]

//! Free-function constructors for every adapter.
//!
//! Each function forwards to the adapter's `new`. They read better at call
//! sites that build several adapters over one master:
//!
//! ```
//! use tether_core::{ObservableValue, ValueType, WritableValue};
//! use tether_detail::factory;
//!
//! let selection = WritableValue::new(Some(7_u32));
//! let label = factory::detail_value(
//!     selection.share(),
//!     |id: &u32| WritableValue::with_type(format!("user-{id}"), ValueType::of::<String>()).share(),
//!     Some(ValueType::of::<String>()),
//! )?;
//! assert_eq!(label.get().as_deref(), Some("user-7"));
//!
//! selection.set(None)?;
//! assert_eq!(label.get(), None);
//! # Ok::<(), tether_core::ObservableError>(())
//! ```

use std::hash::Hash;

use tether_core::{
    Identity, ListRef, MapRef, ObservableError, SetRef, ValueRef, ValueType,
};

use crate::{
    DetailObservableList, DetailObservableMap, DetailObservableSet, DetailObservableValue,
    ListDetailValueObservableList, MapDetailValueObservableMap, SetDetailValueObservableMap,
};

/// Value detail of a master value. See [`DetailObservableValue`].
///
/// # Errors
///
/// As [`DetailObservableValue::new`].
pub fn detail_value<M, T, F>(
    master: ValueRef<Option<M>>,
    factory: F,
    detail_type: Option<ValueType>,
) -> Result<DetailObservableValue<M, T>, ObservableError>
where
    M: Clone + PartialEq + 'static,
    T: Clone + PartialEq + 'static,
    F: Fn(&M) -> ValueRef<T> + 'static,
{
    DetailObservableValue::new(master, factory, detail_type)
}

/// List detail of a master value. See [`DetailObservableList`].
///
/// # Errors
///
/// As [`DetailObservableList::new`].
pub fn detail_list<M, E, F>(
    master: ValueRef<Option<M>>,
    factory: F,
    element_type: Option<ValueType>,
) -> Result<DetailObservableList<M, E>, ObservableError>
where
    M: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
    F: Fn(&M) -> ListRef<E> + 'static,
{
    DetailObservableList::new(master, factory, element_type)
}

/// Set detail of a master value. See [`DetailObservableSet`].
///
/// # Errors
///
/// As [`DetailObservableSet::new`].
pub fn detail_set<M, E, F>(
    master: ValueRef<Option<M>>,
    factory: F,
    element_type: Option<ValueType>,
) -> Result<DetailObservableSet<M, E>, ObservableError>
where
    M: Clone + PartialEq + 'static,
    E: Clone + Eq + Hash + 'static,
    F: Fn(&M) -> SetRef<E> + 'static,
{
    DetailObservableSet::new(master, factory, element_type)
}

/// Map detail of a master value. See [`DetailObservableMap`].
///
/// # Errors
///
/// As [`DetailObservableMap::new`].
pub fn detail_map<M, K, V, F>(
    master: ValueRef<Option<M>>,
    factory: F,
    key_type: Option<ValueType>,
    value_type: Option<ValueType>,
) -> Result<DetailObservableMap<M, K, V>, ObservableError>
where
    M: Clone + PartialEq + 'static,
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
    F: Fn(&M) -> MapRef<K, V> + 'static,
{
    DetailObservableMap::new(master, factory, key_type, value_type)
}

/// Detail values of a master list's elements. See
/// [`ListDetailValueObservableList`].
///
/// # Errors
///
/// As [`ListDetailValueObservableList::new`].
pub fn detail_values_list<M, E, F>(
    master: ListRef<M>,
    factory: F,
    detail_type: Option<ValueType>,
) -> Result<ListDetailValueObservableList<M, E>, ObservableError>
where
    M: Identity + Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
    F: Fn(&M) -> ValueRef<E> + 'static,
{
    ListDetailValueObservableList::new(master, factory, detail_type)
}

/// Detail values of a master map's values. See
/// [`MapDetailValueObservableMap`].
///
/// # Errors
///
/// As [`MapDetailValueObservableMap::new`].
pub fn detail_values_map<K, M, E, F>(
    master: MapRef<K, M>,
    factory: F,
    detail_type: Option<ValueType>,
) -> Result<MapDetailValueObservableMap<K, M, E>, ObservableError>
where
    K: Clone + Eq + Hash + 'static,
    M: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
    F: Fn(&M) -> ValueRef<E> + 'static,
{
    MapDetailValueObservableMap::new(master, factory, detail_type)
}

/// Detail values of a master set's elements. See
/// [`SetDetailValueObservableMap`].
///
/// # Errors
///
/// As [`SetDetailValueObservableMap::new`].
pub fn detail_values_set<M, E, F>(
    master: SetRef<M>,
    factory: F,
    detail_type: Option<ValueType>,
) -> Result<SetDetailValueObservableMap<M, E>, ObservableError>
where
    M: Clone + Eq + Hash + 'static,
    E: Clone + PartialEq + 'static,
    F: Fn(&M) -> ValueRef<E> + 'static,
{
    SetDetailValueObservableMap::new(master, factory, detail_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Person;
    use std::rc::Rc;
    use tether_core::{
        Observable, ObservableList, ObservableMap, WritableList, WritableSet, WritableValue,
    };

    #[test]
    fn constructors_build_live_adapters() {
        let master = WritableList::from_vec(vec![Person::new("a", &[])]);
        let list = detail_values_list(master.share(), |p: &Rc<Person>| p.name.share(), None)
            .expect("live master");
        assert_eq!(list.to_vec(), vec!["a".to_owned()]);

        let keys = WritableSet::from_elements([1_u8, 2]);
        let map = detail_values_set(keys.share(), |k: &u8| WritableValue::new(*k).share(), None)
            .expect("live master");
        assert_eq!(map.get(&2), Some(2));
        assert!(!map.is_disposed());
    }

    #[test]
    fn constructors_reject_disposed_masters() {
        let master: WritableValue<Option<u8>> = WritableValue::new(None);
        master.dispose();
        let result = detail_set(
            master.share(),
            |_: &u8| WritableSet::<u8>::new().share(),
            None,
        );
        assert!(matches!(result, Err(ObservableError::InvariantViolation(_))));
    }
}
