//! Property combine functions and their registry.
//!
//! A [`PropertyReducer`] folds the property map of a duplicate element into
//! the map accumulated so far. Group arrival order is not stable across runs,
//! so only associative, commutative reducers (`sum`, `max`, `min`, `union`)
//! give run-independent results. `keep_first`, the default, keeps whichever
//! value happened to arrive first.

use crate::error::ConfigError;
use grafter_model::{PropValue, PropertyMap};
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry name of the default reducer.
pub const DEFAULT_REDUCER: &str = "keep_first";

/// Combines the property maps of duplicate elements.
pub trait PropertyReducer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Combine two values stored under the same key.
    fn combine(&self, key: &str, current: &PropValue, incoming: &PropValue) -> PropValue;

    /// Fold `incoming` into `acc`. Keys present on one side only are kept.
    fn reduce(&self, mut acc: PropertyMap, incoming: PropertyMap) -> PropertyMap {
        for (key, value) in incoming {
            match acc.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(mut slot) => {
                    let merged = self.combine(slot.key(), slot.get(), &value);
                    slot.insert(merged);
                }
            }
        }
        acc
    }
}

// ============================================================================
// Built-in reducers
// ============================================================================

#[derive(Debug, Default)]
pub struct KeepFirst;

impl PropertyReducer for KeepFirst {
    fn name(&self) -> &'static str {
        "keep_first"
    }

    fn combine(&self, _key: &str, current: &PropValue, _incoming: &PropValue) -> PropValue {
        current.clone()
    }
}

#[derive(Debug, Default)]
pub struct KeepLast;

impl PropertyReducer for KeepLast {
    fn name(&self) -> &'static str {
        "keep_last"
    }

    fn combine(&self, _key: &str, _current: &PropValue, incoming: &PropValue) -> PropValue {
        incoming.clone()
    }
}

/// Adds numbers. Non-numeric values and sums that overflow to infinity keep
/// the accumulated value.
#[derive(Debug, Default)]
pub struct Sum;

impl PropertyReducer for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn combine(&self, _key: &str, current: &PropValue, incoming: &PropValue) -> PropValue {
        if let (PropValue::Long(a), PropValue::Long(b)) = (current, incoming) {
            if let Some(n) = a.checked_add(*b) {
                return PropValue::Long(n);
            }
        }
        match (current.as_f64(), incoming.as_f64()) {
            (Some(a), Some(b)) if (a + b).is_finite() => PropValue::Double(a + b),
            _ => current.clone(),
        }
    }
}

/// Keeps the larger of two comparable values.
#[derive(Debug, Default)]
pub struct Max;

impl PropertyReducer for Max {
    fn name(&self) -> &'static str {
        "max"
    }

    fn combine(&self, _key: &str, current: &PropValue, incoming: &PropValue) -> PropValue {
        match incoming.compare(current) {
            Some(Ordering::Greater) => incoming.clone(),
            _ => current.clone(),
        }
    }
}

/// Keeps the smaller of two comparable values.
#[derive(Debug, Default)]
pub struct Min;

impl PropertyReducer for Min {
    fn name(&self) -> &'static str {
        "min"
    }

    fn combine(&self, _key: &str, current: &PropValue, incoming: &PropValue) -> PropValue {
        match incoming.compare(current) {
            Some(Ordering::Less) => incoming.clone(),
            _ => current.clone(),
        }
    }
}

/// Set union of comma-separated text values, kept sorted so the result does
/// not depend on arrival order.
#[derive(Debug, Default)]
pub struct Union;

impl PropertyReducer for Union {
    fn name(&self) -> &'static str {
        "union"
    }

    fn combine(&self, _key: &str, current: &PropValue, incoming: &PropValue) -> PropValue {
        let (PropValue::Text(a), PropValue::Text(b)) = (current, incoming) else {
            return current.clone();
        };
        let mut items: Vec<&str> = a
            .split(',')
            .chain(b.split(','))
            .filter(|s| !s.is_empty())
            .collect();
        items.sort_unstable();
        items.dedup();
        PropValue::Text(items.join(","))
    }
}

// ============================================================================
// Registry
// ============================================================================

type Constructor = fn() -> Arc<dyn PropertyReducer>;

/// Maps configuration names to reducer constructors.
#[derive(Clone)]
pub struct ReducerRegistry {
    constructors: BTreeMap<&'static str, Constructor>,
}

impl ReducerRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in reducer.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("keep_first", || Arc::new(KeepFirst));
        registry.register("keep_last", || Arc::new(KeepLast));
        registry.register("sum", || Arc::new(Sum));
        registry.register("max", || Arc::new(Max));
        registry.register("min", || Arc::new(Min));
        registry.register("union", || Arc::new(Union));
        registry
    }

    pub fn register(&mut self, name: &'static str, constructor: Constructor) {
        self.constructors.insert(name, constructor);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }

    pub fn create(&self, name: &str) -> Result<Arc<dyn PropertyReducer>, ConfigError> {
        self.constructors
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| ConfigError::UnknownCombiner {
                name: name.to_string(),
                known: self.names().join(", "),
            })
    }

    /// Reducer named by `name`, or the default when unset.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn PropertyReducer>, ConfigError> {
        match name {
            Some(name) => self.create(name),
            None => Ok(Arc::new(KeepFirst)),
        }
    }
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grafter_model::props;

    #[test]
    fn keep_first_keeps_disjoint_keys() {
        let a = props([("x", 1i64), ("y", 2)]);
        let b = props([("y", 20i64), ("z", 30)]);
        let merged = KeepFirst.reduce(a, b);
        assert_eq!(merged, props([("x", 1i64), ("y", 2), ("z", 30)]));
    }

    #[test]
    fn sum_is_order_independent() {
        let maps = [
            props([("w", PropValue::Long(1))]),
            props([("w", PropValue::Double(0.5))]),
            props([("w", PropValue::Long(2))]),
        ];
        let forward = maps.iter().cloned().fold(PropertyMap::new(), |acc, m| Sum.reduce(acc, m));
        let backward = maps
            .iter()
            .rev()
            .cloned()
            .fold(PropertyMap::new(), |acc, m| Sum.reduce(acc, m));
        assert_eq!(forward["w"], PropValue::Double(3.5));
        assert_eq!(forward, backward);
    }

    #[test]
    fn sum_widens_on_overflow() {
        let merged = Sum.combine("n", &PropValue::Long(i64::MAX), &PropValue::Long(1));
        assert!(matches!(merged, PropValue::Double(_)));
    }

    #[test]
    fn sum_never_produces_infinity() {
        let big = PropValue::Double(1.5e308);
        assert_eq!(Sum.combine("w", &big, &big), big);
        let low = PropValue::Double(-1.5e308);
        assert_eq!(Sum.combine("w", &low, &low), low);
        assert_eq!(Sum.combine("w", &big, &low), PropValue::Double(0.0));
    }

    #[test]
    fn max_and_min_ignore_incomparable_values() {
        let text = PropValue::Text("big".into());
        assert_eq!(Max.combine("k", &PropValue::Long(3), &text), PropValue::Long(3));
        assert_eq!(Max.combine("k", &PropValue::Long(3), &PropValue::Long(9)), PropValue::Long(9));
        assert_eq!(Min.combine("k", &PropValue::Long(3), &PropValue::Long(9)), PropValue::Long(3));
    }

    #[test]
    fn union_is_sorted_and_distinct() {
        let merged = Union.combine("tags", &"b,a".into(), &"c,a".into());
        assert_eq!(merged, PropValue::Text("a,b,c".into()));
    }

    #[test]
    fn registry_resolves_by_name() {
        let registry = ReducerRegistry::builtin();
        assert_eq!(registry.create("sum").unwrap().name(), "sum");
        assert_eq!(registry.resolve(None).unwrap().name(), DEFAULT_REDUCER);
        let err = registry.create("median").err().unwrap();
        assert!(err.to_string().contains("keep_first"));
    }

    #[test]
    fn custom_reducers_can_be_registered() {
        let mut registry = ReducerRegistry::empty();
        registry.register("last", || Arc::new(KeepLast));
        assert_eq!(registry.names(), vec!["last"]);
        assert!(registry.create("sum").is_err());
    }
}
