//! Last-write-wins reduction.
//!
//! Keeps, per key, the item with the greatest order value. The sort is
//! stable, so items with equal order values resolve to the one that came
//! later in the input. Output is ordered by key.

use std::collections::BTreeMap;

pub fn latest_by_key<T, K, O>(
    mut items: Vec<T>,
    key: impl Fn(&T) -> K,
    order: impl Fn(&T) -> O,
) -> Vec<T>
where
    K: Ord,
    O: Ord,
{
    items.sort_by_key(|item| order(item));

    let mut latest: BTreeMap<K, T> = BTreeMap::new();
    for item in items {
        latest.insert(key(&item), item);
    }
    latest.into_values().collect()
}
