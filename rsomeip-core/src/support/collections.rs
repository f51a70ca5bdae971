//! Collection types.
//!
//! - [`SharedMap`] is a thread-safe collection of key-value pairs.

use super::sync::lock;
use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex},
};

/// A thread-safe collection of key-value pairs.
///
/// This map can be cloned to create multiple instances pointing to the same underlying memory
/// allocation, which can be accessed from different threads.
///
/// # Panics
///
/// Every method panics if the inner mutex is poisoned.
#[derive(Debug)]
pub struct SharedMap<K, V> {
    inner: Arc<Mutex<HashMap<K, V>>>,
}

impl<K, V> SharedMap<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Creates a new [`SharedMap`].
    pub fn new() -> Self {
        Self {
            inner: Arc::default(),
        }
    }

    /// Inserts a new value into the map.
    ///
    /// If the key already exists, it replaces the value, and returns the old one.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        lock(&self.inner).insert(key, value)
    }

    /// Returns the value corresponding to the given key.
    pub fn get(&self, key: &K) -> Option<V> {
        lock(&self.inner).get(key).cloned()
    }

    /// Returns the value corresponding to the given key, inserting one if it does not exist.
    pub fn get_or_insert_with(&self, key: K, f: impl FnOnce() -> V) -> V {
        lock(&self.inner).entry(key).or_insert_with(f).clone()
    }

    /// Removes an entry from the map, and returns it.
    pub fn remove(&self, key: &K) -> Option<V> {
        lock(&self.inner).remove(key)
    }

    /// Returns a copy of every entry of the map.
    pub fn entries(&self) -> Vec<(K, V)>
    where
        K: Clone,
    {
        lock(&self.inner)
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Removes every entry of the map.
    pub fn clear(&self) {
        lock(&self.inner).clear();
    }
}

impl<K, V> Clone for SharedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for SharedMap<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_map() {
        let map: SharedMap<u32, &'static str> = SharedMap::new();

        let cloned_map = map.clone();
        let handle = std::thread::spawn(move || {
            assert_eq!(cloned_map.insert(1, "Mercury"), None);
        });
        assert_eq!(map.insert(2, "Venus"), None);

        handle.join().expect("should complete successfully");
        assert_eq!(map.get(&1), Some("Mercury"));

        map.remove(&1);
        assert_eq!(map.get(&1), None);
        assert_eq!(map.entries(), vec![(2, "Venus")]);

        assert_eq!(map.get_or_insert_with(3, || "Earth"), "Earth");
        assert_eq!(map.get_or_insert_with(3, || "Mars"), "Earth");

        map.clear();
        assert!(map.entries().is_empty());
    }
}
