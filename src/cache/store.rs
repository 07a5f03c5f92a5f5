//! Namespaced in-memory maps.
//!
//! One map per [`Namespace`]. The store is a plain structure: it never
//! touches recency and never checks capacity, both of which belong to the
//! engine.

use std::collections::HashMap;

use crate::cache::key::{CacheKey, Namespace};
use crate::cache::record::{CacheEntry, Payload};

#[derive(Debug, Default)]
pub struct NamespacedStore {
    maps: [HashMap<CacheKey, CacheEntry>; 3],
}

impl NamespacedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, namespace: Namespace) -> &HashMap<CacheKey, CacheEntry> {
        &self.maps[namespace.index()]
    }

    fn map_mut(&mut self, namespace: Namespace) -> &mut HashMap<CacheKey, CacheEntry> {
        &mut self.maps[namespace.index()]
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.map(key.namespace()).get(key)
    }

    pub fn get_mut(&mut self, key: &CacheKey) -> Option<&mut CacheEntry> {
        self.map_mut(key.namespace()).get_mut(key)
    }

    /// Insert or overwrite. Returns whether the key was new.
    pub fn put(&mut self, key: CacheKey, payload: Payload) -> bool {
        debug_assert_eq!(key.namespace(), payload.namespace());
        self.map_mut(key.namespace())
            .insert(key, CacheEntry::new(payload))
            .is_none()
    }

    pub fn delete(&mut self, key: &CacheKey) -> bool {
        self.map_mut(key.namespace()).remove(key).is_some()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.map(key.namespace()).contains_key(key)
    }

    pub fn count(&self, namespace: Namespace) -> usize {
        self.map(namespace).len()
    }

    pub fn total_count(&self) -> usize {
        self.maps.iter().map(HashMap::len).sum()
    }

    /// Empty one namespace, returning the removed keys.
    pub fn clear(&mut self, namespace: Namespace) -> Vec<CacheKey> {
        self.map_mut(namespace).drain().map(|(k, _)| k).collect()
    }

    /// Remove every entry in `namespace` for which `remove` returns true.
    pub fn remove_where<F>(&mut self, namespace: Namespace, mut remove: F) -> Vec<CacheKey>
    where
        F: FnMut(&CacheKey, &CacheEntry) -> bool,
    {
        let map = self.map_mut(namespace);
        let doomed: Vec<CacheKey> = map
            .iter()
            .filter(|(k, v)| remove(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            map.remove(key);
        }
        doomed
    }
}
