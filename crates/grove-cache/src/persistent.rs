//! Persistent maps shared between snapshots

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

/// A map whose clones share structure.
///
/// Cloning is O(1). A write to a clone copies only the path to the changed
/// entry, so forking a large map and touching a few keys stays cheap.
/// Readers of other clones never observe the write.
pub struct Map<K, V> {
    entries: imbl::HashMap<K, V>,
}

impl<K: Clone, V: Clone> Clone for Map<K, V> {
    fn clone(&self) -> Self {
        Map {
            entries: self.entries.clone(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for Map<K, V> {
    fn default() -> Self {
        Map {
            entries: imbl::HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone + fmt::Debug, V: Clone + fmt::Debug> fmt::Debug for Map<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Map<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn set(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// Remove `key`, reporting whether it was present. Absent keys never unshare.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if !self.entries.contains_key(key) {
            return false;
        }
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries = imbl::HashMap::new();
        }
    }

    /// Whether two maps share the same root.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.entries.ptr_eq(&b.entries)
    }
}
