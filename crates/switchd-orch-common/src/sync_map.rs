//! Map wrapper that never creates entries implicitly.
//!
//! Reconciliation state is full of reference counts. A plain index operation
//! that default-constructs a missing entry turns a lookup bug into a silent
//! count corruption; `SyncMap` makes every creating operation explicit and
//! every ref-count mutation fallible.

use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

/// Error type for SyncMap operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncMapError {
    #[error("key not found")]
    KeyNotFound,

    #[error("reference count underflow")]
    RefCountUnderflow,
}

/// Trait for entries carrying a reference count.
pub trait HasRefCount {
    /// Increments the reference count and returns the new value.
    fn increment_ref(&mut self) -> u32;

    /// Decrements the reference count and returns the new value, or `None`
    /// if the count is already zero.
    fn decrement_ref(&mut self) -> Option<u32>;

    /// Returns the current reference count.
    fn ref_count(&self) -> u32;
}

/// A map whose read paths never create entries.
#[derive(Debug, Clone)]
pub struct SyncMap<K, V> {
    inner: HashMap<K, V>,
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns a reference to the value for the key, without creating one.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Returns a mutable reference to the value for the key, without
    /// creating one.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    /// Inserts a key-value pair; returns the previous value if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    /// Removes a key; returns the removed value if present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.inner.values_mut()
    }
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
    V: HasRefCount,
{
    /// Increments the reference count for an existing key.
    ///
    /// Fails instead of creating a default entry for an unknown key.
    pub fn increment_ref(&mut self, key: &K) -> Result<u32, SyncMapError> {
        match self.inner.get_mut(key) {
            Some(entry) => Ok(entry.increment_ref()),
            None => Err(SyncMapError::KeyNotFound),
        }
    }

    /// Decrements the reference count for an existing key.
    ///
    /// Fails for an unknown key or a count already at zero.
    pub fn decrement_ref(&mut self, key: &K) -> Result<u32, SyncMapError> {
        match self.inner.get_mut(key) {
            Some(entry) => entry
                .decrement_ref()
                .ok_or(SyncMapError::RefCountUnderflow),
            None => Err(SyncMapError::KeyNotFound),
        }
    }

    /// Returns the reference count for a key, if present.
    pub fn ref_count(&self, key: &K) -> Option<u32> {
        self.inner.get(key).map(|e| e.ref_count())
    }
}

impl<K, V> Default for SyncMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for SyncMap<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
