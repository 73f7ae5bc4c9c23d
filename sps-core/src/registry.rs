use std::{
    hash::Hash,
    sync::{Arc, Mutex},
};

use dashmap::DashMap;

/// A concurrent map of scope identity to scope state.
///
/// Each scope's state sits behind its own lock so that work on one scope never waits on another.
pub struct ScopeRegistry<K, S> {
    scopes: DashMap<K, Arc<Mutex<S>>>,
}

impl<K, S> ScopeRegistry<K, S>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            scopes: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<Mutex<S>>> {
        self.scopes.get(key).map(|entry| entry.value().clone())
    }

    /// Get the state for `key`, creating it if absent. The flag is true if it was created by this call.
    pub fn get_or_create<F>(&self, key: &K, create: F) -> (Arc<Mutex<S>>, bool)
    where
        F: FnOnce() -> S,
    {
        if let Some(existing) = self.get(key) {
            return (existing, false);
        }
        let mut created = false;
        let state = self
            .scopes
            .entry(key.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(create()))
            })
            .value()
            .clone();
        (state, created)
    }

    pub fn remove(&self, key: &K) -> Option<Arc<Mutex<S>>> {
        self.scopes.remove(key).map(|(_, state)| state)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// A point in time copy of every scope, taken without holding any scope lock
    pub fn snapshot(&self) -> Vec<(K, Arc<Mutex<S>>)> {
        self.scopes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl<K, S> Default for ScopeRegistry<K, S>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
