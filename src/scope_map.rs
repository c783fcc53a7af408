//! A map type with nested scopes, used for variable environments.

use std::{borrow::Borrow, hash::Hash, iter::FromIterator, marker::PhantomData};

use indexmap::IndexMap;

/// A ScopeMap is a map type that supports [`ScopeMap::push`] and
/// [`ScopeMap::pop`] operations that increase or decrease a "scope level".
/// Entries inserted on one scope level are removed by calling
/// [`ScopeMap::pop`], and hide entries with the same key on the levels above.
#[derive(Debug)]
pub struct ScopeMap<K, V> {
    scopes: Vec<IndexMap<K, V>>,
}

pub struct ScopeParent<K, V> {
    depth: usize,
    phantom: PhantomData<(K, V)>,
}

impl<K, V> ScopeMap<K, V> {
    /// Create an empty [`ScopeMap`] with one scope level.
    pub fn new() -> Self {
        ScopeMap {
            scopes: vec![IndexMap::new()],
        }
    }

    /// Returns the number of scopes in this scope map.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl<K, V> Default for ScopeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ScopeMap<K, V>
where
    K: Eq + Hash,
{
    /// Increase the scope level.
    ///
    /// The returned [`ScopeParent`] is passed to [`ScopeMap::pop`], which
    /// asserts that pushes and pops are properly nested.
    pub fn push(&mut self) -> ScopeParent<K, V> {
        self.scopes.push(IndexMap::new());
        ScopeParent {
            depth: self.scopes.len(),
            phantom: PhantomData,
        }
    }

    /// Decrease the scope level, dropping all entries of the current level.
    pub fn pop(&mut self, parent: ScopeParent<K, V>) {
        assert_eq!(parent.depth, self.scopes.len());
        assert!(self.scopes.len() > 1);
        self.scopes.pop();
    }

    /// Insert an entry at the current scope level.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.current_mut().insert(key, value)
    }

    /// Overwrite the value of the innermost entry for `key`. Returns the value
    /// back if there is no such entry.
    pub fn assign<Q>(&mut self, key: &Q, value: V) -> Result<(), V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.scopes.iter_mut().rev().find_map(|map| map.get_mut(key)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Retrieve an element from the map.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.scopes.iter().rev().find_map(|map| map.get(key))
    }

    /// Does this map contain the given key?
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    fn current_mut(&mut self) -> &mut IndexMap<K, V> {
        // there is always at least one scope
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }
}

/// Create a [`ScopeMap`] from an iterator. The order of entries is preserved.
impl<K: Eq + Hash, V> FromIterator<(K, V)> for ScopeMap<K, V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        ScopeMap {
            scopes: vec![IndexMap::from_iter(iter)],
        }
    }
}
