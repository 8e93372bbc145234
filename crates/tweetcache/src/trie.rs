//! Two-level prefix index
//!
//! Level one holds owners, level two the entities cached under each owner.
//! Nodes carry presence only; values live in the LRU store. A branch is
//! dropped as soon as its last leaf goes, so the index never outgrows the
//! compound keys it mirrors.

use std::hash::Hash;

use ahash::AHashMap;

/// Node in the index; leaves have no children
#[derive(Debug)]
struct TrieNode<K> {
    children: AHashMap<K, TrieNode<K>>,
}

impl<K> TrieNode<K> {
    fn new() -> Self {
        Self {
            children: AHashMap::new(),
        }
    }
}

/// Index of `(first, second)` paths
#[derive(Debug)]
pub struct PrefixIndex<F, S> {
    root: AHashMap<F, TrieNode<S>>,
    leaves: usize,
}

impl<F, S> Default for PrefixIndex<F, S>
where
    F: Hash + Eq + Clone,
    S: Hash + Eq + Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<F, S> PrefixIndex<F, S>
where
    F: Hash + Eq + Clone,
    S: Hash + Eq + Ord + Clone,
{
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            root: AHashMap::new(),
            leaves: 0,
        }
    }

    /// Register `second` under `first`. Idempotent.
    pub fn insert(&mut self, first: F, second: S) {
        let branch = self.root.entry(first).or_insert_with(TrieNode::new);
        if branch.children.insert(second, TrieNode::new()).is_none() {
            self.leaves += 1;
        }
    }

    /// Unregister `second` under `first`, dropping the branch once empty.
    ///
    /// Returns whether the path was present.
    pub fn remove(&mut self, first: &F, second: &S) -> bool {
        let Some(branch) = self.root.get_mut(first) else {
            return false;
        };

        let removed = branch.children.remove(second).is_some();
        if removed {
            self.leaves -= 1;
        }
        if branch.children.is_empty() {
            self.root.remove(first);
        }
        removed
    }

    /// Every second-level key under `first`, in ascending order.
    ///
    /// Empty when `first` is unknown.
    pub fn list_second_level(&self, first: &F) -> Vec<S> {
        let mut keys: Vec<S> = self
            .root
            .get(first)
            .map(|branch| branch.children.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }

    /// Drop the whole branch under `first`, returning its former leaves
    pub fn remove_first(&mut self, first: &F) -> Vec<S> {
        let mut keys: Vec<S> = self
            .root
            .remove(first)
            .map(|branch| branch.children.into_keys().collect())
            .unwrap_or_default();
        self.leaves -= keys.len();
        keys.sort_unstable();
        keys
    }

    /// Check if the path `(first, second)` is registered
    pub fn contains(&self, first: &F, second: &S) -> bool {
        self.root
            .get(first)
            .is_some_and(|branch| branch.children.contains_key(second))
    }

    /// Iterate over every registered path, in no particular order
    pub fn paths(&self) -> impl Iterator<Item = (&F, &S)> + '_ {
        self.root
            .iter()
            .flat_map(|(first, branch)| branch.children.keys().map(move |second| (first, second)))
    }

    /// Number of registered paths
    pub fn len(&self) -> usize {
        self.leaves
    }

    /// Check if no path is registered
    pub fn is_empty(&self) -> bool {
        self.leaves == 0
    }

    /// Number of first-level keys
    pub fn first_level_len(&self) -> usize {
        self.root.len()
    }

    /// Remove every path
    pub fn clear(&mut self) {
        self.root.clear();
        self.leaves = 0;
    }
}
