//! Allow-list of pairs eligible for evaluation.

use parking_lot::RwLock;
use std::collections::HashSet;

/// Set of watched pairs. An empty set means every pair is watched.
#[derive(Debug, Default)]
pub struct WatchedPairs {
    pairs: RwLock<HashSet<String>>,
}

impl WatchedPairs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set.
    pub fn replace(&self, pairs: Vec<String>) {
        let next: HashSet<String> = pairs.into_iter().collect();
        *self.pairs.write() = next;
    }

    pub fn contains(&self, pair: &str) -> bool {
        let pairs = self.pairs.read();
        pairs.is_empty() || pairs.contains(pair)
    }

    /// Sorted copy of the current set.
    pub fn snapshot(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self.pairs.read().iter().cloned().collect();
        pairs.sort();
        pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.read().is_empty()
    }
}
