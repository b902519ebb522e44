//! Registry of claimed player tags
//!
//! Insertion-only. The first successful [`VisitedRegistry::try_claim`] for a
//! tag wins for the whole run; every later claim (from any task) fails.

use parking_lot::Mutex;
use std::collections::HashSet;

/// Set of tags that have been claimed by some task
#[derive(Debug, Default)]
pub struct VisitedRegistry {
    tags: Mutex<HashSet<String>>,
}

impl VisitedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size for an expected number of tags
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tags: Mutex::new(HashSet::with_capacity(capacity)),
        }
    }

    /// Atomically test-and-insert; true if this call claimed the tag
    pub fn try_claim(&self, tag: &str) -> bool {
        let mut tags = self.tags.lock();
        if tags.contains(tag) {
            false
        } else {
            tags.insert(tag.to_owned())
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.lock().contains(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.lock().is_empty()
    }
}
