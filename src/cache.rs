//! Version-keyed query result cache.
//!
//! Keys include the store version, the canonical goal form, and the limits,
//! so a cached solution set for store version V1 can never answer a query
//! against V2. Entries are invalidated wholesale per version on reload or
//! dispose; individual entries are never patched.
//!
//! Writes may race (two workers answering the same key) and that is benign:
//! evaluation is deterministic, so last-writer-wins stores the same value.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::eval::{EvalLimits, Solution};
use crate::store::StoreVersion;
use crate::term::Term;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    version: StoreVersion,
    goal: String,
    limits: EvalLimits,
}

/// A bounded, read-mostly query cache.
#[derive(Debug)]
pub struct QueryCache {
    entries: RwLock<HashMap<CacheKey, Arc<[Solution]>>>,
    capacity: usize,
}

impl QueryCache {
    /// Creates a cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Looks up a cached solution set.
    #[must_use]
    pub fn get(
        &self,
        version: StoreVersion,
        goal: &Term,
        limits: &EvalLimits,
    ) -> Option<Arc<[Solution]>> {
        let key = CacheKey {
            version,
            goal: goal.to_string(),
            limits: limits.clone(),
        };
        let guard = self.entries.read().ok()?;
        guard.get(&key).cloned()
    }

    /// Stores a solution set. A full cache is cleared rather than evicted
    /// entry-by-entry; correctness only needs the version in the key.
    pub fn insert(
        &self,
        version: StoreVersion,
        goal: &Term,
        limits: &EvalLimits,
        solutions: Arc<[Solution]>,
    ) {
        let key = CacheKey {
            version,
            goal: goal.to_string(),
            limits: limits.clone(),
        };
        if let Ok(mut guard) = self.entries.write() {
            if guard.len() >= self.capacity && !guard.contains_key(&key) {
                guard.clear();
            }
            guard.insert(key, solutions);
        }
    }

    /// Drops every entry for the given store version.
    pub fn invalidate_version(&self, version: StoreVersion) {
        if let Ok(mut guard) = self.entries.write() {
            guard.retain(|key, _| key.version != version);
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |g| g.len())
    }

    /// True when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
