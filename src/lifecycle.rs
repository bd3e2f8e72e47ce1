//! Adapter lifecycle management.
//!
//! Maps each adapter identity to its current rule store snapshot and
//! evaluation context. There is deliberately no process-global "loaded" flag:
//! every operation takes the adapter explicitly and the state lives in a map
//! keyed by adapter identity, so one adapter's load, reload, or disposal can
//! never bleed into another's.
//!
//! Reload builds the replacement store and context in full before swapping
//! the map entry. Queries already holding an `Arc` to the old snapshot drain
//! against it; nothing is aborted and no query ever observes a half-migrated
//! state.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GatewayError, LoadError};
use crate::eval::EvalContext;
use crate::store::{RuleStore, StoreVersion};

/// A logical consumer identity (one UI session, one test harness, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterId(String);

impl AdapterId {
    /// Creates an adapter identity from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AdapterId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AdapterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The state held for one loaded adapter.
#[derive(Debug, Clone)]
struct AdapterState {
    store: Arc<RuleStore>,
    context: Arc<EvalContext>,
    loaded_at: DateTime<Utc>,
}

/// An owned view of one adapter's current snapshot, handed to the gateway.
///
/// Holding a snapshot keeps the store alive even if the adapter is reloaded
/// or disposed mid-query.
#[derive(Debug, Clone)]
pub struct AdapterSnapshot {
    /// The adapter this snapshot belongs to.
    pub adapter: AdapterId,
    /// The evaluation context bound to the snapshot's store.
    pub context: Arc<EvalContext>,
    /// The store version at snapshot time.
    pub version: StoreVersion,
}

/// Outcome of an `ensure_loaded` or `reload` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapReport {
    /// The adapter's active store version after the call.
    pub version: StoreVersion,
    /// The version that was replaced, if any. The caller uses this to
    /// invalidate cache entries wholesale.
    pub replaced: Option<StoreVersion>,
    /// True when `ensure_loaded` found identical content already active and
    /// changed nothing.
    pub no_op: bool,
}

/// Owns the adapter → (store, context) mapping.
///
/// The internal map mutex is the only mutual exclusion in the engine's data
/// path; it is held only for map reads and pointer swaps, never during
/// evaluation.
#[derive(Debug, Default)]
pub struct LifecycleManager {
    adapters: Mutex<HashMap<AdapterId, AdapterState>>,
}

impl LifecycleManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `source` for `adapter` unless byte-identical content is already
    /// active. Idempotent; safe to call on every session start.
    ///
    /// # Errors
    ///
    /// Returns the parse/validation [`LoadError`]; the adapter's previous
    /// state (if any) remains active and `is_loaded` is unaffected.
    pub fn ensure_loaded(
        &self,
        adapter: &AdapterId,
        source: &str,
    ) -> Result<SwapReport, LoadError> {
        let content = RuleStore::content_hash(source);
        {
            let guard = self.lock();
            if let Some(state) = guard.get(adapter) {
                if state.store.version().has_content(&content) {
                    return Ok(SwapReport {
                        version: state.store.version(),
                        replaced: None,
                        no_op: true,
                    });
                }
            }
        }
        self.swap_in(adapter, source, "load")
    }

    /// Builds a fresh store from `source` and atomically swaps it in.
    /// In-flight queries on the old snapshot drain against it.
    ///
    /// # Errors
    ///
    /// On [`LoadError`] the old store stays active.
    pub fn reload(&self, adapter: &AdapterId, source: &str) -> Result<SwapReport, LoadError> {
        self.swap_in(adapter, source, "reload")
    }

    fn swap_in(
        &self,
        adapter: &AdapterId,
        source: &str,
        what: &'static str,
    ) -> Result<SwapReport, LoadError> {
        // Build outside the lock: parsing can be arbitrarily large and must
        // not serialize other adapters' lifecycle calls.
        let store = Arc::new(RuleStore::load(source)?);
        let context = Arc::new(EvalContext::new(Arc::clone(&store)));
        let version = store.version();

        let mut guard = self.lock();
        let replaced = guard
            .insert(
                adapter.clone(),
                AdapterState {
                    store,
                    context,
                    loaded_at: Utc::now(),
                },
            )
            .map(|old| old.store.version());
        drop(guard);

        info!(adapter = %adapter, version = %version, what, "store swapped in");
        Ok(SwapReport {
            version,
            replaced,
            no_op: false,
        })
    }

    /// True when the adapter currently has a loaded store. Strictly
    /// per-adapter.
    #[must_use]
    pub fn is_loaded(&self, adapter: &AdapterId) -> bool {
        self.lock().contains_key(adapter)
    }

    /// When the adapter's current store was loaded.
    #[must_use]
    pub fn loaded_at(&self, adapter: &AdapterId) -> Option<DateTime<Utc>> {
        self.lock().get(adapter).map(|s| s.loaded_at)
    }

    /// Releases the adapter's context. Queries still holding the snapshot
    /// drain; the store is freed once the last reference drops. Returns the
    /// disposed store version for cache invalidation.
    pub fn dispose(&self, adapter: &AdapterId) -> Option<StoreVersion> {
        let removed = self.lock().remove(adapter).map(|s| s.store.version());
        if let Some(version) = removed {
            info!(adapter = %adapter, version = %version, "adapter disposed");
        }
        removed
    }

    /// Resolves the adapter's current snapshot for query dispatch.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AdapterNotLoaded`] when no store is active.
    pub fn resolve(&self, adapter: &AdapterId) -> Result<AdapterSnapshot, GatewayError> {
        let guard = self.lock();
        let state = guard
            .get(adapter)
            .ok_or_else(|| GatewayError::AdapterNotLoaded {
                adapter: adapter.to_string(),
            })?;
        Ok(AdapterSnapshot {
            adapter: adapter.clone(),
            context: Arc::clone(&state.context),
            version: state.store.version(),
        })
    }

    /// Adapters with an active store, sorted by identity.
    #[must_use]
    pub fn loaded_adapters(&self) -> Vec<AdapterId> {
        let mut ids: Vec<AdapterId> = self.lock().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AdapterId, AdapterState>> {
        // A poisoned map mutex means a panic while holding a pointer swap;
        // the map itself is still structurally sound, so recover the guard.
        self.adapters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
