//! The engine facade: one object wiring lifecycle, gateway, profiler, and
//! the harmony layer together.
//!
//! Hosts construct an [`Engine`], load one rule catalogue per adapter, and
//! issue queries or harmony operations. Cache hygiene on reload and dispose
//! is handled here so callers cannot observe stale solution sets.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{CadenzaResult, GatewayError};
use crate::eval::EvalLimits;
use crate::gateway::{GatewayConfig, QueryGateway, QueryHandle, QueryOutcome};
use crate::harmony::{HarmonyAnalyzer, Key, ProgressionAnalysis, Suggestion, Technique};
use crate::lifecycle::{AdapterId, LifecycleManager, SwapReport};
use crate::pitch::Chord;
use crate::profiler::{Profiler, QueryRecord, StatsSnapshot};
use crate::store::StoreVersion;
use crate::term::Term;

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Budgets applied to queries unless the caller overrides them.
    pub default_limits: EvalLimits,
    /// Worker queue and cache sizing.
    pub gateway: GatewayConfig,
    /// How many finished-query records the profiler retains.
    pub profiler_capacity: usize,
    /// Queries slower than this are flagged and logged.
    pub slow_query_threshold: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limits: EvalLimits::default(),
            gateway: GatewayConfig::default(),
            profiler_capacity: 1024,
            slow_query_threshold: Profiler::DEFAULT_SLOW_THRESHOLD,
        }
    }
}

/// The top-level entry point.
///
/// Thread-safe; clone the `Arc`-wrapped engine or share references freely.
/// Each adapter gets its own store, worker, and cache entries, so adapters
/// never observe each other's data or load churn.
pub struct Engine {
    lifecycle: Arc<LifecycleManager>,
    gateway: Arc<QueryGateway>,
    profiler: Arc<Profiler>,
    harmony: HarmonyAnalyzer,
    default_limits: EvalLimits,
}

impl Engine {
    /// Builds an engine from the given configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        let lifecycle = Arc::new(LifecycleManager::new());
        let profiler = Arc::new(Profiler::new(
            config.profiler_capacity,
            config.slow_query_threshold,
        ));
        let gateway = Arc::new(QueryGateway::new(
            Arc::clone(&lifecycle),
            Arc::clone(&profiler),
            &config.gateway,
        ));
        let harmony = HarmonyAnalyzer::new(
            Arc::clone(&lifecycle),
            Arc::clone(&gateway),
            config.default_limits.clone(),
        );
        Self {
            lifecycle,
            gateway,
            profiler,
            harmony,
            default_limits: config.default_limits.clone(),
        }
    }

    /// Loads the adapter's store unless an identical source is already
    /// active. Invalidates cached results for any replaced version.
    ///
    /// # Errors
    ///
    /// Parse or validation failures; a previously active store stays in
    /// service.
    pub fn ensure_loaded(&self, adapter: &AdapterId, source: &str) -> CadenzaResult<SwapReport> {
        let report = self.lifecycle.ensure_loaded(adapter, source)?;
        if let Some(replaced) = report.replaced {
            self.gateway.cache().invalidate_version(replaced);
        }
        Ok(report)
    }

    /// Atomically replaces the adapter's store and drops the replaced
    /// version's cached results.
    ///
    /// # Errors
    ///
    /// Parse or validation failures; the previous store stays in service.
    pub fn reload(&self, adapter: &AdapterId, source: &str) -> CadenzaResult<SwapReport> {
        let report = self.lifecycle.reload(adapter, source)?;
        if let Some(replaced) = report.replaced {
            self.gateway.cache().invalidate_version(replaced);
        }
        Ok(report)
    }

    /// Unloads the adapter: drops its store, cached results, and worker.
    /// In-flight queries keep their snapshot and complete normally.
    pub fn dispose(&self, adapter: &AdapterId) -> Option<StoreVersion> {
        let removed = self.lifecycle.dispose(adapter);
        if let Some(version) = removed {
            self.gateway.cache().invalidate_version(version);
        }
        self.gateway.retire(adapter);
        removed
    }

    /// True when the adapter has an active store.
    #[must_use]
    pub fn is_loaded(&self, adapter: &AdapterId) -> bool {
        self.lifecycle.is_loaded(adapter)
    }

    /// Adapters with an active store, sorted by id.
    #[must_use]
    pub fn loaded_adapters(&self) -> Vec<AdapterId> {
        self.lifecycle.loaded_adapters()
    }

    /// The adapter's active store version.
    pub fn store_version(&self, adapter: &AdapterId) -> Result<StoreVersion, GatewayError> {
        Ok(self.lifecycle.resolve(adapter)?.version)
    }

    /// Submits a query with the engine's default limits. Non-blocking; the
    /// returned handle joins, cancels, or waits with a timeout.
    ///
    /// # Errors
    ///
    /// See [`QueryGateway::query`].
    pub fn query(&self, adapter: &AdapterId, goal: &Term) -> Result<QueryHandle, GatewayError> {
        self.gateway.query(adapter, goal, &self.default_limits)
    }

    /// Submits a query with explicit limits.
    ///
    /// # Errors
    ///
    /// See [`QueryGateway::query`].
    pub fn query_with_limits(
        &self,
        adapter: &AdapterId,
        goal: &Term,
        limits: &EvalLimits,
    ) -> Result<QueryHandle, GatewayError> {
        self.gateway.query(adapter, goal, limits)
    }

    /// Submits a query and waits for its outcome.
    ///
    /// # Errors
    ///
    /// See [`QueryGateway::query`].
    pub fn query_blocking(
        &self,
        adapter: &AdapterId,
        goal: &Term,
    ) -> Result<QueryOutcome, GatewayError> {
        self.gateway
            .query_blocking(adapter, goal, &self.default_limits)
    }

    /// Detects cadences and modulations in a progression. See
    /// [`HarmonyAnalyzer::analyze_progression`].
    ///
    /// # Errors
    ///
    /// Fails when the adapter is not loaded.
    pub fn analyze_progression(
        &self,
        adapter: &AdapterId,
        chords: &[Chord],
        key: Key,
    ) -> CadenzaResult<ProgressionAnalysis> {
        self.harmony.analyze_progression(adapter, chords, key)
    }

    /// Suggests chords borrowed from parallel modes. See
    /// [`HarmonyAnalyzer::suggest_modal_interchange`].
    ///
    /// # Errors
    ///
    /// Fails when the adapter is not loaded or the catalogue lacks the
    /// interchange predicates.
    pub fn suggest_modal_interchange(
        &self,
        adapter: &AdapterId,
        chord: &Chord,
        key: Key,
        max_suggestions: usize,
    ) -> CadenzaResult<Vec<Suggestion>> {
        self.harmony
            .suggest_modal_interchange(adapter, chord, key, max_suggestions)
    }

    /// Suggests reharmonizations using the given techniques. See
    /// [`HarmonyAnalyzer::suggest_reharmonizations`].
    ///
    /// # Errors
    ///
    /// Fails when the adapter is not loaded or the catalogue lacks the
    /// technique predicates.
    pub fn suggest_reharmonizations(
        &self,
        adapter: &AdapterId,
        chord: &Chord,
        key: Key,
        techniques: &[Technique],
        max_suggestions: usize,
    ) -> CadenzaResult<Vec<Suggestion>> {
        self.harmony
            .suggest_reharmonizations(adapter, chord, key, techniques, max_suggestions)
    }

    /// Aggregated per-predicate timing statistics.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.profiler.snapshot()
    }

    /// The most recent finished-query records, newest last.
    #[must_use]
    pub fn recent_queries(&self, limit: usize) -> Vec<QueryRecord> {
        self.profiler.recent(limit)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
