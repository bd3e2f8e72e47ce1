//! Query profiling and slow-query detection.
//!
//! The profiler wraps every gateway call with a single start/stop timing
//! measurement and records the result into a bounded ring buffer. It never
//! touches query results and adds nothing inside evaluation. Queries slower
//! than the configured threshold are flagged and logged with enough context
//! (goal shape, adapter, store version) to reproduce offline.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One recorded query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    /// Goal predicate, e.g. `borrowed/4`.
    pub predicate: String,
    /// Adapter the query ran for.
    pub adapter: String,
    /// Store version the query ran against.
    pub store_version: String,
    /// Wall-clock duration of the whole gateway call.
    pub elapsed: Duration,
    /// Number of solutions returned (0 on error).
    pub solutions: usize,
    /// Whether the result came from the cache.
    pub cache_hit: bool,
    /// Whether the query exceeded the slow threshold.
    pub slow: bool,
    /// When the query completed.
    pub completed_at: DateTime<Utc>,
}

/// Aggregated statistics for one predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateStats {
    /// Number of recorded queries.
    pub count: usize,
    /// Median latency.
    pub p50: Duration,
    /// 95th-percentile latency.
    pub p95: Duration,
    /// Maximum latency.
    pub max: Duration,
    /// Queries over the slow threshold.
    pub slow_count: usize,
    /// Cache hits.
    pub cache_hits: usize,
}

/// Snapshot of recorded query statistics, retrievable on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Per-predicate aggregates, sorted by predicate name.
    pub predicates: BTreeMap<String, PredicateStats>,
    /// Total records currently in the ring buffer.
    pub recorded: usize,
    /// The slow threshold in effect.
    pub slow_threshold: Duration,
}

/// Bounded-buffer query profiler.
#[derive(Debug)]
pub struct Profiler {
    records: Mutex<VecDeque<QueryRecord>>,
    capacity: usize,
    slow_threshold: Duration,
}

impl Profiler {
    /// Default slow-query threshold.
    pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(250);

    /// Creates a profiler with the given ring capacity and slow threshold.
    #[must_use]
    pub fn new(capacity: usize, slow_threshold: Duration) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            slow_threshold,
        }
    }

    /// The configured slow threshold.
    #[must_use]
    pub const fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Records one completed query. Marks and logs it when slow.
    pub fn record(
        &self,
        predicate: &str,
        adapter: &str,
        store_version: &str,
        elapsed: Duration,
        solutions: usize,
        cache_hit: bool,
    ) {
        let slow = elapsed >= self.slow_threshold;
        if slow {
            warn!(
                predicate,
                adapter,
                store_version,
                elapsed_ms = elapsed.as_millis() as u64,
                solutions,
                "slow query"
            );
        }
        let record = QueryRecord {
            predicate: predicate.to_string(),
            adapter: adapter.to_string(),
            store_version: store_version.to_string(),
            elapsed,
            solutions,
            cache_hit,
            slow,
            completed_at: Utc::now(),
        };
        if let Ok(mut guard) = self.records.lock() {
            if guard.len() >= self.capacity {
                guard.pop_front();
            }
            guard.push_back(record);
        }
    }

    /// Aggregates the ring buffer into a per-predicate snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let records: Vec<QueryRecord> = self
            .records
            .lock()
            .map(|guard| guard.iter().cloned().collect())
            .unwrap_or_default();

        let mut by_predicate: BTreeMap<String, Vec<&QueryRecord>> = BTreeMap::new();
        for record in &records {
            by_predicate
                .entry(record.predicate.clone())
                .or_default()
                .push(record);
        }

        let mut predicates = BTreeMap::new();
        for (predicate, group) in by_predicate {
            let mut latencies: Vec<Duration> = group.iter().map(|r| r.elapsed).collect();
            latencies.sort_unstable();
            let stats = PredicateStats {
                count: latencies.len(),
                p50: percentile(&latencies, 50),
                p95: percentile(&latencies, 95),
                max: latencies.last().copied().unwrap_or_default(),
                slow_count: group.iter().filter(|r| r.slow).count(),
                cache_hits: group.iter().filter(|r| r.cache_hit).count(),
            };
            predicates.insert(predicate, stats);
        }

        StatsSnapshot {
            predicates,
            recorded: records.len(),
            slow_threshold: self.slow_threshold,
        }
    }

    /// Most recent records, newest last. Bounded by the ring capacity.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<QueryRecord> {
        self.records.lock().map_or_else(
            |_| Vec::new(),
            |guard| {
                let skip = guard.len().saturating_sub(limit);
                guard.iter().skip(skip).cloned().collect()
            },
        )
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_ms(profiler: &Profiler, predicate: &str, ms: u64) {
        profiler.record(
            predicate,
            "session-1",
            "v1",
            Duration::from_millis(ms),
            1,
            false,
        );
    }

    #[test]
    fn snapshot_aggregates_per_predicate() {
        let profiler = Profiler::new(64, Duration::from_millis(100));
        for ms in [10, 20, 30, 40] {
            record_ms(&profiler, "cadence/3", ms);
        }
        record_ms(&profiler, "borrowed/4", 150);

        let snapshot = profiler.snapshot();
        assert_eq!(snapshot.recorded, 5);

        let cadence = &snapshot.predicates["cadence/3"];
        assert_eq!(cadence.count, 4);
        assert_eq!(cadence.p50, Duration::from_millis(20));
        assert_eq!(cadence.max, Duration::from_millis(40));
        assert_eq!(cadence.slow_count, 0);

        let borrowed = &snapshot.predicates["borrowed/4"];
        assert_eq!(borrowed.slow_count, 1);
    }

    #[test]
    fn ring_buffer_is_bounded() {
        let profiler = Profiler::new(3, Profiler::DEFAULT_SLOW_THRESHOLD);
        for ms in [1, 2, 3, 4, 5] {
            record_ms(&profiler, "p/1", ms);
        }
        let recent = profiler.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].elapsed, Duration::from_millis(3));
        assert_eq!(recent[2].elapsed, Duration::from_millis(5));
    }

    #[test]
    fn cache_hits_are_counted() {
        let profiler = Profiler::new(8, Profiler::DEFAULT_SLOW_THRESHOLD);
        profiler.record("p/1", "a", "v1", Duration::from_millis(1), 2, true);
        profiler.record("p/1", "a", "v1", Duration::from_millis(1), 2, false);
        let snapshot = profiler.snapshot();
        assert_eq!(snapshot.predicates["p/1"].cache_hits, 1);
    }

    #[test]
    fn percentile_edges() {
        assert_eq!(percentile(&[], 50), Duration::ZERO);
        let one = [Duration::from_millis(7)];
        assert_eq!(percentile(&one, 50), Duration::from_millis(7));
        assert_eq!(percentile(&one, 95), Duration::from_millis(7));
    }
}
