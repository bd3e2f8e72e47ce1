//! The query gateway: the sole entry point consumers call.
//!
//! Each adapter gets a dedicated worker thread fed by a bounded
//! crossbeam channel, so a pathological query (deep recursion, huge solution
//! space) in one adapter cannot stall another adapter's queries and the
//! calling thread never blocks on evaluation. Results come back through a
//! [`QueryHandle`] with `join` / `join_timeout` / `cancel`.
//!
//! Recovery is bounded to one retry in both failure modes: a worker found
//! dead at submission is respawned exactly once and the request resent once,
//! and an evaluation that panics mid-flight is re-run exactly once. A second
//! failure of either kind surfaces [`GatewayError::WorkerUnavailable`] to the
//! caller.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use crate::cache::QueryCache;
use crate::error::{EvalError, GatewayError};
use crate::eval::{EvalLimits, Solution};
use crate::lifecycle::{AdapterId, AdapterSnapshot, LifecycleManager};
use crate::profiler::Profiler;
use crate::term::Term;

/// Extra slack on caller-side waits so the in-solver deadline fires first.
const TIMEOUT_GRACE: Duration = Duration::from_millis(50);

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum queued queries per adapter worker.
    pub queue_capacity: usize,
    /// Maximum cached solution sets.
    pub cache_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            cache_capacity: 1024,
        }
    }
}

/// The final status of a query.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// Evaluation completed; the solution set may be empty.
    Solutions(Arc<[Solution]>),
    /// The caller cancelled the query before a result was delivered.
    Cancelled,
}

impl QueryOutcome {
    /// The solutions, unless the query was cancelled.
    #[must_use]
    pub fn solutions(&self) -> Option<&[Solution]> {
        match self {
            Self::Solutions(s) => Some(s),
            Self::Cancelled => None,
        }
    }

    /// True when the query was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

enum Job {
    Query {
        snapshot: AdapterSnapshot,
        goal: Term,
        limits: EvalLimits,
        cancel: Arc<AtomicBool>,
        reply: Sender<Result<QueryOutcome, GatewayError>>,
    },

    #[cfg(test)]
    Exit,
}

struct Worker {
    tx: Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(adapter: &AdapterId, queue_capacity: usize, cache: Arc<QueryCache>) -> Self {
        let (tx, rx) = bounded::<Job>(queue_capacity);
        let thread_name = format!("cadenza-worker-{adapter}");
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker_loop(&rx, &cache))
            .ok();
        if handle.is_none() {
            warn!(adapter = %adapter, "failed to spawn query worker");
        }
        Self { tx, handle }
    }

    // A worker whose channel is already disconnected, for exercising the
    // respawn bound.
    #[cfg(test)]
    fn dead() -> Self {
        let (tx, rx) = bounded::<Job>(1);
        drop(rx);
        Self { tx, handle: None }
    }
}

fn worker_loop(rx: &Receiver<Job>, cache: &Arc<QueryCache>) {
    while let Ok(job) = rx.recv() {
        match job {
            Job::Query {
                snapshot,
                goal,
                limits,
                cancel,
                reply,
            } => {
                let result = evaluate_with_retry(|| {
                    snapshot.context.query_with_cancel(&goal, &limits, &cancel)
                });
                let outcome = match result {
                    Some(Ok(solutions)) => {
                        let solutions: Arc<[Solution]> = Arc::from(solutions);
                        if !cancel.load(Ordering::Relaxed) {
                            cache.insert(snapshot.version, &goal, &limits, Arc::clone(&solutions));
                        }
                        Ok(QueryOutcome::Solutions(solutions))
                    }
                    Some(Err(EvalError::Cancelled)) => Ok(QueryOutcome::Cancelled),
                    Some(Err(err)) => Err(GatewayError::Eval(err)),
                    None => Err(GatewayError::WorkerUnavailable {
                        adapter: snapshot.adapter.to_string(),
                    }),
                };
                let _ = reply.send(outcome);
            }

            #[cfg(test)]
            Job::Exit => break,
        }
    }
}

/// Runs the evaluation, retrying exactly once if it panics. `None` means both
/// attempts panicked; the caller maps that to `WorkerUnavailable`.
fn evaluate_with_retry<T>(mut eval: impl FnMut() -> T) -> Option<T> {
    for attempt in 1..=2u8 {
        match catch_unwind(AssertUnwindSafe(&mut eval)) {
            Ok(value) => return Some(value),
            Err(_) => warn!(attempt, "evaluation panicked"),
        }
    }
    None
}

/// Handle to an in-flight query.
///
/// Dropping the handle without joining abandons the result; the worker's send
/// simply finds no receiver.
#[derive(Debug)]
pub struct QueryHandle {
    rx: Receiver<Result<QueryOutcome, GatewayError>>,
    cancel: Arc<AtomicBool>,
    adapter: String,
    predicate: String,
    store_version: String,
    timeout: Option<Duration>,
    cache_hit: bool,
    started: Instant,
    profiler: Arc<Profiler>,
}

impl QueryHandle {
    /// Requests cancellation. Best-effort once evaluation has started, but a
    /// cancelled query never delivers solutions: `join` reports `Cancelled`
    /// even if the worker finished first.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Waits for the query to complete, honoring the query's own timeout.
    pub fn join(self) -> Result<QueryOutcome, GatewayError> {
        match self.timeout {
            Some(timeout) => self.wait(timeout + TIMEOUT_GRACE, timeout),
            None => {
                let worker_gone = GatewayError::WorkerUnavailable {
                    adapter: self.adapter.clone(),
                };
                let received = self.rx.recv().map_err(|_| worker_gone);
                self.finish(received)
            }
        }
    }

    /// Waits with an explicit caller-side bound, independent of the query's
    /// own timeout.
    pub fn join_timeout(self, wait: Duration) -> Result<QueryOutcome, GatewayError> {
        self.wait(wait, wait)
    }

    fn wait(
        self,
        wait: Duration,
        reported_timeout: Duration,
    ) -> Result<QueryOutcome, GatewayError> {
        let received = self.rx.recv_timeout(wait).map_err(|err| match err {
            crossbeam_channel::RecvTimeoutError::Timeout => GatewayError::EvalTimeout {
                timeout_ms: reported_timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            crossbeam_channel::RecvTimeoutError::Disconnected => GatewayError::WorkerUnavailable {
                adapter: self.adapter.clone(),
            },
        });
        self.finish(received)
    }

    fn finish(
        self,
        received: Result<Result<QueryOutcome, GatewayError>, GatewayError>,
    ) -> Result<QueryOutcome, GatewayError> {
        let mut result = received.and_then(|inner| inner);

        // A deadline hit inside the solver is a timeout at this boundary.
        if let Err(GatewayError::Eval(EvalError::DeadlineExceeded { .. })) = &result {
            result = Err(GatewayError::EvalTimeout {
                timeout_ms: self
                    .timeout
                    .map_or(0, |t| t.as_millis().min(u128::from(u64::MAX)) as u64),
            });
        }

        // A cancelled query never delivers solutions, even if the worker
        // finished before observing the flag.
        if self.cancel.load(Ordering::SeqCst) {
            if let Ok(QueryOutcome::Solutions(_)) = &result {
                result = Ok(QueryOutcome::Cancelled);
            }
        }

        let solutions = match &result {
            Ok(QueryOutcome::Solutions(s)) => s.len(),
            _ => 0,
        };
        self.profiler.record(
            &self.predicate,
            &self.adapter,
            &self.store_version,
            self.started.elapsed(),
            solutions,
            self.cache_hit,
        );
        result
    }
}

/// Dispatches queries to per-adapter evaluation workers.
pub struct QueryGateway {
    lifecycle: Arc<LifecycleManager>,
    cache: Arc<QueryCache>,
    profiler: Arc<Profiler>,
    workers: Mutex<HashMap<AdapterId, Worker>>,
    queue_capacity: usize,
    #[cfg(test)]
    spawn_disabled: AtomicBool,
}

impl QueryGateway {
    /// Creates a gateway over the given lifecycle manager and profiler.
    #[must_use]
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        profiler: Arc<Profiler>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            lifecycle,
            cache: Arc::new(QueryCache::new(config.cache_capacity)),
            profiler,
            workers: Mutex::new(HashMap::new()),
            queue_capacity: config.queue_capacity.max(1),
            #[cfg(test)]
            spawn_disabled: AtomicBool::new(false),
        }
    }

    fn spawn_worker(&self, adapter: &AdapterId) -> Worker {
        #[cfg(test)]
        if self.spawn_disabled.load(Ordering::Relaxed) {
            return Worker::dead();
        }
        Worker::spawn(adapter, self.queue_capacity, Arc::clone(&self.cache))
    }

    /// The shared result cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Submits a query for the adapter. Returns immediately with a handle;
    /// evaluation runs on the adapter's worker.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AdapterNotLoaded`] when the adapter has no store,
    /// [`GatewayError::QueueFull`] under backpressure, and
    /// [`GatewayError::WorkerUnavailable`] when the worker died and the single
    /// respawn-and-retry also failed.
    pub fn query(
        &self,
        adapter: &AdapterId,
        goal: &Term,
        limits: &EvalLimits,
    ) -> Result<QueryHandle, GatewayError> {
        let snapshot = self.lifecycle.resolve(adapter)?;
        let predicate = goal
            .functor()
            .map_or_else(|| goal.type_name().to_string(), |(n, a)| format!("{n}/{a}"));
        let started = Instant::now();
        let store_version = snapshot.version.to_string();

        if let Some(hit) = self.cache.get(snapshot.version, goal, limits) {
            debug!(adapter = %adapter, predicate, "cache hit");
            let (tx, rx) = bounded(1);
            let _ = tx.send(Ok(QueryOutcome::Solutions(hit)));
            return Ok(QueryHandle {
                rx,
                cancel: Arc::new(AtomicBool::new(false)),
                adapter: adapter.to_string(),
                predicate,
                store_version,
                timeout: limits.timeout,
                cache_hit: true,
                started,
                profiler: Arc::clone(&self.profiler),
            });
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let (reply, rx) = bounded(1);
        let job = Job::Query {
            snapshot,
            goal: goal.clone(),
            limits: limits.clone(),
            cancel: Arc::clone(&cancel),
            reply,
        };
        self.submit(adapter, job)?;

        Ok(QueryHandle {
            rx,
            cancel,
            adapter: adapter.to_string(),
            predicate,
            store_version,
            timeout: limits.timeout,
            cache_hit: false,
            started,
            profiler: Arc::clone(&self.profiler),
        })
    }

    /// Convenience wrapper: submit and wait.
    pub fn query_blocking(
        &self,
        adapter: &AdapterId,
        goal: &Term,
        limits: &EvalLimits,
    ) -> Result<QueryOutcome, GatewayError> {
        self.query(adapter, goal, limits)?.join()
    }

    fn submit(&self, adapter: &AdapterId, job: Job) -> Result<(), GatewayError> {
        let mut workers = self
            .workers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let worker = workers
            .entry(adapter.clone())
            .or_insert_with(|| self.spawn_worker(adapter));

        match worker.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(GatewayError::QueueFull {
                adapter: adapter.to_string(),
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(job)) => {
                // Exactly one respawn and one retry; a second failure is the
                // caller's problem.
                warn!(adapter = %adapter, "query worker dead, respawning once");
                let fresh = self.spawn_worker(adapter);
                let retry = fresh.tx.try_send(job);
                let old = std::mem::replace(worker, fresh);
                drop(workers);
                if let Some(handle) = old.handle {
                    let _ = handle.join();
                }
                match retry {
                    Ok(()) => Ok(()),
                    Err(TrySendError::Full(_)) => Err(GatewayError::QueueFull {
                        adapter: adapter.to_string(),
                        capacity: self.queue_capacity,
                    }),
                    Err(TrySendError::Disconnected(_)) => Err(GatewayError::WorkerUnavailable {
                        adapter: adapter.to_string(),
                    }),
                }
            }
        }
    }

    /// Shuts down and removes the adapter's worker. Queued queries drain
    /// before the thread exits.
    pub fn retire(&self, adapter: &AdapterId) {
        let worker = self
            .workers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(adapter);
        if let Some(worker) = worker {
            drop(worker.tx);
            if let Some(handle) = worker.handle {
                let _ = handle.join();
            }
        }
    }

    #[cfg(test)]
    fn kill_worker(&self, adapter: &AdapterId) {
        let mut workers = self
            .workers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(worker) = workers.get_mut(adapter) {
            let _ = worker.tx.send(Job::Exit);
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for QueryGateway {
    fn drop(&mut self) {
        // Deterministic shutdown: close every channel, then join. Workers are
        // blocked on recv(), so this is fast.
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for (_, worker) in workers {
            drop(worker.tx);
            if let Some(handle) = worker.handle {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KB: &str = r"
        :- declare(chord_tones, 2).
        chord_tones(c_major, [c, e, g]).
        chord_tones(g7, [g, b, d, f]).

        :- declare(has_tone, 2).
        has_tone(Chord, Tone) :- chord_tones(Chord, Tones), member(Tone, Tones).
    ";

    fn gateway_with(adapter: &AdapterId) -> QueryGateway {
        let lifecycle = Arc::new(LifecycleManager::new());
        lifecycle.ensure_loaded(adapter, KB).unwrap();
        let profiler = Arc::new(Profiler::new(64, Profiler::DEFAULT_SLOW_THRESHOLD));
        QueryGateway::new(lifecycle, profiler, &GatewayConfig::default())
    }

    fn tones_goal() -> Term {
        Term::compound("chord_tones", vec![Term::atom("c_major"), Term::var("X")])
    }

    #[test]
    fn query_resolves_asynchronously() {
        let adapter = AdapterId::from("a");
        let gateway = gateway_with(&adapter);
        let handle = gateway
            .query(&adapter, &tones_goal(), &EvalLimits::default())
            .unwrap();
        let outcome = handle.join().unwrap();
        let solutions = outcome.solutions().unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].get("X").unwrap().to_string(), "[c, e, g]");
    }

    #[test]
    fn unloaded_adapter_is_rejected_up_front() {
        let adapter = AdapterId::from("a");
        let gateway = gateway_with(&adapter);
        let err = gateway
            .query(&AdapterId::from("ghost"), &tones_goal(), &EvalLimits::default())
            .unwrap_err();
        assert!(matches!(err, GatewayError::AdapterNotLoaded { .. }));
    }

    #[test]
    fn second_identical_query_hits_the_cache() {
        let adapter = AdapterId::from("a");
        let gateway = gateway_with(&adapter);
        let limits = EvalLimits::default();

        let first = gateway.query_blocking(&adapter, &tones_goal(), &limits).unwrap();
        let second = gateway.query_blocking(&adapter, &tones_goal(), &limits).unwrap();
        assert_eq!(
            first.solutions().unwrap().len(),
            second.solutions().unwrap().len()
        );
        assert_eq!(gateway.cache().len(), 1);
    }

    #[test]
    fn cancelled_query_never_delivers_solutions() {
        let adapter = AdapterId::from("a");
        let gateway = gateway_with(&adapter);
        let handle = gateway
            .query(&adapter, &tones_goal(), &EvalLimits::default())
            .unwrap();
        handle.cancel();
        let outcome = handle.join().unwrap();
        assert!(outcome.is_cancelled());
    }

    #[test]
    fn timeout_is_reported_as_eval_timeout() {
        // A wide combinatorial search: 40^5 branches, shallow depth. Slow
        // enough to outlast a short deadline without recursing deeply.
        let notes: Vec<String> = (0..40).map(|i| format!("n{i}")).collect();
        let src = format!(
            ":- declare(notes, 1).\nnotes([{}]).\n:- declare(run, 5).\nrun(A, B, C, D, E) :- notes(L), member(A, L), member(B, L), member(C, L), member(D, L), member(E, L).",
            notes.join(", ")
        );
        let adapter = AdapterId::from("a");
        let lifecycle = Arc::new(LifecycleManager::new());
        lifecycle.ensure_loaded(&adapter, &src).unwrap();
        let profiler = Arc::new(Profiler::new(64, Profiler::DEFAULT_SLOW_THRESHOLD));
        let gateway = QueryGateway::new(lifecycle, profiler, &GatewayConfig::default());

        let limits = EvalLimits {
            max_solutions: usize::MAX,
            max_steps: u64::MAX,
            timeout: Some(Duration::from_millis(20)),
            ..EvalLimits::default()
        };
        let goal = Term::compound(
            "run",
            vec![
                Term::var("A"),
                Term::var("B"),
                Term::var("C"),
                Term::var("D"),
                Term::var("E"),
            ],
        );
        let err = gateway.query_blocking(&adapter, &goal, &limits).unwrap_err();
        assert!(matches!(err, GatewayError::EvalTimeout { .. }), "{err:?}");
    }

    #[test]
    fn dead_worker_is_respawned_once_and_query_succeeds() {
        let adapter = AdapterId::from("a");
        let gateway = gateway_with(&adapter);

        // Warm the worker up, then kill it.
        gateway
            .query_blocking(&adapter, &tones_goal(), &EvalLimits::default())
            .unwrap();
        gateway.kill_worker(&adapter);

        // Fresh goal so the cache cannot answer.
        let goal = Term::compound("has_tone", vec![Term::atom("g7"), Term::var("T")]);
        let outcome = gateway
            .query_blocking(&adapter, &goal, &EvalLimits::default())
            .unwrap();
        assert_eq!(outcome.solutions().unwrap().len(), 4);
    }

    #[test]
    fn a_failed_respawn_surfaces_worker_unavailable() {
        let adapter = AdapterId::from("a");
        let gateway = gateway_with(&adapter);

        gateway
            .query_blocking(&adapter, &tones_goal(), &EvalLimits::default())
            .unwrap();
        gateway.kill_worker(&adapter);
        // The one permitted respawn now produces a dead worker too.
        gateway.spawn_disabled.store(true, Ordering::Relaxed);

        let goal = Term::compound("has_tone", vec![Term::atom("g7"), Term::var("T")]);
        let err = gateway
            .query(&adapter, &goal, &EvalLimits::default())
            .unwrap_err();
        assert!(matches!(err, GatewayError::WorkerUnavailable { .. }), "{err:?}");

        // With spawning healthy again the next submission recovers.
        gateway.spawn_disabled.store(false, Ordering::Relaxed);
        let outcome = gateway
            .query_blocking(&adapter, &goal, &EvalLimits::default())
            .unwrap();
        assert_eq!(outcome.solutions().unwrap().len(), 4);
    }

    #[test]
    fn panicked_evaluation_is_retried_exactly_once() {
        let mut calls = 0;
        let result = evaluate_with_retry(|| {
            calls += 1;
            assert!(calls > 1, "first attempt fails");
            calls
        });
        assert_eq!(result, Some(2));
    }

    #[test]
    fn a_second_panic_gives_up() {
        let calls = std::cell::Cell::new(0u8);
        let result: Option<u8> = evaluate_with_retry(|| {
            calls.set(calls.get() + 1);
            panic!("never recovers")
        });
        assert!(result.is_none());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn profiler_sees_every_gateway_call() {
        let adapter = AdapterId::from("a");
        let lifecycle = Arc::new(LifecycleManager::new());
        lifecycle.ensure_loaded(&adapter, KB).unwrap();
        let profiler = Arc::new(Profiler::new(64, Profiler::DEFAULT_SLOW_THRESHOLD));
        let gateway = QueryGateway::new(
            Arc::clone(&lifecycle),
            Arc::clone(&profiler),
            &GatewayConfig::default(),
        );

        let limits = EvalLimits::default();
        gateway.query_blocking(&adapter, &tones_goal(), &limits).unwrap();
        gateway.query_blocking(&adapter, &tones_goal(), &limits).unwrap();

        let snapshot = profiler.snapshot();
        let stats = &snapshot.predicates["chord_tones/2"];
        assert_eq!(stats.count, 2);
        assert_eq!(stats.cache_hits, 1);
    }

    #[test]
    fn queries_after_reload_observe_the_new_store() {
        let adapter = AdapterId::from("a");
        let lifecycle = Arc::new(LifecycleManager::new());
        let report = lifecycle.ensure_loaded(&adapter, KB).unwrap();
        let profiler = Arc::new(Profiler::new(64, Profiler::DEFAULT_SLOW_THRESHOLD));
        let gateway = QueryGateway::new(
            Arc::clone(&lifecycle),
            profiler,
            &GatewayConfig::default(),
        );

        let limits = EvalLimits::default();
        gateway.query_blocking(&adapter, &tones_goal(), &limits).unwrap();

        let new_kb = ":- declare(chord_tones, 2).\nchord_tones(c_major, [c, e, g, b]).";
        lifecycle.reload(&adapter, new_kb).unwrap();
        gateway.cache().invalidate_version(report.version);

        let outcome = gateway.query_blocking(&adapter, &tones_goal(), &limits).unwrap();
        assert_eq!(
            outcome.solutions().unwrap()[0].get("X").unwrap().to_string(),
            "[c, e, g, b]"
        );
    }
}
