use cadenza::{
    AdapterId, BudgetKind, Engine, EngineConfig, EvalError, EvalLimits, GatewayError, Term,
};

const TONES_KB: &str = r"
    :- declare(chord_tones, 2).
    chord_tones(c_major, [c, e, g]).
    chord_tones(a_minor, [a, c, e]).
    chord_tones(g7, [g, b, d, f]).

    :- declare(has_tone, 2).
    has_tone(Chord, Tone) :- chord_tones(Chord, Tones), member(Tone, Tones).
";

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn engine_with(adapter: &AdapterId, source: &str) -> Engine {
    init_tracing();
    let engine = Engine::default();
    engine.ensure_loaded(adapter, source).unwrap();
    engine
}

fn has_tone_goal(chord: &str) -> Term {
    Term::compound("has_tone", vec![Term::atom(chord), Term::var("T")])
}

#[test]
fn query_through_the_full_stack() {
    let adapter = AdapterId::from("editor");
    let engine = engine_with(&adapter, TONES_KB);

    let outcome = engine.query_blocking(&adapter, &has_tone_goal("g7")).unwrap();
    let solutions = outcome.solutions().unwrap();
    let tones: Vec<String> = solutions
        .iter()
        .map(|s| s.get("T").unwrap().to_string())
        .collect();
    assert_eq!(tones, vec!["g", "b", "d", "f"]);

    // Every solution explains itself.
    for s in solutions {
        assert!(!s.trace.0.is_empty());
    }
}

#[test]
fn identical_queries_are_deterministic_across_runs() {
    let adapter = AdapterId::from("editor");
    let engine = engine_with(&adapter, TONES_KB);
    let goal = Term::compound("has_tone", vec![Term::var("C"), Term::var("T")]);

    let first = engine.query_blocking(&adapter, &goal).unwrap();
    let second = engine.query_blocking(&adapter, &goal).unwrap();
    assert_eq!(
        first.solutions().unwrap().to_vec(),
        second.solutions().unwrap().to_vec()
    );
}

#[test]
fn reload_invalidates_cached_results() {
    let adapter = AdapterId::from("editor");
    let engine = engine_with(&adapter, TONES_KB);
    let goal = Term::compound("chord_tones", vec![Term::atom("c_major"), Term::var("X")]);

    let before = engine.query_blocking(&adapter, &goal).unwrap();
    assert_eq!(
        before.solutions().unwrap()[0].get("X").unwrap().to_string(),
        "[c, e, g]"
    );

    let updated = ":- declare(chord_tones, 2).\nchord_tones(c_major, [c, e, g, b]).";
    let report = engine.reload(&adapter, updated).unwrap();
    assert!(report.replaced.is_some());

    let after = engine.query_blocking(&adapter, &goal).unwrap();
    assert_eq!(
        after.solutions().unwrap()[0].get("X").unwrap().to_string(),
        "[c, e, g, b]"
    );
}

#[test]
fn ensure_loaded_with_identical_content_is_a_no_op() {
    let adapter = AdapterId::from("editor");
    let engine = engine_with(&adapter, TONES_KB);
    let first = engine.store_version(&adapter).unwrap();

    let report = engine.ensure_loaded(&adapter, TONES_KB).unwrap();
    assert!(report.no_op);
    assert_eq!(report.version, first);
    assert_eq!(report.replaced, None);
}

#[test]
fn failed_load_keeps_the_previous_store_serving() {
    let adapter = AdapterId::from("editor");
    let engine = engine_with(&adapter, TONES_KB);

    let err = engine.reload(&adapter, "chord_tones(broken").unwrap_err();
    assert!(!err.is_retryable());

    let outcome = engine.query_blocking(&adapter, &has_tone_goal("c_major")).unwrap();
    assert_eq!(outcome.solutions().unwrap().len(), 3);
}

#[test]
fn dispose_isolates_adapters() {
    let a = AdapterId::from("editor-a");
    let b = AdapterId::from("editor-b");
    let engine = Engine::default();
    engine.ensure_loaded(&a, TONES_KB).unwrap();
    engine
        .ensure_loaded(&b, ":- declare(chord_tones, 2).\nchord_tones(d_minor, [d, f, a]).")
        .unwrap();

    assert!(engine.dispose(&a).is_some());
    assert!(!engine.is_loaded(&a));
    assert_eq!(engine.loaded_adapters(), vec![b.clone()]);

    let err = engine
        .query_blocking(&a, &has_tone_goal("c_major"))
        .unwrap_err();
    assert!(matches!(err, GatewayError::AdapterNotLoaded { .. }));

    // The other adapter is untouched.
    let goal = Term::compound("chord_tones", vec![Term::atom("d_minor"), Term::var("X")]);
    let outcome = engine.query_blocking(&b, &goal).unwrap();
    assert_eq!(outcome.solutions().unwrap().len(), 1);
}

#[test]
fn cyclic_rules_surface_a_typed_budget_error() {
    let adapter = AdapterId::from("editor");
    let cyclic = ":- declare(loop, 1).\nloop(X) :- loop(X).\nloop(seed) :- loop(seed).";
    let config = EngineConfig {
        default_limits: EvalLimits {
            max_steps: 10_000,
            ..EvalLimits::default()
        },
        ..EngineConfig::default()
    };
    let engine = Engine::new(&config);
    engine.ensure_loaded(&adapter, cyclic).unwrap();

    let goal = Term::compound("loop", vec![Term::atom("seed")]);
    let err = engine.query_blocking(&adapter, &goal).unwrap_err();
    let GatewayError::Eval(EvalError::ResourceExceeded { kind, .. }) = err else {
        panic!("expected ResourceExceeded, got {err:?}");
    };
    assert!(matches!(kind, BudgetKind::Depth | BudgetKind::Steps));
}

#[test]
fn cancellation_wins_over_delivered_solutions() {
    let adapter = AdapterId::from("editor");
    let engine = engine_with(&adapter, TONES_KB);

    let handle = engine.query(&adapter, &has_tone_goal("c_major")).unwrap();
    handle.cancel();
    let outcome = handle.join().unwrap();
    assert!(outcome.is_cancelled());
}

#[test]
fn stats_aggregate_per_predicate() {
    let adapter = AdapterId::from("editor");
    let engine = engine_with(&adapter, TONES_KB);
    let goal = has_tone_goal("g7");

    engine.query_blocking(&adapter, &goal).unwrap();
    engine.query_blocking(&adapter, &goal).unwrap();
    engine.query_blocking(&adapter, &goal).unwrap();

    let stats = engine.stats();
    let per_predicate = &stats.predicates["has_tone/2"];
    assert_eq!(per_predicate.count, 3);
    // Second and third calls were served by the cache.
    assert_eq!(per_predicate.cache_hits, 2);
    assert_eq!(per_predicate.slow_count, 0);

    let tones = Term::compound("chord_tones", vec![Term::atom("g7"), Term::var("X")]);
    engine.query_blocking(&adapter, &tones).unwrap();

    // Records come back newest last.
    let recent = engine.recent_queries(2);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].predicate, "has_tone/2");
    assert_eq!(recent[1].predicate, "chord_tones/2");
}
