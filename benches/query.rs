use std::fmt::Write as _;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use cadenza::{
    catalog, AdapterId, Chord, Engine, EvalContext, EvalLimits, Key, Mode, PitchClass, RuleStore,
    Term,
};

/// A synthetic store with `n` chord_tones facts plus a rule layer, so
/// resolution measures realistic clause scans.
fn make_store(n: usize) -> Arc<RuleStore> {
    let mut src = String::from(":- declare(chord_tones, 2).\n");
    for i in 0..n {
        let _ = writeln!(src, "chord_tones(chord_{i}, [c, e, g, n{i}]).");
    }
    src.push_str(":- declare(has_tone, 2).\n");
    src.push_str("has_tone(C, T) :- chord_tones(C, Ts), member(T, Ts).\n");
    src.push_str(":- declare(shares_tone, 2).\n");
    src.push_str("shares_tone(A, B) :- has_tone(A, T), has_tone(B, T), neq(A, B).\n");
    Arc::new(RuleStore::load(&src).unwrap())
}

fn bench_fact_lookup(c: &mut Criterion) {
    let ctx = EvalContext::new(make_store(256));
    let goal = Term::compound("chord_tones", vec![Term::atom("chord_200"), Term::var("X")]);
    let limits = EvalLimits::default();

    let mut group = c.benchmark_group("eval");
    group.throughput(Throughput::Elements(1));
    group.bench_function("fact_lookup_256", |b| {
        b.iter(|| ctx.query(&goal, &limits).unwrap());
    });
    group.finish();
}

fn bench_rule_backtracking(c: &mut Criterion) {
    let ctx = EvalContext::new(make_store(64));
    let goal = Term::compound("has_tone", vec![Term::var("C"), Term::atom("e")]);
    let limits = EvalLimits::with_max_solutions(64);

    let mut group = c.benchmark_group("eval");
    group.throughput(Throughput::Elements(64));
    group.bench_function("rule_backtracking_64", |b| {
        b.iter(|| ctx.query(&goal, &limits).unwrap());
    });
    group.finish();
}

fn bench_gateway_cached_query(c: &mut Criterion) {
    let engine = Engine::default();
    let adapter = AdapterId::from("bench");
    engine.ensure_loaded(&adapter, catalog::STANDARD).unwrap();
    let goal = Term::compound(
        "diatonic",
        vec![Term::var("M"), Term::var("D"), Term::var("Q")],
    );
    // Warm the cache; the loop then measures the cached fast path.
    engine.query_blocking(&adapter, &goal).unwrap();

    c.bench_function("gateway/cached_query", |b| {
        b.iter(|| engine.query_blocking(&adapter, &goal).unwrap());
    });
}

fn bench_modal_interchange(c: &mut Criterion) {
    let engine = Engine::default();
    let adapter = AdapterId::from("bench");
    engine.ensure_loaded(&adapter, catalog::STANDARD).unwrap();
    let chord = Chord::parse_symbol("C").unwrap();
    let key = Key::new(PitchClass::from_atom("c").unwrap(), Mode::Ionian);

    c.bench_function("harmony/modal_interchange", |b| {
        b.iter(|| {
            engine
                .suggest_modal_interchange(&adapter, &chord, key, 8)
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_fact_lookup,
    bench_rule_backtracking,
    bench_gateway_cached_query,
    bench_modal_interchange
);
criterion_main!(benches);
