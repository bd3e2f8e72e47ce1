//! Cadence and modulation detection over chord progressions.
//!
//! Harmonic functions are computed from scale-degree arithmetic; the pattern
//! knowledge (which function pairs form which cadence, which qualities are
//! diatonic to which mode degree) lives in the rule store and is reached via
//! `cadence/3` and `diatonic/3` queries.

use super::{AnalysisFailure, Finding, HarmonyAnalyzer, Key, ProgressionAnalysis};
use crate::error::CadenzaResult;
use crate::eval::Solution;
use crate::lifecycle::AdapterId;
use crate::pitch::{function_atom, Chord, Mode, PitchClass};
use crate::term::Term;

pub(super) fn analyze(
    an: &HarmonyAnalyzer,
    adapter: &AdapterId,
    chords: &[Chord],
    key: Key,
) -> ProgressionAnalysis {
    let mut analysis = ProgressionAnalysis {
        key,
        cadences: Vec::new(),
        modulations: Vec::new(),
        failures: Vec::new(),
    };
    if chords.len() < 2 {
        return analysis;
    }

    if let Err(err) = detect_cadences(an, adapter, chords, key, &mut analysis.cadences) {
        analysis.failures.push(AnalysisFailure::new("cadence", &err));
    }
    if let Err(err) = detect_modulations(an, adapter, chords, key, &mut analysis.modulations) {
        analysis
            .failures
            .push(AnalysisFailure::new("modulation", &err));
    }
    analysis
}

/// For each adjacent function pair, asks the store which cadence pattern (if
/// any) the pair forms. Findings land on the second chord of the pair.
fn detect_cadences(
    an: &HarmonyAnalyzer,
    adapter: &AdapterId,
    chords: &[Chord],
    key: Key,
    out: &mut Vec<Finding>,
) -> CadenzaResult<()> {
    for (i, pair) in chords.windows(2).enumerate() {
        let prev_fn = chord_function(pair[0].root, key);
        let next_fn = chord_function(pair[1].root, key);
        let goal = Term::compound(
            "cadence",
            vec![
                Term::atom(prev_fn),
                Term::atom(next_fn),
                Term::var("Kind"),
            ],
        );
        for solution in an.solutions(adapter, &goal)? {
            if let Some(kind) = solution.get("Kind").and_then(Term::as_atom) {
                out.push(Finding {
                    kind: kind.to_string(),
                    position: i + 1,
                    detail: Some(format!("{} to {}", pair[0], pair[1])),
                });
            }
        }
    }
    Ok(())
}

/// Tracks the active key through the progression. A chord foreign to the
/// active key triggers a search for the nearest key that explains it (pivot
/// preference: the next chord should fit the new key too); the switch is
/// reported at the foreign chord's position.
fn detect_modulations(
    an: &HarmonyAnalyzer,
    adapter: &AdapterId,
    chords: &[Chord],
    key: Key,
    out: &mut Vec<Finding>,
) -> CadenzaResult<()> {
    let mut current = key;
    for (i, chord) in chords.iter().enumerate() {
        if is_diatonic(an, adapter, chord, current)? {
            continue;
        }
        let candidates = candidate_keys(an, adapter, chord)?;
        if candidates.is_empty() {
            // A chromatic chord no key explains; not a modulation.
            continue;
        }
        let next = chords.get(i + 1);
        let mut confirmed: Vec<Key> = Vec::new();
        if let Some(next) = next {
            for cand in &candidates {
                if is_diatonic(an, adapter, next, *cand)? {
                    confirmed.push(*cand);
                }
            }
        }
        let pool = if confirmed.is_empty() {
            &candidates
        } else {
            &confirmed
        };
        let Some(target) = pool.iter().min_by_key(|k| key_rank(**k)) else {
            continue;
        };
        out.push(Finding {
            kind: "modulation".to_string(),
            position: i,
            detail: Some(format!("to {target}")),
        });
        current = *target;
    }
    Ok(())
}

/// The chord's harmonic-function atom in `key`, `chromatic` when the root is
/// not a scale tone.
fn chord_function(root: PitchClass, key: Key) -> &'static str {
    match key.mode.degree_of(key.tonic, root) {
        Some(degree) => function_atom(degree),
        None => "chromatic",
    }
}

fn is_diatonic(
    an: &HarmonyAnalyzer,
    adapter: &AdapterId,
    chord: &Chord,
    key: Key,
) -> CadenzaResult<bool> {
    let Some(degree) = key.mode.degree_of(key.tonic, chord.root) else {
        return Ok(false);
    };
    let goal = Term::compound(
        "diatonic",
        vec![
            Term::atom(key.mode.atom()),
            Term::int(i64::from(degree)),
            Term::atom(chord.quality.atom()),
        ],
    );
    Ok(!an.solutions(adapter, &goal)?.is_empty())
}

/// Every key that hosts this chord quality on some diatonic degree.
fn candidate_keys(
    an: &HarmonyAnalyzer,
    adapter: &AdapterId,
    chord: &Chord,
) -> CadenzaResult<Vec<Key>> {
    let goal = Term::compound(
        "diatonic",
        vec![
            Term::var("M"),
            Term::var("D"),
            Term::atom(chord.quality.atom()),
        ],
    );
    let mut keys = Vec::new();
    for solution in an.solutions(adapter, &goal)? {
        let Some(key) = solution_key(&solution, chord.root) else {
            continue;
        };
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    Ok(keys)
}

fn solution_key(solution: &Solution, chord_root: PitchClass) -> Option<Key> {
    let mode = Mode::from_atom(solution.get("M")?.as_atom()?).ok()?;
    let degree = u8::try_from(solution.get("D")?.as_int()?).ok()?;
    if !(1..=7).contains(&degree) {
        return None;
    }
    let offset = mode.intervals()[usize::from(degree - 1)];
    let tonic = chord_root.transpose(-i16::from(offset));
    Some(Key::new(tonic, mode))
}

/// Deterministic preference order over candidate keys: lowest tonic first,
/// then mode declaration order.
fn key_rank(key: Key) -> (u8, usize) {
    let mode_index = Mode::ALL
        .iter()
        .position(|m| *m == key.mode)
        .unwrap_or(Mode::ALL.len());
    (key.tonic.value(), mode_index)
}
