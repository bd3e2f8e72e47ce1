//! Modal-interchange and reharmonization candidate generation.
//!
//! Candidates come out of store queries (`interchange/4`, `technique_*`
//! facts); pitch arithmetic turns mode-and-degree answers into concrete
//! chords, and [`rank`] blends tension and voice-leading smoothness into one
//! deterministic ordering.

use std::collections::HashSet;

use super::{rationale, HarmonyAnalyzer, Key, Suggestion, Technique};
use crate::error::CadenzaResult;
use crate::lifecycle::AdapterId;
use crate::pitch::{voice_leading_cost, Chord, ChordQuality, Mode};
use crate::store::ScoringWeights;
use crate::term::Term;

pub(super) fn modal_interchange(
    an: &HarmonyAnalyzer,
    adapter: &AdapterId,
    chord: &Chord,
    key: Key,
) -> CadenzaResult<Vec<Suggestion>> {
    let native_brightness = mode_brightness(an, adapter, key.mode)?;
    let goal = Term::compound(
        "interchange",
        vec![
            Term::var("M"),
            Term::var("D"),
            Term::var("Q"),
            Term::var("B"),
        ],
    );
    let mut suggestions = Vec::new();
    for solution in an.solutions(adapter, &goal)? {
        let Some(mode_atom) = solution.get("M").and_then(Term::as_atom) else {
            continue;
        };
        if mode_atom == key.mode.atom() {
            continue;
        }
        let Ok(mode) = Mode::from_atom(mode_atom) else {
            continue;
        };
        let Some(quality) = solution
            .get("Q")
            .and_then(Term::as_atom)
            .and_then(|q| ChordQuality::from_atom(q).ok())
        else {
            continue;
        };
        let Some(degree) = solution
            .get("D")
            .and_then(Term::as_int)
            .and_then(|d| u8::try_from(d).ok())
        else {
            continue;
        };
        let Some(root) = mode.degree_pitch(key.tonic, degree) else {
            continue;
        };
        let candidate = Chord::new(root, quality);
        if candidate == *chord {
            continue;
        }
        let brightness = solution.get("B").and_then(Term::as_int).unwrap_or(0);
        let tension = (brightness - native_brightness).unsigned_abs() as f64;
        let headline = format!("{candidate} borrowed from {mode} (degree {degree})");
        suggestions.push(Suggestion {
            chord: candidate,
            technique: Technique::ModalInterchange,
            tension,
            voice_leading_cost: voice_leading_cost(chord, &candidate),
            desirability: 0.0,
            rationale: rationale(&headline, &solution.trace),
            derivation: solution.trace.clone(),
        });
    }
    Ok(suggestions)
}

pub(super) fn tritone_substitution(
    an: &HarmonyAnalyzer,
    adapter: &AdapterId,
    chord: &Chord,
) -> CadenzaResult<Vec<Suggestion>> {
    technique_candidate(
        an,
        adapter,
        chord,
        Technique::TritoneSubstitution,
        Chord::new(chord.root.transpose(6), ChordQuality::Dominant7),
    )
}

pub(super) fn secondary_dominant(
    an: &HarmonyAnalyzer,
    adapter: &AdapterId,
    chord: &Chord,
) -> CadenzaResult<Vec<Suggestion>> {
    technique_candidate(
        an,
        adapter,
        chord,
        Technique::SecondaryDominant,
        Chord::new(chord.root.transpose(7), ChordQuality::Dominant7),
    )
}

/// Shared shape of the single-candidate techniques: gate on a
/// `technique_applicable` fact for the source quality, then price the
/// candidate from the `technique_tension` fact.
fn technique_candidate(
    an: &HarmonyAnalyzer,
    adapter: &AdapterId,
    chord: &Chord,
    technique: Technique,
    candidate: Chord,
) -> CadenzaResult<Vec<Suggestion>> {
    let applicable = Term::compound(
        "technique_applicable",
        vec![Term::atom(technique.atom()), Term::atom(chord.quality.atom())],
    );
    if an.solutions(adapter, &applicable)?.is_empty() {
        return Ok(Vec::new());
    }
    if candidate == *chord {
        return Ok(Vec::new());
    }

    let tension_goal = Term::compound(
        "technique_tension",
        vec![Term::atom(technique.atom()), Term::var("T")],
    );
    let Some(solution) = an.solutions(adapter, &tension_goal)?.into_iter().next() else {
        return Ok(Vec::new());
    };
    #[allow(clippy::cast_precision_loss)]
    let tension = solution
        .get("T")
        .and_then(Term::as_int)
        .unwrap_or(0)
        .max(0) as f64;
    let headline = format!("{candidate} via {technique} of {chord}");
    Ok(vec![Suggestion {
        chord: candidate,
        technique,
        tension,
        voice_leading_cost: voice_leading_cost(chord, &candidate),
        desirability: 0.0,
        rationale: rationale(&headline, &solution.trace),
        derivation: solution.trace,
    }])
}

/// Scores, orders, dedupes, and truncates suggestions in place.
///
/// Ordering is strictly deterministic: desirability descending, then the
/// candidate's display symbol ascending as the tie-break. A chord suggested
/// twice by the same technique keeps only its best-ranked entry; distinct
/// techniques may each propose the same chord.
pub(super) fn rank(suggestions: &mut Vec<Suggestion>, weights: ScoringWeights, max: usize) {
    for s in suggestions.iter_mut() {
        s.desirability = desirability(weights, s.tension, s.voice_leading_cost);
    }
    suggestions.sort_by(|a, b| {
        b.desirability
            .total_cmp(&a.desirability)
            .then_with(|| a.chord.symbol().cmp(&b.chord.symbol()))
            .then_with(|| a.technique.atom().cmp(b.technique.atom()))
    });
    let mut seen: HashSet<(Chord, Technique)> = HashSet::new();
    suggestions.retain(|s| seen.insert((s.chord, s.technique)));
    suggestions.truncate(max);
}

/// Blend of inverse tension and inverse voice-leading cost; both map into
/// (0, 1] so the weights keep their declared proportions.
fn desirability(weights: ScoringWeights, tension: f64, vl_cost: u32) -> f64 {
    weights.tension / (1.0 + tension) + weights.voice_leading / (1.0 + f64::from(vl_cost))
}

fn mode_brightness(
    an: &HarmonyAnalyzer,
    adapter: &AdapterId,
    mode: Mode,
) -> CadenzaResult<i64> {
    let goal = Term::compound(
        "mode_offset",
        vec![Term::atom(mode.atom()), Term::var("B")],
    );
    Ok(an
        .solutions(adapter, &goal)?
        .first()
        .and_then(|s| s.get("B").and_then(Term::as_int))
        .unwrap_or(0))
}
