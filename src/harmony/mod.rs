//! The harmony reasoning layer.
//!
//! Sits on top of the query gateway and translates musical questions into
//! rule-store goals: cadence and modulation detection over progressions,
//! modal-interchange candidates, and reharmonization suggestions. Every
//! suggestion carries its tension, voice-leading cost, blended desirability,
//! and the rule-derivation path that produced it, so results are explainable
//! and reproducible for a given store version.

mod progression;
mod suggest;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CadenzaError, CadenzaResult};
use crate::eval::{DerivationPath, EvalLimits, Solution};
use crate::gateway::QueryGateway;
use crate::lifecycle::{AdapterId, LifecycleManager};
use crate::pitch::{Chord, Mode, PitchClass};
use crate::store::ScoringWeights;
use crate::term::Term;

/// A key: tonic pitch class plus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    /// Tonic pitch class.
    pub tonic: PitchClass,
    /// Mode of the scale on the tonic.
    pub mode: Mode,
}

impl Key {
    /// Creates a key.
    #[must_use]
    pub const fn new(tonic: PitchClass, mode: Mode) -> Self {
        Self { tonic, mode }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tonic.symbol(), self.mode)
    }
}

/// A positioned analysis finding, e.g. a detected cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Finding kind atom from the store, e.g. `authentic` or `modulation`.
    pub kind: String,
    /// Chord index the finding lands on.
    pub position: usize,
    /// Human-readable detail, e.g. the target key of a modulation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A sub-analysis that failed while the rest of the progression analysis
/// continued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisFailure {
    /// Which sub-analysis failed, e.g. `cadence`.
    pub analysis: String,
    /// The rendered error.
    pub error: String,
}

/// The result of analyzing a chord progression.
///
/// A failing sub-analysis is recorded in `failures` and the remaining
/// detectors still run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionAnalysis {
    /// The key the progression was analyzed in.
    pub key: Key,
    /// Detected cadences, positioned at their final chord.
    pub cadences: Vec<Finding>,
    /// Detected modulations, positioned at the first foreign chord.
    pub modulations: Vec<Finding>,
    /// Sub-analyses that failed.
    pub failures: Vec<AnalysisFailure>,
}

/// A reharmonization technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    /// Borrow a chord from a parallel mode.
    ModalInterchange,
    /// Replace a dominant with the dominant a tritone away.
    TritoneSubstitution,
    /// Precede the chord with its own dominant.
    SecondaryDominant,
}

impl Technique {
    /// All techniques, in scan order.
    pub const ALL: [Technique; 3] = [
        Technique::ModalInterchange,
        Technique::TritoneSubstitution,
        Technique::SecondaryDominant,
    ];

    /// The store-atom spelling.
    #[must_use]
    pub const fn atom(self) -> &'static str {
        match self {
            Self::ModalInterchange => "modal_interchange",
            Self::TritoneSubstitution => "tritone_substitution",
            Self::SecondaryDominant => "secondary_dominant",
        }
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.atom())
    }
}

/// A scored substitution or borrowing suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// The suggested chord.
    pub chord: Chord,
    /// The technique that produced it.
    pub technique: Technique,
    /// Raw tension from the store's weight facts.
    pub tension: f64,
    /// Minimal total semitone movement from the source chord.
    pub voice_leading_cost: u32,
    /// Blended score; higher is better.
    pub desirability: f64,
    /// Why the suggestion was made, assembled from the derivation path.
    pub rationale: String,
    /// The rule derivation that produced the candidate.
    pub derivation: DerivationPath,
}

/// Harmony operations over one or more loaded adapters.
///
/// All reasoning goes through the gateway (and therefore through the result
/// cache and profiler); the analyzer itself holds no musical data beyond the
/// pitch arithmetic in [`crate::pitch`].
pub struct HarmonyAnalyzer {
    lifecycle: Arc<LifecycleManager>,
    gateway: Arc<QueryGateway>,
    limits: EvalLimits,
}

impl HarmonyAnalyzer {
    /// Solution cap for enumerating candidate goals; wide enough for a full
    /// mode-by-degree catalogue sweep.
    const ENUM_SOLUTIONS: usize = 512;

    /// Creates an analyzer issuing queries with the given default limits.
    #[must_use]
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        gateway: Arc<QueryGateway>,
        limits: EvalLimits,
    ) -> Self {
        Self {
            lifecycle,
            gateway,
            limits,
        }
    }

    /// Detects cadences and modulations in a chord progression.
    ///
    /// # Errors
    ///
    /// Fails only when the adapter is not loaded; detector-level errors are
    /// recorded in the returned `failures` and leave the other detectors'
    /// results intact.
    pub fn analyze_progression(
        &self,
        adapter: &AdapterId,
        chords: &[Chord],
        key: Key,
    ) -> CadenzaResult<ProgressionAnalysis> {
        // Surface a missing adapter as a real error, not a partial result.
        self.lifecycle.resolve(adapter)?;
        Ok(progression::analyze(self, adapter, chords, key))
    }

    /// Suggests chords borrowed from parallel modes, scored and ranked.
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
        let weights = self.weights(adapter)?;
        let mut suggestions = suggest::modal_interchange(self, adapter, chord, key)?;
        suggest::rank(&mut suggestions, weights, max_suggestions);
        Ok(suggestions)
    }

    /// Suggests reharmonizations of a chord using the given techniques.
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
        let weights = self.weights(adapter)?;
        let mut suggestions = Vec::new();
        for technique in techniques {
            match technique {
                Technique::ModalInterchange => {
                    suggestions.extend(suggest::modal_interchange(self, adapter, chord, key)?);
                }
                Technique::TritoneSubstitution => {
                    suggestions.extend(suggest::tritone_substitution(self, adapter, chord)?);
                }
                Technique::SecondaryDominant => {
                    suggestions.extend(suggest::secondary_dominant(self, adapter, chord)?);
                }
            }
        }
        suggest::rank(&mut suggestions, weights, max_suggestions);
        Ok(suggestions)
    }

    fn weights(&self, adapter: &AdapterId) -> CadenzaResult<ScoringWeights> {
        Ok(self.lifecycle.resolve(adapter)?.context.store().weights())
    }

    /// Runs one goal to completion through the gateway with the enumeration
    /// solution cap. Cancellation cannot occur here (no handle is exposed).
    pub(crate) fn solutions(
        &self,
        adapter: &AdapterId,
        goal: &Term,
    ) -> CadenzaResult<Vec<Solution>> {
        let limits = EvalLimits {
            max_solutions: Self::ENUM_SOLUTIONS,
            ..self.limits.clone()
        };
        match self.gateway.query_blocking(adapter, goal, &limits)? {
            crate::gateway::QueryOutcome::Solutions(s) => Ok(s.to_vec()),
            crate::gateway::QueryOutcome::Cancelled => Ok(Vec::new()),
        }
    }
}

/// Builds a rationale line from a headline and the derivation that backs it.
pub(crate) fn rationale(headline: &str, derivation: &DerivationPath) -> String {
    if derivation.0.is_empty() {
        headline.to_string()
    } else {
        format!("{headline}; {}", derivation.render())
    }
}

impl AnalysisFailure {
    pub(crate) fn new(analysis: &str, err: &CadenzaError) -> Self {
        Self {
            analysis: analysis.to_string(),
            error: err.to_string(),
        }
    }
}
