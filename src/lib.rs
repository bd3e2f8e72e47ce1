//! # cadenza - A knowledge-base-driven harmony reasoning engine
//!
//! cadenza evaluates logic-rule catalogues of harmonic knowledge (cadence
//! patterns, diatonic qualities, borrowing and substitution techniques) and
//! exposes musical operations on top: progression analysis, modal
//! interchange, and scored reharmonization suggestions. Each hosting adapter
//! gets its own hot-swappable rule store, and every result carries the rule
//! derivation that produced it.
//!
//! ## Core Concepts
//!
//! - **RuleStore**: an immutable, validated fact-and-rule database, swapped
//!   atomically per adapter
//! - **EvalContext**: budgeted SLD resolution over one store snapshot
//! - **QueryGateway**: non-blocking dispatch to per-adapter worker threads
//! - **HarmonyAnalyzer**: cadence/modulation detection and suggestion scoring
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cadenza::{AdapterId, Chord, Engine, Key, Mode, PitchClass};
//!
//! let engine = Engine::default();
//! let adapter = AdapterId::from("song-editor");
//! engine.ensure_loaded(&adapter, cadenza::catalog::STANDARD)?;
//!
//! let key = Key::new(PitchClass::from_atom("a")?, Mode::Aeolian);
//! let chords = ["Bm7b5", "E7", "Am7"]
//!     .iter()
//!     .map(|s| Chord::parse_symbol(s))
//!     .collect::<Result<Vec<_>, _>>()?;
//! let analysis = engine.analyze_progression(&adapter, &chords, key)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Substrate: terms, stores, evaluation
pub mod error;
pub mod eval;
pub mod store;
pub mod term;

// Runtime: lifecycle, dispatch, observability
pub mod cache;
pub mod gateway;
pub mod lifecycle;
pub mod profiler;

// Domain: pitch arithmetic and harmony reasoning
pub mod catalog;
pub mod engine;
pub mod harmony;
pub mod pitch;

// Re-export primary types at crate root for convenience
pub use engine::{Engine, EngineConfig};
pub use error::{BudgetKind, CadenzaError, CadenzaResult, EvalError, GatewayError, LoadError};
pub use eval::{DerivationPath, EvalContext, EvalLimits, Solution, TraceStep};
pub use gateway::{GatewayConfig, QueryGateway, QueryHandle, QueryOutcome};
pub use harmony::{
    AnalysisFailure, Finding, HarmonyAnalyzer, Key, ProgressionAnalysis, Suggestion, Technique,
};
pub use lifecycle::{AdapterId, AdapterSnapshot, LifecycleManager, SwapReport};
pub use pitch::{voice_leading_cost, Chord, ChordQuality, Mode, PitchClass};
pub use profiler::{PredicateStats, Profiler, QueryRecord, StatsSnapshot};
pub use store::{RuleStore, ScoringWeights, StoreVersion};
pub use term::{Bindings, Term};
