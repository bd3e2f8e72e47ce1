//! Query evaluation against a rule store snapshot.
//!
//! An [`EvalContext`] binds one immutable [`RuleStore`] and resolves goals
//! against it using depth-first SLD resolution with backtracking. The store is
//! read-only for the context's lifetime, so concurrent queries against the
//! same context need no locking.
//!
//! Every resolution step is budget-checked (depth, total steps, optional
//! deadline, cancellation token); a cyclic rule chain therefore fails with a
//! typed [`EvalError::ResourceExceeded`] instead of hanging.

mod solver;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::store::RuleStore;
use crate::term::Term;

/// Evaluation budgets for a single query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvalLimits {
    /// Stop after this many solutions.
    pub max_solutions: usize,
    /// Maximum resolution depth.
    pub max_depth: u32,
    /// Maximum total resolution steps.
    pub max_steps: u64,
    /// Optional wall-clock deadline for the whole query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_solutions: 64,
            max_depth: 128,
            max_steps: 200_000,
            timeout: None,
        }
    }
}

impl EvalLimits {
    /// Limits with a specific solution cap, other budgets at defaults.
    #[must_use]
    pub fn with_max_solutions(max_solutions: usize) -> Self {
        Self {
            max_solutions,
            ..Self::default()
        }
    }
}

/// One step in a solution's derivation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceStep {
    /// A ground fact matched the goal.
    Fact {
        /// Clause label, e.g. `chord_tones/2 #0`.
        label: String,
        /// The matched fact, canonical form.
        fact: String,
    },
    /// A rule head unified and its body was resolved.
    Rule {
        /// Clause label, e.g. `borrowed/4 #2`.
        label: String,
        /// The rule head under the unifying bindings.
        goal: String,
    },
    /// A builtin predicate succeeded.
    Builtin {
        /// Builtin name, e.g. `member`.
        name: String,
        /// The builtin goal under the unifying bindings.
        goal: String,
    },
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fact { label, fact } => write!(f, "fact {label}: {fact}"),
            Self::Rule { label, goal } => write!(f, "rule {label}: {goal}"),
            Self::Builtin { name, goal } => write!(f, "builtin {name}: {goal}"),
        }
    }
}

/// The ordered list of clauses and builtins used to derive a solution.
///
/// Carried with the solution from the start of resolution so explanations are
/// intrinsically consistent with the result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DerivationPath(pub Vec<TraceStep>);

impl DerivationPath {
    /// Renders the path as one human-readable line per step.
    #[must_use]
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A variable-binding assignment satisfying a query goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// Bindings for the query's variables, sorted by name.
    pub bindings: BTreeMap<String, Term>,
    /// How the solution was derived.
    pub trace: DerivationPath,
}

impl Solution {
    /// Looks up the binding for a query variable.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Term> {
        self.bindings.get(var)
    }

    /// Canonical serialized form of the bindings, used for deterministic
    /// tie-breaking.
    #[must_use]
    pub fn canonical_form(&self) -> String {
        let mut out = String::new();
        for (i, (name, term)) in self.bindings.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(name);
            out.push('=');
            out.push_str(&term.to_string());
        }
        out
    }
}

/// One isolated, queryable instance of the rule engine bound to one store
/// snapshot.
///
/// Cheap to clone (shares the store). `Send + Sync`: evaluation never mutates
/// the context, so queries may run concurrently.
#[derive(Debug, Clone)]
pub struct EvalContext {
    store: Arc<RuleStore>,
}

impl EvalContext {
    /// Creates a context over a store snapshot.
    #[must_use]
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }

    /// The store snapshot this context evaluates against.
    #[must_use]
    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Resolves a goal, returning up to `limits.max_solutions` solutions.
    ///
    /// The solution *set* is deterministic for a given (store, goal, limits);
    /// ordering follows clause load order and is stable.
    ///
    /// # Errors
    ///
    /// [`EvalError::InvalidGoal`] for non-predicate goals,
    /// [`EvalError::UnknownPredicate`] for goals naming nothing in the store,
    /// [`EvalError::ResourceExceeded`] / [`EvalError::DeadlineExceeded`] when
    /// a budget is exhausted. An empty solution set is success, not an error.
    pub fn query(&self, goal: &Term, limits: &EvalLimits) -> Result<Vec<Solution>, EvalError> {
        solver::solve(&self.store, goal, limits, None)
    }

    /// Like [`query`](Self::query), with a cancellation token polled at every
    /// resolution step. A cancelled query fails with [`EvalError::Cancelled`].
    pub fn query_with_cancel(
        &self,
        goal: &Term,
        limits: &EvalLimits,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Vec<Solution>, EvalError> {
        solver::solve(&self.store, goal, limits, Some(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BudgetKind;
    use std::sync::atomic::Ordering;

    fn store(src: &str) -> Arc<RuleStore> {
        Arc::new(RuleStore::load(src).unwrap())
    }

    const KB: &str = r"
        :- declare(chord_tones, 2).
        chord_tones(c_major, [c, e, g]).
        chord_tones(a_minor, [a, c, e]).
        chord_tones(g7, [g, b, d, f]).

        :- declare(has_tone, 2).
        has_tone(Chord, Tone) :- chord_tones(Chord, Tones), member(Tone, Tones).

        :- declare(shares_tone, 2).
        shares_tone(A, B) :- has_tone(A, T), has_tone(B, T), neq(A, B).
    ";

    #[test]
    fn direct_fact_lookup_binds_variables() {
        let ctx = EvalContext::new(store(KB));
        let goal = Term::compound("chord_tones", vec![Term::atom("c_major"), Term::var("X")]);
        let solutions = ctx.query(&goal, &EvalLimits::default()).unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(
            solutions[0].get("X").unwrap().to_string(),
            "[c, e, g]"
        );
    }

    #[test]
    fn rule_resolution_backtracks_through_members() {
        let ctx = EvalContext::new(store(KB));
        let goal = Term::compound("has_tone", vec![Term::atom("c_major"), Term::var("T")]);
        let solutions = ctx.query(&goal, &EvalLimits::default()).unwrap();
        let tones: Vec<String> = solutions
            .iter()
            .map(|s| s.get("T").unwrap().to_string())
            .collect();
        assert_eq!(tones, vec!["c", "e", "g"]);
    }

    #[test]
    fn conjunction_with_neq_filters_self_matches() {
        let ctx = EvalContext::new(store(KB));
        let goal = Term::compound("shares_tone", vec![Term::atom("c_major"), Term::var("B")]);
        let solutions = ctx.query(&goal, &EvalLimits::default()).unwrap();
        assert!(!solutions.is_empty());
        for s in &solutions {
            assert_ne!(s.get("B").unwrap(), &Term::atom("c_major"));
        }
    }

    #[test]
    fn no_match_is_empty_not_error() {
        let ctx = EvalContext::new(store(KB));
        let goal = Term::compound("chord_tones", vec![Term::atom("x_sharp"), Term::var("X")]);
        let solutions = ctx.query(&goal, &EvalLimits::default()).unwrap();
        assert!(solutions.is_empty());
    }

    #[test]
    fn max_solutions_truncates() {
        let ctx = EvalContext::new(store(KB));
        let goal = Term::compound("has_tone", vec![Term::var("C"), Term::var("T")]);
        let solutions = ctx
            .query(&goal, &EvalLimits::with_max_solutions(3))
            .unwrap();
        assert_eq!(solutions.len(), 3);
    }

    #[test]
    fn repeated_evaluation_is_identical() {
        let ctx = EvalContext::new(store(KB));
        let goal = Term::compound("shares_tone", vec![Term::var("A"), Term::var("B")]);
        let first = ctx.query(&goal, &EvalLimits::default()).unwrap();
        let second = ctx.query(&goal, &EvalLimits::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cyclic_rules_hit_the_budget_instead_of_hanging() {
        let src = ":- declare(loop, 1).\nloop(X) :- loop(X).\nloop(seed) :- loop(seed).";
        let ctx = EvalContext::new(store(src));
        let goal = Term::compound("loop", vec![Term::atom("seed")]);
        let limits = EvalLimits {
            max_steps: 5_000,
            ..EvalLimits::default()
        };
        let err = ctx.query(&goal, &limits).unwrap_err();
        let EvalError::ResourceExceeded { kind, .. } = err else {
            panic!("expected ResourceExceeded, got {err:?}");
        };
        assert!(matches!(kind, BudgetKind::Depth | BudgetKind::Steps));
    }

    #[test]
    fn unknown_predicate_is_reported() {
        let ctx = EvalContext::new(store(KB));
        let goal = Term::compound("no_such", vec![Term::var("X")]);
        let err = ctx.query(&goal, &EvalLimits::default()).unwrap_err();
        assert_eq!(
            err,
            EvalError::UnknownPredicate {
                name: "no_such".to_string(),
                arity: 1
            }
        );
    }

    #[test]
    fn non_predicate_goal_is_invalid() {
        let ctx = EvalContext::new(store(KB));
        let err = ctx.query(&Term::int(3), &EvalLimits::default()).unwrap_err();
        assert!(matches!(err, EvalError::InvalidGoal { .. }));
    }

    #[test]
    fn trace_names_the_clauses_used() {
        let ctx = EvalContext::new(store(KB));
        let goal = Term::compound("has_tone", vec![Term::atom("g7"), Term::atom("f")]);
        let solutions = ctx.query(&goal, &EvalLimits::default()).unwrap();
        assert_eq!(solutions.len(), 1);
        let rendered = solutions[0].trace.render();
        assert!(rendered.contains("rule has_tone/2 #0"), "{rendered}");
        assert!(rendered.contains("fact chord_tones/2 #2"), "{rendered}");
        assert!(rendered.contains("builtin member"), "{rendered}");
    }

    #[test]
    fn pre_cancelled_query_reports_cancelled() {
        let ctx = EvalContext::new(store(KB));
        let cancel = Arc::new(AtomicBool::new(false));
        cancel.store(true, Ordering::SeqCst);
        let goal = Term::compound("has_tone", vec![Term::var("C"), Term::var("T")]);
        let err = ctx
            .query_with_cancel(&goal, &EvalLimits::default(), &cancel)
            .unwrap_err();
        assert_eq!(err, EvalError::Cancelled);
    }

    #[test]
    fn canonical_form_is_sorted_by_variable_name() {
        let ctx = EvalContext::new(store(KB));
        let goal = Term::compound("chord_tones", vec![Term::var("Name"), Term::var("Tones")]);
        let solutions = ctx
            .query(&goal, &EvalLimits::with_max_solutions(1))
            .unwrap();
        assert_eq!(
            solutions[0].canonical_form(),
            "Name=c_major, Tones=[c, e, g]"
        );
    }
}
