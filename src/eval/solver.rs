//! Depth-first SLD resolution with backtracking.
//!
//! The solver is deliberately restricted to the rule shapes this domain
//! needs: lookup, unify, backtrack, plus the `member/2` and `neq/2` builtins.
//! No cut, no assert, no arithmetic. A single query's resolution is
//! sequential; concurrency lives entirely above this module.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{BudgetKind, EvalError};
use crate::store::RuleStore;
use crate::term::{unify, Bindings, Term};

use super::{DerivationPath, EvalLimits, Solution, TraceStep};

struct Solver<'a> {
    store: &'a RuleStore,
    limits: &'a EvalLimits,
    deadline: Option<Instant>,
    cancel: Option<&'a Arc<AtomicBool>>,
    steps: u64,
    rename_seq: u64,
    query_vars: Vec<String>,
    trace: Vec<TraceStep>,
    out: Vec<Solution>,
}

pub(super) fn solve(
    store: &RuleStore,
    goal: &Term,
    limits: &EvalLimits,
    cancel: Option<&Arc<AtomicBool>>,
) -> Result<Vec<Solution>, EvalError> {
    let Some((name, arity)) = goal.functor() else {
        return Err(EvalError::InvalidGoal {
            type_name: goal.type_name().to_string(),
        });
    };
    if !store.is_declared(name, arity) && !is_builtin(name, arity) {
        return Err(EvalError::UnknownPredicate {
            name: name.to_string(),
            arity,
        });
    }

    let mut solver = Solver {
        store,
        limits,
        deadline: limits.timeout.map(|t| Instant::now() + t),
        cancel,
        steps: 0,
        rename_seq: 0,
        query_vars: goal.variables(),
        trace: Vec::new(),
        out: Vec::new(),
    };
    solver.resolve(&[goal.clone()], &Bindings::new(), 0)?;
    Ok(solver.out)
}

fn is_builtin(name: &str, arity: usize) -> bool {
    crate::store::BUILTIN_PREDICATES
        .iter()
        .any(|(n, a)| *n == name && *a == arity)
}

impl Solver<'_> {
    /// Resolves a conjunction of goals. Returns `Ok(true)` when the solution
    /// cap has been reached and the search should unwind.
    fn resolve(
        &mut self,
        goals: &[Term],
        bindings: &Bindings,
        depth: u32,
    ) -> Result<bool, EvalError> {
        let Some((goal, rest)) = goals.split_first() else {
            self.record_solution(bindings);
            return Ok(self.out.len() >= self.limits.max_solutions);
        };

        self.charge_step(goal, bindings)?;
        if depth >= self.limits.max_depth {
            return Err(EvalError::ResourceExceeded {
                kind: BudgetKind::Depth,
                limit: u64::from(self.limits.max_depth),
                goal: bindings.resolve(goal).to_string(),
            });
        }

        let walked = bindings.walk(goal).clone();
        let Some((name, arity)) = walked.functor() else {
            return Err(EvalError::InvalidGoal {
                type_name: walked.type_name().to_string(),
            });
        };

        match (name, arity) {
            ("member", 2) => self.resolve_member(&walked, rest, bindings, depth),
            ("neq", 2) => self.resolve_neq(&walked, rest, bindings, depth),
            _ => self.resolve_clauses(&walked, rest, bindings, depth),
        }
    }

    fn resolve_clauses(
        &mut self,
        goal: &Term,
        rest: &[Term],
        bindings: &Bindings,
        depth: u32,
    ) -> Result<bool, EvalError> {
        let (name, arity) = goal
            .functor()
            .unwrap_or_else(|| unreachable!("checked by caller"));
        // Clause iteration follows load order: this is what makes the
        // solution order stable for a given (store, goal) pair.
        let clauses = self.store.clauses_for(name, arity).to_vec();
        for clause in &clauses {
            self.rename_seq += 1;
            let seq = self.rename_seq;
            let rename = |var: &str| format!("{var}#{seq}");
            let head = clause.head.map_variables(&rename);

            let Some(extended) = unify(goal, &head, bindings) else {
                continue;
            };

            let step = if clause.is_fact() {
                TraceStep::Fact {
                    label: clause.label(),
                    fact: extended.resolve(&head).to_string(),
                }
            } else {
                TraceStep::Rule {
                    label: clause.label(),
                    goal: extended.resolve(&head).to_string(),
                }
            };
            self.trace.push(step);

            let mut next_goals: Vec<Term> = clause
                .body
                .iter()
                .map(|g| g.map_variables(&rename))
                .collect();
            next_goals.extend_from_slice(rest);

            let done = self.resolve(&next_goals, &extended, depth + 1)?;
            self.trace.pop();
            if done {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn resolve_member(
        &mut self,
        goal: &Term,
        rest: &[Term],
        bindings: &Bindings,
        depth: u32,
    ) -> Result<bool, EvalError> {
        let Term::Compound(_, args) = goal else {
            return Ok(false);
        };
        let list = bindings.resolve(&args[1]);
        let Term::List(items) = list else {
            // member/2 only enumerates concrete lists; an unbound or
            // non-list second argument has no matches.
            return Ok(false);
        };
        for item in &items {
            let Some(extended) = unify(&args[0], item, bindings) else {
                continue;
            };
            self.trace.push(TraceStep::Builtin {
                name: "member".to_string(),
                goal: extended.resolve(goal).to_string(),
            });
            let done = self.resolve(rest, &extended, depth + 1)?;
            self.trace.pop();
            if done {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn resolve_neq(
        &mut self,
        goal: &Term,
        rest: &[Term],
        bindings: &Bindings,
        depth: u32,
    ) -> Result<bool, EvalError> {
        let Term::Compound(_, args) = goal else {
            return Ok(false);
        };
        let left = bindings.resolve(&args[0]);
        let right = bindings.resolve(&args[1]);
        // Disequality is only meaningful over ground terms; anything else
        // fails the branch rather than guessing.
        if !left.is_ground() || !right.is_ground() || left == right {
            return Ok(false);
        }
        self.trace.push(TraceStep::Builtin {
            name: "neq".to_string(),
            goal: bindings.resolve(goal).to_string(),
        });
        let done = self.resolve(rest, bindings, depth + 1)?;
        self.trace.pop();
        Ok(done)
    }

    fn record_solution(&mut self, bindings: &Bindings) {
        let mut resolved = BTreeMap::new();
        for name in &self.query_vars {
            resolved.insert(name.clone(), bindings.resolve(&Term::Var(name.clone())));
        }
        self.out.push(Solution {
            bindings: resolved,
            trace: DerivationPath(self.trace.clone()),
        });
    }

    fn charge_step(&mut self, goal: &Term, bindings: &Bindings) -> Result<(), EvalError> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(EvalError::ResourceExceeded {
                kind: BudgetKind::Steps,
                limit: self.limits.max_steps,
                goal: bindings.resolve(goal).to_string(),
            });
        }
        if let Some(cancel) = self.cancel {
            if cancel.load(Ordering::Relaxed) {
                return Err(EvalError::Cancelled);
            }
        }
        // Deadline checks piggyback on the step budget; cheap enough to do
        // every 64 steps without an Instant::now() on every resolution step.
        if self.steps % 64 == 1 {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(EvalError::DeadlineExceeded {
                        goal: bindings.resolve(goal).to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
