//! Logic terms and unification.
//!
//! Terms are the currency of the rule engine: goals, facts, rule heads, and
//! solution bindings are all built from them. The canonical `Display` form is
//! deterministic and is used for cache keys and ranking tie-breaks, so it must
//! never depend on hash-map iteration order.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A term in the rule language.
///
/// # Examples
///
/// ```
/// use cadenza::Term;
///
/// let goal = Term::compound("chord_tones", vec![Term::atom("c_major"), Term::var("X")]);
/// assert_eq!(goal.to_string(), "chord_tones(c_major, X)");
/// assert!(!goal.is_ground());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Term {
    /// A symbolic constant, e.g. `c_major` or `aeolian`.
    Atom(String),
    /// A signed integer, e.g. a semitone distance.
    Int(i64),
    /// An unbound variable placeholder, e.g. `X`.
    Var(String),
    /// An ordered list of terms, e.g. `[c, e, g]`.
    List(Vec<Term>),
    /// A nested term: a functor applied to arguments.
    Compound(String, Vec<Term>),
}

impl Term {
    /// Creates an atom term.
    pub fn atom(name: impl Into<String>) -> Self {
        Self::Atom(name.into())
    }

    /// Creates an integer term.
    #[must_use]
    pub const fn int(value: i64) -> Self {
        Self::Int(value)
    }

    /// Creates a variable term.
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Creates a compound term.
    pub fn compound(functor: impl Into<String>, args: Vec<Term>) -> Self {
        Self::Compound(functor.into(), args)
    }

    /// Creates a list term.
    #[must_use]
    pub const fn list(items: Vec<Term>) -> Self {
        Self::List(items)
    }

    /// True for atom terms.
    #[must_use]
    pub const fn is_atom(&self) -> bool {
        matches!(self, Self::Atom(_))
    }

    /// True for variable terms.
    #[must_use]
    pub const fn is_var(&self) -> bool {
        matches!(self, Self::Var(_))
    }

    /// The atom name, when this is an atom.
    #[must_use]
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(s) => Some(s),
            _ => None,
        }
    }

    /// The integer value, when this is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The items, when this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the functor name and arity of a goal-shaped term.
    ///
    /// Atoms are zero-arity goals; compounds carry their argument count.
    #[must_use]
    pub fn functor(&self) -> Option<(&str, usize)> {
        match self {
            Self::Atom(name) => Some((name, 0)),
            Self::Compound(name, args) => Some((name, args.len())),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Atom(_) => "atom",
            Self::Int(_) => "int",
            Self::Var(_) => "var",
            Self::List(_) => "list",
            Self::Compound(..) => "compound",
        }
    }

    /// True when the term contains no variables.
    #[must_use]
    pub fn is_ground(&self) -> bool {
        match self {
            Self::Atom(_) | Self::Int(_) => true,
            Self::Var(_) => false,
            Self::List(items) => items.iter().all(Term::is_ground),
            Self::Compound(_, args) => args.iter().all(Term::is_ground),
        }
    }

    /// Collects the names of all variables in the term, in first-occurrence order.
    #[must_use]
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Self::Atom(_) | Self::Int(_) => {}
            Self::Var(name) => {
                if !out.iter().any(|v| v == name) {
                    out.push(name.clone());
                }
            }
            Self::List(items) => {
                for item in items {
                    item.collect_variables(out);
                }
            }
            Self::Compound(_, args) => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
        }
    }

    /// Returns a copy with every variable renamed through `rename`.
    ///
    /// Used by the solver to rename rule variables apart before unification.
    #[must_use]
    pub fn map_variables(&self, rename: &impl Fn(&str) -> String) -> Term {
        match self {
            Self::Atom(_) | Self::Int(_) => self.clone(),
            Self::Var(name) => Self::Var(rename(name)),
            Self::List(items) => {
                Self::List(items.iter().map(|t| t.map_variables(rename)).collect())
            }
            Self::Compound(functor, args) => Self::Compound(
                functor.clone(),
                args.iter().map(|t| t.map_variables(rename)).collect(),
            ),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(name) => write!(f, "{name}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Var(name) => write!(f, "{name}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Compound(functor, args) => {
                write!(f, "{functor}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<i64> for Term {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Term {
    fn from(v: &str) -> Self {
        Self::Atom(v.to_string())
    }
}

/// A variable-binding environment built up during resolution.
///
/// The solver clones bindings at choice points; within one branch they are
/// extended in place.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    map: HashMap<String, Term>,
}

impl Bindings {
    /// Creates an empty binding environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when no variables are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Follows variable chains until a non-variable term or an unbound
    /// variable is reached.
    #[must_use]
    pub fn walk<'a>(&'a self, term: &'a Term) -> &'a Term {
        let mut current = term;
        // Chains are acyclic because bind() only ever binds unbound variables,
        // but cap the hops so a broken invariant cannot spin forever.
        for _ in 0..4096 {
            match current {
                Term::Var(name) => match self.map.get(name) {
                    Some(next) => current = next,
                    None => return current,
                },
                _ => return current,
            }
        }
        current
    }

    /// Fully substitutes bindings into a term, producing a grounded copy
    /// (unbound variables are left in place).
    #[must_use]
    pub fn resolve(&self, term: &Term) -> Term {
        let walked = self.walk(term).clone();
        match walked {
            Term::Atom(_) | Term::Int(_) | Term::Var(_) => walked,
            Term::List(items) => Term::List(items.iter().map(|t| self.resolve(t)).collect()),
            Term::Compound(functor, args) => {
                Term::Compound(functor, args.iter().map(|t| self.resolve(t)).collect())
            }
        }
    }

    fn bind(&mut self, name: String, term: Term) {
        self.map.insert(name, term);
    }
}

/// Unifies two terms under the given bindings.
///
/// Returns the extended binding environment on success, `None` when the terms
/// cannot be made equal. The input bindings are never mutated.
#[must_use]
pub fn unify(a: &Term, b: &Term, bindings: &Bindings) -> Option<Bindings> {
    let mut out = bindings.clone();
    if unify_in_place(a, b, &mut out) {
        Some(out)
    } else {
        None
    }
}

fn unify_in_place(a: &Term, b: &Term, bindings: &mut Bindings) -> bool {
    let a = bindings.walk(a).clone();
    let b = bindings.walk(b).clone();
    match (a, b) {
        (Term::Var(x), Term::Var(y)) if x == y => true,
        (Term::Var(x), t) => {
            bindings.bind(x, t);
            true
        }
        (t, Term::Var(y)) => {
            bindings.bind(y, t);
            true
        }
        (Term::Atom(x), Term::Atom(y)) => x == y,
        (Term::Int(x), Term::Int(y)) => x == y,
        (Term::List(xs), Term::List(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(x, y)| unify_in_place(x, y, bindings))
        }
        (Term::Compound(f, xs), Term::Compound(g, ys)) => {
            f == g
                && xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(x, y)| unify_in_place(x, y, bindings))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_canonical() {
        let t = Term::compound(
            "cadence",
            vec![
                Term::atom("dominant"),
                Term::atom("tonic"),
                Term::var("Kind"),
            ],
        );
        assert_eq!(t.to_string(), "cadence(dominant, tonic, Kind)");
        assert_eq!(
            Term::list(vec![Term::atom("c"), Term::atom("e"), Term::atom("g")]).to_string(),
            "[c, e, g]"
        );
    }

    #[test]
    fn functor_covers_atoms_and_compounds() {
        assert_eq!(Term::atom("modes").functor(), Some(("modes", 0)));
        let t = Term::compound("chord_tones", vec![Term::atom("c_major"), Term::var("X")]);
        assert_eq!(t.functor(), Some(("chord_tones", 2)));
        assert_eq!(Term::int(3).functor(), None);
        assert_eq!(Term::var("X").functor(), None);
    }

    #[test]
    fn groundness_descends_into_structure() {
        let ground = Term::compound("f", vec![Term::int(1), Term::list(vec![Term::atom("a")])]);
        assert!(ground.is_ground());
        let open = Term::compound("f", vec![Term::list(vec![Term::var("X")])]);
        assert!(!open.is_ground());
        assert_eq!(open.variables(), vec!["X".to_string()]);
    }

    #[test]
    fn unify_binds_variables_both_ways() {
        let bindings = Bindings::new();
        let goal = Term::compound("m", vec![Term::var("X"), Term::atom("c")]);
        let fact = Term::compound("m", vec![Term::atom("aeolian"), Term::var("Y")]);
        let out = unify(&goal, &fact, &bindings).unwrap();
        assert_eq!(out.resolve(&Term::var("X")), Term::atom("aeolian"));
        assert_eq!(out.resolve(&Term::var("Y")), Term::atom("c"));
    }

    #[test]
    fn unify_rejects_mismatches() {
        let bindings = Bindings::new();
        assert!(unify(&Term::atom("a"), &Term::atom("b"), &bindings).is_none());
        assert!(unify(&Term::int(1), &Term::atom("a"), &bindings).is_none());
        assert!(unify(
            &Term::list(vec![Term::atom("a")]),
            &Term::list(vec![Term::atom("a"), Term::atom("b")]),
            &bindings
        )
        .is_none());
        assert!(unify(
            &Term::compound("f", vec![Term::int(1)]),
            &Term::compound("g", vec![Term::int(1)]),
            &bindings
        )
        .is_none());
    }

    #[test]
    fn unify_same_variable_with_itself() {
        let bindings = Bindings::new();
        let out = unify(&Term::var("X"), &Term::var("X"), &bindings).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn transitive_bindings_resolve_fully() {
        let bindings = Bindings::new();
        let b1 = unify(&Term::var("X"), &Term::var("Y"), &bindings).unwrap();
        let b2 = unify(&Term::var("Y"), &Term::atom("g7"), &b1).unwrap();
        assert_eq!(b2.resolve(&Term::var("X")), Term::atom("g7"));
    }

    #[test]
    fn resolve_substitutes_inside_lists() {
        let bindings = Bindings::new();
        let b = unify(&Term::var("X"), &Term::atom("e"), &bindings).unwrap();
        let t = Term::list(vec![Term::atom("c"), Term::var("X")]);
        assert_eq!(
            b.resolve(&t),
            Term::list(vec![Term::atom("c"), Term::atom("e")])
        );
    }

    #[test]
    fn map_variables_renames_apart() {
        let t = Term::compound("f", vec![Term::var("X"), Term::list(vec![Term::var("Y")])]);
        let renamed = t.map_variables(&|name| format!("{name}#1"));
        assert_eq!(
            renamed.variables(),
            vec!["X#1".to_string(), "Y#1".to_string()]
        );
    }

    #[test]
    fn serde_round_trip() {
        let t = Term::compound("chord_tones", vec![Term::atom("c_major"), Term::var("X")]);
        let json = serde_json::to_string(&t).unwrap();
        let back: Term = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
