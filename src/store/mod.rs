//! The rule store: an immutable, indexed fact and rule database.
//!
//! A [`RuleStore`] is built atomically by [`RuleStore::load`]: the source is
//! parsed, validated, and indexed in full before the store is handed back.
//! A failed load returns a [`LoadError`] and produces nothing, so the caller's
//! previously active store (if any) is never disturbed. Reload always builds a
//! fresh store value; nothing mutates a store after load, which is what makes
//! hot-swapping safe for concurrent readers.

mod parser;

pub use parser::parse_source;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LoadError;
use crate::term::Term;

/// Builtin predicates available to rule bodies without declaration.
pub const BUILTIN_PREDICATES: &[(&str, usize)] = &[("member", 2), ("neq", 2)];

/// Identifies one loaded store instance.
///
/// The content hash is stable across loads of identical source (used for
/// `ensure_loaded` idempotence); the load id is unique per load (used for
/// wholesale cache invalidation on reload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreVersion {
    /// blake3 hash of the source text.
    content: [u8; 32],
    /// Unique per load.
    load_id: Uuid,
}

impl StoreVersion {
    fn new(source: &str) -> Self {
        Self {
            content: *blake3::hash(source.as_bytes()).as_bytes(),
            load_id: Uuid::new_v4(),
        }
    }

    /// True when both versions were loaded from byte-identical source.
    #[must_use]
    pub fn same_content(&self, other: &StoreVersion) -> bool {
        self.content == other.content
    }

    /// True when this version was loaded from source with the given hash.
    #[must_use]
    pub fn has_content(&self, hash: &[u8; 32]) -> bool {
        self.content == *hash
    }
}

impl fmt::Display for StoreVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.content[..4] {
            write!(f, "{byte:02x}")?;
        }
        let id = self.load_id.simple().to_string();
        write!(f, "-{}", &id[..8])
    }
}

/// Scoring configuration carried by the store.
///
/// These blend weights are data supplied with the rule source (`:- weights`
/// directives), not engine constants; the harmony layer reads them off the
/// active store when ranking suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Blend weight for inverse tension.
    pub tension: f64,
    /// Blend weight for voice-leading smoothness.
    pub voice_leading: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            tension: 0.6,
            voice_leading: 0.4,
        }
    }
}

/// One fact or rule, as loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// The head pattern.
    pub head: Term,
    /// Body goals; empty for a fact.
    pub body: Vec<Term>,
    /// Position within the predicate's clause list, in load order.
    pub index: usize,
    /// Section marker in effect when the clause was loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl Clause {
    /// True when this clause is a ground fact.
    #[must_use]
    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }

    /// Short label used in derivation traces, e.g. `borrowed/4 #2`.
    #[must_use]
    pub fn label(&self) -> String {
        match self.head.functor() {
            Some((name, arity)) => format!("{name}/{arity} #{}", self.index),
            None => format!("? #{}", self.index),
        }
    }
}

/// An immutable, indexed collection of facts and rules.
#[derive(Debug)]
pub struct RuleStore {
    version: StoreVersion,
    declarations: Vec<(String, usize)>,
    clauses: HashMap<(String, usize), Vec<Clause>>,
    clause_count: usize,
    weights: ScoringWeights,
}

impl RuleStore {
    /// Parses, validates, and indexes a rule store source.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] on malformed syntax, a clause head for an
    /// undeclared predicate or with the wrong arity, a non-ground fact, a body
    /// goal naming an undeclared predicate, or a duplicate declaration. On
    /// error nothing is built; any previously loaded store is unaffected.
    pub fn load(source: &str) -> Result<Self, LoadError> {
        let items = parser::parse_source(source)?;

        let mut declarations: Vec<(String, usize)> = Vec::new();
        let mut clauses: HashMap<(String, usize), Vec<Clause>> = HashMap::new();
        let mut weights = ScoringWeights::default();
        let mut section: Option<String> = None;
        let mut clause_count = 0usize;

        for item in items {
            match item {
                parser::Item::Section { name, .. } => {
                    section = Some(name);
                }
                parser::Item::Weights { key, value, line } => match key.as_str() {
                    "tension" => weights.tension = value,
                    "voice_leading" => weights.voice_leading = value,
                    other => {
                        return Err(
                            located(format!("unknown weight key '{other}'"), line, &section)
                        );
                    }
                },
                parser::Item::Declare { name, arity, line } => {
                    if BUILTIN_PREDICATES.iter().any(|(n, a)| *n == name && *a == arity) {
                        return Err(located(
                            format!("cannot redeclare builtin {name}/{arity}"),
                            line,
                            &section,
                        ));
                    }
                    if declarations.iter().any(|(n, _)| *n == name) {
                        return Err(located(
                            format!("duplicate declaration of '{name}'"),
                            line,
                            &section,
                        ));
                    }
                    declarations.push((name, arity));
                }
                parser::Item::Clause { head, body, line } => {
                    let Some((name, arity)) = head.functor() else {
                        return Err(located(
                            format!("clause head must be an atom or compound, got {}", head.type_name()),
                            line,
                            &section,
                        ));
                    };
                    let declared_arity = declarations
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, a)| *a);
                    match declared_arity {
                        None => {
                            return Err(located(
                                format!("clause head references undeclared predicate '{name}'"),
                                line,
                                &section,
                            ));
                        }
                        Some(a) if a != arity => {
                            return Err(located(
                                format!("'{name}' declared with arity {a}, clause head has arity {arity}"),
                                line,
                                &section,
                            ));
                        }
                        Some(_) => {}
                    }
                    if body.is_empty() && !head.is_ground() {
                        return Err(located(
                            format!("fact for '{name}' must be ground"),
                            line,
                            &section,
                        ));
                    }
                    for goal in &body {
                        let Some((goal_name, goal_arity)) = goal.functor() else {
                            return Err(located(
                                format!("body goal must be an atom or compound, got {}", goal.type_name()),
                                line,
                                &section,
                            ));
                        };
                        let known = BUILTIN_PREDICATES
                            .iter()
                            .any(|(n, a)| *n == goal_name && *a == goal_arity)
                            || declarations
                                .iter()
                                .any(|(n, a)| n == goal_name && *a == goal_arity);
                        if !known {
                            return Err(located(
                                format!("body goal references undeclared predicate {goal_name}/{goal_arity}"),
                                line,
                                &section,
                            ));
                        }
                    }
                    let key = (name.to_string(), arity);
                    let list = clauses.entry(key).or_default();
                    let index = list.len();
                    list.push(Clause {
                        head,
                        body,
                        index,
                        section: section.clone(),
                    });
                    clause_count += 1;
                }
            }
        }

        Ok(Self {
            version: StoreVersion::new(source),
            declarations,
            clauses,
            clause_count,
            weights,
        })
    }

    /// Stable content hash of a source text, for idempotence checks before
    /// committing to a full load.
    #[must_use]
    pub fn content_hash(source: &str) -> [u8; 32] {
        *blake3::hash(source.as_bytes()).as_bytes()
    }

    /// Loads a rule store from a file on disk.
    ///
    /// # Errors
    ///
    /// I/O failures are reported as a [`LoadError`] at 0:0; parse and
    /// validation failures carry their real source location.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            LoadError::new(format!("failed to read {}: {e}", path.display()), 0, 0)
        })?;
        Self::load(&source)
    }

    /// The version identifier assigned at load time.
    #[must_use]
    pub const fn version(&self) -> StoreVersion {
        self.version
    }

    /// Scoring blend weights supplied with the store.
    #[must_use]
    pub const fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// True when `name/arity` was declared (builtins excluded).
    #[must_use]
    pub fn is_declared(&self, name: &str, arity: usize) -> bool {
        self.declarations
            .iter()
            .any(|(n, a)| n == name && *a == arity)
    }

    /// Candidate clauses for a goal, in load order. Empty when the predicate
    /// is declared but has no clauses.
    #[must_use]
    pub fn clauses_for(&self, name: &str, arity: usize) -> &[Clause] {
        self.clauses
            .get(&(name.to_string(), arity))
            .map_or(&[], Vec::as_slice)
    }

    /// Number of declared predicates.
    #[must_use]
    pub fn predicate_count(&self) -> usize {
        self.declarations.len()
    }

    /// Total number of loaded clauses.
    #[must_use]
    pub const fn clause_count(&self) -> usize {
        self.clause_count
    }
}

fn located(reason: String, line: usize, section: &Option<String>) -> LoadError {
    let mut err = LoadError::new(reason, line, 1);
    err.section = section.clone();
    err
}
