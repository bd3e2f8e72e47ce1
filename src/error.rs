//! Error types for cadenza.
//!
//! All errors are strongly typed using thiserror, layered by subsystem:
//! loading, evaluation, gateway. The top-level [`CadenzaError`] wraps the
//! layers so callers can match on the condition they care about.

use thiserror::Error;

/// Errors raised while parsing and loading a rule store source.
///
/// A load error always leaves any previously loaded store intact.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("load error at {line}:{column}: {reason}")]
pub struct LoadError {
    /// What went wrong, human-readable.
    pub reason: String,
    /// 1-based source line.
    pub line: usize,
    /// 1-based source column.
    pub column: usize,
    /// Section marker in effect at the error location, if any.
    pub section: Option<String>,
}

impl LoadError {
    pub(crate) fn new(reason: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            reason: reason.into(),
            line,
            column,
            section: None,
        }
    }
}

/// Which evaluation budget was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BudgetKind {
    /// Recursion depth limit.
    Depth,
    /// Total resolution step limit.
    Steps,
}

impl std::fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Depth => write!(f, "depth"),
            Self::Steps => write!(f, "steps"),
        }
    }
}

/// Errors raised during query evaluation.
///
/// An empty solution set is not an error; these cover genuine evaluation
/// failures only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    /// A recursion or step budget was exhausted. Recoverable: the caller may
    /// retry with higher limits or a narrower goal.
    #[error("resource exceeded: {kind} limit {limit} hit while resolving {goal}")]
    ResourceExceeded {
        /// Which budget was hit.
        kind: BudgetKind,
        /// The configured limit.
        limit: u64,
        /// Canonical form of the goal being resolved.
        goal: String,
    },

    /// The query deadline passed during resolution.
    #[error("deadline exceeded while resolving {goal}")]
    DeadlineExceeded {
        /// Canonical form of the goal being resolved.
        goal: String,
    },

    /// The caller cancelled the query. Mapped to a non-error outcome at the
    /// gateway; never surfaced to consumers as a failure.
    #[error("query cancelled")]
    Cancelled,

    /// The goal is not a predicate shape (atom or compound).
    #[error("invalid goal: expected atom or compound, got {type_name}")]
    InvalidGoal {
        /// Type name of the offending term.
        type_name: String,
    },

    /// The goal names a predicate the store never declared.
    #[error("unknown predicate: {name}/{arity}")]
    UnknownPredicate {
        /// Predicate name.
        name: String,
        /// Goal arity.
        arity: usize,
    },
}

/// Errors surfaced at the query gateway boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// No rule store is loaded for the adapter. Caller error: call
    /// `ensure_loaded` first.
    #[error("adapter not loaded: {adapter}")]
    AdapterNotLoaded {
        /// The adapter identity.
        adapter: String,
    },

    /// The query did not complete within its timeout.
    #[error("query timed out after {timeout_ms}ms")]
    EvalTimeout {
        /// The configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Evaluation failed inside the worker.
    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),

    /// The evaluation worker is gone and a single respawn-and-retry also
    /// failed.
    #[error("evaluation worker unavailable for adapter {adapter}")]
    WorkerUnavailable {
        /// The adapter identity.
        adapter: String,
    },

    /// The worker's request queue is full.
    #[error("query queue full for adapter {adapter} (capacity {capacity})")]
    QueueFull {
        /// The adapter identity.
        adapter: String,
        /// The configured queue capacity.
        capacity: usize,
    },
}

/// Top-level error type for cadenza.
#[derive(Debug, Clone, Error)]
pub enum CadenzaError {
    /// Rule source failed to parse or validate.
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// Query evaluation failed.
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// The query gateway rejected or lost the request.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A musical input (note, chord symbol, mode) failed to parse.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input.
        message: String,
    },
}

impl CadenzaError {
    /// Creates an invalid-input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Returns true if this error may succeed on retry.
    ///
    /// Load and input errors will not change on retry; resource and timeout
    /// errors may succeed with higher limits, and a worker hiccup may clear.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Load(_) | Self::InvalidInput { .. } => false,
            Self::Eval(e) => matches!(
                e,
                EvalError::ResourceExceeded { .. } | EvalError::DeadlineExceeded { .. }
            ),
            Self::Gateway(g) => matches!(
                g,
                GatewayError::EvalTimeout { .. }
                    | GatewayError::WorkerUnavailable { .. }
                    | GatewayError::QueueFull { .. }
            ),
        }
    }
}

/// Result type alias for cadenza operations.
pub type CadenzaResult<T> = Result<T, CadenzaError>;
