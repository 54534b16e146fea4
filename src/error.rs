//! Error types for the calculation pipeline.
//!
//! Structural errors (graph, matrix) abort the enclosing calculation;
//! per-method errors are isolated so one bad method does not block others.

use thiserror::Error;

use crate::characterization::MethodKey;

/// Errors raised while assembling or mutating a process graph.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    #[error("process code '{0}' already present in graph")]
    DuplicateProcess(String),

    #[error("exchange '{exchange}' of process '{process}' references unknown process '{target}'")]
    Inconsistency {
        process: String,
        exchange: String,
        target: String,
    },

    #[error("unknown process '{0}'")]
    UnknownProcess(String),

    #[error("process '{process}' has {expected} technosphere exchanges, got {found} amounts")]
    AmountMismatch {
        process: String,
        expected: usize,
        found: usize,
    },
}

/// Errors raised while decomposing or solving the technosphere system.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolveError {
    /// The technosphere matrix is not invertible. Fatal, no retry.
    #[error("technosphere matrix is singular; the linear system cannot be solved")]
    SingularMatrix,

    /// The graph changed after the factorization was built. Rebuild and
    /// re-decompose before solving again.
    #[error("stale decomposition: factored at graph revision {decomposed}, graph is at {current}")]
    StaleDecomposition { decomposed: u64, current: u64 },

    #[error("functional unit references unknown process '{0}'")]
    UnknownProcess(String),
}

/// Errors raised when characterizing an inventory.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CharacterizationError {
    #[error("unknown impact method {0}")]
    UnknownMethod(MethodKey),
}

/// Top-level error for a deterministic calculation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CalcError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Solve(#[from] SolveError),

    #[error(transparent)]
    Characterization(#[from] CharacterizationError),
}

/// Errors raised during a Monte Carlo run.
///
/// Any of these aborts the whole run: percentile statistics are only valid
/// when every iteration went through identical semantics.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UncertaintyError {
    #[error("target process '{0}' not found in graph")]
    UnknownTarget(String),

    /// A sampled exchange no longer matches anything in the target process.
    /// The graph changed between parse and injection.
    #[error("sampled exchange '{exchange}' not found in process '{process}' at iteration {iteration}")]
    ExchangeMatch {
        process: String,
        exchange: String,
        iteration: usize,
    },

    #[error("invalid {kind} distribution for exchange '{exchange}': {reason}")]
    InvalidDistribution {
        exchange: String,
        kind: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Characterization(#[from] CharacterizationError),

    #[error(transparent)]
    Calc(#[from] CalcError),
}

/// Errors raised while persisting or restoring result snapshots.
#[derive(Debug, Error)]
pub enum ResultError {
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
