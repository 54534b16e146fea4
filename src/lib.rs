//! Impact scoring and uncertainty propagation for product-system graphs.
//!
//! The pipeline runs ProcessGraph → MatrixBuilder → TechnosphereSolver →
//! CharacterizationEngine, with ContributionAnalyzer and UncertaintyEngine
//! consuming the solver's outputs and everything landing in a ResultStore:
//! - graph: processes, exchanges, and the revision counter that gates
//!   matrix reuse
//! - matrix: technosphere matrix A and biosphere matrix B
//! - solver: one LU factorization per clean graph state, many solves
//! - characterization: impact methods, registry, inventory scoring
//! - calculator: deterministic pipeline glue
//! - contribution: ranked contributors and group-tag aggregation
//! - uncertainty: Monte Carlo sampling, injection, and percentiles
//! - results: score tables and versioned snapshots

pub mod calculator;
pub mod characterization;
pub mod contribution;
pub mod error;
pub mod graph;
pub mod matrix;
pub mod results;
pub mod solver;
pub mod uncertainty;

pub use calculator::{LcaCalculator, ScoreSet};
pub use characterization::{CharacterizationEngine, ImpactMethod, MethodKey, MethodRegistry};
pub use contribution::{ContributionAnalyzer, ProcessContribution};
pub use error::{
    CalcError, CharacterizationError, GraphError, ResultError, SolveError, UncertaintyError,
};
pub use graph::{
    BiosphereExchange, FunctionalUnit, Process, ProcessGraph, TechnosphereExchange,
};
pub use matrix::{MatrixBuilder, SystemMatrices};
pub use results::{
    DeterministicScore, IterationScores, McResult, McStatus, Percentiles, ResultStore,
    SNAPSHOT_VERSION,
};
pub use solver::{Solution, TechnosphereSolver};
pub use uncertainty::{
    CancelToken, McConfig, SampleMatrix, StochasticInput, Uncertainty, UncertaintyEngine,
};
