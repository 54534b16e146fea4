//! Deterministic calculation pipeline.
//!
//! [`LcaCalculator`] is the explicit context object tying one graph
//! snapshot to one method registry: it builds the matrices, factors the
//! technosphere once, and prepares characterization vectors. While it
//! lives, the borrow checker keeps the graph immutable, so every solve it
//! performs reuses the same clean factorization.

use std::collections::BTreeMap;

use crate::characterization::{CharacterizationEngine, MethodKey, MethodRegistry};
use crate::error::{CalcError, CharacterizationError};
use crate::graph::{FunctionalUnit, ProcessGraph};
use crate::matrix::{MatrixBuilder, SystemMatrices};
use crate::solver::{Solution, TechnosphereSolver};

/// Per-method scores for one functional unit, with per-method failures
/// kept separate so one unknown method does not block the others.
#[derive(Clone, Debug)]
pub struct ScoreSet {
    pub scores: BTreeMap<MethodKey, f64>,
    pub failures: Vec<(MethodKey, CharacterizationError)>,
}

/// One graph snapshot, decomposed and ready to score.
pub struct LcaCalculator<'g> {
    graph: &'g ProcessGraph,
    matrices: SystemMatrices,
    solver: TechnosphereSolver,
    characterization: CharacterizationEngine,
}

impl<'g> LcaCalculator<'g> {
    /// Build matrices from the graph, factor A, and align characterization
    /// vectors for every registered method.
    pub fn new(graph: &'g ProcessGraph, registry: &MethodRegistry) -> Result<Self, CalcError> {
        let matrices = MatrixBuilder::build(graph)?;
        let solver = TechnosphereSolver::decompose(&matrices)?;
        let characterization = CharacterizationEngine::new(registry, &matrices);
        Ok(Self {
            graph,
            matrices,
            solver,
            characterization,
        })
    }

    #[inline]
    pub fn graph(&self) -> &ProcessGraph {
        self.graph
    }

    #[inline]
    pub fn matrices(&self) -> &SystemMatrices {
        &self.matrices
    }

    #[inline]
    pub fn characterization(&self) -> &CharacterizationEngine {
        &self.characterization
    }

    /// Supply and inventory for one functional unit, using the cached
    /// factorization.
    pub fn solve(&self, functional_unit: &FunctionalUnit) -> Result<Solution, CalcError> {
        Ok(self
            .solver
            .solve(self.graph, &self.matrices, functional_unit)?)
    }

    /// Scalar impact score for one (functional unit, method) pair.
    pub fn score(
        &self,
        functional_unit: &FunctionalUnit,
        method: &MethodKey,
    ) -> Result<f64, CalcError> {
        let solution = self.solve(functional_unit)?;
        Ok(self.characterization.score(&solution.inventory, method)?)
    }

    /// Score one functional unit under several methods with a single solve.
    ///
    /// Unknown methods land in `failures`; a structural solve error aborts
    /// the whole call.
    pub fn score_all(
        &self,
        functional_unit: &FunctionalUnit,
        methods: &[MethodKey],
    ) -> Result<ScoreSet, CalcError> {
        let solution = self.solve(functional_unit)?;

        let mut scores = BTreeMap::new();
        let mut failures = Vec::new();
        for method in methods {
            match self.characterization.score(&solution.inventory, method) {
                Ok(score) => {
                    scores.insert(method.clone(), score);
                }
                Err(err) => failures.push((method.clone(), err)),
            }
        }
        Ok(ScoreSet { scores, failures })
    }
}
