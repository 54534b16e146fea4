//! Linear solver for the technosphere system.
//!
//! A·s = f is factored once per clean graph state (A = LU) and the
//! factorization is reused across functional units. Any exchange-amount
//! mutation bumps the graph revision, which makes the factorization stale;
//! solving against a stale factorization is refused rather than silently
//! producing numbers for a system that no longer exists.

use nalgebra::linalg::LU;
use nalgebra::{DVector, Dyn};

use crate::error::SolveError;
use crate::graph::{FunctionalUnit, ProcessGraph};
use crate::matrix::SystemMatrices;

/// Supply and inventory vectors for one functional unit.
#[derive(Clone, Debug)]
pub struct Solution {
    /// Process activity levels s solving A·s = f, in matrix column order.
    pub supply: DVector<f64>,
    /// Inventory g = B·s, in biosphere flow row order.
    pub inventory: DVector<f64>,
}

/// Cached LU factorization of one technosphere matrix state.
pub struct TechnosphereSolver {
    lu: LU<f64, Dyn, Dyn>,
    revision: u64,
    n: usize,
}

impl TechnosphereSolver {
    /// Factor A once. Fails with [`SolveError::SingularMatrix`] when the
    /// technosphere matrix is not invertible; this is fatal for the
    /// calculation, there is nothing to retry.
    pub fn decompose(matrices: &SystemMatrices) -> Result<Self, SolveError> {
        let lu = matrices.technosphere().clone().lu();
        if !lu.is_invertible() {
            return Err(SolveError::SingularMatrix);
        }
        Ok(Self {
            lu,
            revision: matrices.revision(),
            n: matrices.n_processes(),
        })
    }

    /// Graph revision this factorization belongs to.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Solve for one functional unit against the cached factorization.
    ///
    /// The demand vector is the unit demand of the functional-unit process
    /// scaled by its amount. Valid only while the graph is unchanged since
    /// [`TechnosphereSolver::decompose`]; a revision mismatch yields
    /// [`SolveError::StaleDecomposition`] and the caller must rebuild.
    pub fn solve(
        &self,
        graph: &ProcessGraph,
        matrices: &SystemMatrices,
        functional_unit: &FunctionalUnit,
    ) -> Result<Solution, SolveError> {
        if graph.revision() != self.revision || matrices.revision() != self.revision {
            return Err(SolveError::StaleDecomposition {
                decomposed: self.revision,
                current: graph.revision(),
            });
        }

        let column = matrices
            .process_column(&functional_unit.process)
            .ok_or_else(|| SolveError::UnknownProcess(functional_unit.process.clone()))?;

        let mut demand = DVector::<f64>::zeros(self.n);
        demand[column] = functional_unit.amount;

        let supply = self.lu.solve(&demand).ok_or(SolveError::SingularMatrix)?;
        let inventory = matrices.biosphere() * &supply;

        Ok(Solution { supply, inventory })
    }
}
