//! Matrix assembly from a process-graph snapshot.
//!
//! Builds the technosphere matrix A (process × process) and the biosphere
//! matrix B (flow × process). Column j describes process j: the diagonal
//! entry of A is its reference-product output, technosphere inputs enter
//! negatively, and B collects its environmental flows. The matrices record
//! the graph revision they were built from so callers can skip rebuilds
//! while the graph is untouched.

use std::collections::HashMap;

use nalgebra::DMatrix;

use crate::error::GraphError;
use crate::graph::ProcessGraph;

/// A and B for one graph snapshot, plus the index maps that give rows and
/// columns stable identities.
#[derive(Clone, Debug)]
pub struct SystemMatrices {
    technosphere: DMatrix<f64>,
    biosphere: DMatrix<f64>,
    process_codes: Vec<String>,
    process_index: HashMap<String, usize>,
    flow_names: Vec<String>,
    flow_index: HashMap<String, usize>,
    revision: u64,
}

impl SystemMatrices {
    #[inline]
    pub fn technosphere(&self) -> &DMatrix<f64> {
        &self.technosphere
    }

    #[inline]
    pub fn biosphere(&self) -> &DMatrix<f64> {
        &self.biosphere
    }

    /// Column order of both matrices.
    #[inline]
    pub fn process_codes(&self) -> &[String] {
        &self.process_codes
    }

    /// Row order of the biosphere matrix.
    #[inline]
    pub fn flow_names(&self) -> &[String] {
        &self.flow_names
    }

    pub fn process_column(&self, code: &str) -> Option<usize> {
        self.process_index.get(code).copied()
    }

    pub fn flow_row(&self, flow: &str) -> Option<usize> {
        self.flow_index.get(flow).copied()
    }

    #[inline]
    pub fn n_processes(&self) -> usize {
        self.process_codes.len()
    }

    #[inline]
    pub fn n_flows(&self) -> usize {
        self.flow_names.len()
    }

    /// Graph revision these matrices were built from.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Cheap rebuild-avoidance check: true while the graph has not been
    /// mutated since this build.
    pub fn is_current(&self, graph: &ProcessGraph) -> bool {
        self.revision == graph.revision()
    }
}

/// Converts a [`ProcessGraph`] snapshot into [`SystemMatrices`].
pub struct MatrixBuilder;

impl MatrixBuilder {
    /// Assemble A and B from the graph.
    ///
    /// Sign convention: reference-product outputs are positive on the
    /// diagonal, technosphere inputs are subtracted. Zero-amount exchanges
    /// are legal and contribute nothing. An exchange whose input process is
    /// not in the graph fails the build.
    pub fn build(graph: &ProcessGraph) -> Result<SystemMatrices, GraphError> {
        let n = graph.len();

        let process_codes: Vec<String> =
            graph.processes().iter().map(|p| p.code.clone()).collect();
        let process_index: HashMap<String, usize> = process_codes
            .iter()
            .enumerate()
            .map(|(idx, code)| (code.clone(), idx))
            .collect();

        let flow_names: Vec<String> = graph.biosphere_flows().into_iter().collect();
        let flow_index: HashMap<String, usize> = flow_names
            .iter()
            .enumerate()
            .map(|(idx, flow)| (flow.clone(), idx))
            .collect();

        let mut technosphere = DMatrix::<f64>::zeros(n, n);
        let mut biosphere = DMatrix::<f64>::zeros(flow_names.len(), n);

        for (j, process) in graph.processes().iter().enumerate() {
            technosphere[(j, j)] += process.reference_amount;

            for exc in process.technosphere() {
                let i = process_index.get(&exc.input).copied().ok_or_else(|| {
                    GraphError::Inconsistency {
                        process: process.code.clone(),
                        exchange: exc.name.clone(),
                        target: exc.input.clone(),
                    }
                })?;
                technosphere[(i, j)] -= exc.amount;
            }

            for exc in process.biosphere() {
                // Flow rows are derived from the graph itself, so the lookup
                // cannot miss here.
                let i = flow_index[&exc.flow];
                biosphere[(i, j)] += exc.amount;
            }
        }

        Ok(SystemMatrices {
            technosphere,
            biosphere,
            process_codes,
            process_index,
            flow_names,
            flow_index,
            revision: graph.revision(),
        })
    }
}
