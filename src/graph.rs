//! Product-system graph: processes linked by technosphere and biosphere
//! exchanges.
//!
//! The graph is assembled once by an importer and then treated as a
//! snapshot. Exchange amounts are the only mutable state; every mutation
//! goes through the graph so that its revision counter can be bumped.
//! Consumers compare revisions to decide whether cached matrices and
//! factorizations are still valid.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::uncertainty::Uncertainty;

/// Directed technosphere edge: the owning process consumes `amount` of the
/// reference product of process `input`.
#[derive(Clone, Debug, PartialEq)]
pub struct TechnosphereExchange {
    /// Code of the supplying process.
    pub input: String,
    /// Exchange name, used to bind sampled amounts during uncertainty runs.
    pub name: String,
    pub amount: f64,
    pub uncertainty: Uncertainty,
    /// Optional label used to aggregate contributions into semantic buckets.
    pub group_tag: Option<String>,
}

impl TechnosphereExchange {
    pub fn new(input: &str, name: &str, amount: f64) -> Self {
        Self {
            input: input.to_string(),
            name: name.to_string(),
            amount,
            uncertainty: Uncertainty::None,
            group_tag: None,
        }
    }

    pub fn with_uncertainty(mut self, uncertainty: Uncertainty) -> Self {
        self.uncertainty = uncertainty;
        self
    }

    pub fn with_group_tag(mut self, tag: &str) -> Self {
        self.group_tag = Some(tag.to_string());
        self
    }
}

/// Environmental edge: the owning process emits or consumes `amount` of
/// the biosphere flow `flow`.
#[derive(Clone, Debug, PartialEq)]
pub struct BiosphereExchange {
    pub flow: String,
    pub amount: f64,
}

impl BiosphereExchange {
    pub fn new(flow: &str, amount: f64) -> Self {
        Self {
            flow: flow.to_string(),
            amount,
        }
    }
}

/// A unit process: one column of the technosphere system.
#[derive(Clone, Debug)]
pub struct Process {
    /// Unique code within a graph snapshot.
    pub code: String,
    pub name: String,
    pub location: String,
    pub unit: String,
    /// Reference-product output, the diagonal entry of the process column.
    pub reference_amount: f64,
    technosphere: Vec<TechnosphereExchange>,
    biosphere: Vec<BiosphereExchange>,
}

impl Process {
    pub fn new(code: &str, name: &str, location: &str, unit: &str, reference_amount: f64) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            location: location.to_string(),
            unit: unit.to_string(),
            reference_amount,
            technosphere: Vec::new(),
            biosphere: Vec::new(),
        }
    }

    pub fn push_technosphere(&mut self, exchange: TechnosphereExchange) {
        self.technosphere.push(exchange);
    }

    pub fn push_biosphere(&mut self, exchange: BiosphereExchange) {
        self.biosphere.push(exchange);
    }

    /// Builder-style variant of [`Process::push_technosphere`].
    pub fn with_technosphere(mut self, exchange: TechnosphereExchange) -> Self {
        self.technosphere.push(exchange);
        self
    }

    /// Builder-style variant of [`Process::push_biosphere`].
    pub fn with_biosphere(mut self, exchange: BiosphereExchange) -> Self {
        self.biosphere.push(exchange);
        self
    }

    #[inline]
    pub fn technosphere(&self) -> &[TechnosphereExchange] {
        &self.technosphere
    }

    #[inline]
    pub fn biosphere(&self) -> &[BiosphereExchange] {
        &self.biosphere
    }
}

impl std::fmt::Display for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} '{}' [{}] ({} {})",
            self.code, self.name, self.location, self.reference_amount, self.unit
        )
    }
}

/// The reference process and demand amount for which an inventory is solved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionalUnit {
    pub process: String,
    pub amount: f64,
}

impl FunctionalUnit {
    pub fn new(process: &str, amount: f64) -> Self {
        Self {
            process: process.to_string(),
            amount,
        }
    }
}

impl std::fmt::Display for FunctionalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} × {}", self.amount, self.process)
    }
}

/// Snapshot of a product system.
///
/// Processes are stored in insertion order; that order defines the column
/// order of the matrices built from the graph. The revision counter starts
/// at 0 and is bumped on every amount mutation, which is what invalidates
/// downstream factorizations.
#[derive(Clone, Debug, Default)]
pub struct ProcessGraph {
    processes: Vec<Process>,
    by_code: HashMap<String, usize>,
    revision: u64,
}

impl ProcessGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a process. Codes must be unique within the snapshot.
    pub fn add_process(&mut self, process: Process) -> Result<(), GraphError> {
        if self.by_code.contains_key(&process.code) {
            return Err(GraphError::DuplicateProcess(process.code.clone()));
        }
        self.by_code
            .insert(process.code.clone(), self.processes.len());
        self.processes.push(process);
        Ok(())
    }

    #[inline]
    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn get(&self, code: &str) -> Option<&Process> {
        self.by_code.get(code).map(|&idx| &self.processes[idx])
    }

    /// Column index of a process in matrices built from this snapshot.
    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.by_code.get(code).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Current mutation counter. Matrices and decompositions record the
    /// revision they were built from and compare against this.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Distinct biosphere flows across the whole graph, sorted for a
    /// stable row order in the biosphere matrix.
    pub fn biosphere_flows(&self) -> BTreeSet<String> {
        self.processes
            .iter()
            .flat_map(|p| p.biosphere().iter().map(|e| e.flow.clone()))
            .collect()
    }

    /// Overwrite the amount of every technosphere exchange of `process`
    /// named `exchange`. Returns how many exchanges were updated; a return
    /// of 0 means nothing matched and nothing was invalidated.
    pub fn set_technosphere_amount(
        &mut self,
        process: &str,
        exchange: &str,
        amount: f64,
    ) -> Result<usize, GraphError> {
        let idx = *self
            .by_code
            .get(process)
            .ok_or_else(|| GraphError::UnknownProcess(process.to_string()))?;
        let mut updated = 0;
        for exc in &mut self.processes[idx].technosphere {
            if exc.name == exchange {
                exc.amount = amount;
                updated += 1;
            }
        }
        if updated > 0 {
            self.revision += 1;
        }
        Ok(updated)
    }

    /// Current technosphere amounts of `process`, in exchange order.
    pub fn technosphere_amounts(&self, process: &str) -> Result<Vec<f64>, GraphError> {
        let idx = *self
            .by_code
            .get(process)
            .ok_or_else(|| GraphError::UnknownProcess(process.to_string()))?;
        Ok(self.processes[idx]
            .technosphere
            .iter()
            .map(|e| e.amount)
            .collect())
    }

    /// Bulk-overwrite the technosphere amounts of `process`, in exchange
    /// order. One revision bump for the whole write.
    pub fn set_technosphere_amounts(
        &mut self,
        process: &str,
        amounts: &[f64],
    ) -> Result<(), GraphError> {
        let idx = *self
            .by_code
            .get(process)
            .ok_or_else(|| GraphError::UnknownProcess(process.to_string()))?;
        let exchanges = &mut self.processes[idx].technosphere;
        if exchanges.len() != amounts.len() {
            return Err(GraphError::AmountMismatch {
                process: process.to_string(),
                expected: exchanges.len(),
                found: amounts.len(),
            });
        }
        for (exc, &amount) in exchanges.iter_mut().zip(amounts) {
            exc.amount = amount;
        }
        self.revision += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_process_graph() -> ProcessGraph {
        let mut graph = ProcessGraph::new();
        graph
            .add_process(
                Process::new("a", "upstream", "GLO", "kg", 1.0)
                    .with_biosphere(BiosphereExchange::new("co2", 2.0)),
            )
            .unwrap();
        graph
            .add_process(
                Process::new("b", "downstream", "GLO", "kg", 1.0)
                    .with_technosphere(TechnosphereExchange::new("a", "upstream input", 1.0)),
            )
            .unwrap();
        graph
    }

    #[test]
    fn duplicate_code_is_rejected() {
        let mut graph = two_process_graph();
        let result = graph.add_process(Process::new("a", "again", "GLO", "kg", 1.0));
        assert_eq!(result, Err(GraphError::DuplicateProcess("a".to_string())));
    }

    #[test]
    fn amount_mutation_bumps_revision() {
        let mut graph = two_process_graph();
        assert_eq!(graph.revision(), 0);

        let updated = graph
            .set_technosphere_amount("b", "upstream input", 1.5)
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(graph.revision(), 1);
        assert_eq!(graph.get("b").unwrap().technosphere()[0].amount, 1.5);
    }

    #[test]
    fn unmatched_exchange_does_not_invalidate() {
        let mut graph = two_process_graph();
        let updated = graph
            .set_technosphere_amount("b", "no such exchange", 1.5)
            .unwrap();
        assert_eq!(updated, 0);
        assert_eq!(graph.revision(), 0);
    }

    #[test]
    fn unknown_process_mutation_errors() {
        let mut graph = two_process_graph();
        let result = graph.set_technosphere_amount("zzz", "x", 1.0);
        assert_eq!(result, Err(GraphError::UnknownProcess("zzz".to_string())));
    }

    #[test]
    fn bulk_amounts_round_trip() {
        let mut graph = two_process_graph();
        let saved = graph.technosphere_amounts("b").unwrap();
        graph.set_technosphere_amount("b", "upstream input", 9.0).unwrap();
        graph.set_technosphere_amounts("b", &saved).unwrap();
        assert_eq!(graph.technosphere_amounts("b").unwrap(), vec![1.0]);
    }

    #[test]
    fn bulk_amounts_length_checked() {
        let mut graph = two_process_graph();
        let result = graph.set_technosphere_amounts("b", &[1.0, 2.0]);
        assert!(matches!(result, Err(GraphError::AmountMismatch { .. })));
    }

    #[test]
    fn biosphere_flows_are_sorted_and_distinct() {
        let mut graph = two_process_graph();
        graph
            .add_process(
                Process::new("c", "other", "GLO", "kg", 1.0)
                    .with_biosphere(BiosphereExchange::new("ch4", 0.1))
                    .with_biosphere(BiosphereExchange::new("co2", 0.5)),
            )
            .unwrap();

        let flows: Vec<String> = graph.biosphere_flows().into_iter().collect();
        assert_eq!(flows, vec!["ch4".to_string(), "co2".to_string()]);
    }
}
