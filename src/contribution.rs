//! Contribution analysis: which processes drive a score, and how do a
//! functional unit's direct inputs aggregate by group tag.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::calculator::LcaCalculator;
use crate::characterization::MethodKey;
use crate::error::{CalcError, GraphError};
use crate::graph::FunctionalUnit;

/// Marginal contribution of one process to a score.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessContribution {
    pub process: String,
    pub contribution: f64,
}

/// Ranks technosphere contributors and aggregates direct exchanges by
/// group tag, reusing the calculator's cached factorization throughout.
pub struct ContributionAnalyzer<'a, 'g> {
    calculator: &'a LcaCalculator<'g>,
}

impl<'a, 'g> ContributionAnalyzer<'a, 'g> {
    pub fn new(calculator: &'a LcaCalculator<'g>) -> Self {
        Self { calculator }
    }

    /// Top-N technosphere contributors to the score of one functional unit.
    ///
    /// The contribution of process j is c · (B column j) · s_j: the share
    /// of the score carried by the flows process j emits at its solved
    /// activity level. Ordered descending by absolute contribution, ties
    /// broken by process code for determinism.
    pub fn top_processes(
        &self,
        functional_unit: &FunctionalUnit,
        method: &MethodKey,
        n: usize,
    ) -> Result<Vec<ProcessContribution>, CalcError> {
        let solution = self.calculator.solve(functional_unit)?;
        let factors = self.calculator.characterization().vector(method)?;
        let matrices = self.calculator.matrices();

        let mut ranked: Vec<ProcessContribution> = matrices
            .process_codes()
            .iter()
            .enumerate()
            .map(|(j, code)| ProcessContribution {
                process: code.clone(),
                contribution: solution.supply[j] * factors.dot(&matrices.biosphere().column(j)),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.process.cmp(&b.process))
        });
        ranked.truncate(n);
        Ok(ranked)
    }

    /// Aggregate the direct technosphere exchanges of the functional
    /// unit's process by their group tag.
    ///
    /// Each tagged exchange is scored as its own sub-system
    /// (exchange input, exchange amount) and summed into its tag's bucket.
    /// Untagged exchanges are dropped, not merged into a default bucket.
    /// Sub-system solves are independent reads of the cached factorization
    /// and run in parallel.
    pub fn grouped_by_tag(
        &self,
        functional_unit: &FunctionalUnit,
        method: &MethodKey,
    ) -> Result<BTreeMap<String, f64>, CalcError> {
        let process = self
            .calculator
            .graph()
            .get(&functional_unit.process)
            .ok_or_else(|| GraphError::UnknownProcess(functional_unit.process.clone()))?;

        let tagged: Vec<(&str, FunctionalUnit)> = process
            .technosphere()
            .iter()
            .filter_map(|exc| {
                exc.group_tag
                    .as_deref()
                    .map(|tag| (tag, FunctionalUnit::new(&exc.input, exc.amount)))
            })
            .collect();

        let scored: Vec<(&str, f64)> = tagged
            .par_iter()
            .map(|(tag, sub_unit)| {
                self.calculator
                    .score(sub_unit, method)
                    .map(|score| (*tag, score))
            })
            .collect::<Result<_, CalcError>>()?;

        let mut grouped = BTreeMap::new();
        for (tag, score) in scored {
            *grouped.entry(tag.to_string()).or_insert(0.0) += score;
        }
        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::characterization::{ImpactMethod, MethodRegistry};
    use crate::graph::{BiosphereExchange, Process, ProcessGraph, TechnosphereExchange};

    // Root process consuming three inputs whose unit scores are 10, 5, 5.
    fn three_input_graph() -> (ProcessGraph, MethodRegistry) {
        let mut graph = ProcessGraph::new();
        for (code, emission) in [("p1", 10.0), ("p2", 5.0), ("p3", 5.0)] {
            graph
                .add_process(
                    Process::new(code, code, "GLO", "kg", 1.0)
                        .with_biosphere(BiosphereExchange::new("co2", emission)),
                )
                .unwrap();
        }
        graph
            .add_process(
                Process::new("root", "assembly", "GLO", "unit", 1.0)
                    .with_technosphere(
                        TechnosphereExchange::new("p1", "first input", 1.0)
                            .with_group_tag("materials"),
                    )
                    .with_technosphere(
                        TechnosphereExchange::new("p2", "second input", 1.0)
                            .with_group_tag("materials"),
                    )
                    .with_technosphere(
                        TechnosphereExchange::new("p3", "third input", 1.0)
                            .with_group_tag("energy"),
                    ),
            )
            .unwrap();

        let mut registry = MethodRegistry::new();
        registry.register(
            ImpactMethod::new(MethodKey::new("ipcc", "climate change", "gwp100"))
                .with_factor("co2", 1.0),
        );
        (graph, registry)
    }

    fn gwp() -> MethodKey {
        MethodKey::new("ipcc", "climate change", "gwp100")
    }

    #[test]
    fn ranking_orders_by_magnitude_with_lexical_tie_break() {
        let (graph, registry) = three_input_graph();
        let calculator = LcaCalculator::new(&graph, &registry).unwrap();
        let analyzer = ContributionAnalyzer::new(&calculator);

        let top = analyzer
            .top_processes(&FunctionalUnit::new("root", 1.0), &gwp(), 2)
            .unwrap();

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].process, "p1");
        assert!((top[0].contribution - 10.0).abs() < 1e-12);
        // p2 and p3 both contribute 5; the lexically smaller code wins.
        assert_eq!(top[1].process, "p2");
        assert!((top[1].contribution - 5.0).abs() < 1e-12);
    }

    #[test]
    fn top_n_larger_than_graph_returns_everything_ranked() {
        let (graph, registry) = three_input_graph();
        let calculator = LcaCalculator::new(&graph, &registry).unwrap();
        let analyzer = ContributionAnalyzer::new(&calculator);

        let top = analyzer
            .top_processes(&FunctionalUnit::new("root", 1.0), &gwp(), 100)
            .unwrap();
        assert_eq!(top.len(), 4);
        // The root process emits nothing itself.
        assert_eq!(top[3].process, "root");
        assert_eq!(top[3].contribution, 0.0);
    }

    #[test]
    fn grouped_by_tag_sums_within_buckets() {
        let (graph, registry) = three_input_graph();
        let calculator = LcaCalculator::new(&graph, &registry).unwrap();
        let analyzer = ContributionAnalyzer::new(&calculator);

        let grouped = analyzer
            .grouped_by_tag(&FunctionalUnit::new("root", 1.0), &gwp())
            .unwrap();

        assert_eq!(grouped.len(), 2);
        assert!((grouped["materials"] - 15.0).abs() < 1e-12);
        assert!((grouped["energy"] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn untagged_exchanges_are_dropped() {
        let (mut graph, registry) = three_input_graph();
        graph
            .add_process(
                Process::new("p4", "p4", "GLO", "kg", 1.0)
                    .with_biosphere(BiosphereExchange::new("co2", 100.0)),
            )
            .unwrap();
        // Rebuild the root with an extra untagged input.
        let mut graph2 = ProcessGraph::new();
        for p in graph.processes().iter().filter(|p| p.code != "root") {
            graph2.add_process(p.clone()).unwrap();
        }
        let root = graph
            .get("root")
            .unwrap()
            .clone()
            .with_technosphere(TechnosphereExchange::new("p4", "untagged input", 1.0));
        graph2.add_process(root).unwrap();

        let calculator = LcaCalculator::new(&graph2, &registry).unwrap();
        let analyzer = ContributionAnalyzer::new(&calculator);
        let grouped = analyzer
            .grouped_by_tag(&FunctionalUnit::new("root", 1.0), &gwp())
            .unwrap();

        // p4's 100 never shows up in any bucket.
        let total: f64 = grouped.values().sum();
        assert!((total - 20.0).abs() < 1e-12);
    }
}
