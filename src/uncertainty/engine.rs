//! Monte Carlo uncertainty propagation.
//!
//! One run walks a fixed state machine for a single target process:
//! parse its stochastic exchanges, draw all samples up front, then inject
//! one iteration's draws into the live graph, rebuild and re-solve, and
//! record per-method scores. Iterations are strictly sequential because
//! they mutate the shared exchange amounts in place; the original amounts
//! are snapshotted before the first iteration and restored when the run
//! ends, whether it completes, aborts, or is cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::calculator::LcaCalculator;
use crate::characterization::{MethodKey, MethodRegistry};
use crate::error::{CharacterizationError, UncertaintyError};
use crate::graph::{FunctionalUnit, ProcessGraph};
use crate::results::{IterationScores, McResult, McStatus};
use crate::uncertainty::distribution::Uncertainty;

/// Configuration for one Monte Carlo run.
#[derive(Clone, Debug)]
pub struct McConfig {
    /// Number of iterations to draw and solve.
    pub n_iter: usize,
    /// Base RNG seed; each stochastic exchange samples from its own
    /// stream seeded with `seed + column`.
    pub seed: u64,
}

impl McConfig {
    pub fn new(n_iter: usize, seed: u64) -> Self {
        Self { n_iter, seed }
    }
}

/// Cooperative cancellation flag, checked at the top of each iteration.
/// Cancelling never tears down a partially solved iteration; the run stops
/// at the next iteration boundary and reports partial results.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One stochastic exchange of the target process.
#[derive(Clone, Debug, PartialEq)]
pub struct StochasticInput {
    pub name: String,
    pub uncertainty: Uncertainty,
}

/// Drawn samples: one column per stochastic input, one row per iteration.
#[derive(Clone, Debug)]
pub struct SampleMatrix {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl SampleMatrix {
    /// Build from externally supplied columns, e.g. samples shared with a
    /// linked model. All columns must have the same length.
    pub fn from_columns(names: Vec<String>, columns: Vec<Vec<f64>>) -> Self {
        Self { names, columns }
    }

    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of iterations covered by these samples.
    pub fn n_iter(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    #[inline]
    pub fn draw(&self, iteration: usize, column: usize) -> f64 {
        self.columns[column][iteration]
    }
}

type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Monte Carlo engine for a single target process.
pub struct UncertaintyEngine {
    config: McConfig,
    progress: Option<ProgressFn>,
}

impl UncertaintyEngine {
    pub fn new(config: McConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Install a progress callback, invoked as (completed, total) between
    /// iterations. It runs on the solving thread and must return quickly.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    #[inline]
    pub fn config(&self) -> &McConfig {
        &self.config
    }

    /// Collect the stochastic technosphere exchanges of the target process.
    ///
    /// Duplicate exchange names collapse to a single input: the first
    /// descriptor wins and every same-named exchange later receives the
    /// same draw. Conflicting duplicate descriptors are logged.
    pub fn parse(
        &self,
        graph: &ProcessGraph,
        target: &str,
    ) -> Result<Vec<StochasticInput>, UncertaintyError> {
        let process = graph
            .get(target)
            .ok_or_else(|| UncertaintyError::UnknownTarget(target.to_string()))?;

        let mut inputs: Vec<StochasticInput> = Vec::new();
        for exc in process.technosphere() {
            if !exc.uncertainty.is_stochastic() {
                continue;
            }
            match inputs.iter().find(|input| input.name == exc.name) {
                Some(existing) => {
                    if existing.uncertainty != exc.uncertainty {
                        warn!(
                            process = target,
                            exchange = %exc.name,
                            "duplicate exchange name with conflicting uncertainty; first descriptor wins"
                        );
                    }
                }
                None => inputs.push(StochasticInput {
                    name: exc.name.clone(),
                    uncertainty: exc.uncertainty.clone(),
                }),
            }
        }
        Ok(inputs)
    }

    /// Draw `n_iter` samples per input. Inputs sample independently, each
    /// from its own seeded stream, so runs are reproducible and insensitive
    /// to the order other inputs consume their streams in.
    pub fn sample(&self, inputs: &[StochasticInput]) -> Result<SampleMatrix, UncertaintyError> {
        let mut names = Vec::with_capacity(inputs.len());
        let mut columns = Vec::with_capacity(inputs.len());

        for (col, input) in inputs.iter().enumerate() {
            let sampler = input.uncertainty.sampler().map_err(|reason| {
                UncertaintyError::InvalidDistribution {
                    exchange: input.name.clone(),
                    kind: input.uncertainty.kind(),
                    reason,
                }
            })?;

            let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(col as u64));
            let draws: Vec<f64> = (0..self.config.n_iter)
                .map(|_| sampler.draw(&mut rng))
                .collect();

            names.push(input.name.clone());
            columns.push(draws);
        }

        Ok(SampleMatrix { names, columns })
    }

    /// Full run: parse, sample, inject and solve, aggregate.
    pub fn run(
        &self,
        graph: &mut ProcessGraph,
        registry: &MethodRegistry,
        target: &str,
        functional_unit: &FunctionalUnit,
        methods: &[MethodKey],
    ) -> Result<McResult, UncertaintyError> {
        self.run_cancellable(
            graph,
            registry,
            target,
            functional_unit,
            methods,
            &CancelToken::new(),
        )
    }

    /// Like [`UncertaintyEngine::run`], but checks `cancel` at the top of
    /// each iteration and returns partial results when it fires.
    pub fn run_cancellable(
        &self,
        graph: &mut ProcessGraph,
        registry: &MethodRegistry,
        target: &str,
        functional_unit: &FunctionalUnit,
        methods: &[MethodKey],
        cancel: &CancelToken,
    ) -> Result<McResult, UncertaintyError> {
        let inputs = self.parse(graph, target)?;
        if inputs.is_empty() {
            warn!(
                process = target,
                "no stochastic inputs declared; skipping Monte Carlo run"
            );
            return Ok(McResult::no_stochastic_inputs());
        }

        let samples = self.sample(&inputs)?;
        self.run_with_samples(graph, registry, target, functional_unit, methods, &samples, cancel)
    }

    /// Inject externally supplied samples and solve, e.g. draws shared
    /// with a linked techno-economic model. The sample matrix's iteration
    /// count overrides the configured one.
    #[allow(clippy::too_many_arguments)]
    pub fn run_with_samples(
        &self,
        graph: &mut ProcessGraph,
        registry: &MethodRegistry,
        target: &str,
        functional_unit: &FunctionalUnit,
        methods: &[MethodKey],
        samples: &SampleMatrix,
        cancel: &CancelToken,
    ) -> Result<McResult, UncertaintyError> {
        for method in methods {
            if !registry.contains(method) {
                return Err(CharacterizationError::UnknownMethod(method.clone()).into());
            }
        }

        let originals = graph.technosphere_amounts(target)?;
        let outcome =
            self.inject_and_solve(graph, registry, target, functional_unit, methods, samples, cancel);
        // The graph is shared state: put the pre-run amounts back no matter
        // how the loop ended.
        graph.set_technosphere_amounts(target, &originals)?;

        let (iterations, cancelled) = outcome?;
        let status = if cancelled {
            McStatus::Cancelled {
                completed: iterations.len(),
            }
        } else {
            McStatus::Completed
        };

        let result = McResult::new(status, iterations);
        info!(
            process = target,
            iterations = result.iterations().len(),
            complete = result.is_complete(),
            "monte carlo run finished"
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn inject_and_solve(
        &self,
        graph: &mut ProcessGraph,
        registry: &MethodRegistry,
        target: &str,
        functional_unit: &FunctionalUnit,
        methods: &[MethodKey],
        samples: &SampleMatrix,
        cancel: &CancelToken,
    ) -> Result<(Vec<IterationScores>, bool), UncertaintyError> {
        let total = samples.n_iter();
        let mut iterations = Vec::with_capacity(total);

        for iteration in 0..total {
            if cancel.is_cancelled() {
                info!(
                    process = target,
                    completed = iterations.len(),
                    "monte carlo run cancelled"
                );
                return Ok((iterations, true));
            }

            for (column, name) in samples.names().iter().enumerate() {
                let updated =
                    graph.set_technosphere_amount(target, name, samples.draw(iteration, column))?;
                if updated == 0 {
                    return Err(UncertaintyError::ExchangeMatch {
                        process: target.to_string(),
                        exchange: name.clone(),
                        iteration,
                    });
                }
            }

            // The injection bumped the graph revision, so the previous
            // iteration's factorization is unusable; build a fresh one.
            let calculator = LcaCalculator::new(graph, registry)?;
            let solution = calculator.solve(functional_unit)?;

            let mut scores = IterationScores::new(iteration);
            for method in methods {
                let score = calculator
                    .characterization()
                    .score(&solution.inventory, method)
                    .map_err(UncertaintyError::from)?;
                scores.insert(method.clone(), score);
            }
            debug!(iteration, process = target, "iteration scored");
            iterations.push(scores);

            if let Some(progress) = &self.progress {
                progress(iterations.len(), total);
            }
        }

        Ok((iterations, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::characterization::ImpactMethod;
    use crate::graph::{BiosphereExchange, Process, TechnosphereExchange};

    fn gwp() -> MethodKey {
        MethodKey::new("ipcc", "climate change", "gwp100")
    }

    fn registry() -> MethodRegistry {
        let mut registry = MethodRegistry::new();
        registry.register(ImpactMethod::new(gwp()).with_factor("co2", 1.0));
        registry
    }

    // Chain a -> b where b's input amount is uncertain. With co2 = 2 per
    // unit of a, the score for (b, 1) is twice the sampled amount.
    fn uncertain_graph(uncertainty: Uncertainty) -> ProcessGraph {
        let mut graph = ProcessGraph::new();
        graph
            .add_process(
                Process::new("a", "upstream", "GLO", "kg", 1.0)
                    .with_biosphere(BiosphereExchange::new("co2", 2.0)),
            )
            .unwrap();
        graph
            .add_process(
                Process::new("b", "downstream", "GLO", "kg", 1.0).with_technosphere(
                    TechnosphereExchange::new("a", "upstream input", 1.0)
                        .with_uncertainty(uncertainty),
                ),
            )
            .unwrap();
        graph
    }

    fn uniform() -> Uncertainty {
        Uncertainty::Uniform {
            minimum: 0.5,
            maximum: 1.5,
        }
    }

    #[test]
    fn hundred_iterations_yield_hundred_records_and_ordered_percentiles() {
        let mut graph = uncertain_graph(uniform());
        let registry = registry();
        let engine = UncertaintyEngine::new(McConfig::new(100, 42));

        let result = engine
            .run(
                &mut graph,
                &registry,
                "b",
                &FunctionalUnit::new("b", 1.0),
                &[gwp()],
            )
            .unwrap();

        assert_eq!(result.status(), &McStatus::Completed);
        assert_eq!(result.iterations().len(), 100);
        for (idx, record) in result.iterations().iter().enumerate() {
            assert_eq!(record.iteration, idx);
            let score = record.scores[&gwp()];
            // amount in (0.5, 1.5) and score = 2 * amount
            assert!(score > 1.0 && score < 3.0);
        }

        let summary = result.summary().get(&gwp()).unwrap();
        let [p5, p25, p50, p75, p95] = summary.as_array();
        assert!(p5 <= p25 && p25 <= p50 && p50 <= p75 && p75 <= p95);
    }

    #[test]
    fn amounts_are_restored_after_run() {
        let mut graph = uncertain_graph(uniform());
        let registry = registry();
        let engine = UncertaintyEngine::new(McConfig::new(10, 42));

        engine
            .run(
                &mut graph,
                &registry,
                "b",
                &FunctionalUnit::new("b", 1.0),
                &[gwp()],
            )
            .unwrap();

        assert_eq!(graph.technosphere_amounts("b").unwrap(), vec![1.0]);
    }

    #[test]
    fn same_seed_reproduces_the_score_series() {
        let registry = registry();
        let engine = UncertaintyEngine::new(McConfig::new(20, 7));

        let mut first_graph = uncertain_graph(uniform());
        let first = engine
            .run(
                &mut first_graph,
                &registry,
                "b",
                &FunctionalUnit::new("b", 1.0),
                &[gwp()],
            )
            .unwrap();

        let mut second_graph = uncertain_graph(uniform());
        let second = engine
            .run(
                &mut second_graph,
                &registry,
                "b",
                &FunctionalUnit::new("b", 1.0),
                &[gwp()],
            )
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn no_stochastic_inputs_yields_zero_iterations() {
        let mut graph = uncertain_graph(Uncertainty::None);
        let registry = registry();
        let engine = UncertaintyEngine::new(McConfig::new(50, 42));

        let result = engine
            .run(
                &mut graph,
                &registry,
                "b",
                &FunctionalUnit::new("b", 1.0),
                &[gwp()],
            )
            .unwrap();

        assert_eq!(result.status(), &McStatus::NoStochasticInputs);
        assert!(result.iterations().is_empty());
        assert!(result.summary().is_empty());
    }

    #[test]
    fn cancellation_returns_partial_results() {
        let mut graph = uncertain_graph(uniform());
        let registry = registry();
        let cancel = CancelToken::new();

        // Cancel from the progress callback after five completed iterations.
        let trigger = cancel.clone();
        let engine =
            UncertaintyEngine::new(McConfig::new(100, 42)).with_progress(Box::new(move |done, _| {
                if done == 5 {
                    trigger.cancel();
                }
            }));

        let result = engine
            .run_cancellable(
                &mut graph,
                &registry,
                "b",
                &FunctionalUnit::new("b", 1.0),
                &[gwp()],
                &cancel,
            )
            .unwrap();

        assert_eq!(result.status(), &McStatus::Cancelled { completed: 5 });
        assert_eq!(result.iterations().len(), 5);
        assert!(!result.is_complete());
        // Partial amounts were still rolled back.
        assert_eq!(graph.technosphere_amounts("b").unwrap(), vec![1.0]);
    }

    #[test]
    fn missing_exchange_aborts_and_restores() {
        let mut graph = uncertain_graph(uniform());
        let registry = registry();
        let engine = UncertaintyEngine::new(McConfig::new(10, 42));

        let samples =
            SampleMatrix::from_columns(vec!["ghost input".to_string()], vec![vec![1.0; 10]]);
        let result = engine.run_with_samples(
            &mut graph,
            &registry,
            "b",
            &FunctionalUnit::new("b", 1.0),
            &[gwp()],
            &samples,
            &CancelToken::new(),
        );

        assert_eq!(
            result.err(),
            Some(UncertaintyError::ExchangeMatch {
                process: "b".to_string(),
                exchange: "ghost input".to_string(),
                iteration: 0,
            })
        );
        assert_eq!(graph.technosphere_amounts("b").unwrap(), vec![1.0]);
    }

    #[test]
    fn unknown_method_is_reported_before_iterating() {
        let mut graph = uncertain_graph(uniform());
        let registry = registry();
        let engine = UncertaintyEngine::new(McConfig::new(10, 42));

        let missing = MethodKey::new("nope", "nope", "nope");
        let result = engine.run(
            &mut graph,
            &registry,
            "b",
            &FunctionalUnit::new("b", 1.0),
            &[missing.clone()],
        );

        assert_eq!(
            result.err(),
            Some(UncertaintyError::Characterization(
                CharacterizationError::UnknownMethod(missing)
            ))
        );
        // Nothing was injected.
        assert_eq!(graph.revision(), 0);
    }

    #[test]
    fn duplicate_names_collapse_to_one_input() {
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
                    .with_technosphere(
                        TechnosphereExchange::new("a", "upstream input", 1.0)
                            .with_uncertainty(uniform()),
                    )
                    .with_technosphere(
                        TechnosphereExchange::new("a", "upstream input", 2.0)
                            .with_uncertainty(uniform()),
                    ),
            )
            .unwrap();

        let engine = UncertaintyEngine::new(McConfig::new(10, 42));
        let inputs = engine.parse(&graph, "b").unwrap();
        assert_eq!(inputs.len(), 1);

        // Both exchanges receive the shared draw during injection.
        let registry = registry();
        let result = engine
            .run(
                &mut graph,
                &registry,
                "b",
                &FunctionalUnit::new("b", 1.0),
                &[gwp()],
            )
            .unwrap();
        assert_eq!(result.iterations().len(), 10);
        assert_eq!(
            graph.technosphere_amounts("b").unwrap(),
            vec![1.0, 2.0],
            "original amounts restored for both duplicates"
        );
    }

    #[test]
    fn invalid_distribution_is_a_configuration_error() {
        let mut graph = uncertain_graph(Uncertainty::Uniform {
            minimum: 2.0,
            maximum: 1.0,
        });
        let registry = registry();
        let engine = UncertaintyEngine::new(McConfig::new(10, 42));

        let result = engine.run(
            &mut graph,
            &registry,
            "b",
            &FunctionalUnit::new("b", 1.0),
            &[gwp()],
        );
        assert!(matches!(
            result,
            Err(UncertaintyError::InvalidDistribution { .. })
        ));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let graph = uncertain_graph(uniform());
        let engine = UncertaintyEngine::new(McConfig::new(10, 42));
        let result = engine.parse(&graph, "zzz");
        assert_eq!(
            result.err(),
            Some(UncertaintyError::UnknownTarget("zzz".to_string()))
        );
    }
}
