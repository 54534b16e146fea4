//! Result accumulation and persistence.
//!
//! Deterministic scores are keyed by (functional unit, method); Monte
//! Carlo results keep one score record per (iteration, method) plus a
//! percentile summary per method. Snapshots use an explicit versioned
//! schema and round-trip through JSON back to identical in-memory
//! structures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::characterization::MethodKey;
use crate::error::ResultError;
use crate::graph::FunctionalUnit;

/// Schema version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Percentiles of a pooled score distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

impl Percentiles {
    /// Compute the [5, 25, 50, 75, 95] percentiles with linear
    /// interpolation between order statistics. None for an empty pool.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        Some(Self {
            p5: percentile(&sorted, 5.0),
            p25: percentile(&sorted, 25.0),
            p50: percentile(&sorted, 50.0),
            p75: percentile(&sorted, 75.0),
            p95: percentile(&sorted, 95.0),
        })
    }

    pub fn as_array(&self) -> [f64; 5] {
        [self.p5, self.p25, self.p50, self.p75, self.p95]
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Per-method scores of one Monte Carlo iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationScores {
    pub iteration: usize,
    pub scores: BTreeMap<MethodKey, f64>,
}

impl IterationScores {
    pub fn new(iteration: usize) -> Self {
        Self {
            iteration,
            scores: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, method: MethodKey, score: f64) {
        self.scores.insert(method, score);
    }
}

/// How a Monte Carlo run ended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum McStatus {
    Completed,
    /// Cancelled between iterations; `completed` iterations were recorded
    /// and the summary covers only those.
    Cancelled { completed: usize },
    /// The target process declared no uncertain exchanges; nothing ran.
    NoStochasticInputs,
}

/// Outcome of one Monte Carlo run: per-iteration records plus a percentile
/// summary per method over the completed iterations.
#[derive(Clone, Debug, PartialEq)]
pub struct McResult {
    status: McStatus,
    iterations: Vec<IterationScores>,
    summary: BTreeMap<MethodKey, Percentiles>,
}

impl McResult {
    /// Assemble a result, deriving the summary from the recorded
    /// iterations only; a partial run never summarizes as complete.
    pub fn new(status: McStatus, iterations: Vec<IterationScores>) -> Self {
        let mut pooled: BTreeMap<MethodKey, Vec<f64>> = BTreeMap::new();
        for record in &iterations {
            for (method, &score) in &record.scores {
                pooled.entry(method.clone()).or_default().push(score);
            }
        }
        let summary = pooled
            .into_iter()
            .filter_map(|(method, scores)| {
                Percentiles::from_samples(&scores).map(|p| (method, p))
            })
            .collect();

        Self {
            status,
            iterations,
            summary,
        }
    }

    pub fn no_stochastic_inputs() -> Self {
        Self::new(McStatus::NoStochasticInputs, Vec::new())
    }

    #[inline]
    pub fn status(&self) -> &McStatus {
        &self.status
    }

    #[inline]
    pub fn iterations(&self) -> &[IterationScores] {
        &self.iterations
    }

    #[inline]
    pub fn summary(&self) -> &BTreeMap<MethodKey, Percentiles> {
        &self.summary
    }

    pub fn is_complete(&self) -> bool {
        self.status == McStatus::Completed
    }

    pub fn to_snapshot(&self) -> McSnapshot {
        McSnapshot {
            version: SNAPSHOT_VERSION,
            status: self.status.clone(),
            iterations: self
                .iterations
                .iter()
                .map(|record| IterationRecord {
                    iteration: record.iteration,
                    scores: record
                        .scores
                        .iter()
                        .map(|(method, &score)| MethodScore {
                            method: method.clone(),
                            score,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn from_snapshot(snapshot: McSnapshot) -> Result<Self, ResultError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ResultError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let iterations = snapshot
            .iterations
            .into_iter()
            .map(|record| IterationScores {
                iteration: record.iteration,
                scores: record
                    .scores
                    .into_iter()
                    .map(|entry| (entry.method, entry.score))
                    .collect(),
            })
            .collect();
        Ok(Self::new(snapshot.status, iterations))
    }

    pub fn to_json(&self) -> Result<String, ResultError> {
        Ok(serde_json::to_string(&self.to_snapshot())?)
    }

    pub fn from_json(json: &str) -> Result<Self, ResultError> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }
}

/// Serialized form of one (method, score) entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodScore {
    pub method: MethodKey,
    pub score: f64,
}

/// Serialized form of one iteration's scores.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub scores: Vec<MethodScore>,
}

/// Versioned wire form of an [`McResult`]. The summary is derived on
/// restore rather than persisted, so it can never disagree with the
/// iteration records.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McSnapshot {
    pub version: u32,
    pub status: McStatus,
    pub iterations: Vec<IterationRecord>,
}

/// One deterministic score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeterministicScore {
    pub functional_unit: FunctionalUnit,
    pub method: MethodKey,
    pub score: f64,
}

/// Accumulates deterministic and Monte Carlo results for export.
///
/// Lives only for the duration of a calculation session; persistence
/// happens through explicit snapshots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultStore {
    deterministic: Vec<DeterministicScore>,
    monte_carlo: Vec<(String, McResult)>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_score(&mut self, functional_unit: FunctionalUnit, method: MethodKey, score: f64) {
        self.deterministic.push(DeterministicScore {
            functional_unit,
            method,
            score,
        });
    }

    #[inline]
    pub fn scores(&self) -> &[DeterministicScore] {
        &self.deterministic
    }

    /// Exact lookup of a recorded score. Later records shadow earlier ones
    /// for the same key.
    pub fn score_for(&self, functional_unit: &FunctionalUnit, method: &MethodKey) -> Option<f64> {
        self.deterministic
            .iter()
            .rev()
            .find(|record| record.functional_unit == *functional_unit && record.method == *method)
            .map(|record| record.score)
    }

    pub fn record_monte_carlo(&mut self, target: &str, result: McResult) {
        self.monte_carlo.push((target.to_string(), result));
    }

    /// Most recent Monte Carlo result for a target process.
    pub fn monte_carlo(&self, target: &str) -> Option<&McResult> {
        self.monte_carlo
            .iter()
            .rev()
            .find(|(name, _)| name == target)
            .map(|(_, result)| result)
    }

    pub fn monte_carlo_runs(&self) -> impl Iterator<Item = (&str, &McResult)> {
        self.monte_carlo
            .iter()
            .map(|(name, result)| (name.as_str(), result))
    }

    pub fn to_json(&self) -> Result<String, ResultError> {
        let snapshot = StoreSnapshot {
            version: SNAPSHOT_VERSION,
            deterministic: self.deterministic.clone(),
            monte_carlo: self
                .monte_carlo
                .iter()
                .map(|(target, result)| McEntry {
                    target: target.clone(),
                    result: result.to_snapshot(),
                })
                .collect(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ResultError> {
        let snapshot: StoreSnapshot = serde_json::from_str(json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ResultError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let monte_carlo = snapshot
            .monte_carlo
            .into_iter()
            .map(|entry| Ok((entry.target, McResult::from_snapshot(entry.result)?)))
            .collect::<Result<_, ResultError>>()?;
        Ok(Self {
            deterministic: snapshot.deterministic,
            monte_carlo,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct McEntry {
    target: String,
    result: McSnapshot,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    version: u32,
    deterministic: Vec<DeterministicScore>,
    monte_carlo: Vec<McEntry>,
}
