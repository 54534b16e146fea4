//! Impact-characterization methods and inventory scoring.
//!
//! Methods are identified by an ordered triple of category strings and live
//! in an explicit registry with exact-match lookup. Scoring an inventory is
//! a dot product against the method's characterization vector; switching
//! the active method touches neither A nor B.

use std::collections::{BTreeMap, HashMap};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::CharacterizationError;
use crate::matrix::SystemMatrices;

/// Ordered identifier triple of an impact method:
/// (top-level category, sub-category, specific indicator).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodKey {
    pub category: String,
    pub subcategory: String,
    pub indicator: String,
}

impl MethodKey {
    pub fn new(category: &str, subcategory: &str, indicator: &str) -> Self {
        Self {
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            indicator: indicator.to_string(),
        }
    }
}

impl std::fmt::Display for MethodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.category, self.subcategory, self.indicator
        )
    }
}

/// One impact method: a characterization factor per biosphere flow.
#[derive(Clone, Debug)]
pub struct ImpactMethod {
    key: MethodKey,
    factors: HashMap<String, f64>,
}

impl ImpactMethod {
    pub fn new(key: MethodKey) -> Self {
        Self {
            key,
            factors: HashMap::new(),
        }
    }

    pub fn with_factor(mut self, flow: &str, factor: f64) -> Self {
        self.factors.insert(flow.to_string(), factor);
        self
    }

    pub fn set_factor(&mut self, flow: &str, factor: f64) {
        self.factors.insert(flow.to_string(), factor);
    }

    #[inline]
    pub fn key(&self) -> &MethodKey {
        &self.key
    }

    pub fn factor(&self, flow: &str) -> f64 {
        self.factors.get(flow).copied().unwrap_or(0.0)
    }
}

/// Explicit method registry with exact-match lookup.
#[derive(Clone, Debug, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<MethodKey, ImpactMethod>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: ImpactMethod) {
        self.methods.insert(method.key().clone(), method);
    }

    pub fn get(&self, key: &MethodKey) -> Option<&ImpactMethod> {
        self.methods.get(key)
    }

    pub fn contains(&self, key: &MethodKey) -> bool {
        self.methods.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &MethodKey> {
        self.methods.keys()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Approximate search: case-insensitive containment against all three
    /// identifier levels. A discovery convenience only; calculations must
    /// go through exact [`MethodKey`] lookup.
    pub fn search(&self, query: &str) -> Vec<&MethodKey> {
        let needle = query.to_lowercase();
        self.methods
            .keys()
            .filter(|key| {
                key.category.to_lowercase().contains(&needle)
                    || key.subcategory.to_lowercase().contains(&needle)
                    || key.indicator.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

/// Characterization vectors for every registered method, aligned to the
/// flow row order of one [`SystemMatrices`] build.
///
/// Factors for flows absent from the graph are ignored; graph flows without
/// a factor characterize to zero.
#[derive(Clone, Debug)]
pub struct CharacterizationEngine {
    vectors: BTreeMap<MethodKey, DVector<f64>>,
}

impl CharacterizationEngine {
    pub fn new(registry: &MethodRegistry, matrices: &SystemMatrices) -> Self {
        let vectors = registry
            .methods
            .values()
            .map(|method| {
                let factors = DVector::from_iterator(
                    matrices.n_flows(),
                    matrices.flow_names().iter().map(|flow| method.factor(flow)),
                );
                (method.key().clone(), factors)
            })
            .collect();
        Self { vectors }
    }

    /// Characterization vector of one method, in flow row order.
    pub fn vector(&self, key: &MethodKey) -> Result<&DVector<f64>, CharacterizationError> {
        self.vectors
            .get(key)
            .ok_or_else(|| CharacterizationError::UnknownMethod(key.clone()))
    }

    /// Score = characterization vector · inventory.
    pub fn score(
        &self,
        inventory: &DVector<f64>,
        key: &MethodKey,
    ) -> Result<f64, CharacterizationError> {
        Ok(self.vector(key)?.dot(inventory))
    }
}
