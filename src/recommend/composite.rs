//! Weighted concatenation of feature families.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

use crate::recommend::features::{FeatureFamily, FeatureSet};

/// Default weights in [`FeatureFamily::ALL`] order.
pub const DEFAULT_WEIGHTS: [f32; FeatureFamily::COUNT] = [1.0, 1.0, 0.8, 0.5, 0.2, 0.2, 0.4];

#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("expected {expected} weights, got {got}")]
    WeightCount { expected: usize, got: usize },

    #[error("weight for {family} is not a finite number: {value}")]
    NonFiniteWeight { family: FeatureFamily, value: f32 },

    #[error("Weight lock poisoned: {0}")]
    Poisoned(String),
}

/// One weight per feature family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>")]
pub struct WeightVector(Vec<f32>);

impl TryFrom<Vec<f32>> for WeightVector {
    type Error = CompositeError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        WeightVector::new(values)
    }
}

impl Default for WeightVector {
    fn default() -> Self {
        WeightVector(DEFAULT_WEIGHTS.to_vec())
    }
}

impl WeightVector {
    pub fn new(values: Vec<f32>) -> Result<Self, CompositeError> {
        if values.len() != FeatureFamily::COUNT {
            return Err(CompositeError::WeightCount {
                expected: FeatureFamily::COUNT,
                got: values.len(),
            });
        }
        if let Some((family, value)) = FeatureFamily::ALL
            .iter()
            .zip(&values)
            .find(|(_, v)| !v.is_finite())
        {
            return Err(CompositeError::NonFiniteWeight {
                family: *family,
                value: *value,
            });
        }
        Ok(WeightVector(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn get(&self, family: FeatureFamily) -> f32 {
        self.0[family.position()]
    }

    /// `(family, weight)` pairs in composite order.
    pub fn named(&self) -> impl Iterator<Item = (FeatureFamily, f32)> + '_ {
        FeatureFamily::ALL.iter().copied().zip(self.0.iter().copied())
    }
}

struct Weights {
    current: WeightVector,
    defaults: WeightVector,
}

/// Feature families plus the mutable weights that combine them.
///
/// Features are computed once; composite vectors are derived from them on
/// every call to [`WeightedCompositeIndex::composite_vectors`].
pub struct WeightedCompositeIndex {
    features: FeatureSet,
    weights: RwLock<Weights>,
}

impl WeightedCompositeIndex {
    pub fn new(features: FeatureSet) -> Self {
        Self::with_defaults(features, WeightVector::default())
    }

    pub fn with_defaults(features: FeatureSet, defaults: WeightVector) -> Self {
        Self {
            features,
            weights: RwLock::new(Weights {
                current: defaults.clone(),
                defaults,
            }),
        }
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn weights(&self) -> Result<WeightVector, CompositeError> {
        let guard = self.read_weights()?;
        Ok(guard.current.clone())
    }

    pub fn default_weights(&self) -> Result<WeightVector, CompositeError> {
        let guard = self.read_weights()?;
        Ok(guard.defaults.clone())
    }

    /// Replace the current weights.
    pub fn set_weights(&self, values: Vec<f32>) -> Result<(), CompositeError> {
        let weights = WeightVector::new(values)?;
        let mut guard = self
            .weights
            .write()
            .map_err(|e| CompositeError::Poisoned(e.to_string()))?;
        guard.current = weights;
        Ok(())
    }

    /// Restore the default weights. Features are not rebuilt.
    pub fn reset_weights(&self) -> Result<(), CompositeError> {
        let mut guard = self
            .weights
            .write()
            .map_err(|e| CompositeError::Poisoned(e.to_string()))?;
        guard.current = guard.defaults.clone();
        Ok(())
    }

    /// Weighted composite vector of every episode, in episode table order.
    ///
    /// Recomputed on each call. The weight lock is held for the whole
    /// computation so the result reflects a single weight vector.
    pub fn composite_vectors(&self) -> Result<Vec<Vec<f32>>, CompositeError> {
        let guard = self.read_weights()?;
        let weights = guard.current.as_slice();
        let width = self.features.composite_dimensions();

        let vectors = (0..self.features.episode_count())
            .map(|row| {
                let mut composite = Vec::with_capacity(width);
                for (matrix, weight) in self.features.families().iter().zip(weights) {
                    composite.extend(matrix.rows[row].iter().map(|v| v * weight));
                }
                composite
            })
            .collect();

        Ok(vectors)
    }

    fn read_weights(&self) -> Result<std::sync::RwLockReadGuard<'_, Weights>, CompositeError> {
        self.weights
            .read()
            .map_err(|e| CompositeError::Poisoned(e.to_string()))
    }
}
