//! Weighted categorical sampling over an explicitly passed PRNG.
//!
//! Tables are checked when they are built, so a malformed table can never
//! reach a draw. Every draw takes the generator as `&mut R`; there is no
//! process-wide random state.

use chrono::{Duration, NaiveDate};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::DistributionError;

/// Allowed deviation of the weight total from 1
const WEIGHT_TOLERANCE: f64 = 1e-9;

/// A fixed label -> probability table
#[derive(Debug, Clone)]
pub struct Categorical<T> {
    name: &'static str,
    labels: Vec<T>,
    index: WeightedIndex<f64>,
}

impl<T: Copy> Categorical<T> {
    /// Build a table from `(label, probability)` pairs summing to 1
    pub fn new(name: &'static str, entries: &[(T, f64)]) -> Result<Self, DistributionError> {
        if entries.is_empty() {
            return Err(DistributionError::Empty { table: name });
        }
        if let Some(&(_, weight)) = entries
            .iter()
            .find(|(_, weight)| !weight.is_finite() || *weight < 0.0)
        {
            return Err(DistributionError::InvalidWeight {
                table: name,
                weight,
            });
        }

        let sum: f64 = entries.iter().map(|(_, weight)| weight).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(DistributionError::NotNormalized { table: name, sum });
        }

        let index = WeightedIndex::new(entries.iter().map(|(_, weight)| *weight))
            .map_err(|source| DistributionError::Weights {
                table: name,
                source,
            })?;

        Ok(Self {
            name,
            labels: entries.iter().map(|(label, _)| *label).collect(),
            index,
        })
    }

    /// Draw one label
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        self.labels[self.index.sample(rng)]
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn labels(&self) -> &[T] {
        &self.labels
    }
}

/// Uniformly random day in `[start, end]`; `start` when the range is empty
pub fn random_date<R: Rng + ?Sized>(rng: &mut R, start: NaiveDate, end: NaiveDate) -> NaiveDate {
    let span = (end - start).num_days();
    if span <= 0 {
        return start;
    }
    start + Duration::days(rng.gen_range(0..=span))
}

/// Bernoulli trial with probability `p`
pub fn chance<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    rng.gen::<f64>() < p
}
