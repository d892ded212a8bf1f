//! # Drop Path Rate Schedules
//!
//! Per-block stochastic depth rates for a stack of blocks.

use crate::utility::probability::is_probability;
use serde::{Deserialize, Serialize};

/// Drop path rate for a sequence of blocks.
///
/// Either one rate shared by every block, or an explicit per-block rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DropPathRate {
    /// The same rate for every block.
    Uniform(f64),

    /// An explicit rate for each block.
    PerBlock(Vec<f64>),
}

impl Default for DropPathRate {
    fn default() -> Self {
        Self::Uniform(0.0)
    }
}

impl DropPathRate {
    /// Build a linearly increasing stochastic depth schedule.
    ///
    /// ## Arguments
    ///
    /// - `max_rate`: the rate of the last block.
    /// - `num_blocks`: the number of blocks.
    ///
    /// ## Returns
    ///
    /// A [`DropPathRate::PerBlock`] rising from `0.0` to `max_rate`.
    pub fn linear(
        max_rate: f64,
        num_blocks: usize,
    ) -> Self {
        let rates = match num_blocks {
            0 => vec![],
            1 => vec![0.0],
            n => (0..n)
                .map(|i| max_rate * (i as f64) / ((n - 1) as f64))
                .collect(),
        };
        Self::PerBlock(rates)
    }

    /// Check the rate against a block count.
    ///
    /// ## Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(
        &self,
        num_blocks: usize,
    ) -> Result<(), String> {
        match self {
            DropPathRate::Uniform(rate) => {
                if !is_probability(*rate) {
                    return Err(format!("drop path rate is not a probability: {rate}"));
                }
            }
            DropPathRate::PerBlock(rates) => {
                if rates.len() != num_blocks {
                    return Err(format!(
                        "expected {num_blocks} per-block drop path rates, got {}: {rates:?}",
                        rates.len()
                    ));
                }
                if let Some(rate) = rates.iter().find(|r| !is_probability(**r)) {
                    return Err(format!("drop path rate is not a probability: {rate}"));
                }
            }
        }
        Ok(())
    }

    /// Resolve the rate of a block.
    ///
    /// ## Arguments
    ///
    /// - `index`: the block index.
    ///
    /// ## Returns
    ///
    /// The drop path rate of the block.
    ///
    /// ## Panics
    ///
    /// If `index` is out of range for a [`DropPathRate::PerBlock`].
    pub fn resolve(
        &self,
        index: usize,
    ) -> f64 {
        match self {
            DropPathRate::Uniform(rate) => *rate,
            DropPathRate::PerBlock(rates) => rates[index],
        }
    }
}

impl From<f64> for DropPathRate {
    fn from(rate: f64) -> Self {
        Self::Uniform(rate)
    }
}

impl From<Vec<f64>> for DropPathRate {
    fn from(rates: Vec<f64>) -> Self {
        Self::PerBlock(rates)
    }
}
