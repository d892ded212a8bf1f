//! # Depth Interpolation
//!
//! Resampling of a volume along its leading (depth) axis.
//!
//! Target slices sample the source at ``linspace(0, depth - 1, target_depth)``,
//! computed in `f32`.

use crate::error::{Error, Result};
use burn::prelude::{Backend, Int, Tensor, TensorData};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Depth interpolation methods.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterpolationMethod {
    /// Blend the two nearest slices.
    #[default]
    Linear,

    /// Take the slice at the truncated sample position.
    Nearest,

    /// Cubic convolution over four neighboring slices.
    Cubic,
}

impl InterpolationMethod {
    /// All supported methods.
    pub const ALL: [InterpolationMethod; 3] = [Self::Linear, Self::Nearest, Self::Cubic];

    /// The method name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Nearest => "nearest",
            Self::Cubic => "cubic",
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InterpolationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|m| m.name()).collect();
                Error::invalid_argument(
                    "method",
                    format!("supported interpolation methods are {names:?}, got {s:?}"),
                )
            })
    }
}

/// Resample a volume along axis 0.
///
/// # Arguments
///
/// - `volume`: ``[depth, ...]``.
/// - `target_depth`: the output depth.
/// - `method`: the interpolation method.
///
/// # Returns
///
/// ``[target_depth, ...]``, or an [`Error::InvalidArgument`] if
/// `target_depth` is zero or `volume` is empty on axis 0.
#[tracing::instrument(level = "debug", skip(volume))]
pub fn depth_interpolation<B: Backend, const D: usize>(
    volume: Tensor<B, D>,
    target_depth: usize,
    method: InterpolationMethod,
) -> Result<Tensor<B, D>> {
    let depth = volume.dims()[0];
    if depth == 0 {
        return Err(Error::invalid_argument(
            "volume",
            "cannot interpolate an empty depth axis",
        ));
    }
    if target_depth == 0 {
        return Err(Error::invalid_argument(
            "target_depth",
            "must be non-zero",
        ));
    }

    let positions = sample_positions(depth, target_depth);

    Ok(match method {
        InterpolationMethod::Nearest => {
            let indices = positions
                .iter()
                .map(|&p| (p as usize).min(depth - 1))
                .collect();
            gather_slices(&volume, indices)
        }
        InterpolationMethod::Linear => {
            let (lower, alpha) = split_positions(&positions, depth);
            let upper = lower.iter().map(|&i| (i + 1).min(depth - 1)).collect();

            let w0 = alpha.iter().map(|&a| 1.0 - a).collect();

            weighted_slices(&volume, lower, w0) + weighted_slices(&volume, upper, alpha)
        }
        InterpolationMethod::Cubic => {
            let (lower, alpha) = split_positions(&positions, depth);
            let neighbor = |offset: isize| -> Vec<usize> {
                lower
                    .iter()
                    .map(|&i| (i as isize + offset).clamp(0, depth as isize - 1) as usize)
                    .collect()
            };
            let [w0, w1, w2, w3] = cubic_weights(&alpha);

            weighted_slices(&volume, neighbor(-1), w0)
                + weighted_slices(&volume, neighbor(0), w1)
                + weighted_slices(&volume, neighbor(1), w2)
                + weighted_slices(&volume, neighbor(2), w3)
        }
    })
}

/// Resample a volume along axis 0, selecting the method by name.
///
/// The name is checked before any computation.
///
/// See [`depth_interpolation`].
pub fn depth_interpolation_by_name<B: Backend, const D: usize>(
    volume: Tensor<B, D>,
    target_depth: usize,
    method: &str,
) -> Result<Tensor<B, D>> {
    let method = method.parse::<InterpolationMethod>()?;
    depth_interpolation(volume, target_depth, method)
}

/// ``linspace(0, depth - 1, target_depth)`` in `f32`.
pub fn sample_positions(
    depth: usize,
    target_depth: usize,
) -> Vec<f32> {
    if target_depth == 1 {
        return vec![0.0];
    }
    let last = (depth - 1) as f32;
    let intervals = (target_depth - 1) as f32;
    (0..target_depth)
        .map(|i| (i as f32 * last / intervals).min(last))
        .collect()
}

/// Split positions into ``(floor, fraction)``.
fn split_positions(
    positions: &[f32],
    depth: usize,
) -> (Vec<usize>, Vec<f32>) {
    positions
        .iter()
        .map(|&p| {
            let lower = (p.floor() as usize).min(depth - 1);
            (lower, p - lower as f32)
        })
        .unzip()
}

/// Cubic convolution weights ``[w0, w1, w2, w3]`` for each fraction.
fn cubic_weights(alpha: &[f32]) -> [Vec<f32>; 4] {
    let weight = |f: fn(f32) -> f32| alpha.iter().map(|&a| f(a)).collect::<Vec<_>>();
    [
        weight(|a| -0.5 * a * a * a + a * a - 0.5 * a),
        weight(|a| 1.5 * a * a * a - 2.5 * a * a + 1.0),
        weight(|a| -1.5 * a * a * a + 2.0 * a * a + 0.5 * a),
        weight(|a| 0.5 * a * a * a - 0.5 * a * a),
    ]
}

/// Select slices of axis 0.
fn gather_slices<B: Backend, const D: usize>(
    volume: &Tensor<B, D>,
    indices: Vec<usize>,
) -> Tensor<B, D> {
    let n = indices.len();
    let indices: Vec<i64> = indices.into_iter().map(|i| i as i64).collect();
    let indices =
        Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [n]), &volume.device());

    volume.clone().select(0, indices)
}

/// Select slices of axis 0, each scaled by a weight.
fn weighted_slices<B: Backend, const D: usize>(
    volume: &Tensor<B, D>,
    indices: Vec<usize>,
    weights: Vec<f32>,
) -> Tensor<B, D> {
    let slices = gather_slices(volume, indices);

    let mut shape = [1; D];
    shape[0] = weights.len();
    let weights = Tensor::<B, 1>::from_data(TensorData::new(weights, [shape[0]]), &slices.device())
        .reshape(shape);

    slices * weights
}
