//! # Drop Path / Stochastic Depth
//!
//! Randomly zeroes an entire residual branch per-sample during training,
//! rescaling the survivors by `1 / keep_prob`.
//!
//! See: [Deep Networks with Stochastic Depth](https://arxiv.org/abs/1603.09382)

use crate::utility::probability::expect_probability;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use burn::tensor::Distribution;

/// [`DropPath`] Meta.
pub trait DropPathMeta {
    /// The probability of dropping a sample's branch.
    fn drop_prob(&self) -> f64;

    /// The probability of keeping a sample's branch.
    fn keep_prob(&self) -> f64 {
        1.0 - self.drop_prob()
    }

    /// Should the kept branches be rescaled by `1 / keep_prob`?
    fn scale_by_keep(&self) -> bool;
}

/// [`DropPath`] Config.
#[derive(Config, Debug)]
pub struct DropPathConfig {
    /// The probability of dropping a sample's branch.
    #[config(default = 0.0)]
    pub drop_prob: f64,

    /// Should the kept branches be rescaled by `1 / keep_prob`?
    #[config(default = true)]
    pub scale_by_keep: bool,
}

impl DropPathMeta for DropPathConfig {
    fn drop_prob(&self) -> f64 {
        self.drop_prob
    }

    fn scale_by_keep(&self) -> bool {
        self.scale_by_keep
    }
}

impl DropPathConfig {
    /// Initialize a [`DropPath`].
    ///
    /// # Panics
    ///
    /// If `drop_prob` is not a probability.
    pub fn init(&self) -> DropPath {
        DropPath {
            drop_prob: expect_probability(self.drop_prob),
            scale_by_keep: self.scale_by_keep,
        }
    }
}

/// Drop Path / Stochastic Depth layer.
///
/// Only active on autodiff (training) backends.
#[derive(Module, Clone, Debug)]
pub struct DropPath {
    /// The probability of dropping a sample's branch.
    pub drop_prob: f64,

    /// Should the kept branches be rescaled by `1 / keep_prob`?
    pub scale_by_keep: bool,
}

impl DropPathMeta for DropPath {
    fn drop_prob(&self) -> f64 {
        self.drop_prob
    }

    fn scale_by_keep(&self) -> bool {
        self.scale_by_keep
    }
}

impl DropPath {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `x`: ``[batch, ...]``; the leading dim is the sample dim.
    ///
    /// # Returns
    ///
    /// A tensor of the same shape as `x`.
    pub fn forward<B: Backend, const D: usize>(
        &self,
        x: Tensor<B, D>,
    ) -> Tensor<B, D> {
        if !B::ad_enabled() || self.drop_prob == 0.0 {
            return x;
        }

        let keep_prob = self.keep_prob();

        let mut mask_shape = [1; D];
        mask_shape[0] = x.dims()[0];
        let mask = Tensor::<B, D>::random(
            mask_shape,
            Distribution::Bernoulli(keep_prob),
            &x.device(),
        );

        let mask = if self.scale_by_keep && keep_prob > 0.0 {
            mask.div_scalar(keep_prob)
        } else {
            mask
        };

        x * mask
    }

    /// Apply a residual branch under the drop path.
    ///
    /// ```rust,ignore
    /// x + self.forward(f(x))
    /// ```
    #[inline(always)]
    pub fn with_skip<B: Backend, const D: usize, F>(
        &self,
        x: Tensor<B, D>,
        f: F,
    ) -> Tensor<B, D>
    where
        F: FnOnce(Tensor<B, D>) -> Tensor<B, D>,
    {
        x.clone() + self.forward(f(x))
    }
}
