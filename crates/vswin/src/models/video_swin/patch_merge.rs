//! # Patch Merging
//!
//! Downsamples ``[B, D, H, W, C]`` to ``[B, D, ceil(H/2), ceil(W/2), 2C]``
//! by concatenating each 2x2 spatial neighborhood, normalizing, and
//! projecting ``4C -> 2C``.

use crate::compat::ops::zero_pad_trailing;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

/// Common introspection interface for [`PatchMerging3d`].
pub trait PatchMerging3dMeta {
    /// Input channel count.
    fn d_input(&self) -> usize;

    /// Output channel count.
    fn d_output(&self) -> usize {
        2 * self.d_input()
    }

    /// Compute the output shape for an input shape.
    ///
    /// ``[b, d, h, w, c] -> [b, d, ceil(h/2), ceil(w/2), 2c]``
    fn output_shape(
        &self,
        input_shape: [usize; 5],
    ) -> [usize; 5] {
        let [b, d, h, w, _] = input_shape;
        [b, d, h.div_ceil(2), w.div_ceil(2), self.d_output()]
    }
}

/// Configuration for [`PatchMerging3d`].
#[derive(Config, Debug)]
pub struct PatchMerging3dConfig {
    /// Input channel count.
    pub d_input: usize,

    /// Norm layer config; the feature size is matched to ``4 * d_input``.
    #[config(default = "LayerNormConfig::new(0)")]
    pub norm_layer: LayerNormConfig,
}

impl PatchMerging3dMeta for PatchMerging3dConfig {
    fn d_input(&self) -> usize {
        self.d_input
    }
}

impl PatchMerging3dConfig {
    /// Initialize a [`PatchMerging3d`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> PatchMerging3d<B> {
        let d_merged = 4 * self.d_input;
        PatchMerging3d {
            norm: LayerNormConfig {
                d_model: d_merged,
                ..self.norm_layer.clone()
            }
            .init(device),
            reduction: LinearConfig::new(d_merged, self.d_output())
                .with_bias(false)
                .init(device),
        }
    }
}

/// Patch Merging Layer.
#[derive(Module, Debug)]
pub struct PatchMerging3d<B: Backend> {
    /// Norm over the merged ``4C`` channels.
    pub norm: LayerNorm<B>,

    /// Bias-free ``4C -> 2C`` projection.
    pub reduction: Linear<B>,
}

impl<B: Backend> PatchMerging3dMeta for PatchMerging3d<B> {
    fn d_input(&self) -> usize {
        self.reduction.weight.dims()[0] / 4
    }
}

impl<B: Backend> PatchMerging3d<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `x`: ``[batch, depth, height, width, channels]``.
    ///
    /// # Returns
    ///
    /// ``[batch, depth, ceil(height/2), ceil(width/2), 2 * channels]``
    #[must_use]
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward(
        &self,
        x: Tensor<B, 5>,
    ) -> Tensor<B, 5> {
        let expected = {
            let [b, d, h, w] = unpack_shape_contract!(
                ["batch", "depth", "height", "width", "channels"],
                &x,
                &["batch", "depth", "height", "width"],
                &[("channels", self.d_input())]
            );
            self.output_shape([b, d, h, w, self.d_input()])
        };

        let x = merge_patches(x);
        let x = self.norm.forward(x);
        let x = self.reduction.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "depth", "half_height", "half_width", "channels"],
            &x,
            &[
                ("batch", expected[0]),
                ("depth", expected[1]),
                ("half_height", expected[2]),
                ("half_width", expected[3]),
                ("channels", expected[4])
            ]
        );
        x
    }
}

/// Concatenate each 2x2 spatial neighborhood on the channel axis.
///
/// Odd height/width are zero-padded first. Channel blocks are ordered
/// ``(h0, w0), (h1, w0), (h0, w1), (h1, w1)``.
///
/// # Arguments
///
/// - `x`: ``[batch, depth, height, width, channels]``.
///
/// # Returns
///
/// ``[batch, depth, ceil(height/2), ceil(width/2), 4 * channels]``
pub fn merge_patches<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 5> {
    let [b, d, h, w, c] = x.dims();

    let x = zero_pad_trailing(x, 2, h % 2);
    let x = zero_pad_trailing(x, 3, w % 2);

    let [h2, w2] = [h.div_ceil(2), w.div_ceil(2)];

    x.reshape([b, d, h2, 2, w2, 2, c])
        // b, d, h2, h_offset, w2, w_offset, c
        .permute([0, 1, 2, 4, 5, 3, 6])
        // b, d, h2, w2, w_offset, h_offset, c
        .reshape([b, d, h2, w2, 4 * c])
}
