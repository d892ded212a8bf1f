//! # Video Swin Transformer Block
//!
//! [`VideoSwinBlock`] applies one layer of (shifted) 3D window attention
//! and an MLP, each as a residual branch.
//!
//! [`VideoSwinBlockMeta`] defines a common meta API for [`VideoSwinBlock`]
//! and [`VideoSwinBlockConfig`].

use crate::compat::ops::zero_pad_trailing;
use crate::error::{Error, Result};
use crate::layers::activation::activation_wrapper::ActivationConfig;
use crate::layers::drop::drop_path::{DropPath, DropPathConfig};
use crate::layers::mlp::{BlockMlp, BlockMlpConfig, BlockMlpMeta};
use crate::models::video_swin::geometry::WindowGeometry;
use crate::models::video_swin::window_attention::{
    WindowAttention3d, WindowAttention3dConfig, WindowAttention3dMeta, compute_attention_mask,
};
use crate::models::video_swin::windowing::{window_partition, window_reverse, with_cyclic_shift};
use crate::utility::probability::is_probability;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig};
use burn::prelude::{Backend, Tensor};

/// Common introspection interface for [`VideoSwinBlock`].
pub trait VideoSwinBlockMeta {
    /// Get the input/channel dimension size.
    fn d_input(&self) -> usize;

    /// Get the output dimension size.
    fn d_output(&self) -> usize {
        self.d_input()
    }

    /// Get the number of attention heads.
    fn num_heads(&self) -> usize;

    /// Nominal window size for window attention.
    fn window_size(&self) -> [usize; 3];

    /// Nominal shift size for shifted window attention; zero means no shift.
    fn shift_size(&self) -> [usize; 3];

    /// Is shifted window attention enabled?
    fn swa_enabled(&self) -> bool {
        self.shift_size().iter().any(|&s| s > 0)
    }

    /// Resolve the window geometry for an input resolution.
    fn effective_geometry(
        &self,
        input_resolution: [usize; 3],
    ) -> WindowGeometry {
        WindowGeometry::resolve(input_resolution, self.window_size(), self.shift_size())
    }

    /// Whether to enable QKV bias.
    fn qkv_bias(&self) -> bool;

    /// Dropout rate for MLP and attention projection.
    fn drop_rate(&self) -> f64;

    /// Dropout rate for attention weights.
    fn attn_drop_rate(&self) -> f64;

    /// Ratio of hidden dimension to input dimension in MLP.
    fn mlp_ratio(&self) -> f64;

    /// Drop path rate for stochastic depth.
    fn drop_path_rate(&self) -> f64;
}

/// Configuration for [`VideoSwinBlock`].
#[derive(Config, Debug)]
pub struct VideoSwinBlockConfig {
    /// Input/channel dimension size.
    pub d_input: usize,

    /// Number of attention heads.
    pub num_heads: usize,

    /// Nominal ``[wd, wh, ww]`` window size.
    #[config(default = "[1, 7, 7]")]
    pub window_size: [usize; 3],

    /// Nominal ``[sd, sh, sw]`` shift size.
    #[config(default = "[0, 0, 0]")]
    pub shift_size: [usize; 3],

    /// Ratio of hidden dimension to input dimension in MLP.
    #[config(default = 4.0)]
    pub mlp_ratio: f64,

    /// Enable the QKV bias.
    #[config(default = false)]
    pub qkv_bias: bool,

    /// Override for the attention query scale.
    #[config(default = "None")]
    pub qk_scale: Option<f64>,

    /// Dropout rate for MLP and attention projection.
    #[config(default = 0.0)]
    pub drop_rate: f64,

    /// Dropout rate for attention weights.
    #[config(default = 0.0)]
    pub attn_drop_rate: f64,

    /// Drop path rate for stochastic depth.
    #[config(default = 0.0)]
    pub drop_path_rate: f64,

    /// Norm layer config; the feature size is matched to `d_input`.
    #[config(default = "LayerNormConfig::new(0)")]
    pub norm_layer: LayerNormConfig,

    /// MLP activation.
    #[config(default = "ActivationConfig::Gelu")]
    pub activation: ActivationConfig,
}

impl VideoSwinBlockMeta for VideoSwinBlockConfig {
    fn d_input(&self) -> usize {
        self.d_input
    }

    fn num_heads(&self) -> usize {
        self.num_heads
    }

    fn window_size(&self) -> [usize; 3] {
        self.window_size
    }

    fn shift_size(&self) -> [usize; 3] {
        self.shift_size
    }

    fn qkv_bias(&self) -> bool {
        self.qkv_bias
    }

    fn drop_rate(&self) -> f64 {
        self.drop_rate
    }

    fn attn_drop_rate(&self) -> f64 {
        self.attn_drop_rate
    }

    fn mlp_ratio(&self) -> f64 {
        self.mlp_ratio
    }

    fn drop_path_rate(&self) -> f64 {
        self.drop_path_rate
    }
}

impl VideoSwinBlockConfig {
    /// The attention sublayer config.
    pub fn attention_config(&self) -> WindowAttention3dConfig {
        WindowAttention3dConfig::new(self.d_input, self.window_size, self.num_heads)
            .with_qkv_bias(self.qkv_bias)
            .with_qk_scale(self.qk_scale)
            .with_attn_drop(self.attn_drop_rate)
            .with_proj_drop(self.drop_rate)
    }

    /// The MLP sublayer config.
    pub fn mlp_config(&self) -> BlockMlpConfig {
        BlockMlpConfig::new(self.d_input)
            .with_mlp_ratio(self.mlp_ratio)
            .with_drop(self.drop_rate)
            .with_activation(self.activation.clone())
    }

    /// The norm config, matched to `d_input`.
    pub fn norm_config(&self) -> LayerNormConfig {
        LayerNormConfig {
            d_model: self.d_input,
            ..self.norm_layer.clone()
        }
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<()> {
        self.attention_config().try_validate()?;

        for i in 0..3 {
            if 2 * self.shift_size[i] > self.window_size[i] {
                return Err(Error::InvalidConfig(format!(
                    "shift_size {:?} must be at most half of window_size {:?}",
                    self.shift_size, self.window_size
                )));
            }
        }
        if !is_probability(self.drop_path_rate) || !is_probability(self.drop_rate) {
            return Err(Error::InvalidConfig(format!(
                "drop rates must be probabilities: drop_rate={}, drop_path_rate={}",
                self.drop_rate, self.drop_path_rate
            )));
        }
        let d_hidden = self.mlp_config().d_hidden();
        if self.mlp_ratio <= 0.0 || d_hidden == 0 {
            return Err(Error::InvalidConfig(format!(
                "mlp_ratio ({}) must give a non-zero MLP hidden size for d_input ({}); got {}",
                self.mlp_ratio, self.d_input, d_hidden
            )));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{err}");
        }
    }

    /// Initializes a new [`VideoSwinBlock`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    #[must_use]
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> VideoSwinBlock<B> {
        self.expect_valid();

        VideoSwinBlock {
            window_size: self.window_size,
            shift_size: self.shift_size,
            norm1: self.norm_config().init(device),
            attn: self.attention_config().init(device),
            drop_path: if self.drop_path_rate != 0.0 {
                DropPathConfig::new()
                    .with_drop_prob(self.drop_path_rate)
                    .init()
                    .into()
            } else {
                None
            },
            norm2: self.norm_config().init(device),
            mlp: self.mlp_config().init(device),
        }
    }
}

/// Video Swin Transformer Block.
///
/// Input and output are ``[batch, depth, height, width, channels]``.
#[derive(Module, Debug)]
pub struct VideoSwinBlock<B: Backend> {
    /// Nominal window size.
    pub window_size: [usize; 3],

    /// Nominal shift size.
    pub shift_size: [usize; 3],

    /// Pre-attention norm.
    pub norm1: LayerNorm<B>,

    /// Window attention.
    pub attn: WindowAttention3d<B>,

    /// Optional `DropPath` layer.
    pub drop_path: Option<DropPath>,

    /// Pre-MLP norm.
    pub norm2: LayerNorm<B>,

    /// Feed-forward block.
    pub mlp: BlockMlp<B>,
}

impl<B: Backend> VideoSwinBlockMeta for VideoSwinBlock<B> {
    fn d_input(&self) -> usize {
        self.attn.d_input()
    }

    fn num_heads(&self) -> usize {
        self.attn.num_heads()
    }

    fn window_size(&self) -> [usize; 3] {
        self.window_size
    }

    fn shift_size(&self) -> [usize; 3] {
        self.shift_size
    }

    fn qkv_bias(&self) -> bool {
        self.attn.qkv_bias()
    }

    fn drop_rate(&self) -> f64 {
        self.mlp.drop()
    }

    fn attn_drop_rate(&self) -> f64 {
        self.attn.attn_drop()
    }

    fn mlp_ratio(&self) -> f64 {
        self.mlp.d_hidden() as f64 / self.d_input() as f64
    }

    fn drop_path_rate(&self) -> f64 {
        self.drop_path.as_ref().map_or(0.0, |dp| dp.drop_prob)
    }
}

impl<B: Backend> VideoSwinBlock<B> {
    /// Applies the forward pass on the input tensor.
    ///
    /// # Arguments
    ///
    /// - `x`: ``[batch, depth, height, width, channels]``.
    /// - `mask`: the shared ``[num_windows, N, N]`` shifted-window mask,
    ///   computed against the padded input resolution. It is only used when
    ///   the effective shift is non-zero; when absent for a shifted block,
    ///   the mask is computed for this call.
    ///
    /// # Returns
    ///
    /// ``[batch, depth, height, width, channels]``
    #[must_use]
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward(
        &self,
        x: Tensor<B, 5>,
        mask: Option<&Tensor<B, 3>>,
    ) -> Tensor<B, 5> {
        let [batch, depth, height, width] = unpack_shape_contract!(
            ["batch", "depth", "height", "width", "channels"],
            &x,
            &["batch", "depth", "height", "width"],
            &[("channels", self.d_input())]
        );
        let geometry = self.effective_geometry([depth, height, width]);

        let x = self.with_skip(x, |x| self.attention_branch(x, &geometry, mask));
        let x = self.with_skip(x, |x| self.mlp.forward(self.norm2.forward(x)));

        assert_shape_contract_periodically!(
            ["batch", "depth", "height", "width", "channels"],
            &x,
            &[
                ("batch", batch),
                ("depth", depth),
                ("height", height),
                ("width", width),
                ("channels", self.d_output())
            ]
        );
        x
    }

    /// Applies an inner function under conditional stochastic residual/depth-skip connection.
    #[must_use]
    #[inline(always)]
    fn with_skip<F>(
        &self,
        x: Tensor<B, 5>,
        f: F,
    ) -> Tensor<B, 5>
    where
        F: FnOnce(Tensor<B, 5>) -> Tensor<B, 5>,
    {
        match &self.drop_path {
            Some(drop_path) => drop_path.with_skip(x, f),
            None => x.clone() + f(x),
        }
    }

    /// The attention residual branch.
    ///
    /// ``norm1 -> pad -> shift -> partition -> attn -> merge -> unshift -> unpad``
    fn attention_branch(
        &self,
        x: Tensor<B, 5>,
        geometry: &WindowGeometry,
        mask: Option<&Tensor<B, 3>>,
    ) -> Tensor<B, 5> {
        let [batch, depth, height, width, _] = x.dims();
        let [dp, hp, wp] = geometry.padded_resolution([depth, height, width]);

        let x = self.norm1.forward(x);

        let x = zero_pad_trailing(x, 1, dp - depth);
        let x = zero_pad_trailing(x, 2, hp - height);
        let x = zero_pad_trailing(x, 3, wp - width);
        // batch, dp, hp, wp, c

        let local_mask;
        let mask = if !geometry.is_shifted() {
            None
        } else if mask.is_some() {
            mask
        } else {
            tracing::trace!(?geometry, "computing block-local attention mask");
            local_mask = compute_attention_mask::<B>(
                [dp, hp, wp],
                geometry.window_size,
                geometry.shift_size,
                &x.device(),
            );
            local_mask.as_ref()
        };

        let x = with_cyclic_shift(x, geometry.shift_size, |x| {
            let windows = window_partition(x, geometry.window_size);
            // batch*nW, wd*wh*ww, c

            let windows = self.attn.forward_window(windows, geometry.window_size, mask);

            window_reverse(windows, geometry.window_size, [batch, dp, hp, wp])
        });

        if [dp, hp, wp] == [depth, height, width] {
            x
        } else {
            x.narrow(1, 0, depth)
                .narrow(2, 0, height)
                .narrow(3, 0, width)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::video_swin::geometry::{half_window_shift, padded_resolution};
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_config() {
        let config = VideoSwinBlockConfig::new(96, 3);

        assert_eq!(config.d_input(), 96);
        assert_eq!(config.num_heads(), 3);
        assert_eq!(config.window_size(), [1, 7, 7]);
        assert_eq!(config.shift_size(), [0, 0, 0]);
        assert!(!config.swa_enabled());
        assert_eq!(config.mlp_ratio(), 4.0);
        assert!(!config.qkv_bias());
        assert_eq!(config.drop_path_rate(), 0.0);
        assert_eq!(config.norm_config().d_model, 96);
        assert!(config.try_validate().is_ok());

        let config = config.with_shift_size([0, 3, 3]);
        assert!(config.swa_enabled());
        assert_eq!(
            config.effective_geometry([1, 7, 14]),
            WindowGeometry {
                window_size: [1, 7, 7],
                shift_size: [0, 0, 3]
            }
        );
    }

    #[test]
    fn test_try_validate() {
        assert!(
            VideoSwinBlockConfig::new(96, 5)
                .try_validate()
                .is_err()
        );
        assert!(
            VideoSwinBlockConfig::new(96, 3)
                .with_shift_size([0, 4, 3])
                .try_validate()
                .is_err()
        );
        assert!(
            VideoSwinBlockConfig::new(96, 3)
                .with_drop_path_rate(1.2)
                .try_validate()
                .is_err()
        );
    }

    #[test]
    fn test_try_validate_mlp_hidden_size() {
        // 12 * 0.05 truncates to a zero-width hidden layer.
        let err = VideoSwinBlockConfig::new(12, 3)
            .with_mlp_ratio(0.05)
            .try_validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(err.to_string().contains("non-zero MLP hidden size"), "{err}");

        assert!(
            VideoSwinBlockConfig::new(12, 3)
                .with_mlp_ratio(-1.0)
                .try_validate()
                .is_err()
        );

        let config = VideoSwinBlockConfig::new(12, 3).with_mlp_ratio(0.1);
        assert_eq!(config.mlp_config().d_hidden(), 1);
        assert!(config.try_validate().is_ok());
    }

    #[test]
    #[should_panic(expected = "must be a non-zero multiple of num_heads")]
    fn test_init_panic() {
        let device = Default::default();
        let _ = VideoSwinBlockConfig::new(10, 3).init::<B>(&device);
    }

    #[test]
    fn test_meta() {
        let device = Default::default();
        let block: VideoSwinBlock<B> = VideoSwinBlockConfig::new(12, 3)
            .with_window_size([2, 4, 4])
            .with_shift_size([1, 2, 2])
            .with_mlp_ratio(2.0)
            .with_drop_path_rate(0.1)
            .init(&device);

        assert_eq!(block.d_input(), 12);
        assert_eq!(block.num_heads(), 3);
        assert_eq!(block.window_size(), [2, 4, 4]);
        assert_eq!(block.shift_size(), [1, 2, 2]);
        assert!(block.swa_enabled());
        assert_eq!(block.mlp_ratio(), 2.0);
        assert_eq!(block.drop_path_rate(), 0.1);
    }

    #[test]
    fn test_block_forward() {
        let device = Default::default();
        let batch = 2;
        let d_input = 8;
        let window_size = [2, 4, 4];
        let shift_size = half_window_shift(window_size);
        let input_resolution = [4, 8, 8];

        let block: VideoSwinBlock<B> = VideoSwinBlockConfig::new(d_input, 2)
            .with_window_size(window_size)
            .with_shift_size(shift_size)
            .init(&device);

        let geometry = block.effective_geometry(input_resolution);
        let mask = compute_attention_mask::<B>(
            padded_resolution(input_resolution, geometry.window_size),
            geometry.window_size,
            geometry.shift_size,
            &device,
        );
        assert!(mask.is_some());

        let input = Tensor::<B, 5>::random(
            [batch, 4, 8, 8, d_input],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );

        let output = block.forward(input.clone(), mask.as_ref());
        assert_eq!(output.dims(), input.dims());

        // Without a shared mask, the block builds an identical one.
        let local = block.forward(input, None);
        local.to_data().assert_eq(&output.to_data(), true);
    }

    #[test]
    fn test_block_forward_padded() {
        let device = Default::default();
        let d_input = 6;

        let block: VideoSwinBlock<B> = VideoSwinBlockConfig::new(d_input, 2)
            .with_window_size([2, 4, 4])
            .with_shift_size([1, 2, 2])
            .init(&device);

        // Depth is smaller than the window; height and width need padding.
        let input = Tensor::<B, 5>::random(
            [1, 1, 6, 10, d_input],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let geometry = block.effective_geometry([1, 6, 10]);
        assert_eq!(geometry.window_size, [1, 4, 4]);
        assert_eq!(geometry.shift_size, [0, 2, 2]);

        let output = block.forward(input, None);
        assert_shape_contract!(
            ["batch", "depth", "height", "width", "channels"],
            &output,
            &[
                ("batch", 1),
                ("depth", 1),
                ("height", 6),
                ("width", 10),
                ("channels", d_input)
            ]
        );
    }

    #[test]
    fn test_unshifted_block_ignores_mask() {
        let device = Default::default();
        let d_input = 4;

        let block: VideoSwinBlock<B> = VideoSwinBlockConfig::new(d_input, 2)
            .with_window_size([1, 2, 2])
            .init(&device);

        let input =
            Tensor::<B, 5>::random([1, 1, 4, 4, d_input], Distribution::Uniform(0.0, 1.0), &device);
        let mask: Tensor<B, 3> = Tensor::ones([4, 4, 4], &device).mul_scalar(-100.0);

        block
            .forward(input.clone(), Some(&mask))
            .to_data()
            .assert_eq(&block.forward(input, None).to_data(), true);
    }

    #[test]
    fn test_block_forward_autodiff() {
        type AB = Autodiff<NdArray<f32>>;
        let device = Default::default();
        let d_input = 4;

        let block: VideoSwinBlock<AB> = VideoSwinBlockConfig::new(d_input, 2)
            .with_window_size([1, 2, 2])
            .with_shift_size([0, 1, 1])
            .with_drop_rate(0.1)
            .with_attn_drop_rate(0.1)
            .with_drop_path_rate(0.2)
            .init(&device);

        let input = Tensor::<AB, 5>::random(
            [2, 1, 4, 4, d_input],
            Distribution::Uniform(0.0, 1.0),
            &device,
        )
        .require_grad();

        let output = block.forward(input.clone(), None);
        assert_eq!(output.dims(), [2, 1, 4, 4, d_input]);

        let grads = output.sum().backward();
        assert!(input.grad(&grads).is_some());
    }
}
