//! # Video Swin Stage
//!
//! [`VideoSwinStage`] is a stack of [`VideoSwinBlock`]s with alternating
//! unshifted/shifted windows, sharing one precomputed attention mask,
//! followed by an optional [`PatchMerging3d`] downsampler.

use crate::error::{Error, Result};
use crate::layers::activation::activation_wrapper::ActivationConfig;
use crate::layers::drop::rate_config::DropPathRate;
use crate::models::video_swin::geometry::{WindowGeometry, half_window_shift};
use crate::models::video_swin::patch_merge::{
    PatchMerging3d, PatchMerging3dConfig, PatchMerging3dMeta,
};
use crate::models::video_swin::swin_block::{
    VideoSwinBlock, VideoSwinBlockConfig, VideoSwinBlockMeta,
};
use crate::models::video_swin::window_attention::compute_attention_mask;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::LayerNormConfig;
use burn::prelude::{Backend, Tensor};

/// Common introspection interface for [`VideoSwinStage`].
pub trait VideoSwinStageMeta {
    /// Input channel count.
    fn d_input(&self) -> usize;

    /// Number of blocks.
    fn depth(&self) -> usize;

    /// Number of attention heads.
    fn num_heads(&self) -> usize;

    /// Input ``[depth, height, width]``.
    fn input_resolution(&self) -> [usize; 3];

    /// Does the stage end with a downsampler?
    fn downsamples(&self) -> bool;

    /// Output channel count.
    fn d_output(&self) -> usize {
        if self.downsamples() {
            2 * self.d_input()
        } else {
            self.d_input()
        }
    }

    /// Output ``[depth, height, width]``.
    fn output_resolution(&self) -> [usize; 3] {
        let [d, h, w] = self.input_resolution();
        if self.downsamples() {
            [d, h.div_ceil(2), w.div_ceil(2)]
        } else {
            [d, h, w]
        }
    }

    /// Output shape for a batch size.
    ///
    /// ``[batch, depth, height, width, channels]``
    fn output_shape(
        &self,
        batch: usize,
    ) -> [usize; 5] {
        let [d, h, w] = self.output_resolution();
        [batch, d, h, w, self.d_output()]
    }
}

/// Configuration for [`VideoSwinStage`].
#[derive(Config, Debug)]
pub struct VideoSwinStageConfig {
    /// Input channel count.
    pub input_dim: usize,

    /// Number of blocks.
    pub depth: usize,

    /// Number of attention heads.
    pub num_heads: usize,

    /// Input ``[depth, height, width]``.
    pub input_resolution: [usize; 3],

    /// Nominal ``[wd, wh, ww]`` window size.
    #[config(default = "[1, 7, 7]")]
    pub window_size: [usize; 3],

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

    /// Drop path rate; shared, or per block.
    #[config(default = "DropPathRate::Uniform(0.0)")]
    pub drop_path_rate: DropPathRate,

    /// Norm layer config for every block.
    #[config(default = "LayerNormConfig::new(0)")]
    pub norm_layer: LayerNormConfig,

    /// MLP activation.
    #[config(default = "ActivationConfig::Gelu")]
    pub activation: ActivationConfig,

    /// Optional downsampler; its `d_input` must match `input_dim`.
    #[config(default = "None")]
    pub downsample: Option<PatchMerging3dConfig>,
}

impl VideoSwinStageMeta for VideoSwinStageConfig {
    fn d_input(&self) -> usize {
        self.input_dim
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn num_heads(&self) -> usize {
        self.num_heads
    }

    fn input_resolution(&self) -> [usize; 3] {
        self.input_resolution
    }

    fn downsamples(&self) -> bool {
        self.downsample.is_some()
    }
}

impl VideoSwinStageConfig {
    /// Enable a [`PatchMerging3d`] downsampler using the stage's `norm_layer`.
    ///
    /// The norm is captured when called; set `norm_layer` first.
    pub fn with_patch_merging(self) -> Self {
        let downsample =
            PatchMerging3dConfig::new(self.input_dim).with_norm_layer(self.norm_layer.clone());
        self.with_downsample(Some(downsample))
    }

    /// The nominal shift of a block: zero for even blocks, half a window for odd.
    pub fn block_shift_size(
        &self,
        index: usize,
    ) -> [usize; 3] {
        if index % 2 == 0 {
            [0, 0, 0]
        } else {
            half_window_shift(self.window_size)
        }
    }

    /// The config of a block.
    pub fn block_config(
        &self,
        index: usize,
    ) -> VideoSwinBlockConfig {
        VideoSwinBlockConfig::new(self.input_dim, self.num_heads)
            .with_window_size(self.window_size)
            .with_shift_size(self.block_shift_size(index))
            .with_mlp_ratio(self.mlp_ratio)
            .with_qkv_bias(self.qkv_bias)
            .with_qk_scale(self.qk_scale)
            .with_drop_rate(self.drop_rate)
            .with_attn_drop_rate(self.attn_drop_rate)
            .with_drop_path_rate(self.drop_path_rate.resolve(index))
            .with_norm_layer(self.norm_layer.clone())
            .with_activation(self.activation.clone())
    }

    /// The effective geometry of the shifted blocks at `input_resolution`.
    pub fn effective_geometry(&self) -> WindowGeometry {
        WindowGeometry::resolve(
            self.input_resolution,
            self.window_size,
            half_window_shift(self.window_size),
        )
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::InvalidConfig("depth must be non-zero".to_string()));
        }
        if self.input_resolution.contains(&0) || self.window_size.contains(&0) {
            return Err(Error::InvalidConfig(format!(
                "input_resolution {:?} and window_size {:?} must be non-zero",
                self.input_resolution, self.window_size
            )));
        }
        self.drop_path_rate
            .try_validate(self.depth)
            .map_err(Error::InvalidConfig)?;

        for index in 0..self.depth {
            self.block_config(index).try_validate()?;
        }

        if let Some(downsample) = &self.downsample {
            if downsample.d_input() != self.input_dim {
                return Err(Error::InvalidConfig(format!(
                    "downsample d_input ({}) must match input_dim ({})",
                    downsample.d_input(),
                    self.input_dim
                )));
            }
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{err}");
        }
    }

    /// Initialize a [`VideoSwinStage`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    #[must_use]
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> VideoSwinStage<B> {
        self.expect_valid();

        let geometry = self.effective_geometry();
        let padded_resolution = geometry.padded_resolution(self.input_resolution);
        let attn_mask = compute_attention_mask::<B>(
            padded_resolution,
            geometry.window_size,
            geometry.shift_size,
            device,
        );

        tracing::debug!(
            input_resolution = ?self.input_resolution,
            window_size = ?geometry.window_size,
            shift_size = ?geometry.shift_size,
            padded_resolution = ?padded_resolution,
            num_windows = geometry.num_windows(self.input_resolution),
            masked = attn_mask.is_some(),
            "video swin stage geometry"
        );

        VideoSwinStage {
            input_resolution: self.input_resolution,
            window_size: geometry.window_size,
            shift_size: geometry.shift_size,
            padded_resolution,
            attn_mask,
            blocks: (0..self.depth)
                .map(|index| self.block_config(index).init(device))
                .collect(),
            downsample: self
                .downsample
                .as_ref()
                .map(|config| config.init(device)),
        }
    }
}

/// Video Swin Transformer Stage.
#[derive(Module, Debug)]
pub struct VideoSwinStage<B: Backend> {
    /// Input ``[depth, height, width]``.
    pub input_resolution: [usize; 3],

    /// Effective window size at `input_resolution`.
    pub window_size: [usize; 3],

    /// Effective shift of the shifted blocks at `input_resolution`.
    pub shift_size: [usize; 3],

    /// `input_resolution` padded to a window multiple.
    pub padded_resolution: [usize; 3],

    /// Shared ``[num_windows, N, N]`` mask of the shifted blocks.
    pub attn_mask: Option<Tensor<B, 3>>,

    /// The blocks.
    pub blocks: Vec<VideoSwinBlock<B>>,

    /// Optional downsampler.
    pub downsample: Option<PatchMerging3d<B>>,
}

impl<B: Backend> VideoSwinStageMeta for VideoSwinStage<B> {
    fn d_input(&self) -> usize {
        self.blocks[0].d_input()
    }

    fn depth(&self) -> usize {
        self.blocks.len()
    }

    fn num_heads(&self) -> usize {
        self.blocks[0].num_heads()
    }

    fn input_resolution(&self) -> [usize; 3] {
        self.input_resolution
    }

    fn downsamples(&self) -> bool {
        self.downsample.is_some()
    }
}

impl<B: Backend> VideoSwinStage<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `x`: ``[batch, depth, height, width, channels]`` at `input_resolution`.
    ///
    /// # Returns
    ///
    /// ``[batch, depth', height', width', channels']``; see [`VideoSwinStageMeta::output_shape`].
    #[must_use]
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward(
        &self,
        x: Tensor<B, 5>,
    ) -> Tensor<B, 5> {
        let [d, h, w] = self.input_resolution;
        let [batch] = unpack_shape_contract!(
            ["batch", "depth", "height", "width", "channels"],
            &x,
            &["batch"],
            &[
                ("depth", d),
                ("height", h),
                ("width", w),
                ("channels", self.d_input())
            ]
        );

        let mut x = x;
        for block in &self.blocks {
            x = block.forward(x, self.attn_mask.as_ref());
        }

        let x = match &self.downsample {
            Some(downsample) => downsample.forward(x),
            None => x,
        };

        let [od, oh, ow] = self.output_resolution();
        assert_shape_contract_periodically!(
            ["batch", "depth", "height", "width", "channels"],
            &x,
            &[
                ("batch", batch),
                ("depth", od),
                ("height", oh),
                ("width", ow),
                ("channels", self.d_output())
            ]
        );
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_config() {
        let config = VideoSwinStageConfig::new(96, 2, 3, [8, 56, 56]);

        assert_eq!(config.window_size, [1, 7, 7]);
        assert_eq!(config.mlp_ratio, 4.0);
        assert!(!config.qkv_bias);
        assert_eq!(config.qk_scale, None);
        assert_eq!(config.drop_path_rate, DropPathRate::Uniform(0.0));
        assert!(config.downsample.is_none());
        assert!(config.try_validate().is_ok());

        assert_eq!(config.d_output(), 96);
        assert_eq!(config.output_shape(2), [2, 8, 56, 56, 96]);

        let config = config.with_patch_merging();
        assert_eq!(config.d_output(), 192);
        assert_eq!(config.output_resolution(), [8, 28, 28]);
    }

    #[test]
    fn test_patch_merging_norm() {
        let config = VideoSwinStageConfig::new(12, 2, 3, [4, 8, 8])
            .with_norm_layer(LayerNormConfig::new(0).with_epsilon(1e-6))
            .with_patch_merging();

        let downsample = config.downsample.as_ref().unwrap();
        assert_eq!(downsample.d_input, 12);
        assert_eq!(downsample.norm_layer.epsilon, 1e-6);

        let device = Default::default();
        let stage: VideoSwinStage<B> = config.init(&device);
        assert_eq!(stage.downsample.as_ref().unwrap().norm.gamma.dims(), [48]);
    }

    #[test]
    fn test_block_configs() {
        let config = VideoSwinStageConfig::new(12, 4, 3, [4, 8, 8])
            .with_window_size([2, 4, 4])
            .with_drop_path_rate(DropPathRate::linear(0.3, 4));

        assert_eq!(config.block_shift_size(0), [0, 0, 0]);
        assert_eq!(config.block_shift_size(1), [1, 2, 2]);
        assert_eq!(config.block_shift_size(2), [0, 0, 0]);
        assert_eq!(config.block_shift_size(3), [1, 2, 2]);

        let block = config.block_config(3);
        assert_eq!(block.shift_size, [1, 2, 2]);
        assert!((block.drop_path_rate - 0.3).abs() < 1e-12);
        assert_eq!(config.block_config(0).drop_path_rate, 0.0);
    }

    #[test]
    fn test_try_validate() {
        let config = VideoSwinStageConfig::new(12, 2, 3, [4, 8, 8]);
        assert!(config.try_validate().is_ok());

        assert!(config.clone().with_depth(0).try_validate().is_err());
        assert!(config.clone().with_num_heads(5).try_validate().is_err());
        assert!(
            config
                .clone()
                .with_drop_path_rate(vec![0.1].into())
                .try_validate()
                .is_err()
        );
        assert!(
            config
                .clone()
                .with_downsample(Some(PatchMerging3dConfig::new(6)))
                .try_validate()
                .is_err()
        );
    }

    #[test]
    #[should_panic(expected = "depth must be non-zero")]
    fn test_init_panic() {
        let device = Default::default();
        let _ = VideoSwinStageConfig::new(12, 0, 3, [4, 8, 8]).init::<B>(&device);
    }

    #[test]
    fn test_config_json() {
        let config = VideoSwinStageConfig::new(12, 2, 3, [4, 8, 8])
            .with_window_size([2, 4, 4])
            .with_drop_path_rate(DropPathRate::linear(0.2, 2))
            .with_patch_merging();

        let json = serde_json::to_string(&config).unwrap();
        let loaded: VideoSwinStageConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded.input_dim, 12);
        assert_eq!(loaded.input_resolution, [4, 8, 8]);
        assert_eq!(loaded.window_size, [2, 4, 4]);
        assert_eq!(loaded.drop_path_rate, DropPathRate::PerBlock(vec![0.0, 0.2]));
        assert_eq!(loaded.downsample.map(|d| d.d_input), Some(12));
    }

    #[test]
    fn test_init_geometry() {
        let device = Default::default();

        let stage: VideoSwinStage<B> = VideoSwinStageConfig::new(8, 2, 2, [1, 14, 14])
            .init(&device);

        assert_eq!(stage.window_size, [1, 7, 7]);
        assert_eq!(stage.shift_size, [0, 3, 3]);
        assert_eq!(stage.padded_resolution, [1, 14, 14]);
        assert_eq!(
            stage.attn_mask.as_ref().map(|m| m.dims()),
            Some([4, 49, 49])
        );

        assert_eq!(stage.blocks.len(), 2);
        assert!(!stage.blocks[0].swa_enabled());
        assert!(stage.blocks[1].swa_enabled());
    }

    #[test]
    fn test_init_unshifted() {
        let device = Default::default();

        // Every axis fits in one window; no shift survives.
        let stage: VideoSwinStage<B> = VideoSwinStageConfig::new(8, 2, 2, [1, 6, 5])
            .init(&device);

        assert_eq!(stage.window_size, [1, 6, 5]);
        assert_eq!(stage.shift_size, [0, 0, 0]);
        assert!(stage.attn_mask.is_none());
    }

    #[test]
    fn test_forward() {
        let device = Default::default();
        let batch = 2;

        let stage: VideoSwinStage<B> = VideoSwinStageConfig::new(8, 2, 2, [4, 6, 10])
            .with_window_size([2, 4, 4])
            .init(&device);

        assert_eq!(stage.padded_resolution, [4, 8, 12]);
        assert_eq!(stage.shift_size, [1, 2, 2]);

        let x = Tensor::random([batch, 4, 6, 10, 8], Distribution::Uniform(0.0, 1.0), &device);
        let y = stage.forward(x);
        assert_eq!(y.dims(), stage.output_shape(batch));
        assert_eq!(y.dims(), [batch, 4, 6, 10, 8]);
    }

    #[test]
    fn test_forward_downsample() {
        let device = Default::default();
        let batch = 1;

        let stage: VideoSwinStage<B> = VideoSwinStageConfig::new(4, 2, 2, [2, 5, 7])
            .with_window_size([2, 2, 2])
            .with_drop_path_rate(DropPathRate::linear(0.1, 2))
            .with_patch_merging()
            .init(&device);

        let x = Tensor::random([batch, 2, 5, 7, 4], Distribution::Uniform(0.0, 1.0), &device);
        let y = stage.forward(x);

        assert_shape_contract!(
            ["batch", "depth", "height", "width", "channels"],
            &y,
            &[
                ("batch", batch),
                ("depth", 2),
                ("height", 3),
                ("width", 4),
                ("channels", 8)
            ]
        );
    }
}
