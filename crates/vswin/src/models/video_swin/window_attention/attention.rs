//! # 3D Window Multi-Head Self-Attention
use crate::error::{Error, Result};
use crate::models::video_swin::window_attention::attention_mask::apply_attention_mask;
use crate::models::video_swin::window_attention::pos_bias::{
    RelativePositionBias3d, RelativePositionBias3dConfig, RelativePositionBias3dMeta,
};
use crate::utility::probability::is_probability;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::softmax;

/// Common introspection interface for [`WindowAttention3d`].
pub trait WindowAttention3dMeta {
    /// Get the input/channel dimension size.
    fn d_input(&self) -> usize;

    /// Get the configured window size.
    fn window_size(&self) -> [usize; 3];

    /// Get the number of attention heads.
    fn num_heads(&self) -> usize;

    /// Get the per-head channel size.
    fn head_dim(&self) -> usize {
        self.d_input() / self.num_heads()
    }

    /// Get the query scale factor.
    fn scale(&self) -> f64;

    /// Get the drop rate for attention.
    fn attn_drop(&self) -> f64;

    /// Get the drop rate for projection.
    fn proj_drop(&self) -> f64;

    /// Is the QKV bias enabled?
    fn qkv_bias(&self) -> bool;
}

/// Configuration for the [`WindowAttention3d`] module.
#[derive(Config, Debug)]
pub struct WindowAttention3dConfig {
    /// Input/channel dimension size.
    pub d_input: usize,

    /// ``[wd, wh, ww]`` window size.
    pub window_size: [usize; 3],

    /// Number of attention heads; must divide `d_input`.
    pub num_heads: usize,

    /// Enable the QKV bias.
    #[config(default = false)]
    pub qkv_bias: bool,

    /// Override for the ``head_dim^-0.5`` query scale.
    #[config(default = "None")]
    pub qk_scale: Option<f64>,

    /// Attention weight drop rate.
    #[config(default = 0.)]
    pub attn_drop: f64,

    /// Output projection drop rate.
    #[config(default = 0.)]
    pub proj_drop: f64,
}

impl WindowAttention3dMeta for WindowAttention3dConfig {
    fn d_input(&self) -> usize {
        self.d_input
    }

    fn window_size(&self) -> [usize; 3] {
        self.window_size
    }

    fn num_heads(&self) -> usize {
        self.num_heads
    }

    fn scale(&self) -> f64 {
        self.qk_scale
            .unwrap_or_else(|| (self.head_dim() as f64).powf(-0.5))
    }

    fn attn_drop(&self) -> f64 {
        self.attn_drop
    }

    fn proj_drop(&self) -> f64 {
        self.proj_drop
    }

    fn qkv_bias(&self) -> bool {
        self.qkv_bias
    }
}

impl WindowAttention3dConfig {
    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<()> {
        if self.num_heads == 0 || self.d_input % self.num_heads != 0 {
            return Err(Error::InvalidConfig(format!(
                "d_input ({}) must be a non-zero multiple of num_heads ({})",
                self.d_input, self.num_heads
            )));
        }
        if self.window_size.contains(&0) {
            return Err(Error::InvalidConfig(format!(
                "window_size must be non-zero: {:?}",
                self.window_size
            )));
        }
        for (name, prob) in [("attn_drop", self.attn_drop), ("proj_drop", self.proj_drop)] {
            if !is_probability(prob) {
                return Err(Error::InvalidConfig(format!(
                    "{name} is not a probability: {prob}"
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

    /// Initialize a [`WindowAttention3d`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> WindowAttention3d<B> {
        self.expect_valid();

        let d_input = self.d_input();

        WindowAttention3d {
            num_heads: self.num_heads(),
            scale: self.scale(),
            qkv: LinearConfig::new(d_input, 3 * d_input)
                .with_bias(self.qkv_bias)
                .init(device),
            rpb: RelativePositionBias3dConfig::new(self.num_heads(), self.window_size())
                .init(device),
            attn_drop: DropoutConfig::new(self.attn_drop).init(),
            proj: LinearConfig::new(d_input, d_input).init(device),
            proj_drop: DropoutConfig::new(self.proj_drop).init(),
        }
    }
}

/// Window based multi-head self-attention with relative position bias.
///
/// Supports both shifted and non-shifted windows; shifted windows
/// are handled by an additive attention mask.
#[derive(Module, Debug)]
pub struct WindowAttention3d<B: Backend> {
    /// Number of attention heads.
    pub num_heads: usize,

    /// Query scale factor.
    pub scale: f64,

    /// Fused query/key/value projection.
    pub qkv: Linear<B>,

    /// Relative position bias.
    pub rpb: RelativePositionBias3d<B>,

    /// Attention weight dropout.
    pub attn_drop: Dropout,

    /// Output projection.
    pub proj: Linear<B>,

    /// Output projection dropout.
    pub proj_drop: Dropout,
}

impl<B: Backend> WindowAttention3dMeta for WindowAttention3d<B> {
    fn d_input(&self) -> usize {
        self.proj.weight.shape().dims[0]
    }

    fn window_size(&self) -> [usize; 3] {
        self.rpb.window_size()
    }

    fn num_heads(&self) -> usize {
        self.num_heads
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn attn_drop(&self) -> f64 {
        self.attn_drop.prob
    }

    fn proj_drop(&self) -> f64 {
        self.proj_drop.prob
    }

    fn qkv_bias(&self) -> bool {
        self.qkv.bias.is_some()
    }
}

impl<B: Backend> WindowAttention3d<B> {
    /// Forward pass over windows of the configured size.
    ///
    /// ## Arguments
    ///
    /// - `x`: Input tensor of shape ``[B*num_windows, N=wd*wh*ww, C]``.
    /// - `mask`: Optional mask tensor of shape ``[num_windows, N, N]``.
    ///
    /// ## Returns
    ///
    /// - Output tensor of shape ``[B*num_windows, N, C]``.
    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        mask: Option<&Tensor<B, 3>>,
    ) -> Tensor<B, 3> {
        self.forward_window(x, self.window_size(), mask)
    }

    /// Forward pass over windows of a runtime window size.
    ///
    /// The runtime window may be smaller than the configured window
    /// on any axis; the relative position bias is looked up accordingly.
    ///
    /// ## Arguments
    ///
    /// - `x`: Input tensor of shape ``[B*num_windows, N=wd*wh*ww, C]``.
    /// - `window_size`: the runtime ``[wd, wh, ww]``.
    /// - `mask`: Optional mask tensor of shape ``[num_windows, N, N]``.
    ///
    /// ## Returns
    ///
    /// - Output tensor of shape ``[B*num_windows, N, C]``.
    #[tracing::instrument(level = "trace", skip(self, x, mask))]
    pub fn forward_window(
        &self,
        x: Tensor<B, 3>,
        window_size: [usize; 3],
        mask: Option<&Tensor<B, 3>>,
    ) -> Tensor<B, 3> {
        let n: usize = window_size.iter().product();
        let c = self.d_input();
        let [b_nw] = unpack_shape_contract!(
            ["b_nw", "n", "c"],
            &x,
            &["b_nw"],
            &[("n", n), ("c", c)]
        );

        let (q, k, v) = self.split_qkv(x);
        // (b_nw, num_heads, n, head_dim)

        let attn = self.attention(q, k, window_size, mask);
        // (b_nw, num_heads, n, n)

        let x = attn.matmul(v).swap_dims(1, 2).reshape([b_nw, n, c]);
        // (b_nw, n, c)

        let x = self.proj.forward(x);
        self.proj_drop.forward(x)
    }

    /// Project the input to per-head queries, keys, and values.
    ///
    /// ## Returns
    ///
    /// ``(q, k, v)``, each ``[b_nw, num_heads, n, head_dim]``.
    fn split_qkv(
        &self,
        x: Tensor<B, 3>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        let [b_nw, n, _] = x.dims();
        let num_heads = self.num_heads;
        let head_dim = self.head_dim();

        let qkv = self
            .qkv
            .forward(x)
            .reshape([b_nw, n, 3, num_heads, head_dim])
            .permute([2, 0, 3, 1, 4]);
        // (3, b_nw, num_heads, n, head_dim)

        let [q, k, v] = [0, 1, 2].map(|i| {
            qkv.clone()
                .narrow(0, i, 1)
                .reshape([b_nw, num_heads, n, head_dim])
        });
        (q, k, v)
    }

    /// Compute the attention weights.
    ///
    /// ``softmax(scale * q @ k^T + bias + mask)``, followed by attention dropout.
    ///
    /// ## Returns
    ///
    /// ``[b_nw, num_heads, n, n]``
    fn attention(
        &self,
        q: Tensor<B, 4>,
        k: Tensor<B, 4>,
        window_size: [usize; 3],
        mask: Option<&Tensor<B, 3>>,
    ) -> Tensor<B, 4> {
        let attn = q.mul_scalar(self.scale).matmul(k.swap_dims(2, 3));
        // (b_nw, num_heads, n, n)

        let attn = attn + self.rpb.forward_window(window_size).unsqueeze::<4>();

        let attn = match mask {
            None => attn,
            Some(mask) => apply_attention_mask(attn, mask.clone()),
        };

        let attn = softmax(attn, 3);
        self.attn_drop.forward(attn)
    }
}
