//! # Block MLP
//!
//! The two-layer feed-forward sublayer of a transformer block:
//! ``fc1 -> act -> drop -> fc2 -> drop``.

use crate::layers::activation::activation_wrapper::{Activation, ActivationConfig};
use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

/// [`BlockMlp`] Meta.
pub trait BlockMlpMeta {
    /// The input feature size.
    fn d_input(&self) -> usize;

    /// The hidden feature size.
    fn d_hidden(&self) -> usize;

    /// The output feature size.
    fn d_output(&self) -> usize;

    /// The dropout rate.
    fn drop(&self) -> f64;
}

/// [`BlockMlp`] Config.
#[derive(Config, Debug)]
pub struct BlockMlpConfig {
    /// The input feature size.
    pub d_input: usize,

    /// The hidden feature size; defaults to `d_input`.
    #[config(default = "None")]
    pub d_hidden: Option<usize>,

    /// The output feature size; defaults to `d_input`.
    #[config(default = "None")]
    pub d_output: Option<usize>,

    /// The dropout rate.
    #[config(default = 0.0)]
    pub drop: f64,

    /// The hidden activation.
    #[config(default = "ActivationConfig::Gelu")]
    pub activation: ActivationConfig,
}

impl BlockMlpMeta for BlockMlpConfig {
    fn d_input(&self) -> usize {
        self.d_input
    }

    fn d_hidden(&self) -> usize {
        self.d_hidden.unwrap_or(self.d_input)
    }

    fn d_output(&self) -> usize {
        self.d_output.unwrap_or(self.d_input)
    }

    fn drop(&self) -> f64 {
        self.drop
    }
}

impl BlockMlpConfig {
    /// Set the hidden size as a ratio of the input size.
    pub fn with_mlp_ratio(
        self,
        mlp_ratio: f64,
    ) -> Self {
        let d_hidden = (self.d_input as f64 * mlp_ratio) as usize;
        self.with_d_hidden(Some(d_hidden))
    }

    /// Initialize a [`BlockMlp`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BlockMlp<B> {
        BlockMlp {
            fc1: LinearConfig::new(self.d_input(), self.d_hidden()).init(device),
            act: self.activation.init(device),
            fc2: LinearConfig::new(self.d_hidden(), self.d_output()).init(device),
            drop: DropoutConfig::new(self.drop).init(),
        }
    }
}

/// Two-layer feed-forward block.
#[derive(Module, Debug)]
pub struct BlockMlp<B: Backend> {
    /// Input projection.
    pub fc1: Linear<B>,

    /// Hidden activation.
    pub act: Activation<B>,

    /// Output projection.
    pub fc2: Linear<B>,

    /// Shared dropout.
    pub drop: Dropout,
}

impl<B: Backend> BlockMlpMeta for BlockMlp<B> {
    fn d_input(&self) -> usize {
        self.fc1.weight.shape().dims[0]
    }

    fn d_hidden(&self) -> usize {
        self.fc1.weight.shape().dims[1]
    }

    fn d_output(&self) -> usize {
        self.fc2.weight.shape().dims[1]
    }

    fn drop(&self) -> f64 {
        self.drop.prob
    }
}

impl<B: Backend> BlockMlp<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `x`: ``[..., d_input]``
    ///
    /// # Returns
    ///
    /// ``[..., d_output]``
    pub fn forward<const D: usize>(
        &self,
        x: Tensor<B, D>,
    ) -> Tensor<B, D> {
        let x = self.fc1.forward(x);
        let x = self.act.forward(x);
        let x = self.drop.forward(x);
        let x = self.fc2.forward(x);
        self.drop.forward(x)
    }
}
