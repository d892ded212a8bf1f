//! # Relative Position Bias
//!
//! A learned ``[table_size, num_heads]`` bias table, gathered by the
//! relative offset of each token pair in a window.

use crate::models::video_swin::window_attention::pos_grid::{
    relative_position_index_tensor, relative_position_table_size,
};
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::Initializer;
use burn::prelude::{Backend, Int, Tensor};

/// Common introspection interface for [`RelativePositionBias3d`].
pub trait RelativePositionBias3dMeta {
    /// The number of attention heads.
    fn num_heads(&self) -> usize;

    /// The window size the bias table is laid out for.
    fn window_size(&self) -> [usize; 3];

    /// The number of tokens in a window.
    fn window_tokens(&self) -> usize {
        self.window_size().iter().product()
    }

    /// The number of rows in the bias table.
    fn table_size(&self) -> usize {
        relative_position_table_size(self.window_size())
    }
}

/// Config for [`RelativePositionBias3d`].
#[derive(Config, Debug)]
pub struct RelativePositionBias3dConfig {
    /// The number of attention heads.
    pub num_heads: usize,

    /// The window size.
    pub window_size: [usize; 3],

    /// Standard deviation of the bias table initialization.
    #[config(default = 0.02)]
    pub init_std: f64,
}

impl RelativePositionBias3dMeta for RelativePositionBias3dConfig {
    fn num_heads(&self) -> usize {
        self.num_heads
    }

    fn window_size(&self) -> [usize; 3] {
        self.window_size
    }
}

impl RelativePositionBias3dConfig {
    /// Initialize a [`RelativePositionBias3d`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> RelativePositionBias3d<B> {
        let bias_table = Initializer::Normal {
            mean: 0.0,
            std: self.init_std,
        }
        .init([self.table_size(), self.num_heads], device);

        RelativePositionBias3d {
            window_size: self.window_size,
            bias_table,
            relative_position_index: relative_position_index_tensor(
                self.window_size,
                self.window_size,
                device,
            ),
        }
    }
}

/// Learned relative position bias for 3D windows.
#[derive(Module, Debug)]
pub struct RelativePositionBias3d<B: Backend> {
    /// The window size the table is laid out for.
    pub window_size: [usize; 3],

    /// ``[table_size, num_heads]``
    pub bias_table: Param<Tensor<B, 2>>,

    /// ``[N, N]``; precomputed for `window_size`.
    pub relative_position_index: Tensor<B, 2, Int>,
}

impl<B: Backend> RelativePositionBias3dMeta for RelativePositionBias3d<B> {
    fn num_heads(&self) -> usize {
        self.bias_table.shape().dims[1]
    }

    fn window_size(&self) -> [usize; 3] {
        self.window_size
    }
}

impl<B: Backend> RelativePositionBias3d<B> {
    /// Bias for the full configured window.
    ///
    /// ## Returns
    ///
    /// A ``[num_heads, N, N]`` tensor.
    pub fn forward(&self) -> Tensor<B, 3> {
        self.gather(self.relative_position_index.clone())
    }

    /// Bias for a (possibly smaller) runtime window.
    ///
    /// ## Arguments
    ///
    /// - `window_size`: ``<= self.window_size()`` per axis.
    ///
    /// ## Returns
    ///
    /// A ``[num_heads, n, n]`` tensor, with ``n = wd * wh * ww``.
    pub fn forward_window(
        &self,
        window_size: [usize; 3],
    ) -> Tensor<B, 3> {
        if window_size == self.window_size {
            return self.forward();
        }
        let index = relative_position_index_tensor(
            self.window_size,
            window_size,
            &self.bias_table.device(),
        );
        self.gather(index)
    }

    fn gather(
        &self,
        index: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let [n, _] = index.dims();
        let num_heads = self.num_heads();

        self.bias_table
            .val()
            .select(0, index.reshape([n * n]))
            .reshape([n, n, num_heads])
            .permute([2, 0, 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_config() {
        let config = RelativePositionBias3dConfig::new(3, [2, 4, 4]);
        assert_eq!(config.num_heads(), 3);
        assert_eq!(config.window_size(), [2, 4, 4]);
        assert_eq!(config.window_tokens(), 32);
        assert_eq!(config.table_size(), 3 * 7 * 7);
        assert_eq!(config.init_std, 0.02);
    }

    #[test]
    fn test_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let rpb: RelativePositionBias3d<B> =
            RelativePositionBias3dConfig::new(2, [1, 2, 2]).init(&device);
        assert_eq!(rpb.num_heads(), 2);
        assert_eq!(rpb.table_size(), 9);

        let bias = rpb.forward();
        assert_eq!(bias.dims(), [2, 4, 4]);

        // Every diagonal entry reads the (shared) zero-offset row.
        let table = rpb.bias_table.val().to_data().to_vec::<f32>().unwrap();
        let bias = bias.to_data().to_vec::<f32>().unwrap();
        for head in 0..2 {
            for p in 0..4 {
                assert_eq!(bias[head * 16 + p * 4 + p], table[4 * 2 + head]);
            }
        }
    }

    #[test]
    fn test_forward_window() {
        type B = NdArray<f32>;
        let device = Default::default();

        let rpb: RelativePositionBias3d<B> =
            RelativePositionBias3dConfig::new(2, [2, 2, 2]).init(&device);

        rpb.forward_window([2, 2, 2])
            .to_data()
            .assert_eq(&rpb.forward().to_data(), true);

        // A depth-1 sub-window sees the leading 4x4 block of the full bias.
        let sub = rpb.forward_window([1, 2, 2]);
        assert_eq!(sub.dims(), [2, 4, 4]);
        sub.to_data().assert_eq(
            &rpb.forward()
                .narrow(1, 0, 4)
                .narrow(2, 0, 4)
                .to_data(),
            true,
        );
    }
}
