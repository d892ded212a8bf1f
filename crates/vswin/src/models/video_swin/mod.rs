//! # Video Swin Transformer building blocks.
//! See: [Video Swin Transformer](https://arxiv.org/abs/2106.13230)
//!
//! Volumes are ``[batch, depth, height, width, channels]``.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vswin::models::video_swin::stage::{VideoSwinStage, VideoSwinStageConfig};
//! use vswin::layers::drop::rate_config::DropPathRate;
//! use burn::backend::NdArray;
//! use burn::prelude::Tensor;
//!
//! let device = Default::default();
//!
//! let stage: VideoSwinStage<NdArray> = VideoSwinStageConfig::new(96, 2, 3, [8, 56, 56])
//!     .with_window_size([2, 7, 7])
//!     .with_drop_path_rate(DropPathRate::linear(0.1, 2))
//!     .with_patch_merging()
//!     .init(&device);
//!
//! let x = Tensor::zeros([1, 8, 56, 56, 96], &device);
//! let y = stage.forward(x);
//! assert_eq!(y.dims(), [1, 8, 28, 28, 192]);
//! ```

pub mod geometry;
pub mod patch_merge;
pub mod stage;
pub mod swin_block;
pub mod window_attention;
pub mod windowing;
