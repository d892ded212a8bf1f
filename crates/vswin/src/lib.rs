#![warn(missing_docs)]
//!# vswin - Video Swin Transformer building blocks for Burn
//!
//! ## Notable Components
//!
//! * [`compat`] - tensor ops not yet available in ``burn``.
//!   * [`compat::ops`] - trailing zero padding on any dim.
//! * [`error`] - crate [`Error`] and [`Result`].
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::activation`] - activation layer abstraction wrapper.
//!   * [`layers::drop`] - drop path / stochastic depth, and drop path schedules.
//!   * [`layers::mlp`] - transformer block MLP.
//! * [`models`] - complete model families.
//!   * [`models::video_swin`] - Video Swin Transformer stages, blocks, and window attention.
//! * [`preprocessing`] - volume transforms.
//!   * [`preprocessing::scaling`] - intensity range scaling.
//!   * [`preprocessing::interpolation`] - depth axis resampling.
//! * [`utility`] - misc helpers.

pub mod compat;
pub mod error;
pub mod layers;
pub mod models;
pub mod preprocessing;
pub mod utility;

pub use error::{Error, Result};
