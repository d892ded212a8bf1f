//! # Preprocessing
//!
//! Volume transforms applied before a model sees its input.
pub mod interpolation;
pub mod scaling;
