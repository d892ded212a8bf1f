//! # Activation Layers
pub mod activation_wrapper;
