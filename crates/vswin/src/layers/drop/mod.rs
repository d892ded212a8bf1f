//! # Dropout Layers
pub mod drop_path;
pub mod rate_config;
