//! # Compat
//!
//! Tensor operations not (yet) available in the targeted ``burn`` release.
pub mod ops;
