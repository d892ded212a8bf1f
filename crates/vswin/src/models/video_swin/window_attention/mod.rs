//! Window attention operations for the Video Swin Transformer.
mod attention;
mod attention_mask;
mod pos_bias;
mod pos_grid;

pub use attention::*;
pub use attention_mask::*;
pub use pos_bias::*;
pub use pos_grid::*;
