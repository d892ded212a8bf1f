//! Complete model families.
pub mod video_swin;
