//! # Window Partitioning and Cyclic Shifts
//!
//! Volumes are ``[batch, depth, height, width, channels]``;
//! windows are ``[batch * num_windows, wd * wh * ww, channels]``.

use bimm_contracts::unpack_shape_contract;
use burn::prelude::{Backend, Tensor};
use burn::tensor::BasicOps;

/// The volume axes which are windowed and shifted, as ``Tensor::roll`` dims.
pub const SPATIAL_DIMS: [i64; 3] = [1, 2, 3];

/// Partition a volume into non-overlapping windows.
///
/// Tokens within a window are ordered row-major over ``(wd, wh, ww)``;
/// windows are ordered row-major over ``(batch, D/wd, H/wh, W/ww)``.
///
/// ## Arguments
///
/// - `x`: Input tensor of shape ``[B, D, H, W, C]``.
/// - `window_size`: ``[wd, wh, ww]``; must evenly divide ``[D, H, W]``.
///
/// ## Returns
///
/// Output tensor of shape ``[B * num_windows, wd * wh * ww, C]``.
pub fn window_partition<B: Backend, K>(
    x: Tensor<B, 5, K>,
    window_size: [usize; 3],
) -> Tensor<B, 3, K>
where
    K: BasicOps<B>,
{
    let [wd, wh, ww] = window_size;
    let [b, nd, nh, nw, c] = unpack_shape_contract!(
        [
            "batch",
            "depth" = "num_d" * "wd",
            "height" = "num_h" * "wh",
            "width" = "num_w" * "ww",
            "channels"
        ],
        &x.dims(),
        &["batch", "num_d", "num_h", "num_w", "channels"],
        &[("wd", wd), ("wh", wh), ("ww", ww)]
    );

    x.reshape([b, nd, wd, nh, wh, nw, ww, c])
        .permute([0, 1, 3, 5, 2, 4, 6, 7])
        .reshape([b * nd * nh * nw, wd * wh * ww, c])
}

/// Merge windows back into a volume; the inverse of [`window_partition`].
///
/// ## Arguments
///
/// - `windows`: Input tensor of shape ``[B * num_windows, wd * wh * ww, C]``.
/// - `window_size`: ``[wd, wh, ww]``.
/// - `shape`: the ``[B, D, H, W]`` shape of the target volume.
///
/// ## Returns
///
/// Output tensor of shape ``[B, D, H, W, C]``.
pub fn window_reverse<B: Backend, K>(
    windows: Tensor<B, 3, K>,
    window_size: [usize; 3],
    shape: [usize; 4],
) -> Tensor<B, 5, K>
where
    K: BasicOps<B>,
{
    let [wd, wh, ww] = window_size;
    let [b, d, h, w] = shape;
    let [nd, nh, nw] = unpack_shape_contract!(
        [
            "depth" = "num_d" * "wd",
            "height" = "num_h" * "wh",
            "width" = "num_w" * "ww"
        ],
        &[d, h, w],
        &["num_d", "num_h", "num_w"],
        &[("wd", wd), ("wh", wh), ("ww", ww)]
    );
    let [c] = unpack_shape_contract!(
        ["b_nw", "tokens", "channels"],
        &windows.dims(),
        &["channels"],
        &[("b_nw", b * nd * nh * nw), ("tokens", wd * wh * ww)]
    );

    windows
        .reshape([b, nd, nh, nw, wd, wh, ww, c])
        .permute([0, 1, 4, 2, 5, 3, 6, 7])
        .reshape([b, d, h, w, c])
}

/// Cyclically shift a volume toward its leading edge.
///
/// Rolls ``[D, H, W]`` by ``(-sd, -sh, -sw)``; a zero shift is the identity.
pub fn cyclic_shift<B: Backend, K>(
    x: Tensor<B, 5, K>,
    shift_size: [usize; 3],
) -> Tensor<B, 5, K>
where
    K: BasicOps<B>,
{
    x.roll(&shift_size.map(|s| -(s as i64)), &SPATIAL_DIMS)
}

/// Reverse a [`cyclic_shift`].
///
/// Rolls ``[D, H, W]`` by ``(+sd, +sh, +sw)``.
pub fn reverse_cyclic_shift<B: Backend, K>(
    x: Tensor<B, 5, K>,
    shift_size: [usize; 3],
) -> Tensor<B, 5, K>
where
    K: BasicOps<B>,
{
    x.roll(&shift_size.map(|s| s as i64), &SPATIAL_DIMS)
}

/// Applies an inner function under a cyclic shift.
///
/// Shifts by `shift_size`, applies `f`, then reverses the shift.
#[inline(always)]
pub fn with_cyclic_shift<B: Backend, K, F>(
    x: Tensor<B, 5, K>,
    shift_size: [usize; 3],
    f: F,
) -> Tensor<B, 5, K>
where
    K: BasicOps<B>,
    F: FnOnce(Tensor<B, 5, K>) -> Tensor<B, 5, K>,
{
    let x = cyclic_shift(x, shift_size);
    let x = f(x);
    reverse_cyclic_shift(x, shift_size)
}
