//! # Shifted Window Attention Masks
//!
//! After a cyclic shift, a window at the trailing edge of the volume holds
//! tokens from regions which were not adjacent before the shift. The mask
//! blocks attention between tokens of different pre-shift regions.
//!
//! Region segments are laid out in the shifted frame: the wrapped-around
//! content of a shift by ``s`` lands in ``[e-s, e)``, so the labels already
//! describe the shifted volume, and are partitioned without a further roll.

use crate::models::video_swin::geometry::num_windows;
use crate::models::video_swin::windowing::window_partition;
use bimm_contracts::unpack_shape_contract;
use burn::prelude::{Backend, Bool, Int, Tensor, TensorData};
use std::ops::Range;

/// The additive score for blocked token pairs.
///
/// Large enough to drive the softmax weight to ~0.
pub const MASK_FILL_VALUE: f64 = -100.0;

/// Segment an axis by the window/shift breakpoints.
///
/// ``[0, e-w), [e-w, e-s), [e-s, e)``; an unshifted axis is one segment.
fn axis_segments(
    extent: usize,
    window: usize,
    shift: usize,
) -> Vec<Range<usize>> {
    if shift == 0 {
        return vec![0..extent];
    }
    assert!(
        window <= extent && shift <= window,
        "Expected shift ({shift}) <= window ({window}) <= extent ({extent})"
    );
    vec![
        0..(extent - window),
        (extent - window)..(extent - shift),
        (extent - shift)..extent,
    ]
}

/// Label each position of a shifted, padded volume with its pre-shift region id.
///
/// Each ``(depth, height, width)`` segment combination gets a distinct id,
/// assigned in increasing order.
///
/// ## Arguments
///
/// - `padded_resolution`: ``[Dp, Hp, Wp]``.
/// - `window_size`: ``[wd, wh, ww]``.
/// - `shift_size`: ``[sd, sh, sw]``.
///
/// ## Returns
///
/// A row-major ``[Dp * Hp * Wp]`` id vector.
pub fn shifted_window_region_ids(
    padded_resolution: [usize; 3],
    window_size: [usize; 3],
    shift_size: [usize; 3],
) -> Vec<i64> {
    let [dp, hp, wp] = padded_resolution;
    let [d_segs, h_segs, w_segs] =
        [0, 1, 2].map(|i| axis_segments(padded_resolution[i], window_size[i], shift_size[i]));

    let mut ids = vec![0i64; dp * hp * wp];
    let mut cnt = 0;
    for ds in d_segs.iter() {
        for hs in h_segs.iter() {
            for ws in w_segs.iter() {
                for d in ds.clone() {
                    for h in hs.clone() {
                        for w in ws.clone() {
                            ids[(d * hp + h) * wp + w] = cnt;
                        }
                    }
                }
                cnt += 1;
            }
        }
    }
    ids
}

/// Build the region id volume.
///
/// ## Returns
///
/// A ``[1, Dp, Hp, Wp, 1]`` int tensor; see [`shifted_window_region_ids`].
pub fn shifted_window_region_volume<B: Backend>(
    padded_resolution: [usize; 3],
    window_size: [usize; 3],
    shift_size: [usize; 3],
    device: &B::Device,
) -> Tensor<B, 5, Int> {
    let [dp, hp, wp] = padded_resolution;
    let ids = shifted_window_region_ids(padded_resolution, window_size, shift_size);
    Tensor::from_data(TensorData::new(ids, [1, dp, hp, wp, 1]), device)
}

/// Compute the boolean shifted-window mask.
///
/// ## Arguments
///
/// - `padded_resolution`: ``[Dp, Hp, Wp]``; a multiple of `window_size`.
/// - `window_size`: ``[wd, wh, ww]``.
/// - `shift_size`: ``[sd, sh, sw]``.
/// - `device`: the target device.
///
/// ## Returns
///
/// A ``[num_windows, N, N]`` tensor; `true` where attention is blocked.
pub fn shifted_window_mask<B: Backend>(
    padded_resolution: [usize; 3],
    window_size: [usize; 3],
    shift_size: [usize; 3],
    device: &B::Device,
) -> Tensor<B, 3, Bool> {
    let n: usize = window_size.iter().product();
    let nw = num_windows(padded_resolution, window_size);

    let region_volume =
        shifted_window_region_volume::<B>(padded_resolution, window_size, shift_size, device);

    let region_windows = window_partition(region_volume, window_size).reshape([nw, n]);
    // nw, n

    let diff = region_windows.clone().unsqueeze_dim::<3>(1) - region_windows.unsqueeze_dim::<3>(2);
    // nw, n, n

    diff.not_equal_elem(0)
}

/// Compute the additive shifted-window attention mask.
///
/// ## Arguments
///
/// - `padded_resolution`: ``[Dp, Hp, Wp]``; a multiple of `window_size`.
/// - `window_size`: ``[wd, wh, ww]``.
/// - `shift_size`: ``[sd, sh, sw]``.
/// - `device`: the target device.
///
/// ## Returns
///
/// `None` when no axis is shifted; otherwise a ``[num_windows, N, N]`` tensor
/// of `0.0` (attend) and [`MASK_FILL_VALUE`] (blocked).
pub fn compute_attention_mask<B: Backend>(
    padded_resolution: [usize; 3],
    window_size: [usize; 3],
    shift_size: [usize; 3],
    device: &B::Device,
) -> Option<Tensor<B, 3>> {
    if shift_size.iter().all(|&s| s == 0) {
        return None;
    }
    Some(
        shifted_window_mask::<B>(padded_resolution, window_size, shift_size, device)
            .float()
            .mul_scalar(MASK_FILL_VALUE),
    )
}

/// Add a per-window mask to attention scores.
///
/// Windows are batch-major, so score window ``i`` reads mask ``i % num_windows``.
///
/// ## Arguments
///
/// - `attn`: ``[batch * num_windows, num_heads, N, N]`` scores.
/// - `mask`: ``[num_windows, N, N]``.
///
/// ## Returns
///
/// ``[batch * num_windows, num_heads, N, N]`` masked scores.
pub fn apply_attention_mask<B: Backend>(
    attn: Tensor<B, 4>,
    mask: Tensor<B, 3>,
) -> Tensor<B, 4> {
    let [num_windows, n, n_k] = unpack_shape_contract!(
        ["num_windows", "n_q", "n_k"],
        &mask,
        &["num_windows", "n_q", "n_k"],
        &[]
    );
    assert_eq!(n, n_k, "Expected a square mask, got: {:?}", mask.dims());
    let [b, num_heads] = unpack_shape_contract!(
        ["b_nw" = "batch" * "num_windows", "num_heads", "n_q", "n_k"],
        &attn,
        &["batch", "num_heads"],
        &[("num_windows", num_windows), ("n_q", n), ("n_k", n)]
    );

    let attn = attn.reshape([b, num_windows, num_heads, n, n]);
    let mask = mask.unsqueeze_dim::<4>(1).unsqueeze::<5>();
    // 1, num_windows, 1, n, n

    (attn + mask).reshape([b * num_windows, num_heads, n, n])
}
