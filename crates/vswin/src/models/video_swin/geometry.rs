//! # Window Geometry
//!
//! Resolution of the requested window/shift configuration against
//! an actual ``[depth, height, width]`` input resolution.

use bimm_contracts::unpack_shape_contract;

/// Resolved window and shift sizes, as ``[depth, height, width]`` triples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    /// The window size.
    pub window_size: [usize; 3],

    /// The cyclic shift size; zero on an axis means no shift.
    pub shift_size: [usize; 3],
}

impl WindowGeometry {
    /// Resolve a nominal geometry against an input resolution.
    ///
    /// See [`resolve_window_geometry`].
    pub fn resolve(
        input_resolution: [usize; 3],
        window_size: [usize; 3],
        shift_size: [usize; 3],
    ) -> Self {
        let (window_size, shift_size) =
            resolve_window_geometry(input_resolution, window_size, shift_size);
        Self {
            window_size,
            shift_size,
        }
    }

    /// Number of tokens in a window.
    pub fn window_tokens(&self) -> usize {
        self.window_size.iter().product()
    }

    /// Is any axis shifted?
    pub fn is_shifted(&self) -> bool {
        self.shift_size.iter().any(|&s| s > 0)
    }

    /// The input resolution padded up to a multiple of the window.
    pub fn padded_resolution(
        &self,
        input_resolution: [usize; 3],
    ) -> [usize; 3] {
        padded_resolution(input_resolution, self.window_size)
    }

    /// The number of windows in a padded input resolution.
    pub fn num_windows(
        &self,
        input_resolution: [usize; 3],
    ) -> usize {
        num_windows(self.padded_resolution(input_resolution), self.window_size)
    }
}

/// The nominal shift for a window: half the window, per axis.
pub fn half_window_shift(window_size: [usize; 3]) -> [usize; 3] {
    window_size.map(|w| w / 2)
}

/// Clamp a window/shift configuration to an input resolution.
///
/// On every axis where the input extent is not larger than the window,
/// the window shrinks to the extent, and the shift is forced to zero.
///
/// # Arguments
///
/// - `input_resolution`: ``[depth, height, width]``
/// - `window_size`: the nominal window.
/// - `shift_size`: the nominal shift.
///
/// # Returns
///
/// ``(window_size, shift_size)``
pub fn resolve_window_geometry(
    input_resolution: [usize; 3],
    window_size: [usize; 3],
    shift_size: [usize; 3],
) -> ([usize; 3], [usize; 3]) {
    let mut window = window_size;
    let mut shift = shift_size;
    for i in 0..3 {
        if input_resolution[i] <= window_size[i] {
            window[i] = input_resolution[i];
            shift[i] = 0;
        }
    }
    (window, shift)
}

/// Round an extent up to a multiple of the window.
///
/// ``padded = ceil(extent / window) * window``
pub fn padded_dim(
    extent: usize,
    window: usize,
) -> usize {
    extent.div_ceil(window) * window
}

/// Round every axis of a resolution up to a multiple of the window.
pub fn padded_resolution(
    input_resolution: [usize; 3],
    window_size: [usize; 3],
) -> [usize; 3] {
    [0, 1, 2].map(|i| padded_dim(input_resolution[i], window_size[i]))
}

/// Count the windows tiling a (padded) resolution.
///
/// # Panics
///
/// If the resolution is not a multiple of the window.
pub fn num_windows(
    padded_resolution: [usize; 3],
    window_size: [usize; 3],
) -> usize {
    let [wd, wh, ww] = window_size;
    let [nd, nh, nw] = unpack_shape_contract!(
        [
            "depth" = "num_d" * "wd",
            "height" = "num_h" * "wh",
            "width" = "num_w" * "ww"
        ],
        &padded_resolution,
        &["num_d", "num_h", "num_w"],
        &[("wd", wd), ("wh", wh), ("ww", ww)]
    );
    nd * nh * nw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_window_shift() {
        assert_eq!(half_window_shift([1, 7, 7]), [0, 3, 3]);
        assert_eq!(half_window_shift([8, 4, 5]), [4, 2, 2]);
    }

    #[test]
    fn test_resolve_window_geometry() {
        // Large input: nothing changes.
        assert_eq!(
            resolve_window_geometry([8, 56, 56], [2, 7, 7], [1, 3, 3]),
            ([2, 7, 7], [1, 3, 3])
        );

        // Smaller-than-window axis: clamp window, zero shift.
        assert_eq!(
            resolve_window_geometry([1, 4, 56], [2, 7, 7], [1, 3, 3]),
            ([1, 4, 7], [0, 0, 3])
        );

        // Equal-to-window axis: no room to shift.
        assert_eq!(
            resolve_window_geometry([2, 7, 14], [2, 7, 7], [1, 3, 3]),
            ([2, 7, 7], [0, 0, 3])
        );
    }

    #[test]
    fn test_window_geometry() {
        let geom = WindowGeometry::resolve([1, 14, 14], [1, 7, 7], [0, 3, 3]);
        assert_eq!(geom.window_size, [1, 7, 7]);
        assert_eq!(geom.shift_size, [0, 3, 3]);
        assert!(geom.is_shifted());
        assert_eq!(geom.window_tokens(), 49);
        assert_eq!(geom.padded_resolution([1, 14, 14]), [1, 14, 14]);
        assert_eq!(geom.num_windows([1, 14, 14]), 4);

        let geom = WindowGeometry::resolve([1, 10, 12], [1, 7, 7], [0, 3, 3]);
        assert_eq!(geom.padded_resolution([1, 10, 12]), [1, 14, 14]);
        assert_eq!(geom.num_windows([1, 10, 12]), 4);

        let geom = WindowGeometry::resolve([1, 7, 7], [1, 7, 7], [0, 3, 3]);
        assert!(!geom.is_shifted());
    }

    #[test]
    fn test_padded_dim() {
        assert_eq!(padded_dim(14, 7), 14);
        assert_eq!(padded_dim(15, 7), 21);
        assert_eq!(padded_dim(1, 1), 1);
        assert_eq!(padded_resolution([3, 10, 12], [2, 7, 7]), [4, 14, 14]);
    }

    #[test]
    fn test_num_windows() {
        assert_eq!(num_windows([1, 14, 14], [1, 7, 7]), 4);
        assert_eq!(num_windows([4, 8, 8], [2, 4, 4]), 8);
    }

    #[test]
    #[should_panic]
    fn test_num_windows_panic() {
        num_windows([1, 15, 14], [1, 7, 7]);
    }
}
