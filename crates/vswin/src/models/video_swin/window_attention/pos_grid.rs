//! # Window Position Grids
//!
//! Token coordinates within a 3D window, and the relative-offset index
//! used to look up the relative position bias table.

use burn::prelude::{Backend, Int, Tensor, TensorData};

/// The number of entries in a relative position bias table.
///
/// ``(2*wd - 1) * (2*wh - 1) * (2*ww - 1)``
pub fn relative_position_table_size(window_size: [usize; 3]) -> usize {
    window_size.iter().map(|&w| 2 * w - 1).product()
}

/// The ``[d, h, w]`` coordinates of every token in a window, in row-major order.
pub fn window_coordinates(window_size: [usize; 3]) -> Vec<[usize; 3]> {
    let [wd, wh, ww] = window_size;
    let mut coords = Vec::with_capacity(wd * wh * ww);
    for d in 0..wd {
        for h in 0..wh {
            for w in 0..ww {
                coords.push([d, h, w]);
            }
        }
    }
    coords
}

/// Compute the relative position index for every token pair of a window.
///
/// Entry ``[p, q]`` is the bias table row for the offset ``coord[p] - coord[q]``.
/// The table layout is that of `table_window`; `window_size` may be smaller
/// on any axis, in which case only a subset of the table rows is used.
///
/// ## Arguments
///
/// - `table_window`: the window size the table was built for.
/// - `window_size`: the window size of the tokens; ``<= table_window`` per axis.
///
/// ## Returns
///
/// A row-major ``[N * N]`` index, with ``N = wd * wh * ww``.
///
/// ## Panics
///
/// If `window_size` exceeds `table_window` on any axis.
pub fn relative_position_index(
    table_window: [usize; 3],
    window_size: [usize; 3],
) -> Vec<i64> {
    for i in 0..3 {
        assert!(
            window_size[i] <= table_window[i],
            "window_size {window_size:?} exceeds table window {table_window:?}"
        );
    }
    let [td, th, tw] = table_window.map(|t| t as i64);
    let stride_d = (2 * th - 1) * (2 * tw - 1);
    let stride_h = 2 * tw - 1;

    let coords = window_coordinates(window_size);
    let mut index = Vec::with_capacity(coords.len() * coords.len());
    for p in coords.iter() {
        for q in coords.iter() {
            let [dd, dh, dw] = [0, 1, 2].map(|i| p[i] as i64 - q[i] as i64);
            index.push((dd + td - 1) * stride_d + (dh + th - 1) * stride_h + (dw + tw - 1));
        }
    }
    index
}

/// Build the relative position index as a ``[N, N]`` tensor.
///
/// See [`relative_position_index`].
pub fn relative_position_index_tensor<B: Backend>(
    table_window: [usize; 3],
    window_size: [usize; 3],
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let n: usize = window_size.iter().product();
    let index = relative_position_index(table_window, window_size);
    Tensor::from_data(TensorData::new(index, [n, n]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_table_size() {
        assert_eq!(relative_position_table_size([1, 7, 7]), 169);
        assert_eq!(relative_position_table_size([2, 7, 7]), 3 * 13 * 13);
        assert_eq!(relative_position_table_size([8, 7, 7]), 15 * 13 * 13);
    }

    #[test]
    fn test_window_coordinates() {
        assert_eq!(
            window_coordinates([2, 1, 2]),
            vec![[0, 0, 0], [0, 0, 1], [1, 0, 0], [1, 0, 1]]
        );
    }

    #[test]
    fn test_relative_position_index() {
        let window_size = [2, 2, 2];
        let n = 8;
        let index = relative_position_index(window_size, window_size);
        assert_eq!(index.len(), n * n);

        let table_size = relative_position_table_size(window_size) as i64;
        assert!(index.iter().all(|&i| 0 <= i && i < table_size));

        // The zero offset is the table center.
        let center = (table_size - 1) / 2;
        for p in 0..n {
            assert_eq!(index[p * n + p], center);
        }

        // Opposite offsets mirror around the center.
        for p in 0..n {
            for q in 0..n {
                assert_eq!(index[p * n + q] + index[q * n + p], 2 * center);
            }
        }

        // Equal offsets share a row.
        // (0,0,0)-(0,0,1) == (1,1,0)-(1,1,1)
        assert_eq!(index[1], index[6 * n + 7]);
    }

    #[test]
    fn test_sub_window_index() {
        let table_window = [2, 3, 3];
        let full = relative_position_index(table_window, table_window);
        let sub = relative_position_index(table_window, [1, 3, 3]);

        // A depth-1 sub-window is the first 9 tokens of the full window.
        let n_full = 18;
        for p in 0..9 {
            for q in 0..9 {
                assert_eq!(sub[p * 9 + q], full[p * n_full + q]);
            }
        }
    }

    #[test]
    #[should_panic(expected = "exceeds table window")]
    fn test_sub_window_panic() {
        relative_position_index([1, 3, 3], [2, 3, 3]);
    }

    #[test]
    fn test_index_tensor() {
        let device = Default::default();
        let index = relative_position_index_tensor::<NdArray>([1, 2, 2], [1, 2, 2], &device);
        assert_eq!(index.dims(), [4, 4]);
    }
}
