//! # Tensor Ops
//!
//! Small tensor operations which ``burn`` only provides for a subset of
//! ranks / dims; ``Tensor::pad`` only covers the last two dims.

use burn::prelude::{Backend, Tensor};
use burn::tensor::Numeric;

/// Zero-pad the trailing edge of a dimension.
///
/// # Arguments
///
/// - `x`: the input tensor.
/// - `dim`: the dimension to extend.
/// - `amount`: the number of zero slices to append.
///
/// # Returns
///
/// A tensor with `dims()[dim] + amount` entries on `dim`.
pub fn zero_pad_trailing<B: Backend, const D: usize, K>(
    x: Tensor<B, D, K>,
    dim: usize,
    amount: usize,
) -> Tensor<B, D, K>
where
    K: Numeric<B>,
{
    if amount == 0 {
        return x;
    }
    let mut shape = x.dims();
    shape[dim] = amount;
    let zeros = Tensor::<B, D, K>::zeros(shape, &x.device());

    Tensor::cat(vec![x, zeros], dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::prelude::TensorData;

    type B = NdArray<f32>;

    #[test]
    fn test_zero_pad_trailing() {
        let device = Default::default();
        let x: Tensor<B, 2> = Tensor::ones([2, 2], &device);

        let padded = zero_pad_trailing(x.clone(), 1, 1);
        padded
            .to_data()
            .assert_eq(&TensorData::from([[1.0f32, 1.0, 0.0], [1.0, 1.0, 0.0]]), false);

        zero_pad_trailing(x.clone(), 0, 0)
            .to_data()
            .assert_eq(&x.to_data(), true);
    }
}
