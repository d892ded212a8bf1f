//! # Probability Utilities

/// Check that a value is a legal probability.
///
/// # Arguments
///
/// - `prob`: the candidate probability.
///
/// # Returns
///
/// `true` if `prob` is in `[0.0, 1.0]`.
#[inline(always)]
pub fn is_probability(prob: f64) -> bool {
    (0.0..=1.0).contains(&prob)
}

/// Expect that a value is a legal probability.
///
/// # Arguments
///
/// - `prob`: the candidate probability.
///
/// # Returns
///
/// `prob`
///
/// # Panics
///
/// If `prob` is not in `[0.0, 1.0]`.
#[inline(always)]
pub fn expect_probability(prob: f64) -> f64 {
    assert!(is_probability(prob), "Expected a probability, got: {prob}");
    prob
}
