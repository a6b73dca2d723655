//! Special functions needed by the Gamma speckle model

use crate::types::{SarError, SarResult};

/// Trigamma function (polygamma of order 1) for positive real arguments.
///
/// For speckle with `L` looks, `trigamma(L)` is the variance of the log of a
/// unit-mean Gamma variable, which is what the penalty initialisation needs.
///
/// Uses the recurrence `ψ1(x) = ψ1(x + 1) + 1/x²` to push the argument above 6,
/// then the asymptotic expansion in Bernoulli numbers. Accurate to roughly 1e-12.
pub fn trigamma(x: f64) -> SarResult<f64> {
    if !(x.is_finite() && x > 0.0) {
        return Err(SarError::InvalidParameter(format!(
            "trigamma is only defined here for positive finite arguments, got {}",
            x
        )));
    }

    let mut x = x;
    let mut acc = 0.0;
    while x < 6.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }

    let inv = 1.0 / x;
    let inv2 = inv * inv;
    // 1/x + 1/(2x²) + Σ B_2k / x^(2k+1), B2 through B12
    let tail = 1.0 / 6.0
        + inv2 * (-1.0 / 30.0
            + inv2 * (1.0 / 42.0
                + inv2 * (-1.0 / 30.0
                    + inv2 * (5.0 / 66.0 - inv2 * (691.0 / 2730.0)))));
    let series = inv + 0.5 * inv2 + inv * inv2 * tail;

    Ok(acc + series)
}
