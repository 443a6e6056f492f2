//! Log-domain probability arithmetic.
//!
//! Probabilities are represented as natural logarithms: `0.0` is certainty,
//! `f64::NEG_INFINITY` is impossibility. Multiplication of probabilities
//! becomes addition of logs, and addition of probabilities reduces to
//! [`log_sum_exp`], the single numerical primitive every probability
//! combination in Physalia is built on.

/// Numerically stable computation of `ln(exp(x) + exp(y))`.
///
/// Shifts both inputs by their maximum before exponentiating, so neither
/// overflow nor underflow can occur as long as at least one input is finite.
/// When both inputs are negative infinity (both probabilities zero) the
/// result is negative infinity; `NaN` is never produced.
pub fn log_sum_exp(x: f64, y: f64) -> f64 {
    let max = x.max(y);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + ((x - max).exp() + (y - max).exp()).ln()
}

/// Log-sum-exp over a slice: `ln(Σ exp(x_i))`.
///
/// Returns negative infinity for an empty slice or a slice of all
/// negative-infinity entries.
pub fn log_sum_exp_slice(xs: &[f64]) -> f64 {
    let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = xs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}
