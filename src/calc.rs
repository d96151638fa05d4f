//! Division-safe numeric helpers used by the ratio and market-metric engines.
//!
//! Every helper returns `None` instead of dividing by a zero, negative or
//! missing base, so no engine can ever emit `inf` or `NaN`.

use crate::error::CalculationError;

/// Round half away from zero to 2 decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `numerator / denominator`, only when the denominator is strictly positive.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let numerator = numerator?;
    let denominator = denominator.filter(|d| *d > 0.0)?;
    finite(numerator / denominator)
}

/// `ratio` rounded to 2 decimals.
pub fn ratio2(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    finite(round2(ratio(numerator, denominator)?))
}

/// `numerator / denominator * 100`, rounded to 2 decimals.
pub fn percent(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    finite(round2(ratio(numerator, denominator)? * 100.0))
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Keep only strictly positive values.
pub fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

/// Reject NaN and infinities coming out of the warehouse.
pub fn ensure_finite(field: &'static str, value: Option<f64>) -> Result<(), CalculationError> {
    match value {
        Some(v) if !v.is_finite() => Err(CalculationError::NonFinite { field }),
        _ => Ok(()),
    }
}
