//! Multiplier Curve
//!
//! Pure conversions between elapsed round time and the payout multiplier.
//! The forward direction truncates to two decimal places: the engine must
//! never report a multiplier the round has not actually reached, so the
//! displayed and settled value is always the floor of the true curve.

use crate::GROWTH_RATE;

/// Curve misuse and overflow errors.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CurveError {
    /// Input multiplier outside the curve's domain (< 1.00 or non-finite).
    #[error("multiplier {0} outside curve domain")]
    Domain(f64),

    /// The computed payout overflowed to a non-finite value.
    #[error("payout is not finite")]
    InfinitePayout,
}

/// Exponential payout curve `m(t) = floor(100 * e^(k*t)) / 100`.
///
/// `k` is the per-millisecond growth rate. The curve is monotonically
/// non-decreasing for `t >= 0` and clamped to a minimum of 1.00.
/// Elapsed times are unsigned milliseconds, so the negative-time domain
/// error of the mathematical definition is unrepresentable here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Curve {
    growth_rate: f64,
}

impl Default for Curve {
    fn default() -> Self {
        Self::new(GROWTH_RATE)
    }
}

impl Curve {
    /// Create a curve with the given growth rate `k` (per millisecond).
    pub const fn new(growth_rate: f64) -> Self {
        Self { growth_rate }
    }

    /// Construct the curve that reaches `multiplier` exactly at `elapsed_ms`.
    ///
    /// Solves `k = ln(m) / t`. Useful for deterministic scenarios.
    pub fn through(elapsed_ms: u64, multiplier: f64) -> Self {
        Self::new(multiplier.ln() / elapsed_ms as f64)
    }

    /// Growth rate `k` of this curve.
    pub fn growth_rate(&self) -> f64 {
        self.growth_rate
    }

    /// Multiplier certified by the curve at `elapsed_ms`.
    ///
    /// Truncated (not rounded) to two decimals and clamped to >= 1.00.
    pub fn multiplier_at(&self, elapsed_ms: u64) -> Result<f64, CurveError> {
        let payout = (100.0 * (self.growth_rate * elapsed_ms as f64).exp()).floor() / 100.0;
        if !payout.is_finite() {
            return Err(CurveError::InfinitePayout);
        }
        Ok(payout.max(1.0))
    }

    /// Elapsed milliseconds at which the curve first certifies `multiplier`.
    ///
    /// Solves `t = ln(m) / k`, rounded up to a whole millisecond. Used once
    /// per round to convert the drawn crash multiplier into the crash instant.
    pub fn elapsed_at(&self, multiplier: f64) -> Result<u64, CurveError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(CurveError::Domain(multiplier));
        }
        Ok((multiplier.ln() / self.growth_rate).ceil() as u64)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_baseline_is_one() {
        let curve = Curve::default();
        assert_eq!(curve.multiplier_at(0).unwrap(), 1.0);
    }

    #[test]
    fn test_known_values() {
        // e^(6e-5 * 10000) = e^0.6 = 1.8221... -> truncated to 1.82
        let curve = Curve::default();
        assert_eq!(curve.multiplier_at(10_000).unwrap(), 1.82);

        // ln(2) / 6e-5 = 11552.45ms, rounded up
        assert_eq!(curve.elapsed_at(2.0).unwrap(), 11_553);
    }

    #[test]
    fn test_truncates_never_rounds_up() {
        let curve = Curve::default();
        // 1.8221 must report 1.82, never 1.83
        let m = curve.multiplier_at(10_000).unwrap();
        assert!(m < 1.8221188);
    }

    #[test]
    fn test_through_fits_target() {
        let curve = Curve::through(4000, 2.5);
        let m = curve.multiplier_at(4000).unwrap();
        // Within truncation granularity of the fitted target
        assert!((m - 2.5).abs() <= 0.01 + 1e-9, "got {m}");
    }

    #[test]
    fn test_domain_errors() {
        let curve = Curve::default();
        assert_eq!(curve.elapsed_at(0.5), Err(CurveError::Domain(0.5)));
        assert!(matches!(curve.elapsed_at(f64::NAN), Err(CurveError::Domain(_))));
        assert!(matches!(
            curve.elapsed_at(f64::INFINITY),
            Err(CurveError::Domain(_))
        ));
    }

    #[test]
    fn test_overflow_guard() {
        // k * t > 709 overflows f64 exp
        let curve = Curve::default();
        assert_eq!(
            curve.multiplier_at(20_000_000),
            Err(CurveError::InfinitePayout)
        );
    }

    proptest! {
        #[test]
        fn prop_monotonically_non_decreasing(t1 in 0u64..2_000_000, t2 in 0u64..2_000_000) {
            let curve = Curve::default();
            let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            prop_assert!(curve.multiplier_at(lo).unwrap() <= curve.multiplier_at(hi).unwrap());
        }

        #[test]
        fn prop_round_trip_within_granularity(m in 1.0f64..5_000.0) {
            let curve = Curve::default();
            let rt = curve.multiplier_at(curve.elapsed_at(m).unwrap()).unwrap();
            // Truncation loses at most one cent; rounding the elapsed time up
            // to a whole millisecond gains at most one millisecond of growth.
            prop_assert!(rt >= m - 0.011, "rt={rt} m={m}");
            prop_assert!(rt <= m * (1.0 + GROWTH_RATE * 2.0) + 0.011, "rt={rt} m={m}");
        }
    }
}
