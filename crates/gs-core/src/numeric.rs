use crate::GsError;

/// Floating point type used throughout the engine.
pub type Real = f64;

/// Slack applied when comparing a current time against a trigger time.
pub const SMALL_TIME: Real = 1e-9;

/// Sentinel for "effectively never" in time comparisons.
pub const BIG_NUM: Real = 1e49;

/// One tolerance for everything
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, GsError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(GsError::NonFinite { what, value: v })
    }
}

/// Sign of a root-function value: -1, 0 or +1. NaN maps to 0.
pub fn sign(v: Real) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearly_equal_basic() {
        let tol = Tolerances {
            abs: 1e-12,
            rel: 1e-9,
        };
        assert!(nearly_equal(1.0, 1.0 + 1e-12, tol));
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
    }

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn sign_of_values() {
        assert_eq!(sign(2.0), 1);
        assert_eq!(sign(-0.1), -1);
        assert_eq!(sign(0.0), 0);
        assert_eq!(sign(Real::NAN), 0);
    }
}
