//! Portable math helpers. Plain IEEE semantics unless a helper is
//! explicitly checked.

use viper_il::TrapKind;

use crate::error::{RtError, RtErrorKind, RtResult, RtTrap};

/// `SQR(x)`.
pub fn sqrt(x: f64) -> f64 {
    x.sqrt()
}

/// Largest integral value not above `x`.
pub fn floor(x: f64) -> f64 {
    x.floor()
}

/// Smallest integral value not below `x`.
pub fn ceil(x: f64) -> f64 {
    x.ceil()
}

/// `ABS(v)` for integers; `INT64_MIN` has no positive counterpart and
/// traps.
pub fn abs_i64(v: i64) -> RtResult<i64> {
    v.checked_abs()
        .ok_or_else(|| RtTrap::new(TrapKind::Overflow, "rt_abs_i64: overflow"))
}

/// `ABS(v)` for floats.
pub fn abs_f64(v: f64) -> f64 {
    v.abs()
}

/// Round half to even (banker's rounding).
pub fn round_even(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let below = x.floor();
    let diff = x - below;
    if diff > 0.5 {
        below + 1.0
    } else if diff < 0.5 {
        below
    } else if below.rem_euclid(2.0) == 0.0 {
        below
    } else {
        below + 1.0
    }
}

/// Checked power: a negative base with a non-integral exponent is a domain
/// error reported through the `RtError` channel.
pub fn pow_checked(base: f64, exp: f64) -> Result<f64, RtError> {
    if base < 0.0 && exp.fract() != 0.0 {
        return Err(RtError::new(RtErrorKind::DomainError));
    }
    Ok(base.powf(exp))
}

// --- C ABI -----------------------------------------------------------------

#[no_mangle]
pub extern "C" fn rt_sqrt(x: f64) -> f64 {
    sqrt(x)
}

#[no_mangle]
pub extern "C" fn rt_floor(x: f64) -> f64 {
    floor(x)
}

#[no_mangle]
pub extern "C" fn rt_ceil(x: f64) -> f64 {
    ceil(x)
}

#[no_mangle]
pub extern "C" fn rt_abs_i64(v: i64) -> i64 {
    match abs_i64(v) {
        Ok(v) => v,
        Err(t) => crate::trap_abort(&t),
    }
}

#[no_mangle]
pub extern "C" fn rt_abs_f64(v: f64) -> f64 {
    abs_f64(v)
}

#[no_mangle]
pub extern "C" fn rt_round_even(x: f64) -> f64 {
    round_even(x)
}

#[no_mangle]
pub extern "C" fn rt_pow_f64_chkdom(base: f64, exp: f64, ok: *mut bool) -> f64 {
    match pow_checked(base, exp) {
        Ok(v) => {
            if !ok.is_null() {
                unsafe { *ok = true };
            }
            v
        }
        Err(_) => {
            if !ok.is_null() {
                unsafe { *ok = false };
            }
            f64::NAN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn abs_min_traps() {
        let err = abs_i64(i64::MIN).unwrap_err();
        assert_eq!(err.message, "rt_abs_i64: overflow");
        assert_eq!(abs_i64(-42).unwrap(), 42);
    }

    #[rstest]
    #[case(0.5, 0.0)]
    #[case(1.5, 2.0)]
    #[case(2.5, 2.0)]
    #[case(-0.5, -0.0)]
    #[case(-1.5, -2.0)]
    #[case(3.2, 3.0)]
    #[case(3.7, 4.0)]
    fn banker_rounding(#[case] x: f64, #[case] expected: f64) {
        assert_eq!(round_even(x), expected);
    }

    #[test]
    fn pow_domain_error() {
        assert!(pow_checked(-8.0, 0.5).is_err());
        assert_eq!(pow_checked(-8.0, 2.0).unwrap(), 64.0);
        assert_eq!(pow_checked(2.0, 10.0).unwrap(), 1024.0);
    }
}
