//! Numeric/string conversions and the canonical float formatter.

use viper_il::TrapKind;

use crate::error::{RtResult, RtTrap};
use crate::math::round_even;
use crate::string::{string_bytes, string_from_bytes, RtString};

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

fn range_checked(r: f64, what: &str) -> RtResult<i64> {
    if r.is_nan() || r < -TWO_POW_63 || r >= TWO_POW_63 {
        return Err(RtTrap::new(
            TrapKind::InvalidCast,
            format!("{what}: overflow"),
        ));
    }
    Ok(r as i64)
}

/// `CINT`: round half to even, trapping on NaN and out-of-range values.
pub fn cint_from_double(x: f64) -> RtResult<i64> {
    range_checked(round_even(x), "rt_cint_from_double")
}

/// `INT`: floor toward negative infinity, then convert.
pub fn int_floor(x: f64) -> RtResult<i64> {
    range_checked(x.floor(), "rt_int_floor")
}

/// `FIX`: truncate toward zero, then convert.
pub fn fix_trunc(x: f64) -> RtResult<i64> {
    range_checked(x.trunc(), "rt_fix_trunc")
}

/// Canonical float rendering: `0`, `-0`, `0.5`, `1e+20`, `NaN`, `Inf`,
/// `-Inf`.
pub fn float_format(v: f64) -> String {
    viper_il::text::format_float(v)
}

/// `STR$` for integers.
pub fn str_i64(v: i64) -> RtResult<RtString> {
    string_from_bytes(v.to_string().as_bytes())
}

/// `STR$` for floats, in canonical form.
pub fn str_f64(v: f64) -> RtResult<RtString> {
    string_from_bytes(float_format(v).as_bytes())
}

/// `VAL`: parse the longest numeric prefix after leading whitespace;
/// anything unparseable is 0.
pub fn val(s: RtString) -> f64 {
    let bytes = string_bytes(s);
    let text: &[u8] = {
        let from = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        &bytes[from..]
    };

    // Scan the numeric prefix: sign, digits, fraction, exponent.
    let mut end = 0;
    let mut saw_digit = false;
    if matches!(text.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    while text.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
        saw_digit = true;
    }
    if text.get(end) == Some(&b'.') {
        end += 1;
        while text.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
            saw_digit = true;
        }
    }
    if saw_digit && matches!(text.get(end), Some(b'e') | Some(b'E')) {
        let mut exp_end = end + 1;
        if matches!(text.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        if text.get(exp_end).is_some_and(u8::is_ascii_digit) {
            while text.get(exp_end).is_some_and(u8::is_ascii_digit) {
                exp_end += 1;
            }
            end = exp_end;
        }
    }
    if !saw_digit {
        return 0.0;
    }
    std::str::from_utf8(&text[..end])
        .ok()
        .and_then(|t| t.parse().ok())
        .unwrap_or(0.0)
}

// --- C ABI -----------------------------------------------------------------

#[no_mangle]
pub extern "C" fn rt_cint_from_double(x: f64) -> i64 {
    match cint_from_double(x) {
        Ok(v) => v,
        Err(t) => crate::trap_abort(&t),
    }
}

#[no_mangle]
pub extern "C" fn rt_int_floor(x: f64) -> i64 {
    match int_floor(x) {
        Ok(v) => v,
        Err(t) => crate::trap_abort(&t),
    }
}

#[no_mangle]
pub extern "C" fn rt_fix_trunc(x: f64) -> i64 {
    match fix_trunc(x) {
        Ok(v) => v,
        Err(t) => crate::trap_abort(&t),
    }
}

#[no_mangle]
pub extern "C" fn rt_val(s: RtString) -> f64 {
    val(s)
}

#[no_mangle]
pub extern "C" fn rt_str_i64(v: i64) -> RtString {
    match str_i64(v) {
        Ok(s) => s,
        Err(t) => crate::trap_abort(&t),
    }
}

#[no_mangle]
pub extern "C" fn rt_str_f64(v: f64) -> RtString {
    match str_f64(v) {
        Ok(s) => s,
        Err(t) => crate::trap_abort(&t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string::string_unref;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, "0")]
    #[case(-0.0, "-0")]
    #[case(0.5, "0.5")]
    #[case(1e20, "1e+20")]
    #[case(f64::NAN, "NaN")]
    #[case(f64::INFINITY, "Inf")]
    #[case(f64::NEG_INFINITY, "-Inf")]
    fn canonical_float_format(#[case] v: f64, #[case] expected: &str) {
        assert_eq!(float_format(v), expected);
    }

    #[test]
    fn cint_rounds_to_even_and_checks_range() {
        assert_eq!(cint_from_double(2.5).unwrap(), 2);
        assert_eq!(cint_from_double(3.5).unwrap(), 4);
        assert_eq!(cint_from_double(-2.5).unwrap(), -2);
        assert!(cint_from_double(f64::NAN).is_err());
        assert!(cint_from_double(1e19).is_err());
        assert_eq!(
            cint_from_double(f64::NAN).unwrap_err().message,
            "rt_cint_from_double: overflow"
        );
    }

    #[test]
    fn floor_and_trunc_differ_on_negatives() {
        assert_eq!(int_floor(-1.5).unwrap(), -2);
        assert_eq!(fix_trunc(-1.5).unwrap(), -1);
        assert_eq!(int_floor(1.5).unwrap(), 1);
        assert_eq!(fix_trunc(1.5).unwrap(), 1);
    }

    #[rstest]
    #[case("42", 42.0)]
    #[case("  3.5rest", 3.5)]
    #[case("-2e3", -2000.0)]
    #[case("1e", 1.0)]
    #[case(".5", 0.5)]
    #[case("abc", 0.0)]
    #[case("", 0.0)]
    #[case("+7", 7.0)]
    fn val_parses_numeric_prefix(#[case] text: &str, #[case] expected: f64) {
        let h = string_from_bytes(text.as_bytes()).unwrap();
        assert_eq!(val(h), expected);
        string_unref(h);
    }
}
