//! The VM's uniform value carrier.

use viper_rt::convert::float_format;
use viper_rt::string::{string_bytes, RtString};

/// A tagged 64-bit value carrier. Booleans inhabit `I64` as 0/1; `Ptr`
/// holds an address in the VM's linear memory; `Str` holds a runtime
/// string handle whose reference the owning register balances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    /// Integer family (`i1`, `i16`, `i32`, `i64`).
    I64(i64),
    /// IEEE-754 double.
    F64(f64),
    /// Address in VM linear memory; 0 is the null pointer.
    Ptr(u64),
    /// Runtime string handle.
    Str(RtString),
}

impl Default for Slot {
    fn default() -> Self {
        Slot::I64(0)
    }
}

impl Slot {
    /// The integer payload; 0 for non-integer slots.
    pub fn as_i64(&self) -> i64 {
        match self {
            Slot::I64(v) => *v,
            _ => 0,
        }
    }

    /// The float payload; 0.0 for non-float slots.
    pub fn as_f64(&self) -> f64 {
        match self {
            Slot::F64(v) => *v,
            _ => 0.0,
        }
    }

    /// The pointer payload; 0 for non-pointer slots.
    pub fn as_ptr(&self) -> u64 {
        match self {
            Slot::Ptr(v) => *v,
            _ => 0,
        }
    }

    /// The string handle; null for non-string slots.
    pub fn as_str_handle(&self) -> RtString {
        match self {
            Slot::Str(h) => *h,
            _ => std::ptr::null_mut(),
        }
    }

    /// Deterministic rendering used by `[WATCH]` records.
    pub fn render(&self) -> String {
        match self {
            Slot::I64(v) => v.to_string(),
            Slot::F64(v) => float_format(*v),
            Slot::Ptr(p) => format!("0x{p:x}"),
            Slot::Str(h) => String::from_utf8_lossy(string_bytes(*h)).into_owned(),
        }
    }
}
