//! Trap taxonomy shared by the VM and the runtime bridge.

use core::fmt;

/// Reason a running program was halted by the VM.
///
/// The discriminant is the stable `code` reported in trap diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TrapKind {
    /// Checked integer division or remainder by zero.
    DivideByZero = 0,
    /// Overflow in checked integer arithmetic or narrowing.
    Overflow,
    /// Checked float-to-integer conversion of NaN or an out-of-range value.
    InvalidCast,
    /// Structurally invalid operation reached at runtime, e.g. a
    /// branch-argument arity mismatch or a negative `alloca`.
    InvalidOperation,
    /// Math domain error reported by a runtime helper.
    DomainError,
    /// Memory access outside the live region, or an index out of range.
    Bounds,
    /// Allocation failure inside the VM or a runtime helper.
    OutOfMemory,
    /// File-system error surfaced as a hard failure.
    FileError,
    /// Cooperative interruption: `request_interrupt` or the step cap.
    Interrupt,
}

impl TrapKind {
    /// Stable numeric code printed in trap diagnostics.
    pub const fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn codes_are_dense() {
        for (i, kind) in TrapKind::iter().enumerate() {
            assert_eq!(kind.code() as usize, i);
        }
    }

    #[test]
    fn display_matches_debug() {
        assert_eq!(TrapKind::DivideByZero.to_string(), "DivideByZero");
        assert_eq!(TrapKind::InvalidOperation.to_string(), "InvalidOperation");
    }
}
