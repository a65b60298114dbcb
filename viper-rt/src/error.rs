//! Runtime error records.
//!
//! Helpers signal failures two ways: soft errors return an [`RtError`]
//! record so the caller can decide between trapping and continuing (BASIC
//! file I/O works this way), while hard failures return an [`RtTrap`] that
//! the VM bridge converts into a trap at the call site.

use thiserror::Error;

use viper_il::TrapKind;

/// Discriminant of an [`RtError`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RtErrorKind {
    /// No error.
    #[default]
    None = 0,
    /// Unclassified runtime failure.
    RuntimeError,
    /// Math domain error.
    DomainError,
    /// A file that was expected to exist does not.
    FileNotFound,
    /// Operation invalid in the current state, e.g. closing an unopened
    /// channel.
    InvalidOperation,
    /// Numeric overflow.
    Overflow,
    /// Index or range out of bounds.
    Bounds,
}

/// Canonical error record exchanged across the runtime ABI.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RtError {
    /// Error class.
    pub kind: RtErrorKind,
    /// Auxiliary payload, e.g. an OS error number.
    pub code: i32,
}

/// Canonical success sentinel shared across the runtime.
pub const RT_ERROR_NONE: RtError = RtError {
    kind: RtErrorKind::None,
    code: 0,
};

impl RtError {
    /// Build an error record with a zero code.
    pub const fn new(kind: RtErrorKind) -> Self {
        RtError { kind, code: 0 }
    }

    /// True for the success sentinel.
    pub const fn is_ok(&self) -> bool {
        matches!(self.kind, RtErrorKind::None)
    }
}

/// Hard runtime failure carried back to the VM bridge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RtTrap {
    /// Trap class the VM should raise.
    pub kind: TrapKind,
    /// Fixed, test-visible message.
    pub message: String,
}

impl RtTrap {
    /// Build a trap with the given kind and message.
    pub fn new(kind: TrapKind, message: impl Into<String>) -> Self {
        RtTrap {
            kind,
            message: message.into(),
        }
    }
}

/// Result alias used throughout the runtime.
pub type RtResult<T> = Result<T, RtTrap>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_ok() {
        assert!(RT_ERROR_NONE.is_ok());
        assert_eq!(RT_ERROR_NONE, RtError::default());
        assert!(!RtError::new(RtErrorKind::FileNotFound).is_ok());
    }
}
