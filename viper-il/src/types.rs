//! Primitive IL types.

use core::fmt;

/// Primitive type of an IL value.
///
/// The IL has no parametric or aggregate types; every value is one of these
/// ten primitives. The enum is value-semantic and cheap to copy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Type {
    /// Absence of a value; only valid as a return type.
    #[default]
    Void = 0,
    /// Boolean, stored as 0/1.
    I1,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 64-bit IEEE-754 float.
    F64,
    /// Untyped pointer into VM-addressable memory.
    Ptr,
    /// Runtime string handle.
    Str,
    /// Runtime error record.
    Error,
    /// Resume token for error handlers.
    ResumeTok,
}

impl Type {
    /// Lowercase mnemonic used by the textual IL format.
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::I1 => "i1",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F64 => "f64",
            Type::Ptr => "ptr",
            Type::Str => "str",
            Type::Error => "error",
            Type::ResumeTok => "resume_tok",
        }
    }

    /// Parse a type mnemonic; `None` for anything unknown.
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Some(match s {
            "void" => Type::Void,
            "i1" => Type::I1,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "f64" => Type::F64,
            "ptr" => Type::Ptr,
            "str" => Type::Str,
            "error" => Type::Error,
            "resume_tok" => Type::ResumeTok,
            _ => return None,
        })
    }

    /// Size in bytes of one stack slot of this type, as seen by `alloca`,
    /// `load` and `store`. `None` for types that cannot live in memory.
    pub const fn slot_size(&self) -> Option<u64> {
        match self {
            Type::I1 => Some(1),
            Type::I16 => Some(2),
            Type::I32 => Some(4),
            Type::I64 | Type::F64 | Type::Ptr | Type::Str => Some(8),
            _ => None,
        }
    }

    /// True for the integer family (`i1`, `i16`, `i32`, `i64`).
    pub const fn is_integer(&self) -> bool {
        matches!(self, Type::I1 | Type::I16 | Type::I32 | Type::I64)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
