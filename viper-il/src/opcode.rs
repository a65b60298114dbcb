//! Opcode inventory.
//!
//! The `impl_opcodes!` table below is the single source of truth for the
//! opcode set: the enum, the canonical mnemonics, the terminator flag and
//! the result policy are all derived from it.

/// Whether an opcode defines a result temp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Always produces a value.
    Always,
    /// Never produces a value.
    Never,
    /// Produces a value iff the instruction type is not `void` (`call`).
    FromType,
}

macro_rules! impl_opcodes {
    ($($doc:literal $variant:ident $mnemonic:literal $kind:ident)*) => {
        /// Operation performed by an [`Instr`](crate::Instr).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        pub enum Opcode {
            $(
                #[doc = $doc]
                $variant,
            )*
        }

        impl Opcode {
            /// Canonical textual mnemonic.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            /// Parse a canonical mnemonic; `None` for anything unknown.
            pub fn from_mnemonic(s: &str) -> Option<Self> {
                match s {
                    $($mnemonic => Some(Opcode::$variant),)*
                    _ => None,
                }
            }

            /// Result policy of the opcode.
            pub const fn result_kind(&self) -> ResultKind {
                match self {
                    $(Opcode::$variant => impl_opcodes!(@result $kind),)*
                }
            }

            /// True for `br`, `cbr`, `ret` and `trap`.
            pub const fn is_terminator(&self) -> bool {
                match self {
                    $(Opcode::$variant => impl_opcodes!(@term $kind),)*
                }
            }
        }
    };

    (@result value) => { ResultKind::Always };
    (@result effect) => { ResultKind::Never };
    (@result term) => { ResultKind::Never };
    (@result call) => { ResultKind::FromType };
    (@term term) => { true };
    (@term value) => { false };
    (@term effect) => { false };
    (@term call) => { false };
}

impl Default for Opcode {
    fn default() -> Self {
        Opcode::Trap
    }
}

impl_opcodes! {
    "Wrapping 64-bit integer addition."
    Add "add" value
    "Wrapping 64-bit integer subtraction."
    Sub "sub" value
    "Wrapping 64-bit integer multiplication."
    Mul "mul" value
    "Checked integer addition; traps on overflow."
    IAddOvf "iadd.ovf" value
    "Checked integer subtraction; traps on overflow."
    ISubOvf "isub.ovf" value
    "Checked integer multiplication; traps on overflow."
    IMulOvf "imul.ovf" value
    "Signed division; traps on zero divisor and on INT64_MIN / -1."
    SDivChk0 "sdiv.chk0" value
    "Unsigned division; traps on zero divisor."
    UDivChk0 "udiv.chk0" value
    "Signed remainder; traps on zero divisor and on INT64_MIN % -1."
    SRemChk0 "srem.chk0" value
    "Unsigned remainder; traps on zero divisor."
    URemChk0 "urem.chk0" value
    "Bitwise AND."
    And "and" value
    "Bitwise OR."
    Or "or" value
    "Bitwise XOR."
    Xor "xor" value
    "Shift left; amount masked to 0..=63."
    Shl "shl" value
    "Logical shift right; amount masked to 0..=63."
    LShr "lshr" value
    "Arithmetic shift right; amount masked to 0..=63."
    AShr "ashr" value
    "IEEE-754 addition; never traps."
    FAdd "fadd" value
    "IEEE-754 subtraction; never traps."
    FSub "fsub" value
    "IEEE-754 multiplication; never traps."
    FMul "fmul" value
    "IEEE-754 division; never traps."
    FDiv "fdiv" value
    "Integer equality."
    ICmpEq "icmp_eq" value
    "Integer inequality."
    ICmpNe "icmp_ne" value
    "Signed less-than."
    SCmpLt "scmp_lt" value
    "Signed less-or-equal."
    SCmpLe "scmp_le" value
    "Signed greater-than."
    SCmpGt "scmp_gt" value
    "Signed greater-or-equal."
    SCmpGe "scmp_ge" value
    "Unsigned less-than."
    UCmpLt "ucmp_lt" value
    "Unsigned less-or-equal."
    UCmpLe "ucmp_le" value
    "Unsigned greater-than."
    UCmpGt "ucmp_gt" value
    "Unsigned greater-or-equal."
    UCmpGe "ucmp_ge" value
    "Float equality."
    FCmpEq "fcmp_eq" value
    "Float inequality (true for NaN operands)."
    FCmpNe "fcmp_ne" value
    "Float less-than."
    FCmpLt "fcmp_lt" value
    "Float less-or-equal."
    FCmpLe "fcmp_le" value
    "Float greater-than."
    FCmpGt "fcmp_gt" value
    "Float greater-or-equal."
    FCmpGe "fcmp_ge" value
    "Signed integer to float."
    Sitofp "sitofp" value
    "Float to signed integer, unchecked truncation."
    Fptosi "fptosi" value
    "Float to signed integer, round-to-nearest-even; traps on NaN or overflow."
    CastFpToSiRteChk "cast.fp_to_si.rte.chk" value
    "Unsigned narrowing; traps when the value exceeds the target width."
    CastUiNarrowChk "cast.ui_narrow.chk" value
    "Zero-extend an i1 to i64."
    Zext1 "zext1" value
    "Truncate an integer to i1."
    Trunc1 "trunc1" value
    "Reserve stack bytes; traps on negative size, zero is valid."
    Alloca "alloca" value
    "Typed load through a pointer."
    Load "load" value
    "Typed store through a pointer."
    Store "store" effect
    "Pointer plus byte offset."
    Gep "gep" value
    "Address of a module global."
    AddrOf "addr_of" value
    "String handle for a constant string global."
    ConstStr "const_str" value
    "Null pointer constant."
    ConstNull "const_null" value
    "Unconditional branch with block arguments."
    Br "br" term
    "Conditional branch with per-edge block arguments."
    CBr "cbr" term
    "Return from the current function."
    Ret "ret" term
    "Halt the program with a trap."
    Trap "trap" term
    "Call a function or extern."
    Call "call" call
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn mnemonic_round_trip() {
        for op in Opcode::iter() {
            assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(op));
        }
        assert_eq!(Opcode::from_mnemonic("bogus"), None);
    }

    #[test]
    fn terminators() {
        let terms: Vec<_> = Opcode::iter().filter(Opcode::is_terminator).collect();
        assert_eq!(
            terms,
            vec![Opcode::Br, Opcode::CBr, Opcode::Ret, Opcode::Trap]
        );
        for op in terms {
            assert_eq!(op.result_kind(), ResultKind::Never);
        }
    }

    #[test]
    fn result_policy() {
        assert_eq!(Opcode::Add.result_kind(), ResultKind::Always);
        assert_eq!(Opcode::Store.result_kind(), ResultKind::Never);
        assert_eq!(Opcode::Call.result_kind(), ResultKind::FromType);
    }
}
