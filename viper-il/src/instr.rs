//! Instruction representation.

use crate::{Opcode, SourceLoc, TempId, Type, Value};

/// A single IL instruction.
///
/// `labels` lists successor block labels for terminators and `br_args` is the
/// parallel array-of-arrays carrying the values passed as block parameters on
/// each outgoing edge; the two are always the same length. `result` is
/// present iff the opcode produces a value.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Instr {
    /// Operation performed.
    pub op: Opcode,
    /// Defined temp, when the opcode produces a value.
    pub result: Option<TempId>,
    /// Result type, or the element type for memory opcodes; `void` otherwise.
    pub ty: Type,
    /// Operand values in opcode-specific order.
    pub operands: Vec<Value>,
    /// Successor labels of a terminator.
    pub labels: Vec<String>,
    /// Branch arguments, one list per successor edge.
    pub br_args: Vec<Vec<Value>>,
    /// Callee symbol of a `call`.
    pub callee: Option<String>,
    /// Source location from the nearest `.loc` directive.
    pub loc: SourceLoc,
    /// 1-based line in the textual IL this instruction was parsed from;
    /// 0 when the instruction was built in memory.
    pub il_line: u32,
}

impl Instr {
    /// True when this instruction ends a block.
    pub fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }

    /// Iterate every operand, including branch arguments.
    pub fn all_operands(&self) -> impl Iterator<Item = &Value> {
        self.operands
            .iter()
            .chain(self.br_args.iter().flatten())
    }
}
