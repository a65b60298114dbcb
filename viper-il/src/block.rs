//! Basic blocks and parameters.

use crate::{Instr, TempId, Type};

/// A named, typed input to a function or basic block.
///
/// Block parameters replace PHI nodes: each predecessor edge supplies one
/// value per parameter through the terminator's branch-argument lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Spelled name, used for printing and `--watch` matching.
    pub name: String,
    /// Parameter type.
    pub ty: Type,
    /// Temp slot the parameter defines.
    pub id: TempId,
}

/// A basic block: label, parameter list and instructions.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BasicBlock {
    /// Label, unique within the function.
    pub label: String,
    /// Block parameters (phi-equivalents).
    pub params: Vec<Param>,
    /// Instruction sequence; the last one is the terminator when
    /// `terminated` holds.
    pub instructions: Vec<Instr>,
    /// True iff the last instruction is a terminator.
    pub terminated: bool,
}

impl BasicBlock {
    /// Create an empty block with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        BasicBlock {
            label: label.into(),
            ..Default::default()
        }
    }

    /// The terminator, when present.
    pub fn terminator(&self) -> Option<&Instr> {
        self.instructions.last().filter(|i| i.is_terminator())
    }
}
