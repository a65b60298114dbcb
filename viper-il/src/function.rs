//! Function containers.

use std::collections::HashMap;

use crate::{BasicBlock, Param, TempId, Type};

/// A function: signature, blocks and the temp id allocator.
///
/// The entry block is `blocks[0]`. Function parameters define the first temp
/// ids; the VM seeds them from the caller's arguments.
#[derive(Debug, Default, Clone)]
pub struct Function {
    /// Symbol name, without the `@` sigil.
    pub name: String,
    /// Return type.
    pub ret: Type,
    /// Formal parameters.
    pub params: Vec<Param>,
    /// Basic blocks in source order; `blocks[0]` is the entry.
    pub blocks: Vec<BasicBlock>,
    /// Next unassigned temp id.
    pub next_temp: TempId,
    /// Explicit temp spellings. Temps not recorded here print as `%t<id>`.
    pub value_names: HashMap<TempId, String>,
}

impl Function {
    /// Create an empty function with the given signature.
    pub fn new(name: impl Into<String>, ret: Type) -> Self {
        Function {
            name: name.into(),
            ret,
            ..Default::default()
        }
    }

    /// Allocate a fresh temp id.
    pub fn reserve_temp(&mut self) -> TempId {
        let id = self.next_temp;
        self.next_temp += 1;
        id
    }

    /// The entry block, if any block exists.
    pub fn entry(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    /// Find a block index by label.
    pub fn block_index(&self, label: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.label == label)
    }

    /// The printable spelling of a temp: its recorded name or `t<id>`.
    pub fn temp_name(&self, id: TempId) -> String {
        match self.value_names.get(&id) {
            Some(name) => name.clone(),
            None => format!("t{id}"),
        }
    }
}
