//! Programmatic IR construction.
//!
//! The builder is how front ends and tests assemble modules without going
//! through the text format. Misuse is reported as [`BuildError`] rather
//! than panicking.

use thiserror::Error;

use crate::{
    BasicBlock, ExternDecl, Global, Instr, Module, Opcode, Param, SourceLoc, TempId, Type, Value,
};

/// In-process API misuse detected while building IR.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// An emit helper was called with no insert point set.
    #[error("no insert point set")]
    NoInsertPoint,
    /// The current block already has a terminator.
    #[error("block '{0}' is already terminated")]
    BlockTerminated(String),
    /// A block label was reused within one function.
    #[error("duplicate block label '{0}'")]
    DuplicateLabel(String),
    /// `emit_call` referenced a symbol that is neither a function nor a
    /// registered extern.
    #[error("unknown callee '@{0}'")]
    UnknownCallee(String),
}

/// Cursor-style builder over a caller-owned [`Module`].
#[derive(Debug)]
pub struct IrBuilder<'m> {
    module: &'m mut Module,
    cur_func: Option<usize>,
    cur_block: Option<usize>,
    loc: SourceLoc,
}

impl<'m> IrBuilder<'m> {
    /// Wrap a module for construction.
    pub fn new(module: &'m mut Module) -> Self {
        IrBuilder {
            module,
            cur_func: None,
            cur_block: None,
            loc: SourceLoc::UNKNOWN,
        }
    }

    /// Declare an extern helper.
    pub fn add_extern(&mut self, name: impl Into<String>, ret: Type, params: Vec<Type>) {
        self.module.externs.push(ExternDecl {
            name: name.into(),
            ret,
            params,
        });
    }

    /// Add a constant string global and return its name.
    pub fn add_global_str(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> String {
        let name = name.into();
        self.module.globals.push(Global {
            name: name.clone(),
            ty: Type::Str,
            is_const: true,
            init: data.into(),
        });
        name
    }

    /// Begin a function and make it current. Parameters receive the first
    /// temp ids, in order.
    pub fn start_function(
        &mut self,
        name: impl Into<String>,
        ret: Type,
        params: Vec<(String, Type)>,
    ) -> usize {
        let mut func = crate::Function::new(name, ret);
        for (pname, pty) in params {
            let id = func.reserve_temp();
            func.value_names.insert(id, pname.clone());
            func.params.push(Param {
                name: pname,
                ty: pty,
                id,
            });
        }
        self.module.functions.push(func);
        let idx = self.module.functions.len() - 1;
        self.cur_func = Some(idx);
        self.cur_block = None;
        idx
    }

    /// Append a block to the current function.
    pub fn add_block(&mut self, label: impl Into<String>) -> Result<usize, BuildError> {
        let func = self
            .cur_func
            .map(|i| &mut self.module.functions[i])
            .ok_or(BuildError::NoInsertPoint)?;
        let label = label.into();
        if func.blocks.iter().any(|b| b.label == label) {
            return Err(BuildError::DuplicateLabel(label));
        }
        func.blocks.push(BasicBlock::new(label));
        Ok(func.blocks.len() - 1)
    }

    /// Add a parameter to an existing block, allocating its temp id.
    pub fn add_block_param(
        &mut self,
        block: usize,
        name: impl Into<String>,
        ty: Type,
    ) -> Result<TempId, BuildError> {
        let func = self
            .cur_func
            .map(|i| &mut self.module.functions[i])
            .ok_or(BuildError::NoInsertPoint)?;
        let id = func.reserve_temp();
        let name = name.into();
        func.value_names.insert(id, name.clone());
        func.blocks[block].params.push(Param { name, ty, id });
        Ok(id)
    }

    /// Direct subsequent emits into `block`.
    pub fn set_insert_point(&mut self, block: usize) {
        self.cur_block = Some(block);
    }

    /// Set the source location stamped on subsequent instructions.
    pub fn set_loc(&mut self, loc: SourceLoc) {
        self.loc = loc;
    }

    /// Allocate a fresh temp id in the current function.
    pub fn reserve_temp(&mut self) -> Result<TempId, BuildError> {
        self.cur_func
            .map(|i| self.module.functions[i].reserve_temp())
            .ok_or(BuildError::NoInsertPoint)
    }

    fn push(&mut self, mut instr: Instr) -> Result<(), BuildError> {
        let (fi, bi) = match (self.cur_func, self.cur_block) {
            (Some(f), Some(b)) => (f, b),
            _ => return Err(BuildError::NoInsertPoint),
        };
        instr.loc = self.loc;
        let block = &mut self.module.functions[fi].blocks[bi];
        if block.terminated {
            return Err(BuildError::BlockTerminated(block.label.clone()));
        }
        if instr.is_terminator() {
            block.terminated = true;
        }
        block.instructions.push(instr);
        Ok(())
    }

    /// Emit a value-producing instruction and return its result temp.
    pub fn emit_value(
        &mut self,
        op: Opcode,
        ty: Type,
        operands: Vec<Value>,
    ) -> Result<TempId, BuildError> {
        let result = self.reserve_temp()?;
        self.push(Instr {
            op,
            result: Some(result),
            ty,
            operands,
            ..Default::default()
        })?;
        Ok(result)
    }

    /// Emit a `store`.
    pub fn emit_store(&mut self, ty: Type, addr: Value, value: Value) -> Result<(), BuildError> {
        self.push(Instr {
            op: Opcode::Store,
            ty,
            operands: vec![addr, value],
            ..Default::default()
        })
    }

    /// Emit `br label(args...)`.
    pub fn emit_br(&mut self, label: impl Into<String>, args: Vec<Value>) -> Result<(), BuildError> {
        self.push(Instr {
            op: Opcode::Br,
            labels: vec![label.into()],
            br_args: vec![args],
            ..Default::default()
        })
    }

    /// Emit `cbr cond, t(targs...), f(fargs...)`.
    pub fn emit_cbr(
        &mut self,
        cond: Value,
        t: impl Into<String>,
        targs: Vec<Value>,
        f: impl Into<String>,
        fargs: Vec<Value>,
    ) -> Result<(), BuildError> {
        self.push(Instr {
            op: Opcode::CBr,
            operands: vec![cond],
            labels: vec![t.into(), f.into()],
            br_args: vec![targs, fargs],
            ..Default::default()
        })
    }

    /// Emit `ret` with an optional value.
    pub fn emit_ret(&mut self, value: Option<Value>) -> Result<(), BuildError> {
        self.push(Instr {
            op: Opcode::Ret,
            operands: value.into_iter().collect(),
            ..Default::default()
        })
    }

    /// Emit `trap`.
    pub fn emit_trap(&mut self) -> Result<(), BuildError> {
        self.push(Instr {
            op: Opcode::Trap,
            ..Default::default()
        })
    }

    /// Emit a call. The callee must already be a function or a registered
    /// extern; the result temp is allocated iff `ty` is not `void`.
    pub fn emit_call(
        &mut self,
        callee: &str,
        ty: Type,
        args: Vec<Value>,
    ) -> Result<Option<TempId>, BuildError> {
        if self.module.function(callee).is_none() && self.module.extern_decl(callee).is_none() {
            return Err(BuildError::UnknownCallee(callee.to_string()));
        }
        let result = if ty == Type::Void {
            None
        } else {
            Some(self.reserve_temp()?)
        };
        self.push(Instr {
            op: Opcode::Call,
            result,
            ty,
            operands: args,
            callee: Some(callee.to_string()),
            ..Default::default()
        })?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_the_answer() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("main", Type::I64, vec![]);
        let entry = b.add_block("entry").unwrap();
        b.set_insert_point(entry);
        let t = b
            .emit_value(
                Opcode::Add,
                Type::I64,
                vec![Value::const_int(40), Value::const_int(2)],
            )
            .unwrap();
        b.emit_ret(Some(Value::temp(t))).unwrap();

        let f = m.function("main").unwrap();
        assert_eq!(f.blocks.len(), 1);
        assert!(f.blocks[0].terminated);
        assert_eq!(f.blocks[0].instructions.len(), 2);
    }

    #[test]
    fn unknown_callee_is_a_build_error() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("main", Type::Void, vec![]);
        let entry = b.add_block("entry").unwrap();
        b.set_insert_point(entry);
        assert_eq!(
            b.emit_call("rt_print_str", Type::Void, vec![]),
            Err(BuildError::UnknownCallee("rt_print_str".into()))
        );
    }

    #[test]
    fn emitting_after_terminator_fails() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("main", Type::Void, vec![]);
        let entry = b.add_block("entry").unwrap();
        b.set_insert_point(entry);
        b.emit_ret(None).unwrap();
        assert_eq!(
            b.emit_trap(),
            Err(BuildError::BlockTerminated("entry".into()))
        );
    }
}
