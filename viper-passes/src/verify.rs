//! IL verifier: structural well-formedness, SSA dominance, operand typing,
//! terminator and call rules.

use std::collections::HashMap;

use itertools::Itertools;
use thiserror::Error;

use viper_il::{
    Function, Instr, Module, Opcode, ResultKind, TempId, Type, Value,
};

use crate::{Cfg, DominatorTree};

/// First rule violation found in a module.
///
/// Rendered as `[RULE:<name>] <msg> at <fn>:<block>:<instr>` so downstream
/// tooling can classify failures deterministically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("[RULE:{rule}] {message} at {site}")]
pub struct VerifyError {
    /// Name of the violated rule.
    pub rule: &'static str,
    /// Description of the violation.
    pub message: String,
    /// `<fn>:<block>:<instr>` site, indices 0-based.
    pub site: String,
}

impl VerifyError {
    fn new(rule: &'static str, message: impl Into<String>, site: impl Into<String>) -> Self {
        VerifyError {
            rule,
            message: message.into(),
            site: site.into(),
        }
    }
}

type VerifyResult = Result<(), VerifyError>;

/// Verify every function of `m`. Returns the first violation found;
/// iteration order is source order, so the result is deterministic.
pub fn verify_module(m: &Module) -> VerifyResult {
    check_unique_symbols(m)?;
    for f in &m.functions {
        FnVerifier::new(m, f)?.run()?;
    }
    Ok(())
}

fn check_unique_symbols(m: &Module) -> VerifyResult {
    for (name, kind) in m
        .externs
        .iter()
        .map(|e| (&e.name, "extern"))
        .chain(m.globals.iter().map(|g| (&g.name, "global")))
        .chain(m.functions.iter().map(|f| (&f.name, "function")))
        .duplicates_by(|(name, _)| name.clone())
    {
        return Err(VerifyError::new(
            "symbol-resolution",
            format!("duplicate {kind} '@{name}'"),
            name.clone(),
        ));
    }
    Ok(())
}

/// Where a temp is defined within its function.
#[derive(Debug, Clone, Copy)]
enum DefSite {
    FuncParam,
    BlockParam(usize),
    Instr(usize, usize),
}

struct FnVerifier<'a> {
    m: &'a Module,
    f: &'a Function,
    cfg: Cfg,
    dom: DominatorTree,
    defs: HashMap<TempId, DefSite>,
    types: HashMap<TempId, Type>,
}

impl<'a> FnVerifier<'a> {
    fn new(m: &'a Module, f: &'a Function) -> Result<Self, VerifyError> {
        let cfg = Cfg::new(f);
        let dom = DominatorTree::new(&cfg);
        let mut v = FnVerifier {
            m,
            f,
            cfg,
            dom,
            defs: HashMap::new(),
            types: HashMap::new(),
        };
        v.collect_defs()?;
        Ok(v)
    }

    fn site(&self, block: usize, instr: usize) -> String {
        format!("{}:{block}:{instr}", self.f.name)
    }

    fn run(&self) -> VerifyResult {
        self.check_structure()?;
        for (bi, block) in self.f.blocks.iter().enumerate() {
            for (ii, instr) in block.instructions.iter().enumerate() {
                self.check_instr(bi, ii, instr)?;
                self.check_dominance(bi, ii, instr)?;
            }
        }
        Ok(())
    }

    fn collect_defs(&mut self) -> VerifyResult {
        let f = self.f;
        let mut define = |defs: &mut HashMap<TempId, DefSite>,
                          types: &mut HashMap<TempId, Type>,
                          id: TempId,
                          ty: Type,
                          site: DefSite,
                          at: String| {
            if defs.insert(id, site).is_some() {
                return Err(VerifyError::new(
                    "ssa-single-def",
                    format!("temp %{} defined more than once", f.temp_name(id)),
                    at,
                ));
            }
            types.insert(id, ty);
            Ok(())
        };
        for p in &f.params {
            define(
                &mut self.defs,
                &mut self.types,
                p.id,
                p.ty,
                DefSite::FuncParam,
                format!("{}:0:0", f.name),
            )?;
        }
        for (bi, block) in f.blocks.iter().enumerate() {
            for p in &block.params {
                define(
                    &mut self.defs,
                    &mut self.types,
                    p.id,
                    p.ty,
                    DefSite::BlockParam(bi),
                    format!("{}:{bi}:0", f.name),
                )?;
            }
            for (ii, instr) in block.instructions.iter().enumerate() {
                if let Some(id) = instr.result {
                    define(
                        &mut self.defs,
                        &mut self.types,
                        id,
                        instr.ty,
                        DefSite::Instr(bi, ii),
                        format!("{}:{bi}:{ii}", f.name),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn check_structure(&self) -> VerifyResult {
        if self.f.blocks.is_empty() {
            return Err(VerifyError::new(
                "terminated",
                "function has no blocks",
                format!("{}:0:0", self.f.name),
            ));
        }
        for (label, _) in self
            .f
            .blocks
            .iter()
            .map(|b| (&b.label, ()))
            .duplicates_by(|(l, _)| l.clone())
        {
            return Err(VerifyError::new(
                "unique-label",
                format!("duplicate block label '{label}'"),
                format!("{}:0:0", self.f.name),
            ));
        }
        let entry = &self.f.blocks[0];
        if !entry.params.is_empty() {
            return Err(VerifyError::new(
                "entry-block",
                "entry block must not declare parameters",
                self.site(0, 0),
            ));
        }
        if !self.cfg.preds(0).is_empty() {
            return Err(VerifyError::new(
                "entry-block",
                "entry block must not have predecessors",
                self.site(0, 0),
            ));
        }
        for (bi, block) in self.f.blocks.iter().enumerate() {
            match block.instructions.last() {
                Some(last) if last.is_terminator() => {}
                _ => {
                    return Err(VerifyError::new(
                        "terminated",
                        format!("block '{}' is not terminated", block.label),
                        self.site(bi, block.instructions.len().saturating_sub(1)),
                    ));
                }
            }
            for (ii, instr) in block.instructions.iter().enumerate() {
                if instr.is_terminator() && ii + 1 != block.instructions.len() {
                    return Err(VerifyError::new(
                        "terminated",
                        "instruction after terminator",
                        self.site(bi, ii + 1),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Expected-versus-actual check for one operand.
    fn check_operand(
        &self,
        v: &Value,
        expected: Type,
        bi: usize,
        ii: usize,
    ) -> VerifyResult {
        let err = |msg: String| Err(VerifyError::new("operand-type", msg, self.site(bi, ii)));
        match v {
            Value::Temp(id) => match self.types.get(id) {
                Some(ty) if *ty == expected => Ok(()),
                Some(ty) => err(format!(
                    "operand %{} has type {ty}, expected {expected}",
                    self.f.temp_name(*id)
                )),
                None => Err(VerifyError::new(
                    "ssa-dominance",
                    format!("use of undefined temp %{}", self.f.temp_name(*id)),
                    self.site(bi, ii),
                )),
            },
            Value::ConstInt(x) => {
                if !expected.is_integer() {
                    err(format!("integer literal {x} used as {expected}"))
                } else if expected == Type::I1 && *x != 0 && *x != 1 {
                    err(format!("literal {x} is not a valid i1"))
                } else {
                    Ok(())
                }
            }
            Value::ConstFloat(_) => {
                if expected == Type::F64 {
                    Ok(())
                } else {
                    err(format!("float literal used as {expected}"))
                }
            }
            Value::Null => {
                if expected == Type::Ptr {
                    Ok(())
                } else {
                    err(format!("null used as {expected}"))
                }
            }
            Value::GlobalRef(name) => {
                if self.m.global(name).is_none() {
                    Err(VerifyError::new(
                        "symbol-resolution",
                        format!("unknown global '@{name}'"),
                        self.site(bi, ii),
                    ))
                } else if expected == Type::Ptr {
                    Ok(())
                } else {
                    err(format!("global '@{name}' used as {expected}"))
                }
            }
        }
    }

    fn expect_operands(&self, instr: &Instr, n: usize, bi: usize, ii: usize) -> VerifyResult {
        if instr.operands.len() == n {
            Ok(())
        } else {
            Err(VerifyError::new(
                "operand-type",
                format!(
                    "{} expects {n} operand(s), got {}",
                    instr.op.mnemonic(),
                    instr.operands.len()
                ),
                self.site(bi, ii),
            ))
        }
    }

    fn check_instr(&self, bi: usize, ii: usize, instr: &Instr) -> VerifyResult {
        use Opcode::*;

        // Result presence must follow the opcode's policy.
        let has_result = instr.result.is_some();
        let wants_result = match instr.op.result_kind() {
            ResultKind::Always => true,
            ResultKind::Never => false,
            ResultKind::FromType => instr.ty != Type::Void,
        };
        if has_result != wants_result {
            return Err(VerifyError::new(
                "result",
                format!(
                    "{} {} a result",
                    instr.op.mnemonic(),
                    if wants_result { "requires" } else { "must not define" }
                ),
                self.site(bi, ii),
            ));
        }
        if !instr.op.is_terminator() && !instr.labels.is_empty() {
            return Err(VerifyError::new(
                "terminator",
                format!("{} must not carry labels", instr.op.mnemonic()),
                self.site(bi, ii),
            ));
        }

        match instr.op {
            Add | Sub | Mul | IAddOvf | ISubOvf | IMulOvf | SDivChk0 | UDivChk0 | SRemChk0
            | URemChk0 | And | Or | Xor | Shl | LShr | AShr | ICmpEq | ICmpNe | SCmpLt
            | SCmpLe | SCmpGt | SCmpGe | UCmpLt | UCmpLe | UCmpGt | UCmpGe => {
                self.expect_operands(instr, 2, bi, ii)?;
                self.check_operand(&instr.operands[0], Type::I64, bi, ii)?;
                self.check_operand(&instr.operands[1], Type::I64, bi, ii)?;
            }
            FAdd | FSub | FMul | FDiv | FCmpEq | FCmpNe | FCmpLt | FCmpLe | FCmpGt | FCmpGe => {
                self.expect_operands(instr, 2, bi, ii)?;
                self.check_operand(&instr.operands[0], Type::F64, bi, ii)?;
                self.check_operand(&instr.operands[1], Type::F64, bi, ii)?;
            }
            Sitofp => {
                self.expect_operands(instr, 1, bi, ii)?;
                self.check_operand(&instr.operands[0], Type::I64, bi, ii)?;
            }
            Fptosi | CastFpToSiRteChk => {
                self.expect_operands(instr, 1, bi, ii)?;
                self.check_operand(&instr.operands[0], Type::F64, bi, ii)?;
            }
            CastUiNarrowChk => {
                self.expect_operands(instr, 1, bi, ii)?;
                self.check_operand(&instr.operands[0], Type::I64, bi, ii)?;
                if !matches!(instr.ty, Type::I16 | Type::I32) {
                    return Err(VerifyError::new(
                        "operand-type",
                        format!("cast.ui_narrow.chk cannot target {}", instr.ty),
                        self.site(bi, ii),
                    ));
                }
            }
            Zext1 => {
                self.expect_operands(instr, 1, bi, ii)?;
                self.check_operand(&instr.operands[0], Type::I1, bi, ii)?;
            }
            Trunc1 => {
                self.expect_operands(instr, 1, bi, ii)?;
                self.check_operand(&instr.operands[0], Type::I64, bi, ii)?;
            }
            Alloca => {
                self.expect_operands(instr, 1, bi, ii)?;
                self.check_operand(&instr.operands[0], Type::I64, bi, ii)?;
            }
            Load => {
                self.expect_operands(instr, 1, bi, ii)?;
                self.check_memory_type(instr.ty, bi, ii)?;
                self.check_operand(&instr.operands[0], Type::Ptr, bi, ii)?;
            }
            Store => {
                self.expect_operands(instr, 2, bi, ii)?;
                self.check_memory_type(instr.ty, bi, ii)?;
                self.check_operand(&instr.operands[0], Type::Ptr, bi, ii)?;
                self.check_operand(&instr.operands[1], instr.ty, bi, ii)?;
            }
            Gep => {
                self.expect_operands(instr, 2, bi, ii)?;
                self.check_operand(&instr.operands[0], Type::Ptr, bi, ii)?;
                self.check_operand(&instr.operands[1], Type::I64, bi, ii)?;
            }
            AddrOf | ConstStr => {
                self.expect_operands(instr, 1, bi, ii)?;
                match &instr.operands[0] {
                    Value::GlobalRef(name) => {
                        if self.m.global(name).is_none() {
                            return Err(VerifyError::new(
                                "symbol-resolution",
                                format!("unknown global '@{name}'"),
                                self.site(bi, ii),
                            ));
                        }
                    }
                    _ => {
                        return Err(VerifyError::new(
                            "operand-type",
                            format!("{} requires a global operand", instr.op.mnemonic()),
                            self.site(bi, ii),
                        ));
                    }
                }
            }
            ConstNull => self.expect_operands(instr, 0, bi, ii)?,
            Br | CBr => self.check_branch(bi, ii, instr)?,
            Ret => self.check_ret(bi, ii, instr)?,
            Trap => {
                self.expect_operands(instr, 0, bi, ii)?;
                if !instr.labels.is_empty() {
                    return Err(VerifyError::new(
                        "terminator",
                        "trap takes no successor labels",
                        self.site(bi, ii),
                    ));
                }
            }
            Call => self.check_call(bi, ii, instr)?,
        }
        Ok(())
    }

    fn check_memory_type(&self, ty: Type, bi: usize, ii: usize) -> VerifyResult {
        if ty.slot_size().is_some() {
            Ok(())
        } else {
            Err(VerifyError::new(
                "operand-type",
                format!("type {ty} cannot be loaded or stored"),
                self.site(bi, ii),
            ))
        }
    }

    fn check_branch(&self, bi: usize, ii: usize, instr: &Instr) -> VerifyResult {
        let expected_labels = if instr.op == Opcode::Br { 1 } else { 2 };
        if instr.labels.len() != expected_labels {
            return Err(VerifyError::new(
                "terminator",
                format!(
                    "{} requires {expected_labels} target(s), got {}",
                    instr.op.mnemonic(),
                    instr.labels.len()
                ),
                self.site(bi, ii),
            ));
        }
        if instr.br_args.len() != instr.labels.len() {
            return Err(VerifyError::new(
                "terminator",
                format!(
                    "branch argument lists ({}) do not match targets ({})",
                    instr.br_args.len(),
                    instr.labels.len()
                ),
                self.site(bi, ii),
            ));
        }
        if instr.op == Opcode::CBr {
            self.expect_operands(instr, 1, bi, ii)?;
            self.check_operand(&instr.operands[0], Type::I1, bi, ii)?;
        }
        for (label, args) in instr.labels.iter().zip(&instr.br_args) {
            let Some(target) = self.f.block_index(label) else {
                return Err(VerifyError::new(
                    "terminator",
                    format!("unknown branch target '{label}'"),
                    self.site(bi, ii),
                ));
            };
            let params = &self.f.blocks[target].params;
            if params.len() != args.len() {
                return Err(VerifyError::new(
                    "br-args",
                    format!(
                        "branch argument count mismatch: expected {}, got {}, target '{label}'",
                        params.len(),
                        args.len()
                    ),
                    self.site(bi, ii),
                ));
            }
            for (param, arg) in params.iter().zip(args) {
                self.check_operand(arg, param.ty, bi, ii)?;
            }
        }
        Ok(())
    }

    fn check_ret(&self, bi: usize, ii: usize, instr: &Instr) -> VerifyResult {
        match (self.f.ret, instr.operands.len()) {
            (Type::Void, 0) => Ok(()),
            (Type::Void, _) => Err(VerifyError::new(
                "ret-type",
                "ret with a value in a void function",
                self.site(bi, ii),
            )),
            (ret, 1) => self.check_operand(&instr.operands[0], ret, bi, ii).map_err(
                |e| VerifyError::new("ret-type", e.message, self.site(bi, ii)),
            ),
            (ret, n) => Err(VerifyError::new(
                "ret-type",
                format!("ret must carry exactly one {ret} value, got {n} operand(s)"),
                self.site(bi, ii),
            )),
        }
    }

    fn check_call(&self, bi: usize, ii: usize, instr: &Instr) -> VerifyResult {
        let Some(callee) = instr.callee.as_deref() else {
            return Err(VerifyError::new(
                "call-signature",
                "call without a callee",
                self.site(bi, ii),
            ));
        };
        let (ret, params): (Type, Vec<Type>) = if let Some(e) = self.m.extern_decl(callee) {
            (e.ret, e.params.clone())
        } else if let Some(f) = self.m.function(callee) {
            (f.ret, f.params.iter().map(|p| p.ty).collect())
        } else {
            return Err(VerifyError::new(
                "symbol-resolution",
                format!("unknown callee '@{callee}'"),
                self.site(bi, ii),
            ));
        };
        if instr.operands.len() != params.len() {
            return Err(VerifyError::new(
                "call-signature",
                format!(
                    "@{callee}: expected {} argument(s), got {}",
                    params.len(),
                    instr.operands.len()
                ),
                self.site(bi, ii),
            ));
        }
        for (arg, ty) in instr.operands.iter().zip(&params) {
            self.check_operand(arg, *ty, bi, ii)?;
        }
        if instr.ty != ret {
            return Err(VerifyError::new(
                "call-signature",
                format!("@{callee} returns {ret}, call is typed {}", instr.ty),
                self.site(bi, ii),
            ));
        }
        Ok(())
    }

    fn check_dominance(&self, bi: usize, ii: usize, instr: &Instr) -> VerifyResult {
        // Dominance is undecidable for unreachable code; the other rules
        // still apply there.
        if !self.cfg.is_reachable(bi) {
            return Ok(());
        }
        for v in instr.all_operands() {
            let Value::Temp(id) = v else { continue };
            let Some(site) = self.defs.get(id) else {
                return Err(VerifyError::new(
                    "ssa-dominance",
                    format!("use of undefined temp %{}", self.f.temp_name(*id)),
                    self.site(bi, ii),
                ));
            };
            let dominated = match *site {
                DefSite::FuncParam => true,
                DefSite::BlockParam(db) => db == bi || self.dom.dominates(db, bi),
                DefSite::Instr(db, di) => {
                    if db == bi {
                        di < ii
                    } else {
                        self.dom.dominates(db, bi)
                    }
                }
            };
            if !dominated {
                return Err(VerifyError::new(
                    "ssa-dominance",
                    format!(
                        "use of %{} is not dominated by its definition",
                        self.f.temp_name(*id)
                    ),
                    self.site(bi, ii),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::text::parse_module;

    fn verify(text: &str) -> VerifyResult {
        verify_module(&parse_module(text).unwrap())
    }

    #[test]
    fn accepts_well_formed_module() {
        verify(
            "il 0.1\n\
             extern @rt_print_i64(i64) -> void\n\
             func @main() -> i64 {\n\
             entry:\n\
               %t0 = add 40, 2\n\
               call @rt_print_i64(%t0)\n\
               ret %t0\n\
             }\n",
        )
        .unwrap();
    }

    #[test]
    fn rejects_unterminated_block() {
        let err = verify(
            "il 0.1\nfunc @f() -> void {\nentry:\n  %t0 = add 1, 2\n}\n",
        )
        .unwrap_err();
        assert_eq!(err.rule, "terminated");
        assert!(err.to_string().starts_with("[RULE:terminated]"));
    }

    #[test]
    fn rejects_branch_arg_mismatch() {
        let err = verify(
            "il 0.1\n\
             func @f() -> void {\n\
             entry:\n\
               br target\n\
             target(%x: i64):\n\
               ret\n\
             }\n",
        )
        .unwrap_err();
        assert_eq!(err.rule, "br-args");
        assert!(err
            .message
            .contains("branch argument count mismatch: expected 1, got 0, target 'target'"));
    }

    #[test]
    fn rejects_branch_arg_type_mismatch() {
        let err = verify(
            "il 0.1\n\
             func @f() -> void {\n\
             entry:\n\
               %t0 = fadd 1.0, 2.0\n\
               br target(%t0)\n\
             target(%x: i64):\n\
               ret\n\
             }\n",
        )
        .unwrap_err();
        assert_eq!(err.rule, "operand-type");
    }

    #[test]
    fn rejects_undominated_use() {
        let err = verify(
            "il 0.1\n\
             func @f(%c: i1) -> i64 {\n\
             entry:\n\
               cbr %c, a, b\n\
             a:\n\
               %t1 = add 1, 1\n\
               br join\n\
             b:\n\
               br join\n\
             join:\n\
               ret %t1\n\
             }\n",
        )
        .unwrap_err();
        assert_eq!(err.rule, "ssa-dominance");
    }

    #[test]
    fn rejects_duplicate_label() {
        let err = verify(
            "il 0.1\nfunc @f() -> void {\nentry:\n  ret\nentry:\n  ret\n}\n",
        )
        .unwrap_err();
        assert_eq!(err.rule, "unique-label");
    }

    #[test]
    fn rejects_ret_type_mismatch() {
        let err = verify(
            "il 0.1\nfunc @f() -> i64 {\nentry:\n  ret\n}\n",
        )
        .unwrap_err();
        assert_eq!(err.rule, "ret-type");
    }

    #[test]
    fn rejects_call_arity_mismatch() {
        let err = verify(
            "il 0.1\n\
             extern @rt_print_i64(i64) -> void\n\
             func @f() -> void {\n\
             entry:\n\
               call @rt_print_i64()\n\
               ret\n\
             }\n",
        )
        .unwrap_err();
        assert_eq!(err.rule, "call-signature");
        assert!(err.message.contains("expected 1 argument(s), got 0"));
    }

    #[test]
    fn rejects_unknown_callee() {
        let err = verify(
            "il 0.1\nfunc @f() -> void {\nentry:\n  call @nope()\n  ret\n}\n",
        )
        .unwrap_err();
        assert_eq!(err.rule, "symbol-resolution");
    }

    #[test]
    fn rejects_unknown_branch_target() {
        let err = verify(
            "il 0.1\nfunc @f() -> void {\nentry:\n  br nowhere\n}\n",
        )
        .unwrap_err();
        assert_eq!(err.rule, "terminator");
        assert!(err.message.contains("unknown branch target 'nowhere'"));
    }

    #[test]
    fn rejects_non_i1_condition() {
        let err = verify(
            "il 0.1\n\
             func @f() -> void {\n\
             entry:\n\
               cbr 2, a, b\n\
             a:\n\
               ret\n\
             b:\n\
               ret\n\
             }\n",
        )
        .unwrap_err();
        assert_eq!(err.rule, "operand-type");
    }
}
