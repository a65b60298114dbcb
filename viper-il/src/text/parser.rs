//! One-token-lookahead parser for the textual IL.

use std::collections::HashMap;

use crate::text::lexer::{LineLexer, Tok};
use crate::text::Diagnostic;
use crate::{
    BasicBlock, ExternDecl, Function, Global, Instr, Module, Opcode, Param, ResultKind, SourceLoc,
    TempId, Type, Value,
};

/// Parse a complete module from IL text.
///
/// Comment lines and blank lines are skipped at any position outside a
/// string literal. Every failure reports the 1-based line it occurred on.
pub fn parse_module(text: &str) -> Result<Module, Diagnostic> {
    let mut st = ParserState::new();
    for (idx, line) in text.lines().enumerate() {
        st.line_no = idx as u32 + 1;
        let mut lx = LineLexer::new(line);
        if lx.at_end() {
            continue;
        }
        st.line(&mut lx).map_err(|msg| Diagnostic::new(st.line_no, msg))?;
    }
    if !st.saw_header {
        return Err(Diagnostic::new(st.line_no, "missing IL version header"));
    }
    if st.func.is_some() {
        return Err(Diagnostic::new(st.line_no, "unterminated function body"));
    }
    Ok(st.module)
}

/// Per-pass parser state: the module under construction, the current
/// function and block, and the 1-based line counter.
struct ParserState {
    module: Module,
    line_no: u32,
    saw_header: bool,
    func: Option<FuncState>,
}

/// Parse state scoped to one function body.
struct FuncState {
    index: usize,
    block: Option<usize>,
    names: HashMap<String, TempId>,
    loc: SourceLoc,
}

type ParseResult<T> = Result<T, String>;

impl ParserState {
    fn new() -> Self {
        ParserState {
            module: Module::default(),
            line_no: 0,
            saw_header: false,
            func: None,
        }
    }

    fn line(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<()> {
        if self.func.is_some() {
            return self.function_line(lx);
        }
        let word = match lx.next().transpose()? {
            Some(Tok::Word(w)) => w.to_string(),
            _ => return Err("instruction outside block".to_string()),
        };
        if !self.saw_header {
            return if word == "il" {
                self.header(lx)
            } else {
                Err("missing IL version header".to_string())
            };
        }
        match word.as_str() {
            "il" => self.header(lx),
            ".file" => self.file_directive(lx),
            "extern" => self.extern_decl(lx),
            "global" => self.global_decl(lx),
            "func" => self.function_header(lx),
            _ => Err("instruction outside block".to_string()),
        }
    }

    fn header(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<()> {
        let version = expect_word(lx, "missing IL version header")?;
        if !version.starts_with("0.1") {
            return Err(format!("unsupported IL version '{version}'"));
        }
        self.module.version = version;
        self.saw_header = true;
        expect_end(lx)
    }

    fn file_directive(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<()> {
        let id: u32 = expect_word(lx, "malformed .file directive")?
            .parse()
            .map_err(|_| "malformed .file directive".to_string())?;
        let path = match lx.next().transpose()? {
            Some(Tok::Str(bytes)) => {
                String::from_utf8(bytes).map_err(|_| "malformed .file directive".to_string())?
            }
            _ => return Err("malformed .file directive".to_string()),
        };
        self.module.files.push((id, path));
        expect_end(lx)
    }

    fn extern_decl(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<()> {
        let name = expect_symbol(lx, "malformed extern declaration")?;
        expect_punct(lx, '(', "malformed extern declaration")?;
        let mut params = Vec::new();
        loop {
            match lx.next().transpose()? {
                Some(Tok::Punct(')')) => break,
                Some(Tok::Punct(',')) => continue,
                Some(Tok::Word(w)) => {
                    params.push(Type::from_mnemonic(w).ok_or("unknown type")?);
                }
                _ => return Err("malformed extern declaration".to_string()),
            }
        }
        expect_arrow(lx)?;
        let ret = expect_type(lx)?;
        self.module.externs.push(ExternDecl { name, ret, params });
        expect_end(lx)
    }

    fn global_decl(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<()> {
        let mut word = expect_word(lx, "malformed global declaration")?;
        let is_const = word == "const";
        if is_const {
            word = expect_word(lx, "malformed global declaration")?;
        }
        let ty = Type::from_mnemonic(&word).ok_or("unknown type")?;
        let name = expect_symbol(lx, "malformed global declaration")?;
        expect_punct(lx, '=', "missing '='")?;
        let init = match lx.next().transpose()? {
            Some(Tok::Str(bytes)) => bytes,
            _ => return Err("malformed global declaration".to_string()),
        };
        self.module.globals.push(Global {
            name,
            ty,
            is_const,
            init,
        });
        expect_end(lx)
    }

    fn function_header(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<()> {
        let name = expect_symbol(lx, "malformed function header")?;
        expect_punct(lx, '(', "malformed function header")?;
        let mut func = Function::new(name, Type::Void);
        let mut names = HashMap::new();
        loop {
            match lx.next().transpose()? {
                Some(Tok::Punct(')')) => break,
                Some(Tok::Punct(',')) => continue,
                Some(Tok::Word(w)) if w.starts_with('%') => {
                    let pname = w[1..].to_string();
                    if pname.is_empty() {
                        return Err("bad param".to_string());
                    }
                    expect_punct(lx, ':', "bad param")?;
                    let ty = expect_type(lx)?;
                    let id = func.reserve_temp();
                    names.insert(pname.clone(), id);
                    func.value_names.insert(id, pname.clone());
                    func.params.push(Param {
                        name: pname,
                        ty,
                        id,
                    });
                }
                _ => return Err("bad param".to_string()),
            }
        }
        expect_arrow(lx)?;
        func.ret = expect_type(lx)?;
        expect_punct(lx, '{', "malformed function header")?;
        expect_end(lx).map_err(|_| "malformed function header".to_string())?;
        self.module.functions.push(func);
        self.func = Some(FuncState {
            index: self.module.functions.len() - 1,
            block: None,
            names,
            loc: SourceLoc::UNKNOWN,
        });
        Ok(())
    }

    fn function_line(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<()> {
        // Closing brace ends the function body.
        if matches!(lx.peek(), Some(Ok(Tok::Punct('}')))) {
            lx.next();
            expect_end(lx)?;
            self.func = None;
            return Ok(());
        }
        if let Some(Ok(Tok::Word(w))) = lx.peek() {
            if *w == ".loc" {
                lx.next();
                return self.loc_directive(lx);
            }
            if !w.starts_with('%') && Opcode::from_mnemonic(w.as_ref()).is_none() {
                return self.block_header(lx);
            }
        }
        self.instruction(lx)
    }

    fn loc_directive(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<()> {
        let mut parts = [0u32; 3];
        for slot in &mut parts {
            *slot = expect_word(lx, "malformed .loc directive")?
                .parse()
                .map_err(|_| "malformed .loc directive".to_string())?;
        }
        expect_end(lx).map_err(|_| "malformed .loc directive".to_string())?;
        self.fs().loc = SourceLoc::new(parts[0], parts[1], parts[2]);
        Ok(())
    }

    fn block_header(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<()> {
        let label = expect_word(lx, "malformed block header")?;
        let mut params = Vec::new();
        if matches!(lx.peek(), Some(Ok(Tok::Punct('(')))) {
            lx.next();
            loop {
                match lx.next().transpose()? {
                    Some(Tok::Punct(')')) => break,
                    Some(Tok::Punct(',')) => continue,
                    Some(Tok::Word(w)) if w.starts_with('%') => {
                        let pname = w[1..].to_string();
                        if pname.is_empty() {
                            return Err("bad param".to_string());
                        }
                        expect_punct(lx, ':', "bad param")?;
                        let ty = expect_type(lx)?;
                        let id = self.define_name(&pname);
                        params.push(Param {
                            name: pname,
                            ty,
                            id,
                        });
                    }
                    _ => return Err("bad param".to_string()),
                }
            }
        }
        expect_punct(lx, ':', "malformed block header")?;
        expect_end(lx)?;
        let fs = self.func.as_mut().expect("inside function");
        let func = &mut self.module.functions[fs.index];
        func.blocks.push(BasicBlock {
            label,
            params,
            ..Default::default()
        });
        fs.block = Some(func.blocks.len() - 1);
        fs.loc = SourceLoc::UNKNOWN;
        Ok(())
    }

    fn instruction(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<()> {
        if self.fs().block.is_none() {
            return Err("instruction outside block".to_string());
        }
        let mut result_name = None;
        if let Some(Ok(Tok::Word(w))) = lx.peek() {
            if let Some(name) = w.strip_prefix('%') {
                result_name = Some(name.to_string());
                lx.next();
                expect_punct(lx, '=', "missing '='")?;
            }
        }
        let mnemonic = expect_word(lx, "missing opcode")?;
        let op = Opcode::from_mnemonic(&mnemonic)
            .ok_or_else(|| format!("unknown opcode '{mnemonic}'"))?;

        let mut instr = self.operands(op, lx)?;
        expect_end(lx)?;

        match (op.result_kind(), &result_name) {
            (ResultKind::Always, None) => return Err("missing result".to_string()),
            (ResultKind::Never, Some(_)) => return Err("unexpected result".to_string()),
            (ResultKind::FromType, Some(_)) if instr.ty == Type::Void => {
                return Err("missing '->'".to_string())
            }
            _ => {}
        }
        if let Some(name) = result_name {
            instr.result = Some(self.define_name(&name));
        }
        instr.loc = self.fs().loc;
        instr.il_line = self.line_no;

        let fs = self.func.as_mut().expect("inside function");
        let func = &mut self.module.functions[fs.index];
        let block = &mut func.blocks[fs.block.expect("checked above")];
        if instr.is_terminator() {
            block.terminated = true;
        }
        block.instructions.push(instr);
        Ok(())
    }

    /// Parse the opcode-specific operand syntax.
    fn operands(&mut self, op: Opcode, lx: &mut LineLexer<'_>) -> ParseResult<Instr> {
        use Opcode::*;
        let mut instr = Instr {
            op,
            ..Default::default()
        };
        match op {
            Add | Sub | Mul | IAddOvf | ISubOvf | IMulOvf | SDivChk0 | UDivChk0 | SRemChk0
            | URemChk0 | And | Or | Xor | Shl | LShr | AShr => {
                instr.ty = Type::I64;
                instr.operands = self.value_pair(lx)?;
            }
            FAdd | FSub | FMul | FDiv => {
                instr.ty = Type::F64;
                instr.operands = self.value_pair(lx)?;
            }
            ICmpEq | ICmpNe | SCmpLt | SCmpLe | SCmpGt | SCmpGe | UCmpLt | UCmpLe | UCmpGt
            | UCmpGe | FCmpEq | FCmpNe | FCmpLt | FCmpLe | FCmpGt | FCmpGe => {
                instr.ty = Type::I1;
                instr.operands = self.value_pair(lx)?;
            }
            Sitofp => {
                instr.ty = Type::F64;
                instr.operands = vec![self.value(lx)?];
            }
            Fptosi | CastFpToSiRteChk => {
                instr.ty = Type::I64;
                instr.operands = vec![self.value(lx)?];
            }
            CastUiNarrowChk => {
                instr.operands = vec![self.value(lx)?];
                expect_arrow(lx)?;
                instr.ty = expect_type(lx)?;
            }
            Zext1 => {
                instr.ty = Type::I64;
                instr.operands = vec![self.value(lx)?];
            }
            Trunc1 => {
                instr.ty = Type::I1;
                instr.operands = vec![self.value(lx)?];
            }
            Alloca => {
                instr.ty = Type::Ptr;
                instr.operands = vec![self.value(lx)?];
            }
            Load => {
                instr.ty = expect_type(lx)?;
                expect_punct(lx, ',', "malformed load")?;
                instr.operands = vec![self.value(lx)?];
            }
            Store => {
                instr.ty = expect_type(lx)?;
                expect_punct(lx, ',', "malformed store")?;
                let addr = self.value(lx)?;
                expect_punct(lx, ',', "malformed store")?;
                let value = self.value(lx)?;
                instr.operands = vec![addr, value];
            }
            Gep => {
                instr.ty = Type::Ptr;
                instr.operands = self.value_pair(lx)?;
            }
            AddrOf | ConstStr => {
                instr.ty = if op == ConstStr { Type::Str } else { Type::Ptr };
                let name = expect_symbol(lx, "expected global")?;
                if self.module.global(&name).is_none() {
                    return Err("unknown global".to_string());
                }
                instr.operands = vec![Value::GlobalRef(name)];
            }
            ConstNull => {
                instr.ty = Type::Ptr;
            }
            Br => {
                let label = expect_word(lx, "missing branch target")?;
                let args = self.opt_arg_list(lx)?;
                instr.labels = vec![label];
                instr.br_args = vec![args];
            }
            CBr => {
                let cond = self.value(lx)?;
                expect_punct(lx, ',', "malformed cbr")?;
                let t = expect_word(lx, "missing branch target")?;
                let targs = self.opt_arg_list(lx)?;
                expect_punct(lx, ',', "malformed cbr")?;
                let f = expect_word(lx, "missing branch target")?;
                let fargs = self.opt_arg_list(lx)?;
                instr.operands = vec![cond];
                instr.labels = vec![t, f];
                instr.br_args = vec![targs, fargs];
            }
            Ret => {
                if !lx.at_end() {
                    instr.operands = vec![self.value(lx)?];
                }
            }
            Trap => {}
            Call => {
                let callee = expect_symbol(lx, "malformed call")?;
                expect_punct(lx, '(', "malformed call")?;
                let mut args = Vec::new();
                loop {
                    match lx.peek() {
                        Some(Ok(Tok::Punct(')'))) => {
                            lx.next();
                            break;
                        }
                        Some(Ok(Tok::Punct(','))) => {
                            lx.next();
                        }
                        Some(_) => args.push(self.value(lx)?),
                        None => return Err("malformed call".to_string()),
                    }
                }
                if matches!(lx.peek(), Some(Ok(Tok::Arrow))) {
                    lx.next();
                    instr.ty = expect_type(lx)?;
                }
                instr.callee = Some(callee);
                instr.operands = args;
            }
        }
        Ok(instr)
    }

    fn value_pair(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<Vec<Value>> {
        let a = self.value(lx)?;
        expect_punct(lx, ',', "expected ','")?;
        let b = self.value(lx)?;
        Ok(vec![a, b])
    }

    fn opt_arg_list(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<Vec<Value>> {
        let mut args = Vec::new();
        if !matches!(lx.peek(), Some(Ok(Tok::Punct('(')))) {
            return Ok(args);
        }
        lx.next();
        loop {
            match lx.peek() {
                Some(Ok(Tok::Punct(')'))) => {
                    lx.next();
                    return Ok(args);
                }
                Some(Ok(Tok::Punct(','))) => {
                    lx.next();
                }
                Some(_) => args.push(self.value(lx)?),
                None => return Err("unterminated argument list".to_string()),
            }
        }
    }

    fn value(&mut self, lx: &mut LineLexer<'_>) -> ParseResult<Value> {
        let word = match lx.next().transpose()? {
            Some(Tok::Word(w)) => w.to_string(),
            _ => return Err("expected operand".to_string()),
        };
        if let Some(name) = word.strip_prefix('%') {
            if name.is_empty() {
                return Err("bad operand '%'".to_string());
            }
            let id = self.define_name(name);
            return Ok(Value::Temp(id));
        }
        if let Some(name) = word.strip_prefix('@') {
            return Ok(Value::GlobalRef(name.to_string()));
        }
        if word == "null" {
            return Ok(Value::Null);
        }
        if let Ok(v) = word.parse::<i64>() {
            return Ok(Value::ConstInt(v));
        }
        if let Ok(v) = word.parse::<f64>() {
            return Ok(Value::ConstFloat(v));
        }
        Err(format!("bad operand '{word}'"))
    }

    /// Resolve a temp spelling to its id, allocating on first sight. The
    /// spelling is recorded unless it is the canonical `t<id>` form.
    fn define_name(&mut self, name: &str) -> TempId {
        let fs = self.func.as_mut().expect("inside function");
        if let Some(id) = fs.names.get(name) {
            return *id;
        }
        let func = &mut self.module.functions[fs.index];
        let id = func.reserve_temp();
        fs.names.insert(name.to_string(), id);
        if name != format!("t{id}") {
            func.value_names.insert(id, name.to_string());
        }
        id
    }

    fn fs(&mut self) -> &mut FuncState {
        self.func.as_mut().expect("inside function")
    }
}

fn expect_word(lx: &mut LineLexer<'_>, msg: &str) -> ParseResult<String> {
    match lx.next().transpose()? {
        Some(Tok::Word(w)) => Ok(w.to_string()),
        _ => Err(msg.to_string()),
    }
}

/// An `@`-sigiled symbol with the sigil stripped.
fn expect_symbol(lx: &mut LineLexer<'_>, msg: &str) -> ParseResult<String> {
    let word = expect_word(lx, msg)?;
    match word.strip_prefix('@') {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(msg.to_string()),
    }
}

fn expect_punct(lx: &mut LineLexer<'_>, want: char, msg: &str) -> ParseResult<()> {
    match lx.next().transpose()? {
        Some(Tok::Punct(c)) if c == want => Ok(()),
        _ => Err(msg.to_string()),
    }
}

fn expect_arrow(lx: &mut LineLexer<'_>) -> ParseResult<()> {
    match lx.next().transpose()? {
        Some(Tok::Arrow) => Ok(()),
        _ => Err("missing '->'".to_string()),
    }
}

fn expect_type(lx: &mut LineLexer<'_>) -> ParseResult<Type> {
    let word = expect_word(lx, "unknown type")?;
    Type::from_mnemonic(&word).ok_or_else(|| "unknown type".to_string())
}

fn expect_end(lx: &mut LineLexer<'_>) -> ParseResult<()> {
    if lx.at_end() {
        Ok(())
    } else {
        Err("trailing tokens".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_module() {
        let m = parse_module(
            "il 0.1.2\n\
             func @main() -> i64 {\n\
             entry:\n\
               %t0 = add 40, 2\n\
               ret %t0\n\
             }\n",
        )
        .unwrap();
        let f = m.function("main").unwrap();
        assert_eq!(f.ret, Type::I64);
        assert_eq!(f.blocks[0].instructions[0].op, Opcode::Add);
        assert_eq!(
            f.blocks[0].instructions[1].operands,
            vec![Value::temp(0)]
        );
        assert!(f.blocks[0].terminated);
    }

    #[test]
    fn missing_header() {
        let err = parse_module("func @main() -> void {\n}\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.message, "missing IL version header");
    }

    #[test]
    fn malformed_function_header() {
        let err = parse_module("il 0.1\nfunc main() -> i64 {\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.message, "malformed function header");
    }

    #[test]
    fn bad_param() {
        let err = parse_module("il 0.1\nfunc @f(%x i64) -> void {\n").unwrap_err();
        assert_eq!(err.to_string(), "line 2: bad param");
    }

    #[test]
    fn missing_arrow() {
        let err = parse_module("il 0.1\nfunc @f() i64 {\n").unwrap_err();
        assert_eq!(err.message, "missing '->'");
    }

    #[test]
    fn unknown_type() {
        let err = parse_module("il 0.1\nfunc @f() -> i128 {\n").unwrap_err();
        assert_eq!(err.message, "unknown type");
    }

    #[test]
    fn instruction_outside_block() {
        let err = parse_module("il 0.1\nfunc @f() -> void {\n  ret\n}\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.message, "instruction outside block");
    }

    #[test]
    fn missing_equals() {
        let err = parse_module(
            "il 0.1\nfunc @f() -> i64 {\nentry:\n  %t0 add 1, 2\n  ret %t0\n}\n",
        )
        .unwrap_err();
        assert_eq!(err.message, "missing '='");
    }

    #[test]
    fn malformed_loc() {
        let err = parse_module(
            "il 0.1\nfunc @f() -> void {\nentry:\n  .loc 1 2\n  ret\n}\n",
        )
        .unwrap_err();
        assert_eq!(err.line, 4);
        assert_eq!(err.message, "malformed .loc directive");
    }

    #[test]
    fn unknown_global() {
        let err = parse_module(
            "il 0.1\nfunc @f() -> str {\nentry:\n  %t0 = const_str @missing\n  ret %t0\n}\n",
        )
        .unwrap_err();
        assert_eq!(err.message, "unknown global");
    }

    #[test]
    fn loc_applies_to_following_instructions() {
        let m = parse_module(
            "il 0.1\n\
             .file 1 \"demo.bas\"\n\
             func @f() -> void {\n\
             entry:\n\
               .loc 1 7 3\n\
               ret\n\
             }\n",
        )
        .unwrap();
        let instr = &m.functions[0].blocks[0].instructions[0];
        assert_eq!(instr.loc, SourceLoc::new(1, 7, 3));
        assert_eq!(m.file_path(1), Some("demo.bas"));
    }

    #[test]
    fn comments_and_blank_lines_skip() {
        let m = parse_module(
            "// header comment\n\
             il 0.1.2\n\
             \n\
             func @f() -> void { // trailing\n\
             entry:\n\
               // inner comment\n\
               ret\n\
             }\n",
        )
        .unwrap();
        assert_eq!(m.functions.len(), 1);
    }

    #[test]
    fn branch_args_parse() {
        let m = parse_module(
            "il 0.1\n\
             func @f(%n: i64) -> i64 {\n\
             entry:\n\
               br loop(%n, 0)\n\
             loop(%i: i64, %acc: i64):\n\
               ret %acc\n\
             }\n",
        )
        .unwrap();
        let f = &m.functions[0];
        let br = &f.blocks[0].instructions[0];
        assert_eq!(br.labels, vec!["loop".to_string()]);
        assert_eq!(br.br_args.len(), 1);
        assert_eq!(br.br_args[0].len(), 2);
        assert_eq!(f.blocks[1].params.len(), 2);
    }
}
