//! Deterministic IL serializer.
//!
//! Output is stable for a given module: blocks in source order, temps
//! printed as `%t<id>` unless an explicit spelling was recorded, and float
//! literals in canonical form so `parse(print(m))` reproduces `m`.

use core::fmt::Write;

use itertools::Itertools;

use crate::text::format_float;
use crate::{Function, Instr, Module, Opcode, SourceLoc, Type, Value};

/// Serialize a module to IL text.
pub fn print_module(m: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "il {}", m.version);
    for (id, path) in &m.files {
        let _ = writeln!(out, ".file {id} \"{}\"", escape(path.as_bytes()));
    }
    for e in &m.externs {
        let params = e.params.iter().map(Type::mnemonic).join(", ");
        let _ = writeln!(out, "extern @{}({}) -> {}", e.name, params, e.ret);
    }
    for g in &m.globals {
        let konst = if g.is_const { "const " } else { "" };
        let _ = writeln!(
            out,
            "global {konst}{} @{} = \"{}\"",
            g.ty,
            g.name,
            escape(&g.init)
        );
    }
    for f in &m.functions {
        print_function(&mut out, f);
    }
    out
}

fn print_function(out: &mut String, f: &Function) {
    let params = f
        .params
        .iter()
        .map(|p| format!("%{}: {}", p.name, p.ty))
        .join(", ");
    let _ = writeln!(out, "func @{}({}) -> {} {{", f.name, params, f.ret);
    for block in &f.blocks {
        if block.params.is_empty() {
            let _ = writeln!(out, "{}:", block.label);
        } else {
            let params = block
                .params
                .iter()
                .map(|p| format!("%{}: {}", p.name, p.ty))
                .join(", ");
            let _ = writeln!(out, "{}({}):", block.label, params);
        }
        let mut last_loc = SourceLoc::UNKNOWN;
        for instr in &block.instructions {
            if !instr.loc.is_unknown() && instr.loc != last_loc {
                let _ = writeln!(
                    out,
                    "  .loc {} {} {}",
                    instr.loc.file_id, instr.loc.line, instr.loc.col
                );
                last_loc = instr.loc;
            }
            let _ = writeln!(out, "  {}", render_instr(f, instr));
        }
    }
    out.push_str("}\n");
}

/// Render one instruction in canonical operand order.
pub fn render_instr(f: &Function, instr: &Instr) -> String {
    use Opcode::*;
    let mut s = String::new();
    if let Some(id) = instr.result {
        let _ = write!(s, "%{} = ", f.temp_name(id));
    }
    let _ = write!(s, "{}", instr.op.mnemonic());
    match instr.op {
        Load => {
            let _ = write!(s, " {}, {}", instr.ty, value(f, &instr.operands[0]));
        }
        Store => {
            let _ = write!(
                s,
                " {}, {}, {}",
                instr.ty,
                value(f, &instr.operands[0]),
                value(f, &instr.operands[1])
            );
        }
        CastUiNarrowChk => {
            let _ = write!(s, " {} -> {}", value(f, &instr.operands[0]), instr.ty);
        }
        Br => {
            let _ = write!(s, " {}", edge(f, &instr.labels[0], &instr.br_args[0]));
        }
        CBr => {
            let _ = write!(
                s,
                " {}, {}, {}",
                value(f, &instr.operands[0]),
                edge(f, &instr.labels[0], &instr.br_args[0]),
                edge(f, &instr.labels[1], &instr.br_args[1])
            );
        }
        Call => {
            let callee = instr.callee.as_deref().unwrap_or("?");
            let args = instr.operands.iter().map(|v| value(f, v)).join(", ");
            let _ = write!(s, " @{callee}({args})");
            if instr.ty != Type::Void {
                let _ = write!(s, " -> {}", instr.ty);
            }
        }
        _ => {
            if !instr.operands.is_empty() {
                let args = instr.operands.iter().map(|v| value(f, v)).join(", ");
                let _ = write!(s, " {args}");
            }
        }
    }
    s
}

fn edge(f: &Function, label: &str, args: &[Value]) -> String {
    if args.is_empty() {
        label.to_string()
    } else {
        format!("{label}({})", args.iter().map(|v| value(f, v)).join(", "))
    }
}

fn value(f: &Function, v: &Value) -> String {
    match v {
        Value::Temp(id) => format!("%{}", f.temp_name(*id)),
        Value::ConstInt(i) => i.to_string(),
        Value::ConstFloat(x) => float_literal(*x),
        Value::GlobalRef(name) => format!("@{name}"),
        Value::Null => "null".to_string(),
    }
}

/// Float literal that stays lexically a float, so the parser does not read
/// it back as an integer constant.
fn float_literal(v: f64) -> String {
    let s = format_float(v);
    if s.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        format!("{s}.0")
    } else {
        s
    }
}

fn escape(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::parse_module;

    const CANONICAL: &str = "il 0.1.2\n\
.file 1 \"demo.bas\"\n\
extern @rt_print_str(str) -> void\n\
global const str @.L0 = \"hi\\n\"\n\
func @main() -> i64 {\n\
entry:\n\
  .loc 1 1 1\n\
  %t0 = const_str @.L0\n\
  call @rt_print_str(%t0)\n\
  %t1 = add 40, 2\n\
  cbr 1, done(%t1), more\n\
more:\n\
  %t2 = fadd 0.5, -0.0\n\
  %t3 = cast.fp_to_si.rte.chk %t2\n\
  br done(%t3)\n\
done(%v: i64):\n\
  ret %v\n\
}\n";

    #[test]
    fn round_trip_is_identity() {
        let m = parse_module(CANONICAL).unwrap();
        let printed = print_module(&m);
        assert_eq!(printed, CANONICAL);
        let reparsed = parse_module(&printed).unwrap();
        assert_eq!(print_module(&reparsed), printed);
    }

    #[test]
    fn float_literals_stay_floats() {
        assert_eq!(float_literal(42.0), "42.0");
        assert_eq!(float_literal(-0.0), "-0.0");
        assert_eq!(float_literal(1e20), "1e+20");
        assert_eq!(float_literal(f64::NAN), "NaN");
    }
}
