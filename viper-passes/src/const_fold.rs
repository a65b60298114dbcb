//! Constant folding.
//!
//! Single in-place pass: an instruction whose operands are all literals and
//! whose operation cannot trap at compile time is deleted and its result
//! substituted with the computed literal. Operations that would trap
//! (checked overflow, zero divisors) are left for the VM to execute.

use std::collections::HashMap;

use viper_il::{Function, Module, Opcode, TempId, Value};

use crate::Cfg;

/// Fold trivial constant computations in `m`.
pub fn const_fold(m: &mut Module) {
    let mut folded = 0usize;
    for f in &mut m.functions {
        folded += fold_function(f);
    }
    tracing::debug!(folded, "const fold complete");
}

fn fold_function(f: &mut Function) -> usize {
    // Visit blocks in reverse post-order so definitions fold before their
    // uses in dominated blocks, then sweep unreachable blocks.
    let cfg = Cfg::new(f);
    let mut order = cfg.reverse_post_order();
    order.extend((0..f.blocks.len()).filter(|&b| !cfg.is_reachable(b)));

    let mut constants: HashMap<TempId, Value> = HashMap::new();
    let mut folded = 0usize;
    for &bi in &order {
        let block = &mut f.blocks[bi];
        block.instructions.retain_mut(|instr| {
            for v in instr
                .operands
                .iter_mut()
                .chain(instr.br_args.iter_mut().flatten())
            {
                if let Value::Temp(id) = v {
                    if let Some(c) = constants.get(id) {
                        *v = c.clone();
                    }
                }
            }
            let Some(result) = instr.result else {
                return true;
            };
            match fold_instr(instr.op, instr.callee.as_deref(), &instr.operands) {
                Some(literal) => {
                    constants.insert(result, literal);
                    folded += 1;
                    false
                }
                None => true,
            }
        });
    }
    folded
}

/// Compute the literal result, or `None` when the operation is not
/// foldable (non-literal operands, would-trap, or unsupported opcode).
fn fold_instr(op: Opcode, callee: Option<&str>, operands: &[Value]) -> Option<Value> {
    use Opcode::*;

    let int = |i: usize| operands.get(i).and_then(Value::as_const_int);
    let float = |i: usize| operands.get(i).and_then(Value::as_const_float);
    let bool_lit = |b: bool| Value::ConstInt(b as i64);

    Some(match op {
        Add => Value::ConstInt(int(0)?.wrapping_add(int(1)?)),
        Sub => Value::ConstInt(int(0)?.wrapping_sub(int(1)?)),
        Mul => Value::ConstInt(int(0)?.wrapping_mul(int(1)?)),
        IAddOvf => Value::ConstInt(int(0)?.checked_add(int(1)?)?),
        ISubOvf => Value::ConstInt(int(0)?.checked_sub(int(1)?)?),
        IMulOvf => Value::ConstInt(int(0)?.checked_mul(int(1)?)?),
        SDivChk0 => Value::ConstInt(int(0)?.checked_div(int(1)?)?),
        SRemChk0 => Value::ConstInt(int(0)?.checked_rem(int(1)?)?),
        UDivChk0 => {
            let b = int(1)?;
            if b == 0 {
                return None;
            }
            Value::ConstInt(((int(0)? as u64) / (b as u64)) as i64)
        }
        URemChk0 => {
            let b = int(1)?;
            if b == 0 {
                return None;
            }
            Value::ConstInt(((int(0)? as u64) % (b as u64)) as i64)
        }
        And => Value::ConstInt(int(0)? & int(1)?),
        Or => Value::ConstInt(int(0)? | int(1)?),
        Xor => Value::ConstInt(int(0)? ^ int(1)?),
        Shl => Value::ConstInt(int(0)?.wrapping_shl(int(1)? as u32 & 63)),
        LShr => Value::ConstInt(((int(0)? as u64) >> (int(1)? as u32 & 63)) as i64),
        AShr => Value::ConstInt(int(0)? >> (int(1)? as u32 & 63)),
        ICmpEq => bool_lit(int(0)? == int(1)?),
        ICmpNe => bool_lit(int(0)? != int(1)?),
        SCmpLt => bool_lit(int(0)? < int(1)?),
        SCmpLe => bool_lit(int(0)? <= int(1)?),
        SCmpGt => bool_lit(int(0)? > int(1)?),
        SCmpGe => bool_lit(int(0)? >= int(1)?),
        UCmpLt => bool_lit((int(0)? as u64) < (int(1)? as u64)),
        UCmpLe => bool_lit((int(0)? as u64) <= (int(1)? as u64)),
        UCmpGt => bool_lit((int(0)? as u64) > (int(1)? as u64)),
        UCmpGe => bool_lit((int(0)? as u64) >= (int(1)? as u64)),
        FAdd => Value::ConstFloat(float(0)? + float(1)?),
        FSub => Value::ConstFloat(float(0)? - float(1)?),
        FMul => Value::ConstFloat(float(0)? * float(1)?),
        FDiv => Value::ConstFloat(float(0)? / float(1)?),
        FCmpEq => bool_lit(float(0)? == float(1)?),
        FCmpNe => bool_lit(float(0)? != float(1)?),
        FCmpLt => bool_lit(float(0)? < float(1)?),
        FCmpLe => bool_lit(float(0)? <= float(1)?),
        FCmpGt => bool_lit(float(0)? > float(1)?),
        FCmpGe => bool_lit(float(0)? >= float(1)?),
        Sitofp => Value::ConstFloat(int(0)? as f64),
        Zext1 => Value::ConstInt(int(0)?),
        Trunc1 => Value::ConstInt(int(0)? & 1),
        Call => match callee? {
            "rt_abs_i64" => {
                let v = int(0)?;
                if v == i64::MIN {
                    return None;
                }
                Value::ConstInt(v.abs())
            }
            "rt_abs_f64" => Value::ConstFloat(float(0)?.abs()),
            _ => return None,
        },
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify_module;
    use viper_il::text::{parse_module, print_module};

    fn fold(text: &str) -> Module {
        let mut m = parse_module(text).unwrap();
        verify_module(&m).unwrap();
        const_fold(&mut m);
        verify_module(&m).expect("const fold must preserve well-formedness");
        m
    }

    #[test]
    fn folds_arithmetic_chain() {
        let m = fold(
            "il 0.1\n\
             func @main() -> i64 {\n\
             entry:\n\
               %t0 = add 40, 2\n\
               %t1 = mul %t0, 2\n\
               ret %t1\n\
             }\n",
        );
        let block = &m.functions[0].blocks[0];
        assert_eq!(block.instructions.len(), 1);
        assert_eq!(block.instructions[0].operands, vec![Value::ConstInt(84)]);
    }

    #[test]
    fn leaves_trapping_operations_alone() {
        let src = "il 0.1\n\
             func @main() -> i64 {\n\
             entry:\n\
               %t0 = sdiv.chk0 1, 0\n\
               %t1 = iadd.ovf 9223372036854775807, 1\n\
               %t2 = add %t0, %t1\n\
               ret %t2\n\
             }\n";
        let m = fold(src);
        assert_eq!(m.functions[0].blocks[0].instructions.len(), 4);
    }

    #[test]
    fn folds_compares_to_i1() {
        let m = fold(
            "il 0.1\n\
             func @main() -> i64 {\n\
             entry:\n\
               %c = scmp_lt 1, 2\n\
               cbr %c, yes, no\n\
             yes:\n\
               ret 1\n\
             no:\n\
               ret 0\n\
             }\n",
        );
        let term = m.functions[0].blocks[0].terminator().unwrap();
        assert_eq!(term.operands, vec![Value::ConstInt(1)]);
    }

    #[test]
    fn float_folding_keeps_ieee_semantics() {
        let m = fold(
            "il 0.1\n\
             func @main() -> f64 {\n\
             entry:\n\
               %t0 = fdiv 1.0, 0.0\n\
               ret %t0\n\
             }\n",
        );
        let ret = &m.functions[0].blocks[0].instructions[0];
        assert_eq!(
            ret.operands[0].as_const_float().unwrap(),
            f64::INFINITY
        );
    }

    #[test]
    fn idempotent() {
        let src = "il 0.1\n\
             func @main() -> i64 {\n\
             entry:\n\
               %t0 = add 40, 2\n\
               %t1 = srem.chk0 %t0, 0\n\
               ret %t1\n\
             }\n";
        let mut m = parse_module(src).unwrap();
        const_fold(&mut m);
        let once = print_module(&m);
        const_fold(&mut m);
        assert_eq!(print_module(&m), once);
    }
}
