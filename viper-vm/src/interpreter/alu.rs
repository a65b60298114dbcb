//! Integer, float and cast handlers.

use viper_il::{Instr, Opcode, TrapKind, Type};

use super::{ExecResult, Vm};
use crate::slot::Slot;
use crate::state::StepOutcome;

/// All two-operand integer opcodes, comparisons included.
pub(super) fn int_binop(vm: &mut Vm, instr: &Instr) -> ExecResult {
    use Opcode::*;
    let a = vm.eval(&instr.operands[0])?.as_i64();
    let b = vm.eval(&instr.operands[1])?.as_i64();

    let div_by_zero =
        |vm: &Vm| vm.trap_here(TrapKind::DivideByZero, format!("divide by zero in {}", instr.op.mnemonic()));
    let overflow = |vm: &Vm| vm.trap_here(TrapKind::Overflow, "");

    let result = match instr.op {
        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Mul => a.wrapping_mul(b),
        IAddOvf => a.checked_add(b).ok_or_else(|| overflow(vm))?,
        ISubOvf => a.checked_sub(b).ok_or_else(|| overflow(vm))?,
        IMulOvf => a.checked_mul(b).ok_or_else(|| overflow(vm))?,
        SDivChk0 => {
            if b == 0 {
                return Err(div_by_zero(vm));
            }
            a.checked_div(b).ok_or_else(|| overflow(vm))?
        }
        SRemChk0 => {
            if b == 0 {
                return Err(div_by_zero(vm));
            }
            a.checked_rem(b).ok_or_else(|| overflow(vm))?
        }
        UDivChk0 => {
            if b == 0 {
                return Err(div_by_zero(vm));
            }
            ((a as u64) / (b as u64)) as i64
        }
        URemChk0 => {
            if b == 0 {
                return Err(div_by_zero(vm));
            }
            ((a as u64) % (b as u64)) as i64
        }
        And => a & b,
        Or => a | b,
        Xor => a ^ b,
        Shl => a.wrapping_shl(b as u32 & 63),
        LShr => ((a as u64) >> (b as u32 & 63)) as i64,
        AShr => a >> (b as u32 & 63),
        ICmpEq => (a == b) as i64,
        ICmpNe => (a != b) as i64,
        SCmpLt => (a < b) as i64,
        SCmpLe => (a <= b) as i64,
        SCmpGt => (a > b) as i64,
        SCmpGe => (a >= b) as i64,
        UCmpLt => ((a as u64) < (b as u64)) as i64,
        UCmpLe => ((a as u64) <= (b as u64)) as i64,
        UCmpGt => ((a as u64) > (b as u64)) as i64,
        UCmpGe => ((a as u64) >= (b as u64)) as i64,
        _ => unreachable!("routed by handler_for"),
    };
    vm.store_result(instr, Slot::I64(result));
    Ok(StepOutcome::Continue)
}

/// `fadd`/`fsub`/`fmul`/`fdiv`: IEEE semantics, never traps.
pub(super) fn float_arith(vm: &mut Vm, instr: &Instr) -> ExecResult {
    use Opcode::*;
    let a = vm.eval(&instr.operands[0])?.as_f64();
    let b = vm.eval(&instr.operands[1])?.as_f64();
    let result = match instr.op {
        FAdd => a + b,
        FSub => a - b,
        FMul => a * b,
        FDiv => a / b,
        _ => unreachable!("routed by handler_for"),
    };
    vm.store_result(instr, Slot::F64(result));
    Ok(StepOutcome::Continue)
}

/// Float comparisons produce i1; NaN compares false except `fcmp_ne`.
pub(super) fn float_compare(vm: &mut Vm, instr: &Instr) -> ExecResult {
    use Opcode::*;
    let a = vm.eval(&instr.operands[0])?.as_f64();
    let b = vm.eval(&instr.operands[1])?.as_f64();
    let result = match instr.op {
        FCmpEq => a == b,
        FCmpNe => a != b,
        FCmpLt => a < b,
        FCmpLe => a <= b,
        FCmpGt => a > b,
        FCmpGe => a >= b,
        _ => unreachable!("routed by handler_for"),
    };
    vm.store_result(instr, Slot::I64(result as i64));
    Ok(StepOutcome::Continue)
}

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

fn round_ties_even(x: f64) -> f64 {
    let below = x.floor();
    let diff = x - below;
    if diff > 0.5 {
        below + 1.0
    } else if diff < 0.5 {
        below
    } else if below.rem_euclid(2.0) == 0.0 {
        below
    } else {
        below + 1.0
    }
}

/// Conversions between the numeric types.
pub(super) fn cast(vm: &mut Vm, instr: &Instr) -> ExecResult {
    use Opcode::*;
    let operand = vm.eval(&instr.operands[0])?;
    let slot = match instr.op {
        Sitofp => Slot::F64(operand.as_i64() as f64),
        // Unchecked: saturating truncation toward zero.
        Fptosi => Slot::I64(operand.as_f64() as i64),
        CastFpToSiRteChk => {
            let x = operand.as_f64();
            if x.is_nan() {
                return Err(vm.trap_here(TrapKind::InvalidCast, ""));
            }
            let r = round_ties_even(x);
            if !(-TWO_POW_63..TWO_POW_63).contains(&r) {
                return Err(vm.trap_here(TrapKind::InvalidCast, ""));
            }
            Slot::I64(r as i64)
        }
        CastUiNarrowChk => {
            let v = operand.as_i64() as u64;
            let limit: u64 = match instr.ty {
                Type::I16 => 1 << 16,
                _ => 1 << 32,
            };
            if v >= limit {
                return Err(vm.trap_here(TrapKind::Overflow, ""));
            }
            Slot::I64(v as i64)
        }
        Zext1 => Slot::I64(operand.as_i64() & 1),
        Trunc1 => Slot::I64(operand.as_i64() & 1),
        _ => unreachable!("routed by handler_for"),
    };
    vm.store_result(instr, slot);
    Ok(StepOutcome::Continue)
}
