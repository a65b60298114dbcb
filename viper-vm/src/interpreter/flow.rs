//! Control transfer: branches, returns, calls and tail calls.

use std::rc::Rc;

use viper_il::{Instr, Opcode, TrapKind, Value};
use viper_rt::string::string_ref;

use super::{ExecResult, Frame, Vm};
use crate::bridge;
use crate::slot::Slot;
use crate::state::StepOutcome;

/// `br` and `cbr`.
pub(super) fn branch(vm: &mut Vm, instr: &Instr) -> ExecResult {
    let edge = if instr.op == Opcode::CBr {
        if vm.eval(&instr.operands[0])?.as_i64() != 0 {
            0
        } else {
            1
        }
    } else {
        0
    };
    branch_to(vm, instr, edge)
}

/// Evaluate every branch argument in the current frame, then commit them
/// to the destination block's parameters in one transactional step.
fn branch_to(vm: &mut Vm, instr: &Instr, edge: usize) -> ExecResult {
    let module = Rc::clone(&vm.module);
    let frame = vm.frames.last().expect("active frame");
    let func = &module.functions[frame.func];
    let label = &instr.labels[edge];
    let Some(target) = func.block_index(label) else {
        return Err(vm.trap_here(
            TrapKind::InvalidOperation,
            format!("unknown branch target '{label}'"),
        ));
    };
    let params = &func.blocks[target].params;
    let args: &[Value] = instr.br_args.get(edge).map_or(&[], |a| a.as_slice());
    if args.len() != params.len() {
        return Err(vm.trap_here(
            TrapKind::InvalidOperation,
            format!(
                "branch argument count mismatch in @{}: expected {}, got {}, target '{label}'",
                func.name,
                params.len(),
                args.len()
            ),
        ));
    }

    // Pre-commit evaluation: a target parameter shadowing a source temp
    // still reads the pre-branch value.
    let mut scratch = Vec::with_capacity(args.len());
    for arg in args {
        let slot = vm.eval(arg)?;
        if let Slot::Str(h) = slot {
            string_ref(h);
        }
        scratch.push(slot);
    }
    for (param, slot) in params.iter().zip(scratch) {
        vm.store_owned(param.id, slot);
    }
    let frame = vm.frames.last_mut().expect("active frame");
    frame.block = target;
    frame.ip = 0;
    Ok(StepOutcome::Redirected)
}

/// `ret`: pop the frame and hand the value to the caller.
pub(super) fn ret(vm: &mut Vm, instr: &Instr) -> ExecResult {
    let value = match instr.operands.first() {
        Some(v) => Some(vm.eval(v)?),
        None => None,
    };
    // The value may live in a register this frame is about to release.
    if let Some(Slot::Str(h)) = value {
        string_ref(h);
    }
    let mut frame = vm.frames.pop().expect("active frame");
    vm.memory.restore(frame.saved_sp);
    let ret_to = frame.ret_to;
    frame.release_strings();

    if vm.frames.is_empty() {
        return Ok(StepOutcome::Halted(value));
    }
    match (ret_to, value) {
        (Some(id), Some(slot)) => vm.store_owned(id, slot),
        (None, Some(Slot::Str(h))) => viper_rt::string::string_unref(h),
        _ => {}
    }
    Ok(StepOutcome::Redirected)
}

/// The `trap` terminator.
pub(super) fn trap_op(vm: &mut Vm, _instr: &Instr) -> ExecResult {
    Err(vm.trap_here(TrapKind::InvalidOperation, "trap instruction executed"))
}

/// `call`: IL functions push (or reuse) a frame; externs route through
/// the runtime bridge.
pub(super) fn call(vm: &mut Vm, instr: &Instr) -> ExecResult {
    let callee = instr.callee.as_deref().unwrap_or("");

    let mut args = Vec::with_capacity(instr.operands.len());
    for v in &instr.operands {
        args.push(vm.eval(v)?);
    }

    let Some(&fidx) = vm.fn_index.get(callee) else {
        let result = bridge::dispatch(vm, callee, &args, instr)?;
        if let Some(slot) = result {
            vm.store_result(instr, slot);
        }
        return Ok(StepOutcome::Continue);
    };

    let module = Rc::clone(&vm.module);
    let func = &module.functions[fidx];
    if args.len() != func.params.len() {
        return Err(vm.trap_here(
            TrapKind::InvalidOperation,
            format!(
                "@{callee}: expected {} argument(s), got {}",
                func.params.len(),
                args.len()
            ),
        ));
    }

    // The argument slots must survive the caller's registers: for a tail
    // call those registers are released before the callee is seeded.
    for slot in &args {
        if let Slot::Str(h) = slot {
            string_ref(*h);
        }
    }

    if is_tail_call(vm, instr, fidx) {
        // Reuse the current frame: same stack watermark, same return
        // plumbing, no stack growth.
        let frame = vm.frames.last_mut().expect("active frame");
        let saved_sp = frame.saved_sp;
        frame.release_strings();
        frame.func = fidx;
        frame.block = 0;
        frame.ip = 0;
        frame.regs = vec![Slot::default(); func.next_temp as usize];
        vm.memory.restore(saved_sp);
    } else {
        // Resume after the call once the callee returns.
        let saved_sp = vm.memory.sp();
        vm.frames.last_mut().expect("active frame").ip += 1;
        vm.frames.push(Frame {
            func: fidx,
            block: 0,
            ip: 0,
            regs: vec![Slot::default(); func.next_temp as usize],
            saved_sp,
            ret_to: instr.result,
        });
    }
    for (param, slot) in func.params.iter().zip(args) {
        vm.store_owned(param.id, slot);
    }
    Ok(StepOutcome::Redirected)
}

/// A call is a tail call when the instruction after it returns exactly
/// the call's result (or nothing, for void calls) and the callee's return
/// type matches the caller's.
fn is_tail_call(vm: &Vm, instr: &Instr, callee_idx: usize) -> bool {
    let frame = vm.frames.last().expect("active frame");
    let caller = &vm.module.functions[frame.func];
    let callee = &vm.module.functions[callee_idx];
    if caller.ret != callee.ret {
        return false;
    }
    let block = &caller.blocks[frame.block];
    let Some(next) = block.instructions.get(frame.ip + 1) else {
        return false;
    };
    if next.op != Opcode::Ret {
        return false;
    }
    match (next.operands.first(), instr.result) {
        (None, None) => true,
        (Some(Value::Temp(id)), Some(result)) => *id == result,
        _ => false,
    }
}
