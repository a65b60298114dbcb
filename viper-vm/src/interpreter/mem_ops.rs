//! Memory opcodes: `alloca`, `load`, `store`, `gep` and the constant
//! producers.

use viper_il::{Instr, Opcode, TrapKind, Type, Value};
use viper_rt::string::RtString;

use super::{ExecResult, Vm};
use crate::slot::Slot;
use crate::state::StepOutcome;

pub(super) fn memory_op(vm: &mut Vm, instr: &Instr) -> ExecResult {
    use Opcode::*;
    let slot = match instr.op {
        Alloca => {
            let size = vm.eval(&instr.operands[0])?.as_i64();
            let addr = vm
                .memory
                .alloca(size)
                .map_err(|f| vm.trap_here(TrapKind::InvalidOperation, "").from_mem(f))?;
            Slot::Ptr(addr)
        }
        Load => {
            let addr = vm.eval(&instr.operands[0])?.as_ptr();
            load_typed(vm, addr, instr.ty)?
        }
        Store => {
            let addr = vm.eval(&instr.operands[0])?.as_ptr();
            let value = vm.eval(&instr.operands[1])?;
            store_typed(vm, addr, instr.ty, value)?;
            return Ok(StepOutcome::Continue);
        }
        Gep => {
            let base = vm.eval(&instr.operands[0])?.as_ptr();
            let offset = vm.eval(&instr.operands[1])?.as_i64();
            let addr = base.checked_add_signed(offset).ok_or_else(|| {
                vm.trap_here(TrapKind::Bounds, "gep: address overflow")
            })?;
            Slot::Ptr(addr)
        }
        AddrOf => {
            // The operand is a global reference; eval resolves its address.
            vm.eval(&instr.operands[0])?
        }
        ConstStr => match &instr.operands[0] {
            Value::GlobalRef(name) => match vm.globals.get(name) {
                Some(g) => Slot::Str(g.literal),
                None => {
                    return Err(vm.trap_here(
                        TrapKind::InvalidOperation,
                        format!("unknown global '@{name}'"),
                    ));
                }
            },
            _ => {
                return Err(
                    vm.trap_here(TrapKind::InvalidOperation, "const_str without a global")
                );
            }
        },
        ConstNull => Slot::Ptr(0),
        _ => unreachable!("routed by handler_for"),
    };
    vm.store_result(instr, slot);
    Ok(StepOutcome::Continue)
}

fn load_typed(vm: &mut Vm, addr: u64, ty: Type) -> Result<Slot, crate::error::TrapError> {
    let size = ty.slot_size().unwrap_or(8);
    let site = vm.trap_here(TrapKind::Bounds, "");
    let bytes = vm.memory.read(addr, size).map_err(|f| site.from_mem(f))?;
    Ok(match ty {
        Type::I1 => Slot::I64((bytes[0] != 0) as i64),
        Type::I16 => Slot::I64(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
        Type::I32 => {
            Slot::I64(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64)
        }
        Type::I64 => Slot::I64(i64::from_le_bytes(bytes.try_into().expect("8 bytes"))),
        Type::F64 => Slot::F64(f64::from_le_bytes(bytes.try_into().expect("8 bytes"))),
        Type::Str => {
            let bits = u64::from_le_bytes(bytes.try_into().expect("8 bytes"));
            Slot::Str(bits as usize as RtString)
        }
        _ => Slot::Ptr(u64::from_le_bytes(bytes.try_into().expect("8 bytes"))),
    })
}

fn store_typed(
    vm: &mut Vm,
    addr: u64,
    ty: Type,
    value: Slot,
) -> Result<(), crate::error::TrapError> {
    let site = vm.trap_here(TrapKind::Bounds, "");
    let bytes: Vec<u8> = match ty {
        Type::I1 => vec![(value.as_i64() != 0) as u8],
        Type::I16 => (value.as_i64() as i16).to_le_bytes().to_vec(),
        Type::I32 => (value.as_i64() as i32).to_le_bytes().to_vec(),
        Type::I64 => value.as_i64().to_le_bytes().to_vec(),
        Type::F64 => value.as_f64().to_le_bytes().to_vec(),
        // Handles and pointers store their raw 64-bit payload; memory does
        // not participate in reference counting.
        Type::Str => (value.as_str_handle() as usize as u64).to_le_bytes().to_vec(),
        _ => value.as_ptr().to_le_bytes().to_vec(),
    };
    vm.memory.write(addr, &bytes).map_err(|f| site.from_mem(f))
}
