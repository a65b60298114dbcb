//! Runtime bridge: routes `call @rt_*` instructions to runtime helpers.
//!
//! The registry maps extern names to handlers over the VM's uniform slots.
//! Unknown names trap, arity mismatches trap with the canonical
//! `"<name>: expected N argument(s), got M"` message, and `RtTrap`/`RtError`
//! results translate into VM traps carrying the call site. Print and input
//! helpers run against the VM's own sinks so output is captured and
//! deterministic in tests.

use std::io::Write;

use viper_il::{Instr, TrapKind};
use viper_rt::string;
use viper_rt::{args, convert, io, math, random, term, time, RtError, RtTrap};

use crate::error::TrapError;
use crate::interpreter::Vm;
use crate::slot::Slot;

/// Encode an `RtError` into the `error`-typed slot: kind in the low 32
/// bits, auxiliary code in the high 32.
fn error_slot(e: RtError) -> Slot {
    Slot::I64(((e.code as i64) << 32) | (e.kind as i64))
}

fn site_trap(vm: &Vm, t: RtTrap) -> TrapError {
    let mut err = vm.trap_here(t.kind, "");
    err.message = t.message;
    err
}

fn read_cstr(vm: &mut Vm, addr: u64) -> Result<Vec<u8>, TrapError> {
    let mut out = Vec::new();
    let mut cur = addr;
    loop {
        let site = vm.trap_here(TrapKind::Bounds, "");
        let byte = vm.memory.read(cur, 1).map_err(|f| site.from_mem(f))?[0];
        if byte == 0 {
            return Ok(out);
        }
        out.push(byte);
        cur += 1;
    }
}

/// Invoke the helper registered under `name`.
pub(crate) fn dispatch(
    vm: &mut Vm,
    name: &str,
    slots: &[Slot],
    instr: &Instr,
) -> Result<Option<Slot>, TrapError> {
    let Some(arity) = arity_of(name) else {
        return Err(vm.trap_here(
            TrapKind::InvalidOperation,
            format!("unknown extern: @{name}"),
        ));
    };
    if slots.len() != arity {
        return Err(vm.trap_here(
            TrapKind::InvalidOperation,
            format!(
                "{name}: expected {arity} argument(s), got {}",
                slots.len()
            ),
        ));
    }
    invoke(vm, name, slots, instr)
}

/// Argument count per registered helper; `None` marks an unknown extern.
fn arity_of(name: &str) -> Option<usize> {
    Some(match name {
        "rt_input_line" | "rt_args_count" | "rt_args_clear" | "rt_cmdline" | "rt_rnd"
        | "rt_timer_ms" => 0,
        "rt_print_str" | "rt_print_i64" | "rt_print_f64" | "rt_len" | "rt_string_ref"
        | "rt_string_unref" | "rt_alloc" | "rt_sqrt" | "rt_floor" | "rt_ceil" | "rt_abs_i64"
        | "rt_abs_f64" | "rt_round_even" | "rt_cint_from_double" | "rt_int_floor"
        | "rt_fix_trunc" | "rt_val" | "rt_str_i64" | "rt_str_f64" | "rt_randomize_i64"
        | "rt_sleep_ms" | "rt_args_push" | "rt_args_get" | "rt_str_chr" | "rt_str_asc"
        | "rt_ltrim" | "rt_rtrim" | "rt_trim" | "rt_ucase" | "rt_lcase" | "rt_mid2"
        | "rt_close_err" | "rt_eof_ch" | "rt_line_input_ch_err" | "rt_const_cstr" => 1,
        "rt_concat" | "rt_str_eq" | "rt_left" | "rt_right" | "rt_instr2"
        | "rt_string_from_bytes" | "rt_term_color_i32" | "rt_write_ch_err"
        | "rt_pow_f64_chkdom" => 2,
        "rt_substr" | "rt_mid3" | "rt_instr3" | "rt_open_err_vstr" => 3,
        _ => return None,
    })
}

fn invoke(
    vm: &mut Vm,
    name: &str,
    a: &[Slot],
    _instr: &Instr,
) -> Result<Option<Slot>, TrapError> {
    let str0 = || a.first().map_or(std::ptr::null_mut(), Slot::as_str_handle);
    let out = match name {
        // Console and input.
        "rt_print_str" => {
            io::write_str(&mut vm.stdout, str0());
            let _ = vm.stdout.flush();
            None
        }
        "rt_print_i64" => {
            io::write_i64(&mut vm.stdout, a[0].as_i64());
            let _ = vm.stdout.flush();
            None
        }
        "rt_print_f64" => {
            io::write_f64(&mut vm.stdout, a[0].as_f64());
            let _ = vm.stdout.flush();
            None
        }
        "rt_input_line" => {
            let s = io::input_line_from(&mut vm.stdin).map_err(|t| site_trap(vm, t))?;
            Some(Slot::Str(s))
        }

        // Strings.
        "rt_len" => Some(Slot::I64(string::string_len(str0()))),
        "rt_concat" => Some(Slot::Str(
            string::concat(a[0].as_str_handle(), a[1].as_str_handle())
                .map_err(|t| site_trap(vm, t))?,
        )),
        "rt_substr" => Some(Slot::Str(
            string::substr(str0(), a[1].as_i64(), a[2].as_i64())
                .map_err(|t| site_trap(vm, t))?,
        )),
        "rt_str_eq" => Some(Slot::I64(
            string::str_eq(a[0].as_str_handle(), a[1].as_str_handle()) as i64,
        )),
        "rt_left" => Some(Slot::Str(
            string::left(str0(), a[1].as_i64()).map_err(|t| site_trap(vm, t))?,
        )),
        "rt_right" => Some(Slot::Str(
            string::right(str0(), a[1].as_i64()).map_err(|t| site_trap(vm, t))?,
        )),
        "rt_mid2" => Some(Slot::Str(
            string::mid2(str0(), a[1].as_i64()).map_err(|t| site_trap(vm, t))?,
        )),
        "rt_mid3" => Some(Slot::Str(
            string::mid3(str0(), a[1].as_i64(), a[2].as_i64())
                .map_err(|t| site_trap(vm, t))?,
        )),
        "rt_ltrim" => Some(Slot::Str(string::ltrim(str0()).map_err(|t| site_trap(vm, t))?)),
        "rt_rtrim" => Some(Slot::Str(string::rtrim(str0()).map_err(|t| site_trap(vm, t))?)),
        "rt_trim" => Some(Slot::Str(string::trim(str0()).map_err(|t| site_trap(vm, t))?)),
        "rt_ucase" => Some(Slot::Str(string::ucase(str0()).map_err(|t| site_trap(vm, t))?)),
        "rt_lcase" => Some(Slot::Str(string::lcase(str0()).map_err(|t| site_trap(vm, t))?)),
        "rt_str_chr" => Some(Slot::Str(
            string::chr(a[0].as_i64()).map_err(|t| site_trap(vm, t))?,
        )),
        "rt_str_asc" => Some(Slot::I64(
            string::asc(str0()).map_err(|t| site_trap(vm, t))?,
        )),
        "rt_instr2" => Some(Slot::I64(string::instr2(
            a[0].as_str_handle(),
            a[1].as_str_handle(),
        ))),
        "rt_instr3" => Some(Slot::I64(
            string::instr3(a[0].as_i64(), a[1].as_str_handle(), a[2].as_str_handle())
                .map_err(|t| site_trap(vm, t))?,
        )),
        "rt_string_ref" => {
            string::string_ref(str0());
            None
        }
        "rt_string_unref" => {
            string::string_unref(str0());
            None
        }
        "rt_string_from_bytes" => {
            let addr = a[0].as_ptr();
            let len = a[1].as_i64().max(0) as u64;
            let site = vm.trap_here(TrapKind::Bounds, "");
            let bytes = vm
                .memory
                .read(addr, len)
                .map_err(|f| site.from_mem(f))?
                .to_vec();
            Some(Slot::Str(
                string::string_from_bytes(&bytes).map_err(|t| site_trap(vm, t))?,
            ))
        }
        "rt_const_cstr" => {
            let bytes = read_cstr(vm, a[0].as_ptr())?;
            Some(Slot::Str(
                string::string_from_bytes(&bytes).map_err(|t| site_trap(vm, t))?,
            ))
        }

        // Allocation: VM pointers live in VM linear memory, so the bridge
        // serves rt_alloc from the VM heap region.
        "rt_alloc" => {
            let site = vm.trap_here(TrapKind::OutOfMemory, "");
            viper_rt::alloc::hook_gate(a[0].as_i64()).map_err(|t| site_trap(vm, t))?;
            let addr = vm
                .memory
                .heap_alloc(a[0].as_i64())
                .map_err(|f| site.from_mem(f))?;
            Some(Slot::Ptr(addr))
        }

        // Math and conversions.
        "rt_sqrt" => Some(Slot::F64(math::sqrt(a[0].as_f64()))),
        "rt_floor" => Some(Slot::F64(math::floor(a[0].as_f64()))),
        "rt_ceil" => Some(Slot::F64(math::ceil(a[0].as_f64()))),
        "rt_abs_i64" => Some(Slot::I64(
            math::abs_i64(a[0].as_i64()).map_err(|t| site_trap(vm, t))?,
        )),
        "rt_abs_f64" => Some(Slot::F64(math::abs_f64(a[0].as_f64()))),
        "rt_round_even" => Some(Slot::F64(math::round_even(a[0].as_f64()))),
        "rt_pow_f64_chkdom" => match math::pow_checked(a[0].as_f64(), a[1].as_f64()) {
            Ok(v) => Some(Slot::F64(v)),
            Err(_) => {
                return Err(site_trap(
                    vm,
                    RtTrap::new(TrapKind::DomainError, "rt_pow_f64_chkdom: domain error"),
                ));
            }
        },
        "rt_cint_from_double" => Some(Slot::I64(
            convert::cint_from_double(a[0].as_f64()).map_err(|t| site_trap(vm, t))?,
        )),
        "rt_int_floor" => Some(Slot::I64(
            convert::int_floor(a[0].as_f64()).map_err(|t| site_trap(vm, t))?,
        )),
        "rt_fix_trunc" => Some(Slot::I64(
            convert::fix_trunc(a[0].as_f64()).map_err(|t| site_trap(vm, t))?,
        )),
        "rt_val" => Some(Slot::F64(convert::val(str0()))),
        "rt_str_i64" => Some(Slot::Str(
            convert::str_i64(a[0].as_i64()).map_err(|t| site_trap(vm, t))?,
        )),
        "rt_str_f64" => Some(Slot::Str(
            convert::str_f64(a[0].as_f64()).map_err(|t| site_trap(vm, t))?,
        )),

        // Random and time.
        "rt_randomize_i64" => {
            random::randomize_i64(a[0].as_i64());
            None
        }
        "rt_rnd" => Some(Slot::F64(random::rnd())),
        "rt_sleep_ms" => {
            time::sleep_ms(a[0].as_i64().clamp(i32::MIN as i64, i32::MAX as i64) as i32);
            None
        }
        "rt_timer_ms" => Some(Slot::I64(time::timer_ms())),

        // Program arguments.
        "rt_args_push" => {
            args::args_push(str0());
            None
        }
        "rt_args_count" => Some(Slot::I64(args::args_count())),
        "rt_args_get" => Some(Slot::Str(
            args::args_get(a[0].as_i64()).map_err(|t| site_trap(vm, t))?,
        )),
        "rt_args_clear" => {
            args::args_clear();
            None
        }
        "rt_cmdline" => Some(Slot::Str(args::cmdline().map_err(|t| site_trap(vm, t))?)),

        // Terminal.
        "rt_term_color_i32" => {
            if !term::tty_disabled() {
                if let Some(escape) = term::color_escape(a[0].as_i64() as i32, a[1].as_i64() as i32)
                {
                    let _ = vm.stdout.write_all(escape.as_bytes());
                }
            }
            None
        }

        // File channels: soft errors come back as `error` slots.
        "rt_open_err_vstr" => {
            let path = string::string_bytes(str0()).to_vec();
            Some(error_slot(io::open_channel(&path, a[1].as_i64(), a[2].as_i64())))
        }
        "rt_close_err" => Some(error_slot(io::close_channel(a[0].as_i64()))),
        "rt_write_ch_err" => Some(error_slot(io::write_channel(
            a[0].as_i64(),
            a[1].as_str_handle(),
        ))),
        "rt_line_input_ch_err" => match io::line_input_channel(a[0].as_i64()) {
            Ok(s) => Some(Slot::Str(s)),
            Err(e) => Some(error_slot(e)),
        },
        "rt_eof_ch" => Some(Slot::I64(io::eof_channel(a[0].as_i64()) as i64)),

        _ => unreachable!("filtered by arity_of"),
    };
    Ok(out)
}
