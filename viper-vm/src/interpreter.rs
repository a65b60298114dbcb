//! The tree-walking interpreter.
//!
//! A stack of [`Frame`]s, each holding a slot array indexed by temp id.
//! The IR is interpreted directly; there is no bytecode. Every step first
//! consults the debug layer, then the interrupt machinery, then executes
//! one instruction through the selected dispatch strategy.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use viper_il::{Instr, Module, Opcode, SourceLoc, TempId, TrapKind, Value};
use viper_rt::string::{string_literal, string_ref, string_unref, RtString};

use crate::debug::Debugger;
use crate::error::{TrapError, VmError};
use crate::memory::Memory;
use crate::slot::Slot;
use crate::state::{DispatchKind, PauseReason, RunStatus, StepOutcome, TraceMode};

mod alu;
mod flow;
mod mem_ops;

/// One call activation: the function, the cursor and the slot array.
#[derive(Debug)]
pub(crate) struct Frame {
    pub func: usize,
    pub block: usize,
    pub ip: usize,
    pub regs: Vec<Slot>,
    /// Stack pointer to restore when this frame pops.
    pub saved_sp: u64,
    /// Caller temp receiving the return value.
    pub ret_to: Option<TempId>,
}

impl Frame {
    fn release_strings(&mut self) {
        for slot in &self.regs {
            if let Slot::Str(h) = slot {
                string_unref(*h);
            }
        }
        self.regs.clear();
    }
}

/// Runner configuration.
pub struct RunConfig {
    /// Dispatch strategy; all three behave identically.
    pub dispatch: DispatchKind,
    /// Trace channel.
    pub trace: TraceMode,
    /// Instruction cap; exceeding it raises `TrapKind::Interrupt`.
    pub max_steps: Option<u64>,
    /// Check the interrupt flag every N instructions in addition to the
    /// per-call checks; 0 checks only at calls.
    pub interrupt_every_n: u64,
    /// Called when the interrupt flag is observed; returning `false`
    /// requests a clean pause instead of an interrupt trap.
    pub poll: Option<Box<dyn FnMut() -> bool>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            dispatch: DispatchKind::default(),
            trace: TraceMode::default(),
            max_steps: None,
            interrupt_every_n: 0,
            poll: None,
        }
    }
}

pub(crate) struct GlobalData {
    pub addr: u64,
    pub literal: RtString,
}

/// The virtual machine: owns the module, the frame stack, linear memory
/// and the debug state.
pub struct Vm {
    pub(crate) module: Rc<Module>,
    pub(crate) fn_index: HashMap<String, usize>,
    pub(crate) globals: HashMap<String, GlobalData>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) memory: Memory,
    pub(crate) debugger: Debugger,
    pub(crate) config: RunConfig,
    pub(crate) steps: u64,
    interrupt: Arc<AtomicBool>,
    pub(crate) stdout: Box<dyn Write>,
    pub(crate) control: Box<dyn Write>,
    pub(crate) stdin: Box<dyn BufRead>,
    last_src: Option<(u32, u32)>,
}

type ExecResult = Result<StepOutcome, TrapError>;
type Handler = fn(&mut Vm, &Instr) -> ExecResult;

impl Vm {
    /// Build a VM over `module`, entering at `@main`.
    pub fn new(module: Module, config: RunConfig) -> Result<Self, VmError> {
        Self::with_entry(module, config, "main")
    }

    /// Build a VM entering at the named function.
    pub fn with_entry(module: Module, config: RunConfig, entry: &str) -> Result<Self, VmError> {
        let module = Rc::new(module);
        let fn_index: HashMap<String, usize> = module
            .functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        let entry_idx = *fn_index
            .get(entry)
            .ok_or_else(|| VmError::UnknownFunction(entry.to_string()))?;
        let entry_fn = &module.functions[entry_idx];
        if !entry_fn.params.is_empty() {
            return Err(VmError::EntryHasParams(entry.to_string()));
        }

        let mut memory = Memory::default();
        let mut globals = HashMap::new();
        for g in &module.globals {
            let addr = memory.place_data(&g.init);
            // The literal handle aliases the module-owned bytes; the Rc
            // keeps them alive for the VM's lifetime.
            let literal = unsafe { string_literal(g.init.as_ptr(), g.init.len()) };
            globals.insert(g.name.clone(), GlobalData { addr, literal });
        }

        let frame = Frame {
            func: entry_idx,
            block: 0,
            ip: 0,
            regs: vec![Slot::default(); entry_fn.next_temp as usize],
            saved_sp: memory.sp(),
            ret_to: None,
        };

        Ok(Vm {
            module,
            fn_index,
            globals,
            frames: vec![frame],
            memory,
            debugger: Debugger::default(),
            config,
            steps: 0,
            interrupt: Arc::new(AtomicBool::new(false)),
            stdout: Box::new(std::io::stdout()),
            control: Box::new(std::io::stderr()),
            stdin: Box::new(std::io::BufReader::new(std::io::stdin())),
            last_src: None,
        })
    }

    /// Redirect program output (`rt_print_*`).
    pub fn set_stdout(&mut self, w: Box<dyn Write>) {
        self.stdout = w;
    }

    /// Redirect debug/trace/trap records (stderr by default).
    pub fn set_control(&mut self, w: Box<dyn Write>) {
        self.control = w;
    }

    /// Redirect program input (`rt_input_line`).
    pub fn set_stdin(&mut self, r: Box<dyn BufRead>) {
        self.stdin = r;
    }

    /// The debug layer.
    pub fn debugger_mut(&mut self) -> &mut Debugger {
        &mut self.debugger
    }

    /// Instructions executed so far.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Shareable interrupt flag; a signal handler stores `true` with
    /// seq-cst ordering.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Schedule a cooperative interrupt before the next check point.
    pub fn request_interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    /// Run until the program halts, pauses or traps.
    pub fn continue_run(&mut self) -> RunStatus {
        loop {
            if let Some(status) = self.step_once() {
                return status;
            }
        }
    }

    /// Execute exactly one instruction.
    pub fn step(&mut self) -> RunStatus {
        self.step_once()
            .unwrap_or(RunStatus::Paused(PauseReason::Step))
    }

    /// One iteration of the dispatch loop; `None` means keep going.
    pub(crate) fn step_once(&mut self) -> Option<RunStatus> {
        let module = Rc::clone(&self.module);
        let Some(frame) = self.frames.last() else {
            // Already halted; repeated runs stay halted.
            return Some(RunStatus::Halted(None));
        };
        let func = &module.functions[frame.func];
        let block = &func.blocks[frame.block];
        let pos = (frame.func, frame.block, frame.ip);
        let Some(instr) = block.instructions.get(frame.ip) else {
            let trap = self.trap_here(
                TrapKind::InvalidOperation,
                "block fell through without a terminator",
            );
            return Some(self.finish_trap(trap));
        };

        // 1. Debug layer: breakpoints and stepping halt before the
        //    instruction executes.
        let block_label = (frame.ip == 0).then(|| block.label.as_str());
        let src = (!instr.loc.is_unknown()).then(|| {
            (
                module.file_path(instr.loc.file_id).unwrap_or("?"),
                instr.loc.line,
            )
        });
        if let Some(reason) = self.debugger.eval(pos, block_label, src, instr.il_line) {
            let record = format!(
                "[BREAK] fn=@{} blk={} reason={}\n",
                func.name,
                block.label,
                reason.token()
            );
            let _ = self.control.write_all(record.as_bytes());
            let _ = self.control.flush();
            let reason = match reason {
                crate::debug::BreakReason::Step => PauseReason::Step,
                _ => PauseReason::Breakpoint,
            };
            return Some(RunStatus::Paused(reason));
        }

        // 2. Interrupt machinery: step cap, then the flag (polled every N
        //    instructions and before calls).
        if let Some(cap) = self.config.max_steps {
            if self.steps >= cap {
                let trap = self.trap_here(TrapKind::Interrupt, format!("max steps exceeded: {cap}"));
                return Some(self.finish_trap(trap));
            }
        }
        let poll_due = (self.config.interrupt_every_n > 0
            && self.steps % self.config.interrupt_every_n == 0)
            || instr.op == Opcode::Call;
        if poll_due && self.interrupt.swap(false, Ordering::SeqCst) {
            if let Some(poll) = self.config.poll.as_mut() {
                if !poll() {
                    return Some(RunStatus::Paused(PauseReason::Poll));
                }
            }
            let trap = self.trap_here(TrapKind::Interrupt, "interrupt requested");
            return Some(self.finish_trap(trap));
        }

        // 3. Trace.
        match self.config.trace {
            TraceMode::Off => {}
            TraceMode::Il => {
                let line = format!(
                    "[IL] fn=@{} blk={} ip=#{} {}\n",
                    func.name,
                    block.label,
                    frame.ip,
                    instr.op.mnemonic()
                );
                let _ = self.control.write_all(line.as_bytes());
            }
            TraceMode::Src => {
                if !instr.loc.is_unknown() {
                    let key = (instr.loc.file_id, instr.loc.line);
                    if self.last_src != Some(key) {
                        self.last_src = Some(key);
                        let file = module.file_path(instr.loc.file_id).unwrap_or("?");
                        let line = format!("[SRC] {}:{}\n", file, instr.loc.line);
                        let _ = self.control.write_all(line.as_bytes());
                    }
                }
            }
        }

        // 4. Execute.
        tracing::trace!(op = instr.op.mnemonic(), fn_ = %func.name, "step");
        self.steps += 1;
        let outcome = self.exec(instr);
        self.debugger.clear_stop(pos);
        match outcome {
            Err(trap) => Some(self.finish_trap(trap)),
            Ok(StepOutcome::Halted(v)) => Some(RunStatus::Halted(v)),
            Ok(StepOutcome::Continue) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.ip += 1;
                }
                self.watch_after(instr);
                None
            }
            Ok(StepOutcome::Redirected) => {
                self.watch_after(instr);
                None
            }
        }
    }

    fn exec(&mut self, instr: &Instr) -> ExecResult {
        match self.config.dispatch {
            // Threaded dispatch needs computed goto; stable Rust has none,
            // so it falls back to the switch loop like the portable build.
            DispatchKind::Switch | DispatchKind::Threaded => handler_for(instr.op)(self, instr),
            DispatchKind::FnTable => {
                let table = handler_table();
                table[instr.op as usize](self, instr)
            }
        }
    }

    /// Emit `[WATCH]` records for a changed watched result.
    fn watch_after(&mut self, instr: &Instr) {
        if self.debugger.watches.is_empty() {
            return;
        }
        let Some(result) = instr.result else { return };
        let module = Rc::clone(&self.module);
        let Some(frame) = self.frames.last() else {
            return;
        };
        let func = &module.functions[frame.func];
        let name = func.temp_name(result);
        if !self.debugger.watches.contains(&name) {
            return;
        }
        let rendered = frame.regs[result as usize].render();
        if self.debugger.watch_values.get(&name) == Some(&rendered) {
            return;
        }
        let record = format!(
            "[WATCH] {name}={}:{rendered}  (fn=@{} blk={} ip=#{})\n",
            instr.ty,
            func.name,
            func.blocks[frame.block].label,
            frame.ip.saturating_sub(1)
        );
        let _ = self.control.write_all(record.as_bytes());
        self.debugger.watch_values.insert(name, rendered);
    }

    /// Evaluate an operand against the current frame.
    pub(crate) fn eval(&self, value: &Value) -> Result<Slot, TrapError> {
        match value {
            Value::Temp(id) => {
                let frame = self.frames.last().expect("active frame");
                Ok(frame.regs[*id as usize])
            }
            Value::ConstInt(v) => Ok(Slot::I64(*v)),
            Value::ConstFloat(v) => Ok(Slot::F64(*v)),
            Value::Null => Ok(Slot::Ptr(0)),
            Value::GlobalRef(name) => match self.globals.get(name) {
                Some(g) => Ok(Slot::Ptr(g.addr)),
                None => Err(self.trap_here(
                    TrapKind::InvalidOperation,
                    format!("unknown global '@{name}'"),
                )),
            },
        }
    }

    /// Store a borrowed slot, retaining string handles.
    pub(crate) fn store_copy(&mut self, id: TempId, slot: Slot) {
        if let Slot::Str(h) = slot {
            string_ref(h);
        }
        self.store_owned(id, slot);
    }

    /// Store a slot whose reference (if any) is transferred to the
    /// register.
    pub(crate) fn store_owned(&mut self, id: TempId, slot: Slot) {
        let frame = self.frames.last_mut().expect("active frame");
        let old = std::mem::replace(&mut frame.regs[id as usize], slot);
        if let Slot::Str(h) = old {
            string_unref(h);
        }
    }

    /// Store an instruction result.
    pub(crate) fn store_result(&mut self, instr: &Instr, slot: Slot) {
        if let Some(id) = instr.result {
            self.store_owned(id, slot);
        }
    }

    /// Print the trap diagnostic (summary line, then the detail line when
    /// the trap carries a message) and wrap it in a status.
    fn finish_trap(&mut self, trap: TrapError) -> RunStatus {
        let mut text = trap.summary_line();
        text.push('\n');
        if let Some(detail) = trap.detail_line() {
            text.push_str(&detail);
            text.push('\n');
        }
        let _ = self.control.write_all(text.as_bytes());
        let _ = self.control.flush();
        RunStatus::Trapped(trap)
    }

    /// Build a trap at the current site.
    pub(crate) fn trap_here(&self, kind: TrapKind, message: impl Into<String>) -> TrapError {
        let (function, block, ip, loc, il_line) = self.site();
        TrapError {
            kind,
            code: 0,
            function,
            block,
            ip,
            loc,
            il_line,
            message: message.into(),
        }
    }

    fn site(&self) -> (String, String, usize, SourceLoc, u32) {
        let Some(frame) = self.frames.last() else {
            return (String::new(), String::new(), 0, SourceLoc::UNKNOWN, 0);
        };
        let func = &self.module.functions[frame.func];
        let block = &func.blocks[frame.block];
        let (loc, il_line) = block
            .instructions
            .get(frame.ip)
            .map_or((SourceLoc::UNKNOWN, 0), |i| (i.loc, i.il_line));
        (
            func.name.clone(),
            block.label.clone(),
            frame.ip,
            loc,
            il_line,
        )
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        for frame in &mut self.frames {
            frame.release_strings();
        }
    }
}

/// Route an opcode to its handler; the single source of truth both
/// dispatch strategies share.
fn handler_for(op: Opcode) -> Handler {
    use Opcode::*;
    match op {
        Add | Sub | Mul | IAddOvf | ISubOvf | IMulOvf | SDivChk0 | UDivChk0 | SRemChk0
        | URemChk0 | And | Or | Xor | Shl | LShr | AShr | ICmpEq | ICmpNe | SCmpLt | SCmpLe
        | SCmpGt | SCmpGe | UCmpLt | UCmpLe | UCmpGt | UCmpGe => alu::int_binop,
        FAdd | FSub | FMul | FDiv => alu::float_arith,
        FCmpEq | FCmpNe | FCmpLt | FCmpLe | FCmpGt | FCmpGe => alu::float_compare,
        Sitofp | Fptosi | CastFpToSiRteChk | CastUiNarrowChk | Zext1 | Trunc1 => alu::cast,
        Alloca | Load | Store | Gep | AddrOf | ConstStr | ConstNull => mem_ops::memory_op,
        Br | CBr => flow::branch,
        Ret => flow::ret,
        Trap => flow::trap_op,
        Call => flow::call,
    }
}

/// Function-pointer table indexed by opcode discriminant.
fn handler_table() -> &'static [Handler] {
    use std::sync::OnceLock;
    use strum::IntoEnumIterator;
    static TABLE: OnceLock<Vec<Handler>> = OnceLock::new();
    TABLE.get_or_init(|| Opcode::iter().map(handler_for).collect())
}
