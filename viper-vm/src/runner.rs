//! Step/continue driver over the VM.

use std::io::Write;
use std::time::Instant;

use viper_il::Module;

use crate::error::VmError;
use crate::interpreter::{RunConfig, Vm};
use crate::state::RunStatus;

/// Wraps a [`Vm`] with wall-clock accounting and the optional
/// `[SUMMARY]` record.
pub struct Runner {
    vm: Vm,
    started: Instant,
    summary: bool,
}

impl Runner {
    /// Build a runner entering at `@main`.
    pub fn new(module: Module, config: RunConfig) -> Result<Self, VmError> {
        Ok(Runner {
            vm: Vm::new(module, config)?,
            started: Instant::now(),
            summary: false,
        })
    }

    /// Emit `[SUMMARY] instr=<N> time_ms=<F>` when execution finishes
    /// (`--count --time`).
    pub fn set_summary(&mut self, on: bool) {
        self.summary = on;
    }

    /// The wrapped VM, for sink redirection and debugger access.
    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    /// Execute one instruction.
    pub fn step(&mut self) -> RunStatus {
        self.vm.step()
    }

    /// Run until halt, pause or trap, emitting the summary on completion.
    pub fn continue_run(&mut self) -> RunStatus {
        let status = self.vm.continue_run();
        if self.summary && !matches!(status, RunStatus::Paused(_)) {
            let elapsed = self.started.elapsed().as_secs_f64() * 1000.0;
            let record = format!(
                "[SUMMARY] instr={} time_ms={:.3}\n",
                self.vm.steps(),
                elapsed
            );
            let _ = self.vm.control.write_all(record.as_bytes());
            let _ = self.vm.control.flush();
        }
        status
    }
}
