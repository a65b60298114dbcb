//! Testing utilities: run IL text in-process and capture every channel.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use viper_il::text::parse_module;

use crate::interpreter::{RunConfig, Vm};
use crate::runner::Runner;
use crate::state::RunStatus;

/// Shared grow-only byte sink handed to the VM as stdout/control.
#[derive(Debug, Default, Clone)]
pub struct CaptureBuf(Rc<RefCell<Vec<u8>>>);

impl CaptureBuf {
    /// The captured bytes as lossy UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for CaptureBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Everything observable from one run.
pub struct RunOutcome {
    /// Final status.
    pub status: RunStatus,
    /// Captured program output.
    pub stdout: String,
    /// Captured debug/trace/trap records.
    pub control: String,
}

/// Parse and run IL text to completion with default configuration.
pub fn run_il(text: &str) -> RunOutcome {
    run_il_with(text, RunConfig::default(), |_| {})
}

/// Parse and run IL text with a custom configuration and a setup hook for
/// breakpoints, watches or input.
pub fn run_il_with(
    text: &str,
    config: RunConfig,
    setup: impl FnOnce(&mut Vm),
) -> RunOutcome {
    let module = parse_module(text).expect("test IL parses");
    let mut runner = Runner::new(module, config).expect("entry function exists");
    let stdout = CaptureBuf::default();
    let control = CaptureBuf::default();
    runner.vm_mut().set_stdout(Box::new(stdout.clone()));
    runner.vm_mut().set_control(Box::new(control.clone()));
    setup(runner.vm_mut());
    let status = runner.continue_run();
    RunOutcome {
        status,
        stdout: stdout.contents(),
        control: control.contents(),
    }
}

/// Like [`run_il_with`], but returns the runner paused at the first debug
/// event for resume-style tests.
pub fn start_il(
    text: &str,
    config: RunConfig,
    setup: impl FnOnce(&mut Vm),
) -> (Runner, CaptureBuf, CaptureBuf, RunStatus) {
    let module = parse_module(text).expect("test IL parses");
    let mut runner = Runner::new(module, config).expect("entry function exists");
    let stdout = CaptureBuf::default();
    let control = CaptureBuf::default();
    runner.vm_mut().set_stdout(Box::new(stdout.clone()));
    runner.vm_mut().set_control(Box::new(control.clone()));
    setup(runner.vm_mut());
    let status = runner.continue_run();
    (runner, stdout, control, status)
}
