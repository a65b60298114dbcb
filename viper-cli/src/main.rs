//! The `viper` driver binary.
//!
//! Exit codes: 0 clean halt (or the program's in-range return value),
//! 1 uncaught trap or load failure, 2 argument errors, 10 stopped at a
//! breakpoint.

mod cli;

use std::collections::VecDeque;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use viper_il::text::{parse_module, print_module};
use viper_passes::verify_module;
use viper_vm::debug::parse_break_spec;
use viper_vm::{PauseReason, RunConfig, RunStatus, Runner, Slot, TraceMode};

use cli::{preprocess_args, Cli};

const EXIT_TRAP: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_BREAK: u8 = 10;

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let args = preprocess_args(std::env::args());
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    if cli.bounds_checks {
        eprintln!("--bounds-checks is not supported");
        return ExitCode::from(EXIT_USAGE);
    }

    let Some(path) = cli.run.clone().or_else(|| cli.file.clone()) else {
        eprintln!("viper: no input file");
        return ExitCode::from(EXIT_USAGE);
    };

    let source = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("viper: cannot read {}: {e}", path.display());
            return ExitCode::from(EXIT_TRAP);
        }
    };
    let module = match parse_module(&source) {
        Ok(m) => m,
        Err(diag) => {
            eprintln!("{}: {diag}", path.display());
            return ExitCode::from(EXIT_TRAP);
        }
    };
    if let Err(err) = verify_module(&module) {
        eprintln!("{}: {err}", path.display());
        return ExitCode::from(EXIT_TRAP);
    }

    if cli.emit_il || cli.output.is_some() {
        let text = print_module(&module);
        match &cli.output {
            Some(out) => {
                if let Err(e) = std::fs::write(out, text) {
                    eprintln!("viper: cannot write {}: {e}", out.display());
                    return ExitCode::from(EXIT_TRAP);
                }
            }
            None => print!("{text}"),
        }
        return ExitCode::SUCCESS;
    }

    execute(&cli, module, &path)
}

fn execute(cli: &Cli, module: viper_il::Module, path: &Path) -> ExitCode {
    let config = RunConfig {
        trace: match cli.trace.as_deref() {
            Some("il") => TraceMode::Il,
            Some("src") => TraceMode::Src,
            _ => TraceMode::Off,
        },
        max_steps: cli.max_steps,
        ..Default::default()
    };

    let mut runner = match Runner::new(module, config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("viper: {e}");
            return ExitCode::from(EXIT_TRAP);
        }
    };
    runner.set_summary(cli.count && cli.time);

    let il_path = path.to_string_lossy();
    for spec in cli.breaks.iter().chain(&cli.break_src) {
        let bp = parse_break_spec(spec, Some(il_path.as_ref()));
        runner.vm_mut().debugger_mut().add_breakpoint(bp);
    }
    for name in &cli.watch {
        runner.vm_mut().debugger_mut().add_watch(name.clone());
    }

    let mut commands: VecDeque<char> = match &cli.debug_cmds {
        Some(file) => match std::fs::read_to_string(file) {
            Ok(text) => text.chars().filter(|c| matches!(c, 's' | 'c')).collect(),
            Err(e) => {
                eprintln!("viper: cannot read {}: {e}", file.display());
                return ExitCode::from(EXIT_TRAP);
            }
        },
        None => VecDeque::new(),
    };

    let mut status = runner.continue_run();
    loop {
        match status {
            RunStatus::Paused(PauseReason::Breakpoint | PauseReason::Step) => {
                match commands.pop_front() {
                    Some('s') => {
                        runner.vm_mut().debugger_mut().set_single_stepping(true);
                        status = runner.continue_run();
                    }
                    Some('c') => {
                        runner.vm_mut().debugger_mut().set_single_stepping(false);
                        status = runner.continue_run();
                    }
                    _ => return ExitCode::from(EXIT_BREAK),
                }
            }
            RunStatus::Paused(PauseReason::Poll) => return ExitCode::from(EXIT_BREAK),
            RunStatus::Trapped(_) => return ExitCode::from(EXIT_TRAP),
            RunStatus::Halted(value) => return halt_code(value),
        }
    }
}

/// Map the entry function's return value onto the process exit code.
fn halt_code(value: Option<Slot>) -> ExitCode {
    match value {
        None => ExitCode::SUCCESS,
        Some(Slot::I64(v)) => {
            if i32::try_from(v).is_err() {
                eprintln!("main returned {v}: outside host int range");
                return ExitCode::from(EXIT_TRAP);
            }
            ExitCode::from((v & 0xff) as u8)
        }
        Some(_) => ExitCode::SUCCESS,
    }
}
