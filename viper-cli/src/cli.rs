//! Command-line surface of the `viper` driver.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// The `viper` driver: execute Viper IL on the VM or emit IL text.
#[derive(Debug, Parser)]
#[command(
    name = "viper",
    version,
    about = "ViperLang toolchain driver",
    long_about = "Usage modes:\n  \
        viper program.il            Run program (default)\n  \
        viper program.il --emit-il  Emit IL to stdout\n  \
        viper program.il -o out.il  Emit IL to file"
)]
pub struct Cli {
    /// Program to execute or re-emit (.il).
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Execute the given IL file (equivalent to the positional form).
    #[arg(long = "run", value_name = "FILE")]
    pub run: Option<PathBuf>,

    /// Emit IL instead of running.
    #[arg(long = "emit-il")]
    pub emit_il: bool,

    /// Output file for emitted IL.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Enable execution tracing (il = per instruction, src = per source
    /// line).
    #[arg(
        long = "trace",
        value_name = "MODE",
        num_args = 0..=1,
        default_missing_value = "il",
        value_parser = ["il", "src"]
    )]
    pub trace: Option<String>,

    /// Add a breakpoint: a block label or a <file>:<line> source spec.
    #[arg(long = "break", value_name = "SPEC", action = ArgAction::Append)]
    pub breaks: Vec<String>,

    /// Add a source-line breakpoint.
    #[arg(long = "break-src", value_name = "SPEC", action = ArgAction::Append)]
    pub break_src: Vec<String>,

    /// Scripted debugger commands: `s` steps, `c` continues.
    #[arg(long = "debug-cmds", value_name = "FILE")]
    pub debug_cmds: Option<PathBuf>,

    /// Emit [WATCH] records when the named variable changes.
    #[arg(long = "watch", value_name = "NAME", action = ArgAction::Append)]
    pub watch: Vec<String>,

    /// Count executed instructions for the final summary.
    #[arg(long)]
    pub count: bool,

    /// Measure wall time for the final summary.
    #[arg(long)]
    pub time: bool,

    /// Instruction cap; exceeding it traps.
    #[arg(long = "max-steps", value_name = "N")]
    pub max_steps: Option<u64>,

    /// Not supported by the VM.
    #[arg(long = "bounds-checks")]
    pub bounds_checks: bool,
}

/// Historical single-dash spellings accepted by the driver.
pub fn preprocess_args(args: impl Iterator<Item = String>) -> Vec<String> {
    args.map(|a| if a == "-run" { "--run".to_string() } else { a })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_run_is_accepted() {
        let args = preprocess_args(
            ["viper", "-run", "prog.il"].iter().map(|s| s.to_string()),
        );
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.run.unwrap().to_str().unwrap(), "prog.il");
    }

    #[test]
    fn trace_defaults_to_il() {
        let cli = Cli::try_parse_from(["viper", "x.il", "--trace"]).unwrap();
        assert_eq!(cli.trace.as_deref(), Some("il"));
        let cli = Cli::try_parse_from(["viper", "x.il", "--trace=src"]).unwrap();
        assert_eq!(cli.trace.as_deref(), Some("src"));
    }

    #[test]
    fn bad_max_steps_is_a_usage_error() {
        assert!(Cli::try_parse_from(["viper", "x.il", "--max-steps", "abc"]).is_err());
        assert!(Cli::try_parse_from(["viper", "x.il", "--max-steps", "-5"]).is_err());
    }

    #[test]
    fn breaks_accumulate() {
        let cli = Cli::try_parse_from([
            "viper", "x.il", "--break", "L3", "--break", "demo.bas:7",
        ])
        .unwrap();
        assert_eq!(cli.breaks, vec!["L3", "demo.bas:7"]);
    }
}
