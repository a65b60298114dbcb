//! Driver-level behavior: exit codes, trap diagnostics and debug records,
//! observed from a child process the way the VM's fatal exits require.

use std::path::PathBuf;
use std::process::{Command, Output};

fn viper() -> Command {
    Command::new(env!("CARGO_BIN_EXE_viper"))
}

fn write_il(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

const ARITH: &str = "il 0.1\n\
func @main() -> i64 {\n\
entry:\n\
  %t0 = add 40, 2\n\
  ret %t0\n\
}\n";

#[test]
fn runs_program_and_reports_return_value() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(&dir, "arith.il", ARITH);
    let out = viper().arg("-run").arg(&path).output().unwrap();
    assert_eq!(out.status.code(), Some(42));
}

#[test]
fn divide_by_zero_exits_one_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(
        &dir,
        "div.il",
        "il 0.1\n\
         func @main() -> i64 {\n\
         entry:\n\
           .loc 1 1 1\n\
           %r = sdiv.chk0 1, 0\n\
           ret %r\n\
         }\n",
    );
    let out = viper().arg("-run").arg(&path).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains(
        "runtime trap: DivideByZero @ main: entry[#0] (1:1:1): divide by zero in sdiv.chk0"
    ));
}

#[test]
fn label_breakpoint_exits_ten_with_single_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(
        &dir,
        "blocks.il",
        "il 0.1\n\
         func @main() -> i64 {\n\
         entry:\n\
           br L2\n\
         L2:\n\
           br L3\n\
         L3:\n\
           ret 0\n\
         }\n",
    );
    let out = viper()
        .arg("-run")
        .arg(&path)
        .arg("--break")
        .arg("L3")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(10));
    assert_eq!(stderr(&out), "[BREAK] fn=@main blk=L3 reason=label\n");
    assert!(out.stdout.is_empty());
}

#[test]
fn debug_cmds_step_then_continue() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(
        &dir,
        "blocks.il",
        "il 0.1\n\
         func @main() -> i64 {\n\
         entry:\n\
           br L2\n\
         L2:\n\
           %t0 = add 1, 1\n\
           ret %t0\n\
         }\n",
    );
    let cmds = dir.path().join("cmds.txt");
    std::fs::write(&cmds, "s\nc\n").unwrap();
    let out = viper()
        .arg("-run")
        .arg(&path)
        .arg("--break")
        .arg("L2")
        .arg("--debug-cmds")
        .arg(&cmds)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2), "program returns 2 after continue");
    let err = stderr(&out);
    assert!(err.contains("[BREAK] fn=@main blk=L2 reason=label"));
    assert!(err.contains("reason=step"));
}

#[test]
fn summary_line_for_three_instructions() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(
        &dir,
        "three.il",
        "il 0.1\n\
         func @main() -> void {\n\
         entry:\n\
           %a = add 1, 1\n\
           %b = add %a, 1\n\
           ret\n\
         }\n",
    );
    let out = viper()
        .arg("-run")
        .arg(&path)
        .arg("--count")
        .arg("--time")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0));
    let err = stderr(&out);
    let summaries: Vec<&str> = err.lines().filter(|l| l.starts_with("[SUMMARY]")).collect();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].starts_with("[SUMMARY] instr=3 time_ms="));
}

#[test]
fn trace_il_goes_to_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(&dir, "arith.il", ARITH);
    let out = viper()
        .arg("-run")
        .arg(&path)
        .arg("--trace=il")
        .output()
        .unwrap();
    let err = stderr(&out);
    assert!(err.contains("[IL] fn=@main blk=entry ip=#0 add"));
    assert!(err.contains("[IL] fn=@main blk=entry ip=#1 ret"));
}

#[test]
fn watch_records_variable_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(
        &dir,
        "watch.il",
        "il 0.1\n\
         func @main() -> void {\n\
         entry:\n\
           %x = add 1, 1\n\
           %y = add %x, 1\n\
           ret\n\
         }\n",
    );
    let out = viper()
        .arg("-run")
        .arg(&path)
        .arg("--watch")
        .arg("x")
        .output()
        .unwrap();
    assert!(stderr(&out).contains("[WATCH] x=i64:2  (fn=@main blk=entry ip=#0)"));
}

#[test]
fn emit_il_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(&dir, "arith.il", ARITH);
    let out = viper().arg(&path).arg("--emit-il").output().unwrap();
    assert_eq!(out.status.code(), Some(0));
    let emitted = String::from_utf8_lossy(&out.stdout).into_owned();
    // Emitted IL is itself runnable.
    let second = write_il(&dir, "copy.il", &emitted);
    let rerun = viper().arg("-run").arg(&second).output().unwrap();
    assert_eq!(rerun.status.code(), Some(42));
}

#[test]
fn max_steps_caps_execution() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(
        &dir,
        "spin.il",
        "il 0.1\n\
         func @main() -> void {\n\
         entry:\n\
           br spin\n\
         spin:\n\
           br spin\n\
         }\n",
    );
    let out = viper()
        .arg("-run")
        .arg(&path)
        .arg("--max-steps")
        .arg("50")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("max steps exceeded: 50"));
}

#[test]
fn bad_max_steps_shows_usage() {
    for bad in ["abc", "-5", "99999999999999999999999999"] {
        let out = viper()
            .arg("x.il")
            .arg("--max-steps")
            .arg(bad)
            .output()
            .unwrap();
        assert_ne!(out.status.code(), Some(0), "--max-steps {bad}");
        assert!(stderr(&out).contains("Usage"), "--max-steps {bad}");
    }
}

#[test]
fn bounds_checks_is_rejected_without_usage() {
    let out = viper().arg("x.il").arg("--bounds-checks").output().unwrap();
    assert_ne!(out.status.code(), Some(0));
    let err = stderr(&out);
    assert!(err.contains("--bounds-checks is not supported"));
    assert!(!err.contains("Usage"));
}

#[test]
fn out_of_range_return_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(
        &dir,
        "big.il",
        "il 0.1\n\
         func @main() -> i64 {\n\
         entry:\n\
           ret 4294967296\n\
         }\n",
    );
    let out = viper().arg("-run").arg(&path).output().unwrap();
    assert_ne!(out.status.code(), Some(0));
    assert!(stderr(&out).contains("outside host int range"));
}

#[test]
fn verify_failure_is_rule_tagged() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(
        &dir,
        "bad.il",
        "il 0.1\n\
         func @main() -> void {\n\
         entry:\n\
           br target\n\
         target(%x: i64):\n\
           ret\n\
         }\n",
    );
    let out = viper().arg("-run").arg(&path).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("[RULE:br-args]"));
    assert!(err.contains("branch argument count mismatch: expected 1, got 0, target 'target'"));
}

#[test]
fn parse_failure_reports_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_il(&dir, "bad.il", "il 0.1\nfunc main() -> i64 {\n");
    let out = viper().arg("-run").arg(&path).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("line 2: malformed function header"));
}
