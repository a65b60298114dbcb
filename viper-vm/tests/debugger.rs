//! Breakpoints, stepping, watches, tracing, summary and interruption.

use viper_il::TrapKind;
use viper_vm::debug::Breakpoint;
use viper_vm::util::{run_il_with, start_il};
use viper_vm::{PauseReason, RunConfig, RunStatus, TraceMode};

const THREE_BLOCKS: &str = "il 0.1\n\
func @main() -> i64 {\n\
entry:\n\
  %t0 = add 1, 0\n\
  br L2\n\
L2:\n\
  %t1 = add %t0, 1\n\
  br L3\n\
L3:\n\
  %t2 = add %t1, 40\n\
  ret %t2\n\
}\n";

#[test]
fn label_breakpoint_halts_before_block() {
    let (_runner, _stdout, control, status) =
        start_il(THREE_BLOCKS, RunConfig::default(), |vm| {
            vm.debugger_mut()
                .add_breakpoint(Breakpoint::Label("L3".into()));
        });
    assert!(matches!(status, RunStatus::Paused(PauseReason::Breakpoint)));
    assert_eq!(control.contents(), "[BREAK] fn=@main blk=L3 reason=label\n");
}

#[test]
fn resume_after_breakpoint_completes() {
    let (mut runner, _stdout, control, status) =
        start_il(THREE_BLOCKS, RunConfig::default(), |vm| {
            vm.debugger_mut()
                .add_breakpoint(Breakpoint::Label("L2".into()));
        });
    assert!(matches!(status, RunStatus::Paused(_)));
    let end = runner.continue_run();
    match end {
        RunStatus::Halted(Some(v)) => assert_eq!(v.as_i64(), 42),
        other => panic!("expected halt, got {other:?}"),
    }
    // One break record, nothing else.
    assert_eq!(control.contents(), "[BREAK] fn=@main blk=L2 reason=label\n");
}

#[test]
fn il_line_breakpoint() {
    // Line 7 of the IL text is `%t1 = add %t0, 1`.
    let (_runner, _stdout, control, status) =
        start_il(THREE_BLOCKS, RunConfig::default(), |vm| {
            vm.debugger_mut().add_breakpoint(Breakpoint::IlLine { line: 7 });
        });
    assert!(matches!(status, RunStatus::Paused(PauseReason::Breakpoint)));
    assert_eq!(control.contents(), "[BREAK] fn=@main blk=L2 reason=src\n");
}

#[test]
fn src_line_breakpoint_via_loc() {
    let text = "il 0.1\n\
        .file 1 \"demo.bas\"\n\
        func @main() -> i64 {\n\
        entry:\n\
          .loc 1 3 1\n\
          %t0 = add 40, 2\n\
          .loc 1 7 1\n\
          %t1 = add %t0, 0\n\
          ret %t1\n\
        }\n";
    let (_runner, _stdout, control, status) = start_il(text, RunConfig::default(), |vm| {
        vm.debugger_mut().add_breakpoint(Breakpoint::SrcLine {
            path: "demo.bas".into(),
            line: 7,
        });
    });
    assert!(matches!(status, RunStatus::Paused(PauseReason::Breakpoint)));
    assert_eq!(
        control.contents(),
        "[BREAK] fn=@main blk=entry reason=src\n"
    );
}

#[test]
fn single_stepping_breaks_each_instruction() {
    let (mut runner, _stdout, control, status) =
        start_il(THREE_BLOCKS, RunConfig::default(), |vm| {
            vm.debugger_mut().set_single_stepping(true);
        });
    assert!(matches!(status, RunStatus::Paused(PauseReason::Step)));
    let mut stops = 1;
    loop {
        match runner.continue_run() {
            RunStatus::Paused(PauseReason::Step) => stops += 1,
            RunStatus::Halted(Some(v)) => {
                assert_eq!(v.as_i64(), 42);
                break;
            }
            other => panic!("unexpected status {other:?}"),
        }
    }
    // Six instructions, one step record each.
    assert_eq!(stops, 6);
    let breaks = control
        .contents()
        .lines()
        .filter(|l| l.contains("reason=step"))
        .count();
    assert_eq!(breaks, 6);
}

#[test]
fn watch_emits_on_change() {
    let out = run_il_with(
        "il 0.1\n\
         func @main() -> i64 {\n\
         entry:\n\
           br head(0)\n\
         head(%i: i64):\n\
           %c = scmp_lt %i, 2\n\
           cbr %c, body, done\n\
         body:\n\
           %next = add %i, 1\n\
           br head(%next)\n\
         done:\n\
           ret %i\n\
         }\n",
        RunConfig::default(),
        |vm| vm.debugger_mut().add_watch("next"),
    );
    let watches: Vec<&str> = out
        .control
        .lines()
        .filter(|l| l.starts_with("[WATCH]"))
        .collect();
    assert_eq!(
        watches,
        vec![
            "[WATCH] next=i64:1  (fn=@main blk=body ip=#0)",
            "[WATCH] next=i64:2  (fn=@main blk=body ip=#0)",
        ]
    );
}

#[test]
fn il_trace_is_deterministic() {
    let run = |mode| {
        run_il_with(
            THREE_BLOCKS,
            RunConfig {
                trace: mode,
                ..Default::default()
            },
            |_| {},
        )
    };
    let out = run(TraceMode::Il);
    let expected = "\
[IL] fn=@main blk=entry ip=#0 add\n\
[IL] fn=@main blk=entry ip=#1 br\n\
[IL] fn=@main blk=L2 ip=#0 add\n\
[IL] fn=@main blk=L2 ip=#1 br\n\
[IL] fn=@main blk=L3 ip=#0 add\n\
[IL] fn=@main blk=L3 ip=#1 ret\n";
    assert_eq!(out.control, expected);
    // Repeat runs byte-identical.
    assert_eq!(run(TraceMode::Il).control, expected);
    // Without --trace there is no trace output.
    assert_eq!(run(TraceMode::Off).control, "");
}

#[test]
fn src_trace_emits_on_line_change() {
    let text = "il 0.1\n\
        .file 1 \"demo.bas\"\n\
        func @main() -> void {\n\
        entry:\n\
          .loc 1 3 1\n\
          %a = add 1, 1\n\
          %b = add %a, 1\n\
          .loc 1 4 1\n\
          %c = add %b, 1\n\
          ret\n\
        }\n";
    let out = run_il_with(
        text,
        RunConfig {
            trace: TraceMode::Src,
            ..Default::default()
        },
        |_| {},
    );
    assert_eq!(out.control, "[SRC] demo.bas:3\n[SRC] demo.bas:4\n");
}

#[test]
fn summary_counts_instructions() {
    let text = "il 0.1\n\
        func @main() -> i64 {\n\
        entry:\n\
          %a = add 1, 1\n\
          %b = add %a, 40\n\
          ret %b\n\
        }\n";
    let module = viper_il::text::parse_module(text).unwrap();
    let mut runner = viper_vm::Runner::new(module, RunConfig::default()).unwrap();
    let control = viper_vm::util::CaptureBuf::default();
    runner.vm_mut().set_control(Box::new(control.clone()));
    runner.set_summary(true);
    let status = runner.continue_run();
    assert!(matches!(status, RunStatus::Halted(_)));
    let text = control.contents();
    let mut lines = text.lines();
    let summary = lines.next().unwrap();
    assert!(lines.next().is_none(), "exactly one summary line");
    assert!(summary.starts_with("[SUMMARY] instr=3 time_ms="));
}

#[test]
fn max_steps_raises_interrupt() {
    let out = run_il_with(
        "il 0.1\n\
         func @main() -> void {\n\
         entry:\n\
           br spin\n\
         spin:\n\
           br spin\n\
         }\n",
        RunConfig {
            max_steps: Some(100),
            ..Default::default()
        },
        |_| {},
    );
    let trap = out.status.trap().unwrap();
    assert_eq!(trap.kind, TrapKind::Interrupt);
    assert_eq!(trap.message, "max steps exceeded: 100");
}

#[test]
fn interrupt_flag_traps_at_poll_point() {
    let out = run_il_with(
        "il 0.1\n\
         func @main() -> void {\n\
         entry:\n\
           br spin\n\
         spin:\n\
           br spin\n\
         }\n",
        RunConfig {
            interrupt_every_n: 16,
            ..Default::default()
        },
        |vm| vm.request_interrupt(),
    );
    let trap = out.status.trap().unwrap();
    assert_eq!(trap.kind, TrapKind::Interrupt);
    assert_eq!(trap.message, "interrupt requested");
}

#[test]
fn poll_callback_pauses_instead() {
    let (mut runner, _stdout, _control, status) = start_il(
        THREE_BLOCKS,
        RunConfig {
            interrupt_every_n: 1,
            poll: Some(Box::new(|| false)),
            ..Default::default()
        },
        |vm| vm.request_interrupt(),
    );
    assert!(matches!(status, RunStatus::Paused(PauseReason::Poll)));
    // A clean pause is resumable.
    match runner.continue_run() {
        RunStatus::Halted(Some(v)) => assert_eq!(v.as_i64(), 42),
        other => panic!("expected halt, got {other:?}"),
    }
}
