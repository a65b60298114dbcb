//! Breakpoints, scripted stepping and watch bookkeeping.

use std::collections::{HashMap, HashSet};

use viper_il::SourceLoc;

/// Why execution stopped at a debug event; printed in `[BREAK]` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    /// A block-label breakpoint matched.
    Label,
    /// A source- or IL-line breakpoint matched.
    Src,
    /// Single-stepping stopped after one instruction.
    Step,
}

impl BreakReason {
    /// Token used in the `[BREAK]` record.
    pub const fn token(&self) -> &'static str {
        match self {
            BreakReason::Label => "label",
            BreakReason::Src => "src",
            BreakReason::Step => "step",
        }
    }
}

/// One breakpoint specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Breakpoint {
    /// Halt before the first instruction of the labeled block.
    Label(String),
    /// Halt before the first instruction mapped to `path:line`.
    SrcLine {
        /// Normalized source path.
        path: String,
        /// 1-based source line.
        line: u32,
    },
    /// Halt before the instruction on the given line of the loaded IL file.
    IlLine {
        /// 1-based IL text line.
        line: u32,
    },
}

/// Does a `--break` token denote a source line rather than a label?
///
/// A source spec is `<file>:<line>` where the right side is decimal digits
/// and the left side contains a path separator or a dot. Whitespace around
/// the colon and digits is tolerated. The check is purely syntactic.
pub fn is_src_break_spec(spec: &str) -> bool {
    let Some(pos) = spec.rfind(':') else {
        return false;
    };
    let line = spec[pos + 1..].trim();
    if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let left = spec[..pos].trim();
    left.contains('/') || left.contains('\\') || left.contains('.')
}

/// Parse a `--break` token. `il_path` is the file being executed, so specs
/// naming it become IL-line breakpoints.
pub fn parse_break_spec(spec: &str, il_path: Option<&str>) -> Breakpoint {
    if !is_src_break_spec(spec) {
        return Breakpoint::Label(spec.trim().to_string());
    }
    let pos = spec.rfind(':').expect("checked by is_src_break_spec");
    let path = normalize_path(spec[..pos].trim());
    let line: u32 = spec[pos + 1..].trim().parse().unwrap_or(0);
    match il_path {
        Some(il) if normalize_path(il) == path => Breakpoint::IlLine { line },
        _ => Breakpoint::SrcLine { path, line },
    }
}

/// Canonicalize a debug path: backslashes become forward slashes, `./`
/// segments drop, `a/..` collapses, and the empty input is `"."`.
pub fn normalize_path(input: &str) -> String {
    if input.is_empty() {
        return ".".to_string();
    }
    let unified = input.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(&"..")) || (parts.is_empty() && !absolute) {
                    parts.push("..");
                } else {
                    parts.pop();
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Debug state carried by the VM: breakpoints, the single-stepping flag
/// and the position of the last stop so resuming does not immediately
/// re-break in place.
#[derive(Debug, Default)]
pub struct Debugger {
    labels: HashSet<String>,
    src_lines: HashSet<(String, u32)>,
    il_lines: HashSet<u32>,
    single_stepping: bool,
    last_stop: Option<(usize, usize, usize)>,
    pub(crate) watches: HashSet<String>,
    pub(crate) watch_values: HashMap<String, String>,
}

impl Debugger {
    /// Register a breakpoint.
    pub fn add_breakpoint(&mut self, bp: Breakpoint) {
        match bp {
            Breakpoint::Label(label) => {
                self.labels.insert(label);
            }
            Breakpoint::SrcLine { path, line } => {
                self.src_lines.insert((path, line));
            }
            Breakpoint::IlLine { line } => {
                self.il_lines.insert(line);
            }
        }
    }

    /// Register a watched variable name.
    pub fn add_watch(&mut self, name: impl Into<String>) {
        self.watches.insert(name.into());
    }

    /// Get single-stepping mode.
    pub const fn single_stepping(&self) -> bool {
        self.single_stepping
    }

    /// Set single-stepping mode.
    pub fn set_single_stepping(&mut self, on: bool) {
        self.single_stepping = on;
    }

    /// Decide whether to stop before executing the instruction at the
    /// given position. `block_label` is set only at `ip == 0`; `src` is
    /// the instruction's mapped source path and line.
    pub(crate) fn eval(
        &mut self,
        pos: (usize, usize, usize),
        block_label: Option<&str>,
        src: Option<(&str, u32)>,
        il_line: u32,
    ) -> Option<BreakReason> {
        // Resuming from a stop must execute the stopped instruction.
        if self.last_stop == Some(pos) {
            return None;
        }
        if self.single_stepping {
            self.last_stop = Some(pos);
            return Some(BreakReason::Step);
        }
        if let Some(label) = block_label {
            if self.labels.contains(label) {
                self.last_stop = Some(pos);
                return Some(BreakReason::Label);
            }
        }
        if self.il_lines.contains(&il_line) && il_line != 0 {
            self.last_stop = Some(pos);
            return Some(BreakReason::Src);
        }
        if let Some((path, line)) = src {
            if self.src_lines.contains(&(path.to_string(), line)) {
                self.last_stop = Some(pos);
                return Some(BreakReason::Src);
            }
        }
        None
    }

    /// Forget the last stop once an instruction has executed past it.
    pub(crate) fn clear_stop(&mut self, pos: (usize, usize, usize)) {
        if self.last_stop == Some(pos) {
            self.last_stop = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("L3", false)]
    #[case("entry", false)]
    #[case("file.bas:7", true)]
    #[case("path/to/file.bas:7", true)]
    #[case(r"C:\src\main.bas:12", true)]
    #[case("file.bas : 7", true)]
    #[case("file.bas:", false)]
    #[case("file.bas:x7", false)]
    #[case("label:7", false)]
    fn src_spec_detection(#[case] spec: &str, #[case] expected: bool) {
        assert_eq!(is_src_break_spec(spec), expected);
    }

    #[test]
    fn normalizes_windows_paths() {
        assert_eq!(
            normalize_path(r"C:\project\src\..\main.bas"),
            "C:/project/main.bas"
        );
        assert_eq!(normalize_path(""), ".");
        assert_eq!(normalize_path("./a/b/./c"), "a/b/c");
        assert_eq!(normalize_path("a/../.."), "..");
        assert_eq!(normalize_path("/x/../y"), "/y");
    }

    #[test]
    fn spec_parsing_routes_il_files() {
        assert_eq!(
            parse_break_spec("L3", Some("prog.il")),
            Breakpoint::Label("L3".into())
        );
        assert_eq!(
            parse_break_spec("prog.il:9", Some("prog.il")),
            Breakpoint::IlLine { line: 9 }
        );
        assert_eq!(
            parse_break_spec("demo.bas:7", Some("prog.il")),
            Breakpoint::SrcLine {
                path: "demo.bas".into(),
                line: 7
            }
        );
    }

    #[test]
    fn resume_does_not_rebreak_in_place() {
        let mut dbg = Debugger::default();
        dbg.add_breakpoint(Breakpoint::Label("L3".into()));
        let pos = (0, 2, 0);
        assert_eq!(
            dbg.eval(pos, Some("L3"), None, 0),
            Some(BreakReason::Label)
        );
        // Resuming at the same position falls through.
        assert_eq!(dbg.eval(pos, Some("L3"), None, 0), None);
        dbg.clear_stop(pos);
        assert_eq!(
            dbg.eval(pos, Some("L3"), None, 0),
            Some(BreakReason::Label)
        );
    }
}
