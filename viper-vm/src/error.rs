//! VM error types and trap formatting.

use core::fmt;

use thiserror::Error;

use viper_il::{SourceLoc, TrapKind};

/// A runtime trap: the kind, the site it was raised at and an optional
/// message.
///
/// Two renderings exist, both asserted by tests:
/// - the summary line `Trap @<fn>[:<blk>]#<ip> line <L>: <Kind> (code=<c>)`
///   (the block label is omitted for the entry block);
/// - the detail line
///   `runtime trap: <Kind> @ <fn>: <blk>[#<ip>] (<loc>): <message>`,
///   emitted only when the trap carries a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapError {
    /// Trap class.
    pub kind: TrapKind,
    /// Auxiliary code; 0 unless a helper supplies one.
    pub code: i32,
    /// Function the trap was raised in.
    pub function: String,
    /// Block label at the trap site.
    pub block: String,
    /// Instruction index within the block.
    pub ip: usize,
    /// Source location of the trapping instruction.
    pub loc: SourceLoc,
    /// IL text line of the trapping instruction; 0 if unknown.
    pub il_line: u32,
    /// Optional detail message.
    pub message: String,
}

impl TrapError {
    /// Line number reported in the summary: the source line when known,
    /// the IL text line otherwise.
    pub fn line(&self) -> u32 {
        if self.loc.is_unknown() {
            self.il_line
        } else {
            self.loc.line
        }
    }

    /// The `Trap @...` summary line.
    pub fn summary_line(&self) -> String {
        let block = if self.block == "entry" {
            String::new()
        } else {
            format!(":{}", self.block)
        };
        format!(
            "Trap @{}{block}#{} line {}: {} (code={})",
            self.function,
            self.ip,
            self.line(),
            self.kind,
            self.code
        )
    }

    /// The `runtime trap: ...` detail line, when a message is present.
    pub fn detail_line(&self) -> Option<String> {
        if self.message.is_empty() {
            return None;
        }
        Some(format!(
            "runtime trap: {} @ {}: {}[#{}] ({}): {}",
            self.kind, self.function, self.block, self.ip, self.loc, self.message
        ))
    }
}

impl fmt::Display for TrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary_line())
    }
}

impl std::error::Error for TrapError {}

/// Failures outside program execution proper.
#[derive(Debug, Error)]
pub enum VmError {
    /// The requested entry function does not exist in the module.
    #[error("unknown function '@{0}'")]
    UnknownFunction(String),
    /// The entry function expects parameters the VM cannot supply.
    #[error("entry function '@{0}' must not take parameters")]
    EntryHasParams(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trap(kind: TrapKind, block: &str, message: &str) -> TrapError {
        TrapError {
            kind,
            code: 0,
            function: "main".into(),
            block: block.into(),
            ip: 0,
            loc: SourceLoc::new(1, 1, 1),
            il_line: 4,
            message: message.into(),
        }
    }

    #[test]
    fn summary_omits_entry_block() {
        let t = trap(TrapKind::Overflow, "entry", "");
        assert_eq!(t.summary_line(), "Trap @main#0 line 1: Overflow (code=0)");
        assert_eq!(t.detail_line(), None);
    }

    #[test]
    fn summary_names_other_blocks() {
        let t = trap(TrapKind::Bounds, "loop", "");
        assert_eq!(t.summary_line(), "Trap @main:loop#0 line 1: Bounds (code=0)");
    }

    #[test]
    fn detail_line_carries_message() {
        let t = trap(
            TrapKind::DivideByZero,
            "entry",
            "divide by zero in sdiv.chk0",
        );
        assert_eq!(
            t.detail_line().unwrap(),
            "runtime trap: DivideByZero @ main: entry[#0] (1:1:1): divide by zero in sdiv.chk0"
        );
    }

    #[test]
    fn il_line_backs_up_unknown_loc() {
        let mut t = trap(TrapKind::Overflow, "entry", "");
        t.loc = SourceLoc::UNKNOWN;
        assert_eq!(t.line(), 4);
    }
}
