//! Source locations.

use core::fmt;

/// Source position attached to instructions by the front end via `.loc`
/// directives. A `file_id` of zero means unknown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceLoc {
    /// Index into the module's source file table; 0 = unknown.
    pub file_id: u32,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub col: u32,
}

impl SourceLoc {
    /// An unknown location.
    pub const UNKNOWN: SourceLoc = SourceLoc {
        file_id: 0,
        line: 0,
        col: 0,
    };

    /// Build a location triple.
    pub const fn new(file_id: u32, line: u32, col: u32) -> Self {
        Self { file_id, line, col }
    }

    /// True when no location was recorded.
    pub const fn is_unknown(&self) -> bool {
        self.file_id == 0
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_id, self.line, self.col)
    }
}
