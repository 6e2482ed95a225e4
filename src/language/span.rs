use tower_lsp_server::lsp_types;

/// A source position with 1-based line and column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl Position {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    /// Convert from a wire position (0-based on both axes).
    pub fn from_lsp(position: lsp_types::Position) -> Self {
        Self {
            line: position.line + 1,
            col: position.character + 1,
        }
    }

    /// Convert to a wire position (0-based on both axes).
    pub fn to_lsp(self) -> lsp_types::Position {
        lsp_types::Position {
            line: self.line.saturating_sub(1),
            character: self.col.saturating_sub(1),
        }
    }
}

/// A source range with inclusive end position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn point(position: Position) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }

    pub fn encloses(&self, other: Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Join two ranges into the smallest range covering both.
    pub fn merge(self, other: Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn from_lsp(range: lsp_types::Range) -> Self {
        Self {
            start: Position::from_lsp(range.start),
            end: Position::from_lsp(range.end),
        }
    }

    pub fn to_lsp(self) -> lsp_types::Range {
        lsp_types::Range {
            start: self.start.to_lsp(),
            end: self.end.to_lsp(),
        }
    }
}
