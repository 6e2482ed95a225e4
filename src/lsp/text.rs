use crate::language::span::{Position, Range};
use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};
use tower_lsp_server::{lsp_types, lsp_types::Uri, UriExt};

pub fn uri_to_path(uri: &Uri) -> Option<PathBuf> {
    uri.to_file_path().map(|cow: Cow<'_, Path>| match cow {
        Cow::Owned(path) => path,
        Cow::Borrowed(path) => path.to_path_buf(),
    })
}

pub fn path_to_uri(path: &Path) -> Option<Uri> {
    Uri::from_file_path(path)
}

/// A wire range covering the whole document.
pub fn full_document_range(text: &str) -> lsp_types::Range {
    let mut line = 0u32;
    let mut col = 0u32;
    for ch in text.chars() {
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    lsp_types::Range {
        start: lsp_types::Position::new(0, 0),
        end: lsp_types::Position::new(line, col),
    }
}

/// The sub-range covering only the bare name of a qualified reference
/// written at `start`: `Module.name` edits must leave `Module.` alone.
pub fn qualified_name_range(start: Position, module_parts: &[String], name: &str) -> Range {
    let prefix: u32 = if module_parts.is_empty() {
        0
    } else {
        module_parts
            .iter()
            .map(|part| part.chars().count() as u32 + 1)
            .sum()
    };
    let name_len = name.chars().count() as u32;
    Range::new(
        Position::new(start.line, start.col + prefix),
        Position::new(start.line, start.col + prefix + name_len),
    )
}

/// The sub-range covering only the name of an exposing item: for
/// `Foo(..)` that is `Foo`, not the whole item.
pub fn exposed_name_range(start: Position, name: &str) -> Range {
    let name_len = name.chars().count() as u32;
    Range::new(
        start,
        Position::new(start.line, start.col + name_len),
    )
}

/// Slice the text under a single-line range, 1-based and end-exclusive in
/// columns the way name ranges are produced.
pub fn slice_range(text: &str, range: Range) -> Option<String> {
    if range.start.line != range.end.line {
        return None;
    }
    let line = text.lines().nth(range.start.line as usize - 1)?;
    let start = range.start.col as usize - 1;
    let end = range.end.col as usize - 1;
    let slice: String = line
        .chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect();
    Some(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_ranges_skip_the_module_prefix() {
        // `Json.Decode.map` starting at line 4, col 9: the name is `map`.
        let range = qualified_name_range(
            Position::new(4, 9),
            &["Json".into(), "Decode".into()],
            "map",
        );
        assert_eq!(range.start, Position::new(4, 21));
        assert_eq!(range.end, Position::new(4, 24));
    }

    #[test]
    fn unqualified_ranges_start_where_the_name_starts() {
        let range = qualified_name_range(Position::new(2, 1), &[], "greet");
        assert_eq!(range.start, Position::new(2, 1));
        assert_eq!(range.end, Position::new(2, 6));
    }

    #[test]
    fn slicing_recovers_the_name_text() {
        let text = "module Main exposing (..)\n\nx = Helpers.add 1 2\n";
        let range = qualified_name_range(Position::new(3, 5), &["Helpers".into()], "add");
        assert_eq!(slice_range(text, range).as_deref(), Some("add"));
    }

    #[test]
    fn full_document_range_ends_after_the_last_character() {
        let range = full_document_range("ab\ncd");
        assert_eq!(range.end.line, 1);
        assert_eq!(range.end.character, 2);
    }
}
