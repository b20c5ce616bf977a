//! Source files with line-start indexing, and resolved source positions.

use std::fmt;
use std::sync::Arc;

/// A resolved source location: file name plus 1-indexed line and column.
///
/// Positions are resolved when the source is parsed, so values and
/// diagnostics can carry them around without access to the source text.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Pos {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A source file loaded into an evaluation context.
pub struct SourceFile {
    /// The file name used in positions (a path or a synthetic `$schema.cue`).
    pub name: Arc<str>,
    /// The full text content of the file.
    pub content: String,
    /// Byte offsets of each line start (the first entry is always 0).
    line_starts: Vec<u32>,
}

impl SourceFile {
    pub fn new(name: impl Into<Arc<str>>, content: String) -> Self {
        let line_starts = compute_line_starts(&content);
        Self {
            name: name.into(),
            content,
            line_starts,
        }
    }

    /// Converts a byte offset into 1-indexed (line, column) coordinates.
    pub fn line_col(&self, byte_offset: u32) -> (u32, u32) {
        let line_idx = match self.line_starts.binary_search(&byte_offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line = (line_idx as u32) + 1;
        let col = byte_offset - self.line_starts[line_idx] + 1;
        (line, col)
    }

    /// Resolves a byte offset into a [`Pos`].
    pub fn pos(&self, byte_offset: u32) -> Pos {
        let (line, column) = self.line_col(byte_offset);
        Pos {
            file: self.name.clone(),
            line,
            column,
        }
    }

    /// Returns a substring of the file content between byte offsets.
    pub fn snippet(&self, start: u32, end: u32) -> &str {
        &self.content[start as usize..end as usize]
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("len", &self.content.len())
            .finish()
    }
}

fn compute_line_starts(content: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, byte) in content.bytes().enumerate() {
        if byte == b'\n' {
            starts.push((i + 1) as u32);
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_file(content: &str) -> SourceFile {
        SourceFile::new("test.cue", content.to_string())
    }

    #[test]
    fn line_col_resolution() {
        let f = make_file("abc\ndef\nghi");
        assert_eq!(f.line_col(0), (1, 1));
        assert_eq!(f.line_col(4), (2, 1));
        assert_eq!(f.line_col(5), (2, 2));
        assert_eq!(f.line_col(8), (3, 1));
    }

    #[test]
    fn pos_displays_file_line_column() {
        let f = make_file("a: 1\nb: 2\n");
        assert_eq!(f.pos(8).to_string(), "test.cue:2:4");
    }

    #[test]
    fn empty_file() {
        let f = make_file("");
        assert_eq!(f.line_col(0), (1, 1));
        assert_eq!(f.snippet(0, 0), "");
    }
}
