//! Path-annotated diagnostics produced by parsing and evaluation.

use std::fmt;

use crate::source::Pos;

/// A single error with the field path it applies to and the source
/// positions that contributed to it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Diagnostic {
    /// Dotted field path such as `bar.a.amount`; empty for file-level errors.
    pub path: String,
    pub message: String,
    pub positions: Vec<Pos>,
}

impl Diagnostic {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            positions: Vec::new(),
        }
    }

    /// A file-level error at a single position.
    pub fn at(pos: Pos, message: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            message: message.into(),
            positions: vec![pos],
        }
    }

    pub fn with_positions(mut self, positions: impl IntoIterator<Item = Pos>) -> Self {
        for pos in positions {
            if !self.positions.contains(&pos) {
                self.positions.push(pos);
            }
        }
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.path.is_empty() {
            write!(f, "{}: ", self.path)?;
        }
        write!(f, "{}", self.message)?;
        if !self.positions.is_empty() {
            write!(f, ":")?;
            for pos in &self.positions {
                write!(f, "\n    {pos}")?;
            }
        }
        Ok(())
    }
}

/// A non-empty list of diagnostics, the error type of every fallible engine
/// operation.
///
/// The `Display` output is the detailed rendering: one `path: message` line
/// per diagnostic followed by its indented `file:line:column` positions.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
#[error("{}", render(.0))]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Builds a diagnostics list, sorted by path for stable output.
    pub fn new(mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics.sort_by(|a, b| a.path.cmp(&b.path));
        diagnostics.dedup();
        Self(diagnostics)
    }

    pub fn single(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }

    /// Whether any diagnostic mentions `needle` in its message.
    pub fn mentions(&self, needle: &str) -> bool {
        self.0.iter().any(|d| d.message.contains(needle))
    }
}

fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self::single(diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pos(line: u32, column: u32) -> Pos {
        Pos {
            file: Arc::from("config.cue"),
            line,
            column,
        }
    }

    #[test]
    fn renders_path_message_and_positions() {
        let diag = Diagnostic::new("foo", "conflicting values 1 and 2")
            .with_positions([pos(1, 6), pos(2, 6)]);
        assert_eq!(
            diag.to_string(),
            "foo: conflicting values 1 and 2:\n    config.cue:1:6\n    config.cue:2:6"
        );
    }

    #[test]
    fn renders_without_path_or_positions() {
        let diag = Diagnostic::new("", "no sources");
        assert_eq!(diag.to_string(), "no sources");
    }

    #[test]
    fn diagnostics_are_sorted_by_path() {
        let all = Diagnostics::new(vec![
            Diagnostic::new("b", "second"),
            Diagnostic::new("a", "first"),
        ]);
        assert_eq!(all.to_string(), "a: first\nb: second");
    }

    #[test]
    fn diagnostics_are_a_std_error() {
        let err: Box<dyn std::error::Error> =
            Box::new(Diagnostics::single(Diagnostic::new("x", "bad").with_positions([pos(3, 4)])));
        assert_eq!(err.to_string(), "x: bad:\n    config.cue:3:4");
        assert!(err.source().is_none());
    }

    #[test]
    fn duplicate_positions_are_dropped() {
        let diag = Diagnostic::new("x", "bad").with_positions([pos(1, 1), pos(1, 1)]);
        assert_eq!(diag.positions.len(), 1);
    }
}
