use std::path::PathBuf;

use colored::Colorize;
use thiserror::Error;

pub mod ast;
pub mod lexer;
pub mod parser;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn from_memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }

    /// Converts a byte offset into a 1-based line and column (counted in
    /// characters, not bytes)
    pub fn position_of(&self, offset: usize) -> Position {
        let offset = offset.min(self.contents.len());
        let before = &self.contents[..offset];

        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;

        Position { line, column }
    }

    pub fn line(&self, line: usize) -> Option<&str> {
        self.contents.lines().nth(line.checked_sub(1)?)
    }

    /// Renders the offending line with a caret under the given position
    pub fn highlight_position(&self, position: Position) -> String {
        let Some(text) = self.line(position.line) else {
            return String::new();
        };

        let gutter = format!("{} | ", position.line);
        let padding = " ".repeat(gutter.len() + position.column.saturating_sub(1));

        format!(
            "{}{}\n{}{}",
            gutter.blue(),
            text,
            padding,
            "^".red().bold()
        )
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}

/// Byte range into a [`SourceFile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

/// 1-based line and column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{position}: {kind}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxErrorKind {
    #[error("unexpected character `{0}`")]
    UnexpectedCharacter(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("malformed number `{0}`")]
    MalformedNumber(String),
    #[error("expected {expected} but found `{found}`")]
    UnexpectedToken { expected: String, found: String },
    #[error("expected {0} but reached end of file")]
    UnexpectedEof(String),
    #[error("{0}")]
    Invalid(String),
}
