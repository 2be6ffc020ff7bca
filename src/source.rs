use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub file: Arc<str>,
    pub range: Range<usize>,
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn to(&self, other: &Span) -> Span {
        Span {
            file: self.file.clone(),
            range: self.range.start..other.range.end.max(self.range.end),
            start: self.start,
            end: other.end.max(self.end),
        }
    }

    pub fn dummy() -> Span {
        Span {
            file: Arc::from("<generated>"),
            range: 0..0,
            start: Position { line: 1, column: 1 },
            end: Position { line: 1, column: 1 },
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.file, self.start, self.end)
    }
}

#[derive(Debug)]
pub struct SourceFile {
    pub name: Arc<str>,
    pub text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<Arc<str>>, text: String) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        SourceFile {
            name: name.into(),
            text,
            line_starts,
        }
    }

    pub fn position(&self, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        Position {
            line: line + 1,
            column: offset - self.line_starts[line] + 1,
        }
    }

    pub fn span(&self, range: Range<usize>) -> Span {
        Span {
            file: self.name.clone(),
            start: self.position(range.start),
            end: self.position(range.end.saturating_sub(1).max(range.start)),
            range,
        }
    }

    /// Zero-width span just past the last byte, used for end-of-file errors.
    pub fn eof_span(&self) -> Span {
        let end = self.text.len();
        self.span(end..end)
    }
}

#[derive(Debug, Default)]
pub struct SourceMap {
    files: HashMap<Arc<str>, Arc<SourceFile>>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    pub fn insert(&mut self, name: &str, text: impl Into<String>) -> Arc<SourceFile> {
        let file = Arc::new(SourceFile::new(name, text.into()));
        self.files.insert(file.name.clone(), file.clone());
        file
    }

    pub fn get(&self, name: &str) -> Option<Arc<SourceFile>> {
        self.files.get(name).cloned()
    }

    pub fn load(&mut self, name: &str, requested_at: &Span) -> Result<Arc<SourceFile>, Error> {
        if let Some(file) = self.get(name) {
            return Ok(file);
        }
        let text = fs::read_to_string(Path::new(name)).map_err(|err| {
            Error::new(
                ErrorKind::Include,
                format!("Could not open file {}: {}", name, err),
                requested_at.clone(),
            )
        })?;
        log::debug!("loaded {} ({} bytes)", name, text.len());
        Ok(self.insert(name, text))
    }
}
