use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use std::fmt;
use std::io;

use crate::source::{SourceMap, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Lexer,
    Syntax,
    Include,
    Scope,
    Type,
    Shape,
    AccessViolation,
    UnpredictableFree,
    MemoryLeak,
    Contract,
    Assumption,
    // Fixpoint bound exceeded, allocation in a loop body or state explosion.
    Divergence,
    Metavariable,
    Codegen,
    Io,
}

impl ErrorKind {
    pub fn stage(&self) -> &'static str {
        match self {
            ErrorKind::Lexer => "Lexer Error",
            ErrorKind::Syntax | ErrorKind::Include => "Syntax Error",
            ErrorKind::Codegen => "Compile Error",
            ErrorKind::Io => "IO Error",
            _ => "Semantic Error",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Lexer => "lexer",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Include => "include",
            ErrorKind::Scope => "scope",
            ErrorKind::Type => "type",
            ErrorKind::Shape => "shape",
            ErrorKind::AccessViolation => "access-violation",
            ErrorKind::UnpredictableFree => "unpredictable-free",
            ErrorKind::MemoryLeak => "memory-leak",
            ErrorKind::Contract => "contract",
            ErrorKind::Assumption => "assumption",
            ErrorKind::Divergence => "divergence",
            ErrorKind::Metavariable => "metavariable",
            ErrorKind::Codegen => "codegen",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stage())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Error {
            kind,
            message: message.into(),
            span,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}\n{}-{}\n{}: {}",
            self.span.file, self.span.start, self.span.end, self.kind, self.message
        )
    }

    pub fn report(&self, sources: &SourceMap) -> io::Result<()> {
        let file = self.span.file.to_string();
        let Some(source) = sources.get(&file) else {
            eprintln!("{}", self.summary());
            return Ok(());
        };

        Report::build(ReportKind::Error, (file.clone(), self.span.range.clone()))
            .with_code(self.kind.code())
            .with_message(format!("{}: {}", self.kind, self.message))
            .with_label(
                Label::new((file.clone(), self.span.range.clone()))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            )
            .finish()
            .eprint((file, Source::from(source.text.clone())))
    }
}
