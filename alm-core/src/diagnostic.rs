//! User-facing diagnostics and the per-compilation collector.

use std::fmt;

use crate::span::{SourceMap, Span};

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Grammar violation found by the lexer, parser or import resolver.
    Syntax,
    /// Scope, initialization, control-flow or type violation.
    Semantic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Syntax => write!(f, "syntax error"),
            ErrorKind::Semantic => write!(f, "semantic error"),
        }
    }
}

/// A single error report tied to a location in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            kind: ErrorKind::Syntax,
            message: message.into(),
            span,
        }
    }

    pub fn semantic(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            kind: ErrorKind::Semantic,
            message: message.into(),
            span,
        }
    }

    /// Render as `path:line:column: kind: message`.
    pub fn render(&self, sources: &SourceMap) -> String {
        let path = sources
            .path(self.span.file)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        format!("{path}:{}: {}: {}", self.span, self.kind, self.message)
    }
}

/// Ordered sink for every diagnostic produced during one compilation.
///
/// Syntax and semantic errors are kept in separate lists so the pipeline
/// can gate each phase on the previous one. Nothing is ever removed.
#[derive(Debug, Default)]
pub struct Diagnostics {
    syntax: Vec<Diagnostic>,
    semantic: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(kind = %diagnostic.kind, message = %diagnostic.message, "diagnostic recorded");
        match diagnostic.kind {
            ErrorKind::Syntax => self.syntax.push(diagnostic),
            ErrorKind::Semantic => self.semantic.push(diagnostic),
        }
    }

    pub fn syntax_error(&mut self, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::syntax(message, span));
    }

    pub fn semantic_error(&mut self, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::semantic(message, span));
    }

    pub fn syntax(&self) -> &[Diagnostic] {
        &self.syntax
    }

    pub fn semantic(&self) -> &[Diagnostic] {
        &self.semantic
    }

    pub fn has_syntax_errors(&self) -> bool {
        !self.syntax.is_empty()
    }

    pub fn has_semantic_errors(&self) -> bool {
        !self.semantic.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.syntax.is_empty() && self.semantic.is_empty()
    }

    pub fn len(&self) -> usize {
        self.syntax.len() + self.semantic.len()
    }

    /// Syntax errors first, then semantic errors, each in report order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.syntax.iter().chain(self.semantic.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{FileId, Position};
    use std::path::PathBuf;

    #[test]
    fn keeps_categories_apart_and_ordered() {
        let span = Span::point(FileId(0), Position::new(0, 1, 1));
        let mut diags = Diagnostics::new();
        diags.semantic_error("second", span);
        diags.syntax_error("first", span);
        diags.semantic_error("third", span);

        assert!(diags.has_syntax_errors());
        assert_eq!(diags.len(), 3);
        let messages: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third"]);
    }

    #[test]
    fn renders_file_and_line() {
        let mut sources = SourceMap::new();
        let file = sources.add(PathBuf::from("main.alm"), String::new());
        let diag = Diagnostic::semantic("boom", Span::point(file, Position::new(12, 3, 4)));
        assert_eq!(diag.render(&sources), "main.alm:3:4: semantic error: boom");
    }
}
