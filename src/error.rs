//! Error taxonomy and source-context diagnostics rendering.

use thiserror::Error;

use crate::style::Style;
use crate::suggest::{find_similar, KNOWN_WORDS};
use crate::token::Span;
use crate::value::Value;

/// The five error kinds, unified so `?` can propagate any of them out of
/// the lexer/parser/evaluator/module resolver/host facades.
#[derive(Debug, Clone, Error)]
pub enum EcError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl EcError {
    pub fn kind_label(&self) -> &'static str {
        match self {
            EcError::Lex(_) => "Lexical",
            EcError::Syntax(_) => "Syntax",
            EcError::Runtime(_) => "Runtime",
            EcError::Module(_) => "Module",
            EcError::Host(_) => "Host",
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            EcError::Lex(e) => Some(e.span),
            EcError::Syntax(e) => Some(e.span),
            EcError::Runtime(e) => e.span,
            EcError::Module(_) => None,
            EcError::Host(_) => None,
        }
    }

    /// The value a `throw` carries, so `catch` can bind it verbatim.
    pub fn as_thrown_value(&self) -> Value {
        match self {
            EcError::Runtime(e) => e.payload.clone().unwrap_or_else(|| Value::string(e.message.clone())),
            other => Value::string(other.to_string()),
        }
    }

    /// Render in the `<Kind> Error at Line L, Column C: <message>` format
    /// plus a two-line source snippet with a caret.
    pub fn display_with_source(&self, source: &str) -> String {
        let message = self.to_string();
        let kind = self.kind_label();
        let Some(span) = self.span() else {
            return format!("{} Error: {}", kind, message);
        };
        let header = format!(
            "{} Error at Line {}, Column {}: {}",
            kind, span.line, span.column, message
        );

        let (line_start, line_content) = line_context(source, span.start);
        let col = span.start.saturating_sub(line_start);
        let len = (span.end.max(span.start + 1) - span.start).max(1);
        let underline = format!("{}{}", " ".repeat(col), "^".repeat(len));

        let line_num = Style::blue(&format!("{:4}", span.line));
        let pipe = Style::blue("|");
        let underline_colored = Style::red(&underline);

        let mut out = format!(
            "{}\n\n{} {} {}\n     {} {}",
            Style::bold_red(&header),
            line_num,
            pipe,
            line_content,
            pipe,
            underline_colored
        );

        if let Some(word) = extract_word(source, span) {
            if let Some(suggestion) = find_similar(&word, KNOWN_WORDS, 2) {
                let hint = Style::cyan("help");
                out.push_str(&format!(
                    "\n     {} {}: did you mean '{}'?",
                    pipe,
                    hint,
                    Style::green(suggestion)
                ));
            }
        }

        out
    }
}

fn extract_word(source: &str, span: Span) -> Option<String> {
    if span.start < source.len() && span.end <= source.len() && span.end > span.start {
        let word = &source[span.start..span.end];
        if !word.is_empty() && word.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
            return Some(word.to_string());
        }
    }
    None
}

fn line_context(source: &str, offset: usize) -> (usize, &str) {
    let line_start = source[..offset.min(source.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let line_end = source[line_start..]
        .find('\n')
        .map(|off| line_start + off)
        .unwrap_or(source.len());
    (line_start, &source[line_start..line_end])
}

/// Computes line/column for a byte offset as tokens and AST nodes are built.
/// Kept separate from `Span` itself so the lexer can call it incrementally.
pub struct SourceMap<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceMap<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { source, line_starts }
    }

    /// Returns 1-based (line, column) for a byte offset.
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[idx];
        let col = self.source[line_start..offset.min(self.source.len())]
            .chars()
            .count();
        (idx as u32 + 1, col as u32 + 1)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

impl LexError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), span }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), span }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
    pub span: Option<Span>,
    /// The value re-delivered to a `catch` clause, when this error originated
    /// from a user `throw` rather than a built-in fault.
    pub payload: Option<Value>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, span: Option<Span>) -> Self {
        Self { message: message.into(), span, payload: None }
    }

    pub fn thrown(value: Value, span: Option<Span>) -> Self {
        Self { message: value.to_display_string(), span, payload: Some(value) }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ModuleError {
    pub message: String,
    pub specifier: String,
}

impl ModuleError {
    pub fn new(message: impl Into<String>, specifier: impl Into<String>) -> Self {
        Self { message: message.into(), specifier: specifier.into() }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HostError {
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Span;

    #[test]
    fn runtime_error_has_span() {
        let err = RuntimeError::new("oops", Some(Span::new(5, 10, 1, 6)));
        assert_eq!(err.span.unwrap().start, 5);
    }

    #[test]
    fn display_with_source_shows_line_and_underline() {
        let err = EcError::Syntax(SyntaxError::new("unexpected token", Span::new(8, 14, 1, 9)));
        let source = "All men mortal are.";
        let display = err.display_with_source(source);
        assert!(display.contains("mortal"), "{display}");
        assert!(display.contains("^^^^^^"), "{display}");
        assert!(display.contains("Syntax Error at Line 1, Column 9"), "{display}");
    }

    #[test]
    fn display_with_source_suggests_typo_fix() {
        let err = EcError::Syntax(SyntaxError::new("unexpected identifier", Span::new(0, 8, 1, 1)));
        let source = "fucntion foo() {}";
        let display = err.display_with_source(source);
        assert!(display.contains("did you mean"), "{display}");
        assert!(display.contains("function"), "{display}");
    }

    #[test]
    fn display_with_source_has_color_codes() {
        let err = EcError::Lex(LexError::new("unterminated string", Span::new(0, 3, 1, 1)));
        let source = "\"abc";
        let display = err.display_with_source(source);
        assert!(display.contains("\x1b["), "{display}");
    }

    #[test]
    fn source_map_tracks_line_and_column() {
        let map = SourceMap::new("abc\ndef\nghi");
        assert_eq!(map.line_col(0), (1, 1));
        assert_eq!(map.line_col(4), (2, 1));
        assert_eq!(map.line_col(9), (3, 2));
    }

    #[test]
    fn thrown_runtime_error_keeps_payload_for_catch() {
        let err = RuntimeError::thrown(Value::Number(42.0), None);
        assert_eq!(err.payload, Some(Value::Number(42.0)));
    }
}
