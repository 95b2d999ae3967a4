//! Error types for every stage of the pipeline.

use std::fmt;

use crate::span::Span;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Clone, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Unterminated block comment at {0}")]
    UnterminatedComment(Span),

    #[error("Invalid escape sequence '\\{0}' at {1}")]
    InvalidEscape(char, Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),
}

impl LexerError {
    pub fn unexpected_char(c: char, span: Span) -> Self {
        Self::UnexpectedChar(c, span)
    }

    pub fn unterminated_string(span: Span) -> Self {
        Self::UnterminatedString(span)
    }

    pub fn unterminated_comment(span: Span) -> Self {
        Self::UnterminatedComment(span)
    }

    pub fn invalid_escape(c: char, span: Span) -> Self {
        Self::InvalidEscape(c, span)
    }

    pub fn invalid_number(s: String, span: Span) -> Self {
        Self::InvalidNumber(s, span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::UnterminatedComment(span) => *span,
            Self::InvalidEscape(_, span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Clone, Error)]
pub enum ParserError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Unexpected end of file at {0}")]
    UnexpectedEof(Span),

    #[error("Invalid assignment target at {0}")]
    InvalidAssignmentTarget(Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn unexpected_eof(span: Span) -> Self {
        Self::UnexpectedEof(span)
    }

    pub fn invalid_assignment_target(span: Span) -> Self {
        Self::InvalidAssignmentTarget(span)
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEof(span) => *span,
            Self::InvalidAssignmentTarget(span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

impl From<LexerError> for ParserError {
    fn from(err: LexerError) -> Self {
        Self::General {
            message: err.to_string(),
            span: err.span(),
        }
    }
}

/// Bytecode generation errors.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("Type mismatch: expected {expected}, found {found} at {span}")]
    TypeMismatch {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Cannot assign to constant '{0}' at {1}")]
    ConstAssignment(String, Span),

    #[error("'{0}' is already declared in this scope at {1}")]
    Redeclaration(String, Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn type_mismatch(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::TypeMismatch { span, .. } => *span,
            Self::ConstAssignment(_, span) => *span,
            Self::Redeclaration(_, span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

/// Fatal runtime errors. These unwind the whole run; recoverable failures
/// are represented as `Value::Error` instead.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("Type error: parameter '{param}' of '{function}' expects {expected}, got {found} at {span}")]
    SchemaMismatch {
        function: String,
        param: String,
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Cannot {keyword} out of {depth} loop(s) at {span}")]
    LoopDepth {
        keyword: &'static str,
        depth: usize,
        span: Span,
    },

    #[error("For loop source must be a list, got {0} at {1}")]
    InvalidForSource(String, Span),

    #[error("Stack underflow at {0}")]
    StackUnderflow(Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::SchemaMismatch { span, .. } => *span,
            Self::LoopDepth { span, .. } => *span,
            Self::InvalidForSource(_, span) => *span,
            Self::StackUnderflow(span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

/// A list of compile diagnostics gathered from one compilation unit.
#[derive(Debug, Clone)]
pub struct Diagnostics(pub Vec<CompileError>);

impl Diagnostics {
    pub fn first_span(&self) -> Span {
        self.0.first().map(|e| e.span()).unwrap_or_default()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

/// Unified error type for the whole pipeline.
#[derive(Debug, Error)]
pub enum LumoError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Compile error: {0}")]
    Compile(#[from] Diagnostics),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LumoError {
    /// Location of the first error, when the stage tracks one.
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Lexer(e) => Some(e.span()),
            Self::Parser(e) => Some(e.span()),
            Self::Compile(e) => Some(e.first_span()),
            Self::Runtime(e) => Some(e.span()),
            Self::Io(_) => None,
        }
    }

    /// Process exit code used by the CLI for this class of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Lexer(_) | Self::Parser(_) | Self::Compile(_) => 65,
            Self::Runtime(_) => 70,
            Self::Io(_) => 74,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lumo_error_span_and_exit_code() {
        let err: LumoError = RuntimeError::new("boom", Span::new(0, 1, 3, 4)).into();
        assert_eq!(err.span(), Some(Span::new(0, 1, 3, 4)));
        assert_eq!(err.exit_code(), 70);

        let diags = Diagnostics(vec![CompileError::new("bad", Span::new(0, 0, 2, 1))]);
        let err: LumoError = diags.into();
        assert_eq!(err.span().map(|s| s.line), Some(2));
        assert_eq!(err.exit_code(), 65);
    }
}
