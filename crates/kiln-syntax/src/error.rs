//! Errors raised while reading or resolving a syntax tree.

use crate::span::Span;
use thiserror::Error;

/// Result alias for syntax-tree construction
pub type SyntaxResult<T> = Result<T, SyntaxError>;

/// Errors produced by the lexer, parser, or resolver
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyntaxError {
    /// Character sequence that starts no token
    #[error("unexpected character '{text}' at {span}")]
    UnexpectedCharacter {
        /// Offending text
        text: String,
        /// Location
        span: Span,
    },

    /// Token that does not fit the grammar
    #[error("unexpected {found} at {span}, expected {expected}")]
    UnexpectedToken {
        /// What was found
        found: String,
        /// What the parser wanted
        expected: String,
        /// Location
        span: Span,
    },

    /// Grammatically valid but malformed construct
    #[error("invalid syntax at {span}: {message}")]
    InvalidSyntax {
        /// Explanation
        message: String,
        /// Location
        span: Span,
    },

    /// Type annotation naming something that is not a type
    #[error("unknown type '{name}' at {span}")]
    UnknownType {
        /// Name used
        name: String,
        /// Location
        span: Span,
    },

    /// `break`/`continue` with no enclosing target
    #[error("'{keyword}' outside of a valid target at {span}")]
    InvalidJumpTarget {
        /// `break` or `continue`
        keyword: &'static str,
        /// Location
        span: Span,
    },
}

impl SyntaxError {
    /// Location of the error
    pub fn span(&self) -> Span {
        match self {
            SyntaxError::UnexpectedCharacter { span, .. }
            | SyntaxError::UnexpectedToken { span, .. }
            | SyntaxError::InvalidSyntax { span, .. }
            | SyntaxError::UnknownType { span, .. }
            | SyntaxError::InvalidJumpTarget { span, .. } => *span,
        }
    }
}
