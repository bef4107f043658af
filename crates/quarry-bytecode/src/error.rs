//! Assembly error types with miette integration.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::lexer::Span;

/// An assembly error with source context.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum AsmError {
    #[error("unexpected token: expected {expected}, found {found}")]
    #[diagnostic(code(asm::unexpected_token))]
    UnexpectedToken {
        #[source_code]
        src: String,
        #[label("found {found} here")]
        span: SourceSpan,
        expected: String,
        found: String,
    },

    #[error("unexpected end of file: expected {expected}")]
    #[diagnostic(code(asm::unexpected_eof))]
    UnexpectedEof { expected: String },

    #[error("unknown label: {name}")]
    #[diagnostic(code(asm::unknown_label))]
    UnknownLabel {
        #[source_code]
        src: String,
        #[label("no label named {name}")]
        span: SourceSpan,
        name: String,
    },

    #[error("duplicate label: {name}")]
    #[diagnostic(code(asm::duplicate_label))]
    DuplicateLabel {
        #[source_code]
        src: String,
        #[label("{name} is already defined")]
        span: SourceSpan,
        name: String,
    },

    #[error("unknown function: @{name}")]
    #[diagnostic(code(asm::unknown_function))]
    UnknownFunction {
        #[source_code]
        src: String,
        #[label("no fn named {name} in this file")]
        span: SourceSpan,
        name: String,
    },

    #[error("recursive code reference: @{name}")]
    #[diagnostic(code(asm::recursive_function))]
    RecursiveFunction {
        #[source_code]
        src: String,
        #[label("{name} refers back to itself")]
        span: SourceSpan,
        name: String,
    },
}

impl AsmError {
    pub fn unexpected_token(
        span: Span,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        AsmError::UnexpectedToken {
            src: String::new(), // Will be filled in later
            span: (span.start, span.len()).into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_eof(expected: impl Into<String>) -> Self {
        AsmError::UnexpectedEof {
            expected: expected.into(),
        }
    }

    /// Add source code context to the error.
    pub fn with_source(self, source: &str) -> Self {
        match self {
            AsmError::UnexpectedToken {
                span,
                expected,
                found,
                ..
            } => AsmError::UnexpectedToken {
                src: source.to_string(),
                span,
                expected,
                found,
            },
            AsmError::UnknownLabel { span, name, .. } => AsmError::UnknownLabel {
                src: source.to_string(),
                span,
                name,
            },
            AsmError::DuplicateLabel { span, name, .. } => AsmError::DuplicateLabel {
                src: source.to_string(),
                span,
                name,
            },
            AsmError::UnknownFunction { span, name, .. } => AsmError::UnknownFunction {
                src: source.to_string(),
                span,
                name,
            },
            AsmError::RecursiveFunction { span, name, .. } => AsmError::RecursiveFunction {
                src: source.to_string(),
                span,
                name,
            },
            other => other,
        }
    }
}
