//! Lexer for the assembly format.

use logos::Logos;

use crate::token::TokenKind;

/// A span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Byte offset of the start.
    pub start: usize,
    /// Byte offset of the end (exclusive).
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A token with its source span.
#[derive(Debug, Clone)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// The source span.
    pub span: Span,
}

/// Tokenize source text into a list of tokens.
pub fn lex(source: &str) -> Vec<Token> {
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(kind) => {
                tokens.push(Token {
                    kind,
                    span: Span::new(span.start, span.end),
                });
            }
            Err(_) => {
                // Skip unrecognized characters, the parser reports the
                // resulting token mismatch.
            }
        }
    }

    tokens
}
