//! Recursive-descent parser for the Kiln source dialect.
//!
//! The parser builds an unresolved tree: scopes are [`ScopeId::UNASSIGNED`], identifiers
//! are [`Resolution::Unresolved`] and every expression has type `any`. Run
//! [`crate::resolver::resolve`] afterwards.

mod expr;
mod pattern;
mod stmt;
mod types;

use crate::ast::*;
use crate::error::{SyntaxError, SyntaxResult};
use crate::lexer::Lexer;
use crate::scope::ScopeId;
use crate::span::Span;
use crate::token::Token;

/// Parser over a token stream
pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    next_node: u32,
    in_generator: bool,
    in_async: bool,
    /// Tokens overwritten while splitting `>>`, for speculative rollback
    split_log: Vec<(usize, (Token, Span))>,
}

impl Parser {
    /// Tokenize `source` and prepare to parse it
    pub fn new(source: &str) -> SyntaxResult<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self {
            tokens,
            pos: 0,
            next_node: 1,
            in_generator: false,
            in_async: false,
            split_log: Vec::new(),
        })
    }

    /// Parse a whole module
    pub fn parse(mut self) -> SyntaxResult<Module> {
        let start = self.current_span();
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        let span = Span::new(start.start, self.current_span().end, 1, 1);
        Ok(Module {
            body,
            scope: ScopeId::UNASSIGNED,
            span,
        })
    }

    // ========================================================================
    // Token cursor
    // ========================================================================

    fn current(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].0
    }

    fn current_span(&self) -> Span {
        let idx = self.pos.min(self.tokens.len() - 1);
        self.tokens[idx].1
    }

    fn previous_span(&self) -> Span {
        if self.pos == 0 {
            return self.current_span();
        }
        self.tokens[(self.pos - 1).min(self.tokens.len() - 1)].1
    }

    fn at_eof(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> SyntaxResult<Span> {
        if self.check(&token) {
            let span = self.current_span();
            self.advance();
            Ok(span)
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn check_contextual(&self, name: &str) -> bool {
        matches!(self.current(), Token::Identifier(n) if n == name)
    }

    fn expect_identifier(&mut self) -> SyntaxResult<Identifier> {
        match self.current().clone() {
            Token::Identifier(name) => {
                let span = self.current_span();
                self.advance();
                Ok(Identifier::new(name, span))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        SyntaxError::UnexpectedToken {
            found: self.current().to_string(),
            expected: expected.to_string(),
            span: self.current_span(),
        }
    }

    fn invalid(&self, message: impl Into<String>, span: Span) -> SyntaxError {
        SyntaxError::InvalidSyntax {
            message: message.into(),
            span,
        }
    }

    /// Span from `start` through the last consumed token
    fn span_from(&self, start: Span) -> Span {
        let end = self.previous_span().end.max(start.end);
        Span::new(start.start, end, start.line, start.column)
    }

    fn node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    /// Consume an optional statement terminator
    fn consume_semicolon(&mut self) {
        self.eat(&Token::Semicolon);
    }

    /// Index of the token matching the opening bracket at `self.pos + offset`
    fn matching_close(&self, offset: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut idx = self.pos + offset;
        while idx < self.tokens.len() {
            match &self.tokens[idx].0 {
                Token::LeftParen | Token::LeftBracket | Token::LeftBrace => depth += 1,
                Token::RightParen | Token::RightBracket | Token::RightBrace => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(idx);
                    }
                }
                Token::Eof => return None,
                _ => {}
            }
            idx += 1;
        }
        None
    }

    fn token_at(&self, idx: usize) -> &Token {
        &self.tokens[idx.min(self.tokens.len() - 1)].0
    }
}

/// Parse `source` into an unresolved module
pub fn parse(source: &str) -> SyntaxResult<Module> {
    Parser::new(source)?.parse()
}
