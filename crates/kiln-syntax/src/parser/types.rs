//! Type annotation parsing

use super::Parser;
use crate::ast::*;
use crate::error::SyntaxResult;
use crate::span::Span;
use crate::token::Token;
use crate::types::TypeId;

impl Parser {
    /// `<T, U>` after a function or class name
    pub(super) fn parse_type_params(&mut self) -> SyntaxResult<Vec<TypeParam>> {
        let mut params = Vec::new();
        if !self.eat(&Token::Less) {
            return Ok(params);
        }
        loop {
            let ident = self.expect_identifier()?;
            params.push(TypeParam {
                name: ident.name,
                ty: TypeId::ANY,
                span: ident.span,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect_type_close()?;
        Ok(params)
    }

    /// A full type: union of postfix types
    pub(super) fn parse_type_annotation(&mut self) -> SyntaxResult<TypeAnnotation> {
        let mut members = vec![self.parse_postfix_type()?];
        while self.eat(&Token::Pipe) {
            members.push(self.parse_postfix_type()?);
        }
        if members.len() == 1 {
            Ok(members.remove(0))
        } else {
            Ok(TypeAnnotation::Union(members))
        }
    }

    fn parse_postfix_type(&mut self) -> SyntaxResult<TypeAnnotation> {
        let mut ty = self.parse_primary_type()?;
        while self.check(&Token::LeftBracket) && self.peek_at(1) == &Token::RightBracket {
            self.advance();
            self.advance();
            ty = TypeAnnotation::Array(Box::new(ty));
        }
        Ok(ty)
    }

    fn parse_primary_type(&mut self) -> SyntaxResult<TypeAnnotation> {
        let start = self.current_span();
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                let args = if self.check(&Token::Less) {
                    self.advance();
                    self.parse_type_list()?
                } else {
                    Vec::new()
                };
                Ok(TypeAnnotation::Named {
                    name,
                    args,
                    span: self.span_from(start),
                })
            }
            Token::Null | Token::Void => {
                let name = if self.check(&Token::Null) { "null" } else { "void" };
                self.advance();
                Ok(TypeAnnotation::Named {
                    name: name.to_string(),
                    args: Vec::new(),
                    span: start,
                })
            }
            Token::LeftParen => {
                let is_function = self
                    .matching_close(0)
                    .map(|close| self.token_at(close + 1) == &Token::Arrow)
                    .unwrap_or(false);
                self.advance();
                if !is_function {
                    let inner = self.parse_type_annotation()?;
                    self.expect(Token::RightParen)?;
                    return Ok(inner);
                }
                let mut params = Vec::new();
                while !self.check(&Token::RightParen) {
                    if matches!(self.current(), Token::Identifier(_)) && self.peek_at(1) == &Token::Colon {
                        self.advance();
                        self.advance();
                    }
                    params.push(self.parse_type_annotation()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RightParen)?;
                self.expect(Token::Arrow)?;
                let ret = self.parse_type_annotation()?;
                Ok(TypeAnnotation::Function {
                    params,
                    ret: Box::new(ret),
                })
            }
            Token::LeftBrace => {
                self.advance();
                let mut props = Vec::new();
                while !self.check(&Token::RightBrace) {
                    let name = self.expect_identifier()?;
                    self.expect(Token::Colon)?;
                    let ty = self.parse_type_annotation()?;
                    props.push((name.name, ty));
                    if !self.eat(&Token::Comma) && !self.eat(&Token::Semicolon) {
                        break;
                    }
                }
                self.expect(Token::RightBrace)?;
                Ok(TypeAnnotation::Object(props))
            }
            _ => Err(self.unexpected("type")),
        }
    }

    /// Comma-separated types up to the closing `>`; the opening `<` is consumed
    pub(super) fn parse_type_list(&mut self) -> SyntaxResult<Vec<TypeAnnotation>> {
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type_annotation()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect_type_close()?;
        Ok(args)
    }

    /// Expect `>`, splitting `>>` and `>>>` so nested argument lists close one at a time
    pub(super) fn expect_type_close(&mut self) -> SyntaxResult<()> {
        let remainder = match self.current() {
            Token::Greater => None,
            Token::GreaterGreater => Some(Token::Greater),
            Token::GreaterGreaterGreater => Some(Token::GreaterGreater),
            Token::GreaterEqual => Some(Token::Equal),
            _ => return Err(self.unexpected(">")),
        };
        match remainder {
            None => {
                self.advance();
            }
            Some(rest) => {
                let span = self.current_span();
                let rest_span = Span::new(span.start + 1, span.end, span.line, span.column + 1);
                self.split_log.push((self.pos, self.tokens[self.pos].clone()));
                self.tokens[self.pos] = (rest, rest_span);
            }
        }
        Ok(())
    }

    /// Speculatively parse `<types>` followed by `(`; restores the cursor on failure
    pub(super) fn try_parse_call_type_args(&mut self) -> Option<Vec<TypeAnnotation>> {
        if !self.check(&Token::Less) {
            return None;
        }
        let saved_pos = self.pos;
        let saved_log = self.split_log.len();
        self.advance();
        match self.parse_type_list() {
            Ok(args) if self.check(&Token::LeftParen) => Some(args),
            _ => {
                while self.split_log.len() > saved_log {
                    if let Some((idx, token)) = self.split_log.pop() {
                        self.tokens[idx] = token;
                    }
                }
                self.pos = saved_pos;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use crate::ast::*;

    fn first_call_type_args(source: &str) -> usize {
        let module = parse(source).unwrap();
        match &module.body[0] {
            Statement::Expression(s) => match &s.expression.kind {
                ExpressionKind::Call {
                    type_annotations, ..
                } => type_annotations.len(),
                _ => 0,
            },
            _ => 0,
        }
    }

    #[test]
    fn test_call_type_args() {
        assert_eq!(first_call_type_args("id<number>(1);"), 1);
        assert_eq!(first_call_type_args("pair<number, Box<string>>(1, b);"), 2);
    }

    #[test]
    fn test_less_than_is_not_type_args() {
        let module = parse("a < b;").unwrap();
        match &module.body[0] {
            Statement::Expression(s) => {
                assert!(matches!(s.expression.kind, ExpressionKind::Binary { .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_recursive_alias_parses() {
        let module = parse("type F = () => G; type G = () => F;").unwrap();
        assert_eq!(module.body.len(), 2);
        assert!(matches!(module.body[0], Statement::TypeAlias(_)));
    }
}
