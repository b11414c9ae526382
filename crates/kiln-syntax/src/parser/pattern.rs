//! Pattern parsing: binding patterns and expression-to-pattern conversion

use super::Parser;
use crate::ast::*;
use crate::error::SyntaxResult;
use crate::token::Token;

impl Parser {
    /// Parse a binding pattern: `x: T`, `[a, , b = 1, ...r]`, `{ a, b: c = 2, ...r }`
    pub(super) fn parse_binding_pattern(&mut self) -> SyntaxResult<Pattern> {
        match self.current() {
            Token::LeftBracket => self.parse_array_pattern(),
            Token::LeftBrace => self.parse_object_pattern(),
            _ => {
                let ident = self.expect_identifier()?;
                let annotation = if self.eat(&Token::Colon) {
                    Some(self.parse_type_annotation()?)
                } else {
                    None
                };
                Ok(Pattern::Identifier(BindingPattern { ident, annotation }))
            }
        }
    }

    fn parse_array_pattern(&mut self) -> SyntaxResult<Pattern> {
        let start = self.expect(Token::LeftBracket)?;
        let mut elements = Vec::new();
        let mut rest = None;

        while !self.check(&Token::RightBracket) && !self.at_eof() {
            if self.eat(&Token::Comma) {
                elements.push(None);
                continue;
            }
            if self.eat(&Token::DotDotDot) {
                rest = Some(Box::new(self.parse_binding_pattern()?));
                if !self.check(&Token::RightBracket) {
                    return Err(self.invalid(
                        "rest element must be last in array pattern",
                        self.current_span(),
                    ));
                }
                break;
            }
            let elem_start = self.current_span();
            let pattern = self.parse_binding_pattern()?;
            let default = if self.eat(&Token::Equal) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            elements.push(Some(PatternElement {
                pattern,
                default,
                span: self.span_from(elem_start),
            }));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RightBracket)?;

        Ok(Pattern::Array(ArrayPattern {
            elements,
            rest,
            span: self.span_from(start),
        }))
    }

    fn parse_object_pattern(&mut self) -> SyntaxResult<Pattern> {
        let start = self.expect(Token::LeftBrace)?;
        let mut properties = Vec::new();
        let mut rest = None;

        while !self.check(&Token::RightBrace) && !self.at_eof() {
            if self.eat(&Token::DotDotDot) {
                rest = Some(Box::new(self.parse_binding_pattern()?));
                if !self.check(&Token::RightBrace) {
                    return Err(self.invalid(
                        "rest element must be last in object pattern",
                        self.current_span(),
                    ));
                }
                break;
            }
            let prop_start = self.current_span();
            let key = self.parse_property_key()?;
            let value = if self.eat(&Token::Colon) {
                self.parse_binding_pattern()?
            } else {
                match &key {
                    PropertyKey::Named(name) => Pattern::Identifier(BindingPattern {
                        ident: Identifier::new(name.clone(), prop_start),
                        annotation: None,
                    }),
                    PropertyKey::Computed(_) => return Err(self.unexpected(":")),
                }
            };
            let default = if self.eat(&Token::Equal) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            properties.push(ObjectPatternProperty {
                key,
                value,
                default,
                span: self.span_from(prop_start),
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RightBrace)?;

        Ok(Pattern::Object(ObjectPattern {
            properties,
            rest,
            span: self.span_from(start),
        }))
    }

    /// `name`, `"str"`, `42` or `[expr]`
    pub(super) fn parse_property_key(&mut self) -> SyntaxResult<PropertyKey> {
        match self.current().clone() {
            Token::Identifier(name) | Token::String(name) => {
                self.advance();
                Ok(PropertyKey::Named(name))
            }
            Token::Number(n) => {
                self.advance();
                Ok(PropertyKey::Named(format_number_key(n)))
            }
            Token::LeftBracket => {
                self.advance();
                let expr = self.parse_assignment()?;
                self.expect(Token::RightBracket)?;
                Ok(PropertyKey::Computed(Box::new(expr)))
            }
            // Keywords are valid property names
            other => match keyword_name(&other) {
                Some(name) => {
                    self.advance();
                    Ok(PropertyKey::Named(name.to_string()))
                }
                None => Err(self.unexpected("property name")),
            },
        }
    }

    /// Reinterpret an already parsed expression as an assignment pattern
    pub(super) fn expression_to_pattern(&self, expr: Expression) -> SyntaxResult<Pattern> {
        let span = expr.span;
        match expr.kind {
            ExpressionKind::Identifier(ident) => Ok(Pattern::Identifier(BindingPattern {
                ident,
                annotation: None,
            })),
            ExpressionKind::Array(items) => {
                let mut elements = Vec::new();
                let mut rest = None;
                let count = items.len();
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        ArrayElement::Hole => elements.push(None),
                        ArrayElement::Spread(inner) => {
                            if i + 1 != count {
                                return Err(self.invalid("rest element must be last", inner.span));
                            }
                            rest = Some(Box::new(self.expression_to_pattern(inner)?));
                        }
                        ArrayElement::Expression(e) => {
                            let elem_span = e.span;
                            let (pattern, default) = self.split_default(e)?;
                            elements.push(Some(PatternElement {
                                pattern,
                                default,
                                span: elem_span,
                            }));
                        }
                    }
                }
                Ok(Pattern::Array(ArrayPattern {
                    elements,
                    rest,
                    span,
                }))
            }
            ExpressionKind::Object(props) => {
                let mut properties = Vec::new();
                let mut rest = None;
                let count = props.len();
                for (i, prop) in props.into_iter().enumerate() {
                    match prop {
                        ObjectProperty::Spread(inner) => {
                            if i + 1 != count {
                                return Err(self.invalid("rest element must be last", inner.span));
                            }
                            rest = Some(Box::new(self.expression_to_pattern(inner)?));
                        }
                        ObjectProperty::KeyValue { key, value } => {
                            let prop_span = value.span;
                            let (value, default) = self.split_default(value)?;
                            properties.push(ObjectPatternProperty {
                                key,
                                value,
                                default,
                                span: prop_span,
                            });
                        }
                    }
                }
                Ok(Pattern::Object(ObjectPattern {
                    properties,
                    rest,
                    span,
                }))
            }
            kind => Ok(Pattern::Expression(Box::new(Expression::new(kind, span)))),
        }
    }

    /// `target = default` inside an assignment pattern
    fn split_default(&self, expr: Expression) -> SyntaxResult<(Pattern, Option<Expression>)> {
        let span = expr.span;
        match expr.kind {
            ExpressionKind::Assignment {
                op: AssignmentOperator::Assign,
                target,
                value,
            } => {
                let pattern = match target {
                    AssignmentTarget::Pattern(p) => p,
                    AssignmentTarget::Simple(e) => self.expression_to_pattern(*e)?,
                };
                Ok((pattern, Some(*value)))
            }
            kind => Ok((self.expression_to_pattern(Expression::new(kind, span))?, None)),
        }
    }
}

fn format_number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn keyword_name(token: &Token) -> Option<&'static str> {
    Some(match token {
        Token::Default => "default",
        Token::New => "new",
        Token::Return => "return",
        Token::Throw => "throw",
        Token::Class => "class",
        Token::Function => "function",
        Token::Catch => "catch",
        Token::Finally => "finally",
        _ => return None,
    })
}
