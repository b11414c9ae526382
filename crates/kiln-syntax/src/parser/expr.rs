//! Expression parsing (precedence climbing)

use super::Parser;
use crate::ast::*;
use crate::error::SyntaxResult;
use crate::scope::ScopeId;
use crate::span::Span;
use crate::token::Token;
use crate::types::TypeId;

enum BinaryKind {
    Binary(BinaryOperator),
    Logical(LogicalOperator),
}

fn binary_operator(token: &Token) -> Option<(u8, BinaryKind)> {
    use BinaryOperator as B;
    let entry = match token {
        Token::QuestionQuestion => (1, BinaryKind::Logical(LogicalOperator::Nullish)),
        Token::PipePipe => (2, BinaryKind::Logical(LogicalOperator::Or)),
        Token::AmpAmp => (3, BinaryKind::Logical(LogicalOperator::And)),
        Token::Pipe => (4, BinaryKind::Binary(B::BitOr)),
        Token::Caret => (5, BinaryKind::Binary(B::BitXor)),
        Token::Amp => (6, BinaryKind::Binary(B::BitAnd)),
        Token::EqualEqual => (7, BinaryKind::Binary(B::LooseEqual)),
        Token::BangEqual => (7, BinaryKind::Binary(B::LooseNotEqual)),
        Token::EqualEqualEqual => (7, BinaryKind::Binary(B::StrictEqual)),
        Token::BangEqualEqual => (7, BinaryKind::Binary(B::StrictNotEqual)),
        Token::Less => (8, BinaryKind::Binary(B::Less)),
        Token::LessEqual => (8, BinaryKind::Binary(B::LessEqual)),
        Token::Greater => (8, BinaryKind::Binary(B::Greater)),
        Token::GreaterEqual => (8, BinaryKind::Binary(B::GreaterEqual)),
        Token::LessLess => (9, BinaryKind::Binary(B::ShiftLeft)),
        Token::GreaterGreater => (9, BinaryKind::Binary(B::ShiftRight)),
        Token::GreaterGreaterGreater => (9, BinaryKind::Binary(B::UnsignedShiftRight)),
        Token::Plus => (10, BinaryKind::Binary(B::Add)),
        Token::Minus => (10, BinaryKind::Binary(B::Sub)),
        Token::Star => (11, BinaryKind::Binary(B::Mul)),
        Token::Slash => (11, BinaryKind::Binary(B::Div)),
        Token::Percent => (11, BinaryKind::Binary(B::Mod)),
        Token::StarStar => (12, BinaryKind::Binary(B::Exp)),
        _ => return None,
    };
    Some(entry)
}

fn assignment_operator(token: &Token) -> Option<AssignmentOperator> {
    Some(match token {
        Token::Equal => AssignmentOperator::Assign,
        Token::PlusEqual => AssignmentOperator::Compound(BinaryOperator::Add),
        Token::MinusEqual => AssignmentOperator::Compound(BinaryOperator::Sub),
        Token::StarEqual => AssignmentOperator::Compound(BinaryOperator::Mul),
        Token::SlashEqual => AssignmentOperator::Compound(BinaryOperator::Div),
        Token::PercentEqual => AssignmentOperator::Compound(BinaryOperator::Mod),
        _ => return None,
    })
}

impl Parser {
    /// Comma-separated expression
    pub(super) fn parse_expression(&mut self) -> SyntaxResult<Expression> {
        let start = self.current_span();
        let first = self.parse_assignment()?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat(&Token::Comma) {
            exprs.push(self.parse_assignment()?);
        }
        Ok(Expression::new(ExpressionKind::Sequence(exprs), self.span_from(start)))
    }

    /// Assignment-level expression (also yield and arrow functions)
    pub(super) fn parse_assignment(&mut self) -> SyntaxResult<Expression> {
        let start = self.current_span();

        if self.in_generator && self.check_contextual("yield") {
            return self.parse_yield();
        }
        if let Some(is_async) = self.arrow_ahead() {
            return self.parse_arrow(is_async);
        }

        let target = self.parse_conditional()?;
        let op = match assignment_operator(self.current()) {
            Some(op) => op,
            None => return Ok(target),
        };
        self.advance();
        let value = self.parse_assignment()?;

        let is_literal = matches!(target.kind, ExpressionKind::Array(_) | ExpressionKind::Object(_));
        let target = if op == AssignmentOperator::Assign && is_literal {
            AssignmentTarget::Pattern(self.expression_to_pattern(target)?)
        } else {
            AssignmentTarget::Simple(Box::new(target))
        };
        Ok(Expression::new(
            ExpressionKind::Assignment {
                op,
                target,
                value: Box::new(value),
            },
            self.span_from(start),
        ))
    }

    fn parse_yield(&mut self) -> SyntaxResult<Expression> {
        let start = self.current_span();
        self.advance();
        let delegate = self.eat(&Token::Star);
        let ends_here = matches!(
            self.current(),
            Token::RightParen
                | Token::RightBracket
                | Token::RightBrace
                | Token::Comma
                | Token::Semicolon
                | Token::Colon
                | Token::Eof
        );
        let argument = if ends_here && !delegate {
            None
        } else {
            Some(Box::new(self.parse_assignment()?))
        };
        Ok(Expression::new(
            ExpressionKind::Yield { argument, delegate },
            self.span_from(start),
        ))
    }

    /// `Some(is_async)` if an arrow function starts at the cursor
    fn arrow_ahead(&self) -> Option<bool> {
        let mut offset = 0;
        let mut is_async = false;
        if self.check_contextual("async")
            && matches!(self.peek_at(1), Token::Identifier(_) | Token::LeftParen)
        {
            offset = 1;
            is_async = true;
        }
        match self.peek_at(offset) {
            Token::Identifier(_) if self.peek_at(offset + 1) == &Token::Arrow => Some(is_async),
            Token::LeftParen => {
                let close = self.matching_close(offset)?;
                (self.token_at(close + 1) == &Token::Arrow).then_some(is_async)
            }
            _ => None,
        }
    }

    fn parse_arrow(&mut self, is_async: bool) -> SyntaxResult<Expression> {
        let start = self.current_span();
        if is_async {
            self.advance();
        }
        let id = self.node_id();
        let params = if matches!(self.current(), Token::Identifier(_)) {
            let ident = self.expect_identifier()?;
            let span = ident.span;
            vec![Param {
                pattern: Pattern::Identifier(BindingPattern {
                    ident,
                    annotation: None,
                }),
                default: None,
                rest: false,
                span,
            }]
        } else {
            self.parse_params()?
        };
        self.expect(Token::Arrow)?;

        let saved = (self.in_generator, self.in_async);
        self.in_generator = false;
        self.in_async = is_async;
        let body = if self.check(&Token::LeftBrace) {
            self.parse_block().map(|b| FunctionBody::Block(b.body))
        } else {
            self.parse_assignment().map(|e| FunctionBody::Expression(Box::new(e)))
        };
        self.in_generator = saved.0;
        self.in_async = saved.1;
        let body = body?;

        let span = self.span_from(start);
        Ok(Expression::new(
            ExpressionKind::Function(Box::new(Function {
                id,
                name: None,
                kind: FunctionKind::Arrow,
                is_generator: false,
                is_async,
                type_params: Vec::new(),
                params,
                return_annotation: None,
                return_ty: TypeId::ANY,
                body,
                scope: ScopeId::UNASSIGNED,
                this_binding: None,
                span,
            })),
            span,
        ))
    }

    fn parse_conditional(&mut self) -> SyntaxResult<Expression> {
        let start = self.current_span();
        let test = self.parse_binary(1)?;
        if !self.eat(&Token::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect(Token::Colon)?;
        let alternate = self.parse_assignment()?;
        Ok(Expression::new(
            ExpressionKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            self.span_from(start),
        ))
    }

    fn parse_binary(&mut self, min_prec: u8) -> SyntaxResult<Expression> {
        let start = self.current_span();
        let mut left = self.parse_unary()?;
        while let Some((prec, kind)) = binary_operator(self.current()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            // `**` is right-associative
            let next_min = if prec == 12 { prec } else { prec + 1 };
            let right = self.parse_binary(next_min)?;
            let expr_kind = match kind {
                BinaryKind::Binary(op) => ExpressionKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                BinaryKind::Logical(op) => ExpressionKind::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
            left = Expression::new(expr_kind, self.span_from(start));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> SyntaxResult<Expression> {
        let start = self.current_span();
        let op = match self.current() {
            Token::Bang => Some(UnaryOperator::Not),
            Token::Minus => Some(UnaryOperator::Minus),
            Token::Plus => Some(UnaryOperator::Plus),
            Token::Tilde => Some(UnaryOperator::BitNot),
            Token::Typeof => Some(UnaryOperator::Typeof),
            Token::Void => Some(UnaryOperator::Void),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let argument = self.parse_unary()?;
            return Ok(Expression::new(
                ExpressionKind::Unary {
                    op,
                    argument: Box::new(argument),
                },
                self.span_from(start),
            ));
        }
        if matches!(self.current(), Token::PlusPlus | Token::MinusMinus) {
            let op = if self.check(&Token::PlusPlus) {
                UpdateOperator::Increment
            } else {
                UpdateOperator::Decrement
            };
            self.advance();
            let target = self.parse_unary()?;
            return Ok(Expression::new(
                ExpressionKind::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                },
                self.span_from(start),
            ));
        }
        if self.in_async && self.check_contextual("await") {
            self.advance();
            let argument = self.parse_unary()?;
            return Ok(Expression::new(
                ExpressionKind::Await(Box::new(argument)),
                self.span_from(start),
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> SyntaxResult<Expression> {
        let start = self.current_span();
        let expr = self.parse_call_member()?;
        let same_line = self.current_span().line == self.previous_span().line;
        if same_line && matches!(self.current(), Token::PlusPlus | Token::MinusMinus) {
            let op = if self.check(&Token::PlusPlus) {
                UpdateOperator::Increment
            } else {
                UpdateOperator::Decrement
            };
            self.advance();
            return Ok(Expression::new(
                ExpressionKind::Update {
                    op,
                    prefix: false,
                    target: Box::new(expr),
                },
                self.span_from(start),
            ));
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> SyntaxResult<Expression> {
        let start = self.current_span();
        let mut expr = if self.check(&Token::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat(&Token::Dot) {
                let name = self.parse_member_name()?;
                expr = Expression::new(
                    ExpressionKind::Member {
                        object: Box::new(expr),
                        property: PropertyKey::Named(name),
                    },
                    self.span_from(start),
                );
            } else if self.eat(&Token::LeftBracket) {
                let index = self.parse_expression()?;
                self.expect(Token::RightBracket)?;
                expr = Expression::new(
                    ExpressionKind::Member {
                        object: Box::new(expr),
                        property: PropertyKey::Computed(Box::new(index)),
                    },
                    self.span_from(start),
                );
            } else if self.check(&Token::LeftParen) {
                let arguments = self.parse_arguments()?;
                expr = Expression::new(
                    ExpressionKind::Call {
                        callee: Box::new(expr),
                        type_annotations: Vec::new(),
                        type_args: Vec::new(),
                        arguments,
                    },
                    self.span_from(start),
                );
            } else if let Some(type_annotations) = self.try_parse_call_type_args() {
                let arguments = self.parse_arguments()?;
                expr = Expression::new(
                    ExpressionKind::Call {
                        callee: Box::new(expr),
                        type_annotations,
                        type_args: Vec::new(),
                        arguments,
                    },
                    self.span_from(start),
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_member_name(&mut self) -> SyntaxResult<String> {
        match self.parse_property_key()? {
            PropertyKey::Named(name) => Ok(name),
            PropertyKey::Computed(e) => Err(self.invalid("expected property name", e.span)),
        }
    }

    fn parse_new(&mut self) -> SyntaxResult<Expression> {
        let start = self.expect(Token::New)?;
        let mut callee = self.parse_primary()?;
        while self.eat(&Token::Dot) {
            let name = self.parse_member_name()?;
            callee = Expression::new(
                ExpressionKind::Member {
                    object: Box::new(callee),
                    property: PropertyKey::Named(name),
                },
                self.span_from(start),
            );
        }
        let type_annotations = if self.check(&Token::Less) {
            self.advance();
            self.parse_type_list()?
        } else {
            Vec::new()
        };
        let arguments = if self.check(&Token::LeftParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expression::new(
            ExpressionKind::New {
                callee: Box::new(callee),
                type_annotations,
                type_args: Vec::new(),
                arguments,
            },
            self.span_from(start),
        ))
    }

    fn parse_arguments(&mut self) -> SyntaxResult<Vec<Expression>> {
        self.expect(Token::LeftParen)?;
        let mut args = Vec::new();
        while !self.check(&Token::RightParen) {
            if self.check(&Token::DotDotDot) {
                return Err(self.invalid("spread arguments are not supported", self.current_span()));
            }
            args.push(self.parse_assignment()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RightParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> SyntaxResult<Expression> {
        let start = self.current_span();
        let kind = match self.current().clone() {
            Token::Number(n) => {
                self.advance();
                ExpressionKind::Number(n)
            }
            Token::String(s) => {
                self.advance();
                ExpressionKind::String(s)
            }
            Token::True => {
                self.advance();
                ExpressionKind::Boolean(true)
            }
            Token::False => {
                self.advance();
                ExpressionKind::Boolean(false)
            }
            Token::Null => {
                self.advance();
                ExpressionKind::Null
            }
            Token::This => {
                self.advance();
                ExpressionKind::Identifier(Identifier::new("this", start))
            }
            Token::Identifier(name) if name == "async" && self.peek_at(1) == &Token::Function => {
                self.advance();
                let func = self.parse_function(true, FunctionKind::Normal)?;
                ExpressionKind::Function(Box::new(func))
            }
            Token::Identifier(name) => {
                self.advance();
                ExpressionKind::Identifier(Identifier::new(name, start))
            }
            Token::Function => {
                let func = self.parse_function(false, FunctionKind::Normal)?;
                ExpressionKind::Function(Box::new(func))
            }
            Token::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                return Ok(Expression::new(inner.kind, self.span_from(start)));
            }
            Token::LeftBracket => self.parse_array_literal()?,
            Token::LeftBrace => self.parse_object_literal()?,
            _ => return Err(self.unexpected("expression")),
        };
        Ok(Expression::new(kind, self.span_from(start)))
    }

    fn parse_array_literal(&mut self) -> SyntaxResult<ExpressionKind> {
        self.expect(Token::LeftBracket)?;
        let mut elements = Vec::new();
        while !self.check(&Token::RightBracket) && !self.at_eof() {
            if self.eat(&Token::Comma) {
                elements.push(ArrayElement::Hole);
                continue;
            }
            if self.eat(&Token::DotDotDot) {
                elements.push(ArrayElement::Spread(self.parse_assignment()?));
            } else {
                elements.push(ArrayElement::Expression(self.parse_assignment()?));
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RightBracket)?;
        Ok(ExpressionKind::Array(elements))
    }

    fn parse_object_literal(&mut self) -> SyntaxResult<ExpressionKind> {
        self.expect(Token::LeftBrace)?;
        let mut props = Vec::new();
        while !self.check(&Token::RightBrace) && !self.at_eof() {
            if self.eat(&Token::DotDotDot) {
                props.push(ObjectProperty::Spread(self.parse_assignment()?));
            } else {
                let key_start = self.current_span();
                let key = self.parse_property_key()?;
                let value = if self.eat(&Token::Colon) {
                    self.parse_assignment()?
                } else if self.check(&Token::LeftParen) {
                    let name = match &key {
                        PropertyKey::Named(n) => Some(Identifier::new(n.clone(), key_start)),
                        PropertyKey::Computed(_) => None,
                    };
                    let func = self.parse_function_rest(key_start, name, FunctionKind::Method, false, false)?;
                    let span = func.span;
                    Expression::new(ExpressionKind::Function(Box::new(func)), span)
                } else {
                    self.shorthand_value(&key, key_start)?
                };
                props.push(ObjectProperty::KeyValue { key, value });
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RightBrace)?;
        Ok(ExpressionKind::Object(props))
    }

    /// `{ a }` or, inside an assignment pattern, `{ a = 1 }`
    fn shorthand_value(&mut self, key: &PropertyKey, span: Span) -> SyntaxResult<Expression> {
        let name = match key {
            PropertyKey::Named(n) => n.clone(),
            PropertyKey::Computed(_) => return Err(self.unexpected(":")),
        };
        let ident = Expression::new(ExpressionKind::Identifier(Identifier::new(name, span)), span);
        if !self.eat(&Token::Equal) {
            return Ok(ident);
        }
        let default = self.parse_assignment()?;
        Ok(Expression::new(
            ExpressionKind::Assignment {
                op: AssignmentOperator::Assign,
                target: AssignmentTarget::Simple(Box::new(ident)),
                value: Box::new(default),
            },
            self.span_from(span),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use crate::ast::*;

    fn expr(source: &str) -> Expression {
        let module = parse(source).unwrap();
        match module.body.into_iter().next() {
            Some(Statement::Expression(s)) => s.expression,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        match expr("1 + 2 * 3;").kind {
            ExpressionKind::Binary { op, right, .. } => {
                assert_eq!(op, BinaryOperator::Add);
                assert!(matches!(right.kind, ExpressionKind::Binary { op: BinaryOperator::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_destructuring_assignment() {
        match expr("[a, b = 2, ...c] = xs;").kind {
            ExpressionKind::Assignment {
                target: AssignmentTarget::Pattern(Pattern::Array(array)),
                ..
            } => {
                assert_eq!(array.elements.len(), 2);
                assert!(array.elements[1].as_ref().unwrap().default.is_some());
                assert!(array.rest.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_arrow_functions() {
        assert!(matches!(expr("x => x + 1;").kind, ExpressionKind::Function(_)));
        assert!(matches!(expr("(a, b) => { return a; };").kind, ExpressionKind::Function(_)));
        assert!(matches!(expr("(a + b);").kind, ExpressionKind::Binary { .. }));
    }

    #[test]
    fn test_yield_only_inside_generators() {
        let module = parse("function* g() { yield; yield* xs; }").unwrap();
        assert_eq!(module.body.len(), 1);
        // Outside a generator `yield` is an ordinary identifier
        assert!(matches!(expr("yield;").kind, ExpressionKind::Identifier(_)));
    }
}
