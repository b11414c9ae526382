//! Statement and declaration parsing

use super::Parser;
use crate::ast::*;
use crate::error::SyntaxResult;
use crate::scope::ScopeId;
use crate::token::Token;
use crate::types::TypeId;

impl Parser {
    pub(super) fn parse_statement(&mut self) -> SyntaxResult<Statement> {
        let start = self.current_span();
        match self.current().clone() {
            Token::LeftBrace => Ok(Statement::Block(self.parse_block()?)),
            Token::Let | Token::Const | Token::Var => {
                let decl = self.parse_variable_decl()?;
                self.consume_semicolon();
                Ok(Statement::VariableDecl(decl))
            }
            Token::Function => {
                let func = self.parse_function(false, FunctionKind::Normal)?;
                Ok(Statement::FunctionDecl(Box::new(func)))
            }
            Token::Identifier(name) if name == "async" && self.peek_at(1) == &Token::Function => {
                self.advance();
                let func = self.parse_function(true, FunctionKind::Normal)?;
                Ok(Statement::FunctionDecl(Box::new(func)))
            }
            Token::Identifier(name)
                if name == "type"
                    && matches!(self.peek_at(1), Token::Identifier(_))
                    && self.peek_at(2) == &Token::Equal =>
            {
                self.advance();
                let name = self.expect_identifier()?;
                self.expect(Token::Equal)?;
                let annotation = self.parse_type_annotation()?;
                self.consume_semicolon();
                Ok(Statement::TypeAlias(TypeAlias {
                    name: name.name,
                    annotation,
                    span: self.span_from(start),
                }))
            }
            Token::Identifier(label) if self.peek_at(1) == &Token::Colon => {
                self.advance();
                self.advance();
                let body = self.parse_statement()?;
                Ok(Statement::Labeled(LabeledStatement {
                    label,
                    body: Box::new(body),
                    span: self.span_from(start),
                }))
            }
            Token::Class => Ok(Statement::ClassDecl(Box::new(self.parse_class()?))),
            Token::If => self.parse_if(),
            Token::While => {
                self.advance();
                self.expect(Token::LeftParen)?;
                let test = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                let body = self.parse_statement()?;
                Ok(Statement::While(WhileStatement {
                    test,
                    body: Box::new(body),
                    span: self.span_from(start),
                }))
            }
            Token::Do => {
                self.advance();
                let body = self.parse_statement()?;
                self.expect(Token::While)?;
                self.expect(Token::LeftParen)?;
                let test = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                self.consume_semicolon();
                Ok(Statement::DoWhile(DoWhileStatement {
                    body: Box::new(body),
                    test,
                    span: self.span_from(start),
                }))
            }
            Token::For => self.parse_for(),
            Token::Return => {
                self.advance();
                let value = if self.check(&Token::Semicolon) || self.check(&Token::RightBrace) || self.at_eof() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon();
                Ok(Statement::Return(ReturnStatement {
                    value,
                    span: self.span_from(start),
                }))
            }
            Token::Break | Token::Continue => {
                let is_break = self.check(&Token::Break);
                self.advance();
                let label = match self.current().clone() {
                    Token::Identifier(name) if self.current_span().line == start.line => {
                        self.advance();
                        Some(name)
                    }
                    _ => None,
                };
                self.consume_semicolon();
                let jump = JumpStatement {
                    label,
                    span: self.span_from(start),
                };
                Ok(if is_break {
                    Statement::Break(jump)
                } else {
                    Statement::Continue(jump)
                })
            }
            Token::Throw => {
                self.advance();
                let argument = self.parse_expression()?;
                self.consume_semicolon();
                Ok(Statement::Throw(ThrowStatement {
                    argument,
                    span: self.span_from(start),
                }))
            }
            Token::Try => self.parse_try(),
            Token::Switch => self.parse_switch(),
            Token::Semicolon => {
                self.advance();
                Ok(Statement::Empty(start))
            }
            _ => {
                let expression = self.parse_expression()?;
                self.consume_semicolon();
                Ok(Statement::Expression(ExpressionStatement {
                    expression,
                    span: self.span_from(start),
                }))
            }
        }
    }

    pub(super) fn parse_block(&mut self) -> SyntaxResult<Block> {
        let start = self.expect(Token::LeftBrace)?;
        let mut body = Vec::new();
        while !self.check(&Token::RightBrace) && !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        self.expect(Token::RightBrace)?;
        Ok(Block {
            body,
            scope: ScopeId::UNASSIGNED,
            span: self.span_from(start),
        })
    }

    fn parse_variable_kind(&mut self) -> SyntaxResult<VariableKind> {
        let kind = match self.current() {
            Token::Let => VariableKind::Let,
            Token::Const => VariableKind::Const,
            Token::Var => VariableKind::Var,
            _ => return Err(self.unexpected("let, const or var")),
        };
        self.advance();
        Ok(kind)
    }

    pub(super) fn parse_variable_decl(&mut self) -> SyntaxResult<VariableDecl> {
        let start = self.current_span();
        let kind = self.parse_variable_kind()?;
        let mut declarations = Vec::new();
        loop {
            let decl_start = self.current_span();
            let pattern = self.parse_binding_pattern()?;
            let init = if self.eat(&Token::Equal) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            declarations.push(VariableDeclarator {
                pattern,
                init,
                span: self.span_from(decl_start),
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(VariableDecl {
            kind,
            declarations,
            span: self.span_from(start),
        })
    }

    /// Parse `function [*] name <T>(params): R { body }`; `async` already consumed
    pub(super) fn parse_function(&mut self, is_async: bool, kind: FunctionKind) -> SyntaxResult<Function> {
        let start = self.expect(Token::Function)?;
        let is_generator = self.eat(&Token::Star);
        let name = match self.current() {
            Token::Identifier(_) => Some(self.expect_identifier()?),
            _ => None,
        };
        self.parse_function_rest(start, name, kind, is_generator, is_async)
    }

    /// Parse the part after the name: type parameters, parameters, return type, body
    pub(super) fn parse_function_rest(
        &mut self,
        start: crate::span::Span,
        name: Option<Identifier>,
        kind: FunctionKind,
        is_generator: bool,
        is_async: bool,
    ) -> SyntaxResult<Function> {
        let id = self.node_id();
        let type_params = self.parse_type_params()?;

        let saved = (self.in_generator, self.in_async);
        self.in_generator = is_generator;
        self.in_async = is_async;
        let result = self.parse_signature_and_body();
        self.in_generator = saved.0;
        self.in_async = saved.1;
        let (params, return_annotation, block) = result?;

        Ok(Function {
            id,
            name,
            kind,
            is_generator,
            is_async,
            type_params,
            params,
            return_annotation,
            return_ty: TypeId::ANY,
            body: FunctionBody::Block(block.body),
            scope: ScopeId::UNASSIGNED,
            this_binding: None,
            span: self.span_from(start),
        })
    }

    fn parse_signature_and_body(&mut self) -> SyntaxResult<(Vec<Param>, Option<TypeAnnotation>, Block)> {
        let params = self.parse_params()?;
        let return_annotation = if self.eat(&Token::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        let block = self.parse_block()?;
        Ok((params, return_annotation, block))
    }

    pub(super) fn parse_params(&mut self) -> SyntaxResult<Vec<Param>> {
        self.expect(Token::LeftParen)?;
        let mut params = Vec::new();
        while !self.check(&Token::RightParen) {
            let start = self.current_span();
            let rest = self.eat(&Token::DotDotDot);
            let pattern = self.parse_binding_pattern()?;
            let default = if !rest && self.eat(&Token::Equal) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            params.push(Param {
                pattern,
                default,
                rest,
                span: self.span_from(start),
            });
            if rest {
                break;
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RightParen)?;
        Ok(params)
    }

    fn parse_class(&mut self) -> SyntaxResult<Class> {
        let start = self.expect(Token::Class)?;
        let name = self.expect_identifier()?;
        let id = self.node_id();
        let type_params = self.parse_type_params()?;
        self.expect(Token::LeftBrace)?;

        let mut constructor = None;
        let mut methods = Vec::new();
        while !self.check(&Token::RightBrace) && !self.at_eof() {
            if self.eat(&Token::Semicolon) {
                continue;
            }
            let member_start = self.current_span();
            let is_async = self.check_contextual("async")
                && !matches!(self.peek_at(1), Token::LeftParen | Token::Colon | Token::Semicolon);
            if is_async {
                self.advance();
            }
            let is_generator = self.eat(&Token::Star);
            let member = self.expect_identifier()?;

            if self.check(&Token::Colon) || self.check(&Token::Semicolon) || self.check(&Token::Equal) {
                // Field declaration: `name: T;`
                if self.eat(&Token::Colon) {
                    self.parse_type_annotation()?;
                }
                if self.check(&Token::Equal) {
                    return Err(self.invalid(
                        "class field initializers are not supported",
                        self.current_span(),
                    ));
                }
                self.consume_semicolon();
                continue;
            }

            if member.name == "constructor" {
                let func = self.parse_function_rest(member_start, Some(member), FunctionKind::Constructor, false, false)?;
                constructor = Some(func);
            } else {
                let method_name = member.name.clone();
                let func = self.parse_function_rest(member_start, Some(member), FunctionKind::Method, is_generator, is_async)?;
                methods.push(ClassMethod {
                    name: method_name,
                    function: func,
                });
            }
        }
        self.expect(Token::RightBrace)?;

        Ok(Class {
            id,
            name,
            type_params,
            constructor,
            methods,
            span: self.span_from(start),
        })
    }

    fn parse_if(&mut self) -> SyntaxResult<Statement> {
        let start = self.expect(Token::If)?;
        self.expect(Token::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(Token::RightParen)?;
        let consequent = self.parse_statement()?;
        let alternate = if self.eat(&Token::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If(IfStatement {
            test,
            consequent: Box::new(consequent),
            alternate,
            span: self.span_from(start),
        }))
    }

    fn parse_for(&mut self) -> SyntaxResult<Statement> {
        let start = self.expect(Token::For)?;
        self.expect(Token::LeftParen)?;

        let mut init = None;
        if matches!(self.current(), Token::Let | Token::Const | Token::Var) {
            let decl_start = self.current_span();
            let kind = self.parse_variable_kind()?;
            let pattern = self.parse_binding_pattern()?;
            if self.check_contextual("of") {
                self.advance();
                let left = ForEachLeft::Declaration { kind, pattern };
                return self.parse_for_of_rest(start, left);
            }
            if self.check_contextual("in") {
                self.advance();
                let left = ForEachLeft::Declaration { kind, pattern };
                return self.parse_for_in_rest(start, left);
            }
            // Classic head: finish the declaration list
            let mut declarations = Vec::new();
            let mut pattern = Some(pattern);
            loop {
                let decl_pattern = match pattern.take() {
                    Some(p) => p,
                    None => self.parse_binding_pattern()?,
                };
                let init_expr = if self.eat(&Token::Equal) {
                    Some(self.parse_assignment()?)
                } else {
                    None
                };
                declarations.push(VariableDeclarator {
                    span: self.span_from(decl_pattern.span()),
                    pattern: decl_pattern,
                    init: init_expr,
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            init = Some(ForInit::VariableDecl(VariableDecl {
                kind,
                declarations,
                span: self.span_from(decl_start),
            }));
        } else if !self.check(&Token::Semicolon) {
            let expr = self.parse_expression()?;
            if self.check_contextual("of") {
                self.advance();
                let pattern = self.expression_to_pattern(expr)?;
                return self.parse_for_of_rest(start, ForEachLeft::Pattern(pattern));
            }
            if self.check_contextual("in") {
                self.advance();
                let pattern = self.expression_to_pattern(expr)?;
                return self.parse_for_in_rest(start, ForEachLeft::Pattern(pattern));
            }
            init = Some(ForInit::Expression(expr));
        }

        self.expect(Token::Semicolon)?;
        let test = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(Token::Semicolon)?;
        let update = if self.check(&Token::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(Token::RightParen)?;
        let body = self.parse_statement()?;

        Ok(Statement::For(ForStatement {
            init,
            test,
            update,
            body: Box::new(body),
            scope: ScopeId::UNASSIGNED,
            span: self.span_from(start),
        }))
    }

    fn parse_for_of_rest(&mut self, start: crate::span::Span, left: ForEachLeft) -> SyntaxResult<Statement> {
        let right = self.parse_assignment()?;
        self.expect(Token::RightParen)?;
        let body = self.parse_statement()?;
        Ok(Statement::ForOf(ForOfStatement {
            left,
            right,
            body: Box::new(body),
            scope: ScopeId::UNASSIGNED,
            span: self.span_from(start),
        }))
    }

    fn parse_for_in_rest(&mut self, start: crate::span::Span, left: ForEachLeft) -> SyntaxResult<Statement> {
        let right = self.parse_expression()?;
        self.expect(Token::RightParen)?;
        let body = self.parse_statement()?;
        Ok(Statement::ForIn(ForInStatement {
            left,
            right,
            body: Box::new(body),
            scope: ScopeId::UNASSIGNED,
            span: self.span_from(start),
        }))
    }

    fn parse_try(&mut self) -> SyntaxResult<Statement> {
        let start = self.expect(Token::Try)?;
        let block = self.parse_block()?;

        let handler = if self.check(&Token::Catch) {
            let catch_start = self.current_span();
            self.advance();
            let param = if self.eat(&Token::LeftParen) {
                let pattern = self.parse_binding_pattern()?;
                self.expect(Token::RightParen)?;
                Some(pattern)
            } else {
                None
            };
            let body = self.parse_block()?;
            Some(CatchClause {
                param,
                body,
                scope: ScopeId::UNASSIGNED,
                span: self.span_from(catch_start),
            })
        } else {
            None
        };

        let finalizer = if self.eat(&Token::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.unexpected("catch or finally"));
        }

        Ok(Statement::Try(TryStatement {
            block,
            handler,
            finalizer,
            span: self.span_from(start),
        }))
    }

    fn parse_switch(&mut self) -> SyntaxResult<Statement> {
        let start = self.expect(Token::Switch)?;
        self.expect(Token::LeftParen)?;
        let discriminant = self.parse_expression()?;
        self.expect(Token::RightParen)?;
        self.expect(Token::LeftBrace)?;

        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.check(&Token::RightBrace) && !self.at_eof() {
            let case_start = self.current_span();
            let test = if self.eat(&Token::Case) {
                Some(self.parse_expression()?)
            } else if self.eat(&Token::Default) {
                if seen_default {
                    return Err(self.invalid("multiple default clauses", case_start));
                }
                seen_default = true;
                None
            } else {
                return Err(self.unexpected("case or default"));
            };
            self.expect(Token::Colon)?;
            let mut consequent = Vec::new();
            while !matches!(self.current(), Token::Case | Token::Default | Token::RightBrace | Token::Eof) {
                consequent.push(self.parse_statement()?);
            }
            cases.push(SwitchCase {
                test,
                consequent,
                span: self.span_from(case_start),
            });
        }
        self.expect(Token::RightBrace)?;

        Ok(Statement::Switch(SwitchStatement {
            discriminant,
            cases,
            scope: ScopeId::UNASSIGNED,
            span: self.span_from(start),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use crate::ast::*;

    #[test]
    fn test_parse_for_of_declaration() {
        let module = parse("for (const [a, b] of pairs) { a; }").unwrap();
        match &module.body[0] {
            Statement::ForOf(stmt) => match &stmt.left {
                ForEachLeft::Declaration { kind, pattern } => {
                    assert_eq!(*kind, VariableKind::Const);
                    assert!(matches!(pattern, Pattern::Array(_)));
                }
                other => panic!("unexpected left side {:?}", other),
            },
            other => panic!("expected for-of, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_for_in() {
        let module = parse("for (const key in obj) { key; } for (k in obj) {}").unwrap();
        match &module.body[0] {
            Statement::ForIn(stmt) => {
                assert!(matches!(
                    &stmt.left,
                    ForEachLeft::Declaration { kind: VariableKind::Const, pattern: Pattern::Identifier(_) }
                ));
                assert!(matches!(stmt.right.kind, ExpressionKind::Identifier(_)));
            }
            other => panic!("expected for-in, got {:?}", other),
        }
        assert!(matches!(
            &module.body[1],
            Statement::ForIn(ForInStatement { left: ForEachLeft::Pattern(_), .. })
        ));
    }

    #[test]
    fn test_parse_classic_for_without_test() {
        let module = parse("for (let i = 0;; i++) { break; }").unwrap();
        match &module.body[0] {
            Statement::For(stmt) => {
                assert!(stmt.init.is_some());
                assert!(stmt.test.is_none());
                assert!(stmt.update.is_some());
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_generator_and_labels() {
        let module = parse("function* g() { outer: while (true) { yield 1; continue outer; } }").unwrap();
        match &module.body[0] {
            Statement::FunctionDecl(func) => {
                assert!(func.is_generator);
                assert_eq!(func.display_name(), "g");
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_try_requires_handler() {
        assert!(parse("try { }").is_err());
        assert!(parse("try { } finally { }").is_ok());
    }

    #[test]
    fn test_parse_generic_class() {
        let module = parse("class Box<T> { value: T; constructor(v: T) { this.value = v; } get(): T { return this.value; } }").unwrap();
        match &module.body[0] {
            Statement::ClassDecl(class) => {
                assert_eq!(class.type_params.len(), 1);
                assert!(class.constructor.is_some());
                assert_eq!(class.methods.len(), 1);
            }
            other => panic!("expected class, got {:?}", other),
        }
    }
}
