//! AST visitor pattern for traversing the syntax tree
//!
//! Each visit method has a default implementation that calls the corresponding walk
//! function, so implementors override only the nodes they care about.
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_syntax::ast::*;
//!
//! struct CountYields {
//!     count: usize,
//! }
//!
//! impl<'ast> Visitor<'ast> for CountYields {
//!     fn visit_expression(&mut self, expr: &'ast Expression) {
//!         if matches!(expr.kind, ExpressionKind::Yield { .. }) {
//!             self.count += 1;
//!         }
//!         walk_expression(self, expr);
//!     }
//!
//!     // Nested functions have their own yields
//!     fn visit_function(&mut self, _func: &'ast Function) {}
//! }
//! ```

use super::*;

/// AST visitor trait
pub trait Visitor<'ast>: Sized {
    /// Visit a module
    fn visit_module(&mut self, module: &'ast Module) {
        walk_module(self, module);
    }

    /// Visit a statement
    fn visit_statement(&mut self, stmt: &'ast Statement) {
        walk_statement(self, stmt);
    }

    /// Visit an expression
    fn visit_expression(&mut self, expr: &'ast Expression) {
        walk_expression(self, expr);
    }

    /// Visit a pattern
    fn visit_pattern(&mut self, pattern: &'ast Pattern) {
        walk_pattern(self, pattern);
    }

    /// Visit a nested function (declaration, expression, arrow, or method)
    fn visit_function(&mut self, func: &'ast Function) {
        walk_function(self, func);
    }

    /// Visit a class declaration
    fn visit_class(&mut self, class: &'ast Class) {
        walk_class(self, class);
    }

    /// Visit an identifier, either a reference or a binding occurrence
    fn visit_identifier(&mut self, _ident: &'ast Identifier) {}
}

/// Walk a module
pub fn walk_module<'ast, V: Visitor<'ast>>(visitor: &mut V, module: &'ast Module) {
    for stmt in &module.body {
        visitor.visit_statement(stmt);
    }
}

/// Walk a statement's children
pub fn walk_statement<'ast, V: Visitor<'ast>>(visitor: &mut V, stmt: &'ast Statement) {
    match stmt {
        Statement::VariableDecl(decl) => walk_variable_decl(visitor, decl),
        Statement::FunctionDecl(func) => visitor.visit_function(func),
        Statement::ClassDecl(class) => visitor.visit_class(class),
        Statement::TypeAlias(_) | Statement::Empty(_) => {}
        Statement::Break(_) | Statement::Continue(_) => {}
        Statement::Expression(s) => visitor.visit_expression(&s.expression),
        Statement::Return(s) => {
            if let Some(value) = &s.value {
                visitor.visit_expression(value);
            }
        }
        Statement::If(s) => {
            visitor.visit_expression(&s.test);
            visitor.visit_statement(&s.consequent);
            if let Some(alt) = &s.alternate {
                visitor.visit_statement(alt);
            }
        }
        Statement::While(s) => {
            visitor.visit_expression(&s.test);
            visitor.visit_statement(&s.body);
        }
        Statement::DoWhile(s) => {
            visitor.visit_statement(&s.body);
            visitor.visit_expression(&s.test);
        }
        Statement::For(s) => {
            match &s.init {
                Some(ForInit::VariableDecl(decl)) => walk_variable_decl(visitor, decl),
                Some(ForInit::Expression(e)) => visitor.visit_expression(e),
                None => {}
            }
            if let Some(test) = &s.test {
                visitor.visit_expression(test);
            }
            if let Some(update) = &s.update {
                visitor.visit_expression(update);
            }
            visitor.visit_statement(&s.body);
        }
        Statement::ForOf(s) => {
            visitor.visit_expression(&s.right);
            match &s.left {
                ForEachLeft::Declaration { pattern, .. } | ForEachLeft::Pattern(pattern) => {
                    visitor.visit_pattern(pattern)
                }
            }
            visitor.visit_statement(&s.body);
        }
        Statement::ForIn(s) => {
            visitor.visit_expression(&s.right);
            match &s.left {
                ForEachLeft::Declaration { pattern, .. } | ForEachLeft::Pattern(pattern) => {
                    visitor.visit_pattern(pattern)
                }
            }
            visitor.visit_statement(&s.body);
        }
        Statement::Throw(s) => visitor.visit_expression(&s.argument),
        Statement::Try(s) => {
            walk_block(visitor, &s.block);
            if let Some(handler) = &s.handler {
                if let Some(param) = &handler.param {
                    visitor.visit_pattern(param);
                }
                walk_block(visitor, &handler.body);
            }
            if let Some(finalizer) = &s.finalizer {
                walk_block(visitor, finalizer);
            }
        }
        Statement::Switch(s) => {
            visitor.visit_expression(&s.discriminant);
            for case in &s.cases {
                if let Some(test) = &case.test {
                    visitor.visit_expression(test);
                }
                for stmt in &case.consequent {
                    visitor.visit_statement(stmt);
                }
            }
        }
        Statement::Labeled(s) => visitor.visit_statement(&s.body),
        Statement::Block(block) => walk_block(visitor, block),
    }
}

/// Walk a block's statements
pub fn walk_block<'ast, V: Visitor<'ast>>(visitor: &mut V, block: &'ast Block) {
    for stmt in &block.body {
        visitor.visit_statement(stmt);
    }
}

/// Walk a declaration's patterns and initializers
pub fn walk_variable_decl<'ast, V: Visitor<'ast>>(visitor: &mut V, decl: &'ast VariableDecl) {
    for declarator in &decl.declarations {
        visitor.visit_pattern(&declarator.pattern);
        if let Some(init) = &declarator.init {
            visitor.visit_expression(init);
        }
    }
}

/// Walk a function's parameters and body
pub fn walk_function<'ast, V: Visitor<'ast>>(visitor: &mut V, func: &'ast Function) {
    if let Some(name) = &func.name {
        visitor.visit_identifier(name);
    }
    for param in &func.params {
        visitor.visit_pattern(&param.pattern);
        if let Some(default) = &param.default {
            visitor.visit_expression(default);
        }
    }
    match &func.body {
        FunctionBody::Block(body) => {
            for stmt in body {
                visitor.visit_statement(stmt);
            }
        }
        FunctionBody::Expression(expr) => visitor.visit_expression(expr),
    }
}

/// Walk a class's constructor and methods
pub fn walk_class<'ast, V: Visitor<'ast>>(visitor: &mut V, class: &'ast Class) {
    visitor.visit_identifier(&class.name);
    if let Some(ctor) = &class.constructor {
        visitor.visit_function(ctor);
    }
    for method in &class.methods {
        visitor.visit_function(&method.function);
    }
}

/// Walk a pattern's identifiers, keys, and defaults
pub fn walk_pattern<'ast, V: Visitor<'ast>>(visitor: &mut V, pattern: &'ast Pattern) {
    match pattern {
        Pattern::Identifier(b) => visitor.visit_identifier(&b.ident),
        Pattern::Array(array) => {
            for element in array.elements.iter().flatten() {
                visitor.visit_pattern(&element.pattern);
                if let Some(default) = &element.default {
                    visitor.visit_expression(default);
                }
            }
            if let Some(rest) = &array.rest {
                visitor.visit_pattern(rest);
            }
        }
        Pattern::Object(object) => {
            for prop in &object.properties {
                if let PropertyKey::Computed(key) = &prop.key {
                    visitor.visit_expression(key);
                }
                visitor.visit_pattern(&prop.value);
                if let Some(default) = &prop.default {
                    visitor.visit_expression(default);
                }
            }
            if let Some(rest) = &object.rest {
                visitor.visit_pattern(rest);
            }
        }
        Pattern::Expression(expr) => visitor.visit_expression(expr),
    }
}

/// Walk an expression's children
pub fn walk_expression<'ast, V: Visitor<'ast>>(visitor: &mut V, expr: &'ast Expression) {
    match &expr.kind {
        ExpressionKind::Number(_)
        | ExpressionKind::String(_)
        | ExpressionKind::Boolean(_)
        | ExpressionKind::Null
        | ExpressionKind::Undefined => {}
        ExpressionKind::Identifier(ident) => visitor.visit_identifier(ident),
        ExpressionKind::Array(elements) => {
            for element in elements {
                match element {
                    ArrayElement::Expression(e) | ArrayElement::Spread(e) => {
                        visitor.visit_expression(e)
                    }
                    ArrayElement::Hole => {}
                }
            }
        }
        ExpressionKind::Object(props) => {
            for prop in props {
                match prop {
                    ObjectProperty::KeyValue { key, value } => {
                        if let PropertyKey::Computed(k) = key {
                            visitor.visit_expression(k);
                        }
                        visitor.visit_expression(value);
                    }
                    ObjectProperty::Spread(e) => visitor.visit_expression(e),
                }
            }
        }
        ExpressionKind::Function(func) => visitor.visit_function(func),
        ExpressionKind::Unary { argument, .. } => visitor.visit_expression(argument),
        ExpressionKind::Update { target, .. } => visitor.visit_expression(target),
        ExpressionKind::Binary { left, right, .. } | ExpressionKind::Logical { left, right, .. } => {
            visitor.visit_expression(left);
            visitor.visit_expression(right);
        }
        ExpressionKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            visitor.visit_expression(test);
            visitor.visit_expression(consequent);
            visitor.visit_expression(alternate);
        }
        ExpressionKind::Assignment { target, value, .. } => {
            match target {
                AssignmentTarget::Simple(e) => visitor.visit_expression(e),
                AssignmentTarget::Pattern(p) => visitor.visit_pattern(p),
            }
            visitor.visit_expression(value);
        }
        ExpressionKind::Call {
            callee, arguments, ..
        }
        | ExpressionKind::New {
            callee, arguments, ..
        } => {
            visitor.visit_expression(callee);
            for arg in arguments {
                visitor.visit_expression(arg);
            }
        }
        ExpressionKind::Member { object, property } => {
            visitor.visit_expression(object);
            if let PropertyKey::Computed(k) = property {
                visitor.visit_expression(k);
            }
        }
        ExpressionKind::Yield { argument, .. } => {
            if let Some(arg) = argument {
                visitor.visit_expression(arg);
            }
        }
        ExpressionKind::Await(arg) => visitor.visit_expression(arg),
        ExpressionKind::Sequence(exprs) => {
            for e in exprs {
                visitor.visit_expression(e);
            }
        }
    }
}
