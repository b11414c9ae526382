//! Statement Lowering
//!
//! Straight-line statements and `if`. Loops, `switch`, labels and the
//! exception-handling statements live in [`control_flow`](super::control_flow).

use super::destructure::BindMode;
use super::Lowerer;
use crate::error::CompileResult;
use crate::ir::Terminator;
use kiln_syntax::ast::{Block, IfStatement, Pattern, Statement, VariableDecl, VariableKind};

impl<'s, 'a> Lowerer<'s, 'a> {
    /// Lower a list of statements; stops once control leaves the current block
    pub(super) fn lower_statements(&mut self, stmts: &'a [Statement]) -> CompileResult<()> {
        for stmt in stmts {
            if self.current_block_is_terminated() {
                break;
            }
            self.lower_statement(stmt)?;
        }
        Ok(())
    }

    pub(super) fn lower_statement(&mut self, stmt: &'a Statement) -> CompileResult<()> {
        if self.current_block_is_terminated() {
            return Ok(());
        }
        match stmt {
            Statement::VariableDecl(decl) => self.lower_variable_decl(decl),
            // Hoisted when the enclosing block was entered
            Statement::FunctionDecl(_) | Statement::TypeAlias(_) | Statement::Empty(_) => Ok(()),
            Statement::ClassDecl(class) => {
                if class.is_generic() {
                    // Every reference builds its own specialization
                    return Ok(());
                }
                let value = self.lower_class(class)?;
                match class.name.binding() {
                    Some(binding) => self.store_binding(binding, value),
                    None => Ok(()),
                }
            }
            Statement::Expression(stmt) => {
                self.lower_expression(&stmt.expression)?;
                Ok(())
            }
            Statement::Return(ret) => {
                let value = match &ret.value {
                    Some(value) => Some(self.lower_expression(value)?),
                    None => None,
                };
                self.lower_return(value)
            }
            Statement::If(stmt) => self.lower_if(stmt),
            Statement::Throw(stmt) => {
                let value = self.lower_expression(&stmt.argument)?;
                self.set_terminator(Terminator::Throw(value))
            }
            Statement::Block(block) => self.lower_block(block),
            Statement::While(stmt) => self.lower_while(stmt),
            Statement::DoWhile(stmt) => self.lower_do_while(stmt),
            Statement::For(stmt) => self.lower_for(stmt),
            Statement::ForOf(stmt) => self.lower_for_of(stmt),
            Statement::ForIn(stmt) => self.lower_for_in(stmt),
            Statement::Break(jump) => self.lower_break(jump.label.as_deref()),
            Statement::Continue(jump) => self.lower_continue(jump.label.as_deref()),
            Statement::Try(stmt) => self.lower_try(stmt),
            Statement::Switch(stmt) => self.lower_switch(stmt),
            Statement::Labeled(stmt) => self.lower_labeled(stmt),
        }
    }

    pub(super) fn lower_variable_decl(&mut self, decl: &'a VariableDecl) -> CompileResult<()> {
        for declarator in &decl.declarations {
            match &declarator.init {
                // Generic function expressions are specialized where the binding is used
                Some(_) if self.binds_generic(&declarator.pattern) => {
                    let value = self.undefined();
                    self.bind_pattern(&declarator.pattern, value, BindMode::Declare)?;
                }
                Some(init) => {
                    let value = self.lower_expression(init)?;
                    self.bind_pattern(&declarator.pattern, value, BindMode::Declare)?;
                }
                // `let x;` leaves the dead zone holding `undefined`
                None if decl.kind != VariableKind::Var => {
                    let value = self.undefined();
                    self.bind_pattern(&declarator.pattern, value, BindMode::Declare)?;
                }
                None => {}
            }
        }
        Ok(())
    }

    fn binds_generic(&self, pattern: &Pattern) -> bool {
        match pattern {
            Pattern::Identifier(binding) => binding
                .ident
                .binding()
                .is_some_and(|id| self.generic_declaration(id).is_some()),
            _ => false,
        }
    }

    /// Lower a block statement in its own scope
    pub(super) fn lower_block(&mut self, block: &'a Block) -> CompileResult<()> {
        let guard = self.enter_scope(block.scope)?;
        self.hoist_functions(&block.body)?;
        self.lower_statements(&block.body)?;
        self.exit_scope(guard);
        Ok(())
    }

    fn lower_if(&mut self, stmt: &'a IfStatement) -> CompileResult<()> {
        let cond = self.lower_expression(&stmt.test)?;
        let then_block = self.alloc_block("if.then")?;
        let else_block = match stmt.alternate {
            Some(_) => Some(self.alloc_block("if.else")?),
            None => None,
        };
        let join = self.alloc_block("if.join")?;
        self.branch(cond, then_block, else_block.unwrap_or(join))?;
        self.seal(then_block);

        self.switch_to(then_block);
        self.lower_statement(&stmt.consequent)?;
        self.jump_if_open(join)?;

        if let (Some(else_block), Some(alternate)) = (else_block, &stmt.alternate) {
            self.seal(else_block);
            self.switch_to(else_block);
            self.lower_statement(alternate)?;
            self.jump_if_open(join)?;
        }

        self.seal(join);
        self.switch_to(join);
        Ok(())
    }
}
