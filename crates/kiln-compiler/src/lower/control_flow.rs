//! Control Flow Lowering
//!
//! Loops, `switch`, labels, `try`/`catch`/`finally`, and the non-local exits
//! (`break`, `continue`, `return`) that may have to run `finally` bodies or close
//! `for-of` iterators on their way out. `for-in` runs as a `for-of` over the
//! object's own keys.
//!
//! Every construct that a jump may leave is tracked as a [`ControlEntry`]. A jump
//! unwinds the entries it crosses innermost first: each `finally` body is lowered
//! again at that exit, and each `for-of` iterator being left is closed.

use super::{block_suspends, expression_suspends, pattern_suspends, statement_suspends, Held, Lowerer, SsaVar};
use super::destructure::BindMode;
use crate::error::CompileResult;
use crate::generator::GeneratorState;
use crate::ir::{BasicBlockId, BinaryOp, IrInstr, Register, Terminator};
use kiln_syntax::ast::{
    Block, CatchClause, DoWhileStatement, ForEachLeft, ForInStatement, ForInit, ForOfStatement, ForStatement,
    LabeledStatement, Statement, SwitchStatement, TryStatement, WhileStatement,
};
use kiln_syntax::{ScopeId, TypeId};

#[derive(Debug, Clone)]
pub(crate) enum ControlKind<'a> {
    Loop {
        break_block: BasicBlockId,
        continue_block: BasicBlockId,
        /// Iterator of a `for-of`, closed when a jump leaves the loop
        iterator: Option<Held>,
    },
    Switch {
        break_block: BasicBlockId,
    },
    /// Labeled statement that is not a loop or switch
    Labeled {
        break_block: BasicBlockId,
    },
    /// Protected region of a `try` with a `finally` clause
    Finally {
        body: &'a Block,
    },
}

/// A construct enclosing the current position that jumps may leave
#[derive(Debug, Clone)]
pub(crate) struct ControlEntry<'a> {
    kind: ControlKind<'a>,
    labels: Vec<String>,
    /// Scope and record depth outside the construct
    scope: ScopeId,
    env_depth: u32,
    /// Number of handlers active outside the construct
    handler_depth: usize,
}

impl ControlEntry<'_> {
    fn needs_cleanup(&self) -> bool {
        matches!(
            self.kind,
            ControlKind::Finally { .. }
                | ControlKind::Loop {
                    iterator: Some(_),
                    ..
                }
        )
    }

    fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

impl<'s, 'a> Lowerer<'s, 'a> {
    fn control_entry(&self, kind: ControlKind<'a>, labels: Vec<String>) -> ControlEntry<'a> {
        ControlEntry {
            kind,
            labels,
            scope: self.scope,
            env_depth: self.env_depth,
            handler_depth: self.handlers.len(),
        }
    }

    // ========================================================================
    // Non-local exits
    // ========================================================================

    /// Run the cleanup of every control entry above `keep`, innermost first.
    ///
    /// Returns false if a cleanup left control (a `finally` body that returned or
    /// threw), in which case the caller must not emit its own jump.
    fn unwind(&mut self, keep: usize) -> CompileResult<bool> {
        let saved_control = self.control.clone();
        let saved_handlers = self.handlers.clone();
        let saved_scope = self.scope;
        let saved_depth = self.env_depth;

        let mut open = true;
        for index in (keep..saved_control.len()).rev() {
            let entry = &saved_control[index];
            if !entry.needs_cleanup() {
                continue;
            }
            self.control.truncate(index);
            self.handlers.truncate(entry.handler_depth);
            self.scope = entry.scope;
            self.env_depth = entry.env_depth;
            self.jump_to_fresh_block("unwind")?;
            match &entry.kind {
                ControlKind::Finally { body } => self.lower_block(body)?,
                ControlKind::Loop {
                    iterator: Some(iterator),
                    ..
                } => {
                    let iterator = self.load_held(*iterator)?;
                    self.emit(IrInstr::IteratorClose {
                        iterator,
                        suppress_errors: false,
                    });
                }
                _ => {}
            }
            if self.current_block_is_terminated() {
                open = false;
                break;
            }
        }

        self.control = saved_control;
        self.handlers = saved_handlers;
        self.scope = saved_scope;
        self.env_depth = saved_depth;
        Ok(open)
    }

    pub(super) fn lower_break(&mut self, label: Option<&str>) -> CompileResult<()> {
        let found = self.control.iter().rposition(|entry| match label {
            Some(label) => entry.has_label(label) && !matches!(entry.kind, ControlKind::Finally { .. }),
            None => matches!(entry.kind, ControlKind::Loop { .. } | ControlKind::Switch { .. }),
        });
        let index = match found {
            Some(index) => index,
            None => return Err(self.internal_error("break outside of a breakable statement")),
        };
        let (target, keep) = match &self.control[index].kind {
            // Leaving a for-of closes its iterator
            ControlKind::Loop {
                break_block,
                iterator: Some(_),
                ..
            } => (*break_block, index),
            ControlKind::Loop { break_block, .. }
            | ControlKind::Switch { break_block }
            | ControlKind::Labeled { break_block } => (*break_block, index + 1),
            ControlKind::Finally { .. } => return Err(self.internal_error("break resolved to a finally region")),
        };
        if self.unwind(keep)? {
            self.jump(target)?;
        }
        Ok(())
    }

    pub(super) fn lower_continue(&mut self, label: Option<&str>) -> CompileResult<()> {
        let found = self.control.iter().rposition(|entry| {
            matches!(entry.kind, ControlKind::Loop { .. }) && label.map_or(true, |l| entry.has_label(l))
        });
        let index = match found {
            Some(index) => index,
            None => return Err(self.internal_error("continue outside of a loop")),
        };
        let target = match &self.control[index].kind {
            ControlKind::Loop { continue_block, .. } => *continue_block,
            _ => return Err(self.internal_error("continue resolved to a non-loop")),
        };
        if self.unwind(index + 1)? {
            self.jump(target)?;
        }
        Ok(())
    }

    /// Return `value` (or `undefined`), running every pending `finally` body first
    pub(super) fn lower_return(&mut self, value: Option<Register>) -> CompileResult<()> {
        let value = match value {
            Some(value) => value,
            None => self.undefined(),
        };
        if !self.control.iter().any(|entry| entry.needs_cleanup()) {
            return self.emit_return(value);
        }

        let suspends = self.machine.is_some()
            && self.control.iter().any(|entry| match &entry.kind {
                ControlKind::Finally { body } => block_suspends(body),
                _ => false,
            });
        let held = self.hold(value, suspends)?;
        if !self.unwind(0)? {
            return Ok(());
        }
        let value = self.load_held(held)?;
        self.emit_return(value)
    }

    /// Complete the activation with `value`
    fn emit_return(&mut self, value: Register) -> CompileResult<()> {
        let generator = match &self.machine {
            Some(machine) => machine.generator,
            None => return self.set_terminator(Terminator::Return(Some(value))),
        };
        self.emit(IrInstr::SetGeneratorState {
            generator,
            state: GeneratorState::Completed.encode(),
        });
        let result = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::CreateIterResult {
            dest: result,
            value,
            done: true,
        });
        self.set_terminator(Terminator::Return(Some(result)))
    }

    // ========================================================================
    // try / catch / finally
    // ========================================================================

    pub(super) fn lower_try(&mut self, stmt: &'a TryStatement) -> CompileResult<()> {
        match (&stmt.handler, &stmt.finalizer) {
            (handler, Some(finalizer)) => self.lower_try_finally(&stmt.block, handler.as_ref(), finalizer),
            (Some(handler), None) => self.lower_try_catch(&stmt.block, handler),
            (None, None) => self.lower_block(&stmt.block),
        }
    }

    fn lower_try_catch(&mut self, block: &'a Block, clause: &'a CatchClause) -> CompileResult<()> {
        let catch_block = self.alloc_block("try.catch")?;
        let join = self.alloc_block("try.join")?;

        self.handlers.push(catch_block);
        self.jump_to_fresh_block("try.body")?;
        self.lower_block(block)?;
        self.handlers.pop();
        self.jump_if_open(join)?;

        self.seal(catch_block);
        self.switch_to(catch_block);
        self.lower_catch_clause(clause)?;
        self.jump_if_open(join)?;

        self.seal(join);
        self.switch_to(join);
        Ok(())
    }

    fn lower_catch_clause(&mut self, clause: &'a CatchClause) -> CompileResult<()> {
        let exception = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::Catch { dest: exception });
        let guard = self.enter_scope(clause.scope)?;
        if let Some(param) = &clause.param {
            self.bind_pattern(param, exception, BindMode::Declare)?;
        }
        self.lower_block(&clause.body)?;
        self.exit_scope(guard);
        Ok(())
    }

    /// The finally body is lowered once for normal completion, once for the
    /// exceptional path, and once more at every jump that leaves the protected region
    fn lower_try_finally(
        &mut self,
        block: &'a Block,
        clause: Option<&'a CatchClause>,
        finalizer: &'a Block,
    ) -> CompileResult<()> {
        let finally_handler = self.alloc_block("finally.handler")?;
        let normal = self.alloc_block("finally.normal")?;

        let entry = self.control_entry(ControlKind::Finally { body: finalizer }, Vec::new());
        self.control.push(entry);
        self.handlers.push(finally_handler);
        match clause {
            Some(clause) => {
                let catch_block = self.alloc_block("try.catch")?;
                self.handlers.push(catch_block);
                self.jump_to_fresh_block("try.body")?;
                self.lower_block(block)?;
                self.handlers.pop();
                self.jump_if_open(normal)?;

                self.seal(catch_block);
                self.switch_to(catch_block);
                self.lower_catch_clause(clause)?;
                self.jump_if_open(normal)?;
            }
            None => {
                self.jump_to_fresh_block("try.body")?;
                self.lower_block(block)?;
                self.jump_if_open(normal)?;
            }
        }
        self.handlers.pop();
        self.control.pop();

        self.seal(normal);
        self.switch_to(normal);
        self.lower_block(finalizer)?;
        let after = self.current_block;

        self.seal(finally_handler);
        self.switch_to(finally_handler);
        let exception = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::Catch { dest: exception });
        let finalizer_suspends = self.machine.is_some() && block_suspends(finalizer);
        let exception = self.hold(exception, finalizer_suspends)?;
        self.lower_block(finalizer)?;
        if !self.current_block_is_terminated() {
            let exception = self.load_held(exception)?;
            self.set_terminator(Terminator::Throw(exception))?;
        }

        self.switch_to(after);
        Ok(())
    }

    // ========================================================================
    // Loops
    // ========================================================================

    fn take_labels(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_labels)
    }

    /// Lower a loop body with `entry` on the control stack
    fn lower_loop_body(&mut self, entry: ControlEntry<'a>, body: &'a Statement) -> CompileResult<()> {
        self.control.push(entry);
        self.loop_depth += 1;
        let result = self.lower_statement(body);
        self.loop_depth -= 1;
        self.control.pop();
        result
    }

    pub(super) fn lower_while(&mut self, stmt: &'a WhileStatement) -> CompileResult<()> {
        let labels = self.take_labels();
        let header = self.alloc_block("while.header")?;
        let body = self.alloc_block("while.body")?;
        let exit = self.alloc_block("while.exit")?;
        self.jump(header)?;

        self.switch_to(header);
        let cond = self.lower_expression(&stmt.test)?;
        self.branch(cond, body, exit)?;
        self.seal(body);

        self.switch_to(body);
        let entry = self.control_entry(
            ControlKind::Loop {
                break_block: exit,
                continue_block: header,
                iterator: None,
            },
            labels,
        );
        self.lower_loop_body(entry, &stmt.body)?;
        self.jump_if_open(header)?;

        self.seal(header);
        self.seal(exit);
        self.switch_to(exit);
        Ok(())
    }

    pub(super) fn lower_do_while(&mut self, stmt: &'a DoWhileStatement) -> CompileResult<()> {
        let labels = self.take_labels();
        let body = self.alloc_block("do.body")?;
        let test = self.alloc_block("do.test")?;
        let exit = self.alloc_block("do.exit")?;
        self.jump(body)?;

        self.switch_to(body);
        let entry = self.control_entry(
            ControlKind::Loop {
                break_block: exit,
                continue_block: test,
                iterator: None,
            },
            labels,
        );
        self.lower_loop_body(entry, &stmt.body)?;
        self.jump_if_open(test)?;

        self.seal(test);
        self.switch_to(test);
        let cond = self.lower_expression(&stmt.test)?;
        self.branch(cond, body, exit)?;

        self.seal(body);
        self.seal(exit);
        self.switch_to(exit);
        Ok(())
    }

    /// Replace the loop head's record by a copy, so closures created in the previous
    /// iteration keep their own bindings
    fn copy_iteration_env(&mut self) -> CompileResult<()> {
        let env = self.require_env()?;
        let copy = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::CopyEnvironment { dest: copy, env });
        self.write_var(SsaVar::Env(self.env_depth), copy);
        Ok(())
    }

    pub(super) fn lower_for(&mut self, stmt: &'a ForStatement) -> CompileResult<()> {
        let labels = self.take_labels();
        let guard = self.enter_scope(stmt.scope)?;
        match &stmt.init {
            Some(ForInit::VariableDecl(decl)) => self.lower_variable_decl(decl)?,
            Some(ForInit::Expression(expr)) => {
                self.lower_expression(expr)?;
            }
            None => {}
        }
        let fresh = self.session.plan.materializes(stmt.scope) && self.session.plan.fresh_per_iteration(stmt.scope);
        if fresh {
            self.copy_iteration_env()?;
        }

        let header = self.alloc_block("for.header")?;
        let body = self.alloc_block("for.body")?;
        let update = self.alloc_block("for.update")?;
        let exit = self.alloc_block("for.exit")?;
        self.jump(header)?;

        self.switch_to(header);
        match &stmt.test {
            Some(test) => {
                let cond = self.lower_expression(test)?;
                self.branch(cond, body, exit)?;
            }
            None => self.jump(body)?,
        }
        self.seal(body);

        self.switch_to(body);
        let entry = self.control_entry(
            ControlKind::Loop {
                break_block: exit,
                continue_block: update,
                iterator: None,
            },
            labels,
        );
        self.lower_loop_body(entry, &stmt.body)?;
        self.jump_if_open(update)?;

        self.seal(update);
        self.switch_to(update);
        if fresh {
            self.copy_iteration_env()?;
        }
        if let Some(expr) = &stmt.update {
            self.lower_expression(expr)?;
        }
        self.jump(header)?;

        self.seal(header);
        self.seal(exit);
        self.switch_to(exit);
        self.exit_scope(guard);
        Ok(())
    }

    pub(super) fn lower_for_of(&mut self, stmt: &'a ForOfStatement) -> CompileResult<()> {
        let labels = self.take_labels();
        let iterable = self.lower_expression(&stmt.right)?;
        self.lower_for_each(&stmt.left, iterable, &stmt.body, stmt.scope, labels, "for_of")
    }

    /// `for (k in o)` visits the own enumerable keys of `o`, taken once before the
    /// first iteration
    pub(super) fn lower_for_in(&mut self, stmt: &'a ForInStatement) -> CompileResult<()> {
        let labels = self.take_labels();
        let object = self.lower_expression(&stmt.right)?;
        let keys = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::OwnKeys { dest: keys, object });
        self.lower_for_each(&stmt.left, keys, &stmt.body, stmt.scope, labels, "for_in")
    }

    /// Drive `iterable` through the iterator protocol, binding each value to `left` in a
    /// fresh activation of `scope`
    fn lower_for_each(
        &mut self,
        left: &'a ForEachLeft,
        iterable: Register,
        body: &'a Statement,
        scope: ScopeId,
        labels: Vec<String>,
        prefix: &str,
    ) -> CompileResult<()> {
        let (pattern, mode) = match left {
            ForEachLeft::Declaration { pattern, .. } => (pattern, BindMode::Declare),
            ForEachLeft::Pattern(pattern) => (pattern, BindMode::Assign),
        };
        let body_suspends = self.machine.is_some() && (statement_suspends(body) || pattern_suspends(pattern));

        let iterator = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::GetIterator { dest: iterator, iterable });
        let next = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::LoadField {
            dest: next,
            object: iterator,
            field: "next".to_string(),
        });
        let iterator = self.hold(iterator, body_suspends)?;
        let next = self.hold(next, body_suspends)?;

        let header = self.alloc_block(&format!("{}.header", prefix))?;
        let step = self.alloc_block(&format!("{}.step", prefix))?;
        let exit = self.alloc_block(&format!("{}.exit", prefix))?;
        let close = self.alloc_block(&format!("{}.close", prefix))?;
        self.jump(header)?;

        // The iterator's own failures propagate without closing it
        self.switch_to(header);
        let result = self.call_next(iterator, next)?;
        let done = self.alloc_register(TypeId::BOOLEAN);
        self.emit(IrInstr::LoadField {
            dest: done,
            object: result,
            field: "done".to_string(),
        });
        self.branch(done, exit, step)?;
        self.seal(step);

        self.switch_to(step);
        let value = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::LoadField {
            dest: value,
            object: result,
            field: "value".to_string(),
        });

        let entry = self.control_entry(
            ControlKind::Loop {
                break_block: exit,
                continue_block: header,
                iterator: Some(iterator),
            },
            labels,
        );
        self.handlers.push(close);
        self.jump_to_fresh_block(&format!("{}.body", prefix))?;
        self.control.push(entry);
        self.loop_depth += 1;
        let guard = self.enter_scope(scope)?;
        self.bind_pattern(pattern, value, mode)?;
        self.lower_statement(body)?;
        self.exit_scope(guard);
        self.loop_depth -= 1;
        self.control.pop();
        self.jump_if_open(header)?;
        self.handlers.pop();

        self.seal(header);
        self.seal(exit);

        self.seal(close);
        self.switch_to(close);
        let exception = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::Catch { dest: exception });
        let iterator = self.load_held(iterator)?;
        self.emit(IrInstr::IteratorClose {
            iterator,
            suppress_errors: true,
        });
        self.set_terminator(Terminator::Throw(exception))?;

        self.switch_to(exit);
        Ok(())
    }

    // ========================================================================
    // switch and labels
    // ========================================================================

    pub(super) fn lower_switch(&mut self, stmt: &'a SwitchStatement) -> CompileResult<()> {
        let labels = self.take_labels();
        let discriminant = self.lower_expression(&stmt.discriminant)?;
        let suspends = self.machine.is_some()
            && stmt.cases.iter().any(|case| {
                case.test.as_ref().map_or(false, expression_suspends) || case.consequent.iter().any(statement_suspends)
            });
        let discriminant = self.hold(discriminant, suspends)?;

        let guard = self.enter_scope(stmt.scope)?;
        for case in &stmt.cases {
            self.hoist_functions(&case.consequent)?;
        }

        let exit = self.alloc_block("switch.exit")?;
        let mut bodies = Vec::with_capacity(stmt.cases.len());
        for _ in &stmt.cases {
            bodies.push(self.alloc_block("switch.case")?);
        }

        for (case, body) in stmt.cases.iter().zip(&bodies) {
            let test = match &case.test {
                Some(test) => test,
                None => continue,
            };
            let value = self.lower_expression(test)?;
            let discriminant = self.load_held(discriminant)?;
            let matches = self.alloc_register(TypeId::BOOLEAN);
            self.emit(IrInstr::BinaryOp {
                dest: matches,
                op: BinaryOp::StrictEqual,
                left: discriminant,
                right: value,
            });
            let next = self.alloc_block("switch.test")?;
            self.branch(matches, *body, next)?;
            self.seal(next);
            self.switch_to(next);
        }
        let fallback = stmt
            .cases
            .iter()
            .position(|case| case.test.is_none())
            .map(|i| bodies[i])
            .unwrap_or(exit);
        self.jump(fallback)?;

        let entry = self.control_entry(ControlKind::Switch { break_block: exit }, labels);
        self.control.push(entry);
        for (i, case) in stmt.cases.iter().enumerate() {
            self.seal(bodies[i]);
            self.switch_to(bodies[i]);
            self.lower_statements(&case.consequent)?;
            let next = bodies.get(i + 1).copied().unwrap_or(exit);
            self.jump_if_open(next)?;
        }
        self.control.pop();

        self.seal(exit);
        self.switch_to(exit);
        self.exit_scope(guard);
        Ok(())
    }

    pub(super) fn lower_labeled(&mut self, stmt: &'a LabeledStatement) -> CompileResult<()> {
        match stmt.body.as_ref() {
            Statement::While(_)
            | Statement::DoWhile(_)
            | Statement::For(_)
            | Statement::ForOf(_)
            | Statement::ForIn(_)
            | Statement::Switch(_)
            | Statement::Labeled(_) => {
                self.pending_labels.push(stmt.label.clone());
                self.lower_statement(&stmt.body)
            }
            body => {
                let mut labels = self.take_labels();
                labels.push(stmt.label.clone());
                let exit = self.alloc_block("label.exit")?;
                let entry = self.control_entry(ControlKind::Labeled { break_block: exit }, labels);
                self.control.push(entry);
                self.lower_statement(body)?;
                self.control.pop();
                self.jump_if_open(exit)?;
                self.seal(exit);
                self.switch_to(exit);
                Ok(())
            }
        }
    }
}
