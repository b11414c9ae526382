//! Destructuring
//!
//! Array patterns drive the iterator protocol one step per element and close the
//! iterator on every abrupt exit except one raised by the iterator itself. Object
//! patterns read properties in source order and reject `null`/`undefined` sources.
//! Both declarations and assignment patterns go through [`Lowerer::bind_pattern`].

use super::{pattern_suspends, Held, Lowerer, TempSlot};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::error::CompileResult;
use crate::ir::{BinaryOp, ErrorKind, IrConstant, IrInstr, Register, Terminator};
use kiln_syntax::ast::{ArrayPattern, Expression, ExpressionKind, ObjectPattern, Pattern, PropertyKey};
use kiln_syntax::TypeId;

/// How a pattern's identifiers receive their values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindMode {
    /// Initialize the declared bindings; no TDZ or const checks
    Declare,
    /// Ordinary assignment to existing references
    Assign,
}

impl<'s, 'a> Lowerer<'s, 'a> {
    /// Bind `pattern` to `value`
    pub(super) fn bind_pattern(&mut self, pattern: &'a Pattern, value: Register, mode: BindMode) -> CompileResult<()> {
        match pattern {
            Pattern::Identifier(bp) => match (mode, bp.ident.binding()) {
                (BindMode::Declare, Some(id)) => self.store_binding(id, value),
                _ => self.assign_identifier(&bp.ident, value),
            },
            Pattern::Array(array) => {
                let suspends = self.machine.is_some() && pattern_suspends(pattern);
                self.bind_array_pattern(array, value, mode, suspends)
            }
            Pattern::Object(object) => {
                let suspends = self.machine.is_some() && pattern_suspends(pattern);
                self.bind_object_pattern(object, value, mode, suspends)
            }
            Pattern::Expression(target) => self.bind_expression_target(target, value),
        }
    }

    /// Replace `value` by the result of `default` when it is `undefined`
    pub(super) fn apply_default(&mut self, value: Register, default: &'a Expression) -> CompileResult<Register> {
        let undefined = self.undefined();
        let is_undefined = self.alloc_register(TypeId::BOOLEAN);
        self.emit(IrInstr::BinaryOp {
            dest: is_undefined,
            op: BinaryOp::StrictEqual,
            left: value,
            right: undefined,
        });

        let result = self.new_temp();
        self.write_var(result, value);
        let use_default = self.alloc_block("default")?;
        let join = self.alloc_block("default.join")?;
        self.branch(is_undefined, use_default, join)?;
        self.seal(use_default);

        self.switch_to(use_default);
        let fallback = self.lower_expression(default)?;
        self.write_var(result, fallback);
        self.jump(join)?;

        self.seal(join);
        self.switch_to(join);
        let ty = if fallback.ty == value.ty { value.ty } else { TypeId::ANY };
        Ok(self.read_var(result, ty))
    }

    // ========================================================================
    // Array patterns
    // ========================================================================

    fn bind_array_pattern(
        &mut self,
        pattern: &'a ArrayPattern,
        value: Register,
        mode: BindMode,
        suspends: bool,
    ) -> CompileResult<()> {
        let iterator = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::GetIterator {
            dest: iterator,
            iterable: value,
        });
        let next = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::LoadField {
            dest: next,
            object: iterator,
            field: "next".to_string(),
        });
        let iterator = self.hold(iterator, suspends)?;
        let next = self.hold(next, suspends)?;

        // Set while a `next()` call is in flight and once the iterator is exhausted
        let done = self.temp_slot("%done")?;
        let no = self.constant(IrConstant::Boolean(false));
        self.store_temp(done, no)?;

        let close = self.alloc_block("destructure.close")?;
        self.handlers.push(close);
        self.jump_to_fresh_block("destructure.body")?;

        for element in &pattern.elements {
            let item = self.iterator_step(iterator, next, done)?;
            if let Some(element) = element {
                let item = match &element.default {
                    Some(default) => self.apply_default(item, default)?,
                    None => item,
                };
                self.bind_pattern(&element.pattern, item, mode)?;
            }
        }
        if let Some(rest) = &pattern.rest {
            let array = self.collect_rest(iterator, next, done)?;
            self.bind_pattern(rest, array, mode)?;
        }

        self.handlers.pop();
        self.jump_to_fresh_block("destructure.done")?;
        if pattern.rest.is_none() {
            self.close_unless_done(iterator, done, false)?;
        }

        let resume = self.current_block;
        self.seal(close);
        self.switch_to(close);
        let exception = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::Catch { dest: exception });
        self.close_unless_done(iterator, done, true)?;
        self.set_terminator(Terminator::Throw(exception))?;

        self.switch_to(resume);
        Ok(())
    }

    /// Advance the iterator once; yields `undefined` once it is exhausted
    fn iterator_step(&mut self, iterator: Held, next: Held, done: TempSlot) -> CompileResult<Register> {
        let result = self.new_temp();
        let finished = self.load_temp(done, TypeId::BOOLEAN)?;
        let step = self.alloc_block("destructure.step")?;
        let exhausted = self.alloc_block("destructure.exhausted")?;
        let has_value = self.alloc_block("destructure.value")?;
        let join = self.alloc_block("destructure.next")?;
        self.branch(finished, exhausted, step)?;
        self.seal(step);

        self.switch_to(step);
        let yes = self.constant(IrConstant::Boolean(true));
        self.store_temp(done, yes)?;
        let step_result = self.call_next(iterator, next)?;
        let step_done = self.alloc_register(TypeId::BOOLEAN);
        self.emit(IrInstr::LoadField {
            dest: step_done,
            object: step_result,
            field: "done".to_string(),
        });
        self.branch(step_done, exhausted, has_value)?;
        self.seal(exhausted);
        self.seal(has_value);

        self.switch_to(has_value);
        let item = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::LoadField {
            dest: item,
            object: step_result,
            field: "value".to_string(),
        });
        let no = self.constant(IrConstant::Boolean(false));
        self.store_temp(done, no)?;
        self.write_var(result, item);
        self.jump(join)?;

        self.switch_to(exhausted);
        let undefined = self.undefined();
        self.write_var(result, undefined);
        self.jump(join)?;

        self.seal(join);
        self.switch_to(join);
        Ok(self.read_var(result, TypeId::ANY))
    }

    /// `next()` on the held iterator, checking that the result is an object
    pub(super) fn call_next(&mut self, iterator: Held, next: Held) -> CompileResult<Register> {
        let receiver = self.load_held(iterator)?;
        let callee = self.load_held(next)?;
        let result = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::Call {
            dest: result,
            callee,
            receiver: Some(receiver),
            args: Vec::new(),
        });
        self.emit(IrInstr::ThrowIfNotObject {
            value: result,
            message: "Iterator result is not an object".to_string(),
        });
        Ok(result)
    }

    /// Drain the remaining values into a new array
    fn collect_rest(&mut self, iterator: Held, next: Held, done: TempSlot) -> CompileResult<Register> {
        let array = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::NewArray {
            dest: array,
            elements: Vec::new(),
        });

        let header = self.alloc_block("rest.header")?;
        let body = self.alloc_block("rest.body")?;
        let push = self.alloc_block("rest.push")?;
        let exit = self.alloc_block("rest.exit")?;
        self.jump(header)?;

        self.switch_to(header);
        let finished = self.load_temp(done, TypeId::BOOLEAN)?;
        self.branch(finished, exit, body)?;
        self.seal(body);

        self.switch_to(body);
        let yes = self.constant(IrConstant::Boolean(true));
        self.store_temp(done, yes)?;
        let step_result = self.call_next(iterator, next)?;
        let step_done = self.alloc_register(TypeId::BOOLEAN);
        self.emit(IrInstr::LoadField {
            dest: step_done,
            object: step_result,
            field: "done".to_string(),
        });
        self.branch(step_done, exit, push)?;
        self.seal(push);
        self.seal(exit);

        self.switch_to(push);
        let item = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::LoadField {
            dest: item,
            object: step_result,
            field: "value".to_string(),
        });
        let no = self.constant(IrConstant::Boolean(false));
        self.store_temp(done, no)?;
        self.emit(IrInstr::ArrayPush { array, value: item });
        self.jump(header)?;
        self.seal(header);

        self.switch_to(exit);
        Ok(array)
    }

    /// Close the iterator unless `done` is set
    fn close_unless_done(&mut self, iterator: Held, done: TempSlot, suppress_errors: bool) -> CompileResult<()> {
        let finished = self.load_temp(done, TypeId::BOOLEAN)?;
        let close = self.alloc_block("iterator.close")?;
        let after = self.alloc_block("iterator.closed")?;
        self.branch(finished, after, close)?;
        self.seal(close);

        self.switch_to(close);
        let iterator = self.load_held(iterator)?;
        self.emit(IrInstr::IteratorClose {
            iterator,
            suppress_errors,
        });
        self.jump(after)?;

        self.seal(after);
        self.switch_to(after);
        Ok(())
    }

    // ========================================================================
    // Object patterns
    // ========================================================================

    fn bind_object_pattern(
        &mut self,
        pattern: &'a ObjectPattern,
        value: Register,
        mode: BindMode,
        suspends: bool,
    ) -> CompileResult<()> {
        let null = self.constant(IrConstant::Null);
        let nullish = self.alloc_register(TypeId::BOOLEAN);
        self.emit(IrInstr::BinaryOp {
            dest: nullish,
            op: BinaryOp::LooseEqual,
            left: value,
            right: null,
        });
        let fail = self.alloc_block("destructure.nullish")?;
        let ok = self.alloc_block("destructure.object")?;
        self.branch(nullish, fail, ok)?;
        self.seal(fail);
        self.seal(ok);
        self.switch_to(fail);
        self.set_terminator(Terminator::ThrowError {
            kind: ErrorKind::TypeError,
            message: "Cannot destructure 'undefined' or 'null'".to_string(),
        })?;
        self.switch_to(ok);

        let source = self.hold(value, suspends)?;
        let collect_keys = pattern.rest.is_some();
        let mut excluded: Vec<Held> = Vec::new();

        for prop in &pattern.properties {
            let item = self.alloc_register(TypeId::ANY);
            match &prop.key {
                PropertyKey::Named(name) => {
                    let object = self.load_held(source)?;
                    self.emit(IrInstr::LoadField {
                        dest: item,
                        object,
                        field: name.clone(),
                    });
                    if collect_keys {
                        let key = self.constant(IrConstant::String(name.clone()));
                        excluded.push(self.hold(key, suspends)?);
                    }
                }
                PropertyKey::Computed(key) => {
                    let key = self.lower_expression(key)?;
                    let object = self.load_held(source)?;
                    self.emit(IrInstr::LoadElement {
                        dest: item,
                        object,
                        key,
                    });
                    if collect_keys {
                        excluded.push(self.hold(key, suspends)?);
                    }
                }
            }
            let item = match &prop.default {
                Some(default) => self.apply_default(item, default)?,
                None => item,
            };
            self.bind_pattern(&prop.value, item, mode)?;
        }

        if let Some(rest) = &pattern.rest {
            let target = self.alloc_register(TypeId::ANY);
            self.emit(IrInstr::NewObject { dest: target });
            let object = self.load_held(source)?;
            let mut keys = Vec::with_capacity(excluded.len());
            for key in excluded {
                keys.push(self.load_held(key)?);
            }
            self.emit(IrInstr::CopyDataProperties {
                target,
                source: object,
                excluded: keys,
            });
            self.bind_pattern(rest, target, mode)?;
        }
        Ok(())
    }

    // ========================================================================
    // Assignment targets
    // ========================================================================

    fn bind_expression_target(&mut self, target: &'a Expression, value: Register) -> CompileResult<()> {
        match &target.kind {
            ExpressionKind::Identifier(ident) => self.assign_identifier(ident, value),
            ExpressionKind::Member { object, property } => {
                let suspends = self.suspends(&[object.as_ref()]);
                let value = self.hold(value, suspends)?;
                self.store_member(object, property, value)
            }
            _ => {
                let message = "Invalid destructuring assignment target";
                let function = self.function_name();
                self.report(Diagnostic::error(
                    DiagnosticCode::InvalidDestructuringTarget,
                    message,
                    target.span,
                    function,
                ));
                self.throw_error(ErrorKind::SyntaxError, message)
            }
        }
    }
}
