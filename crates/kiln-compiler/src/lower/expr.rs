//! Expression Lowering
//!
//! Converts AST expressions to IR instructions. Operands that must survive a later
//! `yield` or `await` in the same expression are held in frame slots (see
//! [`Lowerer::hold`]); everything else stays in registers.

use super::destructure::BindMode;
use super::{expression_suspends, pattern_suspends, Held, Lowerer};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::error::CompileResult;
use crate::ir::{BinaryOp, ErrorKind, IrConstant, IrInstr, Register, UnaryOp};
use kiln_syntax::ast::{
    ArrayElement, AssignmentOperator, AssignmentTarget, BinaryOperator, Expression, ExpressionKind, Identifier,
    LogicalOperator, ObjectProperty, PropertyKey, Resolution, UnaryOperator, UpdateOperator,
};
use kiln_syntax::TypeId;

/// An assignable location, with its object and key already evaluated
enum Reference<'a> {
    Identifier(&'a Identifier),
    Field { object: Held, name: String },
    Element { object: Held, key: Held },
    /// Not assignable; the error has already been lowered
    Invalid,
}

impl<'s, 'a> Lowerer<'s, 'a> {
    /// Lower an expression, returning the register holding its value
    pub(super) fn lower_expression(&mut self, expr: &'a Expression) -> CompileResult<Register> {
        match &expr.kind {
            ExpressionKind::Number(n) => Ok(self.constant(IrConstant::Number(*n))),
            ExpressionKind::String(s) => Ok(self.constant(IrConstant::String(s.clone()))),
            ExpressionKind::Boolean(b) => Ok(self.constant(IrConstant::Boolean(*b))),
            ExpressionKind::Null => Ok(self.constant(IrConstant::Null)),
            ExpressionKind::Undefined => Ok(self.undefined()),
            ExpressionKind::Identifier(ident) => self.lower_identifier(ident),
            ExpressionKind::Array(elements) => self.lower_array(elements),
            ExpressionKind::Object(properties) => self.lower_object(properties),
            ExpressionKind::Function(func) => self.create_closure(func, func.display_name().to_string()),
            ExpressionKind::Unary { op, argument } => self.lower_unary(*op, argument),
            ExpressionKind::Update { op, prefix, target } => self.lower_update(*op, *prefix, target),
            ExpressionKind::Binary { op, left, right } => self.lower_binary(*op, left, right),
            ExpressionKind::Logical { op, left, right } => self.lower_logical(*op, left, right),
            ExpressionKind::Conditional {
                test,
                consequent,
                alternate,
            } => self.lower_conditional(test, consequent, alternate),
            ExpressionKind::Assignment { op, target, value } => self.lower_assignment(*op, target, value),
            ExpressionKind::Call {
                callee,
                type_args,
                arguments,
                ..
            } => self.lower_call(expr, callee, type_args, arguments),
            ExpressionKind::New {
                callee,
                type_args,
                arguments,
                ..
            } => self.lower_new(expr, callee, type_args, arguments),
            ExpressionKind::Member { object, property } => self.lower_member(object, property),
            ExpressionKind::Yield { argument, delegate } => self.lower_yield(argument.as_deref(), *delegate),
            ExpressionKind::Await(argument) => self.lower_await(argument),
            ExpressionKind::Sequence(exprs) => {
                let mut last = None;
                for expr in exprs {
                    last = Some(self.lower_expression(expr)?);
                }
                match last {
                    Some(value) => Ok(value),
                    None => Ok(self.undefined()),
                }
            }
        }
    }

    /// Whether any expression of `exprs` suspends the running machine
    fn any_suspends(&self, exprs: &[Expression]) -> bool {
        self.machine.is_some() && exprs.iter().any(expression_suspends)
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn lower_unary(&mut self, op: UnaryOperator, argument: &'a Expression) -> CompileResult<Register> {
        let operand = self.lower_expression(argument)?;
        let (op, ty) = match op {
            UnaryOperator::Minus => (UnaryOp::Neg, TypeId::NUMBER),
            UnaryOperator::Plus => (UnaryOp::ToNumber, TypeId::NUMBER),
            UnaryOperator::Not => (UnaryOp::Not, TypeId::BOOLEAN),
            UnaryOperator::BitNot => (UnaryOp::BitNot, TypeId::NUMBER),
            UnaryOperator::Typeof => (UnaryOp::Typeof, TypeId::STRING),
            UnaryOperator::Void => return Ok(self.undefined()),
        };
        let dest = self.alloc_register(ty);
        self.emit(IrInstr::UnaryOp { dest, op, operand });
        Ok(dest)
    }

    fn lower_binary(&mut self, op: BinaryOperator, left: &'a Expression, right: &'a Expression) -> CompileResult<Register> {
        let lhs = self.lower_expression(left)?;
        let right_suspends = self.suspends(&[right]);
        let lhs = self.hold(lhs, right_suspends)?;
        let rhs = self.lower_expression(right)?;
        let lhs = self.load_held(lhs)?;
        Ok(self.emit_binary(op, lhs, rhs))
    }

    /// Emit `op`, specialized on the static types of its operands
    pub(super) fn emit_binary(&mut self, op: BinaryOperator, left: Register, right: Register) -> Register {
        let (op, ty) = self.select_binary_op(op, left.ty, right.ty);
        let dest = self.alloc_register(ty);
        self.emit(IrInstr::BinaryOp { dest, op, left, right });
        dest
    }

    fn select_binary_op(&self, op: BinaryOperator, left: TypeId, right: TypeId) -> (BinaryOp, TypeId) {
        let types = &*self.session.types;
        let numbers = types.is_number(left) && types.is_number(right);
        let strings = types.is_string(left) || types.is_string(right);
        match op {
            BinaryOperator::Add if numbers => (BinaryOp::NumberAdd, TypeId::NUMBER),
            BinaryOperator::Add if strings => (BinaryOp::Concat, TypeId::STRING),
            BinaryOperator::Add => (BinaryOp::Add, TypeId::ANY),
            BinaryOperator::Sub => (BinaryOp::Sub, TypeId::NUMBER),
            BinaryOperator::Mul => (BinaryOp::Mul, TypeId::NUMBER),
            BinaryOperator::Div => (BinaryOp::Div, TypeId::NUMBER),
            BinaryOperator::Mod => (BinaryOp::Mod, TypeId::NUMBER),
            BinaryOperator::Exp => (BinaryOp::Exp, TypeId::NUMBER),
            BinaryOperator::LooseEqual => (BinaryOp::LooseEqual, TypeId::BOOLEAN),
            BinaryOperator::LooseNotEqual => (BinaryOp::LooseNotEqual, TypeId::BOOLEAN),
            BinaryOperator::StrictEqual => (BinaryOp::StrictEqual, TypeId::BOOLEAN),
            BinaryOperator::StrictNotEqual => (BinaryOp::StrictNotEqual, TypeId::BOOLEAN),
            BinaryOperator::Less if numbers => (BinaryOp::NumberLess, TypeId::BOOLEAN),
            BinaryOperator::Less => (BinaryOp::Less, TypeId::BOOLEAN),
            BinaryOperator::LessEqual if numbers => (BinaryOp::NumberLessEqual, TypeId::BOOLEAN),
            BinaryOperator::LessEqual => (BinaryOp::LessEqual, TypeId::BOOLEAN),
            BinaryOperator::Greater if numbers => (BinaryOp::NumberGreater, TypeId::BOOLEAN),
            BinaryOperator::Greater => (BinaryOp::Greater, TypeId::BOOLEAN),
            BinaryOperator::GreaterEqual if numbers => (BinaryOp::NumberGreaterEqual, TypeId::BOOLEAN),
            BinaryOperator::GreaterEqual => (BinaryOp::GreaterEqual, TypeId::BOOLEAN),
            BinaryOperator::BitAnd => (BinaryOp::BitAnd, TypeId::NUMBER),
            BinaryOperator::BitOr => (BinaryOp::BitOr, TypeId::NUMBER),
            BinaryOperator::BitXor => (BinaryOp::BitXor, TypeId::NUMBER),
            BinaryOperator::ShiftLeft => (BinaryOp::ShiftLeft, TypeId::NUMBER),
            BinaryOperator::ShiftRight => (BinaryOp::ShiftRight, TypeId::NUMBER),
            BinaryOperator::UnsignedShiftRight => (BinaryOp::UnsignedShiftRight, TypeId::NUMBER),
        }
    }

    fn lower_update(&mut self, op: UpdateOperator, prefix: bool, target: &'a Expression) -> CompileResult<Register> {
        let reference = self.lower_reference(target, false)?;
        let current = self.load_reference(&reference)?;
        let old = self.alloc_register(TypeId::NUMBER);
        self.emit(IrInstr::UnaryOp {
            dest: old,
            op: UnaryOp::ToNumber,
            operand: current,
        });
        let one = self.constant(IrConstant::Number(1.0));
        let new = self.alloc_register(TypeId::NUMBER);
        let op = match op {
            UpdateOperator::Increment => BinaryOp::NumberAdd,
            UpdateOperator::Decrement => BinaryOp::Sub,
        };
        self.emit(IrInstr::BinaryOp {
            dest: new,
            op,
            left: old,
            right: one,
        });
        self.store_reference(&reference, new)?;
        Ok(if prefix { new } else { old })
    }

    fn lower_logical(&mut self, op: LogicalOperator, left: &'a Expression, right: &'a Expression) -> CompileResult<Register> {
        let lhs = self.lower_expression(left)?;
        let result = self.new_temp();
        self.write_var(result, lhs);

        let rhs_block = self.alloc_block("logical.rhs")?;
        let join = self.alloc_block("logical.join")?;
        match op {
            LogicalOperator::And => self.branch(lhs, rhs_block, join)?,
            LogicalOperator::Or => self.branch(lhs, join, rhs_block)?,
            LogicalOperator::Nullish => {
                let null = self.constant(IrConstant::Null);
                let nullish = self.alloc_register(TypeId::BOOLEAN);
                self.emit(IrInstr::BinaryOp {
                    dest: nullish,
                    op: BinaryOp::LooseEqual,
                    left: lhs,
                    right: null,
                });
                self.branch(nullish, rhs_block, join)?;
            }
        }
        self.seal(rhs_block);

        self.switch_to(rhs_block);
        let rhs = self.lower_expression(right)?;
        self.write_var(result, rhs);
        self.jump(join)?;

        self.seal(join);
        self.switch_to(join);
        let ty = if lhs.ty == rhs.ty { lhs.ty } else { TypeId::ANY };
        Ok(self.read_var(result, ty))
    }

    fn lower_conditional(
        &mut self,
        test: &'a Expression,
        consequent: &'a Expression,
        alternate: &'a Expression,
    ) -> CompileResult<Register> {
        let cond = self.lower_expression(test)?;
        let result = self.new_temp();
        let then_block = self.alloc_block("cond.then")?;
        let else_block = self.alloc_block("cond.else")?;
        let join = self.alloc_block("cond.join")?;
        self.branch(cond, then_block, else_block)?;
        self.seal(then_block);
        self.seal(else_block);

        self.switch_to(then_block);
        let a = self.lower_expression(consequent)?;
        self.write_var(result, a);
        self.jump(join)?;

        self.switch_to(else_block);
        let b = self.lower_expression(alternate)?;
        self.write_var(result, b);
        self.jump(join)?;

        self.seal(join);
        self.switch_to(join);
        let ty = if a.ty == b.ty { a.ty } else { TypeId::ANY };
        Ok(self.read_var(result, ty))
    }

    // ========================================================================
    // References and assignment
    // ========================================================================

    /// Evaluate the object and key of an assignment target; `later_suspends` says
    /// whether code between this and the store can suspend
    fn lower_reference(&mut self, target: &'a Expression, later_suspends: bool) -> CompileResult<Reference<'a>> {
        match &target.kind {
            ExpressionKind::Identifier(ident) => Ok(Reference::Identifier(ident)),
            ExpressionKind::Member { object, property } => {
                let obj = self.lower_expression(object)?;
                match property {
                    PropertyKey::Named(name) => Ok(Reference::Field {
                        object: self.hold(obj, later_suspends)?,
                        name: name.clone(),
                    }),
                    PropertyKey::Computed(key) => {
                        let key_suspends = self.suspends(&[key.as_ref()]);
                        let object = self.hold(obj, later_suspends || key_suspends)?;
                        let key = self.lower_expression(key)?;
                        let key = self.hold(key, later_suspends)?;
                        Ok(Reference::Element { object, key })
                    }
                }
            }
            _ => {
                let message = "Invalid assignment target";
                let function = self.function_name();
                self.report(Diagnostic::error(
                    DiagnosticCode::InvalidAssignmentTarget,
                    message,
                    target.span,
                    function,
                ));
                self.throw_error(ErrorKind::SyntaxError, message)?;
                Ok(Reference::Invalid)
            }
        }
    }

    fn load_reference(&mut self, reference: &Reference<'a>) -> CompileResult<Register> {
        match reference {
            Reference::Identifier(ident) => self.lower_identifier(ident),
            Reference::Field { object, name } => {
                let object = self.load_held(*object)?;
                let dest = self.alloc_register(TypeId::ANY);
                self.emit(IrInstr::LoadField {
                    dest,
                    object,
                    field: name.clone(),
                });
                Ok(dest)
            }
            Reference::Element { object, key } => {
                let object = self.load_held(*object)?;
                let key = self.load_held(*key)?;
                let dest = self.alloc_register(TypeId::ANY);
                self.emit(IrInstr::LoadElement { dest, object, key });
                Ok(dest)
            }
            Reference::Invalid => Ok(self.undefined()),
        }
    }

    fn store_reference(&mut self, reference: &Reference<'a>, value: Register) -> CompileResult<()> {
        match reference {
            Reference::Identifier(ident) => self.assign_identifier(ident, value),
            Reference::Field { object, name } => {
                let object = self.load_held(*object)?;
                self.emit(IrInstr::StoreField {
                    object,
                    field: name.clone(),
                    value,
                });
                Ok(())
            }
            Reference::Element { object, key } => {
                let object = self.load_held(*object)?;
                let key = self.load_held(*key)?;
                self.emit(IrInstr::StoreElement { object, key, value });
                Ok(())
            }
            Reference::Invalid => Ok(()),
        }
    }

    fn lower_assignment(
        &mut self,
        op: AssignmentOperator,
        target: &'a AssignmentTarget,
        value: &'a Expression,
    ) -> CompileResult<Register> {
        let target = match target {
            AssignmentTarget::Simple(target) => target,
            AssignmentTarget::Pattern(pattern) => {
                let rhs = self.lower_expression(value)?;
                let binding_suspends = self.machine.is_some() && pattern_suspends(pattern);
                let held = self.hold(rhs, binding_suspends)?;
                self.bind_pattern(pattern, rhs, BindMode::Assign)?;
                return self.load_held(held);
            }
        };

        let value_suspends = self.suspends(&[value]);
        let reference = self.lower_reference(target, value_suspends)?;
        let result = match op {
            AssignmentOperator::Assign => self.lower_expression(value)?,
            AssignmentOperator::Compound(op) => {
                let current = self.load_reference(&reference)?;
                let current = self.hold(current, value_suspends)?;
                let rhs = self.lower_expression(value)?;
                let current = self.load_held(current)?;
                self.emit_binary(op, current, rhs)
            }
        };
        self.store_reference(&reference, result)?;
        Ok(result)
    }

    /// Store `value` into `object.property`
    pub(super) fn store_member(
        &mut self,
        object: &'a Expression,
        property: &'a PropertyKey,
        value: Held,
    ) -> CompileResult<()> {
        let obj = self.lower_expression(object)?;
        match property {
            PropertyKey::Named(name) => {
                let value = self.load_held(value)?;
                self.emit(IrInstr::StoreField {
                    object: obj,
                    field: name.clone(),
                    value,
                });
            }
            PropertyKey::Computed(key) => {
                let key_suspends = self.suspends(&[key.as_ref()]);
                let obj = self.hold(obj, key_suspends)?;
                let key = self.lower_expression(key)?;
                let object = self.load_held(obj)?;
                let value = self.load_held(value)?;
                self.emit(IrInstr::StoreElement { object, key, value });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Evaluate arguments left to right
    fn lower_arguments(&mut self, arguments: &'a [Expression]) -> CompileResult<Vec<Register>> {
        let mut held = Vec::with_capacity(arguments.len());
        for (i, arg) in arguments.iter().enumerate() {
            let value = self.lower_expression(arg)?;
            let later = self.any_suspends(&arguments[i + 1..]);
            held.push(self.hold(value, later)?);
        }
        held.into_iter().map(|h| self.load_held(h)).collect()
    }

    /// The generic function or class an identifier callee names
    /// Lower a callee, specializing it at `type_args` when it names a generic
    fn lower_callee(&mut self, callee: &'a Expression, type_args: &[TypeId]) -> CompileResult<Register> {
        if let ExpressionKind::Identifier(ident) = &callee.kind {
            if let Some(id) = ident.binding() {
                if let Some(decl) = self.generic_declaration(id) {
                    return self.generic_binding_reference(id, ident.span, decl, type_args);
                }
            }
        }
        self.lower_expression(callee)
    }

    fn lower_call(
        &mut self,
        call: &'a Expression,
        callee: &'a Expression,
        type_args: &[TypeId],
        arguments: &'a [Expression],
    ) -> CompileResult<Register> {
        if let ExpressionKind::Identifier(ident) = &callee.kind {
            if ident.name == "eval" && ident.resolution == Resolution::Global {
                return self.lower_direct_eval(arguments);
            }
        }

        let args_suspend = self.any_suspends(arguments);
        let (callee, receiver) = match &callee.kind {
            ExpressionKind::Member { object, property } => {
                let obj = self.lower_expression(object)?;
                let key_suspends = match property {
                    PropertyKey::Computed(key) => self.suspends(&[key.as_ref()]),
                    PropertyKey::Named(_) => false,
                };
                let receiver = self.hold(obj, key_suspends || args_suspend)?;
                let method = match self.generic_method(object, property) {
                    Some((class, method, class_args)) => {
                        self.specialized_method(class, method, type_args, &class_args)?
                    }
                    None => self.load_method(receiver, property)?,
                };
                (self.hold(method, args_suspend)?, Some(receiver))
            }
            _ => {
                let func = self.lower_callee(callee, type_args)?;
                (self.hold(func, args_suspend)?, None)
            }
        };

        let args = self.lower_arguments(arguments)?;
        let callee = self.load_held(callee)?;
        let receiver = match receiver {
            Some(receiver) => Some(self.load_held(receiver)?),
            None => None,
        };
        let ty = self.ty(call.ty);
        let dest = self.alloc_register(ty);
        self.emit(IrInstr::Call {
            dest,
            callee,
            receiver,
            args,
        });
        Ok(dest)
    }

    /// Look up the method a member call invokes on `receiver`
    fn load_method(&mut self, receiver: Held, property: &'a PropertyKey) -> CompileResult<Register> {
        let method = self.alloc_register(TypeId::ANY);
        match property {
            PropertyKey::Named(name) => {
                let object = self.load_held(receiver)?;
                self.emit(IrInstr::LoadField {
                    dest: method,
                    object,
                    field: name.clone(),
                });
            }
            PropertyKey::Computed(key) => {
                let key = self.lower_expression(key)?;
                let object = self.load_held(receiver)?;
                self.emit(IrInstr::LoadElement {
                    dest: method,
                    object,
                    key,
                });
            }
        }
        Ok(method)
    }

    /// `eval(source)` naming the global `eval`: runs in the current environment chain
    fn lower_direct_eval(&mut self, arguments: &'a [Expression]) -> CompileResult<Register> {
        let args = self.lower_arguments(arguments)?;
        let source = match args.first() {
            Some(source) => *source,
            None => self.undefined(),
        };
        let env = self.current_env();
        let dest = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::DirectEval { dest, source, env });
        Ok(dest)
    }

    fn lower_new(
        &mut self,
        new: &'a Expression,
        callee: &'a Expression,
        type_args: &[TypeId],
        arguments: &'a [Expression],
    ) -> CompileResult<Register> {
        let constructor = self.lower_callee(callee, type_args)?;
        let args_suspend = self.any_suspends(arguments);
        let constructor = self.hold(constructor, args_suspend)?;
        let args = self.lower_arguments(arguments)?;
        let callee = self.load_held(constructor)?;
        let ty = self.ty(new.ty);
        let dest = self.alloc_register(ty);
        self.emit(IrInstr::Construct { dest, callee, args });
        Ok(dest)
    }

    fn lower_member(&mut self, object: &'a Expression, property: &'a PropertyKey) -> CompileResult<Register> {
        let obj = self.lower_expression(object)?;
        let dest = self.alloc_register(TypeId::ANY);
        match property {
            PropertyKey::Named(name) => {
                self.emit(IrInstr::LoadField {
                    dest,
                    object: obj,
                    field: name.clone(),
                });
            }
            PropertyKey::Computed(key) => {
                let key_suspends = self.suspends(&[key.as_ref()]);
                let obj = self.hold(obj, key_suspends)?;
                let key = self.lower_expression(key)?;
                let object = self.load_held(obj)?;
                self.emit(IrInstr::LoadElement { dest, object, key });
            }
        }
        Ok(dest)
    }

    // ========================================================================
    // Literals
    // ========================================================================

    fn lower_array(&mut self, elements: &'a [ArrayElement]) -> CompileResult<Register> {
        let has_spread = elements.iter().any(|e| matches!(e, ArrayElement::Spread(_)));
        if !has_spread {
            let mut held = Vec::with_capacity(elements.len());
            for (i, element) in elements.iter().enumerate() {
                let value = match element {
                    ArrayElement::Expression(expr) => self.lower_expression(expr)?,
                    _ => self.undefined(),
                };
                let later = self.elements_suspend(&elements[i + 1..]);
                held.push(self.hold(value, later)?);
            }
            let values = held
                .into_iter()
                .map(|h| self.load_held(h))
                .collect::<CompileResult<Vec<_>>>()?;
            let dest = self.alloc_register(TypeId::ANY);
            self.emit(IrInstr::NewArray { dest, elements: values });
            return Ok(dest);
        }

        let array = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::NewArray {
            dest: array,
            elements: Vec::new(),
        });
        let suspends = self.elements_suspend(elements);
        let held = self.hold(array, suspends)?;
        for element in elements {
            match element {
                ArrayElement::Expression(expr) => {
                    let value = self.lower_expression(expr)?;
                    let array = self.load_held(held)?;
                    self.emit(IrInstr::ArrayPush { array, value });
                }
                ArrayElement::Hole => {
                    let value = self.undefined();
                    let array = self.load_held(held)?;
                    self.emit(IrInstr::ArrayPush { array, value });
                }
                ArrayElement::Spread(expr) => {
                    let iterable = self.lower_expression(expr)?;
                    let array = self.load_held(held)?;
                    self.emit(IrInstr::ArraySpread { array, iterable });
                }
            }
        }
        self.load_held(held)
    }

    fn elements_suspend(&self, elements: &[ArrayElement]) -> bool {
        self.machine.is_some()
            && elements.iter().any(|e| match e {
                ArrayElement::Expression(expr) | ArrayElement::Spread(expr) => expression_suspends(expr),
                ArrayElement::Hole => false,
            })
    }

    fn lower_object(&mut self, properties: &'a [ObjectProperty]) -> CompileResult<Register> {
        let object = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::NewObject { dest: object });
        let suspends = self.machine.is_some()
            && properties.iter().any(|p| match p {
                ObjectProperty::KeyValue { key, value } => {
                    expression_suspends(value)
                        || matches!(key, PropertyKey::Computed(k) if expression_suspends(k))
                }
                ObjectProperty::Spread(expr) => expression_suspends(expr),
            });
        let held = self.hold(object, suspends)?;

        for property in properties {
            match property {
                ObjectProperty::KeyValue {
                    key: PropertyKey::Named(name),
                    value,
                } => {
                    let value = self.lower_expression(value)?;
                    let object = self.load_held(held)?;
                    self.emit(IrInstr::StoreField {
                        object,
                        field: name.clone(),
                        value,
                    });
                }
                ObjectProperty::KeyValue {
                    key: PropertyKey::Computed(key),
                    value,
                } => {
                    let key = self.lower_expression(key)?;
                    let value_suspends = self.suspends(&[value]);
                    let key = self.hold(key, value_suspends)?;
                    let value = self.lower_expression(value)?;
                    let key = self.load_held(key)?;
                    let object = self.load_held(held)?;
                    self.emit(IrInstr::StoreElement { object, key, value });
                }
                ObjectProperty::Spread(expr) => {
                    let source = self.lower_expression(expr)?;
                    let object = self.load_held(held)?;
                    self.emit(IrInstr::CopyDataProperties {
                        target: object,
                        source,
                        excluded: Vec::new(),
                    });
                }
            }
        }
        self.load_held(held)
    }
}
