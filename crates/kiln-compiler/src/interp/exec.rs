//! Block-by-block execution of IR functions

use super::value::{EnvRecord, EnvRef, Native, Object, ObjectKind, Value};
use super::{InterpError, InterpResult, Interpreter, Step, Unwind, MAX_CALL_DEPTH};
use crate::generator::ResumeAction;
use crate::ir::{
    BasicBlockId, BinaryOp, ErrorKind, FunctionId, IrConstant, IrFunction, IrInstr, IrValue, Register, RegisterId,
    Terminator, UnaryOp,
};
use kiln_syntax::InitState;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// One activation of an IR function
struct Frame<'m> {
    func: &'m IrFunction,
    registers: FxHashMap<RegisterId, Value>,
    stack: Vec<Value>,
    closure_env: Option<EnvRef>,
    /// Exception being delivered to the current handler block
    exception: Option<Value>,
}

impl<'m> Frame<'m> {
    fn get(&self, reg: Register) -> InterpResult<Value> {
        self.registers
            .get(&reg.id)
            .cloned()
            .ok_or_else(|| InterpError::UndefinedRegister {
                function: self.func.name.clone(),
                register: reg.id,
            })
    }

    fn set(&mut self, reg: Register, value: Value) {
        self.registers.insert(reg.id, value);
    }

    fn malformed(&self, message: impl Into<String>) -> InterpError {
        InterpError::Malformed {
            function: self.func.name.clone(),
            message: message.into(),
        }
    }
}

/// Where control goes after a block
enum Flow {
    Goto(BasicBlockId),
    Return(Value),
    Throw(Value),
}

pub(super) fn throw_error(kind: ErrorKind, message: impl AsRef<str>) -> Unwind {
    Unwind::Throw(Value::error(kind.as_str(), message.as_ref()))
}

fn type_error(message: impl AsRef<str>) -> Unwind {
    throw_error(ErrorKind::TypeError, message)
}

fn constant(c: &IrConstant) -> Value {
    match c {
        IrConstant::Undefined => Value::Undefined,
        IrConstant::Null => Value::Null,
        IrConstant::Boolean(b) => Value::Boolean(*b),
        IrConstant::Number(n) => Value::Number(*n),
        IrConstant::String(s) => Value::string(s.as_str()),
        IrConstant::Empty => Value::Empty,
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

/// Own enumerable properties of `source` in property order: array indices first
fn own_entries(source: &Value) -> Vec<(String, Value)> {
    match source {
        Value::String(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::string(c.to_string())))
            .collect(),
        Value::Object(object) => {
            let object = object.borrow();
            let mut entries = Vec::new();
            if let ObjectKind::Array(elements) = &object.kind {
                entries.extend(elements.iter().enumerate().map(|(i, v)| (i.to_string(), v.clone())));
            }
            entries.extend(object.properties.iter().cloned());
            entries
        }
        _ => Vec::new(),
    }
}

impl<'m> Interpreter<'m> {
    // ========================================================================
    // Calls
    // ========================================================================

    pub(super) fn call_function(&mut self, id: FunctionId, env: Option<EnvRef>, this: Value, args: Vec<Value>) -> Step<Value> {
        let func = self.module.get_function(id).ok_or(InterpError::UnknownFunction(id))?;
        if self.depth >= MAX_CALL_DEPTH {
            return Err(InterpError::StackOverflow(MAX_CALL_DEPTH).into());
        }
        self.depth += 1;
        let result = self.run_function(func, env, this, args);
        self.depth -= 1;
        result
    }

    fn run_function(&mut self, func: &'m IrFunction, env: Option<EnvRef>, this: Value, args: Vec<Value>) -> Step<Value> {
        let mut frame = Frame {
            func,
            registers: FxHashMap::default(),
            stack: vec![Value::Undefined; func.stack_slots.len()],
            closure_env: env,
            exception: None,
        };
        let mut args = args.into_iter();
        for param in &func.params {
            frame.set(*param, args.next().unwrap_or(Value::Undefined));
        }
        if let Some(rest) = func.rest_param {
            frame.set(rest, Value::array(args.collect()));
        }
        if let Some(this_param) = func.this_param {
            frame.set(this_param, this);
        }

        let mut current = func.entry_block;
        let mut pred: Option<BasicBlockId> = None;
        loop {
            let block = func.get_block(current).ok_or_else(|| InterpError::UnknownBlock {
                function: func.name.clone(),
                block: current,
            })?;

            // Phis read their sources simultaneously
            let mut phis = Vec::new();
            for instr in &block.instructions {
                let IrInstr::Phi { dest, sources } = instr else { break };
                let source = pred
                    .and_then(|p| sources.iter().find(|(from, _)| *from == p))
                    .ok_or_else(|| frame.malformed(format!("phi {} has no source for the incoming edge", dest)))?;
                phis.push((*dest, frame.get(source.1)?));
            }
            let body = &block.instructions[phis.len()..];
            for (dest, value) in phis {
                frame.set(dest, value);
            }

            let mut thrown = None;
            for instr in body {
                self.tick()?;
                match self.exec_instr(&mut frame, instr) {
                    Ok(()) => {}
                    Err(Unwind::Throw(value)) => {
                        thrown = Some(value);
                        break;
                    }
                    Err(fatal) => return Err(fatal),
                }
            }
            let flow = match thrown {
                Some(value) => Flow::Throw(value),
                None => match &block.terminator {
                    Some(term) => self.exec_terminator(&frame, term)?,
                    None => {
                        return Err(InterpError::MissingTerminator {
                            function: func.name.clone(),
                            block: current,
                        }
                        .into())
                    }
                },
            };
            match flow {
                Flow::Goto(target) => {
                    pred = Some(current);
                    current = target;
                }
                Flow::Return(value) => return Ok(value),
                Flow::Throw(value) => match block.handler {
                    Some(handler) => {
                        frame.exception = Some(value);
                        pred = Some(current);
                        current = handler;
                    }
                    None => return Err(Unwind::Throw(value)),
                },
            }
        }
    }

    fn exec_terminator(&mut self, frame: &Frame<'m>, term: &Terminator) -> Step<Flow> {
        self.tick()?;
        let flow = match term {
            Terminator::Jump(target) => Flow::Goto(*target),
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                if frame.get(*cond)?.to_boolean() {
                    Flow::Goto(*then_block)
                } else {
                    Flow::Goto(*else_block)
                }
            }
            Terminator::Switch { value, cases, default } => {
                let n = frame.get(*value)?.to_number();
                let target = cases
                    .iter()
                    .find(|(case, _)| f64::from(*case) == n)
                    .map(|(_, block)| *block)
                    .unwrap_or(*default);
                Flow::Goto(target)
            }
            Terminator::Return(value) => match value {
                Some(reg) => Flow::Return(frame.get(*reg)?),
                None => Flow::Return(Value::Undefined),
            },
            Terminator::Throw(reg) => Flow::Throw(frame.get(*reg)?),
            Terminator::ThrowError { kind, message } => Flow::Throw(Value::error(kind.as_str(), message)),
            Terminator::Unreachable => return Err(frame.malformed("reached an unreachable block").into()),
        };
        Ok(flow)
    }

    /// Call any callable value
    pub(super) fn call_value(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> Step<Value> {
        enum Target {
            Closure(FunctionId, Option<EnvRef>),
            Native(Native),
        }
        let target = match callee {
            Value::Object(object) => match &object.borrow().kind {
                ObjectKind::Closure { func, env } => Target::Closure(*func, env.clone()),
                ObjectKind::Native(native) => Target::Native(*native),
                ObjectKind::Class { name, .. } => {
                    return Err(type_error(format!(
                        "Class constructor {} cannot be invoked without 'new'",
                        name
                    )))
                }
                _ => return Err(type_error(format!("{} is not a function", callee))),
            },
            _ => return Err(type_error(format!("{} is not a function", callee))),
        };
        match target {
            Target::Closure(func, env) => self.call_function(func, env, this, args),
            Target::Native(native) => self.call_native(native, this, args),
        }
    }

    fn call_native(&mut self, native: Native, this: Value, args: Vec<Value>) -> Step<Value> {
        let first = args.first().cloned().unwrap_or(Value::Undefined);
        match native {
            Native::Log => {
                let line = args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
                self.output.push(line);
                Ok(Value::Undefined)
            }
            Native::SideEffect => {
                let mut line = "sideEffect".to_string();
                for arg in &args {
                    line.push(' ');
                    line.push_str(&arg.to_string());
                }
                self.output.push(line);
                Ok(Value::Undefined)
            }
            Native::Resolved => self.settled_promise(first, false),
            Native::Rejected => self.settled_promise(first, true),
            Native::GeneratorMethod(action) => self.resume_generator(&this, action, first),
            Native::ListIteratorNext => self.list_iterator_next(&this),
        }
    }

    fn construct(&mut self, callee: &Value, args: Vec<Value>) -> Step<Value> {
        let (constructor, methods) = match callee {
            Value::Object(object) => match &object.borrow().kind {
                ObjectKind::Class {
                    constructor, methods, ..
                } => (constructor.clone(), methods.clone()),
                ObjectKind::Closure { .. } => (Some(callee.clone()), Vec::new()),
                _ => return Err(type_error(format!("{} is not a constructor", callee))),
            },
            _ => return Err(type_error(format!("{} is not a constructor", callee))),
        };
        let instance = Value::object(ObjectKind::Ordinary);
        for (name, method) in methods {
            self.set_property(&instance, &name, method)?;
        }
        if let Some(constructor) = constructor {
            let result = self.call_value(&constructor, instance.clone(), args)?;
            if result.is_object() {
                return Ok(result);
            }
        }
        Ok(instance)
    }

    // ========================================================================
    // Generators
    // ========================================================================

    /// Drive the machine of `generator` once
    pub(super) fn resume_generator(&mut self, generator: &Value, action: ResumeAction, value: Value) -> Step<Value> {
        let (machine, env) = match generator {
            Value::Object(object) => match &object.borrow().kind {
                ObjectKind::Generator { machine, env, .. } => (*machine, env.clone()),
                _ => return Err(type_error(format!("{} method called on incompatible receiver", action))),
            },
            _ => return Err(type_error(format!("{} method called on incompatible receiver", action))),
        };
        let args = vec![generator.clone(), Value::Number(f64::from(action.encode())), value];
        self.call_function(machine, Some(env), Value::Undefined, args)
    }

    fn generator_state(&self, frame: &Frame<'m>, generator: &Value) -> InterpResult<u32> {
        if let Value::Object(object) = generator {
            if let ObjectKind::Generator { state, .. } = &object.borrow().kind {
                return Ok(*state);
            }
        }
        Err(frame.malformed("generator state of a non-generator"))
    }

    fn set_generator_state(&self, frame: &Frame<'m>, generator: &Value, new_state: u32) -> InterpResult<()> {
        if let Value::Object(object) = generator {
            if let ObjectKind::Generator { state, .. } = &mut object.borrow_mut().kind {
                *state = new_state;
                return Ok(());
            }
        }
        Err(frame.malformed("generator state of a non-generator"))
    }

    // ========================================================================
    // Properties
    // ========================================================================

    pub(super) fn get_property(&mut self, object: &Value, key: &str) -> Step<Value> {
        match object {
            Value::Undefined | Value::Null | Value::Empty => Err(type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                object, key
            ))),
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                Ok(array_index(key)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::string(c.to_string()))
                    .unwrap_or(Value::Undefined))
            }
            Value::Object(object) => {
                let object = object.borrow();
                let value = match (&object.kind, key) {
                    (ObjectKind::Array(elements), "length") => Some(Value::Number(elements.len() as f64)),
                    (ObjectKind::Array(elements), _) => match array_index(key) {
                        Some(i) => Some(elements.get(i).cloned().unwrap_or(Value::Undefined)),
                        None => None,
                    },
                    (ObjectKind::Generator { .. }, "next") => Some(native(Native::GeneratorMethod(ResumeAction::Next))),
                    (ObjectKind::Generator { .. }, "throw") => {
                        Some(native(Native::GeneratorMethod(ResumeAction::Throw)))
                    }
                    (ObjectKind::Generator { .. }, "return") => {
                        Some(native(Native::GeneratorMethod(ResumeAction::Return)))
                    }
                    (ObjectKind::ListIterator { .. }, "next") => Some(native(Native::ListIteratorNext)),
                    _ => None,
                };
                Ok(value
                    .or_else(|| object.get(key).cloned())
                    .unwrap_or(Value::Undefined))
            }
            _ => Ok(Value::Undefined),
        }
    }

    pub(super) fn set_property(&mut self, object: &Value, key: &str, value: Value) -> Step<()> {
        match object {
            Value::Undefined | Value::Null | Value::Empty => Err(type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                object, key
            ))),
            Value::Object(object) => {
                let mut object = object.borrow_mut();
                if let ObjectKind::Array(elements) = &mut object.kind {
                    if let Some(i) = array_index(key) {
                        if i >= elements.len() {
                            elements.resize(i + 1, Value::Undefined);
                        }
                        elements[i] = value;
                        return Ok(());
                    }
                    if key == "length" {
                        let len = value.to_number();
                        if len >= 0.0 && len.is_finite() {
                            elements.resize(len as usize, Value::Undefined);
                        }
                        return Ok(());
                    }
                }
                object.set(key, value);
                Ok(())
            }
            // Writes to primitives are dropped
            _ => Ok(()),
        }
    }

    fn copy_data_properties(&mut self, target: &Value, source: &Value, excluded: &[String]) -> Step<()> {
        for (key, value) in own_entries(source) {
            if !excluded.contains(&key) {
                self.set_property(target, &key, value)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    fn get_iterator(&mut self, iterable: &Value) -> Step<Value> {
        let iterator = match iterable {
            Value::String(_) => Some(Value::object(ObjectKind::ListIterator {
                source: iterable.clone(),
                index: 0,
            })),
            Value::Object(object) => {
                let is_array = matches!(object.borrow().kind, ObjectKind::Array(_));
                let is_generator = matches!(object.borrow().kind, ObjectKind::Generator { .. });
                if is_array {
                    Some(Value::object(ObjectKind::ListIterator {
                        source: iterable.clone(),
                        index: 0,
                    }))
                } else if is_generator || self.get_property(iterable, "next")?.is_callable() {
                    // Iterators are their own iterables
                    Some(iterable.clone())
                } else {
                    None
                }
            }
            _ => None,
        };
        iterator.ok_or_else(|| type_error(format!("{} is not iterable", iterable)))
    }

    fn list_iterator_next(&mut self, this: &Value) -> Step<Value> {
        let object = match this {
            Value::Object(object) => object.clone(),
            _ => return Err(type_error("next method called on incompatible receiver")),
        };
        let mut object = object.borrow_mut();
        let ObjectKind::ListIterator { source, index } = &mut object.kind else {
            return Err(type_error("next method called on incompatible receiver"));
        };
        let item = match source {
            Value::Object(list) => match &list.borrow().kind {
                ObjectKind::Array(elements) => elements.get(*index).cloned(),
                _ => None,
            },
            Value::String(s) => s.chars().nth(*index).map(|c| Value::string(c.to_string())),
            _ => None,
        };
        Ok(match item {
            Some(value) => {
                *index += 1;
                Value::iter_result(value, false)
            }
            None => Value::iter_result(Value::Undefined, true),
        })
    }

    /// Exhaust `iterable` through the iterator protocol
    fn collect_iterable(&mut self, iterable: &Value) -> Step<Vec<Value>> {
        let iterator = self.get_iterator(iterable)?;
        let next = self.get_property(&iterator, "next")?;
        let mut items = Vec::new();
        loop {
            self.tick()?;
            let result = self.call_value(&next, iterator.clone(), Vec::new())?;
            if !result.is_object() {
                return Err(type_error("Iterator result is not an object"));
            }
            if self.get_property(&result, "done")?.to_boolean() {
                return Ok(items);
            }
            items.push(self.get_property(&result, "value")?);
        }
    }

    fn iterator_close(&mut self, iterator: &Value, suppress_errors: bool) -> Step<()> {
        let method = match self.get_property(iterator, "return") {
            Ok(method) => method,
            Err(Unwind::Throw(_)) if suppress_errors => return Ok(()),
            Err(err) => return Err(err),
        };
        if method.is_nullish() {
            return Ok(());
        }
        match self.call_value(&method, iterator.clone(), Vec::new()) {
            Ok(result) if !suppress_errors && !result.is_object() => {
                Err(type_error("Iterator result is not an object"))
            }
            Ok(_) => Ok(()),
            Err(Unwind::Throw(_)) if suppress_errors => Ok(()),
            Err(err) => Err(err),
        }
    }

    // ========================================================================
    // Environments
    // ========================================================================

    fn env_of(frame: &Frame<'m>, value: Value) -> InterpResult<EnvRef> {
        match value {
            Value::Env(env) => Ok(env),
            other => Err(frame.malformed(format!("{} is not an environment record", other))),
        }
    }

    fn walk_env(frame: &Frame<'m>, env: EnvRef, hops: u32) -> InterpResult<EnvRef> {
        let mut current = env;
        for _ in 0..hops {
            let parent = current.borrow().parent.clone();
            current = parent.ok_or_else(|| frame.malformed("environment chain is shorter than the hop count"))?;
        }
        Ok(current)
    }

    // ========================================================================
    // Instructions
    // ========================================================================

    fn exec_instr(&mut self, frame: &mut Frame<'m>, instr: &IrInstr) -> Step<()> {
        match instr {
            IrInstr::Assign { dest, value } => {
                let value = match value {
                    IrValue::Register(reg) => frame.get(*reg)?,
                    IrValue::Constant(c) => constant(c),
                };
                frame.set(*dest, value);
            }
            IrInstr::Phi { .. } => return Err(frame.malformed("phi after a non-phi instruction").into()),
            IrInstr::BinaryOp { dest, op, left, right } => {
                let value = binary(*op, &frame.get(*left)?, &frame.get(*right)?);
                frame.set(*dest, value);
            }
            IrInstr::UnaryOp { dest, op, operand } => {
                let value = unary(*op, &frame.get(*operand)?);
                frame.set(*dest, value);
            }
            IrInstr::LoadStack { dest, slot } => {
                let value = frame
                    .stack
                    .get(slot.0 as usize)
                    .cloned()
                    .ok_or_else(|| frame.malformed(format!("no stack slot {}", slot.0)))?;
                frame.set(*dest, value);
            }
            IrInstr::StoreStack { slot, value } => {
                let value = frame.get(*value)?;
                match frame.stack.get_mut(slot.0 as usize) {
                    Some(cell) => *cell = value,
                    None => return Err(frame.malformed(format!("no stack slot {}", slot.0)).into()),
                }
            }
            IrInstr::LoadGlobal { dest, name } => match self.globals.get(name) {
                Some(value) => frame.set(*dest, value.clone()),
                None => return Err(throw_error(ErrorKind::ReferenceError, format!("{} is not defined", name))),
            },
            IrInstr::StoreGlobal { name, value } => {
                let value = frame.get(*value)?;
                self.globals.insert(name.clone(), value);
            }
            IrInstr::CreateEnvironment { dest, layout, parent } => {
                let layout = frame
                    .func
                    .env_layouts
                    .get(layout.0 as usize)
                    .ok_or_else(|| frame.malformed(format!("no environment layout {}", layout)))?;
                let slots = layout
                    .slots
                    .iter()
                    .map(|slot| match slot.init {
                        InitState::Uninitialized => Value::Empty,
                        InitState::Initialized => Value::Undefined,
                    })
                    .collect();
                let parent = match parent {
                    Some(reg) => Some(Self::env_of(frame, frame.get(*reg)?)?),
                    None => None,
                };
                let record = EnvRecord { slots, parent };
                frame.set(*dest, Value::Env(Rc::new(RefCell::new(record))));
            }
            IrInstr::CopyEnvironment { dest, env } => {
                let env = Self::env_of(frame, frame.get(*env)?)?;
                let copy = env.borrow().clone();
                frame.set(*dest, Value::Env(Rc::new(RefCell::new(copy))));
            }
            IrInstr::LoadEnvSlot { dest, env, hops, slot } => {
                let env = Self::walk_env(frame, Self::env_of(frame, frame.get(*env)?)?, *hops)?;
                let value = env.borrow().slots.get(*slot as usize).cloned();
                let value = value.ok_or_else(|| frame.malformed(format!("no environment slot {}", slot)))?;
                frame.set(*dest, value);
            }
            IrInstr::StoreEnvSlot { env, hops, slot, value } => {
                let env = Self::walk_env(frame, Self::env_of(frame, frame.get(*env)?)?, *hops)?;
                let value = frame.get(*value)?;
                let mut record = env.borrow_mut();
                match record.slots.get_mut(*slot as usize) {
                    Some(cell) => *cell = value,
                    None => return Err(frame.malformed(format!("no environment slot {}", slot)).into()),
                }
            }
            IrInstr::LoadClosureEnv { dest } => {
                let env = frame
                    .closure_env
                    .clone()
                    .ok_or_else(|| frame.malformed("function has no captured environment"))?;
                frame.set(*dest, Value::Env(env));
            }
            IrInstr::LoadParentEnv { dest, env } => {
                let env = Self::walk_env(frame, Self::env_of(frame, frame.get(*env)?)?, 1)?;
                frame.set(*dest, Value::Env(env));
            }
            IrInstr::GetEnvironment { dest, env, hops } => {
                let env = Self::walk_env(frame, Self::env_of(frame, frame.get(*env)?)?, *hops)?;
                frame.set(*dest, Value::Env(env));
            }
            IrInstr::CreateClosure { dest, func, env } => {
                let env = match env {
                    Some(reg) => Some(Self::env_of(frame, frame.get(*reg)?)?),
                    None => None,
                };
                frame.set(*dest, Value::object(ObjectKind::Closure { func: *func, env }));
            }
            IrInstr::Call {
                dest,
                callee,
                receiver,
                args,
            } => {
                let callee = frame.get(*callee)?;
                let this = match receiver {
                    Some(reg) => frame.get(*reg)?,
                    None => Value::Undefined,
                };
                let args = args.iter().map(|a| frame.get(*a)).collect::<InterpResult<Vec<_>>>()?;
                let result = self.call_value(&callee, this, args)?;
                frame.set(*dest, result);
            }
            IrInstr::Construct { dest, callee, args } => {
                let callee = frame.get(*callee)?;
                let args = args.iter().map(|a| frame.get(*a)).collect::<InterpResult<Vec<_>>>()?;
                let result = self.construct(&callee, args)?;
                frame.set(*dest, result);
            }
            IrInstr::CreateClass {
                dest,
                name,
                constructor,
                methods,
            } => {
                let constructor = match constructor {
                    Some(reg) => Some(frame.get(*reg)?),
                    None => None,
                };
                let methods = methods
                    .iter()
                    .map(|(name, reg)| Ok((name.clone(), frame.get(*reg)?)))
                    .collect::<InterpResult<Vec<_>>>()?;
                let class = ObjectKind::Class {
                    name: name.clone(),
                    constructor,
                    methods,
                };
                frame.set(*dest, Value::object(class));
            }
            IrInstr::NewObject { dest } => frame.set(*dest, Value::object(ObjectKind::Ordinary)),
            IrInstr::NewArray { dest, elements } => {
                let elements = elements.iter().map(|e| frame.get(*e)).collect::<InterpResult<Vec<_>>>()?;
                frame.set(*dest, Value::array(elements));
            }
            IrInstr::ArrayPush { array, value } => {
                let array = frame.get(*array)?;
                let value = frame.get(*value)?;
                push_elements(frame, &array, vec![value])?;
            }
            IrInstr::ArraySpread { array, iterable } => {
                let array = frame.get(*array)?;
                let items = self.collect_iterable(&frame.get(*iterable)?)?;
                push_elements(frame, &array, items)?;
            }
            IrInstr::LoadField { dest, object, field } => {
                let value = self.get_property(&frame.get(*object)?, field)?;
                frame.set(*dest, value);
            }
            IrInstr::StoreField { object, field, value } => {
                let object = frame.get(*object)?;
                self.set_property(&object, field, frame.get(*value)?)?;
            }
            IrInstr::LoadElement { dest, object, key } => {
                let key = frame.get(*key)?.to_property_key();
                let value = self.get_property(&frame.get(*object)?, &key)?;
                frame.set(*dest, value);
            }
            IrInstr::StoreElement { object, key, value } => {
                let object = frame.get(*object)?;
                let key = frame.get(*key)?.to_property_key();
                self.set_property(&object, &key, frame.get(*value)?)?;
            }
            IrInstr::CopyDataProperties {
                target,
                source,
                excluded,
            } => {
                let target = frame.get(*target)?;
                let source = frame.get(*source)?;
                let excluded = excluded
                    .iter()
                    .map(|k| Ok(frame.get(*k)?.to_property_key()))
                    .collect::<InterpResult<Vec<_>>>()?;
                self.copy_data_properties(&target, &source, &excluded)?;
            }
            IrInstr::OwnKeys { dest, object } => {
                let keys = own_entries(&frame.get(*object)?)
                    .into_iter()
                    .map(|(key, _)| Value::string(key))
                    .collect();
                frame.set(*dest, Value::array(keys));
            }
            IrInstr::GetIterator { dest, iterable } => {
                let iterator = self.get_iterator(&frame.get(*iterable)?)?;
                frame.set(*dest, iterator);
            }
            IrInstr::IteratorClose {
                iterator,
                suppress_errors,
            } => {
                let iterator = frame.get(*iterator)?;
                self.iterator_close(&iterator, *suppress_errors)?;
            }
            IrInstr::ThrowIfNotObject { value, message } => {
                if !frame.get(*value)?.is_object() {
                    return Err(type_error(message));
                }
            }
            IrInstr::ThrowIfEmpty { dest, value, name } => {
                let value = frame.get(*value)?;
                if let Value::Empty = value {
                    return Err(throw_error(
                        ErrorKind::ReferenceError,
                        format!("Cannot access '{}' before initialization", name),
                    ));
                }
                frame.set(*dest, value);
            }
            IrInstr::Catch { dest } => {
                let exception = frame.exception.take().unwrap_or(Value::Undefined);
                frame.set(*dest, exception);
            }
            IrInstr::CreateGenerator { dest, machine, env } => {
                let env = Self::env_of(frame, frame.get(*env)?)?;
                let generator = ObjectKind::Generator {
                    machine: *machine,
                    env,
                    state: 0,
                };
                frame.set(*dest, Value::object(generator));
            }
            IrInstr::ResumeGenerator {
                dest,
                generator,
                action,
                value,
            } => {
                let generator = frame.get(*generator)?;
                let result = self.resume_generator(&generator, *action, frame.get(*value)?)?;
                frame.set(*dest, result);
            }
            IrInstr::LoadGeneratorState { dest, generator } => {
                let state = self.generator_state(frame, &frame.get(*generator)?)?;
                frame.set(*dest, Value::Number(f64::from(state)));
            }
            IrInstr::SetGeneratorState { generator, state } => {
                self.set_generator_state(frame, &frame.get(*generator)?, *state)?;
            }
            IrInstr::CreateIterResult { dest, value, done } => {
                let result = Value::iter_result(frame.get(*value)?, *done);
                frame.set(*dest, result);
            }
            IrInstr::RunAsync { dest, generator } => {
                let promise = self.start_async(frame.get(*generator)?)?;
                frame.set(*dest, promise);
            }
            IrInstr::DirectEval { .. } => {
                return Err(InterpError::Unsupported("direct eval".to_string()).into());
            }
            IrInstr::LoadExternal { unit, function, .. } => {
                return Err(InterpError::Unsupported(format!("{} of unit '{}'", function, unit)).into());
            }
        }
        Ok(())
    }
}

fn native(native: Native) -> Value {
    Value::object(ObjectKind::Native(native))
}

fn push_elements(frame: &Frame<'_>, array: &Value, items: Vec<Value>) -> InterpResult<()> {
    if let Value::Object(object) = array {
        if let ObjectKind::Array(elements) = &mut object.borrow_mut().kind {
            elements.extend(items);
            return Ok(());
        }
    }
    Err(frame.malformed("array operation on a non-array"))
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    use BinaryOp::*;
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
    match op {
        Add => {
            let stringy = |v: &Value| matches!(v, Value::String(_) | Value::Object(_));
            if stringy(left) || stringy(right) {
                Value::string(format!("{}{}", left, right))
            } else {
                num(|a, b| a + b)
            }
        }
        NumberAdd => num(|a, b| a + b),
        Concat => Value::string(format!("{}{}", left, right)),
        Sub => num(|a, b| a - b),
        Mul => num(|a, b| a * b),
        Div => num(|a, b| a / b),
        Mod => num(|a, b| a % b),
        Exp => num(f64::powf),
        LooseEqual => Value::Boolean(left.loose_equals(right)),
        LooseNotEqual => Value::Boolean(!left.loose_equals(right)),
        StrictEqual => Value::Boolean(left.strict_equals(right)),
        StrictNotEqual => Value::Boolean(!left.strict_equals(right)),
        Less | NumberLess => Value::Boolean(compare(left, right) == Some(Ordering::Less)),
        LessEqual | NumberLessEqual => Value::Boolean(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        Greater | NumberGreater => Value::Boolean(compare(left, right) == Some(Ordering::Greater)),
        GreaterEqual | NumberGreaterEqual => Value::Boolean(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BitAnd => Value::Number(f64::from(left.to_int32() & right.to_int32())),
        BitOr => Value::Number(f64::from(left.to_int32() | right.to_int32())),
        BitXor => Value::Number(f64::from(left.to_int32() ^ right.to_int32())),
        ShiftLeft => Value::Number(f64::from(left.to_int32().wrapping_shl(right.to_uint32() & 31))),
        ShiftRight => Value::Number(f64::from(left.to_int32().wrapping_shr(right.to_uint32() & 31))),
        UnsignedShiftRight => Value::Number(f64::from(left.to_uint32() >> (right.to_uint32() & 31))),
    }
}

fn unary(op: UnaryOp, operand: &Value) -> Value {
    match op {
        UnaryOp::Neg => Value::Number(-operand.to_number()),
        UnaryOp::ToNumber => Value::Number(operand.to_number()),
        UnaryOp::Not => Value::Boolean(!operand.to_boolean()),
        UnaryOp::BitNot => Value::Number(f64::from(!operand.to_int32())),
        UnaryOp::Typeof => Value::string(operand.type_of()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_concatenates_strings() {
        let result = binary(BinaryOp::Add, &Value::string("a"), &Value::Number(1.0));
        assert_eq!(result.to_string(), "a1");
        let result = binary(BinaryOp::Add, &Value::Number(2.0), &Value::Number(1.0));
        assert_eq!(result.to_string(), "3");
    }

    #[test]
    fn test_number_add_coerces() {
        let result = binary(BinaryOp::NumberAdd, &Value::Boolean(true), &Value::Number(1.0));
        assert_eq!(result.to_string(), "2");
    }

    #[test]
    fn test_shifts() {
        let result = binary(BinaryOp::UnsignedShiftRight, &Value::Number(-1.0), &Value::Number(28.0));
        assert_eq!(result.to_string(), "15");
        let result = binary(BinaryOp::ShiftLeft, &Value::Number(1.0), &Value::Number(33.0));
        assert_eq!(result.to_string(), "2");
    }

    #[test]
    fn test_typeof() {
        assert_eq!(unary(UnaryOp::Typeof, &Value::Null).to_string(), "object");
        assert_eq!(unary(UnaryOp::Typeof, &native(Native::Log)).to_string(), "function");
    }

    #[test]
    fn test_array_index_keys() {
        assert_eq!(array_index("3"), Some(3));
        assert_eq!(array_index("03"), None);
        assert_eq!(array_index("x"), None);
    }
}
