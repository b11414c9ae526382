//! Generator and async lowering
//!
//! A suspendable function becomes two IR functions. The factory keeps the
//! function's id and calling convention: it allocates the frame record, copies the
//! arguments into it, creates the generator and drives it once so the parameters are
//! bound eagerly. The machine (`name$machine`) is the resumable body. It is called
//! with `(generator, action, value)` and starts with a dispatch on the stored state
//! and the action, generated from [`transition`].
//!
//! Everything the body keeps across a suspension lives in the frame record: the
//! bindings of the function scope, the innermost record live at each suspension
//! point (slot [`SAVED_ENV_SLOT`]) and spill slots appended while lowering.

use super::{Held, Lowerer, Session};
use crate::env::{FrameInfo, Storage, SAVED_ENV_SLOT};
use crate::error::{CompileError, CompileResult};
use crate::generator::{transition, Finish, GeneratorState, ResumeAction, Transition};
use crate::ir::{
    BasicBlockId, EnvLayout, EnvSlot, ErrorKind, FunctionId, IrConstant, IrFunction, IrFunctionKind, IrInstr,
    Register, Terminator,
};
use crate::lower::SsaVar;
use crate::monomorphize::TypeSubstitution;
use kiln_syntax::ast::{BinaryOperator, Expression, Function, FunctionBody};
use kiln_syntax::{ScopeId, TypeId};

/// Per-body state of a machine being lowered
pub(crate) struct MachineState {
    /// Function scope; its bindings live in the frame record
    pub(super) frame_scope: ScopeId,
    pub(super) generator: Register,
    action: Register,
    /// Value the machine was driven with
    value: Register,
    frame: EnvLayout,
    /// Resume blocks of each suspension point, indexed by action
    resume_points: Vec<[BasicBlockId; 3]>,
}

/// Lower a generator or async function into its factory and machine
pub(super) fn lower_suspendable<'a>(
    session: &mut Session<'a>,
    id: FunctionId,
    name: String,
    func: &'a Function,
    subst: TypeSubstitution,
    owner: Option<usize>,
) -> CompileResult<Vec<IrFunction>> {
    if func.is_async && func.is_generator {
        return Err(CompileError::UnsupportedFeature {
            function: name,
            feature: "async generators".to_string(),
        });
    }
    let missing_frame = |name: &str| CompileError::InternalError {
        function: name.to_string(),
        block: BasicBlockId(0),
        message: format!("{} has no frame layout", func.scope),
    };
    let info = session.plan.frame(func.scope).ok_or_else(|| missing_frame(&name))?;
    let layout = session
        .plan
        .layout(func.scope)
        .cloned()
        .ok_or_else(|| missing_frame(&name))?;

    let (factory_kind, machine_kind) = if func.is_async {
        (IrFunctionKind::AsyncFactory, IrFunctionKind::AsyncMachine)
    } else {
        (IrFunctionKind::GeneratorFactory, IrFunctionKind::GeneratorMachine)
    };

    let machine_id = session.reserve_function();
    let machine_name = format!("{}$machine", name);
    let (machine, frame) = {
        let mut lowerer = Lowerer::new(session, machine_id, machine_name, machine_kind, func.scope, subst.clone(), owner);
        lowerer.source = Some(func);
        lowerer.lower_machine(func, info, layout)?;
        let frame = match lowerer.machine.take() {
            Some(state) => state.frame,
            None => return Err(lowerer.internal_error("machine state lost")),
        };
        (lowerer.finish()?, frame)
    };

    let mut lowerer = Lowerer::new(session, id, name, factory_kind, func.scope, subst, owner);
    lowerer.source = Some(func);
    lowerer.lower_factory(func, machine_id, info, frame)?;
    let factory = lowerer.finish()?;

    log::debug!(
        "[generator] {} split into factory and machine ({} suspension blocks)",
        factory.name,
        machine.block_count()
    );
    Ok(vec![factory, machine])
}

impl<'s, 'a> Lowerer<'s, 'a> {
    // ========================================================================
    // Factory
    // ========================================================================

    fn lower_factory(&mut self, func: &'a Function, machine: FunctionId, info: FrameInfo, frame: EnvLayout) -> CompileResult<()> {
        self.func.source_span = func.span;
        let (args, rest, this) = self.declare_parameters(func);
        self.func.params = args.clone();
        self.func.rest_param = rest;
        self.func.this_param = this;

        self.start_entry_block()?;
        self.load_closure_env();
        let layout = self.func.add_env_layout(frame);
        let parent = self.current_env();
        let env = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::CreateEnvironment { dest: env, layout, parent });

        for (i, arg) in args.iter().enumerate().take(info.args as usize) {
            self.emit(IrInstr::StoreEnvSlot {
                env,
                hops: 0,
                slot: info.arg_slot(i as u32),
                value: *arg,
            });
        }
        if let (Some(slot), Some(rest)) = (info.rest_slot(), rest) {
            self.emit(IrInstr::StoreEnvSlot {
                env,
                hops: 0,
                slot,
                value: rest,
            });
        }
        if let (Some(binding), Some(this)) = (func.this_binding, this) {
            if let Storage::Env { slot, .. } = self.session.plan.storage(binding) {
                self.emit(IrInstr::StoreEnvSlot {
                    env,
                    hops: 0,
                    slot,
                    value: this,
                });
            }
        }

        let generator = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::CreateGenerator {
            dest: generator,
            machine,
            env,
        });
        // Runs the prologue: parameter errors surface from the call itself
        let undefined = self.undefined();
        let started = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::ResumeGenerator {
            dest: started,
            generator,
            action: ResumeAction::Next,
            value: undefined,
        });

        if func.is_async {
            let promise = self.alloc_register(TypeId::ANY);
            self.emit(IrInstr::RunAsync {
                dest: promise,
                generator,
            });
            self.set_terminator(Terminator::Return(Some(promise)))
        } else {
            self.set_terminator(Terminator::Return(Some(generator)))
        }
    }

    // ========================================================================
    // Machine
    // ========================================================================

    fn lower_machine(&mut self, func: &'a Function, info: FrameInfo, frame: EnvLayout) -> CompileResult<()> {
        self.func.source_span = func.span;
        let generator = self.alloc_register(TypeId::ANY);
        let action = self.alloc_register(TypeId::NUMBER);
        let value = self.alloc_register(TypeId::ANY);
        self.func.params = vec![generator, action, value];
        self.has_closure_env = true;
        self.machine = Some(MachineState {
            frame_scope: func.scope,
            generator,
            action,
            value,
            frame,
            resume_points: Vec::new(),
        });

        self.start_entry_block()?;
        self.load_closure_env();
        let state = self.alloc_register(TypeId::NUMBER);
        self.emit(IrInstr::LoadGeneratorState { dest: state, generator });
        let entry = self.current_block;

        // Anything escaping the body completes the generator
        let fault = self.alloc_block("machine.fault")?;
        self.handlers.push(fault);
        let prologue = self.alloc_block("machine.prologue")?;
        let body = self.alloc_block("machine.body")?;

        self.switch_to(prologue);
        let guard = self.enter_scope(func.scope)?;
        let mut values = Vec::with_capacity(info.args as usize + 1);
        for i in 0..info.args {
            values.push(self.load_frame_slot(info.arg_slot(i))?);
        }
        if let Some(slot) = info.rest_slot() {
            values.push(self.load_frame_slot(slot)?);
        }
        self.bind_parameters(func, &values)?;
        if let FunctionBody::Block(stmts) = &func.body {
            self.hoist_functions(stmts)?;
        }
        // Suspended at the start; the dispatch already stored the state
        let undefined = self.undefined();
        self.return_iter_result(undefined, false)?;

        self.switch_to(body);
        match &func.body {
            FunctionBody::Block(stmts) => {
                self.lower_statements(stmts)?;
                if !self.current_block_is_terminated() {
                    self.lower_return(None)?;
                }
            }
            FunctionBody::Expression(expr) => {
                let result = self.lower_expression(expr)?;
                self.lower_return(Some(result))?;
            }
        }
        self.exit_scope(guard);
        self.handlers.pop();

        self.seal(fault);
        self.switch_to(fault);
        let exception = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::Catch { dest: exception });
        self.emit(IrInstr::SetGeneratorState {
            generator,
            state: GeneratorState::Completed.encode(),
        });
        self.set_terminator(Terminator::Throw(exception))?;

        self.switch_to(entry);
        self.build_dispatch(state, prologue, body)?;

        self.seal(prologue);
        self.seal(body);
        let points = self.machine.as_ref().map(|m| m.resume_points.clone()).unwrap_or_default();
        for block in points.iter().flatten() {
            self.seal(*block);
        }
        Ok(())
    }

    /// Switch on the stored state, then on the action, into one block per pair
    fn build_dispatch(&mut self, state: Register, prologue: BasicBlockId, body: BasicBlockId) -> CompileResult<()> {
        let (action, points) = match &self.machine {
            Some(machine) => (machine.action, machine.resume_points.len() as u32),
            None => return Err(self.internal_error("dispatch outside a machine")),
        };
        let mut states = vec![
            GeneratorState::Created,
            GeneratorState::SuspendedStart,
            GeneratorState::Executing,
            GeneratorState::Completed,
        ];
        states.extend((0..points).map(GeneratorState::SuspendedYield));

        let mut state_blocks = Vec::with_capacity(states.len());
        for current in &states {
            let block = self.alloc_block(&format!("dispatch.{}", current))?;
            state_blocks.push((*current, block));
        }
        let completed = state_blocks[3].1;
        self.set_terminator(Terminator::Switch {
            value: state,
            cases: state_blocks.iter().map(|(s, b)| (s.encode() as i32, *b)).collect(),
            default: completed,
        })?;

        for (current, block) in state_blocks {
            self.seal(block);
            self.switch_to(block);
            let mut action_blocks = Vec::with_capacity(ResumeAction::ALL.len());
            for driven in ResumeAction::ALL {
                let target = self.alloc_block(&format!("dispatch.{}.{}", current, driven))?;
                action_blocks.push((driven, target));
            }
            self.set_terminator(Terminator::Switch {
                value: action,
                cases: action_blocks.iter().map(|(a, b)| (a.encode(), *b)).collect(),
                default: action_blocks[0].1,
            })?;
            for (driven, target) in action_blocks {
                self.seal(target);
                self.switch_to(target);
                self.emit_transition(current, transition(current, driven), prologue, body)?;
            }
        }
        Ok(())
    }

    fn emit_transition(
        &mut self,
        current: GeneratorState,
        step: Transition,
        prologue: BasicBlockId,
        body: BasicBlockId,
    ) -> CompileResult<()> {
        let (generator, value) = match &self.machine {
            Some(machine) => (machine.generator, machine.value),
            None => return Err(self.internal_error("dispatch outside a machine")),
        };
        let next = step.next_state(current);
        if next != current {
            self.emit(IrInstr::SetGeneratorState {
                generator,
                state: next.encode(),
            });
        }
        match step {
            Transition::RunPrologue => self.jump(prologue),
            Transition::EnterBody => self.jump(body),
            Transition::Resume { point, action } => {
                let target = self
                    .machine
                    .as_ref()
                    .and_then(|m| m.resume_points.get(point as usize))
                    .map(|blocks| blocks[action.encode() as usize]);
                match target {
                    Some(target) => self.jump(target),
                    None => Err(self.internal_error(format!("no resume point {}", point))),
                }
            }
            Transition::Finish(Finish::Done) => {
                let undefined = self.undefined();
                self.return_iter_result(undefined, true)
            }
            Transition::Finish(Finish::Throw) => self.set_terminator(Terminator::Throw(value)),
            Transition::Finish(Finish::Return) => self.return_iter_result(value, true),
            Transition::Fail { kind, message } => self.set_terminator(Terminator::ThrowError {
                kind,
                message: message.to_string(),
            }),
        }
    }

    fn return_iter_result(&mut self, value: Register, done: bool) -> CompileResult<()> {
        let result = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::CreateIterResult {
            dest: result,
            value,
            done,
        });
        self.set_terminator(Terminator::Return(Some(result)))
    }

    // ========================================================================
    // Frame access
    // ========================================================================

    /// Append a hidden slot to the frame record
    pub(super) fn alloc_spill_slot(&mut self) -> CompileResult<u32> {
        if self.machine.is_none() {
            return Err(self.internal_error("spill outside a suspendable body"));
        }
        let mut slot = 0;
        if let Some(machine) = self.machine.as_mut() {
            slot = machine.frame.slots.len() as u32;
            machine.frame.slots.push(EnvSlot::hidden(format!("%spill{}", slot)));
        }
        Ok(slot)
    }

    /// The frame record of the running machine
    pub(super) fn frame_env(&mut self) -> CompileResult<Register> {
        if self.machine.is_none() {
            return Err(self.internal_error("frame access outside a suspendable body"));
        }
        Ok(self.read_var(SsaVar::Env(0), TypeId::ANY))
    }

    fn load_frame_slot(&mut self, slot: u32) -> CompileResult<Register> {
        let frame = self.frame_env()?;
        let dest = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::LoadEnvSlot {
            dest,
            env: frame,
            hops: 0,
            slot,
        });
        Ok(dest)
    }

    // ========================================================================
    // Suspension
    // ========================================================================

    /// Suspend with `{ value, done: false }` and open a resume block per action.
    /// Each resume block starts with the environment chain restored.
    fn suspend_with(&mut self, value: Register) -> CompileResult<[BasicBlockId; 3]> {
        let (generator, point) = match &self.machine {
            Some(machine) => (machine.generator, machine.resume_points.len() as u32),
            None => return Err(self.internal_error("suspension outside a suspendable body")),
        };
        let depth = self.env_depth;
        if depth > 0 {
            let env = self.read_var(SsaVar::Env(depth), TypeId::ANY);
            let frame = self.frame_env()?;
            self.emit(IrInstr::StoreEnvSlot {
                env: frame,
                hops: 0,
                slot: SAVED_ENV_SLOT,
                value: env,
            });
        }
        self.emit(IrInstr::SetGeneratorState {
            generator,
            state: GeneratorState::SuspendedYield(point).encode(),
        });
        self.return_iter_result(value, false)?;

        let blocks = [
            self.alloc_block("resume.next")?,
            self.alloc_block("resume.throw")?,
            self.alloc_block("resume.return")?,
        ];
        for block in blocks {
            self.switch_to(block);
            self.restore_env_chain(depth)?;
        }
        if let Some(machine) = self.machine.as_mut() {
            machine.resume_points.push(blocks);
        }
        Ok(blocks)
    }

    fn restore_env_chain(&mut self, depth: u32) -> CompileResult<()> {
        if depth == 0 {
            return Ok(());
        }
        let frame = self.frame_env()?;
        let mut env = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::LoadEnvSlot {
            dest: env,
            env: frame,
            hops: 0,
            slot: SAVED_ENV_SLOT,
        });
        self.write_var(SsaVar::Env(depth), env);
        for d in (1..depth).rev() {
            let parent = self.alloc_register(TypeId::ANY);
            self.emit(IrInstr::LoadParentEnv { dest: parent, env });
            self.write_var(SsaVar::Env(d), parent);
            env = parent;
        }
        Ok(())
    }

    /// Suspend with `value` and continue with whatever the machine is resumed with
    fn suspend_and_resume(&mut self, value: Register) -> CompileResult<Register> {
        let [next, throw, ret] = self.suspend_with(value)?;
        let resumed = match &self.machine {
            Some(machine) => machine.value,
            None => return Err(self.internal_error("suspension outside a suspendable body")),
        };

        self.switch_to(throw);
        self.set_terminator(Terminator::Throw(resumed))?;

        self.switch_to(ret);
        self.lower_return(Some(resumed))?;

        self.switch_to(next);
        Ok(resumed)
    }

    pub(super) fn lower_yield(&mut self, argument: Option<&'a Expression>, delegate: bool) -> CompileResult<Register> {
        if delegate {
            return match argument {
                Some(iterable) => self.lower_yield_delegate(iterable),
                None => Err(self.internal_error("yield* without an operand")),
            };
        }
        let value = match argument {
            Some(argument) => self.lower_expression(argument)?,
            None => self.undefined(),
        };
        self.suspend_and_resume(value)
    }

    /// `await` suspends with the awaited value; the async driver resumes with its
    /// settlement
    pub(super) fn lower_await(&mut self, argument: &'a Expression) -> CompileResult<Register> {
        let value = self.lower_expression(argument)?;
        self.suspend_and_resume(value)
    }

    /// `yield*`: forward every drive of this machine to the inner iterator until it
    /// reports `done`
    fn lower_yield_delegate(&mut self, iterable: &'a Expression) -> CompileResult<Register> {
        let source = self.lower_expression(iterable)?;
        let iterator = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::GetIterator {
            dest: iterator,
            iterable: source,
        });
        let next = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::LoadField {
            dest: next,
            object: iterator,
            field: "next".to_string(),
        });
        let iterator = self.hold(iterator, true)?;
        let next = self.hold(next, true)?;

        let mode = self.temp_slot("%delegate.mode")?;
        let received = self.temp_slot("%delegate.received")?;
        let initial = self.constant(IrConstant::Number(ResumeAction::Next.encode() as f64));
        self.store_temp(mode, initial)?;
        let undefined = self.undefined();
        self.store_temp(received, undefined)?;

        let result_var = self.new_temp();
        let header = self.alloc_block("delegate.header")?;
        let on_next = self.alloc_block("delegate.next")?;
        let on_throw = self.alloc_block("delegate.throw")?;
        let on_return = self.alloc_block("delegate.return")?;
        let check = self.alloc_block("delegate.check")?;

        self.jump(header)?;
        self.switch_to(header);
        let current = self.load_temp(mode, TypeId::NUMBER)?;
        self.set_terminator(Terminator::Switch {
            value: current,
            cases: vec![
                (ResumeAction::Next.encode(), on_next),
                (ResumeAction::Throw.encode(), on_throw),
                (ResumeAction::Return.encode(), on_return),
            ],
            default: on_next,
        })?;
        self.seal(on_next);
        self.seal(on_throw);
        self.seal(on_return);

        // next(received)
        self.switch_to(on_next);
        let arg = self.load_temp(received, TypeId::ANY)?;
        let target = self.load_held(iterator)?;
        let callee = self.load_held(next)?;
        let result = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::Call {
            dest: result,
            callee,
            receiver: Some(target),
            args: vec![arg],
        });
        self.write_var(result_var, result);
        self.jump(check)?;

        // throw(received), closing the iterator if it cannot take the exception
        self.switch_to(on_throw);
        let (method, missing, call) = self.delegate_method(iterator, "throw")?;
        self.switch_to(missing);
        let target = self.load_held(iterator)?;
        self.emit(IrInstr::IteratorClose {
            iterator: target,
            suppress_errors: false,
        });
        self.set_terminator(Terminator::ThrowError {
            kind: ErrorKind::TypeError,
            message: "The iterator does not provide a 'throw' method".to_string(),
        })?;
        self.switch_to(call);
        let arg = self.load_temp(received, TypeId::ANY)?;
        let target = self.load_held(iterator)?;
        let result = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::Call {
            dest: result,
            callee: method,
            receiver: Some(target),
            args: vec![arg],
        });
        self.write_var(result_var, result);
        self.jump(check)?;

        // return(received)
        self.switch_to(on_return);
        let (method, missing, call) = self.delegate_method(iterator, "return")?;
        self.switch_to(missing);
        let arg = self.load_temp(received, TypeId::ANY)?;
        self.lower_return(Some(arg))?;
        self.switch_to(call);
        let arg = self.load_temp(received, TypeId::ANY)?;
        let target = self.load_held(iterator)?;
        let result = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::Call {
            dest: result,
            callee: method,
            receiver: Some(target),
            args: vec![arg],
        });
        self.emit(IrInstr::ThrowIfNotObject {
            value: result,
            message: "Iterator result is not an object".to_string(),
        });
        let done = self.load_field(result, "done", TypeId::BOOLEAN);
        let returned = self.alloc_block("delegate.returned")?;
        let more = self.alloc_block("delegate.return_more")?;
        self.branch(done, returned, more)?;
        self.seal(returned);
        self.seal(more);
        self.switch_to(returned);
        let value = self.load_field(result, "value", TypeId::ANY);
        self.lower_return(Some(value))?;
        self.switch_to(more);
        self.write_var(result_var, result);
        self.jump(check)?;

        self.seal(check);
        self.switch_to(check);
        let result = self.read_var(result_var, TypeId::ANY);
        self.emit(IrInstr::ThrowIfNotObject {
            value: result,
            message: "Iterator result is not an object".to_string(),
        });
        let done = self.load_field(result, "done", TypeId::BOOLEAN);
        let finished = self.alloc_block("delegate.done")?;
        let again = self.alloc_block("delegate.yield")?;
        self.branch(done, finished, again)?;
        self.seal(finished);
        self.seal(again);

        self.switch_to(again);
        let yielded = self.load_field(result, "value", TypeId::ANY);
        let resume = self.suspend_with(yielded)?;
        let resumed = match &self.machine {
            Some(machine) => machine.value,
            None => return Err(self.internal_error("suspension outside a suspendable body")),
        };
        for (block, action) in resume.into_iter().zip(ResumeAction::ALL) {
            self.switch_to(block);
            let code = self.constant(IrConstant::Number(action.encode() as f64));
            self.store_temp(mode, code)?;
            self.store_temp(received, resumed)?;
            self.jump(header)?;
        }
        self.seal(header);

        self.switch_to(finished);
        Ok(self.load_field(result, "value", TypeId::ANY))
    }

    /// Look up `name` on the delegate iterator; returns the method and the blocks
    /// taken when it is missing and when it is present
    fn delegate_method(&mut self, iterator: Held, name: &str) -> CompileResult<(Register, BasicBlockId, BasicBlockId)> {
        let target = self.load_held(iterator)?;
        let method = self.load_field(target, name, TypeId::ANY);
        let null = self.constant(IrConstant::Null);
        let is_missing = self.emit_binary(BinaryOperator::LooseEqual, method, null);
        let missing = self.alloc_block(&format!("delegate.no_{}", name))?;
        let call = self.alloc_block(&format!("delegate.{}_call", name))?;
        self.branch(is_missing, missing, call)?;
        self.seal(missing);
        self.seal(call);
        Ok((method, missing, call))
    }

    fn load_field(&mut self, object: Register, field: &str, ty: TypeId) -> Register {
        let dest = self.alloc_register(ty);
        self.emit(IrInstr::LoadField {
            dest,
            object,
            field: field.to_string(),
        });
        dest
    }
}
