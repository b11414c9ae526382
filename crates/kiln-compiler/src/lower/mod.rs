//! AST to IR Lowering
//!
//! Converts the resolved AST into the IR, one function body at a time. A [`Lowerer`]
//! builds the control-flow graph of one body with SSA construction running alongside
//! (see [`ssa`]) and reads and writes every binding according to the storage the
//! [`EnvironmentPlan`] chose for it.
//!
//! Nested functions are not lowered recursively: creating a closure reserves a
//! [`FunctionId`] and queues a [`Job`] on the [`Session`], which the emitter drains in
//! FIFO order. Generic specializations are queued the same way.

mod control_flow;
mod destructure;
mod expr;
mod index;
mod specialize;
mod ssa;
mod stmt;
mod suspend;
mod tdz;

pub use index::AstIndex;
pub use ssa::{SsaBuilder, SsaVar};

use crate::config::LowerOptions;
use crate::diagnostics::Diagnostic;
use crate::env::{EnvironmentPlan, Storage};
use crate::error::{CompileError, CompileResult};
use crate::ir::{
    BasicBlock, BasicBlockId, EnvLayoutId, ErrorKind, FunctionId, IrConstant, IrFunction, IrFunctionKind, IrInstr,
    IrValue, Register, StackSlot, StackSlotId, Terminator,
};
use crate::monomorphize::{SessionId, Specialization, SpecializationCache, TypeSubstitution};
use control_flow::ControlEntry;
use destructure::BindMode;
use kiln_syntax::ast::visitor::{walk_expression, Visitor};
use kiln_syntax::ast::{
    Block, Class, Expression, ExpressionKind, Function, FunctionBody, FunctionKind, Module, NodeId, Pattern,
    Statement,
};
use kiln_syntax::{BindingId, BindingKind, ScopeId, ScopeTree, TypeContext, TypeId};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use specialize::GenericDecl;
use suspend::MachineState;

// ============================================================================
// Session
// ============================================================================

/// What a queued job lowers
#[derive(Debug, Clone, Copy)]
pub enum JobTarget<'a> {
    /// Top-level code of the module
    Module(&'a Module),
    /// A function body, under the name it is emitted as
    Function { func: &'a Function },
}

/// A function body waiting to be lowered
#[derive(Debug, Clone)]
pub struct Job<'a> {
    pub id: FunctionId,
    pub name: String,
    pub target: JobTarget<'a>,
    pub subst: TypeSubstitution,
    /// Index into the session's owned specializations this body belongs to
    pub owner: Option<usize>,
}

/// State shared by every function lowered for one module
pub struct Session<'a> {
    pub tree: &'a ScopeTree,
    pub types: &'a mut TypeContext,
    pub options: &'a LowerOptions,
    pub plan: &'a EnvironmentPlan,
    pub index: &'a AstIndex<'a>,
    pub cache: &'a mut dyn SpecializationCache,
    pub id: SessionId,
    /// Source fingerprint of the module being lowered
    pub source: u64,
    jobs: VecDeque<Job<'a>>,
    next_function: u32,
    diagnostics: Vec<Diagnostic>,
    /// Specializations this session inserted, with the function ids lowered for them
    owned: Vec<(Arc<Specialization>, Vec<FunctionId>)>,
}

impl<'a> Session<'a> {
    pub fn new(
        tree: &'a ScopeTree,
        types: &'a mut TypeContext,
        options: &'a LowerOptions,
        plan: &'a EnvironmentPlan,
        index: &'a AstIndex<'a>,
        cache: &'a mut dyn SpecializationCache,
        source: u64,
    ) -> Self {
        Self {
            tree,
            types,
            options,
            plan,
            index,
            cache,
            id: SessionId::fresh(),
            source,
            jobs: VecDeque::new(),
            next_function: 0,
            diagnostics: Vec::new(),
            owned: Vec::new(),
        }
    }

    /// Reserve the next function id
    pub fn reserve_function(&mut self) -> FunctionId {
        let id = FunctionId::new(self.next_function);
        self.next_function += 1;
        id
    }

    /// Give back the `count` most recently reserved ids
    fn unreserve(&mut self, count: u32) {
        self.next_function -= count;
    }

    pub fn function_count(&self) -> u32 {
        self.next_function
    }

    pub fn push_job(&mut self, job: Job<'a>) {
        log::trace!("[lower] queued {} as {}", job.name, job.id);
        self.jobs.push_back(job);
    }

    pub fn next_job(&mut self) -> Option<Job<'a>> {
        self.jobs.pop_front()
    }

    /// Record a diagnostic; exact duplicates (from duplicated `finally` bodies) are dropped
    pub fn report(&mut self, diagnostic: Diagnostic) {
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn own(&mut self, spec: Arc<Specialization>) -> usize {
        self.owned.push((spec, Vec::new()));
        self.owned.len() - 1
    }

    fn note_lowered(&mut self, owner: usize, ids: impl Iterator<Item = FunctionId>) {
        if let Some((_, lowered)) = self.owned.get_mut(owner) {
            lowered.extend(ids);
        }
    }

    /// Specializations inserted by this session and the functions lowered for each
    pub fn take_owned(&mut self) -> Vec<(Arc<Specialization>, Vec<FunctionId>)> {
        std::mem::take(&mut self.owned)
    }
}

/// Lower one queued job into its IR function(s)
pub fn lower_job<'a>(session: &mut Session<'a>, job: Job<'a>) -> CompileResult<Vec<IrFunction>> {
    let Job {
        id,
        name,
        target,
        subst,
        owner,
    } = job;

    let functions = match target {
        JobTarget::Module(module) => {
            let mut lowerer = Lowerer::new(session, id, name, IrFunctionKind::ModuleInit, module.scope, subst, owner);
            lowerer.func.source_span = module.span;
            lowerer.lower_module_body(module)?;
            vec![lowerer.finish()?]
        }
        JobTarget::Function { func } if func.is_suspendable() => {
            suspend::lower_suspendable(session, id, name, func, subst, owner)?
        }
        JobTarget::Function { func } => {
            let kind = function_kind(func);
            let mut lowerer = Lowerer::new(session, id, name, kind, func.scope, subst, owner);
            lowerer.source = Some(func);
            lowerer.lower_function(func)?;
            vec![lowerer.finish()?]
        }
    };

    if let Some(owner) = owner {
        session.note_lowered(owner, functions.iter().map(|f| f.id));
    }
    Ok(functions)
}

fn function_kind(func: &Function) -> IrFunctionKind {
    match func.kind {
        FunctionKind::Normal => IrFunctionKind::Normal,
        FunctionKind::Arrow => IrFunctionKind::Arrow,
        FunctionKind::Method => IrFunctionKind::Method,
        FunctionKind::Constructor => IrFunctionKind::ClassConstructor,
    }
}

// ============================================================================
// Lowerer
// ============================================================================

/// A value kept alive across code that may invalidate registers
#[derive(Debug, Clone, Copy)]
pub(crate) enum Held {
    Reg(Register),
    /// Spilled into a frame slot of the running machine
    Frame { slot: u32, ty: TypeId },
}

/// A mutable lowering-internal cell that survives exceptional edges
#[derive(Debug, Clone, Copy)]
pub(crate) enum TempSlot {
    Stack(StackSlotId),
    Frame(u32),
}

/// Compile-time state restored when a scope is left
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScopeGuard {
    scope: ScopeId,
    env_depth: u32,
}

/// Lowers one function body
pub(crate) struct Lowerer<'s, 'a> {
    session: &'s mut Session<'a>,
    func: IrFunction,
    ssa: SsaBuilder,
    current_block: BasicBlockId,
    /// Source function; `None` for module code
    source: Option<&'a Function>,
    subst: TypeSubstitution,
    owner: Option<usize>,
    /// Innermost scope entered at the current point
    scope: ScopeId,
    /// Number of environment records created by this body that are live here
    env_depth: u32,
    /// Whether the body runs inside the environment its closure captured
    has_closure_env: bool,
    layouts: FxHashMap<ScopeId, EnvLayoutId>,
    stack_slots: FxHashMap<BindingId, StackSlotId>,
    control: Vec<ControlEntry<'a>>,
    /// Handler entries of the enclosing protected regions, innermost last
    handlers: Vec<BasicBlockId>,
    /// Labels waiting for the loop or switch they name
    pending_labels: Vec<String>,
    loop_depth: u32,
    machine: Option<MachineState>,
}

impl<'s, 'a> Lowerer<'s, 'a> {
    fn new(
        session: &'s mut Session<'a>,
        id: FunctionId,
        name: String,
        kind: IrFunctionKind,
        scope: ScopeId,
        subst: TypeSubstitution,
        owner: Option<usize>,
    ) -> Self {
        let outer = session.tree.parent(scope);
        let has_closure_env = outer
            .map(|s| session.plan.has_enclosing_record(s))
            .unwrap_or(false);
        Self {
            func: IrFunction::new(id, name, kind),
            ssa: SsaBuilder::new(),
            current_block: BasicBlockId(0),
            source: None,
            subst,
            owner,
            scope: outer.unwrap_or(scope),
            env_depth: 0,
            has_closure_env,
            layouts: FxHashMap::default(),
            stack_slots: FxHashMap::default(),
            control: Vec::new(),
            handlers: Vec::new(),
            pending_labels: Vec::new(),
            loop_depth: 0,
            machine: None,
            session,
        }
    }

    fn function_name(&self) -> String {
        self.func.name.clone()
    }

    /// Declaration node of the body being lowered
    fn function_node(&self) -> NodeId {
        self.source.map(|f| f.id).unwrap_or(NodeId::MODULE)
    }

    fn internal_error(&self, message: impl Into<String>) -> CompileError {
        CompileError::InternalError {
            function: self.function_name(),
            block: self.current_block,
            message: message.into(),
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.session.report(diagnostic);
    }

    /// Static type under the active substitution
    fn ty(&mut self, ty: TypeId) -> TypeId {
        self.subst.apply(self.session.types, ty)
    }

    fn binding_type(&mut self, id: BindingId) -> TypeId {
        let ty = self
            .session
            .tree
            .binding(id)
            .and_then(|b| b.ty)
            .unwrap_or(TypeId::ANY);
        self.ty(ty)
    }

    fn binding_name(&self, id: BindingId) -> String {
        self.session
            .tree
            .binding(id)
            .map(|b| b.name.clone())
            .unwrap_or_default()
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    /// Allocate a new register
    fn alloc_register(&mut self, ty: TypeId) -> Register {
        self.ssa.new_register(ty)
    }

    /// Allocate a block protected by the innermost active handler
    fn alloc_block(&mut self, label: &str) -> CompileResult<BasicBlockId> {
        let id = BasicBlockId::new(self.func.blocks.len() as u32);
        let mut block = BasicBlock::with_label(id, label);
        block.handler = self.handlers.last().copied();
        self.func.add_block(block);
        if let Some(handler) = self.handlers.last().copied() {
            self.ssa.add_edge(&mut self.func, id, handler)?;
        }
        Ok(id)
    }

    /// Add an instruction to the current block
    fn emit(&mut self, instr: IrInstr) {
        if let Some(block) = self.func.get_block_mut(self.current_block) {
            block.add_instr(instr);
        }
    }

    /// Set the terminator for the current block
    fn set_terminator(&mut self, term: Terminator) -> CompileResult<()> {
        if self.current_block_is_terminated() {
            return Err(self.internal_error("block terminated twice"));
        }
        let from = self.current_block;
        for succ in term.successors() {
            self.ssa.add_edge(&mut self.func, from, succ)?;
        }
        if let Some(block) = self.func.get_block_mut(from) {
            block.set_terminator(term);
        }
        Ok(())
    }

    /// Check if the current block is terminated
    fn current_block_is_terminated(&self) -> bool {
        self.func
            .get_block(self.current_block)
            .map(|b| b.is_terminated())
            .unwrap_or(false)
    }

    fn switch_to(&mut self, block: BasicBlockId) {
        self.current_block = block;
    }

    fn seal(&mut self, block: BasicBlockId) {
        self.ssa.seal_block(&mut self.func, block);
    }

    fn jump(&mut self, target: BasicBlockId) -> CompileResult<()> {
        self.set_terminator(Terminator::Jump(target))
    }

    fn branch(&mut self, cond: Register, then_block: BasicBlockId, else_block: BasicBlockId) -> CompileResult<()> {
        self.set_terminator(Terminator::Branch {
            cond,
            then_block,
            else_block,
        })
    }

    /// Jump to `target` unless control already left the current block
    fn jump_if_open(&mut self, target: BasicBlockId) -> CompileResult<()> {
        if self.current_block_is_terminated() {
            Ok(())
        } else {
            self.jump(target)
        }
    }

    /// Continue in a fresh block reached only from the current one, protected by the
    /// handler now on top of the stack
    fn jump_to_fresh_block(&mut self, label: &str) -> CompileResult<()> {
        let next = self.alloc_block(label)?;
        self.jump(next)?;
        self.seal(next);
        self.switch_to(next);
        Ok(())
    }

    /// Continue in a block nothing jumps to, after control left the current one
    fn start_dead_block(&mut self) -> CompileResult<()> {
        let dead = self.alloc_block("dead")?;
        self.seal(dead);
        self.switch_to(dead);
        Ok(())
    }

    /// Terminate with a runtime error and continue in a dead block
    fn throw_error(&mut self, kind: ErrorKind, message: impl Into<String>) -> CompileResult<()> {
        self.set_terminator(Terminator::ThrowError {
            kind,
            message: message.into(),
        })?;
        self.start_dead_block()
    }

    // ========================================================================
    // Values
    // ========================================================================

    fn constant(&mut self, value: IrConstant) -> Register {
        let dest = self.alloc_register(value.type_id());
        self.emit(IrInstr::Assign {
            dest,
            value: IrValue::Constant(value),
        });
        dest
    }

    fn undefined(&mut self) -> Register {
        self.constant(IrConstant::Undefined)
    }

    fn read_var(&mut self, var: SsaVar, ty: TypeId) -> Register {
        self.ssa.read_variable(&mut self.func, var, self.current_block, ty)
    }

    fn write_var(&mut self, var: SsaVar, value: Register) {
        self.ssa.write_variable(var, self.current_block, value);
    }

    fn new_temp(&mut self) -> SsaVar {
        self.ssa.new_temp()
    }

    /// Keep `value` for use after code that may suspend the machine
    fn hold(&mut self, value: Register, across_suspension: bool) -> CompileResult<Held> {
        if !across_suspension || self.machine.is_none() {
            return Ok(Held::Reg(value));
        }
        let slot = self.alloc_spill_slot()?;
        let frame = self.frame_env()?;
        self.emit(IrInstr::StoreEnvSlot {
            env: frame,
            hops: 0,
            slot,
            value,
        });
        Ok(Held::Frame { slot, ty: value.ty })
    }

    fn load_held(&mut self, held: Held) -> CompileResult<Register> {
        match held {
            Held::Reg(reg) => Ok(reg),
            Held::Frame { slot, ty } => {
                let frame = self.frame_env()?;
                let dest = self.alloc_register(ty);
                self.emit(IrInstr::LoadEnvSlot {
                    dest,
                    env: frame,
                    hops: 0,
                    slot,
                });
                Ok(dest)
            }
        }
    }

    fn temp_slot(&mut self, name: &str) -> CompileResult<TempSlot> {
        if self.machine.is_some() {
            return Ok(TempSlot::Frame(self.alloc_spill_slot()?));
        }
        let slot = StackSlotId(self.func.stack_slots.len() as u32);
        self.func.stack_slots.push(StackSlot { name: name.to_string() });
        Ok(TempSlot::Stack(slot))
    }

    fn store_temp(&mut self, slot: TempSlot, value: Register) -> CompileResult<()> {
        match slot {
            TempSlot::Stack(slot) => self.emit(IrInstr::StoreStack { slot, value }),
            TempSlot::Frame(slot) => {
                let frame = self.frame_env()?;
                self.emit(IrInstr::StoreEnvSlot {
                    env: frame,
                    hops: 0,
                    slot,
                    value,
                });
            }
        }
        Ok(())
    }

    fn load_temp(&mut self, slot: TempSlot, ty: TypeId) -> CompileResult<Register> {
        let dest = self.alloc_register(ty);
        match slot {
            TempSlot::Stack(slot) => self.emit(IrInstr::LoadStack { dest, slot }),
            TempSlot::Frame(slot) => {
                let frame = self.frame_env()?;
                self.emit(IrInstr::LoadEnvSlot {
                    dest,
                    env: frame,
                    hops: 0,
                    slot,
                });
            }
        }
        Ok(dest)
    }

    // ========================================================================
    // Environments
    // ========================================================================

    /// The environment record current at this point, if any
    fn current_env(&mut self) -> Option<Register> {
        if self.env_depth > 0 || self.has_closure_env {
            Some(self.read_var(SsaVar::Env(self.env_depth), TypeId::ANY))
        } else {
            None
        }
    }

    fn require_env(&mut self) -> CompileResult<Register> {
        match self.current_env() {
            Some(env) => Ok(env),
            None => Err(self.internal_error("no environment record in scope")),
        }
    }

    fn layout_id(&mut self, scope: ScopeId) -> CompileResult<EnvLayoutId> {
        if let Some(id) = self.layouts.get(&scope) {
            return Ok(*id);
        }
        let layout = match self.session.plan.layout(scope) {
            Some(layout) => layout.clone(),
            None => return Err(self.internal_error(format!("{} has no environment layout", scope))),
        };
        let id = self.func.add_env_layout(layout);
        self.layouts.insert(scope, id);
        Ok(id)
    }

    /// Enter `scope`: create its record if it materializes and reset its lexical
    /// bindings to their entry state
    fn enter_scope(&mut self, scope: ScopeId) -> CompileResult<ScopeGuard> {
        let guard = ScopeGuard {
            scope: self.scope,
            env_depth: self.env_depth,
        };
        let is_frame = self.machine.as_ref().map(|m| m.frame_scope == scope).unwrap_or(false);
        if self.session.plan.materializes(scope) && !is_frame {
            let layout = self.layout_id(scope)?;
            let parent = self.current_env();
            let dest = self.alloc_register(TypeId::ANY);
            self.emit(IrInstr::CreateEnvironment { dest, layout, parent });
            self.env_depth += 1;
            self.write_var(SsaVar::Env(self.env_depth), dest);
        }
        self.scope = scope;
        self.initialize_scope_bindings(scope)?;
        Ok(guard)
    }

    fn exit_scope(&mut self, guard: ScopeGuard) {
        self.scope = guard.scope;
        self.env_depth = guard.env_depth;
    }

    fn initialize_scope_bindings(&mut self, scope: ScopeId) -> CompileResult<()> {
        let bindings = match self.session.tree.scope(scope) {
            Some(s) => s.bindings.clone(),
            None => return Ok(()),
        };
        for id in bindings {
            let initial = match self.session.tree.binding(id).map(|b| b.kind) {
                Some(BindingKind::Let | BindingKind::Const | BindingKind::Class) => IrConstant::Empty,
                Some(BindingKind::Var) => IrConstant::Undefined,
                _ => continue,
            };
            // Record slots start out in the state their layout gives them
            if let Storage::Env { .. } = self.session.plan.storage(id) {
                continue;
            }
            let value = self.constant(initial);
            self.store_binding(id, value)?;
        }
        Ok(())
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    fn stack_slot(&mut self, id: BindingId) -> StackSlotId {
        if let Some(slot) = self.stack_slots.get(&id) {
            return *slot;
        }
        let slot = StackSlotId(self.func.stack_slots.len() as u32);
        let name = self.binding_name(id);
        self.func.stack_slots.push(StackSlot { name });
        self.stack_slots.insert(id, slot);
        slot
    }

    /// Read a binding's storage without any TDZ check
    fn load_binding(&mut self, id: BindingId) -> CompileResult<Register> {
        let ty = self.binding_type(id);
        match self.session.plan.storage(id) {
            Storage::Register => Ok(self.read_var(SsaVar::Binding(id), ty)),
            Storage::Stack => {
                let slot = self.stack_slot(id);
                let dest = self.alloc_register(ty);
                self.emit(IrInstr::LoadStack { dest, slot });
                Ok(dest)
            }
            Storage::Env { scope, slot } => {
                let env = self.require_env()?;
                let hops = self.session.plan.hops(self.scope, scope);
                let dest = self.alloc_register(ty);
                self.emit(IrInstr::LoadEnvSlot { dest, env, hops, slot });
                Ok(dest)
            }
        }
    }

    /// Write a binding's storage without any TDZ or const check
    fn store_binding(&mut self, id: BindingId, value: Register) -> CompileResult<()> {
        match self.session.plan.storage(id) {
            Storage::Register => self.write_var(SsaVar::Binding(id), value),
            Storage::Stack => {
                let slot = self.stack_slot(id);
                self.emit(IrInstr::StoreStack { slot, value });
            }
            Storage::Env { scope, slot } => {
                let env = self.require_env()?;
                let hops = self.session.plan.hops(self.scope, scope);
                self.emit(IrInstr::StoreEnvSlot { env, hops, slot, value });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Queue `func` for lowering and create a closure over the current environment
    fn create_closure(&mut self, func: &'a Function, name: String) -> CompileResult<Register> {
        if func.is_generic() {
            return self.specialized_reference(GenericDecl::Function(func), &[]);
        }
        let id = self.session.reserve_function();
        self.session.push_job(Job {
            id,
            name,
            target: JobTarget::Function { func },
            subst: self.subst.clone(),
            owner: self.owner,
        });
        let env = self.current_env();
        let dest = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::CreateClosure { dest, func: id, env });
        Ok(dest)
    }

    /// Initialize the bindings of the non-generic function declarations of a statement
    /// list, so they are callable before their declaration is reached
    fn hoist_functions(&mut self, stmts: &'a [Statement]) -> CompileResult<()> {
        for stmt in stmts {
            let func = match stmt {
                Statement::FunctionDecl(func) if !func.is_generic() => func,
                _ => continue,
            };
            let binding = match func.name.as_ref().and_then(|n| n.binding()) {
                Some(binding) => binding,
                None => continue,
            };
            let closure = self.create_closure(func, func.display_name().to_string())?;
            self.store_binding(binding, closure)?;
        }
        Ok(())
    }

    /// Create the class object for `class` and return it
    fn lower_class(&mut self, class: &'a Class) -> CompileResult<Register> {
        let name = class.name.name.clone();
        let constructor = match &class.constructor {
            Some(ctor) => Some(self.create_closure(ctor, format!("{}.constructor", name))?),
            None => None,
        };
        let mut methods = Vec::with_capacity(class.methods.len());
        for method in &class.methods {
            let closure = if method.function.is_generic() {
                self.specialized_method(class, method, &[], &[])?
            } else {
                self.create_closure(&method.function, format!("{}.{}", name, method.name))?
            };
            methods.push((method.name.clone(), closure));
        }
        let dest = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::CreateClass {
            dest,
            name,
            constructor,
            methods,
        });
        Ok(dest)
    }

    fn start_entry_block(&mut self) -> CompileResult<()> {
        let entry = self.alloc_block("entry")?;
        self.func.entry_block = entry;
        self.seal(entry);
        self.switch_to(entry);
        Ok(())
    }

    /// Read the captured environment into `Env(0)`
    fn load_closure_env(&mut self) {
        if self.has_closure_env {
            let env = self.alloc_register(TypeId::ANY);
            self.emit(IrInstr::LoadClosureEnv { dest: env });
            self.write_var(SsaVar::Env(0), env);
        }
    }

    fn lower_module_body(&mut self, module: &'a Module) -> CompileResult<()> {
        self.start_entry_block()?;
        let guard = self.enter_scope(module.scope)?;
        self.hoist_functions(&module.body)?;
        self.lower_statements(&module.body)?;
        if !self.current_block_is_terminated() {
            self.set_terminator(Terminator::Return(None))?;
        }
        self.exit_scope(guard);
        Ok(())
    }

    /// Allocate parameter registers for `func`; returns (positional, rest, this)
    fn declare_parameters(&mut self, func: &'a Function) -> (Vec<Register>, Option<Register>, Option<Register>) {
        let mut args = Vec::new();
        let mut rest = None;
        for param in &func.params {
            let ty = match &param.pattern {
                Pattern::Identifier(bp) => match bp.ident.binding() {
                    Some(id) => self.binding_type(id),
                    None => TypeId::ANY,
                },
                _ => TypeId::ANY,
            };
            let reg = self.alloc_register(ty);
            if param.rest {
                rest = Some(reg);
            } else {
                args.push(reg);
            }
        }
        let this = func.this_binding.map(|id| {
            let ty = self.binding_type(id);
            self.alloc_register(ty)
        });
        (args, rest, this)
    }

    fn lower_function(&mut self, func: &'a Function) -> CompileResult<()> {
        self.func.source_span = func.span;
        let (args, rest, this) = self.declare_parameters(func);
        self.func.params = args.clone();
        self.func.rest_param = rest;
        self.func.this_param = this;

        self.start_entry_block()?;
        self.load_closure_env();
        let guard = self.enter_scope(func.scope)?;
        if let (Some(binding), Some(this)) = (func.this_binding, this) {
            self.store_binding(binding, this)?;
        }
        let values: Vec<Register> = args.into_iter().chain(rest).collect();
        self.bind_parameters(func, &values)?;
        self.lower_function_body(func)?;
        self.exit_scope(guard);
        Ok(())
    }

    /// Bind each parameter pattern to its value, applying defaults
    fn bind_parameters(&mut self, func: &'a Function, values: &[Register]) -> CompileResult<()> {
        for (i, param) in func.params.iter().enumerate() {
            let value = match values.get(i) {
                Some(value) => *value,
                None => self.undefined(),
            };
            let value = match &param.default {
                Some(default) => self.apply_default(value, default)?,
                None => value,
            };
            self.bind_pattern(&param.pattern, value, BindMode::Declare)?;
        }
        Ok(())
    }

    fn lower_function_body(&mut self, func: &'a Function) -> CompileResult<()> {
        match &func.body {
            FunctionBody::Block(body) => {
                self.hoist_functions(body)?;
                self.lower_statements(body)?;
                if !self.current_block_is_terminated() {
                    self.lower_return(None)?;
                }
            }
            FunctionBody::Expression(expr) => {
                let value = self.lower_expression(expr)?;
                self.lower_return(Some(value))?;
            }
        }
        Ok(())
    }

    /// Close remaining blocks and complete SSA construction
    fn finish(mut self) -> CompileResult<IrFunction> {
        let entry = self.func.entry_block;
        for block in self.func.blocks.iter_mut() {
            if block.is_terminated() {
                continue;
            }
            if block.predecessors.is_empty() && block.id != entry {
                block.set_terminator(Terminator::Unreachable);
            } else {
                return Err(CompileError::MissingTerminator {
                    function: self.func.name.clone(),
                    block: block.id,
                });
            }
        }
        self.ssa.finish(&mut self.func)?;
        log::trace!(
            "[lower] {}: {} blocks, {} instructions",
            self.func.name,
            self.func.block_count(),
            self.func.instruction_count()
        );
        Ok(self.func)
    }

    /// Whether evaluating any of `exprs` can suspend the running machine
    fn suspends(&self, exprs: &[&Expression]) -> bool {
        self.machine.is_some() && exprs.iter().any(|e| expression_suspends(e))
    }
}

// ============================================================================
// Suspension points
// ============================================================================

#[derive(Default)]
struct SuspensionFinder {
    found: bool,
}

impl<'ast> Visitor<'ast> for SuspensionFinder {
    fn visit_expression(&mut self, expr: &'ast Expression) {
        if self.found {
            return;
        }
        if matches!(expr.kind, ExpressionKind::Yield { .. } | ExpressionKind::Await(_)) {
            self.found = true;
            return;
        }
        walk_expression(self, expr);
    }

    // Nested bodies suspend their own activation
    fn visit_function(&mut self, _func: &'ast Function) {}

    fn visit_class(&mut self, _class: &'ast Class) {}
}

pub(crate) fn expression_suspends(expr: &Expression) -> bool {
    let mut finder = SuspensionFinder::default();
    finder.visit_expression(expr);
    finder.found
}

pub(crate) fn statement_suspends(stmt: &Statement) -> bool {
    let mut finder = SuspensionFinder::default();
    finder.visit_statement(stmt);
    finder.found
}

pub(crate) fn block_suspends(block: &Block) -> bool {
    block.body.iter().any(statement_suspends)
}

pub(crate) fn pattern_suspends(pattern: &Pattern) -> bool {
    let mut finder = SuspensionFinder::default();
    finder.visit_pattern(pattern);
    finder.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_syntax::parse_and_resolve;

    fn first_expression(source: &str) -> Expression {
        let (module, _tree, _types) = parse_and_resolve(source).unwrap();
        match module.body.into_iter().next() {
            Some(Statement::Expression(s)) => s.expression,
            other => panic!("expected an expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_suspension_finder_skips_nested_functions() {
        let (module, _tree, _types) =
            parse_and_resolve("function* g() { const f = function* () { yield 1; }; return f; }").unwrap();
        let body = match &module.body[0] {
            Statement::FunctionDecl(g) => match &g.body {
                FunctionBody::Block(body) => body.clone(),
                _ => unreachable!(),
            },
            _ => unreachable!(),
        };
        assert!(!body.iter().any(statement_suspends));
    }

    #[test]
    fn test_plain_expression_does_not_suspend() {
        assert!(!expression_suspends(&first_expression("log(1 + 2);")));
    }
}
