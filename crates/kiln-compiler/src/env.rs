//! Environment Planning
//!
//! Decides, before any IR is produced, where every binding of a module lives:
//!
//! - **Register**: an SSA value, renamed by the CFG builder
//! - **Stack**: a function-local slot, for bindings written inside a protected
//!   `try` region but declared outside it (the exceptional edge cannot carry a
//!   phi operand defined after a throwing instruction)
//! - **Env**: a slot of a heap environment record, for bindings a nested function
//!   captures, bindings visible to a direct `eval`, and bindings of a generator or
//!   async function that must survive a suspension
//!
//! A scope *materializes* an environment record when at least one of its bindings
//! is Env, or when it is the frame of a suspendable function. Lowering creates the
//! record on scope entry, so the record chain at run time mirrors the chain of
//! materializing scopes.

use crate::config::{LowerOptions, PerIterationPolicy};
use crate::error::{CompileError, CompileResult};
use crate::ir::{EnvLayout, EnvSlot};
use kiln_syntax::ast::*;
use kiln_syntax::{BindingId, BindingKind, ScopeId, ScopeKind, ScopeTree};
use rustc_hash::{FxHashMap, FxHashSet};

/// Frame slot holding the environment that was current at the last suspension
pub const SAVED_ENV_SLOT: u32 = 0;

/// Where a binding's value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Register,
    Stack,
    Env { scope: ScopeId, slot: u32 },
}

/// Hidden frame slots of a suspendable function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Number of positional arguments copied into the frame
    pub args: u32,
    /// Whether a rest array is copied into the frame
    pub rest: bool,
}

impl FrameInfo {
    pub fn arg_slot(&self, index: u32) -> u32 {
        1 + index
    }

    pub fn rest_slot(&self) -> Option<u32> {
        self.rest.then_some(1 + self.args)
    }

    /// Number of hidden slots preceding the binding slots
    pub fn hidden_len(&self) -> u32 {
        1 + self.args + u32::from(self.rest)
    }
}

/// Storage decisions for one module
#[derive(Debug, Clone)]
pub struct EnvironmentPlan {
    storage: Vec<Storage>,
    layouts: Vec<Option<EnvLayout>>,
    parents: Vec<Option<ScopeId>>,
    fresh: FxHashSet<ScopeId>,
    frames: FxHashMap<ScopeId, FrameInfo>,
}

impl EnvironmentPlan {
    /// Analyze `module` and decide storage for every binding in `tree`
    pub fn build(tree: &ScopeTree, module: &Module, options: &LowerOptions) -> CompileResult<Self> {
        let mut analysis = Analysis::new(tree, module.scope);
        for stmt in &module.body {
            analysis.statement(stmt)?;
        }
        let plan = analysis.finish(options);
        log::debug!(
            "[env] planned {} bindings, {} environment records",
            plan.storage.len(),
            plan.layouts.iter().filter(|l| l.is_some()).count()
        );
        Ok(plan)
    }

    pub fn storage(&self, binding: BindingId) -> Storage {
        self.storage
            .get(binding.0 as usize)
            .copied()
            .unwrap_or(Storage::Register)
    }

    /// Whether `scope` creates an environment record on entry
    pub fn materializes(&self, scope: ScopeId) -> bool {
        self.layout(scope).is_some()
    }

    pub fn layout(&self, scope: ScopeId) -> Option<&EnvLayout> {
        self.layouts.get(scope.0 as usize).and_then(|l| l.as_ref())
    }

    /// Number of records to walk from the environment current in `from` to reach the
    /// record of `to`: the materializing scopes from `from` (inclusive) up to `to`
    /// (exclusive)
    pub fn hops(&self, from: ScopeId, to: ScopeId) -> u32 {
        let mut hops = 0;
        let mut current = Some(from);
        while let Some(scope) = current {
            if scope == to {
                break;
            }
            if self.materializes(scope) {
                hops += 1;
            }
            current = self.parents.get(scope.0 as usize).copied().flatten();
        }
        hops
    }

    /// Whether `scope` or any scope enclosing it creates a record
    pub fn has_enclosing_record(&self, scope: ScopeId) -> bool {
        let mut current = Some(scope);
        while let Some(s) = current {
            if self.materializes(s) {
                return true;
            }
            current = self.parents.get(s.0 as usize).copied().flatten();
        }
        false
    }

    /// Whether a `for` head's record is copied for every iteration
    pub fn fresh_per_iteration(&self, scope: ScopeId) -> bool {
        self.fresh.contains(&scope)
    }

    /// Hidden slots of a suspendable function's frame, keyed by its function scope
    pub fn frame(&self, scope: ScopeId) -> Option<FrameInfo> {
        self.frames.get(&scope).copied()
    }
}

// ============================================================================
// Analysis
// ============================================================================

struct FunctionCtx {
    id: NodeId,
    name: String,
}

/// One pass over the tree collecting the facts storage depends on
struct Analysis<'a> {
    tree: &'a ScopeTree,
    scope: ScopeId,
    function: FunctionCtx,
    /// Protected regions enclosing the current position: (region scope, function)
    regions: Vec<(ScopeId, NodeId)>,
    captured: FxHashSet<BindingId>,
    /// Bindings written inside a protected region they are declared outside of
    written_in_region: FxHashSet<BindingId>,
    /// Params and receivers referenced anywhere
    referenced: FxHashSet<BindingId>,
    /// Scopes whose extent contains a suspension point of their own function
    suspends: FxHashSet<ScopeId>,
    suspendable: FxHashSet<NodeId>,
    frames: FxHashMap<ScopeId, FrameInfo>,
}

impl<'a> Analysis<'a> {
    fn new(tree: &'a ScopeTree, scope: ScopeId) -> Self {
        Self {
            tree,
            scope,
            function: FunctionCtx {
                id: NodeId::MODULE,
                name: "<module>".to_string(),
            },
            regions: Vec::new(),
            captured: FxHashSet::default(),
            written_in_region: FxHashSet::default(),
            referenced: FxHashSet::default(),
            suspends: FxHashSet::default(),
            suspendable: FxHashSet::default(),
            frames: FxHashMap::default(),
        }
    }

    fn finish(self, options: &LowerOptions) -> EnvironmentPlan {
        let tree = self.tree;
        let scope_count = tree.scope_count();

        // Scopes whose bindings a direct eval can name
        let mut eval_visible = FxHashSet::default();
        for scope in tree.scopes().iter().filter(|s| s.has_direct_eval) {
            eval_visible.extend(tree.ancestors(scope.id));
        }

        let mut storage = vec![Storage::Register; tree.bindings().len()];
        let mut env_bindings: Vec<Vec<BindingId>> = vec![Vec::new(); scope_count];
        let mut captured_scopes = FxHashSet::default();

        for binding in tree.bindings() {
            let owner = match tree.scope(binding.scope) {
                Some(s) => s,
                None => continue,
            };
            let captured = binding.captured || self.captured.contains(&binding.id);
            let in_frame = self.suspendable.contains(&owner.function)
                && (self.suspends.contains(&owner.id)
                    || (matches!(binding.kind, BindingKind::Param | BindingKind::This)
                        && self.referenced.contains(&binding.id)));

            if captured || in_frame || eval_visible.contains(&owner.id) {
                env_bindings[owner.id.0 as usize].push(binding.id);
                if captured {
                    captured_scopes.insert(owner.id);
                }
            } else if self.written_in_region.contains(&binding.id) {
                storage[binding.id.0 as usize] = Storage::Stack;
            }
        }

        let mut layouts: Vec<Option<EnvLayout>> = vec![None; scope_count];
        let mut fresh = FxHashSet::default();
        for scope in tree.scopes() {
            let frame = self.frames.get(&scope.id).copied();
            let members = &env_bindings[scope.id.0 as usize];
            if members.is_empty() && frame.is_none() {
                continue;
            }

            let mut layout = EnvLayout::default();
            if let Some(frame) = frame {
                layout.slots.push(EnvSlot::hidden("<saved-env>"));
                for i in 0..frame.args {
                    layout.slots.push(EnvSlot::hidden(format!("%arg{}", i)));
                }
                if frame.rest {
                    layout.slots.push(EnvSlot::hidden("%rest"));
                }
            }
            for binding in members {
                if let Some(b) = tree.binding(*binding) {
                    storage[binding.0 as usize] = Storage::Env {
                        scope: scope.id,
                        slot: layout.slots.len() as u32,
                    };
                    layout.slots.push(EnvSlot {
                        name: b.name.clone(),
                        binding: Some(*binding),
                        init: b.kind.initial_state(),
                    });
                }
            }

            if scope.kind == ScopeKind::ForHead {
                let wanted = match options.per_iteration_environments {
                    PerIterationPolicy::Conservative => true,
                    PerIterationPolicy::CaptureOnly => captured_scopes.contains(&scope.id),
                };
                if wanted {
                    fresh.insert(scope.id);
                }
            }
            layouts[scope.id.0 as usize] = Some(layout);
        }

        EnvironmentPlan {
            storage,
            layouts,
            parents: tree.scopes().iter().map(|s| s.parent).collect(),
            fresh,
            frames: self.frames,
        }
    }

    fn with_scope<T>(
        &mut self,
        scope: ScopeId,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let saved = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }

    fn with_region<T>(
        &mut self,
        region: ScopeId,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        self.regions.push((region, self.function.id));
        let result = f(self);
        self.regions.pop();
        result
    }

    // ========================================================================
    // References
    // ========================================================================

    fn reference(&mut self, ident: &Identifier, write: bool) -> CompileResult<()> {
        let id = match ident.binding() {
            Some(id) => id,
            None => return Ok(()),
        };
        let binding = match self.tree.binding(id) {
            Some(b) => b,
            None => return Ok(()),
        };
        if !self.tree.is_ancestor(binding.scope, self.scope) {
            return Err(CompileError::UnreachableScope {
                function: self.function.name.clone(),
                name: ident.name.clone(),
                scope: binding.scope,
            });
        }

        let owner_function = self.tree.scope(binding.scope).map(|s| s.function);
        if owner_function != Some(self.function.id) {
            self.captured.insert(id);
        }
        if matches!(binding.kind, BindingKind::Param | BindingKind::This) {
            self.referenced.insert(id);
        }
        if write && owner_function == Some(self.function.id) {
            let outside = self
                .regions
                .iter()
                .filter(|(_, function)| *function == self.function.id)
                .any(|(region, _)| !self.tree.is_ancestor(*region, binding.scope));
            if outside {
                self.written_in_region.insert(id);
            }
        }
        Ok(())
    }

    fn suspension(&mut self) {
        let function = self.function.id;
        for scope in self.tree.ancestors(self.scope) {
            let owner = self.tree.scope(scope).map(|s| s.function);
            if owner != Some(function) {
                break;
            }
            self.suspends.insert(scope);
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn statements(&mut self, stmts: &[Statement]) -> CompileResult<()> {
        for stmt in stmts {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn block(&mut self, block: &Block) -> CompileResult<()> {
        self.with_scope(block.scope, |this| this.statements(&block.body))
    }

    fn statement(&mut self, stmt: &Statement) -> CompileResult<()> {
        match stmt {
            Statement::VariableDecl(decl) => self.variable_decl(decl),
            Statement::FunctionDecl(func) => self.function(func),
            Statement::ClassDecl(class) => {
                self.reference(&class.name, true)?;
                self.class(class)
            }
            Statement::TypeAlias(_) | Statement::Empty(_) => Ok(()),
            Statement::Break(_) | Statement::Continue(_) => Ok(()),
            Statement::Expression(s) => self.expression(&s.expression),
            Statement::Return(s) => match &s.value {
                Some(value) => self.expression(value),
                None => Ok(()),
            },
            Statement::If(s) => {
                self.expression(&s.test)?;
                self.statement(&s.consequent)?;
                match &s.alternate {
                    Some(alt) => self.statement(alt),
                    None => Ok(()),
                }
            }
            Statement::While(s) => {
                self.expression(&s.test)?;
                self.statement(&s.body)
            }
            Statement::DoWhile(s) => {
                self.statement(&s.body)?;
                self.expression(&s.test)
            }
            Statement::For(s) => self.with_scope(s.scope, |this| {
                match &s.init {
                    Some(ForInit::VariableDecl(decl)) => this.variable_decl(decl)?,
                    Some(ForInit::Expression(e)) => this.expression(e)?,
                    None => {}
                }
                if let Some(test) = &s.test {
                    this.expression(test)?;
                }
                if let Some(update) = &s.update {
                    this.expression(update)?;
                }
                this.statement(&s.body)
            }),
            Statement::ForOf(ForOfStatement {
                left, right, body, scope, ..
            })
            | Statement::ForIn(ForInStatement {
                left, right, body, scope, ..
            }) => {
                self.expression(right)?;
                self.with_scope(*scope, |this| {
                    match left {
                        ForEachLeft::Declaration { pattern, .. } | ForEachLeft::Pattern(pattern) => {
                            this.pattern(pattern, true)?
                        }
                    }
                    this.statement(body)
                })
            }
            Statement::Throw(s) => self.expression(&s.argument),
            Statement::Try(s) => self.try_statement(s),
            Statement::Switch(s) => {
                self.expression(&s.discriminant)?;
                self.with_scope(s.scope, |this| {
                    for case in &s.cases {
                        if let Some(test) = &case.test {
                            this.expression(test)?;
                        }
                        this.statements(&case.consequent)?;
                    }
                    Ok(())
                })
            }
            Statement::Labeled(s) => self.statement(&s.body),
            Statement::Block(block) => self.block(block),
        }
    }

    fn try_statement(&mut self, s: &TryStatement) -> CompileResult<()> {
        let protected = s.handler.is_some() || s.finalizer.is_some();
        if protected {
            self.with_region(s.block.scope, |this| this.block(&s.block))?;
        } else {
            self.block(&s.block)?;
        }

        if let Some(handler) = &s.handler {
            let visit = |this: &mut Self| {
                this.with_scope(handler.scope, |this| {
                    if let Some(param) = &handler.param {
                        this.pattern(param, true)?;
                    }
                    this.block(&handler.body)
                })
            };
            if s.finalizer.is_some() {
                self.with_region(handler.scope, visit)?;
            } else {
                visit(self)?;
            }
        }

        if let Some(finalizer) = &s.finalizer {
            self.block(finalizer)?;
        }
        Ok(())
    }

    fn variable_decl(&mut self, decl: &VariableDecl) -> CompileResult<()> {
        for declarator in &decl.declarations {
            if let Some(init) = &declarator.init {
                self.expression(init)?;
            }
            self.pattern(&declarator.pattern, true)?;
        }
        Ok(())
    }

    fn pattern(&mut self, pattern: &Pattern, write: bool) -> CompileResult<()> {
        match pattern {
            Pattern::Identifier(bp) => self.reference(&bp.ident, write),
            Pattern::Array(array) => {
                for element in array.elements.iter().flatten() {
                    if let Some(default) = &element.default {
                        self.expression(default)?;
                    }
                    self.pattern(&element.pattern, write)?;
                }
                match &array.rest {
                    Some(rest) => self.pattern(rest, write),
                    None => Ok(()),
                }
            }
            Pattern::Object(object) => {
                for prop in &object.properties {
                    if let PropertyKey::Computed(key) = &prop.key {
                        self.expression(key)?;
                    }
                    if let Some(default) = &prop.default {
                        self.expression(default)?;
                    }
                    self.pattern(&prop.value, write)?;
                }
                match &object.rest {
                    Some(rest) => self.pattern(rest, write),
                    None => Ok(()),
                }
            }
            Pattern::Expression(expr) => self.assignment_target(expr),
        }
    }

    fn assignment_target(&mut self, expr: &Expression) -> CompileResult<()> {
        match &expr.kind {
            ExpressionKind::Identifier(ident) => self.reference(ident, true),
            _ => self.expression(expr),
        }
    }

    // ========================================================================
    // Functions and classes
    // ========================================================================

    fn function(&mut self, func: &Function) -> CompileResult<()> {
        if func.is_suspendable() {
            self.suspendable.insert(func.id);
            let args = func.params.iter().filter(|p| !p.rest).count() as u32;
            let rest = func.params.iter().any(|p| p.rest);
            self.frames.insert(func.scope, FrameInfo { args, rest });
            // The prologue and the body run in separate activations
            self.suspends.insert(func.scope);
        }

        let saved = std::mem::replace(
            &mut self.function,
            FunctionCtx {
                id: func.id,
                name: func.display_name().to_string(),
            },
        );
        let result = self.with_scope(func.scope, |this| {
            for param in &func.params {
                if let Some(default) = &param.default {
                    this.expression(default)?;
                }
                this.pattern(&param.pattern, true)?;
            }
            match &func.body {
                FunctionBody::Block(body) => this.statements(body),
                FunctionBody::Expression(expr) => this.expression(expr),
            }
        });
        self.function = saved;
        result
    }

    fn class(&mut self, class: &Class) -> CompileResult<()> {
        if let Some(ctor) = &class.constructor {
            self.function(ctor)?;
        }
        for method in &class.methods {
            self.function(&method.function)?;
        }
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expression(&mut self, expr: &Expression) -> CompileResult<()> {
        match &expr.kind {
            ExpressionKind::Number(_)
            | ExpressionKind::String(_)
            | ExpressionKind::Boolean(_)
            | ExpressionKind::Null
            | ExpressionKind::Undefined => Ok(()),
            ExpressionKind::Identifier(ident) => self.reference(ident, false),
            ExpressionKind::Array(elements) => {
                for element in elements {
                    match element {
                        ArrayElement::Expression(e) | ArrayElement::Spread(e) => self.expression(e)?,
                        ArrayElement::Hole => {}
                    }
                }
                Ok(())
            }
            ExpressionKind::Object(props) => {
                for prop in props {
                    match prop {
                        ObjectProperty::KeyValue { key, value } => {
                            if let PropertyKey::Computed(k) = key {
                                self.expression(k)?;
                            }
                            self.expression(value)?;
                        }
                        ObjectProperty::Spread(e) => self.expression(e)?,
                    }
                }
                Ok(())
            }
            ExpressionKind::Function(func) => self.function(func),
            ExpressionKind::Unary { argument, .. } => self.expression(argument),
            ExpressionKind::Update { target, .. } => self.assignment_target(target),
            ExpressionKind::Binary { left, right, .. } | ExpressionKind::Logical { left, right, .. } => {
                self.expression(left)?;
                self.expression(right)
            }
            ExpressionKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expression(test)?;
                self.expression(consequent)?;
                self.expression(alternate)
            }
            ExpressionKind::Assignment { target, value, .. } => {
                self.expression(value)?;
                match target {
                    AssignmentTarget::Simple(t) => self.assignment_target(t),
                    AssignmentTarget::Pattern(p) => self.pattern(p, true),
                }
            }
            ExpressionKind::Call { callee, arguments, .. } | ExpressionKind::New { callee, arguments, .. } => {
                self.expression(callee)?;
                for arg in arguments {
                    self.expression(arg)?;
                }
                Ok(())
            }
            ExpressionKind::Member { object, property } => {
                self.expression(object)?;
                match property {
                    PropertyKey::Computed(key) => self.expression(key),
                    PropertyKey::Named(_) => Ok(()),
                }
            }
            ExpressionKind::Yield { argument, .. } => {
                if let Some(arg) = argument {
                    self.expression(arg)?;
                }
                self.suspension();
                Ok(())
            }
            ExpressionKind::Await(arg) => {
                self.expression(arg)?;
                self.suspension();
                Ok(())
            }
            ExpressionKind::Sequence(exprs) => {
                for e in exprs {
                    self.expression(e)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(source: &str) -> (EnvironmentPlan, ScopeTree) {
        plan_with(source, LowerOptions::default())
    }

    fn plan_with(source: &str, options: LowerOptions) -> (EnvironmentPlan, ScopeTree) {
        let (module, tree, _types) = kiln_syntax::parse_and_resolve(source).unwrap();
        let plan = EnvironmentPlan::build(&tree, &module, &options).unwrap();
        (plan, tree)
    }

    fn binding(tree: &ScopeTree, name: &str) -> BindingId {
        tree.bindings().iter().find(|b| b.name == name).unwrap().id
    }

    #[test]
    fn test_uncaptured_let_is_register() {
        let (plan, tree) = plan("function f() { let x = 1; return x; }");
        assert_eq!(plan.storage(binding(&tree, "x")), Storage::Register);
    }

    #[test]
    fn test_captured_binding_gets_env_slot() {
        let (plan, tree) = plan("function f() { let x = 1; return () => x; }");
        let x = binding(&tree, "x");
        match plan.storage(x) {
            Storage::Env { scope, .. } => {
                assert!(plan.materializes(scope));
                assert_eq!(plan.layout(scope).unwrap().slot_of(x), Some(0));
            }
            other => panic!("expected env storage, got {:?}", other),
        }
    }

    #[test]
    fn test_write_inside_try_demotes_to_stack() {
        let (plan, tree) = plan("function f() { let x = 0; try { x = g(); } catch (e) { return x; } return x; }");
        assert_eq!(plan.storage(binding(&tree, "x")), Storage::Stack);
        assert_eq!(plan.storage(binding(&tree, "e")), Storage::Register);
    }

    #[test]
    fn test_direct_eval_promotes_visible_bindings() {
        let (plan, tree) = plan("function f() { let x = 1; { eval('x'); } }");
        assert!(matches!(plan.storage(binding(&tree, "x")), Storage::Env { .. }));
    }

    #[test]
    fn test_generator_binding_live_across_yield() {
        let (plan, tree) = plan("function* g(a) { let x = a; yield x; { let y = 1; log(y); } return x; }");
        let x = binding(&tree, "x");
        let a = binding(&tree, "a");
        assert!(matches!(plan.storage(x), Storage::Env { .. }));
        assert!(matches!(plan.storage(a), Storage::Env { .. }));
        // `y` lives in a block that never suspends
        assert_eq!(plan.storage(binding(&tree, "y")), Storage::Register);

        let frame_scope = match plan.storage(x) {
            Storage::Env { scope, .. } => scope,
            _ => unreachable!(),
        };
        let frame = plan.frame(frame_scope).unwrap();
        assert_eq!(frame, FrameInfo { args: 1, rest: false });
        let layout = plan.layout(frame_scope).unwrap();
        assert_eq!(layout.slots[0].name, "<saved-env>");
        assert_eq!(layout.slots[1].name, "%arg0");
    }

    #[test]
    fn test_hops_skip_scopes_without_records() {
        let source = "function f() { let x = 1; { let y = 2; { return () => x + y; } } }";
        let (plan, tree) = plan(source);
        let x_scope = tree.binding(binding(&tree, "x")).unwrap().scope;
        let y_scope = tree.binding(binding(&tree, "y")).unwrap().scope;
        let inner = tree
            .scopes()
            .iter()
            .find(|s| s.parent == Some(y_scope) && s.kind == ScopeKind::Block)
            .unwrap()
            .id;
        assert_eq!(plan.hops(inner, y_scope), 0);
        assert_eq!(plan.hops(inner, x_scope), 1);
    }

    #[test]
    fn test_per_iteration_policy() {
        let source = "function f() { for (let i = 0; i < 3; i++) { eval(''); } }";
        let (plan, tree) = plan(source);
        let head = tree.binding(binding(&tree, "i")).unwrap().scope;
        assert!(plan.fresh_per_iteration(head));

        let options = LowerOptions::default().with_per_iteration_environments(PerIterationPolicy::CaptureOnly);
        let (plan, tree) = plan_with(source, options);
        let head = tree.binding(binding(&tree, "i")).unwrap().scope;
        assert!(plan.materializes(head));
        assert!(!plan.fresh_per_iteration(head));
    }
}
