//! Name resolution and type annotation.
//!
//! Builds the [`ScopeTree`] for a parsed module, resolves every identifier to its
//! [`Binding`](crate::scope::Binding), sets capture flags, and attaches a static type to
//! every declaration and expression (`any` where nothing better is known). Generic call
//! sites get their concrete type arguments, either written or inferred from the argument
//! types.

use crate::ast::*;
use crate::error::{SyntaxError, SyntaxResult};
use crate::scope::{BindingKind, ScopeId, ScopeKind, ScopeTree};
use crate::span::Span;
use crate::types::{Type, TypeContext, TypeId, TypeSubstitutionMap};
use rustc_hash::FxHashMap;

/// Resolve `module` in place, returning its scope table
pub fn resolve(module: &mut Module, types: &mut TypeContext) -> SyntaxResult<ScopeTree> {
    let mut resolver = Resolver::new(types);
    resolver.resolve_module(module)?;
    Ok(resolver.tree)
}

/// Signature information for a class declaration
#[derive(Debug, Clone, Default)]
struct ClassInfo {
    name: String,
    type_params: Vec<TypeId>,
    constructor_params: Vec<TypeId>,
    methods: FxHashMap<String, TypeId>,
    /// Declaration node of each method
    method_decls: FxHashMap<String, NodeId>,
}

/// Enclosing `break`/`continue` target
#[derive(Debug, Clone)]
enum JumpTarget {
    Loop,
    Switch,
    Label { name: String, is_loop: bool },
}

struct Resolver<'a> {
    tree: ScopeTree,
    types: &'a mut TypeContext,
    scope: ScopeId,
    function: NodeId,
    type_frames: Vec<FxHashMap<String, TypeId>>,
    /// Type parameters of generic functions, by declaration
    generic_functions: FxHashMap<NodeId, Vec<TypeId>>,
    classes: FxHashMap<NodeId, ClassInfo>,
    /// Instance type seen by `this` in the class body being resolved
    this_type: Option<TypeId>,
    jump_targets: Vec<JumpTarget>,
}

impl<'a> Resolver<'a> {
    fn new(types: &'a mut TypeContext) -> Self {
        Self {
            tree: ScopeTree::new(),
            types,
            scope: ScopeId(0),
            function: NodeId::MODULE,
            type_frames: Vec::new(),
            generic_functions: FxHashMap::default(),
            classes: FxHashMap::default(),
            this_type: None,
            jump_targets: Vec::new(),
        }
    }

    fn resolve_module(&mut self, module: &mut Module) -> SyntaxResult<()> {
        let scope = self
            .tree
            .add_scope(ScopeKind::Module, None, NodeId::MODULE, module.span);
        module.scope = scope;
        self.scope = scope;
        self.type_frames.push(FxHashMap::default());

        self.hoist_var_declarations(&module.body, scope);
        self.declare_block_scoped(&module.body, scope)?;
        for stmt in &mut module.body {
            self.resolve_statement(stmt)?;
        }

        self.type_frames.pop();
        Ok(())
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// Add a `var` binding per distinct name declared anywhere in `stmts`, not
    /// descending into nested functions
    fn hoist_var_declarations(&mut self, stmts: &[Statement], scope: ScopeId) {
        let mut names = Vec::new();
        for stmt in stmts {
            collect_var_names(stmt, &mut names);
        }
        for (name, span) in names {
            let exists = self
                .tree
                .scope(scope)
                .map(|s| {
                    s.bindings.iter().any(|b| {
                        self.tree.binding(*b).is_some_and(|b| {
                            b.name == name
                                && matches!(
                                    b.kind,
                                    BindingKind::Var | BindingKind::Param | BindingKind::Function
                                )
                        })
                    })
                })
                .unwrap_or(false);
            if !exists {
                self.tree.add_binding(scope, name, BindingKind::Var, span);
            }
        }
    }

    /// Declare the lexical bindings, function declarations and type aliases that a
    /// statement list introduces directly into `scope`
    fn declare_block_scoped(&mut self, stmts: &[Statement], scope: ScopeId) -> SyntaxResult<()> {
        self.declare_type_aliases(stmts)?;

        for stmt in stmts {
            match stmt {
                Statement::VariableDecl(decl) if decl.kind != VariableKind::Var => {
                    let kind = if decl.kind == VariableKind::Const {
                        BindingKind::Const
                    } else {
                        BindingKind::Let
                    };
                    for declarator in &decl.declarations {
                        self.declare_pattern(&declarator.pattern, kind, scope)?;
                        if kind == BindingKind::Const {
                            self.declare_generic_initializer(declarator, scope)?;
                        }
                    }
                }
                Statement::FunctionDecl(func) => {
                    let ty = self.function_signature(func)?;
                    if let Some(name) = &func.name {
                        let id = self
                            .tree
                            .add_binding(scope, name.name.clone(), BindingKind::Function, name.span);
                        if let Some(binding) = self.tree.binding_mut(id) {
                            binding.function = Some(func.id);
                            binding.ty = Some(ty);
                        }
                    }
                }
                Statement::ClassDecl(class) => {
                    self.register_class(class)?;
                    let id = self.tree.add_binding(
                        scope,
                        class.name.name.clone(),
                        BindingKind::Class,
                        class.name.span,
                    );
                    if let Some(binding) = self.tree.binding_mut(id) {
                        binding.class = Some(class.id);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// `const f = function<T>(...) {...}`: the binding names the generic function, so
    /// call sites through it get type arguments like calls of a declaration do
    fn declare_generic_initializer(&mut self, declarator: &VariableDeclarator, scope: ScopeId) -> SyntaxResult<()> {
        let (ident, func) = match (&declarator.pattern, &declarator.init) {
            (Pattern::Identifier(bp), Some(init)) => match &init.kind {
                ExpressionKind::Function(func) if func.is_generic() => (&bp.ident, func),
                _ => return Ok(()),
            },
            _ => return Ok(()),
        };
        let ty = self.function_signature(func)?;
        let binding = self.tree.lookup(scope, &ident.name);
        if let Some(binding) = binding.and_then(|b| self.tree.binding_mut(b)) {
            binding.function = Some(func.id);
            binding.ty.get_or_insert(ty);
        }
        Ok(())
    }

    fn declare_type_aliases(&mut self, stmts: &[Statement]) -> SyntaxResult<()> {
        let aliases: Vec<&TypeAlias> = stmts
            .iter()
            .filter_map(|s| match s {
                Statement::TypeAlias(alias) => Some(alias),
                _ => None,
            })
            .collect();
        if aliases.is_empty() {
            return Ok(());
        }

        // Placeholders first so aliases may refer to each other
        let mut placeholders = Vec::with_capacity(aliases.len());
        for alias in &aliases {
            let placeholder = self.types.placeholder();
            if let Some(frame) = self.type_frames.last_mut() {
                frame.insert(alias.name.clone(), placeholder);
            }
            placeholders.push(placeholder);
        }
        for (alias, placeholder) in aliases.iter().zip(placeholders) {
            let body = self.annotation_type(&alias.annotation)?;
            let body = self.types.ty(body).clone();
            self.types.replace_type(placeholder, body);
        }
        Ok(())
    }

    /// Add a binding for every identifier in a declaration pattern
    fn declare_pattern(&mut self, pattern: &Pattern, kind: BindingKind, scope: ScopeId) -> SyntaxResult<()> {
        let mut found = Vec::new();
        pattern.for_each_identifier(&mut |ident| found.push((ident.name.clone(), ident.span)));
        let annotation = match pattern {
            Pattern::Identifier(BindingPattern {
                annotation: Some(annotation),
                ..
            }) => Some(self.annotation_type(annotation)?),
            _ => None,
        };
        for (name, span) in found {
            let id = self.tree.add_binding(scope, name, kind, span);
            if let (Some(ty), Some(binding)) = (annotation, self.tree.binding_mut(id)) {
                binding.ty = Some(ty);
            }
        }
        Ok(())
    }

    fn type_params_of(&mut self, owner: NodeId, params: &[TypeParam]) -> Vec<TypeId> {
        params
            .iter()
            .enumerate()
            .map(|(i, p)| self.types.type_variable(p.name.clone(), owner.0, i as u32))
            .collect()
    }

    fn push_type_params(&mut self, params: &[TypeParam], vars: &[TypeId]) {
        let frame = params
            .iter()
            .zip(vars)
            .map(|(p, ty)| (p.name.clone(), *ty))
            .collect();
        self.type_frames.push(frame);
    }

    /// Function type of a declaration, computed before its body is resolved
    fn function_signature(&mut self, func: &Function) -> SyntaxResult<TypeId> {
        let vars = self.type_params_of(func.id, &func.type_params);
        if !vars.is_empty() {
            self.generic_functions.insert(func.id, vars.clone());
        }
        self.push_type_params(&func.type_params, &vars);
        let result = self.signature_types(&func.params, func.return_annotation.as_ref());
        self.type_frames.pop();
        let (params, ret) = result?;
        Ok(self.types.function_type(params, ret))
    }

    fn signature_types(
        &mut self,
        params: &[Param],
        ret: Option<&TypeAnnotation>,
    ) -> SyntaxResult<(Vec<TypeId>, TypeId)> {
        let mut param_types = Vec::with_capacity(params.len());
        for param in params {
            let ty = match &param.pattern {
                Pattern::Identifier(BindingPattern {
                    annotation: Some(annotation),
                    ..
                }) => self.annotation_type(annotation)?,
                _ => TypeId::ANY,
            };
            param_types.push(ty);
        }
        let ret = match ret {
            Some(annotation) => self.annotation_type(annotation)?,
            None => TypeId::ANY,
        };
        Ok((param_types, ret))
    }

    fn register_class(&mut self, class: &Class) -> SyntaxResult<()> {
        let vars = self.type_params_of(class.id, &class.type_params);
        self.push_type_params(&class.type_params, &vars);
        let result = self.class_signatures(class);
        self.type_frames.pop();
        let (constructor_params, methods) = result?;
        let method_decls = class
            .methods
            .iter()
            .map(|m| (m.name.clone(), m.function.id))
            .collect();
        self.classes.insert(
            class.id,
            ClassInfo {
                name: class.name.name.clone(),
                type_params: vars,
                constructor_params,
                methods,
                method_decls,
            },
        );
        Ok(())
    }

    fn class_signatures(&mut self, class: &Class) -> SyntaxResult<(Vec<TypeId>, FxHashMap<String, TypeId>)> {
        let constructor_params = match &class.constructor {
            Some(ctor) => self.signature_types(&ctor.params, None)?.0,
            None => Vec::new(),
        };
        let mut methods = FxHashMap::default();
        for method in &class.methods {
            let ty = self.function_signature(&method.function)?;
            methods.insert(method.name.clone(), ty);
        }
        Ok((constructor_params, methods))
    }

    /// Declaration of method `name` on instances of `object`
    fn method_decl(&self, object: TypeId, name: &str) -> Option<NodeId> {
        match self.types.ty(object) {
            Type::Class { decl, .. } => self.classes.get(&NodeId(*decl))?.method_decls.get(name).copied(),
            _ => None,
        }
    }

    // ========================================================================
    // Types
    // ========================================================================

    fn lookup_type_name(&self, name: &str) -> Option<TypeId> {
        self.type_frames.iter().rev().find_map(|frame| frame.get(name).copied())
    }

    fn annotation_type(&mut self, annotation: &TypeAnnotation) -> SyntaxResult<TypeId> {
        match annotation {
            TypeAnnotation::Named { name, args, span } => {
                if let Some(ty) = self.lookup_type_name(name) {
                    return Ok(ty);
                }
                let ty = match name.as_str() {
                    "any" | "unknown" => TypeId::ANY,
                    "number" => TypeId::NUMBER,
                    "string" => TypeId::STRING,
                    "boolean" => TypeId::BOOLEAN,
                    "null" => TypeId::NULL,
                    "undefined" => TypeId::UNDEFINED,
                    "void" => TypeId::VOID,
                    "never" => TypeId::NEVER,
                    "Array" if args.len() == 1 => {
                        let elem = self.annotation_type(&args[0])?;
                        self.types.array_type(elem)
                    }
                    _ => return self.class_annotation_type(name, args, *span),
                };
                Ok(ty)
            }
            TypeAnnotation::Array(elem) => {
                let elem = self.annotation_type(elem)?;
                Ok(self.types.array_type(elem))
            }
            TypeAnnotation::Function { params, ret } => {
                let mut param_types = Vec::with_capacity(params.len());
                for param in params {
                    param_types.push(self.annotation_type(param)?);
                }
                let ret = self.annotation_type(ret)?;
                Ok(self.types.function_type(param_types, ret))
            }
            TypeAnnotation::Object(props) => {
                let mut prop_types = Vec::with_capacity(props.len());
                for (name, ty) in props {
                    prop_types.push((name.clone(), self.annotation_type(ty)?));
                }
                Ok(self.types.object_type(prop_types))
            }
            TypeAnnotation::Union(members) => {
                let mut member_types = Vec::with_capacity(members.len());
                for member in members {
                    member_types.push(self.annotation_type(member)?);
                }
                Ok(self.types.union_type(member_types))
            }
        }
    }

    fn class_annotation_type(&mut self, name: &str, args: &[TypeAnnotation], span: Span) -> SyntaxResult<TypeId> {
        let decl = self
            .tree
            .lookup(self.scope, name)
            .and_then(|b| self.tree.binding(b))
            .and_then(|b| b.class);
        let decl = match decl {
            Some(decl) => decl,
            None => {
                return Err(SyntaxError::UnknownType {
                    name: name.to_string(),
                    span,
                })
            }
        };
        let mut type_args = Vec::with_capacity(args.len());
        for arg in args {
            type_args.push(self.annotation_type(arg)?);
        }
        Ok(self.types.class_type(name, decl.0, type_args))
    }

    /// Bind each type variable in `params` to the matching part of `args`
    fn infer_type_args(&mut self, vars: &[TypeId], params: &[TypeId], args: &[TypeId]) -> Vec<TypeId> {
        let mut map = TypeSubstitutionMap::default();
        for (param, arg) in params.iter().zip(args) {
            self.unify(*param, *arg, vars, &mut map);
        }
        vars.iter()
            .map(|v| map.get(v).copied().unwrap_or(TypeId::ANY))
            .collect()
    }

    fn unify(&self, param: TypeId, arg: TypeId, vars: &[TypeId], map: &mut TypeSubstitutionMap) {
        if vars.contains(&param) {
            map.entry(param).or_insert(arg);
            return;
        }
        match (self.types.ty(param), self.types.ty(arg)) {
            (Type::Array(p), Type::Array(a)) => self.unify(*p, *a, vars, map),
            (Type::Function(p), Type::Function(a)) if p.params.len() == a.params.len() => {
                for (p, a) in p.params.iter().zip(&a.params) {
                    self.unify(*p, *a, vars, map);
                }
                self.unify(p.ret, a.ret, vars, map);
            }
            _ => {}
        }
    }

    fn substitution(vars: &[TypeId], args: &[TypeId]) -> TypeSubstitutionMap {
        vars.iter().copied().zip(args.iter().copied()).collect()
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn with_scope<T>(
        &mut self,
        kind: ScopeKind,
        span: Span,
        f: impl FnOnce(&mut Self, ScopeId) -> SyntaxResult<T>,
    ) -> SyntaxResult<T> {
        let scope = self.tree.add_scope(kind, Some(self.scope), self.function, span);
        let saved = self.scope;
        self.scope = scope;
        self.type_frames.push(FxHashMap::default());
        let result = f(self, scope);
        self.type_frames.pop();
        self.scope = saved;
        result
    }

    fn resolve_statements(&mut self, stmts: &mut [Statement]) -> SyntaxResult<()> {
        for stmt in stmts {
            self.resolve_statement(stmt)?;
        }
        Ok(())
    }

    fn resolve_block(&mut self, block: &mut Block) -> SyntaxResult<()> {
        self.with_scope(ScopeKind::Block, block.span, |this, scope| {
            block.scope = scope;
            this.declare_block_scoped(&block.body, scope)?;
            this.resolve_statements(&mut block.body)
        })
    }

    fn resolve_statement(&mut self, stmt: &mut Statement) -> SyntaxResult<()> {
        match stmt {
            Statement::VariableDecl(decl) => self.resolve_variable_decl(decl),
            Statement::FunctionDecl(func) => {
                if let Some(name) = &mut func.name {
                    self.resolve_identifier(name);
                }
                self.resolve_function(func)
            }
            Statement::ClassDecl(class) => self.resolve_class(class),
            Statement::TypeAlias(_) | Statement::Empty(_) => Ok(()),
            Statement::Expression(s) => self.resolve_expression(&mut s.expression),
            Statement::Return(s) => match &mut s.value {
                Some(value) => self.resolve_expression(value),
                None => Ok(()),
            },
            Statement::If(s) => {
                self.resolve_expression(&mut s.test)?;
                self.resolve_statement(&mut s.consequent)?;
                match &mut s.alternate {
                    Some(alt) => self.resolve_statement(alt),
                    None => Ok(()),
                }
            }
            Statement::While(s) => {
                self.resolve_expression(&mut s.test)?;
                self.resolve_loop_body(&mut s.body)
            }
            Statement::DoWhile(s) => {
                self.resolve_loop_body(&mut s.body)?;
                self.resolve_expression(&mut s.test)
            }
            Statement::For(s) => self.resolve_for(s),
            Statement::ForOf(s) => {
                s.scope = self.resolve_for_each(&mut s.left, &mut s.right, &mut s.body, s.span)?;
                Ok(())
            }
            Statement::ForIn(s) => {
                s.scope = self.resolve_for_each(&mut s.left, &mut s.right, &mut s.body, s.span)?;
                Ok(())
            }
            Statement::Break(jump) => self.check_jump("break", jump),
            Statement::Continue(jump) => self.check_jump("continue", jump),
            Statement::Throw(s) => self.resolve_expression(&mut s.argument),
            Statement::Try(s) => self.resolve_try(s),
            Statement::Switch(s) => self.resolve_switch(s),
            Statement::Labeled(s) => {
                let is_loop = labels_loop(&s.body);
                self.jump_targets.push(JumpTarget::Label {
                    name: s.label.clone(),
                    is_loop,
                });
                let result = self.resolve_statement(&mut s.body);
                self.jump_targets.pop();
                result
            }
            Statement::Block(block) => self.resolve_block(block),
        }
    }

    fn resolve_loop_body(&mut self, body: &mut Statement) -> SyntaxResult<()> {
        self.jump_targets.push(JumpTarget::Loop);
        let result = self.resolve_statement(body);
        self.jump_targets.pop();
        result
    }

    fn check_jump(&self, keyword: &'static str, jump: &JumpStatement) -> SyntaxResult<()> {
        let is_continue = keyword == "continue";
        let valid = self.jump_targets.iter().rev().any(|target| match (target, &jump.label) {
            (JumpTarget::Loop, None) => true,
            (JumpTarget::Switch, None) => !is_continue,
            (JumpTarget::Label { name, is_loop }, Some(label)) => {
                name == label && (!is_continue || *is_loop)
            }
            _ => false,
        });
        if valid {
            Ok(())
        } else {
            Err(SyntaxError::InvalidJumpTarget {
                keyword,
                span: jump.span,
            })
        }
    }

    fn resolve_variable_decl(&mut self, decl: &mut VariableDecl) -> SyntaxResult<()> {
        for declarator in &mut decl.declarations {
            if let Some(init) = &mut declarator.init {
                self.resolve_expression(init)?;
            }
            self.resolve_pattern(&mut declarator.pattern)?;

            // `const x = <init>` takes the initializer's type when unannotated
            if decl.kind == VariableKind::Const {
                if let (Pattern::Identifier(bp), Some(init)) = (&declarator.pattern, &declarator.init) {
                    if let Some(binding) = bp.ident.binding().and_then(|b| self.tree.binding_mut(b)) {
                        if binding.ty.is_none() {
                            binding.ty = Some(init.ty);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_for(&mut self, s: &mut ForStatement) -> SyntaxResult<()> {
        self.with_scope(ScopeKind::ForHead, s.span, |this, scope| {
            s.scope = scope;
            match &mut s.init {
                Some(ForInit::VariableDecl(decl)) => {
                    if decl.kind != VariableKind::Var {
                        let kind = if decl.kind == VariableKind::Const {
                            BindingKind::Const
                        } else {
                            BindingKind::Let
                        };
                        for declarator in &decl.declarations {
                            this.declare_pattern(&declarator.pattern, kind, scope)?;
                        }
                    }
                    this.resolve_variable_decl(decl)?;
                }
                Some(ForInit::Expression(expr)) => this.resolve_expression(expr)?,
                None => {}
            }
            if let Some(test) = &mut s.test {
                this.resolve_expression(test)?;
            }
            if let Some(update) = &mut s.update {
                this.resolve_expression(update)?;
            }
            this.resolve_loop_body(&mut s.body)
        })
    }

    /// Resolve a `for-of` or `for-in`, returning its per-iteration scope
    fn resolve_for_each(
        &mut self,
        left: &mut ForEachLeft,
        right: &mut Expression,
        body: &mut Statement,
        span: Span,
    ) -> SyntaxResult<ScopeId> {
        // The iterated expression is evaluated outside the per-iteration scope
        self.resolve_expression(right)?;
        self.with_scope(ScopeKind::ForEach, span, |this, scope| {
            match left {
                ForEachLeft::Declaration { kind, pattern } => {
                    match kind {
                        VariableKind::Let => this.declare_pattern(pattern, BindingKind::Let, scope)?,
                        VariableKind::Const => this.declare_pattern(pattern, BindingKind::Const, scope)?,
                        VariableKind::Var => {}
                    }
                    this.resolve_pattern(pattern)?;
                }
                ForEachLeft::Pattern(pattern) => this.resolve_pattern(pattern)?,
            }
            this.resolve_loop_body(body)?;
            Ok(scope)
        })
    }

    fn resolve_try(&mut self, s: &mut TryStatement) -> SyntaxResult<()> {
        self.resolve_block(&mut s.block)?;
        if let Some(handler) = &mut s.handler {
            self.with_scope(ScopeKind::Catch, handler.span, |this, scope| {
                handler.scope = scope;
                if let Some(param) = &mut handler.param {
                    this.declare_pattern(param, BindingKind::Catch, scope)?;
                    this.resolve_pattern(param)?;
                }
                this.resolve_block(&mut handler.body)
            })?;
        }
        if let Some(finalizer) = &mut s.finalizer {
            self.resolve_block(finalizer)?;
        }
        Ok(())
    }

    fn resolve_switch(&mut self, s: &mut SwitchStatement) -> SyntaxResult<()> {
        self.resolve_expression(&mut s.discriminant)?;
        self.with_scope(ScopeKind::Switch, s.span, |this, scope| {
            s.scope = scope;
            for case in &s.cases {
                this.declare_block_scoped(&case.consequent, scope)?;
            }
            this.jump_targets.push(JumpTarget::Switch);
            let mut result = Ok(());
            for case in &mut s.cases {
                if let Some(test) = &mut case.test {
                    result = this.resolve_expression(test);
                }
                if result.is_ok() {
                    result = this.resolve_statements(&mut case.consequent);
                }
                if result.is_err() {
                    break;
                }
            }
            this.jump_targets.pop();
            result
        })
    }

    // ========================================================================
    // Functions and classes
    // ========================================================================

    fn resolve_function(&mut self, func: &mut Function) -> SyntaxResult<()> {
        let vars = self.type_params_of(func.id, &func.type_params);
        for (param, ty) in func.type_params.iter_mut().zip(&vars) {
            param.ty = *ty;
        }
        if !vars.is_empty() {
            self.generic_functions.insert(func.id, vars.clone());
        }

        let saved_scope = self.scope;
        let saved_function = self.function;
        let saved_targets = std::mem::take(&mut self.jump_targets);
        self.push_type_params(&func.type_params, &vars);
        self.function = func.id;
        let scope = self
            .tree
            .add_scope(ScopeKind::Function, Some(saved_scope), func.id, func.span);
        func.scope = scope;
        self.scope = scope;

        let result = self.resolve_function_inner(func, scope);

        self.scope = saved_scope;
        self.function = saved_function;
        self.jump_targets = saved_targets;
        self.type_frames.pop();
        result
    }

    fn resolve_function_inner(&mut self, func: &mut Function, scope: ScopeId) -> SyntaxResult<()> {
        if func.kind != FunctionKind::Arrow {
            let this = self.tree.add_binding(scope, "this", BindingKind::This, func.span);
            if let Some(binding) = self.tree.binding_mut(this) {
                binding.ty = self.this_type;
            }
            func.this_binding = Some(this);
        }

        for param in &func.params {
            self.declare_pattern(&param.pattern, BindingKind::Param, scope)?;
            if param.rest {
                if let Pattern::Identifier(bp) = &param.pattern {
                    if let Some(b) = self.tree.lookup(scope, &bp.ident.name) {
                        let any_array = self.types.array_type(TypeId::ANY);
                        if let Some(binding) = self.tree.binding_mut(b) {
                            binding.ty.get_or_insert(any_array);
                        }
                    }
                }
            }
        }
        func.return_ty = match &func.return_annotation {
            Some(annotation) => self.annotation_type(annotation)?,
            None => TypeId::ANY,
        };

        if let FunctionBody::Block(body) = &func.body {
            self.hoist_var_declarations(body, scope);
            self.declare_block_scoped(body, scope)?;
        }

        for param in &mut func.params {
            if let Some(default) = &mut param.default {
                self.resolve_expression(default)?;
            }
            self.resolve_pattern(&mut param.pattern)?;
        }

        match &mut func.body {
            FunctionBody::Block(body) => self.resolve_statements(body),
            FunctionBody::Expression(expr) => self.resolve_expression(expr),
        }
    }

    fn resolve_class(&mut self, class: &mut Class) -> SyntaxResult<()> {
        self.resolve_identifier(&mut class.name);
        let info = self.classes.get(&class.id).cloned().unwrap_or_default();
        let instance = self
            .types
            .class_type(info.name.clone(), class.id.0, info.type_params.clone());

        let saved_this = self.this_type.replace(instance);
        self.push_type_params(&class.type_params, &info.type_params);
        for (param, ty) in class.type_params.iter_mut().zip(&info.type_params) {
            param.ty = *ty;
        }

        let mut result = Ok(());
        if let Some(ctor) = &mut class.constructor {
            result = self.resolve_function(ctor);
        }
        for method in &mut class.methods {
            if result.is_err() {
                break;
            }
            result = self.resolve_function(&mut method.function);
        }

        self.type_frames.pop();
        self.this_type = saved_this;
        result
    }

    // ========================================================================
    // Patterns and identifiers
    // ========================================================================

    fn resolve_identifier(&mut self, ident: &mut Identifier) -> TypeId {
        match self.tree.lookup(self.scope, &ident.name) {
            Some(id) => {
                ident.resolution = Resolution::Binding(id);
                let (owner, ty) = match self.tree.binding(id) {
                    Some(b) => (b.scope, b.ty),
                    None => return TypeId::ANY,
                };
                let owner_function = self.tree.scope(owner).map(|s| s.function);
                if owner_function != Some(self.function) {
                    self.tree.mark_captured(id);
                }
                ty.unwrap_or(TypeId::ANY)
            }
            None => {
                ident.resolution = Resolution::Global;
                TypeId::ANY
            }
        }
    }

    fn resolve_pattern(&mut self, pattern: &mut Pattern) -> SyntaxResult<()> {
        match pattern {
            Pattern::Identifier(bp) => {
                self.resolve_identifier(&mut bp.ident);
                Ok(())
            }
            Pattern::Array(array) => {
                for element in array.elements.iter_mut().flatten() {
                    if let Some(default) = &mut element.default {
                        self.resolve_expression(default)?;
                    }
                    self.resolve_pattern(&mut element.pattern)?;
                }
                if let Some(rest) = &mut array.rest {
                    self.resolve_pattern(rest)?;
                }
                Ok(())
            }
            Pattern::Object(object) => {
                for prop in &mut object.properties {
                    if let PropertyKey::Computed(key) = &mut prop.key {
                        self.resolve_expression(key)?;
                    }
                    if let Some(default) = &mut prop.default {
                        self.resolve_expression(default)?;
                    }
                    self.resolve_pattern(&mut prop.value)?;
                }
                if let Some(rest) = &mut object.rest {
                    self.resolve_pattern(rest)?;
                }
                Ok(())
            }
            Pattern::Expression(expr) => self.resolve_expression(expr),
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn resolve_expression(&mut self, expr: &mut Expression) -> SyntaxResult<()> {
        let ty = match &mut expr.kind {
            ExpressionKind::Number(_) => TypeId::NUMBER,
            ExpressionKind::String(_) => TypeId::STRING,
            ExpressionKind::Boolean(_) => TypeId::BOOLEAN,
            ExpressionKind::Null => TypeId::NULL,
            ExpressionKind::Undefined => TypeId::UNDEFINED,
            ExpressionKind::Identifier(ident) => {
                let ty = self.resolve_identifier(ident);
                if ident.name == "undefined" && ident.resolution == Resolution::Global {
                    expr.kind = ExpressionKind::Undefined;
                    TypeId::UNDEFINED
                } else {
                    ty
                }
            }
            ExpressionKind::Array(elements) => {
                let mut elem_ty = None;
                let mut uniform = true;
                for element in elements.iter_mut() {
                    match element {
                        ArrayElement::Expression(e) => {
                            self.resolve_expression(e)?;
                            match elem_ty {
                                None => elem_ty = Some(e.ty),
                                Some(t) if t != e.ty => uniform = false,
                                _ => {}
                            }
                        }
                        ArrayElement::Spread(e) => {
                            self.resolve_expression(e)?;
                            uniform = false;
                        }
                        ArrayElement::Hole => uniform = false,
                    }
                }
                let elem = match elem_ty {
                    Some(t) if uniform => t,
                    _ => TypeId::ANY,
                };
                self.types.array_type(elem)
            }
            ExpressionKind::Object(props) => {
                for prop in props.iter_mut() {
                    match prop {
                        ObjectProperty::KeyValue { key, value } => {
                            if let PropertyKey::Computed(k) = key {
                                self.resolve_expression(k)?;
                            }
                            self.resolve_expression(value)?;
                        }
                        ObjectProperty::Spread(e) => self.resolve_expression(e)?,
                    }
                }
                TypeId::ANY
            }
            ExpressionKind::Function(func) => {
                let ty = self.function_signature(func)?;
                self.resolve_function(func)?;
                ty
            }
            ExpressionKind::Unary { op, argument } => {
                self.resolve_expression(argument)?;
                match op {
                    UnaryOperator::Not => TypeId::BOOLEAN,
                    UnaryOperator::Typeof => TypeId::STRING,
                    UnaryOperator::Void => TypeId::UNDEFINED,
                    UnaryOperator::Minus | UnaryOperator::Plus | UnaryOperator::BitNot => TypeId::NUMBER,
                }
            }
            ExpressionKind::Update { target, .. } => {
                self.resolve_expression(target)?;
                TypeId::NUMBER
            }
            ExpressionKind::Binary { op, left, right } => {
                self.resolve_expression(left)?;
                self.resolve_expression(right)?;
                self.binary_type(*op, left.ty, right.ty)
            }
            ExpressionKind::Logical { left, right, .. } => {
                self.resolve_expression(left)?;
                self.resolve_expression(right)?;
                if left.ty == right.ty {
                    left.ty
                } else {
                    TypeId::ANY
                }
            }
            ExpressionKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.resolve_expression(test)?;
                self.resolve_expression(consequent)?;
                self.resolve_expression(alternate)?;
                if consequent.ty == alternate.ty {
                    consequent.ty
                } else {
                    TypeId::ANY
                }
            }
            ExpressionKind::Assignment { op, target, value } => {
                self.resolve_expression(value)?;
                match target {
                    AssignmentTarget::Simple(t) => self.resolve_expression(t)?,
                    AssignmentTarget::Pattern(p) => self.resolve_pattern(p)?,
                }
                match (op, target) {
                    (AssignmentOperator::Compound(bin), AssignmentTarget::Simple(t)) => {
                        self.binary_type(*bin, t.ty, value.ty)
                    }
                    _ => value.ty,
                }
            }
            ExpressionKind::Call {
                callee,
                type_annotations,
                type_args,
                arguments,
            } => {
                self.resolve_expression(callee)?;
                for arg in arguments.iter_mut() {
                    self.resolve_expression(arg)?;
                }
                if let ExpressionKind::Identifier(ident) = &callee.kind {
                    if ident.name == "eval" && ident.resolution == Resolution::Global {
                        if let Some(scope) = self.tree.scope_mut(self.scope) {
                            scope.has_direct_eval = true;
                        }
                    }
                }
                self.call_type(callee, type_annotations, type_args, arguments, expr.span)?
            }
            ExpressionKind::New {
                callee,
                type_annotations,
                type_args,
                arguments,
            } => {
                self.resolve_expression(callee)?;
                for arg in arguments.iter_mut() {
                    self.resolve_expression(arg)?;
                }
                self.new_type(callee, type_annotations, type_args, arguments, expr.span)?
            }
            ExpressionKind::Member { object, property } => {
                self.resolve_expression(object)?;
                if let PropertyKey::Computed(key) = property {
                    self.resolve_expression(key)?;
                }
                self.member_type(object.ty, property)
            }
            ExpressionKind::Yield { argument, .. } => {
                if let Some(arg) = argument {
                    self.resolve_expression(arg)?;
                }
                TypeId::ANY
            }
            ExpressionKind::Await(arg) => {
                self.resolve_expression(arg)?;
                TypeId::ANY
            }
            ExpressionKind::Sequence(exprs) => {
                let mut last = TypeId::UNDEFINED;
                for e in exprs.iter_mut() {
                    self.resolve_expression(e)?;
                    last = e.ty;
                }
                last
            }
        };
        expr.ty = ty;
        Ok(())
    }

    fn binary_type(&self, op: BinaryOperator, left: TypeId, right: TypeId) -> TypeId {
        if op.is_comparison() {
            return TypeId::BOOLEAN;
        }
        match op {
            BinaryOperator::Add => {
                if self.types.is_string(left) || self.types.is_string(right) {
                    TypeId::STRING
                } else if self.types.is_number(left) && self.types.is_number(right) {
                    TypeId::NUMBER
                } else {
                    TypeId::ANY
                }
            }
            _ => TypeId::NUMBER,
        }
    }

    fn member_type(&mut self, object: TypeId, property: &PropertyKey) -> TypeId {
        match (self.types.ty(object).clone(), property) {
            (Type::Array(_), PropertyKey::Named(name)) if name == "length" => TypeId::NUMBER,
            (Type::String, PropertyKey::Named(name)) if name == "length" => TypeId::NUMBER,
            (Type::Array(elem), PropertyKey::Computed(_)) => elem,
            (Type::Object(props), PropertyKey::Named(name)) => props
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, ty)| *ty)
                .unwrap_or(TypeId::ANY),
            (Type::Class { decl, type_args, .. }, PropertyKey::Named(name)) => {
                let info = match self.classes.get(&NodeId(decl)) {
                    Some(info) => info,
                    None => return TypeId::ANY,
                };
                let method = match info.methods.get(name) {
                    Some(m) => *m,
                    None => return TypeId::ANY,
                };
                let map = Self::substitution(&info.type_params, &type_args);
                self.types.substitute(method, &map)
            }
            _ => TypeId::ANY,
        }
    }

    /// Resolve explicit type arguments, or infer them from the arguments
    fn instantiate(
        &mut self,
        vars: &[TypeId],
        params: &[TypeId],
        annotations: &[TypeAnnotation],
        arguments: &[Expression],
        span: Span,
    ) -> SyntaxResult<Vec<TypeId>> {
        if annotations.is_empty() {
            let arg_types: Vec<TypeId> = arguments.iter().map(|a| a.ty).collect();
            return Ok(self.infer_type_args(vars, params, &arg_types));
        }
        if annotations.len() != vars.len() {
            return Err(SyntaxError::InvalidSyntax {
                message: format!("expected {} type arguments, found {}", vars.len(), annotations.len()),
                span,
            });
        }
        let mut args = Vec::with_capacity(annotations.len());
        for annotation in annotations {
            args.push(self.annotation_type(annotation)?);
        }
        Ok(args)
    }

    fn call_type(
        &mut self,
        callee: &Expression,
        annotations: &[TypeAnnotation],
        type_args: &mut Vec<TypeId>,
        arguments: &[Expression],
        span: Span,
    ) -> SyntaxResult<TypeId> {
        let decl = match &callee.kind {
            ExpressionKind::Identifier(ident) => ident
                .binding()
                .and_then(|b| self.tree.binding(b))
                .and_then(|b| b.function),
            ExpressionKind::Member {
                object,
                property: PropertyKey::Named(name),
            } => self.method_decl(object.ty, name),
            _ => None,
        };
        let vars = decl.and_then(|d| self.generic_functions.get(&d).cloned());
        let vars = match vars {
            Some(vars) => vars,
            None => return Ok(self.types.return_type(callee.ty)),
        };

        let params = match self.types.ty(callee.ty) {
            Type::Function(f) => f.params.clone(),
            _ => Vec::new(),
        };
        let args = self.instantiate(&vars, &params, annotations, arguments, span)?;
        let map = Self::substitution(&vars, &args);
        *type_args = args;
        let ret = self.types.return_type(callee.ty);
        Ok(self.types.substitute(ret, &map))
    }

    fn new_type(
        &mut self,
        callee: &Expression,
        annotations: &[TypeAnnotation],
        type_args: &mut Vec<TypeId>,
        arguments: &[Expression],
        span: Span,
    ) -> SyntaxResult<TypeId> {
        let decl = match &callee.kind {
            ExpressionKind::Identifier(ident) => ident
                .binding()
                .and_then(|b| self.tree.binding(b))
                .and_then(|b| b.class),
            _ => None,
        };
        let (decl, info) = match decl.and_then(|d| self.classes.get(&d).cloned().map(|i| (d, i))) {
            Some(found) => found,
            None => return Ok(TypeId::ANY),
        };
        let args = if info.type_params.is_empty() {
            Vec::new()
        } else {
            self.instantiate(&info.type_params, &info.constructor_params, annotations, arguments, span)?
        };
        *type_args = args.clone();
        Ok(self.types.class_type(info.name, decl.0, args))
    }
}

/// Whether a labeled statement (possibly through further labels) labels a loop
fn labels_loop(stmt: &Statement) -> bool {
    match stmt {
        Statement::While(_)
        | Statement::DoWhile(_)
        | Statement::For(_)
        | Statement::ForOf(_)
        | Statement::ForIn(_) => true,
        Statement::Labeled(inner) => labels_loop(&inner.body),
        _ => false,
    }
}

fn collect_var_names(stmt: &Statement, out: &mut Vec<(String, Span)>) {
    let add_decl = |decl: &VariableDecl, out: &mut Vec<(String, Span)>| {
        if decl.kind == VariableKind::Var {
            for declarator in &decl.declarations {
                declarator
                    .pattern
                    .for_each_identifier(&mut |ident| out.push((ident.name.clone(), ident.span)));
            }
        }
    };
    match stmt {
        Statement::VariableDecl(decl) => add_decl(decl, out),
        Statement::If(s) => {
            collect_var_names(&s.consequent, out);
            if let Some(alt) = &s.alternate {
                collect_var_names(alt, out);
            }
        }
        Statement::While(s) => collect_var_names(&s.body, out),
        Statement::DoWhile(s) => collect_var_names(&s.body, out),
        Statement::For(s) => {
            if let Some(ForInit::VariableDecl(decl)) = &s.init {
                add_decl(decl, out);
            }
            collect_var_names(&s.body, out);
        }
        Statement::ForOf(ForOfStatement { left, body, .. })
        | Statement::ForIn(ForInStatement { left, body, .. }) => {
            if let ForEachLeft::Declaration {
                kind: VariableKind::Var,
                pattern,
            } = left
            {
                pattern.for_each_identifier(&mut |ident| out.push((ident.name.clone(), ident.span)));
            }
            collect_var_names(body, out);
        }
        Statement::Try(s) => {
            s.block.body.iter().for_each(|st| collect_var_names(st, out));
            if let Some(handler) = &s.handler {
                handler.body.body.iter().for_each(|st| collect_var_names(st, out));
            }
            if let Some(finalizer) = &s.finalizer {
                finalizer.body.iter().for_each(|st| collect_var_names(st, out));
            }
        }
        Statement::Switch(s) => {
            for case in &s.cases {
                case.consequent.iter().for_each(|st| collect_var_names(st, out));
            }
        }
        Statement::Labeled(s) => collect_var_names(&s.body, out),
        Statement::Block(b) => b.body.iter().for_each(|st| collect_var_names(st, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn resolve_source(source: &str) -> (Module, ScopeTree, TypeContext) {
        let mut module = parse(source).unwrap();
        let mut types = TypeContext::new();
        let tree = resolve(&mut module, &mut types).unwrap();
        (module, tree, types)
    }

    fn binding_named<'a>(tree: &'a ScopeTree, name: &str) -> &'a crate::scope::Binding {
        tree.bindings().iter().find(|b| b.name == name).unwrap()
    }

    #[test]
    fn test_capture_marks_outer_binding() {
        let (_, tree, _) = resolve_source("let x = 1; function f() { return x; } let y = 2;");
        assert!(binding_named(&tree, "x").captured);
        assert!(!binding_named(&tree, "y").captured);
        assert!(tree.scopes()[0].captured);
    }

    #[test]
    fn test_var_hoists_to_function_scope() {
        let (_, tree, _) = resolve_source("function f() { if (true) { var v = 1; } return v; }");
        let v = binding_named(&tree, "v");
        assert_eq!(v.kind, BindingKind::Var);
        assert_eq!(tree.scope(v.scope).unwrap().kind, ScopeKind::Function);
    }

    #[test]
    fn test_for_in_binding_lives_in_iteration_scope() {
        let (module, tree, _) = resolve_source("for (const k in { a: 1 }) { k; } for (var v in {}) {}");
        let k = binding_named(&tree, "k");
        assert_eq!(tree.scope(k.scope).unwrap().kind, ScopeKind::ForEach);
        match &module.body[0] {
            Statement::ForIn(stmt) => assert_eq!(stmt.scope, k.scope),
            other => panic!("unexpected {:?}", other),
        }
        let v = binding_named(&tree, "v");
        assert_eq!(tree.scope(v.scope).unwrap().kind, ScopeKind::Module);
    }

    #[test]
    fn test_this_binding_skips_arrows() {
        let (module, tree, _) = resolve_source("function f() { const g = () => this; }");
        let this = binding_named(&tree, "this");
        assert_eq!(this.kind, BindingKind::This);
        assert!(this.captured);
        match &module.body[0] {
            Statement::FunctionDecl(f) => assert_eq!(f.this_binding, Some(this.id)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_undefined_becomes_literal() {
        let (module, _, _) = resolve_source("let u = undefined;");
        match &module.body[0] {
            Statement::VariableDecl(decl) => {
                let init = decl.declarations[0].init.as_ref().unwrap();
                assert_eq!(init.kind, ExpressionKind::Undefined);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_direct_eval_flags_scope() {
        let (_, tree, _) = resolve_source("function f() { let a = 1; eval(\"a\"); }");
        assert!(tree.scopes().iter().any(|s| s.has_direct_eval));
    }

    #[test]
    fn test_generic_call_type_args() {
        let (module, _, types) = resolve_source("function id<T>(x: T): T { return x; } id<number>(1); id(\"s\");");
        let call_args = |stmt: &Statement| match stmt {
            Statement::Expression(s) => match &s.expression.kind {
                ExpressionKind::Call { type_args, .. } => (type_args.clone(), s.expression.ty),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        };
        let (explicit, ty) = call_args(&module.body[1]);
        assert_eq!(explicit, vec![TypeId::NUMBER]);
        assert!(types.is_number(ty));
        let (inferred, _) = call_args(&module.body[2]);
        assert_eq!(inferred, vec![TypeId::STRING]);
    }

    fn expression_type_args(stmt: &Statement) -> Vec<TypeId> {
        match stmt {
            Statement::Expression(s) => match &s.expression.kind {
                ExpressionKind::Call { type_args, .. } => type_args.clone(),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_generic_method_call_type_args() {
        let (module, _, _) = resolve_source(
            "class C { m<U>(x: U): U { return x; } }
             const c: C = new C();
             c.m<string>(\"s\");
             c.m(2);",
        );
        assert_eq!(expression_type_args(&module.body[2]), vec![TypeId::STRING]);
        assert_eq!(expression_type_args(&module.body[3]), vec![TypeId::NUMBER]);
    }

    #[test]
    fn test_const_bound_generic_function_expression() {
        let (module, tree, _) = resolve_source(
            "const f = function <T>(x: T): T { return x; };
             f<boolean>(true);",
        );
        assert!(binding_named(&tree, "f").function.is_some());
        assert_eq!(expression_type_args(&module.body[1]), vec![TypeId::BOOLEAN]);
    }

    #[test]
    fn test_invalid_jump_targets() {
        let mut module = parse("break;").unwrap();
        let err = resolve(&mut module, &mut TypeContext::new()).unwrap_err();
        assert!(matches!(err, SyntaxError::InvalidJumpTarget { keyword: "break", .. }));

        let mut module = parse("outer: { continue outer; }").unwrap();
        assert!(resolve(&mut module, &mut TypeContext::new()).is_err());

        let mut module = parse("outer: while (true) { while (true) { continue outer; } }").unwrap();
        assert!(resolve(&mut module, &mut TypeContext::new()).is_ok());
    }

    #[test]
    fn test_recursive_alias() {
        let (_, tree, types) = resolve_source("type F = (x: number) => G; type G = () => F; let f: F;");
        let f = binding_named(&tree, "f");
        assert!(types.display(f.ty.unwrap()).contains("number"));
    }
}
