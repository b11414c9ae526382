//! Generic specialization at reference sites
//!
//! A reference to a generic function, method or class names one specialization: the
//! written or inferred type arguments (missing ones are `any`) are pushed through the
//! active substitution and, together with the arguments of every enclosing generic,
//! keyed in the session's [`SpecializationCache`](crate::monomorphize::SpecializationCache).
//! The first request for a key reserves function ids and queues the bodies; every
//! later request reuses them.
//!
//! A generic method called on a receiver whose static type is its class is bound
//! statically, with the receiver's class arguments as enclosing arguments. The method
//! table of the class object carries the `any` instantiation for dynamic lookups.

use super::{Job, JobTarget, Lowerer};
use crate::error::{CompileError, CompileResult};
use crate::ir::{FunctionId, IrInstr, Register};
use crate::monomorphize::{
    mangle_name, GenericId, GenericKind, KeyDivergence, Specialization, TypeKey, TypeSubstitution,
};
use kiln_syntax::ast::{Class, ClassMethod, Expression, Function, NodeId, PropertyKey, TypeParam};
use kiln_syntax::{BindingId, BindingKind, ScopeId, Type, TypeId};
use std::sync::Arc;

/// A generic declaration a reference can name
#[derive(Debug, Clone, Copy)]
pub(crate) enum GenericDecl<'a> {
    Function(&'a Function),
    /// Generic function expression initializing a `const`, named after the binding
    Bound { func: &'a Function, name: &'a str },
    Method { class: &'a Class, method: &'a ClassMethod },
    Class(&'a Class),
}

impl<'a> GenericDecl<'a> {
    fn node(&self) -> NodeId {
        match self {
            GenericDecl::Function(func) | GenericDecl::Bound { func, .. } => func.id,
            GenericDecl::Method { method, .. } => method.function.id,
            GenericDecl::Class(class) => class.id,
        }
    }

    fn kind(&self) -> GenericKind {
        match self {
            GenericDecl::Class(_) => GenericKind::Class,
            _ => GenericKind::Function,
        }
    }

    fn name(&self) -> &'a str {
        match self {
            GenericDecl::Function(func) => func.display_name(),
            GenericDecl::Bound { name, .. } => name,
            GenericDecl::Method { method, .. } => method.name.as_str(),
            GenericDecl::Class(class) => class.name.name.as_str(),
        }
    }

    fn type_params(&self) -> &'a [TypeParam] {
        match self {
            GenericDecl::Function(func) | GenericDecl::Bound { func, .. } => &func.type_params,
            GenericDecl::Method { method, .. } => &method.function.type_params,
            GenericDecl::Class(class) => &class.type_params,
        }
    }

    /// The single body of a function-like declaration
    fn body(&self) -> Option<&'a Function> {
        match self {
            GenericDecl::Function(func) | GenericDecl::Bound { func, .. } => Some(func),
            GenericDecl::Method { method, .. } => Some(&method.function),
            GenericDecl::Class(_) => None,
        }
    }
}

impl<'s, 'a> Lowerer<'s, 'a> {
    /// The generic declaration `id` names, if it is a generic function or class, or a
    /// `const` holding a generic function expression
    pub(super) fn generic_declaration(&self, id: BindingId) -> Option<GenericDecl<'a>> {
        let tree = self.session.tree;
        let binding = tree.binding(id)?;
        let index = self.session.index;
        match binding.kind {
            BindingKind::Function => {
                let func = index.function(binding.function?)?;
                func.is_generic().then_some(GenericDecl::Function(func))
            }
            BindingKind::Const => {
                let func = index.function(binding.function?)?;
                func.is_generic().then_some(GenericDecl::Bound {
                    func,
                    name: binding.name.as_str(),
                })
            }
            BindingKind::Class => {
                let class = index.class(binding.class?)?;
                class.is_generic().then_some(GenericDecl::Class(class))
            }
            _ => None,
        }
    }

    /// The generic method `object.name` statically names, with the class arguments of
    /// the receiver's type
    pub(super) fn generic_method(
        &mut self,
        object: &Expression,
        property: &PropertyKey,
    ) -> Option<(&'a Class, &'a ClassMethod, Vec<TypeId>)> {
        let PropertyKey::Named(name) = property else {
            return None;
        };
        let receiver = self.ty(object.ty);
        let (decl, class_args) = match self.session.types.ty(receiver) {
            Type::Class { decl, type_args, .. } => (*decl, type_args.clone()),
            _ => return None,
        };
        let class = self.session.index.class(NodeId(decl))?;
        let method = class
            .methods
            .iter()
            .find(|m| &m.name == name && m.function.is_generic())?;
        // The body must be able to reach the environment it was declared in
        let outer = self.session.tree.parent(method.function.scope)?;
        self.session
            .tree
            .is_ancestor(outer, self.scope)
            .then_some((class, method, class_args))
    }

    /// Produce the value of `decl` specialized at `type_args`
    pub(super) fn specialized_reference(&mut self, decl: GenericDecl<'a>, type_args: &[TypeId]) -> CompileResult<Register> {
        let args = self.own_type_args(decl, type_args);
        let enclosing_vars = self.session.index.enclosing_type_vars(decl.node()).to_vec();
        let enclosing_args = self.subst.apply_all(self.session.types, &enclosing_vars);
        let spec = self.specialize(decl, &args, &enclosing_args)?;
        self.reference_specialization(decl, &spec, &args)
    }

    /// Produce method `method` of `class` specialized at `type_args`, for instances whose
    /// class arguments are `class_args`
    pub(super) fn specialized_method(
        &mut self,
        class: &'a Class,
        method: &'a ClassMethod,
        type_args: &[TypeId],
        class_args: &[TypeId],
    ) -> CompileResult<Register> {
        let decl = GenericDecl::Method { class, method };
        let args = self.own_type_args(decl, type_args);
        let outer_vars = self.session.index.enclosing_type_vars(class.id).to_vec();
        let mut enclosing_args = self.subst.apply_all(self.session.types, &outer_vars);
        let class_args = self.subst.apply_all(self.session.types, class_args);
        enclosing_args.extend(
            (0..class.type_params.len()).map(|i| class_args.get(i).copied().unwrap_or(TypeId::ANY)),
        );
        let spec = self.specialize(decl, &args, &enclosing_args)?;
        self.reference_specialization(decl, &spec, &args)
    }

    /// `type_args` under the active substitution, padded with `any` to the declared arity
    fn own_type_args(&mut self, decl: GenericDecl<'a>, type_args: &[TypeId]) -> Vec<TypeId> {
        let padded: Vec<TypeId> = (0..decl.type_params().len())
            .map(|i| type_args.get(i).copied().unwrap_or(TypeId::ANY))
            .collect();
        self.subst.apply_all(self.session.types, &padded)
    }

    /// Find or create the specialization of `decl` at `args` inside `enclosing_args`
    fn specialize(
        &mut self,
        decl: GenericDecl<'a>,
        args: &[TypeId],
        enclosing_args: &[TypeId],
    ) -> CompileResult<Arc<Specialization>> {
        let mut key_args = args.to_vec();
        key_args.extend_from_slice(enclosing_args);
        let key = TypeKey::new(self.session.types, &key_args);
        let generic = GenericId::new(
            self.session.options.module_name.clone(),
            self.session.source,
            decl.node(),
            decl.kind(),
        );
        let fuel = self.session.options.max_type_key_fuel;

        let found = self
            .session
            .cache
            .lookup(&generic, &key, fuel)
            .map_err(|e| self.divergence(decl, e))?;
        if let Some(spec) = found {
            return Ok(spec);
        }

        let mut vars: Vec<TypeId> = decl.type_params().iter().map(|p| p.ty).collect();
        vars.extend_from_slice(self.session.index.enclosing_type_vars(decl.node()));
        let subst = TypeSubstitution::new(&vars, &key_args);
        let name = self.specialization_name(decl, args, enclosing_args);
        self.insert_specialization(decl, generic, key, name, subst)
    }

    /// `name<args>`; a method is qualified by its class, instantiated at the class
    /// arguments when the class is generic
    fn specialization_name(&self, decl: GenericDecl<'a>, args: &[TypeId], enclosing_args: &[TypeId]) -> String {
        let types = &*self.session.types;
        match decl {
            GenericDecl::Method { class, method } => {
                let own = class.type_params.len();
                let class_name = if own == 0 {
                    class.name.name.clone()
                } else {
                    let class_args = &enclosing_args[enclosing_args.len().saturating_sub(own)..];
                    mangle_name(types, &class.name.name, class_args)
                };
                format!("{}.{}", class_name, mangle_name(types, &method.name, args))
            }
            _ => mangle_name(types, decl.name(), args),
        }
    }

    fn insert_specialization(
        &mut self,
        decl: GenericDecl<'a>,
        generic: GenericId,
        key: TypeKey,
        name: String,
        subst: TypeSubstitution,
    ) -> CompileResult<Arc<Specialization>> {
        let unit = self.session.options.unit().to_string();
        let session = self.session.id;
        let candidate = match decl {
            GenericDecl::Class(class) => {
                let constructor = class.constructor.as_ref().map(|_| self.session.reserve_function());
                let methods = class
                    .methods
                    .iter()
                    .filter(|m| !m.function.is_generic())
                    .map(|m| (m.name.clone(), self.session.reserve_function()))
                    .collect();
                Specialization::class(unit, session, name, constructor, methods)
            }
            _ => {
                let id = self.session.reserve_function();
                Specialization::function(unit, session, name, id)
            }
        };
        let reserved = candidate.function_ids().len() as u32;

        let fuel = self.session.options.max_type_key_fuel;
        let (spec, inserted) = self
            .session
            .cache
            .insert(generic, key, candidate, fuel)
            .map_err(|e| self.divergence(decl, e))?;
        if !inserted {
            self.session.unreserve(reserved);
            return Ok(spec);
        }

        log::debug!("[lower] specializing {}", spec.name);
        let owner = self.session.own(spec.clone());
        match decl {
            GenericDecl::Class(class) => {
                if let (Some(ctor), Some(id)) = (&class.constructor, spec.function) {
                    self.queue_member(ctor, id, format!("{}.constructor", spec.name), &subst, owner);
                }
                let plain = class.methods.iter().filter(|m| !m.function.is_generic());
                for (method, (name, id)) in plain.zip(&spec.methods) {
                    self.queue_member(&method.function, *id, format!("{}.{}", spec.name, name), &subst, owner);
                }
            }
            _ => {
                let func = decl
                    .body()
                    .ok_or_else(|| self.internal_error("function specialization without a body"))?;
                let id = spec
                    .function
                    .ok_or_else(|| self.internal_error("function specialization without a body"))?;
                self.session.push_job(Job {
                    id,
                    name: spec.name.clone(),
                    target: JobTarget::Function { func },
                    subst,
                    owner: Some(owner),
                });
            }
        }
        Ok(spec)
    }

    /// Queue the constructor or a non-generic method of a class specialization
    fn queue_member(&mut self, func: &'a Function, id: FunctionId, name: String, subst: &TypeSubstitution, owner: usize) {
        self.session.push_job(Job {
            id,
            name,
            target: JobTarget::Function { func },
            subst: subst.clone(),
            owner: Some(owner),
        });
    }

    fn reference_specialization(
        &mut self,
        decl: GenericDecl<'a>,
        spec: &Specialization,
        args: &[TypeId],
    ) -> CompileResult<Register> {
        if spec.unit == self.session.options.unit() && spec.session != self.session.id {
            return Err(CompileError::StaleSpecialization {
                unit: spec.unit.clone(),
                name: spec.name.clone(),
            });
        }
        match decl {
            GenericDecl::Class(class) => {
                let constructor = match (&class.constructor, spec.function) {
                    (Some(ctor), Some(id)) => Some(self.specialized_closure(ctor.scope, id, &spec.unit)?),
                    _ => None,
                };
                let mut plain = spec.methods.iter();
                let mut methods = Vec::with_capacity(class.methods.len());
                for method in &class.methods {
                    let closure = if method.function.is_generic() {
                        self.specialized_method(class, method, &[], args)?
                    } else {
                        let id = match plain.next() {
                            Some((_, id)) => *id,
                            None => return Err(self.internal_error("class specialization is missing a method")),
                        };
                        self.specialized_closure(method.function.scope, id, &spec.unit)?
                    };
                    methods.push((method.name.clone(), closure));
                }
                let dest = self.alloc_register(TypeId::ANY);
                self.emit(IrInstr::CreateClass {
                    dest,
                    name: spec.name.clone(),
                    constructor,
                    methods,
                });
                Ok(dest)
            }
            _ => {
                let func = decl
                    .body()
                    .ok_or_else(|| self.internal_error("function specialization without a body"))?;
                let id = spec
                    .function
                    .ok_or_else(|| self.internal_error("function specialization without a body"))?;
                self.specialized_closure(func.scope, id, &spec.unit)
            }
        }
    }

    /// Closure over the specialized body `id` of the function whose scope is `scope`;
    /// bodies owned by another unit are loaded from it instead
    fn specialized_closure(&mut self, scope: ScopeId, id: FunctionId, unit: &str) -> CompileResult<Register> {
        let dest = self.alloc_register(TypeId::ANY);
        if unit != self.session.options.unit() {
            self.emit(IrInstr::LoadExternal {
                dest,
                unit: unit.to_string(),
                function: id,
            });
            return Ok(dest);
        }
        let env = self.declaration_env(scope)?;
        self.emit(IrInstr::CreateClosure { dest, func: id, env });
        Ok(dest)
    }

    /// The record a closure declared with function scope `scope` captures, reached from
    /// the current position
    fn declaration_env(&mut self, scope: ScopeId) -> CompileResult<Option<Register>> {
        let outer = match self.session.tree.parent(scope) {
            Some(outer) => outer,
            None => return Ok(None),
        };
        if !self.session.plan.has_enclosing_record(outer) {
            return Ok(None);
        }
        let env = self.require_env()?;
        let hops = self.session.plan.hops(self.scope, outer);
        if hops == 0 {
            return Ok(Some(env));
        }
        let dest = self.alloc_register(TypeId::ANY);
        self.emit(IrInstr::GetEnvironment { dest, env, hops });
        Ok(Some(dest))
    }

    fn divergence(&self, decl: GenericDecl<'a>, err: KeyDivergence) -> CompileError {
        CompileError::TypeKeyDivergence {
            function: self.function_name(),
            decl: decl.name().to_string(),
            fuel: err.fuel,
        }
    }
}
