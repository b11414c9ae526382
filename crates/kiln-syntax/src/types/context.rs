//! Type context for managing types and type interning

use super::ty::{FunctionType, Type, TypeId, TypeVar};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Mapping from type parameters to concrete types
pub type TypeSubstitutionMap = FxHashMap<TypeId, TypeId>;

static ANY: Type = Type::Any;

/// Type context that manages all types in a program
///
/// This uses type interning to ensure that identical non-recursive types share a TypeId.
/// Recursive aliases are the exception: each alias owns its own id, so two isomorphic
/// recursive definitions remain distinct ids that are only structurally equal.
#[derive(Debug, Clone)]
pub struct TypeContext {
    /// Storage for all types, indexed by TypeId
    types: Vec<Arc<Type>>,

    /// Reverse mapping from Type to TypeId for interning
    type_to_id: FxHashMap<Type, TypeId>,

    /// Counter for placeholder nodes
    next_placeholder: u32,
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeContext {
    /// Create a new context with the well-known primitive ids pre-interned
    pub fn new() -> Self {
        let mut ctx = TypeContext {
            types: Vec::new(),
            type_to_id: FxHashMap::default(),
            next_placeholder: 0,
        };

        // Order must match the TypeId constants
        ctx.intern(Type::Any);
        ctx.intern(Type::Number);
        ctx.intern(Type::String);
        ctx.intern(Type::Boolean);
        ctx.intern(Type::Null);
        ctx.intern(Type::Undefined);
        ctx.intern(Type::Void);
        ctx.intern(Type::Never);

        ctx
    }

    /// Intern a type, returning its TypeId
    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.type_to_id.get(&ty) {
            return id;
        }

        let id = TypeId(self.types.len() as u32);
        self.types.push(Arc::new(ty.clone()));
        self.type_to_id.insert(ty, id);
        id
    }

    /// Allocate a fresh placeholder node for a recursive definition
    pub fn placeholder(&mut self) -> TypeId {
        let n = self.next_placeholder;
        self.next_placeholder += 1;
        self.intern(Type::Placeholder(n))
    }

    /// Replace the type at an existing TypeId in-place.
    ///
    /// Used to close recursive definitions: a placeholder is allocated first, the body is
    /// resolved (possibly referencing the placeholder), then the placeholder is replaced.
    pub fn replace_type(&mut self, id: TypeId, new_ty: Type) {
        let idx = id.0 as usize;
        if idx < self.types.len() {
            let old_ty = (*self.types[idx]).clone();
            if self.type_to_id.get(&old_ty) == Some(&id) {
                self.type_to_id.remove(&old_ty);
            }
            self.types[idx] = Arc::new(new_ty.clone());
            self.type_to_id.entry(new_ty).or_insert(id);
        }
    }

    /// Get a type by its TypeId
    pub fn get(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id.0 as usize).map(|arc| arc.as_ref())
    }

    /// Get a type by its TypeId, treating unknown ids as `any`
    pub fn ty(&self, id: TypeId) -> &Type {
        self.get(id).unwrap_or(&ANY)
    }

    /// Number of interned types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the context holds no types
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// `T[]`
    pub fn array_type(&mut self, element: TypeId) -> TypeId {
        self.intern(Type::Array(element))
    }

    /// `(params) => ret`
    pub fn function_type(&mut self, params: Vec<TypeId>, ret: TypeId) -> TypeId {
        self.intern(Type::Function(FunctionType { params, ret }))
    }

    /// Object type; properties are sorted by name
    pub fn object_type(&mut self, mut props: Vec<(String, TypeId)>) -> TypeId {
        props.sort_by(|a, b| a.0.cmp(&b.0));
        self.intern(Type::Object(props))
    }

    /// Union of `members`; duplicates are removed and a single member collapses
    pub fn union_type(&mut self, members: Vec<TypeId>) -> TypeId {
        let mut flat = Vec::new();
        for member in members {
            match self.ty(member) {
                Type::Union(inner) => flat.extend(inner.iter().copied()),
                _ => flat.push(member),
            }
        }
        flat.sort();
        flat.dedup();
        if flat.len() == 1 {
            return flat[0];
        }
        self.intern(Type::Union(flat))
    }

    /// Class instance type
    pub fn class_type(&mut self, name: impl Into<String>, decl: u32, type_args: Vec<TypeId>) -> TypeId {
        self.intern(Type::Class {
            name: name.into(),
            decl,
            type_args,
        })
    }

    /// Type parameter `name` declared by node `owner`
    pub fn type_variable(&mut self, name: impl Into<String>, owner: u32, index: u32) -> TypeId {
        self.intern(Type::TypeVar(TypeVar {
            name: name.into(),
            owner,
            index,
        }))
    }

    /// Whether `id` is exactly `number`
    pub fn is_number(&self, id: TypeId) -> bool {
        matches!(self.ty(id), Type::Number)
    }

    /// Whether `id` is exactly `string`
    pub fn is_string(&self, id: TypeId) -> bool {
        matches!(self.ty(id), Type::String)
    }

    /// Whether `id` is a type parameter
    pub fn is_type_var(&self, id: TypeId) -> bool {
        matches!(self.ty(id), Type::TypeVar(_))
    }

    /// Return type of a function type, `any` otherwise
    pub fn return_type(&self, id: TypeId) -> TypeId {
        match self.ty(id) {
            Type::Function(func) => func.ret,
            _ => TypeId::ANY,
        }
    }

    /// Whether any type parameter is reachable from `id`
    pub fn contains_type_vars(&self, id: TypeId) -> bool {
        let mut seen = FxHashSet::default();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            let ty = self.ty(next);
            if matches!(ty, Type::TypeVar(_)) {
                return true;
            }
            stack.extend(ty.children());
        }
        false
    }

    /// Substitute type parameters through `id`.
    ///
    /// Types with no reachable parameter are returned unchanged. Cycles through a
    /// substituted node are closed with a placeholder that is replaced once the node's
    /// body is known, so recursive types substitute to recursive types.
    pub fn substitute(&mut self, id: TypeId, map: &TypeSubstitutionMap) -> TypeId {
        if map.is_empty() {
            return id;
        }
        let mut done = FxHashMap::default();
        let mut in_progress = FxHashMap::default();
        self.substitute_inner(id, map, &mut done, &mut in_progress)
    }

    fn substitute_inner(
        &mut self,
        id: TypeId,
        map: &TypeSubstitutionMap,
        done: &mut FxHashMap<TypeId, TypeId>,
        in_progress: &mut FxHashMap<TypeId, Option<TypeId>>,
    ) -> TypeId {
        if let Some(&mapped) = map.get(&id) {
            return mapped;
        }
        if let Some(&result) = done.get(&id) {
            return result;
        }
        if let Some(slot) = in_progress.get_mut(&id) {
            // Back edge: hand out (and remember) a placeholder for this node
            return match slot {
                Some(placeholder) => *placeholder,
                None => {
                    let n = self.next_placeholder;
                    self.next_placeholder += 1;
                    let placeholder = self.intern(Type::Placeholder(n));
                    *slot = Some(placeholder);
                    placeholder
                }
            };
        }
        if !self.contains_type_vars(id) {
            done.insert(id, id);
            return id;
        }

        in_progress.insert(id, None);
        let ty = self.ty(id).clone();
        let mut sub = |ctx: &mut Self, child: TypeId| ctx.substitute_inner(child, map, done, in_progress);
        let rebuilt = match ty {
            Type::Array(elem) => Type::Array(sub(self, elem)),
            Type::Function(func) => {
                let params = func.params.iter().map(|p| sub(self, *p)).collect();
                Type::Function(FunctionType {
                    params,
                    ret: sub(self, func.ret),
                })
            }
            Type::Object(props) => Type::Object(
                props
                    .into_iter()
                    .map(|(name, ty)| (name, sub(self, ty)))
                    .collect(),
            ),
            Type::Class {
                name,
                decl,
                type_args,
            } => Type::Class {
                name,
                decl,
                type_args: type_args.into_iter().map(|t| sub(self, t)).collect(),
            },
            Type::Union(members) => {
                let members = members.into_iter().map(|t| sub(self, t)).collect();
                Type::Union(members)
            }
            other => other,
        };

        let result = match in_progress.remove(&id).flatten() {
            Some(placeholder) => {
                self.replace_type(placeholder, rebuilt);
                placeholder
            }
            None => self.intern(rebuilt),
        };
        done.insert(id, result);
        result
    }

    /// Human-readable rendering; recursive references print as `...`
    pub fn display(&self, id: TypeId) -> String {
        let mut out = String::new();
        let mut visiting = Vec::new();
        self.display_inner(id, &mut visiting, &mut out);
        out
    }

    fn display_inner(&self, id: TypeId, visiting: &mut Vec<TypeId>, out: &mut String) {
        if visiting.contains(&id) {
            out.push_str("...");
            return;
        }
        visiting.push(id);
        let list = |ctx: &Self, ids: &[TypeId], sep: &str, visiting: &mut Vec<TypeId>, out: &mut String| {
            for (i, t) in ids.iter().enumerate() {
                if i > 0 {
                    out.push_str(sep);
                }
                ctx.display_inner(*t, visiting, out);
            }
        };
        match self.ty(id) {
            Type::Any => out.push_str("any"),
            Type::Number => out.push_str("number"),
            Type::String => out.push_str("string"),
            Type::Boolean => out.push_str("boolean"),
            Type::Null => out.push_str("null"),
            Type::Undefined => out.push_str("undefined"),
            Type::Void => out.push_str("void"),
            Type::Never => out.push_str("never"),
            Type::TypeVar(var) => out.push_str(&var.name),
            Type::Placeholder(n) => out.push_str(&format!("?{}", n)),
            Type::Array(elem) => {
                self.display_inner(*elem, visiting, out);
                out.push_str("[]");
            }
            Type::Function(func) => {
                out.push('(');
                list(self, &func.params, ", ", visiting, out);
                out.push_str(") => ");
                self.display_inner(func.ret, visiting, out);
            }
            Type::Object(props) => {
                out.push('{');
                for (i, (name, ty)) in props.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(name);
                    out.push_str(": ");
                    self.display_inner(*ty, visiting, out);
                }
                out.push('}');
            }
            Type::Class {
                name, type_args, ..
            } => {
                out.push_str(name);
                if !type_args.is_empty() {
                    out.push('<');
                    list(self, type_args, ",", visiting, out);
                    out.push('>');
                }
            }
            Type::Union(members) => list(self, members, " | ", visiting, out),
        }
        visiting.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_ids() {
        let ctx = TypeContext::new();
        assert_eq!(ctx.ty(TypeId::NUMBER), &Type::Number);
        assert_eq!(ctx.ty(TypeId::NEVER), &Type::Never);
        assert!(ctx.is_string(TypeId::STRING));
    }

    #[test]
    fn test_interning_dedupes_structure() {
        let mut ctx = TypeContext::new();
        let a = ctx.array_type(TypeId::NUMBER);
        let b = ctx.array_type(TypeId::NUMBER);
        assert_eq!(a, b);
    }

    #[test]
    fn test_substitute_through_function() {
        let mut ctx = TypeContext::new();
        let t = ctx.type_variable("T", 1, 0);
        let arr = ctx.array_type(t);
        let func = ctx.function_type(vec![t], arr);
        let mut map = TypeSubstitutionMap::default();
        map.insert(t, TypeId::NUMBER);
        let result = ctx.substitute(func, &map);
        let expected_arr = ctx.array_type(TypeId::NUMBER);
        let expected = ctx.function_type(vec![TypeId::NUMBER], expected_arr);
        assert_eq!(result, expected);
        assert_eq!(ctx.display(result), "(number) => number[]");
    }

    #[test]
    fn test_substitute_recursive_type_terminates() {
        let mut ctx = TypeContext::new();
        let t = ctx.type_variable("T", 1, 0);
        // R = (T) => R
        let r = ctx.placeholder();
        ctx.replace_type(
            r,
            Type::Function(FunctionType {
                params: vec![t],
                ret: r,
            }),
        );
        let mut map = TypeSubstitutionMap::default();
        map.insert(t, TypeId::STRING);
        let result = ctx.substitute(r, &map);
        match ctx.ty(result) {
            Type::Function(func) => {
                assert_eq!(func.params, vec![TypeId::STRING]);
                assert_eq!(func.ret, result);
            }
            other => panic!("expected function type, got {:?}", other),
        }
    }

    #[test]
    fn test_display_recursive() {
        let mut ctx = TypeContext::new();
        let f = ctx.placeholder();
        ctx.replace_type(
            f,
            Type::Function(FunctionType {
                params: vec![],
                ret: f,
            }),
        );
        assert_eq!(ctx.display(f), "() => ...");
    }
}
