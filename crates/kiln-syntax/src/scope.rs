//! Declaration/Scope table.
//!
//! One [`Binding`] per lexical declaration, grouped into a tree of [`Scope`]s. The
//! resolver fills this table and sets capture flags; later stages only read it.

use crate::ast::NodeId;
use crate::span::Span;
use crate::types::TypeId;
use serde::Serialize;
use std::fmt;

/// Scope identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// Marker used by the parser before the resolver assigns real scopes
    pub const UNASSIGNED: ScopeId = ScopeId(u32::MAX);
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope{}", self.0)
    }
}

/// Binding identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BindingId(pub u32);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Scope kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScopeKind {
    /// Module top level
    Module,
    /// Function parameters and body
    Function,
    /// `{ ... }`
    Block,
    /// Head of a `for` loop (`let` in the initializer)
    ForHead,
    /// Per-iteration bindings of a `for-of` or `for-in`
    ForEach,
    /// `catch (e)`
    Catch,
    /// Body of a `switch`
    Switch,
}

impl ScopeKind {
    /// Whether a fresh activation may be needed per loop iteration
    pub fn is_loop(&self) -> bool {
        matches!(self, ScopeKind::ForHead | ScopeKind::ForEach)
    }
}

/// Binding kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BindingKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
    /// Formal parameter
    Param,
    /// `catch (e)`
    Catch,
    /// `class C`
    Class,
    /// `function f` declaration
    Function,
    /// Hidden `this` of a non-arrow function
    This,
}

impl BindingKind {
    /// Whether reads before initialization must fail
    pub fn has_tdz(&self) -> bool {
        matches!(self, BindingKind::Let | BindingKind::Const | BindingKind::Class)
    }

    /// Whether writes after initialization must fail
    pub fn is_immutable(&self) -> bool {
        matches!(self, BindingKind::Const)
    }

    /// Whether the declaration is lexically scoped (conflicts with any same-named binding)
    pub fn is_lexical(&self) -> bool {
        matches!(
            self,
            BindingKind::Let | BindingKind::Const | BindingKind::Class
        )
    }

    /// State of the binding when its scope is entered
    pub fn initial_state(&self) -> InitState {
        if self.has_tdz() {
            InitState::Uninitialized
        } else {
            InitState::Initialized
        }
    }
}

/// Initialization state at scope entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InitState {
    /// Holds the TDZ sentinel until the declaration runs
    Uninitialized,
    /// Holds `undefined` (or its argument) from scope entry
    Initialized,
}

/// A lexical declaration
#[derive(Debug, Clone, Serialize)]
pub struct Binding {
    /// Binding id
    pub id: BindingId,
    /// Source name
    pub name: String,
    /// Declaration kind
    pub kind: BindingKind,
    /// Owning scope
    pub scope: ScopeId,
    /// Read or written from a nested function
    pub captured: bool,
    /// Declared or inferred static type
    pub ty: Option<TypeId>,
    /// Location of the declaration
    pub span: Span,
    /// Function declaration node, for [`BindingKind::Function`] and for a `const`
    /// initialized with a generic function expression
    pub function: Option<NodeId>,
    /// Class declaration node, for [`BindingKind::Class`]
    pub class: Option<NodeId>,
}

/// A lexical scope
#[derive(Debug, Clone, Serialize)]
pub struct Scope {
    /// Scope id
    pub id: ScopeId,
    /// Scope kind
    pub kind: ScopeKind,
    /// Enclosing scope (`None` for the module scope)
    pub parent: Option<ScopeId>,
    /// Function (or module) whose body contains this scope
    pub function: NodeId,
    /// Bindings in declaration order
    pub bindings: Vec<BindingId>,
    /// Set if a nested closure reads or writes a binding of this scope
    pub captured: bool,
    /// Contains a direct `eval` call
    pub has_direct_eval: bool,
    /// Location
    pub span: Span,
}

/// The scope tree and binding table of one module
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    bindings: Vec<Binding>,
}

impl ScopeTree {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scope
    pub fn add_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>, function: NodeId, span: Span) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            id,
            kind,
            parent,
            function,
            bindings: Vec::new(),
            captured: false,
            has_direct_eval: false,
            span,
        });
        id
    }

    /// Add a binding to `scope`
    pub fn add_binding(&mut self, scope: ScopeId, name: impl Into<String>, kind: BindingKind, span: Span) -> BindingId {
        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(Binding {
            id,
            name: name.into(),
            kind,
            scope,
            captured: false,
            ty: None,
            span,
            function: None,
            class: None,
        });
        if let Some(s) = self.scopes.get_mut(scope.0 as usize) {
            s.bindings.push(id);
        }
        id
    }

    /// Look up a scope
    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.0 as usize)
    }

    /// Look up a scope mutably
    pub fn scope_mut(&mut self, id: ScopeId) -> Option<&mut Scope> {
        self.scopes.get_mut(id.0 as usize)
    }

    /// Look up a binding
    pub fn binding(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(id.0 as usize)
    }

    /// Look up a binding mutably
    pub fn binding_mut(&mut self, id: BindingId) -> Option<&mut Binding> {
        self.bindings.get_mut(id.0 as usize)
    }

    /// All scopes in creation order
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// All bindings in creation order
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Number of scopes
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Parent of `id`
    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scope(id).and_then(|s| s.parent)
    }

    /// `id` followed by each of its ancestors, innermost first
    pub fn ancestors(&self, id: ScopeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.scope(id).map(|s| s.id),
        }
    }

    /// Whether `ancestor` is `scope` or encloses it
    pub fn is_ancestor(&self, ancestor: ScopeId, scope: ScopeId) -> bool {
        self.ancestors(scope).any(|s| s == ancestor)
    }

    /// Find a binding named `name` visible from `scope`
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<BindingId> {
        for sid in self.ancestors(scope) {
            if let Some(s) = self.scope(sid) {
                // Later declarations shadow earlier ones in the same scope
                if let Some(b) = s
                    .bindings
                    .iter()
                    .rev()
                    .find(|b| self.binding(**b).map(|b| b.name.as_str()) == Some(name))
                {
                    return Some(*b);
                }
            }
        }
        None
    }

    /// Mark a binding captured, propagating the flag to its scope
    pub fn mark_captured(&mut self, id: BindingId) {
        let scope = match self.binding_mut(id) {
            Some(b) => {
                b.captured = true;
                b.scope
            }
            None => return,
        };
        if let Some(s) = self.scope_mut(scope) {
            s.captured = true;
        }
    }
}

/// Iterator over a scope and its ancestors
pub struct Ancestors<'a> {
    tree: &'a ScopeTree,
    next: Option<ScopeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = ScopeId;

    fn next(&mut self) -> Option<ScopeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_ancestors() {
        let mut tree = ScopeTree::new();
        let module = tree.add_scope(ScopeKind::Module, None, NodeId::MODULE, Span::default());
        let block = tree.add_scope(ScopeKind::Block, Some(module), NodeId::MODULE, Span::default());
        let x = tree.add_binding(module, "x", BindingKind::Let, Span::default());
        assert_eq!(tree.lookup(block, "x"), Some(x));
        assert_eq!(tree.lookup(block, "y"), None);
        assert!(tree.is_ancestor(module, block));
        assert!(!tree.is_ancestor(block, module));
    }

    #[test]
    fn test_mark_captured_sets_scope_flag() {
        let mut tree = ScopeTree::new();
        let module = tree.add_scope(ScopeKind::Module, None, NodeId::MODULE, Span::default());
        let x = tree.add_binding(module, "x", BindingKind::Let, Span::default());
        tree.mark_captured(x);
        assert!(tree.binding(x).unwrap().captured);
        assert!(tree.scope(module).unwrap().captured);
    }

    #[test]
    fn test_tdz_kinds() {
        assert!(BindingKind::Let.has_tdz());
        assert!(BindingKind::Class.has_tdz());
        assert!(!BindingKind::Var.has_tdz());
        assert_eq!(BindingKind::Const.initial_state(), InitState::Uninitialized);
        assert_eq!(BindingKind::Param.initial_state(), InitState::Initialized);
    }
}
