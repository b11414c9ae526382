//! Monomorphization - Generic Specialization
//!
//! Every generic function or class gets one concrete IR body per distinct
//! type-argument tuple; there is never a single polymorphic body.
//!
//! # Overview
//!
//! ```typescript
//! // Source
//! function identity<T>(x: T): T { return x; }
//! let a = identity(42);        // identity<number>
//! let b = identity<number>(7); // identity<number> again: same body
//! let c = identity("hello");   // identity<string>
//! ```
//!
//! A call site substitutes its type arguments through the active substitution,
//! builds a canonical [`TypeKey`] and consults the [`SpecializationCache`]. A hit
//! reuses the recorded function; a miss reserves a function id, records it, and
//! queues the generic body to be lowered again under the new substitution.

mod cache;
mod substitute;
mod type_key;

pub use cache::{LocalSpecializationCache, SharedSpecializationCache, SpecializationCache};
pub use substitute::{mangle_name, TypeSubstitution};
pub use type_key::{KeyDivergence, TypeKey, TYPE_HASH_DEPTH};

use crate::ir::{FunctionId, IrFunction};
use kiln_syntax::NodeId;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Whether a generic entity is a function or class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericKind {
    Function,
    Class,
}

/// Identity of a generic declaration.
///
/// Node ids are positional and restart at zero in every parse, so the declaring
/// module is also identified by a hash of its source text. Units compiling the same
/// module agree on every id; unrelated modules never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericId {
    /// Module that declares it
    pub origin: String,
    /// [`source_fingerprint`] of the declaring module
    pub source: u64,
    /// Declaration node
    pub decl: NodeId,
    pub kind: GenericKind,
}

impl GenericId {
    pub fn new(origin: impl Into<String>, source: u64, decl: NodeId, kind: GenericKind) -> Self {
        Self {
            origin: origin.into(),
            source,
            decl,
            kind,
        }
    }
}

/// Hash of a module's source text, used in [`GenericId`]
pub fn source_fingerprint(source: &str) -> u64 {
    let mut hasher = FxHasher::default();
    source.hash(&mut hasher);
    hasher.finish()
}

/// One run of the emitter over one module.
///
/// Function ids in a [`Specialization`] are only meaningful inside the session that
/// reserved them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    /// A session id no other session in this process has
    pub fn fresh() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session{}", self.0)
    }
}

/// One instantiation of a generic declaration
#[derive(Debug)]
pub struct Specialization {
    /// Compilation unit that owns the lowered body
    pub unit: String,
    /// Session that reserved the function ids below
    pub session: SessionId,
    /// Mangled name (`name<arg,...>`)
    pub name: String,
    /// The function body; for classes, the constructor if the class declares one
    pub function: Option<FunctionId>,
    /// Method bodies of a class specialization
    pub methods: Vec<(String, FunctionId)>,
    body: OnceLock<Arc<[IrFunction]>>,
}

impl Specialization {
    pub fn function(
        unit: impl Into<String>,
        session: SessionId,
        name: impl Into<String>,
        function: FunctionId,
    ) -> Self {
        Self {
            unit: unit.into(),
            session,
            name: name.into(),
            function: Some(function),
            methods: Vec::new(),
            body: OnceLock::new(),
        }
    }

    pub fn class(
        unit: impl Into<String>,
        session: SessionId,
        name: impl Into<String>,
        constructor: Option<FunctionId>,
        methods: Vec<(String, FunctionId)>,
    ) -> Self {
        Self {
            unit: unit.into(),
            session,
            name: name.into(),
            function: constructor,
            methods,
            body: OnceLock::new(),
        }
    }

    /// Published body, if the owning unit has finished it
    pub fn body(&self) -> Option<&Arc<[IrFunction]>> {
        self.body.get()
    }

    /// Freeze the lowered body; returns false if one was already published
    pub fn freeze(&self, body: Vec<IrFunction>) -> bool {
        self.body.set(Arc::from(body)).is_ok()
    }

    /// Every function id this specialization owns
    pub fn function_ids(&self) -> Vec<FunctionId> {
        self.function
            .iter()
            .copied()
            .chain(self.methods.iter().map(|(_, id)| *id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_id_equality() {
        let source = source_fingerprint("function id<T>(x: T): T { return x; }");
        let a = GenericId::new("main", source, NodeId(3), GenericKind::Function);
        let b = GenericId::new("main", source, NodeId(3), GenericKind::Function);
        let c = GenericId::new("main", source, NodeId(3), GenericKind::Class);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_same_node_in_other_source_is_another_declaration() {
        let id = source_fingerprint("function id<T>(x: T) { return x; }");
        let neg = source_fingerprint("function neg<T>(x: T) { return -x; }");
        let a = GenericId::new("main", id, NodeId(3), GenericKind::Function);
        let b = GenericId::new("main", neg, NodeId(3), GenericKind::Function);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sessions_are_unique() {
        assert_ne!(SessionId::fresh(), SessionId::fresh());
    }

    #[test]
    fn test_class_specialization_ids() {
        let spec = Specialization::class(
            "main",
            SessionId::fresh(),
            "Box<number>",
            Some(FunctionId(4)),
            vec![("get".into(), FunctionId(5))],
        );
        assert_eq!(spec.function_ids(), vec![FunctionId(4), FunctionId(5)]);
        assert!(spec.freeze(Vec::new()));
        assert!(!spec.freeze(Vec::new()));
    }
}
