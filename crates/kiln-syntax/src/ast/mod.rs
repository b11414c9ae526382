//! Abstract Syntax Tree (AST) for the Kiln source dialect.
//!
//! The tree is produced by [`crate::parser`] and annotated in place by
//! [`crate::resolver`]: afterwards every identifier carries its [`Resolution`], every
//! scope-introducing node carries its [`ScopeId`], and every expression carries a
//! [`TypeId`] (possibly `any`).

use crate::scope::{BindingId, ScopeId};
use crate::span::Span;
use crate::types::TypeId;
use serde::Serialize;
use std::fmt;

pub mod expression;
pub mod pattern;
pub mod statement;
pub mod visitor;

pub use expression::*;
pub use pattern::*;
pub use statement::*;

/// Identity of a function or class declaration node, stable for a given source.
///
/// `NodeId(0)` is the module itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The module's top-level code
    pub const MODULE: NodeId = NodeId(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// Root node: one source file
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Top-level statements
    pub body: Vec<Statement>,
    /// Module scope
    pub scope: ScopeId,
    /// Span covering the entire module
    pub span: Span,
}

/// How an identifier was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Not yet visited by the resolver
    Unresolved,
    /// A lexical binding
    Binding(BindingId),
    /// No lexical binding; a property of the global object
    Global,
}

/// Identifier reference or binding occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    /// Source name
    pub name: String,
    /// Location
    pub span: Span,
    /// Resolved binding
    pub resolution: Resolution,
}

impl Identifier {
    /// Create an unresolved identifier
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
            resolution: Resolution::Unresolved,
        }
    }

    /// The binding this identifier resolved to, if lexical
    pub fn binding(&self) -> Option<BindingId> {
        match self.resolution {
            Resolution::Binding(id) => Some(id),
            _ => None,
        }
    }
}

/// Written type annotation
#[derive(Debug, Clone, PartialEq)]
pub enum TypeAnnotation {
    /// `number`, `T`, `Box<number>`
    Named {
        /// Type name
        name: String,
        /// Type arguments
        args: Vec<TypeAnnotation>,
        /// Location
        span: Span,
    },
    /// `T[]`
    Array(Box<TypeAnnotation>),
    /// `(a: A) => R`
    Function {
        /// Parameter types
        params: Vec<TypeAnnotation>,
        /// Return type
        ret: Box<TypeAnnotation>,
    },
    /// `{ a: A }`
    Object(Vec<(String, TypeAnnotation)>),
    /// `A | B`
    Union(Vec<TypeAnnotation>),
}

/// Declared generic parameter
#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    /// Source name
    pub name: String,
    /// Interned type variable (set by the resolver)
    pub ty: TypeId,
    /// Location
    pub span: Span,
}

/// `type Name = ...;`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAlias {
    /// Alias name
    pub name: String,
    /// Aliased type
    pub annotation: TypeAnnotation,
    /// Location
    pub span: Span,
}
