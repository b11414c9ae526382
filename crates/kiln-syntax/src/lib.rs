//! Kiln Syntax
//!
//! The annotated syntax tree consumed by the Kiln lowering pipeline: AST nodes, the
//! declaration/scope table, source spans and interned static types, plus the lexer,
//! parser and resolver that produce them.

#![warn(missing_docs)]

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod scope;
pub mod span;
pub mod token;
pub mod types;

pub use ast::{Module, NodeId};
pub use error::{SyntaxError, SyntaxResult};
pub use scope::{Binding, BindingId, BindingKind, InitState, Scope, ScopeId, ScopeKind, ScopeTree};
pub use span::Span;
pub use types::{Type, TypeContext, TypeId};

/// Parse and resolve `source`, returning the annotated module, its scope table and the
/// type context its types live in
pub fn parse_and_resolve(source: &str) -> SyntaxResult<(Module, ScopeTree, TypeContext)> {
    let mut module = parser::parse(source)?;
    let mut types = TypeContext::new();
    let tree = resolver::resolve(&mut module, &mut types)?;
    Ok((module, tree, types))
}
