//! Static types attached to the syntax tree.
//!
//! Types are interned in a [`TypeContext`]; recursive type aliases are built with a
//! placeholder that is later replaced in place, so the type graph may contain cycles.

mod context;
mod ty;

pub use context::{TypeContext, TypeSubstitutionMap};
pub use ty::{FunctionType, Type, TypeId, TypeVar};
