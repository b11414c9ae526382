//! Core type definitions

use serde::Serialize;
use std::fmt;

/// Unique identifier for a type in the type context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// The dynamic `any` type
    pub const ANY: TypeId = TypeId(0);
    /// `number`
    pub const NUMBER: TypeId = TypeId(1);
    /// `string`
    pub const STRING: TypeId = TypeId(2);
    /// `boolean`
    pub const BOOLEAN: TypeId = TypeId(3);
    /// `null`
    pub const NULL: TypeId = TypeId(4);
    /// `undefined`
    pub const UNDEFINED: TypeId = TypeId(5);
    /// `void`
    pub const VOID: TypeId = TypeId(6);
    /// `never`
    pub const NEVER: TypeId = TypeId(7);

    /// Create a new TypeId from a raw value
    ///
    /// Prefer the well-known constants or [`TypeContext`](super::TypeContext) methods.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw value of this TypeId
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A generic type parameter, unique per declaring node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeVar {
    /// Source name (`T`)
    pub name: String,
    /// Node id of the generic function or class declaring it
    pub owner: u32,
    /// Position in the owner's parameter list
    pub index: u32,
}

/// Function signature type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionType {
    /// Parameter types
    pub params: Vec<TypeId>,
    /// Return type
    pub ret: TypeId,
}

/// A type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    /// Dynamically typed value
    Any,
    /// `number`
    Number,
    /// `string`
    String,
    /// `boolean`
    Boolean,
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// `void`
    Void,
    /// `never`
    Never,
    /// Type parameter
    TypeVar(TypeVar),
    /// `T[]`
    Array(TypeId),
    /// `(a: A) => R`
    Function(FunctionType),
    /// `{ a: A, b: B }`, properties sorted by name
    Object(Vec<(String, TypeId)>),
    /// Instance type of a class declaration, possibly instantiated
    Class {
        /// Class name
        name: String,
        /// Node id of the class declaration
        decl: u32,
        /// Type arguments for generic classes
        type_args: Vec<TypeId>,
    },
    /// `A | B`
    Union(Vec<TypeId>),
    /// Unresolved recursive alias; replaced before resolution completes
    Placeholder(u32),
}

impl Type {
    /// Child type ids in a fixed structural order
    pub fn children(&self) -> Vec<TypeId> {
        match self {
            Type::Array(elem) => vec![*elem],
            Type::Function(func) => {
                let mut out = func.params.clone();
                out.push(func.ret);
                out
            }
            Type::Object(props) => props.iter().map(|(_, ty)| *ty).collect(),
            Type::Class { type_args, .. } => type_args.clone(),
            Type::Union(members) => members.clone(),
            _ => Vec::new(),
        }
    }

    /// Whether two nodes agree on everything except their children
    pub fn same_shape(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Array(_), Type::Array(_)) => true,
            (Type::Function(a), Type::Function(b)) => a.params.len() == b.params.len(),
            (Type::Object(a), Type::Object(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|((x, _), (y, _))| x == y)
            }
            (
                Type::Class {
                    decl: a, type_args: xs, ..
                },
                Type::Class {
                    decl: b, type_args: ys, ..
                },
            ) => a == b && xs.len() == ys.len(),
            (Type::Union(a), Type::Union(b)) => a.len() == b.len(),
            (a, b) => a == b,
        }
    }

    /// Small integer distinguishing node kinds, used by structural hashing
    pub fn shape_tag(&self) -> u8 {
        match self {
            Type::Any => 0,
            Type::Number => 1,
            Type::String => 2,
            Type::Boolean => 3,
            Type::Null => 4,
            Type::Undefined => 5,
            Type::Void => 6,
            Type::Never => 7,
            Type::TypeVar(_) => 8,
            Type::Array(_) => 9,
            Type::Function(_) => 10,
            Type::Object(_) => 11,
            Type::Class { .. } => 12,
            Type::Union(_) => 13,
            Type::Placeholder(_) => 14,
        }
    }
}
