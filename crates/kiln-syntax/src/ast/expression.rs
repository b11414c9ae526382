//! Expression AST nodes

use super::*;

/// Expression with its resolved static type
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// Node
    pub kind: ExpressionKind,
    /// Static type (`any` when unknown)
    pub ty: TypeId,
    /// Location
    pub span: Span,
}

impl Expression {
    /// Create an expression of type `any`
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Self {
            kind,
            ty: TypeId::ANY,
            span,
        }
    }
}

/// Expression node kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    /// `42`
    Number(f64),
    /// `"hi"`
    String(String),
    /// `true` / `false`
    Boolean(bool),
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// Identifier reference (also `this`, resolved to a hidden binding)
    Identifier(Identifier),
    /// `[a, , ...b]`
    Array(Vec<ArrayElement>),
    /// `{ a: 1, [k]: 2, ...o }`
    Object(Vec<ObjectProperty>),
    /// Function expression or arrow
    Function(Box<Function>),
    /// `-x`, `!x`, `typeof x`
    Unary {
        /// Operator
        op: UnaryOperator,
        /// Operand
        argument: Box<Expression>,
    },
    /// `x++`, `--x`
    Update {
        /// Operator
        op: UpdateOperator,
        /// Prefix form
        prefix: bool,
        /// Identifier or member target
        target: Box<Expression>,
    },
    /// `a + b`
    Binary {
        /// Operator
        op: BinaryOperator,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },
    /// `a && b`
    Logical {
        /// Operator
        op: LogicalOperator,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },
    /// `c ? a : b`
    Conditional {
        /// Condition
        test: Box<Expression>,
        /// Value when truthy
        consequent: Box<Expression>,
        /// Value when falsy
        alternate: Box<Expression>,
    },
    /// `x = v`, `x += v`, `[a, b] = v`
    Assignment {
        /// Operator
        op: AssignmentOperator,
        /// Target
        target: AssignmentTarget,
        /// Assigned value
        value: Box<Expression>,
    },
    /// `f<T>(args)`
    Call {
        /// Callee
        callee: Box<Expression>,
        /// Written type arguments
        type_annotations: Vec<TypeAnnotation>,
        /// Resolved type arguments (explicit or inferred)
        type_args: Vec<TypeId>,
        /// Arguments
        arguments: Vec<Expression>,
    },
    /// `new C<T>(args)`
    New {
        /// Constructor
        callee: Box<Expression>,
        /// Written type arguments
        type_annotations: Vec<TypeAnnotation>,
        /// Resolved type arguments
        type_args: Vec<TypeId>,
        /// Arguments
        arguments: Vec<Expression>,
    },
    /// `o.p`, `o[k]`
    Member {
        /// Object
        object: Box<Expression>,
        /// Property
        property: PropertyKey,
    },
    /// `yield x`, `yield* xs`
    Yield {
        /// Operand
        argument: Option<Box<Expression>>,
        /// `yield*`
        delegate: bool,
    },
    /// `await x`
    Await(Box<Expression>),
    /// `a, b`
    Sequence(Vec<Expression>),
}

/// Array literal element
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElement {
    /// Plain element
    Expression(Expression),
    /// Elision
    Hole,
    /// `...iterable`
    Spread(Expression),
}

/// Object literal member
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectProperty {
    /// `key: value` (shorthand `a` is `a: a`)
    KeyValue {
        /// Key
        key: PropertyKey,
        /// Value
        value: Expression,
    },
    /// `...source`
    Spread(Expression),
}

/// Property name
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    /// `o.name`, `{ name: v }`
    Named(String),
    /// `o[expr]`, `{ [expr]: v }`
    Computed(Box<Expression>),
}

/// Left side of an assignment
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentTarget {
    /// Identifier or member expression
    Simple(Box<Expression>),
    /// Destructuring assignment
    Pattern(Pattern),
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    /// `-`
    Minus,
    /// `+`
    Plus,
    /// `!`
    Not,
    /// `~`
    BitNot,
    /// `typeof`
    Typeof,
    /// `void`
    Void,
}

/// Update operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOperator {
    /// `++`
    Increment,
    /// `--`
    Decrement,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `**`
    Exp,
    /// `==`
    LooseEqual,
    /// `!=`
    LooseNotEqual,
    /// `===`
    StrictEqual,
    /// `!==`
    StrictNotEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,
    /// `>>>`
    UnsignedShiftRight,
}

impl BinaryOperator {
    /// Whether the result is always a boolean
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::LooseEqual
                | BinaryOperator::LooseNotEqual
                | BinaryOperator::StrictEqual
                | BinaryOperator::StrictNotEqual
                | BinaryOperator::Less
                | BinaryOperator::LessEqual
                | BinaryOperator::Greater
                | BinaryOperator::GreaterEqual
        )
    }
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Nullish,
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentOperator {
    /// `=`
    Assign,
    /// `+=` and friends
    Compound(BinaryOperator),
}
