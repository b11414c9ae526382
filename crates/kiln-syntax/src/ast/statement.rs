//! Statement and declaration nodes

use super::*;

/// Statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let`/`const`/`var` declaration
    VariableDecl(VariableDecl),
    /// `function f() {}`
    FunctionDecl(Box<Function>),
    /// `class C {}`
    ClassDecl(Box<Class>),
    /// `type T = ...;`
    TypeAlias(TypeAlias),
    /// Expression statement
    Expression(ExpressionStatement),
    /// `return x;`
    Return(ReturnStatement),
    /// `if (c) a else b`
    If(IfStatement),
    /// `while (c) body`
    While(WhileStatement),
    /// `do body while (c)`
    DoWhile(DoWhileStatement),
    /// `for (init; test; update) body`
    For(ForStatement),
    /// `for (x of xs) body`
    ForOf(ForOfStatement),
    /// `for (k in o) body`
    ForIn(ForInStatement),
    /// `break label;`
    Break(JumpStatement),
    /// `continue label;`
    Continue(JumpStatement),
    /// `throw x;`
    Throw(ThrowStatement),
    /// `try {} catch (e) {} finally {}`
    Try(TryStatement),
    /// `switch (x) { case ...: }`
    Switch(SwitchStatement),
    /// `label: stmt`
    Labeled(LabeledStatement),
    /// `{ ... }`
    Block(Block),
    /// `;`
    Empty(Span),
}

impl Statement {
    /// Source span
    pub fn span(&self) -> Span {
        match self {
            Statement::VariableDecl(s) => s.span,
            Statement::FunctionDecl(f) => f.span,
            Statement::ClassDecl(c) => c.span,
            Statement::TypeAlias(a) => a.span,
            Statement::Expression(s) => s.span,
            Statement::Return(s) => s.span,
            Statement::If(s) => s.span,
            Statement::While(s) => s.span,
            Statement::DoWhile(s) => s.span,
            Statement::For(s) => s.span,
            Statement::ForOf(s) => s.span,
            Statement::ForIn(s) => s.span,
            Statement::Break(s) | Statement::Continue(s) => s.span,
            Statement::Throw(s) => s.span,
            Statement::Try(s) => s.span,
            Statement::Switch(s) => s.span,
            Statement::Labeled(s) => s.span,
            Statement::Block(b) => b.span,
            Statement::Empty(span) => *span,
        }
    }
}

/// Declaration keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
}

/// `let a = 1, [b] = xs;`
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    /// Keyword
    pub kind: VariableKind,
    /// Declarators in source order
    pub declarations: Vec<VariableDeclarator>,
    /// Location
    pub span: Span,
}

/// One `pattern = init` of a declaration
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclarator {
    /// Bound pattern
    pub pattern: Pattern,
    /// Initializer
    pub init: Option<Expression>,
    /// Location
    pub span: Span,
}

/// Syntactic flavor of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FunctionKind {
    /// `function` declaration or expression
    Normal,
    /// `(a) => b`
    Arrow,
    /// Class method
    Method,
    /// Class constructor
    Constructor,
}

/// Function body
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    /// `{ ... }`
    Block(Vec<Statement>),
    /// Concise arrow body
    Expression(Box<Expression>),
}

/// Function declaration, expression, arrow, or method
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Node identity
    pub id: NodeId,
    /// Name; for declarations this is the binding occurrence
    pub name: Option<Identifier>,
    /// Flavor
    pub kind: FunctionKind,
    /// `function*`
    pub is_generator: bool,
    /// `async`
    pub is_async: bool,
    /// Generic parameters
    pub type_params: Vec<TypeParam>,
    /// Formal parameters
    pub params: Vec<Param>,
    /// Declared return type
    pub return_annotation: Option<TypeAnnotation>,
    /// Resolved return type
    pub return_ty: TypeId,
    /// Body
    pub body: FunctionBody,
    /// Function scope holding parameters and top-level declarations
    pub scope: ScopeId,
    /// Hidden binding for `this` (absent for arrows, which capture it)
    pub this_binding: Option<BindingId>,
    /// Location
    pub span: Span,
}

impl Function {
    /// Display name
    pub fn display_name(&self) -> &str {
        self.name.as_ref().map(|n| n.name.as_str()).unwrap_or("<anonymous>")
    }

    /// Whether the body can suspend
    pub fn is_suspendable(&self) -> bool {
        self.is_generator || self.is_async
    }

    /// Whether the function declares type parameters
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    /// Whether every parameter is a plain identifier without default
    pub fn has_simple_params(&self) -> bool {
        self.params
            .iter()
            .all(|p| p.default.is_none() && !p.rest && matches!(p.pattern, Pattern::Identifier(_)))
    }
}

/// Formal parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Bound pattern
    pub pattern: Pattern,
    /// Default initializer
    pub default: Option<Expression>,
    /// `...rest`
    pub rest: bool,
    /// Location
    pub span: Span,
}

/// Class declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    /// Node identity
    pub id: NodeId,
    /// Class name binding occurrence
    pub name: Identifier,
    /// Generic parameters
    pub type_params: Vec<TypeParam>,
    /// Explicit constructor
    pub constructor: Option<Function>,
    /// Methods in source order
    pub methods: Vec<ClassMethod>,
    /// Location
    pub span: Span,
}

impl Class {
    /// Whether the class declares type parameters
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

/// Class method
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMethod {
    /// Property name
    pub name: String,
    /// Method function
    pub function: Function,
}

/// Expression statement
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionStatement {
    /// Expression
    pub expression: Expression,
    /// Location
    pub span: Span,
}

/// `return`
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    /// Returned value
    pub value: Option<Expression>,
    /// Location
    pub span: Span,
}

/// `if`
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    /// Condition
    pub test: Expression,
    /// Then branch
    pub consequent: Box<Statement>,
    /// Else branch
    pub alternate: Option<Box<Statement>>,
    /// Location
    pub span: Span,
}

/// `while`
#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    /// Condition
    pub test: Expression,
    /// Body
    pub body: Box<Statement>,
    /// Location
    pub span: Span,
}

/// `do ... while`
#[derive(Debug, Clone, PartialEq)]
pub struct DoWhileStatement {
    /// Body
    pub body: Box<Statement>,
    /// Condition
    pub test: Expression,
    /// Location
    pub span: Span,
}

/// Initializer clause of a `for` loop
#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    /// `for (let i = 0; ...)`
    VariableDecl(VariableDecl),
    /// `for (i = 0; ...)`
    Expression(Expression),
}

/// `for (init; test; update)`
#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    /// Initializer
    pub init: Option<ForInit>,
    /// Condition
    pub test: Option<Expression>,
    /// Update
    pub update: Option<Expression>,
    /// Body
    pub body: Box<Statement>,
    /// Loop head scope (holds `let` declarations of the initializer)
    pub scope: ScopeId,
    /// Location
    pub span: Span,
}

/// Left side of a `for-of` or `for-in` head
#[derive(Debug, Clone, PartialEq)]
pub enum ForEachLeft {
    /// `for (const [a, b] of ...)`
    Declaration {
        /// Keyword
        kind: VariableKind,
        /// Bound pattern
        pattern: Pattern,
    },
    /// `for (x of ...)`
    Pattern(Pattern),
}

/// `for (left of right)`
#[derive(Debug, Clone, PartialEq)]
pub struct ForOfStatement {
    /// Iteration target
    pub left: ForEachLeft,
    /// Iterable
    pub right: Expression,
    /// Body
    pub body: Box<Statement>,
    /// Per-iteration scope of the declared bindings
    pub scope: ScopeId,
    /// Location
    pub span: Span,
}

/// `for (left in right)`
#[derive(Debug, Clone, PartialEq)]
pub struct ForInStatement {
    /// Receives each key
    pub left: ForEachLeft,
    /// Object whose own enumerable keys are visited
    pub right: Expression,
    /// Body
    pub body: Box<Statement>,
    /// Per-iteration scope of the declared bindings
    pub scope: ScopeId,
    /// Location
    pub span: Span,
}

/// `break` / `continue`
#[derive(Debug, Clone, PartialEq)]
pub struct JumpStatement {
    /// Target label
    pub label: Option<String>,
    /// Location
    pub span: Span,
}

/// `throw`
#[derive(Debug, Clone, PartialEq)]
pub struct ThrowStatement {
    /// Thrown value
    pub argument: Expression,
    /// Location
    pub span: Span,
}

/// `try`
#[derive(Debug, Clone, PartialEq)]
pub struct TryStatement {
    /// Protected block
    pub block: Block,
    /// `catch` clause
    pub handler: Option<CatchClause>,
    /// `finally` block
    pub finalizer: Option<Block>,
    /// Location
    pub span: Span,
}

/// `catch (param) { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    /// Exception binding pattern
    pub param: Option<Pattern>,
    /// Handler body
    pub body: Block,
    /// Scope of the parameter
    pub scope: ScopeId,
    /// Location
    pub span: Span,
}

/// `switch`
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStatement {
    /// Scrutinee
    pub discriminant: Expression,
    /// Cases in source order
    pub cases: Vec<SwitchCase>,
    /// Scope shared by all case bodies
    pub scope: ScopeId,
    /// Location
    pub span: Span,
}

/// `case test: consequent` or `default: consequent`
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default`
    pub test: Option<Expression>,
    /// Statements
    pub consequent: Vec<Statement>,
    /// Location
    pub span: Span,
}

/// `label: body`
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledStatement {
    /// Label
    pub label: String,
    /// Labeled statement
    pub body: Box<Statement>,
    /// Location
    pub span: Span,
}

/// `{ ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Statements
    pub body: Vec<Statement>,
    /// Block scope
    pub scope: ScopeId,
    /// Location
    pub span: Span,
}
