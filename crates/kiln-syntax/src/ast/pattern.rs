//! Binding and assignment patterns

use super::*;

/// Destructuring pattern
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// `x` or `x: T`
    Identifier(BindingPattern),
    /// `[a, , b = 1, ...rest]`
    Array(ArrayPattern),
    /// `{ a, b: c = 1, ...rest }`
    Object(ObjectPattern),
    /// Assignment-pattern target that is not an identifier (`o.p`, `o[k]`, or invalid)
    Expression(Box<Expression>),
}

impl Pattern {
    /// Source span
    pub fn span(&self) -> Span {
        match self {
            Pattern::Identifier(b) => b.ident.span,
            Pattern::Array(a) => a.span,
            Pattern::Object(o) => o.span,
            Pattern::Expression(e) => e.span,
        }
    }

    /// Visit every identifier bound by this pattern, left to right
    pub fn for_each_identifier<'a>(&'a self, f: &mut dyn FnMut(&'a Identifier)) {
        match self {
            Pattern::Identifier(b) => f(&b.ident),
            Pattern::Array(array) => {
                for element in array.elements.iter().flatten() {
                    element.pattern.for_each_identifier(f);
                }
                if let Some(rest) = &array.rest {
                    rest.for_each_identifier(f);
                }
            }
            Pattern::Object(object) => {
                for prop in &object.properties {
                    prop.value.for_each_identifier(f);
                }
                if let Some(rest) = &object.rest {
                    rest.for_each_identifier(f);
                }
            }
            Pattern::Expression(_) => {}
        }
    }
}

/// Identifier pattern with optional annotation
#[derive(Debug, Clone, PartialEq)]
pub struct BindingPattern {
    /// Bound identifier
    pub ident: Identifier,
    /// Declared type
    pub annotation: Option<TypeAnnotation>,
}

/// Array pattern
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayPattern {
    /// Positions; `None` is a hole
    pub elements: Vec<Option<PatternElement>>,
    /// Trailing rest element
    pub rest: Option<Box<Pattern>>,
    /// Location
    pub span: Span,
}

/// Array pattern position
#[derive(Debug, Clone, PartialEq)]
pub struct PatternElement {
    /// Nested pattern
    pub pattern: Pattern,
    /// Default initializer
    pub default: Option<Expression>,
    /// Location
    pub span: Span,
}

/// Object pattern
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPattern {
    /// Properties in source order
    pub properties: Vec<ObjectPatternProperty>,
    /// Trailing rest element
    pub rest: Option<Box<Pattern>>,
    /// Location
    pub span: Span,
}

/// `key: value = default`
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPatternProperty {
    /// Property key
    pub key: PropertyKey,
    /// Nested pattern
    pub value: Pattern,
    /// Default initializer
    pub default: Option<Expression>,
    /// Location
    pub span: Span,
}
