//! Operands
//!
//! Registers are SSA names: each is defined exactly once and carries the
//! static type the checker assigned to the value it holds.

use kiln_syntax::TypeId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegisterId(pub u32);

impl RegisterId {
    pub fn new(n: u32) -> Self {
        Self(n)
    }
}

impl std::fmt::Display for RegisterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// An SSA value name, printed as `r<n>:<type>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Register {
    pub id: RegisterId,
    pub ty: TypeId,
}

impl Register {
    pub fn new(id: RegisterId, ty: TypeId) -> Self {
        Self { id, ty }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.ty.as_u32())
    }
}

/// Right-hand side of an `Assign`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IrValue {
    Register(Register),
    Constant(IrConstant),
}

impl std::fmt::Display for IrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(reg) => write!(f, "{}", reg),
            Self::Constant(constant) => write!(f, "{}", constant),
        }
    }
}

/// Literal operands
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IrConstant {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    /// The uninitialized-binding sentinel; never observable by the program
    Empty,
}

impl IrConstant {
    /// The empty sentinel types as `undefined`
    pub fn type_id(&self) -> TypeId {
        match self {
            IrConstant::Undefined | IrConstant::Empty => TypeId::UNDEFINED,
            IrConstant::Null => TypeId::NULL,
            IrConstant::Boolean(_) => TypeId::BOOLEAN,
            IrConstant::Number(_) => TypeId::NUMBER,
            IrConstant::String(_) => TypeId::STRING,
        }
    }
}

impl std::fmt::Display for IrConstant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Boolean(flag) => write!(f, "{}", flag),
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(text) => write!(f, "\"{}\"", text.escape_default()),
            Self::Empty => f.write_str("<empty>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_display() {
        let reg = Register::new(RegisterId::new(5), TypeId::NUMBER);
        assert_eq!(format!("{}", reg), "r5:1");
    }

    #[test]
    fn test_literal_text() {
        assert_eq!(format!("{}", IrConstant::Number(42.0)), "42");
        assert_eq!(format!("{}", IrConstant::Number(1.5)), "1.5");
        assert_eq!(format!("{}", IrConstant::String("a\"b".into())), "\"a\\\"b\"");
        assert_eq!(format!("{}", IrConstant::Empty), "<empty>");
    }

    #[test]
    fn test_constant_types() {
        assert_eq!(IrConstant::Empty.type_id(), TypeId::UNDEFINED);
        assert_eq!(IrConstant::Boolean(true).type_id(), TypeId::BOOLEAN);
        assert_eq!(IrConstant::String(String::new()).type_id(), TypeId::STRING);
    }
}
