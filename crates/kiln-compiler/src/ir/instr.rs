//! IR Instructions
//!
//! Three-address code instructions for the IR.

use super::block::BasicBlockId;
use super::value::{IrValue, Register};
use crate::generator::ResumeAction;
use serde::Serialize;

/// Function identifier in the IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for FunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Stack slot identifier, local to a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StackSlotId(pub u32);

impl std::fmt::Display for StackSlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Index into a function's environment layout table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EnvLayoutId(pub u32);

impl std::fmt::Display for EnvLayoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "env{}", self.0)
    }
}

/// Runtime error classes raised by lowered code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    TypeError,
    ReferenceError,
    SyntaxError,
    RangeError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::RangeError => "RangeError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IR instruction (Three-Address Code)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IrInstr {
    /// Assignment: dest = value
    Assign { dest: Register, value: IrValue },

    /// SSA merge: dest = value flowing in from the predecessor taken
    Phi {
        dest: Register,
        sources: Vec<(BasicBlockId, Register)>,
    },

    /// Binary operation: dest = left op right
    BinaryOp {
        dest: Register,
        op: BinaryOp,
        left: Register,
        right: Register,
    },

    /// Unary operation: dest = op operand
    UnaryOp {
        dest: Register,
        op: UnaryOp,
        operand: Register,
    },

    /// Read a stack slot
    LoadStack { dest: Register, slot: StackSlotId },

    /// Write a stack slot
    StoreStack { slot: StackSlotId, value: Register },

    /// Read a name not bound by any enclosing scope
    LoadGlobal { dest: Register, name: String },

    /// Write a name not bound by any enclosing scope
    StoreGlobal { name: String, value: Register },

    /// Allocate an environment record; uninitialized slots start empty
    CreateEnvironment {
        dest: Register,
        layout: EnvLayoutId,
        parent: Option<Register>,
    },

    /// Shallow copy of an environment record (same parent, copied slots)
    CopyEnvironment { dest: Register, env: Register },

    /// dest = env.parent^hops[slot]
    LoadEnvSlot {
        dest: Register,
        env: Register,
        hops: u32,
        slot: u32,
    },

    /// env.parent^hops[slot] = value
    StoreEnvSlot {
        env: Register,
        hops: u32,
        slot: u32,
        value: Register,
    },

    /// The environment the running closure was created in
    LoadClosureEnv { dest: Register },

    /// dest = env.parent
    LoadParentEnv { dest: Register, env: Register },

    /// dest = env.parent^hops
    GetEnvironment {
        dest: Register,
        env: Register,
        hops: u32,
    },

    /// Closure over `env` (or over no environment)
    CreateClosure {
        dest: Register,
        func: FunctionId,
        env: Option<Register>,
    },

    /// dest = callee.call(receiver, args)
    Call {
        dest: Register,
        callee: Register,
        receiver: Option<Register>,
        args: Vec<Register>,
    },

    /// dest = new callee(args)
    Construct {
        dest: Register,
        callee: Register,
        args: Vec<Register>,
    },

    /// Class object from a constructor closure and method closures
    CreateClass {
        dest: Register,
        name: String,
        constructor: Option<Register>,
        methods: Vec<(String, Register)>,
    },

    /// Empty ordinary object
    NewObject { dest: Register },

    /// Array from element registers
    NewArray {
        dest: Register,
        elements: Vec<Register>,
    },

    /// array.push(value)
    ArrayPush { array: Register, value: Register },

    /// Append every value produced by iterating `iterable`
    ArraySpread { array: Register, iterable: Register },

    /// dest = object.field
    LoadField {
        dest: Register,
        object: Register,
        field: String,
    },

    /// object.field = value
    StoreField {
        object: Register,
        field: String,
        value: Register,
    },

    /// dest = object[key]
    LoadElement {
        dest: Register,
        object: Register,
        key: Register,
    },

    /// object[key] = value
    StoreElement {
        object: Register,
        key: Register,
        value: Register,
    },

    /// Copy own enumerable properties of `source` except `excluded` keys
    CopyDataProperties {
        target: Register,
        source: Register,
        excluded: Vec<Register>,
    },

    /// Array of the own enumerable keys of `object`, in property order; empty for
    /// values without properties
    OwnKeys { dest: Register, object: Register },

    /// Iterator for `iterable`; TypeError if it is not iterable
    GetIterator { dest: Register, iterable: Register },

    /// Call `iterator.return()` if present
    IteratorClose {
        iterator: Register,
        suppress_errors: bool,
    },

    /// TypeError with `message` unless `value` is an object
    ThrowIfNotObject { value: Register, message: String },

    /// ReferenceError if `value` is the uninitialized sentinel; otherwise dest = value
    ThrowIfEmpty {
        dest: Register,
        value: Register,
        name: String,
    },

    /// First instruction of a handler entry: dest = the thrown value
    Catch { dest: Register },

    /// Generator object driving `machine` over the frame `env`
    CreateGenerator {
        dest: Register,
        machine: FunctionId,
        env: Register,
    },

    /// Drive a generator's machine once
    ResumeGenerator {
        dest: Register,
        generator: Register,
        action: ResumeAction,
        value: Register,
    },

    /// Read the generator's state field as a number
    LoadGeneratorState { dest: Register, generator: Register },

    /// Write the generator's state field
    SetGeneratorState { generator: Register, state: u32 },

    /// `{ value, done }`
    CreateIterResult {
        dest: Register,
        value: Register,
        done: bool,
    },

    /// Start an async machine; dest is its promise
    RunAsync { dest: Register, generator: Register },

    /// `eval(source)` evaluated against `env`
    DirectEval {
        dest: Register,
        source: Register,
        env: Option<Register>,
    },

    /// Function body published by another compilation unit
    LoadExternal {
        dest: Register,
        unit: String,
        function: FunctionId,
    },
}

impl IrInstr {
    /// Get the destination register if this instruction produces a value
    pub fn dest(&self) -> Option<&Register> {
        match self {
            IrInstr::Assign { dest, .. }
            | IrInstr::Phi { dest, .. }
            | IrInstr::BinaryOp { dest, .. }
            | IrInstr::UnaryOp { dest, .. }
            | IrInstr::LoadStack { dest, .. }
            | IrInstr::LoadGlobal { dest, .. }
            | IrInstr::CreateEnvironment { dest, .. }
            | IrInstr::CopyEnvironment { dest, .. }
            | IrInstr::LoadEnvSlot { dest, .. }
            | IrInstr::LoadClosureEnv { dest }
            | IrInstr::LoadParentEnv { dest, .. }
            | IrInstr::GetEnvironment { dest, .. }
            | IrInstr::CreateClosure { dest, .. }
            | IrInstr::Call { dest, .. }
            | IrInstr::Construct { dest, .. }
            | IrInstr::CreateClass { dest, .. }
            | IrInstr::NewObject { dest }
            | IrInstr::NewArray { dest, .. }
            | IrInstr::LoadField { dest, .. }
            | IrInstr::LoadElement { dest, .. }
            | IrInstr::OwnKeys { dest, .. }
            | IrInstr::GetIterator { dest, .. }
            | IrInstr::ThrowIfEmpty { dest, .. }
            | IrInstr::Catch { dest }
            | IrInstr::CreateGenerator { dest, .. }
            | IrInstr::ResumeGenerator { dest, .. }
            | IrInstr::LoadGeneratorState { dest, .. }
            | IrInstr::CreateIterResult { dest, .. }
            | IrInstr::RunAsync { dest, .. }
            | IrInstr::DirectEval { dest, .. }
            | IrInstr::LoadExternal { dest, .. } => Some(dest),
            IrInstr::StoreStack { .. }
            | IrInstr::StoreGlobal { .. }
            | IrInstr::StoreEnvSlot { .. }
            | IrInstr::ArrayPush { .. }
            | IrInstr::ArraySpread { .. }
            | IrInstr::StoreField { .. }
            | IrInstr::StoreElement { .. }
            | IrInstr::CopyDataProperties { .. }
            | IrInstr::IteratorClose { .. }
            | IrInstr::ThrowIfNotObject { .. }
            | IrInstr::SetGeneratorState { .. } => None,
        }
    }

    /// Registers read by this instruction, phi sources included
    pub fn operands(&self) -> Vec<Register> {
        let mut out = Vec::new();
        let mut copy = self.clone();
        copy.map_operands(&mut |reg| out.push(*reg));
        out
    }

    /// Apply `f` to every register operand (not the destination)
    pub fn map_operands(&mut self, f: &mut dyn FnMut(&mut Register)) {
        match self {
            IrInstr::Assign { value, .. } => {
                if let IrValue::Register(reg) = value {
                    f(reg);
                }
            }
            IrInstr::Phi { sources, .. } => sources.iter_mut().for_each(|(_, reg)| f(reg)),
            IrInstr::BinaryOp { left, right, .. } => {
                f(left);
                f(right);
            }
            IrInstr::UnaryOp { operand, .. } => f(operand),
            IrInstr::StoreStack { value, .. } | IrInstr::StoreGlobal { value, .. } => f(value),
            IrInstr::CreateEnvironment { parent, .. } => {
                if let Some(parent) = parent {
                    f(parent);
                }
            }
            IrInstr::CopyEnvironment { env, .. }
            | IrInstr::LoadEnvSlot { env, .. }
            | IrInstr::LoadParentEnv { env, .. }
            | IrInstr::GetEnvironment { env, .. } => f(env),
            IrInstr::StoreEnvSlot { env, value, .. } => {
                f(env);
                f(value);
            }
            IrInstr::CreateClosure { env, .. } => {
                if let Some(env) = env {
                    f(env);
                }
            }
            IrInstr::DirectEval { source, env, .. } => {
                f(source);
                if let Some(env) = env {
                    f(env);
                }
            }
            IrInstr::Call {
                callee,
                receiver,
                args,
                ..
            } => {
                f(callee);
                if let Some(receiver) = receiver {
                    f(receiver);
                }
                args.iter_mut().for_each(|a| f(a));
            }
            IrInstr::Construct { callee, args, .. } => {
                f(callee);
                args.iter_mut().for_each(|a| f(a));
            }
            IrInstr::CreateClass {
                constructor,
                methods,
                ..
            } => {
                if let Some(ctor) = constructor {
                    f(ctor);
                }
                methods.iter_mut().for_each(|(_, m)| f(m));
            }
            IrInstr::NewArray { elements, .. } => elements.iter_mut().for_each(|e| f(e)),
            IrInstr::ArrayPush { array, value } => {
                f(array);
                f(value);
            }
            IrInstr::ArraySpread { array, iterable } => {
                f(array);
                f(iterable);
            }
            IrInstr::LoadField { object, .. } => f(object),
            IrInstr::StoreField { object, value, .. } => {
                f(object);
                f(value);
            }
            IrInstr::LoadElement { object, key, .. } => {
                f(object);
                f(key);
            }
            IrInstr::StoreElement { object, key, value } => {
                f(object);
                f(key);
                f(value);
            }
            IrInstr::CopyDataProperties {
                target,
                source,
                excluded,
            } => {
                f(target);
                f(source);
                excluded.iter_mut().for_each(|e| f(e));
            }
            IrInstr::OwnKeys { object, .. } => f(object),
            IrInstr::GetIterator { iterable, .. } => f(iterable),
            IrInstr::IteratorClose { iterator, .. } => f(iterator),
            IrInstr::ThrowIfNotObject { value, .. } | IrInstr::ThrowIfEmpty { value, .. } => f(value),
            IrInstr::CreateGenerator { env, .. } => f(env),
            IrInstr::ResumeGenerator {
                generator, value, ..
            } => {
                f(generator);
                f(value);
            }
            IrInstr::LoadGeneratorState { generator, .. }
            | IrInstr::SetGeneratorState { generator, .. }
            | IrInstr::RunAsync { generator, .. } => f(generator),
            IrInstr::CreateIterResult { value, .. } => f(value),
            IrInstr::LoadStack { .. }
            | IrInstr::LoadGlobal { .. }
            | IrInstr::LoadClosureEnv { .. }
            | IrInstr::NewObject { .. }
            | IrInstr::Catch { .. }
            | IrInstr::LoadExternal { .. } => {}
        }
    }

    /// Whether executing this instruction can raise an exception
    pub fn may_throw(&self) -> bool {
        matches!(
            self,
            IrInstr::BinaryOp { .. }
                | IrInstr::UnaryOp { .. }
                | IrInstr::LoadGlobal { .. }
                | IrInstr::StoreGlobal { .. }
                | IrInstr::Call { .. }
                | IrInstr::Construct { .. }
                | IrInstr::LoadField { .. }
                | IrInstr::StoreField { .. }
                | IrInstr::LoadElement { .. }
                | IrInstr::StoreElement { .. }
                | IrInstr::ArraySpread { .. }
                | IrInstr::CopyDataProperties { .. }
                | IrInstr::GetIterator { .. }
                | IrInstr::IteratorClose { .. }
                | IrInstr::ThrowIfNotObject { .. }
                | IrInstr::ThrowIfEmpty { .. }
                | IrInstr::ResumeGenerator { .. }
                | IrInstr::DirectEval { .. }
        )
    }

    /// Check if this instruction has side effects
    pub fn has_side_effects(&self) -> bool {
        self.dest().is_none() || self.may_throw()
    }
}

/// Binary operators
///
/// The `Number*` variants are selected when both operands are statically numbers;
/// `Concat` when either is statically a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    Add,
    NumberAdd,
    Concat,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    LooseEqual,
    LooseNotEqual,
    StrictEqual,
    StrictNotEqual,
    Less,
    NumberLess,
    LessEqual,
    NumberLessEqual,
    Greater,
    NumberGreater,
    GreaterEqual,
    NumberGreaterEqual,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
}

impl BinaryOp {
    /// Check if this is an arithmetic operator
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::NumberAdd
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::Mod
                | BinaryOp::Exp
        )
    }

    /// Check if this is a comparison operator
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::LooseEqual
                | BinaryOp::LooseNotEqual
                | BinaryOp::StrictEqual
                | BinaryOp::StrictNotEqual
                | BinaryOp::Less
                | BinaryOp::NumberLess
                | BinaryOp::LessEqual
                | BinaryOp::NumberLessEqual
                | BinaryOp::Greater
                | BinaryOp::NumberGreater
                | BinaryOp::GreaterEqual
                | BinaryOp::NumberGreaterEqual
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::NumberAdd => "number_add",
            BinaryOp::Concat => "concat",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Exp => "exp",
            BinaryOp::LooseEqual => "loose_eq",
            BinaryOp::LooseNotEqual => "loose_ne",
            BinaryOp::StrictEqual => "strict_eq",
            BinaryOp::StrictNotEqual => "strict_ne",
            BinaryOp::Less => "less",
            BinaryOp::NumberLess => "number_less",
            BinaryOp::LessEqual => "less_eq",
            BinaryOp::NumberLessEqual => "number_less_eq",
            BinaryOp::Greater => "greater",
            BinaryOp::NumberGreater => "number_greater",
            BinaryOp::GreaterEqual => "greater_eq",
            BinaryOp::NumberGreaterEqual => "number_greater_eq",
            BinaryOp::BitAnd => "bit_and",
            BinaryOp::BitOr => "bit_or",
            BinaryOp::BitXor => "bit_xor",
            BinaryOp::ShiftLeft => "shl",
            BinaryOp::ShiftRight => "shr",
            BinaryOp::UnsignedShiftRight => "ushr",
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOp {
    Neg,
    ToNumber,
    Not,
    BitNot,
    Typeof,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnaryOp::Neg => "neg",
            UnaryOp::ToNumber => "to_number",
            UnaryOp::Not => "not",
            UnaryOp::BitNot => "bit_not",
            UnaryOp::Typeof => "typeof",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::value::RegisterId;
    use kiln_syntax::TypeId;

    fn reg(id: u32) -> Register {
        Register::new(RegisterId::new(id), TypeId::ANY)
    }

    #[test]
    fn test_dest() {
        let instr = IrInstr::LoadField {
            dest: reg(1),
            object: reg(0),
            field: "x".into(),
        };
        assert_eq!(instr.dest(), Some(&reg(1)));

        let store = IrInstr::StoreField {
            object: reg(0),
            field: "x".into(),
            value: reg(1),
        };
        assert_eq!(store.dest(), None);
    }

    #[test]
    fn test_operands_cover_optional_registers() {
        let call = IrInstr::Call {
            dest: reg(9),
            callee: reg(0),
            receiver: Some(reg(1)),
            args: vec![reg(2), reg(3)],
        };
        assert_eq!(call.operands(), vec![reg(0), reg(1), reg(2), reg(3)]);

        let eval = IrInstr::DirectEval {
            dest: reg(5),
            source: reg(3),
            env: Some(reg(4)),
        };
        assert_eq!(eval.operands(), vec![reg(3), reg(4)]);

        let closure = IrInstr::CreateClosure {
            dest: reg(5),
            func: FunctionId(1),
            env: None,
        };
        assert!(closure.operands().is_empty());
    }

    #[test]
    fn test_map_operands_rewrites() {
        let mut instr = IrInstr::BinaryOp {
            dest: reg(2),
            op: BinaryOp::NumberAdd,
            left: reg(0),
            right: reg(1),
        };
        instr.map_operands(&mut |r| {
            if r.id == RegisterId(0) {
                *r = reg(7);
            }
        });
        assert_eq!(instr.operands(), vec![reg(7), reg(1)]);
    }

    #[test]
    fn test_op_classes() {
        assert!(BinaryOp::NumberAdd.is_arithmetic());
        assert!(BinaryOp::NumberLess.is_comparison());
        assert!(!BinaryOp::Concat.is_comparison());
        assert_eq!(BinaryOp::Concat.to_string(), "concat");
        assert_eq!(ErrorKind::ReferenceError.to_string(), "ReferenceError");
    }
}
