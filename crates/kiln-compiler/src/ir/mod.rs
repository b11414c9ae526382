//! Intermediate Representation (IR)
//!
//! A control-flow graph of basic blocks in SSA form. Every register is defined
//! exactly once; merges go through `Phi` instructions at block entry. Values that
//! must outlive a single activation live in environment records addressed by
//! `(hops, slot)`, and values that must survive an exceptional edge without being
//! registerized live in stack slots.
//!
//! The IR is consumed by a downstream register allocator and bytecode encoder;
//! [`crate::interp`] executes it directly for testing.

pub mod block;
pub mod function;
pub mod instr;
pub mod module;
pub mod pretty;
pub mod value;
pub mod verify;

pub use block::{BasicBlock, BasicBlockId, Terminator};
pub use function::{EnvLayout, EnvSlot, IrFunction, IrFunctionKind, StackSlot};
pub use instr::{BinaryOp, EnvLayoutId, ErrorKind, FunctionId, IrInstr, StackSlotId, UnaryOp};
pub use module::IrModule;
pub use pretty::PrettyPrint;
pub use value::{IrConstant, IrValue, Register, RegisterId};
pub use verify::{verify_function, DominatorTree, VerifyError};
