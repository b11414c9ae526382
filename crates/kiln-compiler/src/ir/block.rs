//! CFG nodes
//!
//! A block is a straight-line run of instructions closed by one terminator.
//! Phis, when present, lead the block. Exceptional edges are not part of the
//! terminator: a block inside a protected region records its handler instead.

use super::instr::{ErrorKind, IrInstr};
use super::value::Register;
use serde::Serialize;

/// Index of a block within its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BasicBlockId(pub u32);

impl BasicBlockId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for BasicBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// One node of the control-flow graph
#[derive(Debug, Clone, Serialize)]
pub struct BasicBlock {
    pub id: BasicBlockId,
    /// Hint printed by the pretty printer (`entry`, `loop.head`, ...)
    pub label: Option<String>,
    /// Body, phis first
    pub instructions: Vec<IrInstr>,
    /// How this block exits; `None` until the builder closes the block
    pub terminator: Option<Terminator>,
    /// Blocks with an edge into this one, including exceptional edges from
    /// blocks this block is the handler of
    pub predecessors: Vec<BasicBlockId>,
    /// Handler entry for the protected region this block belongs to
    pub handler: Option<BasicBlockId>,
}

impl BasicBlock {
    pub fn new(id: BasicBlockId) -> Self {
        Self {
            id,
            label: None,
            instructions: Vec::new(),
            terminator: None,
            predecessors: Vec::new(),
            handler: None,
        }
    }

    pub fn with_label(id: BasicBlockId, label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new(id)
        }
    }

    pub fn add_instr(&mut self, instr: IrInstr) {
        self.instructions.push(instr);
    }

    /// Close the block. A second call replaces the first terminator.
    pub fn set_terminator(&mut self, terminator: Terminator) {
        self.terminator = Some(terminator);
    }

    /// Targets of the terminator; an open block has none
    pub fn successors(&self) -> Vec<BasicBlockId> {
        self.terminator
            .as_ref()
            .map(Terminator::successors)
            .unwrap_or_default()
    }

    /// Terminator targets plus the handler edge
    pub fn all_successors(&self) -> Vec<BasicBlockId> {
        let mut succs = self.successors();
        if let Some(handler) = self.handler {
            if !succs.contains(&handler) {
                succs.push(handler);
            }
        }
        succs
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }

    /// Leading phi instructions
    pub fn phis(&self) -> impl Iterator<Item = &IrInstr> {
        self.instructions
            .iter()
            .take_while(|i| matches!(i, IrInstr::Phi { .. }))
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// The single exit of a block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Terminator {
    Jump(BasicBlockId),

    /// Two-way branch on the truthiness of `cond`
    Branch {
        cond: Register,
        then_block: BasicBlockId,
        else_block: BasicBlockId,
    },

    /// Dense dispatch on a small integer; generator machines use it for
    /// their state and resume-action switches
    Switch {
        value: Register,
        cases: Vec<(i32, BasicBlockId)>,
        default: BasicBlockId,
    },

    /// `None` returns `undefined`
    Return(Option<Register>),

    /// Throw an arbitrary value to the enclosing handler or the caller
    Throw(Register),

    /// Construct and throw a runtime error of the given class
    ThrowError { kind: ErrorKind, message: String },

    /// Control never reaches the end of this block
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BasicBlockId> {
        match self {
            Self::Jump(to) => vec![*to],
            Self::Branch { then_block: t, else_block: e, .. } => vec![*t, *e],
            Self::Switch { cases, default, .. } => cases
                .iter()
                .map(|&(_, to)| to)
                .chain(std::iter::once(*default))
                .collect(),
            Terminator::Return(_)
            | Terminator::Throw(_)
            | Terminator::ThrowError { .. }
            | Terminator::Unreachable => vec![],
        }
    }

    /// Registers read by this terminator
    pub fn operands(&self) -> Vec<Register> {
        match self {
            Terminator::Branch { cond, .. } => vec![*cond],
            Terminator::Switch { value, .. } => vec![*value],
            Terminator::Return(Some(reg)) | Terminator::Throw(reg) => vec![*reg],
            _ => vec![],
        }
    }

    /// Apply `f` to every register operand
    pub fn map_operands(&mut self, f: &mut dyn FnMut(&mut Register)) {
        match self {
            Terminator::Branch { cond, .. } => f(cond),
            Terminator::Switch { value, .. } => f(value),
            Terminator::Return(Some(reg)) | Terminator::Throw(reg) => f(reg),
            _ => {}
        }
    }
}

impl std::fmt::Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jump(to) => write!(f, "jump {}", to),
            Self::Branch { cond, then_block, else_block } => {
                write!(f, "branch {} ? {} : {}", cond, then_block, else_block)
            }
            Self::Switch { value, cases, default } => {
                write!(f, "switch {} [", value)?;
                for (case, to) in cases {
                    write!(f, "{} => {}, ", case, to)?;
                }
                write!(f, "_ => {}]", default)
            }
            Self::Return(Some(value)) => write!(f, "return {}", value),
            Self::Return(None) => f.write_str("return"),
            Self::Throw(value) => write!(f, "throw {}", value),
            Self::ThrowError { kind, message } => {
                write!(f, "throw_error {} \"{}\"", kind, message.escape_default())
            }
            Self::Unreachable => f.write_str("unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::value::RegisterId;
    use kiln_syntax::TypeId;

    fn reg(n: u32) -> Register {
        Register::new(RegisterId::new(n), TypeId::ANY)
    }

    #[test]
    fn test_fresh_block_is_open() {
        let block = BasicBlock::with_label(BasicBlockId(4), "loop.head");
        assert_eq!(block.label.as_deref(), Some("loop.head"));
        assert!(block.is_empty());
        assert!(!block.is_terminated());
        assert!(block.successors().is_empty());
    }

    #[test]
    fn test_successor_order() {
        let branch = Terminator::Branch {
            cond: reg(0),
            then_block: BasicBlockId(2),
            else_block: BasicBlockId(1),
        };
        assert_eq!(branch.successors(), [BasicBlockId(2), BasicBlockId(1)]);

        let switch = Terminator::Switch {
            value: reg(0),
            cases: vec![(0, BasicBlockId(5)), (1, BasicBlockId(6))],
            default: BasicBlockId(5),
        };
        assert_eq!(switch.successors(), [BasicBlockId(5), BasicBlockId(6), BasicBlockId(5)]);

        let err = Terminator::ThrowError {
            kind: ErrorKind::TypeError,
            message: "x".into(),
        };
        assert!(err.successors().is_empty());
    }

    #[test]
    fn test_handler_is_a_successor() {
        let mut block = BasicBlock::new(BasicBlockId(0));
        block.handler = Some(BasicBlockId(3));
        block.set_terminator(Terminator::Jump(BasicBlockId(1)));
        assert_eq!(block.all_successors(), [BasicBlockId(1), BasicBlockId(3)]);

        block.set_terminator(Terminator::Jump(BasicBlockId(3)));
        assert_eq!(block.all_successors(), [BasicBlockId(3)]);
    }

    #[test]
    fn test_terminator_text() {
        let cases = [
            (Terminator::Jump(BasicBlockId(1)), "jump bb1"),
            (Terminator::Return(None), "return"),
            (Terminator::Return(Some(reg(0))), "return r0:0"),
            (Terminator::Throw(reg(3)), "throw r3:0"),
            (
                Terminator::Switch {
                    value: reg(2),
                    cases: vec![(0, BasicBlockId(1))],
                    default: BasicBlockId(2),
                },
                "switch r2:0 [0 => bb1, _ => bb2]",
            ),
            (
                Terminator::ThrowError {
                    kind: ErrorKind::ReferenceError,
                    message: "x".into(),
                },
                "throw_error ReferenceError \"x\"",
            ),
        ];
        for (terminator, text) in cases {
            assert_eq!(terminator.to_string(), text);
        }
    }
}
