//! Structural verification of lowered IR
//!
//! Checks the invariants every function leaving the lowering pipeline must hold:
//! an existing entry block, exactly one terminator per block, edges to existing
//! blocks, predecessor lists that match the edges, one phi source per predecessor,
//! a single definition per register, and every use dominated by its definition.
//! Exceptional edges (a protected block to its handler) take part in dominance.

use super::block::BasicBlockId;
use super::function::IrFunction;
use super::instr::IrInstr;
use super::value::RegisterId;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VerifyError {
    #[error("{function}: entry block {block} does not exist")]
    MissingEntry { function: String, block: BasicBlockId },

    #[error("{function}: block {block} has no terminator")]
    MissingTerminator { function: String, block: BasicBlockId },

    #[error("{function}: block {block} branches to missing block {target}")]
    UnknownSuccessor {
        function: String,
        block: BasicBlockId,
        target: BasicBlockId,
    },

    #[error("{function}: block {block} is unreachable from the entry")]
    UnreachableBlock { function: String, block: BasicBlockId },

    #[error("{function}: predecessors of {block} do not match its incoming edges")]
    PredecessorMismatch { function: String, block: BasicBlockId },

    #[error("{function}: phi {register} in {block} does not have one source per predecessor")]
    PhiSourceMismatch {
        function: String,
        block: BasicBlockId,
        register: RegisterId,
    },

    #[error("{function}: phi {register} in {block} follows a non-phi instruction")]
    MisplacedPhi {
        function: String,
        block: BasicBlockId,
        register: RegisterId,
    },

    #[error("{function}: register {register} is defined more than once")]
    MultipleDefinitions { function: String, register: RegisterId },

    #[error("{function}: register {register} used in {block} is never defined")]
    UndefinedRegister {
        function: String,
        block: BasicBlockId,
        register: RegisterId,
    },

    #[error("{function}: use of {register} in {block} is not dominated by its definition")]
    UseNotDominated {
        function: String,
        block: BasicBlockId,
        register: RegisterId,
    },
}

impl VerifyError {
    pub fn function(&self) -> &str {
        match self {
            VerifyError::MissingEntry { function, .. }
            | VerifyError::MissingTerminator { function, .. }
            | VerifyError::UnknownSuccessor { function, .. }
            | VerifyError::UnreachableBlock { function, .. }
            | VerifyError::PredecessorMismatch { function, .. }
            | VerifyError::PhiSourceMismatch { function, .. }
            | VerifyError::MisplacedPhi { function, .. }
            | VerifyError::MultipleDefinitions { function, .. }
            | VerifyError::UndefinedRegister { function, .. }
            | VerifyError::UseNotDominated { function, .. } => function,
        }
    }
}

/// Immediate dominators, computed with the Cooper-Harvey-Kennedy algorithm over
/// normal and exceptional edges
#[derive(Debug, Clone)]
pub struct DominatorTree {
    idom: FxHashMap<BasicBlockId, BasicBlockId>,
    rpo_index: FxHashMap<BasicBlockId, usize>,
}

impl DominatorTree {
    pub fn compute(func: &IrFunction) -> Self {
        let rpo = reverse_postorder(func);
        let rpo_index: FxHashMap<BasicBlockId, usize> =
            rpo.iter().enumerate().map(|(i, b)| (*b, i)).collect();

        let mut preds: FxHashMap<BasicBlockId, Vec<BasicBlockId>> = FxHashMap::default();
        for block in func.blocks() {
            for succ in block.all_successors() {
                preds.entry(succ).or_default().push(block.id);
            }
        }

        let mut idom: FxHashMap<BasicBlockId, BasicBlockId> = FxHashMap::default();
        idom.insert(func.entry_block, func.entry_block);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom = None;
                for &pred in preds.get(&block).map(Vec::as_slice).unwrap_or(&[]) {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &rpo_index, current, pred),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        Self { idom, rpo_index }
    }

    pub fn is_reachable(&self, block: BasicBlockId) -> bool {
        self.rpo_index.contains_key(&block)
    }

    pub fn idom(&self, block: BasicBlockId) -> Option<BasicBlockId> {
        self.idom.get(&block).copied().filter(|d| *d != block)
    }

    /// Whether `a` dominates `b` (reflexively)
    pub fn dominates(&self, a: BasicBlockId, b: BasicBlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom.get(&current) {
                Some(&dom) if dom != current => current = dom,
                _ => return false,
            }
        }
    }
}

fn intersect(
    idom: &FxHashMap<BasicBlockId, BasicBlockId>,
    rpo_index: &FxHashMap<BasicBlockId, usize>,
    mut b1: BasicBlockId,
    mut b2: BasicBlockId,
) -> BasicBlockId {
    let index = |b: &BasicBlockId| rpo_index.get(b).copied().unwrap_or(usize::MAX);
    while b1 != b2 {
        while index(&b1) > index(&b2) {
            b1 = idom[&b1];
        }
        while index(&b2) > index(&b1) {
            b2 = idom[&b2];
        }
    }
    b1
}

fn reverse_postorder(func: &IrFunction) -> Vec<BasicBlockId> {
    let mut postorder = Vec::with_capacity(func.block_count());
    let mut visited = FxHashSet::default();
    if func.get_block(func.entry_block).is_none() {
        return postorder;
    }
    // Explicit stack of (block, next successor index)
    let mut stack = vec![(func.entry_block, 0usize)];
    visited.insert(func.entry_block);
    while let Some((block, index)) = stack.pop() {
        let succs = func
            .get_block(block)
            .map(|b| b.all_successors())
            .unwrap_or_default();
        if index < succs.len() {
            stack.push((block, index + 1));
            let next = succs[index];
            if func.get_block(next).is_some() && visited.insert(next) {
                stack.push((next, 0));
            }
        } else {
            postorder.push(block);
        }
    }
    postorder.reverse();
    postorder
}

/// Where a register is defined
#[derive(Debug, Clone, Copy)]
enum DefSite {
    /// Function parameter; available everywhere
    Param,
    /// Instruction `index` of `block`
    Instr(BasicBlockId, usize),
}

/// Verify `func`, returning the first violation found
pub fn verify_function(func: &IrFunction) -> Result<(), VerifyError> {
    let name = || func.name.clone();

    if func.get_block(func.entry_block).is_none() {
        return Err(VerifyError::MissingEntry {
            function: name(),
            block: func.entry_block,
        });
    }

    // Terminators and edges
    let mut incoming: FxHashMap<BasicBlockId, FxHashSet<BasicBlockId>> = FxHashMap::default();
    for block in func.blocks() {
        if block.terminator.is_none() {
            return Err(VerifyError::MissingTerminator {
                function: name(),
                block: block.id,
            });
        }
        for succ in block.all_successors() {
            if func.get_block(succ).is_none() {
                return Err(VerifyError::UnknownSuccessor {
                    function: name(),
                    block: block.id,
                    target: succ,
                });
            }
            incoming.entry(succ).or_default().insert(block.id);
        }
    }

    let dom = DominatorTree::compute(func);
    for block in func.blocks() {
        if !dom.is_reachable(block.id) {
            return Err(VerifyError::UnreachableBlock {
                function: name(),
                block: block.id,
            });
        }
        let declared: FxHashSet<BasicBlockId> = block.predecessors.iter().copied().collect();
        let actual = incoming.remove(&block.id).unwrap_or_default();
        if declared != actual || declared.len() != block.predecessors.len() {
            return Err(VerifyError::PredecessorMismatch {
                function: name(),
                block: block.id,
            });
        }
    }

    // Definitions
    let mut defs: FxHashMap<RegisterId, DefSite> = FxHashMap::default();
    let params = func
        .params
        .iter()
        .chain(func.this_param.iter())
        .chain(func.rest_param.iter());
    for param in params {
        if defs.insert(param.id, DefSite::Param).is_some() {
            return Err(VerifyError::MultipleDefinitions {
                function: name(),
                register: param.id,
            });
        }
    }
    for block in func.blocks() {
        for (index, instr) in block.instructions.iter().enumerate() {
            if let Some(dest) = instr.dest() {
                if defs.insert(dest.id, DefSite::Instr(block.id, index)).is_some() {
                    return Err(VerifyError::MultipleDefinitions {
                        function: name(),
                        register: dest.id,
                    });
                }
            }
        }
    }

    let def_of = |block: BasicBlockId, reg: RegisterId| {
        defs.get(&reg).copied().ok_or(VerifyError::UndefinedRegister {
            function: name(),
            block,
            register: reg,
        })
    };
    let not_dominated = |block: BasicBlockId, reg: RegisterId| VerifyError::UseNotDominated {
        function: name(),
        block,
        register: reg,
    };

    // Uses
    for block in func.blocks() {
        let mut in_phis = true;
        for (index, instr) in block.instructions.iter().enumerate() {
            if let IrInstr::Phi { dest, sources } = instr {
                if !in_phis {
                    return Err(VerifyError::MisplacedPhi {
                        function: name(),
                        block: block.id,
                        register: dest.id,
                    });
                }
                let from: FxHashSet<BasicBlockId> = sources.iter().map(|(b, _)| *b).collect();
                let preds: FxHashSet<BasicBlockId> = block.predecessors.iter().copied().collect();
                if from != preds || sources.len() != block.predecessors.len() {
                    return Err(VerifyError::PhiSourceMismatch {
                        function: name(),
                        block: block.id,
                        register: dest.id,
                    });
                }
                for (pred, reg) in sources {
                    let exceptional = func
                        .get_block(*pred)
                        .map(|p| p.handler == Some(block.id) && !p.successors().contains(&block.id))
                        .unwrap_or(false);
                    match def_of(block.id, reg.id)? {
                        DefSite::Param => {}
                        DefSite::Instr(def_block, def_index) => {
                            if !dom.dominates(def_block, *pred) {
                                return Err(not_dominated(block.id, reg.id));
                            }
                            // On an exceptional edge the value must exist before anything
                            // in the protected block can throw
                            if exceptional && def_block == *pred {
                                let throws_first = func
                                    .get_block(def_block)
                                    .map(|b| b.instructions[..def_index].iter().any(IrInstr::may_throw))
                                    .unwrap_or(false);
                                if throws_first {
                                    return Err(not_dominated(block.id, reg.id));
                                }
                            }
                        }
                    }
                }
                continue;
            }
            in_phis = false;
            for reg in instr.operands() {
                check_use(&dom, def_of(block.id, reg.id)?, block.id, index)
                    .map_err(|_| not_dominated(block.id, reg.id))?;
            }
        }
        if let Some(term) = &block.terminator {
            for reg in term.operands() {
                check_use(&dom, def_of(block.id, reg.id)?, block.id, block.instructions.len())
                    .map_err(|_| not_dominated(block.id, reg.id))?;
            }
        }
    }

    Ok(())
}

fn check_use(dom: &DominatorTree, def: DefSite, block: BasicBlockId, index: usize) -> Result<(), ()> {
    match def {
        DefSite::Param => Ok(()),
        DefSite::Instr(def_block, def_index) if def_block == block => {
            if def_index < index {
                Ok(())
            } else {
                Err(())
            }
        }
        DefSite::Instr(def_block, _) => {
            if dom.dominates(def_block, block) {
                Ok(())
            } else {
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::block::{BasicBlock, Terminator};
    use crate::ir::function::IrFunctionKind;
    use crate::ir::instr::FunctionId;
    use crate::ir::value::{IrConstant, IrValue, Register};
    use kiln_syntax::TypeId;

    fn reg(id: u32) -> Register {
        Register::new(RegisterId::new(id), TypeId::ANY)
    }

    fn constant(dest: u32) -> IrInstr {
        IrInstr::Assign {
            dest: reg(dest),
            value: IrValue::Constant(IrConstant::Number(dest as f64)),
        }
    }

    /// bb0 -> bb1 | bb2 -> bb3
    fn diamond() -> IrFunction {
        let mut func = IrFunction::new(FunctionId(0), "f", IrFunctionKind::Normal);
        let mut bb0 = BasicBlock::new(BasicBlockId(0));
        bb0.add_instr(constant(0));
        bb0.set_terminator(Terminator::Branch {
            cond: reg(0),
            then_block: BasicBlockId(1),
            else_block: BasicBlockId(2),
        });
        let mut bb1 = BasicBlock::new(BasicBlockId(1));
        bb1.add_instr(constant(1));
        bb1.predecessors = vec![BasicBlockId(0)];
        bb1.set_terminator(Terminator::Jump(BasicBlockId(3)));
        let mut bb2 = BasicBlock::new(BasicBlockId(2));
        bb2.add_instr(constant(2));
        bb2.predecessors = vec![BasicBlockId(0)];
        bb2.set_terminator(Terminator::Jump(BasicBlockId(3)));
        let mut bb3 = BasicBlock::new(BasicBlockId(3));
        bb3.predecessors = vec![BasicBlockId(1), BasicBlockId(2)];
        bb3.add_instr(IrInstr::Phi {
            dest: reg(3),
            sources: vec![(BasicBlockId(1), reg(1)), (BasicBlockId(2), reg(2))],
        });
        bb3.set_terminator(Terminator::Return(Some(reg(3))));
        for block in [bb0, bb1, bb2, bb3] {
            func.add_block(block);
        }
        func
    }

    #[test]
    fn test_diamond_verifies() {
        let func = diamond();
        assert_eq!(verify_function(&func), Ok(()));
        let dom = DominatorTree::compute(&func);
        assert_eq!(dom.idom(BasicBlockId(3)), Some(BasicBlockId(0)));
        assert!(!dom.dominates(BasicBlockId(1), BasicBlockId(3)));
    }

    #[test]
    fn test_use_not_dominated() {
        let mut func = diamond();
        // Return bb1's value directly from the join
        func.get_block_mut(BasicBlockId(3)).unwrap().terminator = Some(Terminator::Return(Some(reg(1))));
        assert!(matches!(
            verify_function(&func),
            Err(VerifyError::UseNotDominated { register: RegisterId(1), .. })
        ));
    }

    #[test]
    fn test_missing_terminator() {
        let mut func = diamond();
        func.get_block_mut(BasicBlockId(2)).unwrap().terminator = None;
        let err = verify_function(&func).unwrap_err();
        assert!(matches!(err, VerifyError::MissingTerminator { block: BasicBlockId(2), .. }));
        assert_eq!(err.function(), "f");
    }

    #[test]
    fn test_phi_source_mismatch() {
        let mut func = diamond();
        if let Some(IrInstr::Phi { sources, .. }) =
            func.get_block_mut(BasicBlockId(3)).unwrap().instructions.first_mut()
        {
            sources.pop();
        }
        assert!(matches!(verify_function(&func), Err(VerifyError::PhiSourceMismatch { .. })));
    }

    #[test]
    fn test_multiple_definitions() {
        let mut func = diamond();
        func.get_block_mut(BasicBlockId(2)).unwrap().instructions[0] = constant(1);
        assert!(matches!(
            verify_function(&func),
            Err(VerifyError::MultipleDefinitions { register: RegisterId(1), .. })
        ));
    }

    #[test]
    fn test_predecessor_mismatch() {
        let mut func = diamond();
        func.get_block_mut(BasicBlockId(3)).unwrap().predecessors.pop();
        assert!(matches!(verify_function(&func), Err(VerifyError::PredecessorMismatch { .. })));
    }

    #[test]
    fn test_exceptional_edge_requires_value_before_throw() {
        // bb0: r0 = 0; jump bb1
        // bb1 (handler bb2): r1 = r0.x; r2 = 2; jump bb3
        // bb2: r3 = catch; r4 = phi [bb1: r2]; return r4
        let mut func = IrFunction::new(FunctionId(0), "f", IrFunctionKind::Normal);
        let mut bb0 = BasicBlock::new(BasicBlockId(0));
        bb0.add_instr(constant(0));
        bb0.set_terminator(Terminator::Jump(BasicBlockId(1)));
        let mut bb1 = BasicBlock::new(BasicBlockId(1));
        bb1.predecessors = vec![BasicBlockId(0)];
        bb1.handler = Some(BasicBlockId(2));
        bb1.add_instr(IrInstr::LoadField {
            dest: reg(1),
            object: reg(0),
            field: "x".into(),
        });
        bb1.add_instr(constant(2));
        bb1.set_terminator(Terminator::Jump(BasicBlockId(3)));
        let mut bb2 = BasicBlock::new(BasicBlockId(2));
        bb2.predecessors = vec![BasicBlockId(1)];
        bb2.add_instr(IrInstr::Phi {
            dest: reg(4),
            sources: vec![(BasicBlockId(1), reg(2))],
        });
        bb2.add_instr(IrInstr::Catch { dest: reg(3) });
        bb2.set_terminator(Terminator::Return(Some(reg(4))));
        let mut bb3 = BasicBlock::new(BasicBlockId(3));
        bb3.predecessors = vec![BasicBlockId(1)];
        bb3.set_terminator(Terminator::Return(Some(reg(2))));
        for block in [bb0, bb1, bb2, bb3] {
            func.add_block(block);
        }
        assert!(matches!(
            verify_function(&func),
            Err(VerifyError::UseNotDominated { register: RegisterId(2), .. })
        ));

        // Reading the value defined before the protected block is fine
        if let Some(IrInstr::Phi { sources, .. }) =
            func.get_block_mut(BasicBlockId(2)).unwrap().instructions.first_mut()
        {
            sources[0].1 = reg(0);
        }
        assert_eq!(verify_function(&func), Ok(()));
    }
}
