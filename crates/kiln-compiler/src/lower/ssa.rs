//! SSA Construction
//!
//! On-the-fly SSA construction over block-sealed CFGs (Braun et al., "Simple and
//! Efficient Construction of Static Single Assignment Form", CC 2013). Variables are
//! written per block; a read in a block without a local definition walks the
//! predecessors, placing phis at merges. A block is *sealed* once all of its
//! predecessors are known; reads in unsealed blocks create incomplete phis that are
//! completed at sealing time.
//!
//! Trivial phis (all operands equal, ignoring self-references) are removed in a
//! post-pass, after unreachable blocks have been dropped.

use crate::error::{CompileError, CompileResult};
use crate::ir::{BasicBlockId, IrConstant, IrFunction, IrInstr, IrValue, Register, RegisterId};
use kiln_syntax::{BindingId, TypeId};
use rustc_hash::{FxHashMap, FxHashSet};

/// A variable renamed by SSA construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SsaVar {
    /// A register-stored source binding
    Binding(BindingId),
    /// The environment record at depth `d`; depth 0 is the closure's own environment
    Env(u32),
    /// A lowering-internal temporary
    Temp(u32),
}

/// Per-function SSA state
#[derive(Debug, Default)]
pub struct SsaBuilder {
    defs: FxHashMap<(SsaVar, BasicBlockId), Register>,
    sealed: FxHashSet<BasicBlockId>,
    incomplete: FxHashMap<BasicBlockId, Vec<(SsaVar, Register)>>,
    next_register: u32,
    next_temp: u32,
}

impl SsaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh register
    pub fn new_register(&mut self, ty: TypeId) -> Register {
        let id = RegisterId::new(self.next_register);
        self.next_register += 1;
        Register::new(id, ty)
    }

    /// Allocate a fresh temporary variable
    pub fn new_temp(&mut self) -> SsaVar {
        let temp = SsaVar::Temp(self.next_temp);
        self.next_temp += 1;
        temp
    }

    pub fn write_variable(&mut self, var: SsaVar, block: BasicBlockId, value: Register) {
        self.defs.insert((var, block), value);
    }

    /// Current value of `var` at the end of `block`
    pub fn read_variable(&mut self, func: &mut IrFunction, var: SsaVar, block: BasicBlockId, ty: TypeId) -> Register {
        if let Some(value) = self.defs.get(&(var, block)) {
            return *value;
        }
        self.read_variable_recursive(func, var, block, ty)
    }

    fn read_variable_recursive(
        &mut self,
        func: &mut IrFunction,
        var: SsaVar,
        block: BasicBlockId,
        ty: TypeId,
    ) -> Register {
        let value = if !self.sealed.contains(&block) {
            let phi = self.new_register(ty);
            insert_phi(func, block, phi);
            self.incomplete.entry(block).or_default().push((var, phi));
            phi
        } else {
            let preds = predecessors(func, block);
            match preds.as_slice() {
                [] => {
                    // Nothing reaches this block with a definition
                    let value = self.new_register(ty);
                    insert_after_phis(
                        func,
                        block,
                        IrInstr::Assign {
                            dest: value,
                            value: IrValue::Constant(IrConstant::Undefined),
                        },
                    );
                    value
                }
                [pred] => self.read_variable(func, var, *pred, ty),
                _ => {
                    let phi = self.new_register(ty);
                    insert_phi(func, block, phi);
                    // Break cycles before visiting the predecessors
                    self.write_variable(var, block, phi);
                    self.add_phi_operands(func, var, block, phi);
                    phi
                }
            }
        };
        self.write_variable(var, block, value);
        value
    }

    fn add_phi_operands(&mut self, func: &mut IrFunction, var: SsaVar, block: BasicBlockId, phi: Register) {
        for pred in predecessors(func, block) {
            let value = self.read_variable(func, var, pred, phi.ty);
            if let Some(b) = func.get_block_mut(block) {
                for instr in b.instructions.iter_mut() {
                    if let IrInstr::Phi { dest, sources } = instr {
                        if dest.id == phi.id {
                            sources.push((pred, value));
                            break;
                        }
                    }
                }
            }
        }
    }

    pub fn is_sealed(&self, block: BasicBlockId) -> bool {
        self.sealed.contains(&block)
    }

    /// Declare that every predecessor of `block` is known
    pub fn seal_block(&mut self, func: &mut IrFunction, block: BasicBlockId) {
        if self.sealed.contains(&block) {
            return;
        }
        if let Some(pending) = self.incomplete.remove(&block) {
            for (var, phi) in pending {
                self.add_phi_operands(func, var, block, phi);
            }
        }
        self.sealed.insert(block);
    }

    /// Record the edge `from -> to`; edges are deduplicated
    pub fn add_edge(&mut self, func: &mut IrFunction, from: BasicBlockId, to: BasicBlockId) -> CompileResult<()> {
        let already = func
            .get_block(to)
            .map(|b| b.predecessors.contains(&from))
            .unwrap_or(false);
        if already {
            return Ok(());
        }
        if self.sealed.contains(&to) {
            return Err(CompileError::SealedBlockEdge {
                function: func.name.clone(),
                from,
                to,
            });
        }
        match func.get_block_mut(to) {
            Some(block) => {
                block.predecessors.push(from);
                Ok(())
            }
            None => Err(CompileError::InternalError {
                function: func.name.clone(),
                block: from,
                message: format!("edge to unknown block {}", to),
            }),
        }
    }

    /// Finish construction: every block must be sealed; unreachable blocks are dropped
    /// and trivial phis folded away
    pub fn finish(&mut self, func: &mut IrFunction) -> CompileResult<()> {
        if let Some(block) = func.blocks.iter().map(|b| b.id).find(|b| !self.sealed.contains(b)) {
            return Err(CompileError::UnsealedBlock {
                function: func.name.clone(),
                block,
            });
        }
        remove_unreachable_blocks(func);
        remove_trivial_phis(func);
        Ok(())
    }
}

fn predecessors(func: &IrFunction, block: BasicBlockId) -> Vec<BasicBlockId> {
    func.get_block(block)
        .map(|b| b.predecessors.clone())
        .unwrap_or_default()
}

fn leading_phis(instrs: &[IrInstr]) -> usize {
    instrs
        .iter()
        .take_while(|i| matches!(i, IrInstr::Phi { .. }))
        .count()
}

fn insert_phi(func: &mut IrFunction, block: BasicBlockId, dest: Register) {
    insert_after_phis(
        func,
        block,
        IrInstr::Phi {
            dest,
            sources: Vec::new(),
        },
    );
}

fn insert_after_phis(func: &mut IrFunction, block: BasicBlockId, instr: IrInstr) {
    if let Some(b) = func.get_block_mut(block) {
        let at = leading_phis(&b.instructions);
        b.instructions.insert(at, instr);
    }
}

fn remove_unreachable_blocks(func: &mut IrFunction) {
    let mut reachable = FxHashSet::default();
    let mut stack = vec![func.entry_block];
    while let Some(block) = stack.pop() {
        if !reachable.insert(block) {
            continue;
        }
        if let Some(b) = func.get_block(block) {
            stack.extend(b.all_successors());
        }
    }

    let before = func.blocks.len();
    func.blocks.retain(|b| reachable.contains(&b.id));
    if func.blocks.len() != before {
        log::trace!(
            "[ssa] {}: removed {} unreachable blocks",
            func.name,
            before - func.blocks.len()
        );
    }
    func.reindex();

    for block in func.blocks.iter_mut() {
        block.predecessors.retain(|p| reachable.contains(p));
        for instr in block.instructions.iter_mut() {
            if let IrInstr::Phi { sources, .. } = instr {
                sources.retain(|(p, _)| reachable.contains(p));
            }
        }
    }
}

fn resolve(replacements: &FxHashMap<RegisterId, Register>, reg: Register) -> Register {
    let mut current = reg;
    let mut steps = 0;
    while let Some(next) = replacements.get(&current.id) {
        current = *next;
        steps += 1;
        if steps > replacements.len() {
            break;
        }
    }
    current
}

/// Fold phis whose operands (ignoring self-references) are all one value, until none
/// remain; a phi with no other operand becomes `undefined`
fn remove_trivial_phis(func: &mut IrFunction) {
    let mut replacements: FxHashMap<RegisterId, Register> = FxHashMap::default();

    loop {
        let mut changed = false;
        for block in func.blocks.iter_mut() {
            let phi_count = leading_phis(&block.instructions);
            let mut kept = Vec::with_capacity(phi_count);
            let mut undefined = Vec::new();
            for instr in block.instructions.drain(..phi_count) {
                let (dest, sources) = match &instr {
                    IrInstr::Phi { dest, sources } => (*dest, sources),
                    _ => {
                        kept.push(instr);
                        continue;
                    }
                };
                let mut same: Option<Register> = None;
                let mut trivial = true;
                for (_, source) in sources {
                    let source = resolve(&replacements, *source);
                    if source.id == dest.id || same.map(|s| s.id) == Some(source.id) {
                        continue;
                    }
                    if same.is_some() {
                        trivial = false;
                        break;
                    }
                    same = Some(source);
                }
                if !trivial {
                    kept.push(instr);
                    continue;
                }
                changed = true;
                match same {
                    Some(value) => {
                        replacements.insert(dest.id, value);
                    }
                    None => undefined.push(dest),
                }
            }
            let tail: Vec<IrInstr> = block.instructions.drain(..).collect();
            block.instructions = kept;
            for dest in undefined {
                block.instructions.push(IrInstr::Assign {
                    dest,
                    value: IrValue::Constant(IrConstant::Undefined),
                });
            }
            block.instructions.extend(tail);
        }
        if !changed {
            break;
        }
    }

    if replacements.is_empty() {
        return;
    }
    let mut rewrite = |reg: &mut Register| {
        *reg = resolve(&replacements, *reg);
    };
    for block in func.blocks.iter_mut() {
        for instr in block.instructions.iter_mut() {
            instr.map_operands(&mut rewrite);
        }
        if let Some(term) = block.terminator.as_mut() {
            term.map_operands(&mut rewrite);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{verify_function, BasicBlock, FunctionId, IrFunctionKind, Terminator};

    struct Fixture {
        func: IrFunction,
        ssa: SsaBuilder,
    }

    impl Fixture {
        fn new(blocks: u32) -> Self {
            let mut func = IrFunction::new(FunctionId(0), "f", IrFunctionKind::Normal);
            for i in 0..blocks {
                func.add_block(BasicBlock::new(BasicBlockId(i)));
            }
            Self {
                func,
                ssa: SsaBuilder::new(),
            }
        }

        fn constant(&mut self, block: u32, n: f64) -> Register {
            let dest = self.ssa.new_register(TypeId::NUMBER);
            self.func.get_block_mut(BasicBlockId(block)).unwrap().add_instr(IrInstr::Assign {
                dest,
                value: IrValue::Constant(IrConstant::Number(n)),
            });
            dest
        }

        fn edge(&mut self, from: u32, to: u32) {
            self.ssa
                .add_edge(&mut self.func, BasicBlockId(from), BasicBlockId(to))
                .unwrap();
        }

        fn terminate(&mut self, block: u32, term: Terminator) {
            self.func.get_block_mut(BasicBlockId(block)).unwrap().set_terminator(term);
        }

        fn seal(&mut self, block: u32) {
            self.ssa.seal_block(&mut self.func, BasicBlockId(block));
        }

        fn read(&mut self, var: SsaVar, block: u32) -> Register {
            self.ssa
                .read_variable(&mut self.func, var, BasicBlockId(block), TypeId::NUMBER)
        }

        fn phis(&self, block: u32) -> usize {
            self.func.get_block(BasicBlockId(block)).unwrap().phis().count()
        }
    }

    const X: SsaVar = SsaVar::Binding(BindingId(0));

    #[test]
    fn test_diamond_places_phi() {
        // bb0 -> bb1 | bb2 -> bb3
        let mut fx = Fixture::new(4);
        fx.seal(0);
        let cond = fx.constant(0, 1.0);
        fx.terminate(
            0,
            Terminator::Branch {
                cond,
                then_block: BasicBlockId(1),
                else_block: BasicBlockId(2),
            },
        );
        fx.edge(0, 1);
        fx.edge(0, 2);
        fx.seal(1);
        fx.seal(2);
        let one = fx.constant(1, 1.0);
        fx.ssa.write_variable(X, BasicBlockId(1), one);
        let two = fx.constant(2, 2.0);
        fx.ssa.write_variable(X, BasicBlockId(2), two);
        fx.terminate(1, Terminator::Jump(BasicBlockId(3)));
        fx.terminate(2, Terminator::Jump(BasicBlockId(3)));
        fx.edge(1, 3);
        fx.edge(2, 3);
        fx.seal(3);

        let merged = fx.read(X, 3);
        fx.terminate(3, Terminator::Return(Some(merged)));
        fx.ssa.finish(&mut fx.func).unwrap();

        assert_eq!(fx.phis(3), 1);
        assert_eq!(verify_function(&fx.func), Ok(()));
    }

    #[test]
    fn test_loop_invariant_phi_is_removed() {
        // bb0 -> bb1 (header) -> bb2 (body) -> bb1 ; bb1 -> bb3
        let mut fx = Fixture::new(4);
        fx.seal(0);
        let init = fx.constant(0, 0.0);
        fx.ssa.write_variable(X, BasicBlockId(0), init);
        fx.terminate(0, Terminator::Jump(BasicBlockId(1)));
        fx.edge(0, 1);

        // Header read before the back edge exists
        let cond = fx.read(X, 1);
        fx.terminate(
            1,
            Terminator::Branch {
                cond,
                then_block: BasicBlockId(2),
                else_block: BasicBlockId(3),
            },
        );
        fx.edge(1, 2);
        fx.edge(1, 3);
        fx.seal(2);
        fx.terminate(2, Terminator::Jump(BasicBlockId(1)));
        fx.edge(2, 1);
        fx.seal(1);
        fx.seal(3);
        let out = fx.read(X, 3);
        fx.terminate(3, Terminator::Return(Some(out)));

        assert_eq!(fx.phis(1), 1);
        fx.ssa.finish(&mut fx.func).unwrap();
        assert_eq!(fx.phis(1), 0);
        assert_eq!(
            fx.func.get_block(BasicBlockId(3)).unwrap().terminator,
            Some(Terminator::Return(Some(init)))
        );
        assert_eq!(verify_function(&fx.func), Ok(()));
    }

    #[test]
    fn test_loop_carried_phi_survives() {
        let mut fx = Fixture::new(3);
        fx.seal(0);
        let init = fx.constant(0, 0.0);
        fx.ssa.write_variable(X, BasicBlockId(0), init);
        fx.terminate(0, Terminator::Jump(BasicBlockId(1)));
        fx.edge(0, 1);

        let current = fx.read(X, 1);
        let next = fx.ssa.new_register(TypeId::NUMBER);
        fx.func.get_block_mut(BasicBlockId(1)).unwrap().add_instr(IrInstr::BinaryOp {
            dest: next,
            op: crate::ir::BinaryOp::NumberAdd,
            left: current,
            right: current,
        });
        fx.ssa.write_variable(X, BasicBlockId(1), next);
        fx.terminate(
            1,
            Terminator::Branch {
                cond: next,
                then_block: BasicBlockId(1),
                else_block: BasicBlockId(2),
            },
        );
        fx.edge(1, 1);
        fx.edge(1, 2);
        fx.seal(1);
        fx.seal(2);
        let out = fx.read(X, 2);
        fx.terminate(2, Terminator::Return(Some(out)));
        fx.ssa.finish(&mut fx.func).unwrap();

        assert_eq!(fx.phis(1), 1);
        assert_eq!(verify_function(&fx.func), Ok(()));
    }

    #[test]
    fn test_edge_into_sealed_block_is_rejected() {
        let mut fx = Fixture::new(2);
        fx.seal(0);
        fx.seal(1);
        let err = fx
            .ssa
            .add_edge(&mut fx.func, BasicBlockId(0), BasicBlockId(1))
            .unwrap_err();
        assert!(matches!(err, CompileError::SealedBlockEdge { .. }));
    }

    #[test]
    fn test_unsealed_block_fails_finish() {
        let mut fx = Fixture::new(2);
        fx.seal(0);
        fx.terminate(0, Terminator::Return(None));
        fx.terminate(1, Terminator::Return(None));
        assert!(matches!(
            fx.ssa.finish(&mut fx.func),
            Err(CompileError::UnsealedBlock { block: BasicBlockId(1), .. })
        ));
    }

    #[test]
    fn test_unreachable_blocks_are_removed() {
        let mut fx = Fixture::new(3);
        fx.seal(0);
        fx.terminate(0, Terminator::Jump(BasicBlockId(2)));
        fx.edge(0, 2);
        fx.seal(1);
        fx.terminate(1, Terminator::Jump(BasicBlockId(2)));
        fx.edge(1, 2);
        fx.seal(2);
        fx.terminate(2, Terminator::Return(None));
        fx.ssa.finish(&mut fx.func).unwrap();

        assert!(fx.func.get_block(BasicBlockId(1)).is_none());
        assert_eq!(
            fx.func.get_block(BasicBlockId(2)).unwrap().predecessors,
            vec![BasicBlockId(0)]
        );
        assert_eq!(verify_function(&fx.func), Ok(()));
    }
}
