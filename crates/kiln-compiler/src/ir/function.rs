//! IR Functions
//!
//! Functions in the IR contain parameters, stack slots, environment layouts and
//! basic blocks.

use super::block::{BasicBlock, BasicBlockId};
use super::instr::{EnvLayoutId, FunctionId};
use super::value::Register;
use kiln_syntax::{BindingId, InitState, Span};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// What a lowered function is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IrFunctionKind {
    /// Top-level code of a module
    ModuleInit,
    Normal,
    Arrow,
    /// Allocates the frame and returns the generator object
    GeneratorFactory,
    /// Resumable body of a generator, driven by (action, value)
    GeneratorMachine,
    /// Allocates the frame and returns the promise
    AsyncFactory,
    /// Resumable body of an async function
    AsyncMachine,
    ClassConstructor,
    Method,
}

impl IrFunctionKind {
    pub fn is_machine(&self) -> bool {
        matches!(
            self,
            IrFunctionKind::GeneratorMachine | IrFunctionKind::AsyncMachine
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IrFunctionKind::ModuleInit => "module_init",
            IrFunctionKind::Normal => "normal",
            IrFunctionKind::Arrow => "arrow",
            IrFunctionKind::GeneratorFactory => "generator_factory",
            IrFunctionKind::GeneratorMachine => "generator_machine",
            IrFunctionKind::AsyncFactory => "async_factory",
            IrFunctionKind::AsyncMachine => "async_machine",
            IrFunctionKind::ClassConstructor => "class_constructor",
            IrFunctionKind::Method => "method",
        }
    }
}

/// One slot of an environment record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvSlot {
    pub name: String,
    /// Source binding stored here; `None` for hidden slots
    pub binding: Option<BindingId>,
    /// `Uninitialized` slots start out holding the empty sentinel
    pub init: InitState,
}

impl EnvSlot {
    pub fn hidden(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: None,
            init: InitState::Initialized,
        }
    }
}

/// Slot layout of an environment record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnvLayout {
    pub slots: Vec<EnvSlot>,
}

impl EnvLayout {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot index holding `binding`
    pub fn slot_of(&self, binding: BindingId) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| s.binding == Some(binding))
            .map(|i| i as u32)
    }
}

/// A function-local stack slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackSlot {
    pub name: String,
}

/// An IR function
#[derive(Debug, Clone, Serialize)]
pub struct IrFunction {
    /// Position in the owning module
    pub id: FunctionId,
    /// Function name
    pub name: String,
    pub kind: IrFunctionKind,
    /// Parameter registers (with types)
    pub params: Vec<Register>,
    /// Receiver register, for functions that see `this`
    pub this_param: Option<Register>,
    /// Array of the arguments past `params`
    pub rest_param: Option<Register>,
    /// Basic blocks (in order)
    pub blocks: Vec<BasicBlock>,
    /// Entry block ID
    pub entry_block: BasicBlockId,
    pub stack_slots: Vec<StackSlot>,
    /// Environment layouts referenced by `CreateEnvironment`
    pub env_layouts: Vec<EnvLayout>,
    /// Block lookup map for fast access
    #[serde(skip)]
    block_map: FxHashMap<BasicBlockId, usize>,
    /// Source span covering the function definition
    pub source_span: Span,
}

impl IrFunction {
    /// Create a new function
    pub fn new(id: FunctionId, name: impl Into<String>, kind: IrFunctionKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            params: Vec::new(),
            this_param: None,
            rest_param: None,
            blocks: Vec::new(),
            entry_block: BasicBlockId(0),
            stack_slots: Vec::new(),
            env_layouts: Vec::new(),
            block_map: FxHashMap::default(),
            source_span: Span::default(),
        }
    }

    /// Add a basic block and return its ID
    pub fn add_block(&mut self, block: BasicBlock) -> BasicBlockId {
        let id = block.id;
        let index = self.blocks.len();
        self.block_map.insert(id, index);
        self.blocks.push(block);
        id
    }

    /// Get a block by ID
    pub fn get_block(&self, id: BasicBlockId) -> Option<&BasicBlock> {
        self.block_map.get(&id).map(|&idx| &self.blocks[idx])
    }

    /// Get a mutable block by ID
    pub fn get_block_mut(&mut self, id: BasicBlockId) -> Option<&mut BasicBlock> {
        self.block_map
            .get(&id)
            .copied()
            .map(|idx| &mut self.blocks[idx])
    }

    /// Get the entry block
    pub fn entry(&self) -> Option<&BasicBlock> {
        self.get_block(self.entry_block)
    }

    /// Get all block IDs in order
    pub fn block_ids(&self) -> impl Iterator<Item = BasicBlockId> + '_ {
        self.blocks.iter().map(|b| b.id)
    }

    /// Get the number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Get the number of parameters
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Add an environment layout
    pub fn add_env_layout(&mut self, layout: EnvLayout) -> EnvLayoutId {
        let id = EnvLayoutId(self.env_layouts.len() as u32);
        self.env_layouts.push(layout);
        id
    }

    pub fn env_layout(&self, id: EnvLayoutId) -> Option<&EnvLayout> {
        self.env_layouts.get(id.0 as usize)
    }

    /// Iterate over all blocks
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    /// Compute the total number of instructions across all blocks
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    /// Rebuild the block lookup after blocks were removed or reordered
    pub fn reindex(&mut self) {
        self.block_map = self
            .blocks
            .iter()
            .enumerate()
            .map(|(idx, b)| (b.id, idx))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::block::Terminator;
    use crate::ir::value::RegisterId;
    use kiln_syntax::TypeId;

    #[test]
    fn test_function_new() {
        let func = IrFunction::new(FunctionId(0), "test", IrFunctionKind::Normal);
        assert_eq!(func.name, "test");
        assert!(func.params.is_empty());
        assert!(func.blocks.is_empty());
    }

    #[test]
    fn test_function_add_block() {
        let mut func = IrFunction::new(FunctionId(0), "test", IrFunctionKind::Normal);
        let mut block = BasicBlock::new(BasicBlockId(0));
        block.set_terminator(Terminator::Return(None));
        func.add_block(block);

        assert_eq!(func.block_count(), 1);
        assert!(func.get_block(BasicBlockId(0)).is_some());
        assert!(func.get_block(BasicBlockId(1)).is_none());
    }

    #[test]
    fn test_reindex_after_removal() {
        let mut func = IrFunction::new(FunctionId(0), "test", IrFunctionKind::Normal);
        func.add_block(BasicBlock::new(BasicBlockId(0)));
        func.add_block(BasicBlock::new(BasicBlockId(1)));
        func.add_block(BasicBlock::new(BasicBlockId(2)));
        func.blocks.remove(1);
        func.reindex();
        assert_eq!(func.get_block(BasicBlockId(2)).map(|b| b.id), Some(BasicBlockId(2)));
        assert!(func.get_block(BasicBlockId(1)).is_none());
    }

    #[test]
    fn test_env_layout_slot_lookup() {
        let mut func = IrFunction::new(FunctionId(0), "test", IrFunctionKind::Normal);
        func.params.push(Register::new(RegisterId(0), TypeId::NUMBER));
        let layout = EnvLayout {
            slots: vec![
                EnvSlot::hidden("<saved-env>"),
                EnvSlot {
                    name: "x".into(),
                    binding: Some(BindingId(4)),
                    init: InitState::Uninitialized,
                },
            ],
        };
        let id = func.add_env_layout(layout);
        assert_eq!(func.env_layout(id).and_then(|l| l.slot_of(BindingId(4))), Some(1));
        assert_eq!(func.param_count(), 1);
    }
}
