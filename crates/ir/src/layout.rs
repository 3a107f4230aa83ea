//! Block order and instruction order of a function.
//!
//! Functions are only ever built by appending, so the layout keeps plain
//! vectors instead of linked nodes.
use cranelift_entity::{packed_option::PackedOption, SecondaryMap};

use super::{BlockId, InstId};

#[derive(Debug, Clone, Default)]
pub struct Layout {
    blocks: Vec<BlockId>,
    /// block => instructions in order
    block_insts: SecondaryMap<BlockId, Vec<InstId>>,
    /// inst => containing block
    inst_blocks: SecondaryMap<InstId, PackedOption<BlockId>>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }

    pub fn last_inst_of(&self, block: BlockId) -> Option<InstId> {
        self.block_insts[block].last().copied()
    }

    /// Returns the block containing `inst`, or `None` if the instruction is
    /// not in the layout.
    pub fn inst_block(&self, inst: InstId) -> Option<BlockId> {
        self.inst_blocks[inst].expand()
    }

    pub fn is_block_inserted(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    pub fn iter_block(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().copied()
    }

    pub fn iter_inst(&self, block: BlockId) -> impl Iterator<Item = InstId> + '_ {
        self.block_insts[block].iter().copied()
    }

    pub fn append_block(&mut self, block: BlockId) {
        debug_assert!(!self.is_block_inserted(block));
        self.blocks.push(block);
    }

    pub fn append_inst(&mut self, inst: InstId, block: BlockId) {
        debug_assert!(self.is_block_inserted(block));
        debug_assert!(self.inst_block(inst).is_none());
        self.block_insts[block].push(inst);
        self.inst_blocks[inst] = block.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{inst::InstData, DataFlowGraph};

    #[test]
    fn append_blocks_and_insts() {
        let mut layout = Layout::new();
        let mut dfg = DataFlowGraph::new();
        assert_eq!(layout.entry_block(), None);

        let b1 = dfg.make_block();
        let b2 = dfg.make_block();
        let detached = dfg.make_block();
        layout.append_block(b1);
        layout.append_block(b2);
        assert_eq!(layout.entry_block(), Some(b1));
        assert_eq!(layout.iter_block().collect::<Vec<_>>(), vec![b1, b2]);
        assert!(!layout.is_block_inserted(detached));

        let i1 = dfg.make_inst(InstData::Jump { dest: b2 });
        let i2 = dfg.make_inst(InstData::Unreachable);
        let orphan = dfg.make_inst(InstData::Unreachable);
        layout.append_inst(i1, b1);
        layout.append_inst(i2, b2);
        assert_eq!(layout.last_inst_of(b1), Some(i1));
        assert_eq!(layout.iter_inst(b2).collect::<Vec<_>>(), vec![i2]);
        assert_eq!(layout.inst_block(i2), Some(b2));
        assert_eq!(layout.inst_block(orphan), None);
        assert_eq!(layout.last_inst_of(detached), None);
    }
}
