//! Control flow graph of a function.
use std::collections::BTreeSet;

use cranelift_entity::{packed_option::PackedOption, SecondaryMap};

use crate::{BlockId, Function};

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowGraph {
    entry: PackedOption<BlockId>,
    blocks: SecondaryMap<BlockId, BlockNode>,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(&mut self, func: &Function) {
        self.clear();

        self.entry = func.layout.entry_block().into();

        for block in func.layout.iter_block() {
            let Some(terminator) = func.layout.last_inst_of(block) else {
                continue;
            };
            for dest in func.dfg.branch_info(terminator).dests() {
                self.add_edge(block, dest);
            }
        }
    }

    pub fn preds_of(&self, block: BlockId) -> impl Iterator<Item = &BlockId> {
        self.blocks[block].preds.iter()
    }

    pub fn succs_of(&self, block: BlockId) -> impl Iterator<Item = &BlockId> {
        self.blocks[block].succs.iter()
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.entry.expand()
    }

    pub fn post_order(&self) -> CfgPostOrder<'_> {
        CfgPostOrder::new(self)
    }

    pub fn clear(&mut self) {
        self.entry = None.into();
        self.blocks.clear();
    }

    fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[to].preds.insert(from);
        self.blocks[from].succs.insert(to);
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
struct BlockNode {
    preds: BTreeSet<BlockId>,
    succs: BTreeSet<BlockId>,
}

pub struct CfgPostOrder<'a> {
    cfg: &'a ControlFlowGraph,
    node_state: SecondaryMap<BlockId, NodeState>,
    stack: Vec<BlockId>,
}

impl<'a> CfgPostOrder<'a> {
    fn new(cfg: &'a ControlFlowGraph) -> Self {
        let mut stack = Vec::new();

        if let Some(entry) = cfg.entry() {
            stack.push(entry);
        }

        Self {
            cfg,
            node_state: SecondaryMap::default(),
            stack,
        }
    }
}

impl Iterator for CfgPostOrder<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        while let Some(&block) = self.stack.last() {
            if self.node_state[block].is_unvisited() {
                self.node_state[block].set_visited();
                for &succ in self.cfg.succs_of(block) {
                    if self.node_state[succ].is_unvisited() {
                        self.stack.push(succ);
                    }
                }
            } else {
                self.stack.pop();
                if !self.node_state[block].has_finished() {
                    self.node_state[block].set_finished();
                    return Some(block);
                }
            }
        }

        None
    }
}

#[derive(Default, Debug, Clone, Copy)]
struct NodeState(u8);

impl NodeState {
    fn is_unvisited(self) -> bool {
        self.0 == 0
    }

    fn has_finished(self) -> bool {
        self.0 == 2
    }

    fn set_visited(&mut self) {
        self.0 = 1;
    }

    fn set_finished(&mut self) {
        self.0 = 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::test_util::TestModuleBuilder, Type};

    #[test]
    fn diamond_with_dead_block() {
        let mut mb = TestModuleBuilder::new();
        let mut builder = mb.func_builder(&[Type::I1], &Type::Unit);

        let b0 = builder.append_block();
        let b1 = builder.append_block();
        let b2 = builder.append_block();
        let b3 = builder.append_block();
        let dead = builder.append_block();
        let cond = builder.args()[0];

        builder.switch_to_block(b0);
        builder.br(cond, b1, b2);
        builder.switch_to_block(b1);
        builder.jump(b3);
        builder.switch_to_block(b2);
        builder.jump(b3);
        builder.switch_to_block(b3);
        builder.ret(None);
        builder.switch_to_block(dead);
        builder.jump(b3);
        let func_ref = builder.finish();

        let module = mb.build();
        let mut cfg = ControlFlowGraph::new();
        cfg.compute(&module.funcs[func_ref]);

        assert_eq!(cfg.entry(), Some(b0));
        assert_eq!(cfg.preds_of(b3).copied().collect::<Vec<_>>(), vec![b1, b2, dead]);
        assert_eq!(cfg.succs_of(b3).count(), 0);

        let post_order: Vec<_> = cfg.post_order().collect();
        assert_eq!(post_order.len(), 4);
        assert_eq!(post_order.last(), Some(&b0));
        assert!(!post_order.contains(&dead));
    }
}
