//! Must-liveness of stack allocations delimited by lifetime markers.
//!
//! An alloca with at least one `lifetime_start`/`lifetime_end` marker is
//! alive at a program point only if it is alive on every path from the
//! function entry to that point. Allocas without markers are alive
//! everywhere.
use cranelift_entity::SecondaryMap;
use rustc_hash::FxHashMap;
use stacksafe_ir::{
    inst::{CastOp, InstData, LifetimeOp},
    BlockId, ControlFlowGraph, Function, InstId, ValueId,
};

use crate::bitset::BitSet;

/// Answers liveness queries for the local analysis.
pub trait LivenessOracle {
    /// Returns `true` if `inst` is in a block reachable from the entry.
    fn is_reachable(&self, inst: InstId) -> bool;

    /// Returns `true` if `alloca` is alive right after `inst` on every path.
    fn is_alive_after(&self, alloca: InstId, inst: InstId) -> bool;
}

pub struct StackLifetime<'a> {
    func: &'a Function,

    /// Allocas whose lifetime is delimited by markers.
    interesting: BitSet<InstId>,

    /// marker => (alloca, start or end)
    markers: FxHashMap<InstId, (InstId, LifetimeOp)>,

    reachable: BitSet<BlockId>,

    /// block => allocas alive on block entry
    live_ins: SecondaryMap<BlockId, BitSet<InstId>>,
    /// block => allocas alive on block exit
    live_outs: SecondaryMap<BlockId, BitSet<InstId>>,
}

impl<'a> StackLifetime<'a> {
    pub fn new(func: &'a Function) -> Self {
        let mut cfg = ControlFlowGraph::new();
        cfg.compute(func);
        Self::with_cfg(func, &cfg)
    }

    pub fn with_cfg(func: &'a Function, cfg: &ControlFlowGraph) -> Self {
        let mut lifetime = Self {
            func,
            interesting: BitSet::new(),
            markers: FxHashMap::default(),
            reachable: BitSet::new(),
            live_ins: SecondaryMap::default(),
            live_outs: SecondaryMap::default(),
        };
        lifetime.collect_markers();
        lifetime.compute(cfg);
        lifetime
    }

    /// Returns the number of allocas tracked through markers.
    pub fn num_interesting(&self) -> usize {
        self.interesting.len()
    }

    fn collect_markers(&mut self) {
        let func = self.func;
        for block in func.layout.iter_block() {
            for inst in func.layout.iter_inst(block) {
                let InstData::Lifetime { code, addr, .. } = func.dfg.inst(inst) else {
                    continue;
                };
                if let Some(alloca) = marker_alloca(func, *addr) {
                    self.markers.insert(inst, (alloca, *code));
                    self.interesting.insert(alloca);
                }
            }
        }
    }

    fn compute(&mut self, cfg: &ControlFlowGraph) {
        let post_order: Vec<_> = cfg.post_order().collect();
        for &block in &post_order {
            self.reachable.insert(block);
            // Start from "everything alive", the intersection below only
            // removes allocas.
            self.live_outs[block] = self.interesting.clone();
        }

        let entry = cfg.entry();
        let mut changed = true;
        while changed {
            changed = false;
            for &block in post_order.iter().rev() {
                let live_in = if Some(block) == entry {
                    BitSet::new()
                } else {
                    let mut preds = cfg
                        .preds_of(block)
                        .filter(|pred| self.reachable.contains(**pred));
                    let mut live = preds
                        .next()
                        .map(|pred| self.live_outs[*pred].clone())
                        .unwrap_or_default();
                    for pred in preds {
                        live.intersect_with(&self.live_outs[*pred]);
                    }
                    live
                };

                let mut live_out = live_in.clone();
                self.apply_markers(block, &mut live_out, None);
                self.live_ins[block] = live_in;
                if live_out != self.live_outs[block] {
                    self.live_outs[block] = live_out;
                    changed = true;
                }
            }
        }
    }

    /// Applies the markers of `block` to `live`, stopping after `until`.
    fn apply_markers(&self, block: BlockId, live: &mut BitSet<InstId>, until: Option<InstId>) {
        for inst in self.func.layout.iter_inst(block) {
            if let Some(&(alloca, code)) = self.markers.get(&inst) {
                match code {
                    LifetimeOp::Start => {
                        live.insert(alloca);
                    }
                    LifetimeOp::End => {
                        live.remove(alloca);
                    }
                }
            }
            if Some(inst) == until {
                break;
            }
        }
    }
}

impl LivenessOracle for StackLifetime<'_> {
    fn is_reachable(&self, inst: InstId) -> bool {
        self.func
            .layout
            .inst_block(inst)
            .is_some_and(|block| self.reachable.contains(block))
    }

    fn is_alive_after(&self, alloca: InstId, inst: InstId) -> bool {
        if !self.interesting.contains(alloca) {
            return true;
        }

        let Some(block) = self.func.layout.inst_block(inst) else {
            return false;
        };
        if !self.reachable.contains(block) {
            return false;
        }

        let mut live = self.live_ins[block].clone();
        self.apply_markers(block, &mut live, Some(inst));
        live.contains(alloca)
    }
}

/// Finds the alloca a marker refers to, looking through casts and zero
/// offsets.
fn marker_alloca(func: &Function, addr: ValueId) -> Option<InstId> {
    let mut value = addr;
    loop {
        let inst = func.dfg.value_inst(value)?;
        match func.dfg.inst(inst) {
            InstData::Alloca { .. } => return Some(inst),
            InstData::Cast {
                code: CastOp::Bitcast,
                arg,
                ..
            } => value = *arg,
            InstData::PtrAdd { base, offset }
                if func.dfg.value_imm(*offset).is_some_and(|imm| imm.as_i64() == 0) =>
            {
                value = *base
            }
            _ => return None,
        }
    }
}
