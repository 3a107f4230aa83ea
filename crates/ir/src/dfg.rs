//! This module contains IR data flow graph.
use std::collections::BTreeSet;

use cranelift_entity::{entity_impl, packed_option::PackedOption, PrimaryMap, SecondaryMap};
use rustc_hash::FxHashMap;

use crate::{
    inst::{BranchInfo, InstData, InstId},
    Immediate, Type, Value, ValueId,
};

#[derive(Debug, Clone, Default)]
pub struct DataFlowGraph {
    pub blocks: PrimaryMap<BlockId, Block>,
    pub values: PrimaryMap<ValueId, Value>,
    insts: PrimaryMap<InstId, InstData>,
    inst_results: SecondaryMap<InstId, PackedOption<ValueId>>,
    immediates: FxHashMap<Immediate, ValueId>,
    users: SecondaryMap<ValueId, BTreeSet<InstId>>,
}

/// A single use of a value: the user instruction and the operand index of the
/// value in [`InstData::operands`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Use {
    pub inst: InstId,
    pub operand: usize,
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_block(&mut self) -> BlockId {
        self.blocks.push(Block::new())
    }

    pub fn make_value(&mut self, value: Value) -> ValueId {
        self.values.push(value)
    }

    pub fn make_inst(&mut self, inst: InstData) -> InstId {
        let inst_id = self.insts.push(inst);
        self.attach_user(inst_id);
        inst_id
    }

    pub fn make_imm_value<Imm>(&mut self, imm: Imm) -> ValueId
    where
        Imm: Into<Immediate>,
    {
        let imm: Immediate = imm.into();
        if let Some(&value) = self.immediates.get(&imm) {
            return value;
        }

        let ty = imm.ty();
        let value = self.make_value(Value::Immediate { imm, ty });
        self.immediates.insert(imm, value);
        value
    }

    pub fn make_arg_value(&mut self, ty: Type, idx: usize) -> ValueId {
        self.make_value(Value::Arg { ty, idx })
    }

    pub fn attach_result(&mut self, inst_id: InstId, value_id: ValueId) {
        debug_assert!(self.inst_results[inst_id].is_none());
        self.inst_results[inst_id] = value_id.into();
    }

    pub fn inst(&self, inst_id: InstId) -> &InstData {
        &self.insts[inst_id]
    }

    pub fn value(&self, value_id: ValueId) -> &Value {
        &self.values[value_id]
    }

    pub fn value_ty(&self, value_id: ValueId) -> &Type {
        self.values[value_id].ty()
    }

    pub fn value_inst(&self, value_id: ValueId) -> Option<InstId> {
        match self.values[value_id] {
            Value::Inst { inst, .. } => Some(inst),
            _ => None,
        }
    }

    pub fn value_imm(&self, value_id: ValueId) -> Option<Immediate> {
        match self.values[value_id] {
            Value::Immediate { imm, .. } => Some(imm),
            _ => None,
        }
    }

    pub fn inst_result(&self, inst_id: InstId) -> Option<ValueId> {
        self.inst_results[inst_id].expand()
    }

    fn attach_user(&mut self, inst_id: InstId) {
        for value in self.insts[inst_id].operands() {
            self.users[value].insert(inst_id);
        }
    }

    /// Returns the all instructions that use the `value_id`.
    pub fn users(&self, value_id: ValueId) -> impl Iterator<Item = &InstId> {
        self.users[value_id].iter()
    }

    /// Returns the number of instructions that use the `value_id`.
    pub fn users_num(&self, value_id: ValueId) -> usize {
        self.users[value_id].len()
    }

    /// Returns every use of `value_id`. An instruction that takes the value as
    /// several operands yields one use per operand.
    pub fn uses(&self, value_id: ValueId) -> impl Iterator<Item = Use> + '_ {
        self.users(value_id).flat_map(move |&inst| {
            self.insts[inst]
                .operands()
                .into_iter()
                .enumerate()
                .filter(move |(_, op)| *op == value_id)
                .map(move |(operand, _)| Use { inst, operand })
        })
    }

    pub fn branch_info(&self, inst: InstId) -> BranchInfo {
        self.insts[inst].analyze_branch()
    }

    pub fn is_terminator(&self, inst: InstId) -> bool {
        self.insts[inst].is_terminator()
    }
}

/// An opaque reference to [`Block`]
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);
entity_impl!(BlockId, "block");

/// A block data definition.
/// A Block data doesn't hold any information for layout of a program. It is managed by
/// [`super::layout::Layout`].
#[derive(Debug, Clone, Default)]
pub struct Block {}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }
}
