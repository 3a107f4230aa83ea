//! This module contains IR instructions definitions.
use std::fmt;

use cranelift_entity::entity_impl;
use smallvec::SmallVec;

use crate::{module::GlobalRef, BlockId, Type, ValueId};

/// An opaque reference to [`InstData`]
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);
entity_impl!(InstId, "inst");

/// An instruction data definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstData {
    /// Stack allocation of `count` (1 if absent) objects of `ty`.
    Alloca { ty: Type, count: Option<ValueId> },

    /// Load a value from memory.
    Load { addr: ValueId, ty: Type },

    /// Store a value to memory.
    Store { addr: ValueId, value: ValueId },

    /// Pointer arithmetic in bytes.
    PtrAdd { base: ValueId, offset: ValueId },

    /// Pointer arithmetic in units of `elem_ty`.
    ElemPtr {
        base: ValueId,
        index: ValueId,
        elem_ty: Type,
    },

    /// Cast operations.
    Cast {
        code: CastOp,
        arg: ValueId,
        ty: Type,
    },

    /// Binary instructions.
    Binary { code: BinaryOp, args: [ValueId; 2] },

    /// Select `args[1]` if `args[0]` is true, otherwise `args[2]`.
    Select { args: [ValueId; 3] },

    /// Phi function.
    Phi {
        values: SmallVec<[ValueId; 8]>,
        blocks: SmallVec<[BlockId; 8]>,
        ty: Type,
    },

    /// Function call.
    Call(CallData),

    /// Function call that transfers control to `normal` on return or to
    /// `unwind` on unwinding.
    Invoke {
        call: CallData,
        normal: BlockId,
        unwind: BlockId,
    },

    /// Copies `len` bytes from `src` to `dest`.
    MemTransfer {
        code: MemTransferOp,
        dest: ValueId,
        src: ValueId,
        len: ValueId,
    },

    /// Fills `len` bytes at `dest` with `value`.
    MemSet {
        dest: ValueId,
        value: ValueId,
        len: ValueId,
    },

    /// Lifetime marker of the stack object pointed by `addr`.
    Lifetime {
        code: LifetimeOp,
        size: u64,
        addr: ValueId,
    },

    /// Reads the next variadic argument from `list`.
    VaArg { list: ValueId, ty: Type },

    /// Unconditional jump instruction.
    Jump { dest: BlockId },

    /// Conditional jump instruction.
    Br { cond: ValueId, dests: [BlockId; 2] },

    /// Return.
    Return { arg: Option<ValueId> },

    Unreachable,
}

impl InstData {
    /// Returns operands of the instruction.
    ///
    /// The position of a value in the returned list is the operand index used
    /// by [`crate::dfg::Use`]. Call arguments come first, so the operand index
    /// of a call argument is its argument number; the callee of an indirect
    /// call is the last operand.
    pub fn operands(&self) -> SmallVec<[ValueId; 8]> {
        match self {
            Self::Alloca { count, .. } => count.iter().copied().collect(),
            Self::Load { addr, .. } => [*addr].into_iter().collect(),
            Self::Store { addr, value } => [*value, *addr].into_iter().collect(),
            Self::PtrAdd { base, offset } => [*base, *offset].into_iter().collect(),
            Self::ElemPtr { base, index, .. } => [*base, *index].into_iter().collect(),
            Self::Cast { arg, .. } => [*arg].into_iter().collect(),
            Self::Binary { args, .. } => args.iter().copied().collect(),
            Self::Select { args } => args.iter().copied().collect(),
            Self::Phi { values, .. } => values.clone(),
            Self::Call(call) | Self::Invoke { call, .. } => call.operands(),
            Self::MemTransfer { dest, src, len, .. } => [*dest, *src, *len].into_iter().collect(),
            Self::MemSet { dest, value, len } => [*dest, *value, *len].into_iter().collect(),
            Self::Lifetime { addr, .. } => [*addr].into_iter().collect(),
            Self::VaArg { list, .. } => [*list].into_iter().collect(),
            Self::Br { cond, .. } => [*cond].into_iter().collect(),
            Self::Return { arg } => arg.iter().copied().collect(),
            Self::Jump { .. } | Self::Unreachable => SmallVec::new(),
        }
    }

    pub fn analyze_branch(&self) -> BranchInfo {
        match self {
            Self::Jump { dest } => BranchInfo::Jump { dest: *dest },
            Self::Br { cond, dests } => BranchInfo::Br {
                cond: *cond,
                dests: *dests,
            },
            Self::Invoke { normal, unwind, .. } => BranchInfo::Invoke {
                dests: [*normal, *unwind],
            },
            _ => BranchInfo::NotBranch,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. }
                | Self::Br { .. }
                | Self::Invoke { .. }
                | Self::Return { .. }
                | Self::Unreachable
        )
    }

    /// Returns call data if the instruction is a call or an invoke.
    pub fn call_data(&self) -> Option<&CallData> {
        match self {
            Self::Call(call) | Self::Invoke { call, .. } => Some(call),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallData {
    pub target: CallTarget,
    pub args: SmallVec<[ValueId; 8]>,
    /// Argument numbers passed by value together with the pointee type.
    pub byval: SmallVec<[(usize, Type); 2]>,
    pub ret_ty: Type,
}

impl CallData {
    pub fn new(target: CallTarget, args: &[ValueId], ret_ty: Type) -> Self {
        Self {
            target,
            args: args.into(),
            byval: SmallVec::new(),
            ret_ty,
        }
    }

    pub fn operands(&self) -> SmallVec<[ValueId; 8]> {
        let mut operands = self.args.clone();
        if let CallTarget::Indirect(callee) = self.target {
            operands.push(callee);
        }
        operands
    }

    /// Returns `true` if the operand index refers to a call argument.
    pub fn is_arg_operand(&self, operand: usize) -> bool {
        operand < self.args.len()
    }

    /// Returns the by-value type if `arg_no` is passed by value.
    pub fn byval_ty(&self, arg_no: usize) -> Option<&Type> {
        self.byval
            .iter()
            .find_map(|(no, ty)| (*no == arg_no).then_some(ty))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTarget {
    Direct(GlobalRef),
    Indirect(ValueId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchInfo {
    NotBranch,
    Jump { dest: BlockId },
    Br { cond: ValueId, dests: [BlockId; 2] },
    Invoke { dests: [BlockId; 2] },
}

impl BranchInfo {
    pub fn dests(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Self::NotBranch => SmallVec::new(),
            Self::Jump { dest } => [*dest].into_iter().collect(),
            Self::Br { dests, .. } | Self::Invoke { dests } => dests.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Eq,
    Slt,
}

impl BinaryOp {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::And => "and",
            Self::Or => "or",
            Self::Eq => "eq",
            Self::Slt => "slt",
        }
    }

    pub fn is_cmp(self) -> bool {
        matches!(self, Self::Eq | Self::Slt)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    Sext,
    Zext,
    Trunc,
    Bitcast,
    PtrToInt,
    IntToPtr,
}

impl CastOp {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Sext => "sext",
            Self::Zext => "zext",
            Self::Trunc => "trunc",
            Self::Bitcast => "bitcast",
            Self::PtrToInt => "ptr_to_int",
            Self::IntToPtr => "int_to_ptr",
        }
    }
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemTransferOp {
    Copy,
    Move,
}

impl MemTransferOp {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "memcpy",
            Self::Move => "memmove",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifetimeOp {
    Start,
    End,
}

impl LifetimeOp {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Start => "lifetime_start",
            Self::End => "lifetime_end",
        }
    }
}
