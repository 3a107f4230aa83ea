//! Symbolic evaluation of address offsets and integer value ranges.
use rustc_hash::FxHashSet;
use stacksafe_ir::{
    inst::{BinaryOp, CastOp, InstData},
    DataLayout, Function, ValueId,
};

use crate::range::{add_overflow_never, is_unsafe, ConstantRange, PreferredRangeType};

/// Answers offset and range queries for the local analysis.
pub trait AddressOracle {
    /// Returns the signed byte offset range of `addr` from `base`, at pointer
    /// width. The full range means the offset is unknown.
    fn offset_from(&self, func: &Function, addr: ValueId, base: ValueId) -> ConstantRange;

    /// Returns the signed range of `value` at the width of its type.
    fn signed_range(&self, func: &Function, value: ValueId) -> ConstantRange;
}

/// Decomposes addresses into a root and an offset range by walking pointer
/// arithmetic, and evaluates integer ranges over constants and simple
/// arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct SymbolicOffsets {
    data_layout: DataLayout,
}

impl SymbolicOffsets {
    pub fn new(data_layout: DataLayout) -> Self {
        Self { data_layout }
    }

    fn pointer_bits(&self) -> u32 {
        self.data_layout.pointer_bits()
    }

    fn width(&self, func: &Function, value: ValueId) -> u32 {
        func.dfg
            .value_ty(value)
            .int_bits()
            .unwrap_or_else(|| self.pointer_bits())
    }

    /// Returns `(root, offset)` such that `addr == root + offset`. `None` if
    /// `addr` merges different roots or depends on itself.
    fn decompose(
        &self,
        func: &Function,
        addr: ValueId,
        visiting: &mut FxHashSet<ValueId>,
    ) -> Option<(ValueId, ConstantRange)> {
        let zero = ConstantRange::singleton(self.pointer_bits(), 0);
        let Some(inst) = func.dfg.value_inst(addr) else {
            return Some((addr, zero));
        };
        if !visiting.insert(addr) {
            return None;
        }

        let decomposed = match func.dfg.inst(inst) {
            InstData::Cast {
                code: CastOp::Bitcast,
                arg,
                ..
            } => self.decompose(func, *arg, visiting),

            InstData::PtrAdd { base, offset } => {
                let offset = self
                    .range_of(func, *offset, visiting)
                    .sext_or_trunc(self.pointer_bits());
                self.decompose(func, *base, visiting)
                    .map(|(root, base_offset)| (root, add_offsets(&base_offset, &offset)))
            }

            InstData::ElemPtr {
                base,
                index,
                elem_ty,
            } => {
                let offset = match self.data_layout.size_of(elem_ty).fixed_size() {
                    Some(size) if i64::try_from(size).is_ok() => self
                        .range_of(func, *index, visiting)
                        .sext_or_trunc(self.pointer_bits())
                        .multiply_by(size as i64),
                    _ => ConstantRange::full(self.pointer_bits()),
                };
                self.decompose(func, *base, visiting)
                    .map(|(root, base_offset)| (root, add_offsets(&base_offset, &offset)))
            }

            InstData::Select { args: [_, lhs, rhs] } => {
                self.decompose_merge(func, &[*lhs, *rhs], visiting)
            }
            InstData::Phi { values, .. } => self.decompose_merge(func, values, visiting),

            _ => Some((addr, zero)),
        };

        visiting.remove(&addr);
        decomposed
    }

    fn decompose_merge(
        &self,
        func: &Function,
        addrs: &[ValueId],
        visiting: &mut FxHashSet<ValueId>,
    ) -> Option<(ValueId, ConstantRange)> {
        let mut merged: Option<(ValueId, ConstantRange)> = None;
        for &addr in addrs {
            let (root, offset) = self.decompose(func, addr, visiting)?;
            merged = match merged {
                None => Some((root, offset)),
                Some((merged_root, _)) if merged_root != root => return None,
                Some((_, merged_offset)) => {
                    let union = merged_offset.union_with(&offset, PreferredRangeType::Signed);
                    if union.is_upper_sign_wrapped() {
                        Some((root, ConstantRange::full(self.pointer_bits())))
                    } else {
                        Some((root, union))
                    }
                }
            };
        }
        merged
    }

    fn range_of(
        &self,
        func: &Function,
        value: ValueId,
        visiting: &mut FxHashSet<ValueId>,
    ) -> ConstantRange {
        let bits = self.width(func, value);
        if let Some(imm) = func.dfg.value_imm(value) {
            return ConstantRange::singleton(bits, imm.as_i64());
        }
        let full = ConstantRange::full(bits);
        let Some(inst) = func.dfg.value_inst(value) else {
            return full;
        };
        if !visiting.insert(value) {
            return full;
        }

        let range = match func.dfg.inst(inst) {
            InstData::Binary {
                code: BinaryOp::And,
                args,
            } => args
                .iter()
                .filter_map(|arg| func.dfg.value_imm(*arg))
                .map(|imm| imm.as_i64())
                .find(|mask| *mask >= 0)
                .map_or(full, |mask| ConstantRange::from_signed_bounds(bits, 0, mask.into())),

            InstData::Binary { code, args } => {
                let lhs = self.range_of(func, args[0], visiting);
                let rhs = self.range_of(func, args[1], visiting);
                binary_range(*code, bits, &lhs, &rhs)
            }

            InstData::Cast { code, arg, .. } => {
                let arg_range = self.range_of(func, *arg, visiting);
                match code {
                    CastOp::Sext | CastOp::Trunc | CastOp::Bitcast => arg_range.sext_or_trunc(bits),
                    CastOp::Zext => arg_range.zext_or_trunc(bits),
                    CastOp::PtrToInt | CastOp::IntToPtr => full,
                }
            }

            InstData::Select { args: [_, lhs, rhs] } => {
                let lhs = self.range_of(func, *lhs, visiting);
                let rhs = self.range_of(func, *rhs, visiting);
                lhs.union_with(&rhs, PreferredRangeType::Signed)
            }

            InstData::Phi { values, .. } => {
                let mut range = ConstantRange::empty(bits);
                for value in values {
                    let incoming = self.range_of(func, *value, visiting);
                    range = range.union_with(&incoming, PreferredRangeType::Signed);
                }
                range
            }

            _ => full,
        };

        visiting.remove(&value);
        range
    }
}

impl AddressOracle for SymbolicOffsets {
    fn offset_from(&self, func: &Function, addr: ValueId, base: ValueId) -> ConstantRange {
        let mut visiting = FxHashSet::default();
        match self.decompose(func, addr, &mut visiting) {
            Some((root, offset)) if root == base => offset,
            _ => ConstantRange::full(self.pointer_bits()),
        }
    }

    fn signed_range(&self, func: &Function, value: ValueId) -> ConstantRange {
        self.range_of(func, value, &mut FxHashSet::default())
    }
}

fn add_offsets(lhs: &ConstantRange, rhs: &ConstantRange) -> ConstantRange {
    if is_unsafe(lhs) || is_unsafe(rhs) {
        ConstantRange::full(lhs.bits())
    } else {
        add_overflow_never(lhs, rhs)
    }
}

fn binary_range(code: BinaryOp, bits: u32, lhs: &ConstantRange, rhs: &ConstantRange) -> ConstantRange {
    if lhs.is_empty() || rhs.is_empty() {
        return ConstantRange::full(bits);
    }

    let (lmin, lmax) = (lhs.signed_min() as i128, lhs.signed_max() as i128);
    let (rmin, rmax) = (rhs.signed_min() as i128, rhs.signed_max() as i128);
    match code {
        BinaryOp::Add => ConstantRange::from_signed_bounds(bits, lmin + rmin, lmax + rmax),
        BinaryOp::Sub => ConstantRange::from_signed_bounds(bits, lmin - rmax, lmax - rmin),
        BinaryOp::Mul => {
            let products = [lmin * rmin, lmin * rmax, lmax * rmin, lmax * rmax];
            let min = products.iter().copied().min().unwrap_or(0);
            let max = products.iter().copied().max().unwrap_or(0);
            ConstantRange::from_signed_bounds(bits, min, max)
        }
        _ => ConstantRange::full(bits),
    }
}
