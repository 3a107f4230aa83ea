//! Intraprocedural analysis of stack allocations and pointer parameters.
use std::{fmt, sync::OnceLock};

use rustc_hash::FxHashSet;
use stacksafe_ir::{
    inst::{CallTarget, InstData},
    DataLayout, FuncRef, Function, GlobalRef, InstId, Module, TypeSize, Use, ValueId,
};
use tracing::{debug, trace};

use crate::{
    info::{CallInfo, DisplayUseInfo, FunctionInfo, UseInfo},
    lifetime::{LivenessOracle, StackLifetime},
    offset::{AddressOracle, SymbolicOffsets},
    range::{add_overflow_never, is_unsafe, signed_max_value, ConstantRange},
    summary::{ParamAccess, ParamAccessCall},
};

/// Returns `[0, size)` for an alloca of static, positive size. Returns the
/// empty range for scalable types, non-constant or non-positive counts, and
/// sizes that overflow the pointer width.
pub fn static_alloca_size_range(
    func: &Function,
    data_layout: &DataLayout,
    alloca: InstId,
) -> ConstantRange {
    let bits = data_layout.pointer_bits();
    let empty = ConstantRange::empty(bits);
    let InstData::Alloca { ty, count } = func.dfg.inst(alloca) else {
        return empty;
    };

    let limit = signed_max_value(bits);
    let Some(size) = data_layout
        .size_of(ty)
        .fixed_size()
        .and_then(|size| i64::try_from(size).ok())
        .filter(|size| (1..=limit).contains(size))
    else {
        return empty;
    };

    let size = match count {
        None => size,
        Some(count) => {
            let Some(count) = func.dfg.value_imm(*count).map(|imm| imm.as_i64()) else {
                return empty;
            };
            if count <= 0 {
                return empty;
            }
            match size.checked_mul(count) {
                Some(size) if size <= limit => size,
                _ => return empty,
            }
        }
    };

    ConstantRange::from_signed(bits, 0, size)
}

/// Result of analyzing every use of a single tracked address.
#[derive(Debug, Clone)]
pub struct UseAnalysis {
    pub info: UseInfo<GlobalRef>,
    /// `false` if the traversal stopped at an escaping use.
    pub fully_analyzed: bool,
}

pub struct StackSafetyLocalAnalysis<'a, L, A> {
    func: &'a Function,
    data_layout: DataLayout,
    liveness: L,
    addresses: A,
    pointer_bits: u32,
}

impl<'a> StackSafetyLocalAnalysis<'a, StackLifetime<'a>, SymbolicOffsets> {
    pub fn new(func: &'a Function, data_layout: DataLayout) -> Self {
        Self::with_oracles(
            func,
            data_layout,
            StackLifetime::new(func),
            SymbolicOffsets::new(data_layout),
        )
    }
}

impl<'a, L, A> StackSafetyLocalAnalysis<'a, L, A>
where
    L: LivenessOracle,
    A: AddressOracle,
{
    pub fn with_oracles(func: &'a Function, data_layout: DataLayout, liveness: L, addresses: A) -> Self {
        Self {
            func,
            data_layout,
            liveness,
            addresses,
            pointer_bits: data_layout.pointer_bits(),
        }
    }

    pub fn run(&self) -> FunctionInfo<GlobalRef> {
        debug_assert!(!self.func.is_declaration());
        let name = self.func.sig.name();
        debug!(func = name, "start stack safety local analysis");

        let mut info = FunctionInfo::new();
        for block in self.func.layout.iter_block() {
            for inst in self.func.layout.iter_inst(block) {
                if !matches!(self.func.dfg.inst(inst), InstData::Alloca { .. })
                    || static_alloca_size_range(self.func, &self.data_layout, inst).is_empty()
                {
                    continue;
                }
                let Some(ptr) = self.func.dfg.inst_result(inst) else {
                    continue;
                };

                let analysis = self.analyze_all_uses(ptr, Some(inst));
                trace!(
                    func = name,
                    alloca = %ptr,
                    range = %analysis.info.range,
                    fully_analyzed = analysis.fully_analyzed,
                    "alloca uses"
                );
                info.allocas.insert(inst, analysis.info);
            }
        }

        for (idx, &arg) in self.func.arg_values.iter().enumerate() {
            // Only pointers not passed by value are visible to callers.
            if !self.func.sig.args()[idx].is_pointer() || self.func.sig.is_byval_param(idx) {
                continue;
            }
            let analysis = self.analyze_all_uses(arg, None);
            trace!(
                func = name,
                param = idx,
                range = %analysis.info.range,
                fully_analyzed = analysis.fully_analyzed,
                "param uses"
            );
            info.params.insert(idx as u32, analysis.info);
        }

        debug!(
            func = name,
            allocas = info.allocas.len(),
            params = info.params.len(),
            "finish stack safety local analysis"
        );
        info
    }

    /// Walks every use of `ptr`, looking through instructions that derive a
    /// new address from it. `alloca` is set if `ptr` is a stack allocation.
    pub fn analyze_all_uses(&self, ptr: ValueId, alloca: Option<InstId>) -> UseAnalysis {
        let mut info = UseInfo::new(self.pointer_bits);
        let fully_analyzed = self.collect_uses(ptr, alloca, &mut info);
        UseAnalysis {
            info,
            fully_analyzed,
        }
    }

    fn collect_uses(
        &self,
        ptr: ValueId,
        alloca: Option<InstId>,
        info: &mut UseInfo<GlobalRef>,
    ) -> bool {
        let dfg = &self.func.dfg;
        let mut visited = FxHashSet::default();
        let mut worklist = vec![ptr];

        while let Some(value) = worklist.pop() {
            for Use { inst, operand } in dfg.uses(value) {
                if !self.liveness.is_reachable(inst) {
                    continue;
                }

                match dfg.inst(inst) {
                    InstData::Load { ty, .. } => {
                        if !self.is_alive_after(alloca, inst) {
                            return escape(info, inst, "load from a dead alloca");
                        }
                        let size = self.data_layout.size_of(ty);
                        info.update_range(&self.access_range_for_size(value, ptr, size));
                    }

                    InstData::VaArg { .. } => {}

                    InstData::Store { value: stored, .. } => {
                        if *stored == value {
                            return escape(info, inst, "address stored to memory");
                        }
                        if !self.is_alive_after(alloca, inst) {
                            return escape(info, inst, "store to a dead alloca");
                        }
                        let size = self.data_layout.size_of(dfg.value_ty(*stored));
                        info.update_range(&self.access_range_for_size(value, ptr, size));
                    }

                    InstData::Return { .. } => {
                        return escape(info, inst, "address returned");
                    }

                    InstData::Lifetime { .. } => {}

                    InstData::MemTransfer { len, .. } => {
                        if !self.is_alive_after(alloca, inst) {
                            return escape(info, inst, "memory transfer on a dead alloca");
                        }
                        // Only the destination and the source are accessed.
                        if operand <= 1 {
                            info.update_range(&self.mem_intrinsic_access_range(value, ptr, *len));
                        }
                    }

                    InstData::MemSet { len, .. } => {
                        if !self.is_alive_after(alloca, inst) {
                            return escape(info, inst, "memory set on a dead alloca");
                        }
                        if operand == 0 {
                            info.update_range(&self.mem_intrinsic_access_range(value, ptr, *len));
                        }
                    }

                    InstData::Call(call) | InstData::Invoke { call, .. } => {
                        if !self.is_alive_after(alloca, inst) {
                            return escape(info, inst, "call on a dead alloca");
                        }
                        if !call.is_arg_operand(operand) {
                            return escape(info, inst, "address used as callee");
                        }

                        if let Some(ty) = call.byval_ty(operand) {
                            let size = self.data_layout.size_of(ty);
                            info.update_range(&self.access_range_for_size(value, ptr, size));
                            continue;
                        }

                        match call.target {
                            CallTarget::Direct(callee) => {
                                let offset = self.offset_from(value, ptr);
                                info.calls.push(CallInfo::new(callee, operand as u32, offset));
                            }
                            CallTarget::Indirect(_) => {
                                return escape(info, inst, "address passed to an indirect call");
                            }
                        }
                    }

                    _ => {
                        if visited.insert(inst) {
                            worklist.extend(dfg.inst_result(inst));
                        }
                    }
                }
            }
        }

        true
    }

    fn is_alive_after(&self, alloca: Option<InstId>, inst: InstId) -> bool {
        alloca.map_or(true, |alloca| self.liveness.is_alive_after(alloca, inst))
    }

    fn unknown(&self) -> ConstantRange {
        ConstantRange::full(self.pointer_bits)
    }

    fn offset_from(&self, addr: ValueId, base: ValueId) -> ConstantRange {
        let offset = self.addresses.offset_from(self.func, addr, base);
        if is_unsafe(&offset) {
            self.unknown()
        } else {
            offset.sext_or_trunc(self.pointer_bits)
        }
    }

    fn access_range(&self, addr: ValueId, base: ValueId, size_range: &ConstantRange) -> ConstantRange {
        // Zero sized accesses don't touch memory.
        if size_range.is_empty() {
            return ConstantRange::empty(self.pointer_bits);
        }
        debug_assert!(!is_unsafe(size_range));

        let offsets = self.offset_from(addr, base);
        if is_unsafe(&offsets) {
            return self.unknown();
        }
        let range = add_overflow_never(&offsets, size_range);
        if is_unsafe(&range) {
            self.unknown()
        } else {
            range
        }
    }

    fn access_range_for_size(&self, addr: ValueId, base: ValueId, size: TypeSize) -> ConstantRange {
        let Some(size) = size
            .fixed_size()
            .and_then(|size| i64::try_from(size).ok())
            .filter(|size| *size <= signed_max_value(self.pointer_bits))
        else {
            return self.unknown();
        };
        self.access_range(
            addr,
            base,
            &ConstantRange::from_signed(self.pointer_bits, 0, size),
        )
    }

    fn mem_intrinsic_access_range(&self, addr: ValueId, base: ValueId, len: ValueId) -> ConstantRange {
        let sizes = self
            .addresses
            .signed_range(self.func, len)
            .zext_or_trunc(self.pointer_bits);
        if sizes.signed_upper() < 0 || is_unsafe(&sizes) {
            return self.unknown();
        }
        let size_range = ConstantRange::from_signed(self.pointer_bits, 0, sizes.signed_upper() - 1);
        self.access_range(addr, base, &size_range)
    }
}

fn escape(info: &mut UseInfo<GlobalRef>, inst: InstId, cause: &str) -> bool {
    trace!(%inst, cause, "escalate to unknown");
    info.set_unknown();
    false
}

/// Local analysis result of a single function, computed on first request.
pub struct StackSafetyInfo<'a> {
    module: &'a Module,
    func_ref: FuncRef,
    info: OnceLock<FunctionInfo<GlobalRef>>,
}

impl<'a> StackSafetyInfo<'a> {
    pub fn new(module: &'a Module, func_ref: FuncRef) -> Self {
        Self {
            module,
            func_ref,
            info: OnceLock::new(),
        }
    }

    pub fn func_ref(&self) -> FuncRef {
        self.func_ref
    }

    pub fn info(&self) -> &FunctionInfo<GlobalRef> {
        self.info
            .get_or_init(|| analyze_function(self.module, self.func_ref))
    }

    pub fn into_info(self) -> FunctionInfo<GlobalRef> {
        match self.info.into_inner() {
            Some(info) => info,
            None => analyze_function(self.module, self.func_ref),
        }
    }

    pub fn print(&self, w: &mut impl fmt::Write) -> fmt::Result {
        write_function_info(w, self.module, self.func_ref, self.info())
    }

    /// Returns the parameter accesses to record in a cross-module summary.
    /// Parameters accessed at unknown offsets are left out, as if nothing
    /// were known about them.
    pub fn param_accesses(&self) -> Vec<ParamAccess> {
        let mut accesses = Vec::new();
        'params: for (&param_no, use_info) in &self.info().params {
            if use_info.range.is_full() {
                continue;
            }

            let mut calls = Vec::with_capacity(use_info.calls.len());
            for call in &use_info.calls {
                // Forwarding at an unknown offset makes the parameter unknown
                // anyway.
                if call.offset.is_full() {
                    continue 'params;
                }
                calls.push(ParamAccessCall {
                    param_no: call.param_no,
                    callee: self.module.global_id(call.callee),
                    offsets: call.offset,
                });
            }

            accesses.push(ParamAccess {
                param_no,
                use_range: use_info.range,
                calls,
            });
        }
        accesses
    }
}

fn analyze_function(module: &Module, func_ref: FuncRef) -> FunctionInfo<GlobalRef> {
    let func = &module.funcs[func_ref];
    StackSafetyLocalAnalysis::new(func, module.data_layout).run()
}

/// Writes the access summary of `func_ref` in the diagnostic format.
pub(crate) fn write_function_info(
    w: &mut impl fmt::Write,
    module: &Module,
    func_ref: FuncRef,
    info: &FunctionInfo<GlobalRef>,
) -> fmt::Result {
    let func = &module.funcs[func_ref];
    write!(w, "  @{}", func.sig.name())?;
    if !func.sig.is_dso_local() {
        write!(w, " dso_preemptable")?;
    }
    if func.sig.linkage().is_interposable() {
        write!(w, " interposable")?;
    }
    writeln!(w)?;

    writeln!(w, "    args uses:")?;
    for (param_no, use_info) in &info.params {
        let arg = func.arg_values[*param_no as usize];
        writeln!(w, "      {arg}[]: {}", DisplayUseInfo { info: use_info, module })?;
    }

    writeln!(w, "    allocas uses:")?;
    for block in func.layout.iter_block() {
        for inst in func.layout.iter_inst(block) {
            let (Some(use_info), Some(value)) = (info.allocas.get(&inst), func.dfg.inst_result(inst))
            else {
                continue;
            };
            let size = static_alloca_size_range(func, &module.data_layout, inst);
            writeln!(
                w,
                "      {value}[{}]: {}",
                size.signed_upper(),
                DisplayUseInfo { info: use_info, module }
            )?;
        }
    }
    Ok(())
}
