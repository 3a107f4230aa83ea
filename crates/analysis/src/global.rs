//! Whole-module stack safety.
use std::{collections::BTreeMap, fmt};

use dashmap::DashMap;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use stacksafe_ir::{FuncRef, GlobalRef, InstId, Module};
use tracing::{debug, info};

use crate::{
    config::StackSafetyConfig,
    dataflow::StackSafetyDataFlowAnalysis,
    info::{Callee, FunctionInfo, UseInfo},
    local::{static_alloca_size_range, write_function_info, StackSafetyInfo},
    resolve::resolve_all_calls,
    summary::SummaryIndex,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackSafetyStats {
    /// Number of allocas of static size in the module.
    pub total_allocas: usize,
    /// Number of allocas proven to be accessed only within their bounds.
    pub safe_allocas: usize,
}

/// Access ranges of every function of a module after interprocedural
/// propagation, and the allocas proven safe from them.
pub struct StackSafetyGlobalInfo<'a> {
    module: &'a Module,

    /// Allocas and parameters carry their final ranges along with the calls
    /// found by the local analysis.
    infos: BTreeMap<FuncRef, FunctionInfo<GlobalRef>>,

    safe_allocas: FxHashSet<(FuncRef, InstId)>,

    stats: StackSafetyStats,
}

impl<'a> StackSafetyGlobalInfo<'a> {
    /// Analyzes every function defined in `module`. Calls to functions of
    /// other modules are resolved through `index` if given, and make the
    /// passed address unknown otherwise.
    pub fn analyze(
        module: &'a Module,
        index: Option<&SummaryIndex>,
        config: &StackSafetyConfig,
    ) -> Self {
        let locals = local_infos(module, config.parallel);

        let mut functions = BTreeMap::new();
        for (&func_ref, local) in &locals {
            let mut info = FunctionInfo::new();
            for (&param_no, use_info) in &local.params {
                info.params
                    .insert(param_no, resolve_all_calls(use_info, module, index));
            }
            functions.insert(Callee::Func(func_ref), info);
        }

        let mut solver =
            StackSafetyDataFlowAnalysis::new(module.data_layout.pointer_bits(), functions, config);
        solver.run();

        let mut infos = BTreeMap::new();
        let mut safe_allocas = FxHashSet::default();
        let mut stats = StackSafetyStats::default();
        for (func_ref, local) in locals {
            let func = &module.funcs[func_ref];
            let mut info = FunctionInfo::new();

            for (alloca, use_info) in local.allocas {
                let resolved = resolve_all_calls(&use_info, module, index);
                let mut final_info = UseInfo {
                    range: resolved.range,
                    calls: use_info.calls,
                };
                for call in &resolved.calls {
                    let access =
                        solver.get_argument_access_range(&call.callee, call.param_no, &call.offset);
                    final_info.update_range(&access);
                }

                stats.total_allocas += 1;
                let size = static_alloca_size_range(func, &module.data_layout, alloca);
                if size.contains(&final_info.range) {
                    stats.safe_allocas += 1;
                    safe_allocas.insert((func_ref, alloca));
                }
                info.allocas.insert(alloca, final_info);
            }

            let solved = solver.functions().get(&Callee::Func(func_ref));
            for (param_no, use_info) in local.params {
                let range = solved
                    .and_then(|solved| solved.params.get(&param_no))
                    .map_or(use_info.range, |solved| solved.range);
                info.params.insert(
                    param_no,
                    UseInfo {
                        range,
                        calls: use_info.calls,
                    },
                );
            }
            info.update_count = solved.map_or(0, |solved| solved.update_count);
            infos.insert(func_ref, info);
        }

        debug!(
            module = %module.name,
            total_allocas = stats.total_allocas,
            safe_allocas = stats.safe_allocas,
            "finish stack safety analysis"
        );

        let global_info = Self {
            module,
            infos,
            safe_allocas,
            stats,
        };
        if config.print {
            info!(module = %module.name, "stack safety report\n{}", global_info.dump_string());
        }
        global_info
    }

    /// Returns `true` if every access to `alloca` is within its bounds.
    pub fn is_safe(&self, func_ref: FuncRef, alloca: InstId) -> bool {
        self.safe_allocas.contains(&(func_ref, alloca))
    }

    pub fn function_info(&self, func_ref: FuncRef) -> Option<&FunctionInfo<GlobalRef>> {
        self.infos.get(&func_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FuncRef, &FunctionInfo<GlobalRef>)> {
        self.infos.iter().map(|(func_ref, info)| (*func_ref, info))
    }

    pub fn stats(&self) -> StackSafetyStats {
        self.stats
    }

    pub fn print(&self, w: &mut impl fmt::Write) -> fmt::Result {
        for (func_ref, info) in &self.infos {
            write_function_info(w, self.module, *func_ref, info)?;
            writeln!(w)?;
        }
        Ok(())
    }

    pub fn dump_string(&self) -> String {
        let mut s = String::new();
        // Writing to a `String` never fails.
        let _ = self.print(&mut s);
        s
    }
}

/// Runs the local analysis of every function defined in `module`.
fn local_infos(module: &Module, parallel: bool) -> BTreeMap<FuncRef, FunctionInfo<GlobalRef>> {
    let defined: Vec<_> = module
        .iter_functions()
        .filter(|func_ref| !module.funcs[*func_ref].is_declaration())
        .collect();
    let analyze = |func_ref| StackSafetyInfo::new(module, func_ref).into_info();

    if !parallel {
        return defined
            .into_iter()
            .map(|func_ref| (func_ref, analyze(func_ref)))
            .collect();
    }

    let infos = DashMap::new();
    defined.into_par_iter().for_each(|func_ref| {
        infos.insert(func_ref, analyze(func_ref));
    });
    infos.into_iter().collect()
}
