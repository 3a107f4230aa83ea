//! Cross-module summaries of parameter accesses.
use std::collections::BTreeMap;

use cranelift_entity::{entity_impl, PrimaryMap};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use stacksafe_ir::{GlobalId, GlobalRef, Linkage, Module};
use tracing::debug;

use crate::{
    config::StackSafetyConfig,
    dataflow::StackSafetyDataFlowAnalysis,
    info::{CallInfo, Callee, FunctionInfo, UseInfo},
    local::StackSafetyInfo,
    range::ConstantRange,
};

/// Width of the ranges stored in summaries.
pub const RANGE_WIDTH: u32 = 64;

/// A parameter of a summarized function forwarded to another function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamAccessCall {
    pub param_no: u32,
    pub callee: GlobalId,
    pub offsets: ConstantRange,
}

/// Accesses of a summarized function through one of its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamAccess {
    pub param_no: u32,
    pub use_range: ConstantRange,
    pub calls: Vec<ParamAccessCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SummaryRef(u32);
entity_impl!(SummaryRef);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryKind {
    Function { param_accesses: Vec<ParamAccess> },
    Alias { aliasee: SummaryRef },
    Variable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalValueSummary {
    pub guid: GlobalId,
    /// Name of the module defining the global.
    pub module: String,
    pub linkage: Linkage,
    /// `false` if the global is unreachable from the program roots.
    pub live: bool,
    /// `true` if the definition is known to be the one used at runtime.
    pub dso_local: bool,
    pub kind: SummaryKind,
}

impl GlobalValueSummary {
    pub fn param_accesses(&self) -> &[ParamAccess] {
        match &self.kind {
            SummaryKind::Function { param_accesses } => param_accesses.as_slice(),
            _ => &[],
        }
    }
}

/// Summaries of the globals of every module of a program.
#[derive(Debug, Clone, Default)]
pub struct SummaryIndex {
    summaries: PrimaryMap<SummaryRef, GlobalValueSummary>,

    /// Globals with the same identifier may be defined in several modules.
    by_guid: FxHashMap<GlobalId, SmallVec<[SummaryRef; 1]>>,
}

impl SummaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, summary: GlobalValueSummary) -> SummaryRef {
        let guid = summary.guid;
        let summary_ref = self.summaries.push(summary);
        self.by_guid.entry(guid).or_default().push(summary_ref);
        summary_ref
    }

    pub fn summary(&self, summary: SummaryRef) -> &GlobalValueSummary {
        &self.summaries[summary]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SummaryRef, &GlobalValueSummary)> {
        self.summaries.iter()
    }

    pub fn summaries_of(&self, guid: GlobalId) -> &[SummaryRef] {
        match self.by_guid.get(&guid) {
            Some(refs) => refs,
            None => &[],
        }
    }

    pub fn set_live(&mut self, guid: GlobalId, live: bool) {
        for &summary in self.by_guid.get(&guid).into_iter().flatten() {
            self.summaries[summary].live = live;
        }
    }

    /// Returns the summary of `guid` a call from `module` links against.
    /// Local definitions are only visible from their own module. Returns
    /// `None` if several non-local definitions compete.
    pub fn find_callee_summary(&self, guid: GlobalId, module: &str) -> Option<SummaryRef> {
        let mut found = None;
        for &candidate in self.summaries_of(guid) {
            let summary = &self.summaries[candidate];
            if !summary.live {
                continue;
            }
            let is_function = self
                .base_object(candidate)
                .is_some_and(|base| matches!(self.summaries[base].kind, SummaryKind::Function { .. }));
            if !is_function {
                continue;
            }

            if summary.linkage.is_local() {
                if summary.module == module {
                    return Some(candidate);
                }
            } else if found.replace(candidate).is_some() {
                return None;
            }
        }
        found
    }

    /// Follows aliases from `summary` to the function summary they name.
    /// Returns `None` if the chain reaches a dead, preemptable or non-function
    /// global, or loops.
    pub fn resolve_callee(&self, summary: SummaryRef) -> Option<SummaryRef> {
        let mut visited = FxHashSet::default();
        let mut current = summary;
        loop {
            if !visited.insert(current) {
                return None;
            }
            let summary = &self.summaries[current];
            if !summary.live || !summary.dso_local {
                return None;
            }
            match summary.kind {
                SummaryKind::Function { .. } => return Some(current),
                SummaryKind::Alias { aliasee } => current = aliasee,
                SummaryKind::Variable => return None,
            }
        }
    }

    pub fn find_param_access(&self, summary: SummaryRef, param_no: u32) -> Option<&ParamAccess> {
        self.summaries[summary]
            .param_accesses()
            .iter()
            .find(|access| access.param_no == param_no)
    }

    pub fn set_param_accesses(&mut self, summary: SummaryRef, accesses: Vec<ParamAccess>) {
        if let SummaryKind::Function { param_accesses } = &mut self.summaries[summary].kind {
            *param_accesses = accesses;
        }
    }

    fn base_object(&self, summary: SummaryRef) -> Option<SummaryRef> {
        let mut visited = FxHashSet::default();
        let mut current = summary;
        while let SummaryKind::Alias { aliasee } = self.summaries[current].kind {
            if !visited.insert(current) {
                return None;
            }
            current = aliasee;
        }
        Some(current)
    }
}

/// Returns `true` if the parameter accesses of `module` are worth recording.
pub fn needs_param_access_summary(module: &Module, config: &StackSafetyConfig) -> bool {
    config.run || module.funcs.values().any(|func| func.sig.sanitize_memtag())
}

/// Adds the summaries of the functions and aliases defined in `module`.
pub fn summarize_module(module: &Module, config: &StackSafetyConfig, index: &mut SummaryIndex) {
    let with_accesses = needs_param_access_summary(module, config);
    let mut mapped: FxHashMap<GlobalRef, SummaryRef> = FxHashMap::default();

    for func_ref in module.iter_functions() {
        let global = GlobalRef::Func(func_ref);
        if module.is_declaration(global) {
            continue;
        }
        let param_accesses = if with_accesses {
            StackSafetyInfo::new(module, func_ref).param_accesses()
        } else {
            Vec::new()
        };
        let summary = index.insert(global_summary(
            module,
            global,
            SummaryKind::Function { param_accesses },
        ));
        mapped.insert(global, summary);
    }

    // An alias can only be summarized once its aliasee is.
    let mut pending: Vec<_> = module.aliases.keys().collect();
    loop {
        let before = pending.len();
        pending.retain(|&alias| {
            let global = GlobalRef::Alias(alias);
            let Some(&aliasee) = mapped.get(&module.aliases[alias].aliasee) else {
                return true;
            };
            let summary = index.insert(global_summary(module, global, SummaryKind::Alias { aliasee }));
            mapped.insert(global, summary);
            false
        });
        if pending.len() == before {
            break;
        }
    }

    debug!(
        module = %module.name,
        summaries = mapped.len(),
        with_accesses,
        "summarize module"
    );
}

fn global_summary(module: &Module, global: GlobalRef, kind: SummaryKind) -> GlobalValueSummary {
    let linkage = module.global_linkage(global);
    GlobalValueSummary {
        guid: module.global_id(global),
        module: module.name.clone(),
        linkage,
        live: true,
        dso_local: module.is_dso_local(global) && !linkage.is_interposable(),
        kind,
    }
}

/// Propagates parameter accesses through the calls recorded in the function
/// summaries of the whole program, and replaces the recorded accesses with
/// the result.
pub fn generate_param_access_summary(index: &mut SummaryIndex, config: &StackSafetyConfig) {
    let mut functions: BTreeMap<Callee, FunctionInfo<Callee>> = BTreeMap::new();

    for (summary_ref, summary) in index.iter() {
        let SummaryKind::Function { param_accesses } = &summary.kind else {
            continue;
        };
        if !summary.live || !summary.dso_local || param_accesses.is_empty() {
            continue;
        }

        let mut info = FunctionInfo::new();
        for access in param_accesses {
            let mut use_info = UseInfo::new(RANGE_WIDTH);
            use_info.range = access.use_range;
            for call in &access.calls {
                let callee = index
                    .find_callee_summary(call.callee, &summary.module)
                    .and_then(|callee| index.resolve_callee(callee))
                    .map_or(Callee::Unresolved, Callee::Summary);
                use_info
                    .calls
                    .push(CallInfo::new(callee, call.param_no, call.offsets));
            }
            use_info.collapse_unresolved();
            info.params.insert(access.param_no, use_info);
        }
        functions.insert(Callee::Summary(summary_ref), info);
    }

    let refs: Vec<SummaryRef> = index.iter().map(|(summary_ref, _)| summary_ref).collect();
    for summary_ref in refs {
        index.set_param_accesses(summary_ref, Vec::new());
    }

    let mut solver = StackSafetyDataFlowAnalysis::new(RANGE_WIDTH, functions, config);
    let solved = solver.run();
    let mut num_params = 0;
    for (callee, info) in solved {
        let Callee::Summary(summary_ref) = *callee else {
            continue;
        };
        let accesses: Vec<_> = info
            .params
            .iter()
            .map(|(&param_no, use_info)| ParamAccess {
                param_no,
                use_range: use_info.range,
                calls: Vec::new(),
            })
            .collect();
        num_params += accesses.len();
        index.set_param_accesses(summary_ref, accesses);
    }

    debug!(params = num_params, "generate param access summary");
}
