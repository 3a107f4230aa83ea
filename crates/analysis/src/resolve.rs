//! Resolution of recorded calls to the callees the solver knows about.
use stacksafe_ir::{FuncRef, GlobalRef, Module};
use tracing::trace;

use crate::{
    info::{CallInfo, Callee, UseInfo},
    range::{add_overflow_never, ConstantRange},
    summary::SummaryIndex,
};

/// Returns the function `callee` is bound to at runtime if its definition is
/// in `module`. Aliases are followed as long as every link is defined in the
/// module and can't be preempted.
pub fn find_callee_in_module(module: &Module, callee: GlobalRef) -> Option<FuncRef> {
    let mut current = callee;
    // Each alias is visited at most once on a chain that doesn't loop.
    for _ in 0..=module.aliases.len() {
        if module.is_declaration(current)
            || module.global_linkage(current).is_interposable()
            || !module.is_dso_local(current)
        {
            return None;
        }
        match current {
            GlobalRef::Func(func_ref) => return Some(func_ref),
            GlobalRef::Alias(alias) => current = module.aliases[alias].aliasee,
        }
    }
    None
}

/// Rewrites the calls of `use_info` to callees of the module-level solver.
/// Calls to other modules are folded into the range right away using the
/// accesses recorded in `index`. A call that can't be resolved makes the
/// whole use unknown.
pub fn resolve_all_calls(
    use_info: &UseInfo<GlobalRef>,
    module: &Module,
    index: Option<&SummaryIndex>,
) -> UseInfo<Callee> {
    let mut resolved = UseInfo {
        range: use_info.range,
        calls: Vec::with_capacity(use_info.calls.len()),
    };

    for call in &use_info.calls {
        if let Some(func_ref) = find_callee_in_module(module, call.callee) {
            resolved
                .calls
                .push(CallInfo::new(Callee::Func(func_ref), call.param_no, call.offset));
            continue;
        }

        match summary_access_range(module, call.callee, call.param_no, index) {
            Some(access) if access.is_empty() => {}
            Some(access) => resolved.update_range(&add_overflow_never(&access, &call.offset)),
            None => {
                trace!(
                    callee = module.global_name(call.callee),
                    param = call.param_no,
                    "unresolved callee"
                );
                resolved
                    .calls
                    .push(CallInfo::new(Callee::Unresolved, call.param_no, call.offset));
            }
        }
    }

    resolved.collapse_unresolved();
    resolved
}

/// Returns the range accessed through parameter `param_no` of `callee` as
/// recorded in the summary of its defining module, at the pointer width of
/// `module`.
fn summary_access_range(
    module: &Module,
    callee: GlobalRef,
    param_no: u32,
    index: Option<&SummaryIndex>,
) -> Option<ConstantRange> {
    let index = index?;
    let summary = index.find_callee_summary(module.global_id(callee), &module.name)?;
    let function = index.resolve_callee(summary)?;
    let access = index.find_param_access(function, param_no)?;
    if access.use_range.is_full() {
        return None;
    }
    Some(access.use_range.sext_or_trunc(module.data_layout.pointer_bits()))
}

#[cfg(test)]
mod tests {
    use stacksafe_ir::{builder::test_util::build_test_module_builder, Linkage, Signature, Type};

    use super::*;
    use crate::summary::{GlobalValueSummary, ParamAccess, SummaryKind};

    fn range(lower: i64, upper: i64) -> ConstantRange {
        ConstantRange::from_signed(64, lower, upper)
    }

    fn define(mb: &mut stacksafe_ir::ModuleBuilder, sig: Signature) -> FuncRef {
        let func_ref = mb.declare_function(sig).unwrap();
        let mut builder = mb.func_builder(func_ref);
        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        builder.ret(None);
        builder.finish()
    }

    #[test]
    fn callees_in_module() {
        let mut mb = build_test_module_builder();
        let f = define(&mut mb, Signature::new("f", Linkage::Public, &[Type::Ptr], Type::Unit));
        let weak = define(&mut mb, Signature::new("weak", Linkage::Weak, &[Type::Ptr], Type::Unit));
        let mut sig = Signature::new("preemptable", Linkage::Public, &[Type::Ptr], Type::Unit);
        sig.set_dso_local(false);
        let preemptable = define(&mut mb, sig);
        let decl = mb
            .declare_function(Signature::new("decl", Linkage::External, &[Type::Ptr], Type::Unit))
            .unwrap();

        let alias = mb.declare_alias("alias", Linkage::Public, f.into()).unwrap();
        let chained = mb.declare_alias("chained", Linkage::Private, alias.into()).unwrap();
        let weak_alias = mb.declare_alias("weak_alias", Linkage::Weak, f.into()).unwrap();
        let remote_alias = mb.declare_alias("remote_alias", Linkage::Public, f.into()).unwrap();
        mb.set_alias_dso_local(remote_alias, false);
        let cycle_a = mb.declare_alias("cycle_a", Linkage::Public, f.into()).unwrap();
        let cycle_b = mb.declare_alias("cycle_b", Linkage::Public, cycle_a.into()).unwrap();
        mb.set_aliasee(cycle_a, cycle_b.into());
        let module = mb.build();

        assert_eq!(find_callee_in_module(&module, f.into()), Some(f));
        assert_eq!(find_callee_in_module(&module, alias.into()), Some(f));
        assert_eq!(find_callee_in_module(&module, chained.into()), Some(f));
        for callee in [
            GlobalRef::from(weak),
            preemptable.into(),
            decl.into(),
            weak_alias.into(),
            remote_alias.into(),
            cycle_a.into(),
        ] {
            assert_eq!(find_callee_in_module(&module, callee), None);
        }
    }

    #[test]
    fn resolve_calls() {
        let mut mb = build_test_module_builder();
        let f = define(&mut mb, Signature::new("f", Linkage::Public, &[Type::Ptr], Type::Unit));
        let remote = mb
            .declare_function(Signature::new("remote", Linkage::External, &[Type::Ptr], Type::Unit))
            .unwrap();
        let module = mb.build();

        let mut index = SummaryIndex::new();
        index.insert(GlobalValueSummary {
            guid: module.global_id(remote.into()),
            module: "other".to_string(),
            linkage: Linkage::Public,
            live: true,
            dso_local: true,
            kind: SummaryKind::Function {
                param_accesses: vec![
                    ParamAccess {
                        param_no: 0,
                        use_range: range(0, 4),
                        calls: vec![],
                    },
                    ParamAccess {
                        param_no: 1,
                        use_range: ConstantRange::empty(64),
                        calls: vec![],
                    },
                ],
            },
        });

        let use_info = UseInfo {
            range: range(0, 1),
            calls: vec![
                CallInfo::new(GlobalRef::Func(f), 0, range(2, 3)),
                CallInfo::new(GlobalRef::Func(remote), 0, range(8, 9)),
                CallInfo::new(GlobalRef::Func(remote), 1, range(64, 65)),
            ],
        };

        let resolved = resolve_all_calls(&use_info, &module, Some(&index));
        assert_eq!(resolved.range, range(0, 12));
        assert_eq!(resolved.calls, vec![CallInfo::new(Callee::Func(f), 0, range(2, 3))]);

        // Without summaries nothing is known about `remote`.
        let resolved = resolve_all_calls(&use_info, &module, None);
        assert!(resolved.is_unknown());
        assert!(resolved.calls.is_empty());

        // Neither about parameters it doesn't record.
        let use_info = UseInfo {
            range: range(0, 1),
            calls: vec![CallInfo::new(GlobalRef::Func(remote), 2, range(0, 1))],
        };
        assert!(resolve_all_calls(&use_info, &module, Some(&index)).is_unknown());
    }
}
