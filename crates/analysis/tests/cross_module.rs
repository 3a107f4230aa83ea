mod common;

use common::{declare, define_caller, define_reader, inst_of, module_builder};
use stacksafe_analysis::{
    generate_param_access_summary, summarize_module, ConstantRange, GlobalValueSummary,
    ParamAccess, StackSafetyConfig, StackSafetyGlobalInfo, SummaryIndex, SummaryKind,
};
use stacksafe_ir::{GlobalId, Linkage, Module, Type};

fn range(lower: i64, upper: i64) -> ConstantRange {
    ConstantRange::from_signed(64, lower, upper)
}

fn config() -> StackSafetyConfig {
    StackSafetyConfig::default()
        .with_run(true)
        .with_verify_fixed_point(true)
}

/// Module `lib` defining `g(p)`, which loads `ty` from `p + offset`.
fn library(offset: i64, ty: Type, linkage: Linkage) -> Module {
    let mut mb = module_builder("lib");
    define_reader(&mut mb, "g", linkage, offset, ty);
    mb.build()
}

/// Module `app` whose `f()` passes an 8 byte buffer to the external `g`.
/// Returns whether the buffer is proven safe.
fn app_is_safe(index: Option<&SummaryIndex>) -> bool {
    let mut mb = module_builder("app");
    let g = declare(&mut mb, "g", Linkage::External, &[Type::Ptr]);
    let (f, buf) = define_caller(&mut mb, "f", 8, g);
    let module = mb.build();

    let info = StackSafetyGlobalInfo::analyze(&module, index, &config());
    info.is_safe(f, inst_of(&module, f, buf))
}

#[test]
fn bounded_summary() {
    let mut index = SummaryIndex::new();
    summarize_module(&library(0, Type::I32, Linkage::Public), &config(), &mut index);
    assert!(app_is_safe(Some(&index)));
    assert!(!app_is_safe(None));
}

#[test]
fn out_of_bounds_summary() {
    let mut index = SummaryIndex::new();
    summarize_module(&library(4, Type::I64, Linkage::Public), &config(), &mut index);
    assert!(!app_is_safe(Some(&index)));
}

#[test]
fn unusable_summaries() {
    // Missing callee.
    assert!(!app_is_safe(Some(&SummaryIndex::new())));

    // Dead callee.
    let mut index = SummaryIndex::new();
    summarize_module(&library(0, Type::I32, Linkage::Public), &config(), &mut index);
    index.set_live(GlobalId::of("g"), false);
    assert!(!app_is_safe(Some(&index)));

    // Preemptable callee.
    let mut index = SummaryIndex::new();
    summarize_module(&library(0, Type::I32, Linkage::Weak), &config(), &mut index);
    assert!(!app_is_safe(Some(&index)));

    // Summary recorded without parameter accesses.
    let mut index = SummaryIndex::new();
    summarize_module(
        &library(0, Type::I32, Linkage::Public),
        &StackSafetyConfig::default(),
        &mut index,
    );
    assert!(!app_is_safe(Some(&index)));
}

#[test]
fn summary_exchange() {
    let lib = library(0, Type::I32, Linkage::Public);
    let mut index = SummaryIndex::new();
    summarize_module(&lib, &config(), &mut index);
    let (_, summary) = index.iter().next().unwrap();
    let json = serde_json::to_string(summary.param_accesses()).unwrap();

    // Rebuild the summary from what was written out.
    let param_accesses: Vec<ParamAccess> = serde_json::from_str(&json).unwrap();
    assert_eq!(param_accesses[0].use_range, range(0, 4));
    let mut decoded = SummaryIndex::new();
    decoded.insert(GlobalValueSummary {
        kind: SummaryKind::Function { param_accesses },
        ..summary.clone()
    });
    assert!(app_is_safe(Some(&decoded)));
}

#[test]
fn whole_program_summary() {
    // lib: g(p) reads p[0, 4), h(p) calls g(p + 4).
    let mut mb = module_builder("lib");
    let g = define_reader(&mut mb, "g", Linkage::Public, 0, Type::I32);
    let h = declare(&mut mb, "h", Linkage::Public, &[Type::Ptr]);
    let mut builder = mb.func_builder(h);
    let b0 = builder.append_block();
    builder.switch_to_block(b0);
    let p = builder.args()[0];
    let four = builder.make_imm_value(4i64);
    let q = builder.ptr_add(p, four);
    builder.call(g, &[q]);
    builder.ret(None);
    builder.finish();
    let lib = mb.build();

    let mut index = SummaryIndex::new();
    summarize_module(&lib, &config(), &mut index);
    // Before propagation `h` is only known to forward its parameter.
    let h_summary = index
        .find_callee_summary(GlobalId::of("h"), "app")
        .unwrap();
    assert!(index.find_param_access(h_summary, 0).unwrap().use_range.is_empty());

    generate_param_access_summary(&mut index, &config());
    let h_access = index.find_param_access(h_summary, 0).unwrap();
    assert_eq!(h_access.use_range, range(4, 8));
    assert!(h_access.calls.is_empty());

    for (size, safe) in [(8, true), (6, false)] {
        let mut mb = module_builder("app");
        let h = declare(&mut mb, "h", Linkage::External, &[Type::Ptr]);
        let (f, buf) = define_caller(&mut mb, "f", size, h);
        let app = mb.build();

        let info = StackSafetyGlobalInfo::analyze(&app, Some(&index), &config());
        assert_eq!(info.is_safe(f, inst_of(&app, f, buf)), safe);
    }
}

#[test]
fn local_definitions_stay_in_their_module() {
    let mut index = SummaryIndex::new();
    summarize_module(&library(0, Type::I32, Linkage::Private), &config(), &mut index);
    assert!(index.find_callee_summary(GlobalId::of_local("lib", "g"), "lib").is_some());
    assert!(index.find_callee_summary(GlobalId::of_local("lib", "g"), "app").is_none());
    // `app` refers to its own `g`, which has no summary.
    assert!(!app_is_safe(Some(&index)));
}
