mod common;

use common::{declare, define_caller, define_reader, inst_of, module_builder};
use stacksafe_analysis::{ConstantRange, StackSafetyConfig, StackSafetyGlobalInfo};
use stacksafe_ir::{GlobalRef, Linkage, Type};

fn range(lower: i64, upper: i64) -> ConstantRange {
    ConstantRange::from_signed(64, lower, upper)
}

fn config() -> StackSafetyConfig {
    StackSafetyConfig::default().with_verify_fixed_point(true)
}

#[test]
fn in_bounds_call() {
    let mut mb = module_builder("m");
    let g = define_reader(&mut mb, "g", Linkage::Public, 0, Type::I32);
    let (f, buf) = define_caller(&mut mb, "f", 8, g);
    let module = mb.build();

    let info = StackSafetyGlobalInfo::analyze(&module, None, &config());
    let buf = inst_of(&module, f, buf);
    assert_eq!(info.function_info(f).unwrap().allocas[&buf].range, range(0, 4));
    assert!(info.is_safe(f, buf));
}

#[test]
fn out_of_bounds_call() {
    let mut mb = module_builder("m");
    let g = define_reader(&mut mb, "g", Linkage::Public, 4, Type::I64);
    let (f, buf) = define_caller(&mut mb, "f", 8, g);
    let module = mb.build();

    let info = StackSafetyGlobalInfo::analyze(&module, None, &config());
    let buf = inst_of(&module, f, buf);
    assert_eq!(info.function_info(f).unwrap().allocas[&buf].range, range(4, 12));
    assert!(!info.is_safe(f, buf));
    assert_eq!(info.stats().total_allocas, 1);
    assert_eq!(info.stats().safe_allocas, 0);
}

#[test]
fn escaping_allocas_are_unsafe() {
    let mut mb = module_builder("m");
    let f = declare(&mut mb, "f", Linkage::Public, &[Type::Ptr, Type::Ptr]);
    let mut builder = mb.func_builder(f);
    let b0 = builder.append_block();
    builder.switch_to_block(b0);
    let (slot, fn_ptr) = (builder.args()[0], builder.args()[1]);
    let stored = builder.alloca(Type::I64);
    builder.store(slot, stored);
    let passed = builder.alloca(Type::I64);
    builder.call_indirect(fn_ptr, &[passed], Type::Unit);
    let in_bounds = builder.alloca(Type::I64);
    builder.load(in_bounds, Type::I64);
    let returned = builder.alloca(Type::I64);
    builder.ret(Some(returned));
    builder.finish();
    let module = mb.build();

    let info = StackSafetyGlobalInfo::analyze(&module, None, &config());
    for alloca in [stored, passed, returned] {
        let alloca = inst_of(&module, f, alloca);
        assert!(info.function_info(f).unwrap().allocas[&alloca].is_unknown());
        assert!(!info.is_safe(f, alloca));
    }
    assert!(info.is_safe(f, inst_of(&module, f, in_bounds)));
}

#[test]
fn access_after_lifetime_end() {
    let mut mb = module_builder("m");
    let g = define_reader(&mut mb, "g", Linkage::Public, 0, Type::I8);
    let f = declare(&mut mb, "f", Linkage::Public, &[]);
    let mut builder = mb.func_builder(f);
    let b0 = builder.append_block();
    builder.switch_to_block(b0);
    let buf = builder.alloca(Type::I64);
    builder.lifetime_start(buf, 8);
    builder.call(g, &[buf]);
    builder.lifetime_end(buf, 8);
    builder.call(g, &[buf]);
    builder.ret(None);
    builder.finish();
    let module = mb.build();

    let info = StackSafetyGlobalInfo::analyze(&module, None, &config());
    assert!(!info.is_safe(f, inst_of(&module, f, buf)));
}

#[test]
fn recursion() {
    let mut mb = module_builder("m");
    // walk(p) { *p; walk(p + 1); }
    let walk = declare(&mut mb, "walk", Linkage::Public, &[Type::Ptr]);
    let mut builder = mb.func_builder(walk);
    let b0 = builder.append_block();
    builder.switch_to_block(b0);
    let p = builder.args()[0];
    builder.load(p, Type::I8);
    let one = builder.make_imm_value(1i64);
    let next = builder.ptr_add(p, one);
    builder.call(walk, &[next]);
    builder.ret(None);
    builder.finish();
    let (f, buf) = define_caller(&mut mb, "f", 16, walk);
    let module = mb.build();

    let config = config();
    let info = StackSafetyGlobalInfo::analyze(&module, None, &config);
    let walk_info = info.function_info(walk).unwrap();
    assert!(walk_info.params[&0].is_unknown());
    assert_eq!(walk_info.update_count, config.max_iterations + 2);
    assert!(!info.is_safe(f, inst_of(&module, f, buf)));
}

#[test]
fn self_call_at_same_address() {
    let mut mb = module_builder("m");
    // spin(p) { *p; spin(p); }
    let spin = declare(&mut mb, "spin", Linkage::Public, &[Type::Ptr]);
    let mut builder = mb.func_builder(spin);
    let b0 = builder.append_block();
    builder.switch_to_block(b0);
    let p = builder.args()[0];
    builder.load(p, Type::I32);
    builder.call(spin, &[p]);
    builder.ret(None);
    builder.finish();
    let (f, buf) = define_caller(&mut mb, "f", 4, spin);
    let module = mb.build();

    let info = StackSafetyGlobalInfo::analyze(&module, None, &config());
    assert_eq!(info.function_info(spin).unwrap().params[&0].range, range(0, 4));
    assert!(info.is_safe(f, inst_of(&module, f, buf)));
}

#[test]
fn unresolved_callees() {
    let mut mb = module_builder("m");
    let external = declare(&mut mb, "external", Linkage::External, &[Type::Ptr]);
    let weak = define_reader(&mut mb, "weak", Linkage::Weak, 0, Type::I8);
    let (via_external, external_buf) = define_caller(&mut mb, "via_external", 8, external);
    let (via_weak, weak_buf) = define_caller(&mut mb, "via_weak", 8, weak);
    let module = mb.build();

    let info = StackSafetyGlobalInfo::analyze(&module, None, &config());
    assert!(!info.is_safe(via_external, inst_of(&module, via_external, external_buf)));
    // The definition of a weak function may be replaced at link time.
    assert!(!info.is_safe(via_weak, inst_of(&module, via_weak, weak_buf)));
}

#[test]
fn calls_through_aliases() {
    let mut mb = module_builder("m");
    let g = define_reader(&mut mb, "g", Linkage::Public, 0, Type::I32);
    let local = mb.declare_alias("local", Linkage::Private, g.into()).unwrap();
    let weak = mb.declare_alias("weak", Linkage::Weak, g.into()).unwrap();
    let remote = mb.declare_alias("remote", Linkage::Public, g.into()).unwrap();
    mb.set_alias_dso_local(remote, false);

    let mut callers = Vec::new();
    for (name, alias) in [("via_local", local), ("via_weak", weak), ("via_remote", remote)] {
        let f = declare(&mut mb, name, Linkage::Public, &[]);
        let mut builder = mb.func_builder(f);
        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let buf = builder.alloca(Type::I32);
        builder.call(GlobalRef::Alias(alias), &[buf]);
        builder.ret(None);
        builder.finish();
        callers.push((f, buf));
    }
    let module = mb.build();

    let info = StackSafetyGlobalInfo::analyze(&module, None, &config());
    let safe: Vec<_> = callers
        .iter()
        .map(|&(f, buf)| info.is_safe(f, inst_of(&module, f, buf)))
        .collect();
    assert_eq!(safe, vec![true, false, false]);
}

#[test]
fn report() {
    let mut mb = module_builder("test_module");
    let external = declare(&mut mb, "ext", Linkage::External, &[Type::Ptr]);
    let g = define_reader(&mut mb, "g", Linkage::Public, 0, Type::I32);

    let w = declare(&mut mb, "w", Linkage::Weak, &[Type::Ptr]);
    let mut builder = mb.func_builder(w);
    let b0 = builder.append_block();
    builder.switch_to_block(b0);
    builder.ret(None);
    builder.finish();

    let f = declare(&mut mb, "f", Linkage::Public, &[]);
    let mut builder = mb.func_builder(f);
    let b0 = builder.append_block();
    builder.switch_to_block(b0);
    let buf = builder.alloca(Type::make_array(Type::I8, 8));
    let two = builder.make_imm_value(2i64);
    let field = builder.ptr_add(buf, two);
    builder.call(g, &[field]);
    let escaped = builder.alloca(Type::I64);
    builder.call(external, &[escaped]);
    builder.ret(None);
    builder.finish();
    let module = mb.build();

    let info = StackSafetyGlobalInfo::analyze(&module, None, &config());
    let report = format!("module {}\n{}", module.name, info.dump_string());
    insta::assert_snapshot!(report, @r"
    module test_module
      @g
        args uses:
          v0[]: [0,4)
        allocas uses:

      @w interposable
        args uses:
          v0[]: empty-set
        allocas uses:

      @f
        args uses:
        allocas uses:
          v0[8]: [2,6), @g(arg0, [2,3))
          v3[8]: full-set, @ext(arg0, [0,1))
    ");
}
