#![allow(dead_code)]

use stacksafe_ir::{
    builder::test_util::build_test_triple, FuncRef, InstId, Linkage, Module, ModuleBuilder,
    Signature, Type, ValueId,
};

pub fn module_builder(name: &str) -> ModuleBuilder {
    ModuleBuilder::new(name, build_test_triple())
}

pub fn declare(mb: &mut ModuleBuilder, name: &str, linkage: Linkage, args: &[Type]) -> FuncRef {
    mb.declare_function(Signature::new(name, linkage, args, Type::Unit))
        .unwrap()
}

/// Defines `name(p)` which loads `ty` from `p + offset`.
pub fn define_reader(
    mb: &mut ModuleBuilder,
    name: &str,
    linkage: Linkage,
    offset: i64,
    ty: Type,
) -> FuncRef {
    let func_ref = declare(mb, name, linkage, &[Type::Ptr]);
    let mut builder = mb.func_builder(func_ref);
    let b0 = builder.append_block();
    builder.switch_to_block(b0);
    let p = builder.args()[0];
    let offset = builder.make_imm_value(offset);
    let addr = builder.ptr_add(p, offset);
    builder.load(addr, ty);
    builder.ret(None);
    builder.finish()
}

/// Defines `name()` which passes a fresh `size` byte buffer to `callee`.
/// Returns the function and the buffer.
pub fn define_caller(
    mb: &mut ModuleBuilder,
    name: &str,
    size: u64,
    callee: FuncRef,
) -> (FuncRef, ValueId) {
    let func_ref = declare(mb, name, Linkage::Public, &[]);
    let mut builder = mb.func_builder(func_ref);
    let b0 = builder.append_block();
    builder.switch_to_block(b0);
    let buf = builder.alloca(Type::make_array(Type::I8, size));
    builder.call(callee, &[buf]);
    builder.ret(None);
    builder.finish();
    (func_ref, buf)
}

pub fn inst_of(module: &Module, func_ref: FuncRef, value: ValueId) -> InstId {
    module.funcs[func_ref].dfg.value_inst(value).unwrap()
}
