use super::ModuleBuilder;
use crate::{
    inst::{BinaryOp, CallData, CallTarget, CastOp, InstData, InstId, LifetimeOp, MemTransferOp},
    module::{FuncRef, GlobalRef},
    BlockId, Function, Immediate, Type, Value, ValueId,
};

pub struct FunctionBuilder<'a> {
    module_builder: &'a mut ModuleBuilder,
    func_ref: FuncRef,
    loc: Option<BlockId>,
}

macro_rules! impl_binary_inst {
    ($name:ident, $code:path) => {
        pub fn $name(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
            let ty = if $code.is_cmp() {
                Type::I1
            } else {
                self.func().dfg.value_ty(lhs).clone()
            };
            let inst_data = InstData::Binary {
                code: $code,
                args: [lhs, rhs],
            };

            self.insert_inst(inst_data, ty)
        }
    };
}

macro_rules! impl_cast_inst {
    ($name:ident, $code:path) => {
        pub fn $name(&mut self, arg: ValueId, ty: Type) -> ValueId {
            let inst_data = InstData::Cast {
                code: $code,
                arg,
                ty: ty.clone(),
            };

            self.insert_inst(inst_data, ty)
        }
    };
}

impl<'a> FunctionBuilder<'a> {
    pub fn new(module_builder: &'a mut ModuleBuilder, func_ref: FuncRef) -> Self {
        Self {
            module_builder,
            func_ref,
            loc: None,
        }
    }

    pub fn finish(self) -> FuncRef {
        if cfg!(debug_assertions) {
            let func = self.func();
            for block in func.layout.iter_block() {
                debug_assert!(
                    func.layout
                        .last_inst_of(block)
                        .is_some_and(|inst| func.dfg.is_terminator(inst)),
                    "`{block}` must end with a terminator"
                );
            }
        }

        self.func_ref
    }

    pub fn args(&self) -> &[ValueId] {
        &self.func().arg_values
    }

    pub fn append_block(&mut self) -> BlockId {
        let func = self.func_mut();
        let block = func.dfg.make_block();
        func.layout.append_block(block);
        block
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.loc = Some(block);
    }

    pub fn make_imm_value<Imm>(&mut self, imm: Imm) -> ValueId
    where
        Imm: Into<Immediate>,
    {
        self.func_mut().dfg.make_imm_value(imm)
    }

    impl_binary_inst!(add, BinaryOp::Add);
    impl_binary_inst!(sub, BinaryOp::Sub);
    impl_binary_inst!(mul, BinaryOp::Mul);
    impl_binary_inst!(and, BinaryOp::And);
    impl_binary_inst!(or, BinaryOp::Or);
    impl_binary_inst!(eq, BinaryOp::Eq);
    impl_binary_inst!(slt, BinaryOp::Slt);

    impl_cast_inst!(sext, CastOp::Sext);
    impl_cast_inst!(zext, CastOp::Zext);
    impl_cast_inst!(trunc, CastOp::Trunc);
    impl_cast_inst!(ptr_to_int, CastOp::PtrToInt);

    pub fn int_to_ptr(&mut self, arg: ValueId) -> ValueId {
        let inst_data = InstData::Cast {
            code: CastOp::IntToPtr,
            arg,
            ty: Type::Ptr,
        };
        self.insert_inst(inst_data, Type::Ptr)
    }

    pub fn bitcast(&mut self, arg: ValueId) -> ValueId {
        let inst_data = InstData::Cast {
            code: CastOp::Bitcast,
            arg,
            ty: Type::Ptr,
        };
        self.insert_inst(inst_data, Type::Ptr)
    }

    /// Build alloca instruction.
    pub fn alloca(&mut self, ty: Type) -> ValueId {
        let inst_data = InstData::Alloca { ty, count: None };
        self.insert_inst(inst_data, Type::Ptr)
    }

    /// Build alloca instruction that allocates `count` objects of `ty`.
    pub fn alloca_array(&mut self, ty: Type, count: ValueId) -> ValueId {
        let inst_data = InstData::Alloca {
            ty,
            count: Some(count),
        };
        self.insert_inst(inst_data, Type::Ptr)
    }

    /// Build memory load instruction.
    pub fn load(&mut self, addr: ValueId, ty: Type) -> ValueId {
        let inst_data = InstData::Load {
            addr,
            ty: ty.clone(),
        };
        self.insert_inst(inst_data, ty)
    }

    /// Build memory store instruction.
    pub fn store(&mut self, addr: ValueId, value: ValueId) {
        let inst_data = InstData::Store { addr, value };
        self.insert_inst_no_result(inst_data);
    }

    pub fn ptr_add(&mut self, base: ValueId, offset: ValueId) -> ValueId {
        let inst_data = InstData::PtrAdd { base, offset };
        self.insert_inst(inst_data, Type::Ptr)
    }

    pub fn elem_ptr(&mut self, base: ValueId, index: ValueId, elem_ty: Type) -> ValueId {
        let inst_data = InstData::ElemPtr {
            base,
            index,
            elem_ty,
        };
        self.insert_inst(inst_data, Type::Ptr)
    }

    pub fn select(&mut self, cond: ValueId, then: ValueId, else_: ValueId) -> ValueId {
        let ty = self.func().dfg.value_ty(then).clone();
        let inst_data = InstData::Select {
            args: [cond, then, else_],
        };
        self.insert_inst(inst_data, ty)
    }

    pub fn phi(&mut self, args: &[(ValueId, BlockId)]) -> ValueId {
        let ty = self.func().dfg.value_ty(args[0].0).clone();
        let inst_data = InstData::Phi {
            values: args.iter().map(|(val, _)| *val).collect(),
            blocks: args.iter().map(|(_, block)| *block).collect(),
            ty: ty.clone(),
        };
        self.insert_inst(inst_data, ty)
    }

    /// Build a direct call. Returns the result if the callee returns a value.
    pub fn call(&mut self, callee: impl Into<GlobalRef>, args: &[ValueId]) -> Option<ValueId> {
        self.call_with_byval(callee, args, &[])
    }

    /// Build a direct call passing the arguments listed in `byval` by value.
    pub fn call_with_byval(
        &mut self,
        callee: impl Into<GlobalRef>,
        args: &[ValueId],
        byval: &[(usize, Type)],
    ) -> Option<ValueId> {
        let callee = callee.into();
        let ret_ty = self.module_builder.callee_ret_ty(callee);
        let mut call = CallData::new(CallTarget::Direct(callee), args, ret_ty);
        call.byval = byval.iter().cloned().collect();
        self.insert_call(InstData::Call(call))
    }

    pub fn call_indirect(
        &mut self,
        callee: ValueId,
        args: &[ValueId],
        ret_ty: Type,
    ) -> Option<ValueId> {
        let call = CallData::new(CallTarget::Indirect(callee), args, ret_ty);
        self.insert_call(InstData::Call(call))
    }

    pub fn invoke(
        &mut self,
        callee: impl Into<GlobalRef>,
        args: &[ValueId],
        normal: BlockId,
        unwind: BlockId,
    ) -> Option<ValueId> {
        let callee = callee.into();
        let ret_ty = self.module_builder.callee_ret_ty(callee);
        let call = CallData::new(CallTarget::Direct(callee), args, ret_ty);
        self.insert_call(InstData::Invoke {
            call,
            normal,
            unwind,
        })
    }

    pub fn memcpy(&mut self, dest: ValueId, src: ValueId, len: ValueId) {
        self.insert_inst_no_result(InstData::MemTransfer {
            code: MemTransferOp::Copy,
            dest,
            src,
            len,
        });
    }

    pub fn memmove(&mut self, dest: ValueId, src: ValueId, len: ValueId) {
        self.insert_inst_no_result(InstData::MemTransfer {
            code: MemTransferOp::Move,
            dest,
            src,
            len,
        });
    }

    pub fn memset(&mut self, dest: ValueId, value: ValueId, len: ValueId) {
        self.insert_inst_no_result(InstData::MemSet { dest, value, len });
    }

    pub fn lifetime_start(&mut self, addr: ValueId, size: u64) {
        self.insert_inst_no_result(InstData::Lifetime {
            code: LifetimeOp::Start,
            size,
            addr,
        });
    }

    pub fn lifetime_end(&mut self, addr: ValueId, size: u64) {
        self.insert_inst_no_result(InstData::Lifetime {
            code: LifetimeOp::End,
            size,
            addr,
        });
    }

    pub fn va_arg(&mut self, list: ValueId, ty: Type) -> ValueId {
        let inst_data = InstData::VaArg {
            list,
            ty: ty.clone(),
        };
        self.insert_inst(inst_data, ty)
    }

    pub fn jump(&mut self, dest: BlockId) {
        self.insert_inst_no_result(InstData::Jump { dest });
    }

    pub fn br(&mut self, cond: ValueId, then: BlockId, else_: BlockId) {
        self.insert_inst_no_result(InstData::Br {
            cond,
            dests: [then, else_],
        });
    }

    pub fn ret(&mut self, arg: Option<ValueId>) {
        self.insert_inst_no_result(InstData::Return { arg });
    }

    pub fn unreachable(&mut self) {
        self.insert_inst_no_result(InstData::Unreachable);
    }

    pub fn func(&self) -> &Function {
        &self.module_builder.module.funcs[self.func_ref]
    }

    fn func_mut(&mut self) -> &mut Function {
        &mut self.module_builder.module.funcs[self.func_ref]
    }

    fn insert_call(&mut self, inst_data: InstData) -> Option<ValueId> {
        let ret_ty = inst_data
            .call_data()
            .map(|call| call.ret_ty.clone())
            .unwrap_or_default();

        if ret_ty.is_unit() {
            self.insert_inst_no_result(inst_data);
            None
        } else {
            Some(self.insert_inst(inst_data, ret_ty))
        }
    }

    /// Appends an instruction to the current block and returns the result.
    fn insert_inst(&mut self, inst_data: InstData, ty: Type) -> ValueId {
        let inst = self.append_inst(inst_data);
        let func = self.func_mut();
        let result = func.dfg.make_value(Value::Inst { inst, ty });
        func.dfg.attach_result(inst, result);
        result
    }

    fn insert_inst_no_result(&mut self, inst_data: InstData) {
        self.append_inst(inst_data);
    }

    fn append_inst(&mut self, inst_data: InstData) -> InstId {
        let block = self.loc.expect("no block is selected by `switch_to_block`");
        let func = self.func_mut();
        let inst = func.dfg.make_inst(inst_data);
        func.layout.append_inst(inst, block);
        inst
    }
}

#[cfg(test)]
mod tests {
    use super::{super::test_util::*, *};
    use crate::{Linkage, Signature};

    #[test]
    fn entry_block() {
        let mut test_module_builder = TestModuleBuilder::new();
        let mut builder = test_module_builder.func_builder(&[Type::I64], &Type::Unit);

        let entry_block = builder.append_block();
        builder.switch_to_block(entry_block);
        let arg0 = builder.args()[0];
        let slot = builder.alloca(Type::make_array(Type::I8, 16));
        let eight = builder.make_imm_value(8i64);
        let p = builder.ptr_add(slot, eight);
        builder.store(p, arg0);
        let v = builder.load(slot, Type::I64);
        builder.add(v, arg0);
        builder.ret(None);

        let func_ref = builder.finish();

        let module = test_module_builder.build();
        assert_eq!(
            dump_func(&module, func_ref),
            "func public %test_func(v0.i64) -> unit:
    block0:
        v1.ptr = alloca [i8;16];
        v3.ptr = ptr_add v1 8.i64;
        store v3 v0;
        v4.i64 = load v1;
        v5.i64 = add v4 v0;
        return;

"
        );
    }

    #[test]
    fn calls_and_intrinsics() {
        let mut mb = build_test_module_builder();
        let callee_sig = Signature::new("callee", Linkage::External, &[Type::Ptr], Type::I32);
        let callee = mb.declare_function(callee_sig).unwrap();
        let sig = Signature::new("caller", Linkage::Public, &[Type::Ptr], Type::Unit);
        let caller = mb.declare_function(sig).unwrap();

        let mut builder = mb.func_builder(caller);
        let b0 = builder.append_block();
        let b1 = builder.append_block();
        let b2 = builder.append_block();
        let fp = builder.args()[0];

        builder.switch_to_block(b0);
        let slot = builder.alloca(Type::I64);
        builder.lifetime_start(slot, 8);
        let len = builder.make_imm_value(8i64);
        let zero = builder.make_imm_value(0i8);
        builder.memset(slot, zero, len);
        let r = builder.call_with_byval(callee, &[slot], &[(0, Type::I64)]);
        assert!(r.is_some());
        builder.call_indirect(fp, &[slot], Type::Unit);
        builder.invoke(callee, &[slot], b1, b2);

        builder.switch_to_block(b1);
        builder.lifetime_end(slot, 8);
        builder.ret(None);

        builder.switch_to_block(b2);
        builder.unreachable();
        builder.finish();

        let module = mb.build();
        insta::assert_snapshot!(dump_func(&module, caller), @r"
        func public %caller(v0.ptr) -> unit:
            block0:
                v1.ptr = alloca i64;
                lifetime_start 8 v1;
                memset v1 0.i8 8.i64;
                v4.i32 = call %callee byval(i64) v1;
                call_indirect v0 v1;
                v5.i32 = invoke %callee v1 block1 block2;

            block1:
                lifetime_end 8 v1;
                return;

            block2:
                unreachable;
        ");
    }
}
