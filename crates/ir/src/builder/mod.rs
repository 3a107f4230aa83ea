mod func_builder;
mod module_builder;

pub use func_builder::FunctionBuilder;
pub use module_builder::{BuildError, ModuleBuilder};

pub mod test_util {
    use super::*;

    use stacksafe_triple::TargetTriple;

    use crate::{
        ir_writer::FuncWriter,
        module::{FuncRef, Module},
        Linkage, Signature, Type,
    };

    pub fn build_test_triple() -> TargetTriple {
        TargetTriple::parse("x86_64-unknown-linux").unwrap()
    }

    pub fn build_test_module_builder() -> ModuleBuilder {
        ModuleBuilder::new("test_module", build_test_triple())
    }

    pub struct TestModuleBuilder {
        module_builder: ModuleBuilder,
        func_ref: Option<FuncRef>,
    }

    impl TestModuleBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn func_builder(&mut self, args: &[Type], ret_ty: &Type) -> FunctionBuilder {
            let sig = Signature::new("test_func", Linkage::Public, args, ret_ty.clone());
            let func_ref = self.module_builder.declare_function(sig).unwrap();
            self.func_ref = Some(func_ref);
            self.module_builder.func_builder(func_ref)
        }

        pub fn build(self) -> Module {
            self.module_builder.build()
        }
    }

    impl Default for TestModuleBuilder {
        fn default() -> Self {
            Self {
                module_builder: build_test_module_builder(),
                func_ref: None,
            }
        }
    }

    pub fn dump_func(module: &Module, func_ref: FuncRef) -> String {
        let mut writer = FuncWriter::new(module, func_ref);
        writer.dump_string().unwrap()
    }
}
