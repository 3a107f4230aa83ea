use rustc_hash::FxHashMap;
use stacksafe_triple::TargetTriple;
use thiserror::Error;

use super::FunctionBuilder;
use crate::{
    module::{AliasRef, FuncRef, GlobalAlias, GlobalRef},
    Function, Linkage, Module, Signature, Type,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("symbol `{0}` is already declared")]
    DuplicateSymbol(String),

    #[error("alias `{0}` must not have external linkage")]
    ExternalAlias(String),
}

#[derive(Debug)]
pub struct ModuleBuilder {
    pub(super) module: Module,

    /// Map symbol name -> global to reject duplicated declaration.
    declared: FxHashMap<String, GlobalRef>,
}

impl ModuleBuilder {
    pub fn new(name: &str, triple: TargetTriple) -> Self {
        Self {
            module: Module::new(name, triple),
            declared: FxHashMap::default(),
        }
    }

    pub fn declare_function(&mut self, sig: Signature) -> Result<FuncRef, BuildError> {
        if self.declared.contains_key(sig.name()) {
            return Err(BuildError::DuplicateSymbol(sig.name().to_string()));
        }

        let name = sig.name().to_string();
        let func_ref = self.module.funcs.push(Function::new(sig));
        self.declared.insert(name, func_ref.into());
        Ok(func_ref)
    }

    pub fn declare_alias(
        &mut self,
        name: &str,
        linkage: Linkage,
        aliasee: GlobalRef,
    ) -> Result<AliasRef, BuildError> {
        if self.declared.contains_key(name) {
            return Err(BuildError::DuplicateSymbol(name.to_string()));
        }
        if linkage == Linkage::External {
            return Err(BuildError::ExternalAlias(name.to_string()));
        }

        let alias = self.module.aliases.push(GlobalAlias {
            name: name.to_string(),
            linkage,
            dso_local: true,
            aliasee,
        });
        self.declared.insert(name.to_string(), alias.into());
        Ok(alias)
    }

    pub fn set_alias_dso_local(&mut self, alias: AliasRef, dso_local: bool) {
        self.module.aliases[alias].dso_local = dso_local;
    }

    /// Redirects an alias. Used to build alias cycles, which can't be declared
    /// directly.
    pub fn set_aliasee(&mut self, alias: AliasRef, aliasee: GlobalRef) {
        self.module.aliases[alias].aliasee = aliasee;
    }

    pub fn lookup_global(&self, name: &str) -> Option<GlobalRef> {
        self.declared.get(name).copied()
    }

    pub fn sig(&self, func_ref: FuncRef) -> &Signature {
        &self.module.funcs[func_ref].sig
    }

    /// Returns the return type of a call to `callee`, following aliases.
    pub(super) fn callee_ret_ty(&self, callee: GlobalRef) -> Type {
        let mut current = callee;
        for _ in 0..=self.module.aliases.len() {
            match current {
                GlobalRef::Func(func_ref) => return self.sig(func_ref).ret_ty().clone(),
                GlobalRef::Alias(alias) => current = self.module.aliases[alias].aliasee,
            }
        }
        Type::Unit
    }

    pub fn func_builder(&mut self, func: FuncRef) -> FunctionBuilder {
        FunctionBuilder::new(self, func)
    }

    pub fn build(self) -> Module {
        self.module
    }
}
