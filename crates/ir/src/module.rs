use std::{
    fmt,
    hash::{Hash, Hasher},
};

use cranelift_entity::{entity_impl, PrimaryMap};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use stacksafe_triple::TargetTriple;

use crate::{DataLayout, Function, Linkage};

#[derive(Debug, Clone)]
pub struct Module {
    /// Name of the module, used to qualify local symbols.
    pub name: String,

    pub triple: TargetTriple,

    pub data_layout: DataLayout,

    /// Holds all function declared in the module.
    pub funcs: PrimaryMap<FuncRef, Function>,

    /// Holds all aliases declared in the module.
    pub aliases: PrimaryMap<AliasRef, GlobalAlias>,
}

impl Module {
    #[doc(hidden)]
    pub fn new(name: &str, triple: TargetTriple) -> Self {
        let data_layout = DataLayout::from_triple(&triple);
        Self {
            name: name.to_string(),
            triple,
            data_layout,
            funcs: PrimaryMap::default(),
            aliases: PrimaryMap::default(),
        }
    }

    /// Returns `func_ref` in the module.
    pub fn iter_functions(&self) -> impl Iterator<Item = FuncRef> {
        self.funcs.keys()
    }

    pub fn global_name(&self, global: GlobalRef) -> &str {
        match global {
            GlobalRef::Func(func_ref) => self.funcs[func_ref].sig.name(),
            GlobalRef::Alias(alias) => &self.aliases[alias].name,
        }
    }

    pub fn global_linkage(&self, global: GlobalRef) -> Linkage {
        match global {
            GlobalRef::Func(func_ref) => self.funcs[func_ref].sig.linkage(),
            GlobalRef::Alias(alias) => self.aliases[alias].linkage,
        }
    }

    pub fn is_dso_local(&self, global: GlobalRef) -> bool {
        match global {
            GlobalRef::Func(func_ref) => self.funcs[func_ref].sig.is_dso_local(),
            GlobalRef::Alias(alias) => self.aliases[alias].dso_local,
        }
    }

    /// Returns `true` if the global has no definition in this module.
    pub fn is_declaration(&self, global: GlobalRef) -> bool {
        match global {
            GlobalRef::Func(func_ref) => self.funcs[func_ref].is_declaration(),
            GlobalRef::Alias(_) => false,
        }
    }

    /// Returns the cross-module identifier of the global.
    pub fn global_id(&self, global: GlobalRef) -> GlobalId {
        let name = self.global_name(global);
        if self.global_linkage(global).is_local() {
            GlobalId::of_local(&self.name, name)
        } else {
            GlobalId::of(name)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncRef(u32);
entity_impl!(FuncRef);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AliasRef(u32);
entity_impl!(AliasRef);

/// A reference to a global symbol that can be called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GlobalRef {
    Func(FuncRef),
    Alias(AliasRef),
}

impl From<FuncRef> for GlobalRef {
    fn from(func_ref: FuncRef) -> Self {
        Self::Func(func_ref)
    }
}

impl From<AliasRef> for GlobalRef {
    fn from(alias: AliasRef) -> Self {
        Self::Alias(alias)
    }
}

/// Another name of a global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalAlias {
    pub name: String,
    pub linkage: Linkage,
    pub dso_local: bool,
    pub aliasee: GlobalRef,
}

/// Identifier of a global symbol that is stable across modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalId(pub u64);

impl GlobalId {
    pub fn of(name: &str) -> Self {
        let mut hasher = FxHasher::default();
        name.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Local symbols are qualified with their module name.
    pub fn of_local(module: &str, name: &str) -> Self {
        Self::of(&format!("{module};{name}"))
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "guid:{:016x}", self.0)
    }
}
