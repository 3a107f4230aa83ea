use smallvec::SmallVec;

use super::{DataFlowGraph, Layout, Type, ValueId};
use crate::Linkage;

#[derive(Debug, Clone)]
pub struct Function {
    pub sig: Signature,
    pub arg_values: SmallVec<[ValueId; 8]>,
    pub dfg: DataFlowGraph,
    pub layout: Layout,
}

impl Function {
    pub fn new(sig: Signature) -> Self {
        let mut dfg = DataFlowGraph::new();
        let arg_values = sig
            .args()
            .iter()
            .enumerate()
            .map(|(idx, arg_ty)| dfg.make_arg_value(arg_ty.clone(), idx))
            .collect();

        Self {
            sig,
            arg_values,
            dfg,
            layout: Layout::default(),
        }
    }

    /// Returns `true` if the function has no body in this module.
    pub fn is_declaration(&self) -> bool {
        self.layout.entry_block().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    /// Name of the function.
    name: String,

    /// Linkage of the function.
    linkage: Linkage,

    /// `true` if the symbol is known to resolve within the current linkage
    /// unit, i.e. it can't be preempted by a definition in another one.
    dso_local: bool,

    args: SmallVec<[Type; 8]>,

    /// Parameters passed by value, i.e. pointers to a caller made copy.
    byval_params: SmallVec<[usize; 2]>,

    ret_ty: Type,

    /// The function is instrumented with memory tagging.
    sanitize_memtag: bool,
}

impl Signature {
    pub fn new(name: &str, linkage: Linkage, args: &[Type], ret_ty: Type) -> Self {
        Self {
            name: name.to_string(),
            linkage,
            dso_local: linkage != Linkage::External,
            args: args.into(),
            byval_params: SmallVec::new(),
            ret_ty,
            sanitize_memtag: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    pub fn is_dso_local(&self) -> bool {
        self.dso_local
    }

    pub fn set_dso_local(&mut self, dso_local: bool) {
        self.dso_local = dso_local;
    }

    pub fn args(&self) -> &[Type] {
        &self.args
    }

    pub fn ret_ty(&self) -> &Type {
        &self.ret_ty
    }

    pub fn is_byval_param(&self, idx: usize) -> bool {
        self.byval_params.contains(&idx)
    }

    pub fn with_byval_param(mut self, idx: usize) -> Self {
        debug_assert!(self.args.get(idx).is_some_and(Type::is_pointer));
        if !self.byval_params.contains(&idx) {
            self.byval_params.push(idx);
        }
        self
    }

    pub fn sanitize_memtag(&self) -> bool {
        self.sanitize_memtag
    }

    pub fn with_sanitize_memtag(mut self) -> Self {
        self.sanitize_memtag = true;
        self
    }
}
