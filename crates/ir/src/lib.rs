pub mod builder;
pub mod cfg;
pub mod data_layout;
pub mod dfg;
pub mod function;
pub mod inst;
pub mod ir_writer;
pub mod layout;
pub mod linkage;
pub mod module;
pub mod types;
pub mod value;

pub use builder::{FunctionBuilder, ModuleBuilder};
pub use cfg::ControlFlowGraph;
pub use data_layout::DataLayout;
pub use dfg::{Block, BlockId, DataFlowGraph, Use};
pub use function::{Function, Signature};
pub use inst::{InstData, InstId};
pub use layout::Layout;
pub use linkage::Linkage;
pub use module::{AliasRef, FuncRef, GlobalAlias, GlobalId, GlobalRef, Module};
pub use types::{Type, TypeSize};
pub use value::{Immediate, Value, ValueId};
