mod bitset;
mod config;

pub mod dataflow;
pub mod global;
pub mod info;
pub mod lifetime;
pub mod local;
pub mod offset;
pub mod range;
pub mod resolve;
pub mod summary;

pub use config::StackSafetyConfig;
pub use dataflow::StackSafetyDataFlowAnalysis;
pub use global::{StackSafetyGlobalInfo, StackSafetyStats};
pub use info::{CallInfo, Callee, FunctionInfo, UseInfo};
pub use lifetime::{LivenessOracle, StackLifetime};
pub use local::{static_alloca_size_range, StackSafetyInfo, StackSafetyLocalAnalysis, UseAnalysis};
pub use offset::{AddressOracle, SymbolicOffsets};
pub use range::{add_overflow_never, is_unsafe, ConstantRange};
pub use summary::{
    generate_param_access_summary, needs_param_access_summary, summarize_module,
    GlobalValueSummary, ParamAccess, ParamAccessCall, SummaryIndex, SummaryKind, SummaryRef,
};
