//! Access summaries of tracked addresses.
use std::{collections::BTreeMap, fmt};

use stacksafe_ir::{FuncRef, GlobalRef, InstId, Module};

use crate::{
    range::{ConstantRange, PreferredRangeType},
    summary::SummaryRef,
};

/// Identity of a callee as seen by the interprocedural solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Callee {
    /// A function defined in the analyzed module.
    Func(FuncRef),
    /// A function known only through a cross-module summary.
    Summary(SummaryRef),
    /// A callee nothing is known about. Any use passed to it is unknown.
    Unresolved,
}

/// Records that a tracked address, displaced by `offset`, was passed as
/// argument `param_no` to `callee`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo<C> {
    pub callee: C,
    pub param_no: u32,
    /// Never empty.
    pub offset: ConstantRange,
}

impl<C> CallInfo<C> {
    pub fn new(callee: C, param_no: u32, offset: ConstantRange) -> Self {
        debug_assert!(!offset.is_empty());
        Self {
            callee,
            param_no,
            offset,
        }
    }
}

/// Uses of a tracked address: the byte range accessed relative to the
/// address, and the calls the address was passed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseInfo<C> {
    /// Empty if no access is observed. Never sign wrapped.
    pub range: ConstantRange,
    pub calls: Vec<CallInfo<C>>,
}

impl<C> UseInfo<C> {
    pub fn new(pointer_bits: u32) -> Self {
        Self {
            range: ConstantRange::empty(pointer_bits),
            calls: Vec::new(),
        }
    }

    /// Widens the access range to cover `range`.
    pub fn update_range(&mut self, range: &ConstantRange) {
        let union = self.range.union_with(range, PreferredRangeType::Signed);
        self.range = if union.is_upper_sign_wrapped() {
            ConstantRange::full(union.bits())
        } else {
            union
        };
    }

    pub fn set_unknown(&mut self) {
        self.range = ConstantRange::full(self.range.bits());
    }

    pub fn is_unknown(&self) -> bool {
        self.range.is_full()
    }
}

impl UseInfo<Callee> {
    /// Makes the use unknown and drops its calls if any call goes to an
    /// unresolved callee. Offsets already folded into the range can't be
    /// taken back out, so one such call invalidates every other.
    pub fn collapse_unresolved(&mut self) -> bool {
        if !self.calls.iter().any(|call| call.callee == Callee::Unresolved) {
            return false;
        }
        self.set_unknown();
        self.calls.clear();
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo<C> {
    /// alloca => uses
    pub allocas: BTreeMap<InstId, UseInfo<C>>,
    /// parameter number => uses
    pub params: BTreeMap<u32, UseInfo<C>>,
    /// How many times the solver widened the parameters of the function.
    pub update_count: u32,
}

impl<C> Default for FunctionInfo<C> {
    fn default() -> Self {
        Self {
            allocas: BTreeMap::new(),
            params: BTreeMap::new(),
            update_count: 0,
        }
    }
}

impl<C> FunctionInfo<C> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Renders a [`UseInfo`] whose callees are module globals.
pub(crate) struct DisplayUseInfo<'a> {
    pub(crate) info: &'a UseInfo<GlobalRef>,
    pub(crate) module: &'a Module,
}

impl fmt::Display for DisplayUseInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.info.range)?;
        for call in &self.info.calls {
            write!(
                f,
                ", @{}(arg{}, {})",
                self.module.global_name(call.callee),
                call.param_no,
                call.offset
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_range_never_sign_wraps() {
        let mut info = UseInfo::<Callee>::new(8);
        info.update_range(&ConstantRange::from_signed(8, 0, 4));
        assert_eq!(info.range, ConstantRange::from_signed(8, 0, 4));
        assert!(!info.is_unknown());

        info.update_range(&ConstantRange::from_signed(8, 120, 127));
        assert_eq!(info.range, ConstantRange::from_signed(8, 0, 127));

        // [0, 128) can't be expressed without wrapping the signed domain.
        info.update_range(&ConstantRange::singleton(8, 127));
        assert!(info.is_unknown());
    }

    #[test]
    fn unresolved_calls_collapse() {
        let range = ConstantRange::from_signed(64, 0, 4);
        let call = CallInfo::new(Callee::Func(FuncRef::from_u32(0)), 0, range);
        let mut info = UseInfo {
            range,
            calls: vec![call.clone()],
        };
        assert!(!info.collapse_unresolved());
        assert_eq!(info.calls, vec![call.clone()]);

        info.calls.push(CallInfo::new(Callee::Unresolved, 1, range));
        assert!(info.collapse_unresolved());
        assert!(info.is_unknown());
        assert!(info.calls.is_empty());
    }
}
