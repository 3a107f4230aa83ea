//! Interprocedural propagation of parameter access ranges.
//!
//! The solver is generic over the callee identity so the same code handles
//! functions of a single module and function summaries of a whole program.
use std::{collections::BTreeMap, fmt::Debug, hash::Hash};

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    config::StackSafetyConfig,
    info::FunctionInfo,
    range::{add_overflow_never, ConstantRange},
};

pub struct StackSafetyDataFlowAnalysis<C> {
    functions: BTreeMap<C, FunctionInfo<C>>,

    /// callee => functions calling it
    callers: FxHashMap<C, SmallVec<[C; 4]>>,

    /// Functions whose parameters must be recomputed.
    worklist: IndexSet<C>,

    unknown: ConstantRange,
    max_iterations: u32,
    verify_fixed_point: bool,
}

impl<C> StackSafetyDataFlowAnalysis<C>
where
    C: Copy + Ord + Hash + Debug,
{
    pub fn new(
        pointer_bits: u32,
        functions: BTreeMap<C, FunctionInfo<C>>,
        config: &StackSafetyConfig,
    ) -> Self {
        Self {
            functions,
            callers: FxHashMap::default(),
            worklist: IndexSet::new(),
            unknown: ConstantRange::full(pointer_bits),
            max_iterations: config.max_iterations,
            verify_fixed_point: config.verify_fixed_point,
        }
    }

    /// Widens parameter ranges until every parameter covers the ranges its
    /// callees access through it.
    pub fn run(&mut self) -> &BTreeMap<C, FunctionInfo<C>> {
        self.build_callers();
        self.update_all_nodes();
        while let Some(callee) = self.worklist.pop() {
            self.update_one_node(callee);
        }

        if self.verify_fixed_point {
            self.verify_fixed_point();
        }
        &self.functions
    }

    pub fn functions(&self) -> &BTreeMap<C, FunctionInfo<C>> {
        &self.functions
    }

    pub fn into_functions(self) -> BTreeMap<C, FunctionInfo<C>> {
        self.functions
    }

    /// Returns the range `callee` accesses through parameter `param_no`,
    /// shifted by `offsets`. Unknown callees and parameters access anything.
    pub fn get_argument_access_range(
        &self,
        callee: &C,
        param_no: u32,
        offsets: &ConstantRange,
    ) -> ConstantRange {
        let Some(use_info) = self
            .functions
            .get(callee)
            .and_then(|info| info.params.get(&param_no))
        else {
            return self.unknown;
        };

        let access = &use_info.range;
        if access.is_empty() {
            return *access;
        }
        if access.is_full() {
            return self.unknown;
        }
        add_overflow_never(access, offsets)
    }

    fn build_callers(&mut self) {
        for (&caller, info) in &self.functions {
            let mut callees: SmallVec<[C; 8]> = info
                .params
                .values()
                .flat_map(|use_info| use_info.calls.iter().map(|call| call.callee))
                .collect();
            callees.sort_unstable();
            callees.dedup();

            for callee in callees {
                self.callers.entry(callee).or_default().push(caller);
            }
        }
    }

    fn update_all_nodes(&mut self) {
        let callees: Vec<C> = self.functions.keys().copied().collect();
        for callee in callees {
            self.update_one_node(callee);
        }
    }

    fn update_one_node(&mut self, callee: C) {
        let Some(info) = self.functions.get(&callee) else {
            return;
        };
        let update_to_full = info.update_count > self.max_iterations;
        let param_nos: SmallVec<[u32; 8]> = info.params.keys().copied().collect();

        let mut changed = false;
        for param_no in param_nos {
            let mut idx = 0;
            loop {
                // A recursive call reads the use being updated, so every call
                // must see the previous widenings.
                let Some(use_info) = self
                    .functions
                    .get(&callee)
                    .and_then(|info| info.params.get(&param_no))
                else {
                    break;
                };
                let Some(call) = use_info.calls.get(idx) else {
                    break;
                };
                let callee_range =
                    self.get_argument_access_range(&call.callee, call.param_no, &call.offset);
                idx += 1;
                if use_info.range.contains(&callee_range) {
                    continue;
                }

                changed = true;
                let Some(use_info) = self
                    .functions
                    .get_mut(&callee)
                    .and_then(|info| info.params.get_mut(&param_no))
                else {
                    break;
                };
                if update_to_full {
                    use_info.set_unknown();
                } else {
                    use_info.update_range(&callee_range);
                }
            }
        }

        if !changed {
            return;
        }

        if let Some(info) = self.functions.get_mut(&callee) {
            debug!(
                func = ?callee,
                update_count = info.update_count,
                update_to_full,
                "widen parameter ranges"
            );
            info.update_count += 1;
        }
        if let Some(callers) = self.callers.get(&callee) {
            self.worklist.extend(callers.iter().copied());
        }
    }

    fn verify_fixed_point(&mut self) {
        self.worklist.clear();
        self.update_all_nodes();
        debug_assert!(
            self.worklist.is_empty(),
            "stack safety dataflow did not reach a fixed point"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        info::{CallInfo, Callee, UseInfo},
        summary::SummaryRef,
    };

    fn range(lower: i64, upper: i64) -> ConstantRange {
        ConstantRange::from_signed(64, lower, upper)
    }

    fn param<C>(access: ConstantRange, calls: Vec<CallInfo<C>>) -> UseInfo<C> {
        UseInfo {
            range: access,
            calls,
        }
    }

    fn function<C>(params: Vec<UseInfo<C>>) -> FunctionInfo<C> {
        let mut info = FunctionInfo::new();
        for (param_no, use_info) in params.into_iter().enumerate() {
            info.params.insert(param_no as u32, use_info);
        }
        info
    }

    fn summary(n: u32) -> Callee {
        Callee::Summary(SummaryRef::from_u32(n))
    }

    fn solve<C: Copy + Ord + Hash + Debug>(
        functions: BTreeMap<C, FunctionInfo<C>>,
    ) -> BTreeMap<C, FunctionInfo<C>> {
        let config = StackSafetyConfig::default().with_verify_fixed_point(true);
        let mut solver = StackSafetyDataFlowAnalysis::new(64, functions, &config);
        solver.run();
        solver.into_functions()
    }

    #[test]
    fn call_chain() {
        let empty = ConstantRange::empty(64);
        let functions = BTreeMap::from([
            (0, function(vec![param(range(0, 4), vec![])])),
            (
                1,
                function(vec![param(empty, vec![CallInfo::new(0, 0, range(4, 5))])]),
            ),
            (
                2,
                function(vec![param(range(-2, 0), vec![CallInfo::new(1, 0, range(8, 9))])]),
            ),
        ]);

        let result = solve(functions);
        assert_eq!(result[&0].params[&0].range, range(0, 4));
        assert_eq!(result[&1].params[&0].range, range(4, 8));
        assert_eq!(result[&2].params[&0].range, range(-2, 16));
    }

    fn param_ranges<C: Copy + Ord + Hash + Debug>(
        solver: &StackSafetyDataFlowAnalysis<C>,
    ) -> Vec<ConstantRange> {
        solver
            .functions()
            .values()
            .flat_map(|info| info.params.values().map(|use_info| use_info.range))
            .collect()
    }

    #[test]
    fn ranges_only_grow() {
        // 0 -> 1 -> 2 -> 0 moves the address forward on every trip around
        // the cycle, and 3 calls into the cycle.
        let functions = BTreeMap::from([
            (
                0,
                function(vec![param(range(0, 1), vec![CallInfo::new(1, 0, range(1, 2))])]),
            ),
            (
                1,
                function(vec![param(range(0, 2), vec![CallInfo::new(2, 0, range(2, 3))])]),
            ),
            (
                2,
                function(vec![param(range(0, 4), vec![CallInfo::new(0, 0, range(-1, 0))])]),
            ),
            (
                3,
                function(vec![param(
                    ConstantRange::empty(64),
                    vec![CallInfo::new(0, 0, range(8, 9))],
                )]),
            ),
        ]);
        let config = StackSafetyConfig::default().with_max_iterations(4);
        let mut solver = StackSafetyDataFlowAnalysis::new(64, functions, &config);
        solver.build_callers();

        let mut pending: Vec<i32> = solver.functions().keys().copied().collect();
        pending.reverse();
        let mut before = param_ranges(&solver);
        let mut steps = 0;
        while let Some(callee) = pending.pop().or_else(|| solver.worklist.pop()) {
            solver.update_one_node(callee);
            let after = param_ranges(&solver);
            for (old, new) in before.iter().zip(&after) {
                assert!(new.contains(old), "{old} widened to {new}");
            }
            before = after;
            steps += 1;
            assert!(steps < 1000);
        }

        for info in solver.functions().values() {
            assert!(info.params[&0].is_unknown());
            assert!(info.update_count <= config.max_iterations + 2);
        }
    }

    #[test]
    fn recursion_collapses_to_full() {
        // f(p) { *p; f(p + 1); }
        let functions = BTreeMap::from([(
            0,
            function(vec![param(range(0, 1), vec![CallInfo::new(0, 0, range(1, 2))])]),
        )]);

        let result = solve(functions);
        let info = &result[&0];
        assert!(info.params[&0].is_unknown());
        // One widening per round until the cap, then one collapse to full.
        assert_eq!(info.update_count, 22);
    }

    #[test]
    fn mutual_recursion_terminates() {
        let functions = BTreeMap::from([
            (
                0,
                function(vec![param(range(0, 1), vec![CallInfo::new(1, 0, range(1, 2))])]),
            ),
            (
                1,
                function(vec![param(range(0, 1), vec![CallInfo::new(0, 0, range(1, 2))])]),
            ),
        ]);

        let config = StackSafetyConfig::default();
        let result = solve(functions);
        for info in result.values() {
            assert!(info.params[&0].is_unknown());
            assert!(info.update_count <= config.max_iterations + 2);
        }
    }

    #[test]
    fn recursion_with_stable_range() {
        // f(p) { *p; f(p); }
        let functions = BTreeMap::from([(
            0,
            function(vec![param(range(0, 8), vec![CallInfo::new(0, 0, range(0, 1))])]),
        )]);

        let result = solve(functions);
        assert_eq!(result[&0].params[&0].range, range(0, 8));
        assert_eq!(result[&0].update_count, 0);
    }

    #[test]
    fn unknown_callees() {
        let empty = ConstantRange::empty(64);
        let functions = BTreeMap::from([
            (
                summary(0),
                function(vec![param(empty, vec![CallInfo::new(Callee::Unresolved, 0, range(0, 1))])]),
            ),
            (
                summary(1),
                function(vec![
                    param(empty, vec![]),
                    param(
                        empty,
                        vec![CallInfo::new(
                            summary(0),
                            1,
                            range(0, 1),
                        )],
                    ),
                ]),
            ),
        ]);

        let result = solve(functions);
        let first = &result[&summary(0)];
        assert!(first.params[&0].is_unknown());
        // The callee has no parameter 1.
        let second = &result[&summary(1)];
        assert!(second.params[&0].range.is_empty());
        assert!(second.params[&1].is_unknown());
    }

    #[test]
    fn argument_access_range() {
        let empty = ConstantRange::empty(64);
        let functions = BTreeMap::from([(
            0,
            function(vec![
                param(range(0, 4), vec![]),
                param(empty, vec![]),
                param(ConstantRange::full(64), vec![]),
            ]),
        )]);
        let config = StackSafetyConfig::default();
        let solver = StackSafetyDataFlowAnalysis::new(64, functions, &config);

        assert_eq!(solver.get_argument_access_range(&0, 0, &range(8, 10)), range(8, 13));
        assert!(solver.get_argument_access_range(&0, 1, &range(8, 10)).is_empty());
        assert!(solver.get_argument_access_range(&0, 2, &range(8, 10)).is_full());
        assert!(solver.get_argument_access_range(&0, 3, &range(8, 10)).is_full());
        assert!(solver.get_argument_access_range(&1, 0, &range(8, 10)).is_full());
        let near_max = ConstantRange::singleton(64, i64::MAX - 1);
        assert!(solver.get_argument_access_range(&0, 0, &near_max).is_full());
    }
}
