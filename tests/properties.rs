//! Property-based tests for the rooting checker.
//!
//! Uses proptest to generate random operation sequences and verify the
//! lattice invariants hold.

use proptest::prelude::*;

use rootck::decl::FunctionId;
use rootck::event::{CallArg, CallEvent, CallOrigin, CallResult, FrameInfo};
use rootck::state::{PathState, ValueState};
use rootck::sym::SymbolId;
use rootck::types::TypeId;
use rootck::{AnalysisCx, FindingKind, GcChecker};

struct Driver {
    checker: GcChecker,
    cx: AnalysisCx,
    value_ptr: TypeId,
    scalar: TypeId,
    host_fn: FunctionId,
}

impl Driver {
    fn new() -> Self {
        let mut cx = AnalysisCx::new();
        let value = cx.types.named("vm_value_t");
        let value_ptr = cx.types.pointer_to(value);
        let scalar = cx.types.scalar();
        let host_fn = cx.decls.define_function("vm_dispatch");
        Self {
            checker: GcChecker::with_defaults(),
            cx,
            value_ptr,
            scalar,
            host_fn,
        }
    }

    fn call_named(&mut self, name: &str, result_ty: TypeId, args: Vec<CallArg>) -> CallEvent {
        let callee = self.cx.decls.define_function(name);
        CallEvent {
            frame: FrameInfo {
                function: self.host_fn,
                height: 1,
            },
            callee: Some(callee),
            origin: CallOrigin::default(),
            args,
            result: CallResult {
                ty: result_ty,
                symbol: None,
            },
            span: None,
        }
    }

    fn alloc(&mut self, state: &PathState) -> (PathState, SymbolId) {
        let ty = self.value_ptr;
        let call = self.call_named("vm_new_object", ty, Vec::new());
        let t = self.checker.post_call(&mut self.cx, state, &call);
        (
            t.state.expect("allocation changes state"),
            t.synthesized.expect("fresh symbol"),
        )
    }

    fn safepoint(&mut self, state: &PathState) -> PathState {
        let ty = self.scalar;
        let call = self.call_named("vm_run_finalizers", ty, Vec::new());
        let t = self.checker.post_call(&mut self.cx, state, &call);
        t.state.unwrap_or_else(|| state.clone())
    }

    fn push_empty(&mut self, state: &PathState) -> PathState {
        let ty = self.value_ptr;
        let slot = self.cx.symbols.local_region(ty);
        let scalar = self.scalar;
        let call = self.call_named(
            "gc_push_roots",
            scalar,
            vec![CallArg {
                region: Some(slot),
                ..CallArg::default()
            }],
        );
        let t = self
            .checker
            .eval_call(&mut self.cx, state, &call)
            .expect("intrinsic");
        t.state.expect("push changes state")
    }

    fn pop(&mut self, state: &PathState) -> (PathState, bool) {
        let scalar = self.scalar;
        let call = self.call_named("gc_pop_roots", scalar, Vec::new());
        let t = self
            .checker
            .eval_call(&mut self.cx, state, &call)
            .expect("intrinsic");
        let unbalanced = t
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::UnbalancedRootFrame);
        (t.state.unwrap_or_else(|| state.clone()), unbalanced)
    }
}

proptest! {
    /// Depth bookkeeping: a run of pushes and pops tracks the expected
    /// depth exactly, and every pop at depth zero is reported.
    #[test]
    fn push_pop_balance(ops in proptest::collection::vec(any::<bool>(), 0..24)) {
        let mut driver = Driver::new();
        let mut state = PathState::new();
        let mut expected: u32 = 0;
        for is_push in ops {
            if is_push {
                state = driver.push_empty(&state);
                expected += 1;
            } else {
                let (next, unbalanced) = driver.pop(&state);
                prop_assert_eq!(unbalanced, expected == 0);
                if expected > 0 {
                    expected -= 1;
                }
                state = next;
            }
            prop_assert_eq!(state.gc_depth, expected);
        }
    }

    /// Safepoint kill: every unrooted value is demoted, every rooted
    /// value survives, independent of how many of each there are.
    #[test]
    fn safepoint_kill_is_exact(unrooted in 0usize..6, rooted in 0usize..6) {
        let mut driver = Driver::new();
        let mut state = PathState::new();
        let mut unrooted_syms = Vec::new();
        let mut rooted_syms = Vec::new();
        for _ in 0..unrooted {
            let (next, sym) = driver.alloc(&state);
            state = next;
            unrooted_syms.push(sym);
        }
        for _ in 0..rooted {
            let (mut next, sym) = driver.alloc(&state);
            next.values.insert(sym, ValueState::rooted(None, 0));
            state = next;
            rooted_syms.push(sym);
        }
        // Each allocation is itself a safepoint, so earlier unrooted
        // values may already be gone; re-assert them as allocated to
        // test exactly one kill.
        for sym in &unrooted_syms {
            state.values.insert(*sym, ValueState::allocated());
        }
        let after = driver.safepoint(&state);
        for sym in &unrooted_syms {
            prop_assert!(after.value(*sym).expect("tracked").is_potentially_freed());
        }
        for sym in &rooted_syms {
            prop_assert!(after.value(*sym).expect("tracked").is_rooted());
        }
    }

    /// No silent resurrection: once potentially freed, further
    /// safepoints never bring a value back.
    #[test]
    fn freed_values_stay_freed(extra_safepoints in 1usize..5) {
        let mut driver = Driver::new();
        let state = PathState::new();
        let (state, sym) = driver.alloc(&state);
        let mut state = driver.safepoint(&state);
        prop_assert!(state.value(sym).expect("tracked").is_potentially_freed());
        for _ in 0..extra_safepoints {
            state = driver.safepoint(&state);
            prop_assert!(state.value(sym).expect("tracked").is_potentially_freed());
        }
    }

    /// The boxing fast path matches the configured cache ranges, and
    /// nothing else.
    #[test]
    fn signed_boxing_range_is_exact(literal in -2048i64..2048) {
        let mut driver = Driver::new();
        let ty = driver.value_ptr;
        let call = driver.call_named(
            "vm_box_i64",
            ty,
            vec![CallArg { literal: Some(literal), ..CallArg::default() }],
        );
        let t = driver.checker.post_call(&mut driver.cx, &PathState::new(), &call);
        let state = t.state.expect("classified");
        let sym = t.synthesized.expect("fresh symbol");
        let cached = (-512..=511).contains(&literal);
        prop_assert_eq!(state.value(sym).expect("tracked").is_rooted(), cached);
    }

    /// Rooting soundness: after a frame pops, no surviving value is
    /// still rooted at the popped depth.
    #[test]
    fn pop_invalidates_exactly_the_popped_depth(frames in 1usize..5) {
        let mut driver = Driver::new();
        let mut state = PathState::new();
        let mut syms = Vec::new();
        for _ in 0..frames {
            let (next, sym) = driver.alloc(&state);
            state = next;
            let ty = driver.value_ptr;
            let slot = driver.cx.symbols.local_region(ty);
            let scalar = driver.scalar;
            let call = driver.call_named(
                "gc_push_roots",
                scalar,
                vec![CallArg {
                    region: Some(slot),
                    held_symbol: Some(sym),
                    ..CallArg::default()
                }],
            );
            state = driver
                .checker
                .eval_call(&mut driver.cx, &state, &call)
                .expect("intrinsic")
                .state
                .expect("pushed");
            syms.push(sym);
        }
        // Pop the innermost frame: only its value loses the root.
        let (state, unbalanced) = driver.pop(&state);
        prop_assert!(!unbalanced);
        let popped_depth = state.gc_depth as i32;
        for (idx, sym) in syms.iter().enumerate() {
            let vs = state.value(*sym).expect("tracked");
            if idx + 1 == frames {
                prop_assert!(vs.is_just_allocated());
            } else {
                prop_assert!(vs.is_rooted());
                prop_assert!(vs.root_depth().expect("rooted") < popped_depth);
            }
        }
    }
}
