//! End-to-end scenarios for the rooting checker.
//!
//! These tests play the host engine's role: they build declaration and
//! symbol tables, then fire the hook protocol (pre-call, intrinsic
//! evaluation, post-call, accesses) over a single explored path and
//! collect the findings.

use rootck::checker::Transition;
use rootck::decl::FunctionId;
use rootck::event::{
    AccessEvent, CallArg, CallEvent, CallOrigin, CallResult, FrameInfo, FunctionEntry,
    FunctionExit, ParamBinding, ReturnedValue,
};
use rootck::state::{PathState, ValueState};
use rootck::sym::{RegionId, SymbolId};
use rootck::types::TypeId;
use rootck::{AnalysisCx, Annotation, FindingKind, GcChecker};

/// A one-path host driver.
struct Host {
    checker: GcChecker,
    cx: AnalysisCx,
    state: PathState,
    findings: Vec<FindingKind>,
    current_fn: FunctionId,
    value_ptr: TypeId,
    scalar: TypeId,
}

impl Host {
    fn new() -> Self {
        let mut cx = AnalysisCx::new();
        let value = cx.types.named("vm_value_t");
        let value_ptr = cx.types.pointer_to(value);
        let scalar = cx.types.scalar();
        let current_fn = cx.decls.define_function("vm_dispatch");
        Self {
            checker: GcChecker::with_defaults(),
            cx,
            state: PathState::new(),
            findings: Vec::new(),
            current_fn,
            value_ptr,
            scalar,
        }
    }

    fn frame(&self) -> FrameInfo {
        FrameInfo {
            function: self.current_fn,
            height: 1,
        }
    }

    fn apply(&mut self, t: Transition) -> Option<SymbolId> {
        self.findings.extend(t.findings.iter().map(|f| f.kind));
        if let Some(state) = t.state {
            self.state = state;
        }
        t.synthesized
    }

    /// Fire the full call protocol for one call event.
    fn call(&mut self, call: &CallEvent) -> Option<SymbolId> {
        let pre = self.checker.pre_call(&self.cx, &self.state, call);
        self.apply(pre);
        let state = self.state.clone();
        if let Some(t) = self.checker.eval_call(&mut self.cx, &state, call) {
            return self.apply(t);
        }
        let post = self.checker.post_call(&mut self.cx, &state, call);
        self.apply(post)
    }

    fn simple_call(&mut self, callee: FunctionId, result_ty: TypeId) -> CallEvent {
        CallEvent {
            frame: self.frame(),
            callee: Some(callee),
            origin: CallOrigin::default(),
            args: Vec::new(),
            result: CallResult {
                ty: result_ty,
                symbol: None,
            },
            span: None,
        }
    }

    /// `x = vm_new_object()` - an allocating safepoint call.
    fn alloc(&mut self) -> SymbolId {
        let callee = self.cx.decls.define_function("vm_new_object");
        let ty = self.value_ptr;
        let call = self.simple_call(callee, ty);
        self.call(&call).expect("allocation synthesizes a symbol")
    }

    /// A call to a plain function that may collect.
    fn safepoint(&mut self) {
        let callee = self.cx.decls.define_function("vm_run_finalizers");
        let ty = self.scalar;
        let call = self.simple_call(callee, ty);
        self.call(&call);
    }

    /// `gc_push_roots(&slot)` with `slot` currently holding `held`.
    fn push(&mut self, slot: RegionId, held: Option<SymbolId>) {
        let callee = self.cx.decls.define_function("gc_push_roots");
        let ty = self.scalar;
        let mut call = self.simple_call(callee, ty);
        call.args = vec![CallArg {
            region: Some(slot),
            held_symbol: held,
            ..CallArg::default()
        }];
        self.call(&call);
    }

    fn pop(&mut self) {
        let callee = self.cx.decls.define_function("gc_pop_roots");
        let ty = self.scalar;
        let call = self.simple_call(callee, ty);
        self.call(&call);
    }

    /// `use(v)`: read a field through the value.
    fn use_value(&mut self, sym: SymbolId) {
        let pointee = self.cx.symbols.symbolic_region(sym);
        let field = self.cx.symbols.field_region(pointee, "header");
        let ev = AccessEvent {
            region: Some(field),
            loaded: None,
            is_load: true,
            span: None,
        };
        let t = self.checker.access(&mut self.cx, &self.state.clone(), &ev);
        self.apply(t);
    }

    fn has(&self, kind: FindingKind) -> bool {
        self.findings.contains(&kind)
    }
}

// ============================================================
// Scenario A: rooted values survive safepoints
// ============================================================

#[test]
fn rooted_value_survives_safepoint() {
    let mut host = Host::new();
    let x = host.alloc();
    let ty = host.value_ptr;
    let slot = host.cx.symbols.local_region(ty);
    host.push(slot, Some(x));
    host.safepoint();
    host.use_value(x);
    assert!(
        host.findings.is_empty(),
        "no diagnostic expected, got {:?}",
        host.findings
    );
    assert!(host.state.value(x).expect("tracked").is_rooted());
    host.pop();
}

// ============================================================
// Scenario B: unrooted values die at safepoints
// ============================================================

#[test]
fn unrooted_value_is_killed_and_use_reported() {
    let mut host = Host::new();
    let y = host.alloc();
    host.safepoint();
    assert!(host.state.value(y).expect("tracked").is_potentially_freed());
    host.use_value(y);
    assert!(host.has(FindingKind::UseOfPossiblyCollected));
}

#[test]
fn passing_killed_value_as_argument_is_reported() {
    let mut host = Host::new();
    let y = host.alloc();
    host.safepoint();

    let callee = host.cx.decls.define_function("vm_apply");
    let ty = host.scalar;
    let mut call = host.simple_call(callee, ty);
    call.args = vec![CallArg {
        symbol: Some(y),
        tracked: true,
        ..CallArg::default()
    }];
    host.call(&call);
    assert!(host.has(FindingKind::UseOfPossiblyCollected));
}

// ============================================================
// Scenario C: pop without push
// ============================================================

#[test]
fn pop_without_push_is_unbalanced() {
    let mut host = Host::new();
    host.pop();
    assert!(host.has(FindingKind::UnbalancedRootFrame));
}

// ============================================================
// Scenario D: boxing fast path
// ============================================================

#[test]
fn small_signed_literal_boxes_to_cached_value() {
    let mut host = Host::new();
    let callee = host.cx.decls.define_function("vm_box_i64");
    let ty = host.value_ptr;
    let mut call = host.simple_call(callee, ty);
    call.args = vec![CallArg {
        literal: Some(5),
        ..CallArg::default()
    }];
    let sym = host.call(&call).expect("result symbol");
    assert_eq!(
        host.state.value(sym).copied().expect("tracked"),
        ValueState::permanently_rooted()
    );
}

#[test]
fn large_signed_literal_boxes_to_fresh_allocation() {
    let mut host = Host::new();
    let callee = host.cx.decls.define_function("vm_box_i64");
    let ty = host.value_ptr;
    let mut call = host.simple_call(callee, ty);
    call.args = vec![CallArg {
        literal: Some(5000),
        ..CallArg::default()
    }];
    let sym = host.call(&call).expect("result symbol");
    assert!(host.state.value(sym).expect("tracked").is_just_allocated());
}

// ============================================================
// Scenario E: maybe-unrooted parameters
// ============================================================

#[test]
fn maybe_unrooted_parameter_starts_allocated_in_safepoint_function() {
    let mut host = Host::new();
    let func = host.cx.decls.define_function("vm_describe");
    let ty = host.value_ptr;
    let idx = host
        .cx
        .decls
        .function_mut(func)
        .add_param(rootck::decl::ParamDecl::new(ty));
    host.cx
        .decls
        .function_mut(func)
        .annotate_param(idx, Annotation::MaybeUnrooted);
    assert!(!host.cx.decls.is_not_safepoint(func, host.checker.config()));

    let region = host.cx.symbols.param_region(func, idx, ty);
    let sym = host.cx.symbols.region_value(region);
    let entry = FunctionEntry {
        frame: FrameInfo {
            function: func,
            height: 1,
        },
        top: true,
        params: vec![ParamBinding {
            index: idx,
            region: Some(region),
            symbol: Some(sym),
        }],
        caller_args: Vec::new(),
    };
    let state = host.state.clone();
    let t = host.checker.begin_function(&mut host.cx, &state, &entry);
    host.apply(t);
    assert!(host.state.value(sym).expect("tracked").is_just_allocated());
}

// ============================================================
// Whole-function flows
// ============================================================

#[test]
fn balanced_function_with_rooting_is_clean() {
    let mut host = Host::new();
    let x = host.alloc();
    let ty = host.value_ptr;
    let slot = host.cx.symbols.local_region(ty);
    host.push(slot, Some(x));
    host.safepoint();
    host.safepoint();
    host.use_value(x);
    host.pop();

    let exit = FunctionExit {
        frame: host.frame(),
        top: true,
        returned: None,
    };
    let state = host.state.clone();
    let t = host.checker.end_function(&host.cx, &state, &exit);
    host.apply(t);
    assert!(host.findings.is_empty(), "got {:?}", host.findings);
}

#[test]
fn value_unrooted_by_pop_dies_at_next_safepoint() {
    let mut host = Host::new();
    let x = host.alloc();
    let ty = host.value_ptr;
    let slot = host.cx.symbols.local_region(ty);
    host.push(slot, Some(x));
    host.safepoint();
    host.pop();
    // The root frame is gone; the next safepoint may collect x.
    host.safepoint();
    assert!(host.state.value(x).expect("tracked").is_potentially_freed());
    host.use_value(x);
    assert!(host.has(FindingKind::UseOfPossiblyCollected));
}

#[test]
fn returning_killed_value_is_reported() {
    let mut host = Host::new();
    let y = host.alloc();
    host.safepoint();
    let exit = FunctionExit {
        frame: host.frame(),
        top: true,
        returned: Some(ReturnedValue {
            symbol: Some(y),
            tracked: true,
            span: None,
        }),
    };
    let state = host.state.clone();
    let t = host.checker.end_function(&host.cx, &state, &exit);
    host.apply(t);
    assert!(host.has(FindingKind::UseOfPossiblyCollected));
}

#[test]
fn unpopped_frame_is_reported_at_exit() {
    let mut host = Host::new();
    let ty = host.value_ptr;
    let slot = host.cx.symbols.local_region(ty);
    host.push(slot, None);
    let exit = FunctionExit {
        frame: host.frame(),
        top: true,
        returned: None,
    };
    let state = host.state.clone();
    let t = host.checker.end_function(&host.cx, &state, &exit);
    host.apply(t);
    assert!(host.has(FindingKind::UnbalancedRootFrame));
}

#[test]
fn promise_rooted_silences_later_uses() {
    let mut host = Host::new();
    let x = host.alloc();
    let callee = host.cx.decls.define_function("gc_promise_rooted");
    let ty = host.scalar;
    let mut call = host.simple_call(callee, ty);
    call.args = vec![CallArg {
        symbol: Some(x),
        tracked: true,
        ..CallArg::default()
    }];
    host.call(&call);
    host.safepoint();
    host.use_value(x);
    assert!(host.findings.is_empty(), "got {:?}", host.findings);
}

#[test]
fn lock_region_forbids_safepoints_until_release() {
    let mut host = Host::new();
    let lock = host.cx.decls.define_function("mutex_lock");
    let unlock = host.cx.decls.define_function("mutex_unlock");
    let ty = host.scalar;

    let call = host.simple_call(lock, ty);
    host.call(&call);
    assert!(!host.state.safepoint_enabled());

    // A safepoint inside the lock region is a violation.
    host.safepoint();
    assert!(host.has(FindingKind::SafepointViolation));

    let call = host.simple_call(unlock, ty);
    host.call(&call);
    assert!(host.state.safepoint_enabled());
}

#[test]
fn gc_disabled_region_suppresses_kills_until_reenabled() {
    let mut host = Host::new();
    let toggle = host.cx.decls.define_function("gc_set_enabled");
    let ty = host.scalar;

    let x = host.alloc();
    let mut disable = host.simple_call(toggle, ty);
    disable.args = vec![CallArg {
        literal: Some(0),
        ..CallArg::default()
    }];
    host.call(&disable);

    host.safepoint();
    assert!(host.state.value(x).expect("tracked").is_just_allocated());

    let mut enable = host.simple_call(toggle, ty);
    enable.args = vec![CallArg {
        literal: Some(1),
        ..CallArg::default()
    }];
    host.call(&enable);

    host.safepoint();
    assert!(host.state.value(x).expect("tracked").is_potentially_freed());
}
