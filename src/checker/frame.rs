//! The root-frame state machine: function entry/exit and the rooting
//! intrinsics.
//!
//! Root frames are lexically scoped groups of root slots pushed and
//! popped together; `gc_depth` is the nesting level. The intrinsics are
//! recognized by callee name and fully modeled here - they have no other
//! effects on the surrounding environment.

use tracing::debug;

use crate::annot::Annotation;
use crate::diagnostics::{Finding, FindingKind};
use crate::event::{CallEvent, FunctionEntry, FunctionExit};
use crate::state::{PathState, RootState, ValueState, PERMANENT_DEPTH};
use crate::sym::{RegionId, SymbolId};

use super::{walk_to_root, AnalysisCx, GcChecker, Transition};

impl GcChecker {
    /// Function-entry hook.
    ///
    /// Top-frame tracked parameters are classified by the function's
    /// safepoint contract; inlined frames instead re-derive argument
    /// rootedness from the caller's state, since inlining changes which
    /// state slot is authoritative.
    pub fn begin_function(
        &self,
        cx: &mut AnalysisCx,
        state: &PathState,
        entry: &FunctionEntry,
    ) -> Transition {
        let mut next = state.clone();
        let mut changed = false;
        let mut findings = Vec::new();
        let func = entry.frame.function;
        let height = entry.frame.height;

        if entry.top {
            next.gc_disabled_at = None;
            next.safepoint_disabled_at = None;
            changed = true;
        }

        let (gc_disabled_ann, leave_ann) = {
            let annotations = cx.decls.function(func).annotations;
            (
                annotations.contains(Annotation::GcDisabled),
                annotations.contains(Annotation::NotSafepointLeave),
            )
        };
        if next.gc_enabled() && gc_disabled_ann {
            next.gc_disabled_at = Some(height);
            changed = true;
        }
        let is_fn_safepoint = self.function_is_safepoint(cx, func);
        if next.safepoint_enabled() && (!is_fn_safepoint || leave_ann) {
            next.safepoint_disabled_at = Some(height);
            changed = true;
        }

        if !entry.top {
            changed |= self.propagate_argument_rootedness(cx, &mut next, entry, &mut findings);
            return Transition {
                state: changed.then_some(next),
                findings,
                ..Transition::default()
            };
        }

        for binding in &entry.params {
            if cx
                .decls
                .function(func)
                .param_has(binding.index, Annotation::RequireRootedSlot)
            {
                if let Some(region) = binding.region {
                    next.roots.insert(region, RootState::root(PERMANENT_DEPTH));
                    changed = true;
                }
                continue;
            }
            let Some(ty) = cx
                .decls
                .function(func)
                .params
                .get(binding.index)
                .map(|p| p.ty)
            else {
                continue;
            };
            if !self.config().types.is_tracked(&cx.types, ty) {
                continue;
            }
            let Some(sym) = binding.symbol else { continue };
            next.values
                .insert(sym, self.argument_entry_state(cx, func, binding.index));
            changed = true;
        }

        Transition {
            state: changed.then_some(next),
            findings,
            ..Transition::default()
        }
    }

    /// Re-derive parameter rootedness from the caller's state when
    /// control enters an inlined callee.
    fn propagate_argument_rootedness(
        &self,
        cx: &AnalysisCx,
        next: &mut PathState,
        entry: &FunctionEntry,
        findings: &mut Vec<Finding>,
    ) -> bool {
        let func = entry.frame.function;
        let mut changed = false;
        let param_types: Vec<_> = cx
            .decls
            .function(func)
            .params
            .iter()
            .map(|p| p.ty)
            .collect();
        for (idx, ty) in param_types.iter().enumerate() {
            if !self.config().types.is_tracked(&cx.types, *ty) {
                continue;
            }
            let caller = entry.caller_args.get(idx).copied().unwrap_or_default();
            let arg_sym = walk_to_root(&cx.symbols, next, caller.region, |_, vs| vs.is_none())
                .or(caller.symbol);
            let Some(arg_sym) = arg_sym else { continue };
            let Some(caller_state) = next.value(arg_sym).copied() else {
                // The caller should have classified this value; a gap
                // here is a propagation hole, not a program bug.
                findings.push(
                    Finding::new(
                        FindingKind::CheckerInternalInconsistency,
                        "missed allocation of an inlined call's parameter",
                    )
                    .with_symbol(arg_sym),
                );
                continue;
            };
            let Some(param_sym) = entry
                .params
                .iter()
                .find(|p| p.index == idx)
                .and_then(|p| p.symbol)
            else {
                continue;
            };
            let new_state = if self.config().types.is_permanently_rooted(&cx.types, *ty) {
                ValueState::permanently_rooted()
            } else {
                caller_state
            };
            next.values.insert(param_sym, new_state);
            changed = true;
        }
        changed
    }

    /// Function-exit hook.
    pub fn end_function(
        &self,
        cx: &AnalysisCx,
        state: &PathState,
        exit: &FunctionExit,
    ) -> Transition {
        let mut next = state.clone();
        let mut changed = false;
        let mut findings = Vec::new();
        let func = exit.frame.function;
        let height = exit.frame.height;

        if let Some(ret) = &exit.returned {
            if state.gc_enabled() && ret.tracked {
                if let Some(sym) = ret.symbol {
                    if state
                        .value(sym)
                        .map(|v| v.is_potentially_freed())
                        .unwrap_or(false)
                    {
                        findings.push(
                            Finding::new(
                                FindingKind::UseOfPossiblyCollected,
                                "return value may have been collected",
                            )
                            .with_symbol(sym)
                            .with_span(ret.span),
                        );
                    }
                }
            }
        }

        if state.gc_disabled_at == Some(height) {
            next.gc_disabled_at = None;
            changed = true;
        }
        if state.safepoint_disabled_at == Some(height) {
            let justified = cx.decls.is_not_safepoint(func, self.config())
                || cx
                    .decls
                    .function(func)
                    .annotations
                    .contains(Annotation::NotSafepointEnter);
            if !justified {
                findings.push(Finding::new(
                    FindingKind::AnnotationContractViolation,
                    "safepoints still disabled at end of function",
                ));
            }
            next.safepoint_disabled_at = None;
            changed = true;
        }

        if exit.top && state.gc_depth != 0 {
            findings.push(Finding::new(
                FindingKind::UnbalancedRootFrame,
                "root frame still pushed at end of function",
            ));
        }

        Transition {
            state: changed.then_some(next),
            findings,
            ..Transition::default()
        }
    }

    /// Model the rooting intrinsics. Returns `None` when the call is not
    /// one of them, in which case the host proceeds with the ordinary
    /// call modeling.
    pub fn eval_call(
        &self,
        cx: &mut AnalysisCx,
        state: &PathState,
        call: &CallEvent,
    ) -> Option<Transition> {
        let callee = call.callee?;
        let name = cx.decls.function_name(callee).to_string();
        match name.as_str() {
            "gc_push_roots" => Some(self.eval_push(state, call)),
            "gc_push_slot_array" => Some(self.eval_push_slot_array(state, call)),
            "gc_push_vec_items" => Some(self.eval_push_vec_items(cx, state, call)),
            "gc_pop_roots" => Some(self.eval_pop(state)),
            "gc_promise_rooted" => Some(self.eval_promise(state, call)),
            "gc_preserve" => Some(self.eval_preserve(state, call)),
            "gc_set_enabled" => Some(self.eval_toggle(state, call)),
            _ => {
                // Taking a lock (or an annotated one-way enter) forbids
                // triggering collection until the matching release.
                let enters = self.config().is_lock_acquire(&name)
                    || cx
                        .decls
                        .function(callee)
                        .annotations
                        .contains(Annotation::NotSafepointEnter);
                if enters && state.safepoint_enabled() {
                    let mut next = state.clone();
                    next.safepoint_disabled_at = Some(call.frame.height);
                    return Some(Transition::to(next));
                }
                None
            }
        }
    }

    /// `gc_push_roots(slot...)`: register each slot as a root at the
    /// current depth, promote currently-held values, then deepen.
    fn eval_push(&self, state: &PathState, call: &CallEvent) -> Transition {
        let mut next = state.clone();
        let mut findings = Vec::new();
        let depth = state.gc_depth as i32;
        for arg in &call.args {
            let Some(region) = arg.region else {
                findings.push(
                    Finding::new(
                        FindingKind::MalformedRootingOp,
                        "root frame push on something other than a local slot",
                    )
                    .with_span(call.span),
                );
                return Transition {
                    findings,
                    ..Transition::default()
                };
            };
            next.roots.insert(region, RootState::root(depth));
            let Some(sym) = arg.held_symbol else { continue };
            let Some(held) = next.value(sym).copied() else { continue };
            if held.is_potentially_freed() {
                findings.push(
                    Finding::new(
                        FindingKind::UseOfPossiblyCollected,
                        "rooting a value which may already have been collected",
                    )
                    .with_symbol(sym)
                    .with_span(arg.span),
                );
            }
            if !held.is_rooted() {
                next.values
                    .insert(sym, ValueState::rooted(Some(region), depth));
            }
        }
        next.gc_depth += 1;
        debug!(depth = next.gc_depth, slots = call.args.len(), "pushed root frame");
        Transition {
            state: Some(next),
            findings,
            ..Transition::default()
        }
    }

    /// `gc_push_slot_array(array)`: one region standing for a whole
    /// vector of root slots.
    fn eval_push_slot_array(&self, state: &PathState, call: &CallEvent) -> Transition {
        let Some(region) = call.args.first().and_then(|a| a.region) else {
            return Transition {
                findings: vec![Finding::new(
                    FindingKind::MalformedRootingOp,
                    "root frame push on something other than a slot array",
                )
                .with_span(call.span)],
                ..Transition::default()
            };
        };
        let mut next = state.clone();
        next.roots
            .insert(region, RootState::root_array(state.gc_depth as i32));
        next.gc_depth += 1;
        Transition::to(next)
    }

    /// `gc_push_vec_items(ctx, vec)`: root the backing buffer of a
    /// dynamic vector. The buffer region is resolved through the vector's
    /// `items` field.
    fn eval_push_vec_items(
        &self,
        cx: &mut AnalysisCx,
        state: &PathState,
        call: &CallEvent,
    ) -> Transition {
        let mut next = state.clone();
        let depth = state.gc_depth as i32;
        next.gc_depth += 1;
        let Some(vec_region) = call.args.get(1).and_then(|a| a.region) else {
            return Transition::to(next);
        };
        let items_field = cx.symbols.field_region(vec_region, "items");
        let items_value = cx.symbols.region_value(items_field);
        let buffer = cx.symbols.symbolic_region(items_value);
        next.roots.insert(buffer, RootState::root_array(depth));
        Transition::to(next)
    }

    /// `gc_pop_roots()`: release every root registered by the matching
    /// push, and un-root the values they were keeping alive.
    fn eval_pop(&self, state: &PathState) -> Transition {
        if state.gc_depth == 0 {
            return Transition {
                findings: vec![Finding::new(
                    FindingKind::UnbalancedRootFrame,
                    "pop of a root frame without a matching push",
                )],
                ..Transition::default()
            };
        }
        let mut next = state.clone();
        next.gc_depth -= 1;
        let popped_depth = next.gc_depth as i32;

        let released: Vec<RegionId> = next
            .roots
            .iter()
            .filter(|(_, rs)| rs.should_pop_at(popped_depth))
            .map(|(region, _)| *region)
            .collect();
        for region in &released {
            next.roots.remove(region);
        }

        let unrooted: Vec<SymbolId> = next
            .values
            .iter()
            .filter(|(_, vs)| released.iter().any(|region| vs.is_rooted_by(*region)))
            .map(|(sym, _)| *sym)
            .collect();
        for sym in unrooted {
            next.values.insert(sym, ValueState::allocated());
        }
        debug!(depth = next.gc_depth, released = released.len(), "popped root frame");
        Transition::to(next)
    }

    /// `gc_promise_rooted(value)`: the escape hatch.
    fn eval_promise(&self, state: &PathState, call: &CallEvent) -> Transition {
        let Some(sym) = call.args.first().and_then(|a| a.symbol) else {
            return Transition {
                findings: vec![Finding::new(
                    FindingKind::MalformedRootingOp,
                    "cannot resolve a symbolic identity for this promise",
                )
                .with_span(call.span)],
                ..Transition::default()
            };
        };
        let mut next = state.clone();
        next.values.insert(sym, ValueState::permanently_rooted());
        Transition::to(next)
    }

    /// `gc_preserve(ctx, value)`: the preserved value is kept alive by
    /// the context for the rest of the path.
    fn eval_preserve(&self, state: &PathState, call: &CallEvent) -> Transition {
        let Some(sym) = call.args.get(1).and_then(|a| a.symbol) else {
            return Transition::unchanged();
        };
        let mut next = state.clone();
        next.values.insert(sym, ValueState::permanently_rooted());
        Transition::to(next)
    }

    /// `gc_set_enabled(on)`: explicitly modeled, including the
    /// primitive's contract of returning the *previous* enabledness.
    fn eval_toggle(&self, state: &PathState, call: &CallEvent) -> Transition {
        let enabled_after = call
            .args
            .first()
            .and_then(|a| a.literal)
            .map(|v| v != 0)
            .unwrap_or(true);
        let previously_enabled = state.gc_enabled();
        let mut next = state.clone();
        next.gc_disabled_at = if enabled_after {
            None
        } else {
            Some(call.frame.height)
        };
        Transition {
            state: Some(next),
            modeled_return: Some(previously_enabled),
            ..Transition::default()
        }
    }
}
