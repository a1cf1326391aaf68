//! Call effects: the pre-call argument audit and the three post-call
//! sub-steps (argument rooting, the safepoint side-effect, result
//! classification).
//!
//! The post-call sub-steps are independent but order-sensitive: argument
//! rooting must land before the safepoint kill so a freshly rooted
//! argument survives it, and the result is classified last so the call's
//! own return value is never demoted.

use tracing::debug;

use crate::annot::Annotation;
use crate::config::BoxingKind;
use crate::diagnostics::{Finding, FindingKind};
use crate::event::CallEvent;
use crate::state::{PathState, ValueState};
use crate::sym::SymbolId;

use super::{
    tracked_symbol_for_region, value_state_for_region, AnalysisCx, GcChecker, Transition,
};

impl GcChecker {
    /// Audit the arguments of a call before it executes.
    ///
    /// Reports possibly-collected arguments, and unrooted arguments to
    /// callees classified as safepoints; re-enables safepoints when the
    /// callee is a lock-release primitive; reports safepoint calls made
    /// while safepoints are disabled.
    pub fn pre_call(&self, cx: &AnalysisCx, state: &PathState, call: &CallEvent) -> Transition {
        if !state.gc_enabled() {
            return Transition::unchanged();
        }
        let mut next = state.clone();
        let mut changed = false;
        let mut findings = Vec::new();

        let is_callee_safepoint = self.is_safepoint(cx, call);
        let name = call.callee.map(|f| cx.decls.function_name(f));

        // Leaving a lock region re-enables safepoints disabled at this
        // frame, unless the whole function is a no-safepoint zone.
        let leaves = name
            .map(|n| self.config().is_lock_release(n))
            .unwrap_or(false)
            || call
                .callee
                .map(|f| {
                    cx.decls
                        .function(f)
                        .annotations
                        .contains(Annotation::NotSafepointLeave)
                })
                .unwrap_or(false);
        if leaves
            && state.safepoint_disabled_at == Some(call.frame.height)
            && !cx
                .decls
                .is_not_safepoint(call.frame.function, self.config())
        {
            next.safepoint_disabled_at = None;
            changed = true;
        }

        if !next.safepoint_enabled() && is_callee_safepoint {
            // No-return callees never come back to the protected region,
            // so the warning would be noise.
            let no_return = call
                .callee
                .map(|f| cx.decls.function(f).is_no_return)
                .unwrap_or(false);
            if !no_return {
                findings.push(
                    Finding::new(
                        FindingKind::SafepointViolation,
                        "calling a potential safepoint while safepoints are disabled \
                         for this frame",
                    )
                    .with_span(call.span),
                );
                return Transition {
                    state: changed.then_some(next),
                    findings,
                    ..Transition::default()
                };
            }
        }

        // The rooting promise is an assertion, not a use of its argument.
        if name == Some("gc_promise_rooted") {
            return Transition {
                state: changed.then_some(next),
                findings,
                ..Transition::default()
            };
        }

        for (idx, arg) in call.args.iter().enumerate() {
            let Some(sym) = arg.symbol else { continue };
            let Some(vs) = state.value(sym) else { continue };
            if !arg.tracked {
                continue;
            }
            if vs.is_potentially_freed() {
                findings.push(
                    Finding::new(
                        FindingKind::UseOfPossiblyCollected,
                        "argument value may have been collected",
                    )
                    .with_symbol(sym)
                    .with_span(arg.span),
                );
            }
            if vs.is_rooted() {
                continue;
            }
            let maybe_unrooted = call
                .callee
                .map(|f| cx.decls.function(f).param_has(idx, Annotation::MaybeUnrooted))
                .unwrap_or(false);
            if !maybe_unrooted && is_callee_safepoint {
                findings.push(
                    Finding::new(
                        FindingKind::MissingRoot,
                        "passing an unrooted value to a function that may trigger \
                         collection",
                    )
                    .with_symbol(sym)
                    .with_span(arg.span),
                );
            }
        }

        Transition {
            state: changed.then_some(next),
            findings,
            ..Transition::default()
        }
    }

    /// Apply the post-call effects.
    pub fn post_call(
        &self,
        cx: &mut AnalysisCx,
        state: &PathState,
        call: &CallEvent,
    ) -> Transition {
        let mut next = state.clone();
        let mut changed = false;
        changed |= self.process_argument_rooting(cx, &mut next, call);
        changed |= self.process_potential_safepoint(cx, &mut next, call);
        let (result_changed, synthesized) =
            self.process_allocation_of_result(cx, &mut next, call);
        changed |= result_changed;
        Transition {
            state: changed.then_some(next),
            synthesized,
            ..Transition::default()
        }
    }

    /// Copy the value state reachable from the `rooting_argument` onto
    /// the `rooted_argument`'s symbol.
    fn process_argument_rooting(
        &self,
        cx: &AnalysisCx,
        next: &mut PathState,
        call: &CallEvent,
    ) -> bool {
        let Some(callee) = call.callee else {
            return false;
        };
        let decl = cx.decls.function(callee);
        let (Some(rooting), Some(rooted)) = (
            decl.find_param(Annotation::RootingArgument),
            decl.find_param(Annotation::RootedArgument),
        ) else {
            return false;
        };
        let rooting_region = call.args.get(rooting).and_then(|a| a.region);
        let Some(rooted_symbol) = call.args.get(rooted).and_then(|a| a.symbol) else {
            return false;
        };
        let Some(vs) = value_state_for_region(&cx.symbols, next, rooting_region) else {
            return false;
        };
        next.values.insert(rooted_symbol, vs);
        true
    }

    /// The safepoint side-effect: any unrooted value not definitely kept
    /// alive across the call may have moved or been reclaimed.
    fn process_potential_safepoint(
        &self,
        cx: &AnalysisCx,
        next: &mut PathState,
        call: &CallEvent,
    ) -> bool {
        if !self.is_safepoint(cx, call) {
            return false;
        }
        if !next.gc_enabled() {
            return false;
        }

        let mut specially_rooted: Option<SymbolId> = None;
        if let Some(callee) = call.callee {
            let decl = cx.decls.function(callee);
            for (idx, param) in decl.params.iter().enumerate() {
                if !param.annotations.contains(Annotation::TemporarilyRoots) {
                    continue;
                }
                let Some(arg) = call.args.get(idx) else { break };
                if self.config().types.is_tracked_out_param(&cx.types, param.ty) {
                    // An out parameter: what it temporarily roots is the
                    // value it currently refers to.
                    specially_rooted = arg.deref_symbol;
                    continue;
                }
                specially_rooted = tracked_symbol_for_region(&cx.symbols, next, arg.region);
                break;
            }
        }

        let ret = call.result.symbol;
        let doomed: Vec<SymbolId> = next
            .values
            .iter()
            .filter(|(sym, vs)| {
                vs.is_just_allocated()
                    && Some(**sym) != specially_rooted
                    && Some(**sym) != ret
            })
            .map(|(sym, _)| *sym)
            .collect();
        if doomed.is_empty() {
            return false;
        }
        debug!(count = doomed.len(), "safepoint call: demoting unrooted values");
        for sym in doomed {
            next.values.insert(sym, ValueState::freed());
        }
        true
    }

    /// Classify the call's result value.
    fn process_allocation_of_result(
        &self,
        cx: &mut AnalysisCx,
        next: &mut PathState,
        call: &CallEvent,
    ) -> (bool, Option<SymbolId>) {
        let ty = call.result.ty;
        if !self.config().types.is_tracked(&cx.types, ty) {
            return (false, None);
        }
        let mut synthesized = None;
        let sym = match call.result.symbol {
            Some(sym) => sym,
            None => {
                let sym = cx.symbols.conjure(ty);
                synthesized = Some(sym);
                sym
            }
        };

        if self.config().types.is_permanently_rooted(&cx.types, ty) {
            next.values.insert(sym, ValueState::permanently_rooted());
            return (true, synthesized);
        }

        let mut new_state = next.value(sym).copied().unwrap_or_else(ValueState::allocated);
        if let Some(callee) = call.callee {
            let decl = cx.decls.function(callee);
            if decl.annotations.contains(Annotation::GloballyRooted) {
                new_state = ValueState::permanently_rooted();
            } else if let Some(kind) =
                self.config().boxing_kind(cx.decls.function_name(callee))
            {
                // Boxing intrinsics return interned boxes for small
                // literals; those never move.
                if let Some(literal) = call.args.first().and_then(|a| a.literal) {
                    let ranges = self.config().boxing_ranges();
                    let cached = match kind {
                        BoxingKind::Unsigned => ranges.unsigned.contains(&literal),
                        BoxingKind::Signed => ranges.signed.contains(&literal),
                    };
                    if cached {
                        new_state = ValueState::permanently_rooted();
                    }
                }
            } else if let Some(idx) = decl.find_param(Annotation::PropagatesRoot) {
                let region = call.args.get(idx).and_then(|a| a.region);
                if let Some(vs) = value_state_for_region(&cx.symbols, next, region) {
                    new_state = vs;
                }
            }
        }
        next.values.insert(sym, new_state);
        (true, synthesized)
    }
}
