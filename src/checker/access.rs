//! Stores and location accesses.
//!
//! A store into a registered root slot promotes the stored value; a load
//! through a root slot promotes the loaded value; any resolved access to
//! a possibly-collected value is an error. Unclassified globals are
//! classified lazily the first time they are touched.

use crate::diagnostics::{Finding, FindingKind};
use crate::event::{AccessEvent, BindEvent};
use crate::state::{PathState, ValueState};

use super::{value_state_for_region, AnalysisCx, GcChecker, Transition};

impl GcChecker {
    /// Store hook: `*dest = value`.
    pub fn bind(&self, cx: &mut AnalysisCx, state: &PathState, ev: &BindEvent) -> Transition {
        let Some(raw_dest) = ev.dest else {
            return Transition::unchanged();
        };
        // Element stores address one slot of an array; the registration
        // to check lives on the array's base region.
        let mut dest = raw_dest;
        let mut should_be_root_array = false;
        if cx.symbols.is_element(dest) {
            dest = cx.symbols.base_region(dest);
            should_be_root_array = true;
        }
        let Some(sym) = ev.value else {
            return Transition::unchanged();
        };

        let mut next = state.clone();
        let mut changed = false;

        let Some(rs) = state.root(dest).copied() else {
            // Not a registered root. The destination may still confer
            // rootedness: a global's storage, or storage reachable from
            // a rooted value.
            let base = cx.symbols.base_region(dest);
            let vs = self
                .root_region_if_global(cx, &mut next, Some(base), &mut changed)
                .or_else(|| value_state_for_region(&cx.symbols, &next, Some(dest)));
            let Some(vs) = vs else {
                return Transition {
                    state: changed.then_some(next),
                    ..Transition::default()
                };
            };
            if !vs.is_rooted() {
                return Transition {
                    state: changed.then_some(next),
                    ..Transition::default()
                };
            }
            if let Some(existing) = next.value(sym) {
                if existing.is_rooted() && existing.root_depth() < vs.root_depth() {
                    return Transition {
                        state: changed.then_some(next),
                        ..Transition::default()
                    };
                }
            }
            next.values.insert(sym, vs);
            return Transition::to(next);
        };

        if should_be_root_array && !rs.is_root_array() {
            return Transition {
                state: changed.then_some(next),
                findings: vec![Finding::new(
                    FindingKind::MalformedRootingOp,
                    "expected a root array on the left-hand side of this assignment",
                )
                .with_span(ev.span)],
                ..Transition::default()
            };
        }

        let Some(stored) = next.value(sym).copied() else {
            // Maybe a global the checker has not classified yet.
            let origin = cx.symbols.origin_region(sym);
            if self
                .root_region_if_global(cx, &mut next, origin, &mut changed)
                .is_some()
            {
                return Transition::to(next);
            }
            return Transition {
                state: changed.then_some(next),
                findings: vec![Finding::new(
                    FindingKind::CheckerInternalInconsistency,
                    "assignment to a root slot, but the allocation was never seen",
                )
                .with_symbol(sym)
                .with_span(ev.span)],
                ..Transition::default()
            };
        };

        let mut findings = Vec::new();
        if stored.is_potentially_freed() {
            findings.push(
                Finding::new(
                    FindingKind::UseOfPossiblyCollected,
                    "rooting a value which may already have been collected",
                )
                .with_symbol(sym)
                .with_span(ev.span),
            );
        }
        // Promote unless an equal-or-shallower root already covers it.
        if !stored.is_rooted() || stored.root_depth() > Some(rs.depth()) {
            next.values
                .insert(sym, ValueState::rooted(Some(dest), rs.depth()));
            changed = true;
        }
        Transition {
            state: changed.then_some(next),
            findings,
            ..Transition::default()
        }
    }

    /// Location-access hook (loads and stores through a location).
    pub fn access(&self, cx: &mut AnalysisCx, state: &PathState, ev: &AccessEvent) -> Transition {
        let mut next = state.clone();
        let mut changed = false;
        let mut findings = Vec::new();

        // Loading from a root produces a rooted value.
        if ev.is_load {
            if let (Some(region), Some(loaded)) = (ev.region, ev.loaded) {
                if let Some(rs) = state.root(region).copied() {
                    let promote = match state.value(loaded) {
                        None => true,
                        Some(vs) => !vs.is_rooted() || vs.root_depth() > Some(rs.depth()),
                    };
                    if promote {
                        next.values
                            .insert(loaded, ValueState::rooted(Some(region), rs.depth()));
                        changed = true;
                    }
                }
            }
        }

        // First touch of a global classifies it.
        if self
            .root_region_if_global(cx, &mut next, ev.region, &mut changed)
            .is_some()
        {
            return Transition::to(next);
        }

        let Some(region) = ev.region else {
            return Transition {
                state: changed.then_some(next),
                ..Transition::default()
            };
        };
        // A bare symbolic location may hold a dead pointer; that is fine
        // as long as nothing is read through a derived part of it.
        if cx.symbols.direct_symbol(region).is_some() {
            return Transition {
                state: changed.then_some(next),
                ..Transition::default()
            };
        }
        let Some(base) = cx.symbols.symbolic_base(region) else {
            return Transition {
                state: changed.then_some(next),
                ..Transition::default()
            };
        };
        if state
            .value(base)
            .map(|vs| vs.is_potentially_freed())
            .unwrap_or(false)
        {
            findings.push(
                Finding::new(
                    FindingKind::UseOfPossiblyCollected,
                    "accessing a value which may have been collected",
                )
                .with_symbol(base)
                .with_span(ev.span),
            );
        }
        Transition {
            state: changed.then_some(next),
            findings,
            ..Transition::default()
        }
    }
}
