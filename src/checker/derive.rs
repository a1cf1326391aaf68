//! Derivation propagation: casts, member access, array subscripts, and
//! dereferences.
//!
//! A derived value generally inherits its parent's state, but several
//! sources are authoritative and bypass the parent's current path state:
//! permanently-rooted result types, storage that is itself a registered
//! root, function parameters (whose entry rule is re-derived), and
//! globals (classified lazily).

use crate::diagnostics::{Finding, FindingKind};
use crate::event::{DeriveEvent, DeriveKind};
use crate::state::{PathState, ValueState, PERMANENT_DEPTH};
use crate::sym::{RegionKind, SymbolId};

use super::{AnalysisCx, GcChecker, Transition};

impl GcChecker {
    /// Post-statement hook for casts.
    pub fn post_cast(
        &self,
        cx: &mut AnalysisCx,
        state: &PathState,
        ev: &DeriveEvent,
    ) -> Transition {
        // A cast written to a permanently rooted type is an implicit
        // rooting assertion.
        if let DeriveKind::Cast { written_ty } = ev.kind {
            if self.config().types.is_permanently_rooted(&cx.types, written_ty) {
                let Some(sym) = ev.result_symbol else {
                    return Transition::unchanged();
                };
                let mut next = state.clone();
                next.values.insert(sym, ValueState::permanently_rooted());
                return Transition::to(next);
            }
        }
        self.check_deriving_expr(cx, state, ev)
    }

    /// Post-statement hook for member access.
    pub fn post_member(
        &self,
        cx: &mut AnalysisCx,
        state: &PathState,
        ev: &DeriveEvent,
    ) -> Transition {
        // The member's own storage may be a registered root; that takes
        // precedence over generic derivation.
        if let Some(region) = ev.result_region {
            if self.config().types.is_tracked(&cx.types, ev.result_ty) {
                if let Some(rs) = state.root(region).copied() {
                    let vs = ValueState::rooted(Some(region), rs.depth());
                    return self.root_derived(cx, state, ev, vs);
                }
            }
        }
        if !cx.types.is_pointer(ev.result_ty) {
            return Transition::unchanged();
        }
        self.check_deriving_expr(cx, state, ev)
    }

    /// Post-statement hook for array subscripts.
    pub fn post_subscript(
        &self,
        cx: &mut AnalysisCx,
        state: &PathState,
        ev: &DeriveEvent,
    ) -> Transition {
        // An element read out of a registered root array is rooted by
        // that array.
        if self.config().types.is_tracked(&cx.types, ev.result_ty) {
            let array = ev.parent_region.map(|base| {
                if cx.symbols.is_element(base) {
                    cx.symbols.super_region(base).unwrap_or(base)
                } else {
                    base
                }
            });
            if let Some(array) = array {
                if let Some(rs) = state.root(array).copied() {
                    let vs = ValueState::rooted(Some(array), rs.depth());
                    return self.root_derived(cx, state, ev, vs);
                }
            }
        }
        self.check_deriving_expr(cx, state, ev)
    }

    /// Post-statement hook for unary dereference.
    pub fn post_deref(
        &self,
        cx: &mut AnalysisCx,
        state: &PathState,
        ev: &DeriveEvent,
    ) -> Transition {
        self.check_deriving_expr(cx, state, ev)
    }

    /// Install a root-derived state unless the value already has a
    /// shallower (better) root.
    fn root_derived(
        &self,
        cx: &mut AnalysisCx,
        state: &PathState,
        ev: &DeriveEvent,
        vs: ValueState,
    ) -> Transition {
        let Some((sym, synthesized)) = self.symbol_for_result(cx, ev, true) else {
            return Transition::unchanged();
        };
        if let Some(existing) = state.value(sym) {
            let better = existing.is_rooted()
                && existing.root_depth() < vs.root_depth();
            if better {
                return Transition {
                    synthesized,
                    ..Transition::default()
                };
            }
        }
        let mut next = state.clone();
        next.values.insert(sym, vs);
        Transition {
            state: Some(next),
            synthesized,
            ..Transition::default()
        }
    }

    /// Resolve (or synthesize) the derived expression's symbol.
    fn symbol_for_result(
        &self,
        cx: &mut AnalysisCx,
        ev: &DeriveEvent,
        have_parent_state: bool,
    ) -> Option<(SymbolId, Option<SymbolId>)> {
        if let Some(sym) = ev.result_symbol {
            return Some((sym, None));
        }
        if !cx.types.is_pointer(ev.result_ty) {
            return None;
        }
        if have_parent_state || self.config().types.is_tracked(&cx.types, ev.result_ty) {
            let sym = cx.symbols.conjure(ev.result_ty);
            return Some((sym, Some(sym)));
        }
        None
    }

    /// The generic derivation rule.
    fn check_deriving_expr(
        &self,
        cx: &mut AnalysisCx,
        state: &PathState,
        ev: &DeriveEvent,
    ) -> Transition {
        // Permanently rooted result types need no parent at all.
        if self.config().types.is_permanently_rooted(&cx.types, ev.result_ty) {
            let Some((sym, synthesized)) = self.symbol_for_result(cx, ev, false) else {
                return Transition::unchanged();
            };
            if let Some(existing) = state.value(sym) {
                if existing.is_rooted() && existing.root_depth() == Some(PERMANENT_DEPTH) {
                    return Transition {
                        synthesized,
                        ..Transition::default()
                    };
                }
            }
            let mut next = state.clone();
            next.values.insert(sym, ValueState::permanently_rooted());
            return Transition {
                state: Some(next),
                synthesized,
                ..Transition::default()
            };
        }

        // An untracked result of a tracked parent ends the propagation
        // chain, except for the registered container-to-backing
        // extraction.
        let mut result_tracked = true;
        if !self.config().types.is_tracked(&cx.types, ev.result_ty) {
            let carved = ev
                .parent_ty
                .map(|p| {
                    self.config()
                        .types
                        .is_backing_extraction(&cx.types, p, ev.result_ty)
                })
                .unwrap_or(false);
            let parent_tracked = ev
                .parent_ty
                .map(|p| self.config().types.is_tracked(&cx.types, p))
                .unwrap_or(false);
            if !carved && parent_tracked {
                result_tracked = false;
            }
        }

        let old_state = ev
            .parent_symbol
            .and_then(|sym| state.value(sym))
            .copied();
        let Some((new_sym, synthesized)) = self.symbol_for_result(cx, ev, old_state.is_some())
        else {
            return Transition::unchanged();
        };

        let mut next = state.clone();
        let mut changed = false;

        // Parameters and globals are authoritative sources, bypassing
        // the parent's current path state.
        if let Some(region) = ev.parent_region {
            let param_info = match cx.symbols.region_kind(region) {
                RegionKind::Var { param, .. } => *param,
                _ => None,
            };
            let inherited = if let Some((func, idx)) = param_info {
                Some(self.argument_entry_state(cx, func, idx))
            } else if let Some(global) = cx.symbols.walk_back_to_global(region) {
                self.root_region_if_global(cx, &mut next, Some(global), &mut changed)
            } else {
                None
            };
            if let (Some(vs), true) = (inherited, result_tracked) {
                next.values.insert(new_sym, vs);
                return Transition {
                    state: Some(next),
                    synthesized,
                    ..Transition::default()
                };
            }
        }

        // Never downgrade a value that already has a root.
        if let Some(existing) = next.value(new_sym) {
            if existing.is_rooted() {
                return Transition {
                    state: changed.then_some(next),
                    synthesized,
                    ..Transition::default()
                };
            }
        }

        let Some(old_vs) = old_state else {
            // A stateless parent leaves tracked derivatives explicitly
            // untracked, so the path explainer has something to say.
            if self.config().types.is_tracked(&cx.types, ev.result_ty) {
                next.values.insert(new_sym, ValueState::untracked());
                return Transition {
                    state: Some(next),
                    synthesized,
                    ..Transition::default()
                };
            }
            return Transition {
                state: changed.then_some(next),
                synthesized,
                ..Transition::default()
            };
        };

        if old_vs.is_potentially_freed() {
            let mut finding = Finding::new(
                FindingKind::UseOfPossiblyCollected,
                "creating a derivative of a value that may have been collected",
            )
            .with_span(ev.span);
            if let Some(parent) = ev.parent_symbol {
                finding = finding.with_symbol(parent);
            }
            next.values.insert(new_sym, ValueState::untracked());
            return Transition {
                state: Some(next),
                findings: vec![finding],
                synthesized,
                ..Transition::default()
            };
        }

        if result_tracked {
            next.values.insert(new_sym, old_vs);
            return Transition {
                state: Some(next),
                synthesized,
                ..Transition::default()
            };
        }

        Transition {
            state: changed.then_some(next),
            synthesized,
            ..Transition::default()
        }
    }
}
