//! Path explanation.
//!
//! When the host renders a finding, it walks the path that led to it and
//! asks, for each pair of adjacent states, whether the checker has
//! something to say about that step. The answers reconstruct the causal
//! chain: where tracking started, where a value lost its root, where it
//! may have been collected. These are pure functions of the two states
//! plus the analysis context - no visitor hierarchy, no mutation.

use crate::annot::Annotation;
use crate::diagnostics::Note;
use crate::state::PathState;
use crate::sym::{RegionId, SymbolId};

use super::{walk_to_root, AnalysisCx, GcChecker};

/// The outcome of a no-propagation query: the note itself plus an
/// optional further symbol worth tracking backwards.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// The explanatory note.
    pub note: Note,
    /// A base symbol whose own history explains the failure; the host
    /// can recurse on it with [`GcChecker::explain_value_step`].
    pub track: Option<SymbolId>,
}

impl Explanation {
    fn new(message: impl Into<String>) -> Self {
        Self {
            note: Note::new(message),
            track: None,
        }
    }

    fn tracking(message: impl Into<String>, sym: SymbolId) -> Self {
        Self {
            note: Note::new(message),
            track: Some(sym),
        }
    }
}

impl GcChecker {
    /// Explain what happened to `sym` between two adjacent states.
    ///
    /// Returns at most one note per step; `None` means the step is not
    /// interesting for this symbol.
    pub fn explain_value_step(
        &self,
        cx: &AnalysisCx,
        sym: SymbolId,
        prev: &PathState,
        next: &PathState,
    ) -> Option<Note> {
        let new = next.value(sym)?;
        let Some(old) = prev.value(sym) else {
            if new.is_rooted() {
                return Some(Note::new(
                    "started tracking the value here (root was inherited)",
                ));
            }
            if let Some(origin) = new.arg_origin() {
                let maybe_unrooted = cx
                    .decls
                    .function(origin.function)
                    .param_has(origin.param, Annotation::MaybeUnrooted);
                if !self.function_is_safepoint(cx, origin.function) {
                    return Some(Note::new(
                        "argument not rooted, because the function was annotated \
                         as not a safepoint",
                    ));
                }
                if maybe_unrooted {
                    return Some(Note::new("argument was annotated as possibly unrooted"));
                }
            }
            return Some(Note::new("started tracking the value here"));
        };

        if !old.is_untracked() && new.is_untracked() {
            return Some(Note::new("created an untracked derivative here"));
        }
        if new.is_potentially_freed() && old.is_just_allocated() {
            return Some(Note::new("value may have been collected here"));
        }
        if new.is_potentially_freed() && !old.is_potentially_freed() {
            return Some(Note::new(
                "value may have been collected here (cause unknown)",
            ));
        }
        if new.is_rooted() && old.is_just_allocated() {
            return Some(Note::new("value was rooted here"));
        }
        if !new.is_rooted() && old.is_rooted() {
            return Some(Note::new("root was released here"));
        }
        if new.root_depth() != old.root_depth() {
            return Some(Note::new("rooting depth changed here"));
        }
        None
    }

    /// Explain why a root failed to propagate from the parent expression
    /// standing at `parent_region`.
    pub fn explain_no_propagation(
        &self,
        cx: &AnalysisCx,
        state: &PathState,
        parent_region: Option<RegionId>,
    ) -> Explanation {
        let parent = walk_to_root(&cx.symbols, state, parent_region, |_, vs| vs.is_none());
        let Some(parent) = parent else {
            if let Some(global) = parent_region.and_then(|r| cx.symbols.walk_back_to_global(r)) {
                let annotated = cx
                    .symbols
                    .global_decl(global)
                    .map(|d| {
                        cx.decls
                            .global(d)
                            .annotations
                            .contains(Annotation::GloballyRooted)
                    })
                    .unwrap_or(false);
                if !annotated {
                    return Explanation::new(
                        "value was derived from an unrooted global; it may need a \
                         gc_globally_rooted annotation",
                    );
                }
                let tracked = cx
                    .symbols
                    .var_type(global)
                    .map(|ty| self.config().types.is_tracked(&cx.types, ty))
                    .unwrap_or(false);
                if !tracked {
                    return Explanation::new(
                        "value was derived from a global with an untracked type; \
                         the tracked-type tables may be incomplete",
                    );
                }
                return Explanation::new(
                    "value was derived from a global, but the root was not \
                     propagated; this may be a checker bug",
                );
            }
            return Explanation::new("could not propagate a root: the value was untracked");
        };

        match state.value(parent) {
            Some(vs) if vs.is_potentially_freed() => Explanation::tracking(
                "root not propagated because the base value may have been collected",
                parent,
            ),
            Some(vs) if vs.is_rooted() => Explanation::tracking(
                "root was not propagated from the base value; this may be a checker bug",
                parent,
            ),
            _ => Explanation::tracking("the base value had no root to propagate", parent),
        }
    }
}

/// Note a root-frame depth change between two adjacent states.
pub fn explain_frame_step(prev: &PathState, next: &PathState) -> Option<Note> {
    (prev.gc_depth != next.gc_depth).then(|| Note::new("root frame changed here"))
}

/// Note a safepoint-enabledness change between two adjacent states.
pub fn explain_safepoint_step(prev: &PathState, next: &PathState) -> Option<Note> {
    if prev.safepoint_disabled_at == next.safepoint_disabled_at {
        return None;
    }
    if prev.safepoint_disabled_at.is_none() {
        Some(Note::new("tracking the no-safepoint region from here"))
    } else if next.safepoint_disabled_at.is_none() {
        Some(Note::new("safepoints re-enabled here"))
    } else {
        None
    }
}
