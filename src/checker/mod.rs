//! The rooting/safepoint checker.
//!
//! The checker is a bundle of pure transition functions. The host engine
//! drives path exploration and fires one hook per instrumentation point;
//! each hook receives the immutable incoming [`PathState`] plus an event
//! and returns a [`Transition`]: the successor state (or `None` for "no
//! change") and any findings. Nothing here blocks, spawns, or mutates a
//! published state, so the host may explore, cache, and merge freely.
//!
//! # Hook protocol
//!
//! For every call site the host fires, in order: [`GcChecker::pre_call`],
//! then [`GcChecker::eval_call`]. When `eval_call` returns `Some`, the
//! call was one of the rooting intrinsics and is fully modeled by that
//! transition; otherwise the host lets the call execute symbolically and
//! fires [`GcChecker::post_call`]. Function boundaries fire
//! [`GcChecker::begin_function`] / [`GcChecker::end_function`];
//! derivations fire the `post_*` statement hooks; stores and location
//! accesses fire [`GcChecker::bind`] and [`GcChecker::access`].

mod access;
mod calls;
mod derive;
pub mod explain;
mod frame;
mod safepoint;


use crate::annot::Annotation;
use crate::config::{CheckerConfig, ConfigError};
use crate::decl::{DeclTable, FunctionId};
use crate::diagnostics::Finding;
use crate::state::{PathState, RootState, ValueState, PERMANENT_DEPTH};
use crate::sym::{RegionId, SymbolId, SymbolKind, SymbolTable};
use crate::types::TypeTable;

/// The host-provided analysis context: declaration, type, and symbol
/// tables. Mutable only so the checker can synthesize fresh symbolic
/// identities; the tables are append-only.
#[derive(Debug, Default)]
pub struct AnalysisCx {
    /// Declarations of the analyzed program.
    pub decls: DeclTable,
    /// Types of the analyzed program.
    pub types: TypeTable,
    /// Symbol/region derivation table.
    pub symbols: SymbolTable,
}

impl AnalysisCx {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }
}

/// The result of one hook invocation.
#[derive(Debug, Default)]
pub struct Transition {
    /// The successor state; `None` means the hook made no change.
    pub state: Option<PathState>,
    /// Findings reported at this program point.
    pub findings: Vec<Finding>,
    /// A symbol the checker synthesized for the current expression's
    /// result; the host should bind it to that expression.
    pub synthesized: Option<SymbolId>,
    /// For intrinsics whose return value the checker models (the GC
    /// toggle), the value the call must evaluate to.
    pub modeled_return: Option<bool>,
}

impl Transition {
    /// A transition with no state change and no findings.
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// A transition replacing the state.
    pub fn to(state: PathState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Whether the hook changed anything or found anything.
    pub fn is_noop(&self) -> bool {
        self.state.is_none() && self.findings.is_empty()
    }
}

/// The rooting/safepoint checker. Stateless apart from configuration;
/// all path-dependent data lives in [`PathState`].
#[derive(Debug)]
pub struct GcChecker {
    config: CheckerConfig,
}

impl GcChecker {
    /// Create a checker, validating the configuration.
    pub fn new(config: CheckerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// A checker with the canonical configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: CheckerConfig::default(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Whether the function must be treated as a safepoint when called.
    pub(crate) fn function_is_safepoint(&self, cx: &AnalysisCx, function: FunctionId) -> bool {
        !cx.decls.is_not_safepoint(function, &self.config)
    }

    /// The entry state for a tracked parameter of `function`.
    pub(crate) fn argument_entry_state(
        &self,
        cx: &AnalysisCx,
        function: FunctionId,
        param: usize,
    ) -> ValueState {
        let maybe_unrooted = cx
            .decls
            .function(function)
            .param_has(param, Annotation::MaybeUnrooted);
        ValueState::for_argument(
            function,
            param,
            self.function_is_safepoint(cx, function),
            maybe_unrooted,
        )
    }

    /// Lazily classify a global variable's storage the first time it is
    /// touched: permanently rooted when the type or an annotation says
    /// so, freshly allocated otherwise.
    ///
    /// Returns the classification when `region` is a tracked global, or
    /// `None` when the region is not one. Registration of the root and
    /// of the region's value symbol happens on `next` in place.
    pub(crate) fn root_region_if_global(
        &self,
        cx: &mut AnalysisCx,
        next: &mut PathState,
        region: Option<RegionId>,
        changed: &mut bool,
    ) -> Option<ValueState> {
        let region = region?;
        let decl = cx.symbols.global_decl(region);
        let ty = cx.symbols.var_type(region)?;
        // Only variable regions with global storage qualify.
        match cx.symbols.region_kind(region) {
            crate::sym::RegionKind::Var { global: true, .. } => {}
            _ => return None,
        }
        if !self.config.types.is_tracked(&cx.types, ty) {
            return None;
        }
        let annotated = decl
            .map(|d| {
                cx.decls
                    .global(d)
                    .annotations
                    .contains(Annotation::GloballyRooted)
            })
            .unwrap_or(false);
        let is_global_root =
            annotated || self.config.types.is_permanently_rooted(&cx.types, ty);
        if is_global_root && next.root(region).is_none() {
            next.roots
                .insert(region, RootState::root(PERMANENT_DEPTH));
            *changed = true;
        }
        let value_state = if is_global_root {
            ValueState::rooted(Some(region), PERMANENT_DEPTH)
        } else {
            ValueState::allocated()
        };
        let sym = cx.symbols.region_value(region);
        if next.value(sym).is_none() {
            next.values.insert(sym, value_state);
            *changed = true;
        }
        Some(value_state)
    }
}

/// Walk backwards from a region through the derivation chain until the
/// predicate stops asking to continue.
///
/// `keep_walking` receives each candidate symbol and its current state;
/// returning `true` moves on to the symbol's origin region, returning
/// `false` accepts the symbol. The walk fails (returns `None`) when a
/// continuing symbol has no origin region or the chain leaves symbolic
/// territory.
pub(crate) fn walk_to_root<F>(
    symbols: &SymbolTable,
    state: &PathState,
    start: Option<RegionId>,
    mut keep_walking: F,
) -> Option<SymbolId>
where
    F: FnMut(SymbolId, Option<&ValueState>) -> bool,
{
    let mut region = start?;
    loop {
        let sym = symbols.symbolic_base(region)?;
        if keep_walking(sym, state.value(sym)) {
            match symbols.symbol_kind(sym) {
                SymbolKind::RegionValue { region: r } => region = *r,
                SymbolKind::Derived { region: r, .. } => region = *r,
                SymbolKind::Conjured { .. } => return None,
            }
        } else {
            return Some(sym);
        }
    }
}

/// The tracked symbol a region resolves to, skipping links with no state.
pub(crate) fn tracked_symbol_for_region(
    symbols: &SymbolTable,
    state: &PathState,
    region: Option<RegionId>,
) -> Option<SymbolId> {
    walk_to_root(symbols, state, region, |_, vs| vs.is_none())
}

/// The value state a region resolves to, skipping links that are not
/// rooted (a rooted ancestor is authoritative for its derivatives).
pub(crate) fn value_state_for_region(
    symbols: &SymbolTable,
    state: &PathState,
    region: Option<RegionId>,
) -> Option<ValueState> {
    let sym = walk_to_root(symbols, state, region, |_, vs| {
        vs.map(|v| !v.is_rooted()).unwrap_or(true)
    })?;
    state.value(sym).copied()
}
