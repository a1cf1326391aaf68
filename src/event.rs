//! Hook payloads.
//!
//! The host engine fires the checker's hooks at fixed instrumentation
//! points; each hook receives one of these event structures with the
//! store-resolved values the checker needs. The checker never reads the
//! host's environment or store directly - everything path-dependent
//! arrives through the event or lives in [`crate::state::PathState`].

use crate::decl::FunctionId;
use crate::span::Span;
use crate::sym::{RegionId, SymbolId};
use crate::types::TypeId;

/// The stack frame a hook fires in.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    /// The function being analyzed.
    pub function: FunctionId,
    /// Stack-frame height (1 = top frame).
    pub height: u32,
}

/// A caller-side argument value, for inlined-call entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgValue {
    /// The argument's symbolic value, if the host has one.
    pub symbol: Option<SymbolId>,
    /// The argument's region, if it is region-backed.
    pub region: Option<RegionId>,
}

/// A parameter's storage and current value at function entry.
#[derive(Debug, Clone, Copy)]
pub struct ParamBinding {
    /// Parameter index in the declaration.
    pub index: usize,
    /// The parameter variable's storage.
    pub region: Option<RegionId>,
    /// The symbolic value bound to that storage.
    pub symbol: Option<SymbolId>,
}

/// Function-entry event.
#[derive(Debug, Clone)]
pub struct FunctionEntry {
    /// The frame being entered.
    pub frame: FrameInfo,
    /// Whether this is the analysis' top frame.
    pub top: bool,
    /// Parameter bindings for this frame.
    pub params: Vec<ParamBinding>,
    /// Caller-side argument values, indexed by parameter position.
    /// Empty for the top frame.
    pub caller_args: Vec<ArgValue>,
}

/// The value mentioned in a `return` statement.
#[derive(Debug, Clone, Copy)]
pub struct ReturnedValue {
    /// The returned symbolic value.
    pub symbol: Option<SymbolId>,
    /// Whether the returned expression has a tracked type.
    pub tracked: bool,
    /// Source range of the return statement.
    pub span: Option<Span>,
}

/// Function-exit event.
#[derive(Debug, Clone)]
pub struct FunctionExit {
    /// The frame being left.
    pub frame: FrameInfo,
    /// Whether this is the analysis' top frame.
    pub top: bool,
    /// The returned value, when the function returns one.
    pub returned: Option<ReturnedValue>,
}

/// How a call site resolves, for safepoint classification.
#[derive(Debug, Clone, Copy)]
pub struct CallOrigin {
    /// The call was declared inside an excluded (system) library.
    pub in_excluded_library: bool,
    /// There is a callee expression (false for synthesized calls).
    pub has_callee_expr: bool,
    /// The callee expression's type, for indirect calls through a typed
    /// function pointer.
    pub callee_expr_ty: Option<TypeId>,
}

impl Default for CallOrigin {
    fn default() -> Self {
        Self {
            in_excluded_library: false,
            has_callee_expr: true,
            callee_expr_ty: None,
        }
    }
}

/// One call argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallArg {
    /// The argument's symbolic value.
    pub symbol: Option<SymbolId>,
    /// The argument's region, when region-backed (lvalue arguments).
    pub region: Option<RegionId>,
    /// The symbolic value currently stored in the argument's region
    /// (for root-slot arguments to the push intrinsics).
    pub held_symbol: Option<SymbolId>,
    /// The symbolic value loaded *through* the argument (for
    /// pointer-to-pointer out-parameters).
    pub deref_symbol: Option<SymbolId>,
    /// Concrete integer value, when the argument is a literal.
    pub literal: Option<i64>,
    /// Whether the argument expression has a tracked type.
    pub tracked: bool,
    /// Source range of the argument expression.
    pub span: Option<Span>,
}

/// The call's result slot.
#[derive(Debug, Clone, Copy)]
pub struct CallResult {
    /// Result type.
    pub ty: TypeId,
    /// The result's symbolic value, if the host bound one.
    pub symbol: Option<SymbolId>,
}

/// A call site, fired at pre-call, intrinsic-evaluation, and post-call.
#[derive(Debug, Clone)]
pub struct CallEvent {
    /// The frame the call occurs in.
    pub frame: FrameInfo,
    /// Resolved callee declaration, if statically known.
    pub callee: Option<FunctionId>,
    /// Call-site resolution facts.
    pub origin: CallOrigin,
    /// Arguments in order.
    pub args: Vec<CallArg>,
    /// Result slot.
    pub result: CallResult,
    /// Source range of the call.
    pub span: Option<Span>,
}

/// The deriving expression's shape.
#[derive(Debug, Clone, Copy)]
pub enum DeriveKind {
    /// An explicit cast; carries the written-to type.
    Cast {
        /// The type the cast was written with.
        written_ty: TypeId,
    },
    /// Member access.
    Member,
    /// Array subscript.
    Subscript,
    /// Unary dereference.
    Deref,
}

/// A derivation: cast, member access, subscript, or dereference,
/// fired post-statement.
#[derive(Debug, Clone)]
pub struct DeriveEvent {
    /// The frame the expression occurs in.
    pub frame: FrameInfo,
    /// Expression shape.
    pub kind: DeriveKind,
    /// The derived expression's type.
    pub result_ty: TypeId,
    /// The parent expression's type, when known.
    pub parent_ty: Option<TypeId>,
    /// The derived value's symbol, if the host already has one.
    pub result_symbol: Option<SymbolId>,
    /// The derived expression's region (the member's own storage for
    /// member access, the element region for subscripts).
    pub result_region: Option<RegionId>,
    /// The parent value's symbol.
    pub parent_symbol: Option<SymbolId>,
    /// The parent value's region.
    pub parent_region: Option<RegionId>,
    /// Source range.
    pub span: Option<Span>,
}

/// A store: `*dest = value`.
#[derive(Debug, Clone, Copy)]
pub struct BindEvent {
    /// Destination region.
    pub dest: Option<RegionId>,
    /// The stored symbolic value.
    pub value: Option<SymbolId>,
    /// Source range.
    pub span: Option<Span>,
}

/// A location access (load or store through a location).
#[derive(Debug, Clone, Copy)]
pub struct AccessEvent {
    /// The accessed region.
    pub region: Option<RegionId>,
    /// The symbolic value loaded through the location, for loads.
    pub loaded: Option<SymbolId>,
    /// Whether this is a load.
    pub is_load: bool,
    /// Source range.
    pub span: Option<Span>,
}
