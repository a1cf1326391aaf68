//! # rootck
//!
//! A path-sensitive checker for GC rooting discipline in a
//! manually-annotated native codebase that cooperates with a moving,
//! precise collector.
//!
//! For every pointer-like value of a tracked type, the checker proves
//! along every explored execution path that the value is either provably
//! unreachable by the collector, or reachable from a known root slot at
//! every point where a collection could occur - and that no
//! possibly-collected value is ever read, passed, or returned.
//!
//! ## Architecture
//!
//! The checker rides on a host symbolic-execution engine it does not own.
//! The host drives path exploration and fires hooks at fixed
//! instrumentation points (function entry/exit, pre/post call, derivation
//! statements, stores, location accesses); each hook is a pure transition
//! function from an immutable [`PathState`] plus an event to a successor
//! state and a list of [`Finding`]s. See [`checker::GcChecker`] for the
//! hook protocol.
//!
//! ```text
//! host engine -> hook(event, state) -> Transition { state', findings }
//! ```
//!
//! ## Module Overview
//!
//! - [`annot`] - the closed annotation vocabulary
//! - [`checker`] - the transition functions (the analysis proper)
//! - [`config`] - runtime-specific tables (boxing cache, lock names, ...)
//! - [`decl`] - declaration tables with cached annotation sets
//! - [`diagnostics`] - findings, notes, and rendering
//! - [`event`] - hook payloads
//! - [`span`] - source ranges
//! - [`state`] - the per-path value/root state
//! - [`sym`] - the symbol/region derivation model
//! - [`types`] - type shapes and the tracked-type registry

pub mod annot;
pub mod checker;
pub mod config;
pub mod decl;
pub mod diagnostics;
pub mod event;
pub mod span;
pub mod state;
pub mod sym;
pub mod types;

pub use annot::{Annotation, AnnotationSet};
pub use checker::{AnalysisCx, GcChecker, Transition};
pub use config::{CheckerConfig, ConfigError};
pub use diagnostics::{Finding, FindingEmitter, FindingKind, Note};
pub use span::Span;
pub use state::{PathState, RootState, ValueState};
pub use sym::{RegionId, SymbolId};
