//! Annotation vocabulary.
//!
//! The checked codebase cooperates with the checker through source
//! annotations on functions, parameters, and globals. Rather than matching
//! annotation strings at every query, the recognized vocabulary is a closed
//! enumeration resolved once per declaration and cached in an
//! [`AnnotationSet`].
//!
//! # Recognized annotations
//!
//! - `gc_globally_rooted` - the value/result is permanently reachable
//! - `gc_not_safepoint` - the function cannot transfer control to the collector
//! - `gc_maybe_unrooted` - the parameter may legitimately arrive unrooted
//! - `gc_rooting_argument` / `gc_rooted_argument` - paired: the first
//!   argument's rooting carries over to the second
//! - `gc_propagates_root` - the result inherits this argument's rooting
//! - `gc_temporarily_roots` - this argument is kept alive for the call only
//! - `gc_require_rooted_slot` - the parameter's storage is a permanent root
//! - `gc_disabled` - collection is off for the duration of the function
//! - `gc_notsafepoint_enter` / `gc_notsafepoint_leave` - one-sided safepoint
//!   disable/enable transitions

/// A recognized source annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Annotation {
    /// `gc_globally_rooted`
    GloballyRooted,
    /// `gc_not_safepoint`
    NotSafepoint,
    /// `gc_maybe_unrooted`
    MaybeUnrooted,
    /// `gc_rooting_argument`
    RootingArgument,
    /// `gc_rooted_argument`
    RootedArgument,
    /// `gc_propagates_root`
    PropagatesRoot,
    /// `gc_temporarily_roots`
    TemporarilyRoots,
    /// `gc_require_rooted_slot`
    RequireRootedSlot,
    /// `gc_disabled`
    GcDisabled,
    /// `gc_notsafepoint_enter`
    NotSafepointEnter,
    /// `gc_notsafepoint_leave`
    NotSafepointLeave,
}

impl Annotation {
    /// Parse an annotation string. Unrecognized strings yield `None`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "gc_globally_rooted" => Some(Annotation::GloballyRooted),
            "gc_not_safepoint" => Some(Annotation::NotSafepoint),
            "gc_maybe_unrooted" => Some(Annotation::MaybeUnrooted),
            "gc_rooting_argument" => Some(Annotation::RootingArgument),
            "gc_rooted_argument" => Some(Annotation::RootedArgument),
            "gc_propagates_root" => Some(Annotation::PropagatesRoot),
            "gc_temporarily_roots" => Some(Annotation::TemporarilyRoots),
            "gc_require_rooted_slot" => Some(Annotation::RequireRootedSlot),
            "gc_disabled" => Some(Annotation::GcDisabled),
            "gc_notsafepoint_enter" => Some(Annotation::NotSafepointEnter),
            "gc_notsafepoint_leave" => Some(Annotation::NotSafepointLeave),
            _ => None,
        }
    }

    /// Get the annotation string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Annotation::GloballyRooted => "gc_globally_rooted",
            Annotation::NotSafepoint => "gc_not_safepoint",
            Annotation::MaybeUnrooted => "gc_maybe_unrooted",
            Annotation::RootingArgument => "gc_rooting_argument",
            Annotation::RootedArgument => "gc_rooted_argument",
            Annotation::PropagatesRoot => "gc_propagates_root",
            Annotation::TemporarilyRoots => "gc_temporarily_roots",
            Annotation::RequireRootedSlot => "gc_require_rooted_slot",
            Annotation::GcDisabled => "gc_disabled",
            Annotation::NotSafepointEnter => "gc_notsafepoint_enter",
            Annotation::NotSafepointLeave => "gc_notsafepoint_leave",
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// The set of annotations resolved for one declaration.
///
/// Resolved once when the declaration is registered, queried many times
/// during analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnotationSet(u16);

impl AnnotationSet {
    /// The empty set.
    pub const EMPTY: AnnotationSet = AnnotationSet(0);

    /// Create an empty set.
    pub fn new() -> Self {
        Self::EMPTY
    }

    /// Add an annotation to the set.
    pub fn insert(&mut self, annotation: Annotation) {
        self.0 |= annotation.bit();
    }

    /// Check membership.
    pub fn contains(&self, annotation: Annotation) -> bool {
        self.0 & annotation.bit() != 0
    }

    /// Whether no annotations are present.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Resolve a list of raw annotation strings. Unrecognized strings are
    /// ignored; the checker only ever reacts to its own vocabulary.
    pub fn resolve<'a>(raw: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = Self::new();
        for s in raw {
            if let Some(a) = Annotation::from_str(s) {
                set.insert(a);
            }
        }
        set
    }
}

impl FromIterator<Annotation> for AnnotationSet {
    fn from_iter<I: IntoIterator<Item = Annotation>>(iter: I) -> Self {
        let mut set = Self::new();
        for a in iter {
            set.insert(a);
        }
        set
    }
}
