//! Checker configuration.
//!
//! Everything here encodes facts about the *checked* runtime rather than
//! universal invariants: which namespaces are exempt, which name prefixes
//! mark trusted low-level code, which functions are lock primitives, and
//! the small-integer cache size behind the boxing fast path. All of it is
//! plain deserializable data so a different target runtime can swap the
//! tables without touching the analysis.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TypeRegistry;

/// Configuration errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The boxing cache size must be a positive, even number of entries.
    #[error("boxing cache size must be positive and even, got {0}")]
    InvalidBoxingCacheSize(i64),
}

/// Literal ranges for which the boxing intrinsics return cached,
/// permanently rooted boxes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxingRanges {
    /// Signed boxing range.
    pub signed: RangeInclusive<i64>,
    /// Unsigned boxing range.
    pub unsigned: RangeInclusive<i64>,
}

/// Tunable data for the checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Number of entries in the runtime's small-integer box cache. The
    /// canonical value of 1024 yields a signed range of `[-512, 511]` and
    /// an unsigned range of `[0, 1023]`.
    pub boxing_cache_size: i64,
    /// Name prefixes of the boxing intrinsics. A prefix followed by `u`
    /// selects the unsigned range.
    pub boxing_prefixes: Vec<String>,
    /// Namespaces whose members never count as safepoints.
    pub excluded_namespaces: Vec<String>,
    /// Function-name prefixes of linked low-level libraries that never
    /// enter the collector.
    pub quiet_prefixes: Vec<String>,
    /// Exceptions to `quiet_prefixes`: functions that re-enter arbitrary
    /// code (the event-loop entry point) and so remain safepoints.
    pub reentrant_exceptions: Vec<String>,
    /// Source-file name prefixes whose functions are trusted not to be
    /// safepoints even without an annotation.
    pub not_safepoint_path_prefixes: Vec<String>,
    /// Names of lock-acquisition primitives; calling one disables
    /// safepoints for the current frame.
    pub lock_acquire_names: Vec<String>,
    /// Names of lock-release primitives; calling one re-enables
    /// safepoints disabled at the current frame.
    pub lock_release_names: Vec<String>,
    /// Tracked-type classification tables.
    pub types: TypeRegistry,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            boxing_cache_size: 1024,
            boxing_prefixes: vec!["vm_box_".to_string()],
            excluded_namespaces: vec!["std".to_string(), "llvm".to_string()],
            quiet_prefixes: vec!["evl_".to_string(), "unw_".to_string()],
            reentrant_exceptions: vec!["evl_run".to_string()],
            not_safepoint_path_prefixes: vec!["lowlevel-".to_string()],
            lock_acquire_names: [
                "mutex_lock",
                "mutex_trylock",
                "rwlock_rdlock",
                "rwlock_tryrdlock",
                "rwlock_wrlock",
                "rwlock_trywrlock",
                "spin_lock",
                "spin_trylock",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            lock_release_names: [
                "mutex_unlock",
                "rwlock_rdunlock",
                "rwlock_wrunlock",
                "spin_unlock",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            types: TypeRegistry::default(),
        }
    }
}

impl CheckerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.boxing_cache_size <= 0 || self.boxing_cache_size % 2 != 0 {
            return Err(ConfigError::InvalidBoxingCacheSize(self.boxing_cache_size));
        }
        Ok(())
    }

    /// The literal ranges served from the box cache.
    pub fn boxing_ranges(&self) -> BoxingRanges {
        let half = self.boxing_cache_size / 2;
        BoxingRanges {
            signed: -half..=half - 1,
            unsigned: 0..=self.boxing_cache_size - 1,
        }
    }

    /// Whether `name` is a boxing intrinsic, and if so, whether it boxes
    /// an unsigned value.
    pub fn boxing_kind(&self, name: &str) -> Option<BoxingKind> {
        for prefix in &self.boxing_prefixes {
            if let Some(rest) = name.strip_prefix(prefix.as_str()) {
                if rest.starts_with('u') {
                    return Some(BoxingKind::Unsigned);
                }
                return Some(BoxingKind::Signed);
            }
        }
        None
    }

    /// Whether `name` is a lock-acquisition primitive.
    pub fn is_lock_acquire(&self, name: &str) -> bool {
        self.lock_acquire_names.iter().any(|n| n == name)
    }

    /// Whether `name` is a lock-release primitive.
    pub fn is_lock_release(&self, name: &str) -> bool {
        self.lock_release_names.iter().any(|n| n == name)
    }

    /// Whether `name` carries a quiet-library prefix, accounting for the
    /// re-entrant exceptions.
    pub fn is_quiet_name(&self, name: &str) -> bool {
        if self.reentrant_exceptions.iter().any(|n| n == name) {
            return false;
        }
        self.quiet_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

/// Signedness of a boxing intrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxingKind {
    /// Signed box, cached around zero.
    Signed,
    /// Unsigned box, cached from zero up.
    Unsigned,
}
