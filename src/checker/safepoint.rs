//! Call classification: may this call transfer control into the
//! collector?
//!
//! The rules run in a fixed order, most-trusted exclusions first. The
//! conservative default for unresolvable calls is "yes, a safepoint".

use tracing::trace;

use crate::event::CallEvent;
use crate::types::TypeKind;

use super::{AnalysisCx, GcChecker};

impl GcChecker {
    /// Classify a call site.
    pub fn is_safepoint(&self, cx: &AnalysisCx, call: &CallEvent) -> bool {
        let result = self.classify(cx, call);
        if let Some(callee) = call.callee {
            trace!(
                callee = cx.decls.function_name(callee),
                safepoint = result,
                "classified call"
            );
        }
        result
    }

    fn classify(&self, cx: &AnalysisCx, call: &CallEvent) -> bool {
        // Declarations from excluded (system) libraries never reach the
        // collector.
        if call.origin.in_excluded_library {
            return false;
        }

        let Some(callee) = call.callee else {
            // No declaration. An indirect call through a function-pointer
            // type annotated as not a safepoint is trusted; anything else
            // without even a callee expression is conservatively a
            // safepoint.
            if !call.origin.has_callee_expr {
                return true;
            }
            if let Some(ty) = call.origin.callee_expr_ty {
                if let TypeKind::FnPointer { not_safepoint } = cx.types.kind(ty) {
                    return !not_safepoint;
                }
            }
            return true;
        };

        let decl = cx.decls.function(callee);
        if let Some(ns) = decl.namespace.as_deref() {
            if self
                .config()
                .excluded_namespaces
                .iter()
                .any(|excluded| excluded == ns)
            {
                return false;
            }
        }

        if decl.is_builtin || decl.is_trivial {
            return false;
        }

        let name = cx.decls.function_name(callee);
        if self.config().is_quiet_name(name) {
            return false;
        }
        // Low-level synchronization primitives by name.
        if self.config().is_lock_acquire(name) || self.config().is_lock_release(name) {
            return false;
        }

        !cx.decls.is_not_safepoint(callee, self.config())
    }
}
