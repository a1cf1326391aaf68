//! Findings and rendering.
//!
//! Violations are reported as [`Finding`] values: plain data carrying the
//! kind, a message, the implicated symbolic identity, and any explanatory
//! notes. Findings never abort analysis - every rule produces a valid
//! successor state alongside its findings, so one path can surface
//! several independent defects.
//!
//! # Finding Codes
//!
//! - **G0101-G0199**: rooting and value-lifetime errors
//! - **G0201-G0299**: root-frame shape errors
//! - **G0301-G0399**: safepoint-discipline errors
//! - **G0901-G0999**: checker-internal consistency findings

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::span::Span;
use crate::sym::SymbolId;

/// The kind of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindingKind {
    /// A possibly-collected value was read, passed, returned, or rooted.
    UseOfPossiblyCollected,
    /// An unrooted value crossed a safepoint call without an exemption.
    MissingRoot,
    /// A rooting intrinsic was applied to something it cannot handle.
    MalformedRootingOp,
    /// Pop without push, or a frame left pushed at function end.
    UnbalancedRootFrame,
    /// A safepoint was reached while safepoints were disabled.
    SafepointViolation,
    /// Disable/enable annotations do not balance.
    AnnotationContractViolation,
    /// The checker lost track of a value it should have known.
    CheckerInternalInconsistency,
}

impl FindingKind {
    /// The stable finding code (e.g. "G0101").
    pub fn code(&self) -> &'static str {
        match self {
            FindingKind::UseOfPossiblyCollected => "G0101",
            FindingKind::MissingRoot => "G0102",
            FindingKind::MalformedRootingOp => "G0201",
            FindingKind::UnbalancedRootFrame => "G0202",
            FindingKind::SafepointViolation => "G0301",
            FindingKind::AnnotationContractViolation => "G0302",
            FindingKind::CheckerInternalInconsistency => "G0901",
        }
    }

    /// A short description of the finding class.
    pub fn description(&self) -> &'static str {
        match self {
            FindingKind::UseOfPossiblyCollected => "use of a possibly-collected value",
            FindingKind::MissingRoot => "unrooted value passed across a safepoint",
            FindingKind::MalformedRootingOp => "malformed rooting operation",
            FindingKind::UnbalancedRootFrame => "unbalanced root frame",
            FindingKind::SafepointViolation => "safepoint reached while disabled",
            FindingKind::AnnotationContractViolation => "unbalanced safepoint annotation",
            FindingKind::CheckerInternalInconsistency => "checker lost track of a value",
        }
    }
}

/// An explanatory note attached to a finding or produced by the
/// path explainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// The note text.
    pub message: String,
    /// An optional source range the note points at.
    pub span: Option<Span>,
}

impl Note {
    /// Create a note without a source range.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }

    /// Create a note pointing at a source range.
    pub fn at(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
        }
    }
}

/// One reported violation.
#[derive(Debug, Clone)]
pub struct Finding {
    /// The finding class.
    pub kind: FindingKind,
    /// The message, specific to this occurrence.
    pub message: String,
    /// The implicated symbolic identity, when there is one. The host can
    /// feed it back to [`crate::checker::explain`] while walking the path.
    pub symbol: Option<SymbolId>,
    /// The primary source range.
    pub span: Option<Span>,
    /// Explanatory notes gathered at report time.
    pub notes: Vec<Note>,
}

impl Finding {
    /// Create a finding with just a kind and message.
    pub fn new(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            symbol: None,
            span: None,
            notes: Vec::new(),
        }
    }

    /// Attach the implicated symbol.
    pub fn with_symbol(mut self, symbol: SymbolId) -> Self {
        self.symbol = Some(symbol);
        self
    }

    /// Attach the primary source range.
    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    /// Attach an explanatory note.
    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }
}

/// Renders findings against a source buffer.
pub struct FindingEmitter<'a> {
    filename: &'a str,
    source: &'a str,
}

impl<'a> FindingEmitter<'a> {
    /// Create an emitter for one source buffer.
    pub fn new(filename: &'a str, source: &'a str) -> Self {
        Self { filename, source }
    }

    /// Emit a finding to stderr.
    pub fn emit(&self, finding: &Finding) {
        let primary = finding.span.unwrap_or_default();
        let mut builder = Report::build(ReportKind::Error, self.filename, primary.start)
            .with_message(format!("[{}] {}", finding.kind.code(), finding.message));

        if finding.span.is_some() {
            builder = builder.with_label(
                Label::new((self.filename, primary.start..primary.end))
                    .with_color(Color::Red)
                    .with_message(&finding.message),
            );
        }

        let mut free_notes = Vec::new();
        for note in &finding.notes {
            match note.span {
                Some(span) => {
                    builder = builder.with_label(
                        Label::new((self.filename, span.start..span.end))
                            .with_color(Color::Blue)
                            .with_message(&note.message),
                    );
                }
                None => free_notes.push(note.message.as_str()),
            }
        }
        if !free_notes.is_empty() {
            builder = builder.with_note(free_notes.join("\n"));
        }

        let report = builder.finish();
        if report
            .eprint((self.filename, Source::from(self.source)))
            .is_err()
        {
            tracing::debug!("failed to render finding {}", finding.kind.code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_codes_are_unique() {
        let kinds = [
            FindingKind::UseOfPossiblyCollected,
            FindingKind::MissingRoot,
            FindingKind::MalformedRootingOp,
            FindingKind::UnbalancedRootFrame,
            FindingKind::SafepointViolation,
            FindingKind::AnnotationContractViolation,
            FindingKind::CheckerInternalInconsistency,
        ];
        let mut codes: Vec<_> = kinds.iter().map(|k| k.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_finding_builder() {
        let finding = Finding::new(FindingKind::MissingRoot, "value not rooted")
            .with_span(Some(Span::new(3, 8)))
            .with_note(Note::new("value allocated here"));
        assert_eq!(finding.kind.code(), "G0102");
        assert_eq!(finding.notes.len(), 1);
        assert_eq!(finding.span, Some(Span::new(3, 8)));
    }
}
