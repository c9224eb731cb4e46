//! Accumulating diagnostic handler.
//!
//! Every pass of the layout core reports failures here and continues
//! where it safely can, so one compilation unit yields all of its
//! independent diagnostics in a single run. Callers check
//! [`Handler::has_errors`] at checkpoints (e.g. before layout
//! synthesis) to avoid cascading follow-on errors.

use crate::{Diagnostic, Span};

/// Accumulating sink for diagnostics.
#[derive(Debug, Default)]
pub struct Handler {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl Handler {
    /// Create an empty handler.
    pub fn new() -> Self {
        Handler::default()
    }

    /// Report a diagnostic.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            self.error_count += 1;
        }
        self.diagnostics.push(diagnostic);
    }

    /// Number of errors reported so far (warnings and notes excluded).
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Whether any error has been reported.
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Borrow the accumulated diagnostics in report order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain all diagnostics, sorted by primary span then severity for
    /// deterministic output regardless of pass order.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.error_count = 0;
        let mut out = std::mem::take(&mut self.diagnostics);
        out.sort_by_key(|d| (d.primary_span().unwrap_or(Span::DUMMY).start, d.severity));
        out
    }
}
