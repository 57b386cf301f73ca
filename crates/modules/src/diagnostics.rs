//! Source-located module diagnostics.
//!
//! The graph builder hands the dispatcher every import address it found
//! together with the span of the address in the source file. Addresses
//! that fail to parse come back through a [`DiagnosticSink`] so each
//! failure can be reported at its import site.

use miette::{Diagnostic, LabeledSpan, SourceSpan};
use std::fmt;

use crate::error::ModuleError;

/// An import address discovered in source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportCandidate {
    /// The address as written, including any scheme prefix.
    pub address: String,
    /// Where the address appears in the importing file.
    pub span: SourceSpan,
}

impl ImportCandidate {
    /// Create a candidate.
    #[must_use]
    pub fn new(address: impl Into<String>, span: impl Into<SourceSpan>) -> Self {
        Self {
            address: address.into(),
            span: span.into(),
        }
    }
}

/// A [`ModuleError`] attached to the import that caused it.
#[derive(Debug, Clone)]
pub struct ModuleDiagnostic {
    /// Location of the offending import address.
    pub span: SourceSpan,
    /// What went wrong.
    pub error: ModuleError,
}

impl fmt::Display for ModuleDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for ModuleDiagnostic {}

impl Diagnostic for ModuleDiagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.error.code()
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.error.help()
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some("module reference".to_string()),
            self.span,
        ))))
    }
}

/// Receives diagnostics produced while resolving imports.
pub trait DiagnosticSink {
    /// Record one diagnostic.
    fn report(&mut self, diagnostic: ModuleDiagnostic);
}

impl DiagnosticSink for Vec<ModuleDiagnostic> {
    fn report(&mut self, diagnostic: ModuleDiagnostic) {
        self.push(diagnostic);
    }
}
