//! Structured diagnostics
//!
//! Records about the program being compiled, handed to an external printer. None of these
//! stop compilation: the offending code is lowered so that it fails when executed.

use kiln_syntax::Span;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticCode {
    /// A block-scoped binding is read where its declaration can never have run
    TdzAlwaysThrows,
    /// Assignment to a `const` binding
    ConstAssignment,
    /// A destructuring pattern element that cannot be assigned to
    InvalidDestructuringTarget,
    /// The left side of a plain or compound assignment cannot be assigned to
    InvalidAssignmentTarget,
    /// Two conflicting declarations of one name
    DuplicateDeclaration,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::TdzAlwaysThrows => "tdz-always-throws",
            DiagnosticCode::ConstAssignment => "const-assignment",
            DiagnosticCode::InvalidDestructuringTarget => "invalid-destructuring-target",
            DiagnosticCode::InvalidAssignmentTarget => "invalid-assignment-target",
            DiagnosticCode::DuplicateDeclaration => "duplicate-declaration",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Span,
    /// Function containing the offending code
    pub function: String,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>, span: Span, function: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            span,
            function: function.into(),
        }
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>, span: Span, function: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            span,
            function: function.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{}[{}] {}: {} (in {})",
            severity,
            self.code.as_str(),
            self.span,
            self.message,
            self.function
        )
    }
}

/// Serialize diagnostics for an external printer
pub fn diagnostics_to_json(diagnostics: &[Diagnostic]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let d = Diagnostic::warning(
            DiagnosticCode::TdzAlwaysThrows,
            "'x' is read before its declaration",
            Span::new(0, 1, 3, 5),
            "main",
        );
        assert_eq!(
            d.to_string(),
            "warning[tdz-always-throws] 3:5: 'x' is read before its declaration (in main)"
        );
    }

    #[test]
    fn test_json() {
        let d = Diagnostic::error(
            DiagnosticCode::InvalidDestructuringTarget,
            "invalid target",
            Span::default(),
            "f",
        );
        let json = diagnostics_to_json(&[d]).unwrap();
        assert!(json.contains("\"InvalidDestructuringTarget\""));
        assert!(json.contains("\"severity\": \"error\""));
    }
}
