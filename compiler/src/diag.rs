// diag.rs — Fatal error model for the lowering pipeline
//
// Lowering either completes structurally or aborts with a single fatal error;
// there are no warnings, no recovery paths, and no partial results. Errors
// carry a stable code so the surrounding driver can match on them without
// parsing messages.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

// ── Error code ───────────────────────────────────────────────────────────

/// A stable error code (e.g., `E0100`).
///
/// Codes are `&'static str` constants defined in the `codes` module. Once
/// assigned, a code must never be reassigned to a different semantic meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable error codes, grouped by error kind.
pub mod codes {
    use super::DiagCode;

    /// Reference to a field absent from the field metadata table.
    pub const E0100: DiagCode = DiagCode("E0100");
    /// Reference to a scalar absent from the parameter table.
    pub const E0101: DiagCode = DiagCode("E0101");
    /// Field metadata lookup failed during subset mapping.
    pub const E0102: DiagCode = DiagCode("E0102");
    /// Builtin literal with no kernel rendering.
    pub const E0200: DiagCode = DiagCode("E0200");
    /// Kernel source and descriptor maps disagree.
    pub const E0300: DiagCode = DiagCode("E0300");
    /// Post-assembly verification obligations failed.
    pub const E0301: DiagCode = DiagCode("E0301");
}

// ── Error kind ───────────────────────────────────────────────────────────

/// Coarse error taxonomy. `MalformedInput` and `UnsupportedConstruct` are
/// upstream contract violations; `InconsistentAccess` is an internal
/// invariant violation and indicates a bug in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedInput,
    UnsupportedConstruct,
    InconsistentAccess,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::MalformedInput => "malformed input",
            ErrorKind::UnsupportedConstruct => "unsupported construct",
            ErrorKind::InconsistentAccess => "inconsistent access",
        };
        write!(f, "{}", s)
    }
}

// ── Lowering error ───────────────────────────────────────────────────────

/// A fatal lowering error. Aborts the pipeline; no partial graph is returned.
#[derive(Debug, Clone)]
pub struct LoweringError {
    pub kind: ErrorKind,
    pub code: DiagCode,
    pub message: String,
    pub detail: Option<String>,
}

impl LoweringError {
    pub fn new(kind: ErrorKind, code: DiagCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            detail: None,
        }
    }

    /// Attach supporting detail (offending name, obligation list, ...).
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn malformed_input(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedInput, code, message)
    }

    pub fn unsupported_construct(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedConstruct, code, message)
    }

    pub fn inconsistent_access(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InconsistentAccess, code, message)
    }
}

impl fmt::Display for LoweringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}] ({}): {}", self.code, self.kind, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n  note: {}", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for LoweringError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_detail() {
        let e = LoweringError::malformed_input(codes::E0100, "unknown field 'tmp'");
        assert_eq!(
            format!("{e}"),
            "error[E0100] (malformed input): unknown field 'tmp'"
        );
    }

    #[test]
    fn display_with_detail() {
        let e = LoweringError::inconsistent_access(codes::E0301, "verification failed")
            .with_detail("g1_linear_chain");
        assert_eq!(
            format!("{e}"),
            "error[E0301] (inconsistent access): verification failed\n  note: g1_linear_chain"
        );
    }

    #[test]
    fn kind_constructors() {
        assert_eq!(
            LoweringError::unsupported_construct(codes::E0200, "x").kind,
            ErrorKind::UnsupportedConstruct
        );
        assert_eq!(
            LoweringError::inconsistent_access(codes::E0300, "x").kind,
            ErrorKind::InconsistentAccess
        );
    }
}
