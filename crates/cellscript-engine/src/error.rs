//! The error/warning taxonomy and the two user-facing formatters: a short
//! display string for the grid, and a longer tooltip.

use std::fmt;

use thiserror::Error;

/// A malformed cell label or range (`coord_of`, the reference parser).
/// Kept as its own `thiserror` type since it is raised directly by parsing
/// code, independent of a live evaluation — the evaluator wraps it into an
/// `ErrorKind::RefSyntaxError`/`Value::ErrorValue` at the point it surfaces
/// at a cell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid cell reference `{label}`: {reason}")]
pub struct RefSyntaxError {
    pub label: String,
    pub reason: String,
}

impl RefSyntaxError {
    pub fn new(label: impl Into<String>, reason: impl Into<String>) -> Self {
        RefSyntaxError { label: label.into(), reason: reason.into() }
    }
}

/// The canonical error kinds an evaluation can produce. `OpaqueWarning` is
/// carried here for a single taxonomy but is never installed as a cell's
/// `Value::ErrorValue` — it only ever appears inside `Warning` records on
/// the attribute bag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("#REF!")]
    RefSyntaxError,
    #[error("#CYCLE!")]
    CircularRefError,
    #[error("#SPILL!")]
    SpillConflictError,
    #[error("#ERR!")]
    EvalError(String),
    #[error("#CANCELLED!")]
    Cancelled,
    #[error("#WARN!")]
    OpaqueWarning,
}

impl ErrorKind {
    /// Short display form for the grid.
    pub fn display(&self) -> String {
        self.to_string()
    }

    /// Encode `(self, detail)` into a plain Rhai string so a `Value::ErrorValue`
    /// read back through an accessor (`C`, `R`, ...) can be re-raised as a
    /// Rhai error and propagate to the calling cell, instead of being
    /// silently stringified into an ordinary scalar. The evaluator's
    /// generic exception handler decodes it back into the exact
    /// `ErrorKind` rather than downgrading it to a fresh `EvalError`.
    pub fn encode(&self, detail: &str) -> String {
        let (tag, extra): (&str, &str) = match self {
            ErrorKind::RefSyntaxError => ("REF", ""),
            ErrorKind::CircularRefError => ("CYCLE", ""),
            ErrorKind::SpillConflictError => ("SPILL", ""),
            ErrorKind::EvalError(hostclass) => ("EVAL", hostclass.as_str()),
            ErrorKind::Cancelled => ("CANCELLED", ""),
            ErrorKind::OpaqueWarning => ("WARN", ""),
        };
        format!("{ERROR_VALUE_SENTINEL}{SEP}{tag}{SEP}{extra}{SEP}{detail}")
    }

    /// Inverse of [`ErrorKind::encode`].
    pub fn decode(s: &str) -> Option<(ErrorKind, String)> {
        let rest = s.strip_prefix(ERROR_VALUE_SENTINEL)?.strip_prefix(SEP)?;
        let mut parts = rest.splitn(3, SEP);
        let tag = parts.next()?;
        let extra = parts.next()?;
        let detail = parts.next().unwrap_or("").to_string();
        let kind = match tag {
            "REF" => ErrorKind::RefSyntaxError,
            "CYCLE" => ErrorKind::CircularRefError,
            "SPILL" => ErrorKind::SpillConflictError,
            "EVAL" => ErrorKind::EvalError(extra.to_string()),
            "CANCELLED" => ErrorKind::Cancelled,
            "WARN" => ErrorKind::OpaqueWarning,
            _ => return None,
        };
        Some((kind, detail))
    }
}

const ERROR_VALUE_SENTINEL: &str = "__cell_error__";
const SEP: &str = "\u{1}";

/// A warning accumulated during evaluation and attached to the producing
/// cell's attribute bag: opaque-value deep-clone skips, empty-but-non-empty
/// cells, duplicate-global-name collisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: ErrorKind,
    pub detail: String,
}

impl Warning {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Warning { kind, detail: detail.into() }
    }

    pub fn opaque(binding_name: impl fmt::Display) -> Self {
        Warning::new(
            ErrorKind::OpaqueWarning,
            format!("`{binding_name}` could not be deep-cloned; shared by reference"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms_are_short_codes() {
        assert_eq!(ErrorKind::RefSyntaxError.display(), "#REF!");
        assert_eq!(ErrorKind::CircularRefError.display(), "#CYCLE!");
        assert_eq!(ErrorKind::SpillConflictError.display(), "#SPILL!");
        assert_eq!(ErrorKind::Cancelled.display(), "#CANCELLED!");
    }

    #[test]
    fn error_value_sentinel_roundtrips() {
        for kind in [
            ErrorKind::RefSyntaxError,
            ErrorKind::CircularRefError,
            ErrorKind::SpillConflictError,
            ErrorKind::EvalError("RuntimeError".to_string()),
            ErrorKind::Cancelled,
        ] {
            let encoded = kind.encode("A1 -> A2 -> A1");
            let (decoded_kind, detail) = ErrorKind::decode(&encoded).unwrap();
            assert_eq!(decoded_kind, kind);
            assert_eq!(detail, "A1 -> A2 -> A1");
        }
    }

    #[test]
    fn ordinary_text_does_not_decode() {
        assert!(ErrorKind::decode("just a normal string").is_none());
    }
}
