//! The universe of values a cell can hold.

use std::fmt;

use rhai::Dynamic;

use crate::error::ErrorKind;

/// The universe of values a cell can hold.
#[derive(Debug, Clone)]
pub enum Value {
    /// Singleton; deep-clone returns the same identity value rather than an
    /// independent copy.
    Empty,
    /// Any host scripting value that survived a round-trip deep clone.
    Scalar(Dynamic),
    /// A rectangular region, row-major flat list plus width.
    Range { cells: Vec<Value>, width: u32, topleft: (u32, u32) },
    /// A range a producer cell wants to fan out over neighboring cells.
    SpillOutput { cells: Vec<Value>, width: u32, height: u32, topleft: (u32, u32) },
    /// Result of a `CM`/`help` introspection call.
    HelpText { query: String, body: String },
    /// A computation failure, materialized as a value rather than raised.
    ErrorValue { kind: ErrorKind, detail: String },
    /// A value that failed the deep-clone probe; shared by reference, with
    /// a warning recorded at the point it was stored.
    Opaque(Dynamic),
}

impl Value {
    pub fn error(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Value::ErrorValue { kind, detail: detail.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::ErrorValue { .. })
    }

    /// Deep-clone probe: attempts a structural clone and reports whether
    /// the result is usable as a `copyable_globals` binding.
    /// `Scalar`/`Range`/`SpillOutput`/`HelpText`/`ErrorValue`/`Empty` are
    /// always copyable since they are plain Rust data once constructed; a
    /// `Dynamic` is copyable unless it wraps a native/shared object Rhai
    /// itself cannot clone structurally (it reports this via `is_shared`
    /// for the narrow set of object wrappers that can't be round-tripped).
    pub fn is_copyable(&self) -> bool {
        match self {
            Value::Opaque(_) => false,
            Value::Scalar(d) => dynamic_is_copyable(d),
            Value::Range { cells, .. } | Value::SpillOutput { cells, .. } => {
                cells.iter().all(Value::is_copyable)
            }
            Value::Empty | Value::HelpText { .. } | Value::ErrorValue { .. } => true,
        }
    }

    /// Structural deep clone. Callers that need the copyable/uncopyable
    /// split should check `is_copyable` first; cloning an opaque value
    /// still produces a usable shared-reference clone (`Dynamic::clone` is
    /// always defined), it's just not an *independent* clone.
    pub fn deep_clone(&self) -> Value {
        self.clone()
    }

    /// Row-major non-empty elements, in order.
    pub fn flatten(&self) -> Vec<Value> {
        match self {
            Value::Range { cells, .. } | Value::SpillOutput { cells, .. } => cells
                .iter()
                .filter(|v| !matches!(v, Value::Empty))
                .cloned()
                .collect(),
            other => vec![other.clone()],
        }
    }

    /// Row `r` (0-based) of a `Range`/`SpillOutput`, each element deep
    /// cloned per access.
    pub fn row(&self, r: usize) -> Option<Vec<Value>> {
        let (cells, width) = match self {
            Value::Range { cells, width, .. } => (cells, *width as usize),
            Value::SpillOutput { cells, width, .. } => (cells, *width as usize),
            _ => return None,
        };
        if width == 0 {
            return None;
        }
        let start = r.checked_mul(width)?;
        let end = start.checked_add(width)?;
        cells.get(start..end).map(|s| s.iter().map(Value::deep_clone).collect())
    }
}

/// Public entry point for callers (the sheet environment's deep-clone
/// probe) that need to classify a raw `Dynamic` binding before it's ever
/// wrapped in a `Value`.
pub fn is_dynamic_copyable(d: &Dynamic) -> bool {
    dynamic_is_copyable(d)
}

fn dynamic_is_copyable(d: &Dynamic) -> bool {
    // Rhai's own `clone()` is always structural; the cases that can't
    // round-trip independently are shared (`Rc`/`Arc`-backed) values -
    // typically modules or native objects a host function stashed without
    // implementing `Clone` semantics for. `is_shared` is Rhai's own marker
    // for exactly that case under the "sync" feature.
    !d.is_shared()
}

impl fmt::Display for Value {
    /// A short string suitable for display in one grid cell.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, ""),
            Value::Scalar(d) | Value::Opaque(d) => write!(f, "{d}"),
            Value::Range { cells, .. } => {
                let first = cells.iter().find(|v| !matches!(v, Value::Empty));
                match first {
                    Some(v) => write!(f, "{v}"),
                    None => write!(f, ""),
                }
            }
            Value::SpillOutput { cells, .. } => {
                let first = cells.iter().find(|v| !matches!(v, Value::Empty));
                match first {
                    Some(v) => write!(f, "{v}"),
                    None => write!(f, ""),
                }
            }
            Value::HelpText { query, .. } => write!(f, "{query}"),
            Value::ErrorValue { kind, .. } => write!(f, "{}", kind.display()),
        }
    }
}

impl Value {
    /// A longer string suitable for a hover tooltip.
    pub fn tooltip(&self) -> String {
        match self {
            Value::ErrorValue { detail, .. } => detail.clone(),
            Value::HelpText { body, .. } => body.clone(),
            Value::Empty => "Empty".to_string(),
            Value::Scalar(_) => "Scalar".to_string(),
            Value::Range { .. } => "Range".to_string(),
            Value::SpillOutput { .. } => "SpillOutput".to_string(),
            Value::Opaque(_) => "Opaque".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_display_is_blank() {
        assert_eq!(Value::Empty.to_string(), "");
    }

    #[test]
    fn error_display_is_kind_tooltip_is_detail() {
        let v = Value::error(ErrorKind::CircularRefError, "A1 -> A2 -> A1");
        assert_eq!(v.to_string(), "#CYCLE!");
        assert_eq!(v.tooltip(), "A1 -> A2 -> A1");
    }

    #[test]
    fn flatten_skips_empty_in_row_major_order() {
        let range = Value::Range {
            cells: vec![Value::Scalar(1.into()), Value::Empty, Value::Scalar(2.into())],
            width: 3,
            topleft: (0, 0),
        };
        let flat = range.flatten();
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn row_access_respects_width() {
        let range = Value::Range {
            cells: (0..6).map(|i| Value::Scalar(i.into())).collect(),
            width: 2,
            topleft: (0, 0),
        };
        let r1 = range.row(1).unwrap();
        assert_eq!(r1.len(), 2);
    }
}
