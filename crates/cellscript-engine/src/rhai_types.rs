//! Rhai-facing representations of the value-universe variants that need to
//! be constructible from script code, plus conversion to and from the
//! internal `Value` type.
//!
//! Registered as custom Rhai types (`engine.register_type_with_name`), the
//! same way `builtins.rs` registers its other builtin-facing wrapper types.

use rhai::{Array, Dynamic};

use crate::value::Value;

/// The shared, identity-comparable `Empty` singleton: deep-cloning it
/// returns the same identity rather than an independent copy. Registered
/// into the Rhai engine with operator overloads (see `builtins.rs`) so it
/// behaves as `0` in numeric context and `""` in string context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RhaiEmpty;

#[derive(Debug, Clone)]
pub struct RhaiRange {
    pub cells: Array,
    pub width: i64,
}

#[derive(Debug, Clone)]
pub struct RhaiSpillOutput {
    pub cells: Array,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone)]
pub struct RhaiHelpText {
    pub query: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct RhaiCellMeta {
    pub code: String,
    pub attributes: rhai::Map,
}

pub fn value_to_dynamic(v: Value) -> Dynamic {
    match v {
        Value::Empty => Dynamic::from(RhaiEmpty),
        Value::Scalar(d) | Value::Opaque(d) => d,
        Value::Range { cells, width, .. } => Dynamic::from(RhaiRange {
            cells: cells.into_iter().map(value_to_dynamic).collect(),
            width: width as i64,
        }),
        Value::SpillOutput { cells, width, height, .. } => Dynamic::from(RhaiSpillOutput {
            cells: cells.into_iter().map(value_to_dynamic).collect(),
            width: width as i64,
            height: height as i64,
        }),
        Value::HelpText { query, body } => Dynamic::from(RhaiHelpText { query, body }),
        Value::ErrorValue { kind, detail } => Dynamic::from(format!("{}: {detail}", kind.display())),
    }
}

pub fn dynamic_to_value(d: Dynamic) -> Value {
    if d.is::<RhaiEmpty>() {
        return Value::Empty;
    }
    if let Some(range) = d.clone().try_cast::<RhaiRange>() {
        return Value::Range {
            cells: range.cells.into_iter().map(dynamic_to_value).collect(),
            width: range.width.max(0) as u32,
            topleft: (0, 0),
        };
    }
    if let Some(spill) = d.clone().try_cast::<RhaiSpillOutput>() {
        return Value::SpillOutput {
            cells: spill.cells.into_iter().map(dynamic_to_value).collect(),
            width: spill.width.max(0) as u32,
            height: spill.height.max(0) as u32,
            topleft: (0, 0),
        };
    }
    if let Some(help) = d.clone().try_cast::<RhaiHelpText>() {
        return Value::HelpText { query: help.query, body: help.body };
    }
    if d.is_shared() {
        return Value::Opaque(d);
    }
    Value::Scalar(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roundtrips_through_dynamic() {
        let d = value_to_dynamic(Value::Empty);
        assert!(matches!(dynamic_to_value(d), Value::Empty));
    }

    #[test]
    fn scalar_roundtrips() {
        let d = value_to_dynamic(Value::Scalar(42.into()));
        assert!(matches!(dynamic_to_value(d), Value::Scalar(_)));
    }
}
