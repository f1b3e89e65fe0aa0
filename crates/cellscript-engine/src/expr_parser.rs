//! Classifies raw cell text into literal-or-code, according to a
//! configurable surface syntax.
//!
//! Grounded on `Cell::from_input`'s single implicit convention,
//! generalized into four selectable modes.

use crate::error::Warning;
use crate::value::Value;

/// The four configurable surface syntaxes, selected per workbook
/// (`Workbook::set_mode` in `cellscript-workbook`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpressionMode {
    PurePythonic,
    Mixed,
    #[default]
    ReverseMixed,
    PureSpreadsheet,
}

/// The classification result: either raw code to hand to the reference
/// parser, or a literal value to store directly.
#[derive(Debug, Clone)]
pub enum Classified {
    Code(String),
    Literal(Value),
}

/// Classify `text` per `mode`. An empty `text` always yields `Empty`
/// regardless of mode and bypasses the mode logic entirely.
///
/// Returns the classification plus any warning raised while classifying
/// (currently only "producing Empty from non-empty input").
pub fn classify(text: &str, mode: ExpressionMode) -> (Classified, Option<Warning>) {
    if text.is_empty() {
        return (Classified::Literal(Value::Empty), None);
    }

    let classified = match mode {
        ExpressionMode::PurePythonic => Classified::Code(text.to_string()),
        ExpressionMode::Mixed => match text.strip_prefix('\'') {
            Some(rest) => Classified::Literal(string_literal(rest)),
            None => Classified::Code(text.to_string()),
        },
        ExpressionMode::ReverseMixed => {
            if let Some(rest) = text.strip_prefix('>') {
                Classified::Code(rest.to_string())
            } else if let Some(rest) = text.strip_prefix('\'') {
                Classified::Literal(string_literal(rest))
            } else {
                Classified::Literal(string_literal(text))
            }
        }
        ExpressionMode::PureSpreadsheet => {
            if let Some(rest) = text.strip_prefix('=') {
                Classified::Code(rest.to_string())
            } else if let Ok(i) = text.parse::<i64>() {
                Classified::Literal(Value::Scalar(i.into()))
            } else if let Ok(f) = text.parse::<f64>() {
                Classified::Literal(Value::Scalar(f.into()))
            } else {
                let stripped = text.strip_prefix('\'').unwrap_or(text);
                Classified::Literal(string_literal(stripped))
            }
        }
    };

    let warning = match &classified {
        Classified::Literal(Value::Empty) => Some(Warning::new(
            crate::error::ErrorKind::OpaqueWarning,
            "cell text is non-empty but classified as Empty",
        )),
        _ => None,
    };

    (classified, warning)
}

fn string_literal(s: &str) -> Value {
    Value::Scalar(s.to_string().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_text(c: &Classified) -> Option<&str> {
        match c {
            Classified::Code(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[test]
    fn empty_bypasses_every_mode() {
        for mode in [
            ExpressionMode::PurePythonic,
            ExpressionMode::Mixed,
            ExpressionMode::ReverseMixed,
            ExpressionMode::PureSpreadsheet,
        ] {
            let (c, _) = classify("", mode);
            assert!(matches!(c, Classified::Literal(Value::Empty)));
        }
    }

    #[test]
    fn pure_pythonic_is_always_code() {
        let (c, _) = classify("1+1", ExpressionMode::PurePythonic);
        assert_eq!(code_text(&c), Some("1+1"));
    }

    #[test]
    fn mixed_quote_prefix_is_literal() {
        let (c, _) = classify("'hello", ExpressionMode::Mixed);
        assert!(matches!(c, Classified::Literal(Value::Scalar(_))));
        let (c, _) = classify("1+1", ExpressionMode::Mixed);
        assert_eq!(code_text(&c), Some("1+1"));
    }

    #[test]
    fn reverse_mixed_default_is_string_unless_gt_prefixed() {
        let (c, _) = classify(">1+1", ExpressionMode::ReverseMixed);
        assert_eq!(code_text(&c), Some("1+1"));
        let (c, _) = classify("'literal", ExpressionMode::ReverseMixed);
        assert!(matches!(c, Classified::Literal(_)));
        let (c, _) = classify("plain text", ExpressionMode::ReverseMixed);
        assert!(matches!(c, Classified::Literal(Value::Scalar(_))));
    }

    #[test]
    fn pure_spreadsheet_tries_numbers_then_strings() {
        let (c, _) = classify("=1+1", ExpressionMode::PureSpreadsheet);
        assert_eq!(code_text(&c), Some("1+1"));
        let (c, _) = classify("42", ExpressionMode::PureSpreadsheet);
        assert!(matches!(c, Classified::Literal(Value::Scalar(_))));
        let (c, _) = classify("3.5", ExpressionMode::PureSpreadsheet);
        assert!(matches!(c, Classified::Literal(Value::Scalar(_))));
        let (c, _) = classify("hello", ExpressionMode::PureSpreadsheet);
        assert!(matches!(c, Classified::Literal(Value::Scalar(_))));
    }
}
