//! The sectioned UTF-8 workbook file format: `[shape]`, `[sheet_names]`,
//! `[grid]`, `[attributes]`, `[sheet_scripts]`, `[parser_settings]`.
//!
//! Grounded on the `.grd` format (`storage/parser.rs`/
//! `storage/writer.rs`: `CELLREF: VALUE` lines, `\\`/`"` escaping, sorted
//! deterministic output), generalized from one flat cell listing into
//! named sections so sheet identity, per-sheet scripts, the attribute bag,
//! and the workbook-wide parser mode all round-trip alongside the grid.

pub mod parser;
pub mod writer;

pub use parser::parse;
pub use writer::write;

/// One parsed cell record: `sheet,label: text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRecord {
    pub sheet: u32,
    pub row: u32,
    pub col: u32,
    pub text: String,
}

/// Everything a `[attributes]` line can carry for one cell (the opaque
/// property bag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    pub sheet: u32,
    pub row: u32,
    pub col: u32,
    pub properties: Vec<(String, String)>,
}

/// The fully parsed document, before anything is installed into an
/// `Evaluator` via `Workbook::open`.
#[derive(Debug, Clone, Default)]
pub struct ParsedWorkbook {
    pub sheet_names: Vec<(u32, String)>,
    /// `(sheet name, script source)`, one per `(sheet_script:'Name')` block.
    pub sheet_scripts: Vec<(String, String)>,
    pub cells: Vec<CellRecord>,
    pub attributes: Vec<AttributeRecord>,
    pub mode: Option<cellscript_engine::ExpressionMode>,
}

/// Escape a value so it survives as one line: embedded newlines and
/// backslashes are escaped. Used for single-line sections; sheet scripts
/// are stored verbatim under an explicit linecount instead.
pub(crate) fn escape_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out
}

/// Inverse of [`escape_line`].
pub(crate) fn unescape_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_roundtrips_newlines_and_backslashes() {
        let original = "line one\\nliteral\nline two";
        assert_eq!(unescape_line(&escape_line(original)), original);
    }
}
