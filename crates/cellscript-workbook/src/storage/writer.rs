//! Writer for the sectioned workbook file format, the inverse of
//! `parser::parse_content`.
//!
//! Grounded on `storage/writer.rs`: deterministic, sorted output
//! so two saves of the same in-memory state produce byte-identical files,
//! generalized from one flat `CELLREF: VALUE` listing into the spec's
//! named sections.

use std::fs;
use std::path::Path;

use cellscript_engine::ExpressionMode;

use super::escape_line;
use crate::error::Result;

/// Everything a save needs to know about the workbook, gathered by the
/// caller (`Workbook::save`) from the live `Evaluator`/sheet state.
pub struct WriteModel<'a> {
    pub rows: u32,
    pub cols: u32,
    pub sheet_names: &'a [(u32, String)],
    pub cells: &'a [(u32, u32, u32, String)],
    pub attributes: &'a [(u32, u32, u32, String, String)],
    /// `(sheet name, script source)` pairs; only non-empty scripts need be
    /// included.
    pub sheet_scripts: &'a [(String, String)],
    pub mode: ExpressionMode,
}

pub fn write(path: &Path, model: &WriteModel) -> Result<()> {
    let content = render(model);
    fs::write(path, content)?;
    Ok(())
}

pub fn render(model: &WriteModel) -> String {
    let mut out = String::new();

    out.push_str("[shape]\n");
    out.push_str(&format!(
        "{} {} {}\n\n",
        model.rows,
        model.cols,
        model.sheet_names.len()
    ));

    out.push_str("[sheet_names]\n");
    let mut names = model.sheet_names.to_vec();
    names.sort_by_key(|(i, _)| *i);
    for (index, name) in &names {
        out.push_str(&format!("{index}={}\n", escape_line(name)));
    }
    out.push('\n');

    out.push_str("[grid]\n");
    let mut cells = model.cells.to_vec();
    cells.sort_by_key(|(sheet, row, col, _)| (*sheet, *row, *col));
    for (sheet, row, col, text) in &cells {
        let label = cellscript_engine::label_of(*row, *col);
        out.push_str(&format!("{sheet},{label}: {}\n", escape_line(text)));
    }
    out.push('\n');

    out.push_str("[attributes]\n");
    let mut attrs = model.attributes.to_vec();
    attrs.sort_by_key(|(sheet, row, col, key, _)| (*sheet, *row, *col, key.clone()));
    for (sheet, row, col, key, value) in &attrs {
        let label = cellscript_engine::label_of(*row, *col);
        out.push_str(&format!("{sheet},{label},{key}: {}\n", escape_line(value)));
    }
    out.push('\n');

    out.push_str("[sheet_scripts]\n");
    let mut scripts = model.sheet_scripts.to_vec();
    scripts.sort_by_key(|(name, _)| name.clone());
    for (name, script) in &scripts {
        let linecount = script.lines().count().max(1);
        out.push_str(&format!("(sheet_script:'{name}') {linecount}\n"));
        if script.is_empty() {
            out.push('\n');
        } else {
            for line in script.lines() {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out.push('\n');

    out.push_str("[parser_settings]\n");
    out.push_str(&format!("mode={}\n", mode_name(model.mode)));

    out
}

fn mode_name(mode: ExpressionMode) -> &'static str {
    match mode {
        ExpressionMode::PurePythonic => "PurePythonic",
        ExpressionMode::Mixed => "Mixed",
        ExpressionMode::ReverseMixed => "ReverseMixed",
        ExpressionMode::PureSpreadsheet => "PureSpreadsheet",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::parser::parse_content;

    #[test]
    fn round_trips_through_the_parser() {
        let model = WriteModel {
            rows: 10,
            cols: 10,
            sheet_names: &[(0, "Sheet1".to_string())],
            cells: &[(0, 0, 0, ">1+1".to_string()), (0, 1, 0, ">C(\"A1\")+1".to_string())],
            attributes: &[(0, 0, 0, "note".to_string(), "seed value".to_string())],
            sheet_scripts: &[("Sheet1".to_string(), "let taxRate = 0.2;".to_string())],
            mode: ExpressionMode::ReverseMixed,
        };
        let content = render(&model);
        let parsed = parse_content(&content).unwrap();
        assert_eq!(parsed.sheet_names, vec![(0, "Sheet1".to_string())]);
        assert_eq!(parsed.cells.len(), 2);
        assert_eq!(parsed.mode, Some(ExpressionMode::ReverseMixed));
        assert_eq!(parsed.attributes.len(), 1);
        assert_eq!(
            parsed.sheet_scripts,
            vec![("Sheet1".to_string(), "let taxRate = 0.2;".to_string())]
        );
    }

    #[test]
    fn multi_line_sheet_script_round_trips() {
        let model = WriteModel {
            rows: 1,
            cols: 1,
            sheet_names: &[(0, "Sheet1".to_string())],
            cells: &[],
            attributes: &[],
            sheet_scripts: &[("Sheet1".to_string(), "let a = 1;\nlet b = 2;".to_string())],
            mode: ExpressionMode::PurePythonic,
        };
        let content = render(&model);
        let parsed = parse_content(&content).unwrap();
        assert_eq!(
            parsed.sheet_scripts,
            vec![("Sheet1".to_string(), "let a = 1;\nlet b = 2;".to_string())]
        );
    }

    #[test]
    fn escapes_embedded_newlines_in_text() {
        let model = WriteModel {
            rows: 1,
            cols: 1,
            sheet_names: &[(0, "Sheet1".to_string())],
            cells: &[(0, 0, 0, "line one\nline two".to_string())],
            attributes: &[],
            sheet_scripts: &[],
            mode: ExpressionMode::ReverseMixed,
        };
        let content = render(&model);
        let parsed = parse_content(&content).unwrap();
        assert_eq!(parsed.cells[0].text, "line one\nline two");
    }
}
