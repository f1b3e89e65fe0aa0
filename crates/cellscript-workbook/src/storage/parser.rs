//! Parser for the sectioned workbook file format.
//!
//! Grounded on `storage/parser.rs::parse_grd_content`'s shape (iterate
//! lines, skip blank/`#`-comment lines, surface a `{line}: {message}`
//! parse error), generalized to dispatch by the current `[section]` header
//! instead of a single flat grammar.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use cellscript_engine::{coord_of, ExpressionMode};

use super::{escape_line, unescape_line, AttributeRecord, CellRecord, ParsedWorkbook};
use crate::error::{Result, WorkbookError};

pub fn parse(path: &Path) -> Result<ParsedWorkbook> {
    let content = fs::read_to_string(path)?;
    parse_content(&content)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Shape,
    SheetNames,
    Grid,
    Attributes,
    SheetScripts,
    ParserSettings,
}

pub fn parse_content(content: &str) -> Result<ParsedWorkbook> {
    let mut workbook = ParsedWorkbook::default();
    let mut section = Section::None;
    let mut attrs_by_cell: HashMap<(u32, u32, u32), Vec<(String, String)>> = HashMap::new();
    let lines: Vec<&str> = content.lines().collect();
    let mut idx = 0usize;

    while idx < lines.len() {
        let line_num = idx + 1;
        let line = lines[idx];
        idx += 1;
        if line.is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        if let Some(name) = line.trim().strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            section = match name {
                "shape" => Section::Shape,
                "sheet_names" => Section::SheetNames,
                "grid" => Section::Grid,
                "attributes" => Section::Attributes,
                "sheet_scripts" => Section::SheetScripts,
                "parser_settings" => Section::ParserSettings,
                other => {
                    return Err(WorkbookError::Parse {
                        line: line_num,
                        message: format!("unknown section `[{other}]`"),
                    })
                }
            };
            continue;
        }

        match section {
            Section::None => {
                return Err(WorkbookError::Parse {
                    line: line_num,
                    message: "content before the first section header".to_string(),
                })
            }
            Section::Shape => {} // descriptive only; re-derived from the grid on load
            Section::SheetNames => {
                let (index, name) = parse_kv(line, '=', line_num)?;
                let index: u32 = index
                    .parse()
                    .map_err(|_| WorkbookError::Parse { line: line_num, message: format!("sheet index `{index}` is not a number") })?;
                workbook.sheet_names.push((index, unescape_line(&name)));
            }
            Section::Grid => {
                let (addr, text) = parse_kv(line, ':', line_num)?;
                let (sheet, row, col) = parse_sheet_cell(&addr, line_num)?;
                let text = text.strip_prefix(' ').unwrap_or(text);
                workbook.cells.push(CellRecord { sheet, row, col, text: unescape_line(text) });
            }
            Section::Attributes => {
                let (addr_and_key, value) = parse_kv(line, ':', line_num)?;
                let (addr, key) = addr_and_key.rsplit_once(',').ok_or_else(|| WorkbookError::Parse {
                    line: line_num,
                    message: "expected `sheet,label,key: value`".to_string(),
                })?;
                let (sheet, row, col) = parse_sheet_cell(addr, line_num)?;
                let value = value.strip_prefix(' ').unwrap_or(value);
                attrs_by_cell.entry((sheet, row, col)).or_default().push((key.to_string(), unescape_line(value)));
            }
            Section::SheetScripts => {
                let trimmed = line.trim();
                let Some(rest) = trimmed.strip_prefix("(sheet_script:'") else {
                    return Err(WorkbookError::Parse {
                        line: line_num,
                        message: format!(
                            "expected a `(sheet_script:'Name') linecount` header, found `{trimmed}`; legacy numeric sheet_scripts identifiers are not accepted"
                        ),
                    });
                };
                let (name, count_str) = rest.split_once("') ").ok_or_else(|| WorkbookError::Parse {
                    line: line_num,
                    message: "malformed sheet_script header; expected `(sheet_script:'Name') linecount`".to_string(),
                })?;
                let count: usize = count_str.trim().parse().map_err(|_| WorkbookError::Parse {
                    line: line_num,
                    message: format!("sheet_script linecount `{}` is not a number", count_str.trim()),
                })?;
                let mut script_lines = Vec::with_capacity(count);
                for _ in 0..count {
                    if idx >= lines.len() {
                        return Err(WorkbookError::Parse {
                            line: line_num,
                            message: format!(
                                "sheet_script `{name}` declares {count} lines but the file ends before they do"
                            ),
                        });
                    }
                    script_lines.push(lines[idx]);
                    idx += 1;
                }
                workbook.sheet_scripts.push((name.to_string(), script_lines.join("\n")));
            }
            Section::ParserSettings => {
                let (key, value) = parse_kv(line, '=', line_num)?;
                if key.trim() != "mode" {
                    return Err(WorkbookError::Parse {
                        line: line_num,
                        message: format!("unknown parser setting `{}`; legacy keys are not accepted", key.trim()),
                    });
                }
                workbook.mode = Some(parse_mode(value.trim(), line_num)?);
            }
        }
    }

    for ((sheet, row, col), properties) in attrs_by_cell {
        workbook.attributes.push(AttributeRecord { sheet, row, col, properties });
    }

    Ok(workbook)
}

fn parse_kv<'a>(line: &'a str, sep: char, line_num: usize) -> Result<(&'a str, &'a str)> {
    line.split_once(sep).map(|(a, b)| (a.trim(), b)).ok_or_else(|| WorkbookError::Parse {
        line: line_num,
        message: format!("expected a `{sep}`-separated entry"),
    })
}

fn parse_sheet_cell(addr: &str, line_num: usize) -> Result<(u32, u32, u32)> {
    let (sheet, label) = addr.split_once(',').ok_or_else(|| WorkbookError::Parse {
        line: line_num,
        message: "expected `sheet,label`".to_string(),
    })?;
    let sheet: u32 = sheet
        .trim()
        .parse()
        .map_err(|_| WorkbookError::Parse { line: line_num, message: format!("sheet index `{sheet}` is not a number") })?;
    let (row, col) = coord_of(label.trim())
        .map_err(|e| WorkbookError::Parse { line: line_num, message: e.to_string() })?;
    Ok((sheet, row, col))
}

fn parse_mode(value: &str, line_num: usize) -> Result<ExpressionMode> {
    match value {
        "PurePythonic" => Ok(ExpressionMode::PurePythonic),
        "Mixed" => Ok(ExpressionMode::Mixed),
        "ReverseMixed" => Ok(ExpressionMode::ReverseMixed),
        "PureSpreadsheet" => Ok(ExpressionMode::PureSpreadsheet),
        other => Err(WorkbookError::Parse {
            line: line_num,
            message: format!("unknown expression mode `{other}`"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_workbook() {
        let content = "\
[shape]
sheets=1

[sheet_names]
0=Sheet1

[grid]
0,A1: >1+1
0,A2: >C(\"A1\")+1

[attributes]
0,A1,note: seed value

[sheet_scripts]
(sheet_script:'Sheet1') 1
let taxRate = 0.2;

[parser_settings]
mode=ReverseMixed
";
        let parsed = parse_content(content).unwrap();
        assert_eq!(parsed.sheet_names, vec![(0, "Sheet1".to_string())]);
        assert_eq!(parsed.cells.len(), 2);
        assert_eq!(parsed.mode, Some(ExpressionMode::ReverseMixed));
        assert_eq!(parsed.attributes.len(), 1);
        assert_eq!(parsed.attributes[0].properties, vec![("note".to_string(), "seed value".to_string())]);
        assert_eq!(parsed.sheet_scripts, vec![("Sheet1".to_string(), "let taxRate = 0.2;".to_string())]);
    }

    #[test]
    fn rejects_legacy_numeric_sheet_script_identifiers() {
        let content = "\
[sheet_scripts]
0: let taxRate = 0.2;
";
        let err = parse_content(content).unwrap_err();
        match err {
            WorkbookError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected a Parse error, got {other:?}"),
        }
    }

    #[test]
    fn sheet_script_header_consumes_exactly_its_declared_lines() {
        let content = "\
[sheet_scripts]
(sheet_script:'Sheet1') 2
let a = 1;
let b = 2;

[parser_settings]
mode=PurePythonic
";
        let parsed = parse_content(content).unwrap();
        assert_eq!(parsed.sheet_scripts, vec![("Sheet1".to_string(), "let a = 1;\nlet b = 2;".to_string())]);
        assert_eq!(parsed.mode, Some(ExpressionMode::PurePythonic));
    }

    #[test]
    fn rejects_legacy_numeric_parser_settings_keys() {
        let content = "\
[parser_settings]
implicitMode=1
";
        assert!(parse_content(content).is_err());
    }

    #[test]
    fn rejects_content_before_any_section() {
        assert!(parse_content("0,A1: >1+1\n").is_err());
    }

    #[test]
    fn reports_line_numbers_on_malformed_grid_entries() {
        let content = "[grid]\n0,ZZ0: >1\n";
        let err = parse_content(content).unwrap_err();
        match err {
            WorkbookError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected a Parse error, got {other:?}"),
        }
    }

    #[test]
    fn preserves_trailing_whitespace_in_cell_text() {
        let content = "[grid]\n0,A1: >hello  \n";
        let parsed = parse_content(content).unwrap();
        assert_eq!(parsed.cells[0].text, ">hello  ");
    }
}
