//! The `Workbook` aggregate: the Core API surface, built on top of the
//! `Evaluator` (cache + dep graph + sheets) and the sectioned file format
//! reader/writer.
//!
//! Grounded on `gridline-core::document::state::Document` (the top-level
//! document struct: grid + scripts + a `path: Option<PathBuf>`) plus
//! `document/ops.rs::set_cell_from_input` for the write path this delegates
//! straight to `Evaluator::set_text`. Undo/redo and row/column insert-delete
//! are out of scope and have no counterpart here.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cellscript_engine::{Attributes, CellAddress, ExpressionMode, Value};

use crate::error::{Result, WorkbookError};
use crate::evaluator::Evaluator;
use crate::storage::{self, writer::WriteModel};

/// The workbook-level aggregate the host (grid view, CLI, whatever) drives.
/// Single-writer/single-reader: callers serialize their own access to one
/// `Workbook`, the same way a `Document` is owned by one UI thread.
pub struct Workbook {
    evaluator: Arc<Evaluator>,
    path: Mutex<Option<PathBuf>>,
    /// Safe-mode loading (unsigned file) suppresses all evaluation; cells
    /// render their raw text instead. File signing itself is outside the
    /// core's concerns; the host decides whether to open in safe mode and
    /// this flag is the switch it flips.
    safe_mode: Mutex<bool>,
}

impl Workbook {
    /// A fresh, empty workbook with one sheet named `Sheet1`.
    pub fn new() -> Result<Workbook> {
        let evaluator = Evaluator::new();
        evaluator.add_sheet("Sheet1")?;
        Ok(Workbook { evaluator, path: Mutex::new(None), safe_mode: Mutex::new(false) })
    }

    /// `open(path) -> Workbook`. The draft buffer is never persisted and is
    /// cleared on load: the applied script also seeds the draft, so a
    /// freshly opened workbook has no unsaved edits.
    pub fn open(path: impl AsRef<Path>) -> Result<Workbook> {
        let path = path.as_ref();
        let parsed = storage::parse(path)?;
        let evaluator = Evaluator::new();

        let mut names = parsed.sheet_names.clone();
        names.sort_by_key(|(i, _)| *i);
        if names.is_empty() {
            evaluator.add_sheet("Sheet1")?;
        } else {
            for (index, name) in &names {
                let added = evaluator.add_sheet(name.clone())?;
                debug_assert_eq!(added, *index, "sheet indices in [sheet_names] must be contiguous from 0");
            }
        }

        if let Some(mode) = parsed.mode {
            evaluator.set_mode(mode);
        }

        for record in &parsed.cells {
            let addr = CellAddress::new(record.sheet, record.row, record.col);
            evaluator.set_text(addr, record.text.clone());
        }

        for record in &parsed.attributes {
            let addr = CellAddress::new(record.sheet, record.row, record.col);
            let mut attrs = evaluator.attributes.entry(addr).or_default();
            for (key, value) in &record.properties {
                attrs.properties.insert(key.clone(), value.clone());
            }
        }

        for (name, script) in &parsed.sheet_scripts {
            let sheet = names
                .iter()
                .find(|(_, n)| n == name)
                .map(|(index, _)| *index)
                .ok_or_else(|| WorkbookError::UnknownSheet(name.clone()))?;
            evaluator.apply_script(sheet, script)?;
        }

        Ok(Workbook {
            evaluator,
            path: Mutex::new(Some(path.to_path_buf())),
            safe_mode: Mutex::new(false),
        })
    }

    /// `save(path)`. Saving while any sheet carries a dirty draft (applied
    /// script != draft) produces a warning rather than failing; callers that
    /// want that warning should check `dirty_draft_sheets` before calling
    /// `save`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let sheet_names: Vec<(u32, String)> = (0..self.evaluator.sheet_count() as u32)
            .map(|s| (s, self.evaluator.sheet_name(s).unwrap_or_default()))
            .collect();

        let mut rows = 0u32;
        let mut cols = 0u32;
        let cells: Vec<(u32, u32, u32, String)> = self
            .evaluator
            .text
            .iter()
            .map(|entry| {
                let k = *entry.key();
                rows = rows.max(k.row + 1);
                cols = cols.max(k.col + 1);
                (k.sheet, k.row, k.col, entry.value().clone())
            })
            .collect();

        let mut attributes = Vec::new();
        for entry in self.evaluator.attributes.iter() {
            let k = *entry.key();
            for (key, value) in &entry.value().properties {
                attributes.push((k.sheet, k.row, k.col, key.clone(), value.clone()));
            }
        }

        let sheet_scripts: Vec<(String, String)> = (0..self.evaluator.sheet_count() as u32)
            .filter_map(|s| {
                let script = self.evaluator.get_script(s)?;
                if script.is_empty() {
                    return None;
                }
                Some((self.evaluator.sheet_name(s).unwrap_or_default(), script))
            })
            .collect();

        let model = WriteModel {
            rows,
            cols,
            sheet_names: &sheet_names,
            cells: &cells,
            attributes: &attributes,
            sheet_scripts: &sheet_scripts,
            mode: self.evaluator.mode(),
        };
        storage::write(path, &model)?;
        *self.path.lock().expect("path lock poisoned") = Some(path.to_path_buf());
        Ok(())
    }

    /// Save back to the path this workbook was opened/last saved from.
    pub fn save_in_place(&self) -> Result<()> {
        let path = self.path.lock().expect("path lock poisoned").clone().ok_or(WorkbookError::NoFilePath)?;
        self.save(path)
    }

    /// Sheets whose draft differs from the last applied script: saving a
    /// workbook while a dirty draft exists produces a user-visible warning.
    pub fn dirty_draft_sheets(&self) -> Vec<u32> {
        (0..self.evaluator.sheet_count() as u32)
            .filter(|&s| {
                let script = self.evaluator.get_script(s).unwrap_or_default();
                let draft = self.evaluator.get_draft(s).unwrap_or_default();
                script != draft
            })
            .collect()
    }

    // ---- Core API -------------------------------------------------------

    pub fn get_text(&self, k: CellAddress) -> String {
        self.evaluator.get_text(k)
    }

    pub fn set_text(&self, k: CellAddress, text: impl Into<String>) {
        self.evaluator.set_text(k, text);
    }

    /// `get_value(k)` - triggers evaluation, unless safe mode is on, in
    /// which case the raw text is returned unevaluated.
    pub fn get_value(&self, k: CellAddress) -> Value {
        if *self.safe_mode.lock().expect("safe_mode lock poisoned") {
            return Value::Scalar(self.evaluator.get_text(k).into());
        }
        self.evaluator.eval(k)
    }

    pub fn apply_script(&self, sheet: u32, source: &str) -> Result<()> {
        self.evaluator.apply_script(sheet, source)
    }

    pub fn get_script(&self, sheet: u32) -> Option<String> {
        self.evaluator.get_script(sheet)
    }

    pub fn get_draft(&self, sheet: u32) -> Option<String> {
        self.evaluator.get_draft(sheet)
    }

    pub fn set_draft(&self, sheet: u32, source: impl Into<String>) -> Result<()> {
        self.evaluator.set_draft(sheet, source)
    }

    pub fn set_mode(&self, mode: ExpressionMode) {
        self.evaluator.set_mode(mode);
    }

    pub fn mode(&self) -> ExpressionMode {
        self.evaluator.mode()
    }

    /// `recalc_all()`: marks every cell dirty and evaluates every cell that
    /// has text.
    pub fn recalc_all(&self) {
        self.evaluator.recalc_all();
    }

    pub fn dirty_cells(&self) -> Vec<CellAddress> {
        self.evaluator.dirty_cells()
    }

    pub fn cell_meta(&self, k: CellAddress) -> (String, Attributes) {
        self.evaluator.cell_meta(k)
    }

    pub fn add_sheet(&self, name: impl Into<String>) -> Result<u32> {
        self.evaluator.add_sheet(name)
    }

    pub fn sheet_count(&self) -> usize {
        self.evaluator.sheet_count()
    }

    pub fn sheet_name(&self, index: u32) -> Option<String> {
        self.evaluator.sheet_name(index)
    }

    pub fn set_safe_mode(&self, on: bool) {
        *self.safe_mode.lock().expect("safe_mode lock poisoned") = on;
    }

    pub fn is_safe_mode(&self) -> bool {
        *self.safe_mode.lock().expect("safe_mode lock poisoned")
    }

    /// Cooperative cancellation token for in-progress `get_value` calls;
    /// trip it from another context (e.g. a "Stop" button handler) to abort
    /// the in-flight evaluation.
    pub fn cancel_token(&self) -> Arc<std::sync::atomic::AtomicBool> {
        self.evaluator.cancel_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(sheet: u32, row: u32, col: u32) -> CellAddress {
        CellAddress::new(sheet, row, col)
    }

    #[test]
    fn fresh_workbook_has_one_sheet() {
        let wb = Workbook::new().unwrap();
        assert_eq!(wb.sheet_count(), 1);
        assert_eq!(wb.sheet_name(0).as_deref(), Some("Sheet1"));
    }

    #[test]
    fn set_and_get_text_round_trip() {
        let wb = Workbook::new().unwrap();
        wb.set_text(a(0, 0, 0), ">1+1");
        assert_eq!(wb.get_text(a(0, 0, 0)), ">1+1");
        assert_eq!(wb.get_value(a(0, 0, 0)).to_string(), "2");
    }

    #[test]
    fn safe_mode_suppresses_evaluation() {
        let wb = Workbook::new().unwrap();
        wb.set_text(a(0, 0, 0), ">1+1");
        wb.set_safe_mode(true);
        assert_eq!(wb.get_value(a(0, 0, 0)).to_string(), ">1+1");
    }

    #[test]
    fn save_then_open_round_trips_cells_and_mode() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("cellscript_workbook_test_{}.csdoc", std::process::id()));

        let wb = Workbook::new().unwrap();
        wb.set_mode(ExpressionMode::ReverseMixed);
        wb.set_text(a(0, 0, 0), ">1+1");
        wb.set_text(a(0, 1, 0), ">C(\"A1\")+1");
        wb.save(&path).unwrap();

        let reopened = Workbook::open(&path).unwrap();
        assert_eq!(reopened.mode(), ExpressionMode::ReverseMixed);
        assert_eq!(reopened.get_value(a(0, 1, 0)).to_string(), "3");

        let _ = std::fs::remove_file(&path);
    }
}
