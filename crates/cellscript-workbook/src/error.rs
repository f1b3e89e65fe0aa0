//! Workbook-level operational errors — distinct from `cellscript_engine`'s
//! `ErrorKind`/`Value::ErrorValue`, which are materialized *inside* the
//! grid as cell values; these are raised by Core API calls themselves and
//! never reach a cell.
//!
//! Grounded on `gridline-core::error::GridlineError`, trimmed of the
//! undo/redo/CSV-import variants that have no counterpart in the Core API.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("unknown sheet `{0}`")]
    UnknownSheet(String),

    #[error("sheet name `{0}` is invalid: must be non-empty, no control characters, no leading/trailing whitespace")]
    InvalidSheetName(String),

    #[error("sheet script did not apply: {0}")]
    ScriptApplyFailed(String),

    #[error("no file path is associated with this workbook")]
    NoFilePath,

    #[error(transparent)]
    Rhai(#[from] Box<rhai::EvalAltResult>),
}

pub type Result<T> = std::result::Result<T, WorkbookError>;
