//! A sheet: its identity plus its script/draft/globals state.

use crate::error::{Result, WorkbookError};
use crate::sheet_env::SheetEnv;

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub index: u32,
    /// The last successfully applied script source.
    pub script: String,
    /// Unsaved edits to the script source; never persisted, cleared on
    /// load.
    pub draft: String,
    pub env: SheetEnv,
}

impl Sheet {
    pub fn new(index: u32, name: impl Into<String>) -> Result<Sheet> {
        let name = name.into();
        validate_sheet_name(&name)?;
        Ok(Sheet { name, index, script: String::new(), draft: String::new(), env: SheetEnv::default() })
    }
}

/// Sheet names must be non-empty, contain no control characters, and have
/// no leading/trailing whitespace.
pub fn validate_sheet_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.chars().any(|c| c.is_control())
        || name != name.trim()
    {
        return Err(WorkbookError::InvalidSheetName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace_padded_names() {
        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name(" Sheet1").is_err());
        assert!(validate_sheet_name("Sheet1 ").is_err());
        assert!(validate_sheet_name("Sheet1").is_ok());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(validate_sheet_name("Sheet\t1").is_err());
    }
}
