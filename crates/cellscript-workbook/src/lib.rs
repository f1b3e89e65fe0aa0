//! cellscript-workbook - sheets, the per-sheet script environment, the
//! evaluator core (tracker stack, eval orchestration), the spill protocol,
//! and the workbook document aggregate (Core API + persisted file format)
//! built on `cellscript-engine`.

pub mod error;
pub mod evaluator;
pub mod sheet;
pub mod sheet_env;
pub mod spill;
pub mod storage;
pub mod workbook;

pub use error::{Result, WorkbookError};
pub use evaluator::Evaluator;
pub use sheet::Sheet;
pub use sheet_env::SheetEnv;
pub use workbook::Workbook;
