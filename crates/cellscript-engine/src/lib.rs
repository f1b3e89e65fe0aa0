//! cellscript-engine - coordinate codec, value model, expression/reference
//! parsing, and the Rhai scripting binding for a spreadsheet recalculation
//! engine.

pub mod address;
pub mod builtins;
pub mod cache;
pub mod error;
pub mod expr_parser;
pub mod graph;
pub mod rhai_types;
pub mod ref_parser;
pub mod store;
pub mod tracker;
pub mod value;

pub use address::{coord_of, label_of, CellAddress};
pub use builtins::{create_engine, AccessorHost};
pub use cache::SmartCache;
pub use error::{ErrorKind, RefSyntaxError, Warning};
pub use expr_parser::{classify, Classified, ExpressionMode};
pub use graph::{CircularRefError, DependencyGraph};
pub use ref_parser::rewrite as rewrite_references;
pub use store::{new_attribute_store, new_text_store, AttributeStore, Attributes, TextStore};
pub use value::{is_dynamic_copyable, Value};
