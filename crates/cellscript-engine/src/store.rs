//! Raw-text cell store and the parallel attribute bag.
//!
//! Grounded on the `Grid` type alias
//! (`Arc<DashMap<CellRef, Cell>>`), split here into two sparse maps: text is
//! mode-agnostic (the expression mode is a workbook-level setting applied
//! at eval time, not baked into storage), and attributes are opaque to the
//! core except via the `CM` introspection accessor.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::address::CellAddress;
use crate::error::Warning;

/// Sparse mapping from cell address to user-authored text. Absent keys mean
/// `Empty`.
pub type TextStore = Arc<DashMap<CellAddress, String>>;

/// An opaque property bag: colors, alignment, renderer tag, plus the
/// warnings accumulated the last time the cell was evaluated.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    pub properties: HashMap<String, String>,
    pub warnings: Vec<Warning>,
}

/// Sparse mapping from cell address to its attribute bag.
pub type AttributeStore = Arc<DashMap<CellAddress, Attributes>>;

pub fn new_text_store() -> TextStore {
    Arc::new(DashMap::new())
}

pub fn new_attribute_store() -> AttributeStore {
    Arc::new(DashMap::new())
}

/// Read the raw text at `k`, or `""` if the cell is unset.
pub fn get_text(store: &TextStore, k: &CellAddress) -> String {
    store.get(k).map(|r| r.value().clone()).unwrap_or_default()
}

/// Write (or, if `text` is empty, unset) the raw text at `k`.
pub fn set_text(store: &TextStore, k: CellAddress, text: String) {
    if text.is_empty() {
        store.remove(&k);
    } else {
        store.insert(k, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_reads_as_empty_string() {
        let store = new_text_store();
        assert_eq!(get_text(&store, &CellAddress::new(0, 0, 0)), "");
    }

    #[test]
    fn setting_empty_text_unsets_the_cell() {
        let store = new_text_store();
        let k = CellAddress::new(0, 0, 0);
        set_text(&store, k, ">1+1".to_string());
        assert_eq!(store.len(), 1);
        set_text(&store, k, String::new());
        assert_eq!(store.len(), 0);
    }
}
