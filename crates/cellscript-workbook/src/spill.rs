//! The 2-D spill fan-out protocol.
//!
//! Grounded on `src/core/eval.rs::handle_array_spill`/`clear_spill_from`
//! (conflict detection against occupied neighbors and against another
//! producer's spill, clearing a shrunk producer's stale spill cells),
//! generalized from a 1-D single-column spill
//! (`CellRef::new(source.row + i, source.col)`) to a full `width x height`
//! rectangle.

use std::sync::Arc;

use cellscript_engine::{new_text_store, CellAddress, DependencyGraph, TextStore};
use dashmap::DashMap;

/// Maps a spilled neighbor cell back to the cell that produced it.
pub type SpillSources = Arc<DashMap<CellAddress, CellAddress>>;

pub fn new_spill_sources() -> SpillSources {
    Arc::new(DashMap::new())
}

/// Tie a synthetic raw-text cell to its `(dr, dc)` slot via the sentinel
/// phrase `OFFSET(dr,dc)`.
pub fn offset_text(dr: u32, dc: u32) -> String {
    format!("OFFSET({dr},{dc})")
}

#[derive(Debug, PartialEq, Eq)]
pub struct SpillConflict;

/// Fan `source`'s `width x height` spill out over its neighbors. On
/// success, every non-origin `(dr, dc)` slot has a synthetic `OFFSET(dr,dc)`
/// cell written and registered in `spill_sources`; stale spill cells from a
/// shrunk previous spill are cleared. On conflict, nothing is written and
/// the caller is expected to materialize `ErrorValue(SpillConflictError)`
/// at `source` instead.
pub fn apply_spill(
    text: &TextStore,
    graph: &mut DependencyGraph,
    spill_sources: &SpillSources,
    source: CellAddress,
    width: u32,
    height: u32,
) -> Result<(), SpillConflict> {
    let mut neighbors = Vec::with_capacity((width as usize * height as usize).saturating_sub(1));
    for dr in 0..height {
        for dc in 0..width {
            if dr == 0 && dc == 0 {
                continue;
            }
            let n = source.offset(dr, dc).ok_or(SpillConflict)?;
            neighbors.push((dr, dc, n));
        }
    }

    for (dr, dc, n) in &neighbors {
        let existing = cellscript_engine::store::get_text(text, n);
        let is_ours = spill_sources.get(n).is_some_and(|s| *s == source);
        let is_our_sentinel = is_ours && existing == offset_text(*dr, *dc);
        if !existing.is_empty() && !is_our_sentinel {
            return Err(SpillConflict);
        }
    }

    clear_stale(text, graph, spill_sources, source, width, height);

    for (dr, dc, n) in neighbors {
        cellscript_engine::store::set_text(text, n, offset_text(dr, dc));
        spill_sources.insert(n, source);
        graph.mark_dirty(n);
    }
    Ok(())
}

/// Remove every spill cell this `source` previously registered that no
/// longer falls inside the new `width x height`: it clears itself back to
/// Empty when the producer shrinks.
fn clear_stale(
    text: &TextStore,
    graph: &mut DependencyGraph,
    spill_sources: &SpillSources,
    source: CellAddress,
    width: u32,
    height: u32,
) {
    let stale: Vec<CellAddress> = spill_sources
        .iter()
        .filter(|entry| *entry.value() == source)
        .map(|entry| *entry.key())
        .filter(|n| {
            let dr = n.row.wrapping_sub(source.row);
            let dc = n.col.wrapping_sub(source.col);
            dr >= height || dc >= width
        })
        .collect();
    for n in stale {
        cellscript_engine::store::set_text(text, n, String::new());
        spill_sources.remove(&n);
        graph.mark_dirty(n);
    }
}

/// Drop every spill cell registered to `source` (used when `source` stops
/// producing a `SpillOutput` at all, or is overwritten).
pub fn clear_all(text: &TextStore, graph: &mut DependencyGraph, spill_sources: &SpillSources, source: CellAddress) {
    let to_clear: Vec<CellAddress> =
        spill_sources.iter().filter(|e| *e.value() == source).map(|e| *e.key()).collect();
    for n in to_clear {
        cellscript_engine::store::set_text(text, n, String::new());
        spill_sources.remove(&n);
        graph.mark_dirty(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(row: u32, col: u32) -> CellAddress {
        CellAddress::new(0, row, col)
    }

    #[test]
    fn fans_out_a_2x2_rectangle() {
        let text = new_text_store();
        let mut graph = DependencyGraph::new();
        let sources = new_spill_sources();
        apply_spill(&text, &mut graph, &sources, a(1, 1), 2, 2).unwrap();
        assert_eq!(cellscript_engine::store::get_text(&text, &a(1, 2)), "OFFSET(0,1)");
        assert_eq!(cellscript_engine::store::get_text(&text, &a(2, 1)), "OFFSET(1,0)");
        assert_eq!(cellscript_engine::store::get_text(&text, &a(2, 2)), "OFFSET(1,1)");
    }

    #[test]
    fn conflicts_with_occupied_neighbor() {
        let text = new_text_store();
        let mut graph = DependencyGraph::new();
        let sources = new_spill_sources();
        cellscript_engine::store::set_text(&text, a(1, 2), ">99".to_string());
        assert!(apply_spill(&text, &mut graph, &sources, a(1, 1), 2, 2).is_err());
    }

    #[test]
    fn shrinking_clears_stale_neighbors() {
        let text = new_text_store();
        let mut graph = DependencyGraph::new();
        let sources = new_spill_sources();
        apply_spill(&text, &mut graph, &sources, a(1, 1), 2, 2).unwrap();
        apply_spill(&text, &mut graph, &sources, a(1, 1), 1, 1).unwrap();
        assert_eq!(cellscript_engine::store::get_text(&text, &a(1, 2)), "");
        assert_eq!(cellscript_engine::store::get_text(&text, &a(2, 1)), "");
    }
}
