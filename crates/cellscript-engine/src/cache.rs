//! The smart cache: a value cache keyed by cell address whose validity is
//! gated by the dependency graph.
//!
//! Grounded in the `cached_value`/`dirty` pair carried directly on `Cell`
//! plus the shared `ValueCache`, pulled out here into a standalone structure
//! and given a transitive-validity read at lookup time (eager invalidation
//! via `mark_dependents_dirty` on every write re-derives `dirty` up front,
//! so this lazy transitive re-check at read time is new).

use std::collections::HashMap;

use crate::address::CellAddress;
use crate::error::Warning;
use crate::graph::DependencyGraph;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct SmartCache {
    /// Absent key means MISS; a stored entry is always present as itself,
    /// so a cached `Value::Empty` is never confused with "no entry".
    entries: HashMap<CellAddress, Value>,
}

impl SmartCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` (MISS) if there is no entry, `k` is dirty, or any
    /// transitive dependency of `k` is dirty; otherwise a deep clone of the
    /// stored value. Uncopyable (`Opaque`) values are returned by shared
    /// reference with a warning recorded by the caller at store time, not
    /// here.
    pub fn get(&self, k: CellAddress, graph: &DependencyGraph) -> Option<Value> {
        if graph.is_dirty(k) {
            return None;
        }
        if graph.transitive_deps(k).into_iter().any(|dep| graph.is_dirty(dep)) {
            return None;
        }
        self.entries.get(&k).map(Value::deep_clone)
    }

    /// Store `v` for `k` and clear `k`'s dirty flag.
    pub fn put(&mut self, k: CellAddress, v: Value, graph: &mut DependencyGraph) -> Option<Warning> {
        let warning = match &v {
            Value::Opaque(_) => Some(Warning::opaque(k.label())),
            _ => None,
        };
        self.entries.insert(k, v);
        graph.clear_dirty(k);
        warning
    }

    /// Mark `k` dirty without dropping the stored value (kept for
    /// debugging; validity is gated solely by `dirty`).
    pub fn invalidate(&self, k: CellAddress, graph: &mut DependencyGraph) {
        graph.mark_dirty(k);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn remove(&mut self, k: CellAddress) {
        self.entries.remove(&k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(n: u32) -> CellAddress {
        CellAddress::new(0, n, 0)
    }

    #[test]
    fn miss_when_absent() {
        let cache = SmartCache::new();
        let graph = DependencyGraph::new();
        assert!(cache.get(a(1), &graph).is_none());
    }

    #[test]
    fn hit_after_put_miss_after_dirty() {
        let mut cache = SmartCache::new();
        let mut graph = DependencyGraph::new();
        cache.put(a(1), Value::Scalar(1.into()), &mut graph);
        assert!(cache.get(a(1), &graph).is_some());
        graph.mark_dirty(a(1));
        assert!(cache.get(a(1), &graph).is_none());
    }

    #[test]
    fn miss_when_transitive_dependency_is_dirty() {
        let mut cache = SmartCache::new();
        let mut graph = DependencyGraph::new();
        graph.add_edge(a(2), a(1)).unwrap(); // 2 depends on 1
        cache.put(a(2), Value::Scalar(1.into()), &mut graph);
        graph.clear_dirty(a(1));
        assert!(cache.get(a(2), &graph).is_some());
        graph.mark_dirty(a(1));
        assert!(cache.get(a(2), &graph).is_none());
    }

    #[test]
    fn stored_empty_is_not_confused_with_miss() {
        let mut cache = SmartCache::new();
        let mut graph = DependencyGraph::new();
        cache.put(a(1), Value::Empty, &mut graph);
        assert!(matches!(cache.get(a(1), &graph), Some(Value::Empty)));
    }
}
