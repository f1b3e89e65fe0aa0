//! The evaluator core: orchestrates parse -> rewrite -> execute -> cache,
//! and owns the dependency graph, the smart cache, the sheets, and the
//! spill bookkeeping for one workbook.
//!
//! Grounded on `src/core/eval.rs::get_cell_display` (cache/dirty check,
//! preprocess, execute, cache-and-return shape) and
//! `document/ops.rs::set_cell_from_input` (the write path), generalized
//! with a tracker stack and live edge-learning in place of upfront static
//! dependency extraction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use cellscript_engine::{
    classify, create_engine, new_attribute_store, new_text_store, rewrite_references, store,
    AccessorHost, AttributeStore, CellAddress, Classified, DependencyGraph, ErrorKind,
    ExpressionMode, SmartCache, TextStore, Value,
};
use rhai::{Dynamic, Engine};

use crate::error::{Result, WorkbookError};
use crate::sheet::{validate_sheet_name, Sheet};
use crate::sheet_env::SheetEnv;
use crate::spill::{self, SpillSources};

pub struct Evaluator {
    pub text: TextStore,
    pub attributes: AttributeStore,
    graph: Mutex<DependencyGraph>,
    cache: Mutex<SmartCache>,
    sheets: RwLock<Vec<Sheet>>,
    mode: Mutex<ExpressionMode>,
    spill_sources: SpillSources,
    cancel: Arc<AtomicBool>,
    engine: OnceLock<Engine>,
}

impl Evaluator {
    pub fn new() -> Arc<Evaluator> {
        let evaluator = Arc::new(Evaluator {
            text: new_text_store(),
            attributes: new_attribute_store(),
            graph: Mutex::new(DependencyGraph::new()),
            cache: Mutex::new(SmartCache::new()),
            sheets: RwLock::new(Vec::new()),
            mode: Mutex::new(ExpressionMode::default()),
            spill_sources: spill::new_spill_sources(),
            cancel: Arc::new(AtomicBool::new(false)),
            engine: OnceLock::new(),
        });
        let host: Arc<dyn AccessorHost> = evaluator.clone();
        let _ = evaluator.engine.set(create_engine(host));
        evaluator
    }

    fn engine(&self) -> &Engine {
        self.engine.get().expect("engine initialized in Evaluator::new")
    }

    // ---- sheets -----------------------------------------------------

    pub fn add_sheet(&self, name: impl Into<String>) -> Result<u32> {
        let mut sheets = self.sheets.write().expect("sheets lock poisoned");
        let index = sheets.len() as u32;
        let sheet = Sheet::new(index, name)?;
        sheets.push(sheet);
        Ok(index)
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.read().expect("sheets lock poisoned").len()
    }

    pub fn sheet_name(&self, index: u32) -> Option<String> {
        self.sheets.read().expect("sheets lock poisoned").get(index as usize).map(|s| s.name.clone())
    }

    // ---- mode ---------------------------------------------------------

    pub fn set_mode(&self, mode: ExpressionMode) {
        *self.mode.lock().expect("mode lock poisoned") = mode;
    }

    pub fn mode(&self) -> ExpressionMode {
        *self.mode.lock().expect("mode lock poisoned")
    }

    // ---- sheet scripts --------------------------------------------------

    pub fn apply_script(&self, sheet: u32, source: &str) -> Result<()> {
        let (env, warnings) = SheetEnv::apply(self.engine(), source)?;
        {
            let mut sheets = self.sheets.write().expect("sheets lock poisoned");
            let s = sheets
                .get_mut(sheet as usize)
                .ok_or_else(|| WorkbookError::UnknownSheet(sheet.to_string()))?;
            s.env = env;
            s.script = source.to_string();
            s.draft = source.to_string();
        }
        for w in warnings {
            self.record_warning(CellAddress::new(sheet, 0, 0), ErrorKind::OpaqueWarning, w);
        }
        // On success, invalidate every cell in the workbook: a changed
        // script can change any accessor call's result, not just cells on
        // this sheet or ones that already had a tracked edge — `G`/`Sh(...)
        // .G` lets any sheet read this one's globals without creating a
        // dependency-graph edge for it.
        let mut graph = self.graph.lock().expect("graph lock poisoned");
        for entry in self.text.iter() {
            graph.mark_dirty(*entry.key());
        }
        Ok(())
    }

    pub fn get_script(&self, sheet: u32) -> Option<String> {
        self.sheets.read().expect("sheets lock poisoned").get(sheet as usize).map(|s| s.script.clone())
    }

    pub fn get_draft(&self, sheet: u32) -> Option<String> {
        self.sheets.read().expect("sheets lock poisoned").get(sheet as usize).map(|s| s.draft.clone())
    }

    pub fn set_draft(&self, sheet: u32, source: impl Into<String>) -> Result<()> {
        let mut sheets = self.sheets.write().expect("sheets lock poisoned");
        let s = sheets.get_mut(sheet as usize).ok_or_else(|| WorkbookError::UnknownSheet(sheet.to_string()))?;
        s.draft = source.into();
        Ok(())
    }

    // ---- text / Core API ----------------------------------------------

    pub fn get_text(&self, k: CellAddress) -> String {
        store::get_text(&self.text, &k)
    }

    /// Write path: drop `k`'s forward edges, mark `k` (and transitive
    /// dependents) dirty, update raw text.
    pub fn set_text(&self, k: CellAddress, text: impl Into<String>) {
        let mut graph = self.graph.lock().expect("graph lock poisoned");
        graph.remove_cell(k, false);
        graph.mark_dirty(k);
        // A direct write to a spill-occupied cell must also dirty its
        // producer, since spill occupancy isn't a dependency-graph edge.
        if let Some(source) = self.spill_sources.get(&k).map(|r| *r.value()) {
            graph.mark_dirty(source);
        }
        drop(graph);
        store::set_text(&self.text, k, text.into());
        self.cache.lock().expect("cache lock poisoned").remove(k);
    }

    pub fn dirty_cells(&self) -> Vec<CellAddress> {
        self.graph.lock().expect("graph lock poisoned").all_dirty().copied().collect()
    }

    pub fn cell_meta(&self, k: CellAddress) -> (String, cellscript_engine::Attributes) {
        let code = self.get_text(k);
        let attrs = self.attributes.get(&k).map(|r| r.value().clone()).unwrap_or_default();
        (code, attrs)
    }

    pub fn recalc_all(&self) {
        let addresses: Vec<CellAddress> = self.text.iter().map(|e| *e.key()).collect();
        {
            let mut graph = self.graph.lock().expect("graph lock poisoned");
            for k in &addresses {
                graph.mark_dirty(*k);
            }
        }
        for k in addresses {
            self.eval(k);
        }
    }

    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn record_warning(&self, at: CellAddress, kind: ErrorKind, detail: impl Into<String>) {
        self.attributes
            .entry(at)
            .or_default()
            .warnings
            .push(cellscript_engine::Warning::new(kind, detail));
    }

    // ---- evaluation -----------------------------------------------------

    pub fn eval(&self, k: CellAddress) -> Value {
        // Lock order is always graph-then-cache (matches the cache-store
        // step below) to avoid a lock-order inversion across calls.
        {
            let graph = self.graph.lock().expect("graph lock poisoned");
            if let Some(hit) = self.cache.lock().expect("cache lock poisoned").get(k, &graph) {
                return hit;
            }
        }

        let raw = store::get_text(&self.text, &k);
        if raw.is_empty() {
            return Value::Empty;
        }

        let (classified, warning) = classify(&raw, self.mode());
        if let Some(w) = warning {
            self.record_warning(k, w.kind, w.detail);
        }

        let value = match classified {
            Classified::Literal(v) => {
                self.graph.lock().expect("graph lock poisoned").remove_cell(k, false);
                v
            }
            Classified::Code(code) => self.eval_code(k, &code),
        };

        let mut graph = self.graph.lock().expect("graph lock poisoned");
        if let Some(w) = self.cache.lock().expect("cache lock poisoned").put(k, value.clone(), &mut graph) {
            drop(graph);
            self.record_warning(k, w.kind, w.detail);
        }
        value
    }

    fn eval_code(&self, k: CellAddress, code: &str) -> Value {
        // `add_edge` refuses cycles the moment an accessor call would create
        // one, so this should be unreachable in practice; kept as a
        // last-resort backstop in case a future accessor ever reads a cell
        // without going through `note_dependency` first.
        if cellscript_engine::tracker::is_evaluating(k) {
            return Value::error(ErrorKind::CircularRefError, k.to_string());
        }

        let rewritten = match rewrite_references(code, &k) {
            Ok(r) => r,
            Err(e) => return Value::error(ErrorKind::RefSyntaxError, e.to_string()),
        };

        let _frame = cellscript_engine::tracker::Frame::push(k);
        {
            let mut graph = self.graph.lock().expect("graph lock poisoned");
            graph.remove_cell(k, false); // edges are re-learned as accessors run
        }

        let mut scope = self
            .sheets
            .read()
            .expect("sheets lock poisoned")
            .get(k.sheet as usize)
            .map(|s| s.env.scope_for_eval())
            .unwrap_or_else(rhai::Scope::new);

        let result = self.engine().eval_with_scope::<Dynamic>(&mut scope, &rewritten);

        match result {
            Ok(d) => {
                let value = cellscript_engine::rhai_types::dynamic_to_value(d);
                self.finish_spill(k, value)
            }
            Err(e) => {
                // Runtime errors carry their payload as a `Dynamic`, not
                // just a formatted message; unwrap it directly rather than
                // going through `Display` so a sentinel-encoded string
                // (`propagate`/`circular_ref_err` in builtins.rs) survives
                // intact instead of being reformatted.
                let (message, hostclass) = match e.as_ref() {
                    rhai::EvalAltResult::ErrorRuntime(d, _) => {
                        (d.clone().into_string().unwrap_or_else(|_| d.to_string()), "RuntimeError".to_string())
                    }
                    other => (other.to_string(), rhai_error_class(other)),
                };
                match ErrorKind::decode(&message) {
                    Some((kind, detail)) => Value::error(kind, detail),
                    None => Value::error(ErrorKind::EvalError(hostclass), message),
                }
            }
        }
    }

    fn finish_spill(&self, k: CellAddress, value: Value) -> Value {
        let mut graph = self.graph.lock().expect("graph lock poisoned");
        match &value {
            Value::SpillOutput { width, height, .. } => {
                match spill::apply_spill(&self.text, &mut graph, &self.spill_sources, k, *width, *height) {
                    Ok(()) => value,
                    Err(_) => Value::error(
                        ErrorKind::SpillConflictError,
                        "cannot expand into an occupied neighbor cell",
                    ),
                }
            }
            _ => {
                spill::clear_all(&self.text, &mut graph, &self.spill_sources, k);
                value
            }
        }
    }
}

fn rhai_error_class(e: &rhai::EvalAltResult) -> String {
    // Rhai's `EvalAltResult` variants are the closest analogue to the
    // `EvalError`'s host-class string. `ErrorRuntime` is handled by the
    // caller directly (its payload is a `Dynamic`, not a formatted message)
    // and never reaches this match.
    match e {
        rhai::EvalAltResult::ErrorFunctionNotFound(_, _) => "FunctionNotFound".to_string(),
        rhai::EvalAltResult::ErrorMismatchDataType(_, _, _) => "TypeMismatch".to_string(),
        rhai::EvalAltResult::ErrorIndexingType(_, _) => "IndexError".to_string(),
        rhai::EvalAltResult::ErrorArrayBounds(_, _, _) => "IndexOutOfBounds".to_string(),
        rhai::EvalAltResult::ErrorArithmetic(_, _) => "ArithmeticError".to_string(),
        _ => "ScriptError".to_string(),
    }
}

impl AccessorHost for Evaluator {
    fn note_dependency(
        &self,
        dependent: CellAddress,
        dependency: CellAddress,
    ) -> std::result::Result<(), cellscript_engine::CircularRefError> {
        self.graph.lock().expect("graph lock poisoned").add_edge(dependent, dependency)
    }

    fn eval(&self, target: CellAddress) -> Value {
        Evaluator::eval(self, target)
    }

    fn resolve_sheet(&self, name: &str) -> Option<u32> {
        self.sheets
            .read()
            .expect("sheets lock poisoned")
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.index)
    }

    fn global(&self, sheet: u32, name: &str) -> Option<Dynamic> {
        let sheets = self.sheets.read().expect("sheets lock poisoned");
        let env = &sheets.get(sheet as usize)?.env;
        env.copyable_globals.get(name).or_else(|| env.uncopyable_globals.get(name)).cloned()
    }

    fn meta(&self, target: CellAddress) -> (String, rhai::Map) {
        let (code, attrs) = self.cell_meta(target);
        let mut map = rhai::Map::new();
        for (k, v) in attrs.properties {
            map.insert(k.into(), Dynamic::from(v));
        }
        (code, map)
    }

    fn check_cancelled(&self) -> std::result::Result<(), ()> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(())
        } else {
            Ok(())
        }
    }

    fn self_erase(&self, k: CellAddress) {
        store::set_text(&self.text, k, String::new());
        self.spill_sources.remove(&k);
        self.graph.lock().expect("graph lock poisoned").mark_dirty(k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(sheet: u32, row: u32, col: u32) -> CellAddress {
        CellAddress::new(sheet, row, col)
    }

    #[test]
    fn chain_of_three_cells_evaluates_bottom_up() {
        let ev = Evaluator::new();
        ev.add_sheet("Sheet1").unwrap();
        ev.set_text(a(0, 0, 0), ">1+1"); // A1
        ev.set_text(a(0, 1, 0), ">C(\"A1\")+1"); // A2
        ev.set_text(a(0, 2, 0), ">C(\"A2\")+1"); // A3
        let v = ev.eval(a(0, 2, 0));
        assert_eq!(v.to_string(), "4");
    }

    #[test]
    fn invalidation_propagates_after_write() {
        let ev = Evaluator::new();
        ev.add_sheet("Sheet1").unwrap();
        ev.set_text(a(0, 0, 0), ">1+1");
        ev.set_text(a(0, 1, 0), ">C(\"A1\")+1");
        assert_eq!(ev.eval(a(0, 1, 0)).to_string(), "3");
        ev.set_text(a(0, 0, 0), ">10");
        assert_eq!(ev.eval(a(0, 1, 0)).to_string(), "11");
    }

    #[test]
    fn direct_cycle_is_an_error_value() {
        let ev = Evaluator::new();
        ev.add_sheet("Sheet1").unwrap();
        ev.set_text(a(0, 0, 0), ">C(\"A2\")"); // A1
        ev.set_text(a(0, 1, 0), ">C(\"A1\")"); // A2
        let v = ev.eval(a(0, 1, 0));
        assert!(v.is_error());
    }

    #[test]
    fn empty_cell_is_zero_in_arithmetic() {
        let ev = Evaluator::new();
        ev.add_sheet("Sheet1").unwrap();
        ev.set_text(a(0, 1, 0), ">C(\"A1\") + 5"); // A1 is unset
        assert_eq!(ev.eval(a(0, 1, 0)).to_string(), "5");
    }
}
