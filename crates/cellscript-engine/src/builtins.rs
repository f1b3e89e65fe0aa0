//! Builds the Rhai engine and registers the accessor surface (`C`, `R`,
//! `Sh`, `G`, `CR`, `CM`/`cell_meta`, `help`, and the `Range`/`SpillOutput`/
//! `Empty` constructors) available to every cell evaluation.
//!
//! Grounded on `builtins.rs::register_builtins` (closures capturing cloned
//! shared handles, `NativeCallContext`-threaded registered functions), with
//! one structural change: rather than reading straight out of a
//! `Grid`/`ValueCache` the closures own directly, these accessors call back
//! into the evaluator that owns the dependency graph and cache through the
//! `AccessorHost` trait object below — this keeps `cellscript-engine` (this
//! crate) ignorant of the higher-level `Evaluator`/`Workbook` types that
//! live in `cellscript-workbook`, mirroring a lower-crate/higher-crate
//! split.

use std::sync::Arc;

use rhai::{Array, Dynamic, Engine, EvalAltResult, NativeCallContext};

use crate::address::{coord_of, CellAddress};
use crate::graph::CircularRefError;
use crate::rhai_types::{
    dynamic_to_value, value_to_dynamic, RhaiCellMeta, RhaiEmpty, RhaiHelpText, RhaiRange,
    RhaiSpillOutput,
};
use crate::value::Value;

/// What the accessor closures need from the evaluator that owns the
/// dependency graph, the cache, and the sheet environments. Implemented by
/// `cellscript-workbook`'s `Evaluator`.
pub trait AccessorHost: Send + Sync {
    /// Record that `dependent` (the caller's tracker frame) depends on
    /// `dependency`, running the edge-insertion cycle check.
    fn note_dependency(
        &self,
        dependent: CellAddress,
        dependency: CellAddress,
    ) -> Result<(), CircularRefError>;

    /// Recursively evaluate `target`. Never raises: evaluation failures are
    /// materialized as `Value::ErrorValue`.
    fn eval(&self, target: CellAddress) -> Value;

    /// Resolve a sheet name to its index, if a sheet by that name exists.
    fn resolve_sheet(&self, name: &str) -> Option<u32>;

    /// Look up a global binding (`copyable_globals`/`uncopyable_globals`)
    /// on `sheet`, without forcing any cell evaluation.
    fn global(&self, sheet: u32, name: &str) -> Option<Dynamic>;

    /// Raw text and stringified attributes at `target`, without forcing
    /// evaluation. Backs the `CM` accessor.
    fn meta(&self, target: CellAddress) -> (String, rhai::Map);

    /// Checked between accessor calls for cooperative cancellation. `Err`
    /// means the evaluation should abort.
    fn check_cancelled(&self) -> Result<(), ()>;

    /// Clear the raw text at `k`: a spilled neighbor whose producer shrank
    /// "self-erases".
    fn self_erase(&self, k: CellAddress);
}

fn current_frame() -> Result<CellAddress, Box<EvalAltResult>> {
    crate::tracker::current()
        .ok_or_else(|| "accessor called with no active evaluation frame".into())
}

fn circular_ref_err(e: CircularRefError) -> Box<EvalAltResult> {
    e.kind().encode(&e.detail()).into()
}

fn resolve_label(label: &str) -> Result<(u32, u32), Box<EvalAltResult>> {
    coord_of(label).map_err(|e| crate::error::ErrorKind::RefSyntaxError.encode(&e.to_string()).into())
}

/// Convert the result of `host.eval(target)` into a Rhai return value: an
/// `ErrorValue` is re-raised as a Rhai error (encoded) so it propagates to
/// the calling cell instead of being silently read as a plain string;
/// anything else converts normally.
fn propagate(v: Value) -> Result<Dynamic, Box<EvalAltResult>> {
    match v {
        Value::ErrorValue { kind, detail } => Err(kind.encode(&detail).into()),
        other => Ok(value_to_dynamic(other)),
    }
}

/// Construct a fresh Rhai engine with the accessor surface registered
/// against `host`. Built once per workbook instance rather than per cell,
/// since the set of accessors is the same across cells but the `host`
/// handle differs per workbook.
pub fn create_engine(host: Arc<dyn AccessorHost>) -> Engine {
    let mut engine = Engine::new();
    register_types(&mut engine);
    register_accessors(&mut engine, host);
    engine
}

fn register_types(engine: &mut Engine) {
    engine.register_type_with_name::<RhaiEmpty>("Empty");
    engine.register_type_with_name::<RhaiRange>("Range");
    engine.register_type_with_name::<RhaiSpillOutput>("SpillOutput");
    engine.register_type_with_name::<RhaiHelpText>("HelpText");
    engine.register_type_with_name::<RhaiCellMeta>("CellMeta");
    engine.register_type_with_name::<SheetRef>("SheetRef");

    engine.register_fn("Empty", || RhaiEmpty);
    engine.register_fn("Range", |cells: Array, width: i64| RhaiRange { cells, width });
    engine.register_fn("SpillOutput", |cells: Array, width: i64, height: i64| RhaiSpillOutput {
        cells,
        width,
        height,
    });

    engine.register_get("query", |h: &mut RhaiHelpText| h.query.clone());
    engine.register_get("body", |h: &mut RhaiHelpText| h.body.clone());
    engine.register_get("code", |m: &mut RhaiCellMeta| m.code.clone());
    engine.register_get("attributes", |m: &mut RhaiCellMeta| m.attributes.clone());

    // Empty behaves as 0 / "" / false in arithmetic and string context.
    // Rhai has no generic implicit-conversion hook for custom types, so
    // this is a best-effort set of overloads for the common operators
    // rather than a universal coercion; see DESIGN.md.
    engine.register_fn("+", |_: RhaiEmpty, rhs: i64| rhs);
    engine.register_fn("+", |lhs: i64, _: RhaiEmpty| lhs);
    engine.register_fn("+", |_: RhaiEmpty, rhs: f64| rhs);
    engine.register_fn("+", |lhs: f64, _: RhaiEmpty| lhs);
    engine.register_fn("+", |_: RhaiEmpty, rhs: String| rhs);
    engine.register_fn("+", |lhs: String, _: RhaiEmpty| lhs);
    engine.register_fn("-", |_: RhaiEmpty, rhs: i64| -rhs);
    engine.register_fn("-", |lhs: i64, _: RhaiEmpty| lhs);
    engine.register_fn("*", |_: RhaiEmpty, _: i64| 0_i64);
    engine.register_fn("*", |_: i64, _: RhaiEmpty| 0_i64);
    engine.register_fn("==", |_: RhaiEmpty, _: RhaiEmpty| true);
    engine.register_fn("to_string", |_: RhaiEmpty| String::new());
    engine.register_fn("to_bool", |_: RhaiEmpty| false);
}

/// `Sh("SheetName")` returns one of these; `.C`/`.R`/`.G` are method calls
/// on it for the cross-sheet reference forms.
#[derive(Debug, Clone, Copy)]
struct SheetRef {
    sheet: u32,
}

fn register_accessors(engine: &mut Engine, host: Arc<dyn AccessorHost>) {
    let h = host.clone();
    engine.register_fn("C", move |ctx: NativeCallContext, label: &str| -> Result<Dynamic, Box<EvalAltResult>> {
        let _ = ctx;
        h.check_cancelled().map_err(|_| crate::error::ErrorKind::Cancelled.encode("evaluation cancelled"))?;
        let frame = current_frame()?;
        let (row, col) = resolve_label(label)?;
        let target = frame.same_sheet(row, col);
        h.note_dependency(frame, target).map_err(circular_ref_err)?;
        propagate(h.eval(target))
    });

    let h = host.clone();
    engine.register_fn(
        "R",
        move |_ctx: NativeCallContext, a1: &str, a2: &str| -> Result<Dynamic, Box<EvalAltResult>> {
            h.check_cancelled().map_err(|_| crate::error::ErrorKind::Cancelled.encode("evaluation cancelled"))?;
            let frame = current_frame()?;
            let range = eval_range(h.as_ref(), frame, frame.sheet, a1, a2)?;
            Ok(value_to_dynamic(range))
        },
    );

    let h = host.clone();
    engine.register_fn("Sh", move |sheet_name: &str| -> Result<SheetRef, Box<EvalAltResult>> {
        let sheet = h.resolve_sheet(sheet_name).ok_or_else(|| format!("unknown sheet `{sheet_name}`"))?;
        Ok(SheetRef { sheet })
    });

    let h = host.clone();
    engine.register_fn(
        "C",
        move |_ctx: NativeCallContext, s: &mut SheetRef, label: &str| -> Result<Dynamic, Box<EvalAltResult>> {
            h.check_cancelled().map_err(|_| crate::error::ErrorKind::Cancelled.encode("evaluation cancelled"))?;
            let frame = current_frame()?;
            let (row, col) = resolve_label(label)?;
            let target = CellAddress::new(s.sheet, row, col);
            h.note_dependency(frame, target).map_err(circular_ref_err)?;
            propagate(h.eval(target))
        },
    );

    let h = host.clone();
    engine.register_fn(
        "R",
        move |_ctx: NativeCallContext, s: &mut SheetRef, a1: &str, a2: &str| -> Result<Dynamic, Box<EvalAltResult>> {
            h.check_cancelled().map_err(|_| crate::error::ErrorKind::Cancelled.encode("evaluation cancelled"))?;
            let frame = current_frame()?;
            let range = eval_range(h.as_ref(), frame, s.sheet, a1, a2)?;
            Ok(value_to_dynamic(range))
        },
    );

    let h = host.clone();
    engine.register_fn("G", move |name: &str| -> Dynamic {
        let frame = crate::tracker::current();
        let sheet = frame.map(|f| f.sheet).unwrap_or(0);
        h.global(sheet, name).unwrap_or(Dynamic::UNIT)
    });

    let h = host.clone();
    engine.register_fn("G", move |s: &mut SheetRef, name: &str| -> Dynamic {
        h.global(s.sheet, name).unwrap_or(Dynamic::UNIT)
    });

    let h = host.clone();
    engine.register_fn("CR", move |_ctx: NativeCallContext, expr: &str| -> Result<Dynamic, Box<EvalAltResult>> {
        h.check_cancelled().map_err(|_| crate::error::ErrorKind::Cancelled.encode("evaluation cancelled"))?;
        let frame = current_frame()?;
        let (sheet, rest) = match expr.split_once('!') {
            Some((sheet_name, rest)) => {
                let sheet = h.resolve_sheet(sheet_name).ok_or_else(|| format!("unknown sheet `{sheet_name}`"))?;
                (sheet, rest)
            }
            None => (frame.sheet, expr),
        };
        if let Some((a1, a2)) = rest.split_once(':') {
            Ok(value_to_dynamic(eval_range(h.as_ref(), frame, sheet, a1, a2)?))
        } else {
            let (row, col) = resolve_label(rest)?;
            let target = CellAddress::new(sheet, row, col);
            h.note_dependency(frame, target).map_err(circular_ref_err)?;
            propagate(h.eval(target))
        }
    });

    let h = host.clone();
    engine.register_fn("CM", move || -> Result<RhaiCellMeta, Box<EvalAltResult>> {
        let frame = current_frame()?;
        let (code, attributes) = h.meta(frame);
        Ok(RhaiCellMeta { code, attributes })
    });
    let h = host.clone();
    engine.register_fn("CM", move |reference: &str| -> Result<RhaiCellMeta, Box<EvalAltResult>> {
        let frame = current_frame()?;
        let (row, col) = resolve_label(reference)?;
        let (code, attributes) = h.meta(frame.same_sheet(row, col));
        Ok(RhaiCellMeta { code, attributes })
    });
    let h = host.clone();
    engine.register_fn("cell_meta", move || -> Result<RhaiCellMeta, Box<EvalAltResult>> {
        let frame = current_frame()?;
        let (code, attributes) = h.meta(frame);
        Ok(RhaiCellMeta { code, attributes })
    });

    engine.register_fn("help", |query: &str| -> RhaiHelpText {
        RhaiHelpText {
            query: query.to_string(),
            body: format!("no documentation registered for `{query}`"),
        }
    });

    // Bound into synthetic spill-neighbor cells only: resolves to the
    // `(dr, dc)` slot of the producer `height/width` cells back from the
    // current frame, self-erasing if the producer no longer spills that
    // far.
    let h = host.clone();
    engine.register_fn("OFFSET", move |dr: i64, dc: i64| -> Result<Dynamic, Box<EvalAltResult>> {
        let Some(n) = crate::tracker::current() else { return Ok(Dynamic::UNIT) };
        let (Some(row), Some(col)) = (
            n.row.checked_sub(dr.max(0) as u32),
            n.col.checked_sub(dc.max(0) as u32),
        ) else {
            return Ok(Dynamic::UNIT);
        };
        let source = CellAddress::new(n.sheet, row, col);
        match h.eval(source) {
            Value::SpillOutput { cells, width, height, .. } => {
                let (dr, dc) = (dr.max(0) as u32, dc.max(0) as u32);
                if dr < height && dc < width {
                    if let Some(cell) = cells.get((dr * width + dc) as usize) {
                        return propagate(cell.clone());
                    }
                }
                h.self_erase(n);
                Ok(value_to_dynamic(Value::Empty))
            }
            error @ Value::ErrorValue { .. } => propagate(error),
            _ => {
                h.self_erase(n);
                Ok(value_to_dynamic(Value::Empty))
            }
        }
    });
}

/// Shared implementation for `R`/`CR`-with-range/`Sh(...).R`.
fn eval_range(
    host: &dyn AccessorHost,
    frame: CellAddress,
    sheet: u32,
    a1: &str,
    a2: &str,
) -> Result<Value, Box<EvalAltResult>> {
    let (r1, c1) = resolve_label(a1)?;
    let (r2, c2) = resolve_label(a2)?;
    let (row_start, row_end) = (r1.min(r2), r1.max(r2));
    let (col_start, col_end) = (c1.min(c2), c1.max(c2));
    let width = col_end - col_start + 1;
    let mut cells = Vec::new();
    for row in row_start..=row_end {
        for col in col_start..=col_end {
            let target = CellAddress::new(sheet, row, col);
            host.check_cancelled().map_err(|_| crate::error::ErrorKind::Cancelled.encode("evaluation cancelled"))?;
            host.note_dependency(frame, target).map_err(circular_ref_err)?;
            cells.push(host.eval(target));
        }
    }
    Ok(Value::Range { cells, width, topleft: (row_start, col_start) })
}
