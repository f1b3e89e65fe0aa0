//! Per-sheet script execution and globals partitioning.
//!
//! Grounded on `document/state.rs`/`document/io.rs`'s
//! `custom_functions`/`custom_ast`/`load_functions`/
//! `recreate_engine_with_functions` lifecycle (recompile on change, discard
//! previous state, surface compile errors to the caller), generalized from
//! a single workbook-wide function script to a per-sheet script whose
//! result bindings become *data* globals, not just functions, and split
//! into copyable/uncopyable partitions via the deep-clone probe.

use std::collections::HashMap;

use cellscript_engine::is_dynamic_copyable;
use rhai::{Dynamic, Engine, Scope};

use crate::error::{Result, WorkbookError};

/// The two globals partitions a sheet's applied script produces.
#[derive(Debug, Clone, Default)]
pub struct SheetEnv {
    pub copyable_globals: HashMap<String, Dynamic>,
    pub uncopyable_globals: HashMap<String, Dynamic>,
}

impl SheetEnv {
    /// Execute `source` in a fresh scope and partition the resulting
    /// bindings. Init scripts cannot reference cells (the reference parser
    /// is never invoked on this source) and cannot read other sheets'
    /// globals — they only ever see the bare Rhai language plus whatever
    /// host functions are registered on `engine` that aren't
    /// accessor-shaped (`help`, value constructors).
    pub fn apply(engine: &Engine, source: &str) -> Result<(SheetEnv, Vec<String>)> {
        let mut scope = Scope::new();
        engine
            .run_with_scope(&mut scope, source)
            .map_err(|e| WorkbookError::ScriptApplyFailed(e.to_string()))?;

        let mut env = SheetEnv::default();
        let mut warnings = Vec::new();
        for (name, _, value) in scope.into_iter() {
            let name = name.to_string();
            if env.copyable_globals.contains_key(&name) || env.uncopyable_globals.contains_key(&name) {
                warnings.push(format!("duplicate global name `{name}` in sheet script"));
            }
            if is_dynamic_copyable(&value) {
                env.copyable_globals.insert(name, value);
            } else {
                warnings.push(format!("`{name}` could not be deep-cloned; shared by reference"));
                env.uncopyable_globals.insert(name, value);
            }
        }
        Ok((env, warnings))
    }

    /// Build the execution scope for one cell evaluation: a deep clone of
    /// `copyable_globals` plus `uncopyable_globals` bound by shared
    /// reference.
    pub fn scope_for_eval(&self) -> Scope<'static> {
        let mut scope = Scope::new();
        for (name, value) in &self.copyable_globals {
            scope.push_dynamic(name.clone(), value.clone());
        }
        for (name, value) in &self.uncopyable_globals {
            scope.push_dynamic(name.clone(), value.clone());
        }
        scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_data_globals_are_copyable() {
        let engine = Engine::new();
        let (env, warnings) = SheetEnv::apply(&engine, "let taxRate = 0.2; let name = \"acme\";").unwrap();
        assert!(warnings.is_empty());
        assert!(env.copyable_globals.contains_key("taxRate"));
        assert!(env.copyable_globals.contains_key("name"));
    }

    #[test]
    fn script_error_surfaces_as_apply_failure() {
        let engine = Engine::new();
        assert!(SheetEnv::apply(&engine, "this is not valid rhai <<<").is_err());
    }
}
