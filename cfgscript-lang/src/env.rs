//! Module-level bindings

use crate::source::SourceFile;
use crate::value::Value;
use cfgscript_core::SymbolTable;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Globals of one executing module.
///
/// Functions keep their defining module alive so that they can still read
/// its globals when called after the module has finished executing.
pub struct ModuleEnv {
    source: Arc<SourceFile>,
    predeclared: Arc<SymbolTable<Value>>,
    bindings: RwLock<FxHashMap<String, Value>>,
}

impl ModuleEnv {
    pub fn new(source: Arc<SourceFile>, predeclared: Arc<SymbolTable<Value>>) -> Self {
        Self {
            source,
            predeclared,
            bindings: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn source(&self) -> &Arc<SourceFile> {
        &self.source
    }

    /// Look up a module global, falling back to the predeclared symbols
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.read().get(name) {
            return Some(value.clone());
        }
        self.predeclared.get(name).cloned()
    }

    pub fn set(&self, name: String, value: Value) {
        self.bindings.write().insert(name, value);
    }

    /// Freeze every global and return them as the module's exports
    pub fn freeze(&self) -> SymbolTable<Value> {
        let bindings = self.bindings.read().clone();
        bindings.values().for_each(Value::freeze);
        bindings
    }
}
