//! The narrow interface the core uses to reach the script engine and value bridge

use crate::{CancellationToken, ModulePath, Result};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Names bound by executing a module, or made available to every module.
pub type SymbolTable<V> = FxHashMap<String, V>;

/// How a returned value looks to the execution harness.
#[derive(Debug, Clone)]
pub enum ReturnShape<V> {
    /// The engine's "nothing" value
    Empty,
    /// A list-like value and its elements, in order
    Sequence(Vec<V>),
    /// Anything else
    Other,
}

/// Capabilities the core needs from a script value.
pub trait ScriptValue: Clone + Send + Sync + 'static {
    /// Name of the value's type, used in error messages
    fn type_name(&self) -> String;

    /// Whether the value can be called
    fn is_callable(&self) -> bool;

    /// Classify the value as a return value of `main`
    fn shape(&self) -> ReturnShape<Self>;
}

/// Callback the engine uses to execute a nested `load(...)`.
pub trait ImportHandler<V> {
    /// Load `name` as imported by the module at `from` and return its symbols
    fn import(&mut self, name: &str, from: &ModulePath) -> Result<Arc<SymbolTable<V>>>;
}

/// Converts between script values and host records.
pub trait ValueBridge<V, R>: Send + Sync {
    /// Return the host record behind `value`, or `None` if it is not a valid record
    fn to_record(&self, value: &V) -> Option<R>;

    /// Wrap a host record as a script value
    fn from_record(&self, record: &R) -> V;
}

/// A script engine able to execute modules and call script functions.
pub trait ScriptEngine: Send + Sync + 'static {
    /// Script-side value type
    type Value: ScriptValue;

    /// Host-side record produced by a successful `main`
    type Record: Clone + Send + Sync + 'static;

    /// Type registry used by the value bridge
    type Registry: Send + Sync + 'static;

    /// Built-in global symbols, with record constructors bound to `registry`
    /// (or the engine's default registry when `None`)
    fn builtins(&self, registry: Option<Arc<Self::Registry>>) -> SymbolTable<Self::Value>;

    /// Extra global symbols that help writing tests (assertions and the like)
    fn test_helpers(&self) -> SymbolTable<Self::Value>;

    /// Execute a module body and return the symbols it defines.
    ///
    /// Every `load(...)` statement must be routed through `imports` with
    /// `path` as the importing module, and errors returned by `imports` must
    /// be propagated unchanged.
    fn exec_module(
        &self,
        cancel: &CancellationToken,
        path: &ModulePath,
        source: &[u8],
        globals: &Arc<SymbolTable<Self::Value>>,
        imports: &mut dyn ImportHandler<Self::Value>,
    ) -> Result<SymbolTable<Self::Value>>;

    /// Call a callable value with positional arguments
    fn call(
        &self,
        cancel: &CancellationToken,
        callable: &Self::Value,
        args: Vec<Self::Value>,
    ) -> Result<Self::Value>;

    /// Build the context record passed to `main` and tests; it exposes
    /// `vars` as a mapping
    fn new_context(&self, vars: Vec<(String, Self::Value)>) -> Self::Value;

    /// The value bridge for this engine's records
    fn bridge(&self) -> &dyn ValueBridge<Self::Value, Self::Record>;
}
