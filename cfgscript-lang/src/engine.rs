//! The config dialect as a [`ScriptEngine`]

use crate::builtins;
use crate::env::ModuleEnv;
use crate::eval::{Evaluator, PrintHandler};
use crate::parser::parse;
use crate::records::{Record, RecordBridge, RecordRegistry};
use crate::source::SourceFile;
use crate::value::{Arguments, Dict, Struct, Value};
use cfgscript_core::{
    CancellationToken, ImportHandler, ModulePath, Result, ScriptEngine, ScriptError, SymbolTable,
    ValueBridge,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Script engine for the config dialect.
///
/// ```no_run
/// use cfgscript_core::{load, CancellationToken, ExecOptions, LoadOptions};
/// use cfgscript_lang::Engine;
/// use std::sync::Arc;
///
/// let cancel = CancellationToken::new();
/// let config = load(Arc::new(Engine::new()), &cancel, "app.cfg", LoadOptions::new())?;
/// let records = config.main(&cancel, ExecOptions::new())?;
/// # Ok::<(), cfgscript_core::Error>(())
/// ```
pub struct Engine {
    registry: Arc<RecordRegistry>,
    print: PrintHandler,
    bridge: RecordBridge,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with an open record registry that logs `print` output
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RecordRegistry::open()),
            print: Arc::new(|line: &str| info!(target: "cfgscript::print", "{}", line)),
            bridge: RecordBridge,
        }
    }

    /// Use `registry` unless a load overrides it
    pub fn with_registry(mut self, registry: RecordRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Send `print(...)` output to `handler`
    pub fn with_print_handler(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.print = Arc::new(handler);
        self
    }

    /// The registry used when a load does not supply its own
    pub fn registry(&self) -> &Arc<RecordRegistry> {
        &self.registry
    }
}

impl ScriptEngine for Engine {
    type Value = Value;
    type Record = Record;
    type Registry = RecordRegistry;

    fn builtins(&self, registry: Option<Arc<RecordRegistry>>) -> SymbolTable<Value> {
        builtins::predeclared(registry.unwrap_or_else(|| self.registry.clone()))
    }

    fn test_helpers(&self) -> SymbolTable<Value> {
        builtins::test_helpers()
    }

    fn exec_module(
        &self,
        cancel: &CancellationToken,
        path: &ModulePath,
        source: &[u8],
        globals: &Arc<SymbolTable<Value>>,
        imports: &mut dyn ImportHandler<Value>,
    ) -> Result<SymbolTable<Value>> {
        let text = std::str::from_utf8(source).map_err(|err| {
            ScriptError::new(format!("{}: source is not valid UTF-8: {}", path, err))
        })?;
        let file = Arc::new(SourceFile::new(path.as_str(), text));
        let module = parse(text).map_err(|err| err.into_script_error(&file))?;
        debug!("Parsed {} ({} statements)", path, module.body.len());

        let env = Arc::new(ModuleEnv::new(file, globals.clone()));
        Evaluator::new(cancel, self.print.clone())
            .with_imports(imports)
            .exec_module(&module, &env)?;
        Ok(env.freeze())
    }

    fn call(&self, cancel: &CancellationToken, callable: &Value, args: Vec<Value>) -> Result<Value> {
        Evaluator::new(cancel, self.print.clone()).call(callable, Arguments::positional(args), 0)
    }

    fn new_context(&self, vars: Vec<(String, Value)>) -> Value {
        let mut fields = BTreeMap::new();
        fields.insert("vars".to_string(), Value::dict(Dict::from_strings(vars)));
        Value::Struct(Arc::new(Struct::new(fields)))
    }

    fn bridge(&self) -> &dyn ValueBridge<Value, Record> {
        &self.bridge
    }
}
