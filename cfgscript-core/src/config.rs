//! Loaded configs and load-time options

use crate::engine::{ScriptEngine, SymbolTable};
use crate::loader::ModuleLoader;
use crate::reader::{ContentStore, LocalFileReader, Resolver};
use crate::{CancellationToken, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Options adjusting how a config is loaded.
pub struct LoadOptions<E: ScriptEngine> {
    globals: SymbolTable<E::Value>,
    test_helpers: bool,
    resolver: Option<Arc<dyn Resolver>>,
    store: Option<Arc<dyn ContentStore>>,
    registry: Option<Arc<E::Registry>>,
}

impl<E: ScriptEngine> Default for LoadOptions<E> {
    fn default() -> Self {
        Self {
            globals: SymbolTable::default(),
            test_helpers: false,
            resolver: None,
            store: None,
            registry: None,
        }
    }
}

impl<E: ScriptEngine> LoadOptions<E> {
    /// Default options: builtins only, modules read relative to the config file
    pub fn new() -> Self {
        Self::default()
    }

    /// Add global symbols visible to every module. Later additions win.
    pub fn with_globals(mut self, globals: impl IntoIterator<Item = (String, E::Value)>) -> Self {
        self.globals.extend(globals);
        self
    }

    /// Add a single global symbol
    pub fn with_global(mut self, name: impl Into<String>, value: E::Value) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    /// Install the engine's test helpers as globals
    pub fn with_test_helpers(mut self) -> Self {
        self.test_helpers = true;
        self
    }

    /// Use `reader` both to resolve and to read modules
    pub fn with_file_reader<R>(mut self, reader: Arc<R>) -> Self
    where
        R: Resolver + ContentStore + 'static,
    {
        self.resolver = Some(reader.clone());
        self.store = Some(reader);
        self
    }

    /// Override only module resolution
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Override only module reading
    pub fn with_content_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the record type registry used by the value bridge
    pub fn with_registry(mut self, registry: Arc<E::Registry>) -> Self {
        self.registry = Some(registry);
        self
    }
}

/// A config whose modules have been fully loaded and which is ready to run.
///
/// A `Config` is immutable. Running `main` or tests never changes it, so it
/// can be reused after either fails.
pub struct Config<E: ScriptEngine> {
    engine: Arc<E>,
    filename: String,
    globals: Arc<SymbolTable<E::Value>>,
    locals: Arc<SymbolTable<E::Value>>,
}

impl<E: ScriptEngine> Clone for Config<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            filename: self.filename.clone(),
            globals: self.globals.clone(),
            locals: self.locals.clone(),
        }
    }
}

impl<E: ScriptEngine> std::fmt::Debug for Config<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}

/// Load the config at `filename` and every module it imports.
///
/// Any failure while loading aborts the whole load; no partial config is
/// returned.
pub fn load<E: ScriptEngine>(
    engine: Arc<E>,
    cancel: &CancellationToken,
    filename: &str,
    options: LoadOptions<E>,
) -> Result<Config<E>> {
    let LoadOptions {
        globals: extra_globals,
        test_helpers,
        resolver,
        store,
        registry,
    } = options;

    let mut globals = engine.builtins(registry);
    if test_helpers {
        globals.extend(engine.test_helpers());
    }
    globals.extend(extra_globals);
    let globals = Arc::new(globals);

    let (resolver, store): (Arc<dyn Resolver>, Arc<dyn ContentStore>) = match (resolver, store) {
        (Some(resolver), Some(store)) => (resolver, store),
        (resolver, store) => {
            let root = Path::new(filename)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let reader = Arc::new(LocalFileReader::new(root));
            (
                resolver.unwrap_or_else(|| reader.clone() as Arc<dyn Resolver>),
                store.unwrap_or_else(|| reader as Arc<dyn ContentStore>),
            )
        }
    };

    let mut loader = ModuleLoader::new(
        engine.as_ref(),
        resolver.as_ref(),
        store.as_ref(),
        &globals,
        cancel,
    );
    let locals = loader.load_root(filename)?;
    info!(
        "Loaded config {} ({} modules executed)",
        filename,
        loader.executed()
    );

    Ok(Config {
        engine,
        filename: filename.to_string(),
        globals,
        locals,
    })
}

impl<E: ScriptEngine> Config<E> {
    /// The filename passed to [`load`]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Symbols in the global namespace, including any added with
    /// [`LoadOptions::with_globals`]
    pub fn globals(&self) -> &SymbolTable<E::Value> {
        &self.globals
    }

    /// Symbols defined by the top-level module
    pub fn locals(&self) -> &SymbolTable<E::Value> {
        &self.locals
    }

    /// The engine the config was loaded with
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }
}
