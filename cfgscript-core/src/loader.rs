//! Module loading: resolve, fetch, execute, memoize

use crate::cache::{CacheEntry, LoadCache};
use crate::engine::{ImportHandler, ScriptEngine, SymbolTable};
use crate::reader::{ContentStore, ModulePath, Resolver};
use crate::{CancellationToken, Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Loader for one top-level load session.
///
/// Each distinct [`ModulePath`] is executed at most once per loader; every
/// requester sees the same symbol table, or the same memoized error.
pub struct ModuleLoader<'a, E: ScriptEngine> {
    engine: &'a E,
    resolver: &'a dyn Resolver,
    store: &'a dyn ContentStore,
    globals: &'a Arc<SymbolTable<E::Value>>,
    cancel: &'a CancellationToken,
    cache: LoadCache<E::Value>,
    stack: Vec<ModulePath>,
    executed: usize,
}

impl<'a, E: ScriptEngine> ModuleLoader<'a, E> {
    /// Create a loader with a fresh cache
    pub fn new(
        engine: &'a E,
        resolver: &'a dyn Resolver,
        store: &'a dyn ContentStore,
        globals: &'a Arc<SymbolTable<E::Value>>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            engine,
            resolver,
            store,
            globals,
            cancel,
            cache: LoadCache::new(),
            stack: Vec::new(),
            executed: 0,
        }
    }

    /// Load the root module of the session
    pub fn load_root(&mut self, name: &str) -> Result<Arc<SymbolTable<E::Value>>> {
        self.load(name, None)
    }

    /// Load `name` as imported from `from` (`None` for the root)
    pub fn load(
        &mut self,
        name: &str,
        from: Option<&ModulePath>,
    ) -> Result<Arc<SymbolTable<E::Value>>> {
        self.cancel.check()?;
        let path = self.resolver.resolve(self.cancel, name, from)?;

        match self.cache.entry(&path) {
            CacheEntry::Done(result) => {
                debug!("Cache hit for module: {}", path);
                return result;
            }
            CacheEntry::Pending => {
                warn!("Cycle in load graph at module: {}", path);
                return Err(Error::Cycle {
                    path,
                    chain: self.stack.clone(),
                });
            }
            CacheEntry::Absent => {}
        }

        self.cache.begin(path.clone());
        self.stack.push(path.clone());
        let result = self.fetch_and_exec(&path);
        self.stack.pop();
        self.cache.finish(path, result.clone());
        result
    }

    fn fetch_and_exec(&mut self, path: &ModulePath) -> Result<Arc<SymbolTable<E::Value>>> {
        let source = self.store.read_file(self.cancel, path)?;

        // Copy the shared references out so `self` can be lent to the engine.
        let engine = self.engine;
        let globals = self.globals;
        let cancel = self.cancel;

        self.executed += 1;
        let symbols = engine.exec_module(cancel, path, &source, globals, self)?;
        info!("Loaded module: {} ({} symbols)", path, symbols.len());
        Ok(Arc::new(symbols))
    }

    /// Number of modules handed to the engine so far
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// The session cache
    pub fn cache(&self) -> &LoadCache<E::Value> {
        &self.cache
    }
}

impl<'a, E: ScriptEngine> ImportHandler<E::Value> for ModuleLoader<'a, E> {
    fn import(&mut self, name: &str, from: &ModulePath) -> Result<Arc<SymbolTable<E::Value>>> {
        self.load(name, Some(from))
    }
}
