//! cfgscript core
//!
//! This crate loads configuration written as scripts and runs it:
//! - Resolving and reading modules through pluggable readers
//! - Loading each module exactly once per load, with cycle detection
//! - Running the config's `main(ctx)` and converting its result to records
//! - Discovering and running `test_*` functions
//!
//! The script language itself sits behind the [`ScriptEngine`] trait.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod loader;
pub mod reader;
pub mod testing;

pub use cache::{CacheEntry, LoadCache};
pub use cancel::CancellationToken;
pub use config::{load, Config, LoadOptions};
pub use engine::{
    ImportHandler, ReturnShape, ScriptEngine, ScriptValue, SymbolTable, ValueBridge,
};
pub use error::{Error, Position, Result, ScriptError};
pub use exec::{ExecOptions, MAIN_FUNCTION};
pub use loader::ModuleLoader;
pub use reader::{ContentStore, LocalFileReader, MemoryFileReader, ModulePath, Resolver};
pub use testing::{TestCase, TestOptions, TestOutcome, TestResult, TestSummary, TEST_PREFIX};
