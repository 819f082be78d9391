//! Error types for loading and running configs

use crate::reader::ModulePath;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Type alias for results produced by the core
pub type Result<T> = std::result::Result<T, Error>;

/// A source location inside a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    /// File (module path) the location belongs to
    pub file: Arc<str>,
    /// 1-based line number
    pub line: u32,
    /// 1-based column number
    pub column: u32,
}

impl Position {
    /// Create a new position
    pub fn new(file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A failure raised by the script engine while evaluating code.
///
/// The position and backtrace are kept verbatim so that user-facing aborts
/// (`fail(...)`) stay diagnosable after propagating through the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    /// The error message, without position or backtrace
    pub message: String,
    /// Where the error was raised, if known
    pub position: Option<Position>,
    /// Formatted call stack at the point of failure (may be empty)
    pub backtrace: String,
}

impl ScriptError {
    /// Create an error with only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
            backtrace: String::new(),
        }
    }

    /// Attach a source position
    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Attach a formatted backtrace
    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = backtrace.into();
        self
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(position) => write!(f, "[{}] {}", position, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if !self.backtrace.is_empty() {
            write!(f, "\n{}", self.backtrace.trim_end())?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

/// Errors that can occur while loading a config or running its functions.
///
/// Errors are `Clone` because a failed module load is memoized and handed to
/// every later requester of the same module.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A module name was malformed or disallowed
    #[error("load({name:?}): {reason}")]
    Resolve {
        /// The module name as written in the import
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A resolved module could not be read
    #[error("failed to read module {path}: {source}")]
    Fetch {
        /// The resolved path that failed
        path: ModulePath,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The load graph refers back to a module that is still loading
    #[error("cycle in load graph: {}", format_cycle(.chain, .path))]
    Cycle {
        /// The module that was requested again
        path: ModulePath,
        /// Modules on the load stack when the cycle was detected, outermost first
        chain: Vec<ModulePath>,
    },

    /// The script engine raised an error
    #[error(transparent)]
    Execution(#[from] ScriptError),

    /// The cancellation token fired or its deadline passed
    #[error("operation cancelled")]
    Cancelled,

    /// The root module defines no `main`
    #[error("no `main' function found in {filename:?}")]
    NoMainFunction {
        /// Filename of the config
        filename: String,
    },

    /// `main` exists but cannot be called
    #[error("`main' must be a function (got a {kind})")]
    NotCallable {
        /// Type name of the value bound to `main`
        kind: String,
    },

    /// `main` returned something other than `None` or a list of records
    #[error("{}", describe_shape(.kind, .index))]
    InvalidReturnShape {
        /// Type name of the offending value
        kind: String,
        /// Index of the offending element when the list itself was valid
        index: Option<usize>,
    },

    /// A test function did not complete cleanly
    #[error("test {name} failed: {source}")]
    TestExecution {
        /// Name of the test
        name: String,
        /// The error raised by the test body
        #[source]
        source: Box<Error>,
    },

    /// One or more tests failed in a batch run
    #[error("{failed} of {total} tests failed")]
    TestsFailed {
        /// Number of failing tests
        failed: usize,
        /// Number of tests that ran
        total: usize,
    },
}

impl Error {
    /// Build a fetch error from an I/O error
    pub fn fetch(path: ModulePath, source: std::io::Error) -> Self {
        Error::Fetch {
            path,
            source: Arc::new(source),
        }
    }

    /// Build a resolve error
    pub fn resolve(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Resolve {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// The script error carried by this error, looking through test failures
    pub fn script_error(&self) -> Option<&ScriptError> {
        match self {
            Error::Execution(err) => Some(err),
            Error::TestExecution { source, .. } => source.script_error(),
            _ => None,
        }
    }
}

fn format_cycle(chain: &[ModulePath], path: &ModulePath) -> String {
    let mut parts: Vec<String> = chain.iter().map(ToString::to_string).collect();
    parts.push(path.to_string());
    parts.join(" -> ")
}

fn describe_shape(kind: &str, index: &Option<usize>) -> String {
    match index {
        Some(index) => format!(
            "`main' returned something that's not a record at index {} (a {})",
            index, kind
        ),
        None => format!("`main' didn't return a list (got a {})", kind),
    }
}
