//! cfgscript-lang
//!
//! A small, Python-like configuration language and its [`Engine`], which
//! plugs into `cfgscript_core` as the script engine.
//!
//! The language is deterministic and hermetic: no I/O besides `load`, no
//! recursion, and every module's values are frozen once it finishes
//! executing. Configs produce typed [`Record`]s whose shapes can be
//! constrained with a [`RecordRegistry`].

pub mod ast;
pub mod builtins;
pub mod convert;
pub mod engine;
pub mod env;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod records;
pub mod source;
pub mod value;

pub use convert::{from_json, to_json};
pub use engine::Engine;
pub use error::ParseError;
pub use eval::{Evaluator, PrintHandler};
pub use lexer::{tokenize, Token};
pub use parser::{parse, parse_expression};
pub use records::{FieldKind, Record, RecordBridge, RecordRegistry, RecordType, RegistryError};
pub use source::SourceFile;
pub use value::{Arguments, Dict, List, Struct, Value};
