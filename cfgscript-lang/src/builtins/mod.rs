//! Builtin functions and predeclared modules
//!
//! - `universe`: functions visible in every module (`len`, `sorted`, ...)
//! - `methods`: methods of strings, lists and dicts
//! - `encoding`: the `json`, `yaml`, `hash` and `url` modules
//! - `testing`: `assert`, `catch` and `matches`, installed only for tests

pub mod encoding;
pub mod methods;
pub mod testing;
pub mod universe;

use crate::eval::Evaluator;
use crate::records::RecordRegistry;
use crate::value::{Arguments, Builtin, Struct, Value};
use anyhow::{bail, Result};
use cfgscript_core::SymbolTable;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::Arc;

static UNIVERSE: Lazy<SymbolTable<Value>> = Lazy::new(|| {
    let mut table = SymbolTable::default();
    universe::register(&mut table);
    table
});

/// Builtins available to every module without being predeclared
pub fn universe() -> &'static SymbolTable<Value> {
    &UNIVERSE
}

/// Globals installed by the engine, with `records` bound to `registry`
pub fn predeclared(registry: Arc<RecordRegistry>) -> SymbolTable<Value> {
    let mut table = SymbolTable::default();
    define(&mut table, "fail", fail);
    define(&mut table, "struct", make_struct);
    encoding::register(&mut table);
    table.insert("records".to_string(), records_module(registry));
    table
}

/// Globals that help writing tests
pub fn test_helpers() -> SymbolTable<Value> {
    let mut table = SymbolTable::default();
    testing::register(&mut table);
    table
}

pub(crate) fn define(
    table: &mut SymbolTable<Value>,
    name: &str,
    func: impl Fn(&mut Evaluator<'_>, Arguments) -> Result<Value> + Send + Sync + 'static,
) {
    table.insert(name.to_string(), Builtin::new(name, func));
}

/// A namespace such as `json`, exposed as a struct of builtins
pub(crate) fn module(members: Vec<(&str, Value)>) -> Value {
    let fields: BTreeMap<String, Value> = members
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    Value::Struct(Arc::new(Struct::new(fields)))
}

/// Join positional arguments the way `print` and `fail` do
pub(crate) fn join_args(function: &str, args: Arguments) -> Result<String> {
    let mut sep = " ".to_string();
    for (name, value) in &args.named {
        match (name.as_str(), value) {
            ("sep", Value::String(s)) => sep = s.to_string(),
            ("sep", other) => bail!("{}: sep must be a string, not {}", function, other.type_name()),
            (other, _) => bail!("{}: unexpected keyword argument {}", function, other),
        }
    }
    Ok(args
        .positional
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(&sep))
}

/// `fail(*args, sep=" ")` aborts execution with the joined message
fn fail(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let message = join_args("fail", args)?;
    bail!(message)
}

/// `struct(**kwargs)`
fn make_struct(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    if !args.positional.is_empty() {
        bail!("struct: unexpected positional arguments");
    }
    let mut fields = BTreeMap::new();
    for (name, value) in args.named {
        if fields.insert(name.clone(), value).is_some() {
            bail!("struct: duplicate field {}", name);
        }
    }
    Ok(Value::Struct(Arc::new(Struct::new(fields))))
}

fn records_module(registry: Arc<RecordRegistry>) -> Value {
    let record_type = Builtin::new("type", move |_eval: &mut Evaluator<'_>, args: Arguments| {
        let [name] = args.exactly::<1>("records.type")?;
        match name {
            Value::String(name) => Ok(Value::RecordType(registry.record_type(&name)?)),
            other => bail!("records.type: expected a string, got {}", other.type_name()),
        }
    });
    let is_record = Builtin::new("is_record", |_eval: &mut Evaluator<'_>, args: Arguments| {
        let [value] = args.exactly::<1>("records.is_record")?;
        Ok(Value::Bool(matches!(value, Value::Record(_))))
    });
    module(vec![("type", record_type), ("is_record", is_record)])
}
