//! A line-oriented stand-in engine for exercising the loader and harnesses.
//!
//! Each non-blank line of a module is one directive:
//!
//! ```text
//! load NAME            import NAME and copy its symbols into this module
//! try_load NAME        like load, but record the error instead of failing
//! set NAME int 3       bind an int (also: str foo, rec foo)
//! def NAME BODY...     bind a function; BODY is evaluated on each call
//! fail MESSAGE         abort the module
//! ```
//!
//! Function bodies: `none`, `int 3`, `str foo`, `list r:a s:b i:1`,
//! `var KEY` (a one-record list built from ctx.vars[KEY]), `global NAME`
//! (a one-record list naming the global's value), `fail MESSAGE`.

#![allow(dead_code)]

use cfgscript_core::{
    CancellationToken, ImportHandler, ModulePath, Position, Result, ReturnShape, ScriptEngine,
    ScriptError, ScriptValue, SymbolTable, ValueBridge,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum FakeValue {
    None,
    Int(i64),
    Str(String),
    Record(String),
    List(Vec<FakeValue>),
    Func(Arc<FakeFunction>),
    Ctx(Arc<BTreeMap<String, FakeValue>>),
}

#[derive(Debug)]
pub struct FakeFunction {
    pub name: String,
    pub module: ModulePath,
    pub line: u32,
    pub body: Vec<String>,
    pub globals: Arc<SymbolTable<FakeValue>>,
}

impl ScriptValue for FakeValue {
    fn type_name(&self) -> String {
        match self {
            FakeValue::None => "NoneType",
            FakeValue::Int(_) => "int",
            FakeValue::Str(_) => "string",
            FakeValue::Record(_) => "record",
            FakeValue::List(_) => "list",
            FakeValue::Func(_) => "function",
            FakeValue::Ctx(_) => "struct",
        }
        .to_string()
    }

    fn is_callable(&self) -> bool {
        matches!(self, FakeValue::Func(_))
    }

    fn shape(&self) -> ReturnShape<Self> {
        match self {
            FakeValue::None => ReturnShape::Empty,
            FakeValue::List(items) => ReturnShape::Sequence(items.clone()),
            _ => ReturnShape::Other,
        }
    }
}

pub struct FakeBridge;

impl ValueBridge<FakeValue, String> for FakeBridge {
    fn to_record(&self, value: &FakeValue) -> Option<String> {
        match value {
            FakeValue::Record(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn from_record(&self, record: &String) -> FakeValue {
        FakeValue::Record(record.clone())
    }
}

/// Engine that records every module it executes and every table it imports.
#[derive(Default)]
pub struct FakeEngine {
    executions: Mutex<Vec<String>>,
    imports: Mutex<Vec<(String, Arc<SymbolTable<FakeValue>>)>>,
    import_errors: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Paths of every executed module, in execution order
    pub fn executions(&self) -> Vec<String> {
        self.executions.lock().unwrap().clone()
    }

    /// How many times `path` was executed
    pub fn executions_of(&self, path: &str) -> usize {
        self.executions().iter().filter(|p| *p == path).count()
    }

    /// Tables handed back for imports of `name`
    pub fn imported(&self, name: &str) -> Vec<Arc<SymbolTable<FakeValue>>> {
        self.imports
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, table)| table.clone())
            .collect()
    }

    /// Error messages swallowed by `try_load`
    pub fn import_errors(&self) -> Vec<String> {
        self.import_errors.lock().unwrap().clone()
    }

    fn script_error(path: &ModulePath, line: u32, message: impl Into<String>) -> ScriptError {
        ScriptError::new(message)
            .at(Position::new(path.as_str(), line, 1))
            .with_backtrace(format!(
                "Traceback (most recent call last):\n  {}:{}:1: in <toplevel>\n",
                path, line
            ))
    }

    fn parse_value(path: &ModulePath, line: u32, words: &[&str]) -> Result<FakeValue> {
        match words {
            ["int", n] => n
                .parse()
                .map(FakeValue::Int)
                .map_err(|_| Self::script_error(path, line, "bad int").into()),
            ["str", s] => Ok(FakeValue::Str(s.to_string())),
            ["rec", s] => Ok(FakeValue::Record(s.to_string())),
            _ => Err(Self::script_error(path, line, format!("bad value: {:?}", words)).into()),
        }
    }

    fn eval_body(&self, function: &FakeFunction, ctx: Option<&FakeValue>) -> Result<FakeValue> {
        let words: Vec<&str> = function.body.iter().map(String::as_str).collect();
        let err = |message: String| Self::script_error(&function.module, function.line, message);
        match words.as_slice() {
            ["none"] => Ok(FakeValue::None),
            ["int", n] => Ok(FakeValue::Int(n.parse().unwrap_or(0))),
            ["str", s] => Ok(FakeValue::Str(s.to_string())),
            ["list", items @ ..] => Ok(FakeValue::List(
                items
                    .iter()
                    .map(|item| match item.split_once(':') {
                        Some(("r", name)) => FakeValue::Record(name.to_string()),
                        Some(("i", n)) => FakeValue::Int(n.parse().unwrap_or(0)),
                        Some((_, s)) => FakeValue::Str(s.to_string()),
                        None => FakeValue::Str(item.to_string()),
                    })
                    .collect(),
            )),
            ["var", key] => {
                let vars = match ctx {
                    Some(FakeValue::Ctx(vars)) => vars,
                    _ => return Err(err("no ctx".to_string()).into()),
                };
                match vars.get(*key) {
                    Some(FakeValue::Str(s)) => Ok(FakeValue::List(vec![FakeValue::Record(s.clone())])),
                    Some(other) => Ok(FakeValue::List(vec![FakeValue::Record(format!("{:?}", other))])),
                    None => Err(err(format!("missing var {:?}", key)).into()),
                }
            }
            ["global", name] => match function.globals.get(*name) {
                Some(FakeValue::Str(s)) => Ok(FakeValue::List(vec![FakeValue::Record(s.clone())])),
                Some(other) => Ok(FakeValue::List(vec![FakeValue::Record(other.type_name())])),
                None => Err(err(format!("undefined global {:?}", name)).into()),
            },
            ["fail", message @ ..] => Err(err(message.join(" ")).into()),
            other => Err(err(format!("bad body: {:?}", other)).into()),
        }
    }
}

impl ScriptEngine for FakeEngine {
    type Value = FakeValue;
    type Record = String;
    type Registry = ();

    fn builtins(&self, _registry: Option<Arc<()>>) -> SymbolTable<FakeValue> {
        let mut table = SymbolTable::default();
        table.insert("builtin".to_string(), FakeValue::Str("from-builtins".to_string()));
        table
    }

    fn test_helpers(&self) -> SymbolTable<FakeValue> {
        let mut table = SymbolTable::default();
        table.insert("assert".to_string(), FakeValue::Str("assert-helper".to_string()));
        table
    }

    fn exec_module(
        &self,
        cancel: &CancellationToken,
        path: &ModulePath,
        source: &[u8],
        globals: &Arc<SymbolTable<FakeValue>>,
        imports: &mut dyn ImportHandler<FakeValue>,
    ) -> Result<SymbolTable<FakeValue>> {
        cancel.check()?;
        self.executions.lock().unwrap().push(path.to_string());

        let source = String::from_utf8_lossy(source);
        let mut symbols = SymbolTable::default();

        for (index, line) in source.lines().enumerate() {
            let line_no = index as u32 + 1;
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.as_slice() {
                [] => {}
                ["load", name] => {
                    let table = imports.import(name, path)?;
                    self.imports
                        .lock()
                        .unwrap()
                        .push((name.to_string(), table.clone()));
                    symbols.extend(table.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                ["try_load", name] => match imports.import(name, path) {
                    Ok(table) => symbols.extend(table.iter().map(|(k, v)| (k.clone(), v.clone()))),
                    Err(err) => self.import_errors.lock().unwrap().push(err.to_string()),
                },
                ["set", name, value @ ..] => {
                    let value = Self::parse_value(path, line_no, value)?;
                    symbols.insert(name.to_string(), value);
                }
                ["def", name, body @ ..] => {
                    let function = FakeFunction {
                        name: name.to_string(),
                        module: path.clone(),
                        line: line_no,
                        body: body.iter().map(|w| w.to_string()).collect(),
                        globals: globals.clone(),
                    };
                    symbols.insert(name.to_string(), FakeValue::Func(Arc::new(function)));
                }
                ["fail", message @ ..] => {
                    return Err(Self::script_error(path, line_no, message.join(" ")).into());
                }
                other => {
                    return Err(
                        Self::script_error(path, line_no, format!("bad directive: {:?}", other)).into(),
                    )
                }
            }
        }

        Ok(symbols)
    }

    fn call(
        &self,
        cancel: &CancellationToken,
        callable: &FakeValue,
        args: Vec<FakeValue>,
    ) -> Result<FakeValue> {
        cancel.check()?;
        match callable {
            FakeValue::Func(function) => self.eval_body(function, args.first()),
            other => Err(ScriptError::new(format!("{} is not callable", other.type_name())).into()),
        }
    }

    fn new_context(&self, vars: Vec<(String, FakeValue)>) -> FakeValue {
        FakeValue::Ctx(Arc::new(vars.into_iter().collect()))
    }

    fn bridge(&self) -> &dyn ValueBridge<FakeValue, String> {
        &FakeBridge
    }
}
