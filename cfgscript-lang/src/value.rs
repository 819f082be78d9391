//! Runtime values
//!
//! Containers are shared through `Arc` and guarded by `parking_lot` locks so
//! values can cross threads. Every container can be frozen; module values are
//! frozen once the module finishes executing.

use crate::ast::FunctionDef;
use crate::env::ModuleEnv;
use crate::eval::Evaluator;
use crate::records::{RecordType, RecordValue};
use anyhow::{anyhow, bail, Result};
use cfgscript_core::{ReturnShape, ScriptValue};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    List(Arc<List>),
    Tuple(Arc<[Value]>),
    Dict(Arc<Dict>),
    Struct(Arc<Struct>),
    Function(Arc<Function>),
    Builtin(Arc<Builtin>),
    Method(Arc<BoundMethod>),
    Record(Arc<RecordValue>),
    RecordType(Arc<RecordType>),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(List::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(items.into())
    }

    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Arc::new(dict))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Struct(_) => "struct",
            Value::Function(_) => "function",
            Value::Builtin(_) | Value::Method(_) => "builtin_function_or_method",
            Value::Record(_) => "record",
            Value::RecordType(_) => "record_type",
        }
    }

    /// Truth value used by conditions and `bool()`
    pub fn truth(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(list) => list.len() > 0,
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => dict.len() > 0,
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Make this value and everything reachable from it immutable
    pub fn freeze(&self) {
        match self {
            Value::List(list) => list.freeze(),
            Value::Tuple(items) => items.iter().for_each(Value::freeze),
            Value::Dict(dict) => dict.freeze(),
            Value::Struct(s) => s.fields.values().for_each(Value::freeze),
            Value::Function(function) => function.freeze(),
            Value::Method(method) => method.receiver.freeze(),
            _ => {}
        }
    }

    /// Number of elements, for values that have a length
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::List(list) => Some(list.len()),
            Value::Tuple(items) => Some(items.len()),
            Value::Dict(dict) => Some(dict.len()),
            _ => None,
        }
    }

    /// Snapshot of the elements produced by iterating this value
    pub fn iterate(&self) -> Result<Vec<Value>> {
        match self {
            Value::List(list) => Ok(list.items()),
            Value::Tuple(items) => Ok(items.to_vec()),
            Value::Dict(dict) => Ok(dict.keys()),
            other => bail!("{} value is not iterable", other.type_name()),
        }
    }

    pub fn hash_key(&self) -> Result<HashKey> {
        Ok(match self {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Bool(*b),
            Value::Int(n) => HashKey::Int(*n),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e18 => HashKey::Int(*f as i64),
            Value::Float(f) => HashKey::Float(f.to_bits()),
            Value::String(s) => HashKey::String(s.clone()),
            Value::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(Value::hash_key)
                    .collect::<Result<Vec<_>>>()?,
            ),
            other => bail!("unhashable type: {}", other.type_name()),
        })
    }

    /// Structural equality; ints and floats compare by numeric value
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Arc::ptr_eq(a, b) || sequences_equal(&a.items(), &b.items())
            }
            (Value::Tuple(a), Value::Tuple(b)) => sequences_equal(a, b),
            (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b) || a.equals(b),
            (Value::Struct(a), Value::Struct(b)) => fields_equal(&a.fields, &b.fields),
            (Value::Record(a), Value::Record(b)) => {
                a.type_name() == b.type_name() && a.record().fields == b.record().fields
            }
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => Arc::ptr_eq(a, b),
            (Value::RecordType(a), Value::RecordType(b)) => a.name() == b.name(),
            _ => false,
        }
    }

    /// Ordering used by `<`, `sorted`, `min` and `max`
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => Ok((*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)),
            (Value::Float(a), Value::Int(b)) => Ok(a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)),
            (Value::Float(a), Value::Float(b)) => Ok(a.partial_cmp(b).unwrap_or(Ordering::Equal)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => compare_sequences(&a.items(), &b.items()),
            (Value::Tuple(a), Value::Tuple(b)) => compare_sequences(a, b),
            (a, b) => bail!(
                "unsupported comparison: {} < {}",
                a.type_name(),
                b.type_name()
            ),
        }
    }

    /// The `repr()` of this value
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out);
        out
    }

    fn write_repr(&self, out: &mut String) {
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Float(f) => out.push_str(&format!("{:?}", f)),
            Value::String(s) => out.push_str(&format!("{:?}", s)),
            Value::List(list) => write_sequence(out, "[", &list.items(), "]"),
            Value::Tuple(items) if items.len() == 1 => write_sequence(out, "(", items, ",)"),
            Value::Tuple(items) => write_sequence(out, "(", items, ")"),
            Value::Dict(dict) => {
                out.push('{');
                for (i, (key, value)) in dict.items().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.write_repr(out);
                    out.push_str(": ");
                    value.write_repr(out);
                }
                out.push('}');
            }
            Value::Struct(s) => write_fields(out, "struct", &s.fields),
            Value::Function(function) => out.push_str(&format!("<function {}>", function.name())),
            Value::Builtin(builtin) => {
                out.push_str(&format!("<built-in function {}>", builtin.name))
            }
            Value::Method(method) => out.push_str(&format!(
                "<built-in method {} of {} value>",
                method.name,
                method.receiver.type_name()
            )),
            Value::Record(record) => write_fields(out, record.type_name(), &record.fields()),
            Value::RecordType(rtype) => out.push_str(&format!("<record type {}>", rtype.name())),
        }
    }
}

fn write_sequence(out: &mut String, open: &str, items: &[Value], close: &str) {
    out.push_str(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out);
    }
    out.push_str(close);
}

fn write_fields(out: &mut String, name: &str, fields: &BTreeMap<String, Value>) {
    out.push_str(name);
    out.push('(');
    for (i, (field, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(field);
        out.push_str(" = ");
        value.write_repr(out);
    }
    out.push(')');
}

fn sequences_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
}

fn fields_equal(a: &BTreeMap<String, Value>, b: &BTreeMap<String, Value>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(name, value)| b.get(name).map_or(false, |other| value.equals(other)))
}

fn compare_sequences(a: &[Value], b: &[Value]) -> Result<Ordering> {
    for (x, y) in a.iter().zip(b) {
        match x.compare(y)? {
            Ordering::Equal => {}
            order => return Ok(order),
        }
    }
    Ok(a.len().cmp(&b.len()))
}

/// `str()` of the value: strings print without quotes
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            other => f.write_str(&other.repr()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.equals(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl ScriptValue for Value {
    fn type_name(&self) -> String {
        match self {
            Value::Record(record) => record.type_name().to_string(),
            other => Value::type_name(other).to_string(),
        }
    }

    fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Builtin(_) | Value::Method(_) | Value::RecordType(_)
        )
    }

    fn shape(&self) -> ReturnShape<Self> {
        match self {
            Value::None => ReturnShape::Empty,
            Value::List(list) => ReturnShape::Sequence(list.items()),
            Value::Tuple(items) => ReturnShape::Sequence(items.to_vec()),
            _ => ReturnShape::Other,
        }
    }
}

/// Hashable projection of a value, used as a dict key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Bool(bool),
    Int(i64),
    Float(u64),
    String(Arc<str>),
    Tuple(Vec<HashKey>),
}

/// A mutable list
#[derive(Default)]
pub struct List {
    items: RwLock<Vec<Value>>,
    frozen: AtomicBool,
}

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: RwLock::new(items),
            frozen: AtomicBool::new(false),
        }
    }

    /// A copy of the current elements
    pub fn items(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(AtomicOrdering::SeqCst)
    }

    /// Run `f` on the elements, failing if the list is frozen
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R> {
        if self.is_frozen() {
            bail!("cannot mutate frozen list");
        }
        Ok(f(&mut self.items.write()))
    }

    pub fn freeze(&self) {
        if !self.frozen.swap(true, AtomicOrdering::SeqCst) {
            self.items().iter().for_each(Value::freeze);
        }
    }
}

#[derive(Default, Clone)]
struct DictEntries {
    index: FxHashMap<HashKey, usize>,
    items: Vec<(Value, Value)>,
}

/// A mutable dict that keeps insertion order
#[derive(Default)]
pub struct Dict {
    entries: RwLock<DictEntries>,
    frozen: AtomicBool,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Value, Value)>) -> Result<Self> {
        let dict = Dict::new();
        for (key, value) in pairs {
            dict.insert(key, value)?;
        }
        Ok(dict)
    }

    /// Build a dict with string keys, which are always hashable
    pub fn from_strings(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut entries = DictEntries::default();
        for (key, value) in pairs {
            let key: Arc<str> = key.into();
            let hash = HashKey::String(key.clone());
            match entries.index.get(&hash) {
                Some(&i) => entries.items[i].1 = value,
                None => {
                    entries.index.insert(hash, entries.items.len());
                    entries.items.push((Value::String(key), value));
                }
            }
        }
        Self {
            entries: RwLock::new(entries),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().items.len()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(AtomicOrdering::SeqCst)
    }

    fn check_mutable(&self) -> Result<()> {
        if self.is_frozen() {
            bail!("cannot mutate frozen dict");
        }
        Ok(())
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>> {
        let hash = key.hash_key()?;
        let entries = self.entries.read();
        Ok(entries
            .index
            .get(&hash)
            .map(|&i| entries.items[i].1.clone()))
    }

    pub fn get_str(&self, key: &str) -> Option<Value> {
        self.get(&Value::string(key)).ok().flatten()
    }

    pub fn contains(&self, key: &Value) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn insert(&self, key: Value, value: Value) -> Result<()> {
        self.check_mutable()?;
        let hash = key.hash_key()?;
        let mut entries = self.entries.write();
        match entries.index.get(&hash) {
            Some(&i) => entries.items[i].1 = value,
            None => {
                let i = entries.items.len();
                entries.index.insert(hash, i);
                entries.items.push((key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&self, key: &Value) -> Result<Option<Value>> {
        self.check_mutable()?;
        let hash = key.hash_key()?;
        let mut entries = self.entries.write();
        let removed = match entries.index.remove(&hash) {
            Some(i) => i,
            None => return Ok(None),
        };
        let (_, value) = entries.items.remove(removed);
        for i in entries.index.values_mut() {
            if *i > removed {
                *i -= 1;
            }
        }
        Ok(Some(value))
    }

    pub fn clear(&self) -> Result<()> {
        self.check_mutable()?;
        let mut entries = self.entries.write();
        entries.index.clear();
        entries.items.clear();
        Ok(())
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.read().items.clone()
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.read().items.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.read().items.iter().map(|(_, v)| v.clone()).collect()
    }

    fn equals(&self, other: &Dict) -> bool {
        let items = self.items();
        items.len() == other.len()
            && items.iter().all(|(key, value)| match other.get(key) {
                Ok(Some(found)) => value.equals(&found),
                _ => false,
            })
    }

    pub fn freeze(&self) {
        if !self.frozen.swap(true, AtomicOrdering::SeqCst) {
            for (key, value) in self.items() {
                key.freeze();
                value.freeze();
            }
        }
    }
}

/// An immutable collection of named fields, created by `struct(...)`
pub struct Struct {
    fields: BTreeMap<String, Value>,
}

impl Struct {
    pub fn new(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }
}

/// A function defined by `def` or `lambda`
pub struct Function {
    pub(crate) def: Arc<FunctionDef>,
    /// Evaluated default for each parameter that has one
    pub(crate) defaults: Vec<Option<Value>>,
    pub(crate) module: Arc<ModuleEnv>,
    /// Locals of enclosing functions at the point of definition
    pub(crate) captured: Arc<FxHashMap<String, Value>>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.def.name
    }

    fn freeze(&self) {
        self.defaults.iter().flatten().for_each(Value::freeze);
        self.captured.values().for_each(Value::freeze);
    }
}

/// Signature shared by every builtin function
pub type BuiltinFn = dyn Fn(&mut Evaluator<'_>, Arguments) -> Result<Value> + Send + Sync;

/// A function implemented in Rust
pub struct Builtin {
    pub(crate) name: String,
    pub(crate) func: Box<BuiltinFn>,
}

impl Builtin {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Evaluator<'_>, Arguments) -> Result<Value> + Send + Sync + 'static,
    ) -> Value {
        Value::Builtin(Arc::new(Builtin {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Signature of methods on strings, lists and dicts
pub type MethodFn = fn(&mut Evaluator<'_>, &Value, Arguments) -> Result<Value>;

/// A method bound to its receiver, e.g. `"a,b".split`
pub struct BoundMethod {
    pub(crate) receiver: Value,
    pub(crate) name: String,
    pub(crate) func: MethodFn,
}

/// Arguments at a call site, after `*` and `**` expansion
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl Arguments {
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            named: Vec::new(),
        }
    }

    /// Bind the arguments to parameter `names`; the first `required` must be present
    pub fn bind(self, function: &str, names: &[&str], required: usize) -> Result<Vec<Option<Value>>> {
        if self.positional.len() > names.len() {
            bail!(
                "{}: got {} arguments, want at most {}",
                function,
                self.positional.len(),
                names.len()
            );
        }
        let mut slots: Vec<Option<Value>> = vec![None; names.len()];
        for (slot, value) in slots.iter_mut().zip(self.positional) {
            *slot = Some(value);
        }
        for (name, value) in self.named {
            let index = names
                .iter()
                .position(|candidate| *candidate == name)
                .ok_or_else(|| anyhow!("{}: unexpected keyword argument {}", function, name))?;
            if slots[index].is_some() {
                bail!("{}: got multiple values for parameter {}", function, name);
            }
            slots[index] = Some(value);
        }
        for (slot, name) in slots.iter().zip(names).take(required) {
            if slot.is_none() {
                bail!("{}: missing argument for {}", function, name);
            }
        }
        Ok(slots)
    }

    /// Exactly `N` positional arguments and no named ones
    pub fn exactly<const N: usize>(self, function: &str) -> Result<[Value; N]> {
        self.no_named(function)?;
        let count = self.positional.len();
        self.positional.try_into().map_err(|_| {
            anyhow!(
                "{}: got {} arguments, want {}",
                function,
                count,
                N
            )
        })
    }

    pub fn no_named(&self, function: &str) -> Result<()> {
        match self.named.first() {
            Some((name, _)) => bail!("{}: unexpected keyword argument {}", function, name),
            None => Ok(()),
        }
    }
}
