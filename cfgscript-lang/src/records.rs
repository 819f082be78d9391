//! Typed records and the registry that describes them
//!
//! Records are what a config's `main` produces. On the script side a record
//! type is obtained with `records.type("app.v1.Service")` and called with
//! keyword arguments; on the host side each record becomes a [`Record`].

use crate::convert::{from_stored_json, to_json};
use crate::value::{Arguments, Value};
use anyhow::{anyhow, bail};
use cfgscript_core::ValueBridge;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// A record as seen by the host.
///
/// Serializes as a JSON object whose `@type` key holds the type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "@type")]
    pub type_name: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// The record as a tagged JSON object
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert(
            "@type".to_string(),
            serde_json::Value::String(self.type_name.clone()),
        );
        object.extend(self.fields.clone());
        serde_json::Value::Object(object)
    }
}

/// The declared kind of a record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldKind {
    String,
    Int,
    Float,
    Bool,
    List(Box<FieldKind>),
    Map,
    Any,
    /// A nested record of the named type
    Record(String),
}

impl FromStr for FieldKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s {
            "string" => FieldKind::String,
            "int" => FieldKind::Int,
            "float" => FieldKind::Float,
            "bool" => FieldKind::Bool,
            "map" => FieldKind::Map,
            "any" => FieldKind::Any,
            _ => match s.strip_prefix("list<").and_then(|rest| rest.strip_suffix('>')) {
                Some(inner) => FieldKind::List(Box::new(inner.parse()?)),
                None if !s.is_empty() && !s.contains(['<', '>', ' ']) => {
                    FieldKind::Record(s.to_string())
                }
                None => return Err(RegistryError::InvalidKind(s.to_string())),
            },
        })
    }
}

impl TryFrom<String> for FieldKind {
    type Error = RegistryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FieldKind> for String {
    fn from(kind: FieldKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => f.write_str("string"),
            FieldKind::Int => f.write_str("int"),
            FieldKind::Float => f.write_str("float"),
            FieldKind::Bool => f.write_str("bool"),
            FieldKind::List(inner) => write!(f, "list<{}>", inner),
            FieldKind::Map => f.write_str("map"),
            FieldKind::Any => f.write_str("any"),
            FieldKind::Record(name) => f.write_str(name),
        }
    }
}

impl FieldKind {
    /// Check `value` against this kind and convert it for storage
    fn check(&self, value: &Value) -> Result<serde_json::Value, String> {
        use serde_json::Value as Json;
        match (self, value) {
            (FieldKind::String, Value::String(s)) => Ok(Json::String(s.to_string())),
            (FieldKind::Int, Value::Int(n)) => Ok(Json::from(*n)),
            (FieldKind::Float, Value::Int(_) | Value::Float(_)) => {
                let f = match value {
                    Value::Int(n) => *n as f64,
                    Value::Float(f) => *f,
                    _ => 0.0,
                };
                serde_json::Number::from_f64(f)
                    .map(Json::Number)
                    .ok_or_else(|| format!("cannot store non-finite float {}", f))
            }
            (FieldKind::Bool, Value::Bool(b)) => Ok(Json::Bool(*b)),
            (FieldKind::List(inner), Value::List(_) | Value::Tuple(_)) => {
                let items = value.iterate().map_err(|err| err.to_string())?;
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        inner
                            .check(item)
                            .map_err(|reason| format!("element {}: {}", i, reason))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Json::Array)
            }
            (FieldKind::Map, Value::Dict(_)) | (FieldKind::Any, _) => store_untyped(value),
            (FieldKind::Record(name), Value::Record(record)) if record.type_name() == name => {
                Ok(record.record().to_json())
            }
            _ => Err(format!("expected {}, got {}", self, value.type_name())),
        }
    }
}

/// Convert a free-form field value for storage.
///
/// A stored object tagged with `@type` is read back as a record, so plain
/// data may not carry that key.
fn store_untyped(value: &Value) -> Result<serde_json::Value, String> {
    reject_type_tags(value)?;
    to_json(value).map_err(|err| err.to_string())
}

fn reject_type_tags(value: &Value) -> Result<(), String> {
    let reserved = || "the @type key is reserved for records".to_string();
    match value {
        Value::List(list) => list.items().iter().try_for_each(reject_type_tags),
        Value::Tuple(items) => items.iter().try_for_each(reject_type_tags),
        Value::Dict(dict) => dict.items().iter().try_for_each(|(key, value)| match key {
            Value::String(s) if &**s == "@type" => Err(reserved()),
            _ => reject_type_tags(value),
        }),
        Value::Struct(s) => {
            if s.fields().contains_key("@type") {
                return Err(reserved());
            }
            s.fields().values().try_for_each(reject_type_tags)
        }
        _ => Ok(()),
    }
}

/// A record type: its name and declared fields.
///
/// An open type accepts any field whose value can be represented as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    pub name: String,
    pub fields: BTreeMap<String, FieldKind>,
    pub open: bool,
}

impl RecordType {
    /// A type with declared fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            open: false,
        }
    }

    /// A type that accepts any field
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            open: true,
            ..Self::new(name)
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a record from keyword arguments, validating every field
    pub(crate) fn construct(self: &Arc<Self>, args: Arguments) -> anyhow::Result<Value> {
        if !args.positional.is_empty() {
            bail!("{}: record fields must be passed by name", self.name);
        }
        let mut record = Record::new(self.name.clone());
        for (field, value) in args.named {
            if record.fields.contains_key(&field) {
                bail!("{}: field {} given more than once", self.name, field);
            }
            let stored = match self.fields.get(&field) {
                Some(_) if matches!(value, Value::None) => continue,
                Some(kind) => kind.check(&value),
                None if self.open => {
                    if matches!(value, Value::None) {
                        continue;
                    }
                    store_untyped(&value)
                }
                None => bail!("{}: unknown field {}", self.name, field),
            };
            let stored = stored.map_err(|reason| anyhow!("{}.{}: {}", self.name, field, reason))?;
            record.fields.insert(field, stored);
        }
        Ok(Value::Record(Arc::new(RecordValue {
            rtype: self.clone(),
            record,
        })))
    }
}

/// A record value inside the script
#[derive(Debug)]
pub struct RecordValue {
    rtype: Arc<RecordType>,
    record: Record,
}

impl RecordValue {
    pub(crate) fn from_record(record: Record) -> Self {
        Self {
            rtype: Arc::new(RecordType::open(record.type_name.clone())),
            record,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.record.type_name
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Field values, converted back into script values
    pub fn fields(&self) -> BTreeMap<String, Value> {
        self.record
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), from_stored_json(value)))
            .collect()
    }

    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rtype.fields.keys().cloned().collect();
        names.extend(self.record.fields.keys().cloned());
        names.sort();
        names.dedup();
        names
    }

    /// Read a field; declared fields that were never set read as `None`
    pub fn get(&self, name: &str) -> anyhow::Result<Value> {
        match self.record.fields.get(name) {
            Some(value) => Ok(from_stored_json(value)),
            None if self.rtype.fields.contains_key(name) || self.rtype.open => Ok(Value::None),
            None => bail!("{} has no .{} field", self.type_name(), name),
        }
    }
}

/// Errors raised while loading a record schema
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read schema {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid field kind {0:?}")]
    InvalidKind(String),
}

#[derive(Deserialize)]
struct SchemaFile {
    #[serde(default)]
    strict: bool,
    #[serde(default)]
    types: BTreeMap<String, SchemaType>,
}

#[derive(Deserialize)]
struct SchemaType {
    #[serde(default)]
    fields: BTreeMap<String, FieldKind>,
}

/// The set of record types available to scripts.
///
/// ```toml
/// strict = true
///
/// [types."app.v1.Service".fields]
/// name = "string"
/// port = "int"
/// tags = "list<string>"
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordRegistry {
    strict: bool,
    types: BTreeMap<String, Arc<RecordType>>,
}

impl RecordRegistry {
    /// A registry that accepts any type name and any fields
    pub fn open() -> Self {
        Self::default()
    }

    /// A registry that only accepts the types added to it
    pub fn strict() -> Self {
        Self {
            strict: true,
            types: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, rtype: RecordType) -> Self {
        self.types.insert(rtype.name.clone(), Arc::new(rtype));
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn get(&self, name: &str) -> Option<&RecordType> {
        self.types.get(name).map(|rtype| rtype.as_ref())
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn from_toml(text: &str) -> Result<Self, RegistryError> {
        let file: SchemaFile = toml::from_str(text)?;
        let types = file
            .types
            .into_iter()
            .map(|(name, schema)| {
                let rtype = RecordType {
                    name: name.clone(),
                    fields: schema.fields,
                    open: false,
                };
                (name, Arc::new(rtype))
            })
            .collect();
        Ok(Self {
            strict: file.strict,
            types,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// The type behind `records.type(name)`
    pub(crate) fn record_type(&self, name: &str) -> anyhow::Result<Arc<RecordType>> {
        match self.types.get(name) {
            Some(rtype) => Ok(rtype.clone()),
            None if self.strict => bail!("records.type: unknown record type {:?}", name),
            None => Ok(Arc::new(RecordType::open(name))),
        }
    }
}

/// Converts record values to host records and back
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordBridge;

impl ValueBridge<Value, Record> for RecordBridge {
    fn to_record(&self, value: &Value) -> Option<Record> {
        match value {
            Value::Record(record) => Some(record.record().clone()),
            _ => None,
        }
    }

    fn from_record(&self, record: &Record) -> Value {
        Value::Record(Arc::new(RecordValue::from_record(record.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::from_json;
    use crate::value::Dict;
    use pretty_assertions::assert_eq;

    fn service() -> Arc<RecordType> {
        Arc::new(
            RecordType::new("app.v1.Service")
                .with_field("name", FieldKind::String)
                .with_field("port", FieldKind::Int)
                .with_field("weight", FieldKind::Float)
                .with_field("tags", FieldKind::List(Box::new(FieldKind::String))),
        )
    }

    fn named(pairs: Vec<(&str, Value)>) -> Arguments {
        Arguments {
            positional: Vec::new(),
            named: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    #[test]
    fn test_field_kind_parsing() {
        assert_eq!("int".parse::<FieldKind>().unwrap(), FieldKind::Int);
        assert_eq!(
            "list<list<string>>".parse::<FieldKind>().unwrap(),
            FieldKind::List(Box::new(FieldKind::List(Box::new(FieldKind::String))))
        );
        assert_eq!(
            "app.v1.Port".parse::<FieldKind>().unwrap(),
            FieldKind::Record("app.v1.Port".to_string())
        );
        assert!("list<int".parse::<FieldKind>().is_err());
        assert_eq!(FieldKind::List(Box::new(FieldKind::Int)).to_string(), "list<int>");
    }

    #[test]
    fn test_construct_validates_fields() {
        let value = service()
            .construct(named(vec![
                ("name", Value::string("web")),
                ("port", Value::Int(80)),
                ("weight", Value::Int(2)),
                ("tags", Value::list(vec![Value::string("a")])),
            ]))
            .unwrap();
        let record = RecordBridge.to_record(&value).unwrap();
        assert_eq!(
            record.to_json(),
            serde_json::json!({
                "@type": "app.v1.Service",
                "name": "web",
                "port": 80,
                "weight": 2.0,
                "tags": ["a"],
            })
        );

        let err = service()
            .construct(named(vec![("port", Value::string("80"))]))
            .unwrap_err();
        assert_eq!(err.to_string(), "app.v1.Service.port: expected int, got string");

        let err = service()
            .construct(named(vec![("tags", Value::list(vec![Value::Int(1)]))]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "app.v1.Service.tags: element 0: expected string, got int"
        );

        let err = service()
            .construct(named(vec![("host", Value::string("x"))]))
            .unwrap_err();
        assert_eq!(err.to_string(), "app.v1.Service: unknown field host");
    }

    #[test]
    fn test_free_form_fields_cannot_forge_records() {
        let rtype = Arc::new(RecordType::new("app.v1.Job").with_field("labels", FieldKind::Map));
        let forged = Dict::from_strings(vec![(
            "@type".to_string(),
            Value::string("app.v1.Unknown"),
        )]);
        let err = rtype
            .construct(named(vec![("labels", Value::dict(forged))]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "app.v1.Job.labels: the @type key is reserved for records"
        );

        let nested = Dict::from_strings(vec![(
            "inner".to_string(),
            Value::list(vec![from_json(&serde_json::json!({"@type": "x"}))]),
        )]);
        let open = Arc::new(RecordType::open("app.v1.Any"));
        assert!(open.construct(named(vec![("extra", Value::dict(nested))])).is_err());
    }

    #[test]
    fn test_nested_records_read_back_as_records() {
        let port = Arc::new(RecordType::new("app.v1.Port").with_field("number", FieldKind::Int));
        let server = Arc::new(
            RecordType::new("app.v1.Server")
                .with_field("port", FieldKind::Record("app.v1.Port".to_string())),
        );
        let inner = port.construct(named(vec![("number", Value::Int(80))])).unwrap();
        let outer = server.construct(named(vec![("port", inner)])).unwrap();
        match outer {
            Value::Record(record) => {
                let port = record.get("port").unwrap();
                assert_eq!(port.type_name(), "record");
                assert_eq!(port.repr(), "app.v1.Port(number = 80)");
            }
            other => panic!("expected a record, got {:?}", other),
        }
    }

    #[test]
    fn test_unset_fields_read_as_none() {
        let value = service()
            .construct(named(vec![("name", Value::string("web"))]))
            .unwrap();
        match value {
            Value::Record(record) => {
                assert_eq!(record.get("name").unwrap(), Value::string("web"));
                assert_eq!(record.get("port").unwrap(), Value::None);
                assert!(record.get("host").is_err());
            }
            other => panic!("expected a record, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_from_toml() {
        let registry = RecordRegistry::from_toml(
            r#"
            strict = true

            [types."app.v1.Service".fields]
            name = "string"
            ports = "list<int>"
            "#,
        )
        .unwrap();
        assert!(registry.is_strict());
        let rtype = registry.get("app.v1.Service").unwrap();
        assert_eq!(rtype.fields["ports"], FieldKind::List(Box::new(FieldKind::Int)));
        assert!(registry.record_type("app.v1.Other").is_err());

        let open = RecordRegistry::open();
        assert!(open.record_type("anything").unwrap().open);
    }

    #[test]
    fn test_record_serde() {
        let record = Record::new("app.v1.Service").with_field("name", serde_json::json!("web"));
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"@type":"app.v1.Service","name":"web"}"#);
        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
