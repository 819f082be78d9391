//! Conversion between script values and JSON

use crate::records::{Record, RecordValue};
use crate::value::{Dict, Value};
use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Number, Value as Json};
use std::sync::Arc;

/// Convert a value to JSON.
///
/// Dict keys must be strings; records become objects tagged with `@type`.
pub fn to_json(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::None => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::Number((*n).into()),
        Value::Float(f) => Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| anyhow!("cannot encode non-finite float {}", f))?,
        Value::String(s) => Json::String(s.to_string()),
        Value::List(list) => Json::Array(list.items().iter().map(to_json).collect::<Result<_>>()?),
        Value::Tuple(items) => Json::Array(items.iter().map(to_json).collect::<Result<_>>()?),
        Value::Dict(dict) => {
            let mut object = Map::new();
            for (key, value) in dict.items() {
                let key = match key {
                    Value::String(s) => s.to_string(),
                    other => bail!("dict keys must be strings, got {}", other.type_name()),
                };
                object.insert(key, to_json(&value)?);
            }
            Json::Object(object)
        }
        Value::Struct(s) => {
            let mut object = Map::new();
            for (name, value) in s.fields() {
                object.insert(name.clone(), to_json(value)?);
            }
            Json::Object(object)
        }
        Value::Record(record) => record.record().to_json(),
        other => bail!("cannot convert {} to JSON", other.type_name()),
    })
}

/// Convert JSON to plain data; every object becomes a dict.
///
/// Decoded input never yields records, even when an object carries `@type`:
/// records only come from `records.type(..)` or from the host.
pub fn from_json(json: &Json) -> Value {
    convert(json, false)
}

/// Convert a stored record field back into a value; tagged objects become records
pub(crate) fn from_stored_json(json: &Json) -> Value {
    convert(json, true)
}

fn convert(json: &Json, tagged: bool) -> Value {
    match json {
        Json::Null => Value::None,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::string(s.as_str()),
        Json::Array(items) => Value::list(items.iter().map(|item| convert(item, tagged)).collect()),
        Json::Object(object) => match object.get("@type") {
            Some(Json::String(type_name)) if tagged => {
                let mut record = Record::new(type_name.clone());
                record.fields = object
                    .iter()
                    .filter(|(key, _)| key.as_str() != "@type")
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Value::Record(Arc::new(RecordValue::from_record(record)))
            }
            _ => Value::dict(Dict::from_strings(
                object
                    .iter()
                    .map(|(key, value)| (key.clone(), convert(value, tagged))),
            )),
        },
    }
}
