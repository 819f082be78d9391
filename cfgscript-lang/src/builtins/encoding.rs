//! The `json`, `yaml`, `hash` and `url` modules

use super::module;
use crate::convert::{from_json, to_json};
use crate::eval::Evaluator;
use crate::value::{Arguments, Builtin, Value};
use anyhow::{anyhow, bail, Context, Result};
use cfgscript_core::SymbolTable;
use sha2::{Digest, Sha256, Sha512};

/// Register the encoding modules
pub fn register(table: &mut SymbolTable<Value>) {
    table.insert(
        "json".to_string(),
        module(vec![
            ("encode", Builtin::new("encode", json_encode)),
            ("decode", Builtin::new("decode", json_decode)),
            ("indent", Builtin::new("indent", json_indent)),
        ]),
    );
    table.insert(
        "yaml".to_string(),
        module(vec![
            ("encode", Builtin::new("encode", yaml_encode)),
            ("decode", Builtin::new("decode", yaml_decode)),
        ]),
    );
    table.insert(
        "hash".to_string(),
        module(vec![
            ("sha256", Builtin::new("sha256", sha256)),
            ("sha512", Builtin::new("sha512", sha512)),
        ]),
    );
    table.insert(
        "url".to_string(),
        module(vec![("encode_query", Builtin::new("encode_query", encode_query))]),
    );
}

fn string_arg(function: &str, args: Arguments) -> Result<String> {
    let [value] = args.exactly::<1>(function)?;
    match value {
        Value::String(s) => Ok(s.to_string()),
        other => bail!("{}: expected a string, got {}", function, other.type_name()),
    }
}

fn json_encode(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [value] = args.exactly::<1>("json.encode")?;
    let json = to_json(&value).context("json.encode")?;
    Ok(Value::string(serde_json::to_string(&json)?))
}

fn json_decode(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let text = string_arg("json.decode", args)?;
    let json: serde_json::Value = serde_json::from_str(&text).context("json.decode")?;
    Ok(from_json(&json))
}

fn json_indent(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let text = string_arg("json.indent", args)?;
    let json: serde_json::Value = serde_json::from_str(&text).context("json.indent")?;
    Ok(Value::string(serde_json::to_string_pretty(&json)?))
}

fn yaml_encode(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [value] = args.exactly::<1>("yaml.encode")?;
    let json = to_json(&value).context("yaml.encode")?;
    Ok(Value::string(serde_yaml::to_string(&json)?))
}

fn yaml_decode(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let text = string_arg("yaml.decode", args)?;
    let json: serde_json::Value = serde_yaml::from_str(&text).context("yaml.decode")?;
    Ok(from_json(&json))
}

fn sha256(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let text = string_arg("hash.sha256", args)?;
    Ok(Value::string(hex::encode(Sha256::digest(text.as_bytes()))))
}

fn sha512(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let text = string_arg("hash.sha512", args)?;
    Ok(Value::string(hex::encode(Sha512::digest(text.as_bytes()))))
}

/// `url.encode_query({"q": "a b"})` == `"q=a+b"`; list values repeat the key
fn encode_query(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [query] = args.exactly::<1>("url.encode_query")?;
    let dict = match query {
        Value::Dict(dict) => dict,
        other => bail!("url.encode_query: expected a dict, got {}", other.type_name()),
    };
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in dict.items() {
        let key = key
            .as_str()
            .ok_or_else(|| anyhow!("url.encode_query: keys must be strings, got {}", key.type_name()))?
            .to_string();
        let values = match &value {
            Value::List(_) | Value::Tuple(_) => value.iterate()?,
            _ => vec![value],
        };
        for value in values {
            serializer.append_pair(&key, &value.to_string());
        }
    }
    Ok(Value::string(serializer.finish()))
}
