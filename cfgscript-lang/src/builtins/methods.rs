//! Methods of strings, lists and dicts

use super::universe::update_dict;
use crate::eval::Evaluator;
use crate::ops::normalize_index;
use crate::value::{Arguments, Dict, List, MethodFn, Value};
use anyhow::{anyhow, bail, Result};
use std::sync::Arc;

const STRING_METHODS: &[&str] = &[
    "count", "endswith", "find", "format", "join", "lower", "lstrip", "replace", "rstrip",
    "split", "startswith", "strip", "upper",
];
const LIST_METHODS: &[&str] = &["append", "extend", "index", "insert", "pop", "remove"];
const DICT_METHODS: &[&str] = &["get", "items", "keys", "pop", "setdefault", "update", "values"];

/// Find the method `name` of `value`
pub fn lookup(value: &Value, name: &str) -> Option<MethodFn> {
    let method: MethodFn = match (value, name) {
        (Value::String(_), "count") => string_count,
        (Value::String(_), "endswith") => string_endswith,
        (Value::String(_), "find") => string_find,
        (Value::String(_), "format") => string_format,
        (Value::String(_), "join") => string_join,
        (Value::String(_), "lower") => string_lower,
        (Value::String(_), "lstrip") => string_lstrip,
        (Value::String(_), "replace") => string_replace,
        (Value::String(_), "rstrip") => string_rstrip,
        (Value::String(_), "split") => string_split,
        (Value::String(_), "startswith") => string_startswith,
        (Value::String(_), "strip") => string_strip,
        (Value::String(_), "upper") => string_upper,
        (Value::List(_), "append") => list_append,
        (Value::List(_), "extend") => list_extend,
        (Value::List(_), "index") => list_index,
        (Value::List(_), "insert") => list_insert,
        (Value::List(_), "pop") => list_pop,
        (Value::List(_), "remove") => list_remove,
        (Value::Dict(_), "get") => dict_get,
        (Value::Dict(_), "items") => dict_items,
        (Value::Dict(_), "keys") => dict_keys,
        (Value::Dict(_), "pop") => dict_pop,
        (Value::Dict(_), "setdefault") => dict_setdefault,
        (Value::Dict(_), "update") => dict_update,
        (Value::Dict(_), "values") => dict_values,
        _ => return None,
    };
    Some(method)
}

/// Names of the methods available on `value`
pub fn names(value: &Value) -> &'static [&'static str] {
    match value {
        Value::String(_) => STRING_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        _ => &[],
    }
}

fn receiver_str(this: &Value) -> Result<&str> {
    this.as_str()
        .ok_or_else(|| anyhow!("expected a string receiver, got {}", this.type_name()))
}

fn receiver_list(this: &Value) -> Result<&Arc<List>> {
    match this {
        Value::List(list) => Ok(list),
        other => bail!("expected a list receiver, got {}", other.type_name()),
    }
}

fn receiver_dict(this: &Value) -> Result<&Arc<Dict>> {
    match this {
        Value::Dict(dict) => Ok(dict),
        other => bail!("expected a dict receiver, got {}", other.type_name()),
    }
}

fn string_arg<'v>(function: &str, value: &'v Value) -> Result<&'v str> {
    value
        .as_str()
        .ok_or_else(|| anyhow!("{}: expected a string, got {}", function, value.type_name()))
}

fn optional_string(function: &str, value: &Option<Value>) -> Result<Option<String>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(value) => Ok(Some(string_arg(function, value)?.to_string())),
    }
}

// Strings

fn string_count(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let s = receiver_str(this)?;
    let [sub] = args.exactly::<1>("count")?;
    let sub = string_arg("count", &sub)?;
    if sub.is_empty() {
        return Ok(Value::Int(s.chars().count() as i64 + 1));
    }
    Ok(Value::Int(s.matches(sub).count() as i64))
}

/// Accepts a string or a tuple of strings
fn affix_matches(function: &str, affix: &Value, test: impl Fn(&str) -> bool) -> Result<bool> {
    match affix {
        Value::Tuple(items) => {
            for item in items.iter() {
                if test(string_arg(function, item)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Ok(test(string_arg(function, other)?)),
    }
}

fn string_endswith(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let s = receiver_str(this)?;
    let [suffix] = args.exactly::<1>("endswith")?;
    Ok(Value::Bool(affix_matches("endswith", &suffix, |x| s.ends_with(x))?))
}

fn string_startswith(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let s = receiver_str(this)?;
    let [prefix] = args.exactly::<1>("startswith")?;
    Ok(Value::Bool(affix_matches("startswith", &prefix, |x| s.starts_with(x))?))
}

fn string_find(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let s = receiver_str(this)?;
    let [sub] = args.exactly::<1>("find")?;
    let sub = string_arg("find", &sub)?;
    Ok(Value::Int(match s.find(sub) {
        Some(byte) => s[..byte].chars().count() as i64,
        None => -1,
    }))
}

/// `"{} {name} {0}".format(...)`
fn string_format(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let format = receiver_str(this)?;
    let mut out = String::with_capacity(format.len());
    let mut auto = 0;
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => bail!("format: single '}}' in format string"),
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => bail!("format: unmatched '{{' in format string"),
                    }
                }
                let value = if field.is_empty() {
                    let value = args.positional.get(auto);
                    auto += 1;
                    value.ok_or_else(|| anyhow!("format: not enough arguments"))?
                } else if let Ok(index) = field.parse::<usize>() {
                    args.positional
                        .get(index)
                        .ok_or_else(|| anyhow!("format: index {} out of range", index))?
                } else {
                    args.named
                        .iter()
                        .find(|(name, _)| *name == field)
                        .map(|(_, value)| value)
                        .ok_or_else(|| anyhow!("format: keyword {} not found", field))?
                };
                out.push_str(&value.to_string());
            }
            c => out.push(c),
        }
    }
    Ok(Value::string(out))
}

fn string_join(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let sep = receiver_str(this)?;
    let [items] = args.exactly::<1>("join")?;
    let parts = items
        .iterate()?
        .iter()
        .map(|item| string_arg("join", item).map(str::to_string))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::string(parts.join(sep)))
}

fn string_lower(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    args.exactly::<0>("lower")?;
    Ok(Value::string(receiver_str(this)?.to_lowercase()))
}

fn string_upper(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    args.exactly::<0>("upper")?;
    Ok(Value::string(receiver_str(this)?.to_uppercase()))
}

fn strip_with(function: &str, this: &Value, args: Arguments, left: bool, right: bool) -> Result<Value> {
    let s = receiver_str(this)?;
    let slots = args.bind(function, &["chars"], 0)?;
    let stripped = match optional_string(function, &slots[0])? {
        None => match (left, right) {
            (true, true) => s.trim(),
            (true, false) => s.trim_start(),
            _ => s.trim_end(),
        },
        Some(chars) => {
            let strip = |c: char| chars.contains(c);
            match (left, right) {
                (true, true) => s.trim_matches(strip),
                (true, false) => s.trim_start_matches(strip),
                _ => s.trim_end_matches(strip),
            }
        }
    };
    Ok(Value::string(stripped))
}

fn string_strip(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    strip_with("strip", this, args, true, true)
}

fn string_lstrip(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    strip_with("lstrip", this, args, true, false)
}

fn string_rstrip(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    strip_with("rstrip", this, args, false, true)
}

fn string_replace(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let s = receiver_str(this)?;
    let slots = args.bind("replace", &["old", "new", "count"], 2)?;
    let (old, new) = match (&slots[0], &slots[1]) {
        (Some(old), Some(new)) => (string_arg("replace", old)?, string_arg("replace", new)?),
        _ => bail!("replace: missing arguments"),
    };
    Ok(Value::string(match &slots[2] {
        Some(Value::Int(count)) if *count >= 0 => s.replacen(old, new, *count as usize),
        Some(Value::Int(_)) | None => s.replace(old, new),
        Some(other) => bail!("replace: count must be an int, not {}", other.type_name()),
    }))
}

fn string_split(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let s = receiver_str(this)?;
    let slots = args.bind("split", &["sep", "maxsplit"], 0)?;
    let maxsplit = match &slots[1] {
        None => None,
        Some(Value::Int(n)) if *n < 0 => None,
        Some(Value::Int(n)) => Some(*n as usize),
        Some(other) => bail!("split: maxsplit must be an int, not {}", other.type_name()),
    };
    let parts: Vec<Value> = match optional_string("split", &slots[0])? {
        None => {
            let mut parts: Vec<&str> = Vec::new();
            let mut rest = s.trim_start();
            while !rest.is_empty() {
                if maxsplit.map_or(false, |max| parts.len() == max) {
                    parts.push(rest);
                    break;
                }
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                parts.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            parts.into_iter().map(Value::string).collect()
        }
        Some(sep) if sep.is_empty() => bail!("split: empty separator"),
        Some(sep) => match maxsplit {
            Some(max) => s.splitn(max + 1, sep.as_str()).map(Value::string).collect(),
            None => s.split(sep.as_str()).map(Value::string).collect(),
        },
    };
    Ok(Value::list(parts))
}

// Lists

fn list_append(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let list = receiver_list(this)?;
    let [item] = args.exactly::<1>("append")?;
    list.mutate(|items| items.push(item))?;
    Ok(Value::None)
}

fn list_extend(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let list = receiver_list(this)?;
    let [iterable] = args.exactly::<1>("extend")?;
    let extra = iterable.iterate()?;
    list.mutate(|items| items.extend(extra))?;
    Ok(Value::None)
}

fn list_index(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let list = receiver_list(this)?;
    let [needle] = args.exactly::<1>("index")?;
    list.items()
        .iter()
        .position(|item| item.equals(&needle))
        .map(|i| Value::Int(i as i64))
        .ok_or_else(|| anyhow!("index: value {} not in list", needle.repr()))
}

fn list_insert(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let list = receiver_list(this)?;
    let [index, item] = args.exactly::<2>("insert")?;
    let index = index
        .as_int()
        .ok_or_else(|| anyhow!("insert: index must be an int, not {}", index.type_name()))?;
    list.mutate(|items| {
        let len = items.len() as i64;
        let at = if index < 0 { index + len } else { index };
        items.insert(at.clamp(0, len) as usize, item);
    })?;
    Ok(Value::None)
}

fn list_pop(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let list = receiver_list(this)?;
    let slots = args.bind("pop", &["index"], 0)?;
    let index = slots[0].clone().unwrap_or(Value::Int(-1));
    let at = normalize_index(&index, list.len()).map_err(|err| anyhow!("pop: {}", err))?;
    list.mutate(|items| items.remove(at))
}

fn list_remove(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let list = receiver_list(this)?;
    let [needle] = args.exactly::<1>("remove")?;
    let found = list
        .mutate(|items| match items.iter().position(|item| item.equals(&needle)) {
            Some(i) => {
                items.remove(i);
                true
            }
            None => false,
        })?;
    if !found {
        bail!("remove: element {} not found", needle.repr());
    }
    Ok(Value::None)
}

// Dicts

fn dict_get(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let dict = receiver_dict(this)?;
    let slots = args.bind("get", &["key", "default"], 1)?;
    let key = slots[0].clone().unwrap_or(Value::None);
    Ok(dict
        .get(&key)?
        .or_else(|| slots[1].clone())
        .unwrap_or(Value::None))
}

fn dict_items(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    args.exactly::<0>("items")?;
    let dict = receiver_dict(this)?;
    Ok(Value::list(
        dict.items()
            .into_iter()
            .map(|(k, v)| Value::tuple(vec![k, v]))
            .collect(),
    ))
}

fn dict_keys(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    args.exactly::<0>("keys")?;
    Ok(Value::list(receiver_dict(this)?.keys()))
}

fn dict_values(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    args.exactly::<0>("values")?;
    Ok(Value::list(receiver_dict(this)?.values()))
}

fn dict_pop(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let dict = receiver_dict(this)?;
    let slots = args.bind("pop", &["key", "default"], 1)?;
    let key = slots[0].clone().unwrap_or(Value::None);
    match (dict.remove(&key)?, &slots[1]) {
        (Some(value), _) => Ok(value),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => bail!("pop: missing key {}", key.repr()),
    }
}

fn dict_setdefault(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let dict = receiver_dict(this)?;
    let slots = args.bind("setdefault", &["key", "default"], 1)?;
    let key = slots[0].clone().unwrap_or(Value::None);
    if let Some(value) = dict.get(&key)? {
        return Ok(value);
    }
    let default = slots[1].clone().unwrap_or(Value::None);
    dict.insert(key, default.clone())?;
    Ok(default)
}

fn dict_update(_eval: &mut Evaluator<'_>, this: &Value, args: Arguments) -> Result<Value> {
    let dict = receiver_dict(this)?;
    if args.positional.len() > 1 {
        bail!("update: got {} positional arguments, want at most 1", args.positional.len());
    }
    update_dict("update", dict, args.positional.first(), args.named)?;
    Ok(Value::None)
}
