//! Operators, indexing and attribute access on values

use crate::ast::{BinOp, UnaryOp};
use crate::builtins::methods;
use crate::value::{BoundMethod, Value};
use anyhow::{anyhow, bail, Result};
use std::cmp::Ordering;
use std::sync::Arc;

pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    let unsupported = || {
        anyhow!(
            "unknown binary op: {} {} {}",
            left.type_name(),
            op.symbol(),
            right.type_name()
        )
    };
    Ok(match op {
        BinOp::Eq => Value::Bool(left.equals(right)),
        BinOp::NotEq => Value::Bool(!left.equals(right)),
        BinOp::Lt => Value::Bool(left.compare(right)? == Ordering::Less),
        BinOp::Le => Value::Bool(left.compare(right)? != Ordering::Greater),
        BinOp::Gt => Value::Bool(left.compare(right)? == Ordering::Greater),
        BinOp::Ge => Value::Bool(left.compare(right)? != Ordering::Less),
        BinOp::In => Value::Bool(contains(right, left)?),
        BinOp::NotIn => Value::Bool(!contains(right, left)?),
        BinOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.checked_add(*b).ok_or_else(overflow)?),
            (Value::String(a), Value::String(b)) => Value::string(format!("{}{}", a, b)),
            (Value::List(a), Value::List(b)) => {
                let mut items = a.items();
                items.extend(b.items());
                Value::list(items)
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                Value::tuple(a.iter().chain(b.iter()).cloned().collect())
            }
            _ => arithmetic(left, right, |a, b| a + b).ok_or_else(unsupported)?,
        },
        BinOp::Sub => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.checked_sub(*b).ok_or_else(overflow)?),
            _ => arithmetic(left, right, |a, b| a - b).ok_or_else(unsupported)?,
        },
        BinOp::Mul => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.checked_mul(*b).ok_or_else(overflow)?),
            (Value::String(s), Value::Int(n)) | (Value::Int(n), Value::String(s)) => {
                Value::string(s.repeat(repeat_count(s.len(), *n)?))
            }
            (Value::List(list), Value::Int(n)) | (Value::Int(n), Value::List(list)) => {
                Value::list(repeat_items(&list.items(), *n)?)
            }
            (Value::Tuple(items), Value::Int(n)) | (Value::Int(n), Value::Tuple(items)) => {
                Value::tuple(repeat_items(items, *n)?)
            }
            _ => arithmetic(left, right, |a, b| a * b).ok_or_else(unsupported)?,
        },
        BinOp::Div => {
            let (a, b) = floats(left, right).ok_or_else(unsupported)?;
            if b == 0.0 {
                bail!("floating-point division by zero");
            }
            Value::Float(a / b)
        }
        BinOp::FloorDiv => match (left, right) {
            (Value::Int(_), Value::Int(0)) => bail!("integer division by zero"),
            (Value::Int(a), Value::Int(b)) => Value::Int(floor_div(*a, *b)?),
            _ => {
                let (a, b) = floats(left, right).ok_or_else(unsupported)?;
                if b == 0.0 {
                    bail!("floating-point division by zero");
                }
                Value::Float((a / b).floor())
            }
        },
        BinOp::Mod => match (left, right) {
            (Value::String(format), args) => Value::string(percent_format(format, args)?),
            (Value::Int(_), Value::Int(0)) => bail!("integer modulo by zero"),
            (Value::Int(a), Value::Int(b)) => Value::Int(floor_mod(*a, *b)?),
            _ => {
                let (a, b) = floats(left, right).ok_or_else(unsupported)?;
                if b == 0.0 {
                    bail!("floating-point modulo by zero");
                }
                Value::Float(a - b * (a / b).floor())
            }
        },
    })
}

fn overflow() -> anyhow::Error {
    anyhow!("integer overflow")
}

fn floats(left: &Value, right: &Value) -> Option<(f64, f64)> {
    Some((as_float(left)?, as_float(right)?))
}

pub(crate) fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn arithmetic(left: &Value, right: &Value, op: impl Fn(f64, f64) -> f64) -> Option<Value> {
    let (a, b) = floats(left, right)?;
    Some(Value::Float(op(a, b)))
}

fn floor_div(a: i64, b: i64) -> Result<i64> {
    let quotient = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

fn floor_mod(a: i64, b: i64) -> Result<i64> {
    let rem = a.checked_rem(b).ok_or_else(overflow)?;
    if rem != 0 && ((rem < 0) != (b < 0)) {
        Ok(rem + b)
    } else {
        Ok(rem)
    }
}

/// Upper bound on the number of elements (or bytes) a repeat or `range` may produce
pub(crate) const MAX_SEQUENCE_LEN: usize = 1 << 24;

fn repeat_count(len: usize, n: i64) -> Result<usize> {
    if len == 0 || n <= 0 {
        return Ok(0);
    }
    let count = usize::try_from(n).map_err(|_| overflow())?;
    match len.checked_mul(count) {
        Some(total) if total <= MAX_SEQUENCE_LEN => Ok(count),
        _ => bail!("excessive repeat ({} * {} elements)", len, n),
    }
}

fn repeat_items(items: &[Value], n: i64) -> Result<Vec<Value>> {
    let count = repeat_count(items.len(), n)?;
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend_from_slice(items);
    }
    Ok(out)
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool> {
    match container {
        Value::String(s) => match item {
            Value::String(needle) => Ok(s.contains(needle.as_ref())),
            other => bail!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ),
        },
        Value::List(list) => Ok(list.items().iter().any(|v| v.equals(item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| v.equals(item))),
        Value::Dict(dict) => dict.contains(item),
        other => bail!(
            "unknown binary op: {} in {}",
            item.type_name(),
            other.type_name()
        ),
    }
}

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value> {
    Ok(match (op, operand) {
        (UnaryOp::Not, value) => Value::Bool(!value.truth()),
        (UnaryOp::Neg, Value::Int(n)) => Value::Int(n.checked_neg().ok_or_else(overflow)?),
        (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
        (UnaryOp::Pos, value @ (Value::Int(_) | Value::Float(_))) => value.clone(),
        (op, value) => bail!(
            "unknown unary op: {}{}",
            match op {
                UnaryOp::Neg => "-",
                _ => "+",
            },
            value.type_name()
        ),
    })
}

/// Resolve a possibly negative index against a sequence of length `len`
pub fn normalize_index(key: &Value, len: usize) -> Result<usize> {
    let index = key
        .as_int()
        .ok_or_else(|| anyhow!("index must be int, not {}", key.type_name()))?;
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        bail!("index {} out of range: length is {}", index, len);
    }
    Ok(resolved as usize)
}

/// `container[key]`
pub fn index(container: &Value, key: &Value) -> Result<Value> {
    match container {
        Value::List(list) => {
            let items = list.items();
            Ok(items[normalize_index(key, items.len())?].clone())
        }
        Value::Tuple(items) => Ok(items[normalize_index(key, items.len())?].clone()),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(key, chars.len())?;
            Ok(Value::string(chars[i].to_string()))
        }
        Value::Dict(dict) => dict
            .get(key)?
            .ok_or_else(|| anyhow!("key {} not in dict", key.repr())),
        other => bail!(
            "unhandled index operation {}[{}]",
            other.type_name(),
            key.type_name()
        ),
    }
}

/// `container[key] = value`
pub fn set_index(container: &Value, key: Value, value: Value) -> Result<()> {
    match container {
        Value::List(list) => {
            let i = normalize_index(&key, list.len())?;
            list.mutate(|items| items[i] = value)
        }
        Value::Dict(dict) => dict.insert(key, value),
        other => bail!("{} value does not support item assignment", other.type_name()),
    }
}

fn slice_bound(value: Option<Value>) -> Result<Option<i64>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(Value::Int(n)) => Ok(Some(n)),
        Some(other) => bail!("slice indices must be int, not {}", other.type_name()),
    }
}

fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let adjust = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };
    let mut indices = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |s| adjust(s, 0, len));
        let stop = stop.map_or(len, |s| adjust(s, 0, len));
        while i < stop {
            indices.push(i as usize);
            i += step;
        }
    } else {
        let mut i = start.map_or(len - 1, |s| adjust(s, -1, len - 1));
        let stop = stop.map_or(-1, |s| adjust(s, -1, len - 1));
        while i > stop {
            indices.push(i as usize);
            i += step;
        }
    }
    indices
}

/// `value[start:stop:step]`
pub fn slice(
    value: &Value,
    start: Option<Value>,
    stop: Option<Value>,
    step: Option<Value>,
) -> Result<Value> {
    let step = slice_bound(step)?.unwrap_or(1);
    if step == 0 {
        bail!("slice step cannot be zero");
    }
    let (start, stop) = (slice_bound(start)?, slice_bound(stop)?);
    match value {
        Value::List(list) => {
            let items = list.items();
            let picked = slice_indices(items.len(), start, stop, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(Value::list(picked))
        }
        Value::Tuple(items) => Ok(Value::tuple(
            slice_indices(items.len(), start, stop, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect(),
        )),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::string(
                slice_indices(chars.len(), start, stop, step)
                    .into_iter()
                    .map(|i| chars[i])
                    .collect::<String>(),
            ))
        }
        other => bail!("invalid slice operand {}", other.type_name()),
    }
}

/// `value.name`
pub fn attr(value: &Value, name: &str) -> Result<Value> {
    match value {
        Value::Struct(s) => s
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("struct has no .{} attribute", name)),
        Value::Record(record) => record.get(name),
        _ => methods::lookup(value, name)
            .map(|func| {
                Value::Method(Arc::new(BoundMethod {
                    receiver: value.clone(),
                    name: name.to_string(),
                    func,
                }))
            })
            .ok_or_else(|| anyhow!("{} has no .{} field or method", value.type_name(), name)),
    }
}

/// Attribute names available on `value`, for `dir()`
pub fn attr_names(value: &Value) -> Vec<String> {
    match value {
        Value::Struct(s) => s.fields().keys().cloned().collect(),
        Value::Record(record) => record.field_names(),
        _ => methods::names(value)
            .iter()
            .map(|name| name.to_string())
            .collect(),
    }
}

/// `format % args`
pub fn percent_format(format: &str, args: &Value) -> Result<String> {
    let positional: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mut used = 0;
    let mut named = false;
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut verb = chars
            .next()
            .ok_or_else(|| anyhow!("incomplete format"))?;
        if verb == '%' {
            out.push('%');
            continue;
        }
        let value = if verb == '(' {
            let key: String = chars.by_ref().take_while(|&c| c != ')').collect();
            let dict = match args {
                Value::Dict(dict) => dict,
                other => bail!("format requires a mapping, not {}", other.type_name()),
            };
            named = true;
            verb = chars
                .next()
                .ok_or_else(|| anyhow!("incomplete format"))?;
            dict.get_str(&key)
                .ok_or_else(|| anyhow!("key {:?} not in dict", key))?
        } else {
            let value = positional
                .get(used)
                .cloned()
                .ok_or_else(|| anyhow!("not enough arguments for format string"))?;
            used += 1;
            value
        };
        match verb {
            's' => out.push_str(&value.to_string()),
            'r' => out.push_str(&value.repr()),
            'd' | 'i' => match &value {
                Value::Int(n) => out.push_str(&n.to_string()),
                Value::Float(f) => out.push_str(&(f.trunc() as i64).to_string()),
                other => bail!("%{} format requires integer: {}", verb, other.type_name()),
            },
            'x' | 'o' => match &value {
                Value::Int(n) if verb == 'x' => out.push_str(&format!("{:x}", n)),
                Value::Int(n) => out.push_str(&format!("{:o}", n)),
                other => bail!("%{} format requires integer: {}", verb, other.type_name()),
            },
            'f' | 'e' | 'g' => {
                let f = as_float(&value).ok_or_else(|| {
                    anyhow!("%{} format requires float: {}", verb, value.type_name())
                })?;
                match verb {
                    'f' => out.push_str(&format!("{:.6}", f)),
                    'e' => out.push_str(&format!("{:.6e}", f)),
                    _ => out.push_str(&format!("{}", f)),
                }
            }
            other => bail!("unknown conversion %{}", other),
        }
    }
    if !named && used < positional.len() && matches!(args, Value::Tuple(_)) {
        bail!("too many arguments for format string");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().map(|&n| Value::Int(n)).collect())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(binary(BinOp::Add, &Value::Int(2), &Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(binary(BinOp::Div, &Value::Int(7), &Value::Int(2)).unwrap(), Value::Float(3.5));
        assert_eq!(binary(BinOp::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(binary(BinOp::Mod, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(1));
        assert!(binary(BinOp::FloorDiv, &Value::Int(1), &Value::Int(0)).is_err());
        assert!(binary(BinOp::Add, &Value::Int(i64::MAX), &Value::Int(1)).is_err());

        let err = binary(BinOp::Add, &Value::Int(1), &Value::string("a")).unwrap_err();
        assert_eq!(err.to_string(), "unknown binary op: int + string");
    }

    #[test]
    fn test_integer_division_overflow() {
        let err = binary(BinOp::FloorDiv, &Value::Int(i64::MIN), &Value::Int(-1)).unwrap_err();
        assert_eq!(err.to_string(), "integer overflow");
        assert!(binary(BinOp::Mod, &Value::Int(i64::MIN), &Value::Int(-1)).is_err());
        assert_eq!(binary(BinOp::Mod, &Value::Int(7), &Value::Int(-2)).unwrap(), Value::Int(-1));
        assert_eq!(binary(BinOp::FloorDiv, &Value::Int(i64::MIN), &Value::Int(2)).unwrap(), Value::Int(i64::MIN / 2));
    }

    #[test]
    fn test_excessive_repeat() {
        let err = binary(BinOp::Mul, &Value::string("ab"), &Value::Int(i64::MAX)).unwrap_err();
        assert!(err.to_string().starts_with("excessive repeat"));
        assert!(binary(BinOp::Mul, &ints(&[1, 2]), &Value::Int(i64::MAX)).is_err());
        assert!(binary(BinOp::Mul, &Value::Int(1 << 31), &Value::tuple(vec![Value::Int(1)])).is_err());
        assert_eq!(binary(BinOp::Mul, &ints(&[1]), &Value::Int(-3)).unwrap(), ints(&[]));
        assert_eq!(binary(BinOp::Mul, &ints(&[]), &Value::Int(i64::MAX)).unwrap(), ints(&[]));
    }

    #[test]
    fn test_sequences() {
        assert_eq!(binary(BinOp::Add, &ints(&[1]), &ints(&[2])).unwrap(), ints(&[1, 2]));
        assert_eq!(binary(BinOp::Mul, &Value::string("ab"), &Value::Int(2)).unwrap(), Value::string("abab"));
        assert_eq!(binary(BinOp::In, &Value::Int(2), &ints(&[1, 2])).unwrap(), Value::Bool(true));
        assert_eq!(binary(BinOp::In, &Value::string("ell"), &Value::string("hello")).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_index_and_slice() {
        let list = ints(&[0, 1, 2, 3, 4]);
        assert_eq!(index(&list, &Value::Int(-1)).unwrap(), Value::Int(4));
        assert!(index(&list, &Value::Int(5)).is_err());
        assert_eq!(
            slice(&list, Some(Value::Int(1)), Some(Value::Int(-1)), None).unwrap(),
            ints(&[1, 2, 3])
        );
        assert_eq!(slice(&list, None, None, Some(Value::Int(-2))).unwrap(), ints(&[4, 2, 0]));
        assert_eq!(
            slice(&Value::string("hello"), Some(Value::Int(1)), Some(Value::Int(3)), None).unwrap(),
            Value::string("el")
        );
        assert!(slice(&list, None, None, Some(Value::Int(0))).is_err());
    }

    #[test]
    fn test_percent_format() {
        let args = Value::tuple(vec![Value::string("web"), Value::Int(80), Value::Float(0.5)]);
        assert_eq!(
            percent_format("%s:%d (%r) %f %%", &Value::tuple(vec![
                Value::string("web"),
                Value::Int(80),
                Value::string("x"),
                Value::Float(0.5),
            ]))
            .unwrap(),
            "web:80 (\"x\") 0.500000 %"
        );
        assert!(percent_format("%s", &args).is_err());
        assert!(percent_format("%s %s %s %s", &args).is_err());
        assert_eq!(percent_format("%x", &Value::Int(255)).unwrap(), "ff");
    }
}
