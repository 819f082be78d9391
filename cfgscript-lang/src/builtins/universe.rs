//! Functions visible in every module

use super::{define, join_args};
use crate::eval::Evaluator;
use crate::ops;
use crate::value::{Arguments, Dict, Value};
use anyhow::{anyhow, bail, Result};
use cfgscript_core::SymbolTable;
use std::cmp::Ordering;

/// Register all universe functions
pub fn register(table: &mut SymbolTable<Value>) {
    define(table, "len", len);
    define(table, "str", stringify);
    define(table, "repr", repr);
    define(table, "int", integer);
    define(table, "float", floating);
    define(table, "bool", boolean);
    define(table, "list", list);
    define(table, "dict", dict);
    define(table, "tuple", tuple);
    define(table, "range", range);
    define(table, "type", type_of);
    define(table, "sorted", sorted);
    define(table, "reversed", reversed);
    define(table, "enumerate", enumerate);
    define(table, "zip", zip);
    define(table, "min", min);
    define(table, "max", max);
    define(table, "any", any);
    define(table, "all", all);
    define(table, "hasattr", hasattr);
    define(table, "getattr", getattr);
    define(table, "dir", dir);
    define(table, "print", print);
}

fn len(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [x] = args.exactly::<1>("len")?;
    x.len()
        .map(|n| Value::Int(n as i64))
        .ok_or_else(|| anyhow!("len: value of type {} has no len", x.type_name()))
}

fn stringify(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [x] = args.exactly::<1>("str")?;
    Ok(match x {
        Value::String(_) => x,
        other => Value::string(other.to_string()),
    })
}

fn repr(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [x] = args.exactly::<1>("repr")?;
    Ok(Value::string(x.repr()))
}

fn parse_int(text: &str, base: Option<i64>) -> Result<i64> {
    let invalid = || anyhow!("int: invalid literal {:?}", text);
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, digits) = match (base, lower.get(..2)) {
        (None | Some(0) | Some(16), Some("0x")) => (16, &digits[2..]),
        (None | Some(0) | Some(8), Some("0o")) => (8, &digits[2..]),
        (None | Some(0) | Some(2), Some("0b")) => (2, &digits[2..]),
        (None | Some(0), _) => (10, digits),
        (Some(base), _) if (2..=36).contains(&base) => (base as u32, digits),
        (Some(base), _) => bail!("int: base must be between 2 and 36, got {}", base),
    };
    let magnitude = i64::from_str_radix(digits, radix).map_err(|_| invalid())?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn integer(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let slots = args.bind("int", &["x", "base"], 1)?;
    let base = match &slots[1] {
        None => None,
        Some(Value::Int(n)) => Some(*n),
        Some(other) => bail!("int: base must be an int, not {}", other.type_name()),
    };
    Ok(Value::Int(match (&slots[0], base) {
        (Some(Value::String(s)), base) => parse_int(s, base)?,
        (_, Some(_)) => bail!("int: can't convert non-string with explicit base"),
        (Some(Value::Int(n)), None) => *n,
        (Some(Value::Bool(b)), None) => *b as i64,
        (Some(Value::Float(f)), None) if f.is_finite() => f.trunc() as i64,
        (Some(other), None) => bail!("int: cannot convert {} to int", other.repr()),
        (None, None) => 0,
    }))
}

fn floating(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [x] = args.exactly::<1>("float")?;
    Ok(Value::Float(match &x {
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        Value::Bool(b) => *b as i64 as f64,
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| anyhow!("float: invalid literal {:?}", s))?,
        other => bail!("float: cannot convert {} to float", other.type_name()),
    }))
}

fn boolean(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let slots = args.bind("bool", &["x"], 0)?;
    Ok(Value::Bool(slots[0].as_ref().map_or(false, Value::truth)))
}

fn list(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let slots = args.bind("list", &["x"], 0)?;
    match &slots[0] {
        Some(x) => Ok(Value::list(x.iterate()?)),
        None => Ok(Value::list(Vec::new())),
    }
}

fn tuple(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let slots = args.bind("tuple", &["x"], 0)?;
    match &slots[0] {
        Some(x) => Ok(Value::tuple(x.iterate()?)),
        None => Ok(Value::tuple(Vec::new())),
    }
}

/// Insert `pairs` (a dict or an iterable of pairs) and then `named` into `dict`
pub(crate) fn update_dict(function: &str, dict: &Dict, pairs: Option<&Value>, named: Vec<(String, Value)>) -> Result<()> {
    match pairs {
        Some(Value::Dict(other)) => {
            for (key, value) in other.items() {
                dict.insert(key, value)?;
            }
        }
        Some(iterable) => {
            for (i, pair) in iterable.iterate()?.into_iter().enumerate() {
                let items = pair
                    .iterate()
                    .map_err(|_| anyhow!("{}: element {} is not a pair", function, i))?;
                match <[Value; 2]>::try_from(items) {
                    Ok([key, value]) => dict.insert(key, value)?,
                    Err(_) => bail!("{}: element {} is not a pair", function, i),
                }
            }
        }
        None => {}
    }
    for (key, value) in named {
        dict.insert(Value::string(key), value)?;
    }
    Ok(())
}

fn dict(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    if args.positional.len() > 1 {
        bail!("dict: got {} positional arguments, want at most 1", args.positional.len());
    }
    let result = Dict::new();
    update_dict("dict", &result, args.positional.first(), args.named)?;
    Ok(Value::dict(result))
}

fn range(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    args.no_named("range")?;
    let mut bounds = Vec::with_capacity(3);
    for value in &args.positional {
        bounds.push(
            value
                .as_int()
                .ok_or_else(|| anyhow!("range: expected int, got {}", value.type_name()))?,
        );
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => bail!("range: got {} arguments, want 1 to 3", bounds.len()),
    };
    if step == 0 {
        bail!("range: step argument must not be zero");
    }
    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    let len = if span <= 0 {
        0
    } else {
        (span - 1) / i128::from(step).abs() + 1
    };
    if len > ops::MAX_SEQUENCE_LEN as i128 {
        bail!("range: too many elements ({})", len);
    }
    let mut items = Vec::with_capacity(len as usize);
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        items.push(Value::Int(i));
        i = match i.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::list(items))
}

fn type_of(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [x] = args.exactly::<1>("type")?;
    Ok(Value::string(x.type_name()))
}

/// Sort `items`, comparing `keys` when given; the first comparison error wins
fn sort_values(items: Vec<Value>, keys: Option<Vec<Value>>, reverse: bool) -> Result<Vec<Value>> {
    let keys = keys.unwrap_or_else(|| items.clone());
    let mut paired: Vec<(Value, Value)> = keys.into_iter().zip(items).collect();
    let mut error = None;
    paired.sort_by(|(a, _), (b, _)| {
        let order = if reverse { b.compare(a) } else { a.compare(b) };
        order.unwrap_or_else(|err| {
            error.get_or_insert(err);
            Ordering::Equal
        })
    });
    match error {
        Some(err) => Err(err),
        None => Ok(paired.into_iter().map(|(_, item)| item).collect()),
    }
}

fn key_values(eval: &mut Evaluator<'_>, items: &[Value], key: Option<&Value>) -> Result<Option<Vec<Value>>> {
    let key = match key {
        Some(Value::None) | None => return Ok(None),
        Some(key) => key,
    };
    let mut keys = Vec::with_capacity(items.len());
    for item in items {
        keys.push(eval.call_value(key, Arguments::positional(vec![item.clone()]))?);
    }
    Ok(Some(keys))
}

fn sorted(eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let slots = args.bind("sorted", &["iterable", "key", "reverse"], 1)?;
    let items = slots[0].as_ref().map_or(Ok(Vec::new()), Value::iterate)?;
    let keys = key_values(eval, &items, slots[1].as_ref())?;
    let reverse = slots[2].as_ref().map_or(false, Value::truth);
    Ok(Value::list(sort_values(items, keys, reverse)?))
}

fn reversed(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [x] = args.exactly::<1>("reversed")?;
    let mut items = x.iterate()?;
    items.reverse();
    Ok(Value::list(items))
}

fn enumerate(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let slots = args.bind("enumerate", &["iterable", "start"], 1)?;
    let start = match &slots[1] {
        Some(Value::Int(n)) => *n,
        Some(other) => bail!("enumerate: start must be an int, not {}", other.type_name()),
        None => 0,
    };
    let items = slots[0].as_ref().map_or(Ok(Vec::new()), Value::iterate)?;
    Ok(Value::list(
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| Value::tuple(vec![Value::Int(start + i as i64), item]))
            .collect(),
    ))
}

fn zip(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    args.no_named("zip")?;
    let sequences = args
        .positional
        .iter()
        .map(Value::iterate)
        .collect::<Result<Vec<_>>>()?;
    let shortest = sequences.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::list(
        (0..shortest)
            .map(|i| Value::tuple(sequences.iter().map(|seq| seq[i].clone()).collect()))
            .collect(),
    ))
}

fn extreme(eval: &mut Evaluator<'_>, args: Arguments, function: &str, wanted: Ordering) -> Result<Value> {
    let mut key = None;
    for (name, value) in args.named {
        match name.as_str() {
            "key" => key = Some(value),
            other => bail!("{}: unexpected keyword argument {}", function, other),
        }
    }
    let items = match args.positional.len() {
        0 => bail!("{}: expected at least one argument", function),
        1 => args.positional[0].iterate()?,
        _ => args.positional,
    };
    if items.is_empty() {
        bail!("{}: argument is an empty sequence", function);
    }
    let keys = key_values(eval, &items, key.as_ref())?.unwrap_or_else(|| items.clone());
    let mut best = 0;
    for i in 1..items.len() {
        if keys[i].compare(&keys[best])? == wanted {
            best = i;
        }
    }
    Ok(items[best].clone())
}

fn min(eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    extreme(eval, args, "min", Ordering::Less)
}

fn max(eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    extreme(eval, args, "max", Ordering::Greater)
}

fn any(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [x] = args.exactly::<1>("any")?;
    Ok(Value::Bool(x.iterate()?.iter().any(Value::truth)))
}

fn all(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [x] = args.exactly::<1>("all")?;
    Ok(Value::Bool(x.iterate()?.iter().all(Value::truth)))
}

fn attr_name(function: &str, name: &Value) -> Result<String> {
    name.as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{}: attribute name must be a string, not {}", function, name.type_name()))
}

fn hasattr(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [x, name] = args.exactly::<2>("hasattr")?;
    let name = attr_name("hasattr", &name)?;
    Ok(Value::Bool(ops::attr(&x, &name).is_ok()))
}

fn getattr(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let slots = args.bind("getattr", &["x", "name", "default"], 2)?;
    let (x, name) = match (&slots[0], &slots[1]) {
        (Some(x), Some(name)) => (x, attr_name("getattr", name)?),
        _ => bail!("getattr: missing arguments"),
    };
    match (ops::attr(x, &name), &slots[2]) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.clone()),
        (Err(err), None) => Err(err),
    }
}

fn dir(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [x] = args.exactly::<1>("dir")?;
    let mut names = ops::attr_names(&x);
    names.sort();
    Ok(Value::list(names.into_iter().map(Value::string).collect()))
}

fn print(eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let message = join_args("print", args)?;
    eval.print(&message);
    Ok(Value::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("42", None).unwrap(), 42);
        assert_eq!(parse_int("-0x1F", None).unwrap(), -31);
        assert_eq!(parse_int("ff", Some(16)).unwrap(), 255);
        assert_eq!(parse_int("0b101", Some(0)).unwrap(), 5);
        assert!(parse_int("12a", None).is_err());
        assert!(parse_int("1", Some(40)).is_err());
    }

    #[test]
    fn test_sort_values() {
        let items = vec![Value::Int(3), Value::Int(1), Value::Int(2)];
        let sorted = sort_values(items.clone(), None, false).unwrap();
        assert_eq!(sorted, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let reversed = sort_values(items, None, true).unwrap();
        assert_eq!(reversed, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);

        let mixed = vec![Value::Int(1), Value::string("a")];
        assert!(sort_values(mixed, None, false).is_err());
    }
}
