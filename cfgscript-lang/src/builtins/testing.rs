//! Helpers for writing config tests: `assert`, `catch` and `matches`

use super::{define, module};
use crate::eval::Evaluator;
use crate::ops;
use crate::value::{Arguments, Builtin, Value};
use anyhow::{anyhow, bail, Result};
use cfgscript_core::SymbolTable;
use regex::Regex;

/// Register the test helpers
pub fn register(table: &mut SymbolTable<Value>) {
    table.insert(
        "assert".to_string(),
        module(vec![
            ("eq", Builtin::new("eq", assert_eq)),
            ("ne", Builtin::new("ne", assert_ne)),
            ("true", Builtin::new("true", assert_true)),
            ("false", Builtin::new("false", assert_false)),
            ("lt", Builtin::new("lt", assert_lt)),
            ("contains", Builtin::new("contains", assert_contains)),
            ("fails", Builtin::new("fails", assert_fails)),
        ]),
    );
    define(table, "catch", catch);
    define(table, "matches", matches);
}

/// Bind `(a, b, msg=None)`
fn pair(function: &str, args: Arguments) -> Result<(Value, Value, Option<String>)> {
    let slots = args.bind(function, &["a", "b", "msg"], 2)?;
    let mut slots = slots.into_iter();
    let a = slots.next().flatten().unwrap_or(Value::None);
    let b = slots.next().flatten().unwrap_or(Value::None);
    let msg = slots.next().flatten().map(|msg| msg.to_string());
    Ok((a, b, msg))
}

fn failure(msg: Option<String>, default: String) -> anyhow::Error {
    anyhow!(msg.unwrap_or(default))
}

fn assert_eq(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let (a, b, msg) = pair("assert.eq", args)?;
    if !a.equals(&b) {
        return Err(failure(msg, format!("assertion failed: {} != {}", a.repr(), b.repr())));
    }
    Ok(Value::None)
}

fn assert_ne(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let (a, b, msg) = pair("assert.ne", args)?;
    if a.equals(&b) {
        return Err(failure(msg, format!("assertion failed: {} == {}", a.repr(), b.repr())));
    }
    Ok(Value::None)
}

fn assert_lt(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let (a, b, msg) = pair("assert.lt", args)?;
    if a.compare(&b)? != std::cmp::Ordering::Less {
        return Err(failure(msg, format!("assertion failed: {} is not less than {}", a.repr(), b.repr())));
    }
    Ok(Value::None)
}

fn assert_contains(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let (container, item, msg) = pair("assert.contains", args)?;
    if !ops::contains(&container, &item)? {
        return Err(failure(
            msg,
            format!("assertion failed: {} does not contain {}", container.repr(), item.repr()),
        ));
    }
    Ok(Value::None)
}

fn truth_check(function: &str, args: Arguments, expected: bool) -> Result<Value> {
    let slots = args.bind(function, &["cond", "msg"], 1)?;
    let mut slots = slots.into_iter();
    let cond = slots.next().flatten().unwrap_or(Value::None);
    let msg = slots.next().flatten().map(|msg| msg.to_string());
    if cond.truth() != expected {
        return Err(failure(
            msg,
            format!("assertion failed: {} is not {}", cond.repr(), if expected { "truthy" } else { "falsy" }),
        ));
    }
    Ok(Value::None)
}

fn assert_true(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    truth_check("assert.true", args, true)
}

fn assert_false(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    truth_check("assert.false", args, false)
}

/// Call `callable` and return the message of the script error it raised.
///
/// Errors that are not script errors (cancellation and the like) propagate.
fn call_for_error(eval: &mut Evaluator<'_>, callable: &Value) -> Result<Option<String>> {
    match eval.call_value(callable, Arguments::default()) {
        Ok(_) => Ok(None),
        Err(err) => match err.script_error() {
            Some(script) => Ok(Some(script.message.clone())),
            None => Err(err.into()),
        },
    }
}

fn compile(function: &str, pattern: &Value) -> Result<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| anyhow!("{}: pattern must be a string, not {}", function, pattern.type_name()))?;
    Regex::new(pattern).map_err(|err| anyhow!("{}: invalid pattern: {}", function, err))
}

/// `assert.fails(fn, pattern)`: `fn()` must fail with an error matching `pattern`
fn assert_fails(eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [callable, pattern] = args.exactly::<2>("assert.fails")?;
    let regex = compile("assert.fails", &pattern)?;
    match call_for_error(eval, &callable)? {
        None => bail!(
            "assert.fails: evaluation succeeded unexpectedly (want error matching {:?})",
            regex.as_str()
        ),
        Some(message) if regex.is_match(&message) => Ok(Value::None),
        Some(message) => bail!(
            "assert.fails: regular expression ({}) did not match error ({})",
            regex.as_str(),
            message
        ),
    }
}

/// `catch(fn)` returns the error message of `fn()`, or `None` if it succeeded
fn catch(eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [callable] = args.exactly::<1>("catch")?;
    Ok(match call_for_error(eval, &callable)? {
        Some(message) => Value::string(message),
        None => Value::None,
    })
}

/// `matches(pattern, str)`
fn matches(_eval: &mut Evaluator<'_>, args: Arguments) -> Result<Value> {
    let [pattern, text] = args.exactly::<2>("matches")?;
    let regex = compile("matches", &pattern)?;
    let text = text
        .as_str()
        .ok_or_else(|| anyhow!("matches: expected a string, got {}", text.type_name()))?;
    Ok(Value::Bool(regex.is_match(text)))
}
