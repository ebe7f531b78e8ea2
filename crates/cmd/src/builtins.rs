//! Built-in function library served by the `sheet` binary

use oplog::{
    Argument, DataType, FunctionDescriptor, FunctionId, LocalEngine, ParameterSpec, Value,
    op::argument,
};
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, PoisonError};

/// A [`LocalEngine`] with the string and number functions registered
#[must_use]
pub fn builtin_engine() -> LocalEngine {
    let mut engine = LocalEngine::new();
    register_string_functions(&mut engine);
    register_number_functions(&mut engine);
    engine
}

fn text_map<F>(engine: &mut LocalEngine, name: &str, label: &str, f: F)
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    engine.register_scalar(
        FunctionDescriptor::new(FunctionId::new("string", name)).with_label(label),
        move |value, _| match value {
            Value::String(s) => Ok(Value::String(f(s))),
            other => Ok(other.clone()),
        },
    );
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn register_string_functions(engine: &mut LocalEngine) {
    text_map(engine, "upper", "Upper case", str::to_uppercase);
    text_map(engine, "lower", "Lower case", str::to_lowercase);
    text_map(engine, "capitalize", "Capitalize", capitalize);
    text_map(engine, "trim", "Trim whitespace", |s| s.trim().to_string());

    let compiled: Mutex<HashMap<String, Regex>> = Mutex::new(HashMap::new());
    engine.register_scalar(
        FunctionDescriptor::new(FunctionId::new("string", "replace"))
            .with_label("Replace")
            .with_help("Replace every match of a regular expression")
            .with_parameter(ParameterSpec::new("pattern", DataType::String, 0).required())
            .with_parameter(
                ParameterSpec::new("replacement", DataType::String, 1).with_default(json!("")),
            ),
        move |value, args| {
            let Value::String(s) = value else {
                return Ok(value.clone());
            };
            let pattern = string_arg(args, "pattern")?;
            let replacement = argument(args, "replacement")
                .and_then(Value::as_str)
                .unwrap_or("");
            let mut cache = compiled.lock().unwrap_or_else(PoisonError::into_inner);
            let regex = match cache.entry(pattern.to_string()) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => {
                    e.insert(Regex::new(pattern).map_err(|e| format!("bad pattern: {e}"))?)
                }
            };
            Ok(Value::String(regex.replace_all(s, replacement).into_owned()))
        },
    );

    engine.register(
        FunctionDescriptor::new(FunctionId::new("string", "split"))
            .with_label("Split")
            .with_help("Split at the first separator into the text before and after it")
            .with_outputs(2)
            .with_parameter(
                ParameterSpec::new("separator", DataType::String, 0).with_default(json!(" ")),
            ),
        |values, args| {
            let separator = argument(args, "separator")
                .and_then(Value::as_str)
                .unwrap_or(" ");
            match values.first() {
                Some(Value::String(s)) => Ok(match s.split_once(separator) {
                    Some((head, tail)) => vec![json!(head), json!(tail)],
                    None => vec![json!(s), Value::Null],
                }),
                _ => Ok(vec![Value::Null, Value::Null]),
            }
        },
    );
}

fn string_arg<'a>(args: &'a [Argument], name: &str) -> Result<&'a str, String> {
    argument(args, name)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing parameter '{name}'"))
}

/// Numeric view of a cell; numeric text is accepted
fn number(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("'{s}' is not a number")),
        other => Err(format!("{other} is not a number")),
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn register_number_functions(engine: &mut LocalEngine) {
    engine.register_scalar(
        FunctionDescriptor::new(FunctionId::new("number", "add"))
            .with_label("Add")
            .with_parameter(ParameterSpec::new("value", DataType::Float, 0).with_default(json!(1))),
        |value, args| {
            let inc = argument(args, "value").and_then(Value::as_f64).unwrap_or(1.0);
            Ok(number(value)?.map_or(Value::Null, |n| number_value(n + inc)))
        },
    );

    engine.register_scalar(
        FunctionDescriptor::new(FunctionId::new("number", "bin"))
            .with_label("Bin")
            .with_help("Index of the equal-width bucket holding the value")
            .with_parameter(
                ParameterSpec::new("width", DataType::Float, 0).with_default(json!(10)),
            ),
        |value, args| {
            let width = argument(args, "width").and_then(Value::as_f64).unwrap_or(10.0);
            if width <= 0.0 {
                return Err(format!("bin width must be positive, got {width}"));
            }
            Ok(number(value)?.map_or(Value::Null, |n| number_value((n / width).floor())))
        },
    );
}
