//! Condition evaluation against an event payload.
//!
//! Semantics follow the json-logic conventions the console authors write
//! rules in: loose equality coerces between numbers and numeric strings,
//! `var` walks dotted paths, `and`/`or` return their deciding operand.
//! The final result is coerced to a boolean via [`truthy`].

use serde_json::Value;

use super::{validate, ConditionError};

/// Evaluate a condition against a payload, returning the truthiness of the
/// result. Conditions that fail validation never reach the evaluator.
pub fn evaluate(condition: &Value, payload: &Value) -> Result<bool, ConditionError> {
    validate(condition)?;
    Ok(truthy(&eval_node(condition, payload)?))
}

/// Truthiness: non-empty strings, non-zero finite numbers, and non-null
/// objects/arrays are truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && f.is_finite()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn eval_node(node: &Value, data: &Value) -> Result<Value, ConditionError> {
    match node {
        Value::Object(map) if map.len() == 1 => {
            let (op, operands) = map.iter().next().expect("length checked");
            apply(op, operands, data)
        }
        Value::Array(items) => items
            .iter()
            .map(|item| eval_node(item, data))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        scalar => Ok(scalar.clone()),
    }
}

fn apply(op: &str, operands: &Value, data: &Value) -> Result<Value, ConditionError> {
    // json-logic allows a lone operand in place of a one-element list.
    let raw: Vec<&Value> = match operands {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    match op {
        "var" => eval_var(&raw, data),
        "missing" => eval_missing(&raw, data),
        "missing_some" => eval_missing_some(&raw, data),
        "if" => eval_if(&raw, data),
        "and" => {
            let mut last = Value::Bool(true);
            for operand in &raw {
                last = eval_node(operand, data)?;
                if !truthy(&last) {
                    break;
                }
            }
            Ok(last)
        }
        "or" => {
            let mut last = Value::Bool(false);
            for operand in &raw {
                last = eval_node(operand, data)?;
                if truthy(&last) {
                    break;
                }
            }
            Ok(last)
        }
        "!" => {
            let value = eval_first(&raw, data)?;
            Ok(Value::Bool(!truthy(&value)))
        }
        "==" | "!=" | "===" | "!==" => {
            let a = eval_first(&raw, data)?;
            let b = raw
                .get(1)
                .map(|v| eval_node(v, data))
                .transpose()?
                .unwrap_or(Value::Null);
            let eq = match op {
                "==" | "!=" => loose_eq(&a, &b),
                _ => strict_eq(&a, &b),
            };
            Ok(Value::Bool(if op.starts_with('!') { !eq } else { eq }))
        }
        ">" | ">=" | "<" | "<=" => eval_compare(op, &raw, data),
        "+" | "-" | "*" | "/" | "%" | "min" | "max" => eval_arith(op, &raw, data),
        "cat" => {
            let mut out = String::new();
            for operand in &raw {
                out.push_str(&stringify(&eval_node(operand, data)?));
            }
            Ok(Value::String(out))
        }
        "substr" => eval_substr(&raw, data),
        "length" => {
            let value = eval_first(&raw, data)?;
            let len = match &value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(ConditionError::Eval(format!(
                        "length expects a string or array, got {other}"
                    )))
                }
            };
            Ok(Value::from(len as i64))
        }
        "in" => {
            let needle = eval_first(&raw, data)?;
            let haystack = raw
                .get(1)
                .map(|v| eval_node(v, data))
                .transpose()?
                .unwrap_or(Value::Null);
            let found = match &haystack {
                Value::Array(items) => items.iter().any(|item| strict_eq(item, &needle)),
                Value::String(s) => s.contains(&stringify(&needle)),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        // Unreachable after validation, kept as a hard stop.
        other => Err(ConditionError::OperatorNotAllowed(other.to_string())),
    }
}

fn eval_first(raw: &[&Value], data: &Value) -> Result<Value, ConditionError> {
    match raw.first() {
        Some(operand) => eval_node(operand, data),
        None => Ok(Value::Null),
    }
}

/// `var` resolves dotted paths against the payload; missing paths yield the
/// optional default operand, or null.
fn eval_var(raw: &[&Value], data: &Value) -> Result<Value, ConditionError> {
    let path_value = eval_first(raw, data)?;
    let path = match &path_value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => stringify(other),
    };

    if path.is_empty() {
        return Ok(data.clone());
    }

    match lookup(data, &path) {
        Some(value) => Ok(value),
        None => match raw.get(1) {
            Some(default) => eval_node(default, data),
            None => Ok(Value::Null),
        },
    }
}

fn lookup(data: &Value, path: &str) -> Option<Value> {
    let mut current = data;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

fn eval_missing(raw: &[&Value], data: &Value) -> Result<Value, ConditionError> {
    let keys = collect_keys(raw, data)?;
    let missing: Vec<Value> = keys
        .into_iter()
        .filter(|key| lookup(data, key).map_or(true, |v| v.is_null()))
        .map(Value::String)
        .collect();
    Ok(Value::Array(missing))
}

/// `missing_some: [min, [keys...]]` — empty when at least `min` keys are
/// present, otherwise the list of missing keys.
fn eval_missing_some(raw: &[&Value], data: &Value) -> Result<Value, ConditionError> {
    let min = to_number(&eval_first(raw, data)?)? as usize;
    let keys = match raw.get(1) {
        Some(operand) => collect_keys(&[*operand], data)?,
        None => Vec::new(),
    };
    let total = keys.len();

    let missing: Vec<Value> = keys
        .into_iter()
        .filter(|key| lookup(data, key).map_or(true, |v| v.is_null()))
        .map(Value::String)
        .collect();

    if total - missing.len() >= min {
        Ok(Value::Array(Vec::new()))
    } else {
        Ok(Value::Array(missing))
    }
}

fn collect_keys(raw: &[&Value], data: &Value) -> Result<Vec<String>, ConditionError> {
    let mut keys = Vec::new();
    for operand in raw {
        match eval_node(operand, data)? {
            Value::Array(items) => {
                for item in items {
                    keys.push(stringify(&item));
                }
            }
            other => keys.push(stringify(&other)),
        }
    }
    Ok(keys)
}

/// `if: [cond, then, cond, then, ..., else?]`
fn eval_if(raw: &[&Value], data: &Value) -> Result<Value, ConditionError> {
    let mut i = 0;
    while i + 1 < raw.len() {
        if truthy(&eval_node(raw[i], data)?) {
            return eval_node(raw[i + 1], data);
        }
        i += 2;
    }
    match raw.get(i) {
        Some(fallback) => eval_node(fallback, data),
        None => Ok(Value::Null),
    }
}

fn eval_compare(op: &str, raw: &[&Value], data: &Value) -> Result<Value, ConditionError> {
    let a = compare_operand(raw.first(), data)?;
    let b = compare_operand(raw.get(1), data)?;

    let holds = |lhs: Option<f64>, rhs: Option<f64>| -> bool {
        match (lhs, rhs) {
            (Some(l), Some(r)) => match op {
                ">" => l > r,
                ">=" => l >= r,
                "<" => l < r,
                "<=" => l <= r,
                _ => unreachable!("comparison operators are exhaustive"),
            },
            // A non-numeric operand compares like NaN: always false.
            _ => false,
        }
    };

    // json-logic "between": {"<": [1, x, 10]}.
    if (op == "<" || op == "<=") && raw.len() == 3 {
        let c = compare_operand(raw.get(2), data)?;
        return Ok(Value::Bool(holds(a, b) && holds(b, c)));
    }

    Ok(Value::Bool(holds(a, b)))
}

fn compare_operand(
    operand: Option<&&Value>,
    data: &Value,
) -> Result<Option<f64>, ConditionError> {
    let value = match operand {
        Some(v) => eval_node(v, data)?,
        None => Value::Null,
    };
    Ok(coerce_number(&value))
}

fn eval_arith(op: &str, raw: &[&Value], data: &Value) -> Result<Value, ConditionError> {
    let mut numbers = Vec::with_capacity(raw.len());
    for operand in raw {
        numbers.push(to_number(&eval_node(operand, data)?)?);
    }

    let result = match op {
        "+" => numbers.iter().sum(),
        "*" => numbers.iter().product(),
        "-" => match numbers.as_slice() {
            [single] => -single,
            [a, b, ..] => a - b,
            [] => return Err(ConditionError::Eval("'-' requires an operand".into())),
        },
        "/" => {
            let [a, b] = two_operands(op, &numbers)?;
            if b == 0.0 {
                return Err(ConditionError::Eval("Division by zero".into()));
            }
            a / b
        }
        "%" => {
            let [a, b] = two_operands(op, &numbers)?;
            if b == 0.0 {
                return Err(ConditionError::Eval("Modulo by zero".into()));
            }
            a % b
        }
        "min" => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        "max" => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        _ => unreachable!("arithmetic operators are exhaustive"),
    };

    number_value(result)
}

fn two_operands(op: &str, numbers: &[f64]) -> Result<[f64; 2], ConditionError> {
    match numbers {
        [a, b, ..] => Ok([*a, *b]),
        _ => Err(ConditionError::Eval(format!("'{op}' requires two operands"))),
    }
}

fn number_value(result: f64) -> Result<Value, ConditionError> {
    if !result.is_finite() {
        return Err(ConditionError::Eval("Arithmetic result is not finite".into()));
    }
    // Keep integers as integers so strict equality against literals works.
    if result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
        Ok(Value::from(result as i64))
    } else {
        serde_json::Number::from_f64(result)
            .map(Value::Number)
            .ok_or_else(|| ConditionError::Eval("Arithmetic result is not finite".into()))
    }
}

/// Strict number requirement for arithmetic: numbers and numeric strings
/// only; everything else is an eval error.
fn to_number(value: &Value) -> Result<f64, ConditionError> {
    coerce_number(value).ok_or_else(|| {
        ConditionError::Eval(format!("Arithmetic on non-numeric operand: {value}"))
    })
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), Value::Number(_)) => strict_eq(a, b),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        // Mixed scalar types coerce to numbers, JS-style.
        (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => match (coerce_number(a), coerce_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => a == b,
    }
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        // 1 and 1.0 are the same number regardless of serde representation.
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => a == b,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(map) => Value::Object(map.clone()).to_string(),
    }
}

/// `substr: [string, start, length?]` with JS negative-index semantics.
fn eval_substr(raw: &[&Value], data: &Value) -> Result<Value, ConditionError> {
    let source = stringify(&eval_first(raw, data)?);
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len() as i64;

    let start = match raw.get(1) {
        Some(operand) => to_number(&eval_node(operand, data)?)? as i64,
        None => 0,
    };
    let start = if start < 0 {
        (len + start).max(0)
    } else {
        start.min(len)
    };

    let end = match raw.get(2) {
        Some(operand) => {
            let take = to_number(&eval_node(operand, data)?)? as i64;
            if take < 0 {
                (len + take).max(start)
            } else {
                (start + take).min(len)
            }
        }
        None => len,
    };

    let slice: String = chars[start as usize..end.max(start) as usize].iter().collect();
    Ok(Value::String(slice))
}
