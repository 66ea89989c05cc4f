//! Structural validation of condition trees.

use serde_json::Value;

use super::{ConditionError, ALLOWED_OPERATORS, MAX_DEPTH, MAX_OPERATORS};

/// Validate a condition tree against the whitelist and size limits.
///
/// The root must be an operator object; scalars and bare arrays are
/// rejected so a condition can never be a constant by accident.
pub fn validate(condition: &Value) -> Result<(), ConditionError> {
    match condition.as_object() {
        Some(map) if map.len() == 1 => {}
        _ => return Err(ConditionError::InvalidRoot),
    }

    let mut operators = 0usize;
    walk(condition, 1, &mut operators)
}

fn walk(node: &Value, depth: usize, operators: &mut usize) -> Result<(), ConditionError> {
    if depth > MAX_DEPTH {
        return Err(ConditionError::MaxDepthExceeded(MAX_DEPTH));
    }

    match node {
        Value::Object(map) => {
            if map.len() != 1 {
                return Err(ConditionError::MalformedOperator(map.len()));
            }
            let (op, operands) = map.iter().next().expect("length checked above");
            if !ALLOWED_OPERATORS.contains(&op.as_str()) {
                return Err(ConditionError::OperatorNotAllowed(op.clone()));
            }

            *operators += 1;
            if *operators > MAX_OPERATORS {
                return Err(ConditionError::MaxOperatorsExceeded(MAX_OPERATORS));
            }

            match operands {
                Value::Array(items) => {
                    for item in items {
                        walk(item, depth + 1, operators)?;
                    }
                    Ok(())
                }
                single => walk(single, depth + 1, operators),
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, depth + 1, operators)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
