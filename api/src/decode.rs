//! Typed access to view-function results.
//!
//! The node returns a JSON array per view call. Integers arrive as decimal
//! strings (u64 and wider) or bare numbers (u8/u16/u32); booleans as JSON
//! bools. Every decoder checks the shape before trusting positions.

use serde_json::Value;

use crate::{amount::Amount, error::MotherlodeError};

pub fn expect_len(
    values: &[Value],
    expected: usize,
    what: &'static str,
) -> Result<(), MotherlodeError> {
    if values.len() < expected {
        return Err(MotherlodeError::ShapeMismatch {
            what,
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

pub fn as_u64(value: &Value, field: &'static str) -> Result<u64, MotherlodeError> {
    let invalid = || MotherlodeError::InvalidInteger {
        field,
        value: value.to_string(),
    };
    match value {
        Value::String(s) => s.trim().parse().map_err(|_| invalid()),
        Value::Number(n) => n.as_u64().ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

pub fn as_bool(value: &Value, field: &'static str) -> Result<bool, MotherlodeError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        _ => Err(MotherlodeError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

pub fn u64_at(values: &[Value], index: usize, field: &'static str) -> Result<u64, MotherlodeError> {
    values
        .get(index)
        .ok_or(MotherlodeError::ShapeMismatch {
            what: field,
            expected: index + 1,
            actual: values.len(),
        })
        .and_then(|v| as_u64(v, field))
}

pub fn amount_at(
    values: &[Value],
    index: usize,
    field: &'static str,
) -> Result<Amount, MotherlodeError> {
    u64_at(values, index, field).map(Amount::from_base_units)
}

pub fn bool_at(
    values: &[Value],
    index: usize,
    field: &'static str,
) -> Result<bool, MotherlodeError> {
    values
        .get(index)
        .ok_or(MotherlodeError::ShapeMismatch {
            what: field,
            expected: index + 1,
            actual: values.len(),
        })
        .and_then(|v| as_bool(v, field))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_integer_forms() {
        assert_eq!(as_u64(&json!("18446744073709551615"), "x").unwrap(), u64::MAX);
        assert_eq!(as_u64(&json!(7), "x").unwrap(), 7);
        assert!(as_u64(&json!(-1), "x").is_err());
        assert!(as_u64(&json!("1.5"), "x").is_err());
        assert!(as_u64(&json!(true), "x").is_err());
    }

    #[test]
    fn test_bool_forms() {
        assert!(as_bool(&json!(true), "x").unwrap());
        assert!(!as_bool(&json!("false"), "x").unwrap());
        assert!(as_bool(&json!(1), "x").is_err());
    }

    #[test]
    fn test_missing_position_is_shape_error() {
        let values = vec![json!("1")];
        assert!(matches!(
            u64_at(&values, 3, "round_end"),
            Err(MotherlodeError::ShapeMismatch { expected: 4, actual: 1, .. })
        ));
    }
}
