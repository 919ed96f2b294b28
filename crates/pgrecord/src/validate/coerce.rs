//! Permissive conversion of raw input values to a declared field type.

use crate::error::{RecordError, RecordResult};
use crate::schema::FieldType;
use crate::value::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const DATE_LAYOUTS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];
const DATETIME_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn mismatch(expected: FieldType, value: &Value) -> RecordError {
    RecordError::TypeMismatch {
        expected: expected.as_str(),
        found: value.type_name(),
    }
}

/// Convert `value` to `target`, or fail with [`RecordError::TypeMismatch`].
pub fn coerce(value: &Value, target: FieldType) -> RecordResult<Value> {
    let err = || mismatch(target, value);

    let coerced = match (target, value) {
        (_, Value::Null) => return Err(err()),

        (FieldType::Bool, Value::Bool(b)) => Value::Bool(*b),
        (FieldType::Bool, Value::Int(i)) if *i == 0 || *i == 1 => Value::Bool(*i == 1),
        (FieldType::Bool, Value::Uint(u)) if *u <= 1 => Value::Bool(*u == 1),
        (FieldType::Bool, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => return Err(err()),
        },

        (FieldType::Int, Value::Int(i)) => Value::Int(*i),
        (FieldType::Int, Value::Uint(u)) => Value::Int(i64::try_from(*u).map_err(|_| err())?),
        (FieldType::Int, Value::Float(f)) => Value::Int(float_to_i64(*f).ok_or_else(err)?),
        (FieldType::Int, Value::Text(s)) => Value::Int(s.trim().parse().map_err(|_| err())?),

        (FieldType::Uint, Value::Uint(u)) => Value::Uint(*u),
        (FieldType::Uint, Value::Int(i)) => Value::Uint(u64::try_from(*i).map_err(|_| err())?),
        (FieldType::Uint, Value::Float(f)) => {
            let i = float_to_i64(*f).ok_or_else(err)?;
            Value::Uint(u64::try_from(i).map_err(|_| err())?)
        }
        (FieldType::Uint, Value::Text(s)) => Value::Uint(s.trim().parse().map_err(|_| err())?),

        (FieldType::Float, Value::Float(f)) => Value::Float(finite(*f).ok_or_else(err)?),
        (FieldType::Float, Value::Int(i)) => Value::Float(*i as f64),
        (FieldType::Float, Value::Uint(u)) => Value::Float(*u as f64),
        (FieldType::Float, Value::Text(s)) => {
            let parsed = s.trim().parse().map_err(|_| err())?;
            Value::Float(finite(parsed).ok_or_else(err)?)
        }

        (FieldType::String, Value::Text(s)) => Value::Text(s.clone()),
        (FieldType::String, Value::Bytes(b)) => {
            Value::Text(String::from_utf8(b.clone()).map_err(|_| err())?)
        }
        (FieldType::String, other) => Value::Text(other.to_string()),

        (FieldType::Timestamp, Value::Timestamp(ts)) => Value::Timestamp(*ts),
        (FieldType::Timestamp, Value::Text(s)) => {
            Value::Timestamp(parse_timestamp(s).ok_or_else(err)?)
        }

        (FieldType::Bytes, Value::Bytes(b)) => Value::Bytes(b.clone()),
        (FieldType::Bytes, Value::Text(s)) => Value::Bytes(s.as_bytes().to_vec()),

        _ => return Err(err()),
    };
    Ok(coerced)
}

// NaN and infinities compare false against every bound.
fn finite(f: f64) -> Option<f64> {
    f.is_finite().then_some(f)
}

// Truncates toward zero; NaN, infinities and out-of-range values fail.
fn float_to_i64(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let t = f.trunc();
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return None;
    }
    Some(t as i64)
}

/// `dd/mm/yyyy`, `yyyy-mm-dd`, or ISO date-time with `T` or space separator.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(s, layout).ok())
        .map(|d| d.and_time(NaiveTime::MIN))
        .or_else(|| {
            DATETIME_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
        })
}
