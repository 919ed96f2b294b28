//! Tag-string parser.
//!
//! `validate` holds comma-separated flags (`primaryKey`, `where`, `update`,
//! `required`, `default=<literal>`, `sum`, `subtraction`, `multiply`, `divide`).
//! `validateType` holds the constraint block for the field's type.

use super::{Arithmetic, FieldDescriptor, FieldType};
use crate::error::{RecordError, RecordResult};
use crate::value::Value;
use std::str::FromStr;

/// Pattern attached by `expr=number`.
pub(crate) const NUMBER_PATTERN: &str = r"^[0-9]*$";

fn split(tag: &str) -> impl Iterator<Item = &str> {
    tag.split(',').map(str::trim).filter(|t| !t.is_empty())
}

fn number<T: FromStr>(field: &str, rule: &str, raw: &str) -> RecordResult<T> {
    raw.trim().parse().map_err(|_| {
        RecordError::InvalidSchema(format!(
            "field '{field}': `{rule}` expects a number, got '{raw}'"
        ))
    })
}

fn default_literal(field_type: FieldType, field: &str, raw: &str) -> RecordResult<Value> {
    Ok(match field_type {
        FieldType::Bool => Value::Bool(number(field, "default", raw)?),
        FieldType::Int => Value::Int(number(field, "default", raw)?),
        FieldType::Uint => Value::Uint(number(field, "default", raw)?),
        FieldType::Float => Value::Float(number(field, "default", raw)?),
        FieldType::String | FieldType::Bytes | FieldType::Timestamp => {
            Value::Text(raw.to_string())
        }
    })
}

pub(super) fn parse(
    mut desc: FieldDescriptor,
    validate: &str,
    validate_type: &str,
) -> RecordResult<FieldDescriptor> {
    let name = desc.name.clone();

    for flag in split(validate) {
        desc = match flag {
            "primaryKey" => desc.primary_key(),
            "where" => desc.filterable(),
            "update" => desc.updatable(),
            "required" => desc.required(),
            "empty" => desc.allow_empty(),
            "sum" => desc.arithmetic(Arithmetic::Sum),
            "subtraction" => desc.arithmetic(Arithmetic::Subtract),
            "multiply" => desc.arithmetic(Arithmetic::Multiply),
            "divide" => desc.arithmetic(Arithmetic::Divide),
            "default" if desc.field_type == FieldType::Timestamp => desc.default_now(),
            _ => match flag.strip_prefix("default=") {
                Some(raw) => {
                    let value = default_literal(desc.field_type, &name, raw)?;
                    desc.default_value(value)
                }
                None => {
                    return Err(RecordError::InvalidSchema(format!(
                        "field '{name}': unknown flag `{flag}`"
                    )));
                }
            },
        };
    }

    for rule in split(validate_type) {
        let (key, arg) = match rule.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (rule, None),
        };
        desc = match (desc.field_type, key, arg) {
            (FieldType::String, "min", Some(n)) => desc.min_len(number(&name, key, n)?),
            (FieldType::String, "max", Some(n)) => desc.max_len(number(&name, key, n)?),
            (FieldType::String, "case", Some("lowercase")) => desc.lowercase(),
            (FieldType::String, "case", Some("uppercase")) => desc.uppercase(),
            (FieldType::String, "encrypt", None) => desc.hashed(),
            (FieldType::String, "cipher", None) => desc.encrypted(),
            (FieldType::String, "expr", Some("number")) => desc.pattern(NUMBER_PATTERN),
            (FieldType::Float, "menor", Some(n)) => desc.lower_bound(number(&name, key, n)?),
            (FieldType::Float, "mayor", Some(n)) => desc.upper_bound(number(&name, key, n)?),
            (FieldType::Float, "porcentaje", None) => desc.percentage(),
            (FieldType::Float | FieldType::Int, "negative" | "negativo", None) => {
                desc.allow_negative()
            }
            (FieldType::Int, "min", Some(n)) => desc.min(number(&name, key, n)?),
            (FieldType::Int, "max", Some(n)) => desc.max(number(&name, key, n)?),
            (FieldType::Uint, "max", Some(n)) => {
                let max: u64 = number(&name, key, n)?;
                desc.max(i64::try_from(max).map_err(|_| {
                    RecordError::InvalidSchema(format!("field '{name}': `max` is out of range"))
                })?)
            }
            _ => {
                return Err(RecordError::InvalidSchema(format!(
                    "field '{name}': rule `{rule}` does not apply to {}",
                    desc.field_type
                )));
            }
        };
    }

    Ok(desc)
}
