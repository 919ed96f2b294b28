//! Type coercion and record validation.
//!
//! Every field of a record is checked, and all failures are collected into one
//! [`ValidationErrors`] value; a record is either fully valid or rejected as a
//! whole. Successful validation yields a [`ValidatedRecord`]: column values in
//! schema order, each paired with the assignment it compiles to.

mod coerce;
mod errors;
mod rules;


pub use coerce::{coerce, parse_timestamp};
pub use errors::{FieldError, ValidationCode, ValidationErrors};

use crate::crypto::FieldCrypto;
use crate::schema::{Arithmetic, FieldDescriptor, FieldType, Schema};
use crate::value::{Record, Value};

/// One validated column value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub column: String,
    /// Assignment kind; anything but `None` only appears in update SET lists.
    pub op: Arithmetic,
    pub value: Value,
}

impl FieldValue {
    /// The key this value is rendered under: the column, or its arithmetic marker.
    pub fn key(&self) -> String {
        self.op
            .marker(&self.column)
            .unwrap_or_else(|| self.column.clone())
    }
}

/// Validated column values of one record, in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedRecord {
    fields: Vec<FieldValue>,
}

impl ValidatedRecord {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldValue> {
        self.fields.iter()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.column == column)
            .map(|f| &f.value)
    }

    /// Render as a key → value map (arithmetic fields under their marker key).
    pub fn to_record(&self) -> Record {
        self.fields
            .iter()
            .map(|f| (f.key(), f.value.clone()))
            .collect()
    }

    fn push(&mut self, column: &str, op: Arithmetic, value: Value) {
        self.fields.push(FieldValue {
            column: column.to_string(),
            op,
            value,
        });
    }
}

/// Coerce `raw` to the field's declared type, then apply its rules.
pub fn coerce_and_validate(
    field: &FieldDescriptor,
    raw: &Value,
    crypto: Option<&dyn FieldCrypto>,
) -> Result<Value, FieldError> {
    let value = coerce(raw, field.field_type())
        .map_err(|e| field_error(field, ValidationCode::Type, type_message(&e)))?;
    rules::apply(field, value, crypto).map_err(|e| labelled(field, e))
}

fn type_message(err: &crate::RecordError) -> String {
    match err {
        crate::RecordError::TypeMismatch { expected, found } => {
            format!("cannot convert {found} to {expected}")
        }
        other => other.to_string(),
    }
}

fn field_error(
    field: &FieldDescriptor,
    code: ValidationCode,
    message: impl Into<String>,
) -> FieldError {
    labelled(field, FieldError::new(field.name(), code, message))
}

fn labelled(field: &FieldDescriptor, err: FieldError) -> FieldError {
    if field.label_text() == field.name() {
        err
    } else {
        err.with_label(field.label_text())
    }
}

fn present<'a>(record: &'a Record, field: &FieldDescriptor) -> Option<&'a Value> {
    record.get(field.name()).filter(|v| !v.is_null())
}

fn is_blank(value: &Value) -> bool {
    matches!(value, Value::Text(s) if s.trim().is_empty())
}

fn listed(fields: &[&FieldDescriptor], field: &FieldDescriptor) -> bool {
    fields.iter().any(|f| f.name() == field.name())
}

fn finish(
    out: ValidatedRecord,
    errors: ValidationErrors,
) -> Result<ValidatedRecord, ValidationErrors> {
    if errors.is_empty() { Ok(out) } else { Err(errors) }
}

/// Insert rules: provided values are validated, missing ones take the default,
/// missing required fields without a default fail, the rest are omitted.
pub fn validate_insert(
    schema: &dyn Schema,
    record: &Record,
) -> Result<ValidatedRecord, ValidationErrors> {
    let mut out = ValidatedRecord::default();
    let mut errors = ValidationErrors::default();

    for field in schema.insert_fields() {
        match present(record, field) {
            Some(raw) => match coerce_and_validate(field, raw, schema.crypto()) {
                Ok(value) => out.push(field.name(), Arithmetic::None, value),
                Err(e) => errors.push(e),
            },
            None => match field.default() {
                Some(default) => out.push(field.name(), Arithmetic::None, default.resolve()),
                None if field.is_required() => {
                    errors.push(field_error(field, ValidationCode::Required, "is required"))
                }
                None => {}
            },
        }
    }

    finish(out, errors)
}

/// Update rules for the SET part of a record (the WHERE key already removed).
///
/// Only fields of [`Schema::update_fields`] flagged updatable may be set; any
/// other present schema field is an error. Absent fields are skipped. An empty
/// string is accepted only when the field allows it, in which case it is
/// stored as-is without further rules. An `Ok` result may be empty.
pub fn validate_update(
    schema: &dyn Schema,
    record: &Record,
) -> Result<ValidatedRecord, ValidationErrors> {
    let allowed = schema.update_fields();
    let mut out = ValidatedRecord::default();
    let mut errors = ValidationErrors::default();

    for field in schema.fields() {
        let Some(raw) = present(record, field) else {
            continue;
        };
        if !field.is_updatable() || !listed(&allowed, field) {
            errors.push(field_error(field, ValidationCode::NotUpdatable, "cannot be updated"));
            continue;
        }
        if field.field_type() == FieldType::String && is_blank(raw) {
            if field.allows_empty() {
                out.push(field.name(), field.arithmetic_op(), Value::Text(String::new()));
            } else {
                errors.push(field_error(field, ValidationCode::Empty, "must not be empty"));
            }
            continue;
        }
        match coerce_and_validate(field, raw, schema.crypto()) {
            Ok(value) => out.push(field.name(), field.arithmetic_op(), value),
            Err(e) => errors.push(e),
        }
    }

    finish(out, errors)
}

/// WHERE predicate rules shared by update and delete.
///
/// `allowed` is the field list predicates may draw from, normally
/// [`Schema::delete_fields`]. Only listed primary-key or filterable fields may
/// appear, a missing listed primary key is an error, empty values are
/// rejected, and values are coerced to the declared type without applying
/// value rules.
pub fn validate_where(
    schema: &dyn Schema,
    allowed: &[&FieldDescriptor],
    predicate: &Record,
) -> Result<ValidatedRecord, ValidationErrors> {
    let mut out = ValidatedRecord::default();
    let mut errors = ValidationErrors::default();

    for field in schema.fields() {
        let in_list = listed(allowed, field);
        let Some(raw) = present(predicate, field) else {
            if in_list && field.is_primary_key() {
                errors.push(field_error(field, ValidationCode::Required, "is required"));
            }
            continue;
        };
        if !in_list || !field.usable_in_where() {
            errors.push(field_error(
                field,
                ValidationCode::NotFilterable,
                "cannot be used in a WHERE predicate",
            ));
        } else if is_blank(raw) {
            errors.push(field_error(field, ValidationCode::Empty, "must not be empty"));
        } else {
            match coerce(raw, field.field_type()) {
                Ok(value) => out.push(field.name(), Arithmetic::None, value),
                Err(e) => errors.push(field_error(field, ValidationCode::Type, type_message(&e))),
            }
        }
    }

    finish(out, errors)
}
