//! Statement compiler.
//!
//! Turns validated records into positionally-parameterized INSERT, UPDATE and
//! DELETE statements. Each record compiles to its own statement whose
//! placeholders run `$1..$n` left to right, one per bound value.
//!
//! Update SET assignments for arithmetic fields are rendered under their marker
//! key (`ADD_credits_SUM=$1`); [`crate::cross::rewrite`] turns those into
//! in-place arithmetic before execution.

use crate::error::{RecordError, RecordResult};
use crate::schema::Schema;
use crate::validate::{self, FieldError, ValidatedRecord, ValidationCode, ValidationErrors};
use crate::value::{Record, Value};
use std::fmt;

#[cfg(test)]
mod tests;

/// Reserved update-record key holding the WHERE predicate.
pub const WHERE_KEY: &str = "where";

/// Kind of write a batch performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL text with `$N` placeholders and its bound values, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    sql: String,
    values: Vec<Value>,
}

impl CompiledStatement {
    pub(crate) fn new(sql: String, values: Vec<Value>) -> Self {
        Self { sql, values }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Values as driver parameters.
    pub fn params(&self) -> Vec<&(dyn tokio_postgres::types::ToSql + Sync)> {
        self.values
            .iter()
            .map(|v| v as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect()
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.values)
    }
}

impl fmt::Display for CompiledStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Output of one compilation: validated records alongside their statements.
#[derive(Debug, Clone, Default)]
pub struct Compiled {
    pub validated: Vec<ValidatedRecord>,
    pub statements: Vec<CompiledStatement>,
}

impl Compiled {
    fn push(&mut self, validated: ValidatedRecord, statement: CompiledStatement) {
        self.validated.push(validated);
        self.statements.push(statement);
    }
}

/// Compile `records` for `action` against `schema`.
///
/// Fails before producing anything when the batch is empty or any record is
/// invalid, so a rejected batch never reaches the database.
pub fn compile(action: Action, schema: &dyn Schema, records: &[Record]) -> RecordResult<Compiled> {
    if records.is_empty() {
        return Err(RecordError::compilation(format!(
            "no records to {}",
            action.verb()
        )));
    }
    match action {
        Action::Insert => compile_insert(schema, records),
        Action::Update => compile_update(schema, records),
        Action::Delete => compile_delete(schema, records),
    }
}

fn rejected(record: usize) -> impl FnOnce(ValidationErrors) -> RecordError {
    move |errors| RecordError::Validation { record, errors }
}

fn compile_insert(schema: &dyn Schema, records: &[Record]) -> RecordResult<Compiled> {
    let table = schema.table_name();
    let mut out = Compiled::default();

    for (index, record) in records.iter().enumerate() {
        let validated = validate::validate_insert(schema, record).map_err(rejected(index))?;
        let statement = insert_statement(table, &validated);
        out.push(validated, statement);
    }
    Ok(out)
}

fn compile_update(schema: &dyn Schema, records: &[Record]) -> RecordResult<Compiled> {
    let table = schema.table_name();
    let allowed = schema.delete_fields();
    let mut out = Compiled::default();

    for (index, record) in records.iter().enumerate() {
        let mut set = record.clone();
        let predicate = match set.remove(WHERE_KEY) {
            None | Some(Value::Null) => Record::new(),
            Some(Value::Map(predicate)) => predicate,
            Some(other) => {
                let mut errors = ValidationErrors::default();
                errors.push(FieldError::new(
                    WHERE_KEY,
                    ValidationCode::Type,
                    format!("must be a mapping, got {}", other.type_name()),
                ));
                return Err(rejected(index)(errors));
            }
        };

        let validated = validate::validate_update(schema, &set).map_err(rejected(index))?;
        if validated.is_empty() {
            continue;
        }

        let filter = if predicate.is_empty() {
            ValidatedRecord::default()
        } else {
            validate::validate_where(schema, &allowed, &predicate).map_err(rejected(index))?
        };

        let statement = update_statement(table, &validated, &filter);
        out.push(validated, statement);
    }

    if out.statements.is_empty() {
        return Err(RecordError::compilation(
            "no fields left to update after validation",
        ));
    }
    Ok(out)
}

fn compile_delete(schema: &dyn Schema, records: &[Record]) -> RecordResult<Compiled> {
    let table = schema.table_name();
    let allowed = schema.delete_fields();
    let mut out = Compiled::default();

    for (index, record) in records.iter().enumerate() {
        let filter =
            validate::validate_where(schema, &allowed, record).map_err(rejected(index))?;
        if filter.is_empty() {
            return Err(RecordError::compilation(format!(
                "delete record {index} has an empty predicate"
            )));
        }
        let statement = delete_statement(table, &filter);
        out.push(filter, statement);
    }
    Ok(out)
}

fn insert_statement(table: &str, record: &ValidatedRecord) -> CompiledStatement {
    if record.is_empty() {
        return CompiledStatement::new(format!("INSERT INTO {table} DEFAULT VALUES"), Vec::new());
    }

    let mut columns = Vec::with_capacity(record.len());
    let mut placeholders = Vec::with_capacity(record.len());
    let mut values = Vec::with_capacity(record.len());
    for (i, field) in record.iter().enumerate() {
        columns.push(field.column.as_str());
        placeholders.push(format!("${}", i + 1));
        values.push(field.value.clone());
    }

    CompiledStatement::new(
        format!(
            "INSERT INTO {table} ({}) VALUES({})",
            columns.join(", "),
            placeholders.join(", ")
        ),
        values,
    )
}

// Renders `key=$n` terms; numbering continues from the values already bound.
fn assignments(record: &ValidatedRecord, values: &mut Vec<Value>) -> Vec<String> {
    record
        .iter()
        .map(|field| {
            values.push(field.value.clone());
            format!("{}=${}", field.key(), values.len())
        })
        .collect()
}

fn update_statement(
    table: &str,
    set: &ValidatedRecord,
    filter: &ValidatedRecord,
) -> CompiledStatement {
    let mut values = Vec::with_capacity(set.len() + filter.len());
    let setters = assignments(set, &mut values);
    let mut sql = format!("UPDATE {table} SET {}", setters.join(", "));

    if !filter.is_empty() {
        let wheres = assignments(filter, &mut values);
        sql.push_str(" WHERE ");
        sql.push_str(&wheres.join(" AND "));
    }
    CompiledStatement::new(sql, values)
}

fn delete_statement(table: &str, filter: &ValidatedRecord) -> CompiledStatement {
    let mut values = Vec::with_capacity(filter.len());
    let wheres = assignments(filter, &mut values);
    CompiledStatement::new(
        format!("DELETE FROM {table} WHERE {}", wheres.join(" AND ")),
        values,
    )
}
