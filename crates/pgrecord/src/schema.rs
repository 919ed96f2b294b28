//! Declarative table schemas.
//!
//! A schema is a table name plus an ordered list of [`FieldDescriptor`]s. The
//! descriptor carries everything the validation engine needs for one column:
//! its declared type, behavioural flags, an optional default, an arithmetic tag
//! for additive updates and a type-specific constraint block.
//!
//! # Example
//!
//! ```ignore
//! use pgrecord::{FieldDescriptor, TableSchema};
//!
//! let users = TableSchema::new("users", vec![
//!     FieldDescriptor::string("id").primary_key().required(),
//!     FieldDescriptor::string("document").required().lowercase().max_len(11),
//!     FieldDescriptor::int("credits").updatable().sum(),
//!     FieldDescriptor::timestamp("atcreate").default_now(),
//! ])?;
//! ```

use crate::crypto::FieldCrypto;
use crate::error::{RecordError, RecordResult};
use crate::value::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

mod tags;

/// Declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    Int,
    Uint,
    Float,
    String,
    Timestamp,
    Bytes,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int64",
            Self::Uint => "uint64",
            Self::Float => "float64",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::Bytes => "bytes",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-place arithmetic applied by an update instead of plain assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Arithmetic {
    #[default]
    None,
    Sum,
    Subtract,
    Multiply,
    Divide,
}

impl Arithmetic {
    /// Suffix used in the rendered marker key.
    pub(crate) fn suffix(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Sum => Some("SUM"),
            Self::Subtract => Some("SUBTRACT"),
            Self::Multiply => Some("MULTIPLY"),
            Self::Divide => Some("DIVIDE"),
        }
    }

    /// SQL operator applied against the current column value.
    pub fn sql_operator(&self) -> Option<char> {
        match self {
            Self::None => None,
            Self::Sum => Some('+'),
            Self::Subtract => Some('-'),
            Self::Multiply => Some('*'),
            Self::Divide => Some('/'),
        }
    }

    pub(crate) fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "SUM" => Some(Self::Sum),
            "SUBTRACT" => Some(Self::Subtract),
            "MULTIPLY" => Some(Self::Multiply),
            "DIVIDE" => Some(Self::Divide),
            _ => None,
        }
    }

    /// Marker key for `column`, e.g. `ADD_credits_SUM`. `None` for plain assignment.
    pub fn marker(&self, column: &str) -> Option<String> {
        self.suffix().map(|s| format!("ADD_{column}_{s}"))
    }
}

/// Value used on insert when the input omits the field.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Value(Value),
    /// Current local timestamp, taken when the record is compiled.
    Now,
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Now => Value::Timestamp(chrono::Local::now().naive_local()),
        }
    }
}

/// Case transform for string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Lower,
    Upper,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringRules {
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub lowercase: bool,
    pub uppercase: bool,
    pub pattern: Option<String>,
    /// Replace the value with a one-way hash.
    pub hash: bool,
    /// Replace the value with a reversible cipher.
    pub encrypt: bool,
}

impl StringRules {
    /// Upper wins when both transforms are set.
    pub fn case(&self) -> Option<Case> {
        if self.uppercase {
            Some(Case::Upper)
        } else if self.lowercase {
            Some(Case::Lower)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatRules {
    /// Values `<=` this bound are rejected.
    pub lower_bound: Option<f64>,
    /// Values `>=` this bound are rejected.
    pub upper_bound: Option<f64>,
    pub allow_negative: bool,
    /// Store the value divided by 100.
    pub percentage: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntRules {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub allow_negative: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UintRules {
    pub max: Option<u64>,
}

/// Type-specific constraint block. Bool, timestamp and bytes fields carry none.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraints {
    None,
    String(StringRules),
    Float(FloatRules),
    Int(IntRules),
    Uint(UintRules),
}

impl Constraints {
    fn for_type(ty: FieldType) -> Self {
        match ty {
            FieldType::String => Self::String(StringRules::default()),
            FieldType::Float => Self::Float(FloatRules::default()),
            FieldType::Int => Self::Int(IntRules::default()),
            FieldType::Uint => Self::Uint(UintRules::default()),
            FieldType::Bool | FieldType::Timestamp | FieldType::Bytes => Self::None,
        }
    }
}

/// Metadata for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    name: String,
    label: String,
    field_type: FieldType,
    required: bool,
    primary_key: bool,
    filterable: bool,
    updatable: bool,
    allow_empty: bool,
    default: Option<DefaultValue>,
    arithmetic: Arithmetic,
    constraints: Constraints,
    // Builder calls that did not match the field type; reported by `TableSchema::new`.
    misapplied: Vec<&'static str>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            field_type,
            required: false,
            primary_key: false,
            filterable: false,
            updatable: false,
            allow_empty: false,
            default: None,
            arithmetic: Arithmetic::None,
            constraints: Constraints::for_type(field_type),
            misapplied: Vec::new(),
        }
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Bool)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Int)
    }

    pub fn uint(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Uint)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Timestamp)
    }

    pub fn bytes(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Bytes)
    }

    /// Parse the tag vocabulary (`validate` and `validateType` strings) into a descriptor.
    pub fn from_tags(
        name: impl Into<String>,
        field_type: FieldType,
        validate: &str,
        validate_type: &str,
    ) -> RecordResult<Self> {
        tags::parse(Self::new(name, field_type), validate, validate_type)
    }

    // ==================== flags ====================

    /// Human-readable label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allow the field in update/delete WHERE predicates.
    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn updatable(mut self) -> Self {
        self.updatable = true;
        self
    }

    /// Accept an empty string on update.
    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default = Some(DefaultValue::Now);
        self
    }

    pub fn arithmetic(mut self, op: Arithmetic) -> Self {
        self.arithmetic = op;
        self
    }

    pub fn sum(self) -> Self {
        self.arithmetic(Arithmetic::Sum)
    }

    pub fn subtract(self) -> Self {
        self.arithmetic(Arithmetic::Subtract)
    }

    pub fn multiply(self) -> Self {
        self.arithmetic(Arithmetic::Multiply)
    }

    pub fn divide(self) -> Self {
        self.arithmetic(Arithmetic::Divide)
    }

    // ==================== constraints ====================

    fn with_string(mut self, rule: &'static str, f: impl FnOnce(&mut StringRules)) -> Self {
        match &mut self.constraints {
            Constraints::String(rules) => f(rules),
            _ => self.misapplied.push(rule),
        }
        self
    }

    fn with_float(mut self, rule: &'static str, f: impl FnOnce(&mut FloatRules)) -> Self {
        match &mut self.constraints {
            Constraints::Float(rules) => f(rules),
            _ => self.misapplied.push(rule),
        }
        self
    }

    pub fn min_len(self, n: usize) -> Self {
        self.with_string("min_len", |r| r.min_len = Some(n))
    }

    pub fn max_len(self, n: usize) -> Self {
        self.with_string("max_len", |r| r.max_len = Some(n))
    }

    pub fn lowercase(self) -> Self {
        self.with_string("lowercase", |r| r.lowercase = true)
    }

    pub fn uppercase(self) -> Self {
        self.with_string("uppercase", |r| r.uppercase = true)
    }

    /// Regex the trimmed value must match.
    pub fn pattern(self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.with_string("pattern", |r| r.pattern = Some(pattern))
    }

    pub fn hashed(self) -> Self {
        self.with_string("hashed", |r| r.hash = true)
    }

    pub fn encrypted(self) -> Self {
        self.with_string("encrypted", |r| r.encrypt = true)
    }

    pub fn lower_bound(self, bound: f64) -> Self {
        self.with_float("lower_bound", |r| r.lower_bound = Some(bound))
    }

    pub fn upper_bound(self, bound: f64) -> Self {
        self.with_float("upper_bound", |r| r.upper_bound = Some(bound))
    }

    pub fn percentage(self) -> Self {
        self.with_float("percentage", |r| r.percentage = true)
    }

    /// Accept negative values (float and signed int fields).
    pub fn allow_negative(mut self) -> Self {
        match &mut self.constraints {
            Constraints::Float(r) => r.allow_negative = true,
            Constraints::Int(r) => r.allow_negative = true,
            _ => self.misapplied.push("allow_negative"),
        }
        self
    }

    pub fn min(mut self, min: i64) -> Self {
        match &mut self.constraints {
            Constraints::Int(r) => r.min = Some(min),
            _ => self.misapplied.push("min"),
        }
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        match &mut self.constraints {
            Constraints::Int(r) => r.max = Some(max),
            Constraints::Uint(r) => match u64::try_from(max) {
                Ok(max) => r.max = Some(max),
                Err(_) => self.misapplied.push("max"),
            },
            _ => self.misapplied.push("max"),
        }
        self
    }

    // ==================== accessors ====================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_text(&self) -> &str {
        &self.label
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_filterable(&self) -> bool {
        self.filterable
    }

    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    pub fn allows_empty(&self) -> bool {
        self.allow_empty
    }

    pub fn default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn arithmetic_op(&self) -> Arithmetic {
        self.arithmetic
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Usable in an update/delete WHERE predicate.
    pub fn usable_in_where(&self) -> bool {
        self.filterable || self.primary_key
    }

    fn check(&self) -> RecordResult<()> {
        if !is_identifier(&self.name) {
            return Err(RecordError::InvalidSchema(format!(
                "'{}' is not a valid column name",
                self.name
            )));
        }
        if let Some(rule) = self.misapplied.first() {
            return Err(RecordError::InvalidSchema(format!(
                "rule `{rule}` does not apply to {} field '{}'",
                self.field_type, self.name
            )));
        }
        if self.arithmetic != Arithmetic::None && !self.updatable {
            return Err(RecordError::InvalidSchema(format!(
                "field '{}' has an arithmetic tag but is not updatable",
                self.name
            )));
        }
        if let Constraints::String(StringRules {
            pattern: Some(pattern),
            ..
        }) = &self.constraints
        {
            regex::Regex::new(pattern).map_err(|e| {
                let name = &self.name;
                RecordError::InvalidSchema(format!("invalid pattern for field '{name}': {e}"))
            })?;
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_$]*`, optionally dotted.
pub(crate) fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}

/// Capability exposed by a table model.
pub trait Schema: Send + Sync {
    fn table_name(&self) -> &str;

    /// Master field list in column order.
    fn fields(&self) -> &[FieldDescriptor];

    /// Hash/cipher capability used by `hashed`/`encrypted` string fields.
    fn crypto(&self) -> Option<&dyn FieldCrypto> {
        None
    }

    fn insert_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields().iter().collect()
    }

    fn update_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields()
            .iter()
            .filter(|f| f.updatable || f.usable_in_where())
            .collect()
    }

    fn delete_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields().iter().filter(|f| f.usable_in_where()).collect()
    }
}

/// A schema built from a descriptor list at startup.
#[derive(Clone)]
pub struct TableSchema {
    table: String,
    fields: Vec<FieldDescriptor>,
    crypto: Option<Arc<dyn FieldCrypto>>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, fields: Vec<FieldDescriptor>) -> RecordResult<Self> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(RecordError::InvalidSchema(format!(
                "'{table}' is not a valid table name"
            )));
        }
        if fields.is_empty() {
            return Err(RecordError::InvalidSchema(format!(
                "table '{table}' has no fields"
            )));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            field.check()?;
            if !seen.insert(field.name.as_str()) {
                return Err(RecordError::InvalidSchema(format!(
                    "duplicate field '{}' in table '{table}'",
                    field.name
                )));
            }
        }

        Ok(Self {
            table,
            fields,
            crypto: None,
        })
    }

    pub fn with_crypto(mut self, crypto: Arc<dyn FieldCrypto>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl fmt::Debug for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSchema")
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("crypto", &self.crypto.is_some())
            .finish()
    }
}

impl Schema for TableSchema {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    fn crypto(&self) -> Option<&dyn FieldCrypto> {
        self.crypto.as_deref()
    }
}
