use super::*;
use crate::record;
use crate::schema::{FieldDescriptor, Schema, TableSchema};

fn users() -> TableSchema {
    TableSchema::new(
        "users",
        vec![
            FieldDescriptor::string("id").primary_key().required(),
            FieldDescriptor::string("document").required(),
            FieldDescriptor::string("email").filterable().updatable(),
            FieldDescriptor::int("credits").updatable().sum(),
            FieldDescriptor::timestamp("atcreate").default_now(),
        ],
    )
    .unwrap()
}

fn assert_placeholders_match(stmt: &CompiledStatement) {
    let count = stmt.sql().matches('$').count();
    assert_eq!(count, stmt.values().len(), "{}", stmt.sql());
}

// ==================== insert ====================

#[test]
fn insert_binds_defaults() {
    let compiled = compile(
        Action::Insert,
        &users(),
        &[record! { "id" => "u1", "document" => "123", "credits" => 40 }],
    )
    .unwrap();

    assert_eq!(compiled.statements.len(), 1);
    let stmt = &compiled.statements[0];
    assert_eq!(
        stmt.sql(),
        "INSERT INTO users (id, document, credits, atcreate) VALUES($1, $2, $3, $4)"
    );
    assert_eq!(&stmt.values()[..3], &[
        Value::Text("u1".into()),
        Value::Text("123".into()),
        Value::Int(40),
    ]);
    assert!(matches!(stmt.values()[3], Value::Timestamp(_)));
}

#[test]
fn insert_compiles_one_statement_per_record() {
    let compiled = compile(
        Action::Insert,
        &users(),
        &[
            record! { "id" => "u1", "document" => "1" },
            record! { "id" => "u2", "document" => "2", "email" => "a@b.c" },
        ],
    )
    .unwrap();

    assert_eq!(compiled.statements.len(), 2);
    assert_eq!(compiled.validated.len(), 2);
    for stmt in &compiled.statements {
        assert_placeholders_match(stmt);
        assert!(stmt.sql().contains("$1"));
    }
}

#[test]
fn insert_failure_names_the_record() {
    let err = compile(
        Action::Insert,
        &users(),
        &[
            record! { "id" => "u1", "document" => "1" },
            record! { "id" => "u2" },
        ],
    )
    .unwrap_err();

    match err {
        RecordError::Validation { record, errors } => {
            assert_eq!(record, 1);
            assert!(errors.has("document"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn insert_rejects_not_a_number_for_bounded_float() {
    let schema = TableSchema::new(
        "prices",
        vec![
            FieldDescriptor::string("id").primary_key().required(),
            FieldDescriptor::float("price").lower_bound(0.0).upper_bound(100.0),
        ],
    )
    .unwrap();
    let err = compile(Action::Insert, &schema, &[record! { "id" => "a", "price" => "NaN" }])
        .unwrap_err();
    assert!(err.validation_errors().unwrap().has("price"));
}

#[test]
fn insert_with_nothing_to_bind_uses_default_values() {
    let schema = TableSchema::new("events", vec![FieldDescriptor::string("note")]).unwrap();
    let compiled = compile(Action::Insert, &schema, &[Record::new()]).unwrap();
    assert_eq!(compiled.statements[0].sql(), "INSERT INTO events DEFAULT VALUES");
}

// ==================== update ====================

#[test]
fn update_numbers_set_before_where() {
    let compiled = compile(
        Action::Update,
        &users(),
        &[record! {
            "credits" => 1,
            "email" => "x@y.z",
            "where" => record! { "id" => "u1" },
        }],
    )
    .unwrap();

    let stmt = &compiled.statements[0];
    assert_eq!(
        stmt.sql(),
        "UPDATE users SET email=$1, ADD_credits_SUM=$2 WHERE id=$3"
    );
    assert_eq!(stmt.values(), &[
        Value::Text("x@y.z".into()),
        Value::Int(1),
        Value::Text("u1".into()),
    ]);
}

#[test]
fn update_without_predicate_has_no_where() {
    let compiled = compile(Action::Update, &users(), &[record! { "email" => "x@y.z" }]).unwrap();
    assert_eq!(compiled.statements[0].sql(), "UPDATE users SET email=$1");
}

#[test]
fn update_drops_records_without_fields() {
    let compiled = compile(
        Action::Update,
        &users(),
        &[
            record! { "where" => record! { "id" => "u1" } },
            record! { "credits" => 2, "where" => record! { "id" => "u2" } },
        ],
    )
    .unwrap();

    assert_eq!(compiled.statements.len(), 1);
    assert_eq!(compiled.statements[0].values()[1], Value::Text("u2".into()));
}

#[test]
fn update_fails_when_every_record_is_dropped() {
    let err = compile(
        Action::Update,
        &users(),
        &[record! { "where" => record! { "id" => "u1" } }],
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Compilation error: no fields left to update after validation"
    );
}

#[test]
fn update_predicate_is_validated() {
    let err = compile(
        Action::Update,
        &users(),
        &[record! { "credits" => 1, "where" => record! { "document" => "9" } }],
    )
    .unwrap_err();
    let errors = err.validation_errors().unwrap();
    assert!(errors.has("id"));
    assert!(errors.has("document"));
}

#[test]
fn update_predicate_must_be_a_map() {
    let err = compile(
        Action::Update,
        &users(),
        &[record! { "credits" => 1, "where" => "id = 1" }],
    )
    .unwrap_err();
    assert!(err.validation_errors().unwrap().has(WHERE_KEY));
}

#[test]
fn update_does_not_mutate_source_records() {
    let records = vec![record! { "credits" => 1, "where" => record! { "id" => "u1" } }];
    compile(Action::Update, &users(), &records).unwrap();
    assert!(records[0].contains_key(WHERE_KEY));
}

// ==================== delete ====================

#[test]
fn delete_uses_record_as_predicate() {
    let compiled = compile(
        Action::Delete,
        &users(),
        &[record! { "id" => "u1", "email" => "a@b.c" }],
    )
    .unwrap();
    let stmt = &compiled.statements[0];
    assert_eq!(stmt.sql(), "DELETE FROM users WHERE id=$1 AND email=$2");
    assert_placeholders_match(stmt);
}

struct KeyedDeletes(TableSchema);

impl Schema for KeyedDeletes {
    fn table_name(&self) -> &str {
        self.0.table_name()
    }

    fn fields(&self) -> &[FieldDescriptor] {
        self.0.fields()
    }

    fn delete_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields().iter().filter(|f| f.is_primary_key()).collect()
    }
}

#[test]
fn delete_follows_the_schema_delete_list() {
    let schema = KeyedDeletes(users());
    let err = compile(
        Action::Delete,
        &schema,
        &[record! { "id" => "u1", "email" => "a@b.c" }],
    )
    .unwrap_err();
    assert!(err.validation_errors().unwrap().has("email"));

    let compiled = compile(Action::Delete, &schema, &[record! { "id" => "u1" }]).unwrap();
    assert_eq!(compiled.statements[0].sql(), "DELETE FROM users WHERE id=$1");
}

#[test]
fn delete_without_primary_key_is_required_error() {
    let err = compile(Action::Delete, &users(), &[record! { "email" => "a@b.c" }]).unwrap_err();
    let errors = err.validation_errors().unwrap();
    assert_eq!(errors.iter().next().map(|e| e.message.as_str()), Some("is required"));
}

#[test]
fn delete_without_any_predicate_is_rejected() {
    let schema =
        TableSchema::new("logs", vec![FieldDescriptor::string("tag").filterable()]).unwrap();
    let err = compile(Action::Delete, &schema, &[Record::new()]).unwrap_err();
    assert!(matches!(err, RecordError::Compilation(_)));
}

// ==================== empty batches ====================

#[test]
fn empty_batches_have_distinct_messages() {
    let schema = users();
    let messages: Vec<String> = [Action::Insert, Action::Update, Action::Delete]
        .into_iter()
        .map(|a| compile(a, &schema, &[]).unwrap_err().to_string())
        .collect();
    assert_eq!(messages, vec![
        "Compilation error: no records to insert",
        "Compilation error: no records to update",
        "Compilation error: no records to delete",
    ]);
}
