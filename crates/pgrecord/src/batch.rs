//! Single-batch compilation and execution.
//!
//! A [`Batch`] holds the source records for one table, and after one of
//! [`Batch::insert`], [`Batch::update`] or [`Batch::delete`] their validated
//! form and compiled statements. [`Batch::exec`] runs the statements one by one
//! on a pooled connection without an enclosing transaction; use
//! [`crate::TransactionSession`] when several batches must commit together.

use crate::client::GenericClient;
use crate::compile::{self, Action, CompiledStatement};
use crate::cross;
use crate::error::{RecordError, RecordResult};
use crate::pool::ConnectionProvider;
use crate::schema::Schema;
use crate::trace;
use crate::validate::ValidatedRecord;
use crate::value::Record;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Records for one table plus their compiled statements.
#[derive(Clone)]
pub struct Batch {
    schema: Arc<dyn Schema>,
    source: Vec<Record>,
    action: Option<Action>,
    validated: Vec<ValidatedRecord>,
    statements: Vec<CompiledStatement>,
}

impl Batch {
    pub fn new(schema: Arc<dyn Schema>, records: Vec<Record>) -> Self {
        Self {
            schema,
            source: records,
            action: None,
            validated: Vec::new(),
            statements: Vec::new(),
        }
    }

    /// Compile the source records as inserts.
    pub fn insert(self) -> RecordResult<Self> {
        self.compile(Action::Insert)
    }

    /// Compile the source records as updates. Each record may carry a `where` map.
    pub fn update(self) -> RecordResult<Self> {
        self.compile(Action::Update)
    }

    /// Compile the source records as deletes. Each record is the predicate.
    pub fn delete(self) -> RecordResult<Self> {
        self.compile(Action::Delete)
    }

    /// Compile for `action`. Calling again recompiles from the same source records.
    pub fn compile(mut self, action: Action) -> RecordResult<Self> {
        self.recompile(action)?;
        Ok(self)
    }

    /// Compile in place. On failure the batch keeps its records and previous output.
    pub fn recompile(&mut self, action: Action) -> RecordResult<&mut Self> {
        let compiled = compile::compile(action, self.schema.as_ref(), &self.source)?;
        self.action = Some(action);
        self.validated = compiled.validated;
        self.statements = compiled.statements;
        Ok(self)
    }

    pub fn schema(&self) -> &Arc<dyn Schema> {
        &self.schema
    }

    pub fn table(&self) -> &str {
        self.schema.table_name()
    }

    /// `None` until compiled.
    pub fn action(&self) -> Option<Action> {
        self.action
    }

    pub fn is_compiled(&self) -> bool {
        self.action.is_some()
    }

    pub fn source_records(&self) -> &[Record] {
        &self.source
    }

    pub fn validated(&self) -> &[ValidatedRecord] {
        &self.validated
    }

    /// Validated records rendered as maps, arithmetic fields under their marker key.
    pub fn validated_records(&self) -> Vec<Record> {
        self.validated.iter().map(ValidatedRecord::to_record).collect()
    }

    pub fn statements(&self) -> &[CompiledStatement] {
        &self.statements
    }

    pub(crate) fn compiled_action(&self) -> RecordResult<Action> {
        self.action.ok_or_else(|| {
            RecordError::compilation(format!(
                "records for table {} have not been compiled",
                self.table()
            ))
        })
    }

    /// Acquire a connection for `database` and run every statement in order.
    ///
    /// Returns the total number of affected rows. The first failure aborts the
    /// remaining statements; earlier ones stay applied.
    pub async fn exec(
        &self,
        provider: &ConnectionProvider,
        database: &str,
        cross: bool,
    ) -> RecordResult<u64> {
        let action = self.compiled_action()?;
        // Marker checks happen before a connection is taken.
        prepare(action, &self.statements, cross)?;
        let client = provider.acquire(database).await?;
        run_statements(&client, action, self.table(), &self.statements, cross).await
    }

    /// Run the statements on a caller-supplied client or transaction.
    pub async fn exec_on(&self, client: &impl GenericClient, cross: bool) -> RecordResult<u64> {
        let action = self.compiled_action()?;
        run_statements(client, action, self.table(), &self.statements, cross).await
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("table", &self.table())
            .field("action", &self.action)
            .field("records", &self.source.len())
            .field("statements", &self.statements)
            .finish()
    }
}

/// Final SQL for every statement, rewriting arithmetic markers when `cross` is set.
///
/// Markers left in the text without `cross` would reference columns that do
/// not exist, so they are rejected here instead of reaching the server.
pub(crate) fn prepare(
    action: Action,
    statements: &[CompiledStatement],
    cross: bool,
) -> RecordResult<Vec<Cow<'_, str>>> {
    statements
        .iter()
        .map(|stmt| {
            if action != Action::Update {
                return Ok(Cow::Borrowed(stmt.sql()));
            }
            if cross {
                Ok(cross::rewrite(stmt.sql()))
            } else if cross::has_arithmetic_markers(stmt.sql()) {
                Err(RecordError::compilation(format!(
                    "statement uses arithmetic assignments but cross mode is off: {}",
                    stmt.sql()
                )))
            } else {
                Ok(Cow::Borrowed(stmt.sql()))
            }
        })
        .collect()
}

/// Execute `statements` sequentially on `client`, aborting at the first failure.
pub async fn run_statements(
    client: &impl GenericClient,
    action: Action,
    table: &str,
    statements: &[CompiledStatement],
    cross: bool,
) -> RecordResult<u64> {
    let sqls = prepare(action, statements, cross)?;
    let mut affected = 0;

    for (sql, stmt) in sqls.iter().zip(statements) {
        trace::statement(action.as_str(), table, sql, stmt.values().len());
        affected += client
            .execute(sql, &stmt.params())
            .await
            .map_err(|e| RecordError::Execution {
                action: action.as_str(),
                table: table.to_string(),
                source: Box::new(e),
            })?;
    }
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::schema::{FieldDescriptor, TableSchema};
    use crate::test_support::RecordingClient;

    fn users() -> Arc<dyn Schema> {
        Arc::new(
            TableSchema::new(
                "users",
                vec![
                    FieldDescriptor::string("id").primary_key().required(),
                    FieldDescriptor::int("credits").updatable().sum(),
                ],
            )
            .unwrap(),
        )
    }

    fn credit_update() -> Batch {
        Batch::new(
            users(),
            vec![record! { "credits" => 1, "where" => record! { "id" => "u1" } }],
        )
        .update()
        .unwrap()
    }

    #[tokio::test]
    async fn cross_mode_rewrites_before_execution() {
        let client = RecordingClient::default();
        credit_update().exec_on(&client, true).await.unwrap();
        assert_eq!(
            client.executed(),
            vec!["UPDATE users SET credits=credits+$1 WHERE id=$2".to_string()]
        );
    }

    #[tokio::test]
    async fn markers_without_cross_never_reach_the_client() {
        let client = RecordingClient::default();
        let err = credit_update().exec_on(&client, false).await.unwrap_err();
        assert!(matches!(err, RecordError::Compilation(_)));
        assert!(client.executed().is_empty());
    }

    #[tokio::test]
    async fn first_failure_aborts_the_rest() {
        let client = RecordingClient::failing_at(1);
        let batch = Batch::new(
            users(),
            vec![
                record! { "id" => "a" },
                record! { "id" => "b" },
                record! { "id" => "c" },
            ],
        )
        .insert()
        .unwrap();

        let err = batch.exec_on(&client, false).await.unwrap_err();
        match err {
            RecordError::Execution { action, table, .. } => {
                assert_eq!(action, "INSERT");
                assert_eq!(table, "users");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.executed().len(), 2);
    }

    #[tokio::test]
    async fn uncompiled_batch_is_rejected() {
        let client = RecordingClient::default();
        let batch = Batch::new(users(), vec![record! { "id" => "a" }]);
        let err = batch.exec_on(&client, false).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Compilation error: records for table users have not been compiled"
        );
    }

    #[test]
    fn failed_recompile_keeps_the_batch() {
        let mut batch = Batch::new(users(), vec![record! { "id" => "a" }])
            .insert()
            .unwrap();
        // Nothing updatable in the record.
        assert!(batch.recompile(Action::Update).is_err());
        assert_eq!(batch.action(), Some(Action::Insert));
        assert_eq!(batch.source_records().len(), 1);
        assert_eq!(batch.statements()[0].sql(), "INSERT INTO users (id) VALUES($1)");

        batch.recompile(Action::Delete).unwrap();
        assert_eq!(batch.action(), Some(Action::Delete));
    }

    #[tokio::test]
    async fn execution_failure_keeps_the_database_classification() {
        let duplicate = RecordError::UniqueViolation("users_pkey: duplicate key".into());
        let client = RecordingClient::failing_with(0, duplicate);
        let batch = Batch::new(users(), vec![record! { "id" => "a" }])
            .insert()
            .unwrap();

        let err = batch.exec_on(&client, false).await.unwrap_err();
        assert!(err.is_unique_violation());
        assert!(err.to_string().contains("Unique constraint violation: users_pkey"));
    }

    #[test]
    fn recompiling_replaces_previous_output() {
        let batch = Batch::new(users(), vec![record! { "id" => "a" }])
            .insert()
            .unwrap()
            .delete()
            .unwrap();
        assert_eq!(batch.action(), Some(Action::Delete));
        assert_eq!(batch.statements().len(), 1);
        assert_eq!(batch.statements()[0].sql(), "DELETE FROM users WHERE id=$1");
        assert_eq!(batch.validated_records()[0].get("id"), Some(&"a".into()));
    }
}
