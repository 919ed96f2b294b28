//! Transaction coordinator.
//!
//! [`TransactionSession`] runs statements from several batches, possibly for
//! different tables, as one atomic unit on one connection. It has two modes:
//!
//! - **Batch mode**: collect compiled batches with [`TransactionSession::insert`],
//!   [`TransactionSession::push_batch`] and friends, then [`TransactionSession::exec`]
//!   begins, runs everything in submission order and commits. The whole run is
//!   bounded by `transaction_timeout`; any failure or timeout rolls back.
//! - **Incremental mode**: [`TransactionSession::exec_batch`] opens the
//!   transaction on first use and runs one batch at a time against it;
//!   [`TransactionSession::commit`] finishes. A failing batch rolls back
//!   everything submitted so far.
//!
//! Commit and rollback are both terminal. Dropping a session with an open
//! incremental transaction discards its connection so the server aborts it.
//!
//! # Example
//!
//! ```ignore
//! let mut tx = provider.transaction("billing");
//! tx.insert(invoices, vec![record! { "id" => "i1", "total" => 90.0 }])?
//!   .update(users, vec![record! { "credits" => -90, "where" => record! { "id" => "u1" } }])?;
//! tx.exec(true).await?;
//! ```

use crate::batch::{self, Batch};
use crate::client::TransactionClient;
use crate::compile::Action;
use crate::error::{RecordError, RecordResult};
use crate::pool::ConnectionProvider;
use crate::schema::Schema;
use crate::trace;
use crate::value::Record;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Where a [`TransactionSession`] gets its connection from.
pub trait ConnectionSource: Send + Sync {
    type Connection: TransactionClient;

    /// Acquire a connection to `database`.
    fn connect(
        &self,
        database: &str,
    ) -> impl Future<Output = RecordResult<Self::Connection>> + Send;

    /// Upper bound for one transaction run, commit or rollback.
    fn transaction_timeout(&self) -> Duration;

    /// Give up a connection whose transaction state is unknown.
    fn discard(&self, conn: Self::Connection) {
        drop(conn);
    }
}

impl ConnectionSource for ConnectionProvider {
    type Connection = deadpool_postgres::Client;

    async fn connect(&self, database: &str) -> RecordResult<deadpool_postgres::Client> {
        self.acquire(database).await
    }

    fn transaction_timeout(&self) -> Duration {
        self.config().transaction_timeout
    }

    // Detach the connection from its pool and close it; the server aborts any open transaction.
    fn discard(&self, conn: deadpool_postgres::Client) {
        drop(deadpool_postgres::Object::take(conn));
    }
}

/// Lifecycle of a [`TransactionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Nothing has run yet.
    Pending,
    /// An incremental transaction is open.
    Open,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

pub struct TransactionSession<'p, S: ConnectionSource = ConnectionProvider> {
    source: &'p S,
    database: String,
    batches: Vec<Batch>,
    open: Option<S::Connection>,
    state: TransactionState,
    // Statements run so far in incremental mode.
    executed: usize,
}

impl ConnectionProvider {
    /// Start a transaction session against `database`.
    pub fn transaction(&self, database: &str) -> TransactionSession<'_> {
        TransactionSession::new(self, database)
    }
}

impl<'p, S: ConnectionSource> TransactionSession<'p, S> {
    pub fn new(source: &'p S, database: impl Into<String>) -> Self {
        Self {
            source,
            database: database.into(),
            batches: Vec::new(),
            open: None,
            state: TransactionState::Pending,
            executed: 0,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Batches queued for [`TransactionSession::exec`], in submission order.
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    fn ensure_active(&self) -> RecordResult<()> {
        match self.state {
            TransactionState::Committed => Err(RecordError::transaction(
                "transaction has already been committed",
            )),
            TransactionState::RolledBack => Err(RecordError::transaction(
                "transaction has already been rolled back",
            )),
            _ => Ok(()),
        }
    }

    // ==================== batch mode ====================

    fn queue(
        &mut self,
        action: Action,
        schema: Arc<dyn Schema>,
        records: Vec<Record>,
    ) -> RecordResult<&mut Self> {
        self.ensure_active()?;
        let batch = Batch::new(schema, records).compile(action)?;
        self.batches.push(batch);
        Ok(self)
    }

    /// Compile `records` as inserts and queue them.
    pub fn insert(
        &mut self,
        schema: Arc<dyn Schema>,
        records: Vec<Record>,
    ) -> RecordResult<&mut Self> {
        self.queue(Action::Insert, schema, records)
    }

    /// Compile `records` as updates and queue them.
    pub fn update(
        &mut self,
        schema: Arc<dyn Schema>,
        records: Vec<Record>,
    ) -> RecordResult<&mut Self> {
        self.queue(Action::Update, schema, records)
    }

    /// Compile `records` as deletes and queue them.
    pub fn delete(
        &mut self,
        schema: Arc<dyn Schema>,
        records: Vec<Record>,
    ) -> RecordResult<&mut Self> {
        self.queue(Action::Delete, schema, records)
    }

    /// Queue an already compiled batch.
    pub fn push_batch(&mut self, batch: Batch) -> RecordResult<&mut Self> {
        self.ensure_active()?;
        batch.compiled_action()?;
        self.batches.push(batch);
        Ok(self)
    }

    /// Queue several compiled batches. Nothing is queued if any is uncompiled.
    pub fn push_batches(
        &mut self,
        batches: impl IntoIterator<Item = Batch>,
    ) -> RecordResult<&mut Self> {
        self.ensure_active()?;
        let batches: Vec<Batch> = batches.into_iter().collect();
        if batches.is_empty() {
            return Err(RecordError::transaction("no batches were supplied"));
        }
        for batch in &batches {
            batch.compiled_action()?;
        }
        self.batches.extend(batches);
        Ok(self)
    }

    /// Run every queued batch in one transaction and commit.
    ///
    /// Returns the total number of affected rows. On failure or timeout the
    /// transaction is rolled back and the session becomes terminal.
    pub async fn exec(&mut self, cross: bool) -> RecordResult<u64> {
        self.ensure_active()?;
        if self.open.is_some() {
            return Err(RecordError::transaction(
                "an incremental transaction is already open on this session",
            ));
        }
        if self.batches.is_empty() {
            return Err(RecordError::transaction("no batches to execute"));
        }
        for batch in &self.batches {
            batch::prepare(batch.compiled_action()?, batch.statements(), cross)?;
        }

        let timeout = self.source.transaction_timeout();
        let connect = tokio::time::timeout(timeout, self.source.connect(&self.database)).await;
        let client = match connect {
            Ok(Ok(client)) => client,
            Ok(Err(err)) => {
                self.state = TransactionState::RolledBack;
                return Err(err);
            }
            Err(_) => {
                self.state = TransactionState::RolledBack;
                return Err(RecordError::Timeout(timeout));
            }
        };

        let run = run_atomically(&client, &self.batches, cross);
        let outcome = tokio::time::timeout(timeout, run).await;
        match outcome {
            Ok(Ok(affected)) => {
                trace::committed(self.batches.iter().map(|b| b.statements().len()).sum());
                self.state = TransactionState::Committed;
                Ok(affected)
            }
            Ok(Err(err)) => {
                self.state = TransactionState::RolledBack;
                self.roll_back(client, &err.to_string()).await;
                Err(err)
            }
            Err(_) => {
                self.state = TransactionState::RolledBack;
                self.roll_back(client, "timeout").await;
                Err(RecordError::Timeout(timeout))
            }
        }
    }

    // ==================== incremental mode ====================

    async fn begin(&mut self) -> RecordResult<()> {
        if self.open.is_some() {
            return Ok(());
        }
        let client = self.source.connect(&self.database).await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| RecordError::transaction(format!("begin failed: {e}")))?;
        self.open = Some(client);
        self.state = TransactionState::Open;
        Ok(())
    }

    async fn run_open(&mut self, batch: &Batch, action: Action, cross: bool) -> RecordResult<u64> {
        self.begin().await?;
        let client = self
            .open
            .as_ref()
            .ok_or_else(|| RecordError::transaction("transaction is not open"))?;
        batch::run_statements(client, action, batch.table(), batch.statements(), cross).await
    }

    /// Run one compiled batch inside the session's transaction, opening it on first use.
    ///
    /// Nothing is committed until [`TransactionSession::commit`]. A failure rolls
    /// back every batch submitted so far.
    pub async fn exec_batch(&mut self, batch: &Batch, cross: bool) -> RecordResult<u64> {
        self.ensure_active()?;
        let action = batch.compiled_action()?;
        batch::prepare(action, batch.statements(), cross)?;

        let timeout = self.source.transaction_timeout();
        let outcome = tokio::time::timeout(timeout, self.run_open(batch, action, cross)).await;
        match outcome {
            Ok(Ok(affected)) => {
                self.executed += batch.statements().len();
                Ok(affected)
            }
            Ok(Err(err)) => {
                self.abort("statement failed").await;
                Err(err)
            }
            Err(_) => {
                self.abort("timeout").await;
                Err(RecordError::Timeout(timeout))
            }
        }
    }

    /// Commit the incremental transaction.
    pub async fn commit(&mut self) -> RecordResult<()> {
        self.ensure_active()?;
        let client = self
            .open
            .take()
            .ok_or_else(|| RecordError::transaction("no open transaction to commit"))?;

        let timeout = self.source.transaction_timeout();
        let result = match tokio::time::timeout(timeout, client.batch_execute("COMMIT")).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RecordError::transaction(format!("commit failed: {e}"))),
            Err(_) => Err(RecordError::Timeout(timeout)),
        };

        match result {
            Ok(()) => {
                trace::committed(self.executed);
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(err) => {
                // The connection's state is unknown; don't hand it back to the pool.
                self.source.discard(client);
                trace::rolled_back("commit failed");
                self.state = TransactionState::RolledBack;
                Err(err)
            }
        }
    }

    /// Roll back whatever was submitted. The session becomes terminal.
    pub async fn rollback(&mut self) -> RecordResult<()> {
        self.ensure_active()?;
        self.state = TransactionState::RolledBack;
        let Some(client) = self.open.take() else {
            return Ok(());
        };
        trace::rolled_back("requested");
        match client.batch_execute("ROLLBACK").await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.source.discard(client);
                Err(RecordError::transaction(format!("rollback failed: {e}")))
            }
        }
    }

    async fn abort(&mut self, reason: &str) {
        self.state = TransactionState::RolledBack;
        if let Some(client) = self.open.take() {
            self.roll_back(client, reason).await;
        }
    }

    // Best-effort ROLLBACK; a connection that does not answer promptly is discarded.
    async fn roll_back(&self, client: S::Connection, reason: &str) {
        trace::rolled_back(reason);
        let wait = Duration::from_secs(1).min(self.source.transaction_timeout());
        let rollback = tokio::time::timeout(wait, client.batch_execute("ROLLBACK")).await;
        if !matches!(rollback, Ok(Ok(()))) {
            self.source.discard(client);
        }
    }
}

impl<S: ConnectionSource> fmt::Debug for TransactionSession<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSession")
            .field("database", &self.database)
            .field("state", &self.state)
            .field("batches", &self.batches.len())
            .finish()
    }
}

impl<S: ConnectionSource> Drop for TransactionSession<'_, S> {
    fn drop(&mut self) {
        if let Some(client) = self.open.take() {
            trace::rolled_back("session dropped with an open transaction");
            self.source.discard(client);
        }
    }
}

// BEGIN, every batch in order, COMMIT. The caller rolls back on error.
async fn run_atomically(
    client: &impl TransactionClient,
    batches: &[Batch],
    cross: bool,
) -> RecordResult<u64> {
    client
        .batch_execute("BEGIN")
        .await
        .map_err(|e| RecordError::transaction(format!("begin failed: {e}")))?;

    let mut affected = 0;
    for batch in batches {
        let action = batch.compiled_action()?;
        affected +=
            batch::run_statements(client, action, batch.table(), batch.statements(), cross).await?;
    }

    client
        .batch_execute("COMMIT")
        .await
        .map_err(|e| RecordError::transaction(format!("commit failed: {e}")))?;
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::record;
    use crate::schema::{FieldDescriptor, TableSchema};
    use crate::test_support::RecordingClient;

    // Hands out clones of one recording client.
    struct Recorded {
        client: RecordingClient,
        timeout: Duration,
    }

    impl Recorded {
        fn new(client: RecordingClient) -> Self {
            Self {
                client,
                timeout: Duration::from_secs(5),
            }
        }
    }

    impl ConnectionSource for Recorded {
        type Connection = RecordingClient;

        async fn connect(&self, _database: &str) -> RecordResult<RecordingClient> {
            Ok(self.client.clone())
        }

        fn transaction_timeout(&self) -> Duration {
            self.timeout
        }
    }

    fn insert_batch(id: &str) -> Batch {
        Batch::new(users(), vec![record! { "id" => id }]).insert().unwrap()
    }

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

    fn provider() -> ConnectionProvider {
        ConnectionProvider::new(ConnectionConfig::default())
    }

    #[test]
    fn queued_batches_keep_submission_order() {
        let provider = provider();
        let mut tx = provider.transaction("app");
        tx.insert(users(), vec![record! { "id" => "u1" }])
            .unwrap()
            .delete(users(), vec![record! { "id" => "u2" }])
            .unwrap();

        let actions: Vec<_> = tx.batches().iter().map(|b| b.action()).collect();
        assert_eq!(actions, vec![Some(Action::Insert), Some(Action::Delete)]);
        assert_eq!(tx.state(), TransactionState::Pending);
    }

    #[test]
    fn invalid_records_are_not_queued() {
        let provider = provider();
        let mut tx = provider.transaction("app");
        assert!(tx.insert(users(), vec![record! { "credits" => 1 }]).is_err());
        assert!(tx.batches().is_empty());
    }

    #[test]
    fn debug_shows_database_state_and_batch_count() {
        let provider = provider();
        let mut tx = provider.transaction("app");
        tx.push_batch(insert_batch("u1")).unwrap();
        assert_eq!(
            format!("{tx:?}"),
            "TransactionSession { database: \"app\", state: Pending, batches: 1 }"
        );
    }

    #[test]
    fn uncompiled_batch_is_rejected() {
        let provider = provider();
        let mut tx = provider.transaction("app");
        let err = tx
            .push_batch(Batch::new(users(), vec![record! { "id" => "u1" }]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Compilation error: records for table users have not been compiled"
        );
    }

    #[test]
    fn push_batches_requires_at_least_one() {
        let provider = provider();
        let mut tx = provider.transaction("app");
        assert!(tx.push_batches(Vec::new()).is_err());

        let compiled = Batch::new(users(), vec![record! { "id" => "u1" }])
            .insert()
            .unwrap();
        let raw = Batch::new(users(), vec![record! { "id" => "u2" }]);
        assert!(tx.push_batches(vec![compiled.clone(), raw]).is_err());
        assert!(tx.batches().is_empty());

        tx.push_batches(vec![compiled]).unwrap();
        assert_eq!(tx.batches().len(), 1);
    }

    #[tokio::test]
    async fn exec_without_batches_fails_before_connecting() {
        let provider = provider();
        let mut tx = provider.transaction("app");
        let err = tx.exec(false).await.unwrap_err();
        assert_eq!(err.to_string(), "Transaction error: no batches to execute");
    }

    #[tokio::test]
    async fn markers_without_cross_fail_before_connecting() {
        let provider = provider();
        let mut tx = provider.transaction("app");
        tx.update(
            users(),
            vec![record! { "credits" => 1, "where" => record! { "id" => "u1" } }],
        )
        .unwrap();
        let err = tx.exec(false).await.unwrap_err();
        assert!(matches!(err, RecordError::Compilation(_)));
        assert_eq!(tx.state(), TransactionState::Pending);
    }

    #[tokio::test]
    async fn commit_requires_an_open_transaction() {
        let provider = provider();
        let mut tx = provider.transaction("app");
        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.to_string(), "Transaction error: no open transaction to commit");
    }

    #[tokio::test]
    async fn rollback_is_terminal() {
        let provider = provider();
        let mut tx = provider.transaction("app");
        tx.rollback().await.unwrap();
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert!(tx.insert(users(), vec![record! { "id" => "u1" }]).is_err());
    }

    // ==================== execution ====================

    #[tokio::test]
    async fn batch_mode_commits_every_batch_in_order() {
        let source = Recorded::new(RecordingClient::default());
        let mut tx = TransactionSession::new(&source, "app");
        tx.push_batches(vec![insert_batch("u1"), insert_batch("u2")]).unwrap();

        assert_eq!(tx.exec(false).await.unwrap(), 2);
        assert_eq!(tx.state(), TransactionState::Committed);
        let insert = "INSERT INTO users (id) VALUES($1)".to_string();
        assert_eq!(
            source.client.executed(),
            vec!["BEGIN".to_string(), insert.clone(), insert, "COMMIT".to_string()]
        );
    }

    #[tokio::test]
    async fn failing_batch_rolls_back_without_commit() {
        let duplicate = RecordError::UniqueViolation("users_pkey: duplicate key".into());
        let source = Recorded::new(RecordingClient::failing_with(1, duplicate));
        let mut tx = TransactionSession::new(&source, "app");
        tx.push_batches(vec![insert_batch("u1"), insert_batch("u1")]).unwrap();

        let err = tx.exec(false).await.unwrap_err();
        assert!(matches!(err, RecordError::Execution { .. }));
        assert!(err.is_unique_violation());
        assert_eq!(tx.state(), TransactionState::RolledBack);

        let executed = source.client.executed();
        assert_eq!(executed.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(executed.last().map(String::as_str), Some("ROLLBACK"));
        assert!(!executed.iter().any(|sql| sql == "COMMIT"));
        assert!(tx.exec(false).await.is_err());
    }

    #[tokio::test]
    async fn slow_batch_times_out_and_rolls_back() {
        let mut source = Recorded::new(RecordingClient::stalling(Duration::from_secs(30)));
        source.timeout = Duration::from_millis(20);
        let mut tx = TransactionSession::new(&source, "app");
        tx.push_batch(insert_batch("u1")).unwrap();

        let err = tx.exec(false).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(source.client.executed().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[tokio::test]
    async fn incremental_failure_rolls_back_earlier_batches() {
        let source = Recorded::new(RecordingClient::failing_at(1));
        let mut tx = TransactionSession::new(&source, "app");

        tx.exec_batch(&insert_batch("u1"), false).await.unwrap();
        assert_eq!(tx.state(), TransactionState::Open);
        assert!(tx.exec_batch(&insert_batch("u2"), false).await.is_err());
        assert_eq!(tx.state(), TransactionState::RolledBack);

        let executed = source.client.executed();
        assert_eq!(executed.len(), 4);
        assert_eq!(executed[0], "BEGIN");
        assert_eq!(executed[3], "ROLLBACK");
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn incremental_commit_runs_once() {
        let source = Recorded::new(RecordingClient::default());
        let mut tx = TransactionSession::new(&source, "app");
        tx.exec_batch(&insert_batch("u1"), false).await.unwrap();
        tx.exec_batch(&insert_batch("u2"), false).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(tx.state(), TransactionState::Committed);
        let executed = source.client.executed();
        assert_eq!(executed.iter().filter(|sql| *sql == "BEGIN").count(), 1);
        assert_eq!(executed.last().map(String::as_str), Some("COMMIT"));
    }

    #[tokio::test]
    async fn explicit_rollback_closes_the_open_transaction() {
        let source = Recorded::new(RecordingClient::default());
        let mut tx = TransactionSession::new(&source, "app");
        tx.exec_batch(&insert_batch("u1"), false).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(source.client.executed().last().map(String::as_str), Some("ROLLBACK"));
    }
}
