//! Generic client trait for unified database access.

use crate::error::{RecordError, RecordResult};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// A trait that unifies database clients and transactions.
///
/// Statement execution is written once against this trait and runs unchanged
/// on a pooled connection (single-batch mode) or inside a transaction.
pub trait GenericClient: Send + Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = RecordResult<Vec<Row>>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = RecordResult<u64>> + Send;

    /// Execute a query and return the first row, if any.
    fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = RecordResult<Option<Row>>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            Ok(rows.into_iter().next())
        }
    }
}

/// A connection that can also run transaction control statements.
///
/// Implemented by connections (not transactions): [`crate::TransactionSession`]
/// issues `BEGIN`, `COMMIT` and `ROLLBACK` through it.
pub trait TransactionClient: GenericClient {
    /// Execute one or more statements without parameters or results.
    fn batch_execute(
        &self,
        sql: &str,
    ) -> impl std::future::Future<Output = RecordResult<()>> + Send;
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<Vec<Row>> {
        tokio_postgres::Client::query(self, sql, params)
            .await
            .map_err(RecordError::from_db_error)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<u64> {
        tokio_postgres::Client::execute(self, sql, params)
            .await
            .map_err(RecordError::from_db_error)
    }
}

impl TransactionClient for tokio_postgres::Client {
    async fn batch_execute(&self, sql: &str) -> RecordResult<()> {
        tokio_postgres::Client::batch_execute(self, sql)
            .await
            .map_err(RecordError::from_db_error)
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<Vec<Row>> {
        tokio_postgres::Transaction::query(self, sql, params)
            .await
            .map_err(RecordError::from_db_error)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<u64> {
        tokio_postgres::Transaction::execute(self, sql, params)
            .await
            .map_err(RecordError::from_db_error)
    }
}

// ===== deadpool-postgres support =====

impl GenericClient for deadpool_postgres::ClientWrapper {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<Vec<Row>> {
        GenericClient::query(&**self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }
}

impl TransactionClient for deadpool_postgres::ClientWrapper {
    async fn batch_execute(&self, sql: &str) -> RecordResult<()> {
        TransactionClient::batch_execute(&**self, sql).await
    }
}

impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<Vec<Row>> {
        // Delegate to the deref target (ClientWrapper / tokio_postgres::Client).
        GenericClient::query(&**self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }
}

impl TransactionClient for deadpool_postgres::Client {
    async fn batch_execute(&self, sql: &str) -> RecordResult<()> {
        TransactionClient::batch_execute(&**self, sql).await
    }
}

impl GenericClient for deadpool_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<Vec<Row>> {
        GenericClient::query(&**self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }
}
