//! In-memory client that records executed SQL.

use crate::client::{GenericClient, TransactionClient};
use crate::error::{RecordError, RecordResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

#[derive(Debug, Default)]
struct Log {
    sql: Vec<String>,
    // `execute` calls so far; transaction control statements are not counted.
    statements: usize,
    failure: Option<RecordError>,
}

/// Clones share one log, so a test can keep a handle to a client it gave away.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingClient {
    log: Arc<Mutex<Log>>,
    fail_at: Option<usize>,
    delay: Option<Duration>,
}

impl RecordingClient {
    /// Fails the `execute` call with this zero-based index (after recording it).
    pub(crate) fn failing_at(index: usize) -> Self {
        Self::failing_with(index, RecordError::Pool("injected failure".into()))
    }

    /// Like [`RecordingClient::failing_at`], returning `err`.
    pub(crate) fn failing_with(index: usize, err: RecordError) -> Self {
        let client = Self {
            fail_at: Some(index),
            ..Self::default()
        };
        client.log.lock().unwrap().failure = Some(err);
        client
    }

    /// Every `execute` call sleeps for `delay` before answering.
    pub(crate) fn stalling(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// All SQL seen so far, transaction control included.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.log.lock().unwrap().sql.clone()
    }
}

impl GenericClient for RecordingClient {
    async fn query(&self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> RecordResult<Vec<Row>> {
        self.log.lock().unwrap().sql.push(sql.to_string());
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> RecordResult<u64> {
        let failure = {
            let mut log = self.log.lock().unwrap();
            log.sql.push(sql.to_string());
            let index = log.statements;
            log.statements += 1;
            if self.fail_at == Some(index) {
                Some(
                    log.failure
                        .take()
                        .unwrap_or_else(|| RecordError::Pool("injected failure".into())),
                )
            } else {
                None
            }
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(1),
        }
    }
}

impl TransactionClient for RecordingClient {
    async fn batch_execute(&self, sql: &str) -> RecordResult<()> {
        self.log.lock().unwrap().sql.push(sql.to_string());
        Ok(())
    }
}
