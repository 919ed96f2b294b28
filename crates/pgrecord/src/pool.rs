//! Connection provider: one lazily created pool per database.

use crate::client::GenericClient;
use crate::config::ConnectionConfig;
use crate::error::{RecordError, RecordResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row, Socket};

type MakeManager = dyn Fn(tokio_postgres::Config) -> Manager + Send + Sync;

/// Hands out pooled connections by database name.
///
/// The first request for a database builds its pool and verifies it with a
/// `SELECT 1`, so a missing database surfaces as
/// [`crate::ConnectionError::DatabaseNotFound`] immediately.
///
/// # Example
///
/// ```ignore
/// let provider = ConnectionProvider::new(ConnectionConfig::from_env()?);
/// let client = provider.acquire("billing").await?;
/// ```
pub struct ConnectionProvider {
    config: ConnectionConfig,
    pools: Mutex<HashMap<String, Pool>>,
    make_manager: Arc<MakeManager>,
}

fn default_manager_config() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    }
}

impl ConnectionProvider {
    /// Provider using plain connections.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_tls(config, NoTls)
    }

    /// Provider using a custom TLS connector.
    pub fn with_tls<T>(config: ConnectionConfig, tls: T) -> Self
    where
        T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
        T::Stream: Sync + Send,
        T::TlsConnect: Sync + Send,
        <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
    {
        Self {
            config,
            pools: Mutex::new(HashMap::new()),
            make_manager: Arc::new(move |pg_config| {
                Manager::from_config(pg_config, tls.clone(), default_manager_config())
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn cached(&self, database: &str) -> Option<Pool> {
        self.pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(database)
            .cloned()
    }

    /// Pool for `database`, created and pinged on first use.
    pub async fn pool(&self, database: &str) -> RecordResult<Pool> {
        if let Some(pool) = self.cached(database) {
            return Ok(pool);
        }

        let manager = (self.make_manager)(self.config.pg_config(database));
        let pool = Pool::builder(manager)
            .max_size(self.config.pool_max_size)
            .build()
            .map_err(|e| RecordError::Pool(e.to_string()))?;

        let client = self.get(&pool, database).await?;
        client
            .batch_execute("SELECT 1")
            .await
            .map_err(|e| RecordError::from_connect_error(database, &e))?;
        drop(client);

        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have raced us here; keep the first pool.
        Ok(pools.entry(database.to_string()).or_insert(pool).clone())
    }

    async fn get(&self, pool: &Pool, database: &str) -> RecordResult<deadpool_postgres::Client> {
        let timeout = self.config.acquire_timeout;
        match tokio::time::timeout(timeout, pool.get()).await {
            Ok(client) => client.map_err(|e| RecordError::from_pool_error(database, e)),
            Err(_) => Err(RecordError::Timeout(timeout)),
        }
    }

    /// Pooled connection for `database`, returned to the pool on drop.
    pub async fn acquire(&self, database: &str) -> RecordResult<deadpool_postgres::Client> {
        let pool = self.pool(database).await?;
        self.get(&pool, database).await
    }

    /// Pooled connection for the configured master database.
    pub async fn acquire_master(&self) -> RecordResult<deadpool_postgres::Client> {
        self.acquire(&self.config.master_database).await
    }

    /// A connection held open across several queries.
    pub async fn session(&self, database: &str) -> RecordResult<Session> {
        Ok(Session {
            database: database.to_string(),
            client: self.acquire(database).await?,
        })
    }

    pub async fn master_session(&self) -> RecordResult<Session> {
        self.session(&self.config.master_database).await
    }

    /// Close and forget the pool for `database`. Returns whether one existed.
    pub fn close(&self, database: &str) -> bool {
        let removed = self
            .pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(database);
        match removed {
            Some(pool) => {
                pool.close();
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self) {
        let pools: Vec<Pool> = self
            .pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, pool)| pool)
            .collect();
        for pool in pools {
            pool.close();
        }
    }

    /// Databases with an open pool.
    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field("host", &self.config.host)
            .field("databases", &self.databases())
            .finish()
    }
}

/// A pooled connection kept across calls; released when dropped.
pub struct Session {
    database: String,
    client: deadpool_postgres::Client,
}

impl Session {
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn client(&self) -> &deadpool_postgres::Client {
        &self.client
    }

    pub fn into_client(self) -> deadpool_postgres::Client {
        self.client
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl GenericClient for Session {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<Vec<Row>> {
        GenericClient::query(&self.client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> RecordResult<u64> {
        GenericClient::execute(&self.client, sql, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_starts_without_pools() {
        let provider = ConnectionProvider::new(ConnectionConfig::default());
        assert!(provider.databases().is_empty());
        assert!(!provider.close("missing"));
        provider.close_all();
    }
}
