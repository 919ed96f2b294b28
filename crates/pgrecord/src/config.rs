//! Connection settings.

use crate::error::{RecordError, RecordResult};
use serde::Deserialize;
use std::time::Duration;
use tokio_postgres::config::SslMode;

/// Settings shared by every pool the provider creates.
///
/// Database names are supplied per call; `master_database` is the target for
/// administrative queries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub master_database: String,
    /// Require TLS.
    pub ssl: bool,
    pub application_name: String,
    pub pool_max_size: usize,
    /// Bound on waiting for a pooled connection.
    pub acquire_timeout: Duration,
    /// Bound on a whole batch-mode transaction, acquisition included.
    pub transaction_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            master_database: "postgres".to_string(),
            ssl: false,
            application_name: "pgrecord".to_string(),
            pool_max_size: 16,
            acquire_timeout: Duration::from_secs(5),
            transaction_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `ENV_DDBB_*` variables, reading a `.env` file first if present.
    ///
    /// ```text
    /// ENV_DDBB_SERVER    host
    /// ENV_DDBB_PORT      port
    /// ENV_DDBB_USER      user
    /// ENV_DDBB_PASSWORD  password
    /// ENV_DDBB_DATABASE  master database
    /// ENV_DDBB_SSL       "true" requires TLS
    /// ENV_DDBB_APP       application name
    /// ```
    pub fn from_env() -> RecordResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ConnectionConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RecordResult<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(host) = get("ENV_DDBB_SERVER") {
            config.host = host;
        }
        if let Some(port) = get("ENV_DDBB_PORT") {
            config.port = port.trim().parse().map_err(|_| {
                RecordError::Config(format!("ENV_DDBB_PORT is not a port: '{port}'"))
            })?;
        }
        if let Some(user) = get("ENV_DDBB_USER") {
            config.user = user;
        }
        if let Some(password) = lookup("ENV_DDBB_PASSWORD") {
            config.password = password;
        }
        if let Some(database) = get("ENV_DDBB_DATABASE") {
            config.master_database = database;
        }
        config.ssl = get("ENV_DDBB_SSL").is_some_and(|v| v.trim() == "true");
        if let Some(app) = get("ENV_DDBB_APP") {
            config.application_name = app;
        }
        Ok(config)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn master_database(mut self, database: impl Into<String>) -> Self {
        self.master_database = database.into();
        self
    }

    pub fn ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    pub fn pool_max_size(mut self, size: usize) -> Self {
        self.pool_max_size = size;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    /// Driver configuration for one database.
    pub fn pg_config(&self, database: &str) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(database)
            .application_name(&self.application_name)
            .connect_timeout(self.acquire_timeout)
            .ssl_mode(if self.ssl {
                SslMode::Require
            } else {
                SslMode::Disable
            });
        if !self.password.is_empty() {
            cfg.password(&self.password);
        }
        cfg
    }
}
