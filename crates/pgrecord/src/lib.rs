//! # pgrecord
//!
//! Schema-driven record writes and parameterized reads for PostgreSQL.
//!
//! ## Features
//!
//! - **Schema-first validation**: each table declares its columns once as
//!   [`FieldDescriptor`]s; incoming records are coerced to the declared types and
//!   checked (length, bounds, case, regex, hashing) before any SQL is produced
//! - **Parameterized DML**: INSERT / UPDATE / DELETE text with `$N` placeholders,
//!   values always bound, never interpolated
//! - **Additive updates**: `sum`/`subtract`/`multiply`/`divide` fields become
//!   `col=col+$N` assignments in cross mode
//! - **Transactions**: several batches commit or roll back together, either all
//!   at once under a timeout or incrementally on a held connection
//! - **Query builder**: SELECT with joins, grouping, ordering, limits and
//!   `IN`/`BETWEEN` filters that expand to one placeholder per value
//!
//! ## Writing records
//!
//! ```ignore
//! use pgrecord::{
//!     Batch, ConnectionConfig, ConnectionProvider, FieldDescriptor, TableSchema, record,
//! };
//! use std::sync::Arc;
//!
//! let accounts = Arc::new(TableSchema::new(
//!     "accounts",
//!     vec![
//!         FieldDescriptor::string("id").primary_key().required(),
//!         FieldDescriptor::string("email").required().lowercase().updatable(),
//!         FieldDescriptor::float("balance").updatable().sum(),
//!     ],
//! )?);
//!
//! let provider = ConnectionProvider::new(ConnectionConfig::from_env()?);
//!
//! Batch::new(accounts.clone(), vec![record! { "id" => "a1", "email" => "Ana@Example.com" }])
//!     .insert()?
//!     .exec(&provider, "billing", false)
//!     .await?;
//!
//! let mut tx = provider.transaction("billing");
//! tx.update(accounts, vec![record! { "balance" => 10.0, "where" => record! { "id" => "a1" } }])?;
//! tx.exec(true).await?;
//! ```
//!
//! ## Reading rows
//!
//! ```ignore
//! use pgrecord::{FilterOp, Query};
//!
//! let rows = Query::new("accounts")
//!     .select(&["id", "balance"])
//!     .filter("id", FilterOp::In, vec!["a1", "a2"])
//!     .order_by(&["id"])
//!     .fetch(&provider, "billing")
//!     .await?
//!     .all();
//! ```

pub mod batch;
pub mod client;
pub mod compile;
pub mod config;
pub mod cross;
pub mod crypto;
pub mod error;
pub mod pool;
pub mod query;
pub mod schema;
pub mod transaction;
pub mod validate;
pub mod value;

mod trace;

#[cfg(test)]
mod test_support;

pub use batch::Batch;
pub use client::{GenericClient, TransactionClient};
pub use compile::{Action, CompiledStatement, compile};
pub use config::ConnectionConfig;
pub use crypto::{CryptoError, FieldCrypto, Sha256Digest};
pub use error::{ConnectionError, FilterError, RecordError, RecordResult};
pub use pool::{ConnectionProvider, Session};
pub use query::{FilterOp, JoinKind, Query, ResultRow, Rows};
pub use schema::{
    Arithmetic, Case, Constraints, DefaultValue, FieldDescriptor, FieldType, FloatRules, IntRules,
    Schema, StringRules, TableSchema, UintRules,
};
pub use transaction::{ConnectionSource, TransactionSession, TransactionState};
pub use validate::{
    FieldError, FieldValue, ValidatedRecord, ValidationCode, ValidationErrors, coerce,
};
pub use value::{Record, Value};
