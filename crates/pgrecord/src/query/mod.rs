//! SELECT builder with positional filter arguments.
//!
//! Clauses accumulate without touching the database. [`Query::filter`] starts
//! a new WHERE and restarts placeholder numbering at `$1`; [`Query::and`] and
//! [`Query::or`] extend it and are ignored until a WHERE exists. Set and range
//! operators expand to one placeholder per bound value:
//!
//! ```ignore
//! let rows = Query::new("orders")
//!     .select(&["id", "total"])
//!     .filter("status", FilterOp::In, vec!["open", "held"])
//!     .and("total", FilterOp::Between, vec![10, 100])
//!     .order_by(&["id"])
//!     .limit(20)
//!     .fetch(&provider, "shop")
//!     .await?;
//! // SELECT id, total FROM orders WHERE status IN ($1,$2) AND total BETWEEN $3 AND $4
//! //   ORDER BY id LIMIT 20
//! ```
//!
//! A malformed filter argument is stored and returned when the query runs.

mod filter;
mod rows;

#[cfg(test)]
mod tests;

pub use filter::FilterOp;
pub use rows::{ResultRow, Rows};

use crate::client::GenericClient;
use crate::error::{FilterError, RecordResult};
use crate::pool::ConnectionProvider;
use crate::trace;
use crate::value::Value;
use std::fmt;
use tokio_postgres::types::ToSql;

/// Join flavour for [`Query::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Limit {
    Count(u64),
    Page { limit: u64, offset: u64 },
}

/// Fluent SELECT builder. Each call consumes and returns the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: String,
    columns: Vec<String>,
    joins: Vec<String>,
    where_clause: Option<String>,
    group_by: Option<String>,
    order_by: Option<String>,
    limit: Option<Limit>,
    args: Vec<Value>,
    /// Literal statement that replaces every composed clause.
    raw: Option<(String, Vec<Value>)>,
    error: Option<FilterError>,
}

impl Query {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            where_clause: None,
            group_by: None,
            order_by: None,
            limit: None,
            args: Vec::new(),
            raw: None,
            error: None,
        }
    }

    /// Use `sql` verbatim with its own arguments, ignoring composed clauses.
    pub fn raw(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new("").with_raw(sql, args)
    }

    pub fn with_raw(mut self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        self.raw = Some((sql.into(), args));
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Column list; empty selects `*`.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn join(mut self, kind: JoinKind, table: &str, on: &str) -> Self {
        self.joins.push(format!("{} {} ON {}", kind.as_str(), table, on));
        self
    }

    /// Replace the WHERE clause and restart argument numbering.
    pub fn filter(mut self, column: &str, op: FilterOp, arg: impl Into<Value>) -> Self {
        let mut args = Vec::new();
        match filter::render(column, op, arg.into(), &mut args) {
            Ok(term) => {
                self.where_clause = Some(term);
                self.args = args;
            }
            Err(e) => self.record_error(e),
        }
        self
    }

    /// Append `AND <term>`. No-op without a WHERE.
    pub fn and(self, column: &str, op: FilterOp, arg: impl Into<Value>) -> Self {
        self.extend_where("AND", column, op, arg.into())
    }

    /// Append `OR <term>`. No-op without a WHERE.
    pub fn or(self, column: &str, op: FilterOp, arg: impl Into<Value>) -> Self {
        self.extend_where("OR", column, op, arg.into())
    }

    fn extend_where(mut self, connective: &str, column: &str, op: FilterOp, arg: Value) -> Self {
        if self.where_clause.is_none() {
            return self;
        }
        match filter::render(column, op, arg, &mut self.args) {
            Ok(term) => {
                if let Some(clause) = self.where_clause.as_mut() {
                    clause.push(' ');
                    clause.push_str(connective);
                    clause.push(' ');
                    clause.push_str(&term);
                }
            }
            Err(e) => self.record_error(e),
        }
        self
    }

    fn record_error(&mut self, err: FilterError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// GROUP BY columns; an empty list leaves the clause unchanged.
    pub fn group_by(mut self, columns: &[&str]) -> Self {
        if !columns.is_empty() {
            self.group_by = Some(columns.join(","));
        }
        self
    }

    pub fn order_by(mut self, columns: &[&str]) -> Self {
        self.order_by = Some(columns.join(","));
        self
    }

    /// `LIMIT n`. Overrides any earlier limit or top.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(Limit::Count(n));
        self
    }

    /// `LIMIT n OFFSET offset`.
    pub fn limit_offset(mut self, n: u64, offset: u64) -> Self {
        self.limit = Some(Limit::Page { limit: n, offset });
        self
    }

    /// `LIMIT 1`.
    pub fn limit_one(self) -> Self {
        self.limit(1)
    }

    /// Same as [`Query::limit`].
    pub fn top(self, n: u64) -> Self {
        self.limit(n)
    }

    /// Drop every clause, argument and stored error. The table is kept.
    pub fn reset(self) -> Self {
        Self::new(self.table)
    }

    /// First malformed filter argument, if any.
    pub fn error(&self) -> Option<&FilterError> {
        self.error.as_ref()
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    /// Bound arguments, in placeholder order.
    pub fn args(&self) -> &[Value] {
        match &self.raw {
            Some((_, args)) => args,
            None => &self.args,
        }
    }

    fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.args()
            .iter()
            .map(|v| v as &(dyn ToSql + Sync))
            .collect()
    }

    /// The statement text that would be sent.
    pub fn to_sql(&self) -> String {
        if let Some((sql, _)) = &self.raw {
            return sql.clone();
        }

        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, self.table);

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if let Some(clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        if let Some(group) = &self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group);
        }
        if let Some(order) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        match self.limit {
            Some(Limit::Count(n)) => sql.push_str(&format!(" LIMIT {n}")),
            Some(Limit::Page { limit, offset }) => {
                sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"))
            }
            None => {}
        }
        sql
    }

    fn validate(&self) -> RecordResult<()> {
        if let Some(err) = &self.error {
            return Err(err.clone().into());
        }
        Ok(())
    }

    fn trace_kind(&self) -> &'static str {
        if self.is_raw() { "RAW" } else { "SELECT" }
    }

    // ==================== Execution ====================

    /// Run on a connection to `database` that is released before returning.
    pub async fn fetch(&self, provider: &ConnectionProvider, database: &str) -> RecordResult<Rows> {
        self.validate()?;
        let client = provider.acquire(database).await?;
        self.fetch_in(&client).await
    }

    /// Run against the configured master database.
    pub async fn fetch_master(&self, provider: &ConnectionProvider) -> RecordResult<Rows> {
        self.validate()?;
        let client = provider.acquire_master().await?;
        self.fetch_in(&client).await
    }

    /// Run on a caller-held connection such as a [`crate::Session`]; it stays open.
    pub async fn fetch_in(&self, client: &impl GenericClient) -> RecordResult<Rows> {
        self.validate()?;
        let sql = self.to_sql();
        trace::statement(self.trace_kind(), &self.table, &sql, self.args().len());
        let rows = client.query(&sql, &self.params()).await?;
        Rows::from_driver(&rows)
    }

    /// Run a statement without result rows (e.g. `CALL proc($1)`), returning
    /// the affected row count.
    pub async fn execute(
        &self,
        provider: &ConnectionProvider,
        database: &str,
    ) -> RecordResult<u64> {
        self.validate()?;
        let client = provider.acquire(database).await?;
        self.execute_in(&client).await
    }

    pub async fn execute_master(&self, provider: &ConnectionProvider) -> RecordResult<u64> {
        self.validate()?;
        let client = provider.acquire_master().await?;
        self.execute_in(&client).await
    }

    pub async fn execute_in(&self, client: &impl GenericClient) -> RecordResult<u64> {
        self.validate()?;
        let sql = self.to_sql();
        trace::statement(self.trace_kind(), &self.table, &sql, self.args().len());
        client.execute(&sql, &self.params()).await
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}
