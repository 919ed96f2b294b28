//! `tracing` events for statement execution and transaction outcomes.
//!
//! All events use the `pgrecord.sql` target. Without the `tracing` feature the
//! helpers compile to nothing.

/// SQL longer than this is cut on a char boundary before logging.
pub(crate) const MAX_SQL_LENGTH: usize = 200;

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

#[cfg(feature = "tracing")]
fn display_sql(sql: &str) -> String {
    if sql.len() > MAX_SQL_LENGTH {
        format!("{}...", truncate_sql_bytes(sql, MAX_SQL_LENGTH))
    } else {
        sql.to_string()
    }
}

/// Emitted before a statement runs.
#[allow(unused_variables)]
pub(crate) fn statement(kind: &str, table: &str, sql: &str, param_count: usize) {
    #[cfg(feature = "tracing")]
    tracing::debug!(
        target: "pgrecord.sql",
        kind,
        table,
        param_count,
        sql = %display_sql(sql),
    );
}

#[allow(unused_variables)]
pub(crate) fn committed(statements: usize) {
    #[cfg(feature = "tracing")]
    tracing::info!(target: "pgrecord.sql", statements, "transaction committed");
}

#[allow(unused_variables)]
pub(crate) fn rolled_back(reason: &str) {
    #[cfg(feature = "tracing")]
    tracing::warn!(target: "pgrecord.sql", reason, "transaction rolled back");
}
