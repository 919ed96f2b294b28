//! Query builder example for pgrecord
//!
//! Run with: cargo run --example query_rows -p pgrecord
//!
//! Connection settings come from `ENV_DDBB_*` variables (or a `.env` file).
//! Queries run against the configured master database using catalog views,
//! so no tables need to exist.

use pgrecord::{ConnectionConfig, ConnectionProvider, FilterOp, JoinKind, Query, RecordError, Value};

#[tokio::main]
async fn main() -> Result<(), RecordError> {
    let provider = ConnectionProvider::new(ConnectionConfig::from_env()?);

    // ============================================
    // Filters with set and range operators
    // ============================================
    let tables = Query::new("pg_tables")
        .select(&["schemaname", "tablename"])
        .filter("schemaname", FilterOp::In, vec!["pg_catalog", "information_schema"])
        .and("tablename", FilterOp::Like, "pg_%")
        .order_by(&["tablename"])
        .limit(5);
    println!("{tables}");
    for row in tables.fetch_master(&provider).await? {
        println!("  {:?}", row.get("tablename"));
    }

    // ============================================
    // Joins and grouping
    // ============================================
    let per_schema = Query::new("pg_class c")
        .select(&["n.nspname", "count(*) AS relations"])
        .join(JoinKind::Inner, "pg_namespace n", "n.oid = c.relnamespace")
        .filter("c.relpages", FilterOp::Between, vec![0, 1000])
        .group_by(&["n.nspname"])
        .order_by(&["relations DESC"])
        .limit_offset(3, 0);
    println!("\n{per_schema}");
    for row in per_schema.fetch_master(&provider).await?.all() {
        println!("  {:?}", row.into_record());
    }

    // ============================================
    // Malformed filters are reported when the query runs
    // ============================================
    let broken = Query::new("pg_class").filter("oid", FilterOp::In, Value::from(1));
    if let Err(err) = broken.fetch_master(&provider).await {
        println!("\n{err}");
    }

    // ============================================
    // Keep one connection across several queries
    // ============================================
    let session = provider.master_session().await?;
    let version = Query::raw("SELECT version() AS version", vec![])
        .fetch_in(&session)
        .await?;
    println!("\nserver: {:?}", version.text("version"));
    let now = Query::raw("SELECT now()::timestamp AS now", vec![])
        .fetch_in(&session)
        .await?
        .one();
    println!("now: {:?}", now.get("now"));

    Ok(())
}
