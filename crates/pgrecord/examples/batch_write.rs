//! Schema-validated writes for pgrecord
//!
//! Run with: cargo run --example batch_write -p pgrecord
//!
//! Connection settings come from `ENV_DDBB_*` variables (or a `.env` file);
//! the target database from `PGRECORD_DATABASE` (default `postgres`).
//!
//! Demonstrates a single-batch insert, an additive update in cross mode and a
//! transaction that rolls back when one of its batches fails.

use pgrecord::{
    Batch, ConnectionConfig, ConnectionProvider, FieldDescriptor, FieldType, Query, RecordError,
    Schema, TableSchema, record,
};
use std::sync::Arc;

fn accounts() -> Result<Arc<dyn Schema>, RecordError> {
    Ok(Arc::new(TableSchema::new(
        "pgrecord_accounts",
        vec![
            FieldDescriptor::from_tags("id", FieldType::String, "primaryKey,required", "")?,
            FieldDescriptor::from_tags(
                "email",
                FieldType::String,
                "required,update,where",
                "case=lowercase",
            )?,
            FieldDescriptor::from_tags("balance", FieldType::Float, "update,sum", "")?,
            FieldDescriptor::from_tags("atcreate", FieldType::Timestamp, "default", "")?,
        ],
    )?))
}

#[tokio::main]
async fn main() -> Result<(), RecordError> {
    let database = std::env::var("PGRECORD_DATABASE").unwrap_or_else(|_| "postgres".into());
    let provider = ConnectionProvider::new(ConnectionConfig::from_env()?);
    let schema = accounts()?;

    Query::raw(
        "CREATE TABLE IF NOT EXISTS pgrecord_accounts (
            id text PRIMARY KEY,
            email text NOT NULL,
            balance double precision NOT NULL DEFAULT 0,
            atcreate timestamp NOT NULL
        )",
        vec![],
    )
    .execute(&provider, &database)
    .await?;
    Query::raw("TRUNCATE pgrecord_accounts", vec![])
        .execute(&provider, &database)
        .await?;

    // ============================================
    // Validation happens before any SQL is sent
    // ============================================
    println!("=== Validation ===");
    let rejected = Batch::new(schema.clone(), vec![record! { "id" => "a1" }]).insert();
    if let Err(err) = rejected {
        println!("{err}");
    }

    // ============================================
    // Single batch insert
    // ============================================
    println!("\n=== Insert ===");
    let batch = Batch::new(
        schema.clone(),
        vec![
            record! { "id" => "a1", "email" => "Alice@Example.com", "balance" => 100.0 },
            record! { "id" => "a2", "email" => "BOB@example.com", "balance" => 50 },
        ],
    )
    .insert()?;
    for stmt in batch.statements() {
        println!("{stmt}");
    }
    let inserted = batch.exec(&provider, &database, false).await?;
    println!("inserted {inserted} rows");

    // ============================================
    // Additive update (cross mode)
    // ============================================
    println!("\n=== Cross update ===");
    let top_up = Batch::new(
        schema.clone(),
        vec![record! { "balance" => 25, "where" => record! { "id" => "a1" } }],
    )
    .update()?;
    println!("compiled: {}", top_up.statements()[0]);
    top_up.exec(&provider, &database, true).await?;

    // ============================================
    // Transaction: the duplicate insert rolls everything back
    // ============================================
    println!("\n=== Transaction ===");
    let mut tx = provider.transaction(&database);
    tx.update(
        schema.clone(),
        vec![record! { "balance" => 1000, "where" => record! { "id" => "a2" } }],
    )?
    .insert(schema, vec![record! { "id" => "a1", "email" => "dup@example.com" }])?;
    match tx.exec(true).await {
        Ok(_) => println!("committed"),
        Err(err) => println!("rolled back: {err}"),
    }

    let rows = Query::new("pgrecord_accounts")
        .select(&["id", "email", "balance"])
        .order_by(&["id"])
        .fetch(&provider, &database)
        .await?;
    for row in rows {
        let fields: Vec<String> = row.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!("{}", fields.join(" "));
    }

    provider.close_all();
    Ok(())
}
