//! LanceDB connection and housekeeping helpers.
use anyhow::Result;
use lancedb::{connect, Connection};

use arrow_array::RecordBatchIterator;
use std::sync::Arc;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    if names.contains(&name.to_string()) {
        return Ok(false);
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(true)
}
