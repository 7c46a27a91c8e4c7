//! Vector storage and similarity search using sqlite-vec.
//!
//! Each collection gets its own `vec0` virtual table using the cosine
//! metric, so `similarity = 1 - distance`.

use rusqlite::{Connection, params};
use tracing::{debug, info};
use zerocopy::IntoBytes;

use crate::error::Result;
use crate::types::{Collection, ItemId, VectorMatch};

/// Register sqlite-vec for every connection opened afterwards.
///
/// `sqlite3_auto_extension` is process-global and idempotent per entry
/// point, so calling this more than once is harmless.
pub fn init_vector_extension() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    unsafe {
        #[allow(clippy::missing_transmute_annotations)]
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    }
}

/// Check that sqlite-vec is loaded and return its version.
pub fn check_vector_extension(conn: &Connection) -> Result<String> {
    let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
    Ok(version)
}

/// Name of the `vec0` table for a collection.
pub fn vector_table(collection: Collection) -> String {
    format!("{}_vectors", collection.as_str())
}

/// Create the `vec0` table for a collection.
pub fn create_vector_table(conn: &Connection, collection: Collection, dims: usize) -> Result<()> {
    let table = vector_table(collection);
    conn.execute_batch(&format!(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING vec0(
            item_id TEXT PRIMARY KEY,
            embedding float[{dims}] distance_metric=cosine
        )
        "#
    ))?;

    info!(collection = %collection, dims, "Vector table ready");
    Ok(())
}

/// Drop the `vec0` table for a collection (reindex).
pub fn drop_vector_table(conn: &Connection, collection: Collection) -> Result<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", vector_table(collection)))?;
    info!(collection = %collection, "Dropped vector table");
    Ok(())
}

/// Store or replace the vector for an item.
pub fn store_embedding(
    conn: &Connection,
    collection: Collection,
    id: &ItemId,
    embedding: &[f32],
) -> Result<()> {
    let table = vector_table(collection);
    // vec0 doesn't support INSERT OR REPLACE
    conn.execute(
        &format!("DELETE FROM {table} WHERE item_id = ?1"),
        params![id.as_str()],
    )?;
    conn.execute(
        &format!("INSERT INTO {table} (item_id, embedding) VALUES (?1, ?2)"),
        params![id.as_str(), embedding.as_bytes()],
    )?;
    Ok(())
}

/// Remove the vector for an item. Returns whether one existed.
pub fn delete_embedding(conn: &Connection, collection: Collection, id: &ItemId) -> Result<bool> {
    let rows = conn.execute(
        &format!("DELETE FROM {} WHERE item_id = ?1", vector_table(collection)),
        params![id.as_str()],
    )?;
    Ok(rows > 0)
}

/// K-nearest-neighbour search, converted to similarities and filtered to
/// `similarity > threshold`.
pub fn search_similar(
    conn: &Connection,
    collection: Collection,
    query: &[f32],
    limit: usize,
    threshold: f32,
) -> Result<Vec<VectorMatch>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT item_id, distance
        FROM {}
        WHERE embedding MATCH ?1
        ORDER BY distance
        LIMIT ?2
        "#,
        vector_table(collection)
    ))?;

    let rows = stmt.query_map(params![query.as_bytes(), limit as i64], |row| {
        let id: String = row.get(0)?;
        let distance: f64 = row.get(1)?;
        Ok((id, distance))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (id, distance) = row?;
        let similarity = (1.0 - distance as f32).clamp(-1.0, 1.0);
        if similarity > threshold {
            results.push(VectorMatch {
                id: ItemId(id),
                similarity,
            });
        }
    }

    debug!(
        collection = %collection,
        results = results.len(),
        limit,
        threshold,
        "Vector search complete"
    );
    Ok(results)
}

/// Number of stored vectors in a collection.
pub fn count_embeddings(conn: &Connection, collection: Collection) -> Result<usize> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", vector_table(collection)),
        [],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Encode an embedding for a BLOB column.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.as_bytes().to_vec()
}

/// Decode a BLOB column written by [`encode_embedding`].
pub fn decode_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
