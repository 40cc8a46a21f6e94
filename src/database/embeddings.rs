// Embedding storage and retrieval operations

use super::*;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

impl SymbolDatabase {
    /// Upsert an embedding; returns false when its symbol no longer exists
    pub fn store_embedding(&self, record: &EmbeddingRecord) -> Result<bool> {
        // Vectors are stored as little-endian f32 blobs
        let bytes: Vec<u8> = record.vector.iter().flat_map(|f| f.to_le_bytes()).collect();
        let tags_json = serde_json::to_string(&record.pattern_tags)?;

        let changed = self.conn.execute(
            "INSERT OR REPLACE INTO embeddings
             (symbol_id, vector, dimensions, source_fingerprint, layer, pattern_tags, model, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
             WHERE EXISTS (SELECT 1 FROM symbols WHERE id = ?1)",
            params![
                record.symbol_id,
                bytes,
                record.dimensions as i64,
                record.source_fingerprint,
                record.layer,
                tags_json,
                record.model,
                now_unix(),
            ],
        )?;

        if changed == 0 {
            debug!("Dropped embedding for removed symbol {}", record.symbol_id);
        }
        Ok(changed > 0)
    }

    pub fn get_embedding(&self, symbol_id: &str) -> Result<Option<EmbeddingRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT symbol_id, vector, dimensions, source_fingerprint, layer, pattern_tags, model
                 FROM embeddings WHERE symbol_id = ?1",
                params![symbol_id],
                row_to_embedding,
            )
            .optional()?;
        row.transpose()
    }

    /// Every stored embedding, used to warm the in-memory vector store
    pub fn load_all_embeddings(&self) -> Result<Vec<EmbeddingRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT symbol_id, vector, dimensions, source_fingerprint, layer, pattern_tags, model
             FROM embeddings",
        )?;
        let rows = stmt
            .query_map([], row_to_embedding)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().collect()
    }

    /// Drop stored vectors of these symbols; returns how many rows went away
    pub fn delete_embeddings(&self, symbol_ids: &[String]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached("DELETE FROM embeddings WHERE symbol_id = ?1")?;
        let mut deleted = 0;
        for id in symbol_ids {
            deleted += stmt.execute(params![id])?;
        }
        Ok(deleted)
    }

    pub fn count_embeddings(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?)
    }
}

fn row_to_embedding(row: &Row) -> rusqlite::Result<Result<EmbeddingRecord>> {
    let symbol_id: String = row.get(0)?;
    let bytes: Vec<u8> = row.get(1)?;
    let dimensions: i64 = row.get(2)?;
    let tags_json: Option<String> = row.get(5)?;

    if bytes.len() != dimensions as usize * 4 {
        return Ok(Err(anyhow!(
            "Invalid vector data size for {}: expected {} bytes, got {}",
            symbol_id,
            dimensions * 4,
            bytes.len()
        )));
    }

    let vector: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(Ok(EmbeddingRecord {
        symbol_id,
        vector,
        dimensions: dimensions as usize,
        source_fingerprint: row.get(3)?,
        layer: row.get(4)?,
        pattern_tags: tags_json
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default(),
        model: row.get(6)?,
    }))
}
