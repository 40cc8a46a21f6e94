// Per-file transactional commit and removal

use super::files::upsert_file;
use super::relationships::{insert_relationships, unresolve_incoming};
use super::symbols::{insert_symbols, symbol_ids_for_file};
use super::type_queries::insert_types;
use super::*;
use crate::extractors::base::ExtractionResults;
use anyhow::Result;
use rusqlite::params;
use tracing::debug;

impl SymbolDatabase {
    /// Replace everything stored for `file` with a fresh extraction, atomically.
    ///
    /// Returns the ids of the symbols that existed before the commit so callers can evict
    /// stale entries from in-memory indexes.
    pub fn commit_file_extraction(&mut self, file: &FileInfo, results: &ExtractionResults) -> Result<Vec<String>> {
        let tx = self.conn.transaction()?;

        let previous_ids = symbol_ids_for_file(&tx, &file.path)?;
        let unresolved = unresolve_incoming(&tx, &previous_ids, Some(&file.path))?;
        tx.execute("DELETE FROM symbols WHERE file_path = ?1", params![file.path])?;

        upsert_file(&tx, file)?;
        insert_symbols(&tx, &results.symbols)?;
        insert_relationships(&tx, &results.relationships)?;
        insert_types(&tx, &results.types)?;

        tx.commit()?;

        debug!(
            "💾 Committed {}: {} symbols, {} relationships, {} types ({} incoming edges reset)",
            file.path,
            results.symbols.len(),
            results.relationships.len(),
            results.types.len(),
            unresolved
        );
        Ok(previous_ids)
    }

    /// Remove a file and all rows derived from it; returns the removed symbol ids
    pub fn delete_file_data(&mut self, file_path: &str) -> Result<Vec<String>> {
        let tx = self.conn.transaction()?;

        let previous_ids = symbol_ids_for_file(&tx, file_path)?;
        unresolve_incoming(&tx, &previous_ids, Some(file_path))?;
        // symbols cascade from the file row, relationships/types/embeddings from symbols
        let removed = tx.execute("DELETE FROM files WHERE path = ?1", params![file_path])?;

        tx.commit()?;

        if removed > 0 {
            debug!("🗑️ Cleared {} ({} symbols)", file_path, previous_ids.len());
        }
        Ok(previous_ids)
    }
}
