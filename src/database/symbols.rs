// Symbol storage and lookups

use super::*;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use std::collections::HashSet;

impl SymbolDatabase {
    pub fn get_symbol_by_id(&self, id: &str) -> Result<Option<Symbol>> {
        let query = format!("SELECT {} FROM symbols WHERE id = ?1", SYMBOL_COLUMNS);
        Ok(self
            .conn
            .query_row(&query, params![id], Self::row_to_symbol)
            .optional()?)
    }

    pub fn get_symbols_by_ids(&self, ids: &[String]) -> Result<Vec<Symbol>> {
        let mut symbols = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(symbol) = self.get_symbol_by_id(id)? {
                symbols.push(symbol);
            }
        }
        Ok(symbols)
    }

    /// Symbols of one file in source order
    pub fn get_symbols_for_file(&self, file_path: &str) -> Result<Vec<Symbol>> {
        let query = format!(
            "SELECT {} FROM symbols WHERE file_path = ?1 ORDER BY start_line, start_col",
            SYMBOL_COLUMNS
        );
        self.query_symbols(&query, params![file_path])
    }

    /// Exact-name lookup across the whole store
    pub fn get_symbols_by_name(&self, name: &str) -> Result<Vec<Symbol>> {
        let query = format!(
            "SELECT {} FROM symbols WHERE name = ?1 ORDER BY file_path, start_line",
            SYMBOL_COLUMNS
        );
        self.query_symbols(&query, params![name])
    }

    pub fn get_all_symbols(&self) -> Result<Vec<Symbol>> {
        let query = format!("SELECT {} FROM symbols ORDER BY file_path, start_line", SYMBOL_COLUMNS);
        self.query_symbols(&query, [])
    }

    pub fn get_symbols_for_workspace(&self, workspace_root: &str) -> Result<Vec<Symbol>> {
        let query = format!(
            "SELECT {} FROM symbols
             WHERE file_path IN (SELECT path FROM files WHERE workspace_root = ?1)
             ORDER BY file_path, start_line",
            SYMBOL_COLUMNS
        );
        self.query_symbols(&query, params![workspace_root])
    }

    /// Symbols of a workspace that have no stored embedding yet
    pub fn get_symbols_without_embeddings(&self, workspace_root: &str) -> Result<Vec<Symbol>> {
        let query = format!(
            "SELECT {} FROM symbols
             WHERE file_path IN (SELECT path FROM files WHERE workspace_root = ?1)
               AND id NOT IN (SELECT symbol_id FROM embeddings)
             ORDER BY file_path, start_line",
            SYMBOL_COLUMNS
        );
        self.query_symbols(&query, params![workspace_root])
    }

    /// Innermost non-import symbol whose span contains `(line, column)`
    pub fn find_symbol_at_position(&self, file_path: &str, line: u32, column: u32) -> Result<Option<Symbol>> {
        let symbols = self.get_symbols_for_file(file_path)?;
        Ok(symbols
            .into_iter()
            .filter(|s| s.kind != SymbolKind::Import && s.contains_position(line, column))
            .min_by_key(|s| s.span_size()))
    }

    /// Names a file binds through import statements
    pub fn get_import_names_for_file(&self, file_path: &str) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM symbols WHERE file_path = ?1 AND kind = 'import'")?;
        let names = stmt
            .query_map(params![file_path], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(names)
    }

    fn query_symbols<P: rusqlite::Params>(&self, query: &str, params: P) -> Result<Vec<Symbol>> {
        let mut stmt = self.conn.prepare(query)?;
        let symbols = stmt
            .query_map(params, Self::row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(symbols)
    }
}

pub(crate) fn symbol_ids_for_file(conn: &Connection, file_path: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM symbols WHERE file_path = ?1")?;
    let ids = stmt
        .query_map(params![file_path], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

pub(crate) fn insert_symbols(conn: &Connection, symbols: &[Symbol]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO symbols
         (id, name, kind, language, file_path, signature, start_line, start_col,
          end_line, end_col, start_byte, end_byte, doc_comment, visibility, parent_id, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
    )?;

    for symbol in symbols {
        let metadata_json = symbol
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        stmt.execute(params![
            symbol.id,
            symbol.name,
            symbol.kind.as_str(),
            symbol.language,
            symbol.file_path,
            symbol.signature,
            symbol.start_line,
            symbol.start_column,
            symbol.end_line,
            symbol.end_column,
            symbol.start_byte,
            symbol.end_byte,
            symbol.doc_comment,
            symbol.visibility.map(|v| v.as_str()),
            symbol.parent_id,
            metadata_json,
        ])?;
    }
    Ok(())
}
