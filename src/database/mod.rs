//! Marlin's Symbol Store - SQLite source of truth
//!
//! Files, symbols, relationships, types, embeddings and workspaces live in one SQLite
//! database. Every write that belongs to a single file extraction goes through one
//! transaction, so readers only ever see a file's old rows or its new rows.

use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::extractors::base::{Relationship, RelationshipKind, Symbol, SymbolKind, Visibility};

mod embeddings;
mod files;
mod indexing;
mod relationships;
mod schema;
mod symbols;
mod type_queries;
pub mod types;
mod workspace;

pub use types::*;
pub(crate) use workspace::path_is_under;

/// Standard SELECT column list for Symbol queries, kept in sync with `row_to_symbol`
pub(crate) const SYMBOL_COLUMNS: &str = "id, name, kind, language, file_path, signature, \
     start_line, start_col, end_line, end_col, start_byte, end_byte, \
     doc_comment, visibility, parent_id, metadata";

pub(crate) const RELATIONSHIP_COLUMNS: &str =
    "id, from_symbol_id, to_symbol_id, target_name, kind, file_path, line_number, confidence, metadata";

/// The main database connection and operations
pub struct SymbolDatabase {
    pub(crate) conn: Connection,
    pub(crate) file_path: PathBuf,
}

impl SymbolDatabase {
    /// Open (creating if needed) the database at `db_path`; `":memory:"` gives a private in-memory store
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let file_path = db_path.as_ref().to_path_buf();
        let in_memory = file_path.as_os_str() == ":memory:";

        info!("🗄️ Opening symbol store at: {}", file_path.display());

        let conn = if in_memory {
            Connection::open_in_memory()
        } else {
            Connection::open(&file_path)
        }
        .map_err(|e| anyhow!("Failed to open database: {}", e))?;

        conn.busy_timeout(std::time::Duration::from_millis(5000))?;
        if !in_memory {
            // WAL lets the read connection see committed state while a write is in progress
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("journal_mode = {}", mode);
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }

        let mut db = Self { conn, file_path };
        db.initialize_schema()?;

        debug!("Symbol store ready");
        Ok(db)
    }

    /// A second connection to the same file for queries; never used for writes.
    pub fn open_reader(&self) -> Result<Self> {
        if self.file_path.as_os_str() == ":memory:" {
            return Err(anyhow!("In-memory stores cannot be shared with a reader"));
        }
        Self::new(&self.file_path)
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Liveness check used by health reports
    pub fn ping(&self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |table: &str| -> Result<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?)
        };

        let mut stmt = self.conn.prepare(
            "SELECT language, COUNT(*) FROM files GROUP BY language ORDER BY language",
        )?;
        let files_by_language = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let db_size_mb = std::fs::metadata(&self.file_path)
            .map(|m| m.len() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0);

        Ok(DatabaseStats {
            total_files: count("files")?,
            total_symbols: count("symbols")?,
            total_relationships: count("relationships")?,
            total_types: count("types")?,
            total_embeddings: count("embeddings")?,
            total_workspaces: count("workspaces")?,
            files_by_language,
            db_size_mb,
        })
    }

    pub(crate) fn row_to_symbol(row: &Row) -> rusqlite::Result<Symbol> {
        let kind_str: String = row.get("kind")?;
        let metadata_json: Option<String> = row.get("metadata")?;
        let visibility_str: Option<String> = row.get("visibility")?;

        Ok(Symbol {
            id: row.get("id")?,
            name: row.get("name")?,
            kind: SymbolKind::from_string(&kind_str),
            language: row.get("language")?,
            file_path: row.get("file_path")?,
            signature: row.get("signature")?,
            start_line: row.get("start_line")?,
            start_column: row.get("start_col")?,
            end_line: row.get("end_line")?,
            end_column: row.get("end_col")?,
            start_byte: row.get("start_byte")?,
            end_byte: row.get("end_byte")?,
            doc_comment: row.get("doc_comment")?,
            visibility: visibility_str.as_deref().and_then(Visibility::from_string),
            parent_id: row.get("parent_id")?,
            metadata: metadata_json.and_then(|json| serde_json::from_str(&json).ok()),
        })
    }

    pub(crate) fn row_to_relationship(row: &Row) -> rusqlite::Result<Relationship> {
        let kind_str: String = row.get("kind")?;
        let metadata_json: Option<String> = row.get("metadata")?;

        Ok(Relationship {
            id: row.get("id")?,
            from_symbol_id: row.get("from_symbol_id")?,
            to_symbol_id: row.get("to_symbol_id")?,
            kind: RelationshipKind::from_string(&kind_str),
            file_path: row.get("file_path")?,
            line_number: row.get("line_number")?,
            confidence: row.get("confidence")?,
            metadata: metadata_json.and_then(|json| serde_json::from_str(&json).ok()),
        })
    }
}

/// Unix timestamp in seconds
pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
