// File record operations

use super::*;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

impl SymbolDatabase {
    /// Stored content hash for `path`, `None` when the file was never indexed
    pub fn get_file_hash(&self, path: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT hash FROM files WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn get_file_info(&self, path: &str) -> Result<Option<FileInfo>> {
        Ok(self
            .conn
            .query_row(
                "SELECT path, workspace_root, language, hash, size, last_modified, last_indexed,
                        parse_duration_ms, symbol_count, content
                 FROM files WHERE path = ?1",
                params![path],
                row_to_file_info,
            )
            .optional()?)
    }

    pub fn get_file_content(&self, path: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT content FROM files WHERE path = ?1",
                params![path],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten())
    }

    /// All indexed file paths belonging to a workspace root
    pub fn get_file_paths_for_workspace(&self, workspace_root: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM files WHERE workspace_root = ?1 ORDER BY path")?;
        let paths = stmt
            .query_map(params![workspace_root], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }
}

/// Insert or update a file row without triggering the symbol cascade a REPLACE would cause
pub(crate) fn upsert_file(conn: &Connection, file: &FileInfo) -> Result<()> {
    conn.execute(
        "INSERT INTO files (path, workspace_root, language, hash, size, last_modified,
                            last_indexed, parse_duration_ms, symbol_count, content)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(path) DO UPDATE SET
            workspace_root = excluded.workspace_root,
            language = excluded.language,
            hash = excluded.hash,
            size = excluded.size,
            last_modified = excluded.last_modified,
            last_indexed = excluded.last_indexed,
            parse_duration_ms = excluded.parse_duration_ms,
            symbol_count = excluded.symbol_count,
            content = excluded.content",
        params![
            file.path,
            file.workspace_root,
            file.language,
            file.hash,
            file.size,
            file.last_modified,
            file.last_indexed,
            file.parse_duration_ms,
            file.symbol_count,
            file.content,
        ],
    )?;
    Ok(())
}

fn row_to_file_info(row: &Row) -> rusqlite::Result<FileInfo> {
    Ok(FileInfo {
        path: row.get(0)?,
        workspace_root: row.get(1)?,
        language: row.get(2)?,
        hash: row.get(3)?,
        size: row.get(4)?,
        last_modified: row.get(5)?,
        last_indexed: row.get(6)?,
        parse_duration_ms: row.get(7)?,
        symbol_count: row.get(8)?,
        content: row.get(9)?,
    })
}
