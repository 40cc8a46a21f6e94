// Workspace management operations

use super::*;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use tracing::info;

impl SymbolDatabase {
    /// Create or refresh a workspace row from the current file/symbol counts
    pub fn upsert_workspace(&self, root_path: &str) -> Result<WorkspaceRecord> {
        let file_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM files WHERE workspace_root = ?1",
            params![root_path],
            |row| row.get(0),
        )?;
        let symbol_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM symbols
             WHERE file_path IN (SELECT path FROM files WHERE workspace_root = ?1)",
            params![root_path],
            |row| row.get(0),
        )?;
        let record = WorkspaceRecord {
            root_path: root_path.to_string(),
            symbol_count,
            file_count,
            last_indexed_at: now_unix(),
        };

        self.conn.execute(
            "INSERT INTO workspaces (root_path, symbol_count, file_count, last_indexed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(root_path) DO UPDATE SET
                symbol_count = excluded.symbol_count,
                file_count = excluded.file_count,
                last_indexed_at = excluded.last_indexed_at",
            params![
                record.root_path,
                record.symbol_count,
                record.file_count,
                record.last_indexed_at
            ],
        )?;
        Ok(record)
    }

    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT root_path, symbol_count, file_count, last_indexed_at
             FROM workspaces ORDER BY root_path",
        )?;
        let workspaces = stmt
            .query_map([], row_to_workspace)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(workspaces)
    }

    pub fn get_workspace(&self, root_path: &str) -> Result<Option<WorkspaceRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT root_path, symbol_count, file_count, last_indexed_at
                 FROM workspaces WHERE root_path = ?1",
                params![root_path],
                row_to_workspace,
            )
            .optional()?)
    }

    /// Registered workspace whose root is the longest prefix of `path`
    pub fn find_workspace_for_path(&self, path: &str) -> Result<Option<String>> {
        Ok(self
            .list_workspaces()?
            .into_iter()
            .map(|w| w.root_path)
            .filter(|root| path_is_under(path, root))
            .max_by_key(|root| root.len()))
    }

    /// Delete a workspace and everything indexed under it
    pub fn delete_workspace_data(&mut self, root_path: &str) -> Result<WorkspaceCleanupStats> {
        let tx = self.conn.transaction()?;

        let deleted_symbol_ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM symbols
                 WHERE file_path IN (SELECT path FROM files WHERE workspace_root = ?1)",
            )?;
            stmt.query_map(params![root_path], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let relationships_deleted: i64 = tx.query_row(
            "SELECT COUNT(*) FROM relationships
             WHERE file_path IN (SELECT path FROM files WHERE workspace_root = ?1)",
            params![root_path],
            |row| row.get(0),
        )?;

        // Edges from other workspaces must not dangle
        for id in &deleted_symbol_ids {
            tx.execute(
                "UPDATE relationships SET to_symbol_id = ?2 || target_name, confidence = ?3
                 WHERE to_symbol_id = ?1
                   AND file_path NOT IN (SELECT path FROM files WHERE workspace_root = ?4)",
                params![
                    id,
                    crate::extractors::base::UNRESOLVED_PREFIX,
                    crate::extractors::base::UNRESOLVED_CONFIDENCE,
                    root_path
                ],
            )?;
        }

        // symbols, relationships, types and embeddings cascade from files
        let files_deleted = tx.execute(
            "DELETE FROM files WHERE workspace_root = ?1",
            params![root_path],
        )? as i64;
        tx.execute(
            "DELETE FROM workspaces WHERE root_path = ?1",
            params![root_path],
        )?;
        tx.commit()?;

        let stats = WorkspaceCleanupStats {
            symbols_deleted: deleted_symbol_ids.len() as i64,
            relationships_deleted,
            files_deleted,
            deleted_symbol_ids,
        };

        info!(
            "🗑️ Deleted workspace '{}' data: {} symbols, {} relationships, {} files",
            root_path, stats.symbols_deleted, stats.relationships_deleted, stats.files_deleted
        );
        Ok(stats)
    }
}

fn row_to_workspace(row: &Row) -> rusqlite::Result<WorkspaceRecord> {
    Ok(WorkspaceRecord {
        root_path: row.get(0)?,
        symbol_count: row.get(1)?,
        file_count: row.get(2)?,
        last_indexed_at: row.get(3)?,
    })
}

/// Component-wise prefix check on '/'-separated paths
pub(crate) fn path_is_under(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    path == root || path.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
}
