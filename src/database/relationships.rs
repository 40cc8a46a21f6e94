// Relationship storage, lookups and cross-file resolution bookkeeping

use super::*;
use crate::extractors::base::{UNRESOLVED_CONFIDENCE, UNRESOLVED_PREFIX};
use anyhow::Result;
use rusqlite::params;

impl SymbolDatabase {
    /// Outgoing edges of a symbol, optionally filtered by kind
    pub fn get_relationships_from(&self, symbol_id: &str, kind: Option<RelationshipKind>) -> Result<Vec<Relationship>> {
        let query = format!(
            "SELECT {} FROM relationships
             WHERE from_symbol_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY file_path, line_number",
            RELATIONSHIP_COLUMNS
        );
        self.query_relationships(&query, params![symbol_id, kind.map(|k| k.as_str())])
    }

    /// Incoming edges of a symbol, optionally filtered by kind
    pub fn get_relationships_to(&self, symbol_id: &str, kind: Option<RelationshipKind>) -> Result<Vec<Relationship>> {
        let query = format!(
            "SELECT {} FROM relationships
             WHERE to_symbol_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY file_path, line_number",
            RELATIONSHIP_COLUMNS
        );
        self.query_relationships(&query, params![symbol_id, kind.map(|k| k.as_str())])
    }

    pub fn get_relationships_for_file(&self, file_path: &str) -> Result<Vec<Relationship>> {
        let query = format!(
            "SELECT {} FROM relationships WHERE file_path = ?1 ORDER BY line_number",
            RELATIONSHIP_COLUMNS
        );
        self.query_relationships(&query, params![file_path])
    }

    /// Every relationship still pointing at a placeholder
    pub fn get_unresolved_relationships(&self) -> Result<Vec<Relationship>> {
        let query = format!(
            "SELECT {} FROM relationships WHERE to_symbol_id LIKE ?1 ORDER BY file_path, line_number",
            RELATIONSHIP_COLUMNS
        );
        self.query_relationships(&query, params![format!("{}%", UNRESOLVED_PREFIX)])
    }

    /// Placeholders written against `name`
    pub fn get_unresolved_relationships_named(&self, name: &str) -> Result<Vec<Relationship>> {
        let query = format!(
            "SELECT {} FROM relationships
             WHERE target_name = ?1 AND to_symbol_id LIKE ?2
             ORDER BY file_path, line_number",
            RELATIONSHIP_COLUMNS
        );
        self.query_relationships(&query, params![name, format!("{}%", UNRESOLVED_PREFIX)])
    }

    /// Rewrite placeholder targets in one transaction; returns rows changed
    pub fn apply_resolutions(&mut self, resolutions: &[ResolvedTarget]) -> Result<usize> {
        if resolutions.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE relationships SET to_symbol_id = ?2, confidence = ?3
                 WHERE id = ?1 AND to_symbol_id LIKE ?4
                   AND EXISTS (SELECT 1 FROM symbols WHERE id = ?2)",
            )?;
            let placeholder = format!("{}%", UNRESOLVED_PREFIX);
            for resolution in resolutions {
                changed += stmt.execute(params![
                    resolution.relationship_id,
                    resolution.to_symbol_id,
                    resolution.confidence,
                    placeholder,
                ])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    fn query_relationships<P: rusqlite::Params>(&self, query: &str, params: P) -> Result<Vec<Relationship>> {
        let mut stmt = self.conn.prepare(query)?;
        let relationships = stmt
            .query_map(params, Self::row_to_relationship)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(relationships)
    }
}

pub(crate) fn insert_relationships(conn: &Connection, relationships: &[Relationship]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO relationships
         (id, from_symbol_id, to_symbol_id, target_name, kind, file_path, line_number, confidence, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;

    for rel in relationships {
        let metadata_json = rel
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let target_name = rel.target_name().unwrap_or(&rel.to_symbol_id).to_string();

        stmt.execute(params![
            rel.id,
            rel.from_symbol_id,
            rel.to_symbol_id,
            target_name,
            rel.kind.as_str(),
            rel.file_path,
            rel.line_number,
            rel.confidence,
            metadata_json,
        ])?;
    }
    Ok(())
}

/// Turn edges from other files that point at `symbol_ids` back into placeholders
pub(crate) fn unresolve_incoming(conn: &Connection, symbol_ids: &[String], owning_file: Option<&str>) -> Result<usize> {
    let mut stmt = conn.prepare(
        "UPDATE relationships
         SET to_symbol_id = ?3 || target_name, confidence = ?4
         WHERE to_symbol_id = ?1 AND (?2 IS NULL OR file_path != ?2)",
    )?;
    let mut changed = 0;
    for id in symbol_ids {
        changed += stmt.execute(params![id, owning_file, UNRESOLVED_PREFIX, UNRESOLVED_CONFIDENCE])?;
    }
    Ok(changed)
}
