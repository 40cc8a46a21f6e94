// Type information storage and lookups

use super::*;
use crate::extractors::base::TypeInfo;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use std::collections::HashMap;

impl SymbolDatabase {
    pub fn get_type_for_symbol(&self, symbol_id: &str) -> Result<Option<TypeInfo>> {
        Ok(self
            .conn
            .query_row(
                "SELECT symbol_id, resolved_type, generic_params, is_inferred, language
                 FROM types WHERE symbol_id = ?1",
                params![symbol_id],
                row_to_type_info,
            )
            .optional()?)
    }

    /// symbol id → type, for every typed symbol
    pub fn get_all_types(&self) -> Result<HashMap<String, TypeInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT symbol_id, resolved_type, generic_params, is_inferred, language FROM types",
        )?;
        let types = stmt
            .query_map([], row_to_type_info)?
            .map(|r| r.map(|t| (t.symbol_id.clone(), t)))
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(types)
    }
}

pub(crate) fn insert_types(conn: &Connection, types: &HashMap<String, TypeInfo>) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO types (symbol_id, resolved_type, generic_params, is_inferred, language)
         SELECT ?1, ?2, ?3, ?4, ?5 WHERE EXISTS (SELECT 1 FROM symbols WHERE id = ?1)",
    )?;
    for info in types.values() {
        let generic_json = info
            .generic_params
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        stmt.execute(params![
            info.symbol_id,
            info.resolved_type,
            generic_json,
            info.is_inferred,
            info.language,
        ])?;
    }
    Ok(())
}

fn row_to_type_info(row: &Row) -> rusqlite::Result<TypeInfo> {
    let generic_json: Option<String> = row.get(2)?;
    Ok(TypeInfo {
        symbol_id: row.get(0)?,
        resolved_type: row.get(1)?,
        generic_params: generic_json.and_then(|json| serde_json::from_str(&json).ok()),
        is_inferred: row.get(3)?,
        language: row.get(4)?,
    })
}
