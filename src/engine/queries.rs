// Navigation and search over committed state

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::indexing::normalize_path;
use super::{CodeIntelligenceEngine, EngineState};
use crate::database::SymbolDatabase;
use crate::embeddings::ArchitecturalLayer;
use crate::embeddings::classify::{detect_layer, owning_root};
use crate::error::{EngineError, Result};
use crate::extractors::base::{
    Relationship, RelationshipKind, Symbol, SymbolKind, TypeInfo, UNRESOLVED_PREFIX,
};
use crate::search::scoring::by_score_desc;
use crate::search::{MatchSource, SearchHit, SearchOptions, SearchResult, interleave_by_layer};

/// One place that refers to a symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceLocation {
    pub file_path: String,
    pub line: u32,
    pub kind: RelationshipKind,
    pub from_symbol_id: String,
    pub to_symbol_id: String,
    pub confidence: f32,
}

impl From<Relationship> for ReferenceLocation {
    fn from(rel: Relationship) -> Self {
        Self {
            file_path: rel.file_path,
            line: rel.line_number,
            kind: rel.kind,
            from_symbol_id: rel.from_symbol_id,
            to_symbol_id: rel.to_symbol_id,
            confidence: rel.confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HoverInfo {
    pub symbol: Symbol,
    pub type_info: Option<TypeInfo>,
    pub parent: Option<Symbol>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Who calls this symbol
    Incoming,
    /// What this symbol calls
    Outgoing,
}

/// One hop of a call hierarchy. `symbol` is `None` for callees that never resolved.
#[derive(Debug, Clone, Serialize)]
pub struct CallHierarchyItem {
    pub name: String,
    pub symbol: Option<Symbol>,
    pub file_path: String,
    pub line: u32,
    pub confidence: f32,
}

impl CodeIntelligenceEngine {
    /// Declarations for the identifier at `(line, column)`; lines are 1-based, columns 0-based.
    pub async fn go_to_definition(&self, file: impl AsRef<Path>, line: u32, column: u32) -> Result<Vec<Symbol>> {
        let state = self.state()?;
        let path = normalize_path(file.as_ref());
        state
            .read(move |db| Ok(definitions_at(db, &path, line, column)?.1))
            .await
    }

    /// Every relationship that points at the definition under the cursor, ordered by file then line
    pub async fn find_references(&self, file: impl AsRef<Path>, line: u32, column: u32) -> Result<Vec<ReferenceLocation>> {
        let state = self.state()?;
        let path = normalize_path(file.as_ref());
        state
            .read(move |db| {
                let (identifier, definitions) = definitions_at(db, &path, line, column)?;
                let Some(name) = definitions.first().map(|d| d.name.clone()).or(identifier) else {
                    return Ok(Vec::new());
                };

                let mut seen = HashSet::new();
                let mut references = Vec::new();
                for definition in &definitions {
                    for rel in db.get_relationships_to(&definition.id, None)? {
                        if seen.insert(rel.id.clone()) {
                            references.push(ReferenceLocation::from(rel));
                        }
                    }
                }
                for rel in db.get_relationships_to(&format!("{}{}", UNRESOLVED_PREFIX, name), None)? {
                    if seen.insert(rel.id.clone()) {
                        references.push(ReferenceLocation::from(rel));
                    }
                }

                references.sort_by(|a, b| a.file_path.cmp(&b.file_path).then(a.line.cmp(&b.line)));
                Ok(references)
            })
            .await
    }

    pub async fn hover(&self, file: impl AsRef<Path>, line: u32, column: u32) -> Result<Option<HoverInfo>> {
        let state = self.state()?;
        let path = normalize_path(file.as_ref());
        state
            .read(move |db| {
                let Some(symbol) = target_symbol(db, &path, line, column)? else {
                    return Ok(None);
                };
                let type_info = db.get_type_for_symbol(&symbol.id)?;
                let parent = match &symbol.parent_id {
                    Some(parent_id) => db.get_symbol_by_id(parent_id)?,
                    None => None,
                };
                Ok(Some(HoverInfo {
                    symbol,
                    type_info,
                    parent,
                }))
            })
            .await
    }

    /// One hop over `Calls` edges, capped at the configured limit
    pub async fn get_call_hierarchy(
        &self,
        file: impl AsRef<Path>,
        line: u32,
        column: u32,
        direction: CallDirection,
    ) -> Result<Vec<CallHierarchyItem>> {
        let state = self.state()?;
        let path = normalize_path(file.as_ref());
        let limit = state.config.call_hierarchy_limit;
        state
            .read(move |db| {
                let Some(symbol) = target_symbol(db, &path, line, column)? else {
                    return Ok(Vec::new());
                };
                match direction {
                    CallDirection::Incoming => incoming_calls(db, &symbol, limit),
                    CallDirection::Outgoing => outgoing_calls(db, &symbol, limit),
                }
            })
            .await
    }

    /// Fuzzy search, blended with vector similarity once any vectors exist.
    ///
    /// Semantic problems never surface here; the structural ranking is returned instead.
    pub async fn search_code(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let state = self.state()?;
        let limit = options.limit.max(1);
        // Ask for more than needed so blending and interleaving have room to reorder
        let window = limit * 2;

        let structural = state
            .search
            .read()
            .await
            .search_fuzzy(query, window, options.threshold)?;

        let roots = workspace_roots(&state).await?;
        let mut results = if options.include_semantics && state.semantic.is_hybrid_available() {
            match hybrid_search(&state, query, structural.clone(), window, options.threshold, &roots).await {
                Ok(results) => results,
                Err(e) => {
                    debug!("Hybrid search unavailable, using structural results: {:#}", e);
                    to_results(structural, MatchSource::Structural, &roots)
                }
            }
        } else {
            to_results(structural, MatchSource::Structural, &roots)
        };

        if options.cross_layer {
            return Ok(interleave_by_layer(results, limit));
        }
        results.truncate(limit);
        Ok(results)
    }

    pub async fn search_exact(&self, name: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let state = self.state()?;
        let hits = state.search.read().await.search_exact(name, limit)?;
        let roots = workspace_roots(&state).await?;
        Ok(to_results(hits, MatchSource::Structural, &roots))
    }

    pub async fn search_by_type(&self, type_name: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let state = self.state()?;
        let hits = state.search.read().await.search_by_type(type_name, limit)?;
        let roots = workspace_roots(&state).await?;
        Ok(to_results(hits, MatchSource::Structural, &roots))
    }
}

/// Registered workspace roots; layers are judged below these
async fn workspace_roots(state: &Arc<EngineState>) -> Result<Vec<String>> {
    let workspaces = state.read(|db| db.list_workspaces()).await?;
    Ok(workspaces.into_iter().map(|w| w.root_path).collect())
}

fn layer_of(file_path: &str, roots: &[String]) -> ArchitecturalLayer {
    detect_layer(file_path, owning_root(file_path, roots))
}

fn to_results(hits: Vec<SearchHit>, source: MatchSource, roots: &[String]) -> Vec<SearchResult> {
    hits.into_iter()
        .map(|hit| SearchResult {
            layer: layer_of(&hit.symbol.file_path, roots),
            symbol: hit.symbol,
            score: hit.score,
            source,
        })
        .collect()
}

/// Blend fuzzy and vector scores. A structural match never ranks lower than its own fuzzy
/// score; semantic-only matches are weighted down.
async fn hybrid_search(
    state: &Arc<EngineState>,
    query: &str,
    structural: Vec<SearchHit>,
    window: usize,
    threshold: f32,
    roots: &[String],
) -> Result<Vec<SearchResult>> {
    let weight = state.config.search.semantic_weight;

    let similar = {
        let state = Arc::clone(state);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || state.semantic.search_similar(&query, window, 0.0))
            .await
            .map_err(|e| EngineError::Internal(anyhow!("Semantic search task failed: {}", e)))?
            .map_err(EngineError::Internal)?
    };

    let similarity: HashMap<String, f32> = similar
        .into_iter()
        .map(|r| (r.symbol_id, r.similarity_score))
        .collect();

    let mut results = Vec::with_capacity(structural.len() + similarity.len());
    let mut seen = HashSet::new();
    for hit in structural {
        seen.insert(hit.symbol.id.clone());
        let (score, source) = match similarity.get(&hit.symbol.id) {
            Some(&vector) => (
                hit.score.max((1.0 - weight) * hit.score + weight * vector),
                MatchSource::Hybrid,
            ),
            None => (hit.score, MatchSource::Structural),
        };
        results.push(SearchResult {
            layer: layer_of(&hit.symbol.file_path, roots),
            symbol: hit.symbol,
            score,
            source,
        });
    }

    let semantic_only: Vec<String> = similarity
        .keys()
        .filter(|id| !seen.contains(*id))
        .cloned()
        .collect();
    if !semantic_only.is_empty() {
        let symbols = state.read(move |db| db.get_symbols_by_ids(&semantic_only)).await?;
        for symbol in symbols {
            let score = weight * similarity.get(&symbol.id).copied().unwrap_or_default();
            if score < threshold {
                continue;
            }
            results.push(SearchResult {
                layer: layer_of(&symbol.file_path, roots),
                symbol,
                score,
                source: MatchSource::Semantic,
            });
        }
    }

    results.sort_by(|a, b| {
        by_score_desc(a.score, b.score)
            .then_with(|| a.symbol.file_path.cmp(&b.symbol.file_path))
            .then_with(|| a.symbol.start_line.cmp(&b.symbol.start_line))
    });
    Ok(results)
}

/// The identifier under the cursor, read from the stored file content
fn identifier_at(db: &SymbolDatabase, path: &str, line: u32, column: u32) -> anyhow::Result<Option<String>> {
    let Some(content) = db.get_file_content(path)? else {
        return Ok(None);
    };
    let Some(text) = line.checked_sub(1).and_then(|idx| content.lines().nth(idx as usize)) else {
        return Ok(None);
    };
    Ok(word_at(text, column as usize))
}

fn word_at(line: &str, column: usize) -> Option<String> {
    let bytes = line.as_bytes();
    let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'$';
    if column > bytes.len() {
        return None;
    }

    // Cursor just past the end of a word still selects it
    let anchor = if column < bytes.len() && is_ident(bytes[column]) {
        column
    } else if column > 0 && is_ident(bytes[column - 1]) {
        column - 1
    } else {
        return None;
    };

    let mut start = anchor;
    while start > 0 && is_ident(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = anchor + 1;
    while end < bytes.len() && is_ident(bytes[end]) {
        end += 1;
    }
    line.get(start..end).map(str::to_string)
}

/// Declaration at the cursor, else the resolved target of an edge on that line, else symbols
/// sharing the name (same file first, imports excluded).
fn definitions_at(
    db: &SymbolDatabase,
    path: &str,
    line: u32,
    column: u32,
) -> anyhow::Result<(Option<String>, Vec<Symbol>)> {
    let Some(identifier) = identifier_at(db, path, line, column)? else {
        return Ok((None, Vec::new()));
    };

    let declared: Vec<Symbol> = db
        .get_symbols_for_file(path)?
        .into_iter()
        .filter(|s| s.kind != SymbolKind::Import && s.name == identifier && s.start_line == line)
        .collect();
    if !declared.is_empty() {
        return Ok((Some(identifier), declared));
    }

    let mut targets = Vec::new();
    let mut seen = HashSet::new();
    for rel in db.get_relationships_for_file(path)? {
        if rel.line_number != line || rel.is_unresolved() || rel.target_name() != Some(identifier.as_str()) {
            continue;
        }
        if !seen.insert(rel.to_symbol_id.clone()) {
            continue;
        }
        if let Some(target) = db.get_symbol_by_id(&rel.to_symbol_id)? {
            targets.push(target);
        }
    }
    if !targets.is_empty() {
        return Ok((Some(identifier), targets));
    }

    let mut by_name: Vec<Symbol> = db
        .get_symbols_by_name(&identifier)?
        .into_iter()
        .filter(|s| s.kind != SymbolKind::Import)
        .collect();
    by_name.sort_by(|a, b| {
        (a.file_path != path)
            .cmp(&(b.file_path != path))
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.start_line.cmp(&b.start_line))
    });
    Ok((Some(identifier), by_name))
}

/// Definition under the cursor, or the innermost symbol enclosing it
fn target_symbol(db: &SymbolDatabase, path: &str, line: u32, column: u32) -> anyhow::Result<Option<Symbol>> {
    if let Some(first) = definitions_at(db, path, line, column)?.1.into_iter().next() {
        return Ok(Some(first));
    }
    db.find_symbol_at_position(path, line, column)
}

fn incoming_calls(db: &SymbolDatabase, symbol: &Symbol, limit: usize) -> anyhow::Result<Vec<CallHierarchyItem>> {
    let mut edges = db.get_relationships_to(&symbol.id, Some(RelationshipKind::Calls))?;
    edges.extend(db.get_relationships_to(
        &format!("{}{}", UNRESOLVED_PREFIX, symbol.name),
        Some(RelationshipKind::Calls),
    )?);

    let mut items = Vec::new();
    for rel in edges.into_iter().take(limit) {
        let caller = db.get_symbol_by_id(&rel.from_symbol_id)?;
        items.push(CallHierarchyItem {
            name: caller
                .as_ref()
                .map(|c| c.name.clone())
                .unwrap_or_else(|| rel.from_symbol_id.clone()),
            symbol: caller,
            file_path: rel.file_path,
            line: rel.line_number,
            confidence: rel.confidence,
        });
    }
    Ok(items)
}

fn outgoing_calls(db: &SymbolDatabase, symbol: &Symbol, limit: usize) -> anyhow::Result<Vec<CallHierarchyItem>> {
    let edges = db.get_relationships_from(&symbol.id, Some(RelationshipKind::Calls))?;

    let mut items = Vec::new();
    for rel in edges.into_iter().take(limit) {
        let callee = if rel.is_unresolved() {
            None
        } else {
            db.get_symbol_by_id(&rel.to_symbol_id)?
        };
        let name = callee
            .as_ref()
            .map(|c| c.name.clone())
            .or_else(|| rel.target_name().map(str::to_string))
            .unwrap_or_else(|| rel.to_symbol_id.clone());
        items.push(CallHierarchyItem {
            name,
            symbol: callee,
            file_path: rel.file_path,
            line: rel.line_number,
            confidence: rel.confidence,
        });
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::word_at;

    #[test]
    fn word_at_finds_identifier_around_cursor() {
        assert_eq!(word_at("    result = foo(bar)", 13), Some("foo".to_string()));
        assert_eq!(word_at("    result = foo(bar)", 16), Some("foo".to_string()));
        assert_eq!(word_at("user_service.get_user()", 2), Some("user_service".to_string()));
    }

    #[test]
    fn word_at_rejects_whitespace_and_out_of_range() {
        assert_eq!(word_at("a  b", 2), None);
        assert_eq!(word_at("abc", 10), None);
        assert_eq!(word_at("", 0), None);
    }
}
