// Database type definitions

use serde::{Deserialize, Serialize};

/// File tracking information with Blake3 hashing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    pub path: String,
    pub workspace_root: String,
    pub language: String,
    /// Blake3 hex digest; the only trigger for re-extraction
    pub hash: String,
    pub size: i64,
    /// Unix timestamp
    pub last_modified: i64,
    /// Unix timestamp
    pub last_indexed: i64,
    pub parse_duration_ms: i64,
    pub symbol_count: i64,
    /// Source text, used to resolve the identifier under a cursor
    pub content: Option<String>,
}

/// Persisted embedding for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub symbol_id: String,
    pub vector: Vec<f32>,
    pub dimensions: usize,
    /// blake3 of the text that was embedded
    pub source_fingerprint: String,
    pub layer: String,
    pub pattern_tags: Vec<String>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceRecord {
    pub root_path: String,
    pub symbol_count: i64,
    pub file_count: i64,
    pub last_indexed_at: i64,
}

/// Database statistics for health monitoring
#[derive(Debug, Default, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_files: i64,
    pub total_symbols: i64,
    pub total_relationships: i64,
    pub total_types: i64,
    pub total_embeddings: i64,
    pub total_workspaces: i64,
    pub files_by_language: Vec<(String, i64)>,
    pub db_size_mb: f64,
}

/// Statistics returned after workspace cleanup
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkspaceCleanupStats {
    pub symbols_deleted: i64,
    pub relationships_deleted: i64,
    pub files_deleted: i64,
    /// Ids of every deleted symbol, so callers can evict them from in-memory indexes
    #[serde(skip)]
    pub deleted_symbol_ids: Vec<String>,
}

/// A relationship whose target was rewritten during cross-file resolution
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub relationship_id: String,
    pub to_symbol_id: String,
    pub confidence: f32,
}
