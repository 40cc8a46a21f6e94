//! Structural search: exact, fuzzy and by-type lookup over symbol names.
//!
//! The engine talks to the index only through [`StructuralSearch`]. The default implementation
//! is [`SymbolSearchIndex`], a tantivy index rebuilt from the store after each workspace pass
//! and patched per file in between.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;

use crate::config::SearchConfig;
use crate::embeddings::classify::ArchitecturalLayer;
use crate::extractors::base::{Symbol, TypeInfo};

pub mod index;
pub mod schema;
pub mod scoring;
pub mod tokenizer;

pub use index::SymbolSearchIndex;

/// A structural match before the engine attaches provenance and layer.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub symbol: Symbol,
    pub score: f32,
}

pub trait StructuralSearch: Send + Sync {
    /// Replace the whole index.
    fn rebuild_index(&mut self, symbols: Vec<Symbol>, types: &HashMap<String, TypeInfo>) -> Result<()>;

    /// Replace the entries of one file.
    fn update_index(&mut self, file_path: &str, symbols: Vec<Symbol>, types: &HashMap<String, TypeInfo>) -> Result<()>;

    fn remove_from_index(&mut self, file_path: &str) -> Result<()>;

    /// Drop every file under `root`.
    fn remove_workspace(&mut self, root: &str) -> Result<()>;

    fn search_fuzzy(&self, query: &str, limit: usize, threshold: f32) -> Result<Vec<SearchHit>>;

    fn search_exact(&self, name: &str, limit: usize) -> Result<Vec<SearchHit>>;

    fn search_by_type(&self, type_name: &str, limit: usize) -> Result<Vec<SearchHit>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Err` when the index can no longer serve or accept writes
    fn health(&self) -> Result<()>;
}

/// Caller options for `search_code`
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub threshold: f32,
    /// Interleave results across architectural layers
    pub cross_layer: bool,
    /// Allow hybrid ranking when vectors exist
    pub include_semantics: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            threshold: 0.3,
            cross_layer: false,
            include_semantics: true,
        }
    }
}

impl SearchOptions {
    /// Defaults taken from the `[search]` config section
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            limit: config.default_limit,
            threshold: config.default_threshold,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Structural,
    Semantic,
    Hybrid,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub symbol: Symbol,
    pub score: f32,
    pub source: MatchSource,
    pub layer: ArchitecturalLayer,
}

/// Round-robin across layers, keeping each layer's own order.
pub fn interleave_by_layer(results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    let mut order: Vec<ArchitecturalLayer> = Vec::new();
    let mut buckets: HashMap<ArchitecturalLayer, std::collections::VecDeque<SearchResult>> =
        HashMap::new();

    for result in results {
        if !buckets.contains_key(&result.layer) {
            order.push(result.layer);
        }
        buckets.entry(result.layer).or_default().push_back(result);
    }

    let mut interleaved = Vec::new();
    while interleaved.len() < limit {
        let mut progressed = false;
        for layer in &order {
            if interleaved.len() >= limit {
                break;
            }
            if let Some(next) = buckets.get_mut(layer).and_then(|b| b.pop_front()) {
                interleaved.push(next);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    interleaved
}
