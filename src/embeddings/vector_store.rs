// Vector Store Module
//
// Vectors live in memory keyed by symbol id, with an HNSW graph over them for approximate
// nearest-neighbour search. The graph is rebuilt once a batch of embeddings settles; until then,
// and whenever it is missing, searches fall back to a brute-force cosine scan. The SQLite
// embeddings table is the durable copy and is reloaded by `initialize`.

use anyhow::{Result, anyhow};
use hnsw_rs::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::database::SymbolDatabase;

const HNSW_MAX_LAYERS: usize = 16;
const HNSW_MAX_CONNECTIONS: usize = 32;
const HNSW_EF_CONSTRUCTION: usize = 400;

#[derive(Debug, Clone)]
pub struct SimilarityResult {
    pub symbol_id: String,
    pub similarity_score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorStoreStats {
    pub vectors: usize,
    pub dimensions: usize,
    /// Points in the HNSW graph; 0 when it is not built
    pub indexed: usize,
    /// Vectors added or replaced since the graph was built
    pub pending_reindex: bool,
}

pub struct VectorStore {
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
    hnsw_index: Option<Hnsw<'static, f32, DistCosine>>,
    /// HNSW point id → symbol id
    id_mapping: Vec<String>,
    /// Upserts since the last build; the graph misses those vectors
    dirty: bool,
    /// Removals since the last build; their points are still in the graph
    removed_since_build: usize,
}

impl VectorStore {
    /// Create a new vector store for embeddings of the given dimensions
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: HashMap::new(),
            hnsw_index: None,
            id_mapping: Vec::new(),
            dirty: false,
            removed_since_build: 0,
        }
    }

    /// Load every persisted embedding of matching width. Returns how many were loaded.
    pub fn initialize(&mut self, db: &SymbolDatabase) -> Result<usize> {
        let records = db.load_all_embeddings()?;
        let mut skipped = 0;
        for record in records {
            if record.vector.len() != self.dimensions {
                skipped += 1;
                continue;
            }
            self.vectors.insert(record.symbol_id, record.vector);
        }
        if skipped > 0 {
            warn!(
                "Ignored {} stored embeddings with a dimension other than {}",
                skipped, self.dimensions
            );
        }
        debug!("Vector store loaded {} embeddings", self.vectors.len());
        self.dirty = !self.vectors.is_empty();
        Ok(self.vectors.len())
    }

    pub fn store_symbol_embedding(&mut self, symbol_id: &str, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(anyhow!(
                "Vector dimensions {} do not match expected {}",
                vector.len(),
                self.dimensions
            ));
        }

        self.vectors.insert(symbol_id.to_string(), vector);
        self.dirty = true;
        Ok(())
    }

    pub fn remove_vector(&mut self, symbol_id: &str) {
        if self.vectors.remove(symbol_id).is_some() {
            self.removed_since_build += 1;
        }
    }

    pub fn remove_vectors(&mut self, symbol_ids: &[String]) {
        for id in symbol_ids {
            self.remove_vector(id);
        }
    }

    pub fn contains(&self, symbol_id: &str) -> bool {
        self.vectors.contains_key(symbol_id)
    }

    /// Search for similar vectors using cosine similarity
    pub fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarityResult>> {
        if query_vector.len() != self.dimensions {
            return Err(anyhow!(
                "Query vector dimensions {} do not match expected {}",
                query_vector.len(),
                self.dimensions
            ));
        }

        let mut results: Vec<SimilarityResult> = self
            .vectors
            .iter()
            .filter_map(|(symbol_id, vector)| {
                let similarity = cosine_similarity(query_vector, vector);
                (similarity >= threshold).then(|| SimilarityResult {
                    symbol_id: symbol_id.clone(),
                    similarity_score: similarity,
                })
            })
            .collect();

        sort_results(&mut results);
        results.truncate(limit);

        Ok(results)
    }

    /// Build the HNSW graph over every stored vector
    pub fn build_hnsw_index(&mut self) -> Result<()> {
        if self.vectors.is_empty() {
            return Err(anyhow!("Cannot build HNSW index: no vectors stored"));
        }

        let nb_elem = self.vectors.len();
        let mut hnsw = Hnsw::<'static, f32, DistCosine>::new(
            HNSW_MAX_CONNECTIONS,
            nb_elem,
            HNSW_MAX_LAYERS,
            HNSW_EF_CONSTRUCTION,
            DistCosine {},
        );

        // Sorted for a deterministic graph
        let mut sorted: Vec<(&String, &Vec<f32>)> = self.vectors.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut id_mapping = Vec::with_capacity(nb_elem);
        let mut data = Vec::with_capacity(nb_elem);
        for (idx, (symbol_id, vector)) in sorted.into_iter().enumerate() {
            id_mapping.push(symbol_id.clone());
            data.push((vector, idx));
        }
        hnsw.parallel_insert(&data);
        hnsw.set_searching_mode(true);

        self.hnsw_index = Some(hnsw);
        self.id_mapping = id_mapping;
        self.dirty = false;
        self.removed_since_build = 0;
        debug!("HNSW index built over {} vectors", nb_elem);
        Ok(())
    }

    pub fn has_hnsw_index(&self) -> bool {
        self.hnsw_index.is_some()
    }

    /// Whether vectors were added or replaced after the graph was built (or it never was)
    pub fn needs_rebuild(&self) -> bool {
        !self.vectors.is_empty() && (self.dirty || self.hnsw_index.is_none())
    }

    /// Approximate search over the HNSW graph, rescored with exact cosine similarity
    pub fn search_similar_hnsw(
        &self,
        query_vector: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarityResult>> {
        if query_vector.len() != self.dimensions {
            return Err(anyhow!(
                "Query vector dimensions {} do not match expected {}",
                query_vector.len(),
                self.dimensions
            ));
        }
        let hnsw = self
            .hnsw_index
            .as_ref()
            .ok_or_else(|| anyhow!("HNSW index not built"))?;

        // Removed points still occupy slots in the graph
        let k = limit + self.removed_since_build;
        let ef_search = (k * 2).max(50);

        let mut results = Vec::new();
        for neighbour in hnsw.search(query_vector, k, ef_search) {
            let Some(symbol_id) = self.id_mapping.get(neighbour.d_id) else {
                warn!("HNSW returned unknown point {}", neighbour.d_id);
                continue;
            };
            let Some(vector) = self.vectors.get(symbol_id) else {
                continue;
            };
            let similarity = cosine_similarity(query_vector, vector);
            if similarity >= threshold {
                results.push(SimilarityResult {
                    symbol_id: symbol_id.clone(),
                    similarity_score: similarity,
                });
            }
        }

        sort_results(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    /// HNSW when the graph is current, brute force otherwise. The flag tells which one answered.
    pub fn search_with_fallback(
        &self,
        query_vector: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<(Vec<SimilarityResult>, bool)> {
        if self.has_hnsw_index() && !self.dirty {
            match self.search_similar_hnsw(query_vector, limit, threshold) {
                Ok(results) => return Ok((results, true)),
                Err(e) => debug!("HNSW search failed, scanning instead: {}", e),
            }
        }
        Ok((self.search_similar(query_vector, limit, threshold)?, false))
    }

    /// Internal consistency: graph and id mapping agree, and every vector has the store width
    pub fn check(&self) -> Result<()> {
        if let Some(hnsw) = &self.hnsw_index {
            let points = hnsw.get_nb_point();
            if points != self.id_mapping.len() {
                return Err(anyhow!(
                    "HNSW graph holds {} points but maps {} ids",
                    points,
                    self.id_mapping.len()
                ));
            }
        }
        if let Some((id, vector)) = self.vectors.iter().find(|(_, v)| v.len() != self.dimensions) {
            return Err(anyhow!(
                "Vector for {} has {} dimensions, expected {}",
                id,
                vector.len(),
                self.dimensions
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn stats(&self) -> VectorStoreStats {
        VectorStoreStats {
            vectors: self.vectors.len(),
            dimensions: self.dimensions,
            indexed: self.id_mapping.len(),
            pending_reindex: self.needs_rebuild(),
        }
    }
}

fn sort_results(results: &mut [SimilarityResult]) {
    results.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.symbol_id.cmp(&b.symbol_id))
    });
}

pub fn cosine_similarity(vec_a: &[f32], vec_b: &[f32]) -> f32 {
    if vec_a.len() != vec_b.len() {
        return 0.0;
    }

    let dot_product: f32 = vec_a.iter().zip(vec_b.iter()).map(|(a, b)| a * b).sum();
    let norm_a: f32 = vec_a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = vec_b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_dimensions() {
        let mut store = VectorStore::new(3);
        assert!(store.store_symbol_embedding("a", vec![1.0, 0.0]).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn search_orders_by_similarity() {
        let mut store = VectorStore::new(2);
        store.store_symbol_embedding("x", vec![1.0, 0.0]).unwrap();
        store.store_symbol_embedding("y", vec![0.0, 1.0]).unwrap();
        store.store_symbol_embedding("xy", vec![0.7, 0.7]).unwrap();

        let results = store.search_similar(&[1.0, 0.1], 10, 0.5).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.symbol_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "xy"]);
    }

    #[test]
    fn upsert_keeps_one_vector_per_symbol() {
        let mut store = VectorStore::new(2);
        store.store_symbol_embedding("a", vec![1.0, 0.0]).unwrap();
        store.store_symbol_embedding("a", vec![0.0, 1.0]).unwrap();
        assert_eq!(store.len(), 1);
        store.remove_vector("a");
        assert!(!store.contains("a"));
    }

    #[test]
    fn hnsw_agrees_with_brute_force_and_skips_removed() {
        let mut store = VectorStore::new(2);
        store.store_symbol_embedding("x", vec![1.0, 0.0]).unwrap();
        store.store_symbol_embedding("y", vec![0.0, 1.0]).unwrap();
        store.store_symbol_embedding("xy", vec![0.7, 0.7]).unwrap();
        assert!(store.needs_rebuild());

        store.build_hnsw_index().unwrap();
        assert!(!store.needs_rebuild());
        assert!(store.check().is_ok());

        let (results, used_hnsw) = store.search_with_fallback(&[1.0, 0.1], 10, 0.5).unwrap();
        assert!(used_hnsw);
        let ids: Vec<&str> = results.iter().map(|r| r.symbol_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "xy"]);

        store.remove_vector("x");
        let (results, _) = store.search_with_fallback(&[1.0, 0.1], 10, 0.5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol_id, "xy");
    }

    #[test]
    fn upserts_after_a_build_fall_back_to_scanning() {
        let mut store = VectorStore::new(2);
        store.store_symbol_embedding("x", vec![1.0, 0.0]).unwrap();
        store.build_hnsw_index().unwrap();
        store.store_symbol_embedding("y", vec![0.0, 1.0]).unwrap();
        assert!(store.needs_rebuild());

        let (results, used_hnsw) = store.search_with_fallback(&[0.0, 1.0], 10, 0.5).unwrap();
        assert!(!used_hnsw);
        assert_eq!(results[0].symbol_id, "y");
        assert!(VectorStore::new(2).build_hnsw_index().is_err());
    }
}
