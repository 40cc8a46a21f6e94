// Marlin's Embeddings Module - semantic augmentation
//
// Symbols are classified, turned into embedding requests and handed to either the worker pool
// or the in-process fallback. One completion task persists every finished vector: store row
// first, then the in-memory vector store, and rebuilds the HNSW graph whenever the queue runs
// dry. Hybrid search turns on by itself once the vector store holds at least one vector.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::database::{EmbeddingRecord, SymbolDatabase};
use crate::extractors::base::Symbol;

pub mod classify;
pub mod fallback;
pub mod pool;
pub mod provider;
pub mod vector_store;

use self::classify::EmbeddingRequest;
use self::fallback::InProcessEmbedder;
use self::pool::{EmbeddingCompletion, EmbeddingWorkerPool};
use self::provider::EmbeddingProvider;
use self::vector_store::{SimilarityResult, VectorStore, VectorStoreStats};

pub use self::classify::{ArchitecturalLayer, Priority};
pub use self::provider::HashingEmbedder;

/// How embeddings are produced; fixed when the indexer starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticMode {
    Background,
    InProcess,
    Disabled,
}

/// Monotonic counters. `total` counts submitted requests; the other three count how each ended.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct EmbeddingProgress {
    pub completed: usize,
    pub failed: usize,
    /// Finished after the owning symbol had already been removed
    pub stale: usize,
    pub total: usize,
}

impl EmbeddingProgress {
    pub fn is_idle(&self) -> bool {
        self.completed + self.failed + self.stale >= self.total
    }
}

#[derive(Default)]
struct ProgressCounters {
    completed: AtomicUsize,
    failed: AtomicUsize,
    stale: AtomicUsize,
    total: AtomicUsize,
}

impl ProgressCounters {
    fn snapshot(&self) -> EmbeddingProgress {
        EmbeddingProgress {
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            stale: self.stale.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
        }
    }
}

enum Backend {
    Pool(Arc<EmbeddingWorkerPool>),
    InProcess(InProcessEmbedder),
    Disabled,
}

pub struct SemanticIndexer {
    mode: SemanticMode,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    backend: Backend,
    store: Option<Arc<Mutex<SymbolDatabase>>>,
    vector_store: Arc<RwLock<VectorStore>>,
    counters: Arc<ProgressCounters>,
    /// symbol id → fingerprint of the request currently queued or running
    in_flight: Arc<Mutex<HashMap<String, String>>>,
    completion_task: Mutex<Option<JoinHandle<()>>>,
}

impl SemanticIndexer {
    /// Load persisted vectors and pick the operating mode.
    ///
    /// Never fails because of the provider: a pool that cannot start degrades to in-process
    /// embedding, and a missing provider or `enabled = false` gives [`SemanticMode::Disabled`].
    /// Must be called inside a tokio runtime.
    pub fn start(
        config: &EmbeddingConfig,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        store: Arc<Mutex<SymbolDatabase>>,
    ) -> Result<Self> {
        let provider = provider.filter(|_| config.enabled);
        let Some(provider) = provider else {
            info!("🧠 Semantic search disabled");
            return Ok(Self::disabled(config.dimensions));
        };

        let mut vectors = VectorStore::new(provider.dimensions());
        {
            let db = lock_store(&store);
            let loaded = vectors.initialize(&db)?;
            if loaded > 0 {
                info!("🧠 Loaded {} persisted embeddings", loaded);
            }
        }
        if vectors.needs_rebuild() {
            vectors.build_hnsw_index()?;
        }
        let vector_store = Arc::new(RwLock::new(vectors));
        let counters = Arc::new(ProgressCounters::default());
        let in_flight = Arc::new(Mutex::new(HashMap::new()));

        let (tx, rx) = mpsc::unbounded_channel();
        let (mode, backend) = match EmbeddingWorkerPool::start(Arc::clone(&provider), config.workers, tx.clone()) {
            Ok(pool) => (SemanticMode::Background, Backend::Pool(Arc::new(pool))),
            Err(e) => {
                warn!("⚠️ Embedding worker pool failed to start, using in-process embedding: {:#}", e);
                let fallback = InProcessEmbedder::start(Arc::clone(&provider), config.fallback_batch_size, tx);
                (SemanticMode::InProcess, Backend::InProcess(fallback))
            }
        };

        let completion_task = tokio::spawn(run_completions(
            rx,
            Arc::clone(&store),
            Arc::clone(&vector_store),
            Arc::clone(&counters),
            Arc::clone(&in_flight),
            provider.name().to_string(),
        ));

        info!("🧠 Semantic indexer ready ({:?} mode, {} dimensions)", mode, provider.dimensions());

        Ok(Self {
            mode,
            provider: Some(provider),
            backend,
            store: Some(store),
            vector_store,
            counters,
            in_flight,
            completion_task: Mutex::new(Some(completion_task)),
        })
    }

    pub fn disabled(dimensions: usize) -> Self {
        Self {
            mode: SemanticMode::Disabled,
            provider: None,
            backend: Backend::Disabled,
            store: None,
            vector_store: Arc::new(RwLock::new(VectorStore::new(dimensions))),
            counters: Arc::new(ProgressCounters::default()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            completion_task: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> SemanticMode {
        self.mode
    }

    /// Queue embedding work for `symbols` of the workspace at `workspace_root`, high tier
    /// first. Returns how many were submitted.
    ///
    /// Symbols with empty content and requests already in flight with the same fingerprint
    /// are skipped.
    pub fn enqueue(&self, symbols: &[Symbol], workspace_root: &str) -> usize {
        if self.mode == SemanticMode::Disabled {
            return 0;
        }

        let mut requests: Vec<EmbeddingRequest> = {
            let mut in_flight = lock_in_flight(&self.in_flight);
            symbols
                .iter()
                .filter_map(|symbol| EmbeddingRequest::from_symbol(symbol, workspace_root))
                .filter(|request| {
                    if in_flight.get(&request.symbol_id) == Some(&request.fingerprint) {
                        return false;
                    }
                    in_flight.insert(request.symbol_id.clone(), request.fingerprint.clone());
                    true
                })
                .collect()
        };
        if requests.is_empty() {
            return 0;
        }

        // Stable: keeps extraction order within a tier
        requests.sort_by_key(|r| r.priority);
        let submitted = requests.len();
        self.counters.total.fetch_add(submitted, Ordering::AcqRel);

        match &self.backend {
            Backend::Pool(pool) => pool.submit_batch(requests),
            Backend::InProcess(fallback) => fallback.submit_batch(requests),
            Backend::Disabled => {}
        }

        debug!("Queued {} embedding requests", submitted);
        submitted
    }

    /// Forget everything embedded for symbols whose rows were deleted or rewritten.
    ///
    /// Requests still in flight for these ids are dropped as stale when they finish. The
    /// in-flight lock is held throughout, so a completion cannot persist in between.
    pub fn remove_symbols(&self, symbol_ids: &[String]) {
        if symbol_ids.is_empty() {
            return;
        }
        let mut in_flight = lock_in_flight(&self.in_flight);
        for id in symbol_ids {
            in_flight.remove(id);
        }
        if let Some(store) = &self.store {
            if let Err(e) = lock_store(store).delete_embeddings(symbol_ids) {
                warn!("Failed to delete embeddings of removed symbols: {}", e);
            }
        }
        write_vectors(&self.vector_store).remove_vectors(symbol_ids);
    }

    /// Hybrid search gate: open once at least one vector exists
    pub fn is_hybrid_available(&self) -> bool {
        read_vectors(&self.vector_store).len() > 0
    }

    pub fn vector_count(&self) -> usize {
        read_vectors(&self.vector_store).len()
    }

    pub fn vector_stats(&self) -> VectorStoreStats {
        read_vectors(&self.vector_store).stats()
    }

    /// The vector store is usable: enabled, lock intact, width matching the provider and
    /// graph consistent with its id mapping
    pub fn is_vector_store_healthy(&self) -> bool {
        let Some(provider) = &self.provider else {
            return false;
        };
        if self.vector_store.is_poisoned() {
            return false;
        }
        let vectors = read_vectors(&self.vector_store);
        if vectors.dimensions() != provider.dimensions() {
            return false;
        }
        match vectors.check() {
            Ok(()) => true,
            Err(e) => {
                warn!("Vector store inconsistent: {}", e);
                false
            }
        }
    }

    pub fn progress(&self) -> EmbeddingProgress {
        self.counters.snapshot()
    }

    /// Requests queued but not yet picked up
    pub fn pending(&self) -> usize {
        match &self.backend {
            Backend::Pool(pool) => pool.pending(),
            Backend::InProcess(fallback) => fallback.pending(),
            Backend::Disabled => 0,
        }
    }

    /// Whether the active backend is still accepting work
    pub fn is_embedder_running(&self) -> bool {
        match &self.backend {
            Backend::Pool(pool) => pool.is_running(),
            Backend::InProcess(fallback) => fallback.is_running(),
            Backend::Disabled => false,
        }
    }

    /// Vector-store search for a free-text query
    pub fn search_similar(&self, query: &str, limit: usize, threshold: f32) -> Result<Vec<SimilarityResult>> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| anyhow!("Semantic search is disabled"))?;
        let query_vector = provider.embed(query)?;
        let (results, used_hnsw) = read_vectors(&self.vector_store).search_with_fallback(&query_vector, limit, threshold)?;
        debug!("Similarity search: {} hits ({})", results.len(), if used_hnsw { "hnsw" } else { "scan" });
        Ok(results)
    }

    /// Poll until every submitted request has finished or `timeout` elapses.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.progress().is_idle() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop accepting work, drain the backend and stop persisting completions.
    pub async fn shutdown(&self) {
        match &self.backend {
            Backend::Pool(pool) => {
                let pool = Arc::clone(pool);
                if tokio::task::spawn_blocking(move || pool.shutdown()).await.is_err() {
                    warn!("Embedding pool shutdown task failed");
                }
            }
            Backend::InProcess(fallback) => fallback.shutdown(),
            Backend::Disabled => {}
        }

        let task = self
            .completion_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
        lock_in_flight(&self.in_flight).clear();
        debug!("Semantic indexer stopped");
    }
}

async fn run_completions(
    mut rx: UnboundedReceiver<EmbeddingCompletion>,
    store: Arc<Mutex<SymbolDatabase>>,
    vector_store: Arc<RwLock<VectorStore>>,
    counters: Arc<ProgressCounters>,
    in_flight: Arc<Mutex<HashMap<String, String>>>,
    model: String,
) {
    while let Some(EmbeddingCompletion { request, result }) = rx.recv().await {
        persist_completion(&request, result, &store, &vector_store, &counters, &in_flight, &model);

        // Queue drained: bring the HNSW graph up to date
        if counters.snapshot().is_idle() {
            let mut vectors = write_vectors(&vector_store);
            if vectors.needs_rebuild() {
                if let Err(e) = vectors.build_hnsw_index() {
                    warn!("Failed to rebuild HNSW index: {}", e);
                }
            }
        }
    }
}

fn persist_completion(
    request: &EmbeddingRequest,
    result: std::result::Result<Vec<f32>, String>,
    store: &Mutex<SymbolDatabase>,
    vector_store: &RwLock<VectorStore>,
    counters: &ProgressCounters,
    in_flight: &Mutex<HashMap<String, String>>,
    model: &str,
) {
    // Held until the vector is stored; `remove_symbols` takes it before clearing
    let mut pending = lock_in_flight(in_flight);
    match pending.get(&request.symbol_id) {
        Some(fingerprint) if *fingerprint == request.fingerprint => {
            pending.remove(&request.symbol_id);
        }
        _ => {
            // Superseded by a newer request, or the symbol was rewritten or removed meanwhile
            counters.stale.fetch_add(1, Ordering::AcqRel);
            return;
        }
    }

    let vector = match result {
        Ok(vector) => vector,
        Err(e) => {
            warn!("Embedding failed for symbol {}: {}", request.symbol_id, e);
            counters.failed.fetch_add(1, Ordering::AcqRel);
            return;
        }
    };

    let record = EmbeddingRecord {
        symbol_id: request.symbol_id.clone(),
        dimensions: vector.len(),
        vector,
        source_fingerprint: request.fingerprint.clone(),
        layer: request.layer.as_str().to_string(),
        pattern_tags: request.pattern_tags.clone(),
        model: model.to_string(),
    };

    let stored = lock_store(store).store_embedding(&record);
    match stored {
        Ok(true) => match write_vectors(vector_store).store_symbol_embedding(&record.symbol_id, record.vector) {
            Ok(()) => {
                counters.completed.fetch_add(1, Ordering::AcqRel);
            }
            Err(e) => {
                warn!("Vector store rejected embedding for {}: {}", request.symbol_id, e);
                counters.failed.fetch_add(1, Ordering::AcqRel);
            }
        },
        Ok(false) => {
            debug!("Symbol {} removed before its embedding finished", request.symbol_id);
            counters.stale.fetch_add(1, Ordering::AcqRel);
        }
        Err(e) => {
            warn!("Failed to persist embedding for {}: {}", request.symbol_id, e);
            counters.failed.fetch_add(1, Ordering::AcqRel);
        }
    }
    drop(pending);
}

pub(crate) fn lock_store(store: &Mutex<SymbolDatabase>) -> MutexGuard<'_, SymbolDatabase> {
    store.lock().unwrap_or_else(|poisoned| {
        warn!("Symbol store mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

fn lock_in_flight(in_flight: &Mutex<HashMap<String, String>>) -> MutexGuard<'_, HashMap<String, String>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_vectors(store: &RwLock<VectorStore>) -> RwLockReadGuard<'_, VectorStore> {
    store.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_vectors(store: &RwLock<VectorStore>) -> RwLockWriteGuard<'_, VectorStore> {
    store.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
