//! The code-intelligence engine: one handle that owns the store, parser dispatch, extractor
//! registry, structural index, semantic indexer and file watcher.
//!
//! `CodeIntelligenceEngine` is cheap to clone. Every operation except [`initialize`] and
//! [`health_check`] fails with [`EngineError::NotInitialized`] until `initialize` has run.
//!
//! [`initialize`]: CodeIntelligenceEngine::initialize
//! [`health_check`]: CodeIntelligenceEngine::health_check

mod indexing;
mod queries;
pub mod resolver;
mod watch;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use serde::Serialize;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::database::{SymbolDatabase, WorkspaceCleanupStats, WorkspaceRecord};
use crate::embeddings::provider::{EmbeddingProvider, HashingEmbedder};
use crate::embeddings::vector_store::VectorStoreStats;
use crate::embeddings::{EmbeddingProgress, SemanticIndexer, SemanticMode, lock_store};
use crate::error::{EngineError, Result};
use crate::extractors::ExtractorRegistry;
use crate::health::{ComponentStatus, HealthReport};
use crate::parser::{ParserDispatch, TreeSitterDispatch};
use crate::search::{StructuralSearch, SymbolSearchIndex};
use crate::watcher::FileWatcher;

pub use indexing::{IndexMode, IndexOutcome, WorkspaceIndexReport};
pub use queries::{CallDirection, CallHierarchyItem, HoverInfo, ReferenceLocation};

/// Swappable collaborators. [`EngineComponents::defaults`] wires the built-in ones.
pub struct EngineComponents {
    pub parser: Arc<dyn ParserDispatch>,
    pub extractors: ExtractorRegistry,
    /// `None` builds a fresh in-memory [`SymbolSearchIndex`] at initialize
    pub search: Option<Box<dyn StructuralSearch>>,
    /// `None` disables the semantic layer
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl EngineComponents {
    pub fn defaults(config: &EngineConfig) -> Self {
        Self {
            parser: Arc::new(TreeSitterDispatch::new()),
            extractors: ExtractorRegistry::with_defaults(),
            search: None,
            embedder: Some(Arc::new(HashingEmbedder::new(config.embedding.dimensions))),
        }
    }
}

/// Everything that exists once `initialize` succeeded
pub(crate) struct EngineState {
    pub(crate) config: EngineConfig,
    /// Write connection
    pub(crate) store: Arc<Mutex<SymbolDatabase>>,
    /// Separate read connection; sees committed state only
    pub(crate) reader: Arc<Mutex<SymbolDatabase>>,
    pub(crate) parser: Arc<dyn ParserDispatch>,
    pub(crate) extractors: ExtractorRegistry,
    pub(crate) search: RwLock<Box<dyn StructuralSearch>>,
    pub(crate) semantic: SemanticIndexer,
    pub(crate) watcher: OnceCell<FileWatcher>,
}

#[derive(Clone)]
pub struct CodeIntelligenceEngine {
    config: Arc<EngineConfig>,
    components: Arc<Mutex<Option<EngineComponents>>>,
    state: Arc<OnceCell<Arc<EngineState>>>,
}

/// Counts across the store plus embedding progress
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub files: i64,
    pub symbols: i64,
    pub relationships: i64,
    pub types: i64,
    pub embeddings: i64,
    pub workspaces: i64,
    pub files_by_language: HashMap<String, i64>,
    pub db_size_mb: f64,
    pub structural_index_entries: usize,
    pub vector_store: VectorStoreStats,
    pub embedding_progress: EmbeddingProgress,
    pub semantic_mode: SemanticMode,
}

impl CodeIntelligenceEngine {
    pub fn new(config: EngineConfig) -> Self {
        let components = EngineComponents::defaults(&config);
        Self::with_components(config, components)
    }

    pub fn with_components(config: EngineConfig, components: EngineComponents) -> Self {
        Self {
            config: Arc::new(config),
            components: Arc::new(Mutex::new(Some(components))),
            state: Arc::new(OnceCell::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open the store, warm the structural index and start the semantic layer.
    ///
    /// A second call is a no-op. Semantic startup problems never fail this call; the engine
    /// runs structural-only instead.
    pub async fn initialize(&self) -> Result<()> {
        self.state
            .get_or_try_init(|| async { self.build_state().await.map(Arc::new) })
            .await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized()
    }

    async fn build_state(&self) -> Result<EngineState> {
        let config = (*self.config).clone();
        config
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        info!("🚀 Initializing code intelligence engine in {}", config.data_dir.display());

        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| EngineError::StoreUnavailable(anyhow!("Cannot create {}: {}", config.data_dir.display(), e)))?;

        let db_path = config.database_path();
        let (store, reader) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let store = SymbolDatabase::new(&db_path)?;
            let reader = store.open_reader()?;
            Ok((store, reader))
        })
        .await
        .map_err(|e| EngineError::StoreUnavailable(anyhow!("Store task failed: {}", e)))?
        .map_err(EngineError::StoreUnavailable)?;

        let components = self
            .components
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .unwrap_or_else(|| EngineComponents::defaults(&config));

        // Warm start: everything committed earlier is searchable immediately
        let mut search = match components.search {
            Some(search) => search,
            None => Box::new(SymbolSearchIndex::in_memory().map_err(EngineError::Internal)?),
        };
        {
            let symbols = store.get_all_symbols().map_err(EngineError::StoreUnavailable)?;
            let types = store.get_all_types().map_err(EngineError::StoreUnavailable)?;
            if !symbols.is_empty() {
                info!("📚 Loaded {} stored symbols into the structural index", symbols.len());
            }
            search.rebuild_index(symbols, &types)?;
        }

        let store = Arc::new(Mutex::new(store));
        let semantic = match SemanticIndexer::start(&config.embedding, components.embedder, Arc::clone(&store)) {
            Ok(semantic) => semantic,
            Err(e) => {
                warn!("⚠️ Semantic layer unavailable, continuing structural-only: {:#}", e);
                SemanticIndexer::disabled(config.embedding.dimensions)
            }
        };

        info!("✅ Engine ready ({} languages)", components.extractors.languages().len());

        Ok(EngineState {
            config,
            store,
            reader: Arc::new(Mutex::new(reader)),
            parser: components.parser,
            extractors: components.extractors,
            search: RwLock::new(search),
            semantic,
            watcher: OnceCell::new(),
        })
    }

    pub(crate) fn state(&self) -> Result<Arc<EngineState>> {
        self.state.get().cloned().ok_or(EngineError::NotInitialized)
    }

    /// Index every supported file under `root`, then resolve, rebuild the structural index,
    /// schedule embeddings and arm the watcher. Returns before embeddings finish.
    pub async fn index_workspace(&self, root: impl AsRef<Path>) -> Result<WorkspaceIndexReport> {
        let state = self.state()?;
        indexing::index_workspace(&state, root.as_ref()).await
    }

    /// Index a single file outside a workspace pass.
    pub async fn index_file(&self, path: impl AsRef<Path>) -> Result<IndexOutcome> {
        let state = self.state()?;
        Ok(indexing::index_file(&state, path.as_ref(), IndexMode::Incremental).await)
    }

    /// Clear-then-reindex, as done for a watcher change event
    pub async fn handle_file_changed(&self, path: impl AsRef<Path>) -> Result<IndexOutcome> {
        let state = self.state()?;
        Ok(watch::handle_file_changed(&state, path.as_ref()).await)
    }

    /// Clear-and-deindex, as done for a watcher delete event
    pub async fn handle_file_deleted(&self, path: impl AsRef<Path>) -> Result<()> {
        let state = self.state()?;
        watch::handle_file_deleted(&state, path.as_ref()).await;
        Ok(())
    }

    /// Start watching `root` (the workspace pass does this on its own when `watch` is set)
    pub async fn watch_directory(&self, root: impl AsRef<Path>) -> Result<()> {
        let state = self.state()?;
        watch::arm_watcher(&state, root.as_ref())
            .await
            .map_err(|e| EngineError::Watcher(format!("{:#}", e)))
    }

    pub async fn list_indexed_workspaces(&self) -> Result<Vec<WorkspaceRecord>> {
        let state = self.state()?;
        state.read(|db| db.list_workspaces()).await
    }

    /// Delete a workspace's files, symbols, relationships, types and embeddings, drop it from
    /// the structural index and vector store, and stop watching it.
    pub async fn remove_workspace(&self, root: impl AsRef<Path>) -> Result<WorkspaceCleanupStats> {
        let state = self.state()?;
        let root = indexing::normalize_path(root.as_ref());

        let root_for_store = root.clone();
        let stats = state
            .write(move |db| db.delete_workspace_data(&root_for_store))
            .await?;

        state.search.write().await.remove_workspace(&root)?;
        state.semantic.remove_symbols(&stats.deleted_symbol_ids);
        if let Some(watcher) = state.watcher.get() {
            watcher.unwatch(Path::new(&root));
        }
        Ok(stats)
    }

    pub async fn get_stats(&self) -> Result<EngineStats> {
        let state = self.state()?;
        let db_stats = state.read(|db| db.get_stats()).await?;
        let structural_index_entries = state.search.read().await.len();

        Ok(EngineStats {
            files: db_stats.total_files,
            symbols: db_stats.total_symbols,
            relationships: db_stats.total_relationships,
            types: db_stats.total_types,
            embeddings: db_stats.total_embeddings,
            workspaces: db_stats.total_workspaces,
            files_by_language: db_stats.files_by_language.into_iter().collect(),
            db_size_mb: db_stats.db_size_mb,
            structural_index_entries,
            vector_store: state.semantic.vector_stats(),
            embedding_progress: state.semantic.progress(),
            semantic_mode: state.semantic.mode(),
        })
    }

    /// Independent health of every component. Never fails; an uninitialized engine reports
    /// every component as down.
    pub async fn health_check(&self) -> HealthReport {
        let Ok(state) = self.state() else {
            return HealthReport::from_components(ComponentStatus::default(), SemanticMode::Disabled, 0);
        };

        let (store_ok, symbol_count) = state
            .read(|db| Ok((db.ping(), db.get_stats().map(|s| s.total_symbols).unwrap_or(0))))
            .await
            .unwrap_or((false, 0));

        let parser_ok = !state.parser.supported_extensions().is_empty() && !state.extractors.is_empty();
        let structural_ok = match state.search.read().await.health() {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Structural index unhealthy: {:#}", e);
                false
            }
        };
        let watcher_ok = match state.watcher.get() {
            Some(watcher) => watcher.is_running(),
            None => true,
        };
        let semantic_enabled = state.semantic.mode() != SemanticMode::Disabled;

        let status = ComponentStatus {
            store: store_ok,
            parser: parser_ok,
            structural_search: structural_ok,
            watcher: watcher_ok,
            vector_store: semantic_enabled && state.semantic.is_vector_store_healthy(),
            embedder: semantic_enabled && state.semantic.is_embedder_running(),
            hybrid_search: state.semantic.is_hybrid_available(),
        };
        HealthReport::from_components(status, state.semantic.mode(), symbol_count)
    }

    /// Whether hybrid search would currently be attempted
    pub fn is_hybrid_available(&self) -> bool {
        self.state()
            .map(|state| state.semantic.is_hybrid_available())
            .unwrap_or(false)
    }

    pub fn semantic_mode(&self) -> Option<SemanticMode> {
        self.state().ok().map(|state| state.semantic.mode())
    }

    /// Wait for queued embeddings; `false` when `timeout` elapsed first.
    pub async fn wait_for_embeddings(&self, timeout: Duration) -> Result<bool> {
        let state = self.state()?;
        Ok(state.semantic.wait_until_idle(timeout).await)
    }

    /// Stop watchers and drain the embedding backend. In-flight embeddings may be lost.
    pub async fn shutdown(&self) -> Result<()> {
        let state = self.state()?;
        if let Some(watcher) = state.watcher.get() {
            watcher.stop();
        }
        state.semantic.shutdown().await;
        info!("👋 Engine shut down");
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config.data_dir.clone()
    }
}

impl EngineState {
    /// Run `f` against the write connection on the blocking pool
    pub(crate) async fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SymbolDatabase) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        run_on_store(Arc::clone(&self.store), f).await
    }

    /// Run `f` against the read connection on the blocking pool
    pub(crate) async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SymbolDatabase) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        run_on_store(Arc::clone(&self.reader), f).await
    }
}

async fn run_on_store<T, F>(store: Arc<Mutex<SymbolDatabase>>, f: F) -> Result<T>
where
    F: FnOnce(&mut SymbolDatabase) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut db = lock_store(&store);
        f(&mut db)
    })
    .await
    .map_err(|e| EngineError::Internal(anyhow!("Store task failed: {}", e)))?
    .map_err(EngineError::Internal)
}
