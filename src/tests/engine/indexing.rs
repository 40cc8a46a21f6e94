// Workspace and per-file indexing through the engine

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::engine::{CodeIntelligenceEngine, IndexOutcome};
use crate::error::EngineError;
use crate::extractors::ExtractorRegistry;
use crate::extractors::python::PythonExtractor;
use crate::search::SymbolSearchIndex;
use crate::tests::test_helpers::{CountingExtractor, TestWorkspace, UnhealthySearch};

const UTILS: &str = "def foo() -> int:\n    return 1\n";
const MAIN: &str = "from utils import foo\n\n\ndef main():\n    return foo()\n";

#[tokio::test]
async fn test_index_workspace_discovers_supported_files_only() {
    let ws = TestWorkspace::new();
    ws.write("utils.py", UTILS);
    ws.write("main.py", MAIN);
    ws.write("README.md", "# readme\n");
    ws.write("node_modules/dep/index.js", "function dep() {}\n");
    ws.write("target/debug/build.rs", "fn build() {}\n");
    let engine = ws.engine().await;

    let report = engine.index_workspace(ws.root()).await.unwrap();

    assert_eq!(report.root, ws.root().to_string_lossy());
    assert_eq!(report.files_discovered, 2);
    assert_eq!(report.files_indexed, 2);
    assert_eq!(report.files_failed, 0);
    assert!(report.symbols_indexed >= 3);
    assert_eq!(report.relationships_resolved, 1);
    assert!(!report.watching);

    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.files_by_language.get("python"), Some(&2));
    assert_eq!(stats.structural_index_entries as i64, stats.symbols);

    let workspaces = engine.list_indexed_workspaces().await.unwrap();
    assert_eq!(workspaces.len(), 1);
    assert_eq!(workspaces[0].root_path, ws.root().to_string_lossy());
    assert_eq!(workspaces[0].file_count, 2);
}

#[tokio::test]
async fn test_unchanged_files_are_not_extracted_again() {
    let ws = TestWorkspace::new();
    ws.write("utils.py", UTILS);
    let main = ws.write("main.py", MAIN);

    let (counting, runs) = CountingExtractor::wrap(Arc::new(PythonExtractor));
    let engine = ws
        .engine_with(ws.config(), |components| {
            components.extractors.register(Arc::new(counting));
        })
        .await;

    engine.index_workspace(ws.root()).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let second = engine.index_workspace(ws.root()).await.unwrap();
    assert_eq!(second.files_unchanged, 2);
    assert_eq!(second.files_indexed, 0);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    assert_eq!(engine.index_file(&main).await.unwrap(), IndexOutcome::Unchanged);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_symbol_ids_survive_unrelated_edits() {
    let ws = TestWorkspace::new();
    let utils = ws.write("utils.py", UTILS);
    let main = ws.write("main.py", MAIN);
    let engine = ws.engine().await;
    engine.index_workspace(ws.root()).await.unwrap();

    let before = engine.search_exact("foo", 10).await.unwrap();
    let foo_id = before
        .iter()
        .find(|r| r.symbol.file_path.ends_with("utils.py"))
        .map(|r| r.symbol.id.clone())
        .unwrap();

    std::fs::write(&main, format!("{}\n\ndef other():\n    return 2\n", MAIN)).unwrap();
    engine.handle_file_changed(&main).await.unwrap();
    std::fs::write(&utils, format!("{}# trailing comment\n", UTILS)).unwrap();
    let outcome = engine.handle_file_changed(&utils).await.unwrap();
    assert!(matches!(outcome, IndexOutcome::Indexed { .. }));

    let after = engine.search_exact("foo", 10).await.unwrap();
    assert!(after.iter().any(|r| r.symbol.id == foo_id));
}

#[tokio::test]
async fn test_oversized_file_is_skipped_without_a_row() {
    let ws = TestWorkspace::new();
    ws.write("small.py", "x = 1\n");
    let big = ws.write("big.py", &"value = 12345\n".repeat(20));
    let mut config = ws.config();
    config.max_file_size = 64;
    let engine = ws.engine_with(config, |_| {}).await;

    let report = engine.index_workspace(ws.root()).await.unwrap();
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.files_skipped, 1);

    let outcome = engine.index_file(&big).await.unwrap();
    assert!(matches!(outcome, IndexOutcome::SkippedOversized { size } if size > 64));
    assert_eq!(engine.get_stats().await.unwrap().files, 1);
}

#[tokio::test]
async fn test_file_growing_past_the_limit_loses_its_rows() {
    let ws = TestWorkspace::new();
    let grown = ws.write("a.py", "def alpha():\n    pass\n");
    let mut config = ws.config();
    config.max_file_size = 256;
    let engine = ws.engine_with(config, |_| {}).await;

    engine.index_workspace(ws.root()).await.unwrap();
    assert_eq!(engine.search_exact("alpha", 10).await.unwrap().len(), 1);

    let padding = "# filler line to push the file over the limit\n".repeat(20);
    std::fs::write(&grown, format!("def alpha():\n    pass\n{}", padding)).unwrap();

    let outcome = engine.index_file(&grown).await.unwrap();
    assert!(matches!(outcome, IndexOutcome::SkippedOversized { size } if size > 256));
    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.files, 0);
    assert_eq!(stats.symbols, 0);
    assert_eq!(stats.structural_index_entries, 0);
    assert!(engine.search_exact("alpha", 10).await.unwrap().is_empty());

    let report = engine.index_workspace(ws.root()).await.unwrap();
    assert_eq!(report.files_skipped, 1);
    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.symbols, 0);
    assert!(engine.search_exact("alpha", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_file_is_dropped_by_a_workspace_pass() {
    let ws = TestWorkspace::new();
    ws.write("small.py", "x = 1\n");
    let grown = ws.write("a.py", "def alpha():\n    pass\n");
    let mut config = ws.config();
    config.max_file_size = 256;
    let engine = ws.engine_with(config, |_| {}).await;
    engine.index_workspace(ws.root()).await.unwrap();

    std::fs::write(&grown, "def alpha():\n    pass\n".repeat(40)).unwrap();
    let report = engine.index_workspace(ws.root()).await.unwrap();
    assert_eq!(report.files_skipped, 1);

    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.structural_index_entries as i64, stats.symbols);
    assert!(engine.search_exact("alpha", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_health_reflects_the_structural_index() {
    let ws = TestWorkspace::new();
    ws.write("a.py", "def alpha():\n    pass\n");
    let engine = ws.engine().await;
    engine.index_workspace(ws.root()).await.unwrap();
    assert!(engine.health_check().await.structural_search);

    let broken = TestWorkspace::new();
    let engine = broken
        .engine_with(broken.config(), |components| {
            components.search = Some(Box::new(UnhealthySearch {
                inner: SymbolSearchIndex::in_memory().unwrap(),
            }));
        })
        .await;
    let health = engine.health_check().await;
    assert!(health.store);
    assert!(!health.structural_search);
    assert!(!health.is_structurally_healthy());
}

#[tokio::test]
async fn test_unreadable_root_is_an_error() {
    let ws = TestWorkspace::new();
    let engine = ws.engine().await;

    let result = engine.index_workspace(ws.path("does-not-exist")).await;
    assert!(matches!(result, Err(EngineError::WorkspaceUnreadable { .. })));
}

#[tokio::test]
async fn test_operations_before_initialize_fail() {
    let ws = TestWorkspace::new();
    let engine = CodeIntelligenceEngine::new(ws.config());
    assert!(!engine.is_initialized());

    assert!(matches!(
        engine.index_workspace(ws.root()).await,
        Err(EngineError::NotInitialized)
    ));
    assert!(matches!(
        engine.search_exact("foo", 10).await,
        Err(EngineError::NotInitialized)
    ));
    assert!(!engine.is_hybrid_available());
    assert!(engine.semantic_mode().is_none());

    let health = engine.health_check().await;
    assert!(!health.store);
    assert!(!health.is_structurally_healthy());
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let ws = TestWorkspace::new();
    let engine = ws.engine().await;
    engine.initialize().await.unwrap();
    engine.clone().initialize().await.unwrap();
    assert!(engine.is_initialized());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let ws = TestWorkspace::new();
    let mut config = ws.config();
    config.batch_size = 0;
    let engine = CodeIntelligenceEngine::new(config);

    assert!(matches!(engine.initialize().await, Err(EngineError::Config(_))));
    assert!(!engine.is_initialized());
}

#[tokio::test]
async fn test_language_without_extractor_is_skipped() {
    let ws = TestWorkspace::new();
    ws.write("app.py", UTILS);
    let lib = ws.write("lib.rs", "pub fn lib() {}\n");
    let engine = ws
        .engine_with(ws.config(), |components| {
            let mut registry = ExtractorRegistry::new();
            registry.register(Arc::new(PythonExtractor));
            components.extractors = registry;
        })
        .await;

    let report = engine.index_workspace(ws.root()).await.unwrap();
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.files_skipped, 1);

    let outcome = engine.index_file(&lib).await.unwrap();
    assert_eq!(
        outcome,
        IndexOutcome::SkippedNoExtractor {
            language: "rust".to_string()
        }
    );
}

#[tokio::test]
async fn test_files_gone_from_disk_are_removed_on_reindex() {
    let ws = TestWorkspace::new();
    ws.write("utils.py", UTILS);
    let main = ws.write("main.py", MAIN);
    let engine = ws.engine().await;
    engine.index_workspace(ws.root()).await.unwrap();

    std::fs::remove_file(&main).unwrap();
    let report = engine.index_workspace(ws.root()).await.unwrap();

    assert_eq!(report.files_removed, 1);
    assert!(engine.search_exact("main", 10).await.unwrap().is_empty());
    assert_eq!(engine.get_stats().await.unwrap().files, 1);
}

#[tokio::test]
async fn test_remove_workspace_drops_everything_under_root() {
    let ws = TestWorkspace::new();
    ws.write("utils.py", UTILS);
    ws.write("main.py", MAIN);
    let engine = ws.engine().await;
    engine.index_workspace(ws.root()).await.unwrap();

    let cleanup = engine.remove_workspace(ws.root()).await.unwrap();
    assert_eq!(cleanup.files_deleted, 2);

    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.files, 0);
    assert_eq!(stats.symbols, 0);
    assert_eq!(stats.structural_index_entries, 0);
    assert!(engine.list_indexed_workspaces().await.unwrap().is_empty());
    assert!(engine.search_exact("foo", 10).await.unwrap().is_empty());
}
