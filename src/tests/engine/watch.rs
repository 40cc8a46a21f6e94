// Incremental updates: change/delete handling and the live watcher

use std::collections::BTreeSet;
use std::time::Duration;

use tempfile::TempDir;

use crate::engine::{CodeIntelligenceEngine, IndexOutcome};
use crate::tests::test_helpers::{TestWorkspace, eventually};

const UTILS: &str = "def foo() -> int:\n    return 1\n";
const MAIN: &str = "from utils import foo\n\n\ndef main():\n    return foo()\n";
const UTILS_RENAMED: &str = "def bar() -> int:\n    return 1\n";
const MAIN_RENAMED: &str = "from utils import bar\n\n\ndef main():\n    return bar()\n";

type SymbolRow = (String, String, String, u32);
type EdgeRow = (String, String, String, u32, String, String);

/// Everything stored for a workspace, minus row ids and timestamps
async fn snapshot(engine: &CodeIntelligenceEngine) -> (BTreeSet<SymbolRow>, BTreeSet<EdgeRow>) {
    let state = engine.state().unwrap();
    state
        .read(|db| {
            let symbols = db
                .get_all_symbols()?
                .into_iter()
                .map(|s| (s.id, s.name, s.file_path, s.start_line))
                .collect();
            let mut edges = BTreeSet::new();
            for symbol in db.get_all_symbols()? {
                for rel in db.get_relationships_from(&symbol.id, None)? {
                    edges.insert((
                        rel.from_symbol_id,
                        rel.to_symbol_id,
                        rel.file_path,
                        rel.line_number,
                        rel.kind.as_str().to_string(),
                        format!("{:.2}", rel.confidence),
                    ));
                }
            }
            Ok((symbols, edges))
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_rename_leaves_no_residue() {
    let ws = TestWorkspace::new();
    let utils = ws.write("utils.py", UTILS);
    let main = ws.write("main.py", MAIN);
    let engine = ws.engine().await;
    engine.index_workspace(ws.root()).await.unwrap();

    std::fs::write(&utils, UTILS_RENAMED).unwrap();
    let outcome = engine.handle_file_changed(&utils).await.unwrap();
    assert!(matches!(outcome, IndexOutcome::Indexed { symbols: 1, .. }));
    std::fs::write(&main, MAIN_RENAMED).unwrap();
    engine.handle_file_changed(&main).await.unwrap();

    assert!(engine.search_exact("foo", 10).await.unwrap().is_empty());
    let references = engine.find_references(&utils, 1, 4).await.unwrap();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].confidence, 1.0);

    // Same state as indexing the final files from scratch
    let fresh_data = TempDir::new().unwrap();
    let mut config = ws.config();
    config.data_dir = fresh_data.path().to_path_buf();
    let fresh = ws.engine_with(config, |_| {}).await;
    fresh.index_workspace(ws.root()).await.unwrap();

    assert_eq!(snapshot(&engine).await, snapshot(&fresh).await);
}

#[tokio::test]
async fn test_definition_removed_then_restored() {
    let ws = TestWorkspace::new();
    let utils = ws.write("utils.py", UTILS);
    ws.write("main.py", MAIN);
    let engine = ws.engine().await;
    engine.index_workspace(ws.root()).await.unwrap();

    std::fs::remove_file(&utils).unwrap();
    engine.handle_file_deleted(&utils).await.unwrap();

    // the caller falls back to a placeholder instead of dangling
    let outgoing = engine
        .get_call_hierarchy(ws.path("main.py"), 4, 4, crate::engine::CallDirection::Outgoing)
        .await
        .unwrap();
    assert_eq!(outgoing.len(), 1);
    assert!(outgoing[0].symbol.is_none());
    assert_eq!(outgoing[0].confidence, 0.5);

    std::fs::write(&utils, UTILS).unwrap();
    engine.handle_file_changed(&utils).await.unwrap();

    let definitions = engine.go_to_definition(ws.path("main.py"), 5, 11).await.unwrap();
    assert_eq!(definitions.len(), 1);
    assert!(definitions[0].file_path.ends_with("utils.py"));
}

#[tokio::test]
async fn test_deleted_file_leaves_search_and_stats() {
    let ws = TestWorkspace::new();
    ws.write("utils.py", UTILS);
    let main = ws.write("main.py", MAIN);
    let engine = ws.engine().await;
    engine.index_workspace(ws.root()).await.unwrap();

    std::fs::remove_file(&main).unwrap();
    engine.handle_file_deleted(&main).await.unwrap();

    assert!(engine.search_exact("main", 10).await.unwrap().is_empty());
    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.structural_index_entries as i64, stats.symbols);
}

#[tokio::test]
async fn test_new_file_in_watched_workspace_is_indexed() {
    let ws = TestWorkspace::new();
    ws.write("utils.py", UTILS);
    let mut config = ws.config();
    config.watch = true;
    let engine = ws.engine_with(config, |_| {}).await;

    let report = engine.index_workspace(ws.root()).await.unwrap();
    assert!(report.watching);
    assert!(engine.health_check().await.watcher);

    tokio::time::sleep(Duration::from_millis(200)).await;
    ws.write("main.py", MAIN);

    let indexed = eventually(Duration::from_secs(10), || {
        let engine = engine.clone();
        async move {
            engine
                .search_exact("main", 10)
                .await
                .map(|hits| !hits.is_empty())
                .unwrap_or(false)
        }
    })
    .await;
    assert!(indexed);

    let resolved = eventually(Duration::from_secs(10), || {
        let engine = engine.clone();
        let utils = ws.path("utils.py");
        async move {
            engine
                .find_references(&utils, 1, 4)
                .await
                .map(|refs| refs.iter().any(|r| r.confidence == 1.0))
                .unwrap_or(false)
        }
    })
    .await;
    assert!(resolved);

    engine.shutdown().await.unwrap();
}
