// Symbol store: per-file commits, cascades, placeholders, embeddings and workspaces

use crate::database::{EmbeddingRecord, ResolvedTarget, SymbolDatabase};
use crate::extractors::base::{RelationshipKind, SymbolKind, UNRESOLVED_CONFIDENCE};
use crate::tests::test_helpers::{extract, file_info, find};
use tempfile::TempDir;

const UTILS: &str = "def foo() -> int:\n    return 1\n";
const MAIN: &str = "from utils import foo\n\n\ndef main():\n    return foo()\n";

fn store_with(files: &[(&str, &str)]) -> SymbolDatabase {
    let mut db = SymbolDatabase::new(":memory:").unwrap();
    for (path, content) in files {
        let results = extract(path, content);
        db.commit_file_extraction(&file_info(path, "/w", "python", content), &results)
            .unwrap();
    }
    db
}

fn embedding(symbol_id: &str) -> EmbeddingRecord {
    EmbeddingRecord {
        symbol_id: symbol_id.to_string(),
        vector: vec![0.6, 0.8],
        dimensions: 2,
        source_fingerprint: "fp".to_string(),
        layer: "unknown".to_string(),
        pattern_tags: vec!["service".to_string()],
        model: "test".to_string(),
    }
}

#[test]
fn test_commit_stores_symbols_relationships_and_types() {
    let db = store_with(&[("/w/utils.py", UTILS)]);

    let symbols = db.get_symbols_for_file("/w/utils.py").unwrap();
    let foo = find(&symbols, "foo");
    assert_eq!(foo.kind, SymbolKind::Function);
    assert_eq!(foo.start_line, 1);
    assert_eq!(
        db.get_type_for_symbol(&foo.id).unwrap().map(|t| t.resolved_type),
        Some("int".to_string())
    );
    assert_eq!(db.get_file_hash("/w/utils.py").unwrap(), Some(file_info("/w/utils.py", "/w", "python", UTILS).hash));
    assert_eq!(db.get_file_content("/w/utils.py").unwrap().as_deref(), Some(UTILS));
}

#[test]
fn test_recommit_returns_previous_ids_and_replaces_rows() {
    let mut db = store_with(&[("/w/utils.py", UTILS)]);
    let old_id = find(&db.get_symbols_for_file("/w/utils.py").unwrap(), "foo").id.clone();

    let renamed = "def bar():\n    return 1\n";
    let previous = db
        .commit_file_extraction(&file_info("/w/utils.py", "/w", "python", renamed), &extract("/w/utils.py", renamed))
        .unwrap();

    assert_eq!(previous, vec![old_id.clone()]);
    let names: Vec<String> = db
        .get_symbols_for_file("/w/utils.py")
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["bar".to_string()]);
    assert!(db.get_symbol_by_id(&old_id).unwrap().is_none());
    assert!(db.get_type_for_symbol(&old_id).unwrap().is_none());
}

#[test]
fn test_delete_file_cascades_and_reverts_incoming_edges() {
    let mut db = store_with(&[("/w/utils.py", UTILS), ("/w/main.py", MAIN)]);
    let foo = find(&db.get_symbols_for_file("/w/utils.py").unwrap(), "foo").clone();

    let pending = db.get_unresolved_relationships_named("foo").unwrap();
    assert_eq!(pending.len(), 1);
    db.apply_resolutions(&[ResolvedTarget {
        relationship_id: pending[0].id.clone(),
        to_symbol_id: foo.id.clone(),
        confidence: 1.0,
    }])
    .unwrap();
    db.store_embedding(&embedding(&foo.id)).unwrap();
    assert_eq!(db.get_relationships_to(&foo.id, Some(RelationshipKind::Calls)).unwrap().len(), 1);

    let removed = db.delete_file_data("/w/utils.py").unwrap();
    assert_eq!(removed, vec![foo.id.clone()]);

    assert!(db.get_file_info("/w/utils.py").unwrap().is_none());
    assert!(db.get_symbols_for_file("/w/utils.py").unwrap().is_empty());
    assert_eq!(db.count_embeddings().unwrap(), 0);

    let reverted = db.get_unresolved_relationships_named("foo").unwrap();
    assert_eq!(reverted.len(), 1);
    assert_eq!(reverted[0].to_symbol_id, "unresolved:foo");
    assert_eq!(reverted[0].confidence, UNRESOLVED_CONFIDENCE);
}

#[test]
fn test_apply_resolutions_ignores_missing_targets() {
    let mut db = store_with(&[("/w/main.py", MAIN)]);
    let pending = db.get_unresolved_relationships().unwrap();
    assert!(!pending.is_empty());

    let changed = db
        .apply_resolutions(&[ResolvedTarget {
            relationship_id: pending[0].id.clone(),
            to_symbol_id: "does-not-exist".to_string(),
            confidence: 1.0,
        }])
        .unwrap();
    assert_eq!(changed, 0);
    assert!(db.get_relationships_for_file("/w/main.py").unwrap().iter().all(|r| r.is_unresolved()));
}

#[test]
fn test_store_embedding_requires_existing_symbol() {
    let db = store_with(&[("/w/utils.py", UTILS)]);
    let foo = find(&db.get_symbols_for_file("/w/utils.py").unwrap(), "foo").id.clone();

    assert!(db.store_embedding(&embedding(&foo)).unwrap());
    assert!(!db.store_embedding(&embedding("gone")).unwrap());

    let loaded = db.get_embedding(&foo).unwrap().unwrap();
    assert_eq!(loaded.vector, vec![0.6, 0.8]);
    assert_eq!(loaded.pattern_tags, vec!["service".to_string()]);
    assert_eq!(db.load_all_embeddings().unwrap().len(), 1);
}

#[test]
fn test_symbols_without_embeddings_and_import_names() {
    let db = store_with(&[("/w/utils.py", UTILS), ("/w/main.py", MAIN)]);
    let foo = find(&db.get_symbols_for_file("/w/utils.py").unwrap(), "foo").id.clone();
    db.store_embedding(&embedding(&foo)).unwrap();

    let missing = db.get_symbols_without_embeddings("/w").unwrap();
    assert!(missing.iter().all(|s| s.id != foo));
    assert!(missing.iter().any(|s| s.name == "main"));

    let imports = db.get_import_names_for_file("/w/main.py").unwrap();
    assert!(imports.contains("foo"));
}

#[test]
fn test_find_symbol_at_position_prefers_innermost() {
    let source = "class Service:\n    def run(self):\n        return 1\n";
    let db = store_with(&[("/w/service.py", source)]);

    let inner = db.find_symbol_at_position("/w/service.py", 3, 8).unwrap().unwrap();
    assert_eq!(inner.name, "run");
    let outer = db.find_symbol_at_position("/w/service.py", 1, 2).unwrap().unwrap();
    assert_eq!(outer.name, "Service");
    assert!(db.find_symbol_at_position("/w/service.py", 40, 0).unwrap().is_none());
}

#[test]
fn test_workspace_registry_and_deletion() {
    let mut db = store_with(&[("/w/utils.py", UTILS), ("/w/main.py", MAIN)]);
    let other = "def helper():\n    return foo()\n";
    db.commit_file_extraction(&file_info("/x/other.py", "/x", "python", other), &extract("/x/other.py", other))
        .unwrap();

    let record = db.upsert_workspace("/w").unwrap();
    assert_eq!(record.file_count, 2);
    db.upsert_workspace("/x").unwrap();
    assert_eq!(db.list_workspaces().unwrap().len(), 2);
    assert_eq!(db.find_workspace_for_path("/w/main.py").unwrap().as_deref(), Some("/w"));
    assert_eq!(db.find_workspace_for_path("/wx/main.py").unwrap(), None);

    let stats = db.delete_workspace_data("/w").unwrap();
    assert_eq!(stats.files_deleted, 2);
    assert_eq!(stats.symbols_deleted as usize, stats.deleted_symbol_ids.len());
    assert!(db.get_workspace("/w").unwrap().is_none());
    assert_eq!(db.get_file_paths_for_workspace("/x").unwrap(), vec!["/x/other.py".to_string()]);
}

#[test]
fn test_reader_sees_committed_writes() {
    let dir = TempDir::new().unwrap();
    let mut writer = SymbolDatabase::new(dir.path().join("marlin.db")).unwrap();
    let reader = writer.open_reader().unwrap();

    writer
        .commit_file_extraction(&file_info("/w/utils.py", "/w", "python", UTILS), &extract("/w/utils.py", UTILS))
        .unwrap();

    assert_eq!(reader.get_symbols_by_name("foo").unwrap().len(), 1);
    assert!(reader.ping());
    assert_eq!(reader.get_stats().unwrap().total_files, 1);
}

#[test]
fn test_in_memory_store_has_no_reader() {
    let db = SymbolDatabase::new(":memory:").unwrap();
    assert!(db.open_reader().is_err());
}
