// Cross-file navigation: definition, references, hover, call hierarchy

use crate::engine::{CallDirection, CodeIntelligenceEngine};
use crate::extractors::base::{RelationshipKind, SymbolKind};
use crate::tests::test_helpers::TestWorkspace;

const UTILS: &str = "def foo() -> int:\n    return 1\n";
const MAIN: &str = "from utils import foo\n\n\ndef main():\n    return foo()\n";
const OTHER: &str = "def caller():\n    return foo()\n";

async fn indexed(files: &[(&str, &str)]) -> (TestWorkspace, CodeIntelligenceEngine) {
    let ws = TestWorkspace::new();
    for (path, content) in files {
        ws.write(path, content);
    }
    let engine = ws.engine().await;
    engine.index_workspace(ws.root()).await.unwrap();
    (ws, engine)
}

#[tokio::test]
async fn test_go_to_definition_crosses_files() {
    let (ws, engine) = indexed(&[("utils.py", UTILS), ("main.py", MAIN)]).await;

    // `foo` in `return foo()`
    let definitions = engine.go_to_definition(ws.path("main.py"), 5, 11).await.unwrap();
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].name, "foo");
    assert_eq!(definitions[0].kind, SymbolKind::Function);
    assert_eq!(definitions[0].file_path, ws.path("utils.py").to_string_lossy());
    assert_eq!(definitions[0].start_line, 1);

    // on the import line the import itself is skipped
    let from_import = engine.go_to_definition(ws.path("main.py"), 1, 18).await.unwrap();
    assert_eq!(from_import[0].id, definitions[0].id);

    // whitespace selects nothing
    assert!(engine.go_to_definition(ws.path("main.py"), 2, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_imported_call_resolves_with_full_confidence() {
    let (ws, engine) = indexed(&[("utils.py", UTILS), ("main.py", MAIN)]).await;

    let references = engine.find_references(ws.path("utils.py"), 1, 4).await.unwrap();
    let call = references
        .iter()
        .find(|r| r.kind == RelationshipKind::Calls)
        .unwrap();
    assert_eq!(call.file_path, ws.path("main.py").to_string_lossy());
    assert_eq!(call.line, 5);
    assert_eq!(call.confidence, 1.0);
    assert!(!call.to_symbol_id.starts_with("unresolved:"));
}

#[tokio::test]
async fn test_unimported_call_resolves_with_lower_confidence() {
    let (ws, engine) = indexed(&[("utils.py", UTILS), ("main.py", MAIN), ("other.py", OTHER)]).await;

    let references = engine.find_references(ws.path("utils.py"), 1, 4).await.unwrap();
    assert_eq!(references.len(), 2);
    // ordered by file, then line
    assert!(references[0].file_path.ends_with("main.py"));
    assert!(references[1].file_path.ends_with("other.py"));
    assert_eq!(references[0].confidence, 1.0);
    assert_eq!(references[1].confidence, 0.8);
}

#[tokio::test]
async fn test_references_include_unresolved_callers() {
    let (ws, engine) = indexed(&[("other.py", OTHER)]).await;

    // no definition anywhere: the placeholder edge is still a reference to the name
    let references = engine.find_references(ws.path("other.py"), 2, 12).await.unwrap();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].to_symbol_id, "unresolved:foo");
    assert!(references[0].confidence < 1.0);
}

#[tokio::test]
async fn test_hover_shows_type_and_parent() {
    let source = "class Greeter:\n    def greet(self) -> str:\n        return \"hi\"\n";
    let (ws, engine) = indexed(&[("utils.py", UTILS), ("greeter.py", source)]).await;

    let foo = engine.hover(ws.path("utils.py"), 1, 5).await.unwrap().unwrap();
    assert_eq!(foo.symbol.name, "foo");
    assert_eq!(foo.type_info.map(|t| t.resolved_type), Some("int".to_string()));
    assert!(foo.parent.is_none());

    let greet = engine.hover(ws.path("greeter.py"), 2, 8).await.unwrap().unwrap();
    assert_eq!(greet.symbol.kind, SymbolKind::Method);
    assert_eq!(greet.parent.map(|p| p.name), Some("Greeter".to_string()));

    assert!(engine.hover(ws.path("missing.py"), 1, 0).await.unwrap().is_none());
}

#[tokio::test]
async fn test_call_hierarchy_in_both_directions() {
    let (ws, engine) = indexed(&[("utils.py", UTILS), ("main.py", MAIN)]).await;

    let incoming = engine
        .get_call_hierarchy(ws.path("utils.py"), 1, 4, CallDirection::Incoming)
        .await
        .unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].name, "main");
    assert_eq!(incoming[0].line, 5);

    let outgoing = engine
        .get_call_hierarchy(ws.path("main.py"), 4, 4, CallDirection::Outgoing)
        .await
        .unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].name, "foo");
    assert!(outgoing[0].symbol.is_some());
}

#[tokio::test]
async fn test_call_hierarchy_is_capped() {
    let ws = TestWorkspace::new();
    ws.write("utils.py", UTILS);
    let callers: String = (0..5)
        .map(|i| format!("def caller_{i}():\n    return foo()\n\n\n"))
        .collect();
    ws.write("callers.py", &callers);
    let mut config = ws.config();
    config.call_hierarchy_limit = 3;
    let engine = ws.engine_with(config, |_| {}).await;
    engine.index_workspace(ws.root()).await.unwrap();

    let incoming = engine
        .get_call_hierarchy(ws.path("utils.py"), 1, 4, CallDirection::Incoming)
        .await
        .unwrap();
    assert_eq!(incoming.len(), 3);
}

#[tokio::test]
async fn test_unresolved_outgoing_call_keeps_its_name() {
    let (ws, engine) = indexed(&[("other.py", OTHER)]).await;

    let outgoing = engine
        .get_call_hierarchy(ws.path("other.py"), 1, 4, CallDirection::Outgoing)
        .await
        .unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].name, "foo");
    assert!(outgoing[0].symbol.is_none());
    assert_eq!(outgoing[0].confidence, 0.5);
}

#[tokio::test]
async fn test_partial_confidence_edges_never_point_into_their_own_file() {
    let local = "def helper():\n    return 2\n\n\ndef run():\n    return helper() + foo() + missing()\n";
    let (ws, engine) = indexed(&[
        ("utils.py", UTILS),
        ("main.py", MAIN),
        ("other.py", OTHER),
        ("local.py", local),
    ])
    .await;

    let files: Vec<String> = ["utils.py", "main.py", "other.py", "local.py"]
        .iter()
        .map(|f| ws.path(f).to_string_lossy().into_owned())
        .collect();
    let state = engine.state().unwrap();
    let offenders = state
        .read(move |db| {
            let mut offenders = Vec::new();
            for file in &files {
                let own: Vec<String> = db.get_symbols_for_file(file)?.into_iter().map(|s| s.id).collect();
                for rel in db.get_relationships_for_file(file)? {
                    if rel.confidence < 1.0 && own.contains(&rel.to_symbol_id) {
                        offenders.push(rel.id);
                    }
                }
            }
            Ok(offenders)
        })
        .await
        .unwrap();
    assert!(offenders.is_empty());

    // the local call is linked at full confidence
    let references = engine.find_references(ws.path("local.py"), 1, 4).await.unwrap();
    assert!(references.iter().any(|r| r.confidence == 1.0 && r.line == 6));
}
