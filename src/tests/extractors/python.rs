// Python extractor

use crate::extractors::base::{RelationshipKind, SymbolKind, UNRESOLVED_CONFIDENCE, Visibility};
use crate::tests::test_helpers::{extract, find};

const SERVICE: &str = r#"import os
from typing import List as L

MAX_RETRIES = 3


class UserService(BaseService):
    """Loads users."""

    timeout = 30

    def __init__(self, repo):
        self.repo = repo

    def get_user(self, user_id: int):
        return self.repo.find(user_id)

    def _cache(self):
        return helper()


def helper():
    return format_name("x")
"#;

#[test]
fn test_extracts_classes_methods_and_module_bindings() {
    let results = extract("/w/service.py", SERVICE);
    let symbols = &results.symbols;

    let class = find(symbols, "UserService");
    assert_eq!(class.kind, SymbolKind::Class);
    assert_eq!(class.doc_comment.as_deref(), Some("Loads users."));
    assert_eq!(class.signature.as_deref(), Some("class UserService(BaseService)"));

    assert_eq!(find(symbols, "__init__").kind, SymbolKind::Constructor);
    assert_eq!(find(symbols, "get_user").kind, SymbolKind::Method);
    assert_eq!(find(symbols, "timeout").kind, SymbolKind::Property);
    assert_eq!(find(symbols, "helper").kind, SymbolKind::Function);
    assert_eq!(find(symbols, "MAX_RETRIES").kind, SymbolKind::Constant);
    assert_eq!(find(symbols, "_cache").visibility, Some(Visibility::Private));

    // assignments inside function bodies are not symbols
    assert!(symbols.iter().all(|s| s.name != "repo"));
}

#[test]
fn test_parents_precede_children() {
    let results = extract("/w/service.py", SERVICE);
    let class_id = find(&results.symbols, "UserService").id.clone();

    for name in ["__init__", "get_user", "_cache", "timeout"] {
        assert_eq!(find(&results.symbols, name).parent_id.as_ref(), Some(&class_id), "{}", name);
    }
    for (index, symbol) in results.symbols.iter().enumerate() {
        if let Some(parent) = &symbol.parent_id {
            let parent_index = results.symbols.iter().position(|s| &s.id == parent).unwrap();
            assert!(parent_index < index, "{} listed before its parent", symbol.name);
        }
    }
}

#[test]
fn test_imports_bind_local_names() {
    let results = extract("/w/service.py", SERVICE);
    let imports: Vec<&str> = results
        .symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::Import)
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(imports, vec!["os", "L"]);
}

#[test]
fn test_local_calls_resolve_and_foreign_calls_become_placeholders() {
    let results = extract("/w/service.py", SERVICE);
    let helper = find(&results.symbols, "helper");
    let cache = find(&results.symbols, "_cache");

    let local = results
        .relationships
        .iter()
        .find(|r| r.from_symbol_id == cache.id && r.kind == RelationshipKind::Calls)
        .unwrap();
    assert_eq!(local.to_symbol_id, helper.id);
    assert_eq!(local.confidence, 1.0);

    let foreign = results
        .relationships
        .iter()
        .find(|r| r.target_name() == Some("format_name"))
        .unwrap();
    assert_eq!(foreign.to_symbol_id, "unresolved:format_name");
    assert_eq!(foreign.confidence, UNRESOLVED_CONFIDENCE);
    assert_eq!(foreign.line_number, 23);

    let extends = results
        .relationships
        .iter()
        .find(|r| r.kind == RelationshipKind::Extends)
        .unwrap();
    assert_eq!(extends.target_name(), Some("BaseService"));
    assert!(extends.is_unresolved());
}

#[test]
fn test_types_from_annotations_and_literals() {
    let source = "from dataclasses import dataclass\n\n\n@dataclass\nclass Point:\n    x: int = 0\n\n\nNAME = \"origin\"\n\n\ndef norm(p) -> float:\n    return 0.0\n";
    let results = extract("/w/point.py", source);

    let x = find(&results.symbols, "x");
    let x_type = &results.types[&x.id];
    assert_eq!(x_type.resolved_type, "int");
    assert!(!x_type.is_inferred);

    let name = find(&results.symbols, "NAME");
    assert_eq!(results.types[&name.id].resolved_type, "str");
    assert!(results.types[&name.id].is_inferred);

    let norm = find(&results.symbols, "norm");
    assert_eq!(results.types[&norm.id].resolved_type, "float");

    let point = find(&results.symbols, "Point");
    assert!(point.signature.as_deref().unwrap().starts_with("@dataclass\nclass Point"));
}

#[test]
fn test_enum_and_protocol_kinds() {
    let source = "class Color(Enum):\n    RED = 1\n\n\nclass Greeter(Protocol):\n    def greet(self): ...\n";
    let results = extract("/w/kinds.py", source);
    assert_eq!(find(&results.symbols, "Color").kind, SymbolKind::Enum);
    assert_eq!(find(&results.symbols, "Greeter").kind, SymbolKind::Interface);
}

#[test]
fn test_extraction_is_deterministic() {
    let first = extract("/w/service.py", SERVICE);
    let second = extract("/w/service.py", SERVICE);
    assert_eq!(first.symbols, second.symbols);
    assert_eq!(first.relationships, second.relationships);
}
