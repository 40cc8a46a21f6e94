// Rust extractor

use crate::extractors::base::{RelationshipKind, SymbolKind, Visibility};
use crate::tests::test_helpers::{extract, find};

const USER: &str = r#"use std::collections::HashMap;
use crate::store::{Store, Cache as LocalCache};

/// A user record.
pub struct User {
    pub name: String,
}

pub trait Greeter {
    fn greet(&self) -> String;
}

impl Greeter for User {
    fn greet(&self) -> String {
        format_greeting(&self.name)
    }
}

impl User {
    pub fn new(name: String) -> Self {
        User { name }
    }
}

fn format_greeting(name: &str) -> String {
    name.to_string()
}
"#;

#[test]
fn test_items_and_doc_comments() {
    let results = extract("/w/src/user.rs", USER);
    let symbols = &results.symbols;

    let user = find(symbols, "User");
    assert_eq!(user.kind, SymbolKind::Struct);
    assert_eq!(user.visibility, Some(Visibility::Public));
    assert!(user.doc_comment.as_deref().unwrap().contains("A user record."));

    assert_eq!(find(symbols, "Greeter").kind, SymbolKind::Trait);
    assert_eq!(find(symbols, "format_greeting").kind, SymbolKind::Function);
    assert_eq!(find(symbols, "format_greeting").visibility, Some(Visibility::Private));

    let field = find(symbols, "name");
    assert_eq!(field.kind, SymbolKind::Field);
    assert_eq!(field.parent_id.as_ref(), Some(&user.id));
}

#[test]
fn test_impl_methods_hang_off_their_type() {
    let results = extract("/w/src/user.rs", USER);
    let user = find(&results.symbols, "User");
    let greeter = find(&results.symbols, "Greeter");

    let greets: Vec<_> = results.symbols.iter().filter(|s| s.name == "greet").collect();
    assert_eq!(greets.len(), 2);
    assert!(greets.iter().all(|s| s.kind == SymbolKind::Method));
    assert!(greets.iter().any(|s| s.parent_id.as_ref() == Some(&greeter.id)));
    assert!(greets.iter().any(|s| s.parent_id.as_ref() == Some(&user.id)));

    let new = find(&results.symbols, "new");
    assert_eq!(new.kind, SymbolKind::Method);
    assert_eq!(new.parent_id.as_ref(), Some(&user.id));
}

#[test]
fn test_use_declarations_become_imports() {
    let results = extract("/w/src/user.rs", USER);
    let mut imports: Vec<&str> = results
        .symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::Import)
        .map(|s| s.name.as_str())
        .collect();
    imports.sort();
    assert_eq!(imports, vec!["HashMap", "LocalCache", "Store"]);
}

#[test]
fn test_relationships() {
    let results = extract("/w/src/user.rs", USER);
    let user = find(&results.symbols, "User");
    let greeter = find(&results.symbols, "Greeter");
    let format_greeting = find(&results.symbols, "format_greeting");

    let implements = results
        .relationships
        .iter()
        .find(|r| r.kind == RelationshipKind::Implements)
        .unwrap();
    assert_eq!(implements.from_symbol_id, user.id);
    assert_eq!(implements.to_symbol_id, greeter.id);

    let call = results
        .relationships
        .iter()
        .find(|r| r.kind == RelationshipKind::Calls && r.target_name() == Some("format_greeting"))
        .unwrap();
    assert_eq!(call.to_symbol_id, format_greeting.id);
    assert_eq!(call.confidence, 1.0);

    let instantiates = results
        .relationships
        .iter()
        .find(|r| r.kind == RelationshipKind::Instantiates)
        .unwrap();
    assert_eq!(instantiates.to_symbol_id, user.id);

    let method_call = results
        .relationships
        .iter()
        .find(|r| r.target_name() == Some("to_string"))
        .unwrap();
    assert!(method_call.is_unresolved());
}

#[test]
fn test_declared_types() {
    let results = extract("/w/src/user.rs", USER);
    let format_greeting = find(&results.symbols, "format_greeting");
    assert_eq!(results.types[&format_greeting.id].resolved_type, "String");

    let field = find(&results.symbols, "name");
    assert_eq!(results.types[&field.id].resolved_type, "String");
    assert!(results.types.values().all(|t| t.language == "rust"));
}
