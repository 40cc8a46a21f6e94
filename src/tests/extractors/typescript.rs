// TypeScript / JavaScript extractor

use crate::extractors::base::{RelationshipKind, SymbolKind};
use crate::tests::test_helpers::{extract, find};

const SERVICE: &str = r#"import { Repository } from "./repository";
import * as api from "./api";

export interface Named {
    name: string;
}

export class UserService extends BaseService implements Named {
    name: string = "users";

    constructor(private repo: Repository) {
        super();
    }

    async getUser(id: number): Promise<User> {
        return this.repo.find(id);
    }
}

export const formatUser = (user: User) => render(user);

function render(user: User): string {
    return user.name;
}
"#;

#[test]
fn test_declarations() {
    let results = extract("/w/src/services/user.ts", SERVICE);
    let symbols = &results.symbols;

    assert_eq!(find(symbols, "Named").kind, SymbolKind::Interface);
    assert_eq!(find(symbols, "UserService").kind, SymbolKind::Class);
    assert_eq!(find(symbols, "constructor").kind, SymbolKind::Constructor);
    assert_eq!(find(symbols, "getUser").kind, SymbolKind::Method);
    assert_eq!(find(symbols, "formatUser").kind, SymbolKind::Function);
    assert_eq!(find(symbols, "render").kind, SymbolKind::Function);

    let class_id = &find(symbols, "UserService").id;
    assert_eq!(find(symbols, "getUser").parent_id.as_ref(), Some(class_id));
}

#[test]
fn test_imports() {
    let results = extract("/w/src/services/user.ts", SERVICE);
    let imports: Vec<&str> = results
        .symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::Import)
        .map(|s| s.name.as_str())
        .collect();
    assert!(imports.contains(&"Repository"));
    assert!(imports.contains(&"api"));
}

#[test]
fn test_heritage_and_calls() {
    let results = extract("/w/src/services/user.ts", SERVICE);
    let class = find(&results.symbols, "UserService");
    let render = find(&results.symbols, "render");

    let extends = results
        .relationships
        .iter()
        .find(|r| r.kind == RelationshipKind::Extends && r.from_symbol_id == class.id)
        .unwrap();
    assert_eq!(extends.target_name(), Some("BaseService"));
    assert!(extends.is_unresolved());

    let implements = results
        .relationships
        .iter()
        .find(|r| r.kind == RelationshipKind::Implements)
        .unwrap();
    assert_eq!(implements.to_symbol_id, find(&results.symbols, "Named").id);

    let call = results
        .relationships
        .iter()
        .find(|r| r.kind == RelationshipKind::Calls && r.target_name() == Some("render"))
        .unwrap();
    assert_eq!(call.to_symbol_id, render.id);
    assert_eq!(call.confidence, 1.0);
}

#[test]
fn test_javascript_uses_the_same_extractor() {
    let source = "class Cart {\n  total() {\n    return sum(this.items);\n  }\n}\n\nfunction sum(items) {\n  return 0;\n}\n";
    let results = extract("/w/web/cart.js", source);

    assert_eq!(find(&results.symbols, "Cart").kind, SymbolKind::Class);
    assert_eq!(find(&results.symbols, "total").kind, SymbolKind::Method);
    assert!(results.symbols.iter().all(|s| s.language == "javascript"));

    let call = results
        .relationships
        .iter()
        .find(|r| r.target_name() == Some("sum"))
        .unwrap();
    assert_eq!(call.to_symbol_id, find(&results.symbols, "sum").id);
}
