// Rust Extractor
//
// Structs, enums, traits, functions, impl methods, modules, consts/statics, type aliases,
// unions and `use` imports. Methods declared in an `impl` hang off the implemented type when
// that type was already emitted earlier in the file.

use crate::extractors::base::{
    BaseExtractor, Relationship, RelationshipKind, Symbol, SymbolKind, SymbolOptions, TypeInfo,
    Visibility,
};
use crate::extractors::registry::{ExtractionInput, LanguageExtractor};
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

pub struct RustExtractor;

impl LanguageExtractor for RustExtractor {
    fn languages(&self) -> &'static [&'static str] {
        &["rust"]
    }

    fn extract_symbols(&self, input: &ExtractionInput) -> Vec<Symbol> {
        let pass = RustPass::new(input);
        let mut symbols = Vec::new();
        pass.walk_tree(input.tree.root_node(), &mut symbols, None, false);
        symbols
    }

    fn extract_relationships(&self, input: &ExtractionInput, symbols: &[Symbol]) -> Vec<Relationship> {
        let pass = RustPass::new(input);
        let mut relationships = Vec::new();
        pass.walk_tree_for_relationships(input.tree.root_node(), symbols, &mut relationships);
        relationships
    }

    fn infer_types(&self, input: &ExtractionInput, symbols: &[Symbol]) -> HashMap<String, TypeInfo> {
        let pass = RustPass::new(input);
        let known: HashSet<&str> = symbols.iter().map(|s| s.id.as_str()).collect();
        let mut types = HashMap::new();
        pass.walk_tree_for_types(input.tree.root_node(), &known, &mut types);
        types
    }
}

struct RustPass<'a> {
    base: BaseExtractor<'a>,
}

impl<'a> RustPass<'a> {
    fn new(input: &ExtractionInput<'a>) -> Self {
        Self {
            base: BaseExtractor::new(input.language, input.file_path, input.content),
        }
    }

    fn walk_tree(&self, node: Node, symbols: &mut Vec<Symbol>, parent_id: Option<String>, in_impl: bool) {
        match node.kind() {
            "impl_item" => {
                let owner_id = node
                    .child_by_field_name("type")
                    .map(|t| self.base_type_name(&t))
                    .and_then(|type_name| {
                        symbols
                            .iter()
                            .rev()
                            .find(|s| s.name == type_name && s.kind.is_type_like())
                            .map(|s| s.id.clone())
                    });
                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for child in body.children(&mut cursor) {
                        self.walk_tree(child, symbols, owner_id.clone().or(parent_id.clone()), true);
                    }
                }
                return;
            }
            "use_declaration" => {
                symbols.extend(self.extract_use(node, parent_id.clone()));
                return;
            }
            _ => {}
        }

        let mut next_parent = parent_id.clone();
        let mut child_in_impl = in_impl;
        if let Some(symbol) = self.extract_symbol(node, parent_id.clone(), in_impl) {
            next_parent = Some(symbol.id.clone());
            // Bodies of functions are not impl members even when the function is
            if symbol.kind.is_callable() {
                child_in_impl = false;
            }
            if symbol.kind == SymbolKind::Trait {
                child_in_impl = true;
            }
            symbols.push(symbol);
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_tree(child, symbols, next_parent.clone(), child_in_impl);
        }
    }

    fn extract_symbol(&self, node: Node, parent_id: Option<String>, in_impl: bool) -> Option<Symbol> {
        match node.kind() {
            "struct_item" => self.simple_item(node, parent_id, SymbolKind::Struct, "struct"),
            "enum_item" => self.simple_item(node, parent_id, SymbolKind::Enum, "enum"),
            "trait_item" => self.simple_item(node, parent_id, SymbolKind::Trait, "trait"),
            "union_item" => self.simple_item(node, parent_id, SymbolKind::Union, "union"),
            "mod_item" => self.simple_item(node, parent_id, SymbolKind::Module, "mod"),
            "function_item" | "function_signature_item" => self.extract_function(node, parent_id, in_impl),
            "const_item" => self.extract_binding(node, parent_id, SymbolKind::Constant, "const"),
            "static_item" => self.extract_binding(node, parent_id, SymbolKind::Variable, "static"),
            "type_item" => self.extract_type_alias(node, parent_id),
            "enum_variant" => {
                let name = self.base.get_field_text(&node, "name")?;
                Some(self.base.create_symbol(
                    &node,
                    name,
                    SymbolKind::EnumMember,
                    SymbolOptions {
                        signature: Some(self.base.get_node_text(&node)),
                        visibility: Some(Visibility::Public),
                        parent_id,
                        doc_comment: self.find_doc_comment(node),
                        ..Default::default()
                    },
                ))
            }
            "field_declaration" => {
                let name = self.base.get_field_text(&node, "name")?;
                let visibility = self.extract_visibility(node);
                Some(self.base.create_symbol(
                    &node,
                    name,
                    SymbolKind::Field,
                    SymbolOptions {
                        signature: Some(self.base.get_node_text(&node)),
                        visibility: Some(visibility),
                        parent_id,
                        doc_comment: self.find_doc_comment(node),
                        ..Default::default()
                    },
                ))
            }
            _ => None,
        }
    }

    /// struct/enum/trait/union/mod: `vis keyword Name<T>`
    fn simple_item(&self, node: Node, parent_id: Option<String>, kind: SymbolKind, keyword: &str) -> Option<Symbol> {
        let name = self.base.get_field_text(&node, "name")?;
        let visibility = self.extract_visibility(node);
        let type_params = self
            .base
            .get_field_text(&node, "type_parameters")
            .unwrap_or_default();

        let mut signature = String::new();
        if let Some(vis) = self.visibility_text(node) {
            signature.push_str(&vis);
            signature.push(' ');
        }
        signature.push_str(&format!("{} {}{}", keyword, name, type_params));

        let derives = self.derived_traits(node);
        let mut metadata = HashMap::new();
        if !derives.is_empty() {
            metadata.insert("derives".to_string(), serde_json::json!(derives));
        }

        Some(self.base.create_symbol(
            &node,
            name,
            kind,
            SymbolOptions {
                signature: Some(signature),
                visibility: Some(visibility),
                parent_id,
                metadata: (!metadata.is_empty()).then_some(metadata),
                doc_comment: self.find_doc_comment(node),
            },
        ))
    }

    fn extract_function(&self, node: Node, parent_id: Option<String>, in_impl: bool) -> Option<Symbol> {
        let name = self.base.get_field_text(&node, "name")?;
        let kind = if in_impl { SymbolKind::Method } else { SymbolKind::Function };

        let mut signature = String::new();
        if let Some(vis) = self.visibility_text(node) {
            signature.push_str(&vis);
            signature.push(' ');
        }
        let mut is_async = false;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "function_modifiers" {
                let modifiers = self.base.get_node_text(&child);
                is_async = modifiers.contains("async");
                signature.push_str(&modifiers);
                signature.push(' ');
            }
        }
        signature.push_str(&format!(
            "fn {}{}{}",
            name,
            self.base.get_field_text(&node, "type_parameters").unwrap_or_default(),
            self.base.get_field_text(&node, "parameters").unwrap_or_else(|| "()".to_string())
        ));
        if let Some(return_type) = self.base.get_field_text(&node, "return_type") {
            signature.push_str(&format!(" -> {}", return_type));
        }

        let mut metadata = HashMap::new();
        metadata.insert("isAsync".to_string(), serde_json::json!(is_async));

        Some(self.base.create_symbol(
            &node,
            name,
            kind,
            SymbolOptions {
                signature: Some(signature),
                visibility: Some(self.extract_visibility(node)),
                parent_id,
                metadata: Some(metadata),
                doc_comment: self.find_doc_comment(node),
            },
        ))
    }

    fn extract_binding(&self, node: Node, parent_id: Option<String>, kind: SymbolKind, keyword: &str) -> Option<Symbol> {
        let name = self.base.get_field_text(&node, "name")?;
        let type_text = self.base.get_field_text(&node, "type").unwrap_or_default();

        let mut signature = String::new();
        if let Some(vis) = self.visibility_text(node) {
            signature.push_str(&vis);
            signature.push(' ');
        }
        signature.push_str(&format!("{} {}: {}", keyword, name, type_text));

        Some(self.base.create_symbol(
            &node,
            name,
            kind,
            SymbolOptions {
                signature: Some(signature),
                visibility: Some(self.extract_visibility(node)),
                parent_id,
                doc_comment: self.find_doc_comment(node),
                ..Default::default()
            },
        ))
    }

    fn extract_type_alias(&self, node: Node, parent_id: Option<String>) -> Option<Symbol> {
        let name = self.base.get_field_text(&node, "name")?;
        let signature = self.base.get_node_text(&node).trim_end_matches(';').to_string();
        Some(self.base.create_symbol(
            &node,
            name,
            SymbolKind::Type,
            SymbolOptions {
                signature: Some(signature),
                visibility: Some(self.extract_visibility(node)),
                parent_id,
                doc_comment: self.find_doc_comment(node),
                ..Default::default()
            },
        ))
    }

    fn extract_use(&self, node: Node, parent_id: Option<String>) -> Vec<Symbol> {
        let statement = self.base.get_node_text(&node);
        let mut leaves = Vec::new();
        if let Some(argument) = node.child_by_field_name("argument") {
            self.collect_use_leaves(argument, &mut leaves);
        }

        leaves
            .into_iter()
            .map(|(leaf, name, path)| {
                let mut metadata = HashMap::new();
                metadata.insert("path".to_string(), serde_json::json!(path));
                self.base.create_symbol(
                    &leaf,
                    name,
                    SymbolKind::Import,
                    SymbolOptions {
                        signature: Some(statement.clone()),
                        visibility: Some(self.extract_visibility(node)),
                        parent_id: parent_id.clone(),
                        metadata: Some(metadata),
                        doc_comment: None,
                    },
                )
            })
            .collect()
    }

    /// (node, bound name, written path) for each name a `use` tree brings into scope
    fn collect_use_leaves<'t>(&self, node: Node<'t>, out: &mut Vec<(Node<'t>, String, String)>) {
        match node.kind() {
            "identifier" => {
                let name = self.base.get_node_text(&node);
                out.push((node, name.clone(), name));
            }
            "scoped_identifier" => {
                if let Some(name) = self.base.get_field_text(&node, "name") {
                    if name != "self" {
                        out.push((node, name, self.base.get_node_text(&node)));
                    }
                }
            }
            "use_as_clause" => {
                if let Some(alias) = self.base.get_field_text(&node, "alias") {
                    let path = self.base.get_field_text(&node, "path").unwrap_or_default();
                    out.push((node, alias, path));
                }
            }
            "use_list" => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.collect_use_leaves(child, out);
                }
            }
            "scoped_use_list" => {
                if let Some(list) = node.child_by_field_name("list") {
                    self.collect_use_leaves(list, out);
                }
            }
            _ => {}
        }
    }

    fn walk_tree_for_relationships(&self, node: Node, symbols: &[Symbol], out: &mut Vec<Relationship>) {
        match node.kind() {
            "call_expression" => {
                if let Some(callee) = node.child_by_field_name("function").and_then(|f| self.callee_name(f)) {
                    if let Some(caller) = self.base.find_containing_symbol(&node, symbols) {
                        out.push(self.base.link_by_name(caller, &callee, RelationshipKind::Calls, &node, symbols));
                    }
                }
            }
            "struct_expression" => {
                if let Some(type_node) = node.child_by_field_name("name") {
                    let type_name = self.base_type_name(&type_node);
                    if let Some(owner) = self.base.find_containing_symbol(&node, symbols) {
                        if owner.name != type_name {
                            out.push(self.base.link_by_name(owner, &type_name, RelationshipKind::Instantiates, &node, symbols));
                        }
                    }
                }
            }
            "impl_item" => {
                if let (Some(trait_node), Some(type_node)) =
                    (node.child_by_field_name("trait"), node.child_by_field_name("type"))
                {
                    let type_name = self.base_type_name(&type_node);
                    let trait_name = self.base_type_name(&trait_node);
                    if let Some(implementor) = symbols
                        .iter()
                        .find(|s| s.name == type_name && s.kind.is_type_like())
                    {
                        out.push(self.base.link_by_name(
                            implementor,
                            &trait_name,
                            RelationshipKind::Implements,
                            &trait_node,
                            symbols,
                        ));
                    }
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_tree_for_relationships(child, symbols, out);
        }
    }

    fn walk_tree_for_types(&self, node: Node, known: &HashSet<&str>, out: &mut HashMap<String, TypeInfo>) {
        let field = match node.kind() {
            "function_item" | "function_signature_item" => Some("return_type"),
            "const_item" | "static_item" | "field_declaration" => Some("type"),
            "type_item" => Some("type"),
            _ => None,
        };

        if let Some(field) = field {
            if let (Some(name), Some(type_text)) = (
                self.base.get_field_text(&node, "name"),
                self.base.get_field_text(&node, field),
            ) {
                let position = node.start_position();
                let id = self
                    .base
                    .generate_id(&name, (position.row + 1) as u32, position.column as u32);
                if known.contains(id.as_str()) {
                    out.insert(id.clone(), self.base.type_info(&id, &type_text, false));
                }
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_tree_for_types(child, known, out);
        }
    }

    fn callee_name(&self, function: Node) -> Option<String> {
        match function.kind() {
            "identifier" => Some(self.base.get_node_text(&function)),
            "scoped_identifier" => self.base.get_field_text(&function, "name"),
            "field_expression" => self.base.get_field_text(&function, "field"),
            "generic_function" => function
                .child_by_field_name("function")
                .and_then(|inner| self.callee_name(inner)),
            _ => None,
        }
    }

    /// `Vec<T>` → `Vec`, `crate::a::B` → `B`, `&mut Foo` → `Foo`
    fn base_type_name(&self, node: &Node) -> String {
        let text = self.base.get_node_text(node);
        let without_generics = text.split('<').next().unwrap_or(&text);
        let last = without_generics.rsplit("::").next().unwrap_or(without_generics);
        last.trim_start_matches('&')
            .trim_start_matches("mut ")
            .trim()
            .to_string()
    }

    fn visibility_text(&self, node: Node) -> Option<String> {
        let mut cursor = node.walk();
        let modifier = node
            .children(&mut cursor)
            .find(|c| c.kind() == "visibility_modifier");
        modifier.map(|m| self.base.get_node_text(&m))
    }

    fn extract_visibility(&self, node: Node) -> Visibility {
        match self.visibility_text(node) {
            Some(_) => Visibility::Public,
            None => Visibility::Private,
        }
    }

    /// Start of the attribute run directly above `node`, or `node` itself.
    fn attribute_anchor<'t>(&self, node: Node<'t>) -> Node<'t> {
        let mut anchor = node;
        while let Some(prev) = anchor.prev_sibling() {
            if prev.kind() == "attribute_item" {
                anchor = prev;
            } else {
                break;
            }
        }
        anchor
    }

    fn derived_traits(&self, node: Node) -> Vec<String> {
        let mut traits = Vec::new();
        let mut current = node.prev_sibling();
        while let Some(attr) = current {
            if attr.kind() != "attribute_item" {
                break;
            }
            let text = self.base.get_node_text(&attr);
            if let Some(inner) = text
                .strip_prefix("#[derive(")
                .and_then(|rest| rest.strip_suffix(")]"))
            {
                traits.extend(inner.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()));
            }
            current = attr.prev_sibling();
        }
        traits
    }

    fn find_doc_comment(&self, node: Node) -> Option<String> {
        let anchor = self.attribute_anchor(node);
        let raw = self.base.find_doc_comment(&anchor, &["///", "/**"])?;
        let cleaned: Vec<&str> = raw
            .lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches("///")
                    .trim_start_matches("/**")
                    .trim_end_matches("*/")
                    .trim_start_matches('*')
                    .trim()
            })
            .filter(|line| !line.is_empty())
            .collect();
        (!cleaned.is_empty()).then(|| cleaned.join("\n"))
    }
}
