// TypeScript / JavaScript Extractor
//
// One implementation serves typescript, tsx and javascript: the grammars share the node
// kinds this extractor looks at, and TypeScript-only nodes simply never occur in JS trees.

use crate::extractors::base::{
    BaseExtractor, Relationship, RelationshipKind, Symbol, SymbolKind, SymbolOptions, TypeInfo,
    Visibility,
};
use crate::extractors::registry::{ExtractionInput, LanguageExtractor};
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

pub struct TypeScriptExtractor;

impl LanguageExtractor for TypeScriptExtractor {
    fn languages(&self) -> &'static [&'static str] {
        &["typescript", "tsx", "javascript"]
    }

    fn extract_symbols(&self, input: &ExtractionInput) -> Vec<Symbol> {
        let pass = TypeScriptPass::new(input);
        let mut symbols = Vec::new();
        pass.visit(input.tree.root_node(), &mut symbols, None, false);
        symbols
    }

    fn extract_relationships(&self, input: &ExtractionInput, symbols: &[Symbol]) -> Vec<Relationship> {
        let pass = TypeScriptPass::new(input);
        let mut relationships = Vec::new();
        pass.visit_relationships(input.tree.root_node(), symbols, &mut relationships);
        relationships
    }

    fn infer_types(&self, input: &ExtractionInput, symbols: &[Symbol]) -> HashMap<String, TypeInfo> {
        let pass = TypeScriptPass::new(input);
        let known: HashSet<&str> = symbols.iter().map(|s| s.id.as_str()).collect();
        let mut types = HashMap::new();
        pass.visit_types(input.tree.root_node(), &known, &mut types);
        types
    }
}

struct TypeScriptPass<'a> {
    base: BaseExtractor<'a>,
}

impl<'a> TypeScriptPass<'a> {
    fn new(input: &ExtractionInput<'a>) -> Self {
        Self {
            base: BaseExtractor::new(input.language, input.file_path, input.content),
        }
    }

    fn visit(&self, node: Node, symbols: &mut Vec<Symbol>, parent_id: Option<String>, in_function: bool) {
        if node.kind() == "import_statement" {
            symbols.extend(self.extract_imports(node, parent_id));
            return;
        }

        let mut next_parent = parent_id.clone();
        let mut next_in_function = in_function;

        let extracted = match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                self.extract_function(node, parent_id.clone(), SymbolKind::Function)
            }
            "class_declaration" | "abstract_class_declaration" | "class" => self.extract_class(node, parent_id.clone()),
            "interface_declaration" => self.extract_named(node, parent_id.clone(), SymbolKind::Interface),
            "type_alias_declaration" => self.extract_named(node, parent_id.clone(), SymbolKind::Type),
            "enum_declaration" => self.extract_named(node, parent_id.clone(), SymbolKind::Enum),
            "internal_module" | "module" => self.extract_named(node, parent_id.clone(), SymbolKind::Namespace),
            "method_definition" | "method_signature" | "abstract_method_signature" => {
                let kind = if self.base.get_field_text(&node, "name").as_deref() == Some("constructor") {
                    SymbolKind::Constructor
                } else {
                    SymbolKind::Method
                };
                self.extract_function(node, parent_id.clone(), kind)
            }
            "public_field_definition" | "field_definition" | "property_signature" => {
                self.extract_property(node, parent_id.clone())
            }
            "enum_assignment" => self.extract_named(node, parent_id.clone(), SymbolKind::EnumMember),
            "property_identifier" if node.parent().is_some_and(|p| p.kind() == "enum_body") => {
                let name = self.base.get_node_text(&node);
                Some(self.base.create_symbol(
                    &node,
                    name,
                    SymbolKind::EnumMember,
                    SymbolOptions {
                        visibility: Some(Visibility::Public),
                        parent_id: parent_id.clone(),
                        ..Default::default()
                    },
                ))
            }
            "variable_declarator" if !in_function => self.extract_variable(node, parent_id.clone()),
            _ => None,
        };

        if let Some(symbol) = extracted {
            next_parent = Some(symbol.id.clone());
            if symbol.kind.is_callable() {
                next_in_function = true;
            }
            symbols.push(symbol);
        } else if matches!(
            node.kind(),
            "arrow_function" | "function_expression" | "function" | "generator_function"
        ) {
            next_in_function = true;
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, symbols, next_parent.clone(), next_in_function);
        }
    }

    fn extract_function(&self, node: Node, parent_id: Option<String>, kind: SymbolKind) -> Option<Symbol> {
        let name = self.base.get_field_text(&node, "name")?;
        let is_async = self.has_child_kind(node, "async");

        let mut metadata = HashMap::new();
        metadata.insert("isAsync".to_string(), serde_json::json!(is_async));

        Some(self.base.create_symbol(
            &node,
            name.clone(),
            kind,
            SymbolOptions {
                signature: Some(self.header_text(node)),
                visibility: Some(self.visibility(node, &name)),
                parent_id,
                metadata: Some(metadata),
                doc_comment: self.find_doc_comment(node),
            },
        ))
    }

    fn extract_class(&self, node: Node, parent_id: Option<String>) -> Option<Symbol> {
        let name = self.base.get_field_text(&node, "name")?;
        let is_abstract = node.kind() == "abstract_class_declaration";

        let mut metadata = HashMap::new();
        metadata.insert("isAbstract".to_string(), serde_json::json!(is_abstract));
        let (extends, implements) = self.heritage(node);
        if !extends.is_empty() {
            metadata.insert(
                "extends".to_string(),
                serde_json::json!(extends.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>()),
            );
        }
        if !implements.is_empty() {
            metadata.insert(
                "implements".to_string(),
                serde_json::json!(implements.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>()),
            );
        }

        Some(self.base.create_symbol(
            &node,
            name.clone(),
            SymbolKind::Class,
            SymbolOptions {
                signature: Some(self.header_text(node)),
                visibility: Some(self.visibility(node, &name)),
                parent_id,
                metadata: Some(metadata),
                doc_comment: self.find_doc_comment(node),
            },
        ))
    }

    /// Declarations whose signature is their header (interfaces, enums, aliases, namespaces).
    fn extract_named(&self, node: Node, parent_id: Option<String>, kind: SymbolKind) -> Option<Symbol> {
        let name = self.base.get_field_text(&node, "name")?;
        Some(self.base.create_symbol(
            &node,
            name.clone(),
            kind,
            SymbolOptions {
                signature: Some(self.header_text(node)),
                visibility: Some(self.visibility(node, &name)),
                parent_id,
                doc_comment: self.find_doc_comment(node),
                ..Default::default()
            },
        ))
    }

    fn extract_property(&self, node: Node, parent_id: Option<String>) -> Option<Symbol> {
        let name = self
            .base
            .get_field_text(&node, "name")
            .or_else(|| self.base.get_field_text(&node, "property"))?;
        let signature = self
            .base
            .get_node_text(&node)
            .trim_end_matches([';', ','])
            .to_string();
        Some(self.base.create_symbol(
            &node,
            name.clone(),
            SymbolKind::Property,
            SymbolOptions {
                signature: Some(signature),
                visibility: Some(self.visibility(node, &name)),
                parent_id,
                doc_comment: self.find_doc_comment(node),
                ..Default::default()
            },
        ))
    }

    fn extract_variable(&self, node: Node, parent_id: Option<String>) -> Option<Symbol> {
        let name_node = node.child_by_field_name("name")?;
        if name_node.kind() != "identifier" {
            // destructuring patterns
            return None;
        }
        let name = self.base.get_node_text(&name_node);
        let value = node.child_by_field_name("value");
        let is_function = value.is_some_and(|v| {
            matches!(v.kind(), "arrow_function" | "function_expression" | "function")
        });
        let is_const = node
            .parent()
            .and_then(|decl| decl.child(0))
            .is_some_and(|keyword| keyword.kind() == "const");

        let kind = if is_function {
            SymbolKind::Function
        } else if is_const && is_constant_name(&name) {
            SymbolKind::Constant
        } else {
            SymbolKind::Variable
        };

        let signature = match (is_function, value) {
            (true, Some(function)) => format!("const {} = {}", name, self.header_text(function)),
            _ => self
                .base
                .get_node_text(&node)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
        };

        let declaration = node.parent().unwrap_or(node);
        Some(self.base.create_symbol(
            &node,
            name.clone(),
            kind,
            SymbolOptions {
                signature: Some(signature),
                visibility: Some(self.visibility(declaration, &name)),
                parent_id,
                doc_comment: self.find_doc_comment(declaration),
                ..Default::default()
            },
        ))
    }

    fn extract_imports(&self, node: Node, parent_id: Option<String>) -> Vec<Symbol> {
        let statement = self.base.get_node_text(&node);
        let source = self
            .base
            .get_field_text(&node, "source")
            .map(|s| s.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string());

        let mut bindings: Vec<(Node, String, String)> = Vec::new();
        let mut cursor = node.walk();
        for clause in node.children(&mut cursor).filter(|c| c.kind() == "import_clause") {
            let mut clause_cursor = clause.walk();
            for part in clause.named_children(&mut clause_cursor) {
                match part.kind() {
                    "identifier" => {
                        let name = self.base.get_node_text(&part);
                        bindings.push((part, name, "default".to_string()));
                    }
                    "namespace_import" => {
                        let mut ns_cursor = part.walk();
                        if let Some(ident) = part.named_children(&mut ns_cursor).find(|c| c.kind() == "identifier") {
                            bindings.push((ident, self.base.get_node_text(&ident), "*".to_string()));
                        }
                    }
                    "named_imports" => {
                        let mut named_cursor = part.walk();
                        for specifier in part
                            .named_children(&mut named_cursor)
                            .filter(|c| c.kind() == "import_specifier")
                        {
                            let Some(imported) = self.base.get_field_text(&specifier, "name") else {
                                continue;
                            };
                            let local = self
                                .base
                                .get_field_text(&specifier, "alias")
                                .unwrap_or_else(|| imported.clone());
                            bindings.push((specifier, local, imported));
                        }
                    }
                    _ => {}
                }
            }
        }

        bindings
            .into_iter()
            .map(|(binding, local, imported)| {
                let mut metadata = HashMap::new();
                metadata.insert("imported".to_string(), serde_json::json!(imported));
                if let Some(source) = &source {
                    metadata.insert("source".to_string(), serde_json::json!(source));
                }
                self.base.create_symbol(
                    &binding,
                    local,
                    SymbolKind::Import,
                    SymbolOptions {
                        signature: Some(statement.clone()),
                        visibility: Some(Visibility::Private),
                        parent_id: parent_id.clone(),
                        metadata: Some(metadata),
                        doc_comment: None,
                    },
                )
            })
            .collect()
    }

    fn visit_relationships(&self, node: Node, symbols: &[Symbol], out: &mut Vec<Relationship>) {
        match node.kind() {
            "call_expression" => {
                if let Some(callee) = node.child_by_field_name("function").and_then(|f| self.callee_name(f)) {
                    if let Some(caller) = self.base.find_containing_symbol(&node, symbols) {
                        out.push(self.base.link_by_name(caller, &callee, RelationshipKind::Calls, &node, symbols));
                    }
                }
            }
            "new_expression" => {
                if let Some(constructor) = node.child_by_field_name("constructor").and_then(|c| self.callee_name(c)) {
                    if let Some(owner) = self.base.find_containing_symbol(&node, symbols) {
                        out.push(self.base.link_by_name(owner, &constructor, RelationshipKind::Instantiates, &node, symbols));
                    }
                }
            }
            "class_declaration" | "abstract_class_declaration" | "class" => {
                if let Some(class_symbol) = self.symbol_for_node(&node, symbols) {
                    let (extends, implements) = self.heritage(node);
                    for (name, anchor) in extends {
                        out.push(self.base.link_by_name(class_symbol, &name, RelationshipKind::Extends, &anchor, symbols));
                    }
                    for (name, anchor) in implements {
                        out.push(self.base.link_by_name(class_symbol, &name, RelationshipKind::Implements, &anchor, symbols));
                    }
                }
            }
            "interface_declaration" => {
                if let Some(interface_symbol) = self.symbol_for_node(&node, symbols) {
                    let mut cursor = node.walk();
                    for clause in node.children(&mut cursor).filter(|c| c.kind() == "extends_type_clause") {
                        for (name, anchor) in self.type_names(clause) {
                            out.push(self.base.link_by_name(
                                interface_symbol,
                                &name,
                                RelationshipKind::Extends,
                                &anchor,
                                symbols,
                            ));
                        }
                    }
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit_relationships(child, symbols, out);
        }
    }

    fn visit_types(&self, node: Node, known: &HashSet<&str>, out: &mut HashMap<String, TypeInfo>) {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" | "method_definition" | "method_signature"
            | "abstract_method_signature" => {
                if let (Some(id), Some(return_type)) = (
                    self.id_for_node(&node, "name", known),
                    node.child_by_field_name("return_type"),
                ) {
                    out.insert(id.clone(), self.base.type_info(&id, &annotation_text(&self.base.get_node_text(&return_type)), false));
                }
            }
            "public_field_definition" | "property_signature" => {
                if let (Some(id), Some(annotation)) = (
                    self.id_for_node(&node, "name", known),
                    node.child_by_field_name("type"),
                ) {
                    out.insert(id.clone(), self.base.type_info(&id, &annotation_text(&self.base.get_node_text(&annotation)), false));
                }
            }
            "variable_declarator" => {
                if let Some(id) = self.id_for_node(&node, "name", known) {
                    if let Some(annotation) = node.child_by_field_name("type") {
                        out.insert(id.clone(), self.base.type_info(&id, &annotation_text(&self.base.get_node_text(&annotation)), false));
                    } else if let Some(inferred) = node.child_by_field_name("value").and_then(|v| self.literal_type(v)) {
                        out.insert(id.clone(), self.base.type_info(&id, &inferred, true));
                    }
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit_types(child, known, out);
        }
    }

    fn literal_type(&self, value: Node) -> Option<String> {
        let literal = match value.kind() {
            "string" | "template_string" => "string",
            "number" => "number",
            "true" | "false" => "boolean",
            "array" => "Array",
            "object" => "object",
            "null" => "null",
            "new_expression" => {
                let constructor = value.child_by_field_name("constructor")?;
                return self.callee_name(constructor);
            }
            _ => return None,
        };
        Some(literal.to_string())
    }

    fn id_for_node(&self, node: &Node, field: &str, known: &HashSet<&str>) -> Option<String> {
        let name = self.base.get_field_text(node, field)?;
        let position = node.start_position();
        let id = self
            .base
            .generate_id(&name, (position.row + 1) as u32, position.column as u32);
        known.contains(id.as_str()).then_some(id)
    }

    fn symbol_for_node<'s>(&self, node: &Node, symbols: &'s [Symbol]) -> Option<&'s Symbol> {
        let name = self.base.get_field_text(node, "name")?;
        let position = node.start_position();
        let id = self
            .base
            .generate_id(&name, (position.row + 1) as u32, position.column as u32);
        symbols.iter().find(|s| s.id == id)
    }

    /// (extends, implements) names of a class, each with the node they were written at.
    fn heritage<'t>(&self, class_node: Node<'t>) -> (Vec<(String, Node<'t>)>, Vec<(String, Node<'t>)>) {
        let mut extends = Vec::new();
        let mut implements = Vec::new();

        let mut cursor = class_node.walk();
        for heritage in class_node.children(&mut cursor).filter(|c| c.kind() == "class_heritage") {
            let mut heritage_cursor = heritage.walk();
            for clause in heritage.named_children(&mut heritage_cursor) {
                match clause.kind() {
                    "extends_clause" => extends.extend(self.type_names(clause)),
                    "implements_clause" => implements.extend(self.type_names(clause)),
                    // JavaScript: `class A extends B` puts the expression directly under the heritage
                    "identifier" | "member_expression" => {
                        if let Some(name) = self.callee_name(clause) {
                            extends.push((name, clause));
                        }
                    }
                    _ => {}
                }
            }
        }
        (extends, implements)
    }

    fn type_names<'t>(&self, clause: Node<'t>) -> Vec<(String, Node<'t>)> {
        let mut names = Vec::new();
        let mut cursor = clause.walk();
        for child in clause.named_children(&mut cursor) {
            let name = match child.kind() {
                "identifier" | "type_identifier" => Some(self.base.get_node_text(&child)),
                "member_expression" | "nested_type_identifier" => {
                    let text = self.base.get_node_text(&child);
                    text.rsplit('.').next().map(str::to_string)
                }
                "generic_type" => child
                    .child_by_field_name("name")
                    .map(|n| self.base.get_node_text(&n)),
                _ => None,
            };
            if let Some(name) = name {
                names.push((name, child));
            }
        }
        names
    }

    fn callee_name(&self, function: Node) -> Option<String> {
        match function.kind() {
            "identifier" => Some(self.base.get_node_text(&function)),
            "member_expression" => self.base.get_field_text(&function, "property"),
            _ => None,
        }
    }

    /// Declaration text up to its body, whitespace-collapsed.
    fn header_text(&self, node: Node) -> String {
        let end = node
            .child_by_field_name("body")
            .map(|body| body.start_byte())
            .unwrap_or(node.end_byte());
        let header = self.base.content.get(node.start_byte()..end).unwrap_or_default();
        header
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_end_matches(['{', ';', '='])
            .trim()
            .to_string()
    }

    fn visibility(&self, node: Node, name: &str) -> Visibility {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "accessibility_modifier" {
                return match self.base.get_node_text(&child).as_str() {
                    "private" => Visibility::Private,
                    "protected" => Visibility::Protected,
                    _ => Visibility::Public,
                };
            }
        }
        if name.starts_with('#') {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    fn has_child_kind(&self, node: Node, kind: &str) -> bool {
        let mut cursor = node.walk();
        node.children(&mut cursor).any(|c| c.kind() == kind)
    }

    fn find_doc_comment(&self, node: Node) -> Option<String> {
        // `export function f` keeps its comment above the export statement
        let anchor = match node.parent() {
            Some(parent) if parent.kind() == "export_statement" => parent,
            _ => node,
        };
        let raw = self.base.find_doc_comment(&anchor, &["/**"])?;
        let cleaned: Vec<&str> = raw
            .lines()
            .map(|line| {
                line.trim()
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

fn annotation_text(annotation: &str) -> String {
    annotation.trim().trim_start_matches(':').trim().to_string()
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
