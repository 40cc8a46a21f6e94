use crate::extractors::base::{
    BaseExtractor, Relationship, RelationshipKind, Symbol, SymbolKind, SymbolOptions, TypeInfo,
    Visibility,
};
use crate::extractors::registry::{ExtractionInput, LanguageExtractor};
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

/// Python extractor: classes, functions, methods, module/class level assignments and imports.
pub struct PythonExtractor;

#[derive(Clone, Copy, PartialEq)]
enum Scope {
    Module,
    Class,
    Function,
}

impl LanguageExtractor for PythonExtractor {
    fn languages(&self) -> &'static [&'static str] {
        &["python"]
    }

    fn extract_symbols(&self, input: &ExtractionInput) -> Vec<Symbol> {
        let pass = PythonPass::new(input);
        let mut symbols = Vec::new();
        pass.walk(input.tree.root_node(), &mut symbols, None, Scope::Module);
        symbols
    }

    fn extract_relationships(&self, input: &ExtractionInput, symbols: &[Symbol]) -> Vec<Relationship> {
        let pass = PythonPass::new(input);
        let mut relationships = Vec::new();
        pass.collect_relationships(input.tree.root_node(), symbols, &mut relationships);
        relationships
    }

    fn infer_types(&self, input: &ExtractionInput, symbols: &[Symbol]) -> HashMap<String, TypeInfo> {
        let pass = PythonPass::new(input);
        let known: HashSet<&str> = symbols.iter().map(|s| s.id.as_str()).collect();
        let mut types = HashMap::new();
        pass.collect_types(input.tree.root_node(), &known, &mut types);
        types
    }
}

struct PythonPass<'a> {
    base: BaseExtractor<'a>,
}

impl<'a> PythonPass<'a> {
    fn new(input: &ExtractionInput<'a>) -> Self {
        Self {
            base: BaseExtractor::new(input.language, input.file_path, input.content),
        }
    }

    fn walk(&self, node: Node, symbols: &mut Vec<Symbol>, parent_id: Option<String>, scope: Scope) {
        match node.kind() {
            "class_definition" => {
                if let Some(symbol) = self.extract_class(node, parent_id.clone()) {
                    let class_id = symbol.id.clone();
                    symbols.push(symbol);
                    if let Some(body) = node.child_by_field_name("body") {
                        self.walk_children(body, symbols, Some(class_id), Scope::Class);
                    }
                }
                return;
            }
            "function_definition" => {
                if let Some(symbol) = self.extract_function(node, parent_id.clone(), scope) {
                    let function_id = symbol.id.clone();
                    symbols.push(symbol);
                    if let Some(body) = node.child_by_field_name("body") {
                        self.walk_children(body, symbols, Some(function_id), Scope::Function);
                    }
                }
                return;
            }
            "assignment" if scope != Scope::Function => {
                if let Some(symbol) = self.extract_assignment(node, parent_id.clone(), scope) {
                    symbols.push(symbol);
                }
            }
            "import_statement" | "import_from_statement" => {
                symbols.extend(self.extract_imports(node, parent_id.clone()));
                return;
            }
            _ => {}
        }

        self.walk_children(node, symbols, parent_id, scope);
    }

    fn walk_children(&self, node: Node, symbols: &mut Vec<Symbol>, parent_id: Option<String>, scope: Scope) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, symbols, parent_id.clone(), scope);
        }
    }

    fn extract_class(&self, node: Node, parent_id: Option<String>) -> Option<Symbol> {
        let name = self.base.get_field_text(&node, "name")?;
        let bases = self.superclass_names(&node);

        let kind = if bases.iter().any(|b| b == "Enum" || b.ends_with("Enum")) {
            SymbolKind::Enum
        } else if bases.iter().any(|b| b == "Protocol" || b.ends_with(".Protocol")) {
            SymbolKind::Interface
        } else {
            SymbolKind::Class
        };

        let decorators = self.decorators(&node);
        let mut signature = String::new();
        for decorator in &decorators {
            signature.push_str(decorator);
            signature.push('\n');
        }
        signature.push_str(&format!("class {}", name));
        if !bases.is_empty() {
            signature.push_str(&format!("({})", bases.join(", ")));
        }

        let mut metadata = HashMap::new();
        metadata.insert("superclasses".to_string(), serde_json::json!(bases));
        if !decorators.is_empty() {
            metadata.insert("decorators".to_string(), serde_json::json!(decorators));
        }

        Some(self.base.create_symbol(
            &node,
            name.clone(),
            kind,
            SymbolOptions {
                signature: Some(signature),
                visibility: Some(python_visibility(&name)),
                parent_id,
                metadata: Some(metadata),
                doc_comment: self.docstring(&node),
            },
        ))
    }

    fn extract_function(&self, node: Node, parent_id: Option<String>, scope: Scope) -> Option<Symbol> {
        let name = self.base.get_field_text(&node, "name")?;
        let is_async = node
            .child(0)
            .map(|first| first.kind() == "async")
            .unwrap_or(false);

        let kind = match scope {
            Scope::Class if name == "__init__" => SymbolKind::Constructor,
            Scope::Class => SymbolKind::Method,
            _ => SymbolKind::Function,
        };

        let params = self
            .base
            .get_field_text(&node, "parameters")
            .unwrap_or_else(|| "()".to_string());
        let mut signature = format!(
            "{}def {}{}",
            if is_async { "async " } else { "" },
            name,
            params
        );
        if let Some(return_type) = self.base.get_field_text(&node, "return_type") {
            signature.push_str(&format!(" -> {}", return_type));
        }

        let decorators = self.decorators(&node);
        let mut metadata = HashMap::new();
        metadata.insert("isAsync".to_string(), serde_json::json!(is_async));
        if !decorators.is_empty() {
            signature = format!("{}\n{}", decorators.join("\n"), signature);
            metadata.insert("decorators".to_string(), serde_json::json!(decorators));
        }

        Some(self.base.create_symbol(
            &node,
            name.clone(),
            kind,
            SymbolOptions {
                signature: Some(signature),
                visibility: Some(python_visibility(&name)),
                parent_id,
                metadata: Some(metadata),
                doc_comment: self.docstring(&node),
            },
        ))
    }

    fn extract_assignment(&self, node: Node, parent_id: Option<String>, scope: Scope) -> Option<Symbol> {
        let left = node.child_by_field_name("left")?;
        if left.kind() != "identifier" {
            return None;
        }
        let name = self.base.get_node_text(&left);

        let kind = if scope == Scope::Class {
            SymbolKind::Property
        } else if is_constant_name(&name) {
            SymbolKind::Constant
        } else {
            SymbolKind::Variable
        };

        let signature = self
            .base
            .get_node_text(&node)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();

        Some(self.base.create_symbol(
            &node,
            name.clone(),
            kind,
            SymbolOptions {
                signature: Some(signature),
                visibility: Some(python_visibility(&name)),
                parent_id,
                ..Default::default()
            },
        ))
    }

    fn extract_imports(&self, node: Node, parent_id: Option<String>) -> Vec<Symbol> {
        let statement = self.base.get_node_text(&node);
        let module = self.base.get_field_text(&node, "module_name");

        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();

        let mut symbols = Vec::new();
        for name_node in names {
            let (imported, alias) = match name_node.kind() {
                "aliased_import" => (
                    self.base.get_field_text(&name_node, "name"),
                    self.base.get_field_text(&name_node, "alias"),
                ),
                _ => (Some(self.base.get_node_text(&name_node)), None),
            };
            let Some(imported) = imported else { continue };
            let local_name = alias.clone().unwrap_or_else(|| {
                if module.is_some() {
                    imported.clone()
                } else {
                    // `import a.b` binds `a.b`; the last segment is what calls refer to
                    imported.rsplit('.').next().unwrap_or(&imported).to_string()
                }
            });

            let mut metadata = HashMap::new();
            metadata.insert("imported".to_string(), serde_json::json!(imported));
            if let Some(module) = &module {
                metadata.insert("module".to_string(), serde_json::json!(module));
            }

            symbols.push(self.base.create_symbol(
                &name_node,
                local_name,
                SymbolKind::Import,
                SymbolOptions {
                    signature: Some(statement.clone()),
                    visibility: Some(Visibility::Public),
                    parent_id: parent_id.clone(),
                    metadata: Some(metadata),
                    doc_comment: None,
                },
            ));
        }
        symbols
    }

    fn collect_relationships(&self, node: Node, symbols: &[Symbol], out: &mut Vec<Relationship>) {
        match node.kind() {
            "call" => {
                if let Some(callee) = node.child_by_field_name("function").and_then(|f| self.callee_name(f)) {
                    if let Some(caller) = self.base.find_containing_symbol(&node, symbols) {
                        out.push(self.base.link_by_name(caller, &callee, RelationshipKind::Calls, &node, symbols));
                    }
                }
            }
            "class_definition" => {
                if let Some(class_symbol) = self.symbol_for_node(&node, symbols) {
                    if let Some(superclasses) = node.child_by_field_name("superclasses") {
                        let mut cursor = superclasses.walk();
                        for arg in superclasses.named_children(&mut cursor) {
                            if arg.kind() != "identifier" && arg.kind() != "attribute" {
                                continue;
                            }
                            let name = self.last_segment(&arg);
                            if matches!(name.as_str(), "object" | "Protocol" | "ABC") {
                                continue;
                            }
                            out.push(self.base.link_by_name(class_symbol, &name, RelationshipKind::Extends, &arg, symbols));
                        }
                    }
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.collect_relationships(child, symbols, out);
        }
    }

    fn collect_types(&self, node: Node, known: &HashSet<&str>, out: &mut HashMap<String, TypeInfo>) {
        match node.kind() {
            "function_definition" => {
                if let (Some(id), Some(return_type)) = (
                    self.id_for_node(&node, known),
                    self.base.get_field_text(&node, "return_type"),
                ) {
                    out.insert(id.clone(), self.base.type_info(&id, &return_type, false));
                }
            }
            "assignment" => {
                if let Some(id) = self.id_for_node(&node, known) {
                    let declared = self.base.get_field_text(&node, "type");
                    let inferred = node.child_by_field_name("right").and_then(|r| self.literal_type(r));
                    match (declared, inferred) {
                        (Some(declared), _) => {
                            out.insert(id.clone(), self.base.type_info(&id, &declared, false));
                        }
                        (None, Some(inferred)) => {
                            out.insert(id.clone(), self.base.type_info(&id, &inferred, true));
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.collect_types(child, known, out);
        }
    }

    /// Id of the symbol declared at `node`, if the symbol pass emitted one.
    fn id_for_node(&self, node: &Node, known: &HashSet<&str>) -> Option<String> {
        let name = match node.kind() {
            "assignment" => {
                let left = node.child_by_field_name("left")?;
                if left.kind() != "identifier" {
                    return None;
                }
                self.base.get_node_text(&left)
            }
            _ => self.base.get_field_text(node, "name")?,
        };
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

    fn callee_name(&self, function: Node) -> Option<String> {
        match function.kind() {
            "identifier" => Some(self.base.get_node_text(&function)),
            "attribute" => self.base.get_field_text(&function, "attribute"),
            _ => None,
        }
    }

    fn last_segment(&self, node: &Node) -> String {
        let text = self.base.get_node_text(node);
        text.rsplit('.').next().unwrap_or(&text).to_string()
    }

    fn literal_type(&self, value: Node) -> Option<String> {
        let literal = match value.kind() {
            "string" | "concatenated_string" => "str",
            "integer" => "int",
            "float" => "float",
            "true" | "false" => "bool",
            "list" | "list_comprehension" => "list",
            "dictionary" | "dictionary_comprehension" => "dict",
            "set" | "set_comprehension" => "set",
            "tuple" => "tuple",
            "none" => "None",
            "call" => {
                let callee = value.child_by_field_name("function")?;
                let name = self.callee_name(callee)?;
                let starts_upper = name.chars().next().is_some_and(|c| c.is_uppercase());
                return starts_upper.then_some(name);
            }
            _ => return None,
        };
        Some(literal.to_string())
    }

    fn decorators(&self, node: &Node) -> Vec<String> {
        let Some(parent) = node.parent() else {
            return Vec::new();
        };
        if parent.kind() != "decorated_definition" {
            return Vec::new();
        }
        let mut cursor = parent.walk();
        parent
            .children(&mut cursor)
            .filter(|c| c.kind() == "decorator")
            .map(|c| self.base.get_node_text(&c))
            .collect()
    }

    /// First statement of the body when it is a bare string literal.
    fn docstring(&self, node: &Node) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let first = body.named_child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let string = first.named_child(0)?;
        if string.kind() != "string" {
            return None;
        }
        let raw = self.base.get_node_text(&string);
        let trimmed = raw
            .trim_start_matches(|c| c == 'r' || c == 'R' || c == 'u' || c == 'U')
            .trim_matches(|c| c == '"' || c == '\'')
            .trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn superclass_names(&self, node: &Node) -> Vec<String> {
        let Some(superclasses) = node.child_by_field_name("superclasses") else {
            return Vec::new();
        };
        let mut cursor = superclasses.walk();
        superclasses
            .named_children(&mut cursor)
            .filter(|arg| arg.kind() != "keyword_argument")
            .map(|arg| self.base.get_node_text(&arg))
            .collect()
    }
}

fn python_visibility(name: &str) -> Visibility {
    if name.starts_with("__") && name.ends_with("__") {
        Visibility::Public
    } else if name.starts_with('_') {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
