// Base Extractor Types for Marlin
//
// The shared data model (symbols, relationships, inferred types) and the helpers every
// language extractor builds on. Ids are deterministic so re-extracting unchanged content
// is an idempotent upsert.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tree_sitter::Node;

/// Prefix marking a relationship target that lives outside the extracted file.
pub const UNRESOLVED_PREFIX: &str = "unresolved:";

/// Confidence assigned to relationships whose target could not be found in the same file.
pub const UNRESOLVED_CONFIDENCE: f32 = 0.5;

/// Metadata key carrying the textual target name of a relationship.
pub const TARGET_NAME_KEY: &str = "target_name";

/// A code symbol (function, class, variable, etc.) extracted from source code
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Symbol {
    /// md5 of `file_path:name:line:column`, stable across re-extraction
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub language: String,
    pub file_path: String,
    /// 1-based
    pub start_line: u32,
    /// 0-based
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub start_byte: u32,
    pub end_byte: u32,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub visibility: Option<Visibility>,
    /// Weak back-reference to the enclosing symbol; always emitted earlier in the same pass
    pub parent_id: Option<String>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Symbol {
    /// True when `(line, column)` falls inside this symbol's span.
    pub fn contains_position(&self, line: u32, column: u32) -> bool {
        if line < self.start_line || line > self.end_line {
            return false;
        }
        if line == self.start_line && column < self.start_column {
            return false;
        }
        if line == self.end_line && column > self.end_column {
            return false;
        }
        true
    }

    /// Rough span size used to pick the innermost of several enclosing symbols.
    pub fn span_size(&self) -> u64 {
        (self.end_line.saturating_sub(self.start_line) as u64) * 1000
            + self.end_column.saturating_sub(self.start_column) as u64
    }
}

/// Closed set of entity kinds found in analyzed source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Interface,
    Function,
    Method,
    Variable,
    Constant,
    Property,
    Enum,
    #[serde(rename = "enum_member")]
    EnumMember,
    Module,
    Namespace,
    Type,
    Trait,
    Struct,
    Union,
    Field,
    Constructor,
    Destructor,
    Operator,
    Import,
    Export,
    Event,
    Delegate,
}

impl SymbolKind {
    /// Convert from string representation (for database deserialization)
    pub fn from_string(s: &str) -> Self {
        match s {
            "class" => SymbolKind::Class,
            "interface" => SymbolKind::Interface,
            "function" => SymbolKind::Function,
            "method" => SymbolKind::Method,
            "variable" => SymbolKind::Variable,
            "constant" => SymbolKind::Constant,
            "property" => SymbolKind::Property,
            "enum" => SymbolKind::Enum,
            "enum_member" => SymbolKind::EnumMember,
            "module" => SymbolKind::Module,
            "namespace" => SymbolKind::Namespace,
            "type" => SymbolKind::Type,
            "trait" => SymbolKind::Trait,
            "struct" => SymbolKind::Struct,
            "union" => SymbolKind::Union,
            "field" => SymbolKind::Field,
            "constructor" => SymbolKind::Constructor,
            "destructor" => SymbolKind::Destructor,
            "operator" => SymbolKind::Operator,
            "import" => SymbolKind::Import,
            "export" => SymbolKind::Export,
            "event" => SymbolKind::Event,
            "delegate" => SymbolKind::Delegate,
            _ => SymbolKind::Variable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Property => "property",
            SymbolKind::Enum => "enum",
            SymbolKind::EnumMember => "enum_member",
            SymbolKind::Module => "module",
            SymbolKind::Namespace => "namespace",
            SymbolKind::Type => "type",
            SymbolKind::Trait => "trait",
            SymbolKind::Struct => "struct",
            SymbolKind::Union => "union",
            SymbolKind::Field => "field",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Destructor => "destructor",
            SymbolKind::Operator => "operator",
            SymbolKind::Import => "import",
            SymbolKind::Export => "export",
            SymbolKind::Event => "event",
            SymbolKind::Delegate => "delegate",
        }
    }

    /// Functions, methods and constructors.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            SymbolKind::Function | SymbolKind::Method | SymbolKind::Constructor
        )
    }

    /// Kinds that can sit on the receiving end of extends/implements.
    pub fn is_type_like(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Interface
                | SymbolKind::Trait
                | SymbolKind::Struct
                | SymbolKind::Enum
                | SymbolKind::Type
                | SymbolKind::Union
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Protected => "protected",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            "protected" => Some(Visibility::Protected),
            _ => None,
        }
    }
}

/// Directed, typed edge between two symbols (or a symbol and an unresolved placeholder)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub id: String,
    #[serde(rename = "fromSymbolId")]
    pub from_symbol_id: String,
    /// Either a symbol id or an `unresolved:<name>` placeholder
    #[serde(rename = "toSymbolId")]
    pub to_symbol_id: String,
    pub kind: RelationshipKind,
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// 1-based
    #[serde(rename = "lineNumber")]
    pub line_number: u32,
    /// Below 1.0 whenever the target is a placeholder
    pub confidence: f32,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Relationship {
    pub fn is_unresolved(&self) -> bool {
        self.to_symbol_id.starts_with(UNRESOLVED_PREFIX)
    }

    /// Name the relationship points at, as written in source.
    pub fn target_name(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(TARGET_NAME_KEY))
            .and_then(|v| v.as_str())
            .or_else(|| self.to_symbol_id.strip_prefix(UNRESOLVED_PREFIX))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Calls,
    Extends,
    Implements,
    Uses,
    Returns,
    Parameter,
    Imports,
    Instantiates,
    References,
    Defines,
    Overrides,
    Contains,
    Joins,
    Composition,
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RelationshipKind {
    /// Convert from string representation (for database deserialization)
    pub fn from_string(s: &str) -> Self {
        match s {
            "calls" => RelationshipKind::Calls,
            "extends" => RelationshipKind::Extends,
            "implements" => RelationshipKind::Implements,
            "uses" => RelationshipKind::Uses,
            "returns" => RelationshipKind::Returns,
            "parameter" => RelationshipKind::Parameter,
            "imports" => RelationshipKind::Imports,
            "instantiates" => RelationshipKind::Instantiates,
            "references" => RelationshipKind::References,
            "defines" => RelationshipKind::Defines,
            "overrides" => RelationshipKind::Overrides,
            "contains" => RelationshipKind::Contains,
            "joins" => RelationshipKind::Joins,
            "composition" => RelationshipKind::Composition,
            _ => RelationshipKind::Uses,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Calls => "calls",
            RelationshipKind::Extends => "extends",
            RelationshipKind::Implements => "implements",
            RelationshipKind::Uses => "uses",
            RelationshipKind::Returns => "returns",
            RelationshipKind::Parameter => "parameter",
            RelationshipKind::Imports => "imports",
            RelationshipKind::Instantiates => "instantiates",
            RelationshipKind::References => "references",
            RelationshipKind::Defines => "defines",
            RelationshipKind::Overrides => "overrides",
            RelationshipKind::Contains => "contains",
            RelationshipKind::Joins => "joins",
            RelationshipKind::Composition => "composition",
        }
    }
}

/// Declared or inferred type of a symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeInfo {
    #[serde(rename = "symbolId")]
    pub symbol_id: String,
    #[serde(rename = "resolvedType")]
    pub resolved_type: String,
    #[serde(rename = "genericParams")]
    pub generic_params: Option<Vec<String>>,
    /// False when the type was written in source
    #[serde(rename = "isInferred")]
    pub is_inferred: bool,
    pub language: String,
}

/// Everything one extraction pass produced for a file.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResults {
    /// Pre-order: every parent precedes its children
    pub symbols: Vec<Symbol>,
    pub relationships: Vec<Relationship>,
    pub types: HashMap<String, TypeInfo>,
}

/// Options for creating symbols
#[derive(Debug, Clone, Default)]
pub struct SymbolOptions {
    pub signature: Option<String>,
    pub visibility: Option<Visibility>,
    pub parent_id: Option<String>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub doc_comment: Option<String>,
}

/// Placeholder id for a target outside the current file.
pub fn unresolved_id(name: &str) -> String {
    format!("{}{}", UNRESOLVED_PREFIX, name)
}

/// Deterministic symbol id.
pub fn symbol_id(file_path: &str, name: &str, line: u32, column: u32) -> String {
    let input = format!("{}:{}:{}:{}", file_path, name, line, column);
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Per-pass helper shared by all language extractors.
pub struct BaseExtractor<'a> {
    pub language: String,
    pub file_path: String,
    pub content: &'a str,
}

impl<'a> BaseExtractor<'a> {
    pub fn new(language: &str, file_path: &str, content: &'a str) -> Self {
        Self {
            language: language.to_string(),
            file_path: file_path.to_string(),
            content,
        }
    }

    /// Get text from a tree-sitter node
    pub fn get_node_text(&self, node: &Node) -> String {
        self.content
            .get(node.start_byte()..node.end_byte())
            .unwrap_or_default()
            .to_string()
    }

    pub fn get_field_text(&self, node: &Node, field_name: &str) -> Option<String> {
        node.child_by_field_name(field_name)
            .map(|field_node| self.get_node_text(&field_node))
    }

    /// Collect the comment block directly above `node` when it starts with one of `doc_prefixes`.
    pub fn find_doc_comment(&self, node: &Node, doc_prefixes: &[&str]) -> Option<String> {
        let mut lines = Vec::new();
        let mut expected_row = node.start_position().row;
        let mut current = node.prev_sibling();

        while let Some(sibling) = current {
            if !sibling.kind().contains("comment") || sibling.end_position().row + 1 < expected_row
            {
                break;
            }
            let text = self.get_node_text(&sibling);
            if !doc_prefixes.iter().any(|p| text.starts_with(p)) {
                break;
            }
            lines.push(text.trim_end().to_string());
            expected_row = sibling.start_position().row;
            current = sibling.prev_sibling();
        }

        if lines.is_empty() {
            return None;
        }
        lines.reverse();
        Some(lines.join("\n"))
    }

    pub fn generate_id(&self, name: &str, line: u32, column: u32) -> String {
        symbol_id(&self.file_path, name, line, column)
    }

    /// Create a symbol spanning `node`
    pub fn create_symbol(
        &self,
        node: &Node,
        name: String,
        kind: SymbolKind,
        options: SymbolOptions,
    ) -> Symbol {
        let start_pos = node.start_position();
        let end_pos = node.end_position();
        let start_line = (start_pos.row + 1) as u32;
        let start_column = start_pos.column as u32;

        Symbol {
            id: self.generate_id(&name, start_line, start_column),
            name,
            kind,
            language: self.language.clone(),
            file_path: self.file_path.clone(),
            start_line,
            start_column,
            end_line: (end_pos.row + 1) as u32,
            end_column: end_pos.column as u32,
            start_byte: node.start_byte() as u32,
            end_byte: node.end_byte() as u32,
            signature: options.signature,
            doc_comment: options.doc_comment,
            visibility: options.visibility,
            parent_id: options.parent_id,
            metadata: options.metadata,
        }
    }

    /// Create a relationship anchored at `node`
    pub fn create_relationship(
        &self,
        from_symbol_id: &str,
        to_symbol_id: String,
        target_name: &str,
        kind: RelationshipKind,
        node: &Node,
        confidence: f32,
    ) -> Relationship {
        let line_number = (node.start_position().row + 1) as u32;
        let id_input = format!(
            "{}:{}:{}:{}:{}",
            from_symbol_id,
            target_name,
            kind,
            line_number,
            node.start_position().column
        );

        let mut metadata = HashMap::new();
        metadata.insert(
            TARGET_NAME_KEY.to_string(),
            serde_json::Value::String(target_name.to_string()),
        );

        Relationship {
            id: format!("{:x}", md5::compute(id_input.as_bytes())),
            from_symbol_id: from_symbol_id.to_string(),
            to_symbol_id,
            kind,
            file_path: self.file_path.clone(),
            line_number,
            confidence,
            metadata: Some(metadata),
        }
    }

    /// Link `from` to the local symbol named `target_name`, or to a placeholder when none exists.
    pub fn link_by_name(
        &self,
        from: &Symbol,
        target_name: &str,
        kind: RelationshipKind,
        node: &Node,
        symbols: &[Symbol],
    ) -> Relationship {
        match find_local_target(symbols, target_name, kind) {
            Some(target) => self.create_relationship(
                &from.id,
                target.id.clone(),
                target_name,
                kind,
                node,
                1.0,
            ),
            None => self.create_relationship(
                &from.id,
                unresolved_id(target_name),
                target_name,
                kind,
                node,
                UNRESOLVED_CONFIDENCE,
            ),
        }
    }

    /// Innermost symbol enclosing `node`, preferring callables over containers
    pub fn find_containing_symbol<'s>(&self, node: &Node, symbols: &'s [Symbol]) -> Option<&'s Symbol> {
        let position = node.start_position();
        let line = (position.row + 1) as u32;
        let column = position.column as u32;

        let priority = |kind: &SymbolKind| -> u32 {
            match kind {
                SymbolKind::Function | SymbolKind::Method | SymbolKind::Constructor => 1,
                SymbolKind::Class | SymbolKind::Interface | SymbolKind::Struct | SymbolKind::Trait => 2,
                SymbolKind::Namespace | SymbolKind::Module => 3,
                SymbolKind::Variable | SymbolKind::Constant | SymbolKind::Property => 10,
                _ => 5,
            }
        };

        symbols
            .iter()
            .filter(|s| s.kind != SymbolKind::Import && s.contains_position(line, column))
            .min_by(|a, b| {
                priority(&a.kind)
                    .cmp(&priority(&b.kind))
                    .then(a.span_size().cmp(&b.span_size()))
            })
    }

    /// Enclosing symbol that is itself a declaration of the given kinds (e.g. the class of a method)
    pub fn find_enclosing_of_kinds<'s>(
        &self,
        node: &Node,
        symbols: &'s [Symbol],
        kinds: &[SymbolKind],
    ) -> Option<&'s Symbol> {
        let position = node.start_position();
        let line = (position.row + 1) as u32;
        let column = position.column as u32;

        symbols
            .iter()
            .filter(|s| kinds.contains(&s.kind) && s.contains_position(line, column))
            .min_by_key(|s| s.span_size())
    }

    pub fn type_info(&self, symbol_id: &str, resolved_type: &str, is_inferred: bool) -> TypeInfo {
        let resolved_type = resolved_type.trim().to_string();
        TypeInfo {
            symbol_id: symbol_id.to_string(),
            generic_params: extract_generic_params(&resolved_type),
            resolved_type,
            is_inferred,
            language: self.language.clone(),
        }
    }
}

/// Best local candidate for a relationship target.
fn find_local_target<'s>(
    symbols: &'s [Symbol],
    name: &str,
    kind: RelationshipKind,
) -> Option<&'s Symbol> {
    let mut candidates = symbols
        .iter()
        .filter(|s| s.name == name && s.kind != SymbolKind::Import);

    match kind {
        RelationshipKind::Calls => {
            let all: Vec<&Symbol> = candidates.collect();
            all.iter()
                .find(|s| s.kind.is_callable())
                .or_else(|| all.iter().find(|s| s.kind.is_type_like()))
                .copied()
        }
        RelationshipKind::Extends | RelationshipKind::Implements | RelationshipKind::Instantiates => {
            candidates.find(|s| s.kind.is_type_like())
        }
        _ => candidates.next(),
    }
}

/// `Vec<Result<T, E>>` → `["Result<T, E>"]`, `Map<K, V>` → `["K", "V"]`
fn extract_generic_params(type_text: &str) -> Option<Vec<String>> {
    let open = type_text.find('<')?;
    let close = type_text.rfind('>')?;
    if close <= open + 1 {
        return None;
    }

    let inner = &type_text[open + 1..close];
    let mut params = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in inner.chars() {
        match ch {
            '<' | '(' | '[' => {
                depth += 1;
                current.push(ch);
            }
            '>' | ')' | ']' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                params.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        params.push(current.trim().to_string());
    }

    if params.is_empty() { None } else { Some(params) }
}
