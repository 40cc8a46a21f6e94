//! Heuristics attached to every embedding request: priority tier, architectural layer and
//! pattern tags, plus the text that actually gets embedded.

use serde::{Deserialize, Serialize};

use crate::extractors::base::{Symbol, SymbolKind};
use crate::search::tokenizer::identifier_parts;

/// Submission tier. High drains before Normal before Low; FIFO within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
}

impl Priority {
    pub fn index(self) -> usize {
        self as usize
    }
}

const ENTRY_POINT_NAMES: &[&str] = &["main", "index", "app", "run", "start", "init", "handler", "server", "bootstrap"];

pub fn classify_priority(symbol: &Symbol) -> Priority {
    if symbol.kind.is_type_like() || ENTRY_POINT_NAMES.contains(&symbol.name.to_lowercase().as_str()) {
        Priority::High
    } else if symbol.kind.is_callable() {
        Priority::Normal
    } else {
        Priority::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchitecturalLayer {
    Frontend,
    Api,
    Domain,
    Data,
    Database,
    Infrastructure,
    Unknown,
}

impl ArchitecturalLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchitecturalLayer::Frontend => "frontend",
            ArchitecturalLayer::Api => "api",
            ArchitecturalLayer::Domain => "domain",
            ArchitecturalLayer::Data => "data",
            ArchitecturalLayer::Database => "database",
            ArchitecturalLayer::Infrastructure => "infrastructure",
            ArchitecturalLayer::Unknown => "unknown",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "frontend" => ArchitecturalLayer::Frontend,
            "api" => ArchitecturalLayer::Api,
            "domain" => ArchitecturalLayer::Domain,
            "data" => ArchitecturalLayer::Data,
            "database" => ArchitecturalLayer::Database,
            "infrastructure" => ArchitecturalLayer::Infrastructure,
            _ => ArchitecturalLayer::Unknown,
        }
    }
}

// Checked in order; the first layer with a matching path segment wins.
const LAYER_SEGMENTS: &[(ArchitecturalLayer, &[&str])] = &[
    (
        ArchitecturalLayer::Database,
        &["db", "database", "databases", "migrations", "migration", "sql", "queries", "prisma", "orm"],
    ),
    (
        ArchitecturalLayer::Data,
        &["models", "model", "entities", "entity", "dto", "dtos", "schemas", "repositories", "repository", "dal", "data"],
    ),
    (
        ArchitecturalLayer::Api,
        &["api", "apis", "routes", "router", "routers", "controllers", "controller", "handlers", "endpoints", "graphql", "rest", "server"],
    ),
    (
        ArchitecturalLayer::Frontend,
        &["components", "component", "pages", "views", "ui", "frontend", "client", "web", "screens", "hooks", "public"],
    ),
    (
        ArchitecturalLayer::Domain,
        &["domain", "services", "service", "core", "business", "usecases", "logic"],
    ),
    (
        ArchitecturalLayer::Infrastructure,
        &["infra", "infrastructure", "config", "configs", "deploy", "deployment", "scripts", "docker", "k8s", "terraform", "ci", ".github"],
    ),
];

/// Layer from directory names below `workspace_root`; `.tsx`/`.jsx` files with no other
/// hint are frontend. Directories above the root never count.
pub fn detect_layer(file_path: &str, workspace_root: &str) -> ArchitecturalLayer {
    let lowered = strip_root(file_path, workspace_root)
        .unwrap_or(file_path)
        .to_lowercase();
    let mut segments: Vec<&str> = lowered.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
    let file_name = segments.pop().unwrap_or_default();

    for (layer, names) in LAYER_SEGMENTS {
        if segments.iter().any(|segment| names.contains(segment)) {
            return *layer;
        }
    }

    if file_name.ends_with(".tsx") || file_name.ends_with(".jsx") {
        return ArchitecturalLayer::Frontend;
    }

    ArchitecturalLayer::Unknown
}

/// `file_path` below `root`, or `None` when it is not under `root`
fn strip_root<'a>(file_path: &'a str, root: &str) -> Option<&'a str> {
    let root = root.trim_end_matches(['/', '\\']);
    if root.is_empty() {
        return None;
    }
    file_path
        .strip_prefix(root)
        .filter(|rest| rest.starts_with(['/', '\\']))
}

/// Longest of `roots` containing `file_path`; empty when none does
pub fn owning_root<'a>(file_path: &str, roots: &'a [String]) -> &'a str {
    roots
        .iter()
        .filter(|root| strip_root(file_path, root).is_some())
        .max_by_key(|root| root.len())
        .map(String::as_str)
        .unwrap_or_default()
}

/// Pattern tags from name parts and kind
pub fn pattern_tags(symbol: &Symbol) -> Vec<String> {
    let parts = identifier_parts(&symbol.name);
    let has_part = |wanted: &[&str]| parts.iter().any(|p| wanted.contains(&p.as_str()));

    let mut tags = Vec::new();
    if has_part(&["repository", "repo"]) {
        tags.push("repository");
    }
    if has_part(&["service"]) {
        tags.push("service");
    }
    if has_part(&["controller"]) {
        tags.push("controller");
    }
    if has_part(&["entity"]) {
        tags.push("entity");
    }
    if has_part(&["dto"]) {
        tags.push("dto");
    }
    match symbol.kind {
        SymbolKind::Interface | SymbolKind::Trait => tags.push("capability-contract"),
        SymbolKind::Class | SymbolKind::Struct => tags.push("class"),
        _ => {}
    }

    tags.into_iter().map(String::from).collect()
}

/// Name, signature and doc comment joined by newlines; `None` when nothing is left.
pub fn synthesize_content(symbol: &Symbol) -> Option<String> {
    let parts: Vec<&str> = [
        Some(symbol.name.as_str()),
        symbol.signature.as_deref(),
        symbol.doc_comment.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

pub fn fingerprint(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Message envelope submitted to the pool or the in-process fallback
#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub symbol_id: String,
    pub file_path: String,
    pub content: String,
    pub fingerprint: String,
    pub layer: ArchitecturalLayer,
    pub pattern_tags: Vec<String>,
    pub priority: Priority,
}

impl EmbeddingRequest {
    pub fn from_symbol(symbol: &Symbol, workspace_root: &str) -> Option<Self> {
        let content = synthesize_content(symbol)?;
        Some(Self {
            symbol_id: symbol.id.clone(),
            file_path: symbol.file_path.clone(),
            fingerprint: fingerprint(&content),
            content,
            layer: detect_layer(&symbol.file_path, workspace_root),
            pattern_tags: pattern_tags(symbol),
            priority: classify_priority(symbol),
        })
    }
}
