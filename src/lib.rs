// Marlin - Incremental Multi-Language Code Intelligence Engine
//!
//! Marlin parses Rust, Python and TypeScript/JavaScript with tree-sitter, keeps symbols,
//! relationships and inferred types in SQLite, and answers navigation and search queries
//! against that store. An optional semantic layer embeds symbols in the background and blends
//! vector similarity into search once vectors exist.

pub mod config;
pub mod database;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod health;
pub mod language;
pub mod parser;
pub mod search;
pub mod watcher;

#[cfg(test)]
pub mod tests;

// Re-export common types
pub use config::EngineConfig;
pub use engine::{CallDirection, CodeIntelligenceEngine, EngineComponents, IndexOutcome};
pub use error::{EngineError, Result};
pub use extractors::{Relationship, RelationshipKind, Symbol, SymbolKind};
pub use health::{HealthReport, SystemReadiness};
pub use search::{SearchOptions, SearchResult};
