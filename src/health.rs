// Centralized Health Check System
//
// Every component reports its own boolean so a degraded semantic layer never hides a healthy
// structural layer, and the other way round. Readiness is derived from those booleans.

use serde::Serialize;

pub use crate::embeddings::SemanticMode;

/// System readiness levels for graceful degradation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum SystemReadiness {
    /// Store or parser unusable, or nothing indexed yet
    NotReady,
    /// Structural queries work; no semantic layer configured or available
    StructuralOnly { symbol_count: i64 },
    /// Structural queries work; semantic layer running but no vectors yet
    PartiallyReady { symbol_count: i64 },
    /// Hybrid search available
    FullyReady { symbol_count: i64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub store: bool,
    pub parser: bool,
    pub structural_search: bool,
    pub watcher: bool,
    pub vector_store: bool,
    pub embedder: bool,
    pub hybrid_search: bool,
    pub semantic_mode: SemanticMode,
    pub symbol_count: i64,
    pub readiness: SystemReadiness,
}

/// Component flags before readiness is derived
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentStatus {
    pub store: bool,
    pub parser: bool,
    pub structural_search: bool,
    pub watcher: bool,
    pub vector_store: bool,
    pub embedder: bool,
    pub hybrid_search: bool,
}

impl HealthReport {
    pub fn from_components(status: ComponentStatus, semantic_mode: SemanticMode, symbol_count: i64) -> Self {
        let readiness = derive_readiness(&status, semantic_mode, symbol_count);
        Self {
            store: status.store,
            parser: status.parser,
            structural_search: status.structural_search,
            watcher: status.watcher,
            vector_store: status.vector_store,
            embedder: status.embedder,
            hybrid_search: status.hybrid_search,
            semantic_mode,
            symbol_count,
            readiness,
        }
    }

    /// Store, parser and structural search all up
    pub fn is_structurally_healthy(&self) -> bool {
        self.store && self.parser && self.structural_search
    }

    pub fn status_message(&self) -> String {
        match self.readiness {
            SystemReadiness::NotReady => "❌ Not ready: index a workspace first".to_string(),
            SystemReadiness::StructuralOnly { symbol_count } => {
                format!("🔄 Structural search only: {} symbols", symbol_count)
            }
            SystemReadiness::PartiallyReady { symbol_count } => format!(
                "🟡 Partially ready: {} symbols, embeddings in progress",
                symbol_count
            ),
            SystemReadiness::FullyReady { symbol_count } => {
                format!("🟢 Fully operational: {} symbols with hybrid search", symbol_count)
            }
        }
    }
}

fn derive_readiness(status: &ComponentStatus, mode: SemanticMode, symbol_count: i64) -> SystemReadiness {
    if !(status.store && status.parser) || symbol_count == 0 {
        return SystemReadiness::NotReady;
    }
    if status.hybrid_search {
        return SystemReadiness::FullyReady { symbol_count };
    }
    if mode != SemanticMode::Disabled && status.embedder {
        return SystemReadiness::PartiallyReady { symbol_count };
    }
    SystemReadiness::StructuralOnly { symbol_count }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> ComponentStatus {
        ComponentStatus {
            store: true,
            parser: true,
            structural_search: true,
            ..Default::default()
        }
    }

    #[test]
    fn empty_store_is_not_ready() {
        let report = HealthReport::from_components(healthy(), SemanticMode::Background, 0);
        assert_eq!(report.readiness, SystemReadiness::NotReady);
    }

    #[test]
    fn readiness_follows_semantic_state() {
        let report = HealthReport::from_components(healthy(), SemanticMode::Disabled, 5);
        assert_eq!(report.readiness, SystemReadiness::StructuralOnly { symbol_count: 5 });

        let warming = ComponentStatus { embedder: true, vector_store: true, ..healthy() };
        let report = HealthReport::from_components(warming, SemanticMode::InProcess, 5);
        assert_eq!(report.readiness, SystemReadiness::PartiallyReady { symbol_count: 5 });

        let full = ComponentStatus { hybrid_search: true, ..warming };
        let report = HealthReport::from_components(full, SemanticMode::Background, 5);
        assert_eq!(report.readiness, SystemReadiness::FullyReady { symbol_count: 5 });
        assert!(report.is_structurally_healthy());
    }
}
