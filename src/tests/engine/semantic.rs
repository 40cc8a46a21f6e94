// Semantic layer as seen through the engine: gate, degradation, hybrid ranking, warm restart

use std::sync::Arc;
use std::time::Duration;

use crate::embeddings::{ArchitecturalLayer, SemanticMode};
use crate::health::SystemReadiness;
use crate::search::{MatchSource, SearchOptions};
use crate::tests::test_helpers::{FailingProvider, TestWorkspace};

const BILLING: &str = "class InvoiceService:\n    \"\"\"Creates and sends invoices.\"\"\"\n\n    def send_invoice(self, invoice):\n        return invoice\n\n\ndef compute_total(items) -> float:\n    return 0.0\n";

fn workspace() -> TestWorkspace {
    let ws = TestWorkspace::new();
    ws.write("services/billing.py", BILLING);
    ws
}

#[tokio::test]
async fn test_gate_stays_closed_when_semantics_are_disabled() {
    let ws = workspace();
    let mut config = ws.config();
    config.embedding.enabled = false;
    let engine = ws.engine_with(config, |_| {}).await;

    let report = engine.index_workspace(ws.root()).await.unwrap();
    assert_eq!(report.embeddings_queued, 0);
    assert_eq!(engine.semantic_mode(), Some(SemanticMode::Disabled));
    assert!(!engine.is_hybrid_available());

    let results = engine.search_code("invoice", &SearchOptions::default()).await.unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.source == MatchSource::Structural));

    let health = engine.health_check().await;
    assert!(health.is_structurally_healthy());
    assert!(!health.vector_store);
    assert!(!health.embedder);
    assert!(matches!(health.readiness, SystemReadiness::StructuralOnly { .. }));
}

#[tokio::test]
async fn test_gate_is_closed_before_any_vector_exists() {
    let ws = workspace();
    let engine = ws.engine().await;

    assert_eq!(engine.semantic_mode(), Some(SemanticMode::Background));
    assert!(!engine.is_hybrid_available());
    let health = engine.health_check().await;
    assert!(!health.hybrid_search);
    assert_eq!(health.readiness, SystemReadiness::NotReady);
}

#[tokio::test]
async fn test_failing_provider_degrades_to_structural_results() {
    let ws = workspace();
    let engine = ws
        .engine_with(ws.config(), |components| {
            components.embedder = Some(Arc::new(FailingProvider));
        })
        .await;
    assert_eq!(engine.semantic_mode(), Some(SemanticMode::InProcess));

    let report = engine.index_workspace(ws.root()).await.unwrap();
    assert!(report.embeddings_queued > 0);
    assert!(engine.wait_for_embeddings(Duration::from_secs(10)).await.unwrap());

    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.embedding_progress.failed, report.embeddings_queued);
    assert_eq!(stats.embeddings, 0);
    assert!(!engine.is_hybrid_available());

    let results = engine.search_code("invoice", &SearchOptions::default()).await.unwrap();
    assert!(results.iter().any(|r| r.symbol.name == "send_invoice"));
    assert!(results.iter().all(|r| r.source == MatchSource::Structural));

    let health = engine.health_check().await;
    assert!(health.is_structurally_healthy());
    assert!(!health.hybrid_search);
    assert!(matches!(health.readiness, SystemReadiness::PartiallyReady { .. }));
}

#[tokio::test]
async fn test_hybrid_results_once_vectors_exist() {
    let ws = workspace();
    let engine = ws.engine().await;

    let report = engine.index_workspace(ws.root()).await.unwrap();
    assert!(engine.wait_for_embeddings(Duration::from_secs(10)).await.unwrap());
    assert!(engine.is_hybrid_available());

    let stats = engine.get_stats().await.unwrap();
    assert_eq!(stats.embeddings as usize, report.embeddings_queued);
    assert_eq!(stats.vector_store.vectors, report.embeddings_queued);

    let results = engine.search_code("send_invoice", &SearchOptions::default()).await.unwrap();
    let top = &results[0];
    assert_eq!(top.symbol.name, "send_invoice");
    assert_eq!(top.source, MatchSource::Hybrid);
    // a structural match never loses score by being blended
    assert!(top.score >= 1.0);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let structural_only = SearchOptions {
        include_semantics: false,
        ..SearchOptions::default()
    };
    let results = engine.search_code("send_invoice", &structural_only).await.unwrap();
    assert!(results.iter().all(|r| r.source == MatchSource::Structural));

    let health = engine.health_check().await;
    assert!(health.structural_search);
    assert!(health.vector_store);
    assert!(matches!(health.readiness, SystemReadiness::FullyReady { .. }));
}

#[tokio::test]
async fn test_reindex_queues_only_missing_embeddings() {
    let ws = workspace();
    let engine = ws.engine().await;

    engine.index_workspace(ws.root()).await.unwrap();
    assert!(engine.wait_for_embeddings(Duration::from_secs(10)).await.unwrap());

    let again = engine.index_workspace(ws.root()).await.unwrap();
    assert_eq!(again.files_unchanged, 1);
    assert_eq!(again.embeddings_queued, 0);
}

#[tokio::test]
async fn test_restart_reloads_index_and_vectors() {
    let ws = workspace();
    let queued = {
        let engine = ws.engine().await;
        let report = engine.index_workspace(ws.root()).await.unwrap();
        assert!(engine.wait_for_embeddings(Duration::from_secs(10)).await.unwrap());
        engine.shutdown().await.unwrap();
        report.embeddings_queued
    };

    let restarted = ws.engine().await;
    assert!(restarted.is_hybrid_available());
    let stats = restarted.get_stats().await.unwrap();
    assert_eq!(stats.vector_store.vectors, queued);
    assert_eq!(stats.structural_index_entries as i64, stats.symbols);

    let hits = restarted.search_exact("compute_total", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    let by_type = restarted.search_by_type("float", 5).await.unwrap();
    assert_eq!(by_type[0].symbol.name, "compute_total");
}

#[tokio::test]
async fn test_cross_layer_interleaves_results() {
    let ws = TestWorkspace::new();
    ws.write("services/users.py", "def load_user():\n    pass\n\n\ndef load_user_list():\n    pass\n");
    ws.write("api/routes.py", "def load_user_route():\n    pass\n");
    let mut config = ws.config();
    config.embedding.enabled = false;
    let engine = ws.engine_with(config, |_| {}).await;
    engine.index_workspace(ws.root()).await.unwrap();

    let options = SearchOptions {
        cross_layer: true,
        ..SearchOptions::default()
    };
    let results = engine.search_code("load_user", &options).await.unwrap();
    assert_eq!(results.len(), 3);
    // exact match first, then the best of the other layer
    assert_eq!(results[0].symbol.name, "load_user");
    assert_eq!(results[1].symbol.name, "load_user_route");
}

#[tokio::test]
async fn test_layers_ignore_directories_above_the_workspace() {
    let ws = TestWorkspace::new();
    ws.write("web/shop/src/pricing.py", "def apply_discount(total):\n    return total\n");
    ws.write("web/shop/api/routes.py", "def checkout_route():\n    pass\n");
    let mut config = ws.config();
    config.embedding.enabled = false;
    let engine = ws.engine_with(config, |_| {}).await;
    engine.index_workspace(ws.path("web/shop")).await.unwrap();

    let pricing = engine.search_exact("apply_discount", 5).await.unwrap();
    assert_eq!(pricing[0].layer, ArchitecturalLayer::Unknown);
    let route = engine.search_exact("checkout_route", 5).await.unwrap();
    assert_eq!(route[0].layer, ArchitecturalLayer::Api);
}
