use std::path::PathBuf;

use thiserror::Error;

/// Hard failures surfaced by the engine. Per-file problems are reported through
/// `IndexOutcome` instead and never appear here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine not initialized: call initialize() first")]
    NotInitialized,

    #[error("Workspace root {path} is not readable: {source}")]
    WorkspaceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Symbol store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
