// Watcher wiring: lazy start, event loop, change/delete handling

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::EngineState;
use super::indexing::{IndexMode, IndexOutcome, clear_file, index_file, normalize_path};
use crate::watcher::{FileWatcher, WatchEvent, WatchFilter};

/// Start the shared watcher on first use, then add `root` to it
pub(crate) async fn arm_watcher(state: &Arc<EngineState>, root: &Path) -> anyhow::Result<()> {
    let watcher = state
        .watcher
        .get_or_try_init(|| async {
            let filter = WatchFilter::new(
                state.parser.supported_extensions(),
                state.config.excluded_dirs.iter().cloned(),
                state.config.max_file_size,
            )?;
            let (watcher, events) = FileWatcher::start(filter, Duration::from_millis(state.config.debounce_ms));
            tokio::spawn(run_watch_events(Arc::downgrade(state), events));
            Ok::<_, anyhow::Error>(watcher)
        })
        .await?;
    watcher.watch_directory(root)
}

/// Apply debounced events until the watcher or the engine goes away
async fn run_watch_events(engine: Weak<EngineState>, mut events: mpsc::UnboundedReceiver<WatchEvent>) {
    while let Some(event) = events.recv().await {
        let Some(state) = engine.upgrade() else {
            break;
        };
        match event {
            WatchEvent::Changed(path) => {
                handle_file_changed(&state, &path).await;
            }
            WatchEvent::Deleted(path) => handle_file_deleted(&state, &path).await,
            WatchEvent::Error(message) => warn!("⚠️ File watcher error: {}", message),
        }
    }
    debug!("Watch event loop stopped");
}

/// Clear everything stored for `path`, then run it through indexing again
pub(crate) async fn handle_file_changed(state: &Arc<EngineState>, path: &Path) -> IndexOutcome {
    clear_file(state, &normalize_path(path), IndexMode::Incremental).await;

    let outcome = index_file(state, path, IndexMode::Incremental).await;
    match &outcome {
        IndexOutcome::Indexed { symbols, .. } => {
            info!("🔄 Re-indexed {} ({} symbols)", path.display(), symbols)
        }
        IndexOutcome::Failed { reason } => warn!("⚠️ Failed to re-index {}: {}", path.display(), reason),
        other => debug!("{}: {:?}", path.display(), other),
    }
    outcome
}

pub(crate) async fn handle_file_deleted(state: &Arc<EngineState>, path: &Path) {
    let removed = clear_file(state, &normalize_path(path), IndexMode::Incremental).await;
    if removed > 0 {
        info!("🗑️ Removed {} ({} symbols)", path.display(), removed);
    }
}
