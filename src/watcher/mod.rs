//! File Watcher
//!
//! notify delivers raw events to a channel; one background task filters them, debounces per
//! path and forwards [`WatchEvent`]s to whoever owns the receiver (the engine). Changed files
//! over the size ceiling are dropped here with a warning. Watcher errors travel as
//! `WatchEvent::Error` and are only ever logged.

mod events;
pub mod filtering;
pub mod types;

use anyhow::{Context, Result};
use notify::Watcher;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use events::{Debouncer, classify_event};
pub use filtering::WatchFilter;
pub use types::{FileChangeEvent, FileChangeType, WatchEvent};

const MIN_TICK: Duration = Duration::from_millis(25);

pub struct FileWatcher {
    watchers: Mutex<HashMap<PathBuf, notify::RecommendedWatcher>>,
    raw_tx: mpsc::UnboundedSender<notify::Result<notify::Event>>,
    task: JoinHandle<()>,
}

impl FileWatcher {
    /// Start the debounce task. Events come out of the returned receiver.
    pub fn start(filter: WatchFilter, debounce: Duration) -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_debounce_loop(filter, debounce, raw_rx, out_tx));

        (
            Self {
                watchers: Mutex::new(HashMap::new()),
                raw_tx,
                task,
            },
            out_rx,
        )
    }

    /// Watch `root` recursively. Watching an already watched root is a no-op.
    pub fn watch_directory(&self, root: &Path) -> Result<()> {
        let mut watchers = self.lock_watchers();
        if watchers.contains_key(root) {
            return Ok(());
        }

        let tx = self.raw_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res| {
            // Receiver gone means the watcher is shutting down
            let _ = tx.send(res);
        })
        .context("Failed to create file watcher")?;

        watcher
            .watch(root, notify::RecursiveMode::Recursive)
            .with_context(|| format!("Failed to start watching {}", root.display()))?;

        watchers.insert(root.to_path_buf(), watcher);
        info!("👀 Watching {}", root.display());
        Ok(())
    }

    pub fn unwatch(&self, root: &Path) -> bool {
        let removed = self.lock_watchers().remove(root);
        if removed.is_some() {
            info!("Stopped watching {}", root.display());
        }
        removed.is_some()
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.lock_watchers().keys().cloned().collect();
        roots.sort();
        roots
    }

    /// The debounce task is alive
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Drop every notify watcher and stop the debounce task
    pub fn stop(&self) {
        let count = {
            let mut watchers = self.lock_watchers();
            let count = watchers.len();
            watchers.clear();
            count
        };
        self.task.abort();
        info!("File watcher stopped ({} roots released)", count);
    }

    fn lock_watchers(&self) -> MutexGuard<'_, HashMap<PathBuf, notify::RecommendedWatcher>> {
        self.watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run_debounce_loop(
    filter: WatchFilter,
    debounce: Duration,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    out_tx: mpsc::UnboundedSender<WatchEvent>,
) {
    let mut debouncer = Debouncer::new(debounce);
    let mut tick = tokio::time::interval((debounce / 2).max(MIN_TICK));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    debug!("File watcher debounce loop started ({}ms window)", debounce.as_millis());
    loop {
        tokio::select! {
            received = raw_rx.recv() => {
                match received {
                    Some(Ok(event)) => {
                        let now = Instant::now();
                        for change in classify_event(&filter, event) {
                            debouncer.push(change, now);
                        }
                    }
                    Some(Err(e)) => {
                        if out_tx.send(WatchEvent::Error(e.to_string())).is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
            _ = tick.tick() => {
                for change in debouncer.drain_ready(Instant::now()) {
                    let Some(event) = to_watch_event(&filter, change) else {
                        continue;
                    };
                    if out_tx.send(event).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn to_watch_event(filter: &WatchFilter, change: FileChangeEvent) -> Option<WatchEvent> {
    match change.change_type {
        FileChangeType::Deleted => Some(WatchEvent::Deleted(change.path)),
        FileChangeType::Created | FileChangeType::Modified => {
            // Created and then removed inside the window
            if !change.path.exists() {
                return Some(WatchEvent::Deleted(change.path));
            }
            match filter.check_size(&change.path) {
                Ok(_) => Some(WatchEvent::Changed(change.path)),
                Err(size) => {
                    warn!(
                        "⚠️ Skipping oversized file {} ({} bytes > {} limit), dropping its index entries",
                        change.path.display(),
                        size,
                        filter.max_file_size()
                    );
                    Some(WatchEvent::Deleted(change.path))
                }
            }
        }
    }
}

