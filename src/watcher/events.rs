//! File system event processing pipeline
//!
//! Turns notify events into filtered [`FileChangeEvent`]s and debounces them per path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use tracing::debug;

use super::filtering::WatchFilter;
use super::types::{FileChangeEvent, FileChangeType, PendingChange};

/// Filtered changes carried by one notify event. Renames become a delete of the old path
/// and a create of the new one.
pub fn classify_event(filter: &WatchFilter, event: Event) -> Vec<FileChangeEvent> {
    let changes: Vec<(PathBuf, FileChangeType)> = match event.kind {
        EventKind::Create(_) => event
            .paths
            .into_iter()
            .map(|p| (p, FileChangeType::Created))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let mut changes = Vec::new();
            if let Some(from) = paths.next() {
                changes.push((from, FileChangeType::Deleted));
            }
            if let Some(to) = paths.next() {
                changes.push((to, FileChangeType::Created));
            }
            changes
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .into_iter()
            .map(|p| (p, FileChangeType::Deleted))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .into_iter()
            .map(|p| (p, FileChangeType::Created))
            .collect(),
        // Platform could not tell which side of the rename this is
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .into_iter()
            .map(|p| {
                let kind = if p.exists() { FileChangeType::Created } else { FileChangeType::Deleted };
                (p, kind)
            })
            .collect(),
        EventKind::Modify(_) => event
            .paths
            .into_iter()
            .map(|p| (p, FileChangeType::Modified))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .into_iter()
            .map(|p| (p, FileChangeType::Deleted))
            .collect(),
        other => {
            debug!("Ignoring event kind: {:?}", other);
            Vec::new()
        }
    };

    changes
        .into_iter()
        .filter(|(path, change_type)| {
            filter.is_candidate(path) && (*change_type == FileChangeType::Deleted || !path.is_dir())
        })
        .map(|(path, change_type)| FileChangeEvent { path, change_type })
        .collect()
}

/// Per-path quiet-window debouncing: a path is released only after no new event arrived
/// for it during `window`. The last change type wins.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, PendingChange>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn push(&mut self, event: FileChangeEvent, now: Instant) {
        self.pending.insert(
            event.path,
            PendingChange {
                change_type: event.change_type,
                last_seen: now,
            },
        );
    }

    /// Remove and return every path quiet for at least the window, sorted by path.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<FileChangeEvent> {
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, change)| now.saturating_duration_since(change.last_seen) >= self.window)
            .map(|(path, _)| path.clone())
            .collect();

        let mut events: Vec<FileChangeEvent> = ready
            .into_iter()
            .filter_map(|path| {
                self.pending.remove(&path).map(|change| FileChangeEvent {
                    path,
                    change_type: change.change_type,
                })
            })
            .collect();
        events.sort_by(|a, b| a.path.cmp(&b.path));
        events
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> WatchFilter {
        WatchFilter::new(["rs".to_string()], ["target".to_string()], 1024).unwrap()
    }

    #[test]
    fn rename_splits_into_delete_and_create() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/w/old.rs"))
            .add_path(PathBuf::from("/w/new.rs"));

        let changes = classify_event(&filter(), event);
        assert_eq!(
            changes,
            vec![
                FileChangeEvent { path: PathBuf::from("/w/old.rs"), change_type: FileChangeType::Deleted },
                FileChangeEvent { path: PathBuf::from("/w/new.rs"), change_type: FileChangeType::Created },
            ]
        );
    }

    #[test]
    fn unsupported_paths_are_dropped() {
        let event = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(PathBuf::from("/w/notes.txt"))
            .add_path(PathBuf::from("/w/target/gen.rs"))
            .add_path(PathBuf::from("/w/lib.rs"));

        let changes = classify_event(&filter(), event);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, PathBuf::from("/w/lib.rs"));
    }

    #[test]
    fn debouncer_waits_for_quiet_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let path = PathBuf::from("/w/a.rs");

        debouncer.push(FileChangeEvent { path: path.clone(), change_type: FileChangeType::Created }, start);
        debouncer.push(
            FileChangeEvent { path: path.clone(), change_type: FileChangeType::Modified },
            start + Duration::from_millis(80),
        );

        assert!(debouncer.drain_ready(start + Duration::from_millis(120)).is_empty());

        let ready = debouncer.drain_ready(start + Duration::from_millis(180));
        assert_eq!(ready, vec![FileChangeEvent { path, change_type: FileChangeType::Modified }]);
        assert!(debouncer.is_empty());
    }
}
