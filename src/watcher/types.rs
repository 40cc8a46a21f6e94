//! Type definitions for file watcher events

use std::path::PathBuf;
use std::time::Instant;

/// A filtered file system change, before debouncing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub change_type: FileChangeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeType {
    Created,
    Modified,
    Deleted,
}

/// What the watcher delivers once a path has been quiet for the debounce window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Created or modified: clear and re-index
    Changed(PathBuf),
    /// Removed or renamed away: clear and de-index
    Deleted(PathBuf),
    /// Watcher-level failure, for logging only
    Error(String),
}

/// Latest change seen for one path and when it arrived
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingChange {
    pub change_type: FileChangeType,
    pub last_seen: Instant,
}
