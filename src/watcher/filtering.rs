//! File filtering logic for watcher operations
//!
//! Decides which paths produce events: supported extension, no excluded directory component,
//! no ignore-pattern match. Changed files additionally pass the size guard before delivery.

use anyhow::Result;
use std::collections::HashSet;
use std::path::{Component, Path};

#[derive(Debug, Clone)]
pub struct WatchFilter {
    supported_extensions: HashSet<String>,
    excluded_dirs: HashSet<String>,
    ignore_patterns: Vec<glob::Pattern>,
    max_file_size: u64,
}

impl WatchFilter {
    pub fn new(
        supported_extensions: impl IntoIterator<Item = String>,
        excluded_dirs: impl IntoIterator<Item = String>,
        max_file_size: u64,
    ) -> Result<Self> {
        Ok(Self {
            supported_extensions: supported_extensions.into_iter().collect(),
            excluded_dirs: excluded_dirs.into_iter().collect(),
            ignore_patterns: build_ignore_patterns()?,
            max_file_size,
        })
    }

    /// Extension, directory and pattern checks. Does not touch the file system, so it also
    /// works for paths that were just deleted.
    pub fn is_candidate(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            return false;
        };
        if !self.supported_extensions.contains(ext) {
            return false;
        }

        let in_excluded_dir = path.components().any(|component| match component {
            Component::Normal(name) => name
                .to_str()
                .is_some_and(|name| self.excluded_dirs.contains(name)),
            _ => false,
        });
        if in_excluded_dir {
            return false;
        }

        let path_str = path.to_string_lossy();
        !self.ignore_patterns.iter().any(|p| p.matches(&path_str))
    }

    /// `Ok(size)` when the file fits, `Err(size)` when it is over the ceiling
    pub fn check_size(&self, path: &Path) -> std::result::Result<u64, u64> {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size > self.max_file_size { Err(size) } else { Ok(size) }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}

/// Generated or minified artifacts that share a supported extension
pub fn build_ignore_patterns() -> Result<Vec<glob::Pattern>> {
    let patterns = [
        "**/*.min.js",
        "**/*.bundle.js",
        "**/*.d.ts.map",
        "**/*.pyc",
        "**/.nyc_output/**",
        "**/node_modules.nosync/**",
    ];

    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| anyhow::anyhow!("Invalid glob pattern {}: {}", p, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn filter() -> WatchFilter {
        WatchFilter::new(
            ["rs", "ts", "js"].iter().map(|s| s.to_string()),
            ["node_modules", "target"].iter().map(|s| s.to_string()),
            16,
        )
        .unwrap()
    }

    #[test]
    fn filters_by_extension_dir_and_pattern() {
        let filter = filter();
        assert!(filter.is_candidate(&PathBuf::from("/w/src/main.rs")));
        assert!(!filter.is_candidate(&PathBuf::from("/w/README.md")));
        assert!(!filter.is_candidate(&PathBuf::from("/w/node_modules/pkg/index.js")));
        assert!(!filter.is_candidate(&PathBuf::from("/w/target/debug/build.rs")));
        assert!(!filter.is_candidate(&PathBuf::from("/w/dist/app.min.js")));
    }

    #[test]
    fn size_guard_rejects_large_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let small = dir.path().join("small.rs");
        let large = dir.path().join("large.rs");
        std::fs::write(&small, "fn a() {}").unwrap();
        std::fs::write(&large, "fn a() {}\nfn b() {}\nfn c() {}\n").unwrap();

        let filter = filter();
        assert_eq!(filter.check_size(&small), Ok(9));
        assert!(filter.check_size(&large).is_err());
    }
}
