// Workspace passes and single-file indexing

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, anyhow};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::resolver::{ResolutionStats, resolve_relationships};
use super::{EngineState, watch};
use crate::database::FileInfo;
use crate::error::{EngineError, Result};
use crate::extractors::ExtractionInput;
use crate::extractors::base::{ExtractionResults, Relationship};
use crate::parser::content_hash;

/// Whether structural index updates, resolution and embedding happen per file or once at
/// the end of a workspace pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Bulk,
    Incremental,
}

/// What happened to one file. Per-file problems are reported here, never as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IndexOutcome {
    Indexed {
        symbols: usize,
        relationships: usize,
        types: usize,
    },
    Unchanged,
    SkippedOversized {
        size: u64,
    },
    SkippedUnsupported,
    SkippedNoExtractor {
        language: String,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkspaceIndexReport {
    pub root: String,
    pub files_discovered: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub files_removed: usize,
    pub symbols_indexed: usize,
    pub relationships_resolved: usize,
    pub embeddings_queued: usize,
    pub watching: bool,
    pub duration_ms: u64,
}

impl WorkspaceIndexReport {
    fn record(&mut self, outcome: &IndexOutcome) {
        match outcome {
            IndexOutcome::Indexed { symbols, .. } => {
                self.files_indexed += 1;
                self.symbols_indexed += symbols;
            }
            IndexOutcome::Unchanged => self.files_unchanged += 1,
            IndexOutcome::SkippedOversized { .. }
            | IndexOutcome::SkippedUnsupported
            | IndexOutcome::SkippedNoExtractor { .. } => self.files_skipped += 1,
            IndexOutcome::Failed { .. } => self.files_failed += 1,
        }
    }
}

/// Canonical string form used as the key for files and workspaces
pub(crate) fn normalize_path(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

pub(crate) async fn index_workspace(state: &Arc<EngineState>, root: &Path) -> Result<WorkspaceIndexReport> {
    let started = Instant::now();
    let root_path = root
        .canonicalize()
        .and_then(|canonical| std::fs::read_dir(&canonical).map(|_| canonical))
        .map_err(|source| EngineError::WorkspaceUnreadable {
            path: root.to_path_buf(),
            source,
        })?;
    let root_key = root_path.to_string_lossy().to_string();

    info!("🔍 Scanning workspace: {}", root_key);

    let files = {
        let state = Arc::clone(state);
        let root_path = root_path.clone();
        tokio::task::spawn_blocking(move || discover_files(&state, &root_path))
            .await
            .map_err(|e| EngineError::Internal(anyhow!("File discovery task failed: {}", e)))?
    };

    let mut report = WorkspaceIndexReport {
        root: root_key.clone(),
        files_discovered: files.len(),
        ..Default::default()
    };
    info!("📊 Discovered {} indexable files", files.len());

    report.files_removed = remove_orphaned_files(state, &root_key, &files).await?;

    let batch_size = state.config.batch_size.max(1);
    for batch in files.chunks(batch_size) {
        // Every file is attempted; one failure never cancels its siblings
        let outcomes = join_all(batch.iter().map(|path| {
            let path = path.to_string_lossy().to_string();
            let root_key = root_key.clone();
            async move {
                let outcome = index_file_in(state, &path, &root_key, IndexMode::Bulk).await;
                (path, outcome)
            }
        }))
        .await;

        for (path, outcome) in outcomes {
            if let IndexOutcome::Failed { reason } = &outcome {
                warn!("⚠️ Failed to index {}: {}", path, reason);
            }
            report.record(&outcome);
        }
    }

    let resolution = state
        .write(|db| {
            let pending = db.get_unresolved_relationships()?;
            resolve_relationships(db, &pending)
        })
        .await?;
    resolution.log_summary();
    report.relationships_resolved = resolution.resolved;

    rebuild_structural_index(state).await?;

    let (workspace, missing) = {
        let root_key = root_key.clone();
        state
            .write(move |db| {
                let workspace = db.upsert_workspace(&root_key)?;
                let missing = db.get_symbols_without_embeddings(&root_key)?;
                Ok((workspace, missing))
            })
            .await?
    };
    // Fire and forget; completion is tracked by the semantic indexer's counters
    report.embeddings_queued = state.semantic.enqueue(&missing, &root_key);

    if state.config.watch {
        match watch::arm_watcher(state, &root_path).await {
            Ok(()) => report.watching = true,
            Err(e) => warn!("⚠️ Could not watch {}: {:#}", root_key, e),
        }
    }

    report.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "✅ Indexed {}: {} files ({} unchanged, {} skipped, {} failed), {} symbols total, {} embeddings queued in {}ms",
        root_key,
        report.files_indexed,
        report.files_unchanged,
        report.files_skipped,
        report.files_failed,
        workspace.symbol_count,
        report.embeddings_queued,
        report.duration_ms
    );
    Ok(report)
}

/// Walk `root` for files with a supported extension, skipping excluded directories
fn discover_files(state: &EngineState, root: &Path) -> Vec<PathBuf> {
    let extensions: HashSet<String> = state.parser.supported_extensions().into_iter().collect();

    let walker = WalkDir::new(root).follow_links(false).into_iter().filter_entry(|entry| {
        // Never filter the root itself, even if it is named like an excluded directory
        entry.depth() == 0
            || !entry.file_type().is_dir()
            || !state.config.is_excluded_dir(&entry.file_name().to_string_lossy())
    });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let supported = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext.to_lowercase()));
        if supported {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files
}

/// Drop stored files of this workspace that no longer exist on disk
async fn remove_orphaned_files(state: &Arc<EngineState>, root_key: &str, discovered: &[PathBuf]) -> Result<usize> {
    let on_disk: HashSet<String> = discovered
        .iter()
        .map(|path| path.to_string_lossy().to_string())
        .collect();

    let root_key = root_key.to_string();
    let (removed_files, removed_ids) = state
        .write(move |db| {
            let mut removed_files = 0;
            let mut removed_ids = Vec::new();
            for path in db.get_file_paths_for_workspace(&root_key)? {
                if on_disk.contains(&path) {
                    continue;
                }
                removed_ids.extend(db.delete_file_data(&path)?);
                removed_files += 1;
            }
            Ok((removed_files, removed_ids))
        })
        .await?;

    if removed_files > 0 {
        info!("🧹 Removed {} files that no longer exist", removed_files);
        state.semantic.remove_symbols(&removed_ids);
    }
    Ok(removed_files)
}

/// Replace the structural index with everything the store holds
pub(crate) async fn rebuild_structural_index(state: &Arc<EngineState>) -> Result<()> {
    let (symbols, types) = state
        .read(|db| Ok((db.get_all_symbols()?, db.get_all_types()?)))
        .await?;
    let count = symbols.len();
    state.search.write().await.rebuild_index(symbols, &types)?;
    debug!("Structural index rebuilt with {} symbols", count);
    Ok(())
}

/// Index one file, attributing it to the registered workspace that contains it (or its
/// parent directory when none does).
pub(crate) async fn index_file(state: &Arc<EngineState>, path: &Path, mode: IndexMode) -> IndexOutcome {
    let path = normalize_path(path);
    let lookup = path.clone();
    let registered = state
        .read(move |db| db.find_workspace_for_path(&lookup))
        .await
        .ok()
        .flatten();
    let root = registered.unwrap_or_else(|| {
        Path::new(&path)
            .parent()
            .map(|parent| parent.to_string_lossy().to_string())
            .unwrap_or_default()
    });
    index_file_in(state, &path, &root, mode).await
}

pub(crate) async fn index_file_in(state: &Arc<EngineState>, path: &str, workspace_root: &str, mode: IndexMode) -> IndexOutcome {
    let file_path = Path::new(path);

    let metadata = match tokio::fs::metadata(file_path).await {
        Ok(metadata) => metadata,
        Err(e) => {
            return IndexOutcome::Failed {
                reason: format!("Cannot stat file: {}", e),
            };
        }
    };
    let size = metadata.len();
    if size > state.config.max_file_size {
        warn!(
            "⚠️ Skipping {}: {} bytes exceeds the {} byte limit",
            path, size, state.config.max_file_size
        );
        // A file that grew past the limit must not keep serving its old rows
        let removed = clear_file(state, path, mode).await;
        if removed > 0 {
            info!("🗑️ Dropped {} symbols of oversized {}", removed, path);
        }
        return IndexOutcome::SkippedOversized { size };
    }

    let Some(language) = state.parser.detect_language(file_path) else {
        return IndexOutcome::SkippedUnsupported;
    };
    let Some(extractor) = state.extractors.get(&language) else {
        warn!("⚠️ No extractor registered for {} ({})", language, path);
        return IndexOutcome::SkippedNoExtractor { language };
    };

    let bytes = match tokio::fs::read(file_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return IndexOutcome::Failed {
                reason: format!("Cannot read file: {}", e),
            };
        }
    };
    let hash = content_hash(&bytes);

    let stored_hash = {
        let lookup = path.to_string();
        state.read(move |db| db.get_file_hash(&lookup)).await
    };
    if matches!(&stored_hash, Ok(Some(stored)) if *stored == hash) {
        debug!("Unchanged: {}", path);
        return IndexOutcome::Unchanged;
    }

    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(_) => {
            return IndexOutcome::Failed {
                reason: "File is not valid UTF-8".to_string(),
            };
        }
    };

    let parse_started = Instant::now();
    let extraction = {
        let parser = Arc::clone(&state.parser);
        let path = path.to_string();
        let content = content.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<(ExtractionResults, String)> {
            let parsed = parser.parse(Path::new(&path), &content)?;
            let input = ExtractionInput {
                language: &parsed.language,
                file_path: &path,
                content: &content,
                tree: &parsed.tree,
            };
            let results = extractor
                .extract(&input)
                .with_context(|| format!("Extraction failed for {}", path))?;
            Ok((results, parsed.language))
        })
        .await
    };
    let (results, language) = match extraction {
        Ok(Ok(extracted)) => extracted,
        Ok(Err(e)) => {
            return IndexOutcome::Failed {
                reason: format!("{:#}", e),
            };
        }
        Err(e) => {
            return IndexOutcome::Failed {
                reason: format!("Extraction task failed: {}", e),
            };
        }
    };
    let parse_duration_ms = parse_started.elapsed().as_millis() as i64;

    let last_modified = metadata
        .modified()
        .map(|time| chrono::DateTime::<chrono::Utc>::from(time).timestamp())
        .unwrap_or_default();
    let file = FileInfo {
        path: path.to_string(),
        workspace_root: workspace_root.to_string(),
        language,
        hash,
        size: size as i64,
        last_modified,
        last_indexed: chrono::Utc::now().timestamp(),
        parse_duration_ms,
        symbol_count: results.symbols.len() as i64,
        content: Some(content),
    };

    let outcome = IndexOutcome::Indexed {
        symbols: results.symbols.len(),
        relationships: results.relationships.len(),
        types: results.types.len(),
    };

    let results = Arc::new(results);
    let previous_ids = {
        let results = Arc::clone(&results);
        match state.write(move |db| db.commit_file_extraction(&file, &results)).await {
            Ok(ids) => ids,
            Err(e) => {
                return IndexOutcome::Failed {
                    reason: format!("Store write failed: {}", e),
                };
            }
        }
    };
    // The commit replaced every symbol row, and their embeddings with them
    state.semantic.remove_symbols(&previous_ids);

    if mode == IndexMode::Incremental {
        let updated = state
            .search
            .write()
            .await
            .update_index(path, results.symbols.clone(), &results.types);
        if let Err(e) = updated {
            warn!("⚠️ Structural index update failed for {}: {:#}", path, e);
        }

        if let Err(e) = resolve_after_change(state, &results).await {
            warn!("⚠️ Relationship resolution failed after indexing {}: {}", path, e);
        }
        state.semantic.enqueue(&results.symbols, workspace_root);
    }

    debug!("Indexed {} ({:?})", path, outcome);
    outcome
}

/// Store rows, vectors and (incrementally) index entries of one file; returns how many
/// symbols went away. Bulk passes rebuild the structural index afterwards anyway.
pub(crate) async fn clear_file(state: &Arc<EngineState>, path: &str, mode: IndexMode) -> usize {
    let target = path.to_string();
    let removed_ids = match state.write(move |db| db.delete_file_data(&target)).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!("⚠️ Failed to clear {}: {}", path, e);
            return 0;
        }
    };

    if mode == IndexMode::Incremental {
        if let Err(e) = state.search.write().await.remove_from_index(path) {
            warn!("⚠️ Failed to drop {} from the structural index: {:#}", path, e);
        }
    }
    state.semantic.remove_symbols(&removed_ids);
    removed_ids.len()
}

/// Resolve this file's placeholders plus placeholders elsewhere that name its symbols
async fn resolve_after_change(state: &Arc<EngineState>, results: &ExtractionResults) -> Result<ResolutionStats> {
    let own: Vec<Relationship> = results
        .relationships
        .iter()
        .filter(|rel| rel.is_unresolved())
        .cloned()
        .collect();
    let names: HashSet<String> = results.symbols.iter().map(|s| s.name.clone()).collect();

    let stats = state
        .write(move |db| {
            let mut pending = own;
            let mut seen: HashSet<String> = pending.iter().map(|rel| rel.id.clone()).collect();
            for name in &names {
                for rel in db.get_unresolved_relationships_named(name)? {
                    if seen.insert(rel.id.clone()) {
                        pending.push(rel);
                    }
                }
            }
            resolve_relationships(db, &pending)
        })
        .await?;
    Ok(stats)
}
