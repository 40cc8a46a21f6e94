//! Cross-file relationship resolution
//!
//! Extractors only link names defined in the same file; everything else is stored as an
//! `unresolved:<name>` placeholder. This pass looks placeholders up in the store by name and
//! rewrites the target of the best candidate.
//!
//! ## Disambiguation Strategy
//! 1. **Kind filter**: imports are bindings, never definitions
//! 2. **Same language**: strongly preferred
//! 3. **Path proximity**: same directory, then parent/child directory
//! 4. **Callable kinds** for `Calls` edges

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use tracing::{debug, info};

use crate::database::{ResolvedTarget, SymbolDatabase};
use crate::extractors::base::{Relationship, RelationshipKind, Symbol, SymbolKind};

/// Confidence when the caller's file imports the target name
pub const IMPORTED_CONFIDENCE: f32 = 1.0;
/// Confidence for a name-only match
pub const NAME_MATCH_CONFIDENCE: f32 = 0.8;

fn dir_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Higher is better; 0 excludes the candidate.
fn score_candidate(candidate: &Symbol, relationship: &Relationship, caller_language: Option<&str>) -> u32 {
    if candidate.kind == SymbolKind::Import {
        return 0;
    }
    // An edge never resolves back into its own file: local names were linked at extraction
    if candidate.file_path == relationship.file_path {
        return 0;
    }

    let mut score: u32 = 1;

    if caller_language.is_some_and(|lang| candidate.language == lang) {
        score += 100;
    }

    let caller_dir = dir_of(&relationship.file_path);
    let candidate_dir = dir_of(&candidate.file_path);
    if caller_dir == candidate_dir {
        score += 50;
    } else if candidate_dir.starts_with(caller_dir) || caller_dir.starts_with(candidate_dir) {
        score += 25;
    }

    if relationship.kind == RelationshipKind::Calls && candidate.kind.is_callable() {
        score += 10;
    }

    score
}

/// Best candidate, ties broken by path then line so the choice is stable.
pub fn select_best_candidate<'a>(
    candidates: &'a [Symbol],
    relationship: &Relationship,
    caller_language: Option<&str>,
) -> Option<&'a Symbol> {
    candidates
        .iter()
        .filter_map(|c| {
            let score = score_candidate(c, relationship, caller_language);
            (score > 0).then_some((c, score))
        })
        .max_by(|(a, sa), (b, sb)| {
            sa.cmp(sb)
                .then_with(|| b.file_path.cmp(&a.file_path))
                .then_with(|| b.start_line.cmp(&a.start_line))
        })
        .map(|(symbol, _)| symbol)
}

/// Statistics from a resolution pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolutionStats {
    pub total: usize,
    pub resolved: usize,
    pub no_candidates: usize,
}

impl ResolutionStats {
    pub fn log_summary(&self) {
        if self.total == 0 {
            return;
        }
        let pct = (self.resolved as f64 / self.total as f64 * 100.0) as u32;
        info!(
            "🔗 Resolution: {}/{} resolved ({}%), {} without candidates",
            self.resolved, self.total, pct, self.no_candidates
        );
    }
}

/// Resolve `pending` placeholders against the store and persist the winners.
pub fn resolve_relationships(db: &mut SymbolDatabase, pending: &[Relationship]) -> Result<ResolutionStats> {
    let mut stats = ResolutionStats::default();
    let mut candidates_by_name: HashMap<String, Vec<Symbol>> = HashMap::new();
    let mut imports_by_file: HashMap<String, HashSet<String>> = HashMap::new();
    let mut language_by_symbol: HashMap<String, Option<String>> = HashMap::new();
    let mut resolutions = Vec::new();

    for relationship in pending.iter().filter(|r| r.is_unresolved()) {
        stats.total += 1;
        let Some(name) = relationship.target_name() else {
            stats.no_candidates += 1;
            continue;
        };

        if !candidates_by_name.contains_key(name) {
            let found = db.get_symbols_by_name(name)?;
            candidates_by_name.insert(name.to_string(), found);
        }
        let candidates = candidates_by_name.get(name).map(Vec::as_slice).unwrap_or_default();

        if !language_by_symbol.contains_key(&relationship.from_symbol_id) {
            let language = db
                .get_symbol_by_id(&relationship.from_symbol_id)?
                .map(|s| s.language);
            language_by_symbol.insert(relationship.from_symbol_id.clone(), language);
        }
        let caller_language = language_by_symbol
            .get(&relationship.from_symbol_id)
            .and_then(|l| l.as_deref());

        let Some(target) = select_best_candidate(candidates, relationship, caller_language) else {
            stats.no_candidates += 1;
            continue;
        };

        if !imports_by_file.contains_key(&relationship.file_path) {
            let imports = db.get_import_names_for_file(&relationship.file_path)?;
            imports_by_file.insert(relationship.file_path.clone(), imports);
        }
        let imported = imports_by_file
            .get(&relationship.file_path)
            .is_some_and(|names| names.contains(name));

        resolutions.push(ResolvedTarget {
            relationship_id: relationship.id.clone(),
            to_symbol_id: target.id.clone(),
            confidence: if imported { IMPORTED_CONFIDENCE } else { NAME_MATCH_CONFIDENCE },
        });
    }

    stats.resolved = db.apply_resolutions(&resolutions)?;
    debug!("Resolved {} of {} pending relationships", stats.resolved, stats.total);
    Ok(stats)
}
