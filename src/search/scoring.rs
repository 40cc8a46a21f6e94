//! Name-match scoring for structural search.
//!
//! Scores are in `[0, 1]`; an exact (case-insensitive) name match is always 1.0 and every
//! weaker match tier stays strictly below the one above it.

use std::cmp::Ordering;

use super::tokenizer::identifier_parts;
use crate::extractors::base::SymbolKind;

const PREFIX_SCORE: f32 = 0.85;
const SUBSTRING_SCORE: f32 = 0.75;
/// Width of the coverage bonus inside the prefix and substring tiers.
const COVERAGE_SPAN: f32 = 0.1;
const TOKEN_SCORE: f32 = 0.7;
const FUZZY_SCORE: f32 = 0.6;
const SIGNATURE_SCORE: f32 = 0.35;

/// Minimum normalized edit similarity considered a typo rather than a different name.
const MIN_EDIT_SIMILARITY: f32 = 0.6;

/// Score a symbol name against a query. Both sides are compared lowercased.
pub fn score_name(query: &str, name: &str) -> f32 {
    let query = query.trim().to_lowercase();
    let name_lower = name.to_lowercase();
    if query.is_empty() || name_lower.is_empty() {
        return 0.0;
    }

    if name_lower == query {
        return 1.0;
    }

    let compact_query: String = query.chars().filter(|c| !c.is_whitespace()).collect();
    if name_lower.starts_with(&compact_query) {
        // Shorter remaining suffix ranks higher within the prefix tier.
        let coverage = compact_query.len() as f32 / name_lower.len() as f32;
        return PREFIX_SCORE + COVERAGE_SPAN * coverage;
    }
    if name_lower.contains(&compact_query) {
        let coverage = compact_query.len() as f32 / name_lower.len() as f32;
        return SUBSTRING_SCORE + COVERAGE_SPAN * coverage;
    }

    let query_parts: Vec<String> = query
        .split_whitespace()
        .flat_map(identifier_parts)
        .collect();
    let name_parts = identifier_parts(name);
    if !query_parts.is_empty() {
        let matched = query_parts
            .iter()
            .filter(|q| name_parts.iter().any(|n| n == *q || n.starts_with(q.as_str())))
            .count();
        if matched > 0 {
            let coverage = matched as f32 / query_parts.len() as f32;
            return TOKEN_SCORE * coverage;
        }
    }

    0.0
}

/// Typo tier for a name the index matched within `distance` edits of the query.
pub fn score_fuzzy(query: &str, name: &str, distance: u8) -> f32 {
    let query_len = query.trim().chars().filter(|c| !c.is_whitespace()).count();
    let max_len = query_len.max(name.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    let similarity = 1.0 - f32::from(distance) / max_len as f32;
    if similarity >= MIN_EDIT_SIMILARITY {
        FUZZY_SCORE * similarity
    } else {
        0.0
    }
}

/// Weak match on the signature text for names that did not match at all.
pub fn score_signature(query: &str, signature: Option<&str>) -> f32 {
    let Some(signature) = signature else {
        return 0.0;
    };
    let query = query.trim().to_lowercase();
    if !query.is_empty() && signature.to_lowercase().contains(&query) {
        SIGNATURE_SCORE
    } else {
        0.0
    }
}

/// Tie-break rank: declarations people search for come first.
pub fn kind_rank(kind: SymbolKind) -> u8 {
    if kind.is_type_like() {
        0
    } else if kind.is_callable() {
        1
    } else if kind == SymbolKind::Import {
        3
    } else {
        2
    }
}

/// Descending score, `f32` NaN-safe.
pub fn by_score_desc(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_beats_everything() {
        assert_eq!(score_name("UserService", "userservice"), 1.0);
        assert!(score_name("user", "UserService") < 1.0);
    }

    #[test]
    fn tiers_are_ordered() {
        let prefix = score_name("user", "userService");
        let substring = score_name("service", "userService");
        let token = score_name("service user", "userService");
        let typo = score_fuzzy("usrservice", "userservice", 1);
        assert!(prefix > substring, "{prefix} vs {substring}");
        assert!(substring > token, "{substring} vs {token}");
        assert!(token > typo, "{token} vs {typo}");
        assert!(typo > 0.0);
    }

    #[test]
    fn unrelated_names_score_zero() {
        assert_eq!(score_name("parser", "database"), 0.0);
    }

    #[test]
    fn distant_typos_fall_below_the_floor() {
        assert!(score_fuzzy("userservice", "userservlce", 1) > score_fuzzy("userservice", "usrsrvice", 2));
        assert_eq!(score_fuzzy("abc", "xyz", 2), 0.0);
    }
}
