//! Language detection and tree-sitter grammar lookup
//!
//! The single place mapping file extensions to language names and language names to
//! grammars, shared by parser dispatch, the watcher and workspace discovery.

use anyhow::{Result, anyhow};
use std::path::Path;

/// Extension (lowercase, no dot) → language name
const EXTENSION_LANGUAGES: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("py", "python"),
    ("pyi", "python"),
    ("ts", "typescript"),
    ("mts", "typescript"),
    ("cts", "typescript"),
    ("tsx", "tsx"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("jsx", "javascript"),
];

/// Detect programming language from file extension
pub fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSION_LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, language)| *language)
}

/// All extensions with a grammar behind them.
pub fn supported_extensions() -> Vec<&'static str> {
    EXTENSION_LANGUAGES.iter().map(|(ext, _)| *ext).collect()
}

/// Grammar for a language name returned by [`detect_language`]
pub fn get_tree_sitter_language(language: &str) -> Result<tree_sitter::Language> {
    match language {
        "rust" => Ok(tree_sitter_rust::LANGUAGE.into()),
        "python" => Ok(tree_sitter_python::LANGUAGE.into()),
        "typescript" => Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "tsx" => Ok(tree_sitter_typescript::LANGUAGE_TSX.into()),
        "javascript" => Ok(tree_sitter_javascript::LANGUAGE.into()),
        _ => Err(anyhow!("No tree-sitter grammar for language: {}", language)),
    }
}
