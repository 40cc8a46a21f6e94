// Extractor contract and the language → extractor strategy table.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tree_sitter::Tree;

use super::base::{ExtractionResults, Relationship, Symbol, TypeInfo};
use super::python::PythonExtractor;
use super::rust::RustExtractor;
use super::typescript::TypeScriptExtractor;

/// Everything an extractor gets to look at for one file.
pub struct ExtractionInput<'a> {
    pub language: &'a str,
    pub file_path: &'a str,
    pub content: &'a str,
    pub tree: &'a Tree,
}

/// One implementation per language family.
///
/// Extraction must be pure: identical `(content, tree)` yields identical output. Nodes the
/// implementation does not recognize are skipped rather than reported as errors.
pub trait LanguageExtractor: Send + Sync {
    /// Language names this extractor serves (as produced by parser dispatch).
    fn languages(&self) -> &'static [&'static str];

    /// Symbols in pre-order: parents always precede their children.
    fn extract_symbols(&self, input: &ExtractionInput) -> Vec<Symbol>;

    fn extract_relationships(&self, input: &ExtractionInput, symbols: &[Symbol]) -> Vec<Relationship>;

    fn infer_types(&self, input: &ExtractionInput, symbols: &[Symbol]) -> HashMap<String, TypeInfo>;

    /// Run all three passes.
    fn extract(&self, input: &ExtractionInput) -> Result<ExtractionResults> {
        let symbols = self.extract_symbols(input);
        let relationships = self.extract_relationships(input, &symbols);
        let types = self.infer_types(input, &symbols);
        Ok(ExtractionResults {
            symbols,
            relationships,
            types,
        })
    }
}

/// Maps a language name to the extractor that handles it.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn LanguageExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in extractor.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RustExtractor));
        registry.register(Arc::new(PythonExtractor));
        registry.register(Arc::new(TypeScriptExtractor));
        registry
    }

    /// Register `extractor` for each language it serves, replacing earlier entries.
    pub fn register(&mut self, extractor: Arc<dyn LanguageExtractor>) {
        for language in extractor.languages() {
            self.extractors
                .insert((*language).to_string(), Arc::clone(&extractor));
        }
    }

    pub fn get(&self, language: &str) -> Option<Arc<dyn LanguageExtractor>> {
        self.extractors.get(language).cloned()
    }

    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.extractors.keys().cloned().collect();
        languages.sort();
        languages
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}
