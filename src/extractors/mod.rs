// Marlin's Language Extractors Module
//
// Tree-sitter based extractors, one per language family, all behind the `LanguageExtractor`
// contract. The registry maps a language name to the extractor serving it.

pub mod base;
pub mod python;
pub mod registry;
pub mod rust;
pub mod typescript;

// Re-export the base extractor types
pub use base::{
    BaseExtractor, ExtractionResults, Relationship, RelationshipKind, Symbol, SymbolKind, TypeInfo,
    Visibility,
};
pub use registry::{ExtractionInput, ExtractorRegistry, LanguageExtractor};
