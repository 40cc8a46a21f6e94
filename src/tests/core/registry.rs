// Language detection, parser dispatch and the extractor strategy table agree with each other

use std::path::Path;
use std::sync::Arc;

use crate::extractors::ExtractorRegistry;
use crate::extractors::python::PythonExtractor;
use crate::parser::{ParserDispatch, TreeSitterDispatch};

#[test]
fn test_every_parsed_language_has_an_extractor() {
    let parser = TreeSitterDispatch::new();
    let registry = ExtractorRegistry::with_defaults();

    for ext in parser.supported_extensions() {
        let language = parser
            .detect_language(Path::new(&format!("file.{}", ext)))
            .unwrap();
        assert!(registry.get(&language).is_some(), "no extractor for {}", language);
    }
}

#[test]
fn test_registry_maps_each_served_language() {
    let registry = ExtractorRegistry::with_defaults();
    assert_eq!(
        registry.languages(),
        vec!["javascript", "python", "rust", "tsx", "typescript"]
    );
}

#[test]
fn test_registering_replaces_earlier_entries() {
    let mut registry = ExtractorRegistry::new();
    assert!(registry.is_empty());

    registry.register(Arc::new(PythonExtractor));
    registry.register(Arc::new(PythonExtractor));
    assert_eq!(registry.languages(), vec!["python"]);
    assert!(registry.get("rust").is_none());
}
