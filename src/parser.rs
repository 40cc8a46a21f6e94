//! Parser dispatch: language detection, parsing and content fingerprints.
//!
//! Parsers are expensive to set up, so [`TreeSitterDispatch`] keeps a small pool of them per
//! language and hands them out to whichever indexing task needs one.

use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use tree_sitter::{Parser, Tree};

use crate::language;

/// Output of a successful parse.
pub struct ParsedFile {
    pub tree: Tree,
    /// blake3 hex digest of the parsed content
    pub hash: String,
    pub language: String,
}

/// What the indexer needs from the parsing layer.
pub trait ParserDispatch: Send + Sync {
    fn detect_language(&self, path: &Path) -> Option<String>;

    fn parse(&self, path: &Path, content: &str) -> Result<ParsedFile>;

    /// Extensions (without the dot) this dispatcher can parse
    fn supported_extensions(&self) -> Vec<String>;
}

/// Content fingerprint used for change detection.
pub fn content_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Tree-sitter backed dispatcher with a per-language parser pool.
#[derive(Default)]
pub struct TreeSitterDispatch {
    idle: Mutex<HashMap<String, Vec<Parser>>>,
}

impl TreeSitterDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    fn checkout(&self, language: &str) -> Result<Parser> {
        let pooled = match self.idle.lock() {
            Ok(mut idle) => idle.get_mut(language).and_then(|parsers| parsers.pop()),
            Err(poisoned) => poisoned
                .into_inner()
                .get_mut(language)
                .and_then(|parsers| parsers.pop()),
        };
        if let Some(parser) = pooled {
            return Ok(parser);
        }

        let mut parser = Parser::new();
        let grammar = language::get_tree_sitter_language(language)?;
        parser
            .set_language(&grammar)
            .map_err(|e| anyhow!("Failed to set parser language for {}: {}", language, e))?;
        debug!("🔧 Created new parser for language: {}", language);
        Ok(parser)
    }

    fn checkin(&self, language: &str, mut parser: Parser) {
        parser.reset();
        let mut idle = match self.idle.lock() {
            Ok(idle) => idle,
            Err(poisoned) => poisoned.into_inner(),
        };
        idle.entry(language.to_string()).or_default().push(parser);
    }
}

impl ParserDispatch for TreeSitterDispatch {
    fn detect_language(&self, path: &Path) -> Option<String> {
        language::detect_language(path).map(str::to_string)
    }

    fn parse(&self, path: &Path, content: &str) -> Result<ParsedFile> {
        let language = self
            .detect_language(path)
            .ok_or_else(|| anyhow!("Unsupported file type: {}", path.display()))?;

        let mut parser = self.checkout(&language)?;
        let tree = parser.parse(content, None);
        self.checkin(&language, parser);

        let tree = tree.with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(ParsedFile {
            tree,
            hash: content_hash(content.as_bytes()),
            language,
        })
    }

    fn supported_extensions(&self) -> Vec<String> {
        language::supported_extensions()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reuses_pooled_parser() {
        let dispatch = TreeSitterDispatch::new();
        let first = dispatch.parse(Path::new("a.py"), "def a():\n    pass\n").unwrap();
        let second = dispatch.parse(Path::new("b.py"), "def b():\n    pass\n").unwrap();

        assert_eq!(first.language, "python");
        assert_eq!(first.tree.root_node().kind(), "module");
        assert_ne!(first.hash, second.hash);
        assert_eq!(dispatch.idle.lock().unwrap().get("python").map(Vec::len), Some(1));
    }

    #[test]
    fn test_parse_rejects_unknown_extension() {
        let dispatch = TreeSitterDispatch::new();
        assert!(dispatch.parse(Path::new("notes.txt"), "hello").is_err());
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"fn main() {}"), content_hash(b"fn main() {}"));
        assert_eq!(content_hash(b"").len(), 64);
    }
}
