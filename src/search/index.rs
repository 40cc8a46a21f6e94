//! Tantivy-backed symbol index.
//!
//! tantivy narrows the candidates (name terms, prefix/substring regexes over the lowercased
//! name, a Levenshtein automaton for typos, signature substrings); the tier scores in
//! [`super::scoring`] then rank them.

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::{Context, Result, anyhow};
use tantivy::collector::DocSetCollector;
use tantivy::query::{AllQuery, BooleanQuery, FuzzyTermQuery, Occur, Query, RegexQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, TantivyDocument, Value};
use tantivy::tokenizer::TextAnalyzer;
use tantivy::{DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, Term};
use tracing::{debug, warn};

use super::schema::{SchemaFields, create_schema};
use super::scoring::{by_score_desc, kind_rank, score_fuzzy, score_name, score_signature};
use super::tokenizer::{CODE_TOKENIZER, CodeTokenizer, identifier_parts};
use super::{SearchHit, StructuralSearch};
use crate::extractors::base::{Symbol, TypeInfo};

const WRITER_HEAP_SIZE: usize = 50_000_000;
/// Largest edit distance the Levenshtein automaton is asked for
const MAX_TYPO_DISTANCE: u8 = 2;

pub struct SymbolSearchIndex {
    reader: IndexReader,
    writer: IndexWriter,
    fields: SchemaFields,
    /// Set when a write could not be committed; cleared by the next successful commit
    write_failure: Option<String>,
}

impl SymbolSearchIndex {
    /// Fresh index held in RAM
    pub fn in_memory() -> Result<Self> {
        let schema = create_schema();
        let fields = SchemaFields::new(&schema)?;
        let index = Index::create_in_ram(schema);
        index.tokenizers().register(
            CODE_TOKENIZER,
            TextAnalyzer::builder(CodeTokenizer).build(),
        );

        let writer = index
            .writer_with_num_threads(1, WRITER_HEAP_SIZE)
            .context("Failed to create search index writer")?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create search index reader")?;

        Ok(Self {
            reader,
            writer,
            fields,
            write_failure: None,
        })
    }

    /// Indexed file paths, sorted
    pub fn files(&self) -> Result<Vec<String>> {
        let searcher = self.reader.searcher();
        let docs = searcher.search(&AllQuery, &DocSetCollector)?;
        let mut files = BTreeSet::new();
        for address in docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            files.insert(text_field(&doc, self.fields.file_path));
        }
        Ok(files.into_iter().collect())
    }

    fn document(&self, symbol: &Symbol, types: &HashMap<String, TypeInfo>) -> Result<TantivyDocument> {
        let f = &self.fields;
        let mut doc = TantivyDocument::new();
        doc.add_text(f.id, &symbol.id);
        doc.add_text(f.file_path, &symbol.file_path);
        doc.add_text(f.name, &symbol.name);
        doc.add_text(f.name_key, symbol.name.to_lowercase());
        if let Some(signature) = &symbol.signature {
            doc.add_text(f.signature_key, signature.to_lowercase());
        }
        if let Some(info) = types.get(&symbol.id) {
            let declared = info.resolved_type.trim().to_lowercase();
            doc.add_text(f.type_key, &declared);
            doc.add_text(f.type_tokens, &declared);
        }
        doc.add_text(f.payload, serde_json::to_string(symbol)?);
        Ok(doc)
    }

    fn add_symbols(&mut self, symbols: &[Symbol], types: &HashMap<String, TypeInfo>) -> Result<()> {
        for symbol in symbols {
            let doc = self.document(symbol, types)?;
            self.writer.add_document(doc)?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let committed = self
            .writer
            .commit()
            .map_err(anyhow::Error::from)
            .and_then(|_| self.reader.reload().map_err(anyhow::Error::from));
        match committed {
            Ok(()) => {
                self.write_failure = None;
                Ok(())
            }
            Err(e) => {
                warn!("⚠️ Search index commit failed: {:#}", e);
                self.write_failure = Some(format!("{:#}", e));
                Err(e)
            }
        }
    }

    fn collect(&self, searcher: &Searcher, query: &dyn Query) -> Result<HashSet<DocAddress>> {
        Ok(searcher.search(query, &DocSetCollector)?)
    }

    fn load_symbol(&self, searcher: &Searcher, address: DocAddress) -> Result<Option<Symbol>> {
        let doc: TantivyDocument = searcher.doc(address)?;
        let payload = text_field(&doc, self.fields.payload);
        match serde_json::from_str(&payload) {
            Ok(symbol) => Ok(Some(symbol)),
            Err(e) => {
                debug!("Skipping undecodable search document: {}", e);
                Ok(None)
            }
        }
    }

    /// Matches on the lowercased whole name plus name tokens starting with a query part
    fn candidate_query(&self, compact: &str, parts: &[String]) -> Result<BooleanQuery> {
        let f = &self.fields;
        let escaped = regex::escape(compact);
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(
            Occur::Should,
            Box::new(RegexQuery::from_pattern(&format!(".*{}.*", escaped), f.name_key)?),
        )];
        for part in parts {
            let pattern = format!("{}.*", regex::escape(part));
            clauses.push((Occur::Should, Box::new(RegexQuery::from_pattern(&pattern, f.name)?)));
        }
        clauses.push((
            Occur::Should,
            Box::new(RegexQuery::from_pattern(&format!(".*{}.*", escaped), f.signature_key)?),
        ));
        Ok(BooleanQuery::new(clauses))
    }

    /// Docs whose lowercased name is within `distance` edits of `compact`
    fn typo_matches(&self, searcher: &Searcher, compact: &str, distance: u8) -> Result<HashSet<DocAddress>> {
        let term = Term::from_field_text(self.fields.name_key, compact);
        self.collect(searcher, &FuzzyTermQuery::new(term, distance, true))
    }

    fn finish(&self, mut hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
        hits.sort_by(|a, b| {
            by_score_desc(a.score, b.score)
                .then_with(|| kind_rank(a.symbol.kind).cmp(&kind_rank(b.symbol.kind)))
                .then_with(|| a.symbol.name.len().cmp(&b.symbol.name.len()))
                .then_with(|| a.symbol.file_path.cmp(&b.symbol.file_path))
                .then_with(|| a.symbol.start_line.cmp(&b.symbol.start_line))
        });
        hits.truncate(limit);
        hits
    }
}

impl StructuralSearch for SymbolSearchIndex {
    fn rebuild_index(&mut self, symbols: Vec<Symbol>, types: &HashMap<String, TypeInfo>) -> Result<()> {
        self.writer.delete_all_documents()?;
        self.add_symbols(&symbols, types)?;
        self.commit()?;
        debug!("Structural index rebuilt with {} symbols", symbols.len());
        Ok(())
    }

    fn update_index(&mut self, file_path: &str, symbols: Vec<Symbol>, types: &HashMap<String, TypeInfo>) -> Result<()> {
        self.writer
            .delete_term(Term::from_field_text(self.fields.file_path, file_path));
        self.add_symbols(&symbols, types)?;
        self.commit()
    }

    fn remove_from_index(&mut self, file_path: &str) -> Result<()> {
        self.writer
            .delete_term(Term::from_field_text(self.fields.file_path, file_path));
        self.commit()
    }

    fn remove_workspace(&mut self, root: &str) -> Result<()> {
        let root = root.trim_end_matches('/');
        let pattern = format!("{}(/.*)?", regex::escape(root));
        let query = RegexQuery::from_pattern(&pattern, self.fields.file_path)?;
        self.writer.delete_query(Box::new(query))?;
        self.commit()
    }

    fn search_fuzzy(&self, query: &str, limit: usize, threshold: f32) -> Result<Vec<SearchHit>> {
        let compact: String = query
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if compact.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let parts: Vec<String> = query.split_whitespace().flat_map(identifier_parts).collect();

        let searcher = self.reader.searcher();
        let candidates = self.collect(&searcher, &self.candidate_query(&compact, &parts)?)?;
        let near = self.typo_matches(&searcher, &compact, 1)?;
        let far = self.typo_matches(&searcher, &compact, MAX_TYPO_DISTANCE)?;

        let mut hits = Vec::new();
        for address in candidates.iter().chain(far.difference(&candidates)) {
            let Some(symbol) = self.load_symbol(&searcher, *address)? else {
                continue;
            };
            let mut score = score_name(query, &symbol.name);
            if score == 0.0 && far.contains(address) {
                let distance = if near.contains(address) { 1 } else { MAX_TYPO_DISTANCE };
                score = score_fuzzy(query, &symbol.name, distance);
            }
            if score == 0.0 {
                score = score_signature(query, symbol.signature.as_deref());
            }
            if score > 0.0 && score >= threshold {
                hits.push(SearchHit { symbol, score });
            }
        }

        Ok(self.finish(hits, limit))
    }

    fn search_exact(&self, name: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let wanted = name.trim();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let term = Term::from_field_text(self.fields.name_key, &wanted.to_lowercase());
        let matches = self.collect(&searcher, &TermQuery::new(term, IndexRecordOption::Basic))?;

        let mut hits = Vec::new();
        for address in matches {
            if let Some(symbol) = self.load_symbol(&searcher, address)? {
                let score = if symbol.name == wanted { 1.0 } else { 0.9 };
                hits.push(SearchHit { symbol, score });
            }
        }
        Ok(self.finish(hits, limit))
    }

    fn search_by_type(&self, type_name: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let wanted = type_name.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let declared = Term::from_field_text(self.fields.type_key, &wanted);
        let exact = self.collect(&searcher, &TermQuery::new(declared, IndexRecordOption::Basic))?;
        let token = Term::from_field_text(self.fields.type_tokens, &wanted);
        let mentions = self.collect(&searcher, &TermQuery::new(token, IndexRecordOption::Basic))?;

        let mut hits = Vec::new();
        for address in exact.union(&mentions) {
            if let Some(symbol) = self.load_symbol(&searcher, *address)? {
                let score = if exact.contains(address) { 1.0 } else { 0.8 };
                hits.push(SearchHit { symbol, score });
            }
        }
        Ok(self.finish(hits, limit))
    }

    fn len(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }

    fn health(&self) -> Result<()> {
        if let Some(failure) = &self.write_failure {
            return Err(anyhow!("last commit failed: {}", failure));
        }
        let searcher = self.reader.searcher();
        for segment in searcher.segment_readers() {
            segment
                .inverted_index(self.fields.name_key)
                .context("name index unreadable")?;
        }
        Ok(())
    }
}

fn text_field(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .unwrap_or_default()
}
