//! Code-aware tokenization shared by the structural index and the embedder.
//!
//! Produces the original word plus its camelCase and snake_case parts, lowercased, so that a
//! query like "user service" meets identifiers such as `UserService`. [`CodeTokenizer`] exposes
//! the same splitting to tantivy.

use std::collections::HashSet;

use tantivy::tokenizer::{Token, TokenStream, Tokenizer};

/// Name under which [`CodeTokenizer`] is registered on the search index
pub const CODE_TOKENIZER: &str = "code";

/// Tantivy tokenizer emitting each word and then its identifier parts, lowercased.
#[derive(Clone, Default)]
pub struct CodeTokenizer;

impl Tokenizer for CodeTokenizer {
    type TokenStream<'a> = CodeTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        CodeTokenStream {
            tokens: code_tokens(text),
            current: 0,
        }
    }
}

pub struct CodeTokenStream {
    tokens: Vec<Token>,
    current: usize,
}

impl TokenStream for CodeTokenStream {
    fn advance(&mut self) -> bool {
        if self.current < self.tokens.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.current - 1]
    }
}

fn code_tokens(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut position = 0;

    for (start, end) in collect_word_bounds(text) {
        let original = &text[start..end];
        let mut emitted = HashSet::new();
        let lowered = original.to_lowercase();
        emitted.insert(lowered.clone());
        tokens.push(Token {
            offset_from: start,
            offset_to: end,
            position,
            text: lowered,
            position_length: 1,
        });
        position += 1;

        for part in split_identifier(original) {
            let lower = part.to_lowercase();
            if emitted.insert(lower.clone()) {
                tokens.push(Token {
                    offset_from: start,
                    offset_to: end,
                    position,
                    text: lower,
                    position_length: 1,
                });
                position += 1;
            }
        }
    }

    tokens
}

/// Lowercased tokens of `text`: each word followed by its identifier parts, without duplicates
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut seen = HashSet::new();

    for (start, end) in collect_word_bounds(text) {
        let original = &text[start..end];
        if seen.insert(original.to_lowercase()) {
            tokens.push(original.to_lowercase());
        }
        for part in split_identifier(original) {
            let key = part.to_lowercase();
            if seen.insert(key.clone()) {
                tokens.push(key);
            }
        }
    }

    tokens
}

/// Only the identifier parts, in order (`getHTTPResponse` → get, http, response)
pub fn identifier_parts(identifier: &str) -> Vec<String> {
    split_identifier(identifier)
        .into_iter()
        .map(|p| p.to_lowercase())
        .collect()
}

fn collect_word_bounds(text: &str) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if is_word_char(ch) {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(s) = start.take() {
            bounds.push((s, idx));
        }
    }

    if let Some(s) = start {
        bounds.push((s, text.len()));
    }

    bounds
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

fn split_identifier(identifier: &str) -> Vec<String> {
    let mut parts = Vec::new();

    for segment in identifier.split(['_', '$']) {
        if segment.is_empty() {
            continue;
        }
        parts.extend(split_camel_case(segment));
    }

    if parts.is_empty() && !identifier.is_empty() {
        parts.push(identifier.to_string());
    }

    parts
}

fn split_camel_case(segment: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = segment.char_indices().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut bounds = vec![0];
    for i in 1..chars.len() {
        let (_, prev) = chars[i - 1];
        let (idx, curr) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        let is_boundary = (prev.is_lowercase() && curr.is_uppercase())
            || (prev.is_numeric() && curr.is_alphabetic())
            || (prev.is_alphabetic() && curr.is_numeric())
            || (prev.is_uppercase() && curr.is_uppercase() && next.is_some_and(|n| n.is_lowercase()));

        if is_boundary {
            bounds.push(idx);
        }
    }
    bounds.push(segment.len());

    bounds
        .windows(2)
        .filter(|w| w[0] < w[1])
        .map(|w| segment[w[0]..w[1]].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_camel_case_identifiers() {
        assert_eq!(tokenize("UserService"), vec!["userservice", "user", "service"]);
    }

    #[test]
    fn splits_snake_case_identifiers() {
        assert_eq!(tokenize("extract_symbols"), vec!["extract_symbols", "extract", "symbols"]);
    }

    #[test]
    fn splits_mixed_uppercase_runs() {
        assert_eq!(identifier_parts("getHTTPResponse2"), vec!["get", "http", "response", "2"]);
    }

    #[test]
    fn tantivy_stream_matches_plain_tokens() {
        let mut tokenizer = CodeTokenizer;
        let mut stream = tokenizer.token_stream("getUser(user_id)");
        let mut texts = Vec::new();
        while stream.advance() {
            texts.push(stream.token().text.clone());
        }
        assert_eq!(texts, vec!["getuser", "get", "user", "user_id", "user", "id"]);
    }

    #[test]
    fn respects_path_boundaries() {
        assert_eq!(
            tokenize("src/services/UserService.rs"),
            vec!["src", "services", "userservice", "user", "service", "rs"]
        );
    }
}
