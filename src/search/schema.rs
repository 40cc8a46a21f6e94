//! Tantivy schema for the structural symbol index.
//!
//! Raw `STRING` fields hold lowercased whole values for exact, prefix, substring and typo
//! lookups; `code`-tokenized fields hold identifier parts. The full symbol rides along as a
//! stored JSON payload so hits never go back to the store.

use anyhow::{Result, anyhow};
use tantivy::schema::{Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions};

use super::tokenizer::CODE_TOKENIZER;

pub mod fields {
    pub const ID: &str = "id";
    pub const FILE_PATH: &str = "file_path";
    pub const NAME: &str = "name";
    pub const NAME_KEY: &str = "name_key";
    pub const SIGNATURE_KEY: &str = "signature_key";
    pub const TYPE_KEY: &str = "type_key";
    pub const TYPE_TOKENS: &str = "type_tokens";
    pub const PAYLOAD: &str = "payload";
}

pub fn create_schema() -> Schema {
    let mut builder = Schema::builder();

    let code_text = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(CODE_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );

    builder.add_text_field(fields::ID, STRING | STORED);
    builder.add_text_field(fields::FILE_PATH, STRING | STORED);
    builder.add_text_field(fields::NAME, code_text.clone());
    builder.add_text_field(fields::NAME_KEY, STRING);
    builder.add_text_field(fields::SIGNATURE_KEY, STRING);
    builder.add_text_field(fields::TYPE_KEY, STRING);
    builder.add_text_field(fields::TYPE_TOKENS, code_text);
    builder.add_text_field(fields::PAYLOAD, STORED);

    builder.build()
}

/// Resolved field handles
#[derive(Clone, Copy)]
pub struct SchemaFields {
    pub id: Field,
    pub file_path: Field,
    pub name: Field,
    pub name_key: Field,
    pub signature_key: Field,
    pub type_key: Field,
    pub type_tokens: Field,
    pub payload: Field,
}

impl SchemaFields {
    pub fn new(schema: &Schema) -> Result<Self> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| anyhow!("search schema has no `{}` field", name))
        };
        Ok(Self {
            id: field(fields::ID)?,
            file_path: field(fields::FILE_PATH)?,
            name: field(fields::NAME)?,
            name_key: field(fields::NAME_KEY)?,
            signature_key: field(fields::SIGNATURE_KEY)?,
            type_key: field(fields::TYPE_KEY)?,
            type_tokens: field(fields::TYPE_TOKENS)?,
            payload: field(fields::PAYLOAD)?,
        })
    }
}
