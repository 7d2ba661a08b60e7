//! Schema-tolerant parsers: `(category, raw bytes) -> records + warnings`.
//!
//! Parsers are pure. Every category accepts both legacy and current export
//! shapes, resolving each field through an ordered alias table (see
//! [`fields::FieldSpec`]). Only invalid JSON or an unusable top-level shape is
//! an error; everything else degrades to warnings and `Field::Unknown`.

pub mod content;
pub mod engagement;
pub mod fields;
pub mod messages;
pub mod profile;
pub mod timestamp;

use crate::error::IngestError;
use crate::model::{Category, ParseOutput};
use serde_json::Value;

/// Cache namespace for parse results.
pub const PARSE_OPERATION: &str = "parse";

/// Bump whenever normalization rules change so cached results from older
/// rules are never served.
pub const PARSER_VERSION: u32 = 1;

/// Seam between the engine and the parsing implementation.
pub trait RecordParser: Send + Sync {
    fn operation(&self) -> &str {
        PARSE_OPERATION
    }

    fn version(&self) -> u32 {
        PARSER_VERSION
    }

    fn parse(&self, category: Category, raw: &[u8]) -> Result<ParseOutput, IngestError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaTolerantParser;

impl RecordParser for SchemaTolerantParser {
    fn parse(&self, category: Category, raw: &[u8]) -> Result<ParseOutput, IngestError> {
        parse(category, raw)
    }
}

pub fn parse(category: Category, raw: &[u8]) -> Result<ParseOutput, IngestError> {
    let root: Value = serde_json::from_slice(raw)
        .map_err(|e| IngestError::malformed(format!("invalid JSON: {}", e)))?;

    let mut out = ParseOutput::default();
    match category {
        Category::Post => content::parse_posts(&root, &mut out)?,
        Category::Story => content::parse_stories(&root, &mut out)?,
        Category::Reel => content::parse_reels(&root, &mut out)?,
        Category::Message => messages::parse_messages(&root, &mut out)?,
        Category::Profile => profile::parse_profile(&root, &mut out)?,
        Category::LikedPost => engagement::parse_likes(&root, &mut out)?,
        Category::Comment => engagement::parse_comments(&root, &mut out)?,
        Category::Unknown => {
            return Err(IngestError::malformed("no parser for unclassified files"))
        }
    }
    Ok(out)
}
