//! Book metadata extraction
//!
//! Metadata values in the wild are often escaped XHTML (descriptions copied
//! from a publisher page, titles wrapped in `<i>`), so every value goes
//! through [normalize] before it reaches the renderer.

use std::{
    io::{Read, Seek},
    sync::LazyLock,
};

use log::debug;
use regex::Regex;

use crate::{
    diagnostics::Diagnostics,
    epub::EpubArchive,
    error::EpubError,
    markup::MarkupDocument,
    types::{BookMetadata, DEFAULT_LANGUAGE, UNKNOWN_AUTHOR, UNKNOWN_TITLE},
    utils::NormalizeWhitespace,
};

/// Upper bound on markup passes for values escaped several times over
const MAX_MARKUP_PASSES: usize = 16;

static SPACE_BEFORE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([.!?,:;])").expect("valid punctuation pattern"));

/// Turns a raw metadata value into plain single-spaced text
///
/// Values that do not look like markup (no `<` and `>`) are only trimmed.
/// Markup is parsed as a fragment; the text nodes outside `script`/`style`
/// are joined with a space, whitespace runs are collapsed and the space a
/// tag boundary leaves before punctuation is removed.
///
/// Entity-encoded markup (`&lt;b&gt;`) decodes into new tags, so the pass is
/// repeated until the text no longer changes. Normalizing an already
/// normalized value returns it unchanged.
pub fn normalize(raw: &str) -> String {
    if !looks_like_markup(raw) {
        return raw.trim().to_string();
    }

    let mut text = strip_markup(raw);
    for _ in 1..MAX_MARKUP_PASSES {
        if !looks_like_markup(&text) {
            break;
        }
        let next = strip_markup(&text);
        if next == text {
            break;
        }
        text = next;
    }
    text
}

fn looks_like_markup(value: &str) -> bool {
    value.contains('<') && value.contains('>')
}

fn strip_markup(raw: &str) -> String {
    let text = MarkupDocument::parse_fragment(raw)
        .text_with_separator(" ")
        .normalize_whitespace();

    SPACE_BEFORE_PUNCTUATION
        .replace_all(&text, "$1")
        .into_owned()
}

impl BookMetadata {
    /// Reads the book-level metadata of an opened archive
    ///
    /// The first value of each property is used. Title, author and language
    /// fall back to their placeholders when absent or empty after
    /// normalization, and every fallback is reported to `diagnostics`.
    pub fn from_archive<R: Read + Seek>(
        epub: &EpubArchive<R>,
        diagnostics: &dyn Diagnostics,
    ) -> Result<Self, EpubError> {
        let value = |key: &str| {
            epub.metadata_value(key)
                .map(normalize)
                .filter(|value| !value.is_empty())
        };
        let required = |key: &str, field: &str, placeholder: &str| -> Result<String, EpubError> {
            if let Some(value) = value(key) {
                return Ok(value);
            }
            diagnostics.recover(EpubError::MetadataExtractionError {
                field: field.to_string(),
                placeholder: placeholder.to_string(),
            })?;
            Ok(placeholder.to_string())
        };

        let metadata = BookMetadata {
            title: required("title", "title", UNKNOWN_TITLE)?,
            author: required("creator", "author", UNKNOWN_AUTHOR)?,
            language: required("language", "language", DEFAULT_LANGUAGE)?,
            identifier: value("identifier").unwrap_or_default(),
            publisher: value("publisher"),
            description: value("description"),
            rights: value("rights"),
        };

        debug!(
            "Metadata: title \"{}\", author \"{}\", language \"{}\"",
            metadata.title, metadata.author, metadata.language
        );
        Ok(metadata)
    }
}
