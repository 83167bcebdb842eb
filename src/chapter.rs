//! Chapter extraction
//!
//! Every XHTML/HTML document of the spine becomes one [Chapter] unless it has
//! no readable text. Chapters are numbered densely: a dropped document does
//! not consume an order index.

use std::{
    io::{Read, Seek},
    sync::LazyLock,
};

use log::{debug, info};
use regex::Regex;

use crate::{
    diagnostics::Diagnostics,
    epub::EpubArchive,
    error::EpubError,
    markup::MarkupDocument,
    types::{Chapter, ContentDocument},
    utils::{DecodeBytes, NormalizeWhitespace, archive_basename, title_case},
};

/// Elements tried for the chapter title, in priority order
const TITLE_TAGS: [&str; 4] = ["h1", "h2", "h3", "title"];

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r\f\u{a0}]*\n").expect("valid paragraph pattern"));

/// Extracts the chapters of a publication in spine order
///
/// Documents that cannot be read or decoded are reported as
/// [DiagnosticEvent::ChapterSkipped](crate::diagnostics::DiagnosticEvent::ChapterSkipped)
/// and the pass continues with the next one.
pub fn extract_chapters<R: Read + Seek>(
    epub: &mut EpubArchive<R>,
    diagnostics: &dyn Diagnostics,
) -> Result<Vec<Chapter>, EpubError> {
    let mut chapters = Vec::new();

    for document in epub.content_documents() {
        let document = match document {
            Ok(document) => document,
            Err(err) => {
                diagnostics.recover(EpubError::ChapterParseError {
                    file: resource_of(&err),
                    reason: err.to_string(),
                })?;
                continue;
            }
        };

        match parse_chapter(&document, chapters.len()) {
            Ok(Some(chapter)) => {
                debug!(
                    "Chapter {}: \"{}\" from {} ({} words)",
                    chapter.order,
                    chapter.title,
                    chapter.source_file_name,
                    chapter.word_count()
                );
                chapters.push(chapter);
            }
            Ok(None) => debug!("Dropped \"{}\": no text content", document.path),
            Err(err) => diagnostics.recover(err)?,
        }
    }

    info!("Extracted {} chapters", chapters.len());
    Ok(chapters)
}

/// Builds the chapter of one content document
///
/// # Return
/// - `Ok(Some(Chapter))`: The document has text content
/// - `Ok(None)`: The document is empty after text extraction
/// - `Err(EpubError)`: The document bytes could not be decoded
pub fn parse_chapter(
    document: &ContentDocument,
    order: usize,
) -> Result<Option<Chapter>, EpubError> {
    let source = document
        .data
        .decode()
        .map_err(|err| EpubError::ChapterParseError {
            file: document.path.clone(),
            reason: err.to_string(),
        })?;
    let markup = MarkupDocument::parse(&source);

    let content = extract_content(&markup);
    if content.is_empty() {
        return Ok(None);
    }

    Ok(Some(Chapter {
        title: extract_title(&markup, &document.name),
        content,
        source_file_name: document.path.clone(),
        order,
        images: vec![],
    }))
}

/// Picks the chapter title from the markup, falling back to the file name
pub fn extract_title(markup: &MarkupDocument, file_name: &str) -> String {
    TITLE_TAGS
        .iter()
        .find_map(|&tag| {
            markup
                .find_first(&[tag])
                .map(|node| node.text().normalize_whitespace())
                .filter(|title| !title.is_empty())
        })
        .unwrap_or_else(|| title_from_file_name(file_name))
}

/// Derives a readable title from a document name
///
/// `Text/chapter_01.xhtml` becomes `Chapter 01`.
pub fn title_from_file_name(file_name: &str) -> String {
    let base = archive_basename(file_name);
    let stem = match base.rfind('.') {
        Some(index) if index > 0 => &base[..index],
        _ => base,
    };

    title_case(&stem.replace(['_', '-'], " ").normalize_whitespace())
}

/// Readable text of the document body, one paragraph per block
fn extract_content(markup: &MarkupDocument) -> String {
    PARAGRAPH_BREAK
        .split(&markup.paragraph_text())
        .map(|paragraph| paragraph.normalize_whitespace())
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn resource_of(err: &EpubError) -> String {
    match err {
        EpubError::ResourceNotFound { resource } => resource.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::{
        chapter::{extract_chapters, parse_chapter, title_from_file_name},
        diagnostics::{DiagnosticEvent, RecordingDiagnostics},
        epub::EpubArchive,
        test_utils::{EpubFixture, xhtml},
        types::ContentDocument,
    };

    fn document(name: &str, source: &str) -> ContentDocument {
        ContentDocument {
            spine_index: 0,
            name: name.to_string(),
            path: format!("OEBPS/{}", name),
            data: source.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_title_from_heading() {
        let source = xhtml(Some("Head"), "<h1>  The   Beginning </h1><p>Text</p>");
        let chapter = parse_chapter(&document("ch1.xhtml", &source), 0)
            .unwrap()
            .unwrap();
        assert_eq!(chapter.title, "The Beginning");
        assert_eq!(chapter.source_file_name, "OEBPS/ch1.xhtml");
        assert_eq!(chapter.order, 0);
    }

    #[test]
    fn test_title_priority_over_document_order() {
        let source = xhtml(Some("Head"), "<h2>Second level</h2><h1>First level</h1><p>x</p>");
        let chapter = parse_chapter(&document("ch1.xhtml", &source), 0)
            .unwrap()
            .unwrap();
        assert_eq!(chapter.title, "First level");

        let source = xhtml(Some("From head"), "<p>No headings here</p>");
        let chapter = parse_chapter(&document("ch1.xhtml", &source), 0)
            .unwrap()
            .unwrap();
        assert_eq!(chapter.title, "From head");
    }

    #[test]
    fn test_title_from_file_name() {
        assert_eq!(title_from_file_name("Text/chapter_01.xhtml"), "Chapter 01");
        assert_eq!(title_from_file_name("part-two-end.html"), "Part Two End");
        assert_eq!(title_from_file_name("notes"), "Notes");

        let source = xhtml(None, "<h1>   </h1><p>Only text</p>");
        let chapter = parse_chapter(&document("Text/chapter_01.xhtml", &source), 0)
            .unwrap()
            .unwrap();
        assert_eq!(chapter.title, "Chapter 01");
    }

    #[test]
    fn test_content_keeps_paragraphs() {
        let source = xhtml(
            Some("T"),
            r#"<h1>Heading</h1>
            <p>First   paragraph
               spans lines.</p>
            <script>ignored()</script>
            <style>p { }</style>
            <div><p>Nested one.</p><p>Nested two.</p></div>"#,
        );
        let chapter = parse_chapter(&document("ch1.xhtml", &source), 3)
            .unwrap()
            .unwrap();
        assert_eq!(
            chapter.content,
            "Heading\n\nFirst paragraph spans lines.\n\nNested one.\n\nNested two."
        );
        assert_eq!(chapter.order, 3);
        assert_eq!(chapter.word_count(), 9);
    }

    #[test]
    fn test_empty_document_is_dropped() {
        let source = xhtml(Some("Blank page"), "  <div>  </div>  ");
        assert!(
            parse_chapter(&document("blank.xhtml", &source), 0)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_order_is_dense() {
        let fixture = EpubFixture::new()
            .document("a", "a.xhtml", &xhtml(None, "<h1>A</h1><p>first</p>"))
            .document("b", "b.xhtml", &xhtml(Some("Empty"), "<p> </p>"))
            .document("c", "c.xhtml", &xhtml(None, "<h1>C</h1><p>third</p>"));
        let mut epub = EpubArchive::from_reader(Cursor::new(fixture.build())).unwrap();
        let diagnostics = RecordingDiagnostics::new();

        let chapters = extract_chapters(&mut epub, &diagnostics).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "A");
        assert_eq!(chapters[0].order, 0);
        assert_eq!(chapters[1].title, "C");
        assert_eq!(chapters[1].order, 1);
        assert_eq!(chapters[1].page_number(), 2);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_undecodable_document_is_reported() {
        let fixture = EpubFixture::new()
            .document("a", "a.xhtml", &xhtml(None, "<p>fine</p>"))
            .manifest_item(r#"<item id="b" href="b.xhtml" media-type="application/xhtml+xml"/>"#)
            .spine_item(r#"<itemref idref="b"/>"#)
            .file("b.xhtml", &[0xFE, 0xFF, 0xD8, 0x00])
            .manifest_item(r#"<item id="c" href="c.xhtml" media-type="application/xhtml+xml"/>"#)
            .spine_item(r#"<itemref idref="c"/>"#);
        let mut epub = EpubArchive::from_reader(Cursor::new(fixture.build())).unwrap();
        let diagnostics = RecordingDiagnostics::new();

        let chapters = extract_chapters(&mut epub, &diagnostics).unwrap();
        assert_eq!(chapters.len(), 1);

        let events = diagnostics.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            DiagnosticEvent::ChapterSkipped { file, .. } if file == "OEBPS/b.xhtml"
        ));
        assert!(matches!(
            &events[1],
            DiagnosticEvent::ChapterSkipped { file, .. } if file == "OEBPS/c.xhtml"
        ));
    }
}
