//! Markdown rendering
//!
//! A book is rendered either as one document holding the metadata header, a
//! table of contents and every chapter, or as an index file plus one file per
//! chapter, linked to each other by a navigation line.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use log::info;
use regex::Regex;

use crate::{
    diagnostics::{DiagnosticEvent, Diagnostics},
    error::EpubError,
    types::{BookMetadata, Chapter, Image},
    utils::NormalizeWhitespace,
};

const RULE: &str = "\n\n---\n\n";
const MAX_FILE_NAME_LENGTH: usize = 200;

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid character pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));
static NON_ANCHOR_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid anchor pattern"));
static ANCHOR_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("valid separator pattern"));

/// Writes Markdown files into an output directory
pub struct MarkdownRenderer<'a> {
    output_dir: &'a Path,
}

impl<'a> MarkdownRenderer<'a> {
    pub fn new(output_dir: &'a Path) -> Self {
        Self { output_dir }
    }

    /// Renders the book and returns the paths of the files written
    ///
    /// In multi-file mode the index comes first, followed by the chapter
    /// files in chapter order.
    pub fn render(
        &self,
        metadata: &BookMetadata,
        chapters: &[Chapter],
        single_file: bool,
        diagnostics: &dyn Diagnostics,
    ) -> Result<Vec<PathBuf>, EpubError> {
        if !self.output_dir.exists() {
            fs::create_dir_all(self.output_dir).map_err(|source| EpubError::RenderError {
                path: self.output_dir.to_path_buf(),
                source,
            })?;
            info!("Created output directory: {}", self.output_dir.display());
        }

        if single_file {
            self.render_single_file(metadata, chapters)
                .map(|path| vec![path])
        } else {
            self.render_multiple_files(metadata, chapters, diagnostics)
        }
    }

    /// Writes `<title>.md` holding the whole book
    pub fn render_single_file(
        &self,
        metadata: &BookMetadata,
        chapters: &[Chapter],
    ) -> Result<PathBuf, EpubError> {
        let mut document = metadata_header(metadata);
        document.push_str(RULE);

        document.push_str("# Table of Contents\n\n");
        for (index, chapter) in chapters.iter().enumerate() {
            document.push_str(&format!(
                "{}. [{}](#{})\n",
                index + 1,
                chapter.title,
                create_anchor(&chapter.title)
            ));
        }
        document.push_str("\n---\n\n");

        for chapter in chapters {
            document.push_str(&format_chapter(chapter, None));
            document.push_str(RULE);
        }

        let path = self
            .output_dir
            .join(sanitize_filename(&format!("{}.md", metadata.title)));
        write_file(&path, &document)?;

        info!("Created single markdown file: {}", path.display());
        Ok(path)
    }

    /// Writes `<title>_index.md` and one `chapter_NN_<title>.md` per chapter
    ///
    /// Failing to write the index aborts the rendering. A chapter file that
    /// cannot be written is reported to `diagnostics` and left out of the
    /// returned list; the remaining chapters are still written.
    pub fn render_multiple_files(
        &self,
        metadata: &BookMetadata,
        chapters: &[Chapter],
        diagnostics: &dyn Diagnostics,
    ) -> Result<Vec<PathBuf>, EpubError> {
        let index_name = sanitize_filename(&format!("{}_index.md", metadata.title));
        let file_names = chapters
            .iter()
            .enumerate()
            .map(|(index, chapter)| chapter_file_name(index + 1, &chapter.title))
            .collect::<Vec<_>>();

        let mut index = metadata_header(metadata);
        index.push_str("\n\n# Table of Contents\n\n");
        for (number, (chapter, file_name)) in chapters.iter().zip(&file_names).enumerate() {
            index.push_str(&format!(
                "{}. [{}]({})\n",
                number + 1,
                chapter.title,
                file_name
            ));
        }
        index.push('\n');

        let index_path = self.output_dir.join(&index_name);
        write_file(&index_path, &index)?;
        info!("Created index file: {}", index_path.display());

        let mut created_files = vec![index_path];
        for (position, chapter) in chapters.iter().enumerate() {
            let previous = position
                .checked_sub(1)
                .map(|previous| (chapters[previous].title.as_str(), file_names[previous].as_str()));
            let next = chapters
                .get(position + 1)
                .map(|next| (next.title.as_str(), file_names[position + 1].as_str()));
            let navigation = navigation_line(previous, &index_name, next);

            let path = self.output_dir.join(&file_names[position]);
            match write_file(&path, &format_chapter(chapter, Some(&navigation))) {
                Ok(()) => {
                    info!("Created chapter file: {}", path.display());
                    created_files.push(path);
                }
                Err(EpubError::RenderError { path, source }) => {
                    diagnostics.report(DiagnosticEvent::RenderFailed {
                        path,
                        reason: source.to_string(),
                    })
                }
                Err(err) => return Err(err),
            }
        }

        Ok(created_files)
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), EpubError> {
    fs::write(path, content).map_err(|source| EpubError::RenderError {
        path: path.to_path_buf(),
        source,
    })
}

/// File name of the chapter at 1-based `number` in multi-file mode
pub fn chapter_file_name(number: usize, title: &str) -> String {
    sanitize_filename(&format!("chapter_{:02}_{}.md", number, title))
}

/// Title, author and the optional publication details, each as a paragraph
pub fn metadata_header(metadata: &BookMetadata) -> String {
    let mut header = format!("# {}\n\n", metadata.title);
    header.push_str(&format!("**Author:** {}\n\n", metadata.author));

    if let Some(publisher) = &metadata.publisher {
        header.push_str(&format!("**Publisher:** {}\n\n", publisher));
    }
    if let Some(description) = &metadata.description {
        header.push_str(&format!("**Description:** {}\n\n", description));
    }

    header.push_str(&format!("**Language:** {}\n\n", metadata.language));

    if !metadata.identifier.is_empty() {
        header.push_str(&format!("**Identifier:** {}\n\n", metadata.identifier));
    }
    if let Some(rights) = &metadata.rights {
        header.push_str(&format!("**Rights:** {}\n\n", rights));
    }

    header
}

/// Navigation between chapter files
///
/// `previous` and `next` are `(title, file name)` pairs; a missing neighbour
/// is shown as a plain-text placeholder.
pub fn navigation_line(
    previous: Option<(&str, &str)>,
    index_file: &str,
    next: Option<(&str, &str)>,
) -> String {
    let previous = match previous {
        Some((title, file)) => format!("[← Previous: {}]({})", title, file),
        None => "← Previous".to_string(),
    };
    let next = match next {
        Some((title, file)) => format!("[Next: {} →]({})", title, file),
        None => "Next →".to_string(),
    };

    format!("{} | [📚 Index]({}) | {}", previous, index_file, next)
}

/// Formats one chapter, with the navigation line above and below when given
pub fn format_chapter(chapter: &Chapter, navigation: Option<&str>) -> String {
    let mut content = format!("# {}\n\n", chapter.title);

    if let Some(navigation) = navigation {
        content.push_str(navigation);
        content.push_str(RULE);
    }

    content.push_str(&format_text_content(&chapter.content));

    if !chapter.images.is_empty() {
        content.push_str(&format_chapter_images(&chapter.images));
    }

    if let Some(navigation) = navigation {
        content.push_str(RULE);
        content.push_str(navigation);
        content.push('\n');
    }

    content
}

/// Reflows chapter text: one line per paragraph, blank line in between
pub fn format_text_content(text: &str) -> String {
    text.split("\n\n")
        .map(|paragraph| paragraph.normalize_whitespace())
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The `## Images` section of a chapter
pub fn format_chapter_images(images: &[Image]) -> String {
    if images.is_empty() {
        return String::new();
    }

    let mut content = String::from("\n\n## Images\n\n");
    for image in images {
        let alt_text = image
            .alt_text
            .clone()
            .or_else(|| image.caption.clone())
            .unwrap_or_else(|| format!("Image {}", image.page_number));
        content.push_str(&format!(
            "![{}](images/{})\n\n",
            alt_text, image.output_file_name
        ));

        if let Some(caption) = &image.caption {
            content.push_str(&format!("**Caption:** {}\n\n", caption));
        }

        content.push_str(&format!("**Page:** {}", image.page_number));
        if !image.chapter_title.is_empty() {
            content.push_str(&format!(" | **Chapter:** {}", image.chapter_title));
        }
        content.push_str(&format!(" | **Size:** {}x{}", image.width, image.height));
        content.push_str(&format!(
            " | **File Size:** {}\n\n",
            format_file_size(image.byte_size)
        ));

        content.push_str("---\n\n");
    }

    content
}

/// Makes a string usable as a file name on common filesystems
///
/// Reserved characters and whitespace runs become `_`, leading and trailing
/// `.`/`_` are removed, and names longer than 200 characters are cut while
/// keeping their extension.
pub fn sanitize_filename(file_name: &str) -> String {
    let name = INVALID_CHARS.replace_all(file_name, "_");
    let name = WHITESPACE.replace_all(&name, "_");
    let name = name.trim_matches(['.', '_']);

    if name.chars().count() <= MAX_FILE_NAME_LENGTH {
        return name.to_string();
    }

    let (stem, extension) = match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    };
    let keep = MAX_FILE_NAME_LENGTH.saturating_sub(extension.chars().count());
    let mut truncated = stem.chars().take(keep).collect::<String>();
    truncated.push_str(extension);
    truncated
}

/// GitHub-style heading anchor: `Chapter One: A New Hope!` → `chapter-one-a-new-hope`
pub fn create_anchor(text: &str) -> String {
    let anchor = text.to_lowercase();
    let anchor = NON_ANCHOR_CHARS.replace_all(&anchor, "");
    let anchor = ANCHOR_SEPARATORS.replace_all(&anchor, "-");
    anchor.trim_matches('-').to_string()
}

/// Human-readable byte count with one decimal for KB and MB
pub fn format_file_size(size: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    if size < KIB {
        format!("{} B", size)
    } else if size < MIB {
        format!("{:.1} KB", size as f64 / KIB as f64)
    } else {
        format!("{:.1} MB", size as f64 / MIB as f64)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use crate::{
        diagnostics::{DiagnosticEvent, RecordingDiagnostics},
        markdown::{
            MarkdownRenderer, chapter_file_name, create_anchor, format_chapter,
            format_chapter_images, format_file_size, format_text_content, metadata_header,
            navigation_line, sanitize_filename,
        },
        types::{BookMetadata, Chapter, Image},
    };

    fn chapter(title: &str, content: &str, order: usize) -> Chapter {
        Chapter {
            title: title.to_string(),
            content: content.to_string(),
            source_file_name: format!("OEBPS/ch{}.xhtml", order + 1),
            order,
            images: vec![],
        }
    }

    fn image(file: &str, caption: Option<&str>, alt_text: Option<&str>) -> Image {
        Image {
            output_file_name: file.to_string(),
            source_path: "OEBPS/Images/a.png".to_string(),
            output_path: PathBuf::from("out/images").join(file),
            caption: caption.map(str::to_string),
            alt_text: alt_text.map(str::to_string),
            page_number: 2,
            chapter_title: "Two".to_string(),
            width: 640,
            height: 480,
            byte_size: 2048,
        }
    }

    fn metadata() -> BookMetadata {
        BookMetadata {
            title: "My Book".to_string(),
            author: "Jane Doe".to_string(),
            ..BookMetadata::default()
        }
    }

    #[test]
    fn test_create_anchor() {
        assert_eq!(create_anchor("Chapter One: A New Hope!"), "chapter-one-a-new-hope");
        assert_eq!(create_anchor("  --Part  2 -- End--  "), "part-2-end");
        assert_eq!(create_anchor("snake_case stays"), "snake_case-stays");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Book: Part 1?.md"), "My_Book__Part_1_.md");
        assert_eq!(sanitize_filename("  .hidden title.md"), "hidden_title.md");
        assert_eq!(chapter_file_name(3, "A / B"), "chapter_03_A___B.md");

        let long = format!("{}.md", "x".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.chars().count(), 200);
        assert!(sanitized.ends_with("x.md"));
    }

    #[test]
    fn test_metadata_header() {
        let mut metadata = metadata();
        assert_eq!(
            metadata_header(&metadata),
            "# My Book\n\n**Author:** Jane Doe\n\n**Language:** en\n\n"
        );

        metadata.publisher = Some("Press".to_string());
        metadata.identifier = "urn:isbn:1".to_string();
        metadata.rights = Some("CC0".to_string());
        assert_eq!(
            metadata_header(&metadata),
            "# My Book\n\n**Author:** Jane Doe\n\n**Publisher:** Press\n\n**Language:** en\n\n\
             **Identifier:** urn:isbn:1\n\n**Rights:** CC0\n\n"
        );
    }

    #[test]
    fn test_format_text_content() {
        assert_eq!(
            format_text_content("  First   line\n  wraps  \n\n\n\nSecond\t\tone  "),
            "First line wraps\n\nSecond one"
        );
    }

    #[test]
    fn test_format_chapter_images() {
        let images = vec![
            image("map.jpg", Some("The map"), None),
            image("page_002.jpg", None, None),
        ];
        let section = format_chapter_images(&images);
        assert!(section.starts_with("\n\n## Images\n\n"));
        assert!(section.contains("![The map](images/map.jpg)\n\n**Caption:** The map\n\n"));
        assert!(section.contains("![Image 2](images/page_002.jpg)\n\n**Page:** 2"));
        assert!(section.contains(
            "**Page:** 2 | **Chapter:** Two | **Size:** 640x480 | **File Size:** 2.0 KB\n\n---\n\n"
        ));
        assert_eq!(format_chapter_images(&[]), "");
    }

    #[test]
    fn test_navigation_line() {
        assert_eq!(
            navigation_line(None, "Book_index.md", Some(("Two", "chapter_02_Two.md"))),
            "← Previous | [📚 Index](Book_index.md) | [Next: Two →](chapter_02_Two.md)"
        );
        assert_eq!(
            navigation_line(Some(("One", "chapter_01_One.md")), "Book_index.md", None),
            "[← Previous: One](chapter_01_One.md) | [📚 Index](Book_index.md) | Next →"
        );
    }

    #[test]
    fn test_format_chapter() {
        let chapter = chapter("One", "Hello  world.\n\nBye.", 0);
        assert_eq!(format_chapter(&chapter, None), "# One\n\nHello world.\n\nBye.");
        assert_eq!(
            format_chapter(&chapter, Some("NAV")),
            "# One\n\nNAV\n\n---\n\nHello world.\n\nBye.\n\n---\n\nNAV\n"
        );
    }

    #[test]
    fn test_render_single_file() {
        let output = tempfile::tempdir().unwrap();
        let diagnostics = RecordingDiagnostics::new();
        let chapters = vec![
            chapter("Chapter One: A New Hope!", "First.", 0),
            chapter("Two", "Second.", 1),
        ];

        let files = MarkdownRenderer::new(output.path())
            .render(&metadata(), &chapters, true, &diagnostics)
            .unwrap();
        assert_eq!(files, vec![output.path().join("My_Book.md")]);

        let document = fs::read_to_string(&files[0]).unwrap();
        assert!(document.starts_with("# My Book\n\n**Author:** Jane Doe\n\n"));
        assert!(document.contains(
            "# Table of Contents\n\n1. [Chapter One: A New Hope!](#chapter-one-a-new-hope)\n2. [Two](#two)\n\n---\n\n"
        ));
        assert!(document.contains("# Two\n\nSecond.\n\n---\n\n"));
        assert!(document.ends_with("Second.\n\n---\n\n"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_render_multiple_files() {
        let output = tempfile::tempdir().unwrap();
        let diagnostics = RecordingDiagnostics::new();
        let chapters = vec![
            chapter("One", "First.", 0),
            chapter("Two", "Second.", 1),
            chapter("Three", "Third.", 2),
        ];

        let files = MarkdownRenderer::new(output.path())
            .render(&metadata(), &chapters, false, &diagnostics)
            .unwrap();
        let names = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "My_Book_index.md",
                "chapter_01_One.md",
                "chapter_02_Two.md",
                "chapter_03_Three.md"
            ]
        );

        let index = fs::read_to_string(&files[0]).unwrap();
        assert!(index.contains("# Table of Contents\n\n1. [One](chapter_01_One.md)\n"));
        assert!(index.contains("3. [Three](chapter_03_Three.md)\n"));

        let middle = fs::read_to_string(&files[2]).unwrap();
        let navigation = "[← Previous: One](chapter_01_One.md) | [📚 Index](My_Book_index.md) | \
                          [Next: Three →](chapter_03_Three.md)";
        assert!(middle.starts_with(&format!("# Two\n\n{}\n\n---\n\nSecond.", navigation)));
        assert!(middle.ends_with(&format!("\n\n---\n\n{}\n", navigation)));

        let first = fs::read_to_string(&files[1]).unwrap();
        assert!(first.contains("← Previous | [📚 Index](My_Book_index.md)"));
        let last = fs::read_to_string(&files[3]).unwrap();
        assert!(last.contains("| Next →"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_chapter_write_failure_is_reported() {
        let output = tempfile::tempdir().unwrap();
        let diagnostics = RecordingDiagnostics::new();
        let chapters = vec![chapter("One", "First.", 0), chapter("Two", "Second.", 1)];
        fs::create_dir(output.path().join("chapter_01_One.md")).unwrap();

        let files = MarkdownRenderer::new(output.path())
            .render(&metadata(), &chapters, false, &diagnostics)
            .unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[1].ends_with("chapter_02_Two.md"));

        let events = diagnostics.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DiagnosticEvent::RenderFailed { path, .. } if path.ends_with("chapter_01_One.md")
        ));
    }

    #[test]
    fn test_index_write_failure_is_fatal() {
        let output = tempfile::tempdir().unwrap();
        let diagnostics = RecordingDiagnostics::new();
        fs::create_dir(output.path().join("My_Book_index.md")).unwrap();

        let result = MarkdownRenderer::new(output.path()).render(
            &metadata(),
            &[chapter("One", "First.", 0)],
            false,
            &diagnostics,
        );
        assert_eq!(
            result.unwrap_err(),
            crate::error::EpubError::RenderError {
                path: output.path().join("My_Book_index.md"),
                source: std::io::Error::other("directory"),
            }
        );
    }
}
