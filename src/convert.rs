//! Conversion entry points
//!
//! [parse] reads a publication into its metadata and chapters, [render]
//! writes them as Markdown and [convert] runs both. Every call owns its own
//! state, so conversions of different books never share anything but the
//! options they are given.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{info, warn};

use crate::{
    chapter::extract_chapters,
    diagnostics::Diagnostics,
    epub::EpubArchive,
    error::EpubError,
    image::{DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH, ImageExtractor, JpegOptimizer, attach_images},
    markdown::MarkdownRenderer,
    types::{BookMetadata, Chapter},
};

/// Options of a conversion run
///
/// Defaults: output into `output`, a single Markdown file, images extracted
/// (only effective with multiple files), images bounded by 1920×1080 and no
/// external JPEG optimizer.
#[derive(Clone)]
pub struct ConvertOptions {
    output_dir: PathBuf,
    single_file: bool,
    extract_images: bool,
    max_width: u32,
    max_height: u32,
    optimizer: Option<Arc<dyn JpegOptimizer>>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            single_file: true,
            extract_images: true,
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            optimizer: None,
        }
    }
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_dir<P: AsRef<Path>>(&mut self, output_dir: P) -> &mut Self {
        self.output_dir = output_dir.as_ref().to_path_buf();
        self
    }

    /// Selects one Markdown file (`true`) or an index plus one file per chapter
    pub fn single_file(&mut self, single_file: bool) -> &mut Self {
        self.single_file = single_file;
        self
    }

    /// Images are only extracted when rendering multiple files
    pub fn extract_images(&mut self, extract_images: bool) -> &mut Self {
        self.extract_images = extract_images;
        self
    }

    /// Bounding box for extracted images; zero bounds are raised to 1
    pub fn max_image_size(&mut self, max_width: u32, max_height: u32) -> &mut Self {
        self.max_width = max_width.max(1);
        self.max_height = max_height.max(1);
        self
    }

    pub fn optimizer(&mut self, optimizer: Option<Arc<dyn JpegOptimizer>>) -> &mut Self {
        self.optimizer = optimizer;
        self
    }

    pub fn get_output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whether this run extracts images, given the output mode
    pub fn images_enabled(&self) -> bool {
        self.extract_images && !self.single_file
    }
}

/// Result of a successful [convert] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Markdown was written
    Converted {
        files: Vec<PathBuf>,
        chapters: usize,
        images: usize,
    },

    /// The publication has no chapter with readable text; nothing was written
    NoContent,
}

/// Reads the metadata and chapters of the EPUB file at `path`
///
/// When images are enabled they are written to `<output_dir>/images` and
/// attached to their chapters.
pub fn parse<P: AsRef<Path>>(
    path: P,
    options: &ConvertOptions,
    diagnostics: &dyn Diagnostics,
) -> Result<(BookMetadata, Vec<Chapter>), EpubError> {
    let path = path.as_ref();
    info!("Parsing EPUB file: {}", path.display());

    let mut epub = EpubArchive::open(path)?;
    let metadata = BookMetadata::from_archive(&epub, diagnostics)?;
    let mut chapters = extract_chapters(&mut epub, diagnostics)?;

    if options.images_enabled() && !chapters.is_empty() {
        let mut extractor = ImageExtractor::new(&options.output_dir);
        extractor
            .max_size(options.max_width, options.max_height)
            .optimizer(options.optimizer.as_deref());

        let images = extractor.extract(&mut epub, &chapters, diagnostics)?;
        attach_images(&mut chapters, images);
    }

    Ok((metadata, chapters))
}

/// Writes the Markdown output and returns the created files
pub fn render(
    metadata: &BookMetadata,
    chapters: &[Chapter],
    options: &ConvertOptions,
    diagnostics: &dyn Diagnostics,
) -> Result<Vec<PathBuf>, EpubError> {
    MarkdownRenderer::new(&options.output_dir).render(
        metadata,
        chapters,
        options.single_file,
        diagnostics,
    )
}

/// Parses the EPUB file at `path` and renders it
///
/// A publication without chapters yields [ConversionOutcome::NoContent] and
/// writes no Markdown.
pub fn convert<P: AsRef<Path>>(
    path: P,
    options: &ConvertOptions,
    diagnostics: &dyn Diagnostics,
) -> Result<ConversionOutcome, EpubError> {
    let (metadata, chapters) = parse(&path, options, diagnostics)?;

    if chapters.is_empty() {
        warn!("No chapters found in {}", path.as_ref().display());
        return Ok(ConversionOutcome::NoContent);
    }

    let files = render(&metadata, &chapters, options, diagnostics)?;
    let images = chapters.iter().map(|chapter| chapter.images.len()).sum();

    info!(
        "Converted \"{}\": {} chapters, {} images, {} files",
        metadata.title,
        chapters.len(),
        images,
        files.len()
    );

    Ok(ConversionOutcome::Converted {
        files,
        chapters: chapters.len(),
        images,
    })
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use crate::{
        convert::{ConversionOutcome, ConvertOptions, convert, parse},
        diagnostics::RecordingDiagnostics,
        error::EpubError,
        test_utils::{EpubFixture, png, xhtml},
    };

    fn sample_book() -> EpubFixture {
        EpubFixture::new()
            .metadata("<dc:title>Sample Book</dc:title>")
            .metadata("<dc:creator>Jane Doe</dc:creator>")
            .metadata("<dc:language>en</dc:language>")
            .image("map", "Images/map.png", "image/png", png(40, 20))
            .image("plate", "Images/plate.png", "image/png", png(12, 12))
            .document(
                "ch1",
                "Text/ch1.xhtml",
                &xhtml(
                    Some("One"),
                    r#"<h1>Chapter One</h1><p>It begins.</p>
                    <figure><img src="../Images/map.png"/><figcaption>Island map</figcaption></figure>"#,
                ),
            )
            .document("blank", "Text/blank.xhtml", &xhtml(Some("Blank"), "<p> </p>"))
            .document(
                "ch2",
                "Text/ch2.xhtml",
                &xhtml(
                    Some("Two"),
                    r#"<h1>Chapter Two</h1><p>It ends.</p>
                    <div><img src="../Images/plate.png" alt="The plate"/></div>"#,
                ),
            )
    }

    fn file_names(files: &[std::path::PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_default_options() {
        let options = ConvertOptions::default();
        assert_eq!(options.get_output_dir(), Path::new("output"));
        assert!(!options.images_enabled());

        let mut options = ConvertOptions::new();
        options.single_file(false).output_dir("out");
        assert!(options.images_enabled());
        options.extract_images(false);
        assert!(!options.images_enabled());

        options.max_image_size(0, 600);
        assert_eq!((options.max_width, options.max_height), (1, 600));
    }

    #[test]
    fn test_options_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConvertOptions>();
    }

    #[test]
    fn test_convert_single_file() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let epub = sample_book().write_to(input.path(), "sample.epub");
        let diagnostics = RecordingDiagnostics::new();

        let mut options = ConvertOptions::new();
        options.output_dir(output.path());
        let outcome = convert(&epub, &options, &diagnostics).unwrap();

        let ConversionOutcome::Converted {
            files,
            chapters,
            images,
        } = outcome
        else {
            panic!("expected a conversion");
        };
        assert_eq!(file_names(&files), vec!["Sample_Book.md"]);
        assert_eq!(chapters, 2);
        assert_eq!(images, 0);
        assert!(!output.path().join("images").exists());

        let document = fs::read_to_string(&files[0]).unwrap();
        assert!(document.starts_with("# Sample Book\n\n**Author:** Jane Doe\n\n"));
        assert!(document.contains(
            "1. [Chapter One](#chapter-one)\n2. [Chapter Two](#chapter-two)\n\n---\n\n"
        ));
        assert_eq!(document.matches("\n# Chapter").count(), 2);
        assert!(!document.contains("Blank"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_convert_multiple_files_with_images() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let epub = sample_book().write_to(input.path(), "sample.epub");
        let diagnostics = RecordingDiagnostics::new();

        let mut options = ConvertOptions::new();
        options
            .output_dir(output.path())
            .single_file(false)
            .max_image_size(16, 16);
        let outcome = convert(&epub, &options, &diagnostics).unwrap();

        let ConversionOutcome::Converted { files, images, .. } = outcome else {
            panic!("expected a conversion");
        };
        assert_eq!(
            file_names(&files),
            vec![
                "Sample_Book_index.md",
                "chapter_01_Chapter_One.md",
                "chapter_02_Chapter_Two.md"
            ]
        );
        assert_eq!(images, 2);
        assert!(output.path().join("images/Island_map.jpg").exists());
        assert!(output.path().join("images/The_plate.jpg").exists());

        let first = fs::read_to_string(&files[1]).unwrap();
        assert!(first.contains("![Island map](images/Island_map.jpg)"));
        assert!(first.contains("**Page:** 1 | **Chapter:** Chapter One | **Size:** 16x8"));
        assert!(!first.contains("The_plate.jpg"));

        let second = fs::read_to_string(&files[2]).unwrap();
        assert!(second.contains("![The plate](images/The_plate.jpg)"));
        assert!(second.contains("**Page:** 2"));
        assert!(!second.contains("Island_map.jpg"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_parse_skips_images_when_disabled() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let epub = sample_book().write_to(input.path(), "sample.epub");
        let diagnostics = RecordingDiagnostics::new();

        let mut options = ConvertOptions::new();
        options
            .output_dir(output.path())
            .single_file(false)
            .extract_images(false);
        let (metadata, chapters) = parse(&epub, &options, &diagnostics).unwrap();

        assert_eq!(metadata.title, "Sample Book");
        assert_eq!(chapters.len(), 2);
        assert!(chapters.iter().all(|chapter| chapter.images.is_empty()));
        assert!(!output.path().join("images").exists());
    }

    #[test]
    fn test_convert_without_content() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let epub = EpubFixture::new()
            .metadata("<dc:title>Empty</dc:title>")
            .document("blank", "blank.xhtml", &xhtml(Some("Blank"), ""))
            .write_to(input.path(), "empty.epub");
        let diagnostics = RecordingDiagnostics::new();

        let mut options = ConvertOptions::new();
        options.output_dir(output.path().join("md"));
        let outcome = convert(&epub, &options, &diagnostics).unwrap();

        assert_eq!(outcome, ConversionOutcome::NoContent);
        assert!(!output.path().join("md").exists());
    }

    #[test]
    fn test_convert_missing_file() {
        let diagnostics = RecordingDiagnostics::new();
        let result = convert("./does/not/exist.epub", &ConvertOptions::new(), &diagnostics);
        assert!(matches!(result, Err(EpubError::IOError { .. })));
    }
}
