//! Image extraction
//!
//! The image pass runs after chapter extraction and only in multi-file mode
//! with image extraction enabled. For every retained chapter it re-reads the
//! source document, resolves each `<img src>` against the image resources of
//! the manifest, picks a caption and a collision-free file name, and writes a
//! re-encoded JPEG to `<output_dir>/images/`.
//!
//! A chapter's position decides the page number of its images:
//! the first retained chapter is page 1.

use std::{
    collections::HashSet,
    fs,
    io::{self, Read, Seek},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use image::{RgbImage, codecs::jpeg::JpegEncoder, imageops::FilterType};
use log::{debug, info, warn};
use regex::Regex;

use crate::{
    diagnostics::Diagnostics,
    epub::EpubArchive,
    error::EpubError,
    markup::{MarkupDocument, MarkupNode},
    types::{Chapter, Image, ImageResource},
    utils::{
        DecodeBytes, NormalizeWhitespace, archive_basename, archive_dir, percent_decode,
        resolve_archive_path,
    },
};

/// Default bounding box of re-encoded images
pub const DEFAULT_MAX_WIDTH: u32 = 1920;
pub const DEFAULT_MAX_HEIGHT: u32 = 1080;

const OPTIMIZED_QUALITY: u8 = 95;
const STANDARD_QUALITY: u8 = 85;
const FALLBACK_QUALITY: u8 = 80;

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid character pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));
static FILLER_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(image|img|figure|fig|photo|picture|pic)\b").expect("valid word pattern")
});
static UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("valid underscore pattern"));

/// Post-processes an encoded JPEG, e.g. a lossless recompressor
///
/// When an optimizer is configured images are encoded at a higher quality
/// before being handed to it.
pub trait JpegOptimizer: Send + Sync {
    fn optimize(&self, jpeg: &[u8]) -> io::Result<Vec<u8>>;
}

/// Output file names already used in a conversion run
#[derive(Debug, Default)]
pub struct FileNameRegistry {
    used: HashSet<String>,
}

impl FileNameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `preferred`, or the first free `<stem>_NN<ext>` variant of it
    pub fn claim(&mut self, preferred: &str) -> String {
        if self.used.insert(preferred.to_string()) {
            return preferred.to_string();
        }

        let (stem, extension) = match preferred.rfind('.') {
            Some(index) if index > 0 => preferred.split_at(index),
            _ => (preferred, ""),
        };

        let mut counter = 1;
        loop {
            let candidate = format!("{}_{:02}{}", stem, counter, extension);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }
}

/// A normalized `<img src>` reference
#[derive(Debug, PartialEq, Eq)]
pub struct ImageReference {
    /// The reference with fragment and query removed, decoded and collapsed
    pub plain: String,

    /// The reference resolved against the directory of the chapter
    pub resolved: Option<String>,
}

impl ImageReference {
    /// Normalizes a `src` attribute found in the document at `document_path`
    ///
    /// Returns `None` for empty references and inline `data:` URIs.
    pub fn parse(src: &str, document_path: &str) -> Option<Self> {
        let src = src.trim();
        if src.is_empty() || src.starts_with("data:") {
            return None;
        }

        let end = src.find(['#', '?']).unwrap_or(src.len());
        let decoded = percent_decode(&src[..end]);
        let resolved = resolve_archive_path(archive_dir(document_path), &decoded);
        let plain = collapse_segments(decoded.trim_start_matches('/'));
        if plain.is_empty() {
            return None;
        }

        Some(Self { plain, resolved })
    }

    /// Finds the image resource this reference points to
    ///
    /// Matching is tried in order: exact path (resolved reference, then the
    /// plain one), file name, then a resource path containing the reference.
    pub fn find_in<'r>(&self, resources: &'r [ImageResource]) -> Option<&'r ImageResource> {
        let basename = archive_basename(&self.plain);

        self.resolved
            .as_deref()
            .and_then(|resolved| resources.iter().find(|resource| resource.path == resolved))
            .or_else(|| resources.iter().find(|resource| resource.path == self.plain))
            .or_else(|| {
                resources
                    .iter()
                    .find(|resource| archive_basename(&resource.path) == basename)
            })
            .or_else(|| {
                resources
                    .iter()
                    .find(|resource| resource.path.contains(self.plain.as_str()))
            })
    }
}

/// Drops `.` segments and lets `..` pop; `..` above the start is discarded
fn collapse_segments(path: &str) -> String {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    segments.join("/")
}

/// Picks a caption for an image from its surroundings
///
/// The first rule that yields a value wins:
/// 1. the `figcaption` of an enclosing `figure`
/// 2. the `alt` attribute, 4 to 99 characters
/// 3. the `title` attribute, 4 to 99 characters
/// 4. the parent's text if it differs from `alt`, 4 to 149 characters
/// 5. the text of the parent's previous or next sibling, 4 to 99 characters
pub fn extract_caption(image: MarkupNode<'_>) -> Option<String> {
    let parent = image.parent();
    let alt = image.attribute("alt").unwrap_or_default().trim();
    let title = image.attribute("title").unwrap_or_default().trim();

    let rules: [&dyn Fn() -> Option<String>; 5] = [
        &|| {
            parent
                .filter(|parent| parent.name() == "figure")
                .and_then(|figure| figure.find_first(&["figcaption"]))
                .map(|caption| caption.text().trim().to_string())
                .filter(|caption| !caption.is_empty())
        },
        &|| within(alt, 100).then(|| alt.to_string()),
        &|| within(title, 100).then(|| title.to_string()),
        &|| {
            parent.and_then(|parent| {
                let text = parent.text();
                let text = text.trim();
                (text != alt && within(text, 150)).then(|| text.normalize_whitespace())
            })
        },
        &|| {
            parent.and_then(|parent| {
                [parent.previous_sibling_text(), parent.next_sibling_text()]
                    .into_iter()
                    .flatten()
                    .map(|text| text.trim().to_string())
                    .find(|text| within(text, 100))
            })
        },
    ];

    rules.iter().find_map(|rule| rule())
}

/// Whether `text` has more than 3 and fewer than `limit` characters
fn within(text: &str, limit: usize) -> bool {
    let length = text.chars().count();
    length > 3 && length < limit
}

/// Turns a caption into a file name stem
///
/// Path separators, reserved characters and whitespace become `_`, filler
/// words such as "figure" or "image" are dropped, and the result is cut to
/// at most 80 characters, at an `_` when one lies past the 40th character.
/// Stems shorter than 3 characters are replaced by `image`.
pub fn sanitize_caption(caption: &str) -> String {
    let name = INVALID_CHARS.replace_all(caption, "_");
    let name = WHITESPACE.replace_all(&name, "_");
    let name = name.trim_matches(['.', '_']);
    let name = FILLER_WORDS.replace_all(name, "");
    let name = UNDERSCORES.replace_all(&name, "_");
    let mut name = name.trim_matches('_').to_string();

    if name.chars().count() > 80 {
        name = name.chars().take(80).collect();
        if let Some(index) = name.rfind('_') {
            if name[..index].chars().count() > 40 {
                name.truncate(index);
            }
        }
    }

    if name.chars().count() < 3 {
        return "image".to_string();
    }
    name
}

/// Preferred output file name: caption, else page number, else sequence number
pub fn preferred_file_name(caption: Option<&str>, page_number: usize, sequence: usize) -> String {
    caption
        .map(str::trim)
        .filter(|caption| !caption.is_empty())
        .map(|caption| format!("{}.jpg", sanitize_caption(caption)))
        .or_else(|| (page_number > 0).then(|| format!("page_{:03}.jpg", page_number)))
        .unwrap_or_else(|| format!("chapter_{:03}.jpg", sequence))
}

/// Dimensions that fit `width`×`height` into the bounding box, keeping the
/// aspect ratio; images already inside the box are never enlarged
///
/// A zero bound is treated as 1, the smallest encodable size, so the result
/// never has a zero dimension.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let (max_width, max_height) = (max_width.max(1), max_height.max(1));
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    (new_width, new_height)
}

/// A re-encoded image ready to be written
pub struct ProcessedImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decodes, converts to RGB, downscales and re-encodes an image as JPEG
pub fn process_image(
    data: &[u8],
    max_width: u32,
    max_height: u32,
    optimizer: Option<&dyn JpegOptimizer>,
) -> Result<ProcessedImage, String> {
    let decoded = image::load_from_memory(data).map_err(|err| err.to_string())?;
    let mut pixels = decoded.to_rgb8();

    let (width, height) = pixels.dimensions();
    let (new_width, new_height) = fit_within(width, height, max_width, max_height);
    if (new_width, new_height) != (width, height) {
        debug!(
            "Resizing image from {}x{} to {}x{}",
            width, height, new_width, new_height
        );
        pixels = image::imageops::resize(&pixels, new_width, new_height, FilterType::Lanczos3);
    }

    let jpeg = encode(&pixels, optimizer)?;
    Ok(ProcessedImage {
        jpeg,
        width: new_width,
        height: new_height,
    })
}

fn encode(pixels: &RgbImage, optimizer: Option<&dyn JpegOptimizer>) -> Result<Vec<u8>, String> {
    let first_attempt = match optimizer {
        Some(optimizer) => encode_jpeg(pixels, OPTIMIZED_QUALITY)
            .and_then(|jpeg| optimizer.optimize(&jpeg).map_err(|err| err.to_string())),
        None => encode_jpeg(pixels, STANDARD_QUALITY),
    };

    first_attempt.or_else(|err| {
        warn!(
            "JPEG encoding failed ({}), retrying at quality {}",
            err, FALLBACK_QUALITY
        );
        encode_jpeg(pixels, FALLBACK_QUALITY)
    })
}

fn encode_jpeg(pixels: &RgbImage, quality: u8) -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(pixels)
        .map_err(|err| err.to_string())?;
    Ok(buffer)
}

/// Extracts the images of a conversion run
///
/// One extractor owns the file-name registry and the image counter of a run;
/// create a new one for every book.
pub struct ImageExtractor<'a> {
    images_dir: PathBuf,
    max_width: u32,
    max_height: u32,
    optimizer: Option<&'a dyn JpegOptimizer>,
    registry: FileNameRegistry,
    image_counter: usize,
}

impl<'a> ImageExtractor<'a> {
    /// Creates an extractor writing to `<output_dir>/images`
    pub fn new(output_dir: &Path) -> Self {
        Self {
            images_dir: output_dir.join("images"),
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            optimizer: None,
            registry: FileNameRegistry::new(),
            image_counter: 1,
        }
    }

    /// Bounding box for re-encoded images; zero bounds are raised to 1
    pub fn max_size(&mut self, max_width: u32, max_height: u32) -> &mut Self {
        self.max_width = max_width.max(1);
        self.max_height = max_height.max(1);
        self
    }

    pub fn optimizer(&mut self, optimizer: Option<&'a dyn JpegOptimizer>) -> &mut Self {
        self.optimizer = optimizer;
        self
    }

    /// Extracts the images referenced by `chapters`, in chapter then document order
    ///
    /// Unresolvable references and images that fail to process are reported
    /// to `diagnostics` and skipped.
    ///
    /// # Return
    /// - `Ok(Vec<Image>)`: The images written
    /// - `Err(EpubError)`: The images directory could not be created
    pub fn extract<R: Read + Seek>(
        &mut self,
        epub: &mut EpubArchive<R>,
        chapters: &[Chapter],
        diagnostics: &dyn Diagnostics,
    ) -> Result<Vec<Image>, EpubError> {
        fs::create_dir_all(&self.images_dir)?;

        let resources = epub.image_resources();
        info!("Found {} images in EPUB", resources.len());

        let mut images = Vec::new();
        for chapter in chapters {
            let source = match epub
                .read_resource(&chapter.source_file_name)
                .and_then(|data| data.decode())
            {
                Ok(source) => source,
                Err(err) => {
                    diagnostics.recover(processing_error(&chapter.source_file_name, err))?;
                    continue;
                }
            };

            let markup = MarkupDocument::parse(&source);
            for node in markup.find_all("img") {
                let Some(src) = node.attribute("src") else {
                    continue;
                };
                let Some(reference) = ImageReference::parse(src, &chapter.source_file_name) else {
                    debug!("Skipping inline or empty image reference in {}", chapter.title);
                    continue;
                };
                let Some(resource) = reference.find_in(&resources) else {
                    diagnostics.recover(EpubError::ImageResolutionError {
                        chapter: chapter.source_file_name.clone(),
                        reference: src.to_string(),
                    })?;
                    continue;
                };

                let caption = extract_caption(node);
                let alt_text = node
                    .attribute("alt")
                    .map(str::trim)
                    .filter(|alt| !alt.is_empty())
                    .map(str::to_string);

                match self.write_image(epub, resource, chapter, caption, alt_text) {
                    Ok(image) => {
                        debug!(
                            "Image {} \"{}\" from {} ({}x{})",
                            self.image_counter,
                            image.output_file_name,
                            image.source_path,
                            image.width,
                            image.height
                        );
                        self.image_counter += 1;
                        images.push(image);
                    }
                    Err(err) => diagnostics.recover(processing_error(&resource.path, err))?,
                }
            }
        }

        info!("Successfully processed {} images", images.len());
        Ok(images)
    }

    fn write_image<R: Read + Seek>(
        &mut self,
        epub: &mut EpubArchive<R>,
        resource: &ImageResource,
        chapter: &Chapter,
        caption: Option<String>,
        alt_text: Option<String>,
    ) -> Result<Image, EpubError> {
        let page_number = chapter.page_number();
        let output_file_name = self.registry.claim(&preferred_file_name(
            caption.as_deref(),
            page_number,
            self.image_counter,
        ));
        let output_path = self.images_dir.join(&output_file_name);

        let data = epub.read_resource(&resource.path)?;
        let processed = process_image(&data, self.max_width, self.max_height, self.optimizer)
            .map_err(|reason| EpubError::ImageProcessingError {
                path: resource.path.clone(),
                reason,
            })?;
        fs::write(&output_path, &processed.jpeg)?;

        Ok(Image {
            output_file_name,
            source_path: resource.path.clone(),
            output_path,
            caption,
            alt_text,
            page_number,
            chapter_title: chapter.title.clone(),
            width: processed.width,
            height: processed.height,
            byte_size: processed.jpeg.len() as u64,
        })
    }
}

/// Attributes a failure while handling one image to the file at `path`
fn processing_error(path: &str, err: EpubError) -> EpubError {
    match err {
        EpubError::ImageProcessingError { .. } => err,
        err => EpubError::ImageProcessingError {
            path: path.to_string(),
            reason: err.to_string(),
        },
    }
}

/// Backfills extracted images into their chapters by page number
pub fn attach_images(chapters: &mut [Chapter], images: Vec<Image>) {
    for image in images {
        match chapters
            .iter_mut()
            .find(|chapter| chapter.page_number() == image.page_number)
        {
            Some(chapter) => chapter.images.push(image),
            None => warn!(
                "No chapter for page {} of image \"{}\"",
                image.page_number, image.output_file_name
            ),
        }
    }
}
