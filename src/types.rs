use std::path::PathBuf;

/// Placeholder used when the publication declares no title
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Placeholder used when the publication declares no creator
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Language assumed when the publication declares none
pub const DEFAULT_LANGUAGE: &str = "en";

/// Represents a Dublin Core metadata item in the EPUB publication
///
/// Metadata items contain information about the publication such as title,
/// author, identifier, language, and other descriptive information.
#[derive(Debug, Clone)]
pub struct MetadataItem {
    /// Optional unique identifier for this metadata item
    pub id: Option<String>,

    /// The metadata property name
    ///
    /// The local name of the Dublin Core element, e.g. "title", "creator",
    /// "identifier", "language", "publisher".
    pub property: String,

    /// The metadata value, with XML references resolved
    ///
    /// The value is kept raw apart from reference resolution; descriptions
    /// often carry escaped XHTML that is cleaned by the metadata normalizer.
    pub value: String,

    /// Optional language code for this metadata item
    pub lang: Option<String>,
}

/// Represents a resource item declared in the EPUB manifest
#[derive(Debug, Clone)]
pub struct ManifestItem {
    /// The manifest id of the resource
    pub id: String,

    /// The href as declared in the manifest, percent-decoded
    ///
    /// This is relative to the directory containing the OPF file and is
    /// what reading systems usually display as the resource name.
    pub href: String,

    /// The normalized path of the resource relative to the container root
    pub path: String,

    /// The media type of the resource
    pub mime: String,

    /// Optional properties associated with this resource
    pub properties: Option<String>,
}

impl ManifestItem {
    /// Whether the resource is an XHTML or HTML content document
    pub fn is_document(&self) -> bool {
        matches!(
            self.mime.as_str(),
            "application/xhtml+xml" | "text/html" | "application/html"
        )
    }

    /// Whether the resource is a raster or vector image
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// Represents an item in the EPUB spine, defining the reading order of the publication
#[derive(Debug)]
pub struct SpineItem {
    /// The ID reference to a manifest item
    pub idref: String,

    /// Optional identifier for this spine item
    pub id: Option<String>,

    /// Indicates whether this item is part of the linear reading order
    ///
    /// Non-linear items are still converted; the flag is kept for callers
    /// that want to treat them differently.
    pub linear: bool,
}

/// A content document read from the archive in spine order
#[derive(Debug)]
pub struct ContentDocument {
    /// Position of the item in the spine
    pub spine_index: usize,

    /// The document name relative to the OPF directory
    pub name: String,

    /// The document path relative to the container root
    pub path: String,

    /// The raw bytes of the document
    pub data: Vec<u8>,
}

/// An image resource declared in the manifest
#[derive(Debug, Clone)]
pub struct ImageResource {
    /// The image path relative to the container root
    pub path: String,

    /// The declared media type
    pub mime: String,
}

/// Book-level metadata of a conversion run
///
/// The required fields always hold a value; when the publication does not
/// declare them they carry the placeholders [UNKNOWN_TITLE], [UNKNOWN_AUTHOR],
/// [DEFAULT_LANGUAGE] and an empty identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub language: String,
    pub identifier: String,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub rights: Option<String>,
}

impl Default for BookMetadata {
    fn default() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            author: UNKNOWN_AUTHOR.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            identifier: String::new(),
            publisher: None,
            description: None,
            rights: None,
        }
    }
}

/// A chapter of the book, one per retained content document
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    /// The chapter title, never empty
    pub title: String,

    /// Whitespace-normalized text; paragraphs are separated by a blank line
    pub content: String,

    /// The archive path of the source document, used as identity key
    pub source_file_name: String,

    /// Zero-based position among retained chapters
    pub order: usize,

    /// Images referenced by this chapter, in document order
    pub images: Vec<Image>,
}

impl Chapter {
    /// Returns the 1-based position used as page number for images
    pub fn page_number(&self) -> usize {
        self.order + 1
    }

    /// Approximate number of words in the chapter
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// An image extracted, re-encoded and written for a chapter
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// File name under the `images/` directory, unique within a run
    pub output_file_name: String,

    /// Archive path of the original resource
    pub source_path: String,

    /// Path of the written JPEG file
    pub output_path: PathBuf,

    pub caption: Option<String>,

    pub alt_text: Option<String>,

    /// 1-based position of the owning chapter
    pub page_number: usize,

    pub chapter_title: String,

    pub width: u32,

    pub height: u32,

    /// Size of the encoded file in bytes
    pub byte_size: u64,
}
