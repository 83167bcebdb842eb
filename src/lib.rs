//! Epub-md library
//!
//! A Rust library for converting EPUB eBook files into Markdown documents.
//!
//! The conversion reads the OCF container and the OPF package of an EPUB 2
//! or EPUB 3 file, extracts normalized book metadata, turns every spine
//! document with readable text into a chapter and renders the result either
//! as one Markdown file or as an index plus one file per chapter. In the
//! multi-file mode the images referenced by the chapters are re-encoded as
//! JPEG files and listed in an image section of their chapter.
//!
//! ## Features
//!
//! - Parse EPUB container and package documents, extract metadata, access resource files.
//! - Markup-aware metadata normalization and chapter text extraction.
//! - Image extraction with caption detection, resizing and unique file names.
//! - Recoverable problems are reported through an injectable [Diagnostics] sink.
//!
//! ## Quick Start
//!
//! ```rust, ignore
//! # use epub_md::{ConversionOutcome, ConvertOptions, LogDiagnostics, convert::convert};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut options = ConvertOptions::new();
//! options.output_dir("path/to/output").single_file(false);
//!
//! match convert("path/to/epub/file.epub", &options, &LogDiagnostics)? {
//!     ConversionOutcome::Converted { files, .. } => println!("Created {} files", files.len()),
//!     ConversionOutcome::NoContent => println!("No chapters found"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `cli` (default): Builds the `epub-md` command line tool.

pub(crate) mod utils;

pub mod chapter;
pub mod convert;
pub mod diagnostics;
pub mod epub;
pub mod error;
pub mod image;
pub mod markdown;
pub mod markup;
pub mod metadata;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use convert::{ConversionOutcome, ConvertOptions};
pub use diagnostics::{DiagnosticEvent, Diagnostics, LogDiagnostics, RecordingDiagnostics};
pub use error::EpubError;
pub use utils::DecodeBytes;
