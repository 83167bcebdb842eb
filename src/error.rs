//! Error Type Definition Module
//!
//! This module defines the errors that may be encountered while converting an
//! EPUB file into Markdown. All errors are uniformly wrapped in the [EpubError]
//! enumeration for convenient error handling by the caller.
//!
//! Some variants are fatal for a conversion run (the container cannot be read,
//! the output cannot be written), others are recovered locally by the pipeline
//! and only surface through the [Diagnostics](crate::diagnostics::Diagnostics)
//! sink, converted into a [DiagnosticEvent](crate::diagnostics::DiagnosticEvent).

use std::path::PathBuf;

use thiserror::Error;

/// Types of errors that can occur during EPUB conversion
#[derive(Debug, Error)]
pub enum EpubError {
    /// ZIP archive related errors
    ///
    /// Errors occur when processing the ZIP structure of EPUB files,
    /// such as file corruption, unreadability, etc.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// A single content document could not be read or decoded
    ///
    /// The chapter pass skips the document and continues.
    #[error("Chapter parse error: Failed to read \"{file}\": {reason}")]
    ChapterParseError { file: String, reason: String },

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to decode an empty stream.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    /// An image reference in a chapter has no matching resource in the archive
    #[error(
        "Image resolution error: No image resource matches \"{reference}\" in \"{chapter}\"."
    )]
    ImageResolutionError { chapter: String, reference: String },

    /// An image resource could not be decoded, resized or encoded
    #[error("Image processing error: \"{path}\": {reason}")]
    ImageProcessingError { path: String, reason: String },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// A metadata field could not be extracted and a placeholder was used
    #[error(
        "Metadata extraction error: The \"{field}\" field is missing or empty, using \"{placeholder}\"."
    )]
    MetadataExtractionError { field: String, placeholder: String },

    /// Missing required attribute error
    ///
    /// Triggered when an XML element in an EPUB file lacks the required
    /// attributes required by the EPUB specification.
    #[error(
        "Missing required attribute: The \"{attribute}\" attribute is a must attribute for the \"{tag}\" element."
    )]
    MissingRequiredAttribute { tag: String, attribute: String },

    /// Non-canonical EPUB structure error
    ///
    /// This error occurs when an EPUB file lacks some files or directory
    /// structure that is required to locate its content.
    #[error("Non-canonical epub: The \"{expected_file}\" file was not found.")]
    NonCanonicalEpub { expected_file: String },

    /// Non-canonical file structure error
    ///
    /// This error is triggered when the required XML elements
    /// are missing from the EPUB file.
    #[error("Non-canonical file: The \"{tag}\" elements was not found.")]
    NonCanonicalFile { tag: String },

    /// Relative link leak error
    ///
    /// This error occurs when a relative path link is outside the scope
    /// of an EPUB container.
    #[error("Relative link leakage: Path \"{path}\" is out of container range.")]
    RelativeLinkLeakage { path: String },

    /// Output file could not be written
    #[error("Render error: Failed to write \"{}\": {source}", .path.display())]
    RenderError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Unable to find the resource error
    ///
    /// This error occurs when an attempt is made to get a resource
    /// but it does not exist in the EPUB container.
    #[error("Resource not found: Unable to find resource from \"{resource}\".")]
    ResourceNotFound { resource: String },

    /// Unusable compression method error
    ///
    /// This error occurs when an EPUB file uses an unsupported compression method.
    #[error(
        "Unusable compression method: The \"{file}\" file uses the unsupported \"{method}\" compression method."
    )]
    UnusableCompressionMethod { file: String, method: String },

    /// UTF-8 decoding error
    #[error("Decode error: {source}")]
    Utf8DecodeError { source: std::string::FromUtf8Error },

    /// UTF-16 decoding error
    #[error("Decode error: {source}")]
    Utf16DecodeError { source: std::string::FromUtf16Error },

    /// XML nesting error
    ///
    /// Container and package documents nesting elements deeper than the limit
    /// are rejected.
    #[error("XML nesting error: Elements are nested deeper than {limit} levels.")]
    XmlNestingTooDeep { limit: usize },

    /// QuickXml error
    ///
    /// This error occurs when parsing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },
}

impl From<zip::result::ZipError> for EpubError {
    fn from(value: zip::result::ZipError) -> Self {
        EpubError::ArchiveError { source: value }
    }
}

impl From<quick_xml::Error> for EpubError {
    fn from(value: quick_xml::Error) -> Self {
        EpubError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for EpubError {
    fn from(value: std::io::Error) -> Self {
        EpubError::IOError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for EpubError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        EpubError::Utf8DecodeError { source: value }
    }
}

impl From<std::string::FromUtf16Error> for EpubError {
    fn from(value: std::string::FromUtf16Error) -> Self {
        EpubError::Utf16DecodeError { source: value }
    }
}

#[cfg(test)]
impl PartialEq for EpubError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::ChapterParseError { file: l_file, .. },
                Self::ChapterParseError { file: r_file, .. },
            ) => l_file == r_file,
            (
                Self::ImageResolutionError {
                    reference: l_reference,
                    ..
                },
                Self::ImageResolutionError {
                    reference: r_reference,
                    ..
                },
            ) => l_reference == r_reference,
            (
                Self::ImageProcessingError { path: l_path, .. },
                Self::ImageProcessingError { path: r_path, .. },
            ) => l_path == r_path,
            (
                Self::MetadataExtractionError { field: l_field, .. },
                Self::MetadataExtractionError { field: r_field, .. },
            ) => l_field == r_field,
            (
                Self::MissingRequiredAttribute {
                    tag: l_tag,
                    attribute: l_attribute,
                },
                Self::MissingRequiredAttribute {
                    tag: r_tag,
                    attribute: r_attribute,
                },
            ) => l_tag == r_tag && l_attribute == r_attribute,
            (
                Self::NonCanonicalEpub {
                    expected_file: l_expected_file,
                },
                Self::NonCanonicalEpub {
                    expected_file: r_expected_file,
                },
            ) => l_expected_file == r_expected_file,
            (Self::NonCanonicalFile { tag: l_tag }, Self::NonCanonicalFile { tag: r_tag }) => {
                l_tag == r_tag
            }
            (
                Self::RelativeLinkLeakage { path: l_path },
                Self::RelativeLinkLeakage { path: r_path },
            ) => l_path == r_path,
            (Self::RenderError { path: l_path, .. }, Self::RenderError { path: r_path, .. }) => {
                l_path == r_path
            }
            (
                Self::ResourceNotFound {
                    resource: l_resource,
                },
                Self::ResourceNotFound {
                    resource: r_resource,
                },
            ) => l_resource == r_resource,
            (
                Self::UnusableCompressionMethod {
                    file: l_file,
                    method: l_method,
                },
                Self::UnusableCompressionMethod {
                    file: r_file,
                    method: r_method,
                },
            ) => l_file == r_file && l_method == r_method,
            (
                Self::Utf8DecodeError { source: l_source },
                Self::Utf8DecodeError { source: r_source },
            ) => l_source == r_source,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}
