//! Diagnostics sink
//!
//! Recoverable problems met during a conversion run (a missing metadata field,
//! an unreadable content document, an image that cannot be resolved or
//! processed, a chapter file that cannot be written) do not abort the run.
//! They are reported to a [Diagnostics] implementation passed into every
//! pipeline stage, so callers decide what to do with them.
//!
//! - [LogDiagnostics] forwards every event to the `log` facade.
//! - [RecordingDiagnostics] keeps the events in memory.

use std::{fmt, path::PathBuf, sync::Mutex};

use log::warn;

use crate::error::EpubError;

/// A recoverable event reported by the conversion pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// A required metadata field was absent and its placeholder is used
    MetadataFallback { field: String, placeholder: String },

    /// A content document was skipped because it could not be read or decoded
    ChapterSkipped { file: String, reason: String },

    /// An image reference did not match any image resource
    ImageUnresolved { chapter: String, reference: String },

    /// An image resource could not be decoded, encoded or written
    ImageFailed { source_path: String, reason: String },

    /// A chapter file could not be written in multi-file mode
    RenderFailed { path: PathBuf, reason: String },
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::MetadataFallback { field, placeholder } => write!(
                f,
                "metadata field \"{}\" is missing, using \"{}\"",
                field, placeholder
            ),
            DiagnosticEvent::ChapterSkipped { file, reason } => {
                write!(f, "skipped content document \"{}\": {}", file, reason)
            }
            DiagnosticEvent::ImageUnresolved { chapter, reference } => write!(
                f,
                "image \"{}\" referenced by \"{}\" was not found in the archive",
                reference, chapter
            ),
            DiagnosticEvent::ImageFailed {
                source_path,
                reason,
            } => write!(f, "failed to process image \"{}\": {}", source_path, reason),
            DiagnosticEvent::RenderFailed { path, reason } => {
                write!(f, "failed to write \"{}\": {}", path.display(), reason)
            }
        }
    }
}

/// Locally recovered errors become events; every other error is handed back
impl TryFrom<EpubError> for DiagnosticEvent {
    type Error = EpubError;

    fn try_from(err: EpubError) -> Result<Self, Self::Error> {
        match err {
            EpubError::MetadataExtractionError { field, placeholder } => {
                Ok(DiagnosticEvent::MetadataFallback { field, placeholder })
            }
            EpubError::ChapterParseError { file, reason } => {
                Ok(DiagnosticEvent::ChapterSkipped { file, reason })
            }
            EpubError::ImageResolutionError { chapter, reference } => {
                Ok(DiagnosticEvent::ImageUnresolved { chapter, reference })
            }
            EpubError::ImageProcessingError { path, reason } => Ok(DiagnosticEvent::ImageFailed {
                source_path: path,
                reason,
            }),
            err => Err(err),
        }
    }
}

/// Receiver of recoverable pipeline events
///
/// Implementations must be usable from a shared reference; every pipeline
/// stage takes `&dyn Diagnostics`.
pub trait Diagnostics {
    fn report(&self, event: DiagnosticEvent);

    /// Reports an error the pipeline recovers from
    ///
    /// Errors without a matching event abort the run and are returned.
    fn recover(&self, err: EpubError) -> Result<(), EpubError> {
        self.report(DiagnosticEvent::try_from(err)?);
        Ok(())
    }
}

/// Forwards every event to `log` at warning level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn report(&self, event: DiagnosticEvent) {
        warn!("{}", event);
    }
}

/// Stores every event, in the order they were reported
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the events reported so far
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn report(&self, event: DiagnosticEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
