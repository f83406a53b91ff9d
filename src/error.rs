//! Error types for the edgequake-pdf2quiz library.
//!
//! Failures come in two tiers:
//!
//! * [`QuizError`] — **Fatal**: the request cannot produce a result at all
//!   (not a PDF, no extractable text, every segment failed). Returned as
//!   `Err(QuizError)` from the [`crate::process::Processor`] entry points and
//!   mapped to an HTTP status by the server.
//!
//! * [`SegmentError`] — **Non-fatal**: one segment exhausted its attempts
//!   but others succeeded. Stored in [`crate::process::SegmentReport`] and
//!   logged; the segment is simply left out of the merged result.
//!
//! Below those sit the two per-attempt failure kinds that feed the retry
//! loop: [`BackendError`] (the call itself failed) and [`CandidateError`]
//! (the call returned text we could not use).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2quiz library.
#[derive(Debug, Error)]
pub enum QuizError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Upload filename does not carry a `.pdf` suffix.
    #[error("Only PDF files are supported (got '{filename}')")]
    UnsupportedFileType { filename: String },

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("Input '{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open the document.
    #[error("PDF is corrupt or encrypted: {detail}")]
    CorruptPdf { detail: String },

    /// The document opened but no page carried any non-whitespace text.
    #[error("Could not extract any text from the PDF ({pages} pages scanned)")]
    NoExtractableText { pages: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Text extraction needs libpdfium at runtime. You can:\n\
  • Place libpdfium next to the binary (current working directory).\n\
  • Install it system-wide so the dynamic loader can find it.\n\
  • Set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Generation errors ─────────────────────────────────────────────────
    /// The configured backend could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every segment failed after all attempts; there is nothing to merge.
    #[error("Failed to generate valid responses from document content: all {total} segments failed after {attempts} attempts each.\nFirst error: {first_error}")]
    AllSegmentsFailed {
        total: usize,
        attempts: u32,
        first_error: String,
    },

    /// The request as a whole exceeded its deadline.
    #[error("Processing timed out after {secs}s")]
    RequestTimeout { secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuizError {
    /// `true` when the caller sent something we cannot process.
    ///
    /// Client errors are never retried and map to 4xx on the HTTP surface.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QuizError::UnsupportedFileType { .. }
                | QuizError::NotAPdf { .. }
                | QuizError::CorruptPdf { .. }
                | QuizError::NoExtractableText { .. }
        )
    }
}

/// A non-fatal error for a single segment.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum SegmentError {
    /// Every attempt failed.
    #[error("Segment {segment}: exhausted {attempts} attempts: {last_error}")]
    Exhausted {
        segment: usize,
        attempts: u32,
        last_error: String,
    },
}

/// Failure of a single call to the generation backend.
///
/// Every variant is treated the same by the retry loop: the attempt is
/// spent and the next one starts (if any remain).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// No completion arrived within the per-call deadline.
    #[error("backend call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection, TLS or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The backend answered but the completion carried no text.
    #[error("backend returned an empty completion")]
    EmptyCompletion,

    /// Provider-level failure reported by an LLM client library.
    #[error("provider error: {0}")]
    Provider(String),
}

/// Why a raw completion could not be turned into a structured candidate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CandidateError {
    /// Not syntactically valid JSON.
    #[error("invalid JSON: {0}")]
    Parse(String),

    /// Valid JSON, but required fields are missing, ill-typed, or a
    /// question breaks the 4-option / index-in-range rule.
    #[error("schema validation failed: {0}")]
    Validation(String),
}
