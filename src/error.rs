//! Error types for the edgequake-pdf2pptx library.
//!
//! Two error types separate two failure modes:
//!
//! * [`Pdf2PptxError`] — **Fatal**: no deck can be produced (bad input file,
//!   wrong password, provider not configured, output not writable). Returned
//!   as `Err(Pdf2PptxError)` from the top-level `convert*` functions.
//!
//! * [`PageError`] — **Non-fatal**: something about one page degraded (the
//!   vision call failed, the layout came back malformed, a picture could not
//!   be placed). The slide is still emitted and the error is recorded in
//!   [`crate::output::PageReport`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2pptx library.
#[derive(Debug, Error)]
pub enum Pdf2PptxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── Layout errors ─────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A recorded layout file could not be read or is not a JSON object.
    #[error("Cannot use layout file '{path}': {detail}")]
    LayoutFileInvalid { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output deck.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The PresentationML package could not be assembled.
    #[error("Failed to package slide deck: {0}")]
    DeckWriteFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<zip::result::ZipError> for Pdf2PptxError {
    fn from(e: zip::result::ZipError) -> Self {
        Pdf2PptxError::DeckWriteFailed(e.to_string())
    }
}

/// A non-fatal error for a single page.
///
/// The slide for the page is still produced; this records what degraded.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The vision call failed after retries; a placeholder layout was used.
    #[error("Page {page}: layout analysis failed after {retries} retries: {detail}")]
    AnalysisFailed {
        page: usize,
        retries: u8,
        detail: String,
    },

    /// The vision call timed out on every attempt.
    #[error("Page {page}: layout analysis timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The response was not a JSON object; a placeholder layout was used.
    #[error("Page {page}: malformed layout response: {detail}")]
    MalformedLayout { page: usize, detail: String },

    /// A graphic region could not be attached to the slide.
    #[error("Page {page}: picture at ({x},{y}) skipped: {detail}")]
    PictureSkipped {
        page: usize,
        x: u32,
        y: u32,
        detail: String,
    },
}
