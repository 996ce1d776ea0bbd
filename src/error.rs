//! Error types for the ocrpdf library.
//!
//! Three error types reflect three failure scopes:
//!
//! * **Fatal**, [`OcrPdfError`]: the run cannot produce a trustworthy
//!   document (rasterizer failed, nothing to merge, a merge invocation
//!   failed). Returned as `Err(OcrPdfError)` from the `convert*` functions;
//!   the output path must not be trusted.
//!
//! * **Per-page**, [`PageError`]: one page's OCR invocation failed. The page
//!   is left out of the merged document and the run continues. Collected in
//!   [`crate::output::PipelineOutput::failed_pages`].
//!
//! * **Recoverable**, [`PostProcessError`]: a text export failed after the
//!   merged PDF was written. Reported as a warning; the PDF stays valid.

use crate::output::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ocrpdf library.
#[derive(Debug, Error)]
pub enum OcrPdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The rasterizer failed or produced no usable page images.
    #[error("Rasterization of '{path}' failed: {detail}")]
    Rasterization { path: PathBuf, detail: String },

    /// Every page failed OCR; there is nothing to merge.
    #[error("All {total} pages failed OCR; nothing to merge")]
    NoPagesToMerge { total: usize },

    /// Pages are missing and the configured policy forbids partial output.
    #[error("{} of {total} pages failed OCR: {}", .missing.len(), format_pages(.missing))]
    MissingPages { missing: Vec<usize>, total: usize },

    /// An external merge invocation failed. Any file at the output path is
    /// not a valid result of this run.
    #[error("Merge failed at {stage}: {detail}")]
    Merge { stage: MergeStage, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the scoped working directory.
    #[error("Failed to create working directory: {0}")]
    WorkDir(#[source] std::io::Error),

    /// Could not move the merged document to the output path.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Where in the reassembly a merge failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStage {
    /// Building intermediate chunk `chunk` (1-based) at merge level `level`.
    Chunk { level: usize, chunk: usize },
    /// The last merge that writes the final document.
    Final,
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStage::Chunk { level, chunk } => {
                write!(f, "chunk {chunk} (level {level})")
            }
            MergeStage::Final => f.write_str("final merge"),
        }
    }
}

/// A non-fatal error for a single page.
///
/// The page is excluded from the merged output; the run continues unless
/// every page fails.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// The OCR engine could not be run or exited unsuccessfully.
    #[error("Page {page}: OCR failed: {detail}")]
    OcrFailed { page: usize, detail: String },

    /// The OCR engine did not finish within the per-page timeout.
    #[error("Page {page}: OCR timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The OCR engine reported success but wrote no fragment.
    #[error("Page {page}: OCR produced no output at '{path}'")]
    MissingOutput { page: usize, path: PathBuf },
}

impl PageError {
    /// The 1-based page this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::OcrFailed { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::MissingOutput { page, .. } => *page,
        }
    }
}

/// A recoverable failure while deriving a text export.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PostProcessError {
    /// The text extractor failed.
    #[error("{artifact} extraction failed: {detail}")]
    ExtractionFailed {
        artifact: ArtifactKind,
        detail: String,
    },

    /// The extracted text could not be read back or written out.
    #[error("Failed to write {artifact} to '{path}': {detail}")]
    WriteFailed {
        artifact: ArtifactKind,
        path: PathBuf,
        detail: String,
    },
}

/// Render a page list for humans, eliding the middle of long lists.
pub(crate) fn format_pages(pages: &[usize]) -> String {
    const SHOWN: usize = 10;
    let mut parts: Vec<String> = pages.iter().take(SHOWN).map(|p| p.to_string()).collect();
    if pages.len() > SHOWN {
        parts.push(format!("… (+{} more)", pages.len() - SHOWN));
    }
    format!("pages {}", parts.join(", "))
}
