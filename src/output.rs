//! Values flowing between pipeline stages, and the terminal result.

use crate::error::{OcrPdfError, PageError, PostProcessError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One rasterized page, waiting for OCR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page number, taken from the rasterizer's output order.
    pub index: usize,
    /// Location of the rendered raster inside the working directory.
    pub path: PathBuf,
    /// The document this page was rendered from. Shared, read-only.
    pub source: Arc<Path>,
}

/// A single-page searchable PDF produced by OCR on one [`PageImage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFragment {
    /// Page number inherited from the image.
    pub index: usize,
    pub path: PathBuf,
}

/// An intermediate PDF built from a contiguous run of fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeChunk {
    /// 1-based position among the chunks of its level.
    pub ordinal: usize,
    /// First and last page covered (inclusive).
    pub first_page: usize,
    pub last_page: usize,
    /// Number of inputs merged into this chunk.
    pub inputs: usize,
    pub path: PathBuf,
}

/// Kind of text export derived from the merged PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Reading-order plain text (`.txt`).
    PlainText,
    /// Layout-preserving text (`.md`).
    LayoutText,
}

impl ArtifactKind {
    /// File extension of the exported artifact.
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::PlainText => "txt",
            ArtifactKind::LayoutText => "md",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::PlainText => f.write_str("plain text"),
            ArtifactKind::LayoutText => f.write_str("layout text"),
        }
    }
}

/// Timing and counts for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Pages produced by the rasterizer.
    pub total_pages: usize,
    /// Pages present in the merged document.
    pub merged_pages: usize,
    /// Pages whose OCR failed.
    pub failed_pages: usize,
    /// Intermediate chunks built across all merge levels (0 for a direct merge).
    pub merge_chunks: usize,
    pub render_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub merge_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Successful outcome of a pipeline run.
///
/// A run can succeed with caveats: `missing_pages` lists pages left out of
/// the merged document and `warnings` lists text exports that failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// The merged searchable PDF.
    pub output_path: PathBuf,
    /// Plain-text export, when requested and successful.
    pub text_path: Option<PathBuf>,
    /// Layout-text export, when requested and successful.
    pub layout_path: Option<PathBuf>,
    /// Pages absent from the merged document, ascending.
    pub missing_pages: Vec<usize>,
    /// Why each missing page failed.
    pub failed_pages: Vec<PageError>,
    /// Text exports that could not be produced.
    pub warnings: Vec<PostProcessError>,
    /// Working directory left on disk when temporary files were retained.
    pub kept_temp_dir: Option<PathBuf>,
    pub stats: PipelineStats,
}

impl PipelineOutput {
    /// True when every page made it into the document and every requested
    /// export was written.
    pub fn is_complete(&self) -> bool {
        self.missing_pages.is_empty() && self.warnings.is_empty()
    }
}

/// Terminal value of a pipeline run.
pub type PipelineResult = Result<PipelineOutput, OcrPdfError>;
