//! Pipeline stages for scanned-PDF to searchable-PDF conversion.
//!
//! Each submodule implements exactly one transformation step, and each
//! external program sits behind a trait so stages can be tested with
//! in-process fakes and backends can be swapped without touching the
//! orchestration in [`crate::convert`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ ocr ──────▶ merge ──────▶ postprocess
//! (%PDF)   (pdftoppm) (tesseract  (qpdf or      (pdftotext)
//!                      × jobs)     pdfunite)
//! ```
//!
//! 1. [`input`]: check the input exists and looks like a PDF
//! 2. [`render`]: rasterize every page into `pages/`, ordered by page number
//! 3. [`ocr`]: bounded worker pool, one single-page PDF per page image
//! 4. [`merge`]: sort fragments and merge them, in chunks when there are many
//! 5. [`postprocess`]: optional `.txt` and `.md` exports
//!
//! [`command`] runs the external programs and [`workdir`] owns the
//! temporary files of a run.

pub mod command;
pub mod input;
pub mod merge;
pub mod ocr;
pub mod postprocess;
pub mod render;
pub mod workdir;

use merge::{MergeTool, PdfMerger, PdfuniteMerger, QpdfMerger};
use ocr::{OcrEngine, TesseractEngine};
use postprocess::{PdftotextExtractor, TextExtractor};
use render::{PdftoppmRasterizer, Rasterizer};
use std::fmt;
use std::sync::Arc;

/// The external tools one run uses.
///
/// The default is poppler (`pdftoppm`, `pdftotext`), `tesseract` and `qpdf`,
/// each looked up on `PATH`.
#[derive(Clone)]
pub struct Toolchain {
    pub rasterizer: Arc<dyn Rasterizer>,
    pub ocr: Arc<dyn OcrEngine>,
    pub merger: Arc<dyn PdfMerger>,
    pub extractor: Arc<dyn TextExtractor>,
}

impl Toolchain {
    /// Replace the merger with the given tool.
    pub fn with_merge_tool(mut self, tool: MergeTool) -> Self {
        self.merger = match tool {
            MergeTool::Qpdf => Arc::new(QpdfMerger::new()),
            MergeTool::Pdfunite => Arc::new(PdfuniteMerger::new()),
        };
        self
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            rasterizer: Arc::new(PdftoppmRasterizer::new()),
            ocr: Arc::new(TesseractEngine::new()),
            merger: Arc::new(QpdfMerger::new()),
            extractor: Arc::new(PdftotextExtractor::new()),
        }
    }
}

impl fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolchain").finish_non_exhaustive()
    }
}
