//! # ocrpdf
//!
//! Turn scanned, image-only PDFs into searchable PDFs.
//!
//! Every page is rasterized, recognized by an OCR engine into a single-page
//! PDF with an invisible text layer, and the pages are merged back into one
//! document in their original order. Plain-text and layout-text exports can
//! be written alongside.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    check the file exists and starts with %PDF
//!  ├─ 2. Render   pdftoppm → pages/page-N.png
//!  ├─ 3. OCR      tesseract × jobs → fragments/page-00000N.pdf
//!  ├─ 4. Merge    sort by page, qpdf/pdfunite in chunks → <stem>_ocr.pdf
//!  └─ 5. Export   pdftotext → <stem>_ocr.txt / <stem>_ocr.md
//! ```
//!
//! A page that fails OCR is left out and reported; the run still produces a
//! document unless every page failed. Intermediate files live in a temporary
//! directory that is removed on every exit path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocrpdf::{convert, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder("scan.pdf")
//!         .languages(["eng", "deu"])
//!         .emit_text(true)
//!         .build()?;
//!     let output = convert(&config).await?;
//!     println!("wrote {}", output.output_path.display());
//!     if !output.missing_pages.is_empty() {
//!         eprintln!("missing pages: {:?}", output.missing_pages);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocrpdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! ocrpdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! | Stage | Program | Package |
//! |-------|---------|---------|
//! | Render | `pdftoppm` | poppler-utils |
//! | OCR | `tesseract` | tesseract-ocr (+ language data) |
//! | Merge | `qpdf` or `pdfunite` | qpdf / poppler-utils |
//! | Export | `pdftotext` | poppler-utils |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{MissingPagePolicy, PipelineConfig, PipelineConfigBuilder};
pub use convert::{convert, convert_sync, convert_with};
pub use error::{MergeStage, OcrPdfError, PageError, PostProcessError};
pub use output::{
    ArtifactKind, MergeChunk, PageFragment, PageImage, PipelineOutput, PipelineResult,
    PipelineStats,
};
pub use pipeline::command::ToolError;
pub use pipeline::merge::{MergeTool, PdfMerger, PdfuniteMerger, QpdfMerger};
pub use pipeline::ocr::{OcrEngine, TesseractEngine};
pub use pipeline::postprocess::{PdftotextExtractor, TextExtractor};
pub use pipeline::render::{PdftoppmRasterizer, Rasterizer};
pub use pipeline::Toolchain;
#[cfg(feature = "cli")]
pub use progress::CompactReporter;
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, VerboseReporter};
