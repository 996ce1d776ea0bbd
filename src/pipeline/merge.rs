//! Ordered reassembly of page fragments into the output document.
//!
//! ## Ordering
//!
//! Fragments arrive in OCR completion order. They are sorted on their page
//! index before anything is merged, and every merge invocation receives a
//! contiguous, ascending slice, so the merged page order is the source page
//! order whatever order the workers finished in.
//!
//! ## Chunking
//!
//! Merge tools open every input at once. With more than `chunk_size` inputs
//! the fragments are merged in contiguous groups of `chunk_size`, and the
//! resulting chunks are merged in chunk order. If the chunks themselves
//! outnumber `chunk_size` the step repeats, so no invocation ever receives
//! more than `chunk_size` files.
//!
//! ## Atomic output
//!
//! The final document is written inside the working directory and moved to
//! the output path only after the last merge succeeded. A failed run leaves
//! nothing at the output path.

use crate::config::{MissingPagePolicy, PipelineConfig};
use crate::error::{format_pages, MergeStage, OcrPdfError};
use crate::output::{MergeChunk, PageFragment};
use crate::pipeline::command::{run_tool, tool_command, ToolError};
use crate::pipeline::workdir::WorkDir;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Name of the staged final document inside the working directory.
const STAGED_OUTPUT: &str = "merged.pdf";

/// A tool that concatenates PDFs, in argument order, into one document.
#[async_trait]
pub trait PdfMerger: Send + Sync {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError>;
}

/// `qpdf --empty --pages <inputs> -- <output>`.
#[derive(Debug, Clone)]
pub struct QpdfMerger {
    program: PathBuf,
}

impl QpdfMerger {
    pub fn new() -> Self {
        Self::with_program("qpdf")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, inputs: &[PathBuf], output: &Path) -> tokio::process::Command {
        let mut cmd = tool_command(&self.program);
        cmd.arg("--empty")
            .arg("--pages")
            .args(inputs)
            .arg("--")
            .arg(output);
        cmd
    }
}

impl Default for QpdfMerger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PdfMerger for QpdfMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        run_tool(self.command(inputs, output)).await?;
        Ok(())
    }
}

/// `pdfunite <inputs> <output>`, from poppler.
#[derive(Debug, Clone)]
pub struct PdfuniteMerger {
    program: PathBuf,
}

impl PdfuniteMerger {
    pub fn new() -> Self {
        Self::with_program("pdfunite")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, inputs: &[PathBuf], output: &Path) -> tokio::process::Command {
        let mut cmd = tool_command(&self.program);
        cmd.args(inputs).arg(output);
        cmd
    }
}

impl Default for PdfuniteMerger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PdfMerger for PdfuniteMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        run_tool(self.command(inputs, output)).await?;
        Ok(())
    }
}

/// Which merge tool to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeTool {
    #[default]
    Qpdf,
    Pdfunite,
}

impl fmt::Display for MergeTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeTool::Qpdf => f.write_str("qpdf"),
            MergeTool::Pdfunite => f.write_str("pdfunite"),
        }
    }
}

impl FromStr for MergeTool {
    type Err = OcrPdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qpdf" => Ok(MergeTool::Qpdf),
            "pdfunite" => Ok(MergeTool::Pdfunite),
            other => Err(OcrPdfError::InvalidConfig(format!(
                "Unknown merge tool '{other}' (expected qpdf or pdfunite)"
            ))),
        }
    }
}

/// Outcome of a successful reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Where the merged document now lives.
    pub output_path: PathBuf,
    /// Pages in the merged document.
    pub merged_pages: usize,
    /// Pages in 1..=N with no fragment, ascending.
    pub missing_pages: Vec<usize>,
    /// Every intermediate chunk built, level by level.
    pub chunks: Vec<MergeChunk>,
}

/// One merge input with the page range it covers.
struct Span {
    first: usize,
    last: usize,
    path: PathBuf,
}

/// Merge `fragments` in page order into `config.output_path`.
///
/// `total_pages` is the rasterized page count; pages in `1..=total_pages`
/// without a fragment are reported as missing, and handled per
/// `config.missing_pages`.
///
/// # Errors
/// - [`OcrPdfError::NoPagesToMerge`] if there are no fragments at all
/// - [`OcrPdfError::MissingPages`] if pages are missing under
///   [`MissingPagePolicy::Fail`]
/// - [`OcrPdfError::Merge`] if any merge invocation fails
/// - [`OcrPdfError::OutputWriteFailed`] if the result cannot be moved into place
pub async fn reassemble(
    merger: &dyn PdfMerger,
    mut fragments: Vec<PageFragment>,
    total_pages: usize,
    config: &PipelineConfig,
    work: &WorkDir,
) -> Result<MergeReport, OcrPdfError> {
    fragments.sort_by_key(|f| f.index);
    fragments.dedup_by_key(|f| f.index);

    if fragments.is_empty() {
        return Err(OcrPdfError::NoPagesToMerge { total: total_pages });
    }

    let missing = missing_pages(&fragments, total_pages);
    if !missing.is_empty() {
        match config.missing_pages {
            MissingPagePolicy::Fail => {
                return Err(OcrPdfError::MissingPages {
                    missing,
                    total: total_pages,
                })
            }
            MissingPagePolicy::Warn => warn!(
                "{} of {} pages missing from output: {}",
                missing.len(),
                total_pages,
                format_pages(&missing)
            ),
        }
    }

    let merged_pages = fragments.len();
    let mut spans: Vec<Span> = fragments
        .into_iter()
        .map(|f| Span {
            first: f.index,
            last: f.index,
            path: f.path,
        })
        .collect();

    // ── Chunk levels ─────────────────────────────────────────────────────
    let chunks_dir = work.chunks_dir();
    let mut chunks: Vec<MergeChunk> = Vec::new();
    let mut level = 0;
    while spans.len() > config.chunk_size {
        level += 1;
        let groups = spans.len().div_ceil(config.chunk_size);
        info!(
            "Merging {} inputs in {} chunks of up to {} (level {})",
            spans.len(),
            groups,
            config.chunk_size,
            level
        );

        let mut next = Vec::with_capacity(groups);
        for (i, group) in spans.chunks(config.chunk_size).enumerate() {
            let ordinal = i + 1;
            let path = chunks_dir.join(format!("level{level}-chunk{ordinal:04}.pdf"));
            let inputs: Vec<PathBuf> = group.iter().map(|s| s.path.clone()).collect();
            merge_or_copy(merger, &inputs, &path)
                .await
                .map_err(|detail| OcrPdfError::Merge {
                    stage: MergeStage::Chunk {
                        level,
                        chunk: ordinal,
                    },
                    detail,
                })?;

            let first = group[0].first;
            let last = group[group.len() - 1].last;
            debug!("Chunk {ordinal} (level {level}): pages {first}-{last}");
            chunks.push(MergeChunk {
                ordinal,
                first_page: first,
                last_page: last,
                inputs: inputs.len(),
                path: path.clone(),
            });
            next.push(Span { first, last, path });
        }
        spans = next;
    }

    // ── Final merge ──────────────────────────────────────────────────────
    let staged = work.path().join(STAGED_OUTPUT);
    let inputs: Vec<PathBuf> = spans.iter().map(|s| s.path.clone()).collect();
    merge_or_copy(merger, &inputs, &staged)
        .await
        .map_err(|detail| OcrPdfError::Merge {
            stage: MergeStage::Final,
            detail,
        })?;

    move_into_place(&staged, &config.output_path).await?;

    if !work.keeps_files() {
        for chunk in &chunks {
            if let Err(e) = tokio::fs::remove_file(&chunk.path).await {
                debug!("Could not remove {}: {}", chunk.path.display(), e);
            }
        }
    }

    info!(
        "Merged {} pages into {}",
        merged_pages,
        config.output_path.display()
    );

    Ok(MergeReport {
        output_path: config.output_path.clone(),
        merged_pages,
        missing_pages: missing,
        chunks,
    })
}

/// Pages in `1..=total` that have no fragment. `fragments` must be sorted.
fn missing_pages(fragments: &[PageFragment], total: usize) -> Vec<usize> {
    let mut present = fragments.iter().map(|f| f.index).peekable();
    let mut missing = Vec::new();
    for page in 1..=total {
        if present.peek() == Some(&page) {
            present.next();
        } else {
            missing.push(page);
        }
    }
    missing
}

/// Merge `inputs` into `output`; a single input is copied.
async fn merge_or_copy(
    merger: &dyn PdfMerger,
    inputs: &[PathBuf],
    output: &Path,
) -> Result<(), String> {
    match inputs {
        [] => Err("no inputs".to_string()),
        [single] => tokio::fs::copy(single, output)
            .await
            .map(|_| ())
            .map_err(|e| format!("copying {}: {e}", single.display())),
        _ => {
            merger
                .merge(inputs, output)
                .await
                .map_err(|e| e.to_string())?;
            if tokio::fs::try_exists(output).await.unwrap_or(false) {
                Ok(())
            } else {
                Err(format!("merge reported success but {} is missing", output.display()))
            }
        }
    }
}

/// Move the staged document to `dest`, falling back to copy-then-rename
/// across filesystems.
async fn move_into_place(staged: &Path, dest: &Path) -> Result<(), OcrPdfError> {
    let write_err = |source: std::io::Error| OcrPdfError::OutputWriteFailed {
        path: dest.to_path_buf(),
        source,
    };

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    if tokio::fs::rename(staged, dest).await.is_ok() {
        return Ok(());
    }

    let partial = dest.with_extension("pdf.partial");
    let copied = async {
        tokio::fs::copy(staged, &partial).await?;
        tokio::fs::rename(&partial, dest).await
    }
    .await;
    if let Err(e) = copied {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(write_err(e));
    }
    Ok(())
}
