//! Post-processing: text exports derived from the merged searchable PDF.
//!
//! Two optional artifacts sit next to the output document:
//!
//! - `<stem>.txt`: reading-order plain text, written as extracted.
//! - `<stem>.md`: layout-preserving text, cleaned by [`clean_layout_text`].
//!
//! Each artifact is independent. A failure becomes a [`PostProcessError`]
//! warning and leaves the PDF and the other artifact untouched.
//!
//! ## Rule Order
//!
//! Line endings are normalised before pages are split on form feeds, and
//! trailing whitespace is trimmed before blank lines are collapsed, so the
//! collapse sees lines that are really empty.

use crate::config::PipelineConfig;
use crate::error::PostProcessError;
use crate::output::ArtifactKind;
use crate::pipeline::command::{run_tool, tool_command, ToolError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A tool that extracts the text layer of a PDF.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract all text from `pdf`. With `layout`, keep the physical layout
    /// (column positions, spacing) instead of reading order.
    async fn extract(&self, pdf: &Path, layout: bool) -> Result<String, ToolError>;
}

/// [`TextExtractor`] backed by poppler's `pdftotext`, reading from stdout.
#[derive(Debug, Clone)]
pub struct PdftotextExtractor {
    program: PathBuf,
}

impl PdftotextExtractor {
    pub fn new() -> Self {
        Self::with_program("pdftotext")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, pdf: &Path, layout: bool) -> tokio::process::Command {
        let mut cmd = tool_command(&self.program);
        if layout {
            cmd.arg("-layout");
        }
        cmd.arg("-enc").arg("UTF-8").arg(pdf).arg("-");
        cmd
    }
}

impl Default for PdftotextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for PdftotextExtractor {
    async fn extract(&self, pdf: &Path, layout: bool) -> Result<String, ToolError> {
        let output = run_tool(self.command(pdf, layout)).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Artifacts written, and the ones that failed.
#[derive(Debug, Default)]
pub struct Artifacts {
    pub text_path: Option<PathBuf>,
    pub layout_path: Option<PathBuf>,
    pub warnings: Vec<PostProcessError>,
}

/// Write the text exports `config` asks for, next to `config.output_path`.
///
/// `pages` lists the source page number of each page in the merged PDF, in
/// order; it labels the page separators of the layout text.
pub async fn derive_artifacts(
    extractor: &dyn TextExtractor,
    config: &PipelineConfig,
    pages: &[usize],
) -> Artifacts {
    let mut out = Artifacts::default();

    if config.emit_text {
        match write_artifact(extractor, config, ArtifactKind::PlainText, pages).await {
            Ok(path) => out.text_path = Some(path),
            Err(e) => {
                warn!("{}", e);
                out.warnings.push(e);
            }
        }
    }

    if config.emit_markdown {
        match write_artifact(extractor, config, ArtifactKind::LayoutText, pages).await {
            Ok(path) => out.layout_path = Some(path),
            Err(e) => {
                warn!("{}", e);
                out.warnings.push(e);
            }
        }
    }

    out
}

async fn write_artifact(
    extractor: &dyn TextExtractor,
    config: &PipelineConfig,
    artifact: ArtifactKind,
    pages: &[usize],
) -> Result<PathBuf, PostProcessError> {
    let layout = artifact == ArtifactKind::LayoutText;
    let raw = extractor
        .extract(&config.output_path, layout)
        .await
        .map_err(|e| PostProcessError::ExtractionFailed {
            artifact,
            detail: e.to_string(),
        })?;

    let text = if layout {
        clean_layout_text(&raw, pages)
    } else {
        raw
    };

    let path = config.artifact_path(artifact.extension());
    tokio::fs::write(&path, text)
        .await
        .map_err(|e| PostProcessError::WriteFailed {
            artifact,
            path: path.clone(),
            detail: e.to_string(),
        })?;

    info!("Wrote {} to {}", artifact, path.display());
    Ok(path)
}

/// Normalise layout text extracted from the merged PDF.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Replace form feeds with `<!-- page N -->` separators
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Ensure the text ends with exactly one newline
///
/// `pages` supplies the page numbers used in separators; when it does not
/// match the number of pages found, pages are numbered 1, 2, 3…
pub fn clean_layout_text(input: &str, pages: &[usize]) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = insert_page_separators(&s, pages);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Page separators ─────────────────────────────────────────────────
//
// pdftotext ends every page with a form feed, including the last one.

fn insert_page_separators(input: &str, pages: &[usize]) -> String {
    let mut segments: Vec<&str> = input.split('\u{000C}').collect();
    if segments.len() > 1 && segments.last().is_some_and(|s| s.trim().is_empty()) {
        segments.pop();
    }

    let label = |i: usize| {
        if pages.len() == segments.len() {
            pages[i]
        } else {
            i + 1
        }
    };

    let mut out = String::with_capacity(input.len() + segments.len() * 24);
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push_str(&format!("\n\n<!-- page {} -->\n\n", label(i)));
        }
        out.push_str(segment.trim_matches('\n'));
    }
    out
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 6: Ensure file ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
