//! Configuration for an OCR run.
//!
//! Every pipeline knob lives in [`PipelineConfig`], built through
//! [`PipelineConfigBuilder`]. The config is created once by the caller (the
//! CLI, or a library user), validated by [`PipelineConfigBuilder::build`], and
//! never mutated afterwards; every stage reads it by shared reference.

use crate::error::OcrPdfError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default rasterization resolution.
pub const DEFAULT_DPI: u32 = 300;

/// Accepted DPI range.
pub const DPI_RANGE: std::ops::RangeInclusive<u32> = 72..=1200;

/// Default number of inputs handed to one merge invocation.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Smallest chunk size that still lets a merge level shrink its input.
pub const MIN_CHUNK_SIZE: usize = 2;

/// Default OCR language.
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Tesseract language codes: `eng`, `chi_sim`, `script/Latin`.
static RE_LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+(/[A-Za-z0-9_]+)?$").unwrap());

/// Configuration for one scanned-PDF → searchable-PDF run.
///
/// Built via [`PipelineConfig::builder()`].
///
/// # Example
/// ```rust
/// use ocrpdf::PipelineConfig;
///
/// let config = PipelineConfig::builder("scans/contract.pdf")
///     .languages(["eng", "deu"])
///     .dpi(300)
///     .jobs(4)
///     .emit_text(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.language_arg(), "eng+deu");
/// assert!(config.output_path.ends_with("contract_ocr.pdf"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The scanned PDF to process.
    pub input_path: PathBuf,

    /// Where the merged searchable PDF is written.
    /// Default: `<input-stem>_ocr.pdf` next to the input.
    pub output_path: PathBuf,

    /// OCR languages, in priority order, without duplicates. Default: `eng`.
    pub languages: Vec<String>,

    /// Rasterization resolution, also passed to the OCR engine. Default: 300.
    pub dpi: u32,

    /// Maximum number of OCR invocations running at once.
    /// Default: available parallelism.
    pub jobs: usize,

    /// Leave the working directory on disk after the run. Default: false.
    pub keep_temp: bool,

    /// Per-page progress lines instead of a single progress bar. Default: false.
    pub verbose: bool,

    /// Also write a plain-text export (`.txt`). Default: false.
    pub emit_text: bool,

    /// Also write a layout-preserving text export (`.md`). Default: false.
    pub emit_markdown: bool,

    /// Maximum inputs per merge invocation. Documents with more fragments are
    /// merged in chunks so the merge tool never holds more than this many
    /// files open. Default: 100.
    pub chunk_size: usize,

    /// Per-page OCR timeout in seconds. A page exceeding it counts as failed.
    /// Default: none.
    pub page_timeout_secs: Option<u64>,

    /// What to do when some pages fail OCR. Default: [`MissingPagePolicy::Warn`].
    pub missing_pages: MissingPagePolicy,

    /// Parent directory for the scoped working directory.
    /// Default: the system temp directory.
    pub temp_root: Option<PathBuf>,
}

impl PipelineConfig {
    /// Create a new builder for the given input document.
    pub fn builder(input_path: impl Into<PathBuf>) -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            input_path: input_path.into(),
            output_path: None,
            languages: vec![DEFAULT_LANGUAGE.to_string()],
            dpi: DEFAULT_DPI,
            jobs: default_jobs(),
            keep_temp: false,
            verbose: false,
            emit_text: false,
            emit_markdown: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            page_timeout_secs: None,
            missing_pages: MissingPagePolicy::default(),
            temp_root: None,
        }
    }

    /// Languages in the `eng+deu` form the OCR engine expects.
    pub fn language_arg(&self) -> String {
        self.languages.join("+")
    }

    /// The per-page timeout, if one is configured.
    pub fn page_timeout(&self) -> Option<Duration> {
        self.page_timeout_secs.map(Duration::from_secs)
    }

    /// Sibling path of the output document with another extension.
    pub fn artifact_path(&self, extension: &str) -> PathBuf {
        self.output_path.with_extension(extension)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    input_path: PathBuf,
    output_path: Option<PathBuf>,
    languages: Vec<String>,
    dpi: u32,
    jobs: usize,
    keep_temp: bool,
    verbose: bool,
    emit_text: bool,
    emit_markdown: bool,
    chunk_size: usize,
    page_timeout_secs: Option<u64>,
    missing_pages: MissingPagePolicy,
    temp_root: Option<PathBuf>,
}

impl PipelineConfigBuilder {
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Set the OCR languages. Order is kept; duplicates are dropped.
    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = dedup_languages(languages.into_iter().map(Into::into));
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn jobs(mut self, n: usize) -> Self {
        self.jobs = n;
        self
    }

    pub fn keep_temp(mut self, v: bool) -> Self {
        self.keep_temp = v;
        self
    }

    pub fn verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }

    pub fn emit_text(mut self, v: bool) -> Self {
        self.emit_text = v;
        self
    }

    pub fn emit_markdown(mut self, v: bool) -> Self {
        self.emit_markdown = v;
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }

    pub fn page_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.page_timeout_secs = secs;
        self
    }

    pub fn missing_pages(mut self, policy: MissingPagePolicy) -> Self {
        self.missing_pages = policy;
        self
    }

    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, OcrPdfError> {
        if self.input_path.as_os_str().is_empty() {
            return Err(OcrPdfError::InvalidConfig("input path is empty".into()));
        }
        if !DPI_RANGE.contains(&self.dpi) {
            return Err(OcrPdfError::InvalidConfig(format!(
                "DPI must be {}–{}, got {}",
                DPI_RANGE.start(),
                DPI_RANGE.end(),
                self.dpi
            )));
        }
        if self.jobs == 0 {
            return Err(OcrPdfError::InvalidConfig("Job count must be ≥ 1".into()));
        }
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(OcrPdfError::InvalidConfig(format!(
                "Chunk size must be ≥ {MIN_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if self.page_timeout_secs == Some(0) {
            return Err(OcrPdfError::InvalidConfig(
                "Page timeout must be ≥ 1 second".into(),
            ));
        }
        if self.languages.is_empty() {
            return Err(OcrPdfError::InvalidConfig(
                "At least one OCR language is required".into(),
            ));
        }
        if let Some(bad) = self.languages.iter().find(|l| !RE_LANGUAGE.is_match(l)) {
            return Err(OcrPdfError::InvalidConfig(format!(
                "Invalid OCR language code '{bad}'"
            )));
        }

        let output_path = match self.output_path {
            Some(p) => p,
            None => default_output_path(&self.input_path),
        };
        if same_path(&output_path, &self.input_path) {
            return Err(OcrPdfError::InvalidConfig(format!(
                "Output path '{}' would overwrite the input",
                output_path.display()
            )));
        }

        Ok(PipelineConfig {
            input_path: self.input_path,
            output_path,
            languages: self.languages,
            dpi: self.dpi,
            jobs: self.jobs,
            keep_temp: self.keep_temp,
            verbose: self.verbose,
            emit_text: self.emit_text,
            emit_markdown: self.emit_markdown,
            chunk_size: self.chunk_size,
            page_timeout_secs: self.page_timeout_secs,
            missing_pages: self.missing_pages,
            temp_root: self.temp_root,
        })
    }
}

/// Whether `a` and `b` name the same file, comparing resolved paths when
/// both exist and the literal paths otherwise.
fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Policy for pages whose OCR failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingPagePolicy {
    /// Leave failed pages out, warn, and still produce a document. (default)
    #[default]
    Warn,
    /// Fail the whole run if any page is missing.
    Fail,
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// `<dir>/<stem>_ocr.pdf` for an input at `<dir>/<stem>.pdf`.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_ocr.pdf"))
}

/// Split a user-supplied language list (`eng+deu`, `eng,deu`, `eng deu`).
pub fn parse_languages(s: &str) -> Vec<String> {
    dedup_languages(
        s.split(|c: char| c == '+' || c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string),
    )
}

/// Number of OCR jobs to run when the caller does not say.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn dedup_languages(languages: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for lang in languages {
        if !out.contains(&lang) {
            out.push(lang);
        }
    }
    out
}
