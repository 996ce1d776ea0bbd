//! Rasterization: render every page of the input into an image file.
//!
//! The rasterizer is an external program writing one image per page into the
//! `pages/` directory. File names carry the page number (`page-7.png`,
//! `page-007.png`, depending on how many digits the tool decides to pad to).
//! We parse that number and sort on it; sorting the listing lexically would
//! put `page-10` before `page-2`.

use crate::error::OcrPdfError;
use crate::output::PageImage;
use crate::pipeline::command::{run_tool, tool_command, ToolError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// File-name prefix handed to the rasterizer.
pub const PAGE_PREFIX: &str = "page";

/// `page-<n>.<image extension>`.
static RE_PAGE_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^page-(\d+)\.(?i:png|ppm|pgm|pbm|tif|tiff|jpg|jpeg)$").unwrap()
});

/// An engine that renders a PDF into per-page images.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render every page of `input` at `dpi` into `out_dir`, naming each file
    /// `page-<n>.<ext>` with `n` starting at 1.
    async fn rasterize(&self, input: &Path, dpi: u32, out_dir: &Path) -> Result<(), ToolError>;
}

/// [`Rasterizer`] backed by poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: PathBuf,
}

impl PdftoppmRasterizer {
    pub fn new() -> Self {
        Self::with_program("pdftoppm")
    }

    /// Use a specific `pdftoppm` binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, input: &Path, dpi: u32, out_dir: &Path) -> tokio::process::Command {
        let mut cmd = tool_command(&self.program);
        cmd.arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg(input)
            .arg(out_dir.join(PAGE_PREFIX));
        cmd
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, input: &Path, dpi: u32, out_dir: &Path) -> Result<(), ToolError> {
        run_tool(self.command(input, dpi, out_dir)).await?;
        Ok(())
    }
}

/// Rasterize `input` into `out_dir` and return its pages in page order.
///
/// # Errors
/// [`OcrPdfError::Rasterization`] when the engine fails, produces no images
/// (empty, corrupt or encrypted input), or produces a numbering with gaps.
pub async fn render_pages(
    rasterizer: &dyn Rasterizer,
    input: &Path,
    dpi: u32,
    out_dir: &Path,
) -> Result<Vec<PageImage>, OcrPdfError> {
    let rasterization_error = |detail: String| OcrPdfError::Rasterization {
        path: input.to_path_buf(),
        detail,
    };

    rasterizer
        .rasterize(input, dpi, out_dir)
        .await
        .map_err(|e| rasterization_error(e.to_string()))?;

    let mut numbered = scan_page_images(out_dir).map_err(|e| {
        rasterization_error(format!("cannot list {}: {e}", out_dir.display()))
    })?;
    if numbered.is_empty() {
        return Err(rasterization_error(
            "no page images were produced; the PDF may be empty, corrupt or encrypted".into(),
        ));
    }
    numbered.sort_by_key(|(n, _)| *n);

    for (expected, (n, path)) in (1..).zip(&numbered) {
        if *n != expected {
            return Err(rasterization_error(format!(
                "page images are not numbered 1..{}: expected page {expected}, found {}",
                numbered.len(),
                path.display()
            )));
        }
    }

    let source: Arc<Path> = Arc::from(input);
    let pages: Vec<PageImage> = numbered
        .into_iter()
        .map(|(index, path)| PageImage {
            index,
            path,
            source: Arc::clone(&source),
        })
        .collect();

    info!("Rasterized {} pages at {} DPI", pages.len(), dpi);
    Ok(pages)
}

/// List `page-<n>.<ext>` files in `dir` with their page numbers.
fn scan_page_images(dir: &Path) -> std::io::Result<Vec<(usize, PathBuf)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match parse_page_number(name) {
            Some(n) => found.push((n, path)),
            None => debug!("Ignoring unexpected file {}", path.display()),
        }
    }
    Ok(found)
}

/// Page number encoded in a rasterizer output name, if it is one.
pub fn parse_page_number(file_name: &str) -> Option<usize> {
    RE_PAGE_FILE
        .captures(file_name)
        .and_then(|caps| caps[1].parse().ok())
}
