//! Conversion entry points.
//!
//! [`convert_with`] drives the stages in [`crate::pipeline`] strictly in
//! sequence: rasterization completes before OCR starts, and merging starts
//! only after every page has been attempted. Concurrency exists only inside
//! the OCR stage.

use crate::config::PipelineConfig;
use crate::error::OcrPdfError;
use crate::output::{PipelineOutput, PipelineResult, PipelineStats};
use crate::pipeline::workdir::WorkDir;
use crate::pipeline::{input, merge, ocr, postprocess, render, Toolchain};
use crate::progress::{NoopReporter, ProgressChannel, ProgressEvent, ProgressReporter};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Make a scanned PDF searchable using the default toolchain.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(PipelineOutput)` on success, even if some pages failed OCR (check
/// `output.missing_pages`) or a text export failed (check `output.warnings`).
///
/// # Errors
/// Returns `Err(OcrPdfError)` only for fatal errors:
/// - File not found / permission denied / not a PDF
/// - Rasterization failed or produced no pages
/// - Every page failed OCR
/// - A merge invocation failed
pub async fn convert(config: &PipelineConfig) -> PipelineResult {
    convert_with(config, &Toolchain::default(), Arc::new(NoopReporter)).await
}

/// Make a scanned PDF searchable with explicit tools and a progress reporter.
///
/// The scoped working directory is removed when this future completes or is
/// dropped, unless `config.keep_temp` is set.
pub async fn convert_with(
    config: &PipelineConfig,
    toolchain: &Toolchain,
    reporter: Arc<dyn ProgressReporter>,
) -> PipelineResult {
    let total_start = Instant::now();
    info!("Starting OCR: {}", config.input_path.display());

    // ── Step 1: Validate input ───────────────────────────────────────────
    let input = input::resolve_local(&config.input_path)?;

    // ── Step 2: Create working directory ─────────────────────────────────
    let work = WorkDir::create(config.temp_root.as_deref(), config.keep_temp)?;

    // ── Step 3: Rasterize pages ──────────────────────────────────────────
    let render_start = Instant::now();
    let pages = render::render_pages(
        toolchain.rasterizer.as_ref(),
        &input,
        config.dpi,
        &work.pages_dir(),
    )
    .await?;
    let total_pages = pages.len();
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} pages in {}ms",
        total_pages, render_duration_ms
    );

    // ── Step 4: OCR every page ───────────────────────────────────────────
    let ocr_start = Instant::now();
    let progress = ProgressChannel::spawn(reporter);
    let events = progress.sender();
    let _ = events.send(ProgressEvent::RunStarted { total: total_pages });

    let pool = ocr::run_pool(
        toolchain.ocr.as_ref(),
        pages,
        config,
        &work.fragments_dir(),
        &events,
    )
    .await;

    let _ = events.send(ProgressEvent::RunFinished {
        total: total_pages,
        succeeded: pool.fragments.len(),
    });
    drop(events);
    let reported = progress.close().await;
    debug!("Progress reporter saw {} page events", reported);

    let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;
    info!(
        "OCR finished: {}/{} pages in {}ms",
        pool.fragments.len(),
        total_pages,
        ocr_duration_ms
    );

    // ── Step 5: Reassemble in page order ─────────────────────────────────
    let merge_start = Instant::now();
    let report = merge::reassemble(
        toolchain.merger.as_ref(),
        pool.fragments,
        total_pages,
        config,
        &work,
    )
    .await?;
    let merge_duration_ms = merge_start.elapsed().as_millis() as u64;

    // ── Step 6: Derive text exports ──────────────────────────────────────
    let present = present_pages(total_pages, &report.missing_pages);
    let artifacts =
        postprocess::derive_artifacts(toolchain.extractor.as_ref(), config, &present).await;

    // ── Step 7: Compute stats ────────────────────────────────────────────
    let kept_temp_dir = work.keeps_files().then(|| work.path().to_path_buf());
    drop(work);

    let stats = PipelineStats {
        total_pages,
        merged_pages: report.merged_pages,
        failed_pages: pool.failures.len(),
        merge_chunks: report.chunks.len(),
        render_duration_ms,
        ocr_duration_ms,
        merge_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Conversion complete: {}/{} pages, {}ms total",
        stats.merged_pages, stats.total_pages, stats.total_duration_ms
    );

    Ok(PipelineOutput {
        output_path: report.output_path,
        text_path: artifacts.text_path,
        layout_path: artifacts.layout_path,
        missing_pages: report.missing_pages,
        failed_pages: pool.failures,
        warnings: artifacts.warnings,
        kept_temp_dir,
        stats,
    })
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(config: &PipelineConfig) -> PipelineResult {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrPdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Source page numbers present in the merged document, in order.
fn present_pages(total: usize, missing: &[usize]) -> Vec<usize> {
    (1..=total)
        .filter(|p| missing.binary_search(p).is_err())
        .collect()
}
