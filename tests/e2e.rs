//! End-to-end integration tests for ocrpdf.
//!
//! These tests run the real tools (pdftoppm, tesseract, qpdf, pdfunite,
//! pdftotext) against scanned PDFs in `./test_cases/`. They are gated behind
//! the `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_convert_sample -- --nocapture

use ocrpdf::{
    convert, convert_with, MergeTool, NoopReporter, PipelineConfig, Toolchain, VerboseReporter,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            println!("      Place a scanned, image-only PDF there to run this test.");
            return;
        }
        p
    }};
}

/// Page count of a PDF, via `qpdf --show-npages`.
fn page_count(pdf: &Path) -> usize {
    let out = std::process::Command::new("qpdf")
        .arg("--show-npages")
        .arg(pdf)
        .output()
        .expect("qpdf must be installed for e2e tests");
    String::from_utf8_lossy(&out.stdout).trim().parse().unwrap()
}

/// Assert the file is a PDF with at least one page.
fn assert_pdf(path: &Path, context: &str) {
    let bytes = std::fs::read(path).unwrap_or_else(|e| panic!("[{context}] read failed: {e}"));
    assert!(
        bytes.starts_with(b"%PDF"),
        "[{context}] Output does not start with %PDF"
    );
    assert!(page_count(path) > 0, "[{context}] Output has no pages");
}

// ── Conversions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_convert_sample_scan() {
    let input = e2e_skip_unless_ready!(test_cases_dir().join("scanned_sample.pdf"));
    let out_path = output_dir().join("scanned_sample_ocr.pdf");

    let config = PipelineConfig::builder(&input)
        .output_path(&out_path)
        .dpi(200)
        .jobs(4)
        .emit_text(true)
        .emit_markdown(true)
        .build()
        .unwrap();

    let output = convert(&config).await.expect("conversion should succeed");

    assert_pdf(&output.output_path, "sample");
    assert!(output.is_complete(), "unexpected caveats: {output:?}");
    assert_eq!(page_count(&output.output_path), page_count(&input));

    let text = std::fs::read_to_string(output.text_path.unwrap()).unwrap();
    assert!(
        text.chars().any(char::is_alphabetic),
        "OCR text layer should contain words"
    );
    let md = std::fs::read_to_string(output.layout_path.unwrap()).unwrap();
    assert!(md.ends_with('\n') && !md.contains("\n\n\n\n"));

    println!(
        "✓ {} pages in {}ms (render {}ms, OCR {}ms, merge {}ms)",
        output.stats.total_pages,
        output.stats.total_duration_ms,
        output.stats.render_duration_ms,
        output.stats.ocr_duration_ms,
        output.stats.merge_duration_ms
    );
}

#[tokio::test]
async fn test_chunked_merge_with_pdfunite() {
    let input = e2e_skip_unless_ready!(test_cases_dir().join("scanned_sample.pdf"));
    let out_path = output_dir().join("scanned_sample_chunked.pdf");

    let config = PipelineConfig::builder(&input)
        .output_path(&out_path)
        .dpi(150)
        .chunk_size(2)
        .build()
        .unwrap();
    let toolchain = Toolchain::default().with_merge_tool(MergeTool::Pdfunite);

    let output = convert_with(&config, &toolchain, Arc::new(VerboseReporter::stderr()))
        .await
        .expect("conversion should succeed");

    assert_pdf(&output.output_path, "chunked");
    assert_eq!(page_count(&output.output_path), page_count(&input));
}

#[tokio::test]
async fn test_convert_json_serialisable() {
    let input = e2e_skip_unless_ready!(test_cases_dir().join("scanned_sample.pdf"));
    let config = PipelineConfig::builder(&input)
        .output_path(output_dir().join("scanned_sample_json.pdf"))
        .dpi(150)
        .build()
        .unwrap();

    let output = convert(&config).await.unwrap();
    let json = serde_json::to_string_pretty(&output).expect("serialise");
    assert!(json.contains("\"total_pages\""));
    assert!(json.contains("\"missing_pages\": []"));
}

#[tokio::test]
async fn test_missing_language_data_fails_every_page() {
    let input = e2e_skip_unless_ready!(test_cases_dir().join("scanned_sample.pdf"));
    let config = PipelineConfig::builder(&input)
        .output_path(output_dir().join("never_written.pdf"))
        .languages(["zzz_not_installed"])
        .dpi(72)
        .build()
        .unwrap();

    let err = convert(&config).await.unwrap_err();
    assert!(
        matches!(err, ocrpdf::OcrPdfError::NoPagesToMerge { .. }),
        "got: {err}"
    );
    assert!(!output_dir().join("never_written.pdf").exists());
}

#[tokio::test]
async fn test_dropped_run_cleans_up() {
    let input = e2e_skip_unless_ready!(test_cases_dir().join("scanned_sample.pdf"));
    let temp_root = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder(&input)
        .output_path(output_dir().join("cancelled.pdf"))
        .temp_root(temp_root.path())
        .dpi(300)
        .build()
        .unwrap();

    let toolchain = Toolchain::default();
    let run = convert_with(&config, &toolchain, Arc::new(NoopReporter));
    // Cancelled mid-run: the future is dropped.
    let _ = tokio::time::timeout(Duration::from_millis(300), run).await;

    let leftovers: Vec<_> = std::fs::read_dir(temp_root.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

// ── Non-network invariants ───────────────────────────────────────────────────

#[tokio::test]
async fn test_nonexistent_input() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let config = PipelineConfig::builder("/nonexistent/file.pdf")
        .build()
        .unwrap();
    let err = convert(&config).await.unwrap_err();
    assert!(err.to_string().contains("not found"), "got: {err}");
}

#[test]
fn test_reporters_are_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopReporter>();
    assert_send_sync::<VerboseReporter>();
    assert_send_sync::<Toolchain>();
}
