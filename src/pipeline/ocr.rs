//! OCR worker pool: one OCR invocation per page, at most `jobs` at a time.
//!
//! Every page becomes one future; `buffer_unordered(jobs)` keeps at most
//! `jobs` of them in flight and yields them in completion order. A failing
//! page turns into a [`PageError`] and the other pages carry on. Ordering is
//! restored later by the reassembler, which sorts on [`PageFragment::index`].
//!
//! The pool runs inside the caller's future rather than on spawned tasks, so
//! dropping that future (Ctrl-C) drops every in-flight invocation, and
//! `kill_on_drop` takes the OCR processes down with it.

use crate::config::PipelineConfig;
use crate::error::PageError;
use crate::output::{PageFragment, PageImage};
use crate::pipeline::command::{run_tool, tool_command, ToolError};
use crate::progress::{ProgressEvent, ProgressSender};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An engine that turns one page image into a single-page searchable PDF.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize `image` and write a PDF next to `output_base`, returning
    /// the path written. `languages` is `+`-joined (`eng+deu`).
    async fn recognize(
        &self,
        image: &Path,
        output_base: &Path,
        languages: &str,
        dpi: u32,
    ) -> Result<PathBuf, ToolError>;
}

/// [`OcrEngine`] backed by the `tesseract` command with its `pdf` config.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    program: PathBuf,
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self::with_program("tesseract")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(
        &self,
        image: &Path,
        output_base: &Path,
        languages: &str,
        dpi: u32,
    ) -> tokio::process::Command {
        let mut cmd = tool_command(&self.program);
        cmd.arg(image)
            .arg(output_base)
            .arg("-l")
            .arg(languages)
            .arg("--dpi")
            .arg(dpi.to_string())
            .arg("pdf")
            // The pool already runs one process per core.
            .env("OMP_THREAD_LIMIT", "1");
        cmd
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(
        &self,
        image: &Path,
        output_base: &Path,
        languages: &str,
        dpi: u32,
    ) -> Result<PathBuf, ToolError> {
        run_tool(self.command(image, output_base, languages, dpi)).await?;
        Ok(output_base.with_extension("pdf"))
    }
}

/// What the pool produced: fragments in completion order, and the pages
/// that failed.
#[derive(Debug, Default)]
pub struct OcrPoolOutput {
    pub fragments: Vec<PageFragment>,
    pub failures: Vec<PageError>,
}

/// File stem of the fragment for `page`: `page-000042`.
pub fn fragment_stem(page: usize) -> String {
    format!("page-{page:06}")
}

/// OCR every page with at most `config.jobs` invocations in flight.
///
/// Sends exactly one [`ProgressEvent::PageFinished`] per page. Never fails as
/// a whole; per-page failures are returned in [`OcrPoolOutput::failures`].
pub async fn run_pool(
    engine: &dyn OcrEngine,
    pages: Vec<PageImage>,
    config: &PipelineConfig,
    fragments_dir: &Path,
    progress: &ProgressSender,
) -> OcrPoolOutput {
    let total = pages.len();
    let languages = config.language_arg();
    let languages = languages.as_str();
    debug!("OCR pool: {} pages, {} workers, languages {}", total, config.jobs, languages);

    let results: Vec<Result<PageFragment, PageError>> = stream::iter(pages)
        .map(|page| async move {
            let result = ocr_page(engine, &page, languages, config, fragments_dir).await;
            match &result {
                Ok(fragment) => debug!(page = page.index, "OCR done: {}", fragment.path.display()),
                Err(e) => debug!(page = page.index, "{}", e),
            }
            // Failures reach the user through the reporter only.
            let _ = progress.send(ProgressEvent::PageFinished {
                page: page.index,
                total,
                error: result.as_ref().err().cloned(),
            });
            result
        })
        .buffer_unordered(config.jobs)
        .collect()
        .await;

    let mut out = OcrPoolOutput::default();
    for result in results {
        match result {
            Ok(fragment) => out.fragments.push(fragment),
            Err(e) => out.failures.push(e),
        }
    }
    out.failures.sort_by_key(PageError::page);
    out
}

/// Run one work unit: image in, fragment out.
async fn ocr_page(
    engine: &dyn OcrEngine,
    page: &PageImage,
    languages: &str,
    config: &PipelineConfig,
    fragments_dir: &Path,
) -> Result<PageFragment, PageError> {
    let output_base = fragments_dir.join(fragment_stem(page.index));
    let invocation = engine.recognize(&page.path, &output_base, languages, config.dpi);

    let produced = match config.page_timeout() {
        Some(limit) => match tokio::time::timeout(limit, invocation).await {
            Ok(result) => result,
            Err(_) => {
                return Err(PageError::Timeout {
                    page: page.index,
                    secs: limit.as_secs(),
                })
            }
        },
        None => invocation.await,
    };

    let path = produced.map_err(|e| PageError::OcrFailed {
        page: page.index,
        detail: e.to_string(),
    })?;

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(PageError::MissingOutput {
            page: page.index,
            path,
        });
    }

    if !config.keep_temp {
        if let Err(e) = tokio::fs::remove_file(&page.path).await {
            debug!(page = page.index, "Could not remove page image: {}", e);
        }
    }

    Ok(PageFragment {
        index: page.index,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Writes `<base>.pdf` containing the page number, after a per-page delay.
    #[derive(Default)]
    struct FakeEngine {
        fail: HashSet<usize>,
        hang: HashSet<usize>,
        silent: HashSet<usize>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    fn page_of(image: &Path) -> usize {
        crate::pipeline::render::parse_page_number(
            image.file_name().unwrap().to_str().unwrap(),
        )
        .unwrap()
    }

    #[async_trait]
    impl OcrEngine for FakeEngine {
        async fn recognize(
            &self,
            image: &Path,
            output_base: &Path,
            _languages: &str,
            _dpi: u32,
        ) -> Result<PathBuf, ToolError> {
            let page = page_of(image);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            // Later pages finish first.
            tokio::time::sleep(Duration::from_millis(5 * (10 - page as u64 % 10))).await;
            if self.hang.contains(&page) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(&page) {
                return Err(ToolError::Failed {
                    program: "tesseract".into(),
                    code: Some(1),
                    stderr: "Error in pixReadStream".into(),
                });
            }
            let path = output_base.with_extension("pdf");
            if !self.silent.contains(&page) {
                std::fs::write(&path, format!("page {page}\n")).unwrap();
            }
            Ok(path)
        }
    }

    fn setup(n: usize) -> (tempfile::TempDir, Vec<PageImage>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pages")).unwrap();
        std::fs::create_dir(dir.path().join("fragments")).unwrap();
        let source: Arc<Path> = Arc::from(Path::new("in.pdf"));
        let pages = (1..=n)
            .map(|index| {
                let path = dir.path().join(format!("pages/page-{index}.png"));
                std::fs::write(&path, b"img").unwrap();
                PageImage {
                    index,
                    path,
                    source: Arc::clone(&source),
                }
            })
            .collect();
        (dir, pages)
    }

    fn config(jobs: usize) -> PipelineConfig {
        PipelineConfig::builder("in.pdf").jobs(jobs).build().unwrap()
    }

    #[tokio::test]
    async fn failure_is_isolated_to_its_page() {
        let (dir, pages) = setup(3);
        let engine = FakeEngine {
            fail: HashSet::from([2]),
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        let out = run_pool(&engine, pages, &config(2), &dir.path().join("fragments"), &tx).await;

        let mut ok: Vec<usize> = out.fragments.iter().map(|f| f.index).collect();
        ok.sort();
        assert_eq!(ok, [1, 3]);
        assert_eq!(out.failures.len(), 1);
        assert!(matches!(out.failures[0], PageError::OcrFailed { page: 2, .. }));

        drop(tx);
        let mut events = 0;
        while let Some(ev) = rx.recv().await {
            assert!(matches!(ev, ProgressEvent::PageFinished { total: 3, .. }));
            events += 1;
        }
        assert_eq!(events, 3);
    }

    #[derive(Clone, Default)]
    struct LogBuf(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn workers_do_not_log_page_failures_above_debug() {
        let logs = LogBuf::default();
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (dir, pages) = setup(3);
        let engine = FakeEngine {
            fail: HashSet::from([2]),
            ..Default::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let out = run_pool(&engine, pages, &config(2), &dir.path().join("fragments"), &tx).await;
        assert_eq!(out.failures.len(), 1);

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(!text.contains("pixReadStream"), "worker wrote: {text}");
    }

    #[tokio::test]
    async fn never_exceeds_job_count() {
        let (dir, pages) = setup(12);
        let engine = FakeEngine::default();
        let (tx, _rx) = mpsc::unbounded_channel();

        let out = run_pool(&engine, pages, &config(3), &dir.path().join("fragments"), &tx).await;

        assert_eq!(out.fragments.len(), 12);
        let peak = engine.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {peak}");
        assert!(peak >= 2, "pool did not run in parallel (peak {peak})");
    }

    #[tokio::test]
    async fn fragment_names_encode_padded_index() {
        let (dir, pages) = setup(2);
        let (tx, _rx) = mpsc::unbounded_channel();
        let out = run_pool(
            &FakeEngine::default(),
            pages,
            &config(1),
            &dir.path().join("fragments"),
            &tx,
        )
        .await;
        let mut names: Vec<String> = out
            .fragments
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["page-000001.pdf", "page-000002.pdf"]);
    }

    #[tokio::test]
    async fn images_removed_unless_kept() {
        let (dir, pages) = setup(2);
        let image = pages[0].path.clone();
        let (tx, _rx) = mpsc::unbounded_channel();
        run_pool(&FakeEngine::default(), pages, &config(2), &dir.path().join("fragments"), &tx)
            .await;
        assert!(!image.exists());

        let (dir, pages) = setup(2);
        let image = pages[0].path.clone();
        let keep = PipelineConfig::builder("in.pdf")
            .jobs(2)
            .keep_temp(true)
            .build()
            .unwrap();
        run_pool(&FakeEngine::default(), pages, &keep, &dir.path().join("fragments"), &tx).await;
        assert!(image.exists());
    }

    #[tokio::test]
    async fn missing_fragment_is_a_page_failure() {
        let (dir, pages) = setup(2);
        let engine = FakeEngine {
            silent: HashSet::from([1]),
            ..Default::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let out = run_pool(&engine, pages, &config(2), &dir.path().join("fragments"), &tx).await;
        assert_eq!(out.fragments.len(), 1);
        assert!(matches!(out.failures[0], PageError::MissingOutput { page: 1, .. }));
    }

    #[tokio::test]
    async fn hung_page_times_out() {
        let (dir, pages) = setup(3);
        let engine = FakeEngine {
            hang: HashSet::from([3]),
            ..Default::default()
        };
        let cfg = PipelineConfig::builder("in.pdf")
            .jobs(3)
            .page_timeout_secs(Some(1))
            .build()
            .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let out = run_pool(&engine, pages, &cfg, &dir.path().join("fragments"), &tx).await;
        assert_eq!(out.fragments.len(), 2);
        assert_eq!(out.failures, [PageError::Timeout { page: 3, secs: 1 }]);
    }

    #[test]
    fn tesseract_arguments() {
        let engine = TesseractEngine::with_program("tesseract");
        let cmd = engine.command(
            Path::new("/w/pages/page-01.png"),
            Path::new("/w/fragments/page-000001"),
            "eng+fra",
            300,
        );
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "/w/pages/page-01.png",
                "/w/fragments/page-000001",
                "-l",
                "eng+fra",
                "--dpi",
                "300",
                "pdf"
            ]
        );
    }
}
