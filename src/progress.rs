//! Progress reporting for a pipeline run.
//!
//! OCR workers never touch the terminal. Each one sends a [`ProgressEvent`]
//! into an unbounded channel, and a single consumer task owned by
//! [`ProgressChannel`] forwards those events to a [`ProgressReporter`]. With
//! one writer there is no interleaving of half-drawn lines, and the completed
//! count is a plain local instead of a shared counter.
//!
//! # Example
//!
//! ```rust
//! use ocrpdf::{PageError, ProgressReporter};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountFailures(AtomicUsize);
//!
//! impl ProgressReporter for CountFailures {
//!     fn on_page_finished(&self, _page: usize, _done: usize, _total: usize, error: Option<&PageError>) {
//!         if error.is_some() {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//! }
//! ```

use crate::error::PageError;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One observation emitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Rasterization finished; `total` pages are about to be OCR'd.
    RunStarted { total: usize },
    /// One page finished OCR, successfully when `error` is `None`.
    PageFinished {
        page: usize,
        total: usize,
        error: Option<PageError>,
    },
    /// Every page has been attempted.
    RunFinished { total: usize, succeeded: usize },
}

/// Sending half handed to OCR workers.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Receives pipeline progress.
///
/// All methods default to no-ops. They are called from one task only, in the
/// order the events were sent; page events arrive in completion order, not
/// page order.
pub trait ProgressReporter: Send + Sync {
    /// Called once before the first page event.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called once per page. `completed` counts this page.
    fn on_page_finished(
        &self,
        page: usize,
        completed: usize,
        total_pages: usize,
        error: Option<&PageError>,
    ) {
        let _ = (page, completed, total_pages, error);
    }

    /// Called once after the last page event.
    fn on_run_complete(&self, total_pages: usize, succeeded: usize) {
        let _ = (total_pages, succeeded);
    }
}

/// Reporter that ignores everything. The default for library callers.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {}

/// One line per page naming the page and whether it passed.
pub struct VerboseReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl VerboseReporter {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    fn line(&self, text: &str) {
        if let Ok(mut out) = self.out.lock() {
            // A closed stderr is not worth failing a run over.
            let _ = writeln!(out, "{text}");
        }
    }
}

impl ProgressReporter for VerboseReporter {
    fn on_run_start(&self, total_pages: usize) {
        self.line(&format!("Running OCR on {total_pages} pages"));
    }

    fn on_page_finished(
        &self,
        page: usize,
        completed: usize,
        total_pages: usize,
        error: Option<&PageError>,
    ) {
        let width = total_pages.to_string().len();
        let line = match error {
            None => format!("[{completed:>width$}/{total_pages}] page {page}: ok"),
            Some(e) => format!("[{completed:>width$}/{total_pages}] page {page}: FAILED ({e})"),
        };
        self.line(&line);
    }

    fn on_run_complete(&self, total_pages: usize, succeeded: usize) {
        self.line(&format!("OCR finished: {succeeded}/{total_pages} pages succeeded"));
    }
}

/// Live single-line indicator: `(completed/total)` plus a percentage.
#[cfg(feature = "cli")]
pub struct CompactReporter {
    bar: indicatif::ProgressBar,
}

#[cfg(feature = "cli")]
impl CompactReporter {
    /// Indicator drawn on stderr.
    pub fn new() -> Self {
        Self::with_bar(indicatif::ProgressBar::new(0))
    }

    /// Indicator that never draws. Used in tests and for non-terminals.
    pub fn hidden() -> Self {
        Self::with_bar(indicatif::ProgressBar::hidden())
    }

    fn with_bar(bar: indicatif::ProgressBar) -> Self {
        let style = indicatif::ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] ({pos}/{len}) {percent:>3}%  {elapsed_precise}",
        )
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("OCR");
        Self { bar }
    }

    /// Pages counted so far.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

#[cfg(feature = "cli")]
impl Default for CompactReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "cli")]
impl ProgressReporter for CompactReporter {
    fn on_run_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.reset_eta();
        self.bar
            .enable_steady_tick(std::time::Duration::from_millis(100));
    }

    fn on_page_finished(
        &self,
        page: usize,
        completed: usize,
        _total_pages: usize,
        error: Option<&PageError>,
    ) {
        if let Some(e) = error {
            // Printed above the bar so it stays a single live line.
            self.bar.println(format!("page {page}: FAILED ({e})"));
        }
        self.bar.set_position(completed as u64);
    }

    fn on_run_complete(&self, _total_pages: usize, _succeeded: usize) {
        self.bar.finish_and_clear();
    }
}

/// The event channel plus the task that drains it into a reporter.
pub struct ProgressChannel {
    tx: ProgressSender,
    task: JoinHandle<usize>,
}

impl ProgressChannel {
    /// Start the consumer task. Must be called inside a Tokio runtime.
    pub fn spawn(reporter: Arc<dyn ProgressReporter>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let task = tokio::spawn(async move {
            let mut completed = 0usize;
            while let Some(event) = rx.recv().await {
                match event {
                    ProgressEvent::RunStarted { total } => reporter.on_run_start(total),
                    ProgressEvent::PageFinished { page, total, error } => {
                        completed += 1;
                        reporter.on_page_finished(page, completed, total, error.as_ref());
                    }
                    ProgressEvent::RunFinished { total, succeeded } => {
                        reporter.on_run_complete(total, succeeded)
                    }
                }
            }
            completed
        });
        Self { tx, task }
    }

    /// A sender for workers. Events sent after the channel closes are dropped.
    pub fn sender(&self) -> ProgressSender {
        self.tx.clone()
    }

    /// Close the channel once every other sender is gone, wait for the
    /// consumer to drain it, and return the number of page events seen.
    pub async fn close(self) -> usize {
        drop(self.tx);
        self.task.await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recording {
        lines: Mutex<Vec<String>>,
    }

    impl ProgressReporter for Recording {
        fn on_run_start(&self, total_pages: usize) {
            self.lines.lock().unwrap().push(format!("start {total_pages}"));
        }

        fn on_page_finished(
            &self,
            page: usize,
            completed: usize,
            total_pages: usize,
            error: Option<&PageError>,
        ) {
            let status = if error.is_some() { "fail" } else { "ok" };
            self.lines
                .lock()
                .unwrap()
                .push(format!("page {page} {completed}/{total_pages} {status}"));
        }

        fn on_run_complete(&self, total_pages: usize, succeeded: usize) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("done {succeeded}/{total_pages}"));
        }
    }

    /// `Write` sink whose contents can be inspected after the reporter took it.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn consumer_counts_completions_in_arrival_order() {
        let recording = Arc::new(Recording::default());
        let channel = ProgressChannel::spawn(recording.clone());
        let tx = channel.sender();

        tx.send(ProgressEvent::RunStarted { total: 3 }).unwrap();
        tx.send(ProgressEvent::PageFinished {
            page: 3,
            total: 3,
            error: None,
        })
        .unwrap();
        tx.send(ProgressEvent::PageFinished {
            page: 1,
            total: 3,
            error: Some(PageError::Timeout { page: 1, secs: 5 }),
        })
        .unwrap();
        tx.send(ProgressEvent::PageFinished {
            page: 2,
            total: 3,
            error: None,
        })
        .unwrap();
        tx.send(ProgressEvent::RunFinished {
            total: 3,
            succeeded: 2,
        })
        .unwrap();
        drop(tx);

        assert_eq!(channel.close().await, 3);
        let lines = recording.lines.lock().unwrap().clone();
        assert_eq!(
            lines,
            [
                "start 3",
                "page 3 1/3 ok",
                "page 1 2/3 fail",
                "page 2 3/3 ok",
                "done 2/3"
            ]
        );
    }

    #[tokio::test]
    async fn noop_reporter_accepts_everything() {
        let channel = ProgressChannel::spawn(Arc::new(NoopReporter));
        channel
            .sender()
            .send(ProgressEvent::PageFinished {
                page: 1,
                total: 1,
                error: None,
            })
            .unwrap();
        assert_eq!(channel.close().await, 1);
    }

    #[test]
    fn verbose_lines_name_page_and_status() {
        let buf = SharedBuf::default();
        let reporter = VerboseReporter::new(buf.clone());
        reporter.on_run_start(12);
        reporter.on_page_finished(7, 1, 12, None);
        let err = PageError::OcrFailed {
            page: 2,
            detail: "tesseract failed with exit code 1".into(),
        };
        reporter.on_page_finished(2, 2, 12, Some(&err));
        reporter.on_run_complete(12, 11);

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Running OCR on 12 pages");
        assert_eq!(lines[1], "[ 1/12] page 7: ok");
        assert!(lines[2].starts_with("[ 2/12] page 2: FAILED"), "got: {}", lines[2]);
        assert!(lines[2].contains("exit code 1"));
        assert_eq!(lines[3], "OCR finished: 11/12 pages succeeded");
    }

    #[cfg(feature = "cli")]
    #[test]
    fn compact_reporter_tracks_position() {
        let reporter = CompactReporter::hidden();
        reporter.on_run_start(4);
        reporter.on_page_finished(2, 1, 4, None);
        let err = PageError::Timeout { page: 1, secs: 5 };
        reporter.on_page_finished(1, 2, 4, Some(&err));
        assert_eq!(reporter.position(), 2);
        reporter.on_run_complete(4, 4);
    }

    #[test]
    fn arc_dyn_reporter_works() {
        struct Counter(AtomicUsize);
        impl ProgressReporter for Counter {
            fn on_page_finished(&self, _: usize, _: usize, _: usize, _: Option<&PageError>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let reporter: Arc<dyn ProgressReporter> = counter.clone();
        reporter.on_run_start(2);
        reporter.on_page_finished(1, 1, 2, None);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
