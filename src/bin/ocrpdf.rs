//! CLI binary for ocrpdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, picks a progress reporter, and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use ocrpdf::config::{default_jobs, parse_languages, DEFAULT_CHUNK_SIZE, DEFAULT_DPI};
use ocrpdf::{
    convert_with, CompactReporter, MergeTool, MissingPagePolicy, NoopReporter, PipelineConfig,
    PipelineOutput, ProgressReporter, Toolchain, VerboseReporter,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Conventional exit status after SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (writes scan_ocr.pdf next to scan.pdf)
  ocrpdf scan.pdf

  # German and English, 8 parallel OCR jobs, explicit output
  ocrpdf -l deu+eng -j 8 scan.pdf -o searchable.pdf

  # Also write scan_ocr.txt and a layout-preserving scan_ocr.md
  ocrpdf --text --markdown scan.pdf

  # Fail instead of producing a document with missing pages
  ocrpdf --strict --page-timeout 120 scan.pdf

  # Keep page images and fragments for inspection
  ocrpdf --keep-temp --temp-dir ./work scan.pdf

  # Machine-readable result on stdout
  ocrpdf --json -q scan.pdf > result.json

REQUIRED TOOLS:
  pdftoppm, pdftotext   poppler-utils
  tesseract             tesseract-ocr, plus a language pack per -l code
  qpdf or pdfunite      qpdf / poppler-utils (see --merge-tool)

EXIT STATUS:
  0    success, including runs with missing-page warnings
  1    fatal error (bad input, rasterization or merge failure, every page failed)
  130  interrupted by Ctrl-C or SIGTERM

ENVIRONMENT VARIABLES:
  Every option can also be set through the OCRPDF_* variable shown next to
  it in --help. RUST_LOG overrides the log filter.
"#;

/// Make scanned PDFs searchable with parallel page OCR.
#[derive(Parser, Debug)]
#[command(
    name = "ocrpdf",
    version,
    about = "Make scanned PDFs searchable with parallel page OCR",
    long_about = "Rasterize every page of a scanned PDF, OCR the pages in parallel with \
tesseract, and merge the resulting searchable pages back into one PDF in their original \
order. Optionally also writes plain-text and layout-text exports.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Scanned PDF to process.
    input: PathBuf,

    /// Output PDF [default: <input-stem>_ocr.pdf next to the input].
    #[arg(short, long, env = "OCRPDF_OUTPUT")]
    output: Option<PathBuf>,

    /// OCR languages, joined with + (e.g. eng+deu).
    #[arg(short, long, env = "OCRPDF_LANGUAGES", default_value = "eng")]
    languages: String,

    /// Rasterization DPI (72–1200).
    #[arg(long, env = "OCRPDF_DPI", default_value_t = DEFAULT_DPI,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    dpi: u32,

    /// Number of pages OCR'd at once [default: number of CPUs].
    #[arg(short, long, env = "OCRPDF_JOBS")]
    jobs: Option<usize>,

    /// Keep page images, fragments and chunks after the run.
    #[arg(long, env = "OCRPDF_KEEP_TEMP")]
    keep_temp: bool,

    /// Parent directory for temporary files [default: system temp dir].
    #[arg(long, env = "OCRPDF_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Also write a plain-text export (<output-stem>.txt).
    #[arg(long, env = "OCRPDF_TEXT")]
    text: bool,

    /// Also write a layout-preserving text export (<output-stem>.md).
    #[arg(long, env = "OCRPDF_MARKDOWN")]
    markdown: bool,

    /// Maximum files per merge invocation.
    #[arg(long, env = "OCRPDF_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Per-page OCR timeout in seconds; a page exceeding it counts as failed.
    #[arg(long, env = "OCRPDF_PAGE_TIMEOUT")]
    page_timeout: Option<u64>,

    /// Fail instead of writing a document with missing pages.
    #[arg(long, env = "OCRPDF_STRICT")]
    strict: bool,

    /// Tool used to merge pages.
    #[arg(long, env = "OCRPDF_MERGE_TOOL", value_enum, default_value = "qpdf")]
    merge_tool: MergeToolArg,

    /// Print the result as JSON on stdout.
    #[arg(long, env = "OCRPDF_JSON")]
    json: bool,

    /// One line per page instead of a progress bar, plus DEBUG-level logs.
    #[arg(short, long, env = "OCRPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCRPDF_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MergeToolArg {
    Qpdf,
    Pdfunite,
}

impl From<MergeToolArg> for MergeTool {
    fn from(v: MergeToolArg) -> Self {
        match v {
            MergeToolArg::Qpdf => MergeTool::Qpdf,
            MergeToolArg::Pdfunite => MergeTool::Pdfunite,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = log_filter(cli.quiet, cli.verbose, cli.json);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    tokio::select! {
        result = run(&cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{} {:#}", red("error:"), e);
                ExitCode::FAILURE
            }
        },
        // Dropping `run` kills in-flight tools and removes the temp directory.
        () = shutdown_signal() => {
            eprintln!("\n{}", yellow("Interrupted."));
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = build_config(cli)?;
    let toolchain = Toolchain::default().with_merge_tool(cli.merge_tool.into());

    let reporter: Arc<dyn ProgressReporter> = match reporter_mode(&config, cli.quiet, cli.json) {
        ReporterMode::Silent => Arc::new(NoopReporter),
        ReporterMode::Verbose => Arc::new(VerboseReporter::stderr()),
        ReporterMode::Compact => Arc::new(CompactReporter::new()),
    };

    let output = convert_with(&config, &toolchain, reporter)
        .await
        .with_context(|| format!("OCR of '{}' failed", config.input_path.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }
    if !cli.quiet {
        print_summary(&output);
    }
    Ok(())
}

/// Default log filter when `RUST_LOG` is unset.
///
/// The progress bar is the only writer while it is drawn, so compact mode
/// logs errors only; failed pages and warnings appear in the summary.
fn log_filter(quiet: bool, verbose: bool, json: bool) -> &'static str {
    if verbose && !quiet {
        "debug"
    } else if quiet || !json {
        "error"
    } else {
        "warn"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReporterMode {
    Silent,
    Verbose,
    Compact,
}

fn reporter_mode(config: &PipelineConfig, quiet: bool, json: bool) -> ReporterMode {
    if quiet || json {
        ReporterMode::Silent
    } else if config.verbose {
        ReporterMode::Verbose
    } else {
        ReporterMode::Compact
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder(&cli.input)
        .languages(parse_languages(&cli.languages))
        .dpi(cli.dpi)
        .jobs(cli.jobs.unwrap_or_else(default_jobs))
        .keep_temp(cli.keep_temp)
        .verbose(cli.verbose)
        .emit_text(cli.text)
        .emit_markdown(cli.markdown)
        .chunk_size(cli.chunk_size)
        .page_timeout_secs(cli.page_timeout)
        .missing_pages(if cli.strict {
            MissingPagePolicy::Fail
        } else {
            MissingPagePolicy::Warn
        });

    if let Some(ref output) = cli.output {
        builder = builder.output_path(output);
    }
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_root(dir);
    }

    builder.build().context("Invalid configuration")
}

/// Human summary on stderr.
fn print_summary(output: &PipelineOutput) {
    let stats = &output.stats;
    let mark = if output.missing_pages.is_empty() {
        green("✔")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{}  {}/{} pages  {}ms  →  {}",
        mark,
        stats.merged_pages,
        stats.total_pages,
        stats.total_duration_ms,
        bold(&output.output_path.display().to_string()),
    );

    if !output.missing_pages.is_empty() {
        eprintln!(
            "   {}",
            yellow(&format!(
                "{} pages missing from output",
                output.missing_pages.len()
            ))
        );
        for failure in &output.failed_pages {
            eprintln!("   {}", dim(&failure.to_string()));
        }
    }
    for path in [&output.text_path, &output.layout_path].into_iter().flatten() {
        eprintln!("   {}", dim(&format!("also wrote {}", path.display())));
    }
    for warning in &output.warnings {
        eprintln!("   {} {}", yellow("warning:"), warning);
    }
    if let Some(ref dir) = output.kept_temp_dir {
        eprintln!("   {}", dim(&format!("temporary files kept in {}", dir.display())));
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
