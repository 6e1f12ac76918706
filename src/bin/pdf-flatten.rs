//! CLI binary for pdf-flatten.
//!
//! Reads a local PDF or URL, flattens it and writes `<name>.flattened.pdf`
//! next to the input (or wherever `-o` says).

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_flatten::files::{default_output_path, read_input, write_output};
use pdf_flatten::{
    Dpi, FlattenConfig, FlattenProgress, FlattenStats, Flattener, PdfiumBackend, ProgressCallback,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while the document opens, then a page bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(SPINNER),
        );
        bar.set_prefix("Opening");
        bar.set_message("Parsing PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl FlattenProgress for CliProgress {
    fn on_document_loaded(&self, total_pages: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(SPINNER),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_prefix("Flattening");
        self.bar.set_message("");
    }

    fn on_page_flattened(&self, page_num: usize, total_pages: usize, width_px: u32, height_px: u32) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{width_px}×{height_px} px")),
        ));
        self.bar.inc(1);
    }

    fn on_complete(&self, _total_pages: usize, _output_bytes: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Flatten next to the input (form.pdf → form.flattened.pdf)
  pdf-flatten form.pdf

  # Higher resolution, explicit output
  pdf-flatten --dpi 300 scan.pdf -o archive/scan.pdf

  # Flatten a remote document
  pdf-flatten https://example.com/contract.pdf

  # Machine-readable run statistics
  pdf-flatten --json form.pdf

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH    Path to an existing libpdfium; skips auto-download
  PDFIUM_CACHE_DIR   Override the default pdfium cache directory

  PDFium (~30 MB) is downloaded automatically on first run and cached in
  ~/.cache/pdf-flatten/pdfium-<release>/.
"#;

/// Flatten PDF files by rasterising every page.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-flatten",
    version,
    about = "Flatten PDF files by rasterising every page into an image",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output path. Defaults to `<name>.flattened.pdf` beside the input.
    #[arg(short, long, env = "PDF_FLATTEN_OUTPUT")]
    output: Option<PathBuf>,

    /// Rasterisation DPI (72–600).
    #[arg(long, env = "PDF_FLATTEN_DPI", default_value_t = Dpi::DEFAULT.get(),
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Leave annotations and form-field appearances out of the page images.
    #[arg(long)]
    no_annotations: bool,

    /// Print run statistics as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF_FLATTEN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_FLATTEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF_FLATTEN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let dpi = Dpi::new(cli.dpi)?;
    let library = ensure_engine(cli.quiet)?;

    // ── Read input ───────────────────────────────────────────────────────
    let input = read_input(&cli.input, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to read '{}'", cli.input))?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input, input.file_name.as_deref()));

    // ── Flatten ──────────────────────────────────────────────────────────
    let mut builder = FlattenConfig::builder().render_annotations(!cli.no_annotations);
    if show_progress {
        builder = builder.progress_callback(CliProgress::new() as ProgressCallback);
    }
    let config = builder.build();

    let bytes = input.bytes;
    let output = tokio::task::spawn_blocking(move || {
        let backend = PdfiumBackend::bind_from_path(&library)?;
        Flattener::with_config(backend, config).run(&bytes, dpi)
    })
    .await
    .context("Flatten task panicked")?
    .context("Flatten failed")?;

    write_output(&output_path, &output.pdf)?;

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output.stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        print_summary(&output.stats, &output_path);
    }

    Ok(())
}

/// Make sure pdfium is on disk, showing a download bar on first run.
fn ensure_engine(quiet: bool) -> Result<PathBuf> {
    if quiet || pdfium_provision::is_cached() {
        return tokio::task::block_in_place(|| pdfium_provision::ensure_library(None))
            .context("Failed to locate PDFium engine");
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER),
    );
    bar.set_prefix("PDF engine");
    bar.enable_steady_tick(Duration::from_millis(80));

    let report = |downloaded: u64, total: Option<u64>| {
        if let Some(t) = total {
            if bar.length() != Some(t) {
                bar.set_length(t);
            }
        }
        bar.set_position(downloaded);
    };
    let library = tokio::task::block_in_place(|| pdfium_provision::ensure_library(Some(&report)))
        .context("Failed to download PDFium engine")?;

    bar.finish_with_message("ready ✓");
    Ok(library)
}

fn print_summary(stats: &FlattenStats, output_path: &std::path::Path) {
    eprintln!(
        "{}  {} pages at {} DPI  {}ms  →  {}",
        green("✔"),
        stats.page_count,
        stats.dpi,
        stats.total_duration_ms,
        bold(&output_path.display().to_string()),
    );
    eprintln!(
        "   {} in  /  {} out",
        dim(&format!("{} bytes", stats.input_bytes)),
        dim(&format!("{} bytes", stats.output_bytes)),
    );
}
