//! HTTP server binary for pdf-flatten.
//!
//! ```text
//! pdf-flatten-server --port 8000
//! curl -F "file=@form.pdf;type=application/pdf" \
//!      "http://localhost:8000/flatten?dpi=200" -o form.flattened.pdf
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use pdf_flatten::server::{router, ServerConfig};
use pdf_flatten::{Dpi, FlattenConfig, FlattenService, PdfiumService};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pdf-flatten-server", version, about = "PDF flattening HTTP service")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "PDF_FLATTEN_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PDF_FLATTEN_PORT", default_value_t = 8000)]
    port: u16,

    /// DPI used when a request does not pass `?dpi=`
    #[arg(long, env = "PDF_FLATTEN_DEFAULT_DPI", default_value_t = Dpi::DEFAULT.get(),
          value_parser = clap::value_parser!(u32).range(72..=600))]
    default_dpi: u32,

    /// Largest accepted upload, in MiB
    #[arg(long, env = "PDF_FLATTEN_MAX_UPLOAD_MB", default_value_t = 100)]
    max_upload_mb: usize,

    /// Per-request flatten timeout, in seconds
    #[arg(long, env = "PDF_FLATTEN_TIMEOUT_SECS", default_value_t = 300)]
    timeout_secs: u64,

    /// Requests admitted to the flatten engine at once (default: number of CPUs)
    #[arg(long, env = "PDF_FLATTEN_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Existing pdfium library to load instead of the cached download
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_library: Option<PathBuf>,

    /// Leave annotations and form-field appearances out of page images
    #[arg(long, env = "PDF_FLATTEN_NO_ANNOTATIONS")]
    no_annotations: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "pdf_flatten=debug,tower_http=debug"
    } else {
        "pdf_flatten=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let flatten_config = FlattenConfig::builder()
        .render_annotations(!args.no_annotations)
        .build();

    // Bind pdfium before accepting traffic so the first request does not
    // pay for the download.
    let service = tokio::task::block_in_place(|| match args.pdfium_library {
        Some(ref path) => PdfiumService::start(path.clone(), flatten_config),
        None => PdfiumService::new(flatten_config),
    })
    .context("Failed to start the PDFium engine")?;
    info!("Using pdfium at {}", service.library_path().display());

    let mut config = ServerConfig {
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
        timeout: Duration::from_secs(args.timeout_secs),
        default_dpi: Dpi::new(args.default_dpi)?,
        ..ServerConfig::default()
    };
    if let Some(n) = args.max_concurrency {
        config.max_concurrency = n.max(1);
    }

    let service: Arc<dyn FlattenService> = Arc::new(service);
    let app = router(service, &config);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;
    info!(
        "pdf-flatten-server listening on http://{} (default {} DPI, {} concurrent, {}s timeout)",
        addr,
        config.default_dpi,
        config.max_concurrency,
        config.timeout.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received, draining requests");
    }
}
