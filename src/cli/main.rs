//! Background removal web server
//!
//! Parses arguments, installs tracing, loads the model once and serves the
//! upload form until interrupted.

use super::config::CliConfigBuilder;
use crate::{
    processor::SegmentationPipeline,
    server,
    services::ImageIOService,
    tracing_config::{init_server_tracing, spans, TracingFormat},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};

/// Background removal web server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(name = "noback-server")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Interface to bind
    #[arg(long, env = "NOBACK_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "NOBACK_PORT", default_value_t = crate::config::DEFAULT_PORT)]
    pub port: u16,

    /// Path to the segmentation model (ONNX export of the trained network)
    #[arg(short, long, env = "NOBACK_MODEL", default_value = "back_removal.onnx")]
    pub model: PathBuf,

    /// Execution provider in format backend:provider (e.g., tract:cpu, onnx:auto, onnx:cuda)
    #[arg(short, long, env = "NOBACK_EXECUTION_PROVIDER", default_value = "tract:cpu")]
    pub execution_provider: String,

    /// Directory the upload is saved into
    #[arg(long, env = "NOBACK_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Directory the result is written into
    #[arg(long, env = "NOBACK_OUTPUT_DIR", default_value = "NoBackImages")]
    pub output_dir: PathBuf,

    /// Probability above which a pixel counts as foreground (0.0-1.0)
    #[arg(long, env = "NOBACK_THRESHOLD", default_value_t = 0.5)]
    pub threshold: f32,

    /// Multiplier applied to 0-255 pixel values before inference
    #[arg(long, env = "NOBACK_PIXEL_SCALE", default_value_t = 1.0)]
    pub pixel_scale: f32,

    /// JPEG quality of the result (1-100)
    #[arg(long, env = "NOBACK_JPEG_QUALITY", default_value_t = 90)]
    pub jpeg_quality: u8,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, env = "NOBACK_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// Maximum upload size in bytes
    #[arg(long, env = "NOBACK_MAX_UPLOAD_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Create the upload and output directories at startup
    #[arg(long, env = "NOBACK_CREATE_DIRS")]
    pub create_dirs: bool,

    /// Debug mode: debug-level logs plus per-request tensor shapes and mask statistics
    #[arg(long, env = "NOBACK_DEBUG")]
    pub debug: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log filter directives, e.g. "noback=debug,tower_http=info" (overrides -v)
    #[arg(long, env = "NOBACK_LOG")]
    pub log_filter: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

/// Parse the command line and run the server
///
/// # Errors
/// - See [`run`]
pub async fn main() -> Result<()> {
    run(Cli::parse()).await
}

/// Run the server with already-parsed arguments
///
/// # Errors
/// - Invalid arguments or configuration
/// - Model missing or failing to load (the port is never bound)
/// - Bind or server I/O failures
pub async fn run(cli: Cli) -> Result<()> {
    init_server_tracing(
        cli.verbose,
        cli.debug,
        cli.log_filter.as_deref(),
        cli.log_format.into(),
    )
    .context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;

    info!(
        backend = %config.backend_type,
        provider = %config.execution_provider,
        model = %config.model_path.display(),
        "Starting background removal server"
    );

    if config.create_dirs {
        ImageIOService::ensure_dirs(&[&config.upload_dir, &config.output_dir])
            .context("Failed to create working directories")?;
    } else {
        for dir in [&config.upload_dir, &config.output_dir] {
            if !dir.is_dir() {
                warn!(
                    directory = %dir.display(),
                    "Directory does not exist; uploads will fail until it is created (or pass --create-dirs)"
                );
            }
        }
    }

    let pipeline = {
        let _span = spans::model_loading(&config.model_path, &config.backend_type.to_string())
            .entered();
        SegmentationPipeline::from_config(config.clone()).with_context(|| {
            format!(
                "Failed to load segmentation model from {}",
                config.model_path.display()
            )
        })?
    };

    server::serve(pipeline).await.context("Server error")?;
    Ok(())
}

fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    println!("\n🚀 Execution Providers:");
    for provider_info in ExecutionProviderManager::list_all_providers() {
        let status = if provider_info.available {
            "✅ Available"
        } else {
            "❌ Not Available"
        };
        println!(
            "  • {}: {} - {}",
            provider_info.name, status, provider_info.description
        );
    }

    println!("\n💡 Usage Examples:");
    println!("  --execution-provider tract:cpu    # Pure Rust Tract backend (default)");
    println!("  --execution-provider onnx:auto    # Auto-select best ONNX provider");
    println!("  --execution-provider onnx:cuda    # Use NVIDIA CUDA");
    println!("  --execution-provider onnx:coreml  # Use Apple CoreML (macOS)");
}
