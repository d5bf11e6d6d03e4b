//! GIF frame converter and ESP32 frame server.
//!
//! Two subcommands that share one directory of JPEG frames:
//! - `convert`: every GIF in `--source-dir` → `<name>-NNNN.jpg` in `--output-dir`
//! - `serve`: HTTP server handing those frames out round-robin
//!
//! ## Usage
//! ```sh
//! gif-frame-server convert --clear-existing yes
//! gif-frame-server serve --port 8000
//! curl http://localhost:8000/next -o frame.jpg
//! ```

use clap::{Args, Parser, Subcommand};
use gif_frame_server::cache::{DirFrameSource, FrameServer};
use gif_frame_server::convert::{self, ClearPolicy, ConvertOptions};
use gif_frame_server::server::{self, AppState, StreamSettings, WireMode};
use gif_frame_server::{
    DEFAULT_JPEG_QUALITY, DEFAULT_OUTPUT_DIR, DEFAULT_SOURCE_DIR, FRAME_EXTENSION, FrameSize,
    setup_signal_handler,
};
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Convert animated GIFs to display-sized JPEG frames and serve them to an ESP32
#[derive(Parser)]
#[command(name = "gif-frame-server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, fit and crop every GIF frame into the output directory
    Convert(ConvertArgs),
    /// Serve the prepared frames over HTTP
    Serve(ServeArgs),
}

#[derive(Args)]
struct SizeArgs {
    /// Target frame width in pixels
    #[arg(long, default_value_t = 240)]
    width: u32,

    /// Target frame height in pixels
    #[arg(long, default_value_t = 320)]
    height: u32,
}

#[derive(Args)]
struct ConvertArgs {
    /// Directory containing the source .gif files
    #[arg(long, default_value = DEFAULT_SOURCE_DIR)]
    source_dir: PathBuf,

    /// Directory the JPEG frames are written to
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// What to do with files already in the output directory
    #[arg(long, value_enum, default_value = "prompt")]
    clear_existing: ClearPolicy,

    #[command(flatten)]
    size: SizeArgs,
}

#[derive(Args)]
struct ServeArgs {
    /// Directory holding the JPEG frames
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Wire format of /next and /stream
    #[arg(long, value_enum, default_value = "mjpeg")]
    mode: WireMode,

    /// Upper bound on frames per second for /stream (unlimited when unset)
    #[arg(long)]
    max_fps: Option<u32>,

    /// Milliseconds to wait before retrying when no frame is available
    #[arg(long, default_value_t = 1000)]
    idle_wait_ms: u64,

    /// Seconds a stalled client may block a frame write before it is dropped
    #[arg(long, default_value_t = 10)]
    write_timeout_secs: u64,

    #[command(flatten)]
    size: SizeArgs,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Convert(args) => run_convert(args),
        Command::Serve(args) => run_serve(args),
    }
}

fn run_convert(args: ConvertArgs) -> Result<(), Box<dyn Error>> {
    let options = ConvertOptions {
        source_dir: args.source_dir,
        output_dir: args.output_dir,
        size: FrameSize::new(args.size.width, args.size.height),
        quality: args.quality,
    };

    let running = setup_signal_handler()?;

    let confirm = |count| {
        convert::ask_to_clear(&mut io::stdin().lock(), &mut io::stdout(), &options.output_dir, count)
            .unwrap_or_else(|e| {
                tracing::warn!("Could not read answer, keeping files: {}", e);
                false
            })
    };

    let report = convert::run_conversion(&options, args.clear_existing, confirm, &running)?;

    if report.failed_sources() > 0 {
        tracing::warn!("{} source(s) had errors", report.failed_sources());
    }
    if report.total_frames() > 0 {
        tracing::info!(
            "Now run: gif-frame-server serve --output-dir {}",
            options.output_dir.display()
        );
    }

    Ok(())
}

#[tokio::main]
async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn Error>> {
    let size = FrameSize::new(args.size.width, args.size.height);

    if !args.output_dir.exists() {
        std::fs::create_dir_all(&args.output_dir)?;
        tracing::info!(
            "Created {}/. Add JPEG files or run `convert` first.",
            args.output_dir.display()
        );
    }

    let frames = FrameServer::new(DirFrameSource::new(&args.output_dir, FRAME_EXTENSION));
    if frames.reload() == 0 {
        tracing::info!(
            "No .{} files in {}/. Run `convert` first.",
            FRAME_EXTENSION,
            frames.describe_source()
        );
    }
    tracing::info!("Frames: {} ({})", frames.describe_source(), size);

    let stream = StreamSettings {
        idle_wait: Duration::from_millis(args.idle_wait_ms),
        write_timeout: Duration::from_secs(args.write_timeout_secs),
        min_frame_interval: args
            .max_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / fps as f64)),
    };

    let (shutdown_tx, shutdown) = tokio::sync::watch::channel(false);

    let app_state = AppState {
        frames: Arc::new(frames),
        mode: args.mode,
        size,
        stream,
        shutdown,
    };
    let app = server::create_router(app_state);

    tracing::info!("GIF Frame Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Mode: {:?}", args.mode);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Try: curl http://localhost:{}/count", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    tracing::info!("Server stopped.");
    Ok(())
}
