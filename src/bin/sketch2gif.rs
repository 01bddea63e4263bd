//! Server binary for sketch2gif.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServiceConfig`, runs the startup checks, and serves.

use anyhow::{bail, Context, Result};
use clap::Parser;
use sketch2gif::{
    app_router, AppState, ArtifactStore, ProcessToolRunner, S3ArtifactStore, ServiceConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sketch2gif",
    version,
    about = "HTTP service converting still drawings into animated GIFs"
)]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// S3 bucket receiving published GIFs.
    #[arg(long, env = "S3_BUCKET_NAME")]
    bucket: String,

    /// Public base URL artifacts are served from. Defaults to the bucket's
    /// virtual-hosted S3 address.
    #[arg(long, env = "S3_PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// Base directory for per-job output; also the conversion tool's
    /// working directory.
    #[arg(long, env = "DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Interpreter used to launch the conversion scripts.
    #[arg(long, env = "PYTHON_BIN", default_value = "python")]
    python_bin: String,

    /// Conversion script for plain image input, relative to the data dir.
    #[arg(long, default_value = "image_to_animation.py")]
    animate_script: PathBuf,

    /// Conversion script used when a skeleton descriptor is supplied.
    #[arg(long, default_value = "image_to_animation_custom.py")]
    skeleton_script: PathBuf,

    /// Wall-clock budget for one tool invocation, in seconds.
    #[arg(long, env = "TOOL_DEADLINE_SECS", default_value_t = 300)]
    tool_deadline_secs: u64,

    /// Bound on the store upload, in seconds.
    #[arg(long, env = "UPLOAD_TIMEOUT_SECS", default_value_t = 120)]
    upload_timeout_secs: u64,

    /// Default log filter when RUST_LOG is unset, e.g. "info" or
    /// "sketch2gif=debug".
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)),
        )
        .with_target(false)
        .init();

    let mut builder = ServiceConfig::builder()
        .bucket(cli.bucket.as_str())
        .data_dir(&cli.data_dir)
        .python_bin(cli.python_bin.as_str())
        .animate_script(&cli.animate_script)
        .skeleton_script(&cli.skeleton_script)
        .tool_deadline_secs(cli.tool_deadline_secs)
        .upload_timeout_secs(cli.upload_timeout_secs);
    if let Some(ref url) = cli.public_base_url {
        builder = builder.public_base_url(url.as_str());
    }
    let config = builder.build().context("invalid configuration")?;

    // Fail fast: the conversion scripts are the whole point of the service.
    for script in [&config.animate_script, &config.skeleton_script] {
        let path = config.script_path(script);
        if !path.is_file() {
            bail!("conversion script not found: {}", path.display());
        }
    }

    // One bucket reachability check at startup, never per request.
    let store = S3ArtifactStore::connect(config.bucket.clone(), config.public_base_url.clone())
        .await;
    store
        .health_check()
        .await
        .context("S3 bucket access error")?;
    info!(bucket = %config.bucket, "object store reachable");

    let state = AppState {
        config: Arc::new(config),
        runner: Arc::new(ProcessToolRunner),
        store: Arc::new(store),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
