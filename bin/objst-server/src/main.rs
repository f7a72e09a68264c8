//! objst server
//!
//! Opens one bucket and serves it over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use objst::Bucket;
use objst_common::Config;
use objst_http::auth::HeaderAuthenticator;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "objst-server")]
#[command(about = "Embedded object store served over HTTP")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/objst/objst.toml")]
    config: String,

    /// Listen address
    #[arg(short, long, env = "OBJST_LISTEN")]
    listen: Option<String>,

    /// Base directory of the bucket stores
    #[arg(long, env = "OBJST_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Disable background compaction
    #[arg(long)]
    no_maintenance: bool,
}

fn load_config(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        return Ok(Config::default());
    }
    let config_str =
        std::fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
    toml::from_str(&config_str).with_context(|| format!("parsing config file {path}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(&args.config)?;

    // CLI overrides config file
    if let Some(listen) = &args.listen {
        config.http.listen = listen
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid listen address {listen}"))?;
    }
    if let Some(data_dir) = args.data_dir {
        config.bucket.data_dir = data_dir;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.no_maintenance {
        config.bucket.maintenance.enabled = false;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting objst server");
    info!("Config file: {}", args.config);
    info!("Data directory: {:?}", config.bucket.data_dir);
    info!(
        "Max upload size: {} MB",
        config.http.max_upload_size / 1024 / 1024
    );
    if config.bucket.maintenance.enabled {
        info!(
            "Compaction every {:?} (discard ratio {})",
            config.bucket.maintenance.interval(),
            config.bucket.maintenance.discard_ratio
        );
    } else {
        info!("Background compaction is DISABLED");
    }

    let bucket = Arc::new(Bucket::open(config.bucket.clone()).context("opening bucket")?);
    let auth = Arc::new(
        HeaderAuthenticator::new(&config.http.owner_header)
            .map_err(|e| anyhow::anyhow!(e.message))?,
    );
    let app = objst_http::router(Arc::clone(&bucket), &config.http, auth);

    info!("Listening on {}", config.http.listen);
    let listener = TcpListener::bind(config.http.listen).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    match Arc::try_unwrap(bucket) {
        Ok(bucket) => bucket.close(),
        Err(_) => info!("Bucket still referenced, closing on drop"),
    }
    info!("Server shut down gracefully");

    Ok(())
}
