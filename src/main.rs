//! Lifesheet daemon
//!
//! Serves the planning-sheet API behind an auth proxy.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! lifesheet
//!
//! # Start with custom config
//! lifesheet --config /path/to/config.toml
//!
//! # Custom port and data directory
//! lifesheet --http-port 8096 --storage-dir /data/lifesheet
//! ```

use anyhow::Context;
use clap::Parser;
use lifesheet::identity::{GuestCookie, IdentityResolver, TrustedHeaderProvider};
use lifesheet::services::spawn_logging_listener;
use lifesheet::{Config, HttpServer, Services, SheetDb, SheetStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lifesheet")]
#[command(about = "Life-planning PDCA sheet service")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "LIFESHEET_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the database and default config
    #[arg(long, env = "LIFESHEET_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    #[arg(long, env = "LIFESHEET_HTTP_PORT")]
    http_port: Option<u16>,

    #[arg(long, env = "LIFESHEET_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// Header carrying the authenticated user id
    #[arg(long, env = "LIFESHEET_AUTH_HEADER")]
    auth_header: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lifesheet=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(addr) = args.bind_address {
        config.bind_address = addr;
    }
    if let Some(header) = args.auth_header {
        config.auth_header = header;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        "Starting lifesheet"
    );

    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .context("creating storage directory")?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(SheetDb::open(&config.storage_dir).context("opening sheet database")?);
    let stats = db.stats()?;
    info!(
        sheets = stats.sheet_count,
        owners = stats.owner_count,
        "Sheet database ready"
    );

    let services = Arc::new(Services::new(db.clone()));
    let _listener = spawn_logging_listener(services.events.clone());

    let provider = TrustedHeaderProvider::new(&config.auth_header)?;
    let cookie = GuestCookie {
        name: config.guest_cookie_name.clone(),
        max_age_secs: config.guest_cookie_max_age_secs,
    };
    let identity = Arc::new(IdentityResolver::new(Box::new(provider), cookie));

    let http_server = Arc::new(HttpServer::new(services, identity, config.listen_addr()?));

    info!(auth_header = %config.auth_header, "Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    if let Ok(stats) = db.stats() {
        info!(
            sheets = stats.sheet_count,
            cells = stats.cell_count,
            "Final sheet stats"
        );
    }

    Ok(())
}
