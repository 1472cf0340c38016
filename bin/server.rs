// Catalog Merge - Web Server
// REST API over the merge engine and the session store

use anyhow::{anyhow, Result};
use catalog_merge::server::{serve, AppState};
use catalog_merge::{init_logging, open_database, AppConfig, LogConfig, LogFormat};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "catalog-merge-server", version, about = "HTTP API for merging product catalogs")]
struct Args {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (overrides config and CATALOG_MERGE_ADDR)
    #[arg(long)]
    addr: Option<String>,

    /// Session database (overrides config and CATALOG_MERGE_DB)
    #[arg(long)]
    db: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&LogConfig::from_flags(args.verbose, false).with_format(args.log_format))
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server_addr = addr;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let conn = open_database(&config.db_path)?;
    info!(db = %config.db_path.display(), "session database opened");

    serve(&config.server_addr, AppState::new(conn)).await
}
