use anyhow::{anyhow, Context, Result};
use catalog_merge::{
    clear_session, get_file, init_logging, load_dataset, load_merged, open_database, save_file,
    save_merged, write_records, AppConfig, Dataset, ExportFormat, FileSlot, LogConfig, LogFormat,
    MergeEngine, Record, SourceKind, StoredFile,
};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(name = "catalog-merge", version, about = "Merge DE, Product and Barcode catalog sheets by SKU")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Session database (overrides config and CATALOG_MERGE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge the three sources and write the result
    Merge(MergeArgs),
    /// Browse sources and merged rows in the terminal
    Preview(PreviewArgs),
    /// Inspect or clear the stored session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Debug, Args)]
struct MergeArgs {
    /// DE sheet (csv, xls, xlsx)
    #[arg(long)]
    de: PathBuf,

    /// Product information sheet
    #[arg(long)]
    product: PathBuf,

    /// Barcode sheet
    #[arg(long)]
    barcode: Option<PathBuf>,

    /// Output file (default: merged_data.<format> in the configured output dir)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// csv or xlsx (default: from --out, then config)
    #[arg(short, long)]
    format: Option<ExportFormat>,

    /// Keep the inputs and the result in the session database
    #[arg(long)]
    save: bool,
}

#[derive(Debug, Args)]
struct PreviewArgs {
    #[arg(long)]
    de: Option<PathBuf>,

    #[arg(long)]
    product: Option<PathBuf>,

    #[arg(long)]
    barcode: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum SessionAction {
    /// List stored files
    Show,
    /// Forget every stored file
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_flags(cli.verbose, cli.quiet)
        .with_format(cli.log_format)
        .with_ansi(std::io::stderr().is_terminal());
    init_logging(&log_config).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    debug!(?config, "configuration loaded");

    match cli.command {
        Command::Merge(args) => run_merge(&config, args),
        Command::Preview(args) => run_preview_mode(&config, args),
        Command::Session { action } => run_session(&config, action),
    }
}

// ============================================================================
// merge
// ============================================================================

fn load(kind: SourceKind, path: &Path) -> Result<Dataset> {
    let dataset = load_dataset(path).with_context(|| format!("Failed to load {} file", kind.name()))?;
    println!("✓ {}: {}", kind.name(), dataset.summary());
    Ok(dataset)
}

fn resolve_format(config: &AppConfig, args: &MergeArgs) -> ExportFormat {
    args.format
        .or_else(|| args.out.as_deref().and_then(ExportFormat::from_path))
        .unwrap_or(config.default_format)
}

fn run_merge(config: &AppConfig, args: MergeArgs) -> Result<()> {
    println!("🔀 Catalog Merge");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading files...");
    let de = load(SourceKind::De, &args.de)?;
    let product = load(SourceKind::Product, &args.product)?;
    let barcode = args
        .barcode
        .as_deref()
        .map(|path| load(SourceKind::Barcode, path))
        .transpose()?;

    println!("\n⚙️  Merging...");
    let barcode_rows = barcode.as_ref().map_or(&[][..], |d| d.records.as_slice());
    let report = MergeEngine::new().merge(&de.records, &product.records, barcode_rows);
    println!("✓ {}", report.summary());

    let format = resolve_format(config, &args);
    let out = args.out.clone().unwrap_or_else(|| config.default_output(format));
    write_records(&report.records, &out, format)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("\n💾 Wrote {} rows to {}", report.records.len(), out.display());

    if args.save {
        let conn = open_database(&config.db_path)?;
        let datasets = [Some(&de), Some(&product), barcode.as_ref()];
        for (kind, dataset) in SourceKind::ALL.into_iter().zip(datasets) {
            if let Some(dataset) = dataset {
                save_file(&conn, &StoredFile::from_dataset(FileSlot::from(kind), dataset))?;
            }
        }
        save_merged(&conn, &report.records)?;
        println!("✓ Session saved to {}", config.db_path.display());
    }

    Ok(())
}

// ============================================================================
// preview
// ============================================================================

/// Rows for one source: the file on the command line, else the stored copy.
fn preview_source(conn: Option<&Connection>, kind: SourceKind, path: Option<&Path>) -> Result<Vec<Record>> {
    if let Some(path) = path {
        return Ok(load(kind, path)?.records);
    }
    let Some(conn) = conn else {
        return Ok(Vec::new());
    };
    let stored = get_file(conn, FileSlot::from(kind))?;
    Ok(stored.and_then(|f| f.content).unwrap_or_default())
}

#[cfg_attr(not(feature = "tui"), allow(dead_code))]
struct PreviewData {
    de: Vec<Record>,
    product: Vec<Record>,
    merged: Vec<Record>,
}

fn load_preview(config: &AppConfig, args: &PreviewArgs) -> Result<PreviewData> {
    let conn = if config.db_path.exists() {
        Some(open_database(&config.db_path)?)
    } else {
        None
    };

    let de = preview_source(conn.as_ref(), SourceKind::De, args.de.as_deref())?;
    let product = preview_source(conn.as_ref(), SourceKind::Product, args.product.as_deref())?;
    let barcode = preview_source(conn.as_ref(), SourceKind::Barcode, args.barcode.as_deref())?;

    let from_files = args.de.is_some() || args.product.is_some() || args.barcode.is_some();
    let stored_merge = match (&conn, from_files) {
        (Some(conn), false) => load_merged(conn)?,
        _ => None,
    };

    let merged = match stored_merge {
        Some(rows) => {
            info!(rows = rows.len(), "using stored merge");
            rows
        }
        None if de.is_empty() && product.is_empty() => Vec::new(),
        None => MergeEngine::new().merge(&de, &product, &barcode).records,
    };

    Ok(PreviewData { de, product, merged })
}

#[cfg(feature = "tui")]
fn run_preview_mode(config: &AppConfig, args: PreviewArgs) -> Result<()> {
    println!("🖥️  Loading catalog preview...\n");

    let data = load_preview(config, &args)?;
    if data.de.is_empty() && data.product.is_empty() && data.merged.is_empty() {
        println!("Nothing to preview: pass --de/--product or run `merge --save` first.");
        return Ok(());
    }

    println!("Starting UI... (Press 'q' to quit)\n");
    let mut app = catalog_merge::ui::App::new(data.de, data.product, data.merged, config.rows_per_page);
    catalog_merge::ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_preview_mode(config: &AppConfig, args: PreviewArgs) -> Result<()> {
    // Validate the inputs anyway so a bad file is reported.
    load_preview(config, &args)?;
    anyhow::bail!("TUI preview not available: rebuild with --features tui");
}

// ============================================================================
// session
// ============================================================================

fn run_session(config: &AppConfig, action: SessionAction) -> Result<()> {
    let conn = open_database(&config.db_path)?;

    match action {
        SessionAction::Show => {
            println!("🗄️  Session: {}", config.db_path.display());
            for slot in FileSlot::ALL {
                match get_file(&conn, slot)? {
                    Some(file) => {
                        let merged = file
                            .merged_data
                            .as_ref()
                            .map(|rows| format!(", {} merged rows", rows.len()))
                            .unwrap_or_default();
                        println!(
                            "  {:<12} {} ({}, {:.2} KB, {} rows{}) saved {}",
                            slot.id(),
                            file.name,
                            file.file_type,
                            file.size as f64 / 1024.0,
                            file.row_count(),
                            merged,
                            file.saved_at.format("%Y-%m-%d %H:%M:%S"),
                        );
                    }
                    None => println!("  {:<12} -", slot.id()),
                }
            }
        }
        SessionAction::Clear => {
            let deleted = clear_session(&conn)?;
            println!("✓ Cleared {} stored files", deleted);
        }
    }

    Ok(())
}
