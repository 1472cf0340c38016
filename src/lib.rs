// Catalog Merge - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod index;
pub mod logging;
pub mod merge;
pub mod parser;
pub mod preview;
pub mod record;
pub mod sku;

#[cfg(feature = "tui")]
pub mod ui;

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{
    FileSlot, StoredFile, Event,
    open_database, setup_database, save_file, get_file, delete_file,
    clear_session, save_merged, load_merged, insert_event, get_events_for_entity,
};
pub use error::{ExportError, ImportError, StoreError};
pub use export::{write_records, to_csv_string, ExportFormat};
pub use index::{
    build_index, build_barcode_index, BarcodeIndex, BarcodeKey, IndexStats, SourceIndex,
};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use merge::{merge, clean_title, MatchKind, MergeEngine, MergeReport, MergeStats};
pub use parser::{load_dataset, Dataset, FileType, SourceKind};
pub use preview::{paginate, display_cell, PreviewPage, PreviewTab};
pub use record::{CellValue, Record};
pub use sku::normalize_sku;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
