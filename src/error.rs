//! Typed failures for the I/O edges (loading, exporting, session storage).
//!
//! The merge itself never fails. Everything here is about files and the
//! session database, and is usually wrapped into `anyhow::Error` by callers.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning an input file into a dataset.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Extension is not one of csv, xls, xlsx.
    #[error("unsupported file type '{extension}' for {path}: please upload only CSV, XLS, or XLSX files")]
    UnsupportedFileType { path: PathBuf, extension: String },

    /// Input file does not exist.
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Failed to read file metadata or contents.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Spreadsheet has no worksheet to read.
    #[error("no worksheet found in {path}")]
    NoWorksheet { path: PathBuf },

    /// Spreadsheet could not be opened or decoded.
    #[error("failed to read spreadsheet {path}: {message}")]
    Spreadsheet { path: PathBuf, message: String },

    /// CSV could not be decoded.
    #[error("failed to parse CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Errors raised by the session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Slot id is not one of deFile, productFile, barcodeFile.
    #[error("unknown file slot '{0}' (expected deFile, productFile or barcodeFile)")]
    UnknownSlot(String),
}

/// Errors raised while writing merged output.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported export format '{0}' (expected csv or xlsx)")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
