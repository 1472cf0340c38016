// 📥 Dataset Loader - CSV / XLS / XLSX → ordered records
//
// Headers are taken verbatim from the first row. No renaming, no trimming:
// "Package size L" and "Package size Length" are different columns.

use crate::error::ImportError;
use crate::record::{CellValue, Record};
use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// CORE TYPES
// ============================================================================

/// Which input a dataset plays in the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    De,
    Product,
    Barcode,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::De, SourceKind::Product, SourceKind::Barcode];

    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            SourceKind::De => "DE File",
            SourceKind::Product => "Product Information",
            SourceKind::Barcode => "Barcode File",
        }
    }

    /// Short code for tabs and logs
    pub fn code(&self) -> &str {
        match self {
            SourceKind::De => "de",
            SourceKind::Product => "product",
            SourceKind::Barcode => "barcode",
        }
    }
}

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Csv,
    Xls,
    Xlsx,
}

impl FileType {
    /// Detect from the file extension (any case).
    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(FileType::Csv),
            "xls" => Ok(FileType::Xls),
            "xlsx" => Ok(FileType::Xlsx),
            _ => Err(ImportError::UnsupportedFileType {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Xls => "xls",
            FileType::Xlsx => "xlsx",
        }
    }
}

/// A parsed input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
    pub records: Vec<Record>,
}

impl Dataset {
    /// Size in KB, as shown next to the file name
    pub fn size_kb(&self) -> f64 {
        self.size as f64 / 1024.0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} ({:.2} KB • {}) - {} rows",
            self.name,
            self.size_kb(),
            self.file_type.as_str().to_uppercase(),
            self.records.len()
        )
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load a CSV, XLS or XLSX file into records.
pub fn load_dataset(path: &Path) -> Result<Dataset, ImportError> {
    let file_type = FileType::from_path(path)?;

    if !path.exists() {
        return Err(ImportError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let size = std::fs::metadata(path)
        .map_err(|source| ImportError::FileRead {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    let records = match file_type {
        FileType::Csv => load_csv(path)?,
        FileType::Xls | FileType::Xlsx => load_spreadsheet(path)?,
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!(file = %name, rows = records.len(), "loaded dataset");

    Ok(Dataset {
        name,
        file_type,
        size,
        records,
    })
}

pub fn load_csv(path: &Path) -> Result<Vec<Record>, ImportError> {
    let file = std::fs::File::open(path).map_err(|source| ImportError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    read_csv(file).map_err(|source| ImportError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

/// Read CSV text with a header row. Every cell is text; empty cells are
/// `Empty`; short rows are padded, blank rows dropped. Bytes that are not
/// UTF-8 are replaced rather than rejected.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Record>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = unique_headers(rdr.byte_headers()?.iter().map(lossy_text));
    let mut records = Vec::new();

    for result in rdr.byte_records() {
        let row = result?;
        if row.iter().all(<[u8]>::is_empty) {
            continue;
        }

        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let value = match row.get(i) {
                    Some(bytes) if !bytes.is_empty() => CellValue::Text(lossy_text(bytes)),
                    _ => CellValue::Empty,
                };
                (header.clone(), value)
            })
            .collect();
        records.push(record);
    }

    debug!(rows = records.len(), columns = headers.len(), "parsed CSV");
    Ok(records)
}

/// Invalid UTF-8 (e.g. Windows-1252 exports) becomes U+FFFD instead of
/// failing the whole file.
fn lossy_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// First worksheet of an XLS/XLSX workbook. Empty cells are left out of the
/// record, the way spreadsheet-to-JSON converters do.
pub fn load_spreadsheet(path: &Path) -> Result<Vec<Record>, ImportError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ImportError::Spreadsheet {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::NoWorksheet {
            path: path.to_path_buf(),
        })?
        .map_err(|e| ImportError::Spreadsheet {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(first) => unique_headers(first.iter().map(|cell| cell_value(cell).to_text())),
        None => return Ok(Vec::new()),
    };

    let mut records = Vec::new();
    for row in rows {
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(header, cell)| (header.clone(), cell_value(cell)))
            .filter(|(_, value)| !value.is_empty())
            .collect();

        if !record.is_empty() {
            records.push(record);
        }
    }

    debug!(rows = records.len(), columns = headers.len(), "parsed spreadsheet");
    Ok(records)
}

/// Spreadsheet cell → record value. Dates stay as their serial number.
fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(format!("#{:?}", e)),
    }
}

/// Blank headers become `__EMPTY`, `__EMPTY_1`, ...; repeated headers get a
/// `_1`, `_2`, ... suffix so no column is silently lost.
fn unique_headers<I: IntoIterator<Item = String>>(raw: I) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    raw.into_iter()
        .map(|header| {
            let base = if header.is_empty() {
                "__EMPTY".to_string()
            } else {
                header
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}_{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_path(Path::new("a.CSV")).unwrap(), FileType::Csv);
        assert_eq!(FileType::from_path(Path::new("b.xlsx")).unwrap(), FileType::Xlsx);
        assert_eq!(FileType::from_path(Path::new("c.Xls")).unwrap(), FileType::Xls);

        let err = FileType::from_path(Path::new("d.pdf")).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFileType { ref extension, .. } if extension == "pdf"));
        assert!(FileType::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_read_csv_keeps_headers_verbatim() {
        let data = "SKU,Package size L,Description 1\nB34AAA001V1,30,\n\nBBB002\n";
        let records = read_csv(data.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("Package size L"), "30");
        assert_eq!(records[0].value("Description 1"), CellValue::Empty);
        assert_eq!(records[1].text("SKU"), "BBB002");
        assert_eq!(records[1].value("Package size L"), CellValue::Empty);
    }

    #[test]
    fn test_read_csv_tolerates_latin1_bytes() {
        let data: &[u8] = b"SKU,Gr\xf6\xdfe\nA1,Gr\xf6\xdfe M\nA2,L\n";
        let records = read_csv(data).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("SKU"), "A1");
        assert_eq!(records[0].text("Gr\u{FFFD}\u{FFFD}e"), "Gr\u{FFFD}\u{FFFD}e M");
        assert_eq!(records[1].text("Gr\u{FFFD}\u{FFFD}e"), "L");
    }

    #[test]
    fn test_duplicate_and_blank_headers_are_renamed() {
        let headers = unique_headers(vec![
            "SKU".to_string(),
            "".to_string(),
            "SKU".to_string(),
            "".to_string(),
        ]);
        assert_eq!(headers, vec!["SKU", "__EMPTY", "SKU_1", "__EMPTY_1"]);
    }

    #[test]
    fn test_load_dataset_csv_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("de.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "SKU,Price").unwrap();
        writeln!(file, "A1,10").unwrap();
        drop(file);

        let dataset = load_dataset(&path).unwrap();

        assert_eq!(dataset.name, "de.csv");
        assert_eq!(dataset.file_type, FileType::Csv);
        assert_eq!(dataset.records.len(), 1);
        assert!(dataset.size > 0);
        assert!(dataset.summary().contains("CSV"));
    }

    #[test]
    fn test_load_dataset_missing_file() {
        let err = load_dataset(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_spreadsheet_keeps_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("barcodes.xlsx");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "SKU").unwrap();
        sheet.write_string(0, 1, "Barcode").unwrap();
        sheet.write_string(1, 0, "AAA001").unwrap();
        sheet.write_number(1, 1, 1.68071e12).unwrap();
        sheet.write_string(2, 0, "BBB002").unwrap();
        workbook.save(&path).unwrap();

        let dataset = load_dataset(&path).unwrap();

        assert_eq!(dataset.file_type, FileType::Xlsx);
        assert_eq!(dataset.records.len(), 2);
        assert_eq!(dataset.records[0].value("Barcode"), CellValue::Number(1.68071e12));
        assert_eq!(dataset.records[0].text("Barcode"), "1680710000000");
        assert!(!dataset.records[1].contains("Barcode"));
    }
}
