// 📤 Export - Merged rows → CSV or XLSX
//
// The header is every column seen across all rows, in first-seen order.

use crate::error::ExportError;
use crate::record::{CellValue, Record};
use indexmap::IndexSet;
use rust_xlsxwriter::Workbook;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Worksheet name used for XLSX output.
pub const SHEET_NAME: &str = "MergedData";

/// Default output file stem.
pub const DEFAULT_FILE_STEM: &str = "merged_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    /// `merged_data.csv` / `merged_data.xlsx`
    pub fn default_file_name(&self) -> String {
        format!("{}.{}", DEFAULT_FILE_STEM, self.extension())
    }

    /// Guess from an output path; `None` for unknown extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Union of all column names, in first-seen order.
pub fn collect_headers(records: &[Record]) -> Vec<String> {
    let mut headers: IndexSet<String> = IndexSet::new();
    for record in records {
        for column in record.columns() {
            if !headers.contains(column) {
                headers.insert(column.to_string());
            }
        }
    }
    headers.into_iter().collect()
}

/// Write merged rows to `path` in the given format.
pub fn write_records(records: &[Record], path: &Path, format: ExportFormat) -> Result<(), ExportError> {
    match format {
        ExportFormat::Csv => {
            let file = std::fs::File::create(path)?;
            write_csv_to(file, records)?;
        }
        ExportFormat::Xlsx => write_xlsx(records, path)?,
    }

    info!(path = %path.display(), rows = records.len(), format = format.extension(), "exported merged data");
    Ok(())
}

/// CSV to any writer. Missing cells are written as empty fields.
pub fn write_csv_to<W: Write>(writer: W, records: &[Record]) -> Result<(), ExportError> {
    let headers = collect_headers(records);
    let mut wtr = csv::Writer::from_writer(writer);

    if headers.is_empty() {
        wtr.flush()?;
        return Ok(());
    }

    wtr.write_record(&headers)?;
    for record in records {
        wtr.write_record(headers.iter().map(|h| record.text(h)))?;
    }
    wtr.flush()?;
    Ok(())
}

/// CSV as a string (used for downloads).
pub fn to_csv_string(records: &[Record]) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_csv_to(&mut buffer, records)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Single-sheet workbook. Numbers and booleans keep their cell type.
pub fn write_xlsx(records: &[Record], path: &Path) -> Result<(), ExportError> {
    let headers = collect_headers(records);
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, header)?;
    }

    for (row_idx, record) in records.iter().enumerate() {
        let row = (row_idx + 1) as u32;
        for (col, header) in headers.iter().enumerate() {
            let col = col as u16;
            match record.get(header) {
                Some(CellValue::Text(s)) if !s.is_empty() => {
                    worksheet.write_string(row, col, s)?;
                }
                Some(CellValue::Number(n)) => {
                    worksheet.write_number(row, col, *n)?;
                }
                Some(CellValue::Bool(b)) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
                _ => {}
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{load_dataset, read_csv};

    fn sample() -> Vec<Record> {
        vec![
            Record::from_pairs([
                ("SKU", CellValue::from("AAA001")),
                ("Price", CellValue::from(10)),
                ("Description", CellValue::from("line one\n\nline two")),
            ]),
            Record::from_pairs([
                ("SKU", CellValue::from("BBB002")),
                ("Brand", CellValue::from("Acme")),
            ]),
        ]
    }

    #[test]
    fn test_headers_are_union_in_first_seen_order() {
        assert_eq!(collect_headers(&sample()), vec!["SKU", "Price", "Description", "Brand"]);
        assert!(collect_headers(&[]).is_empty());
    }

    #[test]
    fn test_csv_output_fills_missing_cells() {
        let csv = to_csv_string(&sample()).unwrap();
        let mut lines = csv.lines();

        assert_eq!(lines.next(), Some("SKU,Price,Description,Brand"));
        let parsed = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].text("Price"), "10");
        assert_eq!(parsed[0].text("Description"), "line one\n\nline two");
        assert_eq!(parsed[1].value("Price"), CellValue::Empty);
        assert_eq!(parsed[1].text("Brand"), "Acme");
    }

    #[test]
    fn test_xlsx_output_keeps_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ExportFormat::Xlsx.default_file_name());

        write_records(&sample(), &path, ExportFormat::Xlsx).unwrap();
        let dataset = load_dataset(&path).unwrap();

        assert_eq!(dataset.records.len(), 2);
        assert_eq!(dataset.records[0].value("Price"), CellValue::Number(10.0));
        assert_eq!(dataset.records[1].text("Brand"), "Acme");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("out.xlsx")), Some(ExportFormat::Xlsx));
        assert_eq!(ExportFormat::from_path(Path::new("out.txt")), None);
        assert!("json".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Csv.default_file_name(), "merged_data.csv");
    }
}
