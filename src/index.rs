// 🗂️ Source Indexer - One insertion-ordered lookup per input source
//
// DE and Product rows are keyed by their normalized SKU. Barcode rows are
// keyed by SKU when they have one, otherwise parked under a synthetic
// `barcode_<value>` key.

use crate::record::{CellValue, Record};
use crate::sku::normalize_cell;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Identifier column shared by the DE and Product sheets.
pub const SKU_COLUMN: &str = "SKU";

/// Prefix of synthetic keys for barcode rows without a SKU.
pub const SYNTHETIC_BARCODE_PREFIX: &str = "barcode_";

// ============================================================================
// INDEX STATS
// ============================================================================

/// What happened to the rows of one source while indexing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Rows offered to the indexer
    pub rows: usize,
    /// Distinct keys in the finished index
    pub indexed: usize,
    /// Rows dropped because they had no usable key
    pub skipped_empty_key: usize,
    /// Rows that replaced an earlier row with the same key
    pub overwritten: usize,
}

// ============================================================================
// SOURCE INDEX (DE, Product)
// ============================================================================

/// Normalized SKU → last record seen for that SKU, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    entries: IndexMap<String, Record>,
    stats: IndexStats,
}

impl SourceIndex {
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }
}

/// Index DE or Product rows by normalized `SKU`.
///
/// Rows whose SKU normalizes to `""` are skipped. A later row with the same
/// key replaces the earlier one but keeps the earlier row's position.
pub fn build_index(records: &[Record]) -> SourceIndex {
    let mut index = SourceIndex::default();
    index.stats.rows = records.len();

    for (row_number, record) in records.iter().enumerate() {
        let key = normalize_cell(&record.value(SKU_COLUMN));
        if key.is_empty() {
            index.stats.skipped_empty_key += 1;
            warn!(row = row_number, "row without SKU skipped");
            continue;
        }

        if index.entries.insert(key.clone(), record.clone()).is_some() {
            index.stats.overwritten += 1;
            warn!(sku = %key, row = row_number, "duplicate SKU, later row wins");
        }
    }

    index.stats.indexed = index.entries.len();
    debug!(stats = ?index.stats, "source index built");
    index
}

// ============================================================================
// BARCODE INDEX
// ============================================================================

/// Address of a barcode row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarcodeKey {
    /// Row carried a SKU; keyed by its normalized form.
    Sku(String),
    /// Row had only a barcode; keyed by the raw barcode text.
    Synthetic(String),
}

impl BarcodeKey {
    pub fn synthetic(barcode: &str) -> Self {
        BarcodeKey::Synthetic(barcode.to_string())
    }
}

impl fmt::Display for BarcodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarcodeKey::Sku(sku) => f.write_str(sku),
            BarcodeKey::Synthetic(barcode) => write!(f, "{}{}", SYNTHETIC_BARCODE_PREFIX, barcode),
        }
    }
}

/// A barcode row plus the resolved barcode text.
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeEntry {
    pub record: Record,
    pub barcode: String,
}

#[derive(Debug, Clone, Default)]
pub struct BarcodeIndex {
    entries: IndexMap<BarcodeKey, BarcodeEntry>,
    stats: IndexStats,
}

impl BarcodeIndex {
    /// Barcode entry for a normalized SKU.
    pub fn lookup_sku(&self, sku: &str) -> Option<&BarcodeEntry> {
        self.entries.get(&BarcodeKey::Sku(sku.to_string()))
    }

    /// Barcode entry parked under a synthetic key. Nothing in the merge
    /// consults this bucket yet.
    pub fn lookup_barcode(&self, barcode: &str) -> Option<&BarcodeEntry> {
        self.entries.get(&BarcodeKey::synthetic(barcode))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BarcodeKey, &BarcodeEntry)> {
        self.entries.iter()
    }

    /// Number of rows parked without a SKU.
    pub fn synthetic_count(&self) -> usize {
        self.entries
            .keys()
            .filter(|k| matches!(k, BarcodeKey::Synthetic(_)))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }
}

/// Barcode text from `barcode` or `Barcode`, then from the first non-blank
/// column whose header mentions "barcode" (any case). Numeric cells are
/// rendered as whole numbers.
pub fn resolve_barcode(record: &Record) -> Option<String> {
    ["barcode", "Barcode"]
        .iter()
        .find_map(|column| record.get(column).filter(|v| !v.is_blank()))
        .or_else(|| {
            record
                .find_present(|name| name.to_ascii_lowercase().contains("barcode"))
                .map(|(_, value)| value)
        })
        .map(CellValue::to_text)
}

/// SKU cell from `SKU`, `sku`, or any header equal to "sku" ignoring case.
pub fn resolve_sku(record: &Record) -> Option<&CellValue> {
    [SKU_COLUMN, "sku"]
        .iter()
        .find_map(|column| record.get(column).filter(|v| !v.is_blank()))
        .or_else(|| {
            record
                .find_present(|name| name.eq_ignore_ascii_case(SKU_COLUMN))
                .map(|(_, value)| value)
        })
}

/// Index barcode rows.
///
/// - neither barcode nor SKU → skipped (header/blank noise)
/// - SKU present → keyed by normalized SKU; skipped if that is empty
/// - barcode only → keyed by `barcode_<value>`
pub fn build_barcode_index(records: &[Record]) -> BarcodeIndex {
    let mut index = BarcodeIndex::default();
    index.stats.rows = records.len();

    for (row_number, record) in records.iter().enumerate() {
        let barcode = resolve_barcode(record);
        let sku = resolve_sku(record);

        let key = match (sku, barcode.as_deref()) {
            (None, None) => {
                index.stats.skipped_empty_key += 1;
                warn!(row = row_number, "barcode row without SKU or barcode skipped");
                continue;
            }
            (Some(sku), _) => {
                let normalized = normalize_cell(sku);
                if normalized.is_empty() {
                    index.stats.skipped_empty_key += 1;
                    warn!(row = row_number, "barcode row with empty SKU skipped");
                    continue;
                }
                BarcodeKey::Sku(normalized)
            }
            (None, Some(barcode)) => BarcodeKey::synthetic(barcode),
        };

        let barcode = barcode.unwrap_or_default();
        let mut stored = record.clone();
        stored.set("Barcode", barcode.clone());

        if index
            .entries
            .insert(key.clone(), BarcodeEntry { record: stored, barcode })
            .is_some()
        {
            index.stats.overwritten += 1;
            warn!(key = %key, row = row_number, "duplicate barcode row, later row wins");
        }
    }

    index.stats.indexed = index.entries.len();
    debug!(stats = ?index.stats, "barcode index built");

    let parked = index.synthetic_count();
    if parked > 0 {
        warn!(parked, "barcode rows without SKU are indexed but never matched");
    }

    index
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, CellValue)]) -> Record {
        Record::from_pairs(pairs.iter().cloned())
    }

    #[test]
    fn test_build_index_normalizes_and_skips_empty() {
        let records = vec![
            row(&[("SKU", "B34AAA001V1".into())]),
            row(&[("SKU", "B34V1".into())]),
            row(&[("Name", "no sku".into())]),
            row(&[("SKU", "BBB002".into())]),
        ];

        let index = build_index(&records);

        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["AAA001", "BBB002"]);
        assert_eq!(index.stats().skipped_empty_key, 2);
        assert_eq!(index.stats().indexed, 2);
    }

    #[test]
    fn test_build_index_last_write_wins_keeps_position() {
        let records = vec![
            row(&[("SKU", "AAA001".into()), ("Price", 1.into())]),
            row(&[("SKU", "BBB002".into()), ("Price", 2.into())]),
            row(&[("SKU", "b34AAA001".into()), ("Price", 3.into())]),
        ];

        let index = build_index(&records);

        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["AAA001", "BBB002"]);
        assert_eq!(index.get("AAA001").unwrap().value("Price"), CellValue::Number(3.0));
        assert_eq!(index.stats().overwritten, 1);
    }

    #[test]
    fn test_barcode_numeric_cell_becomes_decimal_text() {
        let records = vec![row(&[
            ("SKU", "AAA001".into()),
            ("barcode", CellValue::Number(1.68071e12)),
        ])];

        let index = build_barcode_index(&records);
        let entry = index.lookup_sku("AAA001").unwrap();

        assert_eq!(entry.barcode, "1680710000000");
        assert_eq!(entry.record.text("Barcode"), "1680710000000");
    }

    #[test]
    fn test_barcode_column_match_is_case_insensitive_substring() {
        let records = vec![row(&[
            ("sku", "B34CCC003".into()),
            ("EAN Barcode", "4006381333931".into()),
        ])];

        let index = build_barcode_index(&records);
        assert_eq!(index.lookup_sku("CCC003").unwrap().barcode, "4006381333931");
    }

    #[test]
    fn test_exact_barcode_header_beats_lookalike_columns() {
        let records = vec![
            row(&[
                ("SKU", "A1".into()),
                ("Barcode type", "EAN13".into()),
                ("Barcode", "4006381333931".into()),
            ]),
            row(&[
                ("SKU", "A2".into()),
                ("Barcode type", "EAN13".into()),
                ("barcode", CellValue::Number(4006381333948.0)),
            ]),
        ];

        let index = build_barcode_index(&records);

        assert_eq!(index.lookup_sku("A1").unwrap().barcode, "4006381333931");
        assert_eq!(index.lookup_sku("A2").unwrap().barcode, "4006381333948");
    }

    #[test]
    fn test_blank_exact_barcode_falls_back_to_lookalike() {
        let records = vec![row(&[
            ("SKU", "A1".into()),
            ("Barcode", CellValue::Empty),
            ("Barcode EAN", "4006381333931".into()),
        ])];

        let index = build_barcode_index(&records);
        assert_eq!(index.lookup_sku("A1").unwrap().barcode, "4006381333931");
    }

    #[test]
    fn test_barcode_without_sku_goes_to_synthetic_bucket() {
        let records = vec![row(&[("Barcode", "123456789012".into())])];

        let index = build_barcode_index(&records);

        assert_eq!(index.len(), 1);
        assert_eq!(index.synthetic_count(), 1);
        assert!(index.lookup_barcode("123456789012").is_some());
        let (key, _) = index.iter().next().unwrap();
        assert_eq!(key.to_string(), "barcode_123456789012");
    }

    #[test]
    fn test_barcode_noise_rows_are_skipped() {
        let records = vec![
            row(&[("Notes", "header junk".into())]),
            row(&[("SKU", "".into()), ("Barcode", CellValue::Empty)]),
            row(&[("SKU", "V1".into()), ("Barcode", "999".into())]),
        ];

        let index = build_barcode_index(&records);

        assert!(index.is_empty());
        assert_eq!(index.stats().skipped_empty_key, 3);
    }

    #[test]
    fn test_sku_row_without_barcode_stores_empty_barcode() {
        let records = vec![row(&[("SKU", "DDD004".into())])];

        let index = build_barcode_index(&records);
        assert_eq!(index.lookup_sku("DDD004").unwrap().barcode, "");
    }
}
