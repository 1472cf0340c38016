// 🔀 Merge Engine - Reconcile DE, Product and Barcode sheets into one catalog
//
// Walk order (fixed, so the same input always gives the same output):
//   1. every DE key, in DE index order   → matched row or DE-only row
//   2. every Product key not seen in DE  → Product-only row
// Barcode backfill runs last on every row and always wins.

use crate::index::{build_barcode_index, build_index, BarcodeIndex, IndexStats, SKU_COLUMN};
use crate::record::{CellValue, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

// ============================================================================
// COLUMN NAMES
// ============================================================================

pub mod columns {
    pub const SKU: &str = "SKU";
    pub const EAN: &str = "EAN";
    pub const NAME: &str = "Name";
    pub const TITLE: &str = "Title";
    pub const SUBCATEGORY: &str = "Subcategory";
    pub const CATEGORY: &str = "Category";
    pub const BRAND: &str = "Brand";
    pub const PRICE: &str = "Price";
    pub const STOCK: &str = "Stock";
    pub const MATERIAL: &str = "Material";
    pub const PRODUCT_SIZE: &str = "Product size";
    pub const NET_WEIGHT: &str = "Net weight";
    pub const GROSS_WEIGHT: &str = "Gross weight";
    pub const VOLUME: &str = "Volume/CBM";
    pub const COLOR: &str = "Color";
    pub const DESCRIPTION: &str = "Description";
    pub const SPECIFICATIONS: &str = "Specifications";
    pub const BARCODE: &str = "Barcode";

    /// Package dimensions: (column in the Product sheet, column in the output).
    pub const PACKAGE_SIZES: [(&str, &str); 3] = [
        ("Package size L", "Package size Length"),
        ("Package size W", "Package size Width"),
        ("Package size H", "Package size Height"),
    ];

    /// `Description 1` .. `Description n`
    pub fn description(n: usize) -> String {
        format!("Description {}", n)
    }

    /// `image1` .. `imageN`
    pub fn image(n: usize) -> String {
        format!("image{}", n)
    }
}

use self::columns as col;

// ============================================================================
// MERGE REPORT
// ============================================================================

/// Which rule produced an output row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    /// SKU present in both DE and Product
    Matched,
    /// SKU only in DE
    DeOnly,
    /// SKU only in Product
    ProductOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeStats {
    pub matched: usize,
    pub de_only: usize,
    pub product_only: usize,
    pub barcode_backfilled: usize,
    pub de_index: IndexStats,
    pub product_index: IndexStats,
    pub barcode_index: IndexStats,
    /// Barcode rows parked under a synthetic key (never matched)
    pub barcode_unmatched: usize,
}

impl MergeStats {
    pub fn total(&self) -> usize {
        self.matched + self.de_only + self.product_only
    }

    fn record(&mut self, kind: MatchKind) {
        match kind {
            MatchKind::Matched => self.matched += 1,
            MatchKind::DeOnly => self.de_only += 1,
            MatchKind::ProductOnly => self.product_only += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub records: Vec<Record>,
    pub stats: MergeStats,
    pub merged_at: DateTime<Utc>,
}

impl MergeReport {
    pub fn summary(&self) -> String {
        format!(
            "Merged {} products: {} matched, {} DE only, {} Product only, {} barcodes filled ({} DE rows, {} Product rows, {} barcode rows)",
            self.stats.total(),
            self.stats.matched,
            self.stats.de_only,
            self.stats.product_only,
            self.stats.barcode_backfilled,
            self.stats.de_index.rows,
            self.stats.product_index.rows,
            self.stats.barcode_index.rows,
        )
    }
}

// ============================================================================
// MERGE ENGINE
// ============================================================================

pub struct MergeEngine {
    /// Number of `imageN` columns carried into the output (default: 12)
    pub image_slots: usize,

    /// Number of `Description N` columns read from the Product sheet (default: 5)
    pub description_slots: usize,

    /// Separator between joined description blocks (default: blank line)
    pub description_separator: String,
}

impl MergeEngine {
    pub fn new() -> Self {
        MergeEngine {
            image_slots: 12,
            description_slots: 5,
            description_separator: "\n\n".to_string(),
        }
    }

    /// Merge the three datasets. Pure and deterministic: no I/O, no failure path.
    pub fn merge(&self, de: &[Record], product: &[Record], barcode: &[Record]) -> MergeReport {
        let span = info_span!("merge", de = de.len(), product = product.len(), barcode = barcode.len());
        let _guard = span.enter();

        let de_index = build_index(de);
        let product_index = build_index(product);
        let barcode_index = build_barcode_index(barcode);

        let mut stats = MergeStats {
            de_index: de_index.stats(),
            product_index: product_index.stats(),
            barcode_index: barcode_index.stats(),
            barcode_unmatched: barcode_index.synthetic_count(),
            ..MergeStats::default()
        };

        let mut records = Vec::with_capacity(de_index.len() + product_index.len());

        for (sku, de_row) in de_index.iter() {
            let (mut row, kind) = match product_index.get(sku) {
                Some(product_row) => (self.merge_row(sku, de_row, product_row), MatchKind::Matched),
                None => (self.unique_de(sku, de_row), MatchKind::DeOnly),
            };
            debug!(sku, ?kind, "merged row");

            if self.backfill_barcode(&mut row, sku, &barcode_index) {
                stats.barcode_backfilled += 1;
            }
            stats.record(kind);
            records.push(row);
        }

        for (sku, product_row) in product_index.iter() {
            if de_index.contains(sku) {
                continue;
            }
            let mut row = self.unique_product(sku, product_row);
            debug!(sku, kind = ?MatchKind::ProductOnly, "merged row");

            if self.backfill_barcode(&mut row, sku, &barcode_index) {
                stats.barcode_backfilled += 1;
            }
            stats.record(MatchKind::ProductOnly);
            records.push(row);
        }

        let report = MergeReport {
            records,
            stats,
            merged_at: Utc::now(),
        };
        info!("{}", report.summary());
        report
    }

    /// Matched row. Identity, price, stock, subcategory and images from DE;
    /// everything descriptive from Product.
    pub fn merge_row(&self, sku: &str, de: &Record, product: &Record) -> Record {
        let mut row = Record::new();
        row.set(col::SKU, sku);
        row.set(col::EAN, de.value(col::EAN));
        row.set(col::SUBCATEGORY, de.value(col::CATEGORY));
        row.set(col::PRICE, de.value(col::PRICE));
        row.set(col::STOCK, de.value(col::STOCK));
        row.set(col::MATERIAL, product.value(col::MATERIAL));
        row.set(col::TITLE, clean_title(product));
        row.set(col::CATEGORY, product.value(col::CATEGORY));
        row.set(col::BRAND, product.value(col::BRAND));
        self.copy_dimensions(&mut row, product);

        let mut descriptions = vec![de.value(&col::description(1))];
        descriptions.extend(
            (1..=self.description_slots).map(|n| product.value(&col::description(n))),
        );
        row.set(col::DESCRIPTION, self.join_descriptions(&descriptions));
        row.set(col::BARCODE, "");

        // Images always come from DE, even when Product has its own.
        self.copy_images(&mut row, de);
        row
    }

    /// DE-only row: the DE row as-is, minus its raw `Description`, with the
    /// normalized SKU, `Description 1` as description and an empty barcode.
    pub fn unique_de(&self, sku: &str, de: &Record) -> Record {
        let mut row = de.clone();
        row.remove(col::DESCRIPTION);
        row.set(col::SKU, sku);
        row.set(col::DESCRIPTION, or_empty_text(de.value(&col::description(1))));
        row.set(col::BARCODE, "");
        row
    }

    /// Product-only row projected onto the canonical columns.
    pub fn unique_product(&self, sku: &str, product: &Record) -> Record {
        let mut row = Record::new();
        row.set(col::SKU, sku);
        row.set(col::EAN, product.value(col::EAN));
        row.set(col::MATERIAL, product.value(col::MATERIAL));
        row.set(col::TITLE, clean_title(product));
        row.set(col::SUBCATEGORY, product.value(col::TITLE));
        row.set(col::CATEGORY, product.value(col::CATEGORY));
        row.set(col::BRAND, product.value(col::BRAND));
        self.copy_dimensions(&mut row, product);

        let mut descriptions: Vec<CellValue> = (1..=self.description_slots)
            .map(|n| product.value(&col::description(n)))
            .collect();
        descriptions.push(product.value(col::SPECIFICATIONS));
        row.set(col::DESCRIPTION, self.join_descriptions(&descriptions));
        row.set(col::BARCODE, "");

        self.copy_images(&mut row, product);
        row
    }

    /// Overwrite `Barcode` from the barcode index. Returns true only when a
    /// non-empty barcode was written; a SKU-only barcode row still overwrites.
    fn backfill_barcode(&self, row: &mut Record, sku: &str, barcodes: &BarcodeIndex) -> bool {
        match barcodes.lookup_sku(sku) {
            Some(entry) => {
                row.set(col::BARCODE, entry.barcode.clone());
                !entry.barcode.is_empty()
            }
            None => false,
        }
    }

    fn copy_dimensions(&self, row: &mut Record, product: &Record) {
        row.set(col::PRODUCT_SIZE, product.value(col::PRODUCT_SIZE));
        for (source, target) in col::PACKAGE_SIZES {
            row.set(target, product.value(source));
        }
        row.set(col::NET_WEIGHT, product.value(col::NET_WEIGHT));
        row.set(col::GROSS_WEIGHT, product.value(col::GROSS_WEIGHT));
        row.set(col::VOLUME, product.value(col::VOLUME));
        row.set(col::COLOR, product.value(col::COLOR));
    }

    fn copy_images(&self, row: &mut Record, source: &Record) {
        for n in 1..=self.image_slots {
            let column = col::image(n);
            let value = or_empty_text(source.value(&column));
            row.set(column, value);
        }
    }

    fn join_descriptions(&self, parts: &[CellValue]) -> String {
        parts
            .iter()
            .filter(|v| !v.is_blank())
            .map(CellValue::to_text)
            .collect::<Vec<_>>()
            .join(&self.description_separator)
    }
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge with default settings and return only the rows.
pub fn merge(de: &[Record], product: &[Record], barcode: &[Record]) -> Vec<Record> {
    MergeEngine::new().merge(de, product, barcode).records
}

/// Product title without the leading brand word and without the raw SKU.
///
/// `"Brand WidgetX AAA001"` with SKU `AAA001` → `"WidgetX"`.
/// Only the first occurrence of the SKU is removed.
pub fn clean_title(product: &Record) -> String {
    let name = product.text(col::NAME);
    let without_brand = name.split(' ').skip(1).collect::<Vec<_>>().join(" ");

    let raw_sku = product.text(SKU_COLUMN);
    let without_sku = if raw_sku.is_empty() {
        without_brand
    } else {
        without_brand.replacen(&raw_sku, "", 1)
    };

    without_sku.trim().to_string()
}

fn or_empty_text(value: CellValue) -> CellValue {
    if value.is_blank() {
        CellValue::Text(String::new())
    } else {
        value
    }
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

    fn find<'a>(records: &'a [Record], sku: &str) -> &'a Record {
        records
            .iter()
            .find(|r| r.text("SKU") == sku)
            .unwrap_or_else(|| panic!("no row for {}", sku))
    }

    #[test]
    fn test_end_to_end_matched_row() {
        let de = vec![row(&[
            ("SKU", "B34AAA001V1".into()),
            ("Price", 10.into()),
            ("Stock", 5.into()),
            ("Category", "Cat1".into()),
        ])];
        let product = vec![row(&[
            ("SKU", "AAA001".into()),
            ("Name", "Brand WidgetX AAA001".into()),
            ("Brand", "Brand".into()),
            ("Category", "Widgets".into()),
        ])];

        let merged = merge(&de, &product, &[]);

        assert_eq!(merged.len(), 1);
        let r = &merged[0];
        assert_eq!(r.text("SKU"), "AAA001");
        assert_eq!(r.value("Price"), CellValue::Number(10.0));
        assert_eq!(r.value("Stock"), CellValue::Number(5.0));
        assert_eq!(r.text("Subcategory"), "Cat1");
        assert_eq!(r.text("Title"), "WidgetX");
        assert_eq!(r.text("Category"), "Widgets");
        assert_eq!(r.text("Brand"), "Brand");
        assert_eq!(r.text("Barcode"), "");
    }

    #[test]
    fn test_matched_row_reads_renamed_package_columns() {
        let de = vec![row(&[("SKU", "X1".into())])];
        let product = vec![row(&[
            ("SKU", "X1".into()),
            ("Package size L", 30.into()),
            ("Package size W", 20.into()),
            ("Package size H", 10.into()),
            ("Package size Length", 999.into()),
        ])];

        let merged = merge(&de, &product, &[]);
        let r = &merged[0];

        assert_eq!(r.text("Package size Length"), "30");
        assert_eq!(r.text("Package size Width"), "20");
        assert_eq!(r.text("Package size Height"), "10");
        assert!(!r.contains("Package size L"));
    }

    #[test]
    fn test_matched_images_come_from_de_only() {
        let de = vec![row(&[("SKU", "X1".into()), ("image1", "de.jpg".into())])];
        let product = vec![row(&[
            ("SKU", "X1".into()),
            ("image1", "product.jpg".into()),
            ("image2", "product2.jpg".into()),
        ])];

        let merged = merge(&de, &product, &[]);
        let r = &merged[0];

        assert_eq!(r.text("image1"), "de.jpg");
        assert_eq!(r.value("image2"), CellValue::Text(String::new()));
        assert_eq!(r.text("image12"), "");
        assert!(!r.contains("image13"));
    }

    #[test]
    fn test_matched_description_joins_de_then_product() {
        let de = vec![row(&[("SKU", "X1".into()), ("Description 1", "From DE".into())])];
        let product = vec![row(&[
            ("SKU", "X1".into()),
            ("Description 1", "P one".into()),
            ("Description 2", "".into()),
            ("Description 3", "P three".into()),
            ("Specifications", "ignored when matched".into()),
        ])];

        let merged = merge(&de, &product, &[]);
        assert_eq!(merged[0].text("Description"), "From DE\n\nP one\n\nP three");
    }

    #[test]
    fn test_de_only_row_keeps_columns_and_swaps_description() {
        let de = vec![row(&[
            ("SKU", "B34ZZZ9".into()),
            ("Description", "raw long text".into()),
            ("Description 1", "short".into()),
            ("Price", 4.5.into()),
            ("Custom", "kept".into()),
        ])];

        let merged = merge(&de, &[], &[]);
        let r = &merged[0];

        assert_eq!(r.text("SKU"), "ZZZ9");
        assert_eq!(r.text("Description"), "short");
        assert_eq!(r.text("Custom"), "kept");
        assert_eq!(r.value("Price"), CellValue::Number(4.5));
        assert_eq!(r.text("Barcode"), "");
        assert!(!r.contains("Brand"));

        let columns: Vec<&str> = r.columns().collect();
        assert_eq!(
            columns,
            vec!["SKU", "Description 1", "Price", "Custom", "Description", "Barcode"]
        );
    }

    #[test]
    fn test_de_only_without_description_1_is_empty() {
        let de = vec![row(&[("SKU", "Q1".into()), ("Description", "raw".into())])];

        let merged = merge(&de, &[], &[]);
        assert_eq!(merged[0].text("Description"), "");
    }

    #[test]
    fn test_product_only_row() {
        let product = vec![row(&[
            ("SKU", "P-77".into()),
            ("Name", "Acme Super Lamp P-77 Deluxe".into()),
            ("Title", "Lighting".into()),
            ("Brand", "Acme".into()),
            ("Description 1", "Bright".into()),
            ("Description 5", "Warm".into()),
            ("Specifications", "220V".into()),
            ("image3", "c.jpg".into()),
        ])];

        let merged = merge(&[], &product, &[]);
        let r = &merged[0];

        assert_eq!(r.text("SKU"), "P-77");
        assert_eq!(r.text("Title"), "Super Lamp  Deluxe");
        assert_eq!(r.text("Subcategory"), "Lighting");
        assert_eq!(r.text("Description"), "Bright\n\nWarm\n\n220V");
        assert_eq!(r.text("image3"), "c.jpg");
        assert_eq!(r.text("image1"), "");
        assert_eq!(r.text("Barcode"), "");
        assert!(!r.contains("Price"));
    }

    #[test]
    fn test_barcode_backfill_wins_everywhere() {
        let de = vec![
            row(&[("SKU", "D1".into()), ("Barcode", "old".into())]),
            row(&[("SKU", "M1".into())]),
        ];
        let product = vec![row(&[("SKU", "M1".into())]), row(&[("SKU", "P1".into())])];
        let barcode = vec![
            row(&[("SKU", "B34D1".into()), ("Barcode", "123456789012".into())]),
            row(&[("SKU", "M1V1".into()), ("barcode", CellValue::Number(1.68071e12))]),
            row(&[("SKU", "P1".into()), ("Barcode", "555".into())]),
        ];

        let report = MergeEngine::new().merge(&de, &product, &barcode);

        assert_eq!(find(&report.records, "D1").text("Barcode"), "123456789012");
        assert_eq!(find(&report.records, "M1").text("Barcode"), "1680710000000");
        assert_eq!(find(&report.records, "P1").text("Barcode"), "555");
        assert_eq!(report.stats.barcode_backfilled, 3);
    }

    #[test]
    fn test_barcode_only_rows_are_never_matched() {
        let de = vec![row(&[("SKU", "D1".into())])];
        let barcode = vec![row(&[("Barcode", "D1".into())])];

        let report = MergeEngine::new().merge(&de, &[], &barcode);

        assert_eq!(report.records[0].text("Barcode"), "");
        assert_eq!(report.stats.barcode_unmatched, 1);
        assert_eq!(report.stats.barcode_backfilled, 0);
    }

    #[test]
    fn test_empty_barcode_overwrites_but_is_not_counted() {
        let de = vec![row(&[("SKU", "D1".into()), ("Barcode", "old".into())])];
        let barcode = vec![row(&[("SKU", "D1".into())])];

        let report = MergeEngine::new().merge(&de, &[], &barcode);

        assert_eq!(report.records[0].text("Barcode"), "");
        assert_eq!(report.stats.barcode_backfilled, 0);
    }

    #[test]
    fn test_output_order_and_count() {
        let de = vec![
            row(&[("SKU", "B".into())]),
            row(&[("SKU", "A".into())]),
            row(&[("SKU", "B34V1".into())]),
        ];
        let product = vec![
            row(&[("SKU", "C".into())]),
            row(&[("SKU", "A".into())]),
            row(&[("SKU", "D".into())]),
        ];

        let report = MergeEngine::new().merge(&de, &product, &[]);
        let skus: Vec<String> = report.records.iter().map(|r| r.text("SKU")).collect();

        assert_eq!(skus, vec!["B", "A", "C", "D"]);
        assert_eq!(report.stats.matched, 1);
        assert_eq!(report.stats.de_only, 1);
        assert_eq!(report.stats.product_only, 2);
        assert_eq!(report.stats.de_index.skipped_empty_key, 1);
    }

    #[test]
    fn test_merge_is_repeatable() {
        let de = vec![row(&[("SKU", "A".into()), ("Price", 1.into())])];
        let product = vec![row(&[("SKU", "A".into()), ("Name", "X Y".into())])];

        assert_eq!(merge(&de, &product, &[]), merge(&de, &product, &[]));
    }

    #[test]
    fn test_clean_title_edge_cases() {
        assert_eq!(clean_title(&row(&[])), "");
        assert_eq!(clean_title(&row(&[("Name", "Solo".into())])), "");
        assert_eq!(
            clean_title(&row(&[("Name", "Brand A1 and A1".into()), ("SKU", "A1".into())])),
            "and A1"
        );
    }

    #[test]
    fn test_summary_mentions_counts() {
        let report = MergeEngine::new().merge(&[row(&[("SKU", "A".into())])], &[], &[]);
        let summary = report.summary();

        assert!(summary.contains("Merged 1 products"));
        assert!(summary.contains("1 DE only"));
    }
}
