// 🔑 SKU Normalizer - Canonical join key for product identifiers
//
// DE exports carry supplier decorations ("B34" prefix, "V1" suffix) that the
// product information sheets don't. Both are stripped once, case-insensitively.

use crate::record::CellValue;

/// Supplier prefix stripped from the start of an identifier.
pub const SKU_PREFIX: &str = "B34";

/// Revision suffix stripped from the end of an identifier.
pub const SKU_SUFFIX: &str = "V1";

/// Canonicalize a raw identifier into a join key.
///
/// Trims, strips one leading `B34` and one trailing `V1` (any case), trims
/// again. Returns `""` for blank input or input made only of the markers;
/// callers must not index empty keys.
pub fn normalize_sku(raw: &str) -> String {
    let mut normalized = raw.trim();

    if starts_with_ignore_case(normalized, SKU_PREFIX) {
        normalized = &normalized[SKU_PREFIX.len()..];
    }

    if ends_with_ignore_case(normalized, SKU_SUFFIX) {
        normalized = &normalized[..normalized.len() - SKU_SUFFIX.len()];
    }

    normalized.trim().to_string()
}

/// Normalize an identifier cell. Numeric SKUs are rendered as text first.
pub fn normalize_cell(value: &CellValue) -> String {
    match value {
        CellValue::Empty => String::new(),
        other => normalize_sku(&other.to_text()),
    }
}

fn starts_with_ignore_case(s: &str, marker: &str) -> bool {
    s.get(..marker.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(marker))
}

fn ends_with_ignore_case(s: &str, marker: &str) -> bool {
    s.len() >= marker.len()
        && s.get(s.len() - marker.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(marker))
}
