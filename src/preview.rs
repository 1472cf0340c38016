// 👀 Preview - Paging and cell display for the tabular previews
//
// Shared by the terminal UI and the HTTP API so both page the same way.

use crate::record::{CellValue, Record};
use serde::Serialize;
use url::Url;

/// Rows shown per preview page.
pub const DEFAULT_ROWS_PER_PAGE: usize = 5;

/// Longer text cells are cut to this many characters plus "...".
pub const MAX_CELL_CHARS: usize = 50;

// ============================================================================
// TABS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PreviewTab {
    De,
    Product,
    Merged,
}

impl PreviewTab {
    pub fn next(&self) -> Self {
        match self {
            PreviewTab::De => PreviewTab::Product,
            PreviewTab::Product => PreviewTab::Merged,
            PreviewTab::Merged => PreviewTab::De,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            PreviewTab::De => PreviewTab::Merged,
            PreviewTab::Product => PreviewTab::De,
            PreviewTab::Merged => PreviewTab::Product,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            PreviewTab::De => "DE File",
            PreviewTab::Product => "Product Information",
            PreviewTab::Merged => "Merged Data",
        }
    }
}

// ============================================================================
// PAGING
// ============================================================================

/// One page of a dataset.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewPage<'a> {
    /// Columns of the first record of the whole dataset
    pub headers: Vec<String>,
    pub rows: &'a [Record],
    /// 1-based page number, clamped to `1..=total_pages`
    pub page: usize,
    pub total_pages: usize,
    /// 0-based index of the first row on this page
    pub start: usize,
    /// Exclusive end index
    pub end: usize,
    pub total: usize,
}

impl PreviewPage<'_> {
    /// "Showing 6 to 10 of 12 results"
    pub fn showing(&self) -> String {
        format!(
            "Showing {} to {} of {} results",
            self.start + 1,
            self.end,
            self.total
        )
    }

    /// "Page 2 of 3"
    pub fn page_label(&self) -> String {
        format!("Page {} of {}", self.page, self.total_pages)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    /// Display strings for every row, in header order.
    pub fn cells(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .map(|h| row.get(h).map(display_cell).unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

pub fn total_pages(len: usize, rows_per_page: usize) -> usize {
    let per_page = rows_per_page.max(1);
    len.div_ceil(per_page)
}

/// Slice out page `page` (1-based). `None` for an empty dataset.
pub fn paginate(records: &[Record], page: usize, rows_per_page: usize) -> Option<PreviewPage<'_>> {
    let first = records.first()?;
    let per_page = rows_per_page.max(1);
    let total_pages = total_pages(records.len(), per_page);
    let page = page.clamp(1, total_pages);

    let start = (page - 1) * per_page;
    let end = (start + per_page).min(records.len());

    Some(PreviewPage {
        headers: first.columns().map(str::to_string).collect(),
        rows: &records[start..end],
        page,
        total_pages,
        start,
        end,
        total: records.len(),
    })
}

/// Cell text as shown in a preview: URLs collapse to their path, long text
/// is cut at [`MAX_CELL_CHARS`].
pub fn display_cell(value: &CellValue) -> String {
    match value {
        CellValue::Text(s) => {
            if let Ok(url) = Url::parse(s) {
                return url.path().to_string();
            }
            truncate(s, MAX_CELL_CHARS)
        }
        other => other.to_text(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}
