//! Listing table parser.
//!
//! Turns the directory's search-results page into [`BasicRecord`]s and the
//! [`DetailLink`]s found in each row's first cell. Row positions count every
//! data row of the table, including rows that end up skipped, so they stay
//! aligned with the table itself.

use std::sync::LazyLock;

use harvest_core::error::AppError;
use harvest_core::listing::join;
use harvest_core::models::{BasicRecord, DetailLink, LinkEcho, Listing, RowPosition};
use harvest_core::traits::ListingParser;
use scraper::{ElementRef, Html, Selector};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("hardcoded selector is valid")
}

static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

/// Marker of a per-repeater detail page href.
pub const DETAIL_PAGE_MARKER: &str = "details.php";

/// Header spellings with a fixed column name.
const COLUMN_NAMES: &[(&str, &str)] = &[
    ("Frequency", "frequency"),
    ("Offset", "offset"),
    ("Tone", "tone"),
    ("Call Sign", "call"),
    ("Callsign", "call"),
    ("Call", "call"),
    ("Location", "location"),
    ("City", "city"),
    ("County", "county"),
    ("State", "state"),
    ("Use", "use"),
    ("Operational Status", "status"),
    ("Op Status", "status"),
];

/// Parses the directory's search-results table with scraper.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlListingParser;

impl HtmlListingParser {
    pub fn new() -> Self {
        Self
    }
}

impl ListingParser for HtmlListingParser {
    fn parse_listing(&self, html: &str, base_url: &str) -> Result<Listing, AppError> {
        let document = Html::parse_document(html);
        let table = primary_table(&document)
            .ok_or_else(|| AppError::NoDataFound("no table in listing page".into()))?;

        let mut rows = table_rows(table).into_iter();
        let headers: Vec<Column> = rows
            .next()
            .map(|header| {
                row_cells(header)
                    .into_iter()
                    .map(|c| Column::from_header(&cell_text(c)))
                    .collect()
            })
            .unwrap_or_default();
        let tone_split = headers.iter().position(|c| matches!(c, Column::CombinedTone));

        let mut listing = Listing::default();
        for (offset, row) in rows.enumerate() {
            let position = RowPosition(offset);
            let cells = row_cells(row);
            if cells.is_empty() {
                continue;
            }

            let record = build_record(position, &headers, &cells, tone_split);
            if record.is_empty() {
                tracing::debug!(%position, "Skipping empty listing row");
                continue;
            }

            if let Some(url) = detail_url(cells[0], base_url) {
                listing.links.push(DetailLink {
                    url,
                    position,
                    echo: LinkEcho {
                        frequency: record.get("frequency").unwrap_or_default().to_string(),
                        callsign: record.get("call").unwrap_or_default().to_string(),
                        location: record.get("location").unwrap_or_default().to_string(),
                    },
                });
            }
            listing.records.push(record);
        }

        if listing.records.is_empty() {
            return Err(AppError::NoDataFound("listing table has no data rows".into()));
        }

        tracing::debug!(
            rows = listing.records.len(),
            columns = headers.len(),
            links = listing.links.len(),
            "Parsed listing table"
        );
        Ok(listing)
    }
}

/// A header cell, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Named(String),
    /// "Tone Up / Down" style column holding two values.
    CombinedTone,
}

impl Column {
    fn from_header(header: &str) -> Self {
        let lower = header.to_lowercase();
        if lower.contains("tone")
            && (lower.contains("up") || lower.contains("down") || lower.contains('/'))
        {
            return Column::CombinedTone;
        }
        Column::Named(normalize_header(header))
    }
}

/// Map a header to its column name.
pub fn normalize_header(header: &str) -> String {
    let header = header.trim();
    COLUMN_NAMES
        .iter()
        .find(|(label, _)| *label == header)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| header.to_lowercase().replace(' ', "_"))
}

/// Split a combined tone value into `(up, down)`.
///
/// Splits on `/` first, then on whitespace; a single value is the uplink tone.
pub fn split_tone(value: &str) -> (Option<String>, Option<String>) {
    let value = value.trim();
    let (up, down) = match value.split_once('/') {
        Some(parts) => parts,
        None => value
            .split_once(char::is_whitespace)
            .unwrap_or((value, "")),
    };
    let keep = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
    (keep(up), keep(down))
}

/// The table with the most rows; the first one wins a tie.
fn primary_table(document: &Html) -> Option<ElementRef<'_>> {
    let mut best: Option<(usize, ElementRef<'_>)> = None;
    for table in document.select(&TABLE) {
        let rows = table_rows(table).len();
        if best.is_none_or(|(most, _)| rows > most) {
            best = Some((rows, table));
        }
    }
    best.map(|(_, table)| table)
}

/// Rows that belong to `table` itself, not to tables nested in its cells.
fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|row| row.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .collect()
}

fn build_record(
    position: RowPosition,
    headers: &[Column],
    cells: &[ElementRef<'_>],
    tone_split: Option<usize>,
) -> BasicRecord {
    let mut record = BasicRecord::new(position);
    for (index, (column, cell)) in headers.iter().zip(cells).enumerate() {
        let value = cell_text(*cell);
        match column {
            Column::CombinedTone if Some(index) == tone_split => {
                let (up, down) = split_tone(&value);
                if let Some(up) = up {
                    record.insert("tone_up", up);
                }
                if let Some(down) = down {
                    record.insert("tone_down", down);
                }
            }
            Column::CombinedTone => {}
            Column::Named(name) => {
                if !value.is_empty() {
                    record.insert(name.as_str(), value);
                }
            }
        }
    }
    record
}

/// Resolved URL of the first detail-page anchor in `cell`.
fn detail_url(cell: ElementRef<'_>, base_url: &str) -> Option<String> {
    let href = cell
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.contains(DETAIL_PAGE_MARKER))?;
    match join(base_url, href.trim()) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            tracing::debug!(%href, error = %e, "Unresolvable detail link");
            None
        }
    }
}

/// Whitespace-normalized text content of a cell.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
