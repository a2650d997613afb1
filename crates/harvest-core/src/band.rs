//! Amateur band selection and frequency filtering.
//!
//! Filtering never renumbers rows: surviving records keep the
//! [`RowPosition`] they had in the listing, and links are narrowed by that
//! same set of positions.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;
use crate::models::{BasicRecord, DetailLink, RowPosition};

/// A supported amateur band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    SixMeters,
    FourMeters,
    TwoMeters,
    SeventyCentimeters,
    ThirtyThreeCentimeters,
    TwentyThreeCentimeters,
}

impl Band {
    pub const ALL: [Band; 6] = [
        Band::SixMeters,
        Band::FourMeters,
        Band::TwoMeters,
        Band::SeventyCentimeters,
        Band::ThirtyThreeCentimeters,
        Band::TwentyThreeCentimeters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::SixMeters => "6m",
            Band::FourMeters => "4m",
            Band::TwoMeters => "2m",
            Band::SeventyCentimeters => "70cm",
            Band::ThirtyThreeCentimeters => "33cm",
            Band::TwentyThreeCentimeters => "23cm",
        }
    }

    /// Inclusive frequency span in MHz.
    pub fn range_mhz(&self) -> (f64, f64) {
        match self {
            Band::SixMeters => (50.0, 54.0),
            Band::FourMeters => (70.0, 70.5),
            Band::TwoMeters => (144.0, 148.0),
            Band::SeventyCentimeters => (420.0, 450.0),
            Band::ThirtyThreeCentimeters => (902.0, 928.0),
            Band::TwentyThreeCentimeters => (1240.0, 1300.0),
        }
    }

    pub fn contains(&self, mhz: f64) -> bool {
        let (lo, hi) = self.range_mhz();
        (lo..=hi).contains(&mhz)
    }

    /// Value of the listing endpoint's `band` query parameter.
    pub fn listing_param(&self) -> &'static str {
        match self {
            Band::SixMeters => "6m",
            Band::FourMeters => "4m",
            Band::TwoMeters => "2m",
            Band::SeventyCentimeters => "440",
            Band::ThirtyThreeCentimeters => "900",
            Band::TwentyThreeCentimeters => "1200",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Band {
    type Err = AppError;

    /// Parses band names and the `vhf`/`uhf` aliases, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "6m" => Ok(Band::SixMeters),
            "4m" => Ok(Band::FourMeters),
            "2m" | "vhf" => Ok(Band::TwoMeters),
            "70cm" | "uhf" => Ok(Band::SeventyCentimeters),
            "33cm" => Ok(Band::ThirtyThreeCentimeters),
            "23cm" => Ok(Band::TwentyThreeCentimeters),
            _ => Err(AppError::InvalidBand(s.trim().to_string())),
        }
    }
}

/// Which bands a harvest keeps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BandSelection {
    #[default]
    All,
    Only(Vec<Band>),
}

impl BandSelection {
    /// Validate and normalize a user-supplied band list.
    ///
    /// An empty list, or any entry equal to `all`, selects every band.
    /// Aliases are normalized and duplicates dropped, keeping first-seen order.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, AppError> {
        let mut bands: Vec<Band> = Vec::new();
        let mut all = names.is_empty();
        for name in names {
            let name = name.as_ref();
            if name.trim().eq_ignore_ascii_case("all") {
                all = true;
                continue;
            }
            let band: Band = name.parse().map_err(|_| {
                let supported = Band::ALL
                    .iter()
                    .map(Band::as_str)
                    .chain(["all"])
                    .collect::<Vec<_>>()
                    .join(", ");
                AppError::InvalidBand(format!("{} (supported: {supported})", name.trim()))
            })?;
            if !bands.contains(&band) {
                bands.push(band);
            }
        }
        let selection = if all || bands.is_empty() {
            BandSelection::All
        } else {
            BandSelection::Only(bands)
        };
        tracing::debug!(requested = names.len(), ?selection, "Validated bands");
        Ok(selection)
    }

    /// Listing `band` parameter: a single band maps to its own code,
    /// anything else asks for everything and relies on local filtering.
    pub fn listing_param(&self) -> &'static str {
        match self {
            BandSelection::Only(bands) if bands.len() == 1 => bands[0].listing_param(),
            _ => "All",
        }
    }

    pub fn matches(&self, mhz: f64) -> bool {
        match self {
            BandSelection::All => true,
            BandSelection::Only(bands) => bands.iter().any(|b| b.contains(mhz)),
        }
    }

    /// Human-readable summary, e.g. `"2m and 70cm bands"`.
    pub fn describe(&self) -> String {
        let bands = match self {
            BandSelection::All => return "all bands".to_string(),
            BandSelection::Only(bands) => bands,
        };
        let names: Vec<&str> = bands.iter().map(Band::as_str).collect();
        match names.as_slice() {
            [] => "all bands".to_string(),
            [one] => format!("{one} band"),
            [a, b] => format!("{a} and {b} bands"),
            [init @ .., last] => format!("{}, and {last} bands", init.join(", ")),
        }
    }
}

/// Numeric frequency of a record, if its `frequency` column parses.
pub fn record_frequency(record: &BasicRecord) -> Option<f64> {
    record.get("frequency")?.parse::<f64>().ok()
}

/// Keep records whose frequency falls inside any selected band.
///
/// Records with a missing or non-numeric frequency fail every band test.
/// Retained records keep their original position.
pub fn filter_records(records: Vec<BasicRecord>, selection: &BandSelection) -> Vec<BasicRecord> {
    let bands = match selection {
        BandSelection::All => {
            tracing::debug!("Band filter set to all, returning every record");
            return records;
        }
        BandSelection::Only(bands) => bands,
    };

    let total = records.len();
    let mut per_band = vec![0usize; bands.len()];
    let kept: Vec<BasicRecord> = records
        .into_iter()
        .filter(|record| {
            let Some(mhz) = record_frequency(record) else {
                return false;
            };
            let mut hit = false;
            for (i, band) in bands.iter().enumerate() {
                if band.contains(mhz) {
                    per_band[i] += 1;
                    hit = true;
                }
            }
            hit
        })
        .collect();

    for (band, count) in bands.iter().zip(&per_band) {
        let (lo, hi) = band.range_mhz();
        tracing::debug!(band = %band, lo, hi, matches = count, "Band matches");
    }
    tracing::info!(
        kept = kept.len(),
        total,
        bands = %selection.describe(),
        "Band filtering complete"
    );
    kept
}

/// Keep links whose position survived record filtering.
pub fn filter_links(links: Vec<DetailLink>, records: &[BasicRecord]) -> Vec<DetailLink> {
    let retained: BTreeSet<RowPosition> = records.iter().map(|r| r.position).collect();
    let before = links.len();
    let kept: Vec<DetailLink> = links
        .into_iter()
        .filter(|link| retained.contains(&link.position))
        .collect();
    tracing::debug!(before, after = kept.len(), "Filtered detail links by retained positions");
    kept
}
