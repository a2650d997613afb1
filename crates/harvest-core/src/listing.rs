//! Location queries against the directory's search page.

use std::fmt;

use url::Url;

use crate::band::BandSelection;
use crate::error::AppError;
use crate::models::Listing;
use crate::traits::{Fetcher, ListingParser};

/// Path of the location search page, relative to the base URL.
pub const SEARCH_PATH: &str = "repeaters/location_search.php";
/// Directory detail links are relative to this path.
pub const DETAIL_BASE_PATH: &str = "repeaters/";
pub const DEFAULT_COUNTRY: &str = "United States";

/// Two-letter state code to the directory's numeric state id.
const STATE_IDS: &[(&str, &str)] = &[
    ("AL", "01"),
    ("AK", "02"),
    ("AZ", "04"),
    ("AR", "05"),
    ("CA", "06"),
    ("CO", "08"),
    ("CT", "09"),
    ("DE", "10"),
    ("DC", "11"),
    ("FL", "12"),
    ("GA", "13"),
    ("HI", "15"),
    ("ID", "16"),
    ("IL", "17"),
    ("IN", "18"),
    ("IA", "19"),
    ("KS", "20"),
    ("KY", "21"),
    ("LA", "22"),
    ("ME", "23"),
    ("MD", "24"),
    ("MA", "25"),
    ("MI", "26"),
    ("MN", "27"),
    ("MS", "28"),
    ("MO", "29"),
    ("MT", "30"),
    ("NE", "31"),
    ("NV", "32"),
    ("NH", "33"),
    ("NJ", "34"),
    ("NM", "35"),
    ("NY", "36"),
    ("NC", "37"),
    ("ND", "38"),
    ("OH", "39"),
    ("OK", "40"),
    ("OR", "41"),
    ("PA", "42"),
    ("RI", "44"),
    ("SC", "45"),
    ("SD", "46"),
    ("TN", "47"),
    ("TX", "48"),
    ("UT", "49"),
    ("VT", "50"),
    ("VA", "51"),
    ("WA", "53"),
    ("WV", "54"),
    ("WI", "55"),
    ("WY", "56"),
];

/// Numeric state id for a two-letter code. Unknown codes pass through as given.
pub fn state_id(code: &str) -> String {
    let upper = code.trim().to_ascii_uppercase();
    STATE_IDS
        .iter()
        .find(|(c, _)| *c == upper)
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| code.trim().to_string())
}

/// Geographic scope of a listing search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchLevel {
    State,
    County(String),
    City(String),
}

impl SearchLevel {
    pub fn kind(&self) -> &'static str {
        match self {
            SearchLevel::State => "state",
            SearchLevel::County(_) => "county",
            SearchLevel::City(_) => "city",
        }
    }

    fn location(&self) -> Option<&str> {
        match self {
            SearchLevel::State => None,
            SearchLevel::County(name) | SearchLevel::City(name) => Some(name.as_str()),
        }
    }
}

/// A listing search: where, and which bands the server should pre-filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    pub level: SearchLevel,
    pub state: String,
    pub country: String,
    pub bands: BandSelection,
}

impl ListingQuery {
    pub fn state(state: impl Into<String>) -> Self {
        Self {
            level: SearchLevel::State,
            state: state.into(),
            country: DEFAULT_COUNTRY.to_string(),
            bands: BandSelection::All,
        }
    }

    pub fn county(state: impl Into<String>, county: impl Into<String>) -> Self {
        Self {
            level: SearchLevel::County(county.into()),
            ..Self::state(state)
        }
    }

    pub fn city(state: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            level: SearchLevel::City(city.into()),
            ..Self::state(state)
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_bands(mut self, bands: BandSelection) -> Self {
        self.bands = bands;
        self
    }

    /// Full search URL under `base_url`.
    pub fn url(&self, base_url: &str) -> Result<Url, AppError> {
        let mut url = join(base_url, SEARCH_PATH)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("state_id", &state_id(&self.state));
            pairs.append_pair("band", self.bands.listing_param());
            pairs.append_pair("type", self.level.kind());
            if let Some(loc) = self.level.location() {
                pairs.append_pair("loc", loc);
            }
        }
        Ok(url)
    }
}

impl fmt::Display for ListingQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.level {
            SearchLevel::State => write!(f, "State {}", self.state)?,
            SearchLevel::County(county) => write!(f, "{county} County, {}", self.state)?,
            SearchLevel::City(city) => write!(f, "{city}, {}", self.state)?,
        }
        if self.country != DEFAULT_COUNTRY {
            write!(f, ", {}", self.country)?;
        }
        Ok(())
    }
}

/// Resolve `path` under `base_url`, treating the base as a directory.
pub fn join(base_url: &str, path: &str) -> Result<Url, AppError> {
    let base = if base_url.ends_with('/') {
        Url::parse(base_url)
    } else {
        Url::parse(&format!("{base_url}/"))
    }
    .map_err(|e| AppError::ConfigError(format!("invalid base URL '{base_url}': {e}")))?;
    base.join(path)
        .map_err(|e| AppError::ConfigError(format!("cannot join '{path}' to '{base_url}': {e}")))
}

/// Fetch and parse one listing page.
///
/// Any failure here is fatal to the harvest: there is nothing to crawl
/// without the listing.
pub async fn fetch_listing<F: Fetcher, P: ListingParser>(
    fetcher: &F,
    parser: &P,
    base_url: &str,
    query: &ListingQuery,
) -> Result<Listing, AppError> {
    let url = query.url(base_url)?;
    tracing::info!(location = %query, bands = %query.bands.describe(), "Fetching listing");
    tracing::debug!(%url, "Listing URL");

    let html = fetcher.fetch(url.as_str()).await?;
    tracing::debug!(bytes = html.len(), "Fetched listing page");

    let detail_base = join(base_url, DETAIL_BASE_PATH)?;
    let listing = parser
        .parse_listing(&html, detail_base.as_str())
        .map_err(|e| match e {
            AppError::NoDataFound(msg) => AppError::NoDataFound(format!("{query}: {msg}")),
            other => other,
        })?;

    tracing::info!(
        records = listing.records.len(),
        links = listing.links.len(),
        "Parsed listing"
    );
    Ok(listing)
}
