pub mod band;
pub mod config;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod listing;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod scratch;
pub mod status;
pub mod throttle;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use band::{Band, BandSelection};
pub use config::HarvestConfig;
pub use crawler::{CrawlOutcome, CrawlReporter, DetailCrawler, TracingCrawlReporter};
pub use error::AppError;
pub use listing::{ListingQuery, SearchLevel};
pub use models::{BasicRecord, DetailLink, DetailRecord, RowPosition, StructuredRow};
pub use pipeline::{HarvestMode, HarvestReport, HarvestRequest, HarvestService};
pub use traits::{Cleaner, Fetcher, ListingParser};
