use std::future::Future;

use crate::error::AppError;
use crate::models::{Listing, Page};

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Reduces raw HTML to its visible text and anchor targets.
///
/// The text keeps one line per block of text so that line-oriented
/// `label: value` patterns can be matched against it.
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, html: &str) -> Result<Page, AppError>;
}

/// Parses a listing page into basic records and detail links.
pub trait ListingParser: Send + Sync + Clone {
    /// Parse the primary table of `html`.
    ///
    /// Returns [`AppError::NoDataFound`] when there is no table or the
    /// table has no data rows. Relative detail links are resolved against
    /// `base_url`.
    fn parse_listing(&self, html: &str, base_url: &str) -> Result<Listing, AppError>;
}
