pub mod cleaner;
pub mod fetcher;
pub mod listing;

pub use cleaner::HtmlCleaner;
pub use fetcher::ReqwestFetcher;
pub use listing::HtmlListingParser;
