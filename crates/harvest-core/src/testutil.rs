//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::crawler::{CrawlEvent, CrawlReporter};
use crate::error::AppError;
use crate::models::{Listing, Page};
use crate::traits::{Cleaner, Fetcher, ListingParser};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher with per-URL routes and a fallback response queue.
///
/// A routed URL always returns its route (errors become
/// [`AppError::HttpError`]). Any other URL pops the first queued response,
/// or returns a default HTML string once the queue is empty. Every
/// requested URL is recorded.
#[derive(Clone, Default)]
pub struct MockFetcher {
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    routes: Arc<Mutex<HashMap<String, Result<String, String>>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Always answer `url` with `body`.
    pub fn with_route(self, url: &str, body: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.to_string()));
        self
    }

    /// Always fail `url` with an HTTP error carrying `message`.
    pub fn with_route_error(self, url: &str, message: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(message.to_string()));
        self
    }

    /// URLs fetched so far, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.requested.lock().unwrap().push(url.to_string());

        if let Some(route) = self.routes.lock().unwrap().get(url) {
            return route.clone().map_err(AppError::HttpError);
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// PassthroughCleaner
// ---------------------------------------------------------------------------

/// Cleaner that treats its input as already-visible text.
///
/// Whitespace-separated tokens starting with `http://` or `https://` are
/// reported as page links.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCleaner;

impl Cleaner for PassthroughCleaner {
    fn clean(&self, html: &str) -> Result<Page, AppError> {
        let links = html
            .split_whitespace()
            .filter(|t| t.starts_with("http://") || t.starts_with("https://"))
            .map(str::to_string)
            .collect();
        Ok(Page {
            text: html.to_string(),
            links,
        })
    }
}

// ---------------------------------------------------------------------------
// MockListingParser
// ---------------------------------------------------------------------------

/// Parser that returns a fixed listing and records the base URLs it was given.
#[derive(Clone)]
pub struct MockListingParser {
    listing: Listing,
    error: Arc<Mutex<Option<AppError>>>,
    base_urls: Arc<Mutex<Vec<String>>>,
}

impl MockListingParser {
    pub fn new(listing: Listing) -> Self {
        Self {
            listing,
            error: Arc::new(Mutex::new(None)),
            base_urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fails the first parse with `error`.
    pub fn with_error(error: AppError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
            ..Self::new(Listing::default())
        }
    }

    pub fn base_urls(&self) -> Vec<String> {
        self.base_urls.lock().unwrap().clone()
    }
}

impl ListingParser for MockListingParser {
    fn parse_listing(&self, _html: &str, base_url: &str) -> Result<Listing, AppError> {
        self.base_urls.lock().unwrap().push(base_url.to_string());
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(self.listing.clone())
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock crawl reporter that records event names.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl CrawlReporter for MockReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let label = match &event {
            CrawlEvent::Started { .. } => "Started",
            CrawlEvent::ItemStarted { .. } => "ItemStarted",
            CrawlEvent::ItemExtracted { .. } => "ItemExtracted",
            CrawlEvent::NoDetailData { .. } => "NoDetailData",
            CrawlEvent::ItemFailed { .. } => "ItemFailed",
            CrawlEvent::Progress { .. } => "Progress",
            CrawlEvent::Finished { .. } => "Finished",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}
