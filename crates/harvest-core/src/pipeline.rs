use crate::band::{filter_links, filter_records};
use crate::config::HarvestConfig;
use crate::crawler::{
    CrawlOutcome, CrawlReporter, CrawlerConfig, DetailCrawler, TracingCrawlReporter,
};
use crate::error::AppError;
use crate::listing::{ListingQuery, fetch_listing};
use crate::merge::structure;
use crate::models::{BasicRecord, StructuredRow};
use crate::scratch::ScratchDir;
use crate::throttle::ThrottledFetcher;
use crate::traits::{Cleaner, Fetcher, ListingParser};

/// How far a harvest goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HarvestMode {
    /// Listing table only.
    #[default]
    Basic,
    /// Listing, then every retained detail page, merged into structured rows.
    Detailed,
}

#[derive(Debug, Clone)]
pub struct HarvestRequest {
    pub query: ListingQuery,
    pub mode: HarvestMode,
}

impl HarvestRequest {
    pub fn new(query: ListingQuery, mode: HarvestMode) -> Self {
        Self { query, mode }
    }
}

/// Result of one harvest run.
#[derive(Debug, Default)]
pub struct HarvestReport {
    pub mode: HarvestMode,
    /// Basic records that survived the band filter, in listing order.
    pub records: Vec<BasicRecord>,
    /// Structured rows, one per retained record. Empty in basic mode.
    pub rows: Vec<StructuredRow>,
    pub listed: usize,
    pub links_found: usize,
    pub links_retained: usize,
    /// Present only when detail pages were crawled.
    pub crawl: Option<CrawlOutcome>,
}

impl HarvestReport {
    pub fn retained(&self) -> usize {
        self.records.len()
    }
}

/// Orchestrates the harvest: listing → filter → detail crawl → merge.
///
/// Every request (listing, detail and status pages) goes through one
/// [`ThrottledFetcher`] built from the configured pacing mode.
pub struct HarvestService<F, C, P>
where
    F: Fetcher,
    C: Cleaner,
    P: ListingParser,
{
    fetcher: ThrottledFetcher<F>,
    cleaner: C,
    parser: P,
    config: HarvestConfig,
}

impl<F, C, P> HarvestService<F, C, P>
where
    F: Fetcher,
    C: Cleaner,
    P: ListingParser,
{
    pub fn new(fetcher: F, cleaner: C, parser: P, config: HarvestConfig) -> Self {
        Self {
            fetcher: ThrottledFetcher::new(fetcher, config.pacing),
            cleaner,
            parser,
            config,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Run a harvest, logging crawl progress through `tracing`.
    pub async fn harvest(&self, request: &HarvestRequest) -> Result<HarvestReport, AppError> {
        let reporter = TracingCrawlReporter::new(self.config.verbose);
        self.harvest_with(request, &reporter).await
    }

    /// Run a harvest with a custom crawl reporter.
    ///
    /// 1. Fetch and parse the listing (fatal on error)
    /// 2. Filter records by band, then links by surviving row positions
    /// 3. In detailed mode: snapshot, crawl detail pages, merge
    pub async fn harvest_with<R: CrawlReporter>(
        &self,
        request: &HarvestRequest,
        reporter: &R,
    ) -> Result<HarvestReport, AppError> {
        // 1. Listing
        let listing = fetch_listing(
            &self.fetcher,
            &self.parser,
            &self.config.base_url,
            &request.query,
        )
        .await?;
        let listed = listing.records.len();
        let links_found = listing.links.len();

        // 2. Filter
        let records = filter_records(listing.records, &request.query.bands);
        let links = filter_links(listing.links, &records);
        tracing::info!(
            retained = records.len(),
            %listed,
            links = links.len(),
            bands = %request.query.bands.describe(),
            "Filtered listing"
        );

        let mut report = HarvestReport {
            mode: request.mode,
            listed,
            links_found,
            links_retained: links.len(),
            ..HarvestReport::default()
        };

        if records.is_empty() {
            tracing::warn!(
                location = %request.query,
                bands = %request.query.bands.describe(),
                "No repeaters left after filtering"
            );
            return Ok(report);
        }

        if request.mode == HarvestMode::Basic {
            report.records = records;
            return Ok(report);
        }

        // 3. Detail crawl
        let scratch = self.scratch_dir(&records);
        let crawler = DetailCrawler::new(
            self.fetcher.clone(),
            self.cleaner.clone(),
            CrawlerConfig {
                progress_every: self.config.progress_every,
                resolve_status: self.config.resolve_status,
            },
        );
        let outcome = crawler.crawl(&links, scratch.as_ref(), reporter).await;

        // 4. Merge
        report.rows = structure(&records, &outcome.details);
        tracing::info!(
            rows = report.rows.len(),
            enriched = outcome.details.len(),
            failed = outcome.failed.len(),
            "Harvest complete"
        );
        report.records = records;
        report.crawl = Some(outcome);
        Ok(report)
    }

    /// Best-effort scratch directory with the basic snapshot written.
    fn scratch_dir(&self, records: &[BasicRecord]) -> Option<ScratchDir> {
        let scratch = match ScratchDir::create(self.config.scratch_root.as_deref()) {
            Ok(scratch) => scratch,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Could not create scratch directory, continuing without it"
                );
                return None;
            }
        };
        if let Err(e) = scratch.write_basic(records) {
            tracing::debug!(error = %e, "Could not save basic snapshot");
        }
        Some(scratch)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::band::{Band, BandSelection};
    use crate::models::{DetailLink, LinkEcho, Listing, RowPosition};
    use crate::testutil::{MockFetcher, MockListingParser, MockReporter, PassthroughCleaner};
    use crate::throttle::PacingMode;

    fn test_config() -> HarvestConfig {
        HarvestConfig::default()
            .with_base_url("http://dir.test")
            .with_pacing(PacingMode::fixed(Duration::ZERO))
    }

    fn three_row_listing() -> Listing {
        let record = |pos: usize, freq: &str, call: &str| {
            BasicRecord::from_pairs(
                RowPosition(pos),
                [("frequency", freq), ("call", call), ("location", "Town")],
            )
        };
        let link = |pos: usize| DetailLink {
            url: format!("http://dir.test/repeaters/details.php?ID={pos}"),
            position: RowPosition(pos),
            echo: LinkEcho::default(),
        };
        Listing {
            records: vec![
                record(0, "146.940", "W1AAA"),
                record(1, "147.120", "W1BBB"),
                record(2, "444.500", "W1CCC"),
            ],
            links: vec![link(0), link(2)],
        }
    }

    fn two_meter_request(mode: HarvestMode) -> HarvestRequest {
        HarvestRequest::new(
            ListingQuery::state("CT").with_bands(BandSelection::Only(vec![Band::TwoMeters])),
            mode,
        )
    }

    #[tokio::test]
    async fn test_end_to_end_filtered_crawl() {
        let fetcher = MockFetcher::new("<listing/>").with_route(
            "http://dir.test/repeaters/details.php?ID=0",
            "Downlink: 146.940\nUplink: 146.340\nOffset: -0.600 MHz\nSponsor: Hill ARC",
        );
        let service = HarvestService::new(
            fetcher.clone(),
            PassthroughCleaner,
            MockListingParser::new(three_row_listing()),
            test_config(),
        );

        let report = service
            .harvest_with(&two_meter_request(HarvestMode::Detailed), &MockReporter::new())
            .await
            .unwrap();

        assert_eq!(report.listed, 3);
        assert_eq!(report.retained(), 2);
        assert_eq!(report.links_found, 2);
        assert_eq!(report.links_retained, 1);

        let urls = fetcher.requested_urls();
        assert_eq!(urls.len(), 2, "one listing fetch and one detail fetch: {urls:?}");
        assert_eq!(urls[1], "http://dir.test/repeaters/details.php?ID=0");

        assert_eq!(report.rows.len(), 2);
        let enriched = &report.rows[0];
        assert_eq!(enriched.position, RowPosition(0));
        assert_eq!(enriched.downlink, "146.940");
        assert_eq!(enriched.offset, "-0.600");
        assert_eq!(enriched.sponsor, "Hill ARC");
        assert_eq!(enriched.call, "W1AAA");

        let basic_only = &report.rows[1];
        assert_eq!(basic_only.position, RowPosition(1));
        assert_eq!(basic_only.call, "W1BBB");
        assert_eq!(basic_only.downlink, "147.120");
        assert_eq!(basic_only.dmr, "false");
        assert_eq!(basic_only.notes, "Location: Town");

        let crawl = report.crawl.unwrap();
        assert_eq!(crawl.attempted, 1);
        assert!(crawl.failed.is_empty());
    }

    #[tokio::test]
    async fn test_basic_mode_skips_detail_pages() {
        let fetcher = MockFetcher::new("<listing/>");
        let service = HarvestService::new(
            fetcher.clone(),
            PassthroughCleaner,
            MockListingParser::new(three_row_listing()),
            test_config(),
        );

        let report = service
            .harvest(&two_meter_request(HarvestMode::Basic))
            .await
            .unwrap();

        assert_eq!(fetcher.requested_urls().len(), 1);
        assert_eq!(report.records.len(), 2);
        assert!(report.rows.is_empty());
        assert!(report.crawl.is_none());
    }

    #[tokio::test]
    async fn test_nothing_left_after_filter_returns_empty_report() {
        let fetcher = MockFetcher::new("<listing/>");
        let service = HarvestService::new(
            fetcher.clone(),
            PassthroughCleaner,
            MockListingParser::new(three_row_listing()),
            test_config(),
        );
        let request = HarvestRequest::new(
            ListingQuery::state("CT").with_bands(BandSelection::Only(vec![Band::SixMeters])),
            HarvestMode::Detailed,
        );

        let report = service.harvest(&request).await.unwrap();

        assert_eq!(report.listed, 3);
        assert_eq!(report.retained(), 0);
        assert!(report.rows.is_empty());
        assert!(report.crawl.is_none());
        assert_eq!(fetcher.requested_urls().len(), 1);
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let service = HarvestService::new(
            MockFetcher::with_error(AppError::Timeout(30)),
            PassthroughCleaner,
            MockListingParser::new(three_row_listing()),
            test_config(),
        );

        let err = service
            .harvest(&two_meter_request(HarvestMode::Detailed))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(30)));
    }

    #[tokio::test]
    async fn test_failed_detail_degrades_to_basic_row() {
        let fetcher = MockFetcher::new("<listing/>").with_route_error(
            "http://dir.test/repeaters/details.php?ID=0",
            "HTTP 404 for http://dir.test/repeaters/details.php?ID=0",
        );
        let service = HarvestService::new(
            fetcher,
            PassthroughCleaner,
            MockListingParser::new(three_row_listing()),
            test_config(),
        );

        let report = service
            .harvest(&two_meter_request(HarvestMode::Detailed))
            .await
            .unwrap();

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].call, "W1AAA");
        assert_eq!(report.rows[0].downlink, "146.940");
        assert_eq!(report.crawl.unwrap().failed.len(), 1);
    }

    #[tokio::test]
    async fn test_scratch_dir_is_cleaned_up() {
        let root = tempfile::tempdir().unwrap();
        let service = HarvestService::new(
            MockFetcher::new("<listing/>").with_route(
                "http://dir.test/repeaters/details.php?ID=0",
                "Downlink: 146.940",
            ),
            PassthroughCleaner,
            MockListingParser::new(three_row_listing()),
            test_config().with_scratch_root(root.path()),
        );

        service
            .harvest(&two_meter_request(HarvestMode::Detailed))
            .await
            .unwrap();

        let leftovers = std::fs::read_dir(root.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
