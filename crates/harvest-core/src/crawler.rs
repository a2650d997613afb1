use std::collections::BTreeMap;

use crate::error::AppError;
use crate::extract;
use crate::models::{DetailLink, DetailRecord, RowPosition};
use crate::scratch::ScratchDir;
use crate::status::{self, StatusNetwork};
use crate::traits::{Cleaner, Fetcher};

/// Events emitted by the crawler for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    Started {
        total: usize,
    },
    ItemStarted {
        index: usize,
        total: usize,
        link: &'a DetailLink,
    },
    ItemExtracted {
        position: RowPosition,
        detail: &'a DetailRecord,
    },
    NoDetailData {
        position: RowPosition,
        url: &'a str,
    },
    ItemFailed {
        position: RowPosition,
        url: &'a str,
        error: &'a AppError,
    },
    Progress {
        processed: usize,
        total: usize,
    },
    Finished {
        processed: usize,
        total: usize,
        failed: usize,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
///
/// With `verbose` set, every extracted field is logged at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter {
    pub verbose: bool,
}

impl TracingCrawlReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::Started { total } => {
                tracing::info!(%total, "Collecting detail pages");
            }
            CrawlEvent::ItemStarted { index, total, link } => {
                tracing::debug!(
                    item = index + 1,
                    %total,
                    position = %link.position,
                    frequency = %link.echo.frequency,
                    callsign = %link.echo.callsign,
                    location = %link.echo.location,
                    url = %link.url,
                    "Fetching detail page"
                );
            }
            CrawlEvent::ItemExtracted { position, detail } => {
                if self.verbose {
                    for (field, value) in detail.field_pairs() {
                        tracing::debug!(%position, %field, %value, "Extracted field");
                    }
                }
            }
            CrawlEvent::NoDetailData { position, url } => {
                tracing::debug!(%position, %url, "No detail data");
            }
            CrawlEvent::ItemFailed {
                position,
                url,
                error,
            } => {
                if error.is_network() {
                    tracing::warn!(%position, %url, %error, "Detail fetch failed");
                } else {
                    tracing::debug!(%position, %url, %error, "Detail page skipped");
                }
            }
            CrawlEvent::Progress { processed, total } => {
                tracing::info!("Processed {}/{} detail pages", processed, total);
            }
            CrawlEvent::Finished {
                processed,
                total,
                failed,
            } => {
                tracing::info!(%failed, "Processed {}/{} detail pages", processed, total);
            }
        }
    }
}

/// A detail page that could not be fetched or cleaned.
#[derive(Debug)]
pub struct FailedItem {
    pub position: RowPosition,
    pub url: String,
    pub error: AppError,
}

/// Everything a crawl produced.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    /// Records with at least one extracted field, keyed by row position.
    pub details: BTreeMap<RowPosition, DetailRecord>,
    pub attempted: usize,
    pub failed: Vec<FailedItem>,
}

impl CrawlOutcome {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failed.len()
    }
}

/// Crawl behaviour switches.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub progress_every: usize,
    pub resolve_status: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            progress_every: crate::config::DEFAULT_PROGRESS_EVERY,
            resolve_status: true,
        }
    }
}

/// Visits detail pages one at a time and mines them for fields.
///
/// Pacing is the fetcher's job; wrap it in a
/// [`ThrottledFetcher`](crate::throttle::ThrottledFetcher) so detail and
/// status-page requests share one limiter.
pub struct DetailCrawler<F, C>
where
    F: Fetcher,
    C: Cleaner,
{
    fetcher: F,
    cleaner: C,
    config: CrawlerConfig,
}

impl<F, C> DetailCrawler<F, C>
where
    F: Fetcher,
    C: Cleaner,
{
    pub fn new(fetcher: F, cleaner: C, config: CrawlerConfig) -> Self {
        Self {
            fetcher,
            cleaner,
            config,
        }
    }

    /// Crawl every link in order. Item failures are recorded, never fatal.
    pub async fn crawl<R: CrawlReporter>(
        &self,
        links: &[DetailLink],
        scratch: Option<&ScratchDir>,
        reporter: &R,
    ) -> CrawlOutcome {
        let total = links.len();
        let every = self.config.progress_every.max(1);
        let mut outcome = CrawlOutcome::default();
        reporter.report(CrawlEvent::Started { total });

        for (index, link) in links.iter().enumerate() {
            reporter.report(CrawlEvent::ItemStarted { index, total, link });
            outcome.attempted += 1;

            match self.visit(&link.url).await {
                Ok(detail) if detail.is_empty() => {
                    reporter.report(CrawlEvent::NoDetailData {
                        position: link.position,
                        url: &link.url,
                    });
                }
                Ok(detail) => {
                    reporter.report(CrawlEvent::ItemExtracted {
                        position: link.position,
                        detail: &detail,
                    });
                    if let Some(scratch) = scratch
                        && let Err(e) = scratch.write_detail(link.position, &detail)
                    {
                        tracing::debug!(
                            position = %link.position,
                            error = %e,
                            "Could not save detail snapshot"
                        );
                    }
                    outcome.details.insert(link.position, detail);
                }
                Err(error) => {
                    reporter.report(CrawlEvent::ItemFailed {
                        position: link.position,
                        url: &link.url,
                        error: &error,
                    });
                    outcome.failed.push(FailedItem {
                        position: link.position,
                        url: link.url.clone(),
                        error,
                    });
                }
            }

            let processed = index + 1;
            if processed % every == 0 && processed < total {
                reporter.report(CrawlEvent::Progress { processed, total });
            }
        }

        reporter.report(CrawlEvent::Finished {
            processed: outcome.attempted,
            total,
            failed: outcome.failed.len(),
        });
        outcome
    }

    /// Fetch one detail page and extract everything from it.
    async fn visit(&self, url: &str) -> Result<DetailRecord, AppError> {
        let html = self.fetcher.fetch(url).await?;
        let page = self.cleaner.clean(&html)?;
        let mut detail = extract::extract_detail(&page.text);

        for network in StatusNetwork::ALL {
            let Some(mut block) = network.detect(&page.text) else {
                continue;
            };
            tracing::debug!(%network, node = %block.node, %url, "Status node found");
            if self.config.resolve_status {
                status::resolve_status(
                    network,
                    &mut block,
                    &page.links,
                    &self.fetcher,
                    &self.cleaner,
                )
                .await;
            }
            match network {
                StatusNetwork::EchoLink => detail.echolink = Some(block),
                StatusNetwork::Irlp => detail.irlp = Some(block),
            }
        }

        Ok(detail)
    }
}
