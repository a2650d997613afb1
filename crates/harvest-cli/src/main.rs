use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use harvest_client::{HtmlCleaner, HtmlListingParser, ReqwestFetcher};
use harvest_core::band::Band;
use harvest_core::config::parse_rate_limit;
use harvest_core::models::union_columns;
use harvest_core::throttle::PacingMode;
use harvest_core::{
    BandSelection, BasicRecord, HarvestConfig, HarvestMode, HarvestReport, HarvestRequest,
    HarvestService, ListingQuery, StructuredRow,
};

#[derive(Parser)]
#[command(name = "harvest", version, about = "Amateur radio repeater directory harvester")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download repeaters for a state, county or city as CSV
    Download {
        /// State/province code (e.g., "CA", "TX")
        #[arg(short, long)]
        state: String,

        /// County name to search within
        #[arg(long, conflicts_with = "city")]
        county: Option<String>,

        /// City name to search within
        #[arg(long)]
        city: Option<String>,

        /// Country name
        #[arg(short, long, default_value = harvest_core::listing::DEFAULT_COUNTRY)]
        country: String,

        /// Band(s) to keep (e.g., 2m, 70cm, all). Repeatable or comma separated.
        #[arg(short, long = "band", value_delimiter = ',')]
        bands: Vec<String>,

        /// Skip detail pages and emit the listing table as-is
        #[arg(long, default_value_t = false)]
        basic: bool,

        /// Output CSV path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Minimum seconds between requests (overrides HARVEST_RATE_LIMIT)
        #[arg(long)]
        rate_limit: Option<String>,

        /// Random 1-10 second delay between requests
        #[arg(short, long, default_value_t = false)]
        nohammer: bool,

        /// Parent directory for the run's scratch files (overrides HARVEST_TEMP_DIR)
        #[arg(long)]
        temp_dir: Option<PathBuf>,

        /// Directory root URL (overrides HARVEST_BASE_URL)
        #[arg(long)]
        base_url: Option<String>,

        /// Request timeout in seconds (overrides HARVEST_TIMEOUT_SECS)
        #[arg(long)]
        timeout: Option<u64>,

        /// Do not follow EchoLink/IRLP status links
        #[arg(long, default_value_t = false)]
        no_status: bool,

        /// Log every field extracted from each detail page
        #[arg(long, default_value_t = false)]
        debug: bool,
    },

    /// List the supported bands
    Bands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let debug = cli.verbose || matches!(cli.command, Commands::Download { debug: true, .. });
    let directive = if debug { "harvest=debug" } else { "harvest=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Download {
            state,
            county,
            city,
            country,
            bands,
            basic,
            output,
            rate_limit,
            nohammer,
            temp_dir,
            base_url,
            timeout,
            no_status,
            debug,
        } => {
            let mut config = HarvestConfig::from_env().context("Invalid HARVEST_* environment")?;
            if let Some(url) = base_url {
                config = config.with_base_url(url.trim_end_matches('/'));
            }
            if let Some(secs) = timeout {
                anyhow::ensure!(secs > 0, "--timeout must be at least 1 second");
                config = config.with_timeout(Duration::from_secs(secs));
            }
            if let Some(raw) = rate_limit {
                config = config.with_pacing(PacingMode::fixed(parse_rate_limit(&raw)?));
            }
            if nohammer {
                config = config.with_pacing(PacingMode::polite());
            }
            if let Some(dir) = temp_dir {
                config = config.with_scratch_root(dir);
            }
            config = config.with_verbose(debug).with_resolve_status(!no_status);

            let bands = BandSelection::parse(&bands)?;
            let query = match (county, city) {
                (Some(county), _) => ListingQuery::county(&state, county),
                (None, Some(city)) => ListingQuery::city(&state, city),
                (None, None) => ListingQuery::state(&state),
            }
            .with_country(country)
            .with_bands(bands);
            let mode = if basic {
                HarvestMode::Basic
            } else {
                HarvestMode::Detailed
            };

            cmd_download(config, HarvestRequest::new(query, mode), output).await?;
        }
        Commands::Bands => cmd_bands(),
    }

    Ok(())
}

async fn cmd_download(
    config: HarvestConfig,
    request: HarvestRequest,
    output: Option<PathBuf>,
) -> Result<()> {
    tracing::info!(
        location = %request.query,
        bands = %request.query.bands.describe(),
        pacing = ?config.pacing,
        "Harvesting repeaters"
    );

    let fetcher = ReqwestFetcher::from_config(&config).context("Failed to create HTTP client")?;
    let service = HarvestService::new(fetcher, HtmlCleaner::new(), HtmlListingParser::new(), config);

    let report = service
        .harvest(&request)
        .await
        .with_context(|| format!("Harvest failed for {}", request.query))?;

    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            write_report(&report, file)?;
            tracing::info!(path = %path.display(), "Wrote CSV");
        }
        None => write_report(&report, std::io::stdout().lock())?,
    }

    if let Some(crawl) = &report.crawl {
        tracing::info!(
            rows = report.rows.len(),
            enriched = crawl.details.len(),
            failed = crawl.failed.len(),
            "Done"
        );
    } else {
        tracing::info!(rows = report.retained(), "Done");
    }

    Ok(())
}

fn cmd_bands() {
    for band in Band::ALL {
        let (low, high) = band.range_mhz();
        println!("{:>5}  {low:.1}-{high:.1} MHz", band.as_str());
    }
}

/// Write the report as CSV: structured rows when detail pages were
/// crawled, otherwise the basic listing columns.
fn write_report<W: Write>(report: &HarvestReport, writer: W) -> Result<()> {
    match report.mode {
        HarvestMode::Detailed => write_structured(&report.rows, writer),
        HarvestMode::Basic => write_basic(&report.records, writer),
    }
}

fn write_structured<W: Write>(rows: &[StructuredRow], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(StructuredRow::COLUMNS)?;
    for row in rows {
        csv.write_record(row.values())?;
    }
    csv.flush().context("Failed to write CSV")?;
    Ok(())
}

fn write_basic<W: Write>(records: &[BasicRecord], writer: W) -> Result<()> {
    let header = union_columns(records);
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(&header)?;
    for record in records {
        csv.write_record(header.iter().map(|column| record.get(column).unwrap_or_default()))?;
    }
    csv.flush().context("Failed to write CSV")?;
    Ok(())
}
