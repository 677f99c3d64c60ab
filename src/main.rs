use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;

use showtimes::aggregate::{AggregationEngine, registry};
use showtimes::catalog::build_catalog;
use showtimes::logging::init_logging;
use showtimes::write_artifact;
use showtimes::resolver::{ResolverConfig, TitleResolver};
use showtimes::session::{ChromeSessionFactory, SessionConfig, SharedSessions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Sorted list of showtime records
    Flat,
    /// Cinemas and movies keyed by id, showtimes referencing them
    Catalog,
}

/// Scrape every cinema chain and write one merged showtime list.
#[derive(Debug, Parser)]
#[command(name = "showtimes", version, about)]
struct Args {
    /// Metadata API key
    #[arg(long, env = "TMDB_API_KEY", required_unless_present = "skip_resolution")]
    tmdb_api_key: Option<String>,

    /// Where to write the artifact
    #[arg(long, env = "SHOWTIMES_OUTPUT", default_value = "showtimes.json")]
    output: PathBuf,

    #[arg(long, env = "SHOWTIMES_FORMAT", value_enum, default_value_t = OutputFormat::Flat)]
    format: OutputFormat,

    /// Wait before retrying a rate-limited metadata request
    #[arg(long, env = "SHOWTIMES_RATE_LIMIT_DELAY_MS", default_value_t = 10_000)]
    rate_limit_delay_ms: u64,

    /// Give up after this many rate-limited retries (default: never)
    #[arg(long, env = "SHOWTIMES_MAX_RATE_LIMIT_RETRIES")]
    max_rate_limit_retries: Option<u32>,

    /// Deadline for capturing a cinema's timetable request
    #[arg(long, env = "SHOWTIMES_CAPTURE_TIMEOUT_SECS", default_value_t = 30)]
    capture_timeout_secs: u64,

    /// Fail the run when any single chain fails
    #[arg(long, env = "SHOWTIMES_STRICT")]
    strict: bool,

    /// Chromium executable (auto-detected when omitted)
    #[arg(long, env = "CHROME")]
    chrome: Option<PathBuf>,

    /// Keep raw listing titles and skip metadata lookups
    #[arg(long, env = "SHOWTIMES_SKIP_RESOLUTION")]
    skip_resolution: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();

    // Cookie store keeps the ASP.NET session cookies the static pages hand out.
    let client = reqwest::Client::builder()
        .cookie_store(true)
        .user_agent(showtimes::USER_AGENT)
        .build()?;

    let sessions: SharedSessions = Arc::new(ChromeSessionFactory::new(SessionConfig {
        chrome_executable: args.chrome.clone(),
        ..SessionConfig::default()
    }));
    let reference = chrono::Local::now().date_naive();
    let adapters = registry(
        sessions,
        reference,
        Duration::from_secs(args.capture_timeout_secs),
    );
    let engine = AggregationEngine::new(adapters, client.clone()).strict(args.strict);

    let report = if args.skip_resolution {
        engine.run_unresolved().await?
    } else {
        let resolver = TitleResolver::new(
            client,
            ResolverConfig {
                tmdb_api_key: args.tmdb_api_key.clone().unwrap_or_default(),
                rate_limit_delay: Duration::from_millis(args.rate_limit_delay_ms),
                max_rate_limit_retries: args.max_rate_limit_retries,
                ..ResolverConfig::default()
            },
        );
        engine.run(&resolver).await?
    };

    match args.format {
        OutputFormat::Flat => write_artifact(&args.output, &report.showtimes)?,
        OutputFormat::Catalog => write_artifact(&args.output, &build_catalog(&report.showtimes))?,
    }

    info!(
        "wrote {} showtimes to {} ({} sources failed)",
        report.showtimes.len(),
        args.output.display(),
        report.failures.len()
    );
    Ok(())
}
