use clap::Parser;
use naver_land_ingest::{
    progress::LogProgress, summary, AuthContext, FilterParams, IngestConfig, IngestionEngine,
    IngestionTarget, MetricsSink, NormalizedRow, RunRequest, TerminationReason,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "naver-ingest", version)]
#[command(about = "Fetch and summarize Naver Land listings of one apartment complex")]
struct Cli {
    /// Complex number to ingest
    #[arg(long)]
    complex_no: String,

    /// Last page to fetch (inclusive)
    #[arg(long, default_value_t = 5)]
    max_pages: u32,

    /// First page to fetch
    #[arg(long, default_value_t = 1)]
    start_page: u32,

    /// Pause between page requests, overrides NAVER_INGEST_RATE_LIMIT_MS
    #[arg(long)]
    rate_limit_ms: Option<u64>,

    /// Per-request timeout, overrides NAVER_INGEST_TIMEOUT_SECS
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Extra request header, "Name: value" (repeatable)
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Cookie, name=value (repeatable)
    #[arg(long = "cookie", value_parser = parse_pair)]
    cookies: Vec<(String, String)>,

    /// Query filter override, key=value (repeatable)
    #[arg(long = "filter", value_parser = parse_pair)]
    filters: Vec<(String, String)>,

    /// Print normalized rows as JSON instead of the summary tables
    #[arg(long)]
    json: bool,

    /// Print the metrics exposition text at the end
    #[arg(long)]
    print_metrics: bool,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected \"Name: value\", got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {:?}", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {:?}", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let metrics = Arc::new(MetricsSink::new());

    run(cli, metrics).await
}

async fn run(cli: Cli, metrics: Arc<MetricsSink>) -> ExitCode {
    let target = match IngestionTarget::parse(&cli.complex_no) {
        Ok(target) => target,
        Err(e) => {
            metrics.record_error(cli.complex_no.trim(), e.kind());
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    let mut config = IngestConfig::from_env();
    if let Some(ms) = cli.rate_limit_ms {
        config = config.with_rate_limit_interval(Duration::from_millis(ms));
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }

    let auth = cli
        .headers
        .iter()
        .fold(AuthContext::new(), |auth, (name, value)| auth.with_header(name, value));
    let auth = cli
        .cookies
        .iter()
        .fold(auth, |auth, (name, value)| auth.with_cookie(name, value));
    let filters: FilterParams = cli.filters.iter().cloned().collect();

    let engine = match IngestionEngine::new(config, metrics.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current page");
            ctrl_c.cancel();
        }
    });

    let request = RunRequest::new(target, cli.max_pages)
        .with_start_page(cli.start_page)
        .with_filters(filters)
        .with_auth(auth);

    let outcome = match engine.run(request, &cancel, &LogProgress).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    println!("Complex {}: {}", outcome.run.target(), outcome.status());
    if let Some(e) = &outcome.error {
        eprintln!("Stopped early: {}", e);
    }

    let rows = engine.project(&outcome);
    if cli.json {
        match serde_json::to_string_pretty(&rows) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::error!(error = %e, "Failed to serialize rows"),
        }
    } else {
        print_summary(&rows);
    }

    if cli.print_metrics {
        print!("{}", metrics.render());
    }

    match outcome.termination_reason() {
        TerminationReason::FetchFailed => ExitCode::FAILURE,
        TerminationReason::Cancelled => ExitCode::from(130),
        _ => ExitCode::SUCCESS,
    }
}

fn price_cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

fn print_summary(rows: &[NormalizedRow]) {
    let report = summary::summarize(rows);

    println!();
    println!(
        "Listings: {}  priced: {}  mean: {}  min: {}  max: {} (억)",
        rows.len(),
        report.overall.count,
        price_cell(report.overall.mean),
        price_cell(report.overall.min),
        price_cell(report.overall.max),
    );

    println!();
    println!("{:<12} {:>8} {:>8} {:>10}", "trade type", "listings", "priced", "mean");
    for group in &report.by_trade_type {
        let name = if group.trade_type.is_empty() {
            "(none)"
        } else {
            group.trade_type.as_str()
        };
        println!(
            "{:<12} {:>8} {:>8} {:>10}",
            name,
            group.listings,
            group.count,
            price_cell(group.mean_price)
        );
    }

    println!();
    println!("{:<12} {:>8} {:>8} {:>10}", "area", "listings", "priced", "mean");
    for bin in &report.by_area {
        println!(
            "{:<12} {:>8} {:>8} {:>10}",
            bin.label,
            bin.listings,
            bin.count,
            price_cell(bin.mean_price)
        );
    }
}
