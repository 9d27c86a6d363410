use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tokio::io::{AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use certscan_rs::config::{PipelineConfig, DEFAULT_TIMEOUT_SECS};
use certscan_rs::stats::{self, Stats};
use certscan_rs::{logging, pipeline, ports, targets};

/// certscan-rs — scrape TLS certificates across IP ranges for domain and asset discovery.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "certscan-rs",
    version,
    about = "Scrape TLS certificates across IP ranges for domain and asset discovery.",
    long_about = None
)]
struct Cli {
    /// IPs and CIDRs separated by commas, or a file with one per line. Read from stdin when omitted.
    #[arg(short = 'i', long)]
    input: Option<String>,

    /// Concurrent TLS handshakes (minimum 100).
    #[arg(short = 'c', long, default_value_t = 100)]
    concurrency: usize,

    /// Concurrent result formatters.
    #[arg(long = "result-concurrency", default_value_t = 100)]
    result_concurrency: usize,

    /// TLS ports to check for certificates, comma-separated; ranges like 8443-8445 allowed.
    #[arg(short = 'p', long, default_value = "443")]
    ports: String,

    /// TLS handshake timeout in seconds.
    #[arg(short = 't', long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Print failures and timeouts.
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Print full certificate data as JSON lines instead of domain names.
    #[arg(short = 'j', long, default_value_t = false)]
    json: bool,

    /// Include wildcard names such as *.example.com.
    #[arg(long = "wc", default_value_t = false)]
    wildcards: bool,

    /// Write results to this file instead of stdout.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Show a live hits/misses line on stderr.
    #[arg(long, default_value_t = false)]
    stats: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let entries = match cli.input.as_deref() {
        Some(spec) => targets::load_input(spec).await?,
        None if std::io::stdin().is_terminal() => Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "no input detected, pass -i <IPs/CIDRs or file> or pipe targets on stdin",
            )
            .exit(),
        None => targets::read_entries(BufReader::new(tokio::io::stdin())).await?,
    };

    let specs = targets::parse_entries(&entries);
    if specs.is_empty() {
        warn!(entries = entries.len(), "input contains no usable targets");
    }

    let ports = match ports::parse_port_list(&cli.ports) {
        Ok(p) => p,
        Err(e) => Cli::command()
            .error(ErrorKind::InvalidValue, format!("invalid --ports: {e:#}"))
            .exit(),
    };

    let config = PipelineConfig {
        scan_concurrency: cli.concurrency,
        result_concurrency: cli.result_concurrency,
        ports,
        handshake_timeout: Duration::from_secs(cli.timeout),
        emit_json: cli.json,
        include_wildcards: cli.wildcards,
        debug_failures: cli.debug,
    };

    let sink: Box<dyn AsyncWrite + Unpin + Send> = match cli.output.as_deref() {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create output file: {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    // Ctrl-C stops feeding new targets; in-flight work still drains.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight targets");
            cancel_ctrlc.cancel();
        }
    });

    let stats_handle = Arc::new(Stats::new());
    let ticker_stop = CancellationToken::new();
    let ticker = cli.stats.then(|| {
        stats::spawn_ticker(
            stats_handle.clone(),
            Duration::from_millis(250),
            ticker_stop.clone(),
        )
    });

    let summary = pipeline::run(config, specs, sink, Some(stats_handle.clone()), cancel).await;

    ticker_stop.cancel();
    if let Some(t) = ticker {
        let _ = t.await;
    }

    let summary = summary?;
    info!(
        targets = summary.targets,
        lines = summary.lines,
        hit_rate = %format!("{:.2}%", stats_handle.snapshot().hit_percentage()),
        "scan complete"
    );
    if let Some(path) = cli.output.as_deref() {
        info!(path = %path.display(), "wrote results");
    }
    Ok(())
}
