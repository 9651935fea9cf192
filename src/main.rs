use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::ratelimit::{LimitPolicy, RateLimiter};
use turnstile::trace::{self, OutputFormat, ReplayOptions};

/// Replay a request trace through a fixed-window rate limiter.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// YAML configuration file (TURNSTILE__* environment variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the maximum admitted requests per window
    #[arg(long)]
    limit: Option<u64>,

    /// Override the window length in seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Output format for decisions
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Trace file with `<client_id> <unix_seconds>` per line; stdin if omitted
    trace: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so decisions on stdout stay machine-readable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Turnstile trace replay");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(limit) = args.limit {
        config.limiter.limit = limit;
    }
    if let Some(secs) = args.duration_secs {
        config.limiter.duration_secs = secs;
    }
    config.validate()?;

    let policy: LimitPolicy = config.policy()?;
    info!(
        limit = policy.limit(),
        duration = ?policy.duration(),
        housekeeping = config.housekeeping.enabled,
        on_store_unavailable = ?config.limiter.on_store_unavailable,
        "Configuration loaded"
    );

    let entries = match &args.trace {
        Some(path) => trace::read_trace(BufReader::new(File::open(path)?))?,
        None => trace::read_trace(io::stdin().lock())?,
    };

    let limiter = RateLimiter::in_memory(policy);
    let options = ReplayOptions {
        format: args.format,
        housekeeping: config.housekeeping.enabled.then_some(&config.housekeeping),
        on_unavailable: config.limiter.on_store_unavailable,
    };

    let mut stdout = io::stdout().lock();
    let summary = trace::replay(&limiter, &entries, &mut stdout, options)?;

    info!(
        requests = entries.len(),
        admitted = summary.admitted,
        rejected = summary.rejected,
        evicted = summary.evicted,
        "Trace replay finished"
    );
    Ok(())
}
