//! Command-line scraper: long-horizon price dumps, stream exports, one-off
//! sentiment checks and watchlist upkeep.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ticker_pulse::analyze::{analyze_messages, build_classifier};
use ticker_pulse::config::{ClassifierConfig, UpstreamConfig};
use ticker_pulse::export::{save_prices, save_stream, tally_signals};
use ticker_pulse::ingest::{
    normalize_ticker, CursorStreamIngester, Pacer, UpstreamClient, WindowedPriceFetcher,
};
use ticker_pulse::sector::{diversification_candidates, sector_for};
use ticker_pulse::watchlist::Watchlist;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Price history and stream sentiment for equity tickers", long_about = None)]
struct Cli {
    /// Upstream config file (TOML); env overrides still apply
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Upstream auth token
    #[arg(long, env = "TARGET_AUTH_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,
    /// Use the configured pacing instead of the slow scraper pacing
    #[arg(long, global = true)]
    fast: bool,
    /// JSON log lines instead of human-readable output
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump daily prices to prices_<TICKER>.csv
    Prices {
        ticker: String,
        #[arg(long, default_value_t = 365)]
        days: u32,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Dump stream messages to stream_<TICKER>_<DAYS>days.csv
    Stream {
        ticker: String,
        #[arg(long, default_value_t = 30)]
        days: u32,
        #[arg(long, default_value_t = 50_000)]
        max_pages: u32,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Classify recent messages and print the bucket counts
    Sentiment {
        ticker: String,
        #[arg(long, default_value_t = 1)]
        days: u32,
        #[arg(long, default_value_t = 20)]
        max_pages: u32,
    },
    /// Show, add or remove watchlist tickers
    Watchlist {
        #[command(subcommand)]
        action: Option<WatchlistAction>,
        #[arg(long, env = "WATCHLIST_PATH", default_value = "my_watchlist.txt")]
        file: PathBuf,
    },
    /// Suggest tickers from other sectors
    Diversify {
        ticker: String,
        #[arg(long, env = "WATCHLIST_PATH", default_value = "my_watchlist.txt")]
        watchlist: PathBuf,
    },
}

#[derive(Subcommand)]
enum WatchlistAction {
    Add { ticker: String },
    Remove { ticker: String },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ticker_pulse=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
}

fn load_upstream(cli: &Cli) -> Result<UpstreamConfig> {
    let mut cfg = match &cli.config {
        Some(p) => {
            let mut c = UpstreamConfig::load_from(p)?;
            c.apply_env_overrides();
            c
        }
        None => UpstreamConfig::load_default()?,
    };
    if let Some(t) = cli.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        cfg.auth_token = Some(t.to_string());
    }
    Ok(cfg)
}

fn ticker_arg(raw: &str) -> Result<String> {
    normalize_ticker(raw).with_context(|| format!("invalid ticker {raw:?}"))
}

fn require_token(cfg: &UpstreamConfig) -> Result<&str> {
    match cfg.auth_token.as_deref() {
        Some(t) => Ok(t),
        None => bail!("no upstream token: pass --token or set TARGET_AUTH_TOKEN"),
    }
}

fn print_progress(fraction: f32, note: &str) {
    eprintln!("[{:>3.0}%] {note}", fraction * 100.0);
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.json);

    match &cli.command {
        Commands::Prices {
            ticker,
            days,
            out_dir,
        } => {
            let ticker = ticker_arg(ticker)?;
            let cfg = load_upstream(&cli)?;
            let token = require_token(&cfg)?;
            let pacer = if cli.fast {
                cfg.pacer()
            } else {
                Pacer::jittered(Duration::from_secs(1), Duration::from_secs(2))
            };
            let fetcher = WindowedPriceFetcher::new(UpstreamClient::new(&cfg)?, cfg.price_url.clone())
                .with_pacer(pacer);
            if !fetcher.is_configured() {
                bail!("no price endpoint: set TARGET_PRICE_URL or price_url in the config");
            }

            let history = fetcher
                .fetch_until(
                    Utc::now().date_naive(),
                    &ticker,
                    *days,
                    Some(token),
                    &print_progress,
                )
                .await;
            if history.is_empty() {
                bail!("no price data for {ticker} ({:?})", history.outcome);
            }
            let path = save_prices(out_dir, &ticker, &history.points)?;
            println!(
                "{} rows saved to {} ({:?})",
                history.points.len(),
                path.display(),
                history.outcome
            );
        }

        Commands::Stream {
            ticker,
            days,
            max_pages,
            out_dir,
        } => {
            let ticker = ticker_arg(ticker)?;
            let cfg = load_upstream(&cli)?;
            let token = require_token(&cfg)?;
            let pacer = if cli.fast {
                cfg.pacer()
            } else {
                Pacer::jittered(Duration::from_millis(1500), Duration::from_millis(1500))
            };
            let ingester =
                CursorStreamIngester::new(UpstreamClient::new(&cfg)?, cfg.stream_url.clone())
                    .with_pacer(pacer);
            if !ingester.is_configured() {
                bail!("no stream endpoint: set TARGET_STREAM_URL or stream_url in the config");
            }

            let batch = ingester
                .open_at(
                    Utc::now().naive_utc(),
                    &ticker,
                    *days,
                    Some(token),
                    *max_pages,
                    &print_progress,
                )
                .collect()
                .await;
            if batch.messages.is_empty() {
                bail!("no messages for {ticker} in the last {days} days ({})", batch.stop.as_str());
            }
            let path = save_stream(out_dir, &ticker, *days, &batch.messages)?;
            let tally = tally_signals(&batch.messages);
            println!(
                "{} messages saved to {} (stopped: {})",
                batch.messages.len(),
                path.display(),
                batch.stop.as_str()
            );
            println!("bullish targets: {}", tally.bullish_targets);
            println!("bearish targets: {}", tally.bearish_targets);
        }

        Commands::Sentiment {
            ticker,
            days,
            max_pages,
        } => {
            let ticker = ticker_arg(ticker)?;
            let cfg = load_upstream(&cli)?;
            let token = require_token(&cfg)?;
            let classifier = build_classifier(&ClassifierConfig::load_default());
            if !classifier.is_available() {
                bail!("sentiment classifier is not available; check config/classifier.json");
            }
            let ingester =
                CursorStreamIngester::new(UpstreamClient::new(&cfg)?, cfg.stream_url.clone())
                    .with_pacer(cfg.pacer());
            let batch = ingester
                .open_at(
                    Utc::now().naive_utc(),
                    &ticker,
                    *days,
                    Some(token),
                    *max_pages,
                    &print_progress,
                )
                .collect()
                .await;
            let report = analyze_messages(batch.messages, &classifier).await;
            match report.summary {
                None => println!("{ticker}: no data"),
                Some(s) => {
                    println!("{ticker} ({}): {}", sector_for(&ticker), s.dominant.display_label());
                    println!(
                        "  bullish {}  bearish {}  neutral {}  total {}  ({:.1}% bullish)",
                        s.counts.bullish, s.counts.bearish, s.counts.neutral, s.total, s.bullish_pct
                    );
                }
            }
        }

        Commands::Watchlist { action, file } => {
            let mut wl = Watchlist::load(file.clone())?;
            match action {
                None => {}
                Some(WatchlistAction::Add { ticker }) => {
                    if wl.add(ticker)? {
                        wl.save()?;
                    }
                }
                Some(WatchlistAction::Remove { ticker }) => {
                    if !wl.remove(ticker) {
                        bail!("{ticker} is not on the watchlist");
                    }
                    wl.save()?;
                }
            }
            for t in wl.tickers() {
                println!("{t}\t{}", sector_for(t));
            }
        }

        Commands::Diversify { ticker, watchlist } => {
            let ticker = ticker_arg(ticker)?;
            let mut exclude = Watchlist::load(watchlist.clone())?.tickers().to_vec();
            exclude.push(ticker.clone());
            let sector = sector_for(&ticker);
            let picks = diversification_candidates(sector, &exclude, &mut rand::rng());
            if picks.is_empty() {
                println!("{ticker} is in {sector}; no suggestions");
                return Ok(());
            }
            println!("{ticker} is in {sector}; consider:");
            for p in picks {
                println!("  {p}\t{}", sector_for(p));
            }
        }
    }

    Ok(())
}
