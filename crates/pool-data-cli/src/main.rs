use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pool_data_core::aggregate::aggregate_minute_candles;
use pool_data_core::store::CandleStore;
use pool_data_core::{calendar, schema};
use pool_data_providers::provider::TradeProvider;
use pool_data_providers::subgraph::SubgraphProvider;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "pool-data",
    about = "Collect and manage minute OHLCV data for DEX pools"
)]
struct Cli {
    /// Root directory for data storage (default: current directory)
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch trades and populate candle data for pools
    Populate {
        /// Pool addresses to fetch (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        pools: Vec<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// End date (YYYY-MM-DD, defaults to yesterday)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Subgraph endpoint override
        #[arg(long)]
        endpoint: Option<String>,

        /// Force re-download even if data exists
        #[arg(long)]
        force: bool,
    },

    /// Export stored candles for a pool to a single CSV file
    Export {
        /// Pool address
        #[arg(short, long)]
        pool: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Output CSV path
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Show what data exists in the store
    Status {
        /// Filter by pool address (shows all if omitted)
        #[arg(short, long)]
        pool: Option<String>,
    },

    /// Validate stored files and report issues
    Validate {
        /// Pools to validate (all if omitted, comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        pools: Option<Vec<String>>,
    },
}

async fn cmd_populate(
    store: &CandleStore,
    pools: &[String],
    start: NaiveDate,
    end: NaiveDate,
    endpoint: Option<String>,
    force: bool,
) -> Result<()> {
    let provider = match endpoint {
        Some(url) => SubgraphProvider::with_endpoint(url),
        None => SubgraphProvider::new(),
    };
    info!("Using provider: {}", provider.name());

    for pool in pools {
        let pool = pool.to_lowercase();

        let meta = match provider.fetch_pool(&pool).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!("{pool}: metadata fetch failed: {e}");
                continue;
            }
        };

        let dates_to_fetch = if force {
            calendar::days(start, end)
        } else {
            store.missing_dates(&pool, start, end)
        };

        if dates_to_fetch.is_empty() {
            info!("{pool}: all data present, skipping");
            continue;
        }

        info!(
            "{pool}: {} missing day(s) from {} to {}",
            dates_to_fetch.len(),
            dates_to_fetch.first().unwrap(),
            dates_to_fetch.last().unwrap(),
        );

        for date in &dates_to_fetch {
            match provider.fetch_trades(&pool, *date).await {
                Ok(events) => {
                    let series = aggregate_minute_candles(&events, &meta);
                    if series.unscaled {
                        warn!(
                            "{pool} {date}: token decimals missing or negative, \
                             encoded prices left unscaled"
                        );
                    }
                    if series.is_empty() {
                        // Routine for low-volume pools; no file is written.
                        info!("{pool} {date}: no priced trades, skipping");
                        continue;
                    }
                    store
                        .write_day(&pool, *date, &series.candles)
                        .with_context(|| format!("failed to write {pool} {date}"))?;
                    info!(
                        "{pool} {date}: wrote {} candle(s) from {} trade event(s)",
                        series.candles.len(),
                        events.len(),
                    );
                }
                Err(e) => {
                    warn!("{pool} {date}: fetch failed: {e}");
                }
            }
        }
    }

    Ok(())
}

fn cmd_export(
    store: &CandleStore,
    pool: &str,
    start: NaiveDate,
    end: NaiveDate,
    out: &std::path::Path,
) -> Result<()> {
    let pool = pool.to_lowercase();
    let candles = store
        .read_range(&pool, start, end)
        .with_context(|| format!("failed to read {pool}"))?;

    if candles.is_empty() {
        println!("No data for {pool} between {start} and {end}.");
        return Ok(());
    }

    schema::write_csv(out, &candles)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("Wrote {} candle(s) to {}", candles.len(), out.display());
    Ok(())
}

fn cmd_status(store: &CandleStore, pool: Option<&str>) -> Result<()> {
    let pools = match pool {
        Some(p) => vec![p.to_lowercase()],
        None => store.list_pools().context("failed to list pools")?,
    };

    if pools.is_empty() {
        println!("No data in store.");
        return Ok(());
    }

    for pool in &pools {
        let dates = store
            .list_dates(pool)
            .with_context(|| format!("failed to list dates for {pool}"))?;

        if dates.is_empty() {
            println!("{pool}: no data");
            continue;
        }

        let first = dates.first().unwrap();
        let last = dates.last().unwrap();
        println!("{pool}: {} day(s), {first} to {last}", dates.len());
    }

    Ok(())
}

fn cmd_validate(store: &CandleStore, pools: Option<&[String]>) -> Result<()> {
    let all_pools = store.list_pools().context("failed to list pools")?;

    let pools_to_check: Vec<String> = match pools {
        Some(list) => list.iter().map(|p| p.to_lowercase()).collect(),
        None => all_pools,
    };

    if pools_to_check.is_empty() {
        println!("No data to validate.");
        return Ok(());
    }

    let mut issues = 0;

    for pool in &pools_to_check {
        let dates = store
            .list_dates(pool)
            .with_context(|| format!("failed to list dates for {pool}"))?;

        for date in &dates {
            match store.read_day(pool, *date) {
                Ok(candles) => {
                    if candles.is_empty() {
                        println!("WARN: {pool} {date}: empty file");
                        issues += 1;
                        continue;
                    }

                    // Within a day the minute series must be contiguous:
                    // each bucket exactly one minute after the previous.
                    for i in 1..candles.len() {
                        let expected =
                            candles[i - 1].bucket_start + chrono::Duration::minutes(1);
                        if candles[i].bucket_start != expected {
                            println!(
                                "WARN: {pool} {date}: bucket sequence broken at index {i}"
                            );
                            issues += 1;
                            break;
                        }
                    }

                    // Gap-filled candles must be flat and volume-free.
                    for (i, candle) in candles.iter().enumerate() {
                        if candle.trade_count == 0
                            && (!candle.volume.is_zero()
                                || candle.open != candle.close
                                || candle.high != candle.low)
                        {
                            println!(
                                "WARN: {pool} {date}: inconsistent gap candle at index {i}"
                            );
                            issues += 1;
                            break;
                        }
                    }
                }
                Err(e) => {
                    println!("ERROR: {pool} {date}: failed to read: {e}");
                    issues += 1;
                }
            }
        }
    }

    if issues == 0 {
        println!("All files valid.");
    } else {
        println!("{issues} issue(s) found.");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    let store = CandleStore::new(&cli.data_dir);

    match &cli.command {
        Commands::Populate {
            pools,
            start,
            end,
            endpoint,
            force,
        } => {
            let end_date = end
                .unwrap_or_else(|| (chrono::Utc::now() - chrono::Duration::days(1)).date_naive());
            cmd_populate(&store, pools, *start, end_date, endpoint.clone(), *force).await?;
        }
        Commands::Export {
            pool,
            start,
            end,
            out,
        } => {
            cmd_export(&store, pool, *start, *end, out)?;
        }
        Commands::Status { pool } => {
            cmd_status(&store, pool.as_deref())?;
        }
        Commands::Validate { pools } => {
            cmd_validate(&store, pools.as_deref())?;
        }
    }

    Ok(())
}
