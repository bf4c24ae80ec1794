use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use breakout_sentinel::data::{MarketDataStorage, SqliteStorage};
use breakout_sentinel::engine::BacktestReport;
use breakout_sentinel::utils::epoch_ms_to_utc;
use breakout_sentinel::{Cli, SentinelSettings, run_backtest};

/// Walk-forward replay of stored candles through detection, confirmation and cooldowns.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct ReplayArgs {
    /// Comma separated symbols. Defaults to every symbol in the pairs file.
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    #[arg(long, default_value = breakout_sentinel::BINANCE_PAIRS_FILENAME)]
    pairs_file: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    interval: Option<String>,

    #[arg(long)]
    db: Option<String>,

    /// Only replay candles opening at or after this epoch ms
    #[arg(long)]
    start: Option<i64>,

    /// Also list every alert
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

impl ReplayArgs {
    fn as_cli(&self) -> Cli {
        Cli {
            symbols: self.symbols.clone(),
            pairs_file: self.pairs_file.clone(),
            config: self.config.clone(),
            interval: self.interval.clone(),
            db: self.db.clone(),
        }
    }
}

#[derive(Tabled)]
struct ReportRow {
    symbol: String,
    bars: usize,
    signals: usize,
    up: usize,
    down: usize,
    suppressed: usize,
    #[tabled(rename = "no follow-through")]
    failed_follow_through: usize,
}

impl From<&BacktestReport> for ReportRow {
    fn from(r: &BacktestReport) -> Self {
        Self {
            symbol: r.symbol.clone(),
            bars: r.bars,
            signals: r.signals,
            up: r.up_alerts(),
            down: r.down_alerts(),
            suppressed: r.suppressed,
            failed_follow_through: r.failed_follow_through,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Setup Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Settings and symbols, same rules as the service
    let args = ReplayArgs::parse();
    let cli = args.as_cli();
    let settings: SentinelSettings = cli.settings()?;
    let symbols = cli.resolve_symbols()?;
    let interval_ms = settings.interval_ms()?;
    let interval = settings.interval.clone();

    // 3. Connect to DB
    let storage = SqliteStorage::new(&settings.db_path)
        .await
        .context("Failed to open the candle database. Run the service first to populate it!")?;

    // 4. Load history
    let mut histories = Vec::with_capacity(symbols.len());
    for symbol in &symbols {
        let candles = storage
            .load_candles(symbol, &interval, args.start)
            .await
            .with_context(|| format!("Failed to load candles for {}", symbol))?;
        if candles.is_empty() {
            log::warn!("{}: no stored {} candles, skipping", symbol, interval);
            continue;
        }
        histories.push((symbol.clone(), candles));
    }

    // 5. Replay symbols in parallel
    let reports: Vec<BacktestReport> = histories
        .par_iter()
        .map(|(symbol, candles)| run_backtest(symbol, candles, &settings, interval_ms))
        .collect();

    // 6. Report
    let rows: Vec<ReportRow> = reports.iter().map(ReportRow::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    if args.verbose {
        for alert in reports.iter().flat_map(|r| r.alerts.iter()) {
            println!("{}  {}", epoch_ms_to_utc(alert.detected_at), alert);
        }
    }
    Ok(())
}
