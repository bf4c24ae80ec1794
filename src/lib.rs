#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

// Core modules
pub mod analysis;
pub mod app;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod models;
pub mod utils;

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;

// Re-export commonly used types outside of crate (for the binaries and tests)
pub use app::{AppPhase, RunSummary, SentinelApp, load_symbols};
pub use config::{BINANCE_PAIRS_FILENAME, SentinelSettings};
pub use domain::{Candle, CandleWindow, PairInterval};
pub use engine::{AlertBus, IngestionRouter, run_backtest};
pub use models::{BreakoutEvent, Direction, StructuralRange};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Comma separated symbols, e.g. BTCUSDT,ETHUSDT. Overrides --pairs-file.
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// One symbol per line
    #[arg(long, default_value = BINANCE_PAIRS_FILENAME)]
    pub pairs_file: PathBuf,

    /// JSON settings file. Missing fields keep their defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Candle interval, e.g. 1m or 15m
    #[arg(long)]
    pub interval: Option<String>,

    /// SQLite database path
    #[arg(long)]
    pub db: Option<String>,
}

impl Cli {
    /// Settings file (or defaults) with command line overrides applied.
    pub fn settings(&self) -> Result<SentinelSettings> {
        let mut settings = match &self.config {
            Some(path) => SentinelSettings::from_json_file(path)?,
            None => SentinelSettings::default(),
        };
        if let Some(interval) = &self.interval {
            settings.interval = interval.clone();
        }
        if let Some(db) = &self.db {
            settings.db_path = db.clone();
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn resolve_symbols(&self) -> Result<Vec<String>> {
        let symbols: Vec<String> = if self.symbols.is_empty() {
            load_symbols(&self.pairs_file)?
        } else {
            self.symbols
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        if symbols.is_empty() {
            bail!("No symbols to watch");
        }
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_settings() {
        let cli = Cli::parse_from([
            "breakout-sentinel",
            "--symbols",
            "btcusdt, ethusdt",
            "--interval",
            "15m",
            "--db",
            "other.sqlite",
        ]);
        assert_eq!(cli.resolve_symbols().unwrap(), vec!["BTCUSDT", "ETHUSDT"]);

        let settings = cli.settings().unwrap();
        assert_eq!(settings.interval, "15m");
        assert_eq!(settings.db_path, "other.sqlite");
    }

    #[test]
    fn bad_interval_is_rejected() {
        let cli = Cli::parse_from(["breakout-sentinel", "--interval", "7m"]);
        assert!(cli.settings().is_err());
    }
}
