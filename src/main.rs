use std::panic;

use anyhow::Result;
use breakout_sentinel::{Cli, SentinelApp};
use clap::Parser;

fn init_log() {
    let (global_level, my_code_level) = if cfg!(debug_assertions) {
        (log::LevelFilter::Warn, log::LevelFilter::Info)
    } else {
        (log::LevelFilter::Error, log::LevelFilter::Info)
    };

    let mut builder = env_logger::Builder::new();

    // RUST_LOG, when set, wins over the defaults below
    builder
        .filter(None, global_level)
        .filter(Some("breakout_sentinel"), my_code_level)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        log::error!("CRITICAL PANIC:\n{}\nStack Trace:\n{}", info, backtrace);
    }));
    init_log();

    let args = Cli::parse();
    let settings = args.settings()?;
    let symbols = args.resolve_symbols()?;
    log::info!(
        "Watching {} symbols on {} (db {})",
        symbols.len(),
        settings.interval,
        settings.db_path
    );

    let app = SentinelApp::connect(settings, &symbols).await?;
    let summary = app
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
            }
            log::info!("Shutdown requested");
        })
        .await?;

    log::info!(
        "Processed {} ticks, {} alerts emitted, {} suppressed, {} malformed",
        summary.stats.ticks,
        summary.stats.alerts_emitted,
        summary.stats.alerts_suppressed,
        summary.stats.malformed
    );
    Ok(())
}
