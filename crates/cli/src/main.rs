use anyhow::Result;
use clap::{Parser, Subcommand};
use intraday_core::config::AppConfig;
use intraday_core::config_loader::ConfigLoader;
use intraday_core::traits::{ExecutionGateway, ForecastProvider, MarketFeed};
use intraday_data::{CsvReplayFeed, RandomWalkFeed};
use intraday_engine::TradingEngine;
use intraday_execution::SimulatedGateway;
use intraday_forecast::{NeutralForecast, RestForecast};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "intraday")]
#[command(about = "Intraday trading decision pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded CSV through the pipeline
    Replay {
        /// Recorded data CSV file
        #[arg(short, long)]
        data: String,
        /// Treat the file as finalized bars instead of raw ticks
        #[arg(long)]
        bars: bool,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Paper-trade against a seeded random-walk feed
    Paper {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Number of synthetic ticks before the feed ends
        #[arg(long, default_value_t = 10_000)]
        ticks: u64,
        /// Seed for the price walk
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { data, bars, config } => {
            let config = ConfigLoader::load_from(&config)?;
            let feed = if bars {
                CsvReplayFeed::from_bar_csv(&data)?
            } else {
                CsvReplayFeed::from_tick_csv(&data)?
            };
            run_session(config, feed).await
        }
        Commands::Paper {
            config,
            ticks,
            seed,
        } => {
            let config = ConfigLoader::load_from(&config)?;
            let feed = RandomWalkFeed::new(
                config.symbols.clone(),
                seed,
                100.0,
                1,
                ticks,
                None,
            );
            run_session(config, feed).await
        }
    }
}

/// Wires the pipeline, runs it until the feed ends or ctrl-c fires, then
/// prints the session report.
async fn run_session<F: MarketFeed>(config: AppConfig, feed: F) -> Result<()> {
    let gateway = SimulatedGateway::new(&config.execution)?;
    let forecast: Arc<dyn ForecastProvider> = if config.forecast.endpoint.is_empty() {
        tracing::info!("no forecast endpoint configured; running with a neutral forecast");
        Arc::new(NeutralForecast)
    } else {
        Arc::new(RestForecast::new(&config.forecast)?)
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received; requesting shutdown");
            let _ = shutdown_tx.send(true);
        }
    });

    run_engine(config, feed, gateway, forecast, shutdown_rx).await
}

async fn run_engine<F: MarketFeed, G: ExecutionGateway>(
    config: AppConfig,
    feed: F,
    gateway: G,
    forecast: Arc<dyn ForecastProvider>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let symbols = config.symbols.clone();
    let mut engine = TradingEngine::new(config, feed, gateway, forecast, shutdown)?;
    let ledger = engine.ledger();

    engine.run().await?;

    for symbol in &symbols {
        let dropped = engine.dropped_ticks(symbol);
        if dropped > 0 {
            tracing::warn!(symbol, dropped, "out-of-order events dropped");
        }
    }

    let ledger = ledger.lock().await;
    println!("=== Session Report ===");
    for trade in ledger.trade_history() {
        println!(
            "{} {:>6} x {} @ {} -> {} profit {}",
            trade.exit_time.format("%Y-%m-%d %H:%M:%S"),
            trade.symbol,
            trade.quantity,
            trade.entry_price,
            trade.exit_price,
            trade.profit,
        );
    }
    println!("Trades: {}", ledger.trade_history().len());
    println!("Final capital: {}", ledger.capital());
    if ledger.is_halted() {
        println!("Trading halted during the session (daily limit reached)");
    }

    Ok(())
}
