// src/main.rs
use anyhow::Context;
use clap::{Parser, Subcommand};
use cryptoinsight::{load_config, utils::setup_logging, MarketDataClient};
use log::{info, warn};
use serde::Serialize;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "cryptoinsight", version, about = "Cached crypto market data from Pyth and CoinGecko")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Current USD prices; defaults to TRACKED_COINS
    Prices {
        coins: Vec<String>,
        /// Skip cached values
        #[arg(long)]
        refresh: bool,
    },
    /// Daily price history for one coin
    History {
        coin: String,
        #[arg(long, default_value_t = 30)]
        days: u32,
        #[arg(long)]
        refresh: bool,
    },
    /// Description, links and market figures for one coin
    Details { coin: String },
    /// Trending coins on CoinGecko
    Trending,
    /// Cache and rate limiter statistics
    Stats,
    /// Probe both providers once
    Health,
    /// Remove cached entries, optionally only keys matching a `*` glob
    Clear {
        #[arg(long)]
        pattern: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenv::dotenv().ok();
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    setup_logging(&level).context("Failed to initialize logging")?;
    info!("🚀 CryptoInsight market data starting...");

    let (config, registry) = load_config().context("Invalid configuration")?;
    let client = MarketDataClient::from_config(&config, registry)
        .await
        .context("Failed to build market data client")?;

    match cli.command {
        Command::Prices { coins, refresh } => {
            let coins = if coins.is_empty() { config.tracked_coins.clone() } else { coins };
            let batch = if refresh {
                client.refresh_prices(&coins).await
            } else {
                client.get_current_prices(&coins).await
            };
            if !batch.is_complete() {
                warn!("{} of {} coins unavailable", batch.failures.len(), coins.len());
            }
            print_json(&batch)?;
        }
        Command::History { coin, days, refresh } => {
            let history = (if refresh {
                client.refresh_history(&coin, days).await
            } else {
                client.get_history(&coin, days).await
            })
            .with_context(|| format!("No history for {}", coin))?;
            print_json(&history)?;
        }
        Command::Details { coin } => {
            let details = client
                .get_coin_details(&coin)
                .await
                .with_context(|| format!("No details for {}", coin))?;
            print_json(&details)?;
        }
        Command::Trending => {
            let trending = client.get_trending().await.context("No trending data")?;
            print_json(&trending)?;
        }
        Command::Stats => {
            let cache = client.cache_stats();
            info!("{}", cache);
            let limits = client.rate_limit_stats().await;
            for stats in &limits {
                info!("{}", stats);
            }
            print_json(&json!({
                "cache": cache,
                "connected": client.cache().is_connected().await,
                "rate_limits": limits,
            }))?;
        }
        Command::Health => {
            let report: serde_json::Map<String, serde_json::Value> = client
                .health_report()
                .await
                .into_iter()
                .map(|(provider, result)| {
                    let status = match result {
                        Ok(()) => json!({"ok": true}),
                        Err(e) => json!({"ok": false, "error": e.to_string()}),
                    };
                    (provider.to_string(), status)
                })
                .collect();
            print_json(&report)?;
        }
        Command::Clear { pattern } => {
            let removed = client.clear_cache(pattern.as_deref()).await;
            print_json(&json!({ "removed": removed, "pattern": pattern }))?;
        }
    }

    Ok(())
}
