//! Paper Trader - Simulated single-asset trading agent
//!
//! 1. Streams prices from Finnhub (or a simulated walk without a key)
//! 2. Builds 15s bars and indicators
//! 3. Asks the reasoning gateway for a decision every cycle
//! 4. Applies decisions to a paper portfolio
//! 5. Prints a status report until Ctrl-C

use market_feed::FeedConnector;
use paper_trader::{BotHandle, BotRunner, BotSnapshot, EngineConfig, GatewayClient, Settings};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(settings.tracing_level())
        .init();

    info!("Starting Paper Trader...");
    info!(
        "Asset: {}, feed symbol: {}, gateway: {}",
        settings.asset_name, settings.feed_symbol, settings.gateway_url
    );
    if settings.finnhub_api_key.is_none() {
        warn!("No Finnhub API key configured, prices will be simulated");
    }

    let feed = FeedConnector::new(settings.feed_settings());
    let reasoner = GatewayClient::new(settings.gateway_url.clone(), settings.gateway_timeout())?;

    let bot = BotRunner::spawn(
        EngineConfig::from_settings(&settings),
        Box::new(feed),
        Arc::new(reasoner),
    );

    let mode = bot.start().await?;
    info!("✓ Bot running on {} data", mode);

    let mut report = interval(settings.report_interval());
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = report.tick() => report_status(&bot).await?,
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutdown requested");
                break;
            }
        }
    }

    let last = bot.snapshot().await?;
    bot.shutdown().await?;
    print_summary(&last);
    Ok(())
}

async fn report_status(bot: &BotHandle) -> anyhow::Result<()> {
    let snapshot = bot.snapshot().await?;

    let price = snapshot
        .current_price
        .map(|p| format!("{:.2}", p))
        .unwrap_or_else(|| "-".to_string());
    let rsi = snapshot
        .indicators
        .rsi
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "-".to_string());

    info!(
        "[{}] {} {} | bars {} | RSI {} | cash {:.2} | {} {:.6} | value {:.2} ({:+.2}%)",
        snapshot.state,
        snapshot.asset_name,
        price,
        snapshot.bars.len(),
        rsi,
        snapshot.portfolio.cash,
        snapshot.asset_name,
        snapshot.portfolio.asset_amount,
        snapshot.portfolio_value,
        snapshot.profit_loss_pct
    );

    if let Some(entry) = snapshot.decisions.first() {
        info!("Last decision {}: {}", entry.decision, entry.reasoning);
    }
    Ok(())
}

fn print_summary(snapshot: &BotSnapshot) {
    info!(
        "Final value {:.2} | P/L {:+.2} ({:+.2}%) | {} trades",
        snapshot.portfolio_value,
        snapshot.profit_loss,
        snapshot.profit_loss_pct,
        snapshot.trades.len()
    );
    for trade in snapshot.trades.iter().take(5) {
        info!(
            "  {} {} {:.6} {} @ {:.2}",
            trade.at.format("%H:%M:%S"),
            trade.action,
            trade.amount,
            trade.asset,
            trade.price
        );
    }
}
