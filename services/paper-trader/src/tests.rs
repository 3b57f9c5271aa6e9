//! Cross-module tests: bars, indicators, decisions and the ledger together

use crate::decision::parse_decision;
use crate::indicators::{IndicatorPeriods, IndicatorSnapshot};
use crate::portfolio::PortfolioLedger;
use crate::types::{RiskLevel, TradeAction};
use chrono::{TimeZone, Utc};
use market_feed::{BarAggregator, Tick};
use serde_json::json;

fn replay(prices: &[f64]) -> BarAggregator {
    let mut bars = BarAggregator::new(chrono::Duration::seconds(15), 100);
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    for (i, price) in prices.iter().enumerate() {
        // Two ticks per bucket
        let at = start + chrono::Duration::milliseconds(i as i64 * 7_500);
        bars.push(&Tick::new(*price, at));
    }
    bars
}

#[test]
fn test_replay_is_deterministic() {
    let prices: Vec<f64> = (0..90).map(|i| 68_500.0 + ((i * 37) % 23) as f64 - 11.0).collect();
    let periods = IndicatorPeriods::default();

    let a = IndicatorSnapshot::from_closes(&replay(&prices).closes(), &periods);
    let b = IndicatorSnapshot::from_closes(&replay(&prices).closes(), &periods);

    assert_eq!(a, b);
    assert!(a.sma_long.is_some());
    assert!(a.rsi.is_some());
}

#[test]
fn test_bars_feed_long_sma_after_thirty_buckets() {
    let prices: Vec<f64> = (0..59).map(|i| 100.0 + i as f64).collect();
    let bars = replay(&prices);
    assert_eq!(bars.len(), 30);

    let snapshot = IndicatorSnapshot::from_closes(&bars.closes(), &IndicatorPeriods::default());
    assert!(snapshot.sma_long.is_some());
    assert_eq!(snapshot.rsi, Some(100.0));
}

#[test]
fn test_payload_to_trade() {
    let mut ledger = PortfolioLedger::new(10_000.0, "BTC", 10.0, 50);

    let buy = parse_decision(&json!({
        "decision": "buy",
        "reasoning": "Bullish engulfing above SMA30",
        "tradePercentage": 0.25
    }))
    .unwrap();
    let trade = ledger.apply(&buy, 50_000.0, Utc::now()).unwrap();
    assert_eq!(trade.action, TradeAction::Buy);
    assert_eq!(trade.amount, 0.05);
    assert_eq!(ledger.state().cash, 7_500.0);

    let invalid = parse_decision(&json!({"decision": "BUY", "reasoning": "x", "tradePercentage": 2}));
    assert!(invalid.is_err());
    assert_eq!(ledger.trades().len(), 1);
}

#[test]
fn test_risk_ranges_are_ordered() {
    let ranges: Vec<(f64, f64)> = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High]
        .iter()
        .map(RiskLevel::fraction_range)
        .collect();

    for (low, high) in &ranges {
        assert!(0.0 < *low && low < high && *high <= 1.0);
    }
    assert!(ranges.windows(2).all(|w| w[0].1 <= w[1].0));
}

#[test]
fn test_request_wire_names() {
    let request = crate::types::DecisionRequest {
        risk_level: RiskLevel::Low,
        risk_guidance: RiskLevel::Low.guidance().to_string(),
        fraction_range: RiskLevel::Low.fraction_range(),
        cash: 100.0,
        asset_amount: 0.0,
        asset_name: "BTC".to_string(),
        latest_close: 1.0,
        recent_bars: replay(&[1.0, 2.0]).recent(5),
        indicators: IndicatorSnapshot::default(),
    };

    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["riskLevel"], "low");
    assert_eq!(value["assetAmount"], 0.0);
    assert_eq!(value["recentBars"].as_array().unwrap().len(), 1);
    assert!(value["indicators"]["smaShort"].is_null());
}
