//! Paper Trader Library
//!
//! Single-asset paper trading agent: bars from the market feed, indicators,
//! decisions from an external reasoning service, and a simulated ledger.

pub mod config;
pub mod decision;
pub mod indicators;
pub mod journal;
pub mod portfolio;
pub mod reasoning;
pub mod runner;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use config::{EngineConfig, Settings};
pub use decision::{parse_decision, DecisionError};
pub use indicators::{rsi, sma, IndicatorPeriods, IndicatorSnapshot};
pub use journal::BoundedLog;
pub use portfolio::PortfolioLedger;
pub use reasoning::{GatewayClient, ReasoningError, ReasoningService};
pub use runner::{BotError, BotHandle, BotRunner};
pub use scheduler::DecisionScheduler;
pub use types::{
    BotSnapshot, BotState, ChartBar, Decision, DecisionLogEntry, DecisionRequest, PortfolioState,
    RiskLevel, Trade, TradeAction,
};
