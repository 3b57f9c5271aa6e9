//! Core types shared by the ledger, the decision cycle and the controller

use chrono::{DateTime, Utc};
use market_feed::{Bar, FeedMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::indicators::IndicatorSnapshot;

/// Trade action type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
            TradeAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// Risk appetite passed to the reasoning service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    /// Suggested share of cash (buy) or asset (sell) to commit per trade
    pub fn fraction_range(&self) -> (f64, f64) {
        match self {
            RiskLevel::Low => (0.10, 0.25),
            RiskLevel::Medium => (0.25, 0.50),
            RiskLevel::High => (0.50, 0.75),
        }
    }

    /// One-line trading stance for this risk level
    pub fn guidance(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Preserve capital. Trade only on clear, low-risk patterns; prefer HOLD.",
            RiskLevel::Medium => "Balance risk and reward. Trade on combined bar-pattern and indicator signals.",
            RiskLevel::High => "Favour growth. Trade aggressively on strong momentum bars.",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Validated trading decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: TradeAction,
    pub reasoning: String,
    /// Share of cash (buy) or asset (sell) to trade, in [0, 1]
    pub trade_fraction: f64,
}

/// Executed paper trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub action: TradeAction,
    pub asset: String,
    pub amount: f64,
    pub price: f64,
}

/// Decision journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub reasoning: String,
    pub decision: TradeAction,
}

/// Cash and asset balances
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash: f64,
    pub asset_amount: f64,
}

impl PortfolioState {
    /// Mark-to-market value; cash only when no price is known
    pub fn value(&self, price: Option<f64>) -> f64 {
        match price {
            Some(p) => self.cash + self.asset_amount * p,
            None => self.cash,
        }
    }
}

/// Bot status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotState {
    #[default]
    Inactive,
    Running,
    Thinking,
    Error,
}

impl BotState {
    /// True between a start and the matching stop
    pub fn is_active(&self) -> bool {
        !matches!(self, BotState::Inactive)
    }
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotState::Inactive => write!(f, "inactive"),
            BotState::Running => write!(f, "running"),
            BotState::Thinking => write!(f, "thinking"),
            BotState::Error => write!(f, "error"),
        }
    }
}

/// Context sent to the reasoning service for one decision cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub risk_level: RiskLevel,
    pub risk_guidance: String,
    /// Suggested trade fraction range for the risk level
    pub fraction_range: (f64, f64),
    pub cash: f64,
    pub asset_amount: f64,
    pub asset_name: String,
    pub latest_close: f64,
    /// Most recent bars, oldest first
    pub recent_bars: Vec<Bar>,
    pub indicators: IndicatorSnapshot,
}

/// One bar with indicators computed over the history up to and including it
#[derive(Debug, Clone, Serialize)]
pub struct ChartBar {
    #[serde(flatten)]
    pub bar: Bar,
    #[serde(flatten)]
    pub indicators: IndicatorSnapshot,
}

/// Read-only view handed to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct BotSnapshot {
    pub state: BotState,
    pub risk_level: RiskLevel,
    pub data_source: Option<FeedMode>,
    pub asset_name: String,
    pub portfolio: PortfolioState,
    pub current_price: Option<f64>,
    pub portfolio_value: f64,
    pub profit_loss: f64,
    pub profit_loss_pct: f64,
    pub bars: Vec<ChartBar>,
    pub indicators: IndicatorSnapshot,
    /// Newest first
    pub trades: Vec<Trade>,
    /// Newest first
    pub decisions: Vec<DecisionLogEntry>,
}
