//! Portfolio tracking - Cash and asset balances plus trade/decision history

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::journal::BoundedLog;
use crate::types::{Decision, DecisionLogEntry, PortfolioState, Trade, TradeAction};

/// Paper portfolio for a single asset.
///
/// The only owner of `PortfolioState`; balances change through [`apply`]
/// alone, and both fields of a trade are written in the same call.
///
/// [`apply`]: PortfolioLedger::apply
#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    state: PortfolioState,
    initial_cash: f64,
    asset_name: String,
    /// Buys are skipped unless cash is strictly above this
    min_trade_cash: f64,
    trades: BoundedLog<Trade>,
    decisions: BoundedLog<DecisionLogEntry>,
}

impl PortfolioLedger {
    /// Create new ledger with starting cash and no asset
    pub fn new(
        initial_cash: f64,
        asset_name: impl Into<String>,
        min_trade_cash: f64,
        log_capacity: usize,
    ) -> Self {
        Self {
            state: PortfolioState {
                cash: initial_cash,
                asset_amount: 0.0,
            },
            initial_cash,
            asset_name: asset_name.into(),
            min_trade_cash,
            trades: BoundedLog::new(log_capacity),
            decisions: BoundedLog::new(log_capacity),
        }
    }

    pub fn state(&self) -> PortfolioState {
        self.state
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    pub fn trades(&self) -> &BoundedLog<Trade> {
        &self.trades
    }

    pub fn decisions(&self) -> &BoundedLog<DecisionLogEntry> {
        &self.decisions
    }

    /// Mark-to-market value
    pub fn value(&self, price: Option<f64>) -> f64 {
        self.state.value(price)
    }

    /// Profit/loss against starting cash, absolute and in percent
    pub fn profit_loss(&self, price: Option<f64>) -> (f64, f64) {
        let pnl = self.value(price) - self.initial_cash;
        let pct = if self.initial_cash > 0.0 {
            pnl / self.initial_cash * 100.0
        } else {
            0.0
        };
        (pnl, pct)
    }

    /// Apply a validated decision at `price`.
    ///
    /// The decision is always journaled. Returns the trade when balances
    /// changed, `None` for holds and skipped buys/sells.
    pub fn apply(&mut self, decision: &Decision, price: f64, at: DateTime<Utc>) -> Option<Trade> {
        self.decisions.push(DecisionLogEntry {
            id: Uuid::new_v4(),
            at,
            reasoning: decision.reasoning.clone(),
            decision: decision.action,
        });

        if !(price.is_finite() && price > 0.0) {
            warn!("Ignoring {} at non-positive price {}", decision.action, price);
            return None;
        }

        let amount = match decision.action {
            TradeAction::Hold => {
                debug!("HOLD: {}", decision.reasoning);
                return None;
            }
            TradeAction::Buy => self.buy(decision.trade_fraction, price)?,
            TradeAction::Sell => self.sell(decision.trade_fraction, price)?,
        };

        let trade = Trade {
            id: Uuid::new_v4(),
            at,
            action: decision.action,
            asset: self.asset_name.clone(),
            amount,
            price,
        };

        info!(
            "{} {:.6} {} @ {:.2} | cash {:.2} | holding {:.6}",
            trade.action, trade.amount, trade.asset, trade.price, self.state.cash, self.state.asset_amount
        );

        self.trades.push(trade.clone());
        Some(trade)
    }

    /// Units bought, or `None` when the buy is skipped
    fn buy(&mut self, fraction: f64, price: f64) -> Option<f64> {
        if self.state.cash <= self.min_trade_cash {
            debug!(
                "BUY skipped: cash {:.2} not above minimum {:.2}",
                self.state.cash, self.min_trade_cash
            );
            return None;
        }

        let spend = self.state.cash * fraction;
        if spend <= 0.0 {
            debug!("BUY skipped: nothing to spend");
            return None;
        }

        let units = spend / price;
        self.state = PortfolioState {
            cash: self.state.cash - spend,
            asset_amount: self.state.asset_amount + units,
        };
        Some(units)
    }

    /// Units sold, or `None` when the sell is skipped
    fn sell(&mut self, fraction: f64, price: f64) -> Option<f64> {
        if self.state.asset_amount <= 0.0 {
            debug!("SELL skipped: no {} held", self.asset_name);
            return None;
        }

        let units = self.state.asset_amount * fraction;
        if units <= 0.0 {
            debug!("SELL skipped: nothing to sell");
            return None;
        }

        self.state = PortfolioState {
            cash: self.state.cash + units * price,
            asset_amount: self.state.asset_amount - units,
        };
        Some(units)
    }
}
