//! Parse and validate decision payloads from the reasoning service

use serde_json::Value;

use crate::types::{Decision, TradeAction};

/// Why a decision payload was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecisionError {
    #[error("decision payload is not a JSON object")]
    NotAnObject,

    #[error("decision action is missing")]
    MissingAction,

    #[error("unknown decision action: {0}")]
    UnknownAction(String),

    #[error("decision reasoning is missing")]
    MissingReasoning,

    #[error("trade fraction is missing or not a number")]
    FractionNotNumber,

    #[error("trade fraction {0} is outside [0, 1]")]
    FractionOutOfRange(f64),
}

/// First alias in `names` whose value `extract` accepts. A null or
/// mistyped value under one name does not hide a usable one under another.
fn field<'a, T>(
    payload: &'a Value,
    names: &[&str],
    extract: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    names
        .iter()
        .find_map(|name| payload.get(*name).and_then(&extract))
}

/// Turn a raw payload into a `Decision`, or name the first problem found.
///
/// Accepts `decision`/`action`, `reasoning` and `tradePercentage`/`tradeFraction`.
pub fn parse_decision(payload: &Value) -> Result<Decision, DecisionError> {
    if !payload.is_object() {
        return Err(DecisionError::NotAnObject);
    }

    let action = field(payload, &["decision", "action"], |v| {
        v.as_str().map(str::trim).filter(|s| !s.is_empty())
    })
    .ok_or(DecisionError::MissingAction)?;

    let action = match action.to_ascii_uppercase().as_str() {
        "BUY" => TradeAction::Buy,
        "SELL" => TradeAction::Sell,
        "HOLD" => TradeAction::Hold,
        _ => return Err(DecisionError::UnknownAction(action.to_string())),
    };

    let reasoning = payload
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(DecisionError::MissingReasoning)?;

    let trade_fraction = field(payload, &["tradePercentage", "tradeFraction"], Value::as_f64)
        .ok_or(DecisionError::FractionNotNumber)?;

    if !(0.0..=1.0).contains(&trade_fraction) {
        return Err(DecisionError::FractionOutOfRange(trade_fraction));
    }

    Ok(Decision {
        action,
        reasoning: reasoning.to_string(),
        trade_fraction,
    })
}
