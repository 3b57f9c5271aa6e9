//! Technical indicators over closing prices
//!
//! Pure functions: identical inputs give bit-identical outputs, so recorded
//! price sequences can be replayed in tests.

use serde::{Deserialize, Serialize};

/// Simple moving average of the last `period` prices.
///
/// `None` when fewer than `period` prices exist (or `period` is zero).
pub fn sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let sum: f64 = prices[prices.len() - period..].iter().sum();
    Some(sum / period as f64)
}

/// Relative strength index over the last `period` price changes.
///
/// Needs `period + 1` prices. Gains and losses are plain averages over the
/// window (no Wilder smoothing). A window without losses yields 100.
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() <= period {
        return None;
    }

    let window = &prices[prices.len() - period - 1..];
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for pair in window.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gain_sum += change;
        } else if change < 0.0 {
            loss_sum += -change;
        }
    }

    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// Indicator lookback periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorPeriods {
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi: usize,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            sma_short: 10,
            sma_long: 30,
            rsi: 14,
        }
    }
}

/// Latest indicator values; each is `None` until enough history exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    pub rsi: Option<f64>,
}

impl IndicatorSnapshot {
    pub fn from_closes(closes: &[f64], periods: &IndicatorPeriods) -> Self {
        Self {
            sma_short: sma(closes, periods.sma_short),
            sma_long: sma(closes, periods.sma_long),
            rsi: rsi(closes, periods.rsi),
        }
    }

    /// Snapshot for every prefix of `closes`, as drawn on a chart
    pub fn series(closes: &[f64], periods: &IndicatorPeriods) -> Vec<Self> {
        (1..=closes.len())
            .map(|end| Self::from_closes(&closes[..end], periods))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_example() {
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0], 4), Some(2.5));
    }

    #[test]
    fn test_sma_undefined_below_period() {
        assert_eq!(sma(&[], 1), None);
        assert_eq!(sma(&[1.0, 2.0], 3), None);
        assert_eq!(sma(&[1.0, 2.0], 0), None);
    }

    #[test]
    fn test_sma_matches_mean_of_tail_for_every_length() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        for len in 0..=prices.len() {
            for period in 1..=12 {
                let data = &prices[..len];
                let got = sma(data, period);
                if len < period {
                    assert_eq!(got, None);
                } else {
                    let tail = &data[len - period..];
                    let mean = tail.iter().sum::<f64>() / period as f64;
                    assert_eq!(got, Some(mean));
                }
            }
        }
    }

    #[test]
    fn test_rsi_needs_period_plus_one() {
        let prices: Vec<f64> = (0..14).map(|i| i as f64).collect();
        assert_eq!(rsi(&prices, 14), None);
        let prices: Vec<f64> = (0..15).map(|i| i as f64).collect();
        assert!(rsi(&prices, 14).is_some());
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&prices, 14), Some(100.0));
    }

    #[test]
    fn test_rsi_flat_with_one_gain_is_100() {
        let mut prices = vec![50.0; 15];
        prices[14] = 51.0;
        assert_eq!(rsi(&prices, 14), Some(100.0));
    }

    #[test]
    fn test_rsi_all_losses_is_0() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi(&prices, 14), Some(0.0));
    }

    #[test]
    fn test_rsi_balanced_is_50() {
        // +1, -1 alternating over 14 changes
        let prices: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        let value = rsi(&prices, 14).unwrap();
        assert!((value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_only_uses_last_window() {
        let mut prices: Vec<f64> = (0..10).map(|i| 100.0 - i as f64 * 3.0).collect();
        prices.extend((0..4).map(|i| 80.0 + i as f64));
        assert_eq!(rsi(&prices, 3), Some(100.0));
    }

    #[test]
    fn test_indicators_are_replayable() {
        let prices: Vec<f64> = (0..60).map(|i| 68_500.0 + (i as f64 * 1.3).cos() * 40.0).collect();
        let periods = IndicatorPeriods::default();
        let a = IndicatorSnapshot::from_closes(&prices, &periods);
        let b = IndicatorSnapshot::from_closes(&prices.clone(), &periods);
        assert_eq!(a.sma_short.map(f64::to_bits), b.sma_short.map(f64::to_bits));
        assert_eq!(a.sma_long.map(f64::to_bits), b.sma_long.map(f64::to_bits));
        assert_eq!(a.rsi.map(f64::to_bits), b.rsi.map(f64::to_bits));
    }

    #[test]
    fn test_series_follows_prefixes() {
        let closes: Vec<f64> = (1..=31).map(|i| i as f64).collect();
        let series = IndicatorSnapshot::series(&closes, &IndicatorPeriods::default());
        assert_eq!(series.len(), 31);
        assert_eq!(series[8].sma_short, None);
        assert_eq!(series[9].sma_short, Some(5.5));
        assert_eq!(series[28].sma_long, None);
        assert_eq!(series[29].sma_long, Some(15.5));
        assert_eq!(series[13].rsi, None);
        assert_eq!(series[14].rsi, Some(100.0));
    }
}
