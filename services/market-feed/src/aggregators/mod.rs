// Tick to bar aggregation
use crate::types::*;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use tracing::debug;

/// What a tick did to the bar history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarUpdate {
    /// The tick started a new bucket
    Opened,
    /// The tick landed in the most recent bucket
    Updated,
    /// The tick belongs to an older bucket and was folded into the last bar
    Late,
}

/// Sliding window of fixed-width OHLC bars built from a tick stream.
///
/// Bars are strictly increasing in `bucket_start`, no two share a bucket and
/// the last bar always carries the most recently received price. Once the
/// window exceeds its capacity the oldest bar is evicted.
#[derive(Debug, Clone)]
pub struct BarAggregator {
    width_ms: i64,
    capacity: usize,
    bars: VecDeque<Bar>,
}

impl BarAggregator {
    pub fn new(width: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            width_ms: width.num_milliseconds().max(1),
            capacity,
            bars: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Start of the bucket containing `at`
    pub fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let ms = at.timestamp_millis().div_euclid(self.width_ms) * self.width_ms;
        DateTime::from_timestamp_millis(ms).unwrap_or(at)
    }

    /// Apply one tick in arrival order
    pub fn push(&mut self, tick: &Tick) -> BarUpdate {
        let bucket = self.bucket_start(tick.observed_at);

        if let Some(last) = self.bars.back_mut() {
            if last.bucket_start == bucket {
                last.absorb(tick.price);
                return BarUpdate::Updated;
            }
            if last.bucket_start > bucket {
                debug!(
                    "Late tick for bucket {} folded into {}",
                    bucket, last.bucket_start
                );
                last.absorb(tick.price);
                return BarUpdate::Late;
            }
        }

        self.bars.push_back(Bar::opened_at(bucket, tick.price));
        if self.bars.len() > self.capacity {
            self.bars.pop_front();
        }
        BarUpdate::Opened
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter()
    }

    /// Closing prices, oldest first
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// The last `n` bars, oldest first
    pub fn recent(&self, n: usize) -> Vec<Bar> {
        let skip = self.bars.len().saturating_sub(n);
        self.bars.iter().skip(skip).copied().collect()
    }

    pub fn to_vec(&self) -> Vec<Bar> {
        self.bars.iter().copied().collect()
    }
}
