use crate::types::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Random-walk price generator used when no live feed is available.
///
/// The synthetic price is kept in a shared cell so a later restart of the
/// stream continues from where the previous one stopped.
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    price: Arc<AtomicU64>,
    interval: Duration,
    floor: f64,
}

impl SimulatedSource {
    pub fn new(start_price: f64, interval: Duration, floor: f64) -> Self {
        Self {
            price: Arc::new(AtomicU64::new(start_price.max(floor).to_bits())),
            interval,
            floor,
        }
    }

    pub fn from_settings(settings: &FeedSettings) -> Self {
        Self::new(
            settings.simulated_start_price,
            settings.simulated_interval,
            settings.simulated_floor,
        )
    }

    /// Current synthetic price
    pub fn price(&self) -> f64 {
        f64::from_bits(self.price.load(Ordering::Relaxed))
    }

    /// One random-walk step. `u` is a uniform sample from [0, 1).
    pub fn step(price: f64, u: f64, floor: f64) -> f64 {
        let change = (u - 0.495) * (price * 0.001);
        let next = price + change;
        if next < floor {
            floor
        } else {
            next
        }
    }

    /// Emit a tick every interval until shutdown is signalled or the sink closes
    pub async fn run(self, sink: mpsc::Sender<Tick>, mut shutdown: watch::Receiver<bool>) {
        info!("Starting simulated market data stream every {:?}", self.interval);

        let mut rng = StdRng::from_entropy();
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let next = Self::step(self.price(), rng.gen::<f64>(), self.floor);
                    self.price.store(next.to_bits(), Ordering::Relaxed);

                    // Waiting on a full sink still honors shutdown
                    tokio::select! {
                        sent = sink.send(Tick::now(next)) => {
                            if sent.is_err() {
                                debug!("Tick sink closed, stopping simulated stream");
                                break;
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Stopped simulated market data stream");
    }
}
