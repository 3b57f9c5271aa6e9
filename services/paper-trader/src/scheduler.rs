//! Decision cycle timer
//!
//! Posts a "cycle due" event into the controller's inbox once shortly after
//! arming and then every period. The timer never waits for a cycle to
//! finish; overlap is prevented by the controller's state check at cycle
//! entry.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::debug;

pub struct DecisionScheduler {
    period: Duration,
    initial_delay: Duration,
    task: Option<JoinHandle<()>>,
}

impl DecisionScheduler {
    pub fn new(period: Duration, initial_delay: Duration) -> Self {
        Self {
            period,
            initial_delay,
            task: None,
        }
    }

    /// Start firing `due()` into `inbox`, replacing any previous timer.
    ///
    /// Holds only a weak sender so an armed timer never keeps the
    /// controller alive; the timer ends once the inbox is gone.
    pub fn arm<E, F>(&mut self, inbox: mpsc::WeakSender<E>, due: F)
    where
        E: Send + 'static,
        F: Fn() -> E + Send + 'static,
    {
        self.disarm();

        let period = self.period.max(Duration::from_millis(1));
        let initial_delay = self.initial_delay;

        self.task = Some(tokio::spawn(async move {
            let armed_at = Instant::now();

            sleep(initial_delay).await;
            if !fire(&inbox, due()).await {
                return;
            }

            let mut ticker = interval_at(armed_at + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !fire(&inbox, due()).await {
                    return;
                }
            }
        }));

        debug!(
            "Decision scheduler armed: first cycle in {:?}, then every {:?}",
            self.initial_delay, self.period
        );
    }

    /// Stop the timer. Idempotent.
    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Decision scheduler disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for DecisionScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn fire<E>(inbox: &mpsc::WeakSender<E>, event: E) -> bool {
    match inbox.upgrade() {
        Some(tx) => tx.send(event).await.is_ok(),
        None => false,
    }
}
