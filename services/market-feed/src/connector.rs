use crate::sources::finnhub_ws::FinnhubStream;
use crate::sources::simulated::SimulatedSource;
use crate::types::*;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How long `disconnect` waits for a source to wind down before aborting it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct ActiveSource {
    mode: FeedMode,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the single active tick source.
///
/// Selects the live Finnhub stream when credentials are present and the
/// initial handshake succeeds, otherwise the simulated random walk.
pub struct FeedConnector {
    settings: FeedSettings,
    simulated: SimulatedSource,
    active: Option<ActiveSource>,
}

impl FeedConnector {
    pub fn new(settings: FeedSettings) -> Self {
        let simulated = SimulatedSource::from_settings(&settings);
        Self {
            settings,
            simulated,
            active: None,
        }
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    fn start_simulated(&mut self, sink: mpsc::Sender<Tick>) -> FeedMode {
        let (shutdown, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.simulated.clone().run(sink, stop_rx));

        self.active = Some(ActiveSource {
            mode: FeedMode::Simulated,
            shutdown,
            task,
        });
        FeedMode::Simulated
    }

    async fn start_live(&mut self, api_key: &str, sink: mpsc::Sender<Tick>) -> Result<FeedMode> {
        let stream = FinnhubStream::new(&self.settings, api_key)?;
        let ws = stream.open().await?;

        let (shutdown, stop_rx) = watch::channel(false);
        let task = tokio::spawn(stream.run(ws, sink, stop_rx));

        self.active = Some(ActiveSource {
            mode: FeedMode::Live,
            shutdown,
            task,
        });
        Ok(FeedMode::Live)
    }
}

#[async_trait::async_trait]
impl TickFeed for FeedConnector {
    async fn connect(&mut self, sink: mpsc::Sender<Tick>) -> FeedMode {
        if let Some(active) = &self.active {
            if active.mode == FeedMode::Live && !active.task.is_finished() {
                info!("WebSocket connection already open.");
                return FeedMode::Live;
            }
            // Restart the simulated stream (or a dead live task) on the new sink
            self.disconnect().await;
        }

        let api_key = match self.settings.api_key.clone() {
            Some(key) if !key.trim().is_empty() => key,
            _ => {
                warn!("Feed API key not found. Falling back to simulated market data stream.");
                return self.start_simulated(sink);
            }
        };

        match self.start_live(&api_key, sink.clone()).await {
            Ok(mode) => mode,
            Err(e) => {
                warn!("Live feed unavailable ({}), falling back to simulated market data", e);
                self.start_simulated(sink)
            }
        }
    }

    async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        let _ = active.shutdown.send(true);

        let mut task = active.task;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("{} feed did not stop within {:?}, aborting", active.mode, SHUTDOWN_GRACE);
            task.abort();
        }

        info!("Disconnected {} feed", active.mode);
    }

    fn mode(&self) -> Option<FeedMode> {
        self.active.as_ref().map(|a| a.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;
    use tokio_test::assert_ok;

    fn simulated_settings() -> FeedSettings {
        FeedSettings {
            api_key: None,
            simulated_interval: Duration::from_millis(50),
            ..FeedSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_key_selects_simulated() {
        let mut connector = FeedConnector::new(simulated_settings());
        let (tx, mut rx) = mpsc::channel(16);

        assert_eq!(connector.connect(tx).await, FeedMode::Simulated);
        assert_eq!(connector.mode(), Some(FeedMode::Simulated));
        assert!(rx.recv().await.is_some());

        connector.disconnect().await;
        assert_eq!(connector.mode(), None);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_key_counts_as_missing() {
        let settings = FeedSettings {
            api_key: Some("  ".to_string()),
            ..simulated_settings()
        };
        let mut connector = FeedConnector::new(settings);
        let (tx, _rx) = mpsc::channel(16);
        assert_eq!(connector.connect(tx).await, FeedMode::Simulated);
        connector.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent() {
        let mut connector = FeedConnector::new(simulated_settings());
        connector.disconnect().await;

        let (tx, _rx) = mpsc::channel(16);
        connector.connect(tx).await;
        connector.disconnect().await;
        connector.disconnect().await;
        assert_eq!(connector.mode(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_continues_synthetic_price() {
        let mut connector = FeedConnector::new(simulated_settings());

        let (tx, mut rx) = mpsc::channel(16);
        connector.connect(tx).await;
        let last = rx.recv().await.unwrap().price;
        connector.disconnect().await;

        assert_eq!(connector.simulated.price(), last);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_with_full_sink_is_prompt() {
        let mut connector = FeedConnector::new(simulated_settings());
        let (tx, mut rx) = mpsc::channel(1);
        connector.connect(tx).await;

        // Nobody drains the channel, so the source is parked in send
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        connector.disconnect().await;
        assert!(started.elapsed() < SHUTDOWN_GRACE);

        assert_ok!(rx.try_recv());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_live_feed_falls_back() {
        let settings = FeedSettings {
            ws_url: "ws://127.0.0.1:9".to_string(),
            api_key: Some("key".to_string()),
            connect_timeout: Duration::from_secs(2),
            ..simulated_settings()
        };
        let mut connector = FeedConnector::new(settings);
        let (tx, _rx) = mpsc::channel(16);

        assert_eq!(connector.connect(tx).await, FeedMode::Simulated);
        connector.disconnect().await;
    }
}
