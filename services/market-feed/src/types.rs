use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Single timestamped price observation from a feed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

impl Tick {
    pub fn new(price: f64, observed_at: DateTime<Utc>) -> Self {
        Self { price, observed_at }
    }

    /// Tick stamped with the current wall-clock time
    pub fn now(price: f64) -> Self {
        Self::new(price, Utc::now())
    }
}

/// OHLC bar for one fixed-width time bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub bucket_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// Open a bar where every price is the first tick's price
    pub fn opened_at(bucket_start: DateTime<Utc>, price: f64) -> Self {
        Self {
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    /// Fold another price into the bar; open never changes
    pub fn absorb(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

/// Which tick source a connector ended up using
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Streaming trades from the upstream websocket
    Live,
    /// Internally generated random walk
    Simulated,
}

impl std::fmt::Display for FeedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedMode::Live => write!(f, "live"),
            FeedMode::Simulated => write!(f, "simulated"),
        }
    }
}

/// Feed connection settings
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Websocket base URL, the token is appended as a query parameter
    pub ws_url: String,
    /// Upstream credentials; `None` selects the simulated source
    pub api_key: Option<String>,
    /// Upstream symbol to subscribe to
    pub symbol: String,
    /// Delay before a reconnect attempt after unexpected loss
    pub reconnect_delay: Duration,
    /// Upper bound on the initial websocket handshake
    pub connect_timeout: Duration,
    /// Simulated source tick interval
    pub simulated_interval: Duration,
    /// Simulated source starting price
    pub simulated_start_price: f64,
    /// Simulated prices below this are reset to it
    pub simulated_floor: f64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws.finnhub.io".to_string(),
            api_key: None,
            symbol: "BINANCE:BTCUSDT".to_string(),
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            simulated_interval: Duration::from_secs(2),
            simulated_start_price: 68_500.0,
            simulated_floor: 5_000.0,
        }
    }
}

/// Error types for the market feed
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    #[error("WebSocket handshake timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Failed to send on WebSocket: {0}")]
    Send(String),
}

/// Result type for feed operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// A tick source the bot controller can attach to and detach from.
///
/// Ticks are pushed into the sink handed to `connect`. Implementations must
/// drop every clone of that sink on `disconnect`, which is how consumers
/// observe the end of the stream.
#[async_trait::async_trait]
pub trait TickFeed: Send {
    /// Start delivering ticks, returning the source actually selected
    async fn connect(&mut self, sink: mpsc::Sender<Tick>) -> FeedMode;

    /// Stop whichever source is active. Idempotent.
    async fn disconnect(&mut self);

    /// Currently active source, if any
    fn mode(&self) -> Option<FeedMode>;
}
