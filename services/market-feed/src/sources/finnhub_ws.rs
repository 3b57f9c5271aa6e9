use crate::types::*;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a streaming session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Disconnect was requested
    Shutdown,
    /// The upstream went away on its own
    Lost,
    /// Nobody is listening for ticks any more
    SinkClosed,
}

/// Finnhub trade-stream client for a single symbol.
///
/// Forwards the latest trade price of every `trade` message, skipping prices
/// equal to the last one forwarded. Unexpected connection loss is followed by
/// a reconnect attempt after `reconnect_delay`, repeated until it succeeds or
/// a disconnect is requested.
pub struct FinnhubStream {
    url: Url,
    display_url: String,
    symbol: String,
    reconnect_delay: std::time::Duration,
    connect_timeout: std::time::Duration,
    last_price: Option<f64>,
}

impl FinnhubStream {
    pub fn new(settings: &FeedSettings, api_key: &str) -> Result<Self> {
        let url = Url::parse_with_params(&settings.ws_url, &[("token", api_key)])?;

        Ok(Self {
            url,
            // Never log the token
            display_url: settings.ws_url.clone(),
            symbol: settings.symbol.clone(),
            reconnect_delay: settings.reconnect_delay,
            connect_timeout: settings.connect_timeout,
            last_price: None,
        })
    }

    /// Open the websocket, bounded by the handshake timeout
    pub(crate) async fn open(&self) -> Result<WsStream> {
        info!("Connecting to {} for live data...", self.display_url);

        let attempt = connect_async(self.url.as_str());
        let (ws, _) = timeout(self.connect_timeout, attempt)
            .await
            .map_err(|_| FeedError::ConnectTimeout(self.connect_timeout))?
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        Ok(ws)
    }

    /// Stream ticks from an already open connection, reconnecting on loss,
    /// until shutdown is signalled.
    pub(crate) async fn run(
        mut self,
        mut ws: WsStream,
        sink: mpsc::Sender<Tick>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            match self.session(&mut ws, &sink, &mut shutdown).await {
                SessionEnd::Shutdown | SessionEnd::SinkClosed => break,
                SessionEnd::Lost => {}
            }

            match self.reconnect(&mut shutdown).await {
                Some(fresh) => ws = fresh,
                None => break,
            }
        }

        info!("Live feed for {} stopped", self.symbol);
    }

    /// Wait out the reconnect delay and retry until connected.
    /// Returns `None` if shutdown arrives first.
    async fn reconnect(&self, shutdown: &mut watch::Receiver<bool>) -> Option<WsStream> {
        loop {
            info!("Attempting to reconnect in {:?}...", self.reconnect_delay);

            tokio::select! {
                _ = sleep(self.reconnect_delay) => {}
                _ = shutdown.changed() => return None,
            }
            if *shutdown.borrow() {
                return None;
            }

            match self.open().await {
                Ok(ws) => return Some(ws),
                Err(e) => warn!("Reconnect failed: {}", e),
            }
        }
    }

    async fn session(
        &mut self,
        ws: &mut WsStream,
        sink: &mpsc::Sender<Tick>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        info!("WebSocket connection opened. Subscribing to {} trades.", self.symbol);
        if let Err(e) = ws.send(control_message("subscribe", &self.symbol)).await {
            error!("Failed to subscribe: {}", e);
            return SessionEnd::Lost;
        }

        loop {
            tokio::select! {
                msg = ws.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(price) = self.accept(&text) {
                            // A full sink must not hold up a requested disconnect
                            tokio::select! {
                                sent = sink.send(Tick::now(price)) => {
                                    if sent.is_err() {
                                        return SessionEnd::SinkClosed;
                                    }
                                }
                                _ = shutdown.changed() => {
                                    self.close(ws).await;
                                    return SessionEnd::Shutdown;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket connection closed by server");
                        return SessionEnd::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        return SessionEnd::Lost;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        return SessionEnd::Lost;
                    }
                },
                _ = shutdown.changed() => {
                    self.close(ws).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Trade price in `text` worth forwarding, skipping repeats of the last one
    fn accept(&mut self, text: &str) -> Option<f64> {
        let price = match parse_trade_price(text) {
            Ok(Some(price)) => price,
            Ok(None) => return None,
            Err(e) => {
                error!("Error parsing WebSocket message: {}", e);
                return None;
            }
        };

        if self.last_price == Some(price) {
            return None;
        }
        self.last_price = Some(price);

        debug!("Trade {} @ {}", self.symbol, price);
        Some(price)
    }

    /// Unsubscribe and close the connection cleanly
    async fn close(&self, ws: &mut WsStream) {
        info!("Disconnecting from {}", self.display_url);

        if let Err(e) = ws.send(control_message("unsubscribe", &self.symbol)).await {
            debug!("Unsubscribe not sent: {}", e);
        }
        if let Err(e) = ws.close(None).await {
            debug!("Close handshake failed: {}", e);
        }
    }
}

fn control_message(kind: &str, symbol: &str) -> Message {
    Message::Text(serde_json::json!({ "type": kind, "symbol": symbol }).to_string())
}

/// Extract the latest trade price from a Finnhub message.
///
/// Returns `Ok(None)` for non-trade messages (pings, acks) and empty batches.
pub fn parse_trade_price(text: &str) -> Result<Option<f64>> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| FeedError::InvalidMessage(e.to_string()))?;

    if value.get("type").and_then(|v| v.as_str()) != Some("trade") {
        return Ok(None);
    }

    let latest = match value
        .get("data")
        .and_then(|v| v.as_array())
        .and_then(|trades| trades.last())
    {
        Some(trade) => trade,
        None => return Ok(None),
    };

    let price = latest
        .get("p")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| FeedError::InvalidMessage("Missing price".to_string()))?;

    if !price.is_finite() || price <= 0.0 {
        return Err(FeedError::InvalidMessage(format!("Invalid price: {}", price)));
    }

    Ok(Some(price))
}
