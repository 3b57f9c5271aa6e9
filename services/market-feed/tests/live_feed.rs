//! Live feed tests against a local websocket server standing in for Finnhub

use futures::{SinkExt, StreamExt};
use market_feed::{FeedConnector, FeedMode, FeedSettings, TickFeed};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

async fn local_server() -> (TcpListener, FeedSettings) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let settings = FeedSettings {
        ws_url: format!("ws://{}", addr),
        api_key: Some("test-token".to_string()),
        reconnect_delay: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(2),
        ..FeedSettings::default()
    };
    (listener, settings)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("expected a text frame, got {:?}", other),
        }
    }
}

fn trade(price: f64) -> Message {
    Message::Text(
        serde_json::json!({
            "type": "trade",
            "data": [{ "p": price, "s": "BINANCE:BTCUSDT", "t": 1, "v": 0.01 }]
        })
        .to_string(),
    )
}

#[tokio::test]
async fn test_live_feed_subscribes_dedupes_and_unsubscribes() {
    let (listener, settings) = local_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let subscribe = next_text(&mut ws).await;
        assert_eq!(subscribe["type"], "subscribe");
        assert_eq!(subscribe["symbol"], "BINANCE:BTCUSDT");

        assert_ok!(ws.send(Message::Text(r#"{"type":"ping"}"#.to_string())).await);
        assert_ok!(ws.send(trade(100.0)).await);
        assert_ok!(ws.send(trade(100.0)).await);
        assert_ok!(ws.send(trade(101.5)).await);

        next_text(&mut ws).await
    });

    let mut connector = FeedConnector::new(settings);
    let (tx, mut rx) = mpsc::channel(16);
    assert_eq!(connector.connect(tx.clone()).await, FeedMode::Live);

    // Already connected: no second socket, same mode
    assert_eq!(connector.connect(tx).await, FeedMode::Live);

    assert_eq!(rx.recv().await.unwrap().price, 100.0);
    assert_eq!(rx.recv().await.unwrap().price, 101.5);

    connector.disconnect().await;
    let unsubscribe = assert_ok!(server.await);
    assert_eq!(unsubscribe["type"], "unsubscribe");
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_live_feed_reconnects_after_loss() {
    let (listener, settings) = local_server().await;

    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        next_text(&mut first).await;
        assert_ok!(first.send(trade(100.0)).await);
        drop(first);

        let mut second = accept(&listener).await;
        let resubscribe = next_text(&mut second).await;
        assert_ok!(second.send(trade(200.0)).await);
        (resubscribe, second)
    });

    let mut connector = FeedConnector::new(settings);
    let (tx, mut rx) = mpsc::channel(16);
    assert_eq!(connector.connect(tx).await, FeedMode::Live);

    assert_eq!(rx.recv().await.unwrap().price, 100.0);
    assert_eq!(rx.recv().await.unwrap().price, 200.0);

    let (resubscribe, _second) = assert_ok!(server.await);
    assert_eq!(resubscribe["type"], "subscribe");

    connector.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_cancels_pending_reconnect() {
    let (listener, settings) = local_server().await;
    let settings = FeedSettings {
        reconnect_delay: Duration::from_secs(5),
        ..settings
    };

    let mut connector = FeedConnector::new(settings);
    let (tx, _rx) = mpsc::channel(16);

    let accepted = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        next_text(&mut ws).await;
        drop(ws);
        listener
    });

    assert_eq!(connector.connect(tx).await, FeedMode::Live);
    let listener = assert_ok!(accepted.await);

    // Let the client notice the loss and enter its reconnect wait
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    connector.disconnect().await;
    assert!(started.elapsed() < Duration::from_secs(1));

    // No reconnect after an intentional disconnect
    assert_err!(tokio::time::timeout(Duration::from_millis(300), listener.accept()).await);
}

#[tokio::test]
async fn test_disconnect_with_full_sink_still_unsubscribes() {
    let (listener, settings) = local_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        next_text(&mut ws).await;
        for i in 0..4 {
            assert_ok!(ws.send(trade(100.0 + i as f64)).await);
        }
        next_text(&mut ws).await
    });

    let mut connector = FeedConnector::new(settings);
    let (tx, mut rx) = mpsc::channel(1);
    assert_eq!(connector.connect(tx).await, FeedMode::Live);

    // The first tick fills the channel and the next one waits in send
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = Instant::now();
    connector.disconnect().await;
    assert!(started.elapsed() < Duration::from_secs(1));

    let unsubscribe = assert_ok!(server.await);
    assert_eq!(unsubscribe["type"], "unsubscribe");
    assert_eq!(assert_ok!(rx.try_recv()).price, 100.0);
}
