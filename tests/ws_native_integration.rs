//! Integration tests for the native ticker stream.
//!
//! Each test runs a local `tokio-tungstenite` server (and, where hydration is
//! involved, a one-shot HTTP responder) on an ephemeral port, then drives a
//! `TickerStream` through connect → subscribe → trades → close/reconnect → stop.
//!
//! Run with:
//! ```bash
//! cargo test --features ws-native --test ws_native_integration
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use ticker_stream::http::{QuoteHttp, RetryPolicy};
use ticker_stream::stream::{Hydration, ReconnectPolicy};
use ticker_stream::ws::native::TickerStream;
use ticker_stream::ws::{ReadyState, WsConfig, WsEvent};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Mock stream server ──────────────────────────────────────────────────────

enum ServerCmd {
    Text(String),
    Close,
}

/// One accepted client connection, seen from the server side.
struct Conn {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<ServerCmd>,
}

impl Conn {
    fn send(&self, payload: Value) {
        let _ = self.outgoing.send(ServerCmd::Text(payload.to_string()));
    }

    fn send_raw(&self, text: &str) {
        let _ = self.outgoing.send(ServerCmd::Text(text.to_string()));
    }

    fn close(&self) {
        let _ = self.outgoing.send(ServerCmd::Close);
    }

    /// Next client frame, parsed as JSON.
    async fn recv(&mut self) -> Value {
        let text = timeout(TEST_TIMEOUT, self.incoming.recv())
            .await
            .expect("timed out waiting for client message")
            .expect("client connection ended");
        serde_json::from_str(&text).expect("client sent valid JSON")
    }

    async fn recv_n(&mut self, n: usize) -> Vec<Value> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.recv().await);
        }
        out
    }
}

struct MockServer {
    url: String,
    conns: mpsc::UnboundedReceiver<Conn>,
    handle: JoinHandle<()>,
}

impl MockServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn_tx, conns) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let conn_tx = conn_tx.clone();
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else {
                        return;
                    };
                    let (mut sink, mut stream) = ws.split();
                    let (in_tx, incoming) = mpsc::unbounded_channel();
                    let (outgoing, mut out_rx) = mpsc::unbounded_channel();
                    if conn_tx.send(Conn { incoming, outgoing }).is_err() {
                        return;
                    }

                    loop {
                        tokio::select! {
                            msg = stream.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = in_tx.send(text.as_str().to_string());
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            },
                            cmd = out_rx.recv() => match cmd {
                                Some(ServerCmd::Text(text)) => {
                                    if sink.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Some(ServerCmd::Close) | None => {
                                    let _ = sink.send(Message::Close(None)).await;
                                    break;
                                }
                            },
                        }
                    }
                });
            }
        });

        Self {
            url: format!("ws://{addr}/api/v1/market/ws"),
            conns,
            handle,
        }
    }

    async fn accept(&mut self) -> Conn {
        timeout(TEST_TIMEOUT, self.conns.recv())
            .await
            .expect("timed out waiting for client connection")
            .expect("server stopped")
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ─── Mock snapshot endpoint ──────────────────────────────────────────────────

/// Serve `body` to the first GET, reporting the request line.
async fn serve_snapshot_once(body: Value) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (line_tx, line_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((mut tcp, _)) = listener.accept().await else {
            return;
        };
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            match tcp.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        let request = String::from_utf8_lossy(&buf);
        let _ = line_tx.send(request.lines().next().unwrap_or_default().to_string());

        let body = body.to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = tcp.write_all(response.as_bytes()).await;
        let _ = tcp.shutdown().await;
    });

    (format!("http://{addr}"), line_rx)
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(400),
        max_attempts: 5,
    }
}

fn config(url: &str) -> WsConfig {
    WsConfig {
        url: url.to_string(),
        reconnect: fast_policy(),
    }
}

fn trade(ticks: &[(&str, f64)]) -> Value {
    let data: Vec<Value> = ticks
        .iter()
        .map(|(s, p)| json!({ "s": s, "p": p }))
        .collect();
    json!({ "type": "trade", "data": data })
}

/// Poll until `check` holds or the test timeout elapses.
async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(TEST_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_matching(stream: &TickerStream, predicate: impl Fn(&WsEvent) -> bool) -> WsEvent {
    let events = stream.events();
    tokio::pin!(events);

    timeout(TEST_TIMEOUT, async {
        while let Some(ev) = events.next().await {
            if predicate(&ev) {
                return ev;
            }
        }
        panic!("event stream ended without a matching event");
    })
    .await
    .expect("timed out waiting for matching event")
}

fn subscribe(symbol: &str) -> Value {
    json!({ "type": "subscribe", "symbol": symbol })
}

fn unsubscribe(symbol: &str) -> Value {
    json!({ "type": "unsubscribe", "symbol": symbol })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribes_each_symbol_in_order_on_open() {
    let mut server = MockServer::start().await;
    let mut stream = TickerStream::start(config(&server.url), None, ["AAPL", "MSFT", "GOOGL"]);

    let mut conn = server.accept().await;
    let sent = conn.recv_n(3).await;
    assert_eq!(sent, vec![subscribe("AAPL"), subscribe("MSFT"), subscribe("GOOGL")]);

    wait_until(|| stream.is_connected()).await;
    assert_eq!(stream.reconnect_attempts(), 0);

    stream.stop().await;
}

#[tokio::test]
async fn hydration_then_trades_merge_into_store() {
    let (api_url, mut requests) = serve_snapshot_once(json!({
        "success": true,
        "data": [
            { "ticker": "^GSPC", "price": 5000.0, "price_change_pct": 0.5 }
        ]
    }))
    .await;
    let mut server = MockServer::start().await;

    let hydration = Hydration {
        http: QuoteHttp::new(&api_url).unwrap(),
        retry: RetryPolicy::None,
    };
    let mut stream = TickerStream::start(config(&server.url), Some(hydration), ["^GSPC", "^DJI"]);
    let quotes = stream.quotes().clone();

    let request_line = timeout(TEST_TIMEOUT, requests.recv()).await.unwrap().unwrap();
    assert!(
        request_line.starts_with("GET /api/v1/market/quotes?symbols=%5EGSPC%2C%5EDJI "),
        "unexpected request: {request_line}"
    );

    wait_until(|| quotes.get("^GSPC").is_some()).await;
    let hydrated = quotes.get("^GSPC").unwrap();
    assert_eq!(hydrated.price, 5000.0);
    assert_eq!(hydrated.change_pct, 0.5);

    let mut conn = server.accept().await;
    conn.recv_n(2).await;

    conn.send(trade(&[("^GSPC", 5050.0), ("^DJI", 40000.0)]));
    wait_until(|| quotes.get("^DJI").is_some()).await;

    let spx = quotes.get("^GSPC").unwrap();
    assert_eq!(spx.price, 5050.0);
    assert!((spx.change_pct - 1.0).abs() < 1e-9);

    let dji = quotes.get("^DJI").unwrap();
    assert_eq!(dji.price, 40000.0);
    assert_eq!(dji.change_pct, 0.0);

    stream.stop().await;
}

#[tokio::test]
async fn listeners_see_every_trade_batch() {
    let mut server = MockServer::start().await;
    let mut stream = TickerStream::start(config(&server.url), None, ["AAPL"]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    stream.quotes().subscribe(move |book| {
        let _ = tx.send(book.get("AAPL").map(|q| q.price));
    });

    let mut conn = server.accept().await;
    conn.recv().await;

    conn.send(trade(&[("AAPL", 190.0)]));
    conn.send(trade(&[("AAPL", 191.9)]));

    let first = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    let second = timeout(TEST_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, Some(190.0));
    assert_eq!(second, Some(191.9));

    let aapl = stream.quotes().get("AAPL").unwrap();
    assert!((aapl.change_pct - 1.0).abs() < 1e-9);

    stream.stop().await;
}

#[tokio::test]
async fn malformed_and_unknown_messages_are_ignored() {
    let mut server = MockServer::start().await;
    let mut stream = TickerStream::start(config(&server.url), None, ["AAPL"]);

    let mut conn = server.accept().await;
    conn.recv().await;

    conn.send_raw("not json at all");
    conn.send(json!({ "type": "heartbeat" }));
    conn.send(json!({ "type": "trade", "data": [{ "s": "AAPL" }] }));
    conn.send(trade(&[("AAPL", 190.0)]));

    wait_until(|| stream.quotes().get("AAPL").is_some()).await;
    assert_eq!(stream.quotes().len(), 1);
    assert_eq!(stream.quotes().version(), 1);
    assert!(stream.is_connected());

    stream.stop().await;
}

#[tokio::test]
async fn reconnects_and_resubscribes_after_server_close() {
    let mut server = MockServer::start().await;
    let mut stream = TickerStream::start(config(&server.url), None, ["AAPL", "MSFT"]);

    let mut first = server.accept().await;
    first.recv_n(2).await;
    first.send(trade(&[("AAPL", 100.0)]));
    wait_until(|| stream.quotes().get("AAPL").is_some()).await;

    first.close();

    let mut second = server.accept().await;
    let sent = second.recv_n(2).await;
    assert_eq!(sent, vec![subscribe("AAPL"), subscribe("MSFT")]);
    wait_until(|| stream.is_connected()).await;
    assert_eq!(stream.reconnect_attempts(), 0);

    // The book survives the reconnect; changes keep deriving from it.
    second.send(trade(&[("AAPL", 110.0)]));
    wait_until(|| stream.quotes().get("AAPL").map(|q| q.price) == Some(110.0)).await;
    let aapl = stream.quotes().get("AAPL").unwrap();
    assert!((aapl.change_pct - 10.0).abs() < 1e-9);

    stream.stop().await;
}

#[tokio::test]
async fn stop_unsubscribes_then_closes() {
    let mut server = MockServer::start().await;
    let mut stream = TickerStream::start(config(&server.url), None, ["AAPL", "MSFT"]);

    let mut conn = server.accept().await;
    conn.recv_n(2).await;
    wait_until(|| stream.is_connected()).await;

    stream.stop().await;

    let sent = conn.recv_n(2).await;
    assert_eq!(sent, vec![unsubscribe("AAPL"), unsubscribe("MSFT")]);
    assert_eq!(stream.ready_state(), ReadyState::Closed);

    let closed = timeout(TEST_TIMEOUT, conn.incoming.recv()).await.unwrap();
    assert!(closed.is_none(), "no frames expected after unsubscribes");

    // Idempotent.
    stream.stop().await;
}

#[tokio::test]
async fn stop_during_backoff_prevents_reconnect() {
    let mut server = MockServer::start().await;
    let slow = WsConfig {
        url: server.url.clone(),
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(500),
            ..fast_policy()
        },
    };
    let mut stream = TickerStream::start(slow, None, ["AAPL"]);

    let mut conn = server.accept().await;
    conn.recv().await;
    conn.close();

    let event = next_matching(&stream, |ev| matches!(ev, WsEvent::Disconnected { .. })).await;
    assert!(matches!(event, WsEvent::Disconnected { .. }));

    stream.stop().await;

    let reconnected = timeout(Duration::from_secs(1), server.conns.recv()).await;
    assert!(reconnected.is_err(), "no connection expected after stop");
    assert!(!stream.is_connected());
}

#[tokio::test]
async fn gives_up_after_max_attempts_and_keeps_quotes() {
    // Bind then drop: the port refuses every connection.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let store = ticker_stream::stream::QuoteStore::new();
    let mut stream = TickerStream::start_with_store(
        config(&format!("ws://{addr}/api/v1/market/ws")),
        None,
        ["AAPL"],
        store.clone(),
    );

    let event = next_matching(&stream, |ev| matches!(ev, WsEvent::MaxReconnectReached)).await;
    assert!(matches!(event, WsEvent::MaxReconnectReached));
    assert_eq!(stream.reconnect_attempts(), 5);
    assert!(!stream.is_connected());
    assert!(store.is_empty());

    stream.stop().await;
}
