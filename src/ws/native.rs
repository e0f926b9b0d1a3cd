//! Native ticker stream — `tokio-tungstenite`.
//!
//! - Background tokio task owns the socket and the [`StreamMachine`]
//! - Exponential backoff reconnection, capped attempts
//! - Subscribe on every open, unsubscribe on stop
//! - Independent hydration task filling the [`QuoteStore`]
//! - Stream-based event delivery to an optional observer

use std::pin::Pin;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream, Stream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::WsError;
use crate::shared::Symbol;
use crate::stream::{hydrate, Action, Hydration, QuoteStore, StreamMachine};
use crate::ws::{Kind, MessageOut, ReadyState, WsConfig, WsEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

// ─── Commands from public API to background task ─────────────────────────────

enum Command {
    Stop,
}

// ─── Background task state ───────────────────────────────────────────────────

/// What the task loop does next.
enum Next {
    Dial,
    Sleep(Duration),
    Done,
}

struct TaskState {
    config: WsConfig,
    machine: StreamMachine,
    store: QuoteStore,
    event_tx: mpsc::Sender<WsEvent>,
    cmd_rx: mpsc::Receiver<Command>,
    ready_state: Arc<AtomicU16>,
    reconnect_attempts: Arc<AtomicU32>,
}

impl TaskState {
    fn emit(&self, event: WsEvent) {
        let _ = self.event_tx.try_send(event);
    }

    fn publish_status(&self) {
        self.ready_state
            .store(self.machine.state().ready_state() as u16, Ordering::SeqCst);
        self.reconnect_attempts
            .store(self.machine.reconnect_attempts(), Ordering::SeqCst);
    }

    /// Execute machine actions against the current sink (if any).
    async fn perform(&mut self, actions: Vec<Action>, mut sink: Option<&mut WsSink>) -> Option<Next> {
        self.publish_status();

        let mut next = None;
        for action in actions {
            match action {
                Action::Connect => next = Some(Next::Dial),
                Action::Send(msg) => {
                    if let Some(sink) = sink.as_deref_mut() {
                        if let Err(e) = send_msg(sink, &msg).await {
                            tracing::warn!("Send failed ({}): {}", msg, e);
                        }
                    }
                }
                Action::ScheduleReconnect(delay) => next = Some(Next::Sleep(delay)),
                // The backoff sleep is owned by the task loop; leaving it is the cancel.
                Action::CancelReconnect => {}
                Action::Close => {
                    if let Some(sink) = sink.as_deref_mut() {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "Client disconnect".into(),
                            })))
                            .await;
                    }
                    next = Some(Next::Done);
                }
                Action::GiveUp => {
                    self.emit(WsEvent::MaxReconnectReached);
                    next = Some(Next::Done);
                }
            }
        }
        next
    }

    async fn stop(&mut self, sink: Option<&mut WsSink>) -> Option<Next> {
        tracing::info!("Stopping ticker stream");
        let actions = self.machine.teardown();
        self.perform(actions, sink).await;
        Some(Next::Done)
    }
}

// ─── Public TickerStream ─────────────────────────────────────────────────────

/// Live quotes for a fixed set of symbols.
///
/// Created by [`TickerStream::start`]; release it with [`TickerStream::stop`].
/// Dropping the handle without stopping aborts the background tasks without
/// sending unsubscribe messages.
pub struct TickerStream {
    symbols: Vec<Symbol>,
    store: QuoteStore,
    cmd_tx: Option<mpsc::Sender<Command>>,
    event_rx: tokio::sync::Mutex<mpsc::Receiver<WsEvent>>,
    task_handle: Option<JoinHandle<()>>,
    hydration_handle: Option<JoinHandle<()>>,
    ready_state: Arc<AtomicU16>,
    reconnect_attempts: Arc<AtomicU32>,
}

impl TickerStream {
    /// Start hydration and the streaming connection for `symbols`.
    ///
    /// Must be called from within a tokio runtime. Pass `None` for `hydration`
    /// to rely on the stream alone.
    pub fn start<I, S>(config: WsConfig, hydration: Option<Hydration>, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        Self::start_with_store(config, hydration, symbols, QuoteStore::new())
    }

    /// Like [`TickerStream::start`], writing into an existing store.
    pub fn start_with_store<I, S>(
        config: WsConfig,
        hydration: Option<Hydration>,
        symbols: I,
        store: QuoteStore,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let symbols: Vec<Symbol> = symbols.into_iter().map(Into::into).collect();
        let (event_tx, event_rx) = mpsc::channel(256);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let ready_state = Arc::new(AtomicU16::new(ReadyState::Closed as u16));
        let reconnect_attempts = Arc::new(AtomicU32::new(0));

        let hydration_handle = hydration
            .map(|h| tokio::spawn(hydrate(h, symbols.clone(), store.clone())));

        let state = TaskState {
            machine: StreamMachine::new(symbols.clone(), config.reconnect.clone()),
            config,
            store: store.clone(),
            event_tx,
            cmd_rx,
            ready_state: Arc::clone(&ready_state),
            reconnect_attempts: Arc::clone(&reconnect_attempts),
        };
        let task_handle = tokio::spawn(run_task(state));

        Self {
            symbols,
            store,
            cmd_tx: Some(cmd_tx),
            event_rx: tokio::sync::Mutex::new(event_rx),
            task_handle: Some(task_handle),
            hydration_handle,
            ready_state,
            reconnect_attempts,
        }
    }

    /// Stop the stream: cancel any pending reconnect, unsubscribe, close.
    ///
    /// Waits up to 5 seconds for the background task. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.hydration_handle.take() {
            handle.abort();
        }

        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Stop).await;
        }

        if let Some(handle) = self.task_handle.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }

        self.ready_state
            .store(ReadyState::Closed as u16, Ordering::SeqCst);
    }

    /// The live quote mapping.
    pub fn quotes(&self) -> &QuoteStore {
        &self.store
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn is_connected(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Current connection state.
    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from(self.ready_state.load(Ordering::SeqCst))
    }

    /// Consecutive reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Get a stream of connection events.
    ///
    /// The returned stream borrows `self`, so it must be dropped
    /// before calling `stop()`.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = WsEvent> + Send + '_>> {
        Box::pin(futures_util::stream::unfold(
            &self.event_rx,
            |rx| async move {
                let mut guard = rx.lock().await;
                guard.recv().await.map(|event| (event, rx))
            },
        ))
    }
}

impl Drop for TickerStream {
    fn drop(&mut self) {
        if let Some(handle) = self.hydration_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

// ─── Background task ─────────────────────────────────────────────────────────

async fn run_task(mut state: TaskState) {
    let actions = state.machine.connect();
    let mut next = state.perform(actions, None).await;

    loop {
        next = match next {
            Some(Next::Dial) => dial(&mut state).await,
            Some(Next::Sleep(delay)) => backoff_sleep(&mut state, delay).await,
            Some(Next::Done) | None => break,
        };
    }

    state.publish_status();
    tracing::debug!("Ticker stream task finished ({:?})", state.machine.state());
}

/// One connection attempt, and the connected loop if it succeeds.
async fn dial(state: &mut TaskState) -> Option<Next> {
    let request = match state.config.url.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Cannot create stream connection to `{}`: {}", state.config.url, e);
            state.emit(WsEvent::Error(
                WsError::InvalidEndpoint(e.to_string()).to_string(),
            ));
            let actions = state.machine.on_connect_failed();
            return state.perform(actions, None).await;
        }
    };

    tracing::info!("Connecting to {}", state.config.url);
    let connected = tokio::select! {
        result = attempt_connect(request) => result,
        _ = state.cmd_rx.recv() => {
            return state.stop(None).await;
        }
    };

    match connected {
        Ok((mut sink, stream)) => {
            state.emit(WsEvent::Connected);
            let actions = state.machine.on_open();
            if let Some(next) = state.perform(actions, Some(&mut sink)).await {
                return Some(next);
            }
            run_connected(state, sink, stream).await
        }
        Err(e) => {
            tracing::error!("WebSocket connection failed: {}", e);
            state.emit(WsEvent::Error(e.to_string()));
            state.emit(WsEvent::Disconnected {
                code: None,
                reason: e.to_string(),
            });
            let actions = state.machine.on_close();
            state.perform(actions, None).await
        }
    }
}

/// The inner connected loop — runs until the connection breaks or stop is requested.
async fn run_connected(
    state: &mut TaskState,
    mut sink: WsSink,
    mut stream: SplitStream<WsStream>,
) -> Option<Next> {
    loop {
        tokio::select! {
            // ── a) Incoming WS message ───────────────────────────────────
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text_str: &str = text.as_ref();
                        if let Some(kind) = state.machine.handle_message(text_str) {
                            if let Kind::Trade(payload) = &kind {
                                state.store.apply_trades(payload.data.clone());
                            }
                            state.emit(WsEvent::Message(kind));
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = extract_close(frame.as_ref());
                        tracing::info!("WebSocket closed: code={}, reason={}", code, reason);
                        state.emit(WsEvent::Disconnected {
                            code: Some(code),
                            reason,
                        });
                        let actions = state.machine.on_close();
                        return state.perform(actions, None).await;
                    }
                    Some(Ok(_)) => {} // Binary, Pong, Frame: ignore
                    Some(Err(e)) => {
                        let reason = e.to_string();
                        tracing::error!("WebSocket error: {}", reason);
                        state.emit(WsEvent::Disconnected {
                            code: None,
                            reason,
                        });
                        let actions = state.machine.on_close();
                        return state.perform(actions, None).await;
                    }
                    None => {
                        state.emit(WsEvent::Disconnected {
                            code: None,
                            reason: "Stream ended".into(),
                        });
                        let actions = state.machine.on_close();
                        return state.perform(actions, None).await;
                    }
                }
            }

            // ── b) Stop requested (or handle dropped) ────────────────────
            _ = state.cmd_rx.recv() => {
                return state.stop(Some(&mut sink)).await;
            }
        }
    }
}

/// Wait out the reconnect delay unless stopped first.
async fn backoff_sleep(state: &mut TaskState, delay: Duration) -> Option<Next> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {
            let actions = state.machine.connect();
            state.perform(actions, None).await
        }
        _ = state.cmd_rx.recv() => {
            state.stop(None).await
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Attempt to establish a WebSocket connection with a 30-second timeout.
async fn attempt_connect(request: Request) -> Result<(WsSink, SplitStream<WsStream>), WsError> {
    let (ws_stream, _) = tokio::time::timeout(Duration::from_secs(30), connect_async(request))
        .await
        .map_err(|_| WsError::ConnectionFailed("Connection timeout".to_string()))?
        .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

    Ok(ws_stream.split())
}

/// Serialize and send a MessageOut over the sink.
async fn send_msg(sink: &mut WsSink, msg: &MessageOut) -> Result<(), WsError> {
    let json = serde_json::to_string(msg).map_err(|e| WsError::SendFailed(e.to_string()))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| WsError::SendFailed(e.to_string()))
}

/// Extract close code and reason from an optional CloseFrame.
fn extract_close(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.as_str().to_string()),
        None => (1006, "No close frame".into()),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
