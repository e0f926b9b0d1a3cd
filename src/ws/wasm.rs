//! WASM ticker stream using `web-sys::WebSocket`.
//!
//! - `web-sys::WebSocket` + `wasm-bindgen` closures
//! - Reconnect timer via `gloo-timers`
//! - Hydration via `spawn_local`, abortable on stop
//! - Callback-based event observer (`on_event: impl Fn(WsEvent)`)
//!
//! All state lives in the handle (`Rc<RefCell<..>>`, WASM is single-threaded).
//! Socket callbacks hold weak references, so a dropped handle silences them.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use futures_util::future::{AbortHandle, Abortable};
use gloo_timers::callback::Timeout;
use wasm_bindgen::prelude::*;
use web_sys::{CloseEvent, ErrorEvent, MessageEvent, WebSocket};

use crate::error::WsError;
use crate::shared::Symbol;
use crate::stream::{
    hydrate, Action, ConnectionState, Hydration, QuoteStore, StreamMachine,
};
use crate::ws::{Kind, MessageOut, ReadyState, WsConfig, WsEvent};

type EventCallback = Rc<dyn Fn(WsEvent)>;

/// Closures attached to one socket. Kept alive for as long as the socket may call them.
struct Handlers {
    _onopen: Closure<dyn FnMut()>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
    _onerror: Closure<dyn FnMut(ErrorEvent)>,
    _onclose: Closure<dyn FnMut(CloseEvent)>,
}

struct Inner {
    config: WsConfig,
    machine: StreamMachine,
    store: QuoteStore,
    socket: Option<WebSocket>,
    handlers: Option<Handlers>,
    /// Handlers of the previous socket; one of them may still be on the stack.
    retired_handlers: Option<Handlers>,
    reconnect_timer: Option<Timeout>,
    hydration_abort: Option<AbortHandle>,
    on_event: Option<EventCallback>,
}

/// Live quotes for a fixed set of symbols (browser).
///
/// Created by [`TickerStream::start`]; release it with [`TickerStream::stop`].
/// Dropping the handle stops it as well.
pub struct TickerStream {
    inner: Rc<RefCell<Inner>>,
    store: QuoteStore,
}

impl TickerStream {
    /// Start hydration and the streaming connection for `symbols`.
    ///
    /// `on_event`, if given, observes connection events; quotes are delivered
    /// through [`TickerStream::quotes`] regardless.
    pub fn start<I, S>(
        config: WsConfig,
        hydration: Option<Hydration>,
        symbols: I,
        on_event: Option<Box<dyn Fn(WsEvent)>>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let symbols: Vec<Symbol> = symbols.into_iter().map(Into::into).collect();
        let store = QuoteStore::new();

        let hydration_abort = hydration.map(|h| {
            let (abort_handle, abort_reg) = AbortHandle::new_pair();
            let task = hydrate(h, symbols.clone(), store.clone());
            wasm_bindgen_futures::spawn_local(async move {
                let _ = Abortable::new(task, abort_reg).await;
            });
            abort_handle
        });

        let inner = Rc::new(RefCell::new(Inner {
            machine: StreamMachine::new(symbols, config.reconnect.clone()),
            config,
            store: store.clone(),
            socket: None,
            handlers: None,
            retired_handlers: None,
            reconnect_timer: None,
            hydration_abort,
            on_event: on_event.map(Rc::from),
        }));

        let actions = inner.borrow_mut().machine.connect();
        execute(&inner, actions, Vec::new());

        Self { inner, store }
    }

    /// Stop the stream: cancel any pending reconnect, unsubscribe, close.
    /// Calling it again is a no-op.
    pub fn stop(&self) {
        let actions = {
            let mut this = self.inner.borrow_mut();
            if let Some(handle) = this.hydration_abort.take() {
                handle.abort();
            }
            this.machine.teardown()
        };
        if !actions.is_empty() {
            tracing::info!("Stopping ticker stream");
        }
        execute(&self.inner, actions, Vec::new());
    }

    /// The live quote mapping.
    pub fn quotes(&self) -> &QuoteStore {
        &self.store
    }

    pub fn is_connected(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Current connection state, as reported by the socket.
    pub fn ready_state(&self) -> ReadyState {
        self.inner
            .try_borrow()
            .ok()
            .and_then(|this| this.socket.as_ref().map(|w| ReadyState::from(w.ready_state())))
            .unwrap_or(ReadyState::Closed)
    }

    /// Lifecycle state of the stream.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.borrow().machine.state()
    }

    /// Consecutive reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.borrow().machine.reconnect_attempts()
    }
}

impl Drop for TickerStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Action execution ────────────────────────────────────────────────────────

/// Run machine actions, then deliver events with no borrow held so the
/// observer may call back into the stream.
fn execute(inner: &Rc<RefCell<Inner>>, actions: Vec<Action>, mut events: Vec<WsEvent>) {
    let weak = Rc::downgrade(inner);
    let mut queue: VecDeque<Action> = actions.into();

    let on_event = {
        let mut this = inner.borrow_mut();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Connect => {
                    if let Err(e) = this.open_socket(&weak) {
                        tracing::error!("Failed to create WebSocket: {}", e);
                        events.push(WsEvent::Error(e.to_string()));
                        queue.extend(this.machine.on_connect_failed());
                    }
                }
                Action::Send(msg) => this.send(&msg),
                Action::ScheduleReconnect(delay) => {
                    let timer_ref = weak.clone();
                    let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
                    this.reconnect_timer = Some(Timeout::new(millis, move || {
                        on_reconnect_timer(&timer_ref);
                    }));
                }
                Action::CancelReconnect => {
                    this.reconnect_timer.take();
                }
                Action::Close => this.close_socket(),
                Action::GiveUp => events.push(WsEvent::MaxReconnectReached),
            }
        }
        this.on_event.clone()
    };

    if let Some(cb) = on_event {
        for event in events {
            cb(event);
        }
    }
}

fn on_reconnect_timer(weak: &Weak<RefCell<Inner>>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    tracing::info!("Reconnect timeout fired");

    let actions = {
        let mut this = inner.borrow_mut();
        // This closure is still running; leak it rather than drop it mid-call.
        if let Some(fired) = this.reconnect_timer.take() {
            let _ = fired.forget();
        }
        this.machine.connect()
    };
    execute(&inner, actions, Vec::new());
}

impl Inner {
    fn open_socket(&mut self, weak: &Weak<RefCell<Inner>>) -> Result<(), WsError> {
        self.close_socket();

        tracing::info!("Creating WebSocket connection to {}", self.config.url);
        let ws = WebSocket::new(&self.config.url)
            .map_err(|e| WsError::InvalidEndpoint(extract_js_error(&e)))?;

        let onopen = {
            let weak = weak.clone();
            Closure::<dyn FnMut()>::new(move || {
                let Some(inner) = weak.upgrade() else { return };
                tracing::info!("WebSocket opened");
                let actions = inner.borrow_mut().machine.on_open();
                execute(&inner, actions, vec![WsEvent::Connected]);
            })
        };
        ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));

        let onmessage = {
            let weak = weak.clone();
            Closure::<dyn FnMut(_)>::new(move |e: MessageEvent| {
                let Some(inner) = weak.upgrade() else { return };
                let Some(txt) = e.data().as_string() else { return };

                let (kind, store) = {
                    let this = inner.borrow();
                    (this.machine.handle_message(&txt), this.store.clone())
                };
                if let Some(kind) = kind {
                    if let Kind::Trade(payload) = &kind {
                        store.apply_trades(payload.data.clone());
                    }
                    execute(&inner, Vec::new(), vec![WsEvent::Message(kind)]);
                }
            })
        };
        ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

        let onerror = {
            let weak = weak.clone();
            Closure::<dyn FnMut(_)>::new(move |e: ErrorEvent| {
                let Some(inner) = weak.upgrade() else { return };
                let msg = extract_js_error(&e.error());
                tracing::error!("WebSocket error: {:?}", msg);
                // A close event always follows; reconnection is decided there.
                execute(&inner, Vec::new(), vec![WsEvent::Error(msg)]);
            })
        };
        ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        let onclose = {
            let weak = weak.clone();
            Closure::<dyn FnMut(_)>::new(move |e: CloseEvent| {
                let Some(inner) = weak.upgrade() else { return };
                let code = e.code();
                let reason = e.reason();
                tracing::info!("WebSocket closed: code={}, reason={}", code, reason);

                let actions = {
                    let mut this = inner.borrow_mut();
                    this.detach_socket();
                    this.machine.on_close()
                };
                execute(
                    &inner,
                    actions,
                    vec![WsEvent::Disconnected {
                        code: Some(code),
                        reason,
                    }],
                );
            })
        };
        ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));

        self.socket = Some(ws);
        self.handlers = Some(Handlers {
            _onopen: onopen,
            _onmessage: onmessage,
            _onerror: onerror,
            _onclose: onclose,
        });
        Ok(())
    }

    fn send(&self, message: &MessageOut) {
        match self.socket.as_ref() {
            Some(w) if ReadyState::from(w.ready_state()) == ReadyState::Open => {
                if let Err(e) = w.send_with_str(&message.to_string()) {
                    tracing::error!(
                        "Failed to send message ({}): {}",
                        message,
                        extract_js_error(&e)
                    );
                }
            }
            _ => {
                tracing::warn!("Cannot send message ({}) - WebSocket not open", message);
            }
        }
    }

    /// Unhook and forget the current socket without closing it.
    fn detach_socket(&mut self) -> Option<WebSocket> {
        let ws = self.socket.take()?;
        ws.set_onopen(None);
        ws.set_onmessage(None);
        ws.set_onerror(None);
        ws.set_onclose(None);
        self.retired_handlers = self.handlers.take();
        Some(ws)
    }

    fn close_socket(&mut self) {
        if let Some(ws) = self.detach_socket() {
            match ReadyState::from(ws.ready_state()) {
                ReadyState::Connecting | ReadyState::Open => {
                    let _ = ws.close();
                }
                _ => {}
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn extract_js_error(err: &JsValue) -> String {
    if let Some(error) = err.dyn_ref::<js_sys::Error>() {
        let name = error.name().as_string().unwrap_or_else(|| "Error".to_string());
        let message = error.message().as_string().unwrap_or_default();

        if !message.is_empty() {
            return format!("{}: {}", name, message);
        }
        return name;
    }

    if let Some(s) = err.as_string() {
        if !s.is_empty() {
            return s;
        }
    }

    if err.is_undefined() || err.is_null() {
        return "WebSocket error (no details)".to_string();
    }

    "Unknown WebSocket error".to_string()
}
