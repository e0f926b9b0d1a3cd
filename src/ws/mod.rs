//! WebSocket layer — messages, events, config.
//!
//! The actual WS transport is compile-time dispatched:
//! - `ws-native` feature → `tokio-tungstenite` (native.rs)
//! - `ws-wasm` feature → `web-sys::WebSocket` (wasm.rs)
//!
//! Both export a `TickerStream` handle with `start`/`stop` and the same
//! inspection methods. This module defines the shared message/event types.

#[cfg(feature = "ws-native")]
pub mod native;

#[cfg(feature = "ws-wasm")]
pub mod wasm;

use crate::domain::quote::wire::WsTradeTick;
use crate::error::WsError;
use crate::shared::Symbol;
use crate::stream::machine::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Outbound messages ───────────────────────────────────────────────────────

/// Messages sent from client to server. Each one names exactly one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageOut {
    Subscribe { symbol: Symbol },
    Unsubscribe { symbol: Symbol },
}

impl MessageOut {
    pub fn subscribe(symbol: impl Into<Symbol>) -> Self {
        MessageOut::Subscribe {
            symbol: symbol.into(),
        }
    }

    pub fn unsubscribe(symbol: impl Into<Symbol>) -> Self {
        MessageOut::Unsubscribe {
            symbol: symbol.into(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        match self {
            MessageOut::Subscribe { symbol } | MessageOut::Unsubscribe { symbol } => symbol,
        }
    }
}

impl fmt::Display for MessageOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

// ─── Inbound messages ────────────────────────────────────────────────────────

/// The type of inbound WebSocket message.
///
/// Only `trade` carries data; every other `type` lands in `Unknown`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Kind {
    #[serde(rename = "trade")]
    Trade(TradePayload),
    #[serde(other)]
    Unknown,
}

/// A batch of trade records.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradePayload {
    #[serde(default)]
    pub data: Vec<WsTradeTick>,
}

/// Parse one inbound text frame.
pub fn parse_message(text: &str) -> Result<Kind, WsError> {
    serde_json::from_str::<Kind>(text).map_err(|e| WsError::DeserializationError(e.to_string()))
}

// ─── WsEvent ─────────────────────────────────────────────────────────────────

/// High-level events emitted by the stream to an optional observer.
///
/// Purely informational: the quote store is updated whether or not anyone
/// listens, and none of these require a reaction.
#[derive(Debug, Clone)]
pub enum WsEvent {
    /// A parsed message from the server.
    Message(Kind),
    /// Connection established.
    Connected,
    /// Connection lost (may trigger reconnect).
    Disconnected { code: Option<u16>, reason: String },
    /// A connection or protocol error.
    Error(String),
    /// Retry ceiling reached; quotes stay at their last values.
    MaxReconnectReached,
}

// ─── ReadyState ──────────────────────────────────────────────────────────────

/// Socket ready state, numbered like the browser's `WebSocket.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u16> for ReadyState {
    fn from(value: u16) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// Configuration for the WS transport.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Streaming endpoint. Empty when it could not be derived, in which case
    /// every connection attempt fails to construct.
    pub url: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: crate::network::derive_ws_url(crate::network::DEFAULT_API_URL)
                .unwrap_or_default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_wire_format() {
        let json = MessageOut::subscribe("AAPL").to_string();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, serde_json::json!({"type": "subscribe", "symbol": "AAPL"}));
    }

    #[test]
    fn test_unsubscribe_wire_format() {
        let json = serde_json::to_value(MessageOut::unsubscribe("^GSPC")).unwrap();
        assert_eq!(json["type"], "unsubscribe");
        assert_eq!(json["symbol"], "^GSPC");
    }

    #[test]
    fn test_parse_trade_batch() {
        let kind = parse_message(
            r#"{"type":"trade","data":[{"s":"AAPL","p":191.5,"t":1700000000000,"v":10},{"s":"MSFT","p":410}]}"#,
        )
        .unwrap();
        match kind {
            Kind::Trade(payload) => {
                assert_eq!(payload.data.len(), 2);
                assert_eq!(payload.data[0].symbol.as_str(), "AAPL");
                assert_eq!(payload.data[1].price, 410.0);
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_trade_without_data_is_empty_batch() {
        let kind = parse_message(r#"{"type":"trade"}"#).unwrap();
        assert_eq!(kind, Kind::Trade(TradePayload { data: vec![] }));
    }

    #[test]
    fn test_parse_unknown_type() {
        assert_eq!(parse_message(r#"{"type":"ping"}"#).unwrap(), Kind::Unknown);
        assert_eq!(
            parse_message(r#"{"type":"news","data":{"headline":"x"}}"#).unwrap(),
            Kind::Unknown
        );
    }

    #[test]
    fn test_parse_malformed() {
        for raw in [
            "not json",
            "[1,2,3]",
            r#"{"data":[]}"#,
            r#"{"type":"trade","data":[{"s":"AAPL","p":"high"}]}"#,
            r#"{"type":"trade","data":{"s":"AAPL","p":1}}"#,
        ] {
            assert!(
                matches!(parse_message(raw), Err(WsError::DeserializationError(_))),
                "expected error for {raw}"
            );
        }
    }

    #[test]
    fn test_ready_state_from_u16() {
        assert_eq!(ReadyState::from(0), ReadyState::Connecting);
        assert_eq!(ReadyState::from(1), ReadyState::Open);
        assert_eq!(ReadyState::from(2), ReadyState::Closing);
        assert_eq!(ReadyState::from(3), ReadyState::Closed);
        assert_eq!(ReadyState::from(42), ReadyState::Closed);
    }

    #[test]
    fn test_default_ws_config_points_at_local_stream() {
        let config = WsConfig::default();
        assert_eq!(config.url, "ws://localhost:8000/api/v1/market/ws");
        assert_eq!(config.reconnect.max_attempts, 5);
    }
}
