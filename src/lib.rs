//! # ticker-stream
//!
//! Live ticker quotes for a fixed set of symbols, on native and WASM targets.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! 1. **Core** — Symbols, quote types, the quote book, endpoint constants (always available, WASM-safe)
//! 2. **HTTP API** — `QuoteHttp` snapshot requests with retry policies
//! 3. **Stream core** — Sans-IO lifecycle machine, observable `QuoteStore`, hydration
//! 4. **WebSocket** — Compile-time dispatch: `tokio-tungstenite` (native) / `web-sys` (WASM)
//! 5. **High-Level Client** — `TickerClient` builder, snapshot sub-client, stream constructors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ticker_stream::prelude::*;
//!
//! let client = TickerClient::builder()
//!     .base_url("https://markets.example.com")
//!     .build()?;
//!
//! let mut stream = client.stream(DEFAULT_SYMBOLS);
//! stream.quotes().subscribe(|book| {
//!     for q in book.iter() {
//!         println!("{} {:.2} ({:+.2}%)", q.symbol, q.price, q.change_pct);
//!     }
//! });
//!
//! // ... later
//! stream.stop().await;
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes.
pub mod shared;

/// Domain modules (vertical slices): types, wire types, conversions, state.
pub mod domain;

/// Unified error types.
pub mod error;

/// Endpoint constants and URL derivation.
pub mod network;

// ── Layer 2: HTTP API ────────────────────────────────────────────────────────

/// HTTP client with retry policies.
#[cfg(feature = "http")]
pub mod http;

// ── Layer 3: Stream core ─────────────────────────────────────────────────────

/// Connection lifecycle, quote store, hydration.
pub mod stream;

// ── Layer 4: WebSocket ───────────────────────────────────────────────────────

/// WebSocket transports: messages, events, native and WASM drivers.
pub mod ws;

// ── Layer 5: High-Level Client ───────────────────────────────────────────────

/// `TickerClient` — the primary entry point.
#[cfg(feature = "http")]
pub mod client;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::Symbol;

    // Domain types
    pub use crate::domain::quote::{QuoteBook, TickerQuote};

    // Errors
    pub use crate::error::{HttpError, SdkError, WsError};

    // Network
    pub use crate::network::{derive_ws_url, DEFAULT_API_URL, DEFAULT_SYMBOLS};

    // Stream core
    pub use crate::stream::{ConnectionState, ListenerId, QuoteStore, ReconnectPolicy};

    // HTTP client + sub-clients
    #[cfg(feature = "http")]
    pub use crate::client::{QuotesClient, TickerClient, TickerClientBuilder};
    #[cfg(feature = "http")]
    pub use crate::http::retry::{RetryConfig, RetryPolicy};
    #[cfg(feature = "http")]
    pub use crate::stream::Hydration;

    // WebSocket types
    pub use crate::ws::{Kind, MessageOut, ReadyState, WsConfig, WsEvent};

    #[cfg(feature = "ws-native")]
    pub use crate::ws::native::TickerStream;
    #[cfg(all(feature = "ws-wasm", not(feature = "ws-native")))]
    pub use crate::ws::wasm::TickerStream;
}
