//! Ticker stream core — lifecycle state machine, quote store, hydration.
//!
//! The transports in [`crate::ws`] wire these to real sockets.

pub mod machine;
pub mod store;

pub use machine::{Action, ConnectionState, ReconnectPolicy, StreamMachine};
pub use store::{ListenerId, QuoteStore};

#[cfg(feature = "http")]
use crate::http::{QuoteHttp, RetryPolicy};
#[cfg(feature = "http")]
use crate::shared::Symbol;

/// Where and how to fetch the initial quote snapshot.
#[cfg(feature = "http")]
#[derive(Clone)]
pub struct Hydration {
    pub http: QuoteHttp,
    pub retry: RetryPolicy,
}

/// Fetch the snapshot once and replace the store's contents with it.
///
/// Failures are logged and otherwise ignored: the store keeps whatever it
/// had, and the stream carries on.
#[cfg(feature = "http")]
pub async fn hydrate(hydration: Hydration, symbols: Vec<Symbol>, store: QuoteStore) {
    match crate::domain::quote::client::fetch_snapshot(
        &hydration.http,
        &symbols,
        hydration.retry,
    )
    .await
    {
        Ok(quotes) => {
            tracing::info!(
                "Hydrated {} quote(s) for {} symbol(s)",
                quotes.len(),
                symbols.len()
            );
            store.replace_all(quotes);
        }
        Err(e) => {
            tracing::warn!("Quote hydration failed: {}", e);
        }
    }
}
