//! High-level client — `TickerClient` with sub-client accessors and stream constructors.
//!
//! Snapshot queries live in `domain/quote/client.rs`; this module keeps the
//! builder, endpoint configuration, and the entry points for live streams.

use std::time::Duration;

use crate::domain::quote::client::Quotes;
use crate::error::SdkError;
use crate::http::{QuoteHttp, RetryPolicy};
use crate::network::{derive_ws_url, DEFAULT_API_URL};
use crate::stream::{Hydration, ReconnectPolicy};
use crate::ws::WsConfig;

pub use crate::domain::quote::client::Quotes as QuotesClient;

/// Environment variable overriding the REST API base URL.
pub const ENV_API_URL: &str = "TICKER_API_URL";
/// Environment variable overriding the streaming URL.
pub const ENV_WS_URL: &str = "TICKER_WS_URL";

/// The primary entry point: snapshot queries and live ticker streams.
#[derive(Clone)]
pub struct TickerClient {
    pub(crate) http: QuoteHttp,
    pub(crate) ws_config: WsConfig,
    pub(crate) hydration_retry: RetryPolicy,
}

impl TickerClient {
    pub fn builder() -> TickerClientBuilder {
        TickerClientBuilder::default()
    }

    pub fn quotes(&self) -> Quotes<'_> {
        Quotes { client: self }
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Streaming endpoint and reconnect policy used by new streams.
    ///
    /// Streams are not embedded in the client; their lifetime is usually tied
    /// to whatever displays the quotes.
    pub fn ws_config(&self) -> &WsConfig {
        &self.ws_config
    }

    /// Snapshot source handed to new streams.
    pub fn hydration(&self) -> Hydration {
        Hydration {
            http: self.http.clone(),
            retry: self.hydration_retry.clone(),
        }
    }

    /// Start a native stream for `symbols`: hydrate once, then stream trades.
    #[cfg(feature = "ws-native")]
    pub fn stream<I, S>(&self, symbols: I) -> crate::ws::native::TickerStream
    where
        I: IntoIterator<Item = S>,
        S: Into<crate::shared::Symbol>,
    {
        crate::ws::native::TickerStream::start(
            self.ws_config.clone(),
            Some(self.hydration()),
            symbols,
        )
    }

    /// Start a browser stream for `symbols`, with an optional event observer.
    #[cfg(feature = "ws-wasm")]
    pub fn stream_wasm<I, S>(
        &self,
        symbols: I,
        on_event: Option<Box<dyn Fn(crate::ws::WsEvent)>>,
    ) -> crate::ws::wasm::TickerStream
    where
        I: IntoIterator<Item = S>,
        S: Into<crate::shared::Symbol>,
    {
        crate::ws::wasm::TickerStream::start(
            self.ws_config.clone(),
            Some(self.hydration()),
            symbols,
            on_event,
        )
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Builder
// ═════════════════════════════════════════════════════════════════════════════

pub struct TickerClientBuilder {
    base_url: String,
    ws_url: Option<String>,
    reconnect: ReconnectPolicy,
    hydration_retry: RetryPolicy,
}

impl Default for TickerClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            ws_url: None,
            reconnect: ReconnectPolicy::default(),
            hydration_retry: RetryPolicy::None,
        }
    }
}

impl TickerClientBuilder {
    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Use an explicit streaming URL instead of deriving it from the base URL.
    pub fn ws_url(mut self, url: &str) -> Self {
        self.ws_url = Some(url.to_string());
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Shorthand for a reconnect policy with a different base delay.
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect.base_delay = delay;
        self
    }

    /// Retry policy for the snapshot request. Defaults to a single attempt.
    pub fn hydration_retry(mut self, policy: RetryPolicy) -> Self {
        self.hydration_retry = policy;
        self
    }

    /// Apply `TICKER_API_URL` / `TICKER_WS_URL` when set and non-empty.
    pub fn from_env(mut self) -> Self {
        if let Some(url) = env_non_empty(ENV_API_URL) {
            self.base_url = url;
        }
        if let Some(url) = env_non_empty(ENV_WS_URL) {
            self.ws_url = Some(url);
        }
        self
    }

    pub fn build(self) -> Result<TickerClient, SdkError> {
        if self.base_url.trim().is_empty() {
            return Err(SdkError::Validation("base_url must not be empty".into()));
        }
        let http = QuoteHttp::new(&self.base_url)?;

        let url = match self.ws_url {
            Some(url) => url,
            None => derive_ws_url(&self.base_url).unwrap_or_else(|e| {
                // Streams built from this config fail to connect and go quiet.
                tracing::warn!("No streaming endpoint for {}: {}", self.base_url, e);
                String::new()
            }),
        };

        Ok(TickerClient {
            http,
            ws_config: WsConfig {
                url,
                reconnect: self.reconnect,
            },
            hydration_retry: self.hydration_retry,
        })
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
