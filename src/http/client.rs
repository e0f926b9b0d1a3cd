//! Low-level HTTP client — `QuoteHttp`.
//!
//! One method per API endpoint. Returns wire types (conversion to domain types
//! happens in the quote sub-client).

use crate::domain::quote::wire::QuotesResponse;
use crate::error::HttpError;
use crate::http::retry::RetryPolicy;
use crate::network::QUOTES_PATH;
use crate::shared::{join_symbols, Symbol};

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Low-level HTTP client for the market REST API.
#[derive(Clone)]
pub struct QuoteHttp {
    base_url: String,
    client: Client,
}

impl QuoteHttp {
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        #[allow(unused_mut)]
        let mut builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        {
            builder = builder
                .timeout(Duration::from_secs(30))
                .pool_max_idle_per_host(10);
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the quote snapshot endpoint for the given symbols.
    pub fn quotes_url(&self, symbols: &[Symbol]) -> String {
        format!(
            "{}{}?symbols={}",
            self.base_url,
            QUOTES_PATH,
            urlencoding::encode(&join_symbols(symbols))
        )
    }

    // ── Market ───────────────────────────────────────────────────────────

    pub async fn get_quotes(
        &self,
        symbols: &[Symbol],
        retry: RetryPolicy,
    ) -> Result<QuotesResponse, HttpError> {
        let url = self.quotes_url(symbols);
        self.get(&url, retry).await
    }

    // ── Internal HTTP methods ────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        retry: RetryPolicy,
    ) -> Result<T, HttpError> {
        let Some(config) = retry.config() else {
            return self.do_get(url).await;
        };

        let mut retries = 0;
        loop {
            let err = match self.do_get::<T>(url).await {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };

            if !config.should_retry(&err) {
                return Err(err);
            }
            if retries >= config.max_retries {
                return Err(HttpError::MaxRetriesExceeded {
                    attempts: retries + 1,
                    last_error: err.to_string(),
                });
            }

            // A server-supplied Retry-After wins over the computed backoff.
            let delay = match &err {
                HttpError::RateLimited {
                    retry_after_ms: Some(ms),
                } => Duration::from_millis(*ms),
                _ => config.delay_for_attempt(retries),
            };
            retries += 1;
            tracing::debug!(
                retry = retries,
                max = config.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Retrying {} after: {}",
                url,
                err
            );
            futures_timer::Delay::new(delay).await;
        }
    }

    async fn do_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();

        if status.is_success() {
            let parsed = resp.json::<T>().await?;
            return Ok(parsed);
        }

        let status_code = status.as_u16();
        let retry_after_ms = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs * 1000);
        let body_text = resp.text().await.unwrap_or_default();

        match status_code {
            404 => Err(HttpError::NotFound(body_text)),
            429 => Err(HttpError::RateLimited { retry_after_ms }),
            400..=499 => Err(HttpError::BadRequest(body_text)),
            _ => Err(HttpError::ServerError {
                status: status_code,
                body: body_text,
            }),
        }
    }
}
