//! Quotes sub-client — snapshot queries.

use crate::client::TickerClient;
use crate::domain::quote::TickerQuote;
use crate::error::{HttpError, SdkError};
use crate::http::{QuoteHttp, RetryPolicy};
use crate::shared::Symbol;

pub struct Quotes<'a> {
    pub(crate) client: &'a TickerClient,
}

impl<'a> Quotes<'a> {
    /// Fetch the current quote for each symbol, using the client's hydration policy.
    pub async fn snapshot(&self, symbols: &[Symbol]) -> Result<Vec<TickerQuote>, SdkError> {
        fetch_snapshot(
            &self.client.http,
            symbols,
            self.client.hydration_retry.clone(),
        )
        .await
    }
}

/// One snapshot request, converted to domain quotes.
///
/// An empty symbol list short-circuits without touching the network. A response
/// whose `success` flag is false is an error.
pub async fn fetch_snapshot(
    http: &QuoteHttp,
    symbols: &[Symbol],
    retry: RetryPolicy,
) -> Result<Vec<TickerQuote>, SdkError> {
    if symbols.is_empty() {
        return Ok(Vec::new());
    }

    let resp = http.get_quotes(symbols, retry).await?;
    if !resp.success {
        return Err(HttpError::Unsuccessful(format!(
            "quote snapshot for {} symbol(s)",
            symbols.len()
        ))
        .into());
    }

    Ok(resp.data.into_iter().map(TickerQuote::from).collect())
}
