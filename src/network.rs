//! Network URL constants and endpoint derivation.

use crate::error::WsError;

/// Default REST API base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Path of the quote snapshot endpoint, relative to the API base.
pub const QUOTES_PATH: &str = "/api/v1/market/quotes";

/// Path of the streaming endpoint, relative to the API base.
pub const STREAM_PATH: &str = "/api/v1/market/ws";

/// Symbols shown in the ticker bar when the application does not choose its own.
pub const DEFAULT_SYMBOLS: [&str; 8] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "NVDA", "META", "JPM",
];

/// Derive the streaming URL from an API base URL.
///
/// Swaps the scheme (`http` → `ws`, `https` → `wss`) and points at [`STREAM_PATH`].
/// Any other scheme is rejected.
pub fn derive_ws_url(api_base: &str) -> Result<String, WsError> {
    let base = api_base.trim().trim_end_matches('/');

    let (scheme, rest) = base
        .split_once("://")
        .ok_or_else(|| WsError::InvalidEndpoint(format!("missing scheme: {api_base}")))?;

    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(WsError::InvalidEndpoint(format!(
                "unsupported scheme `{other}` in {api_base}"
            )))
        }
    };

    if rest.is_empty() {
        return Err(WsError::InvalidEndpoint(format!("missing host: {api_base}")));
    }

    Ok(format!("{ws_scheme}://{rest}{STREAM_PATH}"))
}
