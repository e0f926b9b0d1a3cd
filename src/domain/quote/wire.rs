//! Wire types for quote responses (REST + WS).

use crate::shared::Symbol;
use serde::{Deserialize, Serialize};

/// One entry of the quote snapshot response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuoteSnapshot {
    pub ticker: Symbol,
    pub price: f64,
    #[serde(default)]
    pub price_change_pct: Option<f64>,
}

/// REST response for `GET /api/v1/market/quotes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotesResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<QuoteSnapshot>,
}

fn default_success() -> bool {
    true
}

/// WS trade record: `{ "s": "<SYMBOL>", "p": <price> }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsTradeTick {
    #[serde(rename = "s")]
    pub symbol: Symbol,
    #[serde(rename = "p")]
    pub price: f64,
}
