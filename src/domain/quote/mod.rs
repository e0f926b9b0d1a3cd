//! Quote domain — latest price and percent change per traded symbol.

#[cfg(feature = "http")]
pub mod client;
mod convert;
pub mod state;
pub mod wire;

use crate::shared::Symbol;
use serde::{Deserialize, Serialize};

pub use state::QuoteBook;

/// Latest known state for one traded symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerQuote {
    pub symbol: Symbol,
    pub price: f64,
    /// Signed percent change. Server-supplied after hydration, derived from
    /// consecutive trade prices while streaming.
    pub change_pct: f64,
}

impl TickerQuote {
    pub fn new(symbol: impl Into<Symbol>, price: f64, change_pct: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change_pct,
        }
    }

    /// Percent change, as rendered by the ticker bar.
    pub fn change(&self) -> f64 {
        self.change_pct
    }

    pub fn is_up(&self) -> bool {
        self.change_pct >= 0.0
    }
}
