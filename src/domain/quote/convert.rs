//! Conversions from wire types to domain types for quotes.

use super::wire::QuoteSnapshot;
use super::TickerQuote;

impl From<QuoteSnapshot> for TickerQuote {
    fn from(q: QuoteSnapshot) -> Self {
        Self {
            symbol: q.ticker,
            price: q.price,
            change_pct: q.price_change_pct.unwrap_or(0.0),
        }
    }
}
