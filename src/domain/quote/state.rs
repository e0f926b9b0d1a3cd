//! Quote state container — owned by the stream, merged from snapshots and trades.

use super::wire::WsTradeTick;
use super::TickerQuote;
use crate::shared::Symbol;
use indexmap::IndexMap;

/// Latest quote per symbol, in first-seen order.
///
/// Holds at most one entry per symbol. Entries are only inserted or updated;
/// nothing here removes a symbol once seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteBook {
    quotes: IndexMap<Symbol, TickerQuote>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all quotes (e.g. from a REST hydration).
    pub fn replace_all<I>(&mut self, quotes: I)
    where
        I: IntoIterator<Item = TickerQuote>,
    {
        self.quotes.clear();
        for quote in quotes {
            self.quotes.insert(quote.symbol.clone(), quote);
        }
    }

    /// Merge a single trade, deriving the percent change from the stored price.
    ///
    /// The first trade for an unseen symbol, or one following a zero price,
    /// records a change of `0`.
    pub fn apply_trade(&mut self, symbol: Symbol, price: f64) -> &TickerQuote {
        let change_pct = match self.quotes.get(&symbol) {
            Some(prev) if prev.price > 0.0 => (price - prev.price) / prev.price * 100.0,
            _ => 0.0,
        };

        let entry = self
            .quotes
            .entry(symbol.clone())
            .or_insert_with(|| TickerQuote::new(symbol, price, 0.0));
        entry.price = price;
        entry.change_pct = change_pct;
        entry
    }

    /// Merge a batch of trades in arrival order.
    pub fn apply_trades<I>(&mut self, ticks: I)
    where
        I: IntoIterator<Item = WsTradeTick>,
    {
        for tick in ticks {
            self.apply_trade(tick.symbol, tick.price);
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&TickerQuote> {
        self.quotes.get(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TickerQuote> {
        self.quotes.values()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.quotes.keys()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}
