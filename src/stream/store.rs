//! Observable quote store shared between a stream and its consumers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::domain::quote::wire::WsTradeTick;
use crate::domain::quote::{QuoteBook, TickerQuote};

/// Callback invoked with the full book after every change.
pub type Listener = Arc<dyn Fn(&QuoteBook) + Send + Sync>;

/// Handle returned by [`QuoteStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Live mapping from symbol to latest quote.
///
/// Cheap to clone; every clone sees the same book. Consumers read and
/// subscribe, only the stream writes.
#[derive(Clone, Default)]
pub struct QuoteStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    book: RwLock<QuoteBook>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    version: AtomicU64,
}

impl QuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current book.
    pub fn snapshot(&self) -> QuoteBook {
        self.inner.book.read().clone()
    }

    pub fn get(&self, symbol: &str) -> Option<TickerQuote> {
        self.inner.book.read().get(symbol).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.book.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.book.read().is_empty()
    }

    /// Incremented on every published change.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// Register a listener, called after every change with the new book.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&QuoteBook) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    // ── Writes (stream side) ─────────────────────────────────────────────

    pub(crate) fn replace_all(&self, quotes: Vec<TickerQuote>) {
        self.inner.book.write().replace_all(quotes);
        self.publish();
    }

    pub(crate) fn apply_trades(&self, ticks: Vec<WsTradeTick>) {
        if ticks.is_empty() {
            return;
        }
        self.inner.book.write().apply_trades(ticks);
        self.publish();
    }

    /// Listeners run with no lock held, so they may read the store freely.
    fn publish(&self) {
        self.inner.version.fetch_add(1, Ordering::SeqCst);

        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        if listeners.is_empty() {
            return;
        }

        let snapshot = self.snapshot();
        for listener in listeners {
            listener(&snapshot);
        }
    }
}

impl fmt::Debug for QuoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteStore")
            .field("quotes", &self.len())
            .field("listeners", &self.inner.listeners.lock().len())
            .field("version", &self.version())
            .finish()
    }
}
