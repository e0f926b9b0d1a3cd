//! Connection lifecycle state machine, free of I/O.
//!
//! Transports feed it socket events and execute the [`Action`]s it returns.
//! Keeping the retry counter and the pending-reconnect state here means the
//! native and WASM transports share one set of rules.

use std::time::Duration;

use crate::shared::Symbol;
use crate::ws::{parse_message, Kind, MessageOut, ReadyState};

/// Reconnect attempts allowed after consecutive closes before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay before the first reconnect attempt.
pub const BASE_RECONNECT_DELAY: Duration = Duration::from_millis(2_000);

/// Upper bound on any reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(60_000);

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Exponential backoff without jitter: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: BASE_RECONNECT_DELAY,
            max_delay: MAX_RECONNECT_DELAY,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let base_ms = self.base_delay.as_millis() as u64;
        let delay_ms = base_ms
            .saturating_mul(factor)
            .min(self.max_delay.as_millis() as u64);
        Duration::from_millis(delay_ms)
    }
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, nothing attempted yet.
    Idle,
    Connecting,
    Open,
    /// Closed, reconnect timer pending. `attempt` is 1-based.
    Reconnecting { attempt: u32, delay: Duration },
    /// Retry ceiling reached. Terminal.
    Exhausted,
    /// Torn down by the owner. Terminal.
    Stopped,
}

impl ConnectionState {
    pub fn ready_state(&self) -> ReadyState {
        match self {
            ConnectionState::Connecting => ReadyState::Connecting,
            ConnectionState::Open => ReadyState::Open,
            _ => ReadyState::Closed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Exhausted | ConnectionState::Stopped)
    }
}

/// Side effects requested from the transport, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open a new socket.
    Connect,
    Send(MessageOut),
    /// Arm the reconnect timer; when it fires, call [`StreamMachine::connect`].
    ScheduleReconnect(Duration),
    /// Disarm the reconnect timer if armed.
    CancelReconnect,
    /// Close the current socket.
    Close,
    /// Retries are exhausted.
    GiveUp,
}

// ─── Machine ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StreamMachine {
    symbols: Vec<Symbol>,
    policy: ReconnectPolicy,
    state: ConnectionState,
    reconnect_attempts: u32,
}

impl StreamMachine {
    pub fn new(symbols: Vec<Symbol>, policy: ReconnectPolicy) -> Self {
        Self {
            symbols,
            policy,
            state: ConnectionState::Idle,
            reconnect_attempts: 0,
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Request a connection. No-op while connecting, open, or terminal.
    pub fn connect(&mut self) -> Vec<Action> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                tracing::debug!("Already connected or connecting, skipping");
                Vec::new()
            }
            ConnectionState::Exhausted | ConnectionState::Stopped => Vec::new(),
            ConnectionState::Reconnecting { .. } => {
                self.state = ConnectionState::Connecting;
                vec![Action::CancelReconnect, Action::Connect]
            }
            ConnectionState::Idle => {
                self.state = ConnectionState::Connecting;
                vec![Action::Connect]
            }
        }
    }

    /// The socket opened: reset the retry counter and subscribe every symbol,
    /// in the order supplied.
    pub fn on_open(&mut self) -> Vec<Action> {
        match self.state {
            ConnectionState::Connecting => {
                tracing::info!(
                    "Stream opened, subscribing to {} symbol(s)",
                    self.symbols.len()
                );
                self.state = ConnectionState::Open;
                self.reconnect_attempts = 0;
                self.symbols
                    .iter()
                    .cloned()
                    .map(|symbol| Action::Send(MessageOut::Subscribe { symbol }))
                    .collect()
            }
            ConnectionState::Stopped => vec![Action::Close],
            _ => Vec::new(),
        }
    }

    /// The socket closed, for any reason.
    ///
    /// Only a close of the live socket counts; a second close for the same
    /// failure (or one after teardown) changes nothing.
    pub fn on_close(&mut self) -> Vec<Action> {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return Vec::new();
        }

        if self.reconnect_attempts < self.policy.max_attempts {
            let delay = self.policy.delay_for_attempt(self.reconnect_attempts);
            self.reconnect_attempts += 1;
            self.state = ConnectionState::Reconnecting {
                attempt: self.reconnect_attempts,
                delay,
            };
            tracing::info!(
                "Reconnect attempt {}/{} in {}ms",
                self.reconnect_attempts,
                self.policy.max_attempts,
                delay.as_millis()
            );
            vec![Action::ScheduleReconnect(delay)]
        } else {
            tracing::warn!(
                "Max reconnection attempts ({}) reached, quotes will no longer update",
                self.policy.max_attempts
            );
            self.state = ConnectionState::Exhausted;
            vec![Action::GiveUp]
        }
    }

    /// The socket could not even be constructed (e.g. invalid endpoint).
    pub fn on_connect_failed(&mut self) -> Vec<Action> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        self.reconnect_attempts = self.policy.max_attempts;
        self.state = ConnectionState::Exhausted;
        vec![Action::GiveUp]
    }

    /// Parse an inbound frame. Returns `None` for malformed frames and for
    /// anything received after teardown.
    pub fn handle_message(&self, text: &str) -> Option<Kind> {
        if self.state == ConnectionState::Stopped {
            return None;
        }
        match parse_message(text) {
            Ok(kind) => Some(kind),
            Err(e) => {
                tracing::debug!("Dropping malformed stream message: {} (raw: {})", e, text);
                None
            }
        }
    }

    /// Tear down: cancel any pending reconnect, pin the counter at the ceiling,
    /// unsubscribe if open, close. Idempotent.
    pub fn teardown(&mut self) -> Vec<Action> {
        let previous = self.state;
        if previous == ConnectionState::Stopped {
            return Vec::new();
        }

        self.state = ConnectionState::Stopped;
        self.reconnect_attempts = self.policy.max_attempts;

        let mut actions = Vec::new();
        match previous {
            ConnectionState::Reconnecting { .. } => actions.push(Action::CancelReconnect),
            ConnectionState::Open => {
                actions.extend(
                    self.symbols
                        .iter()
                        .cloned()
                        .map(|symbol| Action::Send(MessageOut::Unsubscribe { symbol })),
                );
                actions.push(Action::Close);
            }
            ConnectionState::Connecting => actions.push(Action::Close),
            _ => {}
        }
        actions
    }
}
