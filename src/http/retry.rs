//! Retry policies for the snapshot request.
//!
//! Hydration happens once per stream start, so by default it is attempted a
//! single time; callers that prefer a slower but more reliable start can opt in.

use std::time::Duration;

use crate::error::HttpError;

/// How persistently to retry a failed request.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// Single attempt.
    #[default]
    None,
    /// [`RetryConfig::idempotent`]: transport failures, 429 and 502/503/504.
    Idempotent,
    Custom(RetryConfig),
}

impl RetryPolicy {
    /// Resolved configuration, `None` for a single attempt.
    pub fn config(&self) -> Option<RetryConfig> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Idempotent => Some(RetryConfig::idempotent()),
            RetryPolicy::Custom(c) => Some(c.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub first_delay: Duration,
    pub delay_ceiling: Duration,
    /// Growth per retry; 2.0 doubles.
    pub growth: f64,
    /// Spread each delay by up to ±25%.
    pub jitter: bool,
    /// Statuses worth another try. Transport failures always are.
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::idempotent()
    }
}

impl RetryConfig {
    pub fn idempotent() -> Self {
        Self {
            max_retries: 3,
            first_delay: Duration::from_millis(250),
            delay_ceiling: Duration::from_secs(8),
            growth: 2.0,
            jitter: true,
            retry_statuses: vec![429, 502, 503, 504],
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Wait before retry number `retry` (0-indexed).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let ceiling_ms = self.delay_ceiling.as_millis() as f64;
        let ms = (self.first_delay.as_millis() as f64 * self.growth.powi(exp)).min(ceiling_ms);

        let ms = if self.jitter {
            ms * (0.75 + rand::random::<f64>() * 0.5)
        } else {
            ms
        };
        Duration::from_millis(ms.max(0.0) as u64)
    }

    pub(crate) fn should_retry(&self, err: &HttpError) -> bool {
        match err {
            HttpError::ServerError { status, .. } => self.retry_statuses.contains(status),
            HttpError::RateLimited { .. } => self.retry_statuses.contains(&429),
            #[cfg(not(target_arch = "wasm32"))]
            HttpError::Reqwest(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            #[cfg(target_arch = "wasm32")]
            HttpError::Reqwest(e) => e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}
