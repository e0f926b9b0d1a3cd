//! HTTP client layer — `QuoteHttp` with per-request retry policies.

pub mod client;
pub mod retry;

pub use client::QuoteHttp;
pub use retry::{RetryConfig, RetryPolicy};
