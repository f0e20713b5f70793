//! Resilience policies wrapped around every upstream call.
//!
//! The circuit breaker guards a whole logical call; the retry policy runs
//! inside it. An open breaker therefore rejects a call before any attempt or
//! backoff happens.

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerPermit, BreakerSettings, CircuitBreaker, CircuitState};
pub use retry::{RetryAttempt, RetryError, RetryPolicy};
