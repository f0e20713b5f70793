//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - A TTL cache, retry policy and circuit breaker
//! - The transport abstraction and the reqwest-backed executor
//! - The [`WeatherGateway`]: city search, daily and hourly forecasts
//! - Shared domain models and configuration
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod provider;
pub mod resilience;

pub use cache::TtlCache;
pub use config::Config;
pub use error::{GatewayError, UpstreamFailure};
pub use gateway::{GatewayCaches, WeatherGateway};
pub use model::{City, DailyForecast, HourlyForecast, WeatherCondition};
pub use provider::{Endpoint, HttpTransport, RemoteExecutor, RemoteRequest, Transport};
pub use resilience::{BreakerSettings, CircuitBreaker, CircuitState, RetryPolicy};
