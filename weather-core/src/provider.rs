use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::UpstreamFailure;

pub mod executor;
pub mod http;
pub mod open_meteo;

pub use executor::RemoteExecutor;
pub use http::HttpTransport;

/// Logical upstream endpoints. Each one gets its own circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Geocoding,
    Forecast,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Geocoding => "geocoding",
            Endpoint::Forecast => "forecast",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully formed GET request: target URL plus query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    pub url: String,
    pub params: Vec<(&'static str, String)>,
}

impl RemoteRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), params: Vec::new() }
    }

    pub fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    /// Short description of what was asked for, used in errors and logs.
    pub fn summary(&self) -> String {
        const KEYS: &[&str] = &["name", "latitude", "longitude"];

        self.params
            .iter()
            .filter(|(k, _)| KEYS.contains(k))
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Performs one attempt of a request and classifies its failure.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Returns the response body on a 2xx status.
    async fn fetch(&self, request: &RemoteRequest) -> Result<String, UpstreamFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_names_match_breaker_labels() {
        assert_eq!(Endpoint::Geocoding.to_string(), "geocoding");
        assert_eq!(Endpoint::Forecast.as_str(), "forecast");
    }

    #[test]
    fn summary_keeps_only_identifying_params() {
        let request = RemoteRequest::new("http://localhost/v1/forecast")
            .param("latitude", "51.5074")
            .param("longitude", "-0.1278")
            .param("timezone", "auto");

        assert_eq!(request.summary(), "latitude=51.5074 longitude=-0.1278");
        assert_eq!(request.params.len(), 3);
    }
}
