use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{GatewayError, UpstreamFailure};

use super::{RemoteRequest, Transport};

const USER_AGENT: &str = concat!("weather-core/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// `timeout` bounds each attempt, including reading the body.
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &RemoteRequest) -> Result<String, UpstreamFailure> {
        let res = self
            .http
            .get(&request.url)
            .query(&request.params)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| classify_transport_error(&e))?;

        if status.is_success() {
            return Ok(body);
        }

        Err(classify_status(status, &body))
    }
}

/// Error body the provider sends alongside 4xx responses.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    reason: String,
}

/// 5xx and 408 are transient; any other non-success status is a rejection.
pub fn classify_status(status: StatusCode, body: &str) -> UpstreamFailure {
    let reason = serde_json::from_str::<ProviderErrorBody>(body)
        .map(|e| e.reason)
        .unwrap_or_else(|_| truncate_body(body));

    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        UpstreamFailure::Transient { status: Some(status.as_u16()), reason }
    } else {
        UpstreamFailure::Rejected { status: status.as_u16(), reason }
    }
}

fn classify_transport_error(error: &reqwest::Error) -> UpstreamFailure {
    if error.is_builder() {
        return UpstreamFailure::InvalidRequest { reason: error.to_string() };
    }
    if error.is_decode() {
        return UpstreamFailure::Corrupt { reason: error.to_string() };
    }
    // Timeouts, refused/reset connections and interrupted bodies.
    UpstreamFailure::Transient { status: error.status().map(|s| s.as_u16()), reason: error.to_string() }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
