//! Error taxonomy for the gateway.
//!
//! [`UpstreamFailure`] is what a single attempt against the provider produces;
//! its classification decides whether the retry policy tries again and whether
//! the circuit breaker counts it. [`GatewayError`] is what callers of the
//! gateway see once those policies have run.

use thiserror::Error;

use crate::provider::Endpoint;

/// Outcome of one failed attempt, classified for the resilience policies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamFailure {
    /// Connection failures, timeouts, HTTP 5xx and HTTP 408.
    #[error("transient upstream failure{}: {reason}", status_suffix(.status))]
    Transient { status: Option<u16>, reason: String },

    /// HTTP 4xx other than 408.
    #[error("upstream rejected request with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    /// The response did not have the expected shape.
    #[error("malformed upstream response: {reason}")]
    Corrupt { reason: String },

    /// The request could not be built (bad URL, bad parameters). Never sent.
    #[error("invalid upstream request: {reason}")]
    InvalidRequest { reason: String },
}

impl UpstreamFailure {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient { status: None, reason: reason.into() }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } => *status,
            Self::Rejected { status, .. } => Some(*status),
            Self::Corrupt { .. } | Self::InvalidRequest { .. } => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// Errors surfaced to callers of [`crate::WeatherGateway`].
///
/// Every variant names the endpoint and the request (query or coordinates)
/// so it can be logged without further context.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{endpoint} unavailable after {attempts} attempt(s) [{request}]: {reason}")]
    UpstreamUnavailable {
        endpoint: Endpoint,
        request: String,
        attempts: u32,
        status: Option<u16>,
        reason: String,
    },

    #[error("{endpoint} unavailable: circuit open, request not sent [{request}]")]
    CircuitOpen { endpoint: Endpoint, request: String },

    #[error("{endpoint} rejected request with status {status} [{request}]: {reason}")]
    UpstreamRejected {
        endpoint: Endpoint,
        request: String,
        status: u16,
        reason: String,
    },

    #[error("{endpoint} returned malformed data [{request}]: {reason}")]
    DataCorrupt {
        endpoint: Endpoint,
        request: String,
        reason: String,
    },

    #[error("{endpoint} request could not be built [{request}]: {reason}")]
    InvalidRequest {
        endpoint: Endpoint,
        request: String,
        reason: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl GatewayError {
    /// Attach endpoint/request context to a fatal attempt failure.
    pub(crate) fn from_fatal(endpoint: Endpoint, request: String, failure: UpstreamFailure) -> Self {
        match failure {
            UpstreamFailure::Rejected { status, reason } => Self::UpstreamRejected {
                endpoint,
                request,
                status,
                reason,
            },
            UpstreamFailure::Corrupt { reason } => Self::DataCorrupt { endpoint, request, reason },
            UpstreamFailure::InvalidRequest { reason } => {
                Self::InvalidRequest { endpoint, request, reason }
            }
            // Only reached if a caller hands over a transient failure; report it as one try.
            UpstreamFailure::Transient { status, reason } => Self::UpstreamUnavailable {
                endpoint,
                request,
                attempts: 1,
                status,
                reason,
            },
        }
    }

    /// True for the kinds that are expected to clear up on their own.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. } | Self::CircuitOpen { .. })
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            Self::UpstreamUnavailable { endpoint, .. }
            | Self::CircuitOpen { endpoint, .. }
            | Self::UpstreamRejected { endpoint, .. }
            | Self::DataCorrupt { endpoint, .. }
            | Self::InvalidRequest { endpoint, .. } => Some(*endpoint),
            Self::Client(_) => None,
        }
    }

    /// A generic message suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable { .. } | Self::CircuitOpen { .. } => {
                "The weather service is temporarily unavailable. Please try again shortly."
            }
            Self::UpstreamRejected { .. } => "The weather service could not handle this request.",
            Self::DataCorrupt { .. } => "The weather service returned data we could not read.",
            Self::InvalidRequest { .. } => "The weather request could not be sent. Check the configured URLs.",
            Self::Client(_) => "Could not start the weather client.",
        }
    }
}
