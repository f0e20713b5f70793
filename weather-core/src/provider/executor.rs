//! Runs requests against one endpoint through the breaker and retry policy.

use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Duration};

use crate::{
    error::{GatewayError, UpstreamFailure},
    resilience::{CircuitBreaker, RetryError, RetryPolicy},
};

use super::{Endpoint, RemoteRequest, Transport};

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RemoteExecutor {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    attempt_timeout: Duration,
}

impl RemoteExecutor {
    pub fn new(
        endpoint: Endpoint,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            endpoint,
            transport,
            retry,
            breaker,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Execute `request` and decode the body as `T`.
    ///
    /// A body that does not decode is a fatal failure: it ends the call
    /// without retrying.
    pub async fn execute<T: DeserializeOwned>(&self, request: &RemoteRequest) -> Result<T, GatewayError> {
        let Some(permit) = self.breaker.try_acquire() else {
            tracing::debug!(endpoint = %self.endpoint, "Circuit open, rejecting call");
            return Err(GatewayError::CircuitOpen {
                endpoint: self.endpoint,
                request: request.summary(),
            });
        };

        let outcome = self
            .retry
            .run(|attempt| {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    attempt = attempt.index,
                    probe = permit.is_probe(),
                    "Calling upstream"
                );
                self.attempt(request)
            })
            .await;

        match outcome {
            Ok(value) => {
                permit.record_success();
                Ok(value)
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                permit.record_failure();
                Err(GatewayError::UpstreamUnavailable {
                    endpoint: self.endpoint,
                    request: request.summary(),
                    attempts,
                    status: last.status(),
                    reason: last.to_string(),
                })
            }
            Err(RetryError::Fatal { failure, .. }) => {
                permit.record_fatal();
                Err(GatewayError::from_fatal(self.endpoint, request.summary(), failure))
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(&self, request: &RemoteRequest) -> Result<T, UpstreamFailure> {
        let body = tokio::time::timeout(self.attempt_timeout, self.transport.fetch(request))
            .await
            .map_err(|_| {
                UpstreamFailure::transient(format!("no response within {:?}", self.attempt_timeout))
            })??;

        serde_json::from_str(&body).map_err(|e| UpstreamFailure::Corrupt { reason: e.to_string() })
    }
}
