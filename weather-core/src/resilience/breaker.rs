//! Circuit breaker shared by every call to one upstream endpoint.
//!
//! Closed -> Open after `failure_threshold` consecutive transient failures.
//! Open rejects calls until `open_duration` has passed, then lets a single
//! probe through (HalfOpen). The probe's outcome closes or re-opens it.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_OPEN_DURATION: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub open_duration: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_duration: DEFAULT_OPEN_DURATION,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Current state. An Open breaker whose cooldown has elapsed reports HalfOpen.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open if self.cooldown_elapsed(&inner, Instant::now()) => {
                CircuitState::HalfOpen
            }
            state => state,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Ask to make a call. `None` means the circuit is open and the call must
    /// not reach the network.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let state = inner.state;
        let probe = match state {
            CircuitState::Closed => false,
            CircuitState::Open if self.cooldown_elapsed(&inner, now) => {
                inner.state = CircuitState::HalfOpen;
                tracing::info!(breaker = %self.name, "Circuit half-open, sending probe");
                true
            }
            CircuitState::Open => return None,
            CircuitState::HalfOpen if inner.probe_in_flight => return None,
            CircuitState::HalfOpen => true,
        };

        if probe {
            inner.probe_in_flight = true;
        }
        Some(BreakerPermit { breaker: self, probe, settled: false })
    }

    fn cooldown_elapsed(&self, inner: &BreakerInner, now: Instant) -> bool {
        inner
            .opened_at
            .is_some_and(|opened| now.saturating_duration_since(opened) >= self.settings.open_duration)
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.inner.lock();
        match (inner.state, probe) {
            (CircuitState::HalfOpen, true) => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
                tracing::info!(breaker = %self.name, "Circuit closed after successful probe");
            }
            (CircuitState::Closed, _) => inner.consecutive_failures = 0,
            // A call admitted before the circuit opened does not close it.
            _ => {}
        }
    }

    fn on_failure(&self, probe: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match (inner.state, probe) {
            (CircuitState::HalfOpen, true) => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.probe_in_flight = false;
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                tracing::warn!(breaker = %self.name, "Probe failed, circuit re-opened");
            }
            (CircuitState::Closed, _) => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.settings.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        cooldown = ?self.settings.open_duration,
                        "Circuit opened"
                    );
                }
            }
            _ => {}
        }
    }

    fn on_abandoned(&self, probe: bool) {
        if probe {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.probe_in_flight = false;
            }
        }
    }
}

/// Admission to make one call through the breaker.
///
/// Record the outcome with one of the consuming methods. A permit dropped
/// without an outcome (the caller went away) frees the probe slot and
/// changes nothing else.
#[derive(Debug)]
#[must_use = "record the call outcome on the permit"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }

    /// The upstream answered but the call failed for a non-transient reason.
    /// Does not touch the failure count; a probe still proves the upstream is back.
    pub fn record_fatal(mut self) {
        self.settled = true;
        if self.probe {
            self.breaker.on_success(true);
        }
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandoned(self.probe);
        }
    }
}
