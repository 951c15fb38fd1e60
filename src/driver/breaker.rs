//! Per-address circuit breaking
//!
//! One breaker per proxy address, shared by every connection to it. A
//! breaker counts call failures inside a rolling window; past the
//! threshold it opens and fails calls without touching the network until
//! the cooldown elapses, then lets a bounded number of trial calls through.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::protocol::{Packet, Request, Response};
use super::transport::{Transport, TransportError};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    /// Circuit is closed - allowing requests
    #[default]
    Closed,
    /// Circuit is open - blocking requests
    Open,
    /// Circuit is half-open - testing with limited requests
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Trial calls allowed while half-open
    pub max_requests: u32,
    /// Rolling window over which closed-state counts accumulate
    pub interval: Duration,
    /// Cooldown before an open breaker goes half-open
    pub timeout: Duration,
    /// Failures within one window that trip the breaker
    pub failure_threshold: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_requests: 10,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            failure_threshold: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests += 1;
    }

    fn on_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        let now = Instant::now();
        let mut state = BreakerState {
            state: CircuitState::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
        };
        state.expiry = closed_expiry(&settings, now);

        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.state_at(Instant::now())
    }

    pub fn counts(&self) -> Counts {
        self.inner.lock().counts
    }

    fn state_at(&self, now: Instant) -> CircuitState {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, now);
        inner.state
    }

    /// Admits a call, returning the generation it belongs to.
    pub fn before_request(&self) -> Result<u64, TransportError> {
        self.before_request_at(Instant::now())
    }

    pub fn after_request(&self, generation: u64, success: bool) {
        self.after_request_at(generation, success, Instant::now())
    }

    fn before_request_at(&self, now: Instant) -> Result<u64, TransportError> {
        let mut inner = self.inner.lock();
        let generation = self.current_state(&mut inner, now);

        match inner.state {
            CircuitState::Open => return Err(TransportError::CircuitOpen),
            CircuitState::HalfOpen if inner.counts.requests >= self.settings.max_requests => {
                return Err(TransportError::TooManyRequests)
            }
            _ => {}
        }

        inner.counts.on_request();
        Ok(generation)
    }

    fn after_request_at(&self, before: u64, success: bool, now: Instant) {
        let mut inner = self.inner.lock();
        let generation = self.current_state(&mut inner, now);
        // Outcomes from an earlier generation no longer count.
        if generation != before {
            return;
        }

        if success {
            inner.counts.on_success();
            if inner.state == CircuitState::HalfOpen
                && inner.counts.consecutive_successes >= self.settings.max_requests
            {
                self.set_state(&mut inner, CircuitState::Closed, now);
            }
        } else {
            inner.counts.on_failure();
            let state = inner.state;
            match state {
                CircuitState::Closed
                    if inner.counts.total_failures >= self.settings.failure_threshold =>
                {
                    self.set_state(&mut inner, CircuitState::Open, now)
                }
                CircuitState::HalfOpen => self.set_state(&mut inner, CircuitState::Open, now),
                _ => {}
            }
        }
    }

    fn current_state(&self, inner: &mut BreakerState, now: Instant) -> u64 {
        let state = inner.state;
        match state {
            CircuitState::Closed => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.new_generation(inner, now);
                }
            }
            CircuitState::Open => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.set_state(inner, CircuitState::HalfOpen, now);
                }
            }
            CircuitState::HalfOpen => {}
        }
        inner.generation
    }

    fn set_state(&self, inner: &mut BreakerState, state: CircuitState, now: Instant) {
        if inner.state == state {
            return;
        }

        let from = inner.state;
        inner.state = state;
        self.new_generation(inner, now);

        info!(name = %self.name, %from, to = %state, "circuit breaker state changed");
    }

    fn new_generation(&self, inner: &mut BreakerState, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed => closed_expiry(&self.settings, now),
            CircuitState::Open => Some(now + self.settings.timeout),
            CircuitState::HalfOpen => None,
        };
    }
}

fn closed_expiry(settings: &BreakerSettings, now: Instant) -> Option<Instant> {
    if settings.interval.is_zero() {
        None
    } else {
        Some(now + settings.interval)
    }
}

/// Lazily built address-to-breaker map owned by the driver
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    settings: BreakerSettings,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, addr: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .lock()
            .entry(addr.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    format!("circuit breaker db-{}", addr),
                    self.settings.clone(),
                ))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transport decorator gating every call through a breaker
pub struct BreakerTransport<T> {
    inner: T,
    breaker: Arc<CircuitBreaker>,
}

impl<T: Transport> BreakerTransport<T> {
    pub fn new(inner: T, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl<T: Transport> Transport for BreakerTransport<T> {
    async fn call(&self, packet: Packet<Request>) -> Result<Packet<Response>, TransportError> {
        let generation = self.breaker.before_request()?;
        let result = self.inner.call(packet).await;
        self.breaker.after_request(generation, result.is_ok());
        result
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr()
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::MockTransport;

    fn settings() -> BreakerSettings {
        BreakerSettings {
            max_requests: 2,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            failure_threshold: 3,
        }
    }

    fn fail(breaker: &CircuitBreaker, now: Instant) {
        let generation = breaker.before_request_at(now).unwrap();
        breaker.after_request_at(generation, false, now);
    }

    #[test]
    fn test_trips_at_threshold() {
        let breaker = CircuitBreaker::new("test", settings());
        let now = Instant::now();

        fail(&breaker, now);
        fail(&breaker, now);
        assert_eq!(breaker.state_at(now), CircuitState::Closed);

        fail(&breaker, now);
        assert_eq!(breaker.state_at(now), CircuitState::Open);
        assert!(matches!(
            breaker.before_request_at(now),
            Err(TransportError::CircuitOpen)
        ));
    }

    #[test]
    fn test_window_resets_counts() {
        let breaker = CircuitBreaker::new("test", settings());
        let now = Instant::now();

        fail(&breaker, now);
        fail(&breaker, now);

        let later = now + Duration::from_secs(6);
        fail(&breaker, later);
        assert_eq!(breaker.state_at(later), CircuitState::Closed);
        assert_eq!(breaker.counts().total_failures, 1);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let breaker = CircuitBreaker::new("test", settings());
        let now = Instant::now();
        for _ in 0..3 {
            fail(&breaker, now);
        }

        let after_cooldown = now + Duration::from_secs(11);
        assert_eq!(breaker.state_at(after_cooldown), CircuitState::HalfOpen);

        // two trial calls admitted, the third rejected
        let g1 = breaker.before_request_at(after_cooldown).unwrap();
        let g2 = breaker.before_request_at(after_cooldown).unwrap();
        assert!(matches!(
            breaker.before_request_at(after_cooldown),
            Err(TransportError::TooManyRequests)
        ));

        breaker.after_request_at(g1, true, after_cooldown);
        breaker.after_request_at(g2, true, after_cooldown);
        assert_eq!(breaker.state_at(after_cooldown), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("test", settings());
        let now = Instant::now();
        for _ in 0..3 {
            fail(&breaker, now);
        }

        let after_cooldown = now + Duration::from_secs(11);
        fail(&breaker, after_cooldown);
        assert_eq!(breaker.state_at(after_cooldown), CircuitState::Open);
    }

    #[test]
    fn test_stale_generation_ignored() {
        let breaker = CircuitBreaker::new("test", settings());
        let now = Instant::now();
        let stale = breaker.before_request_at(now).unwrap();

        let later = now + Duration::from_secs(6);
        breaker.after_request_at(stale, false, later);
        assert_eq!(breaker.counts().total_failures, 0);
    }

    #[test]
    fn test_registry_shares_breakers_per_address() {
        let registry = BreakerRegistry::new(settings());
        let a = registry.get("10.0.0.1:9123");
        let b = registry.get("10.0.0.1:9123");
        let c = registry.get("10.0.0.2:9123");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
        assert_eq!(a.name(), "circuit breaker db-10.0.0.1:9123");
    }

    #[tokio::test]
    async fn test_open_breaker_skips_transport() {
        let breaker = Arc::new(CircuitBreaker::new("test", settings()));
        let mock = MockTransport::new();
        for _ in 0..3 {
            mock.push_transport_error();
        }
        let transport = BreakerTransport::new(mock.clone(), breaker.clone());

        for id in 1..=3 {
            let err = transport.call(MockTransport::ping_packet(id)).await.unwrap_err();
            assert!(matches!(err, TransportError::Io(_)));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = transport.call(MockTransport::ping_packet(4)).await.unwrap_err();
        assert!(matches!(err, TransportError::CircuitOpen));
        assert_eq!(mock.calls(), 3);
    }
}
