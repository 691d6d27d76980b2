//! Three-state circuit breaker.
//!
//! Closed counts consecutive failures and opens at the configured
//! threshold. Open rejects every call until the reset timeout elapses,
//! then shifts to half-open. Half-open admits a bounded number of
//! probe calls; a single failure reopens, enough consecutive successes
//! close. All counters reset on every state transition.
//!
//! Time comes from an injected [`Clock`] so tests can cross the reset
//! window without sleeping. State-change notifications go out on the
//! event bus when one is attached, always after internal locks are
//! released.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::clock::{Clock, SystemClock};
use crate::config::CircuitBreakerConfig;
use crate::types::{topics, BoxError, ResilienceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        write!(f, "{name}")
    }
}

/// Point-in-time snapshot of a breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub last_transition: DateTime<Utc>,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    failures: AtomicU32,
    successes: AtomicU32,
    /// Probes admitted since entering half-open.
    half_open_admitted: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
    last_transition: RwLock<DateTime<Utc>>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
    clock: Arc<dyn Clock>,
    bus: Option<Arc<EventBus>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            failures: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            half_open_admitted: AtomicU32::new(0),
            opened_at: Mutex::new(None),
            last_transition: RwLock::new(Utc::now()),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
            clock: Arc::new(SystemClock),
            bus: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.check_reset_timeout();
        *self.state.read().unwrap()
    }

    /// Run `operation` under the breaker. Rejected immediately when
    /// open; otherwise the call races the configured timeout and its
    /// outcome feeds the failure counters.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        if !self.allow_request() {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            self.emit(topics::CIRCUIT_REJECTED, json!({ "breaker": self.name }));
            return Err(ResilienceError::CircuitOpen {
                name: self.name.clone(),
            });
        }

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(self.config.operation_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(source)) => {
                self.record_failure();
                Err(ResilienceError::Operation {
                    name: self.name.clone(),
                    source,
                })
            }
            Err(_) => {
                self.record_failure();
                Err(ResilienceError::OperationTimeout {
                    name: self.name.clone(),
                    timeout: self.config.operation_timeout,
                })
            }
        }
    }

    /// Whether a call may proceed right now. Half-open admits at most
    /// `success_threshold` concurrent probes.
    pub fn allow_request(&self) -> bool {
        self.check_reset_timeout();
        match *self.state.read().unwrap() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                self.half_open_admitted.fetch_add(1, Ordering::SeqCst)
                    < self.config.success_threshold
            }
        }
    }

    pub fn record_success(&self) {
        let (counted, transition) = {
            let mut state = self.state.write().unwrap();
            match *state {
                CircuitState::Closed => {
                    self.failures.store(0, Ordering::SeqCst);
                    (true, None)
                }
                CircuitState::HalfOpen => {
                    let successes = self.successes.fetch_add(1, Ordering::SeqCst) + 1;
                    if successes >= self.config.success_threshold {
                        *state = CircuitState::Closed;
                        self.on_transition(CircuitState::Closed);
                        (true, Some((CircuitState::HalfOpen, CircuitState::Closed)))
                    } else {
                        (true, None)
                    }
                }
                // A success racing the open transition is stale and
                // must not be announced.
                CircuitState::Open => (false, None),
            }
        };
        if counted {
            self.emit(topics::CIRCUIT_SUCCESS, json!({ "breaker": self.name }));
        }
        self.emit_transition(transition);
    }

    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.emit(topics::CIRCUIT_FAILURE, json!({ "breaker": self.name }));
        let transition = {
            let mut state = self.state.write().unwrap();
            match *state {
                CircuitState::Closed => {
                    let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                    if failures >= self.config.failure_threshold {
                        *state = CircuitState::Open;
                        self.on_transition(CircuitState::Open);
                        Some((CircuitState::Closed, CircuitState::Open))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    // One failed probe is enough to reopen.
                    *state = CircuitState::Open;
                    self.on_transition(CircuitState::Open);
                    Some((CircuitState::HalfOpen, CircuitState::Open))
                }
                CircuitState::Open => None,
            }
        };
        self.emit_transition(transition);
    }

    /// Force the breaker back to closed and clear all counters.
    pub fn reset(&self) {
        let transition = {
            let mut state = self.state.write().unwrap();
            let previous = *state;
            *state = CircuitState::Closed;
            self.on_transition(CircuitState::Closed);
            (previous != CircuitState::Closed).then_some((previous, CircuitState::Closed))
        };
        self.emit_transition(transition);
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        self.check_reset_timeout();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: *self.state.read().unwrap(),
            consecutive_failures: self.failures.load(Ordering::SeqCst),
            consecutive_successes: self.successes.load(Ordering::SeqCst),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            last_transition: *self.last_transition.read().unwrap(),
        }
    }

    /// Counter bookkeeping common to every transition. Caller holds
    /// the state write lock.
    fn on_transition(&self, to: CircuitState) {
        self.failures.store(0, Ordering::SeqCst);
        self.successes.store(0, Ordering::SeqCst);
        self.half_open_admitted.store(0, Ordering::SeqCst);
        let mut opened_at = self.opened_at.lock().unwrap();
        *opened_at = match to {
            CircuitState::Open => Some(self.clock.now()),
            _ => None,
        };
        *self.last_transition.write().unwrap() = Utc::now();
    }

    /// Move open -> half-open once the reset window has elapsed.
    fn check_reset_timeout(&self) {
        let transition = {
            let mut state = self.state.write().unwrap();
            if *state != CircuitState::Open {
                return;
            }
            let elapsed = self
                .opened_at
                .lock()
                .unwrap()
                .map(|at| self.clock.now().duration_since(at));
            match elapsed {
                Some(elapsed) if elapsed >= self.config.reset_timeout => {
                    *state = CircuitState::HalfOpen;
                    self.on_transition(CircuitState::HalfOpen);
                    Some((CircuitState::Open, CircuitState::HalfOpen))
                }
                _ => None,
            }
        };
        self.emit_transition(transition);
    }

    fn emit_transition(&self, transition: Option<(CircuitState, CircuitState)>) {
        let Some((from, to)) = transition else {
            return;
        };
        match to {
            CircuitState::Open => {
                warn!(breaker = %self.name, %from, %to, "circuit breaker opened")
            }
            _ => info!(breaker = %self.name, %from, %to, "circuit breaker transition"),
        }
        self.emit(
            topics::CIRCUIT_STATE_CHANGE,
            json!({
                "breaker": self.name,
                "from": from.to_string(),
                "to": to.to_string(),
            }),
        );
    }

    fn emit(&self, event_type: &str, payload: serde_json::Value) {
        if let Some(bus) = &self.bus {
            bus.publish(event_type, payload);
        }
    }
}

/// Named breakers shared across the runtime. First creation wins: a
/// concurrent `get_or_create` for the same name returns the breaker
/// that got there first.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
    bus: Option<Arc<EventBus>>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            bus: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        Arc::clone(
            &self
                .breakers
                .entry(name.to_string())
                .or_insert_with(|| {
                    debug!(breaker = name, "creating circuit breaker");
                    let mut breaker = CircuitBreaker::new(name, self.default_config.clone())
                        .with_clock(Arc::clone(&self.clock));
                    if let Some(bus) = &self.bus {
                        breaker = breaker.with_event_bus(Arc::clone(bus));
                    }
                    Arc::new(breaker)
                }),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(&entry))
    }

    /// Reset one breaker to closed. Returns false if no breaker is
    /// registered under the name.
    pub fn reset(&self, name: &str) -> bool {
        match self.breakers.get(name) {
            Some(entry) => {
                entry.value().reset();
                true
            }
            None => false,
        }
    }

    /// Reset every registered breaker to closed.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    pub fn remove(&self, name: &str) -> bool {
        self.breakers.remove(name).is_some()
    }

    pub fn clear(&self) {
        self.breakers.clear();
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(5),
        }
    }

    fn breaker_with_clock() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::new("test", test_config())
            .with_clock(Arc::clone(&clock) as Arc<dyn Clock>);
        (breaker, clock)
    }

    fn trip(breaker: &CircuitBreaker) {
        for _ in 0..3 {
            breaker.record_failure();
        }
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let (breaker, _clock) = breaker_with_clock();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn success_resets_failure_streak_while_closed() {
        let (breaker, _clock) = breaker_with_clock();
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_after_reset_timeout() {
        let (breaker, clock) = breaker_with_clock();
        trip(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(29));
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(1));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allow_request());
    }

    #[test]
    fn half_open_closes_after_enough_successes() {
        let (breaker, clock) = breaker_with_clock();
        trip(&breaker);
        clock.advance(Duration::from_secs(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_reopens_on_single_failure() {
        let (breaker, clock) = breaker_with_clock();
        trip(&breaker);
        clock.advance(Duration::from_secs(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Reopening restarts the reset window and clears the earlier
        // success streak.
        clock.advance(Duration::from_secs(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_bounds_probe_admissions() {
        let (breaker, clock) = breaker_with_clock();
        trip(&breaker);
        clock.advance(Duration::from_secs(30));

        assert!(breaker.allow_request());
        assert!(breaker.allow_request());
        assert!(!breaker.allow_request());
    }

    #[tokio::test]
    async fn call_rejects_without_invoking_when_open() {
        use std::sync::atomic::AtomicU32;

        let (breaker, _clock) = breaker_with_clock();
        trip(&breaker);

        let invoked = AtomicU32::new(0);
        let result: Result<(), _> = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().total_rejections, 1);
    }

    #[tokio::test]
    async fn call_feeds_outcomes_into_counters() {
        let (breaker, _clock) = breaker_with_clock();

        let ok: Result<u32, _> = breaker.call(|| async { Ok(42) }).await;
        assert_eq!(ok.unwrap(), 42);

        let err: Result<u32, _> = breaker
            .call(|| async { Err::<u32, BoxError>("boom".into()) })
            .await;
        assert!(matches!(err, Err(ResilienceError::Operation { .. })));

        let stats = breaker.stats();
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.total_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn call_times_out_slow_operations() {
        let breaker = CircuitBreaker::new(
            "slow",
            CircuitBreakerConfig {
                operation_timeout: Duration::from_millis(100),
                ..test_config()
            },
        );

        let result: Result<(), _> = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(ResilienceError::OperationTimeout { .. })
        ));
        assert_eq!(breaker.stats().total_failures, 1);
    }

    #[test]
    fn stale_success_while_open_is_not_announced() {
        use crate::config::EventBusConfig;

        let bus = Arc::new(EventBus::priority(&EventBusConfig::default()));
        let successes = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&successes);
        bus.subscribe(
            topics::CIRCUIT_SUCCESS,
            Arc::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let breaker = CircuitBreaker::new("test", test_config())
            .with_event_bus(Arc::clone(&bus));
        breaker.record_success();
        assert_eq!(successes.load(Ordering::SeqCst), 1);

        trip(&breaker);
        breaker.record_success();
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn registry_returns_same_instance_per_name() {
        let registry = CircuitBreakerRegistry::new(test_config());
        let a = registry.get_or_create("db");
        let b = registry.get_or_create("db");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        assert!(registry.get("missing").is_none());
        assert!(registry.remove("db"));
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_reset_all_closes_breakers() {
        let registry = CircuitBreakerRegistry::new(test_config());
        let breaker = registry.get_or_create("db");
        trip(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(registry.reset("db"));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(!registry.reset("missing"));

        trip(&breaker);
        registry.reset_all();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
