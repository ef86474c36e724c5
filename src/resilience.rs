//! Fault tolerance around every query operation.
//!
//! [`Resilience::call`] applies, in order:
//!
//! 1. **Validation**: a rejected request returns at once. It is never
//!    retried and never counted by the breaker.
//! 2. **Circuit check**: an open breaker short-circuits with
//!    [`AtlasError::CircuitOpen`].
//! 3. **Timeout**: one budget bounds the whole retry loop. On expiry the
//!    in-flight future is dropped, which cancels the pending sqlx query.
//! 4. **Retry**: only [`AtlasError::TransientStorage`] is retried, with
//!    exponential backoff `base * 2^n` capped at `max`.
//!
//! Breaker and telemetry state sit behind `std::sync::Mutex`es that are
//! never held across an `.await`.

use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use api_atlas_core::error::{AtlasError, Result};

use crate::config::ResilienceConfig;

/// The guarded query operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SearchEndpoints,
    GetSchema,
    GetExample,
    GetEndpointCategories,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::SearchEndpoints,
        Operation::GetSchema,
        Operation::GetExample,
        Operation::GetEndpointCategories,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::SearchEndpoints => "searchEndpoints",
            Operation::GetSchema => "getSchema",
            Operation::GetExample => "getExample",
            Operation::GetEndpointCategories => "getEndpointCategories",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============ Retry ============

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

// ============ Circuit breaker ============

#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub failure_ratio: f64,
    pub min_calls: usize,
    pub window: Duration,
    pub cooldown: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Closed,
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
}

#[derive(Debug)]
struct BreakerInner {
    state: State,
    outcomes: VecDeque<(Instant, bool)>,
}

/// Admission ticket returned by [`CircuitBreaker::try_acquire`].
///
/// Hand it back through [`CircuitBreaker::record`]. A half-open permit
/// dropped without a verdict (the caller's future was cancelled) frees the
/// trial slot so the next call is admitted as the trial instead.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.trial || self.settled {
            return;
        }
        let mut inner = lock(&self.breaker.inner);
        if matches!(inner.state, State::HalfOpen { trial_in_flight: true }) {
            tracing::debug!("half-open trial abandoned; slot released");
            inner.state = State::HalfOpen { trial_in_flight: false };
        }
    }
}

/// What a finished call tells the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failure,
    /// The call failed for reasons unrelated to backend health.
    Ignored,
}

/// Sliding-window circuit breaker that admits a single trial call while
/// half-open.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(BreakerInner {
                state: State::Closed,
                outcomes: VecDeque::new(),
            }),
        }
    }

    /// Admit a call, or return how long until the breaker may admit one.
    pub fn try_acquire(&self) -> std::result::Result<Permit<'_>, Duration> {
        let now = Instant::now();
        let mut inner = lock(&self.inner);
        let current = inner.state;
        let permit = |trial| Permit {
            breaker: self,
            trial,
            settled: false,
        };
        match current {
            State::Closed => Ok(permit(false)),
            State::Open { until } if now < until => Err(until - now),
            State::Open { .. } | State::HalfOpen { trial_in_flight: false } => {
                inner.state = State::HalfOpen { trial_in_flight: true };
                Ok(permit(true))
            }
            // A trial is in flight; others wait for its verdict.
            State::HalfOpen { trial_in_flight: true } => Err(self.settings.cooldown),
        }
    }

    pub fn record(&self, mut permit: Permit<'_>, verdict: Verdict) {
        permit.settled = true;
        let now = Instant::now();
        let mut inner = lock(&self.inner);

        if permit.trial {
            inner.state = match verdict {
                Verdict::Success => {
                    inner.outcomes.clear();
                    State::Closed
                }
                Verdict::Failure => State::Open {
                    until: now + self.settings.cooldown,
                },
                Verdict::Ignored => State::HalfOpen { trial_in_flight: false },
            };
            return;
        }

        let success = match verdict {
            Verdict::Success => true,
            Verdict::Failure => false,
            Verdict::Ignored => return,
        };

        inner.outcomes.push_back((now, success));
        while let Some(&(at, _)) = inner.outcomes.front() {
            if now.duration_since(at) > self.settings.window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }

        if matches!(inner.state, State::Closed) && inner.outcomes.len() >= self.settings.min_calls {
            let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count();
            let ratio = failures as f64 / inner.outcomes.len() as f64;
            if ratio >= self.settings.failure_ratio {
                tracing::warn!(
                    failures,
                    calls = inner.outcomes.len(),
                    cooldown_ms = self.settings.cooldown.as_millis() as u64,
                    "circuit opened"
                );
                inner.state = State::Open {
                    until: now + self.settings.cooldown,
                };
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        let current = lock(&self.inner).state;
        match current {
            State::Closed => CircuitState::Closed,
            State::Open { until } if Instant::now() < until => CircuitState::Open,
            State::Open { .. } | State::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

// ============ Telemetry ============

#[derive(Debug, Default)]
struct Counters {
    calls: u64,
    successes: u64,
    failures: u64,
    timeouts: u64,
    short_circuits: u64,
    validation_rejections: u64,
    retries: u64,
    slow_calls: u64,
    total_latency_ms: f64,
    max_latency_ms: f64,
    completed: u64,
    sample: VecDeque<f64>,
}

/// Serializable per-operation performance snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    pub operation: &'static str,
    pub circuit: CircuitState,
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub short_circuits: u64,
    pub validation_rejections: u64,
    pub retries: u64,
    pub slow_calls: u64,
    pub mean_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
}

/// Nearest-rank percentile over an unsorted sample.
fn percentile(sample: &VecDeque<f64>, p: f64) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = sample.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[derive(Debug)]
struct Guard {
    operation: Operation,
    timeout: Duration,
    breaker: CircuitBreaker,
    counters: Mutex<Counters>,
}

impl Guard {
    fn observe(&self, elapsed: Duration, retries: u32, sample_cap: usize, target: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let mut c = lock(&self.counters);
        c.retries += u64::from(retries);
        c.completed += 1;
        c.total_latency_ms += ms;
        c.max_latency_ms = c.max_latency_ms.max(ms);
        if elapsed > target {
            c.slow_calls += 1;
        }
        if c.sample.len() == sample_cap {
            c.sample.pop_front();
        }
        c.sample.push_back(ms);
    }

    fn snapshot(&self) -> OperationStats {
        let c = lock(&self.counters);
        OperationStats {
            operation: self.operation.name(),
            circuit: self.breaker.state(),
            calls: c.calls,
            successes: c.successes,
            failures: c.failures,
            timeouts: c.timeouts,
            short_circuits: c.short_circuits,
            validation_rejections: c.validation_rejections,
            retries: c.retries,
            slow_calls: c.slow_calls,
            mean_latency_ms: if c.completed > 0 {
                c.total_latency_ms / c.completed as f64
            } else {
                0.0
            },
            max_latency_ms: c.max_latency_ms,
            p50_latency_ms: percentile(&c.sample, 0.50),
            p95_latency_ms: percentile(&c.sample, 0.95),
        }
    }
}

// ============ Composition ============

/// Validation, circuit breaking, timeouts, retries, and telemetry for all
/// query operations. One breaker and one set of counters per operation.
#[derive(Debug)]
pub struct Resilience {
    retry: RetryPolicy,
    latency_sample: usize,
    latency_target: Duration,
    guards: [Guard; 4],
}

impl Resilience {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        let breaker = BreakerSettings {
            failure_ratio: config.failure_ratio,
            min_calls: config.min_calls,
            window: config.window(),
            cooldown: config.cooldown(),
        };
        let t = &config.timeouts;
        let guard = |operation: Operation, ms: u64| Guard {
            operation,
            timeout: Duration::from_millis(ms),
            breaker: CircuitBreaker::new(breaker),
            counters: Mutex::new(Counters::default()),
        };

        Self {
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base: Duration::from_millis(config.backoff_base_ms),
                max: Duration::from_millis(config.backoff_max_ms),
            },
            latency_sample: config.latency_sample,
            latency_target: Duration::from_millis(config.latency_target_ms),
            guards: [
                guard(Operation::SearchEndpoints, t.search_endpoints_ms),
                guard(Operation::GetSchema, t.get_schema_ms),
                guard(Operation::GetExample, t.get_example_ms),
                guard(Operation::GetEndpointCategories, t.get_endpoint_categories_ms),
            ],
        }
    }

    /// Run `attempt` under the full policy stack for `op`.
    ///
    /// `validate` runs before anything else; `attempt` is invoked once per
    /// try and must produce a fresh future each time.
    pub async fn call<T, V, F, Fut>(&self, op: Operation, validate: V, mut attempt: F) -> Result<T>
    where
        V: FnOnce() -> Result<()>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = &self.guards[op.index()];
        lock(&guard.counters).calls += 1;

        if let Err(e) = validate() {
            lock(&guard.counters).validation_rejections += 1;
            tracing::debug!(operation = op.name(), error = %e, "request rejected");
            return Err(e);
        }

        let permit = match guard.breaker.try_acquire() {
            Ok(p) => p,
            Err(retry_after) => {
                lock(&guard.counters).short_circuits += 1;
                return Err(AtlasError::CircuitOpen {
                    operation: op.name().to_string(),
                    retry_after_ms: retry_after.as_millis() as u64,
                });
            }
        };

        let start = Instant::now();
        let retries = AtomicU32::new(0);
        let outcome = tokio::time::timeout(
            guard.timeout,
            self.retry_loop(op, &retries, &mut attempt),
        )
        .await;
        let elapsed = start.elapsed();
        let retries = retries.load(Ordering::Relaxed);
        guard.observe(elapsed, retries, self.latency_sample, self.latency_target);

        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            Ok(Ok(value)) => {
                guard.breaker.record(permit, Verdict::Success);
                lock(&guard.counters).successes += 1;
                Ok(value)
            }
            Ok(Err(e)) if !e.is_backend_failure() => {
                guard.breaker.record(permit, Verdict::Ignored);
                lock(&guard.counters).validation_rejections += 1;
                Err(e)
            }
            Ok(Err(e)) => {
                guard.breaker.record(permit, Verdict::Failure);
                lock(&guard.counters).failures += 1;
                tracing::warn!(operation = op.name(), elapsed_ms, retries, error = %e, "operation failed");
                if e.is_transient() {
                    Err(AtlasError::RetriesExhausted {
                        operation: op.name().to_string(),
                        elapsed_ms,
                        retries,
                        last_error: e.to_string(),
                    })
                } else {
                    Err(e)
                }
            }
            Err(_) => {
                guard.breaker.record(permit, Verdict::Failure);
                {
                    let mut c = lock(&guard.counters);
                    c.failures += 1;
                    c.timeouts += 1;
                }
                tracing::warn!(operation = op.name(), elapsed_ms, retries, "operation timed out");
                Err(AtlasError::Timeout {
                    operation: op.name().to_string(),
                    elapsed_ms,
                    retries,
                })
            }
        }
    }

    async fn retry_loop<T, F, Fut>(&self, op: Operation, retries: &AtomicU32, attempt: &mut F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut tries = 0;
        loop {
            match attempt().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && tries < self.retry.max_retries => {
                    let delay = self.retry.backoff(tries);
                    tries += 1;
                    retries.store(tries, Ordering::Relaxed);
                    tracing::debug!(
                        operation = op.name(),
                        attempt = tries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn circuit_state(&self, op: Operation) -> CircuitState {
        self.guards[op.index()].breaker.state()
    }

    pub fn snapshot(&self) -> Vec<OperationStats> {
        self.guards.iter().map(Guard::snapshot).collect()
    }
}
