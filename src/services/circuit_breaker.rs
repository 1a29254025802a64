use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls are allowed.
    Closed,
    /// Calls are rejected until the open window elapses.
    Open,
    /// A limited probe phase after the open window.
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub call_timeout: Duration,
    pub open_duration: Duration,
    /// Concurrent probes admitted while Half-Open; everyone else is rejected
    /// as if the circuit were still Open.
    pub permitted_calls_in_half_open: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            call_timeout: Duration::from_secs(60),
            open_duration: Duration::from_secs(30),
            permitted_calls_in_half_open: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error("call timed out")]
    Timeout,
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct BreakerCounters {
    state: BreakerState,
    failures: u32,
    successes: u32,
    half_open_in_flight: u32,
    next_attempt: Option<Instant>,
}

/// Wraps an action with failure-threshold and half-open probe semantics.
/// Counter updates happen under the lock; the action itself runs outside it,
/// so callers in Closed state never serialise on each other.
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    counters: Mutex<BreakerCounters>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            counters: Mutex::new(BreakerCounters {
                state: BreakerState::Closed,
                failures: 0,
                successes: 0,
                half_open_in_flight: 0,
                next_attempt: None,
            }),
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.counters.lock().await.state
    }

    /// Run the action; every error counts as a breaker failure.
    pub async fn call<T, E, F, Fut>(&self, action: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.call_classified(action, |_| true).await
    }

    /// Run the action with a failure classifier. Errors the classifier maps to
    /// false (domain outcomes) pass through without touching the counters.
    pub async fn call_classified<T, E, F, Fut, P>(
        &self,
        action: F,
        counts_as_failure: P,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut probing = false;
        {
            let mut counters = self.counters.lock().await;
            match counters.state {
                BreakerState::Open => {
                    let reopened = counters
                        .next_attempt
                        .map(|at| Instant::now() >= at)
                        .unwrap_or(true);
                    if !reopened {
                        return Err(BreakerError::Open);
                    }
                    self.transition(&mut counters, BreakerState::HalfOpen);
                    counters.half_open_in_flight = 1;
                    probing = true;
                }
                // Half-Open admits a bounded number of probes; the rest are
                // shed as if the circuit were still Open
                BreakerState::HalfOpen => {
                    if counters.half_open_in_flight >= self.config.permitted_calls_in_half_open {
                        return Err(BreakerError::Open);
                    }
                    counters.half_open_in_flight += 1;
                    probing = true;
                }
                BreakerState::Closed => {}
            }
        }

        let outcome = tokio::time::timeout(self.config.call_timeout, action()).await;

        let mut counters = self.counters.lock().await;
        if probing {
            counters.half_open_in_flight = counters.half_open_in_flight.saturating_sub(1);
        }
        match outcome {
            Ok(Ok(value)) => {
                self.record_success(&mut counters);
                Ok(value)
            }
            Ok(Err(err)) => {
                if counts_as_failure(&err) {
                    self.record_failure(&mut counters);
                }
                Err(BreakerError::Inner(err))
            }
            Err(_) => {
                self.record_failure(&mut counters);
                Err(BreakerError::Timeout)
            }
        }
    }

    fn record_success(&self, counters: &mut BreakerCounters) {
        match counters.state {
            BreakerState::Closed => {
                counters.failures = 0;
            }
            BreakerState::HalfOpen => {
                counters.successes += 1;
                if counters.successes >= self.config.success_threshold {
                    self.transition(counters, BreakerState::Closed);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn record_failure(&self, counters: &mut BreakerCounters) {
        match counters.state {
            BreakerState::Closed => {
                counters.failures += 1;
                if counters.failures >= self.config.failure_threshold {
                    self.transition(counters, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                self.transition(counters, BreakerState::Open);
            }
            BreakerState::Open => {
                counters.next_attempt = Some(Instant::now() + self.config.open_duration);
            }
        }
    }

    fn transition(&self, counters: &mut BreakerCounters, to: BreakerState) {
        let from = counters.state;
        counters.state = to;
        counters.failures = 0;
        counters.successes = 0;
        counters.half_open_in_flight = 0;
        counters.next_attempt = match to {
            BreakerState::Open => Some(Instant::now() + self.config.open_duration),
            _ => None,
        };
        tracing::error!(
            breaker = self.name,
            from = from.as_str(),
            to = to.as_str(),
            "circuit breaker state change"
        );
        metrics::counter!(
            "circuit_breaker_transitions_total",
            "breaker" => self.name,
            "to" => to.as_str()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, success_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold,
                success_threshold,
                call_timeout: Duration::from_millis(100),
                open_duration: Duration::from_millis(50),
                permitted_calls_in_half_open: 1,
            },
        )
    }

    async fn fail(b: &CircuitBreaker) {
        let _ = b
            .call::<(), _, _, _>(|| async { Err::<(), &str>("boom") })
            .await;
    }

    async fn succeed(b: &CircuitBreaker) {
        let _ = b.call(|| async { Ok::<_, &str>(()) }).await;
    }

    #[tokio::test]
    async fn test_opens_after_failure_threshold() {
        let b = breaker(3, 1);
        for _ in 0..3 {
            fail(&b).await;
        }
        assert_eq!(b.state().await, BreakerState::Open);

        let rejected = b.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(rejected, Err(BreakerError::Open)));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count_while_closed() {
        let b = breaker(3, 1);
        fail(&b).await;
        fail(&b).await;
        succeed(&b).await;
        fail(&b).await;
        fail(&b).await;
        assert_eq!(b.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_recovers_after_success_threshold() {
        let b = breaker(1, 2);
        fail(&b).await;
        assert_eq!(b.state().await, BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;
        succeed(&b).await;
        assert_eq!(b.state().await, BreakerState::HalfOpen);
        succeed(&b).await;
        assert_eq!(b.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let b = breaker(1, 2);
        fail(&b).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        fail(&b).await;
        assert_eq!(b.state().await, BreakerState::Open);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let b = breaker(1, 1);
        let result = b
            .call(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<_, &str>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Timeout)));
        assert_eq!(b.state().await, BreakerState::Open);
    }

    #[tokio::test]
    async fn test_half_open_probe_count_is_bounded() {
        let b = std::sync::Arc::new(breaker(1, 1));
        fail(&b).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        // first probe occupies the single half-open slot; a second concurrent
        // caller is shed as open
        let probe = {
            let b = b.clone();
            tokio::spawn(async move {
                b.call(|| async {
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    Ok::<_, &str>(())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(b.state().await, BreakerState::HalfOpen);
        let shed = b.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(shed, Err(BreakerError::Open)));

        assert!(probe.await.unwrap().is_ok());
        assert_eq!(b.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_classified_domain_errors_do_not_trip() {
        let b = breaker(1, 1);
        for _ in 0..5 {
            let _ = b
                .call_classified(|| async { Err::<(), &str>("domain") }, |_| false)
                .await;
        }
        assert_eq!(b.state().await, BreakerState::Closed);
    }
}
