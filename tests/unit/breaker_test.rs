use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use voucher_claim_backend::services::circuit_breaker::{
    BreakerError, BreakerState, CircuitBreaker, CircuitBreakerConfig,
};

fn fast_breaker() -> CircuitBreaker {
    CircuitBreaker::new(
        "claim-transaction",
        CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            call_timeout: Duration::from_millis(200),
            open_duration: Duration::from_millis(80),
            permitted_calls_in_half_open: 2,
        },
    )
}

#[tokio::test]
async fn test_default_thresholds() {
    let config = CircuitBreakerConfig::default();
    assert_eq!(config.failure_threshold, 5);
    assert_eq!(config.success_threshold, 2);
    assert_eq!(config.call_timeout, Duration::from_secs(60));
    assert_eq!(config.open_duration, Duration::from_secs(30));
    assert_eq!(config.permitted_calls_in_half_open, 2);
}

#[tokio::test]
async fn test_full_lifecycle() {
    let breaker = fast_breaker();

    // five consecutive failures trip it open
    for _ in 0..5 {
        let _ = breaker
            .call(|| async { Err::<(), &str>("store down") })
            .await;
    }
    assert_eq!(breaker.state().await, BreakerState::Open);

    // open state rejects without running the action
    let ran = AtomicU32::new(0);
    let result = breaker
        .call(|| async {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await;
    assert!(matches!(result, Err(BreakerError::Open)));
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    // after the open window, probes run and two successes close it
    tokio::time::sleep(Duration::from_millis(100)).await;
    breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
    assert_eq!(breaker.state().await, BreakerState::HalfOpen);
    breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
    assert_eq!(breaker.state().await, BreakerState::Closed);
}

#[tokio::test]
async fn test_half_open_failure_goes_back_to_open() {
    let breaker = fast_breaker();
    for _ in 0..5 {
        let _ = breaker.call(|| async { Err::<(), &str>("down") }).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let _ = breaker.call(|| async { Err::<(), &str>("still down") }).await;
    assert_eq!(breaker.state().await, BreakerState::Open);

    let rejected = breaker.call(|| async { Ok::<_, &str>(()) }).await;
    assert!(matches!(rejected, Err(BreakerError::Open)));
}

#[tokio::test]
async fn test_closed_calls_do_not_serialise() {
    let breaker = std::sync::Arc::new(fast_breaker());
    let started = std::time::Instant::now();

    // ten 50ms calls running concurrently should take nowhere near 500ms
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, &str>(())
                    })
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(breaker.state().await, BreakerState::Closed);
}

#[tokio::test]
async fn test_half_open_burst_is_capped() {
    let breaker = std::sync::Arc::new(fast_breaker());
    for _ in 0..5 {
        let _ = breaker.call(|| async { Err::<(), &str>("down") }).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // a burst of concurrent callers arrives while the store is recovering;
    // only the permitted probes may reach it
    let admitted = std::sync::Arc::new(AtomicU32::new(0));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let breaker = breaker.clone();
            let admitted = admitted.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async {
                        admitted.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(150)).await;
                        Ok::<_, &str>(())
                    })
                    .await
            })
        })
        .collect();

    let mut shed = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), Err(BreakerError::Open)) {
            shed += 1;
        }
    }
    assert!(admitted.load(Ordering::SeqCst) <= 2);
    assert!(shed >= 6);
}

#[tokio::test]
async fn test_concurrent_failures_keep_counters_consistent() {
    let breaker = std::sync::Arc::new(fast_breaker());
    let handles: Vec<_> = (0..20)
        .map(|_| {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                let _ = breaker.call(|| async { Err::<(), &str>("down") }).await;
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    // at least the threshold-worth of failures landed, so it must be open
    assert_eq!(breaker.state().await, BreakerState::Open);
}
