use tokio::sync::{OnceCell, Semaphore};

use crate::config::VoucherSettings;
use crate::errors::ClaimError;

pub mod cache;
pub mod circuit_breaker;
pub mod claim_service;
pub mod kv;
pub mod queue;
pub mod rate_limiter;
pub mod refund_service;
pub mod store;

use cache::ClaimCache;
use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use kv::KvStore;
use queue::ClaimQueue;
use rate_limiter::RateLimiter;

/// The claim pipeline's service graph, built once at startup. Every service
/// takes its dependencies through its constructor, so tests can assemble the
/// same graph around doubles.
pub struct Services {
    pub settings: VoucherSettings,
    pub kv: KvStore,
    pub cache: ClaimCache,
    pub limiter: RateLimiter,
    pub breaker: CircuitBreaker,
    pub queue: ClaimQueue,
    /// Caps claim jobs in flight per process; the queue runtime does not
    /// expose its own worker-count knob.
    pub worker_permits: Semaphore,
}

static SERVICES: OnceCell<Services> = OnceCell::const_new();

impl Services {
    pub async fn build(settings: VoucherSettings) -> Result<Self, ClaimError> {
        let kv = KvStore::connect(
            &settings.redis_url,
            settings.kv_op_timeout_ms,
            settings.kv_retries,
        )
        .await?;
        let cache = ClaimCache::new(
            kv.clone(),
            settings.user_cache_ttl_secs,
            settings.result_cache_ttl_secs,
        );
        let limiter = RateLimiter::new(kv.clone());
        let breaker = CircuitBreaker::new(
            "claim-transaction",
            CircuitBreakerConfig {
                failure_threshold: settings.breaker_failure_threshold,
                success_threshold: settings.breaker_success_threshold,
                call_timeout: std::time::Duration::from_secs(settings.breaker_call_timeout_secs),
                open_duration: std::time::Duration::from_secs(settings.breaker_open_secs),
                permitted_calls_in_half_open: settings.breaker_half_open_max_calls,
            },
        );
        let queue = ClaimQueue::new(kv.clone(), &settings);
        let worker_permits = Semaphore::new(settings.worker_concurrency.max(1) as usize);
        Ok(Self {
            settings,
            kv,
            cache,
            limiter,
            breaker,
            queue,
            worker_permits,
        })
    }

    /// Process-wide instance for request handlers and workers. The loco
    /// runtime owns `AppContext` construction, so the graph hangs off a once
    /// cell instead of the context itself.
    pub async fn shared() -> Result<&'static Services, ClaimError> {
        SERVICES
            .get_or_try_init(|| async { Self::build(VoucherSettings::from_env()).await })
            .await
    }
}
