use uuid::Uuid;

use crate::errors::ClaimError;
use crate::services::kv::KvStore;

/// Outcome of an admission check. `reset_ms` is the wall-clock millisecond at
/// which the window frees a slot again.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_ms: i64,
}

impl RateDecision {
    pub fn retry_after_secs(&self) -> u64 {
        let now_ms = chrono::Utc::now().timestamp_millis();
        (((self.reset_ms - now_ms) + 999) / 1000).max(1) as u64
    }

    pub fn deny_error(&self) -> ClaimError {
        ClaimError::RateLimited {
            limit: self.limit,
            remaining: self.remaining,
            reset_ms: self.reset_ms,
            retry_after_secs: self.retry_after_secs(),
        }
    }
}

/// Stateless between calls; the KV store holds all shared state.
pub struct RateLimiter {
    kv: KvStore,
}

impl RateLimiter {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// Sliding window per user. One atomic pipeline evicts stale entries,
    /// reads the count, records this attempt and refreshes the key TTL, so
    /// bursts straddling a fixed-window boundary cannot double-spend.
    pub async fn user_window(
        &self,
        user_id: Uuid,
        max: u32,
        window_secs: u64,
    ) -> Result<RateDecision, ClaimError> {
        let key = format!("rate:user:{}", user_id);
        let window_ms = window_secs as i64 * 1000;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let cutoff = now_ms - window_ms;
        let member = format!("{}-{}", now_ms, Uuid::new_v4().simple());

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrembyscore(&key, "-inf", cutoff)
            .zcard(&key)
            .zadd(&key, member.as_str(), now_ms)
            .expire(&key, window_secs as i64);
        let (_evicted, current, _added, _expired): (i64, i64, i64, i64) =
            self.kv.pipeline(&pipe).await?;

        let allowed = (current as u32) < max;
        let remaining = max.saturating_sub(current as u32 + 1);

        let oldest = self.kv.zrange_withscores(&key, 0, 0).await?;
        let reset_ms = oldest
            .first()
            .map(|(_, score)| *score + window_ms)
            .unwrap_or(now_ms + window_ms);

        if !allowed {
            tracing::warn!(%user_id, current, max, "user rate limit exceeded");
            metrics::counter!("rate_limit_rejections_total", "scope" => "user").increment(1);
        }

        Ok(RateDecision {
            allowed,
            limit: max,
            remaining,
            reset_ms,
        })
    }

    /// Fixed window per client IP.
    pub async fn ip_window(
        &self,
        addr: &str,
        max: u32,
        window_secs: u64,
    ) -> Result<RateDecision, ClaimError> {
        let decision = self
            .fixed_window(&format!("rate:ip:{}", addr), max, window_secs)
            .await?;
        if !decision.allowed {
            tracing::warn!(ip = addr, max, "ip rate limit exceeded");
            metrics::counter!("rate_limit_rejections_total", "scope" => "ip").increment(1);
        }
        Ok(decision)
    }

    /// Fixed window on an arbitrary key; also used to cap worker throughput.
    pub async fn fixed_window(
        &self,
        key: &str,
        max: u32,
        window_secs: u64,
    ) -> Result<RateDecision, ClaimError> {
        let count = self.kv.incr(key).await?;
        if count == 1 {
            self.kv.expire(key, window_secs as i64).await?;
        }
        let now_ms = chrono::Utc::now().timestamp_millis();
        Ok(RateDecision {
            allowed: count <= max as i64,
            limit: max,
            remaining: max.saturating_sub(count as u32),
            reset_ms: now_ms + window_secs as i64 * 1000,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_is_at_least_one_second() {
        let decision = RateDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_ms: chrono::Utc::now().timestamp_millis() - 5000,
        };
        assert_eq!(decision.retry_after_secs(), 1);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = RateDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_ms: chrono::Utc::now().timestamp_millis() + 30_500,
        };
        let retry = decision.retry_after_secs();
        assert!(retry >= 30 && retry <= 32, "retry_after was {}", retry);
    }

    #[test]
    fn test_deny_error_carries_window_state() {
        let decision = RateDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_ms: chrono::Utc::now().timestamp_millis() + 10_000,
        };
        match decision.deny_error() {
            ClaimError::RateLimited { limit, remaining, .. } => {
                assert_eq!(limit, 10);
                assert_eq!(remaining, 0);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
