use serde::{Deserialize, Serialize};

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Claim-pipeline knobs, read from process env with production defaults.
/// Framework-level settings (server, database pool, queue redis) live in the
/// loco config files.
#[derive(Debug, Clone)]
pub struct VoucherSettings {
    pub redis_url: String,

    // Per-user sliding window
    pub user_rate_max: u32,
    pub user_rate_window_secs: u64,

    // Per-IP fixed window
    pub ip_rate_max: u32,
    pub ip_rate_window_secs: u64,

    // Cache TTLs
    pub user_cache_ttl_secs: u64,
    pub result_cache_ttl_secs: u64,

    // Circuit breaker
    pub breaker_failure_threshold: u32,
    pub breaker_success_threshold: u32,
    pub breaker_call_timeout_secs: u64,
    pub breaker_open_secs: u64,
    pub breaker_half_open_max_calls: u32,

    // Claim queue / worker
    pub queue_max_attempts: u32,
    pub queue_success_retention_secs: u64,
    pub queue_failed_retention_secs: u64,
    pub queue_success_retention_entries: usize,
    pub queue_failed_retention_entries: usize,
    pub worker_concurrency: u32,
    pub worker_rate_per_sec: u32,

    // KV gateway
    pub kv_op_timeout_ms: u64,
    pub kv_retries: u32,
}

impl Default for VoucherSettings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            user_rate_max: 10,
            user_rate_window_secs: 60,
            ip_rate_max: 100,
            ip_rate_window_secs: 60,
            user_cache_ttl_secs: 300,
            result_cache_ttl_secs: 3600,
            breaker_failure_threshold: 5,
            breaker_success_threshold: 2,
            breaker_call_timeout_secs: 60,
            breaker_open_secs: 30,
            breaker_half_open_max_calls: 2,
            queue_max_attempts: 3,
            queue_success_retention_secs: 86_400,
            queue_failed_retention_secs: 604_800,
            queue_success_retention_entries: 1000,
            queue_failed_retention_entries: 5000,
            worker_concurrency: 50,
            worker_rate_per_sec: 100,
            kv_op_timeout_ms: 2000,
            kv_retries: 2,
        }
    }
}

impl VoucherSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            user_rate_max: env_parse("RATE_LIMIT_USER_MAX", defaults.user_rate_max),
            user_rate_window_secs: env_parse("RATE_LIMIT_USER_WINDOW_SECS", defaults.user_rate_window_secs),
            ip_rate_max: env_parse("RATE_LIMIT_IP_MAX", defaults.ip_rate_max),
            ip_rate_window_secs: env_parse("RATE_LIMIT_IP_WINDOW_SECS", defaults.ip_rate_window_secs),
            user_cache_ttl_secs: env_parse("CACHE_USER_TTL_SECS", defaults.user_cache_ttl_secs),
            result_cache_ttl_secs: env_parse("CACHE_RESULT_TTL_SECS", defaults.result_cache_ttl_secs),
            breaker_failure_threshold: env_parse("BREAKER_FAILURE_THRESHOLD", defaults.breaker_failure_threshold),
            breaker_success_threshold: env_parse("BREAKER_SUCCESS_THRESHOLD", defaults.breaker_success_threshold),
            breaker_call_timeout_secs: env_parse("BREAKER_CALL_TIMEOUT_SECS", defaults.breaker_call_timeout_secs),
            breaker_open_secs: env_parse("BREAKER_OPEN_SECS", defaults.breaker_open_secs),
            breaker_half_open_max_calls: env_parse("BREAKER_HALF_OPEN_MAX_CALLS", defaults.breaker_half_open_max_calls),
            queue_max_attempts: env_parse("QUEUE_MAX_ATTEMPTS", defaults.queue_max_attempts),
            queue_success_retention_secs: env_parse("QUEUE_SUCCESS_RETENTION_SECS", defaults.queue_success_retention_secs),
            queue_failed_retention_secs: env_parse("QUEUE_FAILED_RETENTION_SECS", defaults.queue_failed_retention_secs),
            queue_success_retention_entries: env_parse("QUEUE_SUCCESS_RETENTION_ENTRIES", defaults.queue_success_retention_entries),
            queue_failed_retention_entries: env_parse("QUEUE_FAILED_RETENTION_ENTRIES", defaults.queue_failed_retention_entries),
            worker_concurrency: env_parse("WORKER_CONCURRENCY", defaults.worker_concurrency),
            worker_rate_per_sec: env_parse("WORKER_RATE_PER_SEC", defaults.worker_rate_per_sec),
            kv_op_timeout_ms: env_parse("KV_OP_TIMEOUT_MS", defaults.kv_op_timeout_ms),
            kv_retries: env_parse("KV_RETRIES", defaults.kv_retries),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_expiration_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "development-secret-key-change-in-production".to_string(),
            token_expiration_secs: 86_400,
        }
    }
}

impl AuthSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            token_expiration_secs: env_parse("JWT_EXPIRATION_SECS", defaults.token_expiration_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_match_pipeline_contract() {
        let settings = VoucherSettings::default();
        assert_eq!(settings.user_rate_max, 10);
        assert_eq!(settings.user_rate_window_secs, 60);
        assert_eq!(settings.ip_rate_max, 100);
        assert_eq!(settings.user_cache_ttl_secs, 300);
        assert_eq!(settings.result_cache_ttl_secs, 3600);
        assert_eq!(settings.breaker_failure_threshold, 5);
        assert_eq!(settings.breaker_success_threshold, 2);
        assert_eq!(settings.queue_max_attempts, 3);
        assert_eq!(settings.worker_concurrency, 50);
        assert_eq!(settings.worker_rate_per_sec, 100);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("RATE_LIMIT_USER_MAX", "25");
        let settings = VoucherSettings::from_env();
        assert_eq!(settings.user_rate_max, 25);
        std::env::remove_var("RATE_LIMIT_USER_MAX");
    }

    #[test]
    #[serial]
    fn test_unparseable_env_falls_back() {
        std::env::set_var("RATE_LIMIT_IP_MAX", "not-a-number");
        let settings = VoucherSettings::from_env();
        assert_eq!(settings.ip_rate_max, 100);
        std::env::remove_var("RATE_LIMIT_IP_MAX");
    }
}
