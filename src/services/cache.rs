use std::sync::atomic::{AtomicU64, Ordering};

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::errors::ClaimError;
use crate::models::user::User;
use crate::services::kv::KvStore;

const INVALIDATION_CHANNEL: &str = "voucher:cache:invalidate";

fn user_key(id: Uuid) -> String {
    format!("user:{}:data", id)
}

fn count_key(id: Uuid) -> String {
    format!("user:{}:vouchers", id)
}

fn result_key(request_id: &str) -> String {
    format!("claim:result:{}", request_id)
}

/// User data, voucher counters and idempotent claim results on the KV store.
/// Counter writes only happen on the commit path; everything else tolerates
/// staleness because the claim transaction repeats the checks.
pub struct ClaimCache {
    kv: KvStore,
    user_ttl_secs: u64,
    result_ttl_secs: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ClaimCache {
    pub fn new(kv: KvStore, user_ttl_secs: u64, result_ttl_secs: u64) -> Self {
        Self {
            kv,
            user_ttl_secs,
            result_ttl_secs,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>, ClaimError> {
        match self.kv.get(&user_key(id)).await? {
            Some(raw) => {
                let user = serde_json::from_str(&raw)
                    .map_err(|e| ClaimError::Internal(anyhow::Error::new(e)))?;
                self.record_hit();
                Ok(Some(user))
            }
            None => {
                self.record_miss();
                Ok(None)
            }
        }
    }

    pub async fn put_user(&self, user: &User) -> Result<(), ClaimError> {
        let raw = serde_json::to_string(user)
            .map_err(|e| ClaimError::Internal(anyhow::Error::new(e)))?;
        self.kv
            .set_ex(&user_key(user.id), &raw, self.user_ttl_secs)
            .await?;
        Ok(())
    }

    pub async fn get_count(&self, id: Uuid) -> Result<Option<i32>, ClaimError> {
        match self.kv.get(&count_key(id)).await? {
            Some(raw) => {
                self.record_hit();
                Ok(raw.parse().ok())
            }
            None => {
                self.record_miss();
                Ok(None)
            }
        }
    }

    /// Only the transaction that committed the matching `claimed` change may
    /// call this; everyone else invalidates and re-reads.
    pub async fn put_count(&self, id: Uuid, count: i32) -> Result<(), ClaimError> {
        self.kv
            .set_ex(&count_key(id), &count.to_string(), self.user_ttl_secs)
            .await?;
        Ok(())
    }

    pub async fn get_result<T: DeserializeOwned>(
        &self,
        request_id: &str,
    ) -> Result<Option<T>, ClaimError> {
        match self.kv.get(&result_key(request_id)).await? {
            Some(raw) => {
                let result = serde_json::from_str(&raw)
                    .map_err(|e| ClaimError::Internal(anyhow::Error::new(e)))?;
                self.record_hit();
                Ok(Some(result))
            }
            None => {
                self.record_miss();
                Ok(None)
            }
        }
    }

    pub async fn put_result<T: Serialize>(
        &self,
        request_id: &str,
        result: &T,
    ) -> Result<(), ClaimError> {
        let raw = serde_json::to_string(result)
            .map_err(|e| ClaimError::Internal(anyhow::Error::new(e)))?;
        self.kv
            .set_ex(&result_key(request_id), &raw, self.result_ttl_secs)
            .await?;
        Ok(())
    }

    /// Drops every `user:{id}:*` key and tells other nodes to do the same.
    pub async fn invalidate_user(&self, id: Uuid) -> Result<(), ClaimError> {
        let keys = self.kv.scan_match(&format!("user:{}:*", id)).await?;
        self.kv.del_many(&keys).await?;
        self.kv
            .publish(INVALIDATION_CHANNEL, &id.to_string())
            .await?;
        Ok(())
    }

    pub fn counters(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_lookups_total", "outcome" => "hit").increment(1);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_lookups_total", "outcome" => "miss").increment(1);
    }
}
